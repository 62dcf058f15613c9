// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Threading toolkit for the engine.
//!
//! Real OS threads, spin-yield waits, cooperative cancellation. No pools,
//! no condition variables, no timeouts.
//!
//! Components:
//! - `ThreadId` — ordered thread identity
//! - `ValueBox` — a value guarded by a spinlock
//! - `OwnedLock` / `ScopedGuard` — critical sections that know their owner
//! - `CancelSource` / `CancelToken` — monotonic stop flag
//! - `CancellableThread` — one OS thread plus its stop flag
//! - `Task` / `Future` — run a bound callable, collect the result later

pub mod cancel;
pub mod config;
pub mod error;
pub mod future;
pub mod id;
pub mod owned_lock;
pub mod task;
pub mod thread;
pub mod value_box;

pub use cancel::{CancelSource, CancelToken};
pub use config::ThreadConfig;
pub use error::ThreadError;
pub use future::Future;
pub use id::ThreadId;
pub use owned_lock::{OwnedLock, ScopedGuard};
pub use task::Task;
pub use thread::CancellableThread;
pub use value_box::ValueBox;
