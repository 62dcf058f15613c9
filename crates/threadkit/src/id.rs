// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Thread identity.
//!
//! `std::thread::ThreadId` is not ordered, so threads get their own id from
//! a process-wide counter. Usable as a map key and in ownership assertions.

use std::cell::Cell;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};

/// Opaque, totally ordered identity of a thread of execution.
///
/// Ids are never reused within a process.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ThreadId(NonZeroU64);

thread_local! {
    static CURRENT: Cell<Option<ThreadId>> = const { Cell::new(None) };
}

impl ThreadId {
    /// Identity of the calling thread. Assigned on first use.
    pub fn current() -> Self {
        CURRENT.with(|cell| match cell.get() {
            Some(id) => id,
            None => {
                let id = ThreadId::next();
                cell.set(Some(id));
                id
            }
        })
    }

    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };
        Self(id)
    }

    /// Pin the calling thread's identity. Called first thing on a freshly
    /// spawned thread so the spawner can know the id in advance.
    pub(crate) fn install(self) {
        CURRENT.with(|cell| cell.set(Some(self)));
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique thread id: bitspace exhausted")
    }

    pub fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "thread#{}", self.0)
    }
}
