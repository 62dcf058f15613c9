// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Cooperative cancellation.
//!
//! AtomicBool flag shared between a `CancelSource` (held by the thread
//! wrapper) and any number of `CancelToken`s (handed to the running code).
//! The flag only ever goes false -> true. Nothing is interrupted; the
//! running code has to poll.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::ThreadError;

#[derive(Debug, Default)]
struct CancelFlag {
    stop: AtomicBool,
}

/// Owning side of a stop flag. Only the source can request a stop.
#[derive(Debug, Default)]
pub struct CancelSource {
    flag: Arc<CancelFlag>,
}

impl CancelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the stop flag. Idempotent.
    pub fn request_stop(&self) {
        self.flag.stop.store(true, Ordering::Release);
    }

    pub fn stop_requested(&self) -> bool {
        self.flag.stop.load(Ordering::Acquire)
    }

    /// A token observing this source.
    pub fn token(&self) -> CancelToken {
        CancelToken {
            flag: Arc::clone(&self.flag),
        }
    }
}

/// Read-only view of a stop flag, passed to the running function.
#[derive(Debug, Clone)]
pub struct CancelToken {
    flag: Arc<CancelFlag>,
}

impl CancelToken {
    /// Check if a stop was requested.
    pub fn should_stop(&self) -> bool {
        self.flag.stop.load(Ordering::Acquire)
    }

    /// `Err(Cancelled)` once a stop was requested, for use with `?`.
    pub fn check(&self) -> Result<(), ThreadError> {
        if self.should_stop() {
            Err(ThreadError::Cancelled)
        } else {
            Ok(())
        }
    }
}
