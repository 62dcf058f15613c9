// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Errors surfaced by threads, tasks and futures.

use std::any::Any;
use std::io;

use thiserror::Error;

/// Why a thread or one of its runs did not produce a value.
///
/// `Clone` so it can sit in a result slot and be copied out by readers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadError {
    /// The OS refused to create the thread.
    #[error("failed to spawn thread `{name}`: {message}")]
    Spawn {
        name: String,
        kind: io::ErrorKind,
        message: String,
    },

    /// The worker callable panicked.
    #[error("worker failed: {0}")]
    WorkerFailed(String),

    /// A stop was requested while the worker was checking its token.
    #[error("operation was cancelled")]
    Cancelled,
}

impl ThreadError {
    pub(crate) fn spawn(name: Option<&str>, err: io::Error) -> Self {
        ThreadError::Spawn {
            name: name.unwrap_or("<unnamed>").to_string(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    /// Build a `WorkerFailed` from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        ThreadError::WorkerFailed(msg)
    }
}
