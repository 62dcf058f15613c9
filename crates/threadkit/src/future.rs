// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Future<T>: shared view of one task run.
//!
//! A run is a thread plus a result slot, both behind `Arc`s. The `Task` and
//! every `Future` it hands out hold them jointly, so a future may outlive
//! its task. The two halves are separate: `Task::stop` lets go of the
//! thread but keeps the slot. The thread is detached when the last holder
//! lets go.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::trace;

use crate::cancel::CancelToken;
use crate::config::ThreadConfig;
use crate::error::ThreadError;
use crate::id::ThreadId;
use crate::thread::CancellableThread;
use crate::value_box::ValueBox;

type Slot<T> = ValueBox<Option<Result<T, ThreadError>>>;

/// Thread and result slot of one run.
///
/// Either half may be missing: nothing ran yet (neither), or the run was
/// stopped and only its result is still referenced.
pub(crate) struct Run<T> {
    thread: Option<Arc<CancellableThread>>,
    result: Option<Arc<Slot<T>>>,
}

impl<T: Send + 'static> Run<T> {
    /// Spawn `job` with an empty result slot. The slot receives whatever
    /// `job` returns or the panic it raised, stop request or not.
    pub(crate) fn start<F>(config: &ThreadConfig, job: F) -> Result<Self, ThreadError>
    where
        F: FnOnce(CancelToken) -> T + Send + 'static,
    {
        let result: Arc<Slot<T>> = Arc::new(ValueBox::new(None));
        let slot = Arc::clone(&result);
        let thread = CancellableThread::spawn_with(config, move |token| {
            let outcome =
                panic::catch_unwind(AssertUnwindSafe(|| job(token))).map_err(ThreadError::from_panic);
            slot.assign(Some(outcome));
            trace!("run result stored");
        })?;
        Ok(Self {
            thread: Some(Arc::new(thread)),
            result: Some(result),
        })
    }
}

impl<T> Run<T> {
    pub(crate) const fn empty() -> Self {
        Self {
            thread: None,
            result: None,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |t| t.is_running())
    }

    pub(crate) fn thread(&self) -> Option<&CancellableThread> {
        self.thread.as_deref()
    }

    /// Let go of the thread half; the result slot stays.
    pub(crate) fn take_thread(&mut self) -> Option<Arc<CancellableThread>> {
        self.thread.take()
    }
}

impl<T> Clone for Run<T> {
    fn clone(&self) -> Self {
        Self {
            thread: self.thread.clone(),
            result: self.result.clone(),
        }
    }
}

/// Eventual result of one `Task` run.
///
/// Cheap to clone; all clones see the same run. A future produced before
/// anything ran is empty: always ready, never holds a value.
pub struct Future<T> {
    run: Run<T>,
}

impl<T> Future<T> {
    pub(crate) fn new(run: Run<T>) -> Self {
        Self { run }
    }

    /// True if there is no thread behind this future or it is done.
    pub fn is_ready(&self) -> bool {
        !self.run.is_running()
    }

    /// Ask the run to stop. The callable has to poll its token to notice.
    pub fn request_stop(&self) {
        if let Some(thread) = self.run.thread() {
            thread.request_stop();
        }
    }

    /// Thread executing the run, if there is one.
    pub fn thread_id(&self) -> Option<ThreadId> {
        self.run.thread().map(CancellableThread::id)
    }
}

impl<T: Clone> Future<T> {
    /// Block until the run finishes, then read its result.
    ///
    /// `Ok(None)` if no value was produced: nothing ran, or the thread was
    /// let go of by `Task::stop` before the callable returned.
    /// `Err(WorkerFailed)` if the callable panicked.
    pub fn wait(&self) -> Result<Option<T>, ThreadError> {
        if let Some(thread) = self.run.thread() {
            if thread.is_running() {
                thread.join()?;
            }
        }
        self.peek()
    }

    /// Read the result without blocking. Races with an in-flight run by
    /// design; meant for polling.
    pub fn peek(&self) -> Result<Option<T>, ThreadError> {
        match &self.run.result {
            Some(slot) => slot.read().transpose(),
            None => Ok(None),
        }
    }
}

impl Future<()> {
    /// Wait for the run to finish; there is no value to return.
    pub fn join(&self) -> Result<(), ThreadError> {
        self.wait().map(|_| ())
    }
}

impl<T> Clone for Future<T> {
    fn clone(&self) -> Self {
        Self {
            run: self.run.clone(),
        }
    }
}

impl<T> fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("thread", &self.thread_id())
            .field("ready", &self.is_ready())
            .finish()
    }
}
