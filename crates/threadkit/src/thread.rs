// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Cancellable OS thread.
//!
//! `CancellableThread` starts its thread on construction and hands the
//! callable a `CancelToken`. Stopping is cooperative only. Dropping the
//! wrapper requests a stop and detaches; it never joins or kills.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::cancel::{CancelSource, CancelToken};
use crate::config::ThreadConfig;
use crate::error::ThreadError;
use crate::id::ThreadId;
use crate::value_box::ValueBox;

/// What the thread leaves behind for joiners.
#[derive(Default)]
struct Completion {
    finished: AtomicBool,
    failure: ValueBox<Option<ThreadError>>,
}

/// Marks the thread finished even if the body unwinds past the catch.
struct FinishOnDrop(Arc<Completion>);

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        self.0.finished.store(true, Ordering::Release);
    }
}

/// One OS thread plus its stop flag.
///
/// Every method takes `&self`, so the wrapper can sit behind an `Arc` and be
/// joined from several places; only one caller takes the `JoinHandle`, the
/// rest wait on the completion flag.
pub struct CancellableThread {
    id: ThreadId,
    name: Option<String>,
    handle: ValueBox<Option<JoinHandle<()>>>,
    completion: Arc<Completion>,
    source: CancelSource,
    detached: AtomicBool,
}

impl CancellableThread {
    /// Start `f(token)` on a new thread with default settings.
    pub fn spawn<F>(f: F) -> Result<Self, ThreadError>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        Self::spawn_with(&ThreadConfig::default(), f)
    }

    /// Start `f(token)` on a new thread built from `config`.
    pub fn spawn_with<F>(config: &ThreadConfig, f: F) -> Result<Self, ThreadError>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let id = ThreadId::next();
        let source = CancelSource::new();
        let token = source.token();
        let completion = Arc::new(Completion::default());
        let done = FinishOnDrop(Arc::clone(&completion));

        let handle = config
            .builder()
            .spawn(move || {
                id.install();
                let done = done;
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(token))) {
                    let err = ThreadError::from_panic(payload);
                    warn!(thread = %id, error = %err, "worker panicked");
                    done.0.failure.assign(Some(err));
                }
            })
            .map_err(|e| ThreadError::spawn(config.name.as_deref(), e))?;

        debug!(thread = %id, name = ?config.name, "spawned thread");

        Ok(Self {
            id,
            name: config.name.clone(),
            handle: ValueBox::new(Some(handle)),
            completion,
            source,
            detached: AtomicBool::new(false),
        })
    }

    /// Identity of the calling thread.
    pub fn current_id() -> ThreadId {
        ThreadId::current()
    }

    pub fn yield_now() {
        std::thread::yield_now();
    }

    pub fn sleep_for(duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Block until the thread finishes.
    ///
    /// Returns `WorkerFailed` to every joiner if the callable panicked.
    /// Joining a detached thread returns immediately.
    pub fn join(&self) -> Result<(), ThreadError> {
        match self.handle.modify(Option::take) {
            Some(handle) => {
                // The body never unwinds out of the catch, so this only
                // fails if the runtime itself tore the thread down.
                if let Err(payload) = handle.join() {
                    self.completion
                        .failure
                        .assign(Some(ThreadError::from_panic(payload)));
                }
                trace!(thread = %self.id, "joined thread");
            }
            None if self.detached.load(Ordering::Acquire) => return Ok(()),
            None => {
                while !self.completion.finished.load(Ordering::Acquire) {
                    std::thread::yield_now();
                }
            }
        }
        match self.completion.failure.read() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Let the thread run to completion on its own.
    pub fn detach(&self) {
        if let Some(handle) = self.handle.modify(Option::take) {
            self.detached.store(true, Ordering::Release);
            drop(handle);
            debug!(thread = %self.id, "detached thread");
        }
    }

    /// True until the thread finishes or is detached.
    pub fn is_running(&self) -> bool {
        !self.completion.finished.load(Ordering::Acquire)
            && !self.detached.load(Ordering::Acquire)
    }

    /// Whether the callable has returned (or panicked), detached or not.
    pub fn is_finished(&self) -> bool {
        self.completion.finished.load(Ordering::Acquire)
    }

    pub fn request_stop(&self) {
        if !self.source.stop_requested() {
            trace!(thread = %self.id, "stop requested");
        }
        self.source.request_stop();
    }

    pub fn token(&self) -> CancelToken {
        self.source.token()
    }

    pub fn source(&self) -> &CancelSource {
        &self.source
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl std::fmt::Debug for CancellableThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellableThread")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("running", &self.is_running())
            .field("stop_requested", &self.source.stop_requested())
            .finish()
    }
}

impl Drop for CancellableThread {
    fn drop(&mut self) {
        self.source.request_stop();
        if self.handle.get_mut().is_some() && !self.is_finished() {
            // Dropping the JoinHandle detaches; the thread keeps running
            // until it notices the stop request.
            debug!(thread = %self.id, "dropped running thread without join; detaching");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn spawn_and_join() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h2 = hits.clone();
        let t = CancellableThread::spawn(move |_| {
            h2.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        t.join().unwrap();
        assert!(!t.is_running());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn join_twice_is_fine() {
        let t = CancellableThread::spawn(|_| {}).unwrap();
        t.join().unwrap();
        t.join().unwrap();
    }

    #[test]
    fn reports_its_own_id() {
        let seen = Arc::new(ValueBox::new(None));
        let s2 = seen.clone();
        let t = CancellableThread::spawn(move |_| {
            s2.assign(Some(CancellableThread::current_id()));
        })
        .unwrap();
        t.join().unwrap();
        assert_eq!(seen.read(), Some(t.id()));
        assert_ne!(t.id(), CancellableThread::current_id());
    }

    #[test]
    fn named_thread() {
        let cfg = ThreadConfig::new().name("physics");
        let seen = Arc::new(ValueBox::new(None));
        let s2 = seen.clone();
        let t = CancellableThread::spawn_with(&cfg, move |_| {
            s2.assign(std::thread::current().name().map(str::to_string));
        })
        .unwrap();
        t.join().unwrap();
        assert_eq!(t.name(), Some("physics"));
        assert_eq!(seen.read().as_deref(), Some("physics"));
    }

    #[test]
    fn request_stop_reaches_worker() {
        let t = CancellableThread::spawn(|token| {
            while !token.should_stop() {
                CancellableThread::yield_now();
            }
        })
        .unwrap();
        assert!(t.is_running());
        t.request_stop();
        t.join().unwrap();
        assert!(t.token().should_stop());
        assert!(!t.is_running());
    }

    #[test]
    fn panic_becomes_worker_failed() {
        let t = CancellableThread::spawn(|_| panic!("boom")).unwrap();
        match t.join() {
            Err(ThreadError::WorkerFailed(msg)) => assert!(msg.contains("boom")),
            other => panic!("expected WorkerFailed, got {:?}", other),
        }
        assert!(t.is_finished());
    }

    #[test]
    fn detach_stops_tracking() {
        let t = CancellableThread::spawn(|_| {
            CancellableThread::sleep_for(Duration::from_millis(10));
        })
        .unwrap();
        t.detach();
        assert!(!t.is_running());
        t.join().unwrap();
    }

    #[test]
    fn concurrent_joiners_all_return() {
        let t = Arc::new(
            CancellableThread::spawn(|_| {
                CancellableThread::sleep_for(Duration::from_millis(20));
            })
            .unwrap(),
        );
        let joiners: Vec<_> = (0..4)
            .map(|_| {
                let t = t.clone();
                std::thread::spawn(move || t.join())
            })
            .collect();
        for j in joiners {
            assert_eq!(j.join().unwrap(), Ok(()));
        }
        assert!(!t.is_running());
    }

    #[test]
    fn drop_requests_stop() {
        let observed = Arc::new(AtomicBool::new(false));
        let o2 = observed.clone();
        let t = CancellableThread::spawn(move |token| {
            while !token.should_stop() {
                CancellableThread::yield_now();
            }
            o2.store(true, Ordering::SeqCst);
        })
        .unwrap();
        drop(t);
        while !observed.load(Ordering::SeqCst) {
            CancellableThread::yield_now();
        }
    }
}
