// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Task<A, R>: a bound callable run on its own thread, one run at a time.
//!
//! The callable takes a `CancelToken` plus an argument pack `A` (use a tuple
//! for several arguments). `run` spawns a thread and returns a `Future`;
//! calling it again while that run is in flight returns the same run.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::cancel::CancelToken;
use crate::config::ThreadConfig;
use crate::error::ThreadError;
use crate::future::{Future, Run};
use crate::value_box::ValueBox;

type Target<A, R> = Arc<dyn Fn(CancelToken, A) -> R + Send + Sync>;

/// What the task holds under its lock: the latest run, plus a marker for a
/// run whose thread is being spawned outside the lock.
struct Current<R> {
    run: Run<R>,
    starting: bool,
    stop_pending: bool,
}

enum Claim<A, R> {
    InFlight(Run<R>),
    Starting,
    Reserved(Target<A, R>),
}

/// Clears the starting marker if the spawn bails out early.
struct Reservation<'a, R> {
    current: &'a ValueBox<Current<R>>,
    armed: bool,
}

impl<R> Reservation<'_, R> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<R> Drop for Reservation<'_, R> {
    fn drop(&mut self) {
        if self.armed {
            self.current.modify(|cur| {
                cur.starting = false;
                cur.stop_pending = false;
            });
        }
    }
}

/// Owns a callable and at most one in-flight run of it.
///
/// States are Idle and Running. A run ends on its own when the callable
/// returns, or is abandoned with `stop()`. The result of the latest run is
/// kept until the next run starts. Dropping the task stops it.
pub struct Task<A, R> {
    target: ValueBox<Target<A, R>>,
    current: ValueBox<Current<R>>,
    config: ThreadConfig,
}

impl<A, R> Task<A, R>
where
    A: Send + 'static,
    R: Send + 'static,
{
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(CancelToken, A) -> R + Send + Sync + 'static,
    {
        Self::with_config(ThreadConfig::default(), f)
    }

    /// Bind `f`; every run spawns its thread from `config`.
    pub fn with_config<F>(config: ThreadConfig, f: F) -> Self
    where
        F: Fn(CancelToken, A) -> R + Send + Sync + 'static,
    {
        Self {
            target: ValueBox::new(Arc::new(f)),
            current: ValueBox::new(Current {
                run: Run::empty(),
                starting: false,
                stop_pending: false,
            }),
            config,
        }
    }

    /// Replace the callable. Takes effect on the next run.
    pub fn rebind<F>(&self, f: F) -> &Self
    where
        F: Fn(CancelToken, A) -> R + Send + Sync + 'static,
    {
        self.target.assign(Arc::new(f));
        self
    }

    /// Start a run with `args`, or join the one already in flight.
    pub fn run(&self, args: A) -> Result<Future<R>, ThreadError> {
        self.start(None, args)
    }

    /// Rebind to `f` and run it. If a run is in flight it is returned
    /// unchanged and `f` is dropped.
    pub fn invoke<F>(&self, f: F, args: A) -> Result<Future<R>, ThreadError>
    where
        F: Fn(CancelToken, A) -> R + Send + Sync + 'static,
    {
        self.start(Some(Arc::new(f)), args)
    }

    // The in-flight check and the reservation happen under the `current`
    // lock, so racing callers get exactly one execution. The spawn itself
    // runs unlocked; other callers of `run` yield until it is installed.
    fn start(&self, rebind: Option<Target<A, R>>, args: A) -> Result<Future<R>, ThreadError> {
        let target = loop {
            let claim = self.current.modify(|cur| {
                if cur.run.is_running() {
                    return Claim::InFlight(cur.run.clone());
                }
                if cur.starting {
                    return Claim::Starting;
                }
                cur.starting = true;
                cur.stop_pending = false;
                if let Some(f) = &rebind {
                    self.target.assign(Arc::clone(f));
                }
                Claim::Reserved(self.target.read())
            });
            match claim {
                Claim::InFlight(run) => {
                    trace!(thread = ?run.thread().map(|t| t.id()), "run already in flight");
                    return Ok(Future::new(run));
                }
                Claim::Starting => std::thread::yield_now(),
                Claim::Reserved(target) => break target,
            }
        };

        let mut reservation = Reservation {
            current: &self.current,
            armed: true,
        };
        let mut run = Run::start(&self.config, move |token| target(token, args))?;
        let thread = run.thread().map(|t| t.id());
        let stopped = self.current.modify(|cur| {
            let stopped = std::mem::take(&mut cur.stop_pending);
            if stopped {
                if let Some(t) = run.take_thread() {
                    t.request_stop();
                }
            }
            cur.run = run.clone();
            cur.starting = false;
            stopped
        });
        reservation.disarm();
        if stopped {
            debug!(thread = ?thread, "task stopped while its run was starting");
        } else {
            debug!(thread = ?thread, name = ?self.config.name, "task run started");
        }
        Ok(Future::new(run))
    }
}

impl<A, R> Task<A, R> {
    pub fn is_running(&self) -> bool {
        self.current.modify(|cur| cur.starting || cur.run.is_running())
    }

    /// Future for the latest run; empty (and ready) if nothing ran yet.
    /// After `stop()` it still carries that run's stored result.
    pub fn future(&self) -> Future<R> {
        Future::new(self.current.modify(|cur| cur.run.clone()))
    }

    /// Request a stop and let go of the current thread. The result slot is
    /// kept, so `peek` and `wait` still report a value the run stored.
    ///
    /// Does not join. The thread stays alive until its callable notices the
    /// token (or returns), and is detached once the last `Future` for it is
    /// dropped. A callable that never polls its token outlives the task.
    pub fn stop(&self) {
        let thread = self.current.modify(|cur| {
            if cur.starting {
                cur.stop_pending = true;
            }
            cur.run.take_thread()
        });
        if let Some(thread) = thread {
            thread.request_stop();
            debug!(thread = %thread.id(), "task stopped");
        }
    }

    pub fn config(&self) -> &ThreadConfig {
        &self.config
    }
}

impl<A, R: Clone> Task<A, R> {
    /// Block until the current run (if any) finishes and return its result.
    pub fn wait(&self) -> Result<Option<R>, ThreadError> {
        self.future().wait()
    }

    /// The latest stored result, without blocking.
    pub fn peek(&self) -> Result<Option<R>, ThreadError> {
        self.future().peek()
    }
}

impl<A> Task<A, ()> {
    /// Wait for the current run; returns the task for chaining.
    pub fn join(&self) -> Result<&Self, ThreadError> {
        self.future().join()?;
        Ok(self)
    }
}

impl<A, R> Drop for Task<A, R> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<A, R> fmt::Debug for Task<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("running", &self.is_running())
            .field("config", &self.config)
            .finish()
    }
}
