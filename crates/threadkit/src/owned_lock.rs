// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Ownership-aware lock for critical sections.
//!
//! Guards code rather than a value. The owner is recorded in a
//! `ValueBox<Option<ThreadId>>`, so every ownership change is one locked
//! step on that box. Re-capturing by the owner never blocks, but the lock
//! does not count: a single `release` clears it.

use std::marker::PhantomData;

use crate::id::ThreadId;
use crate::value_box::ValueBox;

/// Mutual exclusion that knows which thread holds it.
///
/// Misuse (never releasing) starves other capturers forever; there are no
/// timeouts.
#[derive(Debug, Default)]
pub struct OwnedLock {
    owner: ValueBox<Option<ThreadId>>,
}

impl OwnedLock {
    pub const fn new() -> Self {
        Self {
            owner: ValueBox::new(None),
        }
    }

    /// Block (spin-yield) until the calling thread owns the lock.
    pub fn capture(&self) -> &Self {
        let me = ThreadId::current();
        while !self.claim(me) {
            std::thread::yield_now();
        }
        self
    }

    /// Claim the lock if nobody owns it, without waiting.
    ///
    /// Check and claim happen in one locked step, so two racing callers can
    /// never both succeed. Returns `true` if the caller owns the lock
    /// afterwards, including when it already did.
    pub fn try_capture(&self) -> bool {
        self.claim(ThreadId::current())
    }

    fn claim(&self, me: ThreadId) -> bool {
        self.owner.modify(|owner| match *owner {
            Some(id) => id == me,
            None => {
                *owner = Some(me);
                true
            }
        })
    }

    /// Give up ownership. No effect unless the caller is the owner.
    pub fn release(&self) -> &Self {
        let me = ThreadId::current();
        self.owner.modify(|owner| {
            if *owner == Some(me) {
                *owner = None;
            }
        });
        self
    }

    /// Block until the lock is free without taking it. Returns at once for
    /// the owner.
    pub fn wait(&self) -> &Self {
        let me = ThreadId::current();
        loop {
            match self.owner.read() {
                None => break,
                Some(id) if id == me => break,
                Some(_) => std::thread::yield_now(),
            }
        }
        self
    }

    pub fn captured(&self) -> bool {
        self.owner.read().is_some()
    }

    pub fn owned_by(&self, id: ThreadId) -> bool {
        self.owner.read() == Some(id)
    }

    pub fn is_current_owner(&self) -> bool {
        self.owned_by(ThreadId::current())
    }

    pub fn current_owner(&self) -> Option<ThreadId> {
        self.owner.read()
    }

    /// Capture and hold until the returned guard drops.
    pub fn guard(&self) -> ScopedGuard<'_> {
        ScopedGuard::new(self)
    }
}

/// Captures an `OwnedLock` for the length of a scope.
///
/// Releases on every exit path, unwinding included. Stays on the thread that
/// created it, since only the owner can release.
#[derive(Debug)]
pub struct ScopedGuard<'a> {
    lock: &'a OwnedLock,
    _not_send: PhantomData<*const ()>,
}

impl<'a> ScopedGuard<'a> {
    pub fn new(lock: &'a OwnedLock) -> Self {
        lock.capture();
        Self {
            lock,
            _not_send: PhantomData,
        }
    }

    pub fn lock(&self) -> &OwnedLock {
        self.lock
    }
}

impl Drop for ScopedGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn capture_records_owner() {
        let lock = OwnedLock::new();
        assert!(!lock.captured());
        lock.capture();
        assert!(lock.captured());
        assert!(lock.is_current_owner());
        assert_eq!(lock.current_owner(), Some(ThreadId::current()));
        lock.release();
        assert!(!lock.captured());
    }

    #[test]
    fn recapture_does_not_block_or_count() {
        let lock = OwnedLock::new();
        lock.capture().capture().capture();
        assert!(lock.is_current_owner());
        lock.release();
        assert!(!lock.captured());
    }

    #[test]
    fn release_by_non_owner_is_ignored() {
        let lock = Arc::new(OwnedLock::new());
        lock.capture();
        let owner = lock.current_owner();

        let l2 = lock.clone();
        std::thread::spawn(move || {
            l2.release();
        })
        .join()
        .unwrap();

        assert!(lock.captured());
        assert_eq!(lock.current_owner(), owner);
        lock.release();
    }

    #[test]
    fn try_capture_fails_while_owned_elsewhere() {
        let lock = Arc::new(OwnedLock::new());
        lock.capture();
        let l2 = lock.clone();
        let got = std::thread::spawn(move || l2.try_capture()).join().unwrap();
        assert!(!got);
        assert!(lock.try_capture());
        lock.release();
    }

    // try_capture is a true atomic claim, not check-then-set: with many
    // threads racing on a free lock, exactly one wins.
    #[test]
    fn try_capture_is_atomic_under_contention() {
        for _ in 0..50 {
            let lock = Arc::new(OwnedLock::new());
            let barrier = Arc::new(Barrier::new(8));
            let winners = Arc::new(AtomicUsize::new(0));
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let lock = lock.clone();
                    let barrier = barrier.clone();
                    let winners = winners.clone();
                    std::thread::spawn(move || {
                        barrier.wait();
                        if lock.try_capture() {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(winners.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn wait_returns_for_owner() {
        let lock = OwnedLock::new();
        lock.capture();
        lock.wait();
        assert!(lock.is_current_owner());
    }

    #[test]
    fn wait_blocks_until_free_without_taking() {
        let lock = Arc::new(OwnedLock::new());
        lock.capture();
        let l2 = lock.clone();
        let waiter = std::thread::spawn(move || {
            l2.wait();
            l2.captured()
        });
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(!waiter.is_finished());
        lock.release();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn guard_releases_on_scope_exit() {
        let lock = OwnedLock::new();
        {
            let g = lock.guard();
            assert!(g.lock().is_current_owner());
        }
        assert!(!lock.captured());
    }

    #[test]
    fn guard_releases_on_unwind() {
        let lock = Arc::new(OwnedLock::new());
        let l2 = lock.clone();
        let r = std::thread::spawn(move || {
            let _g = ScopedGuard::new(&l2);
            panic!("inside critical section");
        })
        .join();
        assert!(r.is_err());
        assert!(!lock.captured());
    }

    #[test]
    fn critical_sections_never_overlap() {
        let lock = Arc::new(OwnedLock::new());
        let busy = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));
        let count = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let (lock, busy, overlaps, count) =
                    (lock.clone(), busy.clone(), overlaps.clone(), count.clone());
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let _g = lock.guard();
                        if busy.swap(true, Ordering::SeqCst) {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        count.fetch_add(1, Ordering::Relaxed);
                        busy.store(false, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
        assert_eq!(count.load(Ordering::Relaxed), 1200);
    }
}
