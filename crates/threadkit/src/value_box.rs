// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! ValueBox<T>: a value guarded by a spinlock.
//!
//! Closure-based access, no guard objects escape. Reads copy out so no
//! reference can alias the payload after the lock is dropped. Each call is
//! atomic with respect to its own box; nothing orders two different boxes.

use std::cell::UnsafeCell;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::ops::{
    AddAssign, BitAndAssign, BitOrAssign, BitXorAssign, DivAssign, MulAssign, RemAssign,
    ShlAssign, ShrAssign, SubAssign,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Test-and-test-and-set flag.
struct SpinFlag {
    held: AtomicBool,
}

impl SpinFlag {
    const fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    fn acquire(&self) -> SpinGuard<'_> {
        loop {
            while self.held.load(Ordering::Relaxed) {
                thread::yield_now();
            }
            if !self.held.swap(true, Ordering::Acquire) {
                return SpinGuard { flag: self };
            }
        }
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::Relaxed)
    }
}

/// Clears the flag on drop, so a panicking `modify` still unlocks.
struct SpinGuard<'a> {
    flag: &'a SpinFlag,
}

impl Drop for SpinGuard<'_> {
    fn drop(&mut self) {
        self.flag.held.store(false, Ordering::Release);
    }
}

/// A single value whose every access is serialized by a spinlock.
///
/// Meant for short critical sections. `modify` is the only way to do an
/// atomic read-modify-write; the closure must not touch the same box again
/// or it spins forever.
pub struct ValueBox<T> {
    flag: SpinFlag,
    value: UnsafeCell<T>,
}

// Safety: the payload is only reached while `flag` is held.
unsafe impl<T: Send> Send for ValueBox<T> {}
unsafe impl<T: Send> Sync for ValueBox<T> {}

impl<T> ValueBox<T> {
    pub const fn new(value: T) -> Self {
        Self {
            flag: SpinFlag::new(),
            value: UnsafeCell::new(value),
        }
    }

    /// Run `op` with exclusive access to the value.
    pub fn modify<U, F: FnOnce(&mut T) -> U>(&self, op: F) -> U {
        let _guard = self.flag.acquire();
        // Safety: the flag is held until `_guard` drops.
        op(unsafe { &mut *self.value.get() })
    }

    /// Overwrite the value.
    pub fn assign(&self, value: T) -> &Self {
        self.modify(|v| *v = value);
        self
    }

    /// Swap in `value`, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        self.modify(|v| std::mem::replace(v, value))
    }

    /// Racy: the answer may be stale by the time it is returned.
    pub fn is_locked(&self) -> bool {
        self.flag.is_held()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }
}

impl<T: Clone> ValueBox<T> {
    /// Copy of the current value.
    pub fn read(&self) -> T {
        self.modify(|v| v.clone())
    }
}

impl<T: Default> ValueBox<T> {
    pub fn take(&self) -> T {
        self.modify(std::mem::take)
    }
}

macro_rules! compound_ops {
    ($($method:ident => $op:ident<$rhs:ty>),* $(,)?) => {
        impl<T> ValueBox<T> {
            $(
                #[doc = concat!("Locked `", stringify!($op), "::", stringify!($method), "`.")]
                pub fn $method(&self, rhs: $rhs) -> &Self
                where
                    T: $op<$rhs>,
                {
                    self.modify(|v| $op::$method(v, rhs));
                    self
                }
            )*
        }
    };
}

compound_ops! {
    add_assign => AddAssign<T>,
    sub_assign => SubAssign<T>,
    mul_assign => MulAssign<T>,
    div_assign => DivAssign<T>,
    rem_assign => RemAssign<T>,
    bitand_assign => BitAndAssign<T>,
    bitor_assign => BitOrAssign<T>,
    bitxor_assign => BitXorAssign<T>,
    shl_assign => ShlAssign<u32>,
    shr_assign => ShrAssign<u32>,
}

impl<T: AddAssign + From<u8> + Clone> ValueBox<T> {
    /// `++value`: returns the incremented value.
    pub fn increment(&self) -> T {
        self.modify(|v| {
            *v += T::from(1);
            v.clone()
        })
    }
}

impl<T: SubAssign + From<u8> + Clone> ValueBox<T> {
    /// `--value`: returns the decremented value.
    pub fn decrement(&self) -> T {
        self.modify(|v| {
            *v -= T::from(1);
            v.clone()
        })
    }
}

impl<T: PartialEq> PartialEq<T> for ValueBox<T> {
    fn eq(&self, other: &T) -> bool {
        self.modify(|v| *v == *other)
    }
}

impl<T: PartialOrd> PartialOrd<T> for ValueBox<T> {
    fn partial_cmp(&self, other: &T) -> Option<CmpOrdering> {
        self.modify(|v| (*v).partial_cmp(other))
    }
}

/// Copies the payload; the copy starts unlocked.
impl<T: Clone> Clone for ValueBox<T> {
    fn clone(&self) -> Self {
        Self::new(self.read())
    }
}

impl<T: Default> Default for ValueBox<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> From<T> for ValueBox<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for ValueBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.modify(|v| f.debug_tuple("ValueBox").field(&*v).finish())
    }
}
