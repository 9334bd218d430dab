//! A cell written at most once, readable from anywhere afterwards.
//!
//! Used for boot-time singletons: the installed interrupt control, the
//! kernel logger. Losers of the initialization race spin until the winner
//! has published its value.

use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const SET: u8 = 2;

pub struct SyncOnceCell<T> {
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
}

unsafe impl<T: Send + Sync> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    /// # Safety
    /// The state must be [`SET`].
    unsafe fn value(&self) -> &T {
        unsafe { (*self.value.get()).assume_init_ref() }
    }

    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        (self.state.load(Ordering::Acquire) == SET).then(|| unsafe { self.value() })
    }

    #[inline]
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.state.load(Ordering::Acquire) == SET
    }

    /// Store `value` unless the cell is (being) written already; the value is
    /// handed back in that case.
    pub fn set(&self, value: T) -> Result<&T, T> {
        if self
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Acquire)
            .is_err()
        {
            return Err(value);
        }
        Ok(self.publish(value))
    }

    /// The stored value, running `init` first if the cell is empty.
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        match self
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Acquire)
        {
            Ok(_) => self.publish(init()),
            Err(_) => self.wait(),
        }
    }

    fn publish(&self, value: T) -> &T {
        unsafe { (*self.value.get()).write(value) };
        self.state.store(SET, Ordering::Release);
        unsafe { self.value() }
    }

    fn wait(&self) -> &T {
        while self.state.load(Ordering::Acquire) != SET {
            spin_loop();
        }
        unsafe { self.value() }
    }
}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == SET {
            unsafe { self.value.get_mut().assume_init_drop() };
        }
    }
}
