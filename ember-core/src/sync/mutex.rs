//! Reentrant kernel mutex
//!
//! The only blocking primitive of the kernel. It works before multitasking
//! is up, where the owner is the physical core, and afterwards, where the
//! owner is the current task. The owner may acquire again without blocking;
//! every acquisition needs a matching release.
//!
//! The fields of a mutex are guarded by a raw spinlock which is only held
//! with interrupts masked, so an interrupt handler on the same core can
//! never spin against the code it interrupted.

use core::cell::UnsafeCell;
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use ember_abi::Tid;

use crate::platform::{self, InterruptGuard};

const MUTEX_INITIALIZED: u32 = 0xFEED;

/// Serializes `initialize` calls kernel-wide
static INITIALIZER_LOCK: spin::Mutex<()> = spin::Mutex::new(());

/// Releases of mutexes nobody held
static OVER_RELEASES: AtomicUsize = AtomicUsize::new(0);

/// Identity of a mutex holder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// A physical core, before multitasking is active on it
    Core(u32),
    Task(Tid),
}

impl Owner {
    /// Identity of the caller as reported by the installed platform
    pub fn current() -> Self {
        let platform = platform::current();
        match platform.current_task() {
            Some(tid) => Owner::Task(tid),
            None => Owner::Core(platform.current_core()),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Owner::Core(id) => write!(f, "core {}", id),
            Owner::Task(id) => write!(f, "task {}", id),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LockState {
    depth: u32,
    owner: Option<Owner>,
}

impl LockState {
    const UNOWNED: Self = Self {
        depth: 0,
        owner: None,
    };
}

/// Reentrant mutex without attached data
#[derive(Debug)]
pub struct RawMutex {
    initialized: AtomicU32,
    state: spin::Mutex<LockState>,
}

impl RawMutex {
    /// An initialized, unowned mutex
    pub const fn new() -> Self {
        Self {
            initialized: AtomicU32::new(MUTEX_INITIALIZED),
            state: spin::Mutex::new(LockState::UNOWNED),
        }
    }

    /// A mutex that must be passed to [`RawMutex::initialize`] before use
    pub const fn uninit() -> Self {
        Self {
            initialized: AtomicU32::new(0),
            state: spin::Mutex::new(LockState::UNOWNED),
        }
    }

    /// Reset to unowned and mark initialized.
    ///
    /// Re-initializing a held mutex breaks it; callers must not race this
    /// against any other use of the mutex.
    pub fn initialize(&self) {
        let _serial = INITIALIZER_LOCK.lock();

        if self.is_initialized() {
            log::warn!("[mutex] initializing mutex {:p} twice", self);
        }

        self.with_state(|state| *state = LockState::UNOWNED);
        self.initialized.store(MUTEX_INITIALIZED, Ordering::Release);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire) == MUTEX_INITIALIZED
    }

    /// Block until the caller owns the mutex.
    ///
    /// With multitasking active and interrupts enabled the caller yields
    /// between attempts; otherwise it busy-waits.
    pub fn acquire(&self) {
        self.check_initialized();

        let platform = platform::current();
        let owner = Owner::current();
        let may_yield = matches!(owner, Owner::Task(_)) && platform.interrupts_enabled();

        while !self.try_acquire(owner) {
            if may_yield {
                platform.yield_now();
            } else {
                platform.pause();
            }
        }
    }

    /// Take the mutex for `owner` if it is free or already held by `owner`
    pub fn try_acquire(&self, owner: Owner) -> bool {
        self.check_initialized();

        self.with_state(|state| {
            if state.depth == 0 || state.owner == Some(owner) {
                state.depth += 1;
                state.owner = Some(owner);
                true
            } else {
                false
            }
        })
    }

    /// Give up one level of ownership. Releasing an unheld mutex does nothing.
    pub fn release(&self) {
        self.check_initialized();

        let held = self.with_state(|state| {
            if state.depth == 0 {
                return false;
            }
            state.depth -= 1;
            if state.depth == 0 {
                state.owner = None;
            }
            true
        });

        if !held {
            OVER_RELEASES.fetch_add(1, Ordering::Relaxed);
            log::trace!("[mutex] release of unheld mutex {:p}", self);
        }
    }

    /// Current recursion depth, 0 when unowned
    pub fn depth(&self) -> u32 {
        self.with_state(|state| state.depth)
    }

    pub fn owner(&self) -> Option<Owner> {
        self.with_state(|state| state.owner)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut LockState) -> R) -> R {
        let _interrupts = InterruptGuard::new();
        let mut state = self.state.lock();
        f(&mut state)
    }

    fn check_initialized(&self) {
        if !self.is_initialized() {
            panic!(
                "[mutex] core {}: tried to use uninitialized mutex {:p}",
                platform::current().current_core(),
                self
            );
        }
    }
}

impl Default for RawMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of releases of mutexes that were not held
pub fn over_releases() -> usize {
    OVER_RELEASES.load(Ordering::Relaxed)
}

/// Reentrant mutex protecting a value.
///
/// Because the owner may hold several guards at once, guards only hand out
/// shared references; use `Cell` or `RefCell` inside for mutation.
pub struct Mutex<T: ?Sized> {
    raw: RawMutex,
    data: UnsafeCell<T>,
}

// SAFETY:
// - Only the current owner can reach `data`, and one owner runs on one
//   core at a time.
// - `T: Send` lets the value be used from whichever core owns the lock.
unsafe impl<T: ?Sized + Send> Sync for Mutex<T> {}
unsafe impl<T: ?Sized + Send> Send for Mutex<T> {}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self {
            raw: RawMutex::new(),
            data: UnsafeCell::new(value),
        }
    }

    /// A mutex for statics that are initialized explicitly during bring-up
    pub const fn uninit(value: T) -> Self {
        Self {
            raw: RawMutex::uninit(),
            data: UnsafeCell::new(value),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Mutex<T> {
    pub fn initialize(&self) {
        self.raw.initialize();
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.raw.acquire();
        MutexGuard {
            mutex: self,
            _not_send: PhantomData,
        }
    }

    pub fn try_lock_as(&self, owner: Owner) -> Option<MutexGuard<'_, T>> {
        if self.raw.try_acquire(owner) {
            Some(MutexGuard {
                mutex: self,
                _not_send: PhantomData,
            })
        } else {
            None
        }
    }

    pub fn raw(&self) -> &RawMutex {
        &self.raw
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl<T: Default> Default for Mutex<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// One level of ownership of a [`Mutex`], released on drop
pub struct MutexGuard<'a, T: ?Sized> {
    mutex: &'a Mutex<T>,
    // Ownership belongs to the acquiring core or task.
    _not_send: PhantomData<*const ()>,
}

impl<T: ?Sized> Deref for MutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY:
        // - The guard proves the caller owns the mutex; only shared
        //   references are handed out, so reentrant guards cannot alias
        //   a unique borrow.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T: ?Sized> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        self.mutex.raw.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use std::cell::Cell;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn balanced_acquire_release_leaves_mutex_unowned() {
        testing::install();
        testing::set_task(None);
        let mutex = RawMutex::new();

        for _ in 0..5 {
            mutex.acquire();
        }
        assert_eq!(mutex.depth(), 5);
        assert!(!mutex.try_acquire(Owner::Task(99)));

        for _ in 0..5 {
            mutex.release();
        }
        assert_eq!(mutex.depth(), 0);
        assert_eq!(mutex.owner(), None);
        assert!(mutex.try_acquire(Owner::Task(99)));
    }

    #[test]
    fn recursion_needs_matching_releases() {
        let mutex = RawMutex::new();
        let first = Owner::Task(1);
        let other = Owner::Task(2);

        assert!(mutex.try_acquire(first));
        assert!(mutex.try_acquire(first));
        assert_eq!(mutex.owner(), Some(first));

        mutex.release();
        assert!(!mutex.try_acquire(other));
        mutex.release();
        assert!(mutex.try_acquire(other));
        assert_eq!(mutex.owner(), Some(other));
    }

    #[test]
    fn core_and_task_owners_are_distinct() {
        let mutex = RawMutex::new();
        assert!(mutex.try_acquire(Owner::Core(1)));
        assert!(!mutex.try_acquire(Owner::Task(1)));
        assert!(mutex.try_acquire(Owner::Core(1)));
        assert_eq!(mutex.depth(), 2);
    }

    #[test]
    fn release_of_unheld_mutex_is_ignored() {
        let mutex = RawMutex::new();
        let before = over_releases();
        mutex.release();
        assert_eq!(mutex.depth(), 0);
        assert!(over_releases() > before);
        assert!(mutex.try_acquire(Owner::Core(0)));
        assert_eq!(mutex.depth(), 1);
    }

    #[test]
    #[should_panic(expected = "uninitialized mutex")]
    fn acquire_of_uninitialized_mutex_panics() {
        let mutex = RawMutex::uninit();
        mutex.acquire();
    }

    #[test]
    fn initialize_makes_static_mutex_usable() {
        static LOCK: RawMutex = RawMutex::uninit();
        assert!(!LOCK.is_initialized());
        LOCK.initialize();
        assert!(LOCK.try_acquire(Owner::Core(3)));
        LOCK.release();

        // second initialization only warns
        LOCK.initialize();
        assert!(LOCK.is_initialized());
        assert_eq!(LOCK.depth(), 0);
    }

    #[test]
    fn owner_follows_platform_identity() {
        testing::install();
        testing::set_core(2);
        testing::set_task(None);
        assert_eq!(Owner::current(), Owner::Core(2));

        testing::set_task(Some(17));
        assert_eq!(Owner::current(), Owner::Task(17));

        let mutex = RawMutex::new();
        mutex.acquire();
        assert_eq!(mutex.owner(), Some(Owner::Task(17)));
        mutex.release();

        testing::set_task(None);
        testing::set_core(0);
    }

    #[test]
    fn try_acquire_restores_interrupt_state() {
        testing::install();
        testing::set_interrupts(true);
        let mutex = RawMutex::new();
        assert!(mutex.try_acquire(Owner::Core(0)));
        assert!(platform::current().interrupts_enabled());
        mutex.release();
        assert!(platform::current().interrupts_enabled());
    }

    #[test]
    fn reentrant_guards_share_the_value() {
        let mutex = Mutex::new(Cell::new(1u32));
        let outer = mutex.try_lock_as(Owner::Task(5)).expect("free mutex");
        let inner = mutex.try_lock_as(Owner::Task(5)).expect("same owner");
        inner.set(inner.get() + 1);
        assert_eq!(outer.get(), 2);
        assert!(mutex.try_lock_as(Owner::Task(6)).is_none());
        drop(inner);
        assert!(mutex.try_lock_as(Owner::Task(6)).is_none());
        drop(outer);
        assert!(mutex.try_lock_as(Owner::Task(6)).is_some());
        assert_eq!(mutex.raw().depth(), 0);
    }

    #[test]
    fn tasks_on_different_threads_exclude_each_other() {
        testing::install();
        let counter = Arc::new(Mutex::new(Cell::new(0u64)));

        let workers: Vec<_> = (0..4)
            .map(|tid| {
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    testing::set_task(Some(100 + tid));
                    for _ in 0..1000 {
                        let guard = counter.lock();
                        let value = guard.get();
                        thread::yield_now();
                        guard.set(value + 1);
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert_eq!(counter.lock().get(), 4000);
    }
}
