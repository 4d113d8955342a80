//! Wait/Wake Coordination
//!
//! The scheduler asks a [`WakeCondition`] whether a waiting task may run
//! again. [`WaitManager`] is the kernel's coordinator: tasks register why
//! they wait, and the manager wakes them once that condition holds.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ember_abi::Tid;
use ember_core::{InterruptGuard, Mutex};

use crate::sched::task::{Task, TaskStatus};

/// Decides whether a waiting task may resume.
///
/// Called from the scheduling path with the core lock held and interrupts
/// masked; implementations must not block. Returning `true` may transition
/// the task back to [`TaskStatus::Running`].
pub trait WakeCondition: Sync {
    fn can_wake(&self, task: &Task) -> bool;
}

/// Never lets a waiting task resume
pub struct NeverWake;

impl WakeCondition for NeverWake {
    fn can_wake(&self, _task: &Task) -> bool {
        false
    }
}

/// Why a task waits
#[derive(Debug, Clone)]
pub enum WaitReason {
    /// Until the clock reaches `until`
    Sleep { until: u64 },
    /// Until the task dies
    Join(Arc<Task>),
    /// Until someone sets the flag
    Signal(Arc<AtomicBool>),
}

impl WaitReason {
    fn is_satisfied(&self, now: u64) -> bool {
        match self {
            WaitReason::Sleep { until } => now >= *until,
            WaitReason::Join(task) => task.is_dead(),
            WaitReason::Signal(flag) => flag.load(Ordering::Acquire),
        }
    }
}

/// Registered waits plus the tick clock sleeps are measured against
pub struct WaitManager {
    clock: AtomicU64,
    waits: Mutex<RefCell<BTreeMap<Tid, WaitReason>>>,
}

impl WaitManager {
    pub fn new() -> Self {
        Self {
            clock: AtomicU64::new(0),
            waits: Mutex::new(RefCell::new(BTreeMap::new())),
        }
    }

    /// Park `task` until `reason` holds
    pub fn wait(&self, task: &Task, reason: WaitReason) {
        log::trace!("[wait] task {} waits for {:?}", task.id(), reason);
        self.with_waits(|waits| {
            waits.insert(task.id(), reason);
        });
        task.set_status(TaskStatus::Waiting);
    }

    /// Drop the registered wait of `tid`, if any
    pub fn cancel(&self, tid: Tid) -> Option<WaitReason> {
        self.with_waits(|waits| waits.remove(&tid))
    }

    pub fn is_waiting(&self, tid: Tid) -> bool {
        self.with_waits(|waits| waits.contains_key(&tid))
    }

    pub fn pending(&self) -> usize {
        self.with_waits(|waits| waits.len())
    }

    /// Advance the clock by one tick, returning the new time
    pub fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::Acquire)
    }

    // Interrupts stay masked so the scheduling path on this core cannot
    // re-enter while the map is borrowed.
    fn with_waits<R>(&self, f: impl FnOnce(&mut BTreeMap<Tid, WaitReason>) -> R) -> R {
        let _interrupts = InterruptGuard::new();
        let guard = self.waits.lock();
        let mut waits = guard.borrow_mut();
        f(&mut waits)
    }
}

impl Default for WaitManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeCondition for WaitManager {
    fn can_wake(&self, task: &Task) -> bool {
        let now = self.now();
        self.with_waits(|waits| {
            let satisfied = match waits.get(&task.id()) {
                Some(reason) => reason.is_satisfied(now),
                None => false,
            };
            if !satisfied {
                return false;
            }
            waits.remove(&task.id());
            task.transition(TaskStatus::Waiting, TaskStatus::Running)
        })
    }
}
