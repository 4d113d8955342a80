//! Task Definition
//!
//! Only the parts of a task control block the scheduler and the wait/wake
//! coordinator touch. Stacks, register state and address spaces belong to
//! the context-switch and memory layers.

use core::fmt;
use core::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

use ember_abi::{Pid, Tid};
use ember_core::string;

/// Bytes reserved for a task name, terminator included
pub const TASK_NAME_LEN: usize = 32;

/// Task State
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskStatus {
    /// Eligible to be picked by the scheduler
    Running = 0,
    /// Only eligible once the wait/wake coordinator lets it resume
    Waiting = 1,
    Dead = 2,
    Unused = 3,
}

impl TaskStatus {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => TaskStatus::Running,
            1 => TaskStatus::Waiting,
            2 => TaskStatus::Dead,
            _ => TaskStatus::Unused,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Waiting => "waiting",
            TaskStatus::Dead => "dead",
            TaskStatus::Unused => "unused",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scheduling view of a task, shared between its core's run list, the
/// wait/wake coordinator and whoever spawned it
pub struct Task {
    id: Tid,
    process: Pid,
    name: [u8; TASK_NAME_LEN],
    status: AtomicU8,
    times_scheduled: AtomicU64,
    times_yielded: AtomicU64,
}

/// Never a task id; marks "no task" in lock-free per-core bookkeeping
pub const NO_TASK: Tid = 0;

static NEXT_TID: AtomicU32 = AtomicU32::new(1);

/// Take the next id from `counter`, stepping over [`NO_TASK`] when the
/// counter wraps
fn allocate_tid(counter: &AtomicU32) -> Tid {
    loop {
        let id = counter.fetch_add(1, Ordering::Relaxed);
        if id != NO_TASK {
            return id;
        }
    }
}

impl Task {
    pub fn new(process: Pid, name: &str) -> Self {
        let id = allocate_tid(&NEXT_TID);
        let mut buffer = [0u8; TASK_NAME_LEN];
        string::copy(&mut buffer, name.as_bytes());

        Self {
            id,
            process,
            name: buffer,
            status: AtomicU8::new(TaskStatus::Running as u8),
            times_scheduled: AtomicU64::new(0),
            times_yielded: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> Tid {
        self.id
    }

    pub fn process(&self) -> Pid {
        self.process
    }

    pub fn name(&self) -> &str {
        string::as_str(&self.name)
    }

    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_raw(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: TaskStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; fails if the task is no longer in `from`
    pub fn transition(&self, from: TaskStatus, to: TaskStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_dead(&self) -> bool {
        self.status() == TaskStatus::Dead
    }

    pub fn times_scheduled(&self) -> u64 {
        self.times_scheduled.load(Ordering::Relaxed)
    }

    pub fn times_yielded(&self) -> u64 {
        self.times_yielded.load(Ordering::Relaxed)
    }

    /// Slots the task actually ran to completion instead of yielding early
    pub fn run_time(&self) -> u64 {
        self.times_scheduled().saturating_sub(self.times_yielded())
    }

    pub(crate) fn record_scheduled(&self) {
        self.times_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_yield(&self) {
        self.times_yielded.fetch_add(1, Ordering::Relaxed);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("process", &self.process)
            .field("name", &self.name())
            .field("status", &self.status())
            .finish()
    }
}
