//! Tasking service
//!
//! Owns one scheduler per physical core, the wait/wake coordinator and the
//! link to the descriptor registry. The kernel creates it once with
//! [`init`] and reaches it through [`get`] afterwards.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use ember_abi::{Pid, Tid};
use spin::Once;

use crate::config::Config;
use crate::fs::{self, DescriptorRegistry};
use crate::sched::{CoreScheduler, SchedulerDump, Task, TaskStatus, WaitManager, WaitReason};

/// Tasking errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskingError {
    CoreOutOfRange(u32),
    ProcessNotFound(Pid),
    TaskNotFound(Tid),
    /// The core has not scheduled anything yet, or runs its idle task
    NoCurrentTask(u32),
}

impl fmt::Display for TaskingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskingError::CoreOutOfRange(core) => write!(f, "core {} is not managed", core),
            TaskingError::ProcessNotFound(pid) => write!(f, "process {} does not exist", pid),
            TaskingError::TaskNotFound(tid) => write!(f, "task {} does not exist", tid),
            TaskingError::NoCurrentTask(core) => write!(f, "core {} has no current task", core),
        }
    }
}

// Shared by every service instance so pids stay unique in the global
// descriptor registry.
static NEXT_PID: AtomicU32 = AtomicU32::new(1);

pub struct Tasking {
    cores: Vec<CoreScheduler>,
    waits: WaitManager,
    descriptors: &'static DescriptorRegistry,
    kernel_process: Pid,
}

impl Tasking {
    pub fn new(config: Config, descriptors: &'static DescriptorRegistry) -> Self {
        let kernel_process = NEXT_PID.fetch_add(1, Ordering::Relaxed);
        descriptors.create_process_info(kernel_process);

        let cores = (0..config.core_count() as u32)
            .map(|core| {
                let idle = Arc::new(Task::new(kernel_process, "idle"));
                CoreScheduler::new(core, idle, config.dump_interval)
            })
            .collect::<Vec<_>>();

        log::info!(
            "[tasking] {} cores, kernel process {}",
            cores.len(),
            kernel_process
        );

        Self {
            cores,
            waits: WaitManager::new(),
            descriptors,
            kernel_process,
        }
    }

    pub fn core(&self, core: u32) -> Result<&CoreScheduler, TaskingError> {
        self.cores
            .get(core as usize)
            .ok_or(TaskingError::CoreOutOfRange(core))
    }

    pub fn core_count(&self) -> usize {
        self.cores.len()
    }

    /// Process the idle tasks belong to
    pub fn kernel_process(&self) -> Pid {
        self.kernel_process
    }

    pub fn waits(&self) -> &WaitManager {
        &self.waits
    }

    pub fn descriptors(&self) -> &'static DescriptorRegistry {
        self.descriptors
    }

    /// Register a new process and its descriptor table
    pub fn create_process(&self) -> Pid {
        let pid = NEXT_PID.fetch_add(1, Ordering::Relaxed);
        self.descriptors.create_process_info(pid);
        log::debug!("[tasking] created process {}", pid);
        pid
    }

    /// Create a task of `process` and attach it to `core`
    pub fn spawn(&self, core: u32, process: Pid, name: &str) -> Result<Arc<Task>, TaskingError> {
        let scheduler = self.core(core)?;
        if !self.descriptors.contains_process(process) {
            return Err(TaskingError::ProcessNotFound(process));
        }

        let task = Arc::new(Task::new(process, name));
        scheduler.attach(Arc::clone(&task));
        Ok(task)
    }

    /// Scheduling entry point for the timer interrupt
    pub fn schedule(&self, core: u32) -> Result<Arc<Task>, TaskingError> {
        Ok(self.core(core)?.schedule(&self.waits))
    }

    /// The current task gives up the rest of its slot
    pub fn yield_now(&self, core: u32) -> Result<Arc<Task>, TaskingError> {
        let scheduler = self.core(core)?;
        if let Some(current) = scheduler.current() {
            current.record_yield();
        }
        Ok(scheduler.schedule(&self.waits))
    }

    /// Park the current task of `core` until `reason` holds, then pick
    /// the next task
    pub fn wait(&self, core: u32, reason: WaitReason) -> Result<Arc<Task>, TaskingError> {
        let scheduler = self.core(core)?;
        let current = scheduler
            .current()
            .filter(|task| task.id() != scheduler.idle().id())
            .ok_or(TaskingError::NoCurrentTask(core))?;

        self.waits.wait(&current, reason);
        self.yield_now(core)
    }

    /// Put the current task of `core` to sleep for `ticks` timer ticks
    pub fn sleep(&self, core: u32, ticks: u64) -> Result<Arc<Task>, TaskingError> {
        let until = self.waits.now() + ticks;
        self.wait(core, WaitReason::Sleep { until })
    }

    /// Advance the sleep clock by one tick
    pub fn tick(&self) -> u64 {
        self.waits.tick()
    }

    pub fn current_task(&self, core: u32) -> Result<Option<Arc<Task>>, TaskingError> {
        Ok(self.core(core)?.current())
    }

    /// Current task id of `core` without locking
    pub fn current_tid(&self, core: u32) -> Option<Tid> {
        self.cores.get(core as usize)?.current_tid()
    }

    pub fn find(&self, tid: Tid) -> Option<Arc<Task>> {
        self.cores.iter().find_map(|core| core.find(tid))
    }

    /// Mark a task dead; its core skips it from now on
    pub fn kill(&self, tid: Tid) -> Result<(), TaskingError> {
        let task = self.find(tid).ok_or(TaskingError::TaskNotFound(tid))?;
        task.set_status(TaskStatus::Dead);
        self.waits.cancel(tid);
        log::debug!("[tasking] killed task {}", tid);
        Ok(())
    }

    /// Drop dead tasks from the run list of `core`
    pub fn reap(&self, core: u32) -> Result<Vec<Arc<Task>>, TaskingError> {
        Ok(self.core(core)?.reap())
    }

    /// Tear down a process: its tasks die and its descriptors are freed.
    /// Returns the number of tasks killed.
    pub fn exit_process(&self, pid: Pid) -> Result<usize, TaskingError> {
        if !self.descriptors.contains_process(pid) {
            return Err(TaskingError::ProcessNotFound(pid));
        }

        let mut killed = 0;
        for core in &self.cores {
            for task in core.tasks().iter().filter(|t| t.process() == pid) {
                if !task.is_dead() {
                    task.set_status(TaskStatus::Dead);
                    killed += 1;
                }
                self.waits.cancel(task.id());
            }
        }

        let freed = self.descriptors.remove_all_for_process(pid);
        self.descriptors.remove_process(pid);
        log::info!(
            "[tasking] process {} exited ({} tasks, {} descriptors)",
            pid,
            killed,
            freed
        );
        Ok(killed)
    }

    pub fn dump(&self, core: u32) -> Result<SchedulerDump, TaskingError> {
        Ok(self.core(core)?.dump())
    }
}

static TASKING: Once<Tasking> = Once::new();

/// Bring up the tasking service. Later calls return the first instance.
pub fn init(config: Config) -> &'static Tasking {
    TASKING.call_once(|| Tasking::new(config, fs::registry()))
}

/// The tasking service; using it before [`init`] is a kernel bug
pub fn get() -> &'static Tasking {
    match TASKING.get() {
        Some(tasking) => tasking,
        None => panic!("[tasking] used before initialization"),
    }
}

pub fn try_get() -> Option<&'static Tasking> {
    TASKING.get()
}
