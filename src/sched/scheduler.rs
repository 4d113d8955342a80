//! Round-robin scheduler of one physical core
//!
//! Every core owns a run list of schedule entries and picks its next task
//! on each timer tick or yield. Fairness is enforced with rounds: an entry
//! is stamped with the core's round when it is offered a slot, and stamped
//! entries are skipped until a full sweep finds nothing eligible. Then the
//! idle task runs and the round advances, which makes every entry eligible
//! again.
//!
//! The scheduling pass runs to completion without blocking. Its lock is
//! taken with interrupts masked, so contention (only possible from another
//! core) busy-waits instead of yielding.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use ember_abi::{Pid, Tid};
use ember_core::{InterruptGuard, Mutex};

use crate::config::INITIAL_ROUND;
use crate::sched::task::{Task, TaskStatus, NO_TASK};
use crate::sched::wait::WakeCondition;

/// Per-task bookkeeping in a core's run list
#[derive(Debug)]
pub struct ScheduleEntry {
    task: Arc<Task>,
    scheduler_round: u64,
}

impl ScheduleEntry {
    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    /// Last round this entry was offered a slot in, 0 if never
    pub fn scheduler_round(&self) -> u64 {
        self.scheduler_round
    }
}

/// Fresh entry for a task joining a run list
pub fn prepare_entry(task: Arc<Task>) -> ScheduleEntry {
    ScheduleEntry {
        task,
        scheduler_round: 0,
    }
}

struct SchedulingState {
    /// Link order: the entry after index `i` is `(i + 1) % len`
    entries: Vec<ScheduleEntry>,
    current: Option<Arc<Task>>,
    idle: Arc<Task>,
    round: u64,
    schedules: u64,
}

impl SchedulingState {
    /// Where the search for the next task begins: right after the current
    /// task, or the list head if the idle task ran or the current task has
    /// left the list
    fn start_index(&self) -> usize {
        let current = match &self.current {
            Some(current) => current,
            None => return 0,
        };
        if Arc::ptr_eq(current, &self.idle) {
            return 0;
        }
        match self
            .entries
            .iter()
            .position(|entry| entry.task.id() == current.id())
        {
            Some(index) => (index + 1) % self.entries.len(),
            None => 0,
        }
    }

    fn next_eligible(&mut self, waker: &dyn WakeCondition) -> Option<Arc<Task>> {
        let count = self.entries.len();
        if count == 0 {
            return None;
        }

        let start = self.start_index();
        let round = self.round;

        for offset in 0..count {
            let entry = &mut self.entries[(start + offset) % count];
            if entry.scheduler_round == round {
                continue;
            }
            entry.scheduler_round = round;

            match entry.task.status() {
                TaskStatus::Running => return Some(Arc::clone(&entry.task)),
                TaskStatus::Waiting if waker.can_wake(&entry.task) => {
                    return Some(Arc::clone(&entry.task))
                }
                _ => {}
            }
        }
        None
    }
}

/// Scheduler state of one physical core
pub struct CoreScheduler {
    core: u32,
    state: Mutex<RefCell<SchedulingState>>,
    /// Mirror of the current task id, readable without the lock;
    /// `NO_TASK` until the first schedule
    running: AtomicU32,
    dump_interval: Option<u64>,
}

impl CoreScheduler {
    pub fn new(core: u32, idle: Arc<Task>, dump_interval: Option<u64>) -> Self {
        Self {
            core,
            state: Mutex::new(RefCell::new(SchedulingState {
                entries: Vec::new(),
                current: None,
                idle,
                round: INITIAL_ROUND,
                schedules: 0,
            })),
            running: AtomicU32::new(NO_TASK),
            dump_interval,
        }
    }

    pub fn core(&self) -> u32 {
        self.core
    }

    /// Append `task` to the run list
    pub fn attach(&self, task: Arc<Task>) {
        log::debug!(
            "[sched] core {}: attaching task {} ({}) of process {}",
            self.core,
            task.id(),
            task.name(),
            task.process()
        );
        let entry = prepare_entry(task);
        self.with_state(|state| state.entries.push(entry));
    }

    /// Take a task out of the run list
    pub fn remove(&self, tid: Tid) -> Option<Arc<Task>> {
        self.with_state(|state| {
            let index = state.entries.iter().position(|e| e.task.id() == tid)?;
            Some(state.entries.remove(index).task)
        })
    }

    /// Remove every dead task from the run list
    pub fn reap(&self) -> Vec<Arc<Task>> {
        let reaped = self.with_state(|state| {
            let mut reaped = Vec::new();
            state.entries.retain(|entry| {
                if entry.task.is_dead() {
                    reaped.push(Arc::clone(&entry.task));
                    false
                } else {
                    true
                }
            });
            reaped
        });
        if !reaped.is_empty() {
            log::debug!("[sched] core {}: reaped {} tasks", self.core, reaped.len());
        }
        reaped
    }

    /// Pick the task to run next and make it current.
    ///
    /// The first call picks the head of the run list. Later calls search
    /// from the entry after the current one; see the module documentation
    /// for the fairness rules.
    pub fn schedule(&self, waker: &dyn WakeCondition) -> Arc<Task> {
        let (selected, dump_due) = self.with_state(|state| {
            if state.current.is_none() {
                if let Some(first) = state.entries.first() {
                    let task = Arc::clone(&first.task);
                    state.current = Some(Arc::clone(&task));
                    self.running.store(task.id(), Ordering::Release);
                    return (task, false);
                }
            }

            let selected = match state.next_eligible(waker) {
                Some(task) => task,
                None => {
                    state.round += 1;
                    Arc::clone(&state.idle)
                }
            };

            selected.record_scheduled();
            state.current = Some(Arc::clone(&selected));
            state.schedules += 1;
            self.running.store(selected.id(), Ordering::Release);

            let dump_due = match self.dump_interval {
                Some(interval) if interval > 0 => state.schedules % interval == 0,
                _ => false,
            };
            (selected, dump_due)
        });

        if dump_due {
            self.log_dump();
        }
        selected
    }

    pub fn current(&self) -> Option<Arc<Task>> {
        self.with_state(|state| state.current.clone())
    }

    /// Id of the current task without taking the core lock
    pub fn current_tid(&self) -> Option<Tid> {
        match self.running.load(Ordering::Acquire) {
            NO_TASK => None,
            tid => Some(tid),
        }
    }

    pub fn idle(&self) -> Arc<Task> {
        self.with_state(|state| Arc::clone(&state.idle))
    }

    pub fn round(&self) -> u64 {
        self.with_state(|state| state.round)
    }

    pub fn task_count(&self) -> usize {
        self.with_state(|state| state.entries.len())
    }

    /// Tasks in run-list order
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.with_state(|state| state.entries.iter().map(|e| Arc::clone(&e.task)).collect())
    }

    pub fn find(&self, tid: Tid) -> Option<Arc<Task>> {
        self.with_state(|state| {
            state
                .entries
                .iter()
                .find(|e| e.task.id() == tid)
                .map(|e| Arc::clone(&e.task))
        })
    }

    /// Snapshot of the run list. Dead tasks are left out.
    pub fn dump(&self) -> SchedulerDump {
        self.with_state(|state| SchedulerDump {
            core: self.core,
            round: state.round,
            current: state.current.as_ref().map(|task| task.id()),
            entries: state
                .entries
                .iter()
                .filter(|entry| !entry.task.is_dead())
                .map(|entry| TaskSnapshot::of(&entry.task, Some(entry.scheduler_round)))
                .collect(),
            idle: TaskSnapshot::of(&state.idle, None),
        })
    }

    pub fn log_dump(&self) {
        let dump = self.dump();
        log::info!("[sched] dump @{} (round: {})", dump.core, dump.round);
        for entry in dump.entries.iter().chain(core::iter::once(&dump.idle)) {
            log::info!("[sched]   {}", entry);
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SchedulingState) -> R) -> R {
        let _interrupts = InterruptGuard::new();
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        f(&mut state)
    }
}

/// One task line of a [`SchedulerDump`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub pid: Pid,
    pub tid: Tid,
    pub name: String,
    pub status: TaskStatus,
    pub times_scheduled: u64,
    pub times_yielded: u64,
    /// `None` for the idle task, which has no schedule entry
    pub round: Option<u64>,
}

impl TaskSnapshot {
    fn of(task: &Task, round: Option<u64>) -> Self {
        Self {
            pid: task.process(),
            tid: task.id(),
            name: String::from(task.name()),
            status: task.status(),
            times_scheduled: task.times_scheduled(),
            times_yielded: task.times_yielded(),
            round,
        }
    }

    pub fn run_time(&self) -> u64 {
        self.times_scheduled.saturating_sub(self.times_yielded)
    }
}

impl fmt::Display for TaskSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "p: {}, t: {} ({}), {}, tSch: {}, tYld: {}, time: {}",
            self.pid,
            self.tid,
            self.name,
            self.status,
            self.times_scheduled,
            self.times_yielded,
            self.run_time()
        )?;
        if let Some(round) = self.round {
            write!(f, ", round: {}", round)?;
        }
        Ok(())
    }
}

/// Human-readable state of one core's scheduler
#[derive(Debug, Clone)]
pub struct SchedulerDump {
    pub core: u32,
    pub round: u64,
    pub current: Option<Tid>,
    pub entries: Vec<TaskSnapshot>,
    pub idle: TaskSnapshot,
}

impl fmt::Display for SchedulerDump {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "dump @{} (round: {})", self.core, self.round)?;
        for entry in &self.entries {
            writeln!(f, "  {}", entry)?;
        }
        writeln!(f, "  {}", self.idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sched::wait::{NeverWake, WaitManager, WaitReason};

    fn core_with(tasks: usize) -> (CoreScheduler, Vec<Arc<Task>>) {
        let scheduler = CoreScheduler::new(0, Arc::new(Task::new(0, "idle")), None);
        let tasks: Vec<_> = (0..tasks)
            .map(|_| Arc::new(Task::new(1, "worker")))
            .collect();
        for task in &tasks {
            scheduler.attach(Arc::clone(task));
        }
        (scheduler, tasks)
    }

    #[test]
    fn first_schedule_picks_list_head() {
        let (scheduler, tasks) = core_with(3);
        assert_eq!(scheduler.current_tid(), None);
        let first = scheduler.schedule(&NeverWake);
        assert_eq!(first.id(), tasks[0].id());
        assert_eq!(scheduler.current_tid(), Some(tasks[0].id()));
        assert_eq!(first.times_scheduled(), 0);
    }

    #[test]
    fn running_tasks_are_served_once_per_round() {
        let (scheduler, tasks) = core_with(3);
        let order: Vec<Tid> = (0..4).map(|_| scheduler.schedule(&NeverWake).id()).collect();
        assert_eq!(
            order,
            [tasks[0].id(), tasks[1].id(), tasks[2].id(), tasks[0].id()]
        );

        // everyone has had a slot this round
        let idle = scheduler.schedule(&NeverWake);
        assert_eq!(idle.id(), scheduler.idle().id());
        assert_eq!(scheduler.round(), INITIAL_ROUND + 1);

        // new round starts at the head again
        assert_eq!(scheduler.schedule(&NeverWake).id(), tasks[0].id());
    }

    #[test]
    fn idle_runs_and_round_advances_per_sweep_when_all_wait() {
        let (scheduler, tasks) = core_with(2);
        // startup always hands the core to the list head
        assert_eq!(scheduler.schedule(&NeverWake).id(), tasks[0].id());
        for task in &tasks {
            task.set_status(TaskStatus::Waiting);
        }
        let idle_id = scheduler.idle().id();

        for sweep in 1..=3 {
            assert_eq!(scheduler.schedule(&NeverWake).id(), idle_id);
            assert_eq!(scheduler.round(), INITIAL_ROUND + sweep);
        }
        assert_eq!(scheduler.idle().times_scheduled(), 3);
    }

    #[test]
    fn waiting_task_runs_once_woken() {
        let (scheduler, tasks) = core_with(2);
        let waits = WaitManager::new();
        scheduler.schedule(&waits);

        waits.wait(&tasks[1], WaitReason::Sleep { until: 1 });
        assert_eq!(scheduler.schedule(&waits).id(), tasks[0].id());

        waits.tick();
        let idle_id = scheduler.idle().id();
        // tasks[1] was offered its slot this round while still asleep
        assert_eq!(scheduler.schedule(&waits).id(), idle_id);
        assert_eq!(scheduler.schedule(&waits).id(), tasks[0].id());
        assert_eq!(scheduler.schedule(&waits).id(), tasks[1].id());
        assert_eq!(tasks[1].status(), TaskStatus::Running);
    }

    #[test]
    fn dead_and_unused_tasks_are_skipped() {
        let (scheduler, tasks) = core_with(3);
        tasks[1].set_status(TaskStatus::Dead);
        tasks[2].set_status(TaskStatus::Unused);

        scheduler.schedule(&NeverWake);
        let idle_id = scheduler.idle().id();
        assert_eq!(scheduler.schedule(&NeverWake).id(), tasks[0].id());
        assert_eq!(scheduler.schedule(&NeverWake).id(), idle_id);
    }

    #[test]
    fn removed_current_task_restarts_at_head() {
        let (scheduler, tasks) = core_with(3);
        scheduler.schedule(&NeverWake);
        scheduler.schedule(&NeverWake);
        assert_eq!(scheduler.current_tid(), Some(tasks[1].id()));

        assert!(scheduler.remove(tasks[1].id()).is_some());
        assert_eq!(scheduler.task_count(), 2);
        assert_eq!(scheduler.schedule(&NeverWake).id(), tasks[0].id());
    }

    #[test]
    fn empty_core_runs_idle() {
        let (scheduler, _) = core_with(0);
        let idle = scheduler.schedule(&NeverWake);
        assert_eq!(idle.id(), scheduler.idle().id());
        assert_eq!(scheduler.round(), INITIAL_ROUND + 1);
    }

    #[test]
    fn reap_removes_only_dead_tasks() {
        let (scheduler, tasks) = core_with(3);
        tasks[0].set_status(TaskStatus::Dead);
        tasks[2].set_status(TaskStatus::Dead);
        let reaped: Vec<Tid> = scheduler.reap().iter().map(|t| t.id()).collect();
        assert_eq!(reaped, [tasks[0].id(), tasks[2].id()]);
        assert_eq!(scheduler.tasks().len(), 1);
    }

    #[test]
    fn dump_lists_live_tasks_and_idle() {
        let (scheduler, tasks) = core_with(2);
        tasks[1].set_status(TaskStatus::Dead);
        scheduler.schedule(&NeverWake);
        scheduler.schedule(&NeverWake);

        let dump = scheduler.dump();
        assert_eq!(dump.entries.len(), 1);
        assert_eq!(dump.entries[0].tid, tasks[0].id());
        assert_eq!(dump.idle.name, "idle");

        let text = alloc::format!("{}", dump);
        assert!(text.starts_with("dump @0"));
        assert!(text.contains("worker), running"));
        assert!(!text.contains("dead"));
    }
}
