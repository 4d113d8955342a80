//! Task Scheduling

pub mod scheduler; // Per-core round-robin scheduler
pub mod task;      // Task control block
pub mod wait;      // Wait/wake coordination

pub use scheduler::{prepare_entry, CoreScheduler, ScheduleEntry, SchedulerDump, TaskSnapshot};
pub use task::{Task, TaskStatus};
pub use wait::{NeverWake, WaitManager, WaitReason, WakeCondition};
