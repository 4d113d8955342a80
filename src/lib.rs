//! Ember
//!
//! Preemptive multitasking core of the Ember micro-kernel: per-core
//! round-robin scheduling with wait/wake integration, and the per-process
//! descriptor tables the syscall layer works on. The reentrant kernel
//! mutex guarding all of it lives in `ember-core`.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod fs;
pub mod logging;
pub mod sched;
pub mod syscall;
pub mod tasking;

pub use config::Config;
pub use tasking::{Tasking, TaskingError};
