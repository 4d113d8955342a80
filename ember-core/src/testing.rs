//! Thread-backed platform for host tests: every test thread acts as its
//! own core with its own interrupt flag and current task.
//!
//! Threads get distinct core ids unless a test pins one with [`set_core`].

use std::cell::Cell;

use ember_abi::Tid;

use crate::hosted;
use crate::platform::{self, Platform};

thread_local! {
    static CORE: Cell<Option<u32>> = const { Cell::new(None) };
    static TASK: Cell<Option<Tid>> = const { Cell::new(None) };
    static INTERRUPTS: Cell<bool> = const { Cell::new(true) };
}

struct ThreadPlatform;

impl Platform for ThreadPlatform {
    fn interrupts_enabled(&self) -> bool {
        INTERRUPTS.with(Cell::get)
    }

    fn disable_interrupts(&self) {
        INTERRUPTS.with(|flag| flag.set(false));
    }

    fn enable_interrupts(&self) {
        INTERRUPTS.with(|flag| flag.set(true));
    }

    fn current_core(&self) -> u32 {
        CORE.with(Cell::get).unwrap_or_else(hosted::thread_core)
    }

    fn current_task(&self) -> Option<Tid> {
        TASK.with(Cell::get)
    }

    fn yield_now(&self) {
        std::thread::yield_now();
    }
}

static PLATFORM: ThreadPlatform = ThreadPlatform;

/// Install the thread platform; a no-op if it (or another) already is
pub fn install() {
    platform::install(&PLATFORM);
}

/// Pin the core id the calling thread reports
pub fn set_core(core: u32) {
    CORE.with(|c| c.set(Some(core)));
}

pub fn set_task(task: Option<Tid>) {
    TASK.with(|t| t.set(task));
}

pub fn set_interrupts(enabled: bool) {
    INTERRUPTS.with(|flag| flag.set(enabled));
}
