//! Hosted builds (tests, simulators): a software interrupt flag

use core::sync::atomic::{AtomicBool, Ordering};

static ENABLED: AtomicBool = AtomicBool::new(true);

pub fn interrupts_enabled() -> bool {
    ENABLED.load(Ordering::Acquire)
}

pub fn disable_interrupts() {
    ENABLED.store(false, Ordering::Release);
}

pub fn enable_interrupts() {
    ENABLED.store(true, Ordering::Release);
}

pub fn halt() {
    core::hint::spin_loop();
}
