//! x86_64 interrupt control

use ::x86_64::instructions::{self, interrupts};

pub fn interrupts_enabled() -> bool {
    interrupts::are_enabled()
}

pub fn disable_interrupts() {
    interrupts::disable();
}

pub fn enable_interrupts() {
    interrupts::enable();
}

pub fn halt() {
    instructions::hlt();
}
