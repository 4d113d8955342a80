//! ARM64 (AArch64) interrupt control via the DAIF mask bits

use core::arch::asm;

/// DAIF.I, set while IRQs are masked
const DAIF_IRQ: u64 = 1 << 7;

pub fn interrupts_enabled() -> bool {
    let daif: u64;
    unsafe {
        asm!("mrs {}, daif", out(reg) daif, options(nomem, nostack, preserves_flags));
    }
    daif & DAIF_IRQ == 0
}

pub fn disable_interrupts() {
    unsafe {
        asm!("msr daifset, #2", options(nomem, nostack, preserves_flags));
    }
}

pub fn enable_interrupts() {
    unsafe {
        asm!("msr daifclr, #2", options(nomem, nostack, preserves_flags));
    }
}

pub fn halt() {
    unsafe {
        asm!("wfi", options(nomem, nostack, preserves_flags));
    }
}
