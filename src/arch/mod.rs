//! Architecture Support
//!
//! Interrupt control per target plus [`KernelPlatform`], the glue that
//! lets the shared primitives ask the tasking service who is running.

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod x86_64;
#[cfg(all(target_arch = "x86_64", target_os = "none"))]
use self::x86_64 as cpu;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod aarch64;
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
use self::aarch64 as cpu;

#[cfg(not(target_os = "none"))]
mod hosted;
#[cfg(not(target_os = "none"))]
use self::hosted as cpu;

use ember_abi::Tid;
use ember_core::Platform;

use crate::tasking;

/// Interrupt flag of the calling core
pub mod interrupts {
    use super::cpu;

    pub fn are_enabled() -> bool {
        cpu::interrupts_enabled()
    }

    pub fn disable() {
        cpu::disable_interrupts();
    }

    pub fn enable() {
        cpu::enable_interrupts();
    }
}

/// Stop the core until the next interrupt
pub fn halt() {
    cpu::halt();
}

/// Platform backed by the running kernel.
///
/// Core identification and the actual context switch on yield belong to
/// the bring-up and interrupt layers, which hand them in as functions.
pub struct KernelPlatform {
    core_id: fn() -> u32,
    yield_cpu: fn(),
}

impl KernelPlatform {
    pub const fn new(core_id: fn() -> u32, yield_cpu: fn()) -> Self {
        Self { core_id, yield_cpu }
    }
}

impl Platform for KernelPlatform {
    fn interrupts_enabled(&self) -> bool {
        interrupts::are_enabled()
    }

    fn disable_interrupts(&self) {
        interrupts::disable();
    }

    fn enable_interrupts(&self) {
        interrupts::enable();
    }

    fn current_core(&self) -> u32 {
        (self.core_id)()
    }

    // Lock-free: the kernel mutex asks this while acquiring the core lock.
    fn current_task(&self) -> Option<Tid> {
        tasking::try_get()?.current_tid(self.current_core())
    }

    fn yield_now(&self) {
        (self.yield_cpu)();
    }
}
