//! Platform hooks
//!
//! The primitives in this crate need a handful of things from the running
//! kernel: the interrupt flag, the identity of the caller and a way to give
//! up the processor. The kernel installs a [`Platform`] once during bring-up;
//! until then a bootstrap platform answers with no task running.
//!
//! On bare metal the bootstrap platform can only tell the boot core apart,
//! so the kernel must install its platform before it starts the other
//! cores. Hosted builds give every thread its own core id instead.

use ember_abi::Tid;
use spin::Once;

/// Services the shared primitives consume from the kernel
pub trait Platform: Sync {
    /// Whether interrupts are enabled on the calling core
    fn interrupts_enabled(&self) -> bool;

    fn disable_interrupts(&self);

    fn enable_interrupts(&self);

    /// Physical id of the calling core
    fn current_core(&self) -> u32;

    /// Task running on the calling core, `None` until multitasking is active
    fn current_task(&self) -> Option<Tid>;

    /// Give up the processor to another task
    fn yield_now(&self);

    /// Relax the core inside a busy-wait loop
    fn pause(&self) {
        core::hint::spin_loop();
    }
}

/// Answers for the boot core (or host thread) before the kernel installs
/// its platform
struct Bootstrap;

impl Platform for Bootstrap {
    fn interrupts_enabled(&self) -> bool {
        false
    }

    fn disable_interrupts(&self) {}

    fn enable_interrupts(&self) {}

    #[cfg(any(test, feature = "hosted"))]
    fn current_core(&self) -> u32 {
        crate::hosted::thread_core()
    }

    #[cfg(not(any(test, feature = "hosted")))]
    fn current_core(&self) -> u32 {
        0
    }

    fn current_task(&self) -> Option<Tid> {
        None
    }

    fn yield_now(&self) {
        core::hint::spin_loop();
    }
}

static BOOTSTRAP: Bootstrap = Bootstrap;
static PLATFORM: Once<&'static dyn Platform> = Once::new();

/// Install the kernel platform. Only the first call has an effect.
pub fn install(platform: &'static dyn Platform) -> bool {
    let mut installed = false;
    PLATFORM.call_once(|| {
        installed = true;
        platform
    });
    if !installed {
        log::debug!("[platform] platform already installed");
    }
    installed
}

/// The installed platform, or the bootstrap one
pub fn current() -> &'static dyn Platform {
    match PLATFORM.get() {
        Some(platform) => *platform,
        None => &BOOTSTRAP,
    }
}

/// Scoped interrupt masking.
///
/// Disables interrupts on construction if they were enabled and restores
/// the previous state when dropped; never enables interrupts that were off.
pub struct InterruptGuard {
    were_enabled: bool,
}

impl InterruptGuard {
    pub fn new() -> Self {
        let platform = current();
        let were_enabled = platform.interrupts_enabled();
        if were_enabled {
            platform.disable_interrupts();
        }
        Self { were_enabled }
    }

    pub fn were_enabled(&self) -> bool {
        self.were_enabled
    }
}

impl Default for InterruptGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            current().enable_interrupts();
        }
    }
}
