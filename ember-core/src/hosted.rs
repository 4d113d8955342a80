//! Core identities for hosted builds
//!
//! Host threads run truly in parallel, so each one is treated as a core of
//! its own. Ids are handed out in the order threads first ask; the first
//! thread is core 0.

use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_CORE: AtomicU32 = AtomicU32::new(0);

thread_local! {
    static CORE: u32 = NEXT_CORE.fetch_add(1, Ordering::Relaxed);
}

/// Core id of the calling thread
pub fn thread_core() -> u32 {
    CORE.with(|core| *core)
}
