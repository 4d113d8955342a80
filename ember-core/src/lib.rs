//! Ember Core
//!
//! Kernel abstractions shared by every Ember subsystem: the platform hooks
//! the primitives run on, the reentrant kernel mutex and the freestanding
//! string helpers.

#![cfg_attr(not(any(test, feature = "hosted")), no_std)]

#[cfg(any(test, feature = "hosted"))]
mod hosted;
pub mod platform;
pub mod string;
pub mod sync;

#[cfg(any(test, feature = "testing"))]
#[doc(hidden)]
pub mod testing;

pub use platform::{InterruptGuard, Platform};
pub use sync::{Mutex, MutexGuard, Owner, RawMutex};
