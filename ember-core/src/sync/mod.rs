//! Synchronization primitives

pub mod mutex;

pub use mutex::{over_releases, Mutex, MutexGuard, Owner, RawMutex};
