//! Filesystem bookkeeping
//!
//! The VFS itself lives outside the tasking core; this layer only records
//! which descriptors each process holds.

pub mod process; // Per-process descriptor tables

use core::fmt;

use ember_abi::{Fd, Pid};

pub use process::{registry, DescriptorRegistry, FileDescriptor};

/// Descriptor table errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No descriptor table was created for the process
    ProcessNotFound(Pid),
    DescriptorNotFound(Pid, Fd),
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FsError::ProcessNotFound(pid) => write!(f, "process {} has no descriptor table", pid),
            FsError::DescriptorNotFound(pid, fd) => {
                write!(f, "process {} has no descriptor {}", pid, fd)
            }
        }
    }
}
