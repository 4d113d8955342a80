//! Ember ABI
//!
//! Identifiers and constants shared between the kernel and userspace.

#![no_std]

/// Process ID
pub type Pid = u32;

/// Task (thread) ID
pub type Tid = u32;

/// File descriptor number, unique within one process
pub type Fd = i32;

/// Opaque handle of a node in the virtual filesystem
pub type NodeId = u64;

/// Standard descriptors, reserved in every process
pub mod fd {
    use super::Fd;

    pub const STDIN: Fd = 0;
    pub const STDOUT: Fd = 1;
    pub const STDERR: Fd = 2;

    /// First id handed out by implicit descriptor allocation
    pub const FIRST_FREE: Fd = 3;
}

/// Open-mode flags of a file descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpenFlags(pub u32);

impl OpenFlags {
    pub const READ: u32 = 1 << 0;
    pub const WRITE: u32 = 1 << 1;
    pub const APPEND: u32 = 1 << 2;
    pub const CREATE: u32 = 1 << 3;
    pub const TRUNCATE: u32 = 1 << 4;
    pub const EXCLUSIVE: u32 = 1 << 5;

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    pub const fn with(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }
}
