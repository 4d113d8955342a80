//! Descriptor syscalls
//!
//! The part of the POSIX interface that only touches descriptor tables.
//! Calls that reach the VFS (open, read, write) are dispatched elsewhere.

use ember_abi::{Fd, Pid};

use crate::fs::{DescriptorRegistry, FsError};

/// Syscall numbers (Linux x86_64 ABI compatible)
pub mod numbers {
    pub const SYS_CLOSE: usize = 3;
    pub const SYS_LSEEK: usize = 8;
    pub const SYS_DUP: usize = 32;
    pub const SYS_DUP2: usize = 33;
}

pub mod errno {
    pub const EBADF: isize = 9;
    pub const ESRCH: isize = 3;
    pub const EINVAL: isize = 22;
    pub const ENOSYS: isize = 38;
}

pub const SEEK_SET: usize = 0;
pub const SEEK_CUR: usize = 1;
pub const SEEK_END: usize = 2;

/// Run descriptor syscall `nr` for process `pid`.
/// Returns the result or a negated errno.
pub fn dispatch(
    registry: &DescriptorRegistry,
    pid: Pid,
    nr: usize,
    arg0: usize,
    arg1: usize,
    arg2: usize,
) -> isize {
    let result = match nr {
        numbers::SYS_CLOSE => sys_close(registry, pid, arg0 as Fd),
        numbers::SYS_DUP => sys_dup(registry, pid, arg0 as Fd),
        numbers::SYS_DUP2 => sys_dup2(registry, pid, arg0 as Fd, arg1 as Fd),
        numbers::SYS_LSEEK => sys_lseek(registry, pid, arg0 as Fd, arg1 as i64, arg2),
        _ => Err(errno::ENOSYS),
    };
    match result {
        Ok(value) => value,
        Err(errno) => -errno,
    }
}

fn to_errno(error: FsError) -> isize {
    match error {
        FsError::ProcessNotFound(_) => errno::ESRCH,
        FsError::DescriptorNotFound(..) => errno::EBADF,
    }
}

fn sys_close(registry: &DescriptorRegistry, pid: Pid, fd: Fd) -> Result<isize, isize> {
    match registry.remove_descriptor(pid, fd) {
        Some(_) => Ok(0),
        None => Err(errno::EBADF),
    }
}

fn sys_dup(registry: &DescriptorRegistry, pid: Pid, fd: Fd) -> Result<isize, isize> {
    let source = registry.get_descriptor(pid, fd).ok_or(errno::EBADF)?;
    let copy = registry
        .clone_descriptor(&source, pid, None)
        .map_err(to_errno)?;
    Ok(copy.id as isize)
}

fn sys_dup2(registry: &DescriptorRegistry, pid: Pid, old: Fd, new: Fd) -> Result<isize, isize> {
    if new < 0 {
        return Err(errno::EBADF);
    }
    let source = registry.get_descriptor(pid, old).ok_or(errno::EBADF)?;
    if old == new {
        return Ok(new as isize);
    }
    let copy = registry
        .clone_descriptor(&source, pid, Some(new))
        .map_err(to_errno)?;
    Ok(copy.id as isize)
}

fn sys_lseek(
    registry: &DescriptorRegistry,
    pid: Pid,
    fd: Fd,
    offset: i64,
    whence: usize,
) -> Result<isize, isize> {
    let position = registry
        .update_descriptor(pid, fd, |descriptor| {
            let base = match whence {
                SEEK_SET => 0,
                SEEK_CUR => descriptor.offset,
                // the node size is only known to the VFS
                _ => return Err(errno::EINVAL),
            };
            let target = base.checked_add(offset).filter(|&target| target >= 0);
            match target {
                Some(target) => {
                    descriptor.offset = target;
                    Ok(target)
                }
                None => Err(errno::EINVAL),
            }
        })
        .map_err(to_errno)??;
    Ok(position as isize)
}
