//! Per-process descriptor tables
//!
//! Maps every live process to the file descriptors it holds. A descriptor
//! only records which VFS node it refers to, where it stands in the node
//! and how it was opened; the node itself is owned by the VFS.
//!
//! Lock order: the registry lock, then a process's descriptor counter lock.

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use ember_abi::{fd, Fd, NodeId, OpenFlags, Pid};
use ember_core::Mutex;
use lazy_static::lazy_static;

use crate::fs::FsError;

/// An open file of a process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileDescriptor {
    pub id: Fd,
    pub node: NodeId,
    pub offset: i64,
    pub flags: OpenFlags,
}

/// Descriptor table of one process
struct FsProcess {
    next_descriptor: Mutex<Cell<Fd>>,
    descriptors: BTreeMap<Fd, Box<FileDescriptor>>,
}

impl FsProcess {
    fn new() -> Self {
        Self {
            next_descriptor: Mutex::new(Cell::new(fd::FIRST_FREE)),
            descriptors: BTreeMap::new(),
        }
    }

    /// Next counter value whose slot is free. Slots filled explicitly
    /// (dup2) are skipped rather than overwritten.
    fn allocate_id(&self) -> Fd {
        let next = self.next_descriptor.lock();
        let mut id = next.get();
        while self.descriptors.contains_key(&id) {
            id += 1;
        }
        next.set(id + 1);
        id
    }

    /// Put a record for `node` into the explicit slot or a fresh one
    fn install(
        &mut self,
        explicit: Option<Fd>,
        node: NodeId,
        offset: i64,
        flags: OpenFlags,
    ) -> FileDescriptor {
        let id = match explicit {
            Some(id) => id,
            None => self.allocate_id(),
        };
        let descriptor = FileDescriptor {
            id,
            node,
            offset,
            flags,
        };
        self.descriptors.insert(id, Box::new(descriptor));
        descriptor
    }
}

/// Descriptor tables of all processes
pub struct DescriptorRegistry {
    processes: Mutex<RefCell<BTreeMap<Pid, FsProcess>>>,
}

lazy_static! {
    static ref REGISTRY: DescriptorRegistry = DescriptorRegistry::new();
}

/// The kernel-wide registry
pub fn registry() -> &'static DescriptorRegistry {
    &REGISTRY
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self {
            processes: Mutex::new(RefCell::new(BTreeMap::new())),
        }
    }

    /// Create the descriptor table of a new process.
    ///
    /// Must happen once per process, before any descriptor operation on it.
    pub fn create_process_info(&self, pid: Pid) {
        let replaced = self.with_processes(|processes| processes.insert(pid, FsProcess::new()));
        if replaced.is_some() {
            log::warn!("[fs] descriptor table of process {} created twice", pid);
        }
    }

    pub fn contains_process(&self, pid: Pid) -> bool {
        self.with_processes(|processes| processes.contains_key(&pid))
    }

    /// Open a descriptor on `node` for `pid`.
    ///
    /// The id comes from the process's counter unless `explicit` names the
    /// slot; a descriptor already in that slot is replaced.
    pub fn create_descriptor(
        &self,
        pid: Pid,
        node: NodeId,
        flags: OpenFlags,
        explicit: Option<Fd>,
    ) -> Result<FileDescriptor, FsError> {
        let created = self.with_processes(|processes| {
            let process = processes.get_mut(&pid)?;
            Some(process.install(explicit, node, 0, flags))
        });
        created.ok_or_else(|| missing_process(pid))
    }

    pub fn get_descriptor(&self, pid: Pid, fd: Fd) -> Option<FileDescriptor> {
        self.with_processes(|processes| {
            let process = match processes.get(&pid) {
                Some(process) => process,
                None => {
                    log::debug!("[fs] descriptor lookup in unknown process {}", pid);
                    return None;
                }
            };
            process.descriptors.get(&fd).map(|descriptor| **descriptor)
        })
    }

    /// Modify a descriptor in place, e.g. to move its offset after a read
    pub fn update_descriptor<R>(
        &self,
        pid: Pid,
        fd: Fd,
        f: impl FnOnce(&mut FileDescriptor) -> R,
    ) -> Result<R, FsError> {
        self.with_processes(|processes| {
            let process = processes
                .get_mut(&pid)
                .ok_or(FsError::ProcessNotFound(pid))?;
            let descriptor = process
                .descriptors
                .get_mut(&fd)
                .ok_or(FsError::DescriptorNotFound(pid, fd))?;
            Ok(f(descriptor))
        })
    }

    /// Close one descriptor. Nothing happens if it does not exist.
    pub fn remove_descriptor(&self, pid: Pid, fd: Fd) -> Option<FileDescriptor> {
        self.with_processes(|processes| {
            let process = processes.get_mut(&pid)?;
            process.descriptors.remove(&fd).map(|descriptor| *descriptor)
        })
    }

    /// Free every descriptor of an exiting process.
    ///
    /// The now empty table stays registered; the caller removes it with
    /// [`DescriptorRegistry::remove_process`] once teardown is done.
    pub fn remove_all_for_process(&self, pid: Pid) -> usize {
        let freed = self.with_processes(|processes| match processes.get_mut(&pid) {
            Some(process) => {
                let freed = process.descriptors.len();
                process.descriptors.clear();
                freed
            }
            None => 0,
        });
        log::debug!("[fs] freed {} descriptors of process {}", freed, pid);
        freed
    }

    /// Drop the table of a process whose descriptors were freed
    pub fn remove_process(&self, pid: Pid) -> bool {
        self.with_processes(|processes| match processes.remove(&pid) {
            Some(process) => {
                if !process.descriptors.is_empty() {
                    log::warn!(
                        "[fs] removing process {} with {} open descriptors",
                        pid,
                        process.descriptors.len()
                    );
                }
                true
            }
            None => false,
        })
    }

    /// Install a copy of `source` in `target_pid`.
    ///
    /// With `target_fd` set the copy lands in that slot, replacing whatever
    /// was there (dup2); otherwise it gets the next free id (dup). Node,
    /// flags and offset are copied; the node is not. The copy appears
    /// complete or not at all.
    pub fn clone_descriptor(
        &self,
        source: &FileDescriptor,
        target_pid: Pid,
        target_fd: Option<Fd>,
    ) -> Result<FileDescriptor, FsError> {
        let cloned = self.with_processes(|processes| {
            let process = processes.get_mut(&target_pid)?;
            Some(process.install(target_fd, source.node, source.offset, source.flags))
        });
        cloned.ok_or_else(|| missing_process(target_pid))
    }

    pub fn descriptor_count(&self, pid: Pid) -> Option<usize> {
        self.with_processes(|processes| processes.get(&pid).map(|p| p.descriptors.len()))
    }

    /// Open descriptor ids of `pid` in ascending order
    pub fn descriptor_ids(&self, pid: Pid) -> Vec<Fd> {
        self.with_processes(|processes| match processes.get(&pid) {
            Some(process) => process.descriptors.keys().copied().collect(),
            None => Vec::new(),
        })
    }

    fn with_processes<R>(&self, f: impl FnOnce(&mut BTreeMap<Pid, FsProcess>) -> R) -> R {
        let guard = self.processes.lock();
        let mut processes = guard.borrow_mut();
        f(&mut processes)
    }
}

fn missing_process(pid: Pid) -> FsError {
    log::info!(
        "[fs] tried to create file descriptor in process {} that doesn't exist",
        pid
    );
    FsError::ProcessNotFound(pid)
}

impl Default for DescriptorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
