//! Several cores sharing the descriptor registry and one core's scheduler.
//!
//! Every test thread is a core of its own under the thread platform.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use ember::config::INITIAL_ROUND;
use ember::fs::DescriptorRegistry;
use ember::sched::{CoreScheduler, NeverWake, Task};
use ember_abi::OpenFlags;
use ember_core::testing;

const PID: u32 = 1;

fn flags() -> OpenFlags {
    OpenFlags::empty().with(OpenFlags::READ).with(OpenFlags::WRITE)
}

#[test]
fn cores_create_and_clone_in_one_table() {
    testing::install();
    let registry = Arc::new(DescriptorRegistry::new());
    registry.create_process_info(PID);
    let source = registry.create_descriptor(PID, 1, flags(), None).unwrap();

    let cores: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let mut ids = Vec::new();
                for n in 0..500u64 {
                    ids.push(registry.create_descriptor(PID, n, flags(), None).unwrap().id);
                    ids.push(registry.clone_descriptor(&source, PID, None).unwrap().id);
                }
                ids
            })
        })
        .collect();

    let mut ids: Vec<_> = cores
        .into_iter()
        .flat_map(|core| core.join().unwrap())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 4 * 1000);
    assert_eq!(registry.descriptor_count(PID), Some(4 * 1000 + 1));
}

#[test]
fn clones_are_never_seen_half_built() {
    testing::install();
    let registry = Arc::new(DescriptorRegistry::new());
    registry.create_process_info(PID);
    let opened = registry.create_descriptor(PID, 9, flags(), None).unwrap();
    registry
        .update_descriptor(PID, opened.id, |d| d.offset = 64)
        .unwrap();
    let source = registry.get_descriptor(PID, opened.id).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let observer = {
        let registry = Arc::clone(&registry);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut checked = 0usize;
            while !done.load(Ordering::Acquire) {
                for id in registry.descriptor_ids(PID) {
                    if let Some(descriptor) = registry.get_descriptor(PID, id) {
                        assert_eq!(descriptor.offset, 64, "descriptor {} seen early", id);
                        assert_eq!(descriptor.node, 9);
                        checked += 1;
                    }
                }
            }
            checked
        })
    };

    let cloners: Vec<_> = (0..3)
        .map(|core| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..300 {
                    // one core keeps replacing the same dup2 target
                    let target = if core == 0 { Some(100) } else { None };
                    registry.clone_descriptor(&source, PID, target).unwrap();
                }
            })
        })
        .collect();
    for cloner in cloners {
        cloner.join().unwrap();
    }
    done.store(true, Ordering::Release);

    assert!(observer.join().unwrap() > 0);
    assert_eq!(registry.get_descriptor(PID, 100).unwrap().offset, 64);
    // source, the dup2 slot and the plain dups
    assert_eq!(registry.descriptor_count(PID), Some(1 + 1 + 2 * 300));
}

#[test]
fn schedule_and_dump_race_on_one_core() {
    testing::install();
    let scheduler = Arc::new(CoreScheduler::new(0, Arc::new(Task::new(0, "idle")), None));
    let tasks: Vec<_> = (0..3)
        .map(|i| Arc::new(Task::new(PID, &format!("worker-{}", i))))
        .collect();
    for task in &tasks {
        scheduler.attach(Arc::clone(task));
    }

    let schedulers: Vec<_> = (0..2)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                for _ in 0..1000 {
                    scheduler.schedule(&NeverWake);
                }
            })
        })
        .collect();
    let dumpers: Vec<_> = (0..2)
        .map(|_| {
            let scheduler = Arc::clone(&scheduler);
            thread::spawn(move || {
                for _ in 0..1000 {
                    let dump = scheduler.dump();
                    assert_eq!(dump.entries.len(), 3);
                    assert!(dump.round >= INITIAL_ROUND);
                }
            })
        })
        .collect();
    for worker in schedulers.into_iter().chain(dumpers) {
        worker.join().unwrap();
    }

    // the startup pick is the only decision that is not counted
    let counted: u64 = tasks
        .iter()
        .chain(std::iter::once(&scheduler.idle()))
        .map(|task| task.times_scheduled())
        .sum();
    assert_eq!(counted, 2 * 1000 - 1);
}
