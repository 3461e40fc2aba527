//! The runtime-context object every entry point operates against.
//!
//! §9 of the design calls out the source's reliance on process-wide globals
//! (object tables, the scheduler-lock owner token) and asks for them to be
//! modelled as an explicit context passed to every API, with a thread-local
//! used only for ergonomics (recovering "the calling task" without having to
//! thread a `TaskId` through every call). `Kernel` is that context: one
//! instance owns one set of object tables and one scheduler lock, and
//! nothing here is actually global — tests freely construct independent
//! `Kernel`s.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rkernel_abi::Name;

use crate::diag::DiagRings;
use crate::partition::PartitionState;
use crate::queue::FixedQueueState;
use crate::sched_lock::SchedLock;
use crate::sem::SemState;
use crate::task::TaskDescriptor;
use crate::vqueue::VarQueueState;

/// Anything with a lookup name, so `ObjectTable::ident` can be written once.
pub(crate) trait Named {
    fn name(&self) -> Name;
}

/// A generic object table: id allocation, insertion, lookup, and name-based
/// `*_ident`. Shared by every object family except tasks' thread-local
/// ergonomics, which live in `task.rs`.
pub(crate) struct ObjectTable<T> {
    next_id: Mutex<u32>,
    objects: Mutex<BTreeMap<u32, Arc<T>>>,
}

impl<T: Named> ObjectTable<T> {
    pub(crate) fn new(first_id: u32) -> Self {
        ObjectTable {
            next_id: Mutex::new(first_id),
            objects: Mutex::new(BTreeMap::new()),
        }
    }

    /// Allocates the next id and inserts `make(id)`'s result under it.
    /// Returns `None` if the id space is exhausted (`object-table-full`).
    pub(crate) fn insert(&self, make: impl FnOnce(u32) -> T) -> Option<(u32, Arc<T>)> {
        let mut next_id = self.next_id.lock().unwrap();
        let id = *next_id;
        let next = next_id.checked_add(1)?;
        let obj = Arc::new(make(id));
        self.objects.lock().unwrap().insert(id, obj.clone());
        *next_id = next;
        Some((id, obj))
    }

    pub(crate) fn get(&self, id: u32) -> Option<Arc<T>> {
        self.objects.lock().unwrap().get(&id).cloned()
    }

    pub(crate) fn remove(&self, id: u32) -> Option<Arc<T>> {
        self.objects.lock().unwrap().remove(&id)
    }

    /// Linear scan in id order, mirroring the source's singly-linked
    /// global-list lookup.
    pub(crate) fn ident(&self, name: Name) -> Option<u32> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .find(|(_, obj)| obj.name() == name)
            .map(|(id, _)| *id)
    }
}

struct KernelInner {
    pub(crate) tasks: ObjectTable<TaskDescriptor>,
    pub(crate) queues: ObjectTable<FixedQueueState>,
    pub(crate) vqueues: ObjectTable<VarQueueState>,
    pub(crate) sems: ObjectTable<SemState>,
    pub(crate) parts: ObjectTable<PartitionState>,
    pub(crate) sched_lock: SchedLock,
    pub(crate) diag: DiagRings,
}

/// The whole emulated kernel: one set of object tables plus the scheduler
/// lock. Cheaply `Clone`able (an `Arc` underneath) so every spawned task
/// thread can hold its own handle to the same kernel.
#[derive(Clone)]
pub struct Kernel(Arc<KernelInner>);

impl Kernel {
    pub fn new() -> Self {
        Kernel(Arc::new(KernelInner {
            // Tasks and every other family except variable-length queues
            // start numbering at 1; that family starts at 0. Preserved from
            // the source API (see §9, "observed ambiguities").
            tasks: ObjectTable::new(1),
            queues: ObjectTable::new(1),
            vqueues: ObjectTable::new(0),
            sems: ObjectTable::new(1),
            parts: ObjectTable::new(1),
            sched_lock: SchedLock::new(),
            diag: DiagRings::new(),
        }))
    }

    pub(crate) fn tasks(&self) -> &ObjectTable<TaskDescriptor> {
        &self.0.tasks
    }

    pub(crate) fn queues(&self) -> &ObjectTable<FixedQueueState> {
        &self.0.queues
    }

    pub(crate) fn vqueues(&self) -> &ObjectTable<VarQueueState> {
        &self.0.vqueues
    }

    pub(crate) fn sems(&self) -> &ObjectTable<SemState> {
        &self.0.sems
    }

    pub(crate) fn parts(&self) -> &ObjectTable<PartitionState> {
        &self.0.parts
    }

    pub(crate) fn sched_lock(&self) -> &SchedLock {
        &self.0.sched_lock
    }

    pub(crate) fn diag(&self) -> &DiagRings {
        &self.0.diag
    }

    /// Recent object-lifecycle events, oldest first. Not required for
    /// correctness — a convenience for tests and the `demos` programs (§10).
    pub fn diagnostics(&self) -> Vec<crate::diag::Event> {
        self.0.diag.recent()
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}
