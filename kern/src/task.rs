//! Tasks: execution contexts bound 1:1 to a host thread (§3, §4.3).
//!
//! Every kernel call in this crate runs *inside* a task thread and resolves
//! "myself" through a thread-local set at thread-start, exactly as §9
//! recommends ("store an opaque per-thread pointer set at thread-start and
//! retrieved at O(1)") instead of the source's linear scan over host-thread
//! ids.
//!
//! Two host-OS limitations shape this module and are recorded here rather
//! than silently worked around:
//!
//! - `std::thread` has no portable "set this thread's OS priority" call, so
//!   priority is purely our own bookkeeping (see [`crate::sched_lock`]) and
//!   never touches real scheduling. The external contract §4.1 asks for —
//!   atomicity between producers and waiters, correct pend-order selection —
//!   does not require real OS priorities, only consistent internal ones.
//! - `std::thread` cannot forcibly suspend or cancel another thread. Suspend
//!   and delete are therefore cooperative: a suspended or delete-requested
//!   task only actually stops at its next kernel-call checkpoint (entry to a
//!   blocking wait, or the 1-tick poll inside one). A task that never calls
//!   back into the kernel cannot be suspended or deleted out from under it
//!   by this emulation, just as it could not be preempted by true hardware
//!   interrupts on commodity host threads either.

use std::cell::RefCell;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use rkernel_abi::{
    clamp_priority, Name, SchedPolicy, Status, TaskId, TaskMode, ELEVATED_PRIORITY,
    REGISTERS_PER_TASK, TICK_MILLIS,
};

use crate::context::{Kernel, Named};
use crate::diag::Event;
use crate::err::{bail, run, KResult};

/// One tick, used as the poll granularity for every cooperative checkpoint
/// (suspend, delete, predicate re-check) — the same 10 ms the rest of the
/// engine times its "yield to the right waiter" loops against (§4.5, §4.7).
pub(crate) const TICK: Duration = Duration::from_millis(TICK_MILLIS);

/// A task's entry point. Takes the kernel handle (so it can keep calling
/// back into the API) plus the four word-sized arguments `t_start` was
/// given.
pub type TaskEntry = Box<dyn FnOnce(Kernel, u32, u32, u32, u32) + Send + 'static>;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum RunState {
    NotStarted,
    Ready,
    Suspended,
    WaitingOnObject,
}

pub(crate) struct TaskControl {
    pub(crate) policy: SchedPolicy,
    pub(crate) mode: TaskMode,
    pub(crate) state: RunState,
    base_priority: u16,
    /// Set while this task holds the scheduler lock (directly, or via
    /// `t_mode` turning off preemption). While set, the *effective*
    /// priority used for wait-queue selection is `ELEVATED_PRIORITY`
    /// regardless of `base_priority`; a `t_setpri(self, p)` issued during
    /// this window still updates `base_priority`, so it takes visible
    /// effect the instant `elevated` clears — which is exactly "deferred
    /// until unlock restores priority" (§4.3, §8.7) without needing a
    /// separate pending-priority slot.
    elevated: bool,
    /// True while this task is holding the scheduler lock specifically
    /// because `t_mode` turned off preemption, as opposed to one of the
    /// engine's own short-lived internal critical sections. Lets `t_mode`
    /// balance its own lock/unlock without double-counting against
    /// internal users of the same recursive lock.
    mode_lock_held: bool,
}

impl TaskControl {
    fn effective_priority(&self) -> u16 {
        if self.elevated {
            ELEVATED_PRIORITY
        } else {
            self.base_priority
        }
    }
}

struct EventState {
    mask: u32,
    pending: u32,
    captured: u32,
}

/// Marker panic payload used to unwind a task's own thread cleanly on
/// self-delete (`t_delete(0)`), which per §4.3 "detach[es] and exit[s] the
/// thread with a cleanup handler that removes the descriptor" — it never
/// returns control to its caller.
struct SelfDeleteSignal;

pub(crate) struct TaskDescriptor {
    pub(crate) id: TaskId,
    name: Mutex<Name>,
    control: Mutex<TaskControl>,
    run_cv: Condvar,
    regs: Mutex<[u32; REGISTERS_PER_TASK]>,
    events: Mutex<EventState>,
    events_cv: Condvar,
    thread: Mutex<Option<JoinHandle<()>>>,
    delete_requested: AtomicBool,
}

impl Named for TaskDescriptor {
    fn name(&self) -> Name {
        *self.name.lock().unwrap()
    }
}

impl TaskDescriptor {
    fn new(id: u32, name: Name, priority: u16, mode: TaskMode) -> Self {
        TaskDescriptor {
            id: TaskId(id),
            name: Mutex::new(name),
            control: Mutex::new(TaskControl {
                policy: SchedPolicy::Fifo,
                mode,
                state: RunState::NotStarted,
                base_priority: clamp_priority(priority),
                elevated: false,
                mode_lock_held: false,
            }),
            run_cv: Condvar::new(),
            regs: Mutex::new([0; REGISTERS_PER_TASK]),
            events: Mutex::new(EventState {
                mask: 0,
                pending: 0,
                captured: 0,
            }),
            events_cv: Condvar::new(),
            thread: Mutex::new(None),
            delete_requested: AtomicBool::new(false),
        }
    }

    pub(crate) fn effective_priority(&self) -> u16 {
        self.control.lock().unwrap().effective_priority()
    }

    pub(crate) fn is_delete_requested(&self) -> bool {
        self.delete_requested.load(Ordering::Acquire)
    }

    fn request_delete(&self) {
        self.delete_requested.store(true, Ordering::Release);
        self.run_cv.notify_all();
        self.events_cv.notify_all();
    }

    fn take_thread_handle(&self) -> Option<JoinHandle<()>> {
        self.thread.lock().unwrap().take()
    }

    /// Called by the scheduler lock on a 0→1 depth transition.
    pub(crate) fn elevate_for_scheduler_lock(&self) {
        self.control.lock().unwrap().elevated = true;
    }

    /// Called by the scheduler lock on a 1→0 depth transition.
    pub(crate) fn restore_after_scheduler_lock(&self) {
        self.control.lock().unwrap().elevated = false;
    }

    /// Cooperative checkpoint: blocks here for as long as the task is
    /// suspended, waking once a tick to notice a concurrent delete. Every
    /// blocking wait loop elsewhere in the engine calls this before
    /// re-checking its own predicate.
    pub(crate) fn honor_suspend(&self) {
        let mut guard = self.control.lock().unwrap();
        while guard.state == RunState::Suspended && !self.is_delete_requested() {
            let (g, _) = self.run_cv.wait_timeout(guard, TICK).unwrap();
            guard = g;
        }
    }

    /// Combined checkpoint every blocking wait loop in the engine calls
    /// between iterations: honors a pending suspend, then — if another task
    /// called `t_delete` on this one while it was blocked — unwinds this
    /// thread the same way a self-delete does. Cross-task delete has no
    /// other way to stop a thread parked in a condvar wait, so the victim
    /// cooperates by noticing the flag and cancelling itself (§4.3, §5
    /// "cancellation cleanup").
    pub(crate) fn checkpoint(&self) {
        self.honor_suspend();
        if self.is_delete_requested() {
            std::panic::resume_unwind(Box::new(SelfDeleteSignal));
        }
    }

    fn suspend(&self) -> KResult<()> {
        let mut guard = self.control.lock().unwrap();
        if guard.state == RunState::Suspended {
            bail!(Status::AlreadySuspended);
        }
        guard.state = RunState::Suspended;
        Ok(())
    }

    fn resume(&self) -> KResult<()> {
        let mut guard = self.control.lock().unwrap();
        if guard.state != RunState::Suspended {
            bail!(Status::NotSuspended);
        }
        guard.state = RunState::Ready;
        drop(guard);
        self.run_cv.notify_all();
        Ok(())
    }

    fn set_base_priority(&self, new: u16) -> u16 {
        let mut guard = self.control.lock().unwrap();
        let old = guard.base_priority;
        guard.base_priority = new;
        old
    }

    fn update_mode(&self, sched: &crate::sched_lock::SchedLock, who: TaskId, mask: TaskMode, new: TaskMode) -> TaskMode {
        let mut guard = self.control.lock().unwrap();
        let old = guard.mode;
        let merged = (old & !mask) | (new & mask);
        let was_preempt = old.contains(TaskMode::PREEMPT);
        let will_preempt = merged.contains(TaskMode::PREEMPT);
        guard.mode = merged;
        guard.policy = if merged.contains(TaskMode::TIMESLICE) {
            SchedPolicy::RoundRobin
        } else {
            SchedPolicy::Fifo
        };
        let mode_lock_held = guard.mode_lock_held;
        drop(guard);
        if was_preempt && !will_preempt && !mode_lock_held {
            sched.lock(who, self);
            self.control.lock().unwrap().mode_lock_held = true;
        } else if !was_preempt && will_preempt && mode_lock_held {
            self.control.lock().unwrap().mode_lock_held = false;
            sched.unlock(who, self);
        }
        old
    }

    fn get_reg(&self, idx: usize) -> u32 {
        self.regs.lock().unwrap()[idx]
    }

    fn set_reg(&self, idx: usize, value: u32) {
        self.regs.lock().unwrap()[idx] = value;
    }

    /// Posts `bits` to this task's pending events and wakes its receiver
    /// (§4.4).
    pub(crate) fn post_events(&self, bits: u32) {
        let mut ev = self.events.lock().unwrap();
        ev.pending |= bits;
        drop(ev);
        self.events_cv.notify_all();
    }

    /// Runs the AND/OR rendezvous predicate described in §4.4, blocking
    /// according to `wait` and honoring suspend/delete checkpoints. Returns
    /// the captured bits at the moment of match.
    pub(crate) fn receive_events(&self, mask: u32, and_rule: bool, wait: rkernel_abi::Wait) -> KResult<u32> {
        let deadline = match wait {
            rkernel_abi::Wait::Ticks(n) => Some(std::time::Instant::now() + TICK * n),
            _ => None,
        };
        let mut ev = self.events.lock().unwrap();
        ev.mask = mask;
        loop {
            let newly = ev.pending & mask;
            ev.pending &= !newly;
            ev.captured |= newly;
            let matched = if and_rule {
                ev.captured & mask == mask
            } else {
                ev.captured & mask != 0
            };
            if matched {
                let out = ev.captured;
                ev.captured = 0;
                ev.mask = 0;
                return Ok(out);
            }
            if wait == rkernel_abi::Wait::NoWait {
                ev.mask = 0;
                bail!(Status::NoEvents);
            }
            drop(ev);
            self.checkpoint();
            if let Some(deadline) = deadline {
                if std::time::Instant::now() >= deadline {
                    let mut ev2 = self.events.lock().unwrap();
                    ev2.mask = 0;
                    bail!(Status::Timeout);
                }
            }
            ev = self.events.lock().unwrap();
            let (g, _) = self.events_cv.wait_timeout(ev, TICK).unwrap();
            ev = g;
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<(Kernel, TaskId)>> = RefCell::new(None);
}

pub(crate) fn current_task_id() -> Option<TaskId> {
    CURRENT.with(|c| c.borrow().as_ref().map(|(_, id)| *id))
}

pub(crate) fn current_descriptor(k: &Kernel) -> Option<std::sync::Arc<TaskDescriptor>> {
    current_task_id().and_then(|id| k.tasks().get(id.0))
}

/// Runs `body` with the scheduler lock held on behalf of the calling task,
/// if there is one — every caller in this crate runs inside a task thread,
/// but the fallback keeps this safe to call from a bare test harness too.
/// See §5: multi-step publish-and-wake operations run inside one
/// scheduler-locked region so no higher-priority receiver can interleave.
pub(crate) fn with_scheduler_lock<R>(k: &Kernel, body: impl FnOnce() -> R) -> R {
    match current_descriptor(k) {
        Some(desc) => {
            let _guard = k.sched_lock().scoped(desc.id, &desc);
            body()
        }
        None => body(),
    }
}

fn set_current(kernel: Kernel, id: TaskId) {
    CURRENT.with(|c| *c.borrow_mut() = Some((kernel, id)));
}

fn clear_current() {
    CURRENT.with(|c| *c.borrow_mut() = None);
}

/// Resolves a `t_*` target id, where `0` means "the calling task".
fn resolve_target(id: u32) -> KResult<TaskId> {
    if id == 0 {
        current_task_id().ok_or_else(|| crate::err::KernelError::new(Status::ObjectDeleted))
    } else {
        Ok(TaskId(id))
    }
}

pub fn t_create(k: &Kernel, name: Name, priority: u16, mode: TaskMode) -> (Status, TaskId) {
    if !(rkernel_abi::MIN_PRIORITY..=rkernel_abi::MAX_PRIORITY).contains(&priority) {
        return (Status::InvalidPriority, TaskId(0));
    }
    match k.tasks().insert(|id| TaskDescriptor::new(id, name, priority, mode)) {
        Some((id, _)) => {
            k.diag().record(Event::TaskCreated(id));
            log::debug!("t_create: {} -> task {}", name, id);
            (Status::Ok, TaskId(id))
        }
        None => (Status::ObjectTableFull, TaskId(0)),
    }
}

/// Spawns the host thread backing `id`. `policy` selects FIFO vs.
/// round-robin scheduling (§4.3); `entry` is run with `args` once the
/// thread-local "current task" is installed.
pub fn t_start(k: &Kernel, id: TaskId, policy: SchedPolicy, entry: TaskEntry, args: [u32; 4]) -> Status {
    run(|| {
        let Some(desc) = k.tasks().get(id.0) else {
            bail!(Status::ObjectDeleted);
        };
        {
            let mut guard = desc.control.lock().unwrap();
            if guard.state != RunState::NotStarted {
                bail!(Status::AlreadyActive);
            }
            guard.state = RunState::Ready;
            guard.policy = policy;
        }
        let kernel = k.clone();
        let task_id = id;
        let name = desc.name();
        let builder = std::thread::Builder::new().name(name.to_string());
        let handle = builder
            .spawn(move || {
                set_current(kernel.clone(), task_id);
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                    entry(kernel.clone(), args[0], args[1], args[2], args[3]);
                }));
                task_thread_cleanup(&kernel, task_id, result);
                clear_current();
            })
            .expect("spawning a task's host thread");
        *desc.thread.lock().unwrap() = Some(handle);
        k.diag().record(Event::TaskStarted(id.0));
        Ok(Status::Ok)
    })
}

fn task_thread_cleanup(
    kernel: &Kernel,
    id: TaskId,
    result: std::thread::Result<()>,
) {
    if let Err(payload) = result {
        if payload.downcast_ref::<SelfDeleteSignal>().is_none() {
            log::error!("task {} panicked: {}", id, describe_panic(&payload));
        }
    }
    kernel.sched_lock().force_release_if_held_by(id);
    kernel.tasks().remove(id.0);
    kernel.diag().record(Event::TaskDeleted(id.0));
}

fn describe_panic(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Self-delete (`id == 0`) unwinds the calling task's thread and never
/// returns; deleting another task cancels it cooperatively and joins its
/// thread.
pub fn t_delete(k: &Kernel, id: u32) -> Status {
    run(|| {
        if id == 0 {
            if current_task_id().is_none() {
                bail!(Status::ObjectDeleted);
            }
            std::panic::resume_unwind(Box::new(SelfDeleteSignal));
        }
        let tid = TaskId(id);
        let Some(desc) = k.tasks().get(id) else {
            bail!(Status::ObjectDeleted);
        };
        desc.request_delete();
        match desc.take_thread_handle() {
            Some(handle) => {
                let _ = handle.join();
            }
            None => {
                // Never started: no thread will run the usual cleanup.
                k.sched_lock().force_release_if_held_by(tid);
                k.tasks().remove(id);
                k.diag().record(Event::TaskDeleted(id));
            }
        }
        Ok(Status::Ok)
    })
}

pub fn t_suspend(k: &Kernel, id: u32) -> Status {
    run(|| {
        let tid = resolve_target(id)?;
        let Some(desc) = k.tasks().get(tid.0) else {
            bail!(Status::ObjectDeleted);
        };
        if k.sched_lock().is_locked_by(tid) {
            // §4.1: must not suspend the scheduler-lock holder; declined
            // silently rather than treated as an error.
            log::trace!("t_suspend({}) declined: holds the scheduler lock", tid);
            return Ok(Status::Ok);
        }
        desc.suspend()?;
        Ok(Status::Ok)
    })
}

pub fn t_resume(k: &Kernel, id: u32) -> Status {
    run(|| {
        let tid = resolve_target(id)?;
        let Some(desc) = k.tasks().get(tid.0) else {
            bail!(Status::ObjectDeleted);
        };
        desc.resume()?;
        Ok(Status::Ok)
    })
}

pub fn t_setpri(k: &Kernel, id: u32, new_priority: u16) -> (Status, u16) {
    if !(rkernel_abi::MIN_PRIORITY..=rkernel_abi::MAX_PRIORITY).contains(&new_priority) {
        return (Status::InvalidPriority, 0);
    }
    let tid = match resolve_target(id) {
        Ok(t) => t,
        Err(e) => return (e.0, 0),
    };
    let Some(desc) = k.tasks().get(tid.0) else {
        return (Status::ObjectDeleted, 0);
    };
    let old = desc.set_base_priority(new_priority);
    (Status::Ok, old)
}

pub fn t_mode(k: &Kernel, mask: TaskMode, new: TaskMode) -> (Status, TaskMode) {
    let Some(desc) = current_descriptor(k) else {
        return (Status::ObjectDeleted, TaskMode::empty());
    };
    let who = current_task_id().unwrap();
    let old = desc.update_mode(k.sched_lock(), who, mask, new);
    (Status::Ok, old)
}

pub fn t_getreg(k: &Kernel, id: u32, index: usize) -> (Status, u32) {
    if index >= REGISTERS_PER_TASK {
        return (Status::InvalidRegister, 0);
    }
    let tid = match resolve_target(id) {
        Ok(t) => t,
        Err(e) => return (e.0, 0),
    };
    let Some(desc) = k.tasks().get(tid.0) else {
        return (Status::ObjectDeleted, 0);
    };
    (Status::Ok, desc.get_reg(index))
}

pub fn t_setreg(k: &Kernel, id: u32, index: usize, value: u32) -> Status {
    if index >= REGISTERS_PER_TASK {
        return Status::InvalidRegister;
    }
    let tid = match resolve_target(id) {
        Ok(t) => t,
        Err(e) => return e.0,
    };
    let Some(desc) = k.tasks().get(tid.0) else {
        return Status::ObjectDeleted;
    };
    desc.set_reg(index, value);
    Status::Ok
}

/// §9: `t_ident(NULL)` resolves to the caller's own id with `Status::Ok` for
/// the task family specifically (other families return `ObjectNotFound` for
/// a null name instead — the inconsistency is preserved deliberately, see
/// DESIGN.md).
pub fn t_ident(k: &Kernel, name: Name) -> (Status, TaskId) {
    if name.is_null() {
        return match current_task_id() {
            Some(id) => (Status::Ok, id),
            None => (Status::ObjectNotFound, TaskId(0)),
        };
    }
    match k.tasks().ident(name) {
        Some(id) => (Status::Ok, TaskId(id)),
        None => (Status::ObjectNotFound, TaskId(0)),
    }
}

pub(crate) fn ev_send(k: &Kernel, target: TaskId, bits: u32) -> Status {
    match k.tasks().get(target.0) {
        Some(desc) => {
            desc.post_events(bits);
            Status::Ok
        }
        None => Status::ObjectDeleted,
    }
}
