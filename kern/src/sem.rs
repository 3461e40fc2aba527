//! Counting semaphores: FIFO or priority pend order, broadcast-on-delete
//! (§4.7).

use std::sync::{Condvar, Mutex};

use rkernel_abi::{Name, SemId, SemOpts, Status, Wait};

use crate::context::{Kernel, Named};
use crate::diag::Event;
use crate::err::{bail, run};
use crate::task::{current_descriptor, with_scheduler_lock, TICK};
use crate::wait_queue::{PendOrder, WaitQueue};

#[derive(Copy, Clone, Eq, PartialEq)]
enum SemMode {
    Normal,
    Deleted,
}

struct Inner {
    count: u32,
    order: PendOrder,
    mode: SemMode,
    waiters: WaitQueue,
}

pub(crate) struct SemState {
    id: SemId,
    name: Name,
    inner: Mutex<Inner>,
    send_cv: Condvar,
    drain_cv: Condvar,
}

impl Named for SemState {
    fn name(&self) -> Name {
        self.name
    }
}

impl SemState {
    fn new(id: u32, name: Name, initial_count: u32, opts: SemOpts) -> Self {
        SemState {
            id: SemId(id),
            name,
            inner: Mutex::new(Inner {
                count: initial_count,
                order: if opts.contains(SemOpts::PRIORITY) {
                    PendOrder::Priority
                } else {
                    PendOrder::Fifo
                },
                mode: SemMode::Normal,
                waiters: WaitQueue::new(),
            }),
            send_cv: Condvar::new(),
            drain_cv: Condvar::new(),
        }
    }
}

pub fn sm_create(k: &Kernel, name: Name, initial_count: u32, opts: SemOpts) -> (Status, SemId) {
    match k.sems().insert(|id| SemState::new(id, name, initial_count, opts)) {
        Some((id, _)) => {
            k.diag().record(Event::SemCreated(id));
            (Status::Ok, SemId(id))
        }
        None => (Status::ObjectTableFull, SemId(0)),
    }
}

/// `v`: posts one token and wakes a waiter if one is pending (§4.7).
pub fn sm_v(k: &Kernel, id: SemId) -> Status {
    let Some(s) = k.sems().get(id.0) else {
        return Status::ObjectDeleted;
    };
    with_scheduler_lock(k, || {
        let mut inner = s.inner.lock().unwrap();
        if inner.mode == SemMode::Deleted {
            return Status::ObjectDeleted;
        }
        inner.count += 1;
        let has_waiters = !inner.waiters.is_empty();
        drop(inner);
        if has_waiters {
            s.send_cv.notify_all();
        }
        Status::Ok
    })
}

/// `p`: blocks until a token is available and this task is the one the
/// pend order selects, honoring `wait` and cooperative cancellation.
pub fn sm_p(k: &Kernel, id: SemId, wait: Wait) -> Status {
    let Some(s) = k.sems().get(id.0) else {
        return Status::ObjectDeleted;
    };
    let Some(desc) = current_descriptor(k) else {
        return Status::ObjectDeleted;
    };
    let my_id = desc.id;
    let deadline = match wait {
        Wait::Ticks(n) => Some(std::time::Instant::now() + TICK * n),
        _ => None,
    };

    let mut inner = s.inner.lock().unwrap();
    inner.waiters.enqueue(my_id);
    loop {
        if inner.mode == SemMode::Deleted {
            inner.waiters.remove(my_id);
            if inner.waiters.is_empty() {
                s.drain_cv.notify_all();
            }
            return Status::SemaphoreKilled;
        }
        if inner.count > 0 {
            inner.count -= 1;
            if inner.waiters.is_selected(k, my_id, inner.order) {
                inner.waiters.remove(my_id);
                return Status::Ok;
            }
            // Not my turn: put the token back and yield one tick so the
            // selected waiter can claim it (§4.7's "yield to right
            // waiter" loop).
            inner.count += 1;
            drop(inner);
            std::thread::sleep(TICK);
            desc.checkpoint();
            inner = s.inner.lock().unwrap();
            continue;
        }
        if wait == Wait::NoWait {
            inner.waiters.remove(my_id);
            return Status::NoSemaphore;
        }
        if let Some(deadline) = deadline {
            if std::time::Instant::now() >= deadline {
                inner.waiters.remove(my_id);
                return Status::Timeout;
            }
        }
        let (g, _) = s.send_cv.wait_timeout(inner, TICK).unwrap();
        inner = g;
        drop(inner);
        desc.checkpoint();
        inner = s.inner.lock().unwrap();
    }
}

pub fn sm_delete(k: &Kernel, id: SemId) -> Status {
    run(|| {
        let Some(s) = k.sems().get(id.0) else {
            bail!(Status::ObjectDeleted);
        };
        let waiters_present = {
            let mut inner = s.inner.lock().unwrap();
            let waiters_present = !inner.waiters.is_empty();
            inner.mode = SemMode::Deleted;
            s.send_cv.notify_all();
            while !inner.waiters.is_empty() {
                inner = s.drain_cv.wait(inner).unwrap();
            }
            waiters_present
        };
        k.sems().remove(id.0);
        k.diag().record(Event::SemDeleted(id.0));
        Ok(if waiters_present {
            Status::TasksAtSemaphoreDelete
        } else {
            Status::Ok
        })
    })
}

pub fn sm_ident(k: &Kernel, name: Name) -> (Status, SemId) {
    match k.sems().ident(name) {
        Some(id) => (Status::Ok, SemId(id)),
        None => (Status::ObjectNotFound, SemId(0)),
    }
}
