//! Fixed-message queues: 4-word messages, FIFO or priority pend order,
//! optional extent growth, broadcast, and a two-phase delete handshake
//! (§4.5).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use rkernel_abi::{FixedMessage, Name, QueueId, QueueOpts, Status, Wait};

use crate::context::{Kernel, Named};
use crate::diag::Event;
use crate::err::{bail, run};
use crate::task::{current_descriptor, with_scheduler_lock, TICK};
use crate::wait_queue::{PendOrder, WaitQueue};

#[derive(Copy, Clone, Eq, PartialEq)]
enum QueueMode {
    Normal,
    Broadcast,
    Deleted,
}

struct Inner {
    messages: VecDeque<FixedMessage>,
    capacity: usize,
    initial_capacity: usize,
    extensible: bool,
    order: PendOrder,
    mode: QueueMode,
    waiters: WaitQueue,
}

pub(crate) struct FixedQueueState {
    id: QueueId,
    name: Name,
    inner: Mutex<Inner>,
    send_cv: Condvar,
    drain_cv: Condvar,
}

impl Named for FixedQueueState {
    fn name(&self) -> Name {
        self.name
    }
}

impl FixedQueueState {
    fn new(id: u32, name: Name, capacity: usize, opts: QueueOpts) -> Self {
        FixedQueueState {
            id: QueueId(id),
            name,
            inner: Mutex::new(Inner {
                messages: VecDeque::with_capacity(capacity),
                capacity,
                initial_capacity: capacity,
                extensible: !opts.contains(QueueOpts::LIMIT),
                order: if opts.contains(QueueOpts::PRIORITY) {
                    PendOrder::Priority
                } else {
                    PendOrder::Fifo
                },
                mode: QueueMode::Normal,
                waiters: WaitQueue::new(),
            }),
            send_cv: Condvar::new(),
            drain_cv: Condvar::new(),
        }
    }
}

pub fn q_create(k: &Kernel, name: Name, capacity: usize, opts: QueueOpts) -> (Status, QueueId) {
    match k
        .queues()
        .insert(|id| FixedQueueState::new(id, name, capacity, opts))
    {
        Some((id, _)) => {
            k.diag().record(Event::QueueCreated(id));
            (Status::Ok, QueueId(id))
        }
        None => (Status::ObjectTableFull, QueueId(0)),
    }
}

fn send_common(k: &Kernel, id: QueueId, msg: FixedMessage, urgent: bool) -> Status {
    let Some(q) = k.queues().get(id.0) else {
        return Status::ObjectDeleted;
    };
    with_scheduler_lock(k, || {
        let mut inner = q.inner.lock().unwrap();
        if inner.mode == QueueMode::Deleted {
            return Status::ObjectDeleted;
        }
        if urgent {
            // The reserved +1 slot: an urgent send is allowed to exceed the
            // normal capacity by exactly one message (§4.5).
            if inner.messages.len() > inner.capacity {
                return Status::QueueFull;
            }
            inner.messages.push_front(msg);
        } else {
            if inner.initial_capacity == 0 {
                // A zero-capacity queue is a pure rendezvous: a send only
                // succeeds while a receiver is already pending to take it
                // immediately (§4.5, "Extensibility").
                if inner.waiters.is_empty() {
                    return Status::QueueFull;
                }
            } else if inner.messages.len() >= inner.capacity {
                if inner.extensible {
                    inner.capacity += inner.initial_capacity;
                } else {
                    return Status::QueueFull;
                }
            }
            inner.messages.push_back(msg);
        }
        drop(inner);
        q.send_cv.notify_all();
        Status::Ok
    })
}

pub fn q_send(k: &Kernel, id: QueueId, msg: FixedMessage) -> Status {
    send_common(k, id, msg, false)
}

pub fn q_urgent(k: &Kernel, id: QueueId, msg: FixedMessage) -> Status {
    send_common(k, id, msg, true)
}

/// Delivers `msg` to every task currently pending on `id`, blocking the
/// caller until all of them have taken it (§4.5, §5's produce-then-drain
/// handshake). Returns the number awakened.
pub fn q_broadcast(k: &Kernel, id: QueueId, msg: FixedMessage) -> (Status, usize) {
    let Some(q) = k.queues().get(id.0) else {
        return (Status::ObjectDeleted, 0);
    };
    with_scheduler_lock(k, || {
        let mut inner = q.inner.lock().unwrap();
        if inner.mode == QueueMode::Deleted {
            return (Status::ObjectDeleted, 0);
        }
        let awakened = inner.waiters.len();
        if awakened == 0 {
            return (Status::Ok, 0);
        }
        inner.messages.push_front(msg);
        inner.mode = QueueMode::Broadcast;
        q.send_cv.notify_all();
        while inner.mode == QueueMode::Broadcast {
            inner = q.drain_cv.wait(inner).unwrap();
        }
        k.diag().record(Event::QueueBroadcast(id.0, awakened));
        (Status::Ok, awakened)
    })
}

pub fn q_receive(k: &Kernel, id: QueueId, wait: Wait) -> (Status, FixedMessage) {
    let Some(q) = k.queues().get(id.0) else {
        return (Status::ObjectDeleted, [0; 4]);
    };
    let Some(desc) = current_descriptor(k) else {
        return (Status::ObjectDeleted, [0; 4]);
    };
    let my_id = desc.id;
    let deadline = match wait {
        Wait::Ticks(n) => Some(std::time::Instant::now() + TICK * n),
        _ => None,
    };

    let mut inner = q.inner.lock().unwrap();
    inner.waiters.enqueue(my_id);
    loop {
        match inner.mode {
            QueueMode::Deleted => {
                inner.waiters.remove(my_id);
                if inner.waiters.is_empty() {
                    q.drain_cv.notify_all();
                }
                return (Status::QueueKilled, [0; 4]);
            }
            QueueMode::Broadcast => {
                let msg = *inner.messages.front().unwrap_or(&[0; 4]);
                inner.waiters.remove(my_id);
                if inner.waiters.is_empty() {
                    inner.messages.pop_front();
                    inner.mode = QueueMode::Normal;
                    q.drain_cv.notify_all();
                }
                return (Status::Ok, msg);
            }
            QueueMode::Normal => {
                if !inner.messages.is_empty() {
                    if inner.waiters.is_selected(k, my_id, inner.order) {
                        let msg = inner.messages.pop_front().unwrap();
                        inner.waiters.remove(my_id);
                        return (Status::Ok, msg);
                    }
                    // Not my turn: yield one tick so the selected waiter
                    // gets a chance to run, then re-evaluate (§4.5's
                    // "yield to the right waiter" loop).
                    drop(inner);
                    std::thread::sleep(TICK);
                    desc.checkpoint();
                    inner = q.inner.lock().unwrap();
                    continue;
                }
            }
        }
        if wait == Wait::NoWait {
            inner.waiters.remove(my_id);
            return (Status::NoMessage, [0; 4]);
        }
        if let Some(deadline) = deadline {
            if std::time::Instant::now() >= deadline {
                inner.waiters.remove(my_id);
                return (Status::Timeout, [0; 4]);
            }
        }
        let (g, _) = q.send_cv.wait_timeout(inner, TICK).unwrap();
        inner = g;
        drop(inner);
        desc.checkpoint();
        inner = q.inner.lock().unwrap();
    }
}

/// Deletes the queue, waking every pending receiver with `queue-killed`
/// first and waiting for them all to leave before freeing the control
/// block (§4.5, §8 scenario 5).
pub fn q_delete(k: &Kernel, id: QueueId) -> Status {
    run(|| {
        let Some(q) = k.queues().get(id.0) else {
            bail!(Status::ObjectDeleted);
        };
        let (waiters_present, messages_present) = {
            let mut inner = q.inner.lock().unwrap();
            let waiters_present = !inner.waiters.is_empty();
            let messages_present = !inner.messages.is_empty();
            inner.mode = QueueMode::Deleted;
            q.send_cv.notify_all();
            while !inner.waiters.is_empty() {
                inner = q.drain_cv.wait(inner).unwrap();
            }
            (waiters_present, messages_present)
        };
        k.queues().remove(id.0);
        k.diag().record(Event::QueueDeleted(id.0));
        Ok(if waiters_present {
            Status::TasksAtQueueDelete
        } else if messages_present {
            Status::MessagesAtQueueDelete
        } else {
            Status::Ok
        })
    })
}

pub fn q_ident(k: &Kernel, name: Name) -> (Status, QueueId) {
    match k.queues().ident(name) {
        Some(id) => (Status::Ok, QueueId(id)),
        None => (Status::ObjectNotFound, QueueId(0)),
    }
}
