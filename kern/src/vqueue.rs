//! Variable-length message queues: same control-flow skeleton as the
//! fixed-message family, plus a configured maximum payload size and no
//! growth policy (§4.6).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use rkernel_abi::{Name, QueueOpts, Status, VarQueueId, Wait};

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
    messages: VecDeque<Vec<u8>>,
    capacity: usize,
    max_len: usize,
    order: PendOrder,
    mode: QueueMode,
    waiters: WaitQueue,
}

pub(crate) struct VarQueueState {
    id: VarQueueId,
    name: Name,
    inner: Mutex<Inner>,
    send_cv: Condvar,
    drain_cv: Condvar,
}

impl Named for VarQueueState {
    fn name(&self) -> Name {
        self.name
    }
}

impl VarQueueState {
    fn new(id: u32, name: Name, capacity: usize, max_len: usize, opts: QueueOpts) -> Self {
        VarQueueState {
            id: VarQueueId(id),
            name,
            inner: Mutex::new(Inner {
                messages: VecDeque::with_capacity(capacity),
                capacity,
                max_len,
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

pub fn q_vcreate(
    k: &Kernel,
    name: Name,
    capacity: usize,
    max_len: usize,
    opts: QueueOpts,
) -> (Status, VarQueueId) {
    match k
        .vqueues()
        .insert(|id| VarQueueState::new(id, name, capacity, max_len, opts))
    {
        Some((id, _)) => {
            k.diag().record(Event::VarQueueCreated(id));
            (Status::Ok, VarQueueId(id))
        }
        None => (Status::ObjectTableFull, VarQueueId(0)),
    }
}

fn send_common(k: &Kernel, id: VarQueueId, data: &[u8], urgent: bool) -> Status {
    let Some(q) = k.vqueues().get(id.0) else {
        return Status::ObjectDeleted;
    };
    with_scheduler_lock(k, || {
        let mut inner = q.inner.lock().unwrap();
        if data.len() > inner.max_len {
            return Status::MessageSizeError;
        }
        if inner.mode == QueueMode::Deleted {
            return Status::ObjectDeleted;
        }
        if urgent {
            if inner.messages.len() > inner.capacity {
                return Status::QueueFull;
            }
            inner.messages.push_front(data.to_vec());
        } else {
            if inner.capacity == 0 {
                if inner.waiters.is_empty() {
                    return Status::QueueFull;
                }
            } else if inner.messages.len() >= inner.capacity {
                // No growth policy for this family (§4.6): a full queue
                // simply rejects the send.
                return Status::QueueFull;
            }
            inner.messages.push_back(data.to_vec());
        }
        drop(inner);
        q.send_cv.notify_all();
        Status::Ok
    })
}

pub fn q_vsend(k: &Kernel, id: VarQueueId, data: &[u8]) -> Status {
    send_common(k, id, data, false)
}

pub fn q_vurgent(k: &Kernel, id: VarQueueId, data: &[u8]) -> Status {
    send_common(k, id, data, true)
}

pub fn q_vbroadcast(k: &Kernel, id: VarQueueId, data: &[u8]) -> (Status, usize) {
    let Some(q) = k.vqueues().get(id.0) else {
        return (Status::ObjectDeleted, 0);
    };
    with_scheduler_lock(k, || {
        let mut inner = q.inner.lock().unwrap();
        if data.len() > inner.max_len {
            return (Status::MessageSizeError, 0);
        }
        if inner.mode == QueueMode::Deleted {
            return (Status::ObjectDeleted, 0);
        }
        let awakened = inner.waiters.len();
        if awakened == 0 {
            return (Status::Ok, 0);
        }
        inner.messages.push_front(data.to_vec());
        inner.mode = QueueMode::Broadcast;
        q.send_cv.notify_all();
        while inner.mode == QueueMode::Broadcast {
            inner = q.drain_cv.wait(inner).unwrap();
        }
        k.diag().record(Event::VarQueueBroadcast(id.0, awakened));
        (Status::Ok, awakened)
    })
}

/// `buf_capacity` is the size of the caller's receive buffer. Per §9 it is
/// checked against the queue's configured maximum message length, not the
/// length of whatever message actually happens to be pending — a
/// deliberately conservative rule preserved from the historical API.
pub fn q_vreceive(k: &Kernel, id: VarQueueId, buf_capacity: usize, wait: Wait) -> (Status, Vec<u8>) {
    let Some(q) = k.vqueues().get(id.0) else {
        return (Status::ObjectDeleted, Vec::new());
    };
    let Some(desc) = current_descriptor(k) else {
        return (Status::ObjectDeleted, Vec::new());
    };
    {
        let inner = q.inner.lock().unwrap();
        if buf_capacity < inner.max_len {
            return (Status::BufferSizeError, Vec::new());
        }
    }
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
                return (Status::QueueKilled, Vec::new());
            }
            QueueMode::Broadcast => {
                let msg = inner.messages.front().cloned().unwrap_or_default();
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
            return (Status::NoMessage, Vec::new());
        }
        if let Some(deadline) = deadline {
            if std::time::Instant::now() >= deadline {
                inner.waiters.remove(my_id);
                return (Status::Timeout, Vec::new());
            }
        }
        let (g, _) = q.send_cv.wait_timeout(inner, TICK).unwrap();
        inner = g;
        drop(inner);
        desc.checkpoint();
        inner = q.inner.lock().unwrap();
    }
}

pub fn q_vdelete(k: &Kernel, id: VarQueueId) -> Status {
    run(|| {
        let Some(q) = k.vqueues().get(id.0) else {
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
        k.vqueues().remove(id.0);
        k.diag().record(Event::VarQueueDeleted(id.0));
        Ok(if waiters_present {
            Status::TasksAtQueueDelete
        } else if messages_present {
            Status::MessagesAtQueueDelete
        } else {
            Status::Ok
        })
    })
}

pub fn q_vident(k: &Kernel, name: Name) -> (Status, VarQueueId) {
    match k.vqueues().ident(name) {
        Some(id) => (Status::Ok, VarQueueId(id)),
        None => (Status::ObjectNotFound, VarQueueId(0)),
    }
}
