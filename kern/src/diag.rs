//! Fixed-capacity diagnostic rings, one per object family.
//!
//! Grounded on the source's `ringbuf` crate: cheap, overwrite-oldest,
//! `Copy`-only retrospective event logs meant for tests and humans, never
//! for correctness. `log::trace!` carries the same events out to whatever
//! subscriber the caller installs; the ring exists so a test or a demo can
//! also inspect recent history synchronously without parsing log output.

use std::sync::Mutex;

const CAPACITY: usize = 64;

/// One lifecycle event. Kept small and `Copy` like the source's ring buffer
/// payloads.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Event {
    TaskCreated(u32),
    TaskStarted(u32),
    TaskDeleted(u32),
    QueueCreated(u32),
    QueueDeleted(u32),
    QueueBroadcast(u32, usize),
    VarQueueCreated(u32),
    VarQueueDeleted(u32),
    VarQueueBroadcast(u32, usize),
    SemCreated(u32),
    SemDeleted(u32),
    PartitionCreated(u32),
    PartitionDeleted(u32),
}

struct Ring {
    buf: Vec<Event>,
    next: usize,
    len: usize,
}

impl Ring {
    fn new() -> Self {
        Ring {
            buf: Vec::with_capacity(CAPACITY),
            next: 0,
            len: 0,
        }
    }

    fn push(&mut self, e: Event) {
        if self.buf.len() < CAPACITY {
            self.buf.push(e);
        } else {
            self.buf[self.next] = e;
        }
        self.next = (self.next + 1) % CAPACITY;
        self.len = (self.len + 1).min(CAPACITY);
    }

    fn snapshot(&self) -> Vec<Event> {
        if self.buf.len() < CAPACITY {
            self.buf.clone()
        } else {
            let mut out = Vec::with_capacity(CAPACITY);
            out.extend_from_slice(&self.buf[self.next..]);
            out.extend_from_slice(&self.buf[..self.next]);
            out
        }
    }
}

/// One ring of recent object-lifecycle events, shared by every family in a
/// `Kernel`. Not required for correctness; used by tests and `demos`.
pub struct DiagRings(Mutex<Ring>);

impl DiagRings {
    pub(crate) fn new() -> Self {
        DiagRings(Mutex::new(Ring::new()))
    }

    pub(crate) fn record(&self, e: Event) {
        log::trace!("{:?}", e);
        self.0.lock().unwrap().push(e);
    }

    /// Most recent events, oldest first, capped at the ring's capacity.
    pub fn recent(&self) -> Vec<Event> {
        self.0.lock().unwrap().snapshot()
    }
}
