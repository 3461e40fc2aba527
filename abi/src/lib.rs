// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire-level types for the kernel emulation.
//!
//! These are shared between `rkernel` (the engine) and anything that calls
//! into it. Everything here is a plain value type: ids, option bitmasks, and
//! the flat status-code taxonomy that every entry point returns. None of it
//! depends on how the engine actually schedules anything.

use std::fmt;

/// One tick, the unit `tm_wkafter` and every timed wait are expressed in.
pub const TICK_MILLIS: u64 = 10;

/// Number of notepad registers carried by each task.
pub const REGISTERS_PER_TASK: usize = 8;

/// Lowest priority value a caller may assign directly.
pub const MIN_PRIORITY: u16 = 1;

/// Highest priority value a caller may assign directly. One value above this
/// (`ELEVATED_PRIORITY`) is reserved for scheduler-lock elevation and can
/// never be the result of `t_setpri`.
pub const MAX_PRIORITY: u16 = 255;

/// Priority a task is raised to while it holds the scheduler lock. Strictly
/// greater than any priority a caller can request, so a locked task always
/// wins priority-ordered selection.
pub const ELEVATED_PRIORITY: u16 = 256;

/// A non-terminated 4-byte object name, the historical convention for this
/// API family.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Name(pub [u8; 4]);

impl Name {
    pub const fn new(bytes: [u8; 4]) -> Self {
        Name(bytes)
    }

    /// Builds a name from a Rust string, truncating to 4 bytes and
    /// zero-padding if shorter. Non-ASCII input is not rejected, just
    /// truncated byte-wise like the historical API would have done.
    pub fn from_str_lossy(s: &str) -> Self {
        let mut bytes = [0u8; 4];
        for (slot, b) in bytes.iter_mut().zip(s.as_bytes().iter()) {
            *slot = *b;
        }
        Name(bytes)
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 4]
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Name({:?})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0).trim_end_matches('\0'))
    }
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
        pub struct $name(pub u32);

        impl $name {
            pub fn get(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// 1-based task id.
    TaskId
);
define_id!(
    /// 1-based fixed-message-queue id.
    QueueId
);
define_id!(
    /// 0-based variable-length-queue id. The family starts counting at zero;
    /// every other family starts at one. Preserved from the source API.
    VarQueueId
);
define_id!(
    /// 1-based semaphore id.
    SemId
);
define_id!(
    /// 1-based fixed-block-partition id.
    PartId
);

/// A task's scheduling policy, selected at `t_start` and switchable via
/// `t_mode`.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SchedPolicy {
    /// Runs until it blocks or is preempted by a higher-priority task; no
    /// time slicing among equal priorities.
    Fifo,
    /// Same priority-based preemption as `Fifo`, but tasks of equal priority
    /// round-robin against each other.
    RoundRobin,
}

/// The policy-relative priority ceiling actually assignable via `t_setpri`.
/// Both policies share the same numeric priority space; this exists only
/// because `ELEVATED_PRIORITY` must stay out of reach.
pub fn clamp_priority(requested: u16) -> u16 {
    requested.clamp(MIN_PRIORITY, MAX_PRIORITY)
}

bitflags::bitflags! {
    /// Bits toggled by `t_mode`'s mask/new pair, and set at `t_create` time.
    #[derive(Default)]
    pub struct TaskMode: u32 {
        /// Task can be preempted by a higher-priority runnable task.
        const PREEMPT   = 1 << 0;
        /// Task round-robins against peers of equal priority instead of
        /// running to completion FIFO-style.
        const TIMESLICE = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Event rendezvous options for `ev_receive`.
    #[derive(Default)]
    pub struct EventOpts: u32 {
        /// Match requires every requested bit (AND rule). Absent means OR.
        const AND    = 1 << 0;
        /// Poll once and return instead of blocking.
        const NOWAIT = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Pend-order / growth options shared by both queue families.
    #[derive(Default)]
    pub struct QueueOpts: u32 {
        /// Waiters are woken in priority order. Absent means FIFO.
        const PRIORITY = 1 << 0;
        /// Queue never grows past its initial capacity. Absent means the
        /// fixed-message-queue family may append extents (variable-length
        /// queues are always fixed capacity regardless of this bit).
        const LIMIT    = 1 << 1;
    }
}

bitflags::bitflags! {
    /// Semaphore pend-order option.
    #[derive(Default)]
    pub struct SemOpts: u32 {
        /// Waiters are woken in priority order. Absent means FIFO.
        const PRIORITY = 1 << 0;
    }
}

bitflags::bitflags! {
    /// Partition deletion option.
    #[derive(Default)]
    pub struct PartOpts: u32 {
        /// `pt_delete` succeeds even if blocks are still checked out.
        const DELETE_IN_USE = 1 << 0;
    }
}

/// How long a blocking call is willing to wait, in ticks.
///
/// `Ticks(0)` is "wait forever" per the historical convention; use
/// `Wait::from_nowait_and_ticks` when decoding a NOWAIT option bit plus a
/// separate ticks argument, which is how every call in this family actually
/// takes it on the wire.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Wait {
    NoWait,
    Forever,
    Ticks(u32),
}

impl Wait {
    pub fn from_nowait_and_ticks(nowait: bool, ticks: u32) -> Self {
        if nowait {
            Wait::NoWait
        } else if ticks == 0 {
            Wait::Forever
        } else {
            Wait::Ticks(ticks)
        }
    }
}

/// A message for the fixed-message-queue family: exactly four words.
pub type FixedMessage = [u32; 4];

/// A partition buffer's "address": a byte offset into that partition's
/// backing region, block-aligned. Stands in for the historical API's raw
/// pointer, which would otherwise have to carry allocator-internal
/// addresses across the public interface (§9: prefer integer handles over
/// raw pointer graphs).
pub type BufferAddr = u32;

/// Flat status-code taxonomy. Every entry point in this family returns one
/// of these by value; there are no exceptions. `Status::Ok` is the only
/// all-zero / success value — everything else is either a hard failure or,
/// for a handful of delete operations, an informational code returned
/// alongside a delete that still happened.
#[derive(Copy, Clone, Eq, PartialEq, Debug, thiserror::Error)]
#[repr(u32)]
pub enum Status {
    #[error("no error")]
    Ok = 0,

    // --- generic ---
    #[error("timed out waiting")]
    Timeout = 1,
    #[error("invalid node id")]
    InvalidNode = 2,
    #[error("object has been deleted")]
    ObjectDeleted = 3,
    #[error("object table is full")]
    ObjectTableFull = 4,
    #[error("no object with that name")]
    ObjectNotFound = 5,

    // --- task ---
    #[error("priority out of range")]
    InvalidPriority = 10,
    #[error("task is already active")]
    AlreadyActive = 11,
    #[error("task is already suspended")]
    AlreadySuspended = 12,
    #[error("task is not suspended")]
    NotSuspended = 13,
    #[error("register index out of range")]
    InvalidRegister = 14,

    // --- event ---
    #[error("no matching events (NOWAIT)")]
    NoEvents = 20,

    // --- message queues (both families) ---
    #[error("message too large for this queue")]
    MessageSizeError = 30,
    #[error("receive buffer smaller than the queue maximum")]
    BufferSizeError = 31,
    #[error("no queue control block available")]
    NoQueueControlBlock = 32,
    #[error("failed to allocate a message buffer")]
    NoMessageBuffer = 33,
    #[error("queue is full")]
    QueueFull = 34,
    #[error("queue was deleted while waiting")]
    QueueKilled = 35,
    #[error("no message available (NOWAIT)")]
    NoMessage = 36,
    #[error("tasks were waiting at queue delete")]
    TasksAtQueueDelete = 37,
    #[error("messages were queued at queue delete")]
    MessagesAtQueueDelete = 38,

    // --- semaphores ---
    #[error("no semaphore control block available")]
    NoSemaphoreControlBlock = 50,
    #[error("no token available (NOWAIT)")]
    NoSemaphore = 51,
    #[error("semaphore was deleted while waiting")]
    SemaphoreKilled = 52,
    #[error("tasks were waiting at semaphore delete")]
    TasksAtSemaphoreDelete = 53,

    // --- partitions ---
    #[error("partition block size invalid")]
    PartitionBufferSizeError = 60,
    #[error("partition has blocks checked out")]
    BufferInUse = 61,
    #[error("partition is empty")]
    NoBuffer = 62,
    #[error("address does not belong to this partition")]
    InvalidBufferAddress = 63,
    #[error("block is already free")]
    BufferAlreadyFree = 64,
}

impl Status {
    pub fn is_ok(self) -> bool {
        matches!(self, Status::Ok)
    }

    /// True for the two "deleted anyway, here's what was going on" codes
    /// that `q_delete` / `sm_delete` may return alongside a successful
    /// delete.
    pub fn is_informational(self) -> bool {
        matches!(
            self,
            Status::TasksAtQueueDelete
                | Status::MessagesAtQueueDelete
                | Status::TasksAtSemaphoreDelete
        )
    }
}

impl From<Status> for u32 {
    fn from(s: Status) -> u32 {
        s as u32
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Ok
    }
}
