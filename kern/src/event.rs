//! Event groups: a 32-bit flag set private to each task, posted to by
//! anyone and consumed by its owner with AND/OR matching (§4.4).
//!
//! Unlike the queue and semaphore families there is no separate control
//! block to create or delete — every task already carries its own event
//! state (see [`crate::task::TaskDescriptor`]), so this module is a thin
//! pair of free functions over that state.

use rkernel_abi::{EventOpts, Status, TaskId, Wait};

use crate::context::Kernel;
use crate::task::current_descriptor;

/// Sets `bits` in `target`'s pending event flags and wakes it if it is
/// blocked in `ev_receive`.
pub fn ev_send(k: &Kernel, target: TaskId, bits: u32) -> Status {
    crate::task::ev_send(k, target, bits)
}

/// Consumes events matching `mask` from the caller's own pending set.
///
/// `opts.AND` requires every bit in `mask`; otherwise any one bit matches
/// (§4.4's AND/OR rule). `opts.NOWAIT` polls once instead of blocking.
/// `ticks == 0` with `NOWAIT` unset waits forever; otherwise it is a
/// timeout in ticks, consistent with [`Wait::from_nowait_and_ticks`].
pub fn ev_receive(k: &Kernel, mask: u32, opts: EventOpts, ticks: u32) -> (Status, u32) {
    let Some(desc) = current_descriptor(k) else {
        return (Status::ObjectDeleted, 0);
    };
    let wait = Wait::from_nowait_and_ticks(opts.contains(EventOpts::NOWAIT), ticks);
    let and_rule = opts.contains(EventOpts::AND);
    match desc.receive_events(mask, and_rule, wait) {
        Ok(bits) => (Status::Ok, bits),
        Err(e) => (e.0, 0),
    }
}
