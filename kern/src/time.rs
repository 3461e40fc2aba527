//! Relative delay (§4.9).

use std::time::Instant;

use rkernel_abi::Status;

use crate::context::Kernel;
use crate::task::{current_descriptor, TICK};

/// Suspends the caller for `ticks` ticks (`ticks == 0` returns immediately).
/// Honors suspend and delete at the same tick granularity every other
/// blocking wait in this crate does, so a task parked here is still
/// cooperatively suspendable or deletable.
pub fn tm_wkafter(k: &Kernel, ticks: u32) -> Status {
    if ticks == 0 {
        // Still yields to a same-priority peer instead of blocking.
        std::thread::yield_now();
        return Status::Ok;
    }
    let Some(desc) = current_descriptor(k) else {
        return Status::ObjectDeleted;
    };
    let deadline = Instant::now() + TICK * ticks;
    loop {
        desc.checkpoint();
        let now = Instant::now();
        if now >= deadline {
            return Status::Ok;
        }
        let remaining = deadline - now;
        std::thread::sleep(remaining.min(TICK));
    }
}
