//! The scheduler lock: process-wide re-entrant exclusion that emulates
//! "disable preemption" by priority elevation (§4.1).
//!
//! §9 explicitly sanctions dropping the priority-elevation trick itself —
//! "a native implementation may prefer a single coarse lock plus condvars
//! and abandon the priority elevation trick; the external contract
//! (atomicity between producers and waiters) is what matters." There is no
//! portable way to raise a `std::thread`'s OS scheduling priority anyway, so
//! elevation here is purely logical bookkeeping on the holder's descriptor:
//! its `current_priority` (used only by our own priority-pend wait-queue
//! selection, never by the host scheduler) is raised to
//! [`rkernel_abi::ELEVATED_PRIORITY`] for the duration of the lock, which is
//! exactly the observable contract §4.1 and the testable property in §8.7
//! ask for.

use std::sync::{Condvar, Mutex};

use rkernel_abi::TaskId;

use crate::task::TaskDescriptor;

struct LockState {
    owner: Option<TaskId>,
    depth: u32,
}

pub(crate) struct SchedLock {
    state: Mutex<LockState>,
    cv: Condvar,
}

impl SchedLock {
    pub(crate) fn new() -> Self {
        SchedLock {
            state: Mutex::new(LockState {
                owner: None,
                depth: 0,
            }),
            cv: Condvar::new(),
        }
    }

    pub(crate) fn is_locked_by(&self, who: TaskId) -> bool {
        self.state.lock().unwrap().owner == Some(who)
    }

    /// Blocks until `who` holds the lock (re-entrant: a no-op wait if it
    /// already does), then bumps the recursion depth, elevating on the
    /// 0→1 transition.
    pub(crate) fn lock(&self, who: TaskId, holder: &TaskDescriptor) {
        let mut guard = self.state.lock().unwrap();
        loop {
            match guard.owner {
                Some(owner) if owner == who => break,
                None => {
                    guard.owner = Some(who);
                    break;
                }
                Some(_) => {
                    guard = self.cv.wait(guard).unwrap();
                }
            }
        }
        // The depth counter is unsigned and, per §9, the source merely
        // clamps on an overflow that should never happen rather than
        // detecting it as a bug; `saturating_add` preserves that.
        let was_zero = guard.depth == 0;
        guard.depth = guard.depth.saturating_add(1);
        if was_zero {
            holder.elevate_for_scheduler_lock();
        }
    }

    /// Releases one level. On the 1→0 transition, restores the holder's
    /// saved priority and wakes anyone spinning on the lock.
    pub(crate) fn unlock(&self, who: TaskId, holder: &TaskDescriptor) {
        let mut guard = self.state.lock().unwrap();
        if guard.owner != Some(who) {
            // Unbalanced unlock from a task that never held it: a
            // programming error in the caller, not something we can
            // usefully recover from beyond ignoring it.
            log::warn!("t_unlock by {:?} which does not hold the lock", who);
            return;
        }
        guard.depth = guard.depth.saturating_sub(1);
        if guard.depth == 0 {
            guard.owner = None;
            drop(guard);
            holder.restore_after_scheduler_lock();
            self.cv.notify_all();
        }
    }

    /// Forcibly clears ownership if `who` dies (or self-deletes) while
    /// still holding the lock, so nobody else deadlocks against it (§4.1,
    /// "on task death a cleanup handler forcibly clears the ownership
    /// token").
    pub(crate) fn force_release_if_held_by(&self, who: TaskId) {
        let mut guard = self.state.lock().unwrap();
        if guard.owner == Some(who) {
            guard.owner = None;
            guard.depth = 0;
            drop(guard);
            self.cv.notify_all();
        }
    }

    /// RAII form of [`SchedLock::lock`]/[`SchedLock::unlock`], used to wrap
    /// the multi-step publish-and-wake regions §5 calls out (`q_send`,
    /// `q_urgent`, `q_broadcast`, `sm_v`) so a higher-priority receiver can
    /// never interleave between the state change and the wakeup.
    pub(crate) fn scoped<'a>(&'a self, who: TaskId, holder: &'a TaskDescriptor) -> SchedGuard<'a> {
        self.lock(who, holder);
        SchedGuard {
            sched: self,
            who,
            holder,
        }
    }
}

pub(crate) struct SchedGuard<'a> {
    sched: &'a SchedLock,
    who: TaskId,
    holder: &'a TaskDescriptor,
}

impl Drop for SchedGuard<'_> {
    fn drop(&mut self) {
        self.sched.unlock(self.who, self.holder);
    }
}
