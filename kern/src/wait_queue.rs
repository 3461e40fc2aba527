//! Per-object wait queue and wakeup-selection policy (§4.2).
//!
//! A waitable object (queue, semaphore) embeds one of these inside the same
//! inner state its own mutex already guards — it carries no lock of its own.
//! [`WaitQueue::is_selected`] answers "would I be the one chosen right now?"
//! from inside a waiter's own predicate loop: this is `is_this_waiter_selected`
//! from §4.2.

use std::collections::VecDeque;

use rkernel_abi::TaskId;

use crate::context::Kernel;

/// FIFO vs. priority pend order, the option bit shared by queues and
/// semaphores (renamed out of the bitflags they're carried in so the wait
/// queue doesn't need to know which family it's backing).
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum PendOrder {
    Fifo,
    Priority,
}

#[derive(Copy, Clone)]
struct Waiter {
    id: TaskId,
}

#[derive(Default)]
pub(crate) struct WaitQueue {
    waiters: VecDeque<Waiter>,
}

impl WaitQueue {
    pub(crate) fn new() -> Self {
        WaitQueue {
            waiters: VecDeque::new(),
        }
    }

    /// Appends in FIFO (enqueue) order regardless of pend policy — policy
    /// only affects *selection*, never queue membership order. Priority is
    /// never captured here: it is read live off the task table at selection
    /// time, so a `t_setpri()` issued while already pended still counts.
    pub(crate) fn enqueue(&mut self, id: TaskId) {
        self.waiters.push_back(Waiter { id });
    }

    /// Removes a specific waiter (used when it is selected, times out, or
    /// the owning task is deleted out from under the wait).
    pub(crate) fn remove(&mut self, id: TaskId) {
        self.waiters.retain(|w| w.id != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.waiters.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// `is_this_waiter_selected`: true iff `id` is the one the selection
    /// policy would wake right now.
    ///
    /// FIFO ⇒ head of the list. PRIORITY ⇒ highest *current* effective
    /// priority, read fresh off each waiter's task descriptor so a
    /// `t_setpri()` issued while already pended changes its rank; ties
    /// broken by list position (head wins).
    pub(crate) fn is_selected(&self, k: &Kernel, id: TaskId, order: PendOrder) -> bool {
        match order {
            PendOrder::Fifo => self.waiters.front().map(|w| w.id) == Some(id),
            PendOrder::Priority => {
                let priority_of = |w: &Waiter| {
                    k.tasks()
                        .get(w.id.0)
                        .map(|desc| desc.effective_priority())
                        .unwrap_or(0)
                };
                let Some(best) = self
                    .waiters
                    .iter()
                    .enumerate()
                    .max_by_key(|(pos, w)| (priority_of(w), std::cmp::Reverse(*pos)))
                    .map(|(_, w)| w.id)
                else {
                    return false;
                };
                best == id
            }
        }
    }
}
