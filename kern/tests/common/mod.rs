//! Shared spawn helpers for the integration tests.
//!
//! Every blocking kernel call (`q_receive`, `sm_p`, `ev_receive`,
//! `tm_wkafter`) resolves "the calling task" through a thread-local set at
//! `t_start` time, so a test that wants to call one of those has to run the
//! call from inside a spawned task rather than directly from the test
//! thread. These helpers spawn a task, run a closure inside it, and hand the
//! closure's return value back over a channel.

use std::sync::mpsc;

use rkernel::abi::{Name, SchedPolicy, Status, TaskMode};
use rkernel::Kernel;

pub fn name(s: &str) -> Name {
    Name::from_str_lossy(s)
}

/// Spawns a task named `task_name` at `priority` and runs `body` inside it,
/// blocking the caller until `body` returns and handing back its result.
pub fn run_in_task<T, F>(k: &Kernel, task_name: &str, priority: u16, body: F) -> T
where
    T: Send + 'static,
    F: FnOnce(Kernel) -> T + Send + 'static,
{
    let (status, id) = rkernel::t_create(k, name(task_name), priority, TaskMode::PREEMPT);
    assert_eq!(status, Status::Ok, "t_create({task_name})");
    let (tx, rx) = mpsc::channel();
    let status = rkernel::t_start(
        k,
        id,
        SchedPolicy::Fifo,
        Box::new(move |k, _, _, _, _| {
            let result = body(k);
            let _ = tx.send(result);
        }),
        [0; 4],
    );
    assert_eq!(status, Status::Ok, "t_start({task_name})");
    rx.recv().expect("spawned task never returned")
}

/// Spawns a task whose body runs until `body` itself blocks or returns,
/// without waiting for a result — used when the test only cares that the
/// task reached some externally-observable state (e.g. it is now pending on
/// a queue).
pub fn spawn<F>(k: &Kernel, task_name: &str, priority: u16, body: F) -> rkernel::abi::TaskId
where
    F: FnOnce(Kernel) + Send + 'static,
{
    let (status, id) = rkernel::t_create(k, name(task_name), priority, TaskMode::PREEMPT);
    assert_eq!(status, Status::Ok, "t_create({task_name})");
    let status = rkernel::t_start(
        k,
        id,
        SchedPolicy::Fifo,
        Box::new(move |k, _, _, _, _| body(k)),
        [0; 4],
    );
    assert_eq!(status, Status::Ok, "t_start({task_name})");
    id
}
