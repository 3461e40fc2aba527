//! Bootstrap entry: spawns a privileged task at max priority that calls
//! `user_sysroot`, then waits for it to return before the process exits —
//! the "System entry" sequence from the external interfaces section.

mod scenarios;

use std::sync::mpsc;

use rkernel::abi::{Name, SchedPolicy, Status, TaskMode, MAX_PRIORITY};
use rkernel::Kernel;

fn user_sysroot(k: Kernel) {
    scenarios::fifo_queue_ordering(&k);
    scenarios::priority_queue_ordering(&k);
    scenarios::zero_capacity_queue(&k);
    scenarios::broadcast(&k);
    scenarios::delete_with_waiters(&k);
    scenarios::partition_double_free(&k);
}

fn main() {
    env_logger::init();
    let k = Kernel::new();

    let (status, boot) = rkernel::t_create(&k, Name::from_str_lossy("BOOT"), MAX_PRIORITY, TaskMode::PREEMPT);
    assert_eq!(status, Status::Ok, "failed to create the bootstrap task");

    let (done_tx, done_rx) = mpsc::channel();
    let status = rkernel::t_start(
        &k,
        boot,
        SchedPolicy::Fifo,
        Box::new(move |k, _, _, _, _| {
            user_sysroot(k);
            let _ = done_tx.send(());
        }),
        [0; 4],
    );
    assert_eq!(status, Status::Ok, "failed to start the bootstrap task");

    done_rx.recv().expect("bootstrap task never returned");
    log::info!("user_sysroot returned; recent kernel events: {:?}", k.diagnostics());
}
