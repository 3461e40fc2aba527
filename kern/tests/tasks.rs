mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rkernel::abi::{Status, TaskMode, Wait};
use rkernel::Kernel;

#[test]
fn create_and_start_runs_the_entry_closure() {
    let k = Kernel::new();
    let result = common::run_in_task(&k, "SELF", 100, |_k| 42u32);
    assert_eq!(result, 42);
}

#[test]
fn self_delete_never_returns_to_its_own_entry_point() {
    let k = Kernel::new();
    let (status, id) = rkernel::t_create(&k, common::name("SUIC"), 50, TaskMode::PREEMPT);
    assert_eq!(status, Status::Ok);
    let status = rkernel::t_start(
        &k,
        id,
        rkernel::abi::SchedPolicy::Fifo,
        Box::new(move |k, _, _, _, _| {
            rkernel::t_delete(&k, 0);
            panic!("self-delete returned control to its caller");
        }),
        [0; 4],
    );
    assert_eq!(status, Status::Ok);
    std::thread::sleep(Duration::from_millis(30));
    // The task is gone, and cleanly -- no panic should have been logged for
    // the unwind a self-delete uses internally.
    let (status, _) = rkernel::t_getreg(&k, id.get(), 0);
    assert_eq!(status, Status::ObjectDeleted);
}

#[test]
fn t_ident_null_resolves_to_caller() {
    let k = Kernel::new();
    let (status, self_id) = common::run_in_task(&k, "IDNT", 100, |k| rkernel::t_ident(&k, common::name("")));
    assert_eq!(status, Status::Ok);
    assert_ne!(self_id.get(), 0);
}

#[test]
fn t_ident_unknown_name_not_found() {
    let k = Kernel::new();
    let (status, id) = rkernel::t_ident(&k, common::name("NONE"));
    assert_eq!(status, Status::ObjectNotFound);
    assert_eq!(id.get(), 0);
}

#[test]
fn setpri_rejects_out_of_range_and_returns_old_value() {
    let k = Kernel::new();
    let (status, id) = rkernel::t_create(&k, common::name("PRIO"), 50, TaskMode::PREEMPT);
    assert_eq!(status, Status::Ok);

    let (status, old) = rkernel::t_setpri(&k, id.get(), 80);
    assert_eq!(status, Status::Ok);
    assert_eq!(old, 50);

    let (status, _) = rkernel::t_setpri(&k, id.get(), 0);
    assert_eq!(status, Status::InvalidPriority);
}

#[test]
fn registers_round_trip_and_reject_bad_index() {
    let k = Kernel::new();
    let (status, id) = rkernel::t_create(&k, common::name("REGS"), 50, TaskMode::PREEMPT);
    assert_eq!(status, Status::Ok);

    let status = rkernel::t_setreg(&k, id.get(), 3, 0xdead_beef);
    assert_eq!(status, Status::Ok);
    let (status, value) = rkernel::t_getreg(&k, id.get(), 3);
    assert_eq!(status, Status::Ok);
    assert_eq!(value, 0xdead_beef);

    let status = rkernel::t_setreg(&k, id.get(), 99, 0);
    assert_eq!(status, Status::InvalidRegister);
}

#[test]
fn suspend_twice_and_resume_not_suspended_both_error() {
    let k = Kernel::new();
    let (status, id) = rkernel::t_create(&k, common::name("SUSP"), 50, TaskMode::PREEMPT);
    assert_eq!(status, Status::Ok);

    assert_eq!(rkernel::t_suspend(&k, id.get()), Status::Ok);
    assert_eq!(rkernel::t_suspend(&k, id.get()), Status::AlreadySuspended);
    assert_eq!(rkernel::t_resume(&k, id.get()), Status::Ok);
    assert_eq!(rkernel::t_resume(&k, id.get()), Status::NotSuspended);
}

#[test]
fn suspended_waiter_does_not_dequeue_until_resumed() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_create(&k, common::name("SUSQ"), 4, rkernel::abi::QueueOpts::empty());
    assert_eq!(status, Status::Ok);

    let reached = Arc::new(AtomicBool::new(false));
    let reached_clone = reached.clone();
    let barrier = Arc::new(std::sync::Barrier::new(2));
    let barrier_clone = barrier.clone();

    let id = common::spawn(&k, "SLOW", 50, move |k| {
        barrier_clone.wait();
        let (status, _msg) = rkernel::q_receive(&k, queue, Wait::Forever);
        assert_eq!(status, Status::Ok);
        reached_clone.store(true, Ordering::SeqCst);
    });
    barrier.wait();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(rkernel::t_suspend(&k, id.get()), Status::Ok);

    // A message is available and this waiter is the one selected, but it
    // must not be dequeued while suspended.
    assert_eq!(rkernel::q_send(&k, queue, [1, 0, 0, 0]), Status::Ok);
    std::thread::sleep(Duration::from_millis(50));
    assert!(!reached.load(Ordering::SeqCst), "suspended waiter dequeued anyway");

    assert_eq!(rkernel::t_resume(&k, id.get()), Status::Ok);
    std::thread::sleep(Duration::from_millis(50));
    assert!(reached.load(Ordering::SeqCst), "resumed waiter never dequeued");
}

#[test]
fn cross_task_delete_removes_the_victim_and_unblocks_its_wait() {
    let k = Kernel::new();
    let victim = common::spawn(&k, "VICT", 50, |k| {
        // Blocks forever until cancelled by t_delete.
        let _ = rkernel::tm_wkafter(&k, u32::MAX);
    });
    // Give the victim a chance to actually enter its wait loop.
    std::thread::sleep(Duration::from_millis(30));

    let status = rkernel::t_delete(&k, victim.get());
    assert_eq!(status, Status::Ok);

    // The victim's id no longer resolves to anything.
    let (status, _) = rkernel::t_getreg(&k, victim.get(), 0);
    assert_eq!(status, Status::ObjectDeleted);
}

#[test]
fn noevents_nowait_returns_immediately() {
    let k = Kernel::new();
    let (status, bits) = common::run_in_task(&k, "EVNW", 50, |k| {
        rkernel::ev_receive(&k, 0x1, rkernel::abi::EventOpts::NOWAIT, 0)
    });
    assert_eq!(status, Status::NoEvents);
    assert_eq!(bits, 0);
}

#[test]
fn event_timeout_reports_status_timeout() {
    let k = Kernel::new();
    let (status, _bits) = common::run_in_task(&k, "EVTO", 50, |k| {
        rkernel::ev_receive(&k, 0x1, rkernel::abi::EventOpts::empty(), 2)
    });
    assert_eq!(status, Status::Timeout);
}

#[test]
fn wkafter_zero_ticks_returns_immediately() {
    let k = Kernel::new();
    let status = common::run_in_task(&k, "WK0", 50, |k| rkernel::tm_wkafter(&k, 0));
    assert_eq!(status, Status::Ok);
}

