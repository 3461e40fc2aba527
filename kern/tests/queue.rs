mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use rkernel::abi::{QueueOpts, Status, Wait};
use rkernel::Kernel;

#[test]
fn fifo_order_is_enqueue_order() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_create(&k, common::name("Q1"), 4, QueueOpts::LIMIT);
    assert_eq!(status, Status::Ok);

    let (tx1, rx1) = mpsc::channel();
    let (tx2, rx2) = mpsc::channel();

    // Spawned sequentially, each given time to register as a waiter before
    // the next one starts, so enqueue order is deterministic: A before B.
    for (task, tx) in [("A", tx1), ("B", tx2)] {
        common::spawn(&k, task, 10, move |k| {
            let (status, msg) = rkernel::q_receive(&k, queue, Wait::Forever);
            assert_eq!(status, Status::Ok);
            tx.send(msg[0]).unwrap();
        });
        std::thread::sleep(Duration::from_millis(20));
    }

    rkernel::q_send(&k, queue, [1, 0, 0, 0]);
    rkernel::q_send(&k, queue, [2, 0, 0, 0]);

    // A pended first, so A gets message #1 and B gets #2.
    assert_eq!(rx1.recv().unwrap(), 1);
    assert_eq!(rx2.recv().unwrap(), 2);
}

#[test]
fn priority_order_overrides_enqueue_order() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_create(&k, common::name("Q2"), 1, QueueOpts::PRIORITY | QueueOpts::LIMIT);
    assert_eq!(status, Status::Ok);

    let (tx_low, rx_low) = mpsc::channel();
    let (tx_high, rx_high) = mpsc::channel();
    let barrier = Arc::new(std::sync::Barrier::new(3));

    // Low-priority pends first, high-priority second; priority order should
    // still hand the message to the high-priority waiter.
    {
        let barrier = barrier.clone();
        common::spawn(&k, "LOW", 5, move |k| {
            barrier.wait();
            let (status, msg) = rkernel::q_receive(&k, queue, Wait::Forever);
            assert_eq!(status, Status::Ok);
            tx_low.send(msg[0]).unwrap();
        });
    }
    {
        let barrier = barrier.clone();
        common::spawn(&k, "HIGH", 200, move |k| {
            barrier.wait();
            let (status, msg) = rkernel::q_receive(&k, queue, Wait::Forever);
            assert_eq!(status, Status::Ok);
            tx_high.send(msg[0]).unwrap();
        });
    }
    barrier.wait();
    std::thread::sleep(Duration::from_millis(30));

    rkernel::q_send(&k, queue, [7, 0, 0, 0]);
    assert_eq!(rx_high.recv().unwrap(), 7);

    rkernel::q_send(&k, queue, [8, 0, 0, 0]);
    assert_eq!(rx_low.recv().unwrap(), 8);
}

#[test]
fn fixed_capacity_queue_rejects_overflow_without_limit_bit_clear() {
    let k = Kernel::new();
    // LIMIT set: never grows past the initial capacity.
    let (status, queue) = rkernel::q_create(&k, common::name("Q3"), 2, QueueOpts::LIMIT);
    assert_eq!(status, Status::Ok);

    assert_eq!(rkernel::q_send(&k, queue, [1, 0, 0, 0]), Status::Ok);
    assert_eq!(rkernel::q_send(&k, queue, [2, 0, 0, 0]), Status::Ok);
    assert_eq!(rkernel::q_send(&k, queue, [3, 0, 0, 0]), Status::QueueFull);
}

#[test]
fn extensible_queue_grows_by_its_initial_capacity() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_create(&k, common::name("Q4"), 2, QueueOpts::empty());
    assert_eq!(status, Status::Ok);

    assert_eq!(rkernel::q_send(&k, queue, [1, 0, 0, 0]), Status::Ok);
    assert_eq!(rkernel::q_send(&k, queue, [2, 0, 0, 0]), Status::Ok);
    // Capacity was 2, now grows to 4 instead of rejecting.
    assert_eq!(rkernel::q_send(&k, queue, [3, 0, 0, 0]), Status::Ok);
    assert_eq!(rkernel::q_send(&k, queue, [4, 0, 0, 0]), Status::Ok);
    assert_eq!(rkernel::q_send(&k, queue, [5, 0, 0, 0]), Status::QueueFull);
}

#[test]
fn urgent_send_jumps_the_line_within_its_extra_slot() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_create(&k, common::name("Q5"), 2, QueueOpts::LIMIT);
    assert_eq!(status, Status::Ok);

    assert_eq!(rkernel::q_send(&k, queue, [1, 0, 0, 0]), Status::Ok);
    assert_eq!(rkernel::q_send(&k, queue, [2, 0, 0, 0]), Status::Ok);
    // The queue is at capacity, but urgent gets one extra slot.
    assert_eq!(rkernel::q_urgent(&k, queue, [9, 0, 0, 0]), Status::Ok);
    // A second urgent beyond the reserved slot does not fit.
    assert_eq!(rkernel::q_urgent(&k, queue, [10, 0, 0, 0]), Status::QueueFull);

    let (status, first) = common::run_in_task(&k, "RCV5", 10, move |k| {
        rkernel::q_receive(&k, queue, Wait::NoWait)
    });
    assert_eq!(status, Status::Ok);
    assert_eq!(first, [9, 0, 0, 0]);
}

#[test]
fn zero_capacity_queue_is_a_pure_rendezvous() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_create(&k, common::name("Q0"), 0, QueueOpts::empty());
    assert_eq!(status, Status::Ok);

    // No receiver pending: the send is rejected outright.
    assert_eq!(rkernel::q_send(&k, queue, [1, 0, 0, 0]), Status::QueueFull);

    let (tx, rx) = mpsc::channel();
    let barrier = Arc::new(std::sync::Barrier::new(2));
    {
        let barrier = barrier.clone();
        common::spawn(&k, "RCV", 10, move |k| {
            barrier.wait();
            let (status, msg) = rkernel::q_receive(&k, queue, Wait::Forever);
            tx.send((status, msg)).unwrap();
        });
    }
    barrier.wait();
    std::thread::sleep(Duration::from_millis(20));

    assert_eq!(rkernel::q_send(&k, queue, [42, 0, 0, 0]), Status::Ok);
    let (status, msg) = rx.recv().unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(msg, [42, 0, 0, 0]);
}

#[test]
fn broadcast_wakes_every_waiter_with_the_same_message() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_create(&k, common::name("Q6"), 4, QueueOpts::empty());
    assert_eq!(status, Status::Ok);

    let (tx, rx) = mpsc::channel();
    let barrier = Arc::new(std::sync::Barrier::new(4));
    for task in ["A", "B", "C"] {
        let tx = tx.clone();
        let barrier = barrier.clone();
        common::spawn(&k, task, 10, move |k| {
            barrier.wait();
            let (status, msg) = rkernel::q_receive(&k, queue, Wait::Forever);
            tx.send((status, msg)).unwrap();
        });
    }
    barrier.wait();
    std::thread::sleep(Duration::from_millis(20));

    let (status, awakened) = rkernel::q_broadcast(&k, queue, [5, 5, 5, 5]);
    assert_eq!(status, Status::Ok);
    assert_eq!(awakened, 3);

    for _ in 0..3 {
        let (status, msg) = rx.recv().unwrap();
        assert_eq!(status, Status::Ok);
        assert_eq!(msg, [5, 5, 5, 5]);
    }
}

#[test]
fn broadcast_with_no_waiters_is_a_no_op() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_create(&k, common::name("Q7"), 4, QueueOpts::empty());
    assert_eq!(status, Status::Ok);

    let (status, awakened) = rkernel::q_broadcast(&k, queue, [0; 4]);
    assert_eq!(status, Status::Ok);
    assert_eq!(awakened, 0);
}

#[test]
fn delete_kills_every_waiter_and_reports_tasks_at_delete() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_create(&k, common::name("Q8"), 4, QueueOpts::empty());
    assert_eq!(status, Status::Ok);

    let (tx, rx) = mpsc::channel();
    let barrier = Arc::new(std::sync::Barrier::new(3));
    for task in ["A", "B"] {
        let tx = tx.clone();
        let barrier = barrier.clone();
        common::spawn(&k, task, 10, move |k| {
            barrier.wait();
            let (status, _msg) = rkernel::q_receive(&k, queue, Wait::Forever);
            tx.send(status).unwrap();
        });
    }
    barrier.wait();
    std::thread::sleep(Duration::from_millis(20));

    let delete_status = rkernel::q_delete(&k, queue);
    assert_eq!(delete_status, Status::TasksAtQueueDelete);

    for _ in 0..2 {
        assert_eq!(rx.recv().unwrap(), Status::QueueKilled);
    }

    // The control block is gone.
    assert_eq!(rkernel::q_send(&k, queue, [0; 4]), Status::ObjectDeleted);
}

#[test]
fn nowait_receive_on_an_empty_queue_reports_no_message() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_create(&k, common::name("Q9"), 4, QueueOpts::empty());
    assert_eq!(status, Status::Ok);
    let (status, _msg) = common::run_in_task(&k, "RCV9", 10, move |k| {
        rkernel::q_receive(&k, queue, Wait::NoWait)
    });
    assert_eq!(status, Status::NoMessage);
}

#[test]
fn timed_receive_on_an_empty_queue_times_out() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_create(&k, common::name("QA"), 4, QueueOpts::empty());
    assert_eq!(status, Status::Ok);
    let (status, _msg) = common::run_in_task(&k, "RCVA", 10, move |k| {
        rkernel::q_receive(&k, queue, Wait::Ticks(2))
    });
    assert_eq!(status, Status::Timeout);
}
