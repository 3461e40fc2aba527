mod common;

use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use rkernel::abi::{QueueOpts, Status, Wait};
use rkernel::Kernel;

#[test]
fn priority_order_overrides_enqueue_order() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_vcreate(&k, common::name("VQ1"), 4, 8, QueueOpts::PRIORITY);
    assert_eq!(status, Status::Ok);

    let (tx_low, rx_low) = mpsc::channel();
    let (tx_high, rx_high) = mpsc::channel();
    let barrier = Arc::new(std::sync::Barrier::new(3));
    {
        let barrier = barrier.clone();
        common::spawn(&k, "LOW", 5, move |k| {
            barrier.wait();
            let (status, msg) = rkernel::q_vreceive(&k, queue, 8, Wait::Forever);
            assert_eq!(status, Status::Ok);
            tx_low.send(msg).unwrap();
        });
    }
    {
        let barrier = barrier.clone();
        common::spawn(&k, "HIGH", 200, move |k| {
            barrier.wait();
            let (status, msg) = rkernel::q_vreceive(&k, queue, 8, Wait::Forever);
            assert_eq!(status, Status::Ok);
            tx_high.send(msg).unwrap();
        });
    }
    barrier.wait();
    std::thread::sleep(Duration::from_millis(30));

    rkernel::q_vsend(&k, queue, &[1, 2, 3]);
    assert_eq!(rx_high.recv().unwrap(), vec![1, 2, 3]);

    rkernel::q_vsend(&k, queue, &[4, 5]);
    assert_eq!(rx_low.recv().unwrap(), vec![4, 5]);
}

#[test]
fn oversized_message_is_rejected_at_send() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_vcreate(&k, common::name("VQ2"), 4, 4, QueueOpts::empty());
    assert_eq!(status, Status::Ok);
    let status = rkernel::q_vsend(&k, queue, &[0, 1, 2, 3, 4]);
    assert_eq!(status, Status::MessageSizeError);
}

#[test]
fn undersized_receive_buffer_is_rejected_before_blocking() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_vcreate(&k, common::name("VQ3"), 4, 16, QueueOpts::empty());
    assert_eq!(status, Status::Ok);
    let (status, msg) = common::run_in_task(&k, "SHORT", 10, move |k| {
        rkernel::q_vreceive(&k, queue, 8, Wait::NoWait)
    });
    assert_eq!(status, Status::BufferSizeError);
    assert!(msg.is_empty());
}

#[test]
fn full_queue_rejects_without_growing() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_vcreate(&k, common::name("VQ4"), 1, 4, QueueOpts::empty());
    assert_eq!(status, Status::Ok);
    assert_eq!(rkernel::q_vsend(&k, queue, &[1]), Status::Ok);
    assert_eq!(rkernel::q_vsend(&k, queue, &[2]), Status::QueueFull);
}

#[test]
fn zero_capacity_variable_queue_is_a_pure_rendezvous() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_vcreate(&k, common::name("VQ0"), 0, 4, QueueOpts::empty());
    assert_eq!(status, Status::Ok);
    assert_eq!(rkernel::q_vsend(&k, queue, &[1]), Status::QueueFull);

    let (tx, rx) = mpsc::channel();
    let barrier = Arc::new(std::sync::Barrier::new(2));
    {
        let barrier = barrier.clone();
        common::spawn(&k, "RCV", 10, move |k| {
            barrier.wait();
            let (status, msg) = rkernel::q_vreceive(&k, queue, 4, Wait::Forever);
            tx.send((status, msg)).unwrap();
        });
    }
    barrier.wait();
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(rkernel::q_vsend(&k, queue, &[9]), Status::Ok);
    let (status, msg) = rx.recv().unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(msg, vec![9]);
}

#[test]
fn delete_reports_messages_at_delete_when_no_waiters_are_present() {
    let k = Kernel::new();
    let (status, queue) = rkernel::q_vcreate(&k, common::name("VQ5"), 4, 4, QueueOpts::empty());
    assert_eq!(status, Status::Ok);
    assert_eq!(rkernel::q_vsend(&k, queue, &[1]), Status::Ok);
    assert_eq!(rkernel::q_vdelete(&k, queue), Status::MessagesAtQueueDelete);
}

#[test]
fn ids_for_variable_queues_start_at_zero() {
    let k = Kernel::new();
    let (status, first) = rkernel::q_vcreate(&k, common::name("VQ6"), 1, 1, QueueOpts::empty());
    assert_eq!(status, Status::Ok);
    assert_eq!(first.get(), 0);
}
