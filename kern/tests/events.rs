mod common;

use std::sync::mpsc;
use std::time::Duration;

use rkernel::abi::{EventOpts, Status};
use rkernel::Kernel;

#[test]
fn or_rule_matches_on_any_requested_bit() {
    let k = Kernel::new();
    let (tx, rx) = mpsc::channel();
    let id = common::spawn(&k, "OR", 10, move |k| {
        let result = rkernel::ev_receive(&k, 0b0110, EventOpts::empty(), 0);
        tx.send(result).unwrap();
    });
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(rkernel::ev_send(&k, id, 0b0010), Status::Ok);

    let (status, bits) = rx.recv().unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(bits, 0b0010);
}

#[test]
fn and_rule_requires_every_requested_bit_before_matching() {
    let k = Kernel::new();
    let (tx, rx) = mpsc::channel();
    let id = common::spawn(&k, "AND", 10, move |k| {
        let result = rkernel::ev_receive(&k, 0b0110, EventOpts::AND, 0);
        tx.send(result).unwrap();
    });
    std::thread::sleep(Duration::from_millis(20));

    // Posting only one of the two required bits must not satisfy the AND.
    rkernel::ev_send(&k, id, 0b0010);
    assert!(rx.try_recv().is_err(), "AND rule matched on a partial set");

    rkernel::ev_send(&k, id, 0b0100);
    let (status, bits) = rx.recv().unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(bits, 0b0110);
}

#[test]
fn bits_outside_the_mask_are_left_pending_and_do_not_satisfy_it() {
    let k = Kernel::new();
    let (tx, rx) = mpsc::channel();
    let id = common::spawn(&k, "FILT", 10, move |k| {
        let result = rkernel::ev_receive(&k, 0b0001, EventOpts::empty(), 0);
        tx.send(result).unwrap();
    });
    std::thread::sleep(Duration::from_millis(20));

    rkernel::ev_send(&k, id, 0b1000);
    assert!(rx.try_recv().is_err(), "matched on a bit outside the mask");

    rkernel::ev_send(&k, id, 0b0001);
    let (status, bits) = rx.recv().unwrap();
    assert_eq!(status, Status::Ok);
    assert_eq!(bits, 0b0001);
}

#[test]
fn ev_send_to_a_deleted_task_reports_object_deleted() {
    let k = Kernel::new();
    let (status, id) = rkernel::t_create(&k, common::name("GONE"), 10, rkernel::abi::TaskMode::PREEMPT);
    assert_eq!(status, Status::Ok);
    // Never started, so there is nothing to deliver to; use delete to make
    // sure the id is gone from the table either way.
    assert_eq!(rkernel::t_delete(&k, id.get()), Status::Ok);
    assert_eq!(rkernel::ev_send(&k, id, 0x1), Status::ObjectDeleted);
}
