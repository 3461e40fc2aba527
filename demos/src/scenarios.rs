//! The six literal scenarios from the testable-properties section,
//! reproduced as runnable programs against the public `rkernel` API.

use std::sync::mpsc;
use std::time::Duration;

use rkernel::abi::{Name, PartOpts, QueueOpts, SchedPolicy, Status, TaskMode, Wait};
use rkernel::Kernel;

fn name(s: &str) -> Name {
    Name::from_str_lossy(s)
}

fn spawn_receiver(
    k: &Kernel,
    task_name: &str,
    priority: u16,
    body: impl FnOnce(Kernel) + Send + 'static,
) {
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
}

/// **FIFO queue ordering.** QUE1, FIFO, capacity 9, fixed. T2 (pri 10), T5
/// (pri 15), T8 (pri 20) pend in that enqueue order; the producer sends
/// `#1..#9`; each waiter should receive its own run of three in order.
/// Capacity matches the full send burst so the non-blocking `q_send` below
/// can never legitimately race ahead of the three consumers and hit
/// `QueueFull`.
pub fn fifo_queue_ordering(k: &Kernel) {
    let (status, queue) =
        rkernel::q_create(k, name("QUE1"), 9, QueueOpts::LIMIT);
    assert_eq!(status, Status::Ok);

    let (tx2, rx2) = mpsc::channel();
    let (tx5, rx5) = mpsc::channel();
    let (tx8, rx8) = mpsc::channel();
    let barrier = std::sync::Arc::new(std::sync::Barrier::new(4));

    for (task_name, priority, tx, barrier) in [
        ("T2", 10u16, tx2, barrier.clone()),
        ("T5", 15, tx5, barrier.clone()),
        ("T8", 20, tx8, barrier.clone()),
    ] {
        spawn_receiver(k, task_name, priority, move |k| {
            barrier.wait();
            for _ in 0..3 {
                let (status, msg) = rkernel::q_receive(&k, queue, Wait::Forever);
                assert_eq!(status, Status::Ok);
                tx.send(msg).unwrap();
            }
        });
    }
    barrier.wait();
    std::thread::sleep(Duration::from_millis(20));
    for n in 1..=9u32 {
        let status = rkernel::q_send(k, queue, [n, 0, 0, 0]);
        assert_eq!(status, Status::Ok, "q_send #{n}");
    }

    let got2: Vec<_> = rx2.iter().take(3).collect();
    let got5: Vec<_> = rx5.iter().take(3).collect();
    let got8: Vec<_> = rx8.iter().take(3).collect();
    log::info!("scenario 1: T2={got2:?} T5={got5:?} T8={got8:?}");
}

/// **Priority queue ordering.** Same as (1) but over a priority-pend
/// variable-length queue. T9 should drain first, then T6, then T3.
/// Capacity 9 for the same reason as `fifo_queue_ordering`: the full send
/// burst must fit without depending on consumer drain speed.
pub fn priority_queue_ordering(k: &Kernel) {
    let (status, queue) =
        rkernel::q_vcreate(k, name("VQU1"), 9, 16, QueueOpts::PRIORITY);
    assert_eq!(status, Status::Ok);

    let (tx9, rx9) = mpsc::channel();
    let (tx6, rx6) = mpsc::channel();
    let (tx3, rx3) = mpsc::channel();
    let barrier = std::sync::Arc::new(std::sync::Barrier::new(4));

    for (task_name, priority, tx, barrier) in [
        ("T3", 5u16, tx3, barrier.clone()),
        ("T6", 10, tx6, barrier.clone()),
        ("T9", 20, tx9, barrier.clone()),
    ] {
        spawn_receiver(k, task_name, priority, move |k| {
            barrier.wait();
            for _ in 0..3 {
                let (status, msg) = rkernel::q_vreceive(&k, queue, 16, Wait::Forever);
                assert_eq!(status, Status::Ok);
                tx.send(msg).unwrap();
            }
        });
    }
    barrier.wait();
    std::thread::sleep(Duration::from_millis(20));
    for n in 1..=9u8 {
        let status = rkernel::q_vsend(k, queue, &[n]);
        assert_eq!(status, Status::Ok, "q_vsend #{n}");
    }

    let got9: Vec<_> = rx9.iter().take(3).collect();
    let got6: Vec<_> = rx6.iter().take(3).collect();
    let got3: Vec<_> = rx3.iter().take(3).collect();
    log::info!("scenario 2: T9={got9:?} T6={got6:?} T3={got3:?}");
}

/// **Zero-capacity queue.** A capacity-0 fixed queue only accepts a send
/// while a receiver is already pending; T8 receives it and the send
/// succeeds.
pub fn zero_capacity_queue(k: &Kernel) {
    let (status, queue) = rkernel::q_create(k, name("QUE0"), 0, QueueOpts::empty());
    assert_eq!(status, Status::Ok);

    let (tx, rx) = mpsc::channel();
    let barrier = std::sync::Arc::new(std::sync::Barrier::new(2));
    {
        let barrier = barrier.clone();
        spawn_receiver(k, "T8", 20, move |k| {
            barrier.wait();
            let (status, msg) = rkernel::q_receive(&k, queue, Wait::Forever);
            tx.send((status, msg)).unwrap();
        });
    }
    barrier.wait();
    std::thread::sleep(Duration::from_millis(20));
    let send_status = rkernel::q_send(k, queue, [42, 0, 0, 0]);
    let (recv_status, msg) = rx.recv().unwrap();
    log::info!(
        "scenario 3: send={send_status:?} recv={recv_status:?} msg={msg:?}"
    );
}

/// **Broadcast.** With T2/T5/T8 all pending, `q_broadcast` should report
/// `awakened == 3` and every waiter should observe the broadcast payload.
pub fn broadcast(k: &Kernel) {
    let (status, queue) = rkernel::q_create(k, name("QUE2"), 4, QueueOpts::empty());
    assert_eq!(status, Status::Ok);

    let (tx, rx) = mpsc::channel();
    let barrier = std::sync::Arc::new(std::sync::Barrier::new(4));
    for task_name in ["T2", "T5", "T8"] {
        let tx = tx.clone();
        let barrier = barrier.clone();
        spawn_receiver(k, task_name, 10, move |k| {
            barrier.wait();
            let (status, msg) = rkernel::q_receive(&k, queue, Wait::Forever);
            tx.send((status, msg)).unwrap();
        });
    }
    barrier.wait();
    std::thread::sleep(Duration::from_millis(20));
    let (status, awakened) = rkernel::q_broadcast(k, queue, [7, 7, 7, 7]);
    assert_eq!(status, Status::Ok);
    assert_eq!(awakened, 3);
    let results: Vec<_> = rx.iter().take(3).collect();
    log::info!("scenario 4: awakened={awakened} results={results:?}");
}

/// **Delete-with-waiters.** T2/T5/T8 pend; another task deletes QUE1; every
/// waiter returns `queue-killed`; the deleter returns
/// `tasks-at-queue-delete`; a subsequent `q_send` returns `object-deleted`.
pub fn delete_with_waiters(k: &Kernel) {
    let (status, queue) = rkernel::q_create(k, name("QUE1"), 4, QueueOpts::empty());
    assert_eq!(status, Status::Ok);

    let (tx, rx) = mpsc::channel();
    let barrier = std::sync::Arc::new(std::sync::Barrier::new(4));
    for task_name in ["T2", "T5", "T8"] {
        let tx = tx.clone();
        let barrier = barrier.clone();
        spawn_receiver(k, task_name, 10, move |k| {
            barrier.wait();
            let (status, _msg) = rkernel::q_receive(&k, queue, Wait::Forever);
            tx.send(status).unwrap();
        });
    }
    barrier.wait();
    std::thread::sleep(Duration::from_millis(20));
    let delete_status = rkernel::q_delete(k, queue);
    let waiter_statuses: Vec<_> = rx.iter().take(3).collect();
    let resend_status = rkernel::q_send(k, queue, [0; 4]);
    log::info!(
        "scenario 5: delete={delete_status:?} waiters={waiter_statuses:?} resend={resend_status:?}"
    );
}

/// **Partition double-free and out-of-range.** 32×16-byte partition; get,
/// return, return again (`buffer-already-free`); an out-of-range address
/// (`invalid-buffer-address`); creating with block size 15
/// (`buffer-size-error`).
pub fn partition_double_free(k: &Kernel) {
    let (status, part) =
        rkernel::pt_create(k, name("PART"), 16, 32, PartOpts::empty());
    assert_eq!(status, Status::Ok);

    let (status, addr) = rkernel::pt_getbuf(k, part);
    assert_eq!(status, Status::Ok);
    let first_return = rkernel::pt_retbuf(k, part, addr);
    let second_return = rkernel::pt_retbuf(k, part, addr);
    let out_of_range = rkernel::pt_retbuf(k, part, addr + 16 * 32);

    let (bad_size_status, _) =
        rkernel::pt_create(k, name("BAD1"), 15, 8, PartOpts::empty());

    log::info!(
        "scenario 6: first_return={first_return:?} second_return={second_return:?} \
         out_of_range={out_of_range:?} bad_size={bad_size_status:?}"
    );
}
