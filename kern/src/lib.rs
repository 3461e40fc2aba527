//! A user-space emulation of a classical RTOS kernel API, running each task
//! as a host thread under a [`Kernel`] context (§2, §3).
//!
//! Every blocking entry point here behaves as the historical API's manual
//! pages describe: wait queues, AND/OR event rendezvous, FIFO and
//! priority-pend message queues, counting semaphores, and fixed-block
//! partitions, all returning a flat [`rkernel_abi::Status`] code rather than
//! a `Result`. See `rkernel_abi` for the wire-level vocabulary (ids, option
//! bits, the status taxonomy) this crate's function signatures are built
//! from.
//!
//! Start with [`Kernel::new`], spawn a bootstrap task with [`t_create`] /
//! [`t_start`], and have its entry point build the rest of the system —
//! this mirrors the historical "privileged bootstrap thread calls
//! `user_sysroot`" entry sequence (§6).

mod context;
mod diag;
mod err;
mod event;
mod partition;
mod queue;
mod sched_lock;
mod sem;
mod task;
mod time;
mod vqueue;
mod wait_queue;

pub use context::Kernel;
pub use diag::Event;

pub use event::{ev_receive, ev_send};
pub use partition::{pt_create, pt_delete, pt_getbuf, pt_ident, pt_retbuf};
pub use queue::{q_broadcast, q_create, q_delete, q_ident, q_receive, q_send, q_urgent};
pub use sem::{sm_create, sm_delete, sm_ident, sm_p, sm_v};
pub use task::{
    t_create, t_delete, t_getreg, t_ident, t_mode, t_resume, t_setpri, t_setreg, t_start,
    t_suspend, TaskEntry,
};
pub use time::tm_wkafter;
pub use vqueue::{q_vbroadcast, q_vcreate, q_vdelete, q_vident, q_vreceive, q_vsend, q_vurgent};

pub use rkernel_abi as abi;
