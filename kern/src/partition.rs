//! Fixed-block memory partitions: a free-list allocator over a region cut
//! into equal blocks (§4.8).
//!
//! The historical API hands out raw pointers into the backing region and
//! threads the free list through a next-pointer written into each free
//! block. §9 asks for that raw pointer graph to become an arena plus
//! integer handles instead; here the "arena" is implicit (we never
//! materialize the backing bytes at all, since nothing in this family
//! actually reads or writes through the buffer) and the free list is a
//! plain `VecDeque` of block indices. [`BufferAddr`] — a block-aligned byte
//! offset — takes the place of the historical pointer at the public
//! boundary, so address-range and double-free checks are still expressed
//! exactly as the source does them: arithmetic against `[0, total_size)`.

use std::collections::VecDeque;
use std::sync::Mutex;

use rkernel_abi::{BufferAddr, Name, PartId, PartOpts, Status};

use crate::context::{Kernel, Named};
use crate::diag::Event;

struct Inner {
    free_list: VecDeque<usize>,
}

pub(crate) struct PartitionState {
    id: PartId,
    name: Name,
    block_size: usize,
    block_count: usize,
    opts: PartOpts,
    inner: Mutex<Inner>,
}

impl Named for PartitionState {
    fn name(&self) -> Name {
        self.name
    }
}

impl PartitionState {
    fn new(id: u32, name: Name, block_size: usize, block_count: usize, opts: PartOpts) -> Self {
        PartitionState {
            id: PartId(id),
            name,
            block_size,
            block_count,
            opts,
            inner: Mutex::new(Inner {
                free_list: (0..block_count).collect(),
            }),
        }
    }
}

/// `block_size` must be at least 4 and even — the historical minimum for a
/// block large enough to carry its own free-list link plus alignment
/// padding. `opts` carries the delete-while-in-use permission checked by
/// [`pt_delete`].
pub fn pt_create(
    k: &Kernel,
    name: Name,
    block_size: usize,
    block_count: usize,
    opts: PartOpts,
) -> (Status, PartId) {
    if block_size < 4 || block_size % 2 != 0 {
        return (Status::PartitionBufferSizeError, PartId(0));
    }
    match k
        .parts()
        .insert(|id| PartitionState::new(id, name, block_size, block_count, opts))
    {
        Some((id, _)) => {
            k.diag().record(Event::PartitionCreated(id));
            (Status::Ok, PartId(id))
        }
        None => (Status::ObjectTableFull, PartId(0)),
    }
}

/// O(1) pop from the free list's head.
pub fn pt_getbuf(k: &Kernel, id: PartId) -> (Status, BufferAddr) {
    let Some(p) = k.parts().get(id.0) else {
        return (Status::ObjectDeleted, 0);
    };
    let mut inner = p.inner.lock().unwrap();
    match inner.free_list.pop_front() {
        Some(idx) => (Status::Ok, (idx * p.block_size) as BufferAddr),
        None => (Status::NoBuffer, 0),
    }
}

/// Validates `addr` against the partition's extent, rejects a double-free
/// by scanning the free list, then splices the block onto the tail so
/// reused blocks rotate through the whole region (§4.8).
pub fn pt_retbuf(k: &Kernel, id: PartId, addr: BufferAddr) -> Status {
    let Some(p) = k.parts().get(id.0) else {
        return Status::ObjectDeleted;
    };
    let addr = addr as usize;
    if addr % p.block_size != 0 {
        return Status::InvalidBufferAddress;
    }
    let idx = addr / p.block_size;
    if idx >= p.block_count {
        return Status::InvalidBufferAddress;
    }
    let mut inner = p.inner.lock().unwrap();
    if inner.free_list.contains(&idx) {
        return Status::BufferAlreadyFree;
    }
    inner.free_list.push_back(idx);
    Status::Ok
}

pub fn pt_delete(k: &Kernel, id: PartId) -> Status {
    let Some(p) = k.parts().get(id.0) else {
        return Status::ObjectDeleted;
    };
    {
        let inner = p.inner.lock().unwrap();
        let used = p.block_count - inner.free_list.len();
        if used > 0 && !p.opts.contains(PartOpts::DELETE_IN_USE) {
            return Status::BufferInUse;
        }
    }
    k.parts().remove(id.0);
    k.diag().record(Event::PartitionDeleted(id.0));
    Status::Ok
}

pub fn pt_ident(k: &Kernel, name: Name) -> (Status, PartId) {
    match k.parts().ident(name) {
        Some(id) => (Status::Ok, PartId(id)),
        None => (Status::ObjectNotFound, PartId(0)),
    }
}
