//! # Fixed-Block Message Pool
//!
//! A deterministic no-heap allocator for message payloads: up to four size
//! classes, each a fixed number of equal-size blocks, all carved out of one
//! static backing arena at construction. Free blocks of a class chain
//! through an intrusive singly linked list; the link is stored in the block
//! itself as an arena offset, so the pool is position-independent data.
//!
//! Allocation scans the classes in ascending size order and takes the first
//! class that both fits the request and has a free block. Freeing a pointer
//! that never came from the arena is a silent no-op — the ISR send path
//! relies on this when a payload is not pool-owned.
//!
//! With the `pool-debug` feature each block is framed for overwrite
//! detection:
//!
//! ```text
//! [requested size: u32][pad: 2][begin sig: u16][payload ...][end sig: u16]
//! ```
//!
//! The payload is filled with a known pattern on allocation, and any
//! sentinel or size fault found on free is reported through the debug
//! channel. A faulted block is still returned to its free list.
//!
//! Neither [`Pool::alloc`] nor [`Pool::free`] locks; the kernel's public
//! wrappers run them inside a critical section so they are safe against
//! ISR-context use.

use crate::config::{
    POOL_COUNT1, POOL_COUNT2, POOL_COUNT3, POOL_COUNT4, POOL_SIZE1, POOL_SIZE2, POOL_SIZE3,
    POOL_SIZE4,
};

/// Free-list terminator (an offset no block can have).
const NONE: usize = usize::MAX;

/// Block granularity. Strides are rounded up to this so every block start
/// can hold a free-list link and payloads stay word-aligned.
const ALIGN: usize = 8;

#[cfg(feature = "pool-debug")]
const HDR: usize = 8;
#[cfg(feature = "pool-debug")]
const TRAILER: usize = 2;

#[cfg(not(feature = "pool-debug"))]
const HDR: usize = 0;
#[cfg(not(feature = "pool-debug"))]
const TRAILER: usize = 0;

#[cfg(feature = "pool-debug")]
const SIG_BEGIN: u16 = 0xDEAD;
#[cfg(feature = "pool-debug")]
const SIG_END: u16 = 0xFFED;
#[cfg(feature = "pool-debug")]
const FILL_PATTERN: u8 = 0xEE;

const fn round_up(n: usize) -> usize {
    (n + (ALIGN - 1)) & !(ALIGN - 1)
}

/// Bytes one block of a class occupies in the arena, instrumentation
/// included. Zero for an omitted class.
const fn stride(size: usize) -> usize {
    if size == 0 {
        0
    } else {
        HDR + round_up(size + TRAILER)
    }
}

/// Total backing storage. Every configured class contributes
/// `count * stride(size)`; an omitted class contributes zero.
const POOL_BYTES: usize = POOL_COUNT1 * stride(POOL_SIZE1)
    + POOL_COUNT2 * stride(POOL_SIZE2)
    + POOL_COUNT3 * stride(POOL_SIZE3)
    + POOL_COUNT4 * stride(POOL_SIZE4);

/// Backing arena, aligned so block starts can be read as `usize` links.
#[repr(align(8))]
struct Arena([u8; POOL_BYTES]);

/// One size class: its region of the arena and its free list head.
#[derive(Clone, Copy)]
struct Class {
    count: usize,
    size: usize,
    /// Arena offset of this class's region.
    base: usize,
    /// Offset of the first free block, or [`NONE`].
    head: usize,
}

const EMPTY_CLASS: Class = Class {
    count: 0,
    size: 0,
    base: 0,
    head: NONE,
};

/// Faults detected while freeing an instrumented block. All fields stay
/// `false` when `pool-debug` is disabled.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PoolFault {
    /// The recorded request size exceeds the class block size.
    pub size_out_of_range: bool,
    /// The begin sentinel was overwritten (payload underwrite).
    pub begin_overwritten: bool,
    /// The end sentinel was overwritten (payload overrun).
    pub end_overwritten: bool,
}

impl PoolFault {
    pub fn any(&self) -> bool {
        self.size_out_of_range || self.begin_overwritten || self.end_overwritten
    }
}

/// The fixed-block pool: four class descriptors over one backing arena.
pub(crate) struct Pool {
    mem: Arena,
    classes: [Class; 4],
}

impl Pool {
    /// An uncarved pool. [`reset`](Self::reset) must run before first use.
    pub const fn new() -> Self {
        Self {
            mem: Arena([0; POOL_BYTES]),
            classes: [EMPTY_CLASS; 4],
        }
    }

    /// Carve the arena for the configured classes, dropping any previous
    /// state. Outstanding blocks become invalid.
    pub fn reset(&mut self) {
        self.configure([
            (POOL_COUNT1, POOL_SIZE1),
            (POOL_COUNT2, POOL_SIZE2),
            (POOL_COUNT3, POOL_SIZE3),
            (POOL_COUNT4, POOL_SIZE4),
        ]);
    }

    /// Carve the arena for an explicit `(count, size)` class table. The
    /// table need not be sorted; classes are put in ascending size order
    /// first so allocation can stop at the first fitting class.
    pub fn configure(&mut self, table: [(usize, usize); 4]) {
        for (class, &(count, size)) in self.classes.iter_mut().zip(table.iter()) {
            *class = Class {
                count,
                size,
                base: 0,
                head: NONE,
            };
        }

        // Bubble sort into ascending size order (n is at most 4).
        let n = self.classes.len();
        for i in (0..n - 1).rev() {
            for j in 0..=i {
                if self.classes[j].size > self.classes[j + 1].size {
                    self.classes.swap(j, j + 1);
                }
            }
        }

        // Chain each class's blocks into its free list.
        let mut off = 0;
        for i in 0..self.classes.len() {
            if self.classes[i].count == 0 {
                continue;
            }
            self.classes[i].base = off;
            let step = stride(self.classes[i].size);
            for _ in 0..self.classes[i].count {
                let head = self.classes[i].head;
                self.set_link_at(off, head);
                self.classes[i].head = off;
                off += step;
            }
        }
        debug_assert!(off <= POOL_BYTES);
    }

    /// Allocate a block of at least `size` bytes. Returns null when `size`
    /// is zero, larger than every class, or every fitting class is empty.
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        if size == 0 {
            return core::ptr::null_mut();
        }
        for i in 0..self.classes.len() {
            let class = self.classes[i];
            if class.count == 0 || size > class.size || class.head == NONE {
                continue;
            }
            let block = class.head;
            self.classes[i].head = self.link_at(block);
            return self.stamp(block, size);
        }
        core::ptr::null_mut()
    }

    /// Return a block to its class. Null pointers and pointers outside the
    /// arena are ignored. Under `pool-debug` the block's sentinels and
    /// recorded size are verified first; faults are reported on the debug
    /// channel and also returned so callers can observe them, but the
    /// block goes back on the free list either way.
    pub fn free(&mut self, ptr: *mut u8) -> Option<PoolFault> {
        if ptr.is_null() {
            return None;
        }
        let base = self.mem.0.as_ptr() as usize;
        let addr = ptr as usize;
        if addr < base || addr >= base + POOL_BYTES {
            return None;
        }
        let off = addr - base;

        for i in 0..self.classes.len() {
            let class = self.classes[i];
            if class.count == 0 {
                continue;
            }
            let span = class.count * stride(class.size);
            if off < class.base + HDR || off >= class.base + span {
                continue;
            }
            let block = off - HDR;

            let fault = self.check_block(block, class.size);
            if fault.any() {
                if fault.size_out_of_range {
                    log::warn!("pool block {:p} size out of range", ptr);
                }
                if fault.begin_overwritten {
                    log::warn!("pool block {:p} begin signature overwrite", ptr);
                }
                if fault.end_overwritten {
                    log::warn!("pool block {:p} end signature overwrite", ptr);
                }
            }

            self.set_link_at(block, self.classes[i].head);
            self.classes[i].head = block;
            return Some(fault);
        }
        None
    }

    /// Read the free-list link stored at the start of a free block.
    fn link_at(&self, off: usize) -> usize {
        // Safety: `off` is a block start inside the arena, 8-aligned.
        unsafe { (self.mem.0.as_ptr().add(off) as *const usize).read() }
    }

    /// Store a free-list link at the start of a free block.
    fn set_link_at(&mut self, off: usize, link: usize) {
        // Safety: `off` is a block start inside the arena, 8-aligned.
        unsafe { (self.mem.0.as_mut_ptr().add(off) as *mut usize).write(link) }
    }

    /// Instrument a freshly popped block and return its payload pointer.
    #[cfg(feature = "pool-debug")]
    fn stamp(&mut self, block: usize, size: usize) -> *mut u8 {
        // Safety: `block` is a block start inside the arena and the class
        // stride leaves room for the header, `size` bytes and the trailer.
        unsafe {
            let p = self.mem.0.as_mut_ptr().add(block);
            (p as *mut u32).write(size as u32);
            (p.add(HDR - 2) as *mut u16).write(SIG_BEGIN);
            let payload = p.add(HDR);
            core::ptr::write_bytes(payload, FILL_PATTERN, size);
            (payload.add(size) as *mut u16).write_unaligned(SIG_END);
            payload
        }
    }

    #[cfg(not(feature = "pool-debug"))]
    fn stamp(&mut self, block: usize, _size: usize) -> *mut u8 {
        // Safety: `block` is a block start inside the arena.
        unsafe { self.mem.0.as_mut_ptr().add(block) }
    }

    /// Verify a block's instrumentation before it goes back on the free
    /// list. The end sentinel is only checked when the recorded size is
    /// plausible, since an out-of-range size would point past the block.
    #[cfg(feature = "pool-debug")]
    fn check_block(&self, block: usize, class_size: usize) -> PoolFault {
        let mut fault = PoolFault::default();
        // Safety: `block` is a block start inside the arena.
        unsafe {
            let p = self.mem.0.as_ptr().add(block);
            let size = (p as *const u32).read() as usize;
            if size > class_size {
                fault.size_out_of_range = true;
            }
            if (p.add(HDR - 2) as *const u16).read() != SIG_BEGIN {
                fault.begin_overwritten = true;
            }
            if !fault.size_out_of_range
                && (p.add(HDR + size) as *const u16).read_unaligned() != SIG_END
            {
                fault.end_overwritten = true;
            }
        }
        fault
    }

    #[cfg(not(feature = "pool-debug"))]
    fn check_block(&self, _block: usize, _class_size: usize) -> PoolFault {
        PoolFault::default()
    }

    /// Block size of the class a payload pointer belongs to.
    #[cfg(test)]
    fn class_size_of(&self, ptr: *mut u8) -> Option<usize> {
        let base = self.mem.0.as_ptr() as usize;
        let addr = ptr as usize;
        if addr < base || addr >= base + POOL_BYTES {
            return None;
        }
        let off = addr - base;
        for class in &self.classes {
            if class.count == 0 {
                continue;
            }
            let span = class.count * stride(class.size);
            if off >= class.base && off < class.base + span {
                return Some(class.size);
            }
        }
        None
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
