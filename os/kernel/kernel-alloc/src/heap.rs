//! # Best-Fit Heap
//!
//! A singly linked, address-ordered free list inside one contiguous region.
//!
//! Every block, free or allocated, starts with a [`BlockHeader`]; the payload
//! follows it. Links are stored as **offsets** from the region base, so a
//! header is only ever read at an offset that was checked against the region.
//!
//! ```text
//! base
//!  │
//!  ▼
//!  +--------+-----------+--------+----------------------+
//!  | hdr    | payload   | hdr    | payload              |  ...
//!  | size,  | (size     | size,  |                      |
//!  | next   |  bytes)   | next   |                      |
//!  +--------+-----------+--------+----------------------+
//! ```
//!
//! Allocation picks the smallest block that fits (stopping early on an exact
//! fit) and splits off the surplus when it can hold a header plus a minimal
//! payload. Freeing reinserts the block in address order and merges it with
//! the following and then the preceding neighbour.

use core::ptr::NonNull;

/// Payload sizes and block starts are multiples of this.
pub const HEAP_ALIGN: u32 = 8;

/// Bytes taken by a block header.
#[allow(clippy::cast_possible_truncation)]
pub const HEADER_SIZE: u32 = size_of::<BlockHeader>() as u32;

/// Smallest payload a split-off remainder may have.
pub const MIN_PAYLOAD: u32 = 8;

const NIL: u32 = u32::MAX;

#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct BlockHeader {
    /// Payload bytes after the header.
    size: u32,
    /// Offset of the next free block, or [`NIL`]. Meaningless while allocated.
    next: u32,
}

const _: () = {
    assert!(HEADER_SIZE == 8);
    assert!(HEADER_SIZE % HEAP_ALIGN == 0);
    assert!(MIN_PAYLOAD % HEAP_ALIGN == 0);
};

/// One entry of the free list.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FreeBlock {
    /// Offset of the block header from the heap base.
    pub offset: u32,
    /// Payload bytes.
    pub size: u32,
}

#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub struct HeapStats {
    pub free_bytes: u32,
    pub free_blocks: u32,
    pub largest_free: u32,
}

pub struct Heap {
    base: NonNull<u8>,
    len: u32,
    head: u32,
}

// The region is exclusively owned by the heap.
unsafe impl Send for Heap {}

impl Heap {
    /// Turn `[base, base + len)` into one free block.
    ///
    /// `len` is rounded down to [`HEAP_ALIGN`]. A region too small for a
    /// header and a minimal payload yields a heap that never allocates.
    ///
    /// # Safety
    /// The region must be mapped, writable, aligned to [`HEAP_ALIGN`] and
    /// used by nothing else for the lifetime of the heap.
    #[must_use]
    pub unsafe fn new(base: NonNull<u8>, len: u32) -> Self {
        debug_assert_eq!(base.as_ptr() as usize % HEAP_ALIGN as usize, 0);
        let len = len & !(HEAP_ALIGN - 1);
        let mut heap = Self {
            base,
            len,
            head: NIL,
        };
        if len >= HEADER_SIZE + MIN_PAYLOAD {
            heap.write(0, BlockHeader {
                size: len - HEADER_SIZE,
                next: NIL,
            });
            heap.head = 0;
        }
        heap
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> NonNull<u8> {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `ptr` points into the region.
    #[must_use]
    pub fn contains(&self, ptr: *const u8) -> bool {
        let base = self.base.as_ptr() as usize;
        let addr = ptr as usize;
        addr >= base && addr - base < self.len as usize
    }

    fn read(&self, offset: u32) -> BlockHeader {
        debug_assert!(offset + HEADER_SIZE <= self.len);
        unsafe { self.base.as_ptr().add(offset as usize).cast::<BlockHeader>().read() }
    }

    fn write(&mut self, offset: u32, header: BlockHeader) {
        debug_assert!(offset + HEADER_SIZE <= self.len);
        unsafe {
            self.base
                .as_ptr()
                .add(offset as usize)
                .cast::<BlockHeader>()
                .write(header);
        }
    }

    /// Point `prev` (or the list head) at `target`.
    fn link(&mut self, prev: Option<u32>, target: u32) {
        match prev {
            None => self.head = target,
            Some(p) => {
                let mut header = self.read(p);
                header.next = target;
                self.write(p, header);
            }
        }
    }

    fn payload(&self, offset: u32) -> NonNull<u8> {
        unsafe { self.base.add((offset + HEADER_SIZE) as usize) }
    }

    /// Allocate at least `n` bytes aligned to [`HEAP_ALIGN`].
    ///
    /// `None` for `n == 0` or when no free block is large enough.
    pub fn allocate(&mut self, n: usize) -> Option<NonNull<u8>> {
        if n == 0 {
            return None;
        }
        let size = u32::try_from(n).ok()?.checked_next_multiple_of(HEAP_ALIGN)?;

        // (previous, offset, header) of the best candidate so far.
        let mut best: Option<(Option<u32>, u32, BlockHeader)> = None;
        let mut prev = None;
        let mut cur = self.head;
        while cur != NIL {
            let header = self.read(cur);
            if header.size >= size && best.is_none_or(|(_, _, b)| header.size < b.size) {
                best = Some((prev, cur, header));
                if header.size == size {
                    break;
                }
            }
            prev = Some(cur);
            cur = header.next;
        }

        let Some((prev, offset, header)) = best else {
            log::trace!("heap: no block for {n} bytes");
            return None;
        };

        if header.size - size >= HEADER_SIZE + MIN_PAYLOAD {
            let tail = offset + HEADER_SIZE + size;
            self.write(tail, BlockHeader {
                size: header.size - size - HEADER_SIZE,
                next: header.next,
            });
            self.link(prev, tail);
            self.write(offset, BlockHeader { size, next: NIL });
        } else {
            self.link(prev, header.next);
            self.write(offset, BlockHeader {
                size: header.size,
                next: NIL,
            });
        }

        Some(self.payload(offset))
    }

    /// Return a block to the free list.
    ///
    /// Null pointers and pointers outside the region are ignored, as are
    /// blocks that already lie inside a free block, even one they were
    /// merged into.
    ///
    /// # Safety
    /// A pointer inside the region must have been returned by
    /// [`allocate`](Self::allocate) on this heap and not freed since.
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        if !self.contains(ptr) {
            log::warn!("heap: ignoring free of {ptr:p} outside the heap");
            return;
        }

        #[allow(clippy::cast_possible_truncation)]
        let payload = (ptr as usize - self.base.as_ptr() as usize) as u32;
        if payload < HEADER_SIZE || payload % HEAP_ALIGN != 0 {
            log::warn!("heap: ignoring free of {ptr:p}, not a block start");
            return;
        }
        let offset = payload - HEADER_SIZE;

        let mut prev = None;
        let mut next = self.head;
        while next != NIL && next < offset {
            prev = Some(next);
            next = self.read(next).next;
        }
        let inside_previous = prev.is_some_and(|p| offset < p + HEADER_SIZE + self.read(p).size);
        if next == offset || inside_previous {
            log::warn!("heap: double free of {ptr:p}");
            return;
        }

        let mut block = self.read(offset);
        block.next = next;

        if next != NIL && offset + HEADER_SIZE + block.size == next {
            let following = self.read(next);
            block.size += HEADER_SIZE + following.size;
            block.next = following.next;
        }

        if let Some(p) = prev {
            let mut before = self.read(p);
            if p + HEADER_SIZE + before.size == offset {
                before.size += HEADER_SIZE + block.size;
                before.next = block.next;
                self.write(p, before);
                return;
            }
        }

        self.write(offset, block);
        self.link(prev, offset);
    }

    /// The free list in address order.
    pub fn free_blocks(&self) -> FreeBlocks<'_> {
        FreeBlocks {
            heap: self,
            cur: self.head,
        }
    }

    #[must_use]
    pub fn stats(&self) -> HeapStats {
        self.free_blocks().fold(HeapStats::default(), |mut s, b| {
            s.free_bytes += b.size;
            s.free_blocks += 1;
            s.largest_free = s.largest_free.max(b.size);
            s
        })
    }

    /// Log every free block and its size.
    pub fn dump(&self) {
        for block in self.free_blocks() {
            log::info!(
                "free block at {:p}: {} bytes",
                self.base.as_ptr().wrapping_add(block.offset as usize),
                block.size
            );
        }
        let stats = self.stats();
        log::info!(
            "{} free bytes in {} blocks, largest {}",
            stats.free_bytes,
            stats.free_blocks,
            stats.largest_free
        );
    }
}

pub struct FreeBlocks<'h> {
    heap: &'h Heap,
    cur: u32,
}

impl Iterator for FreeBlocks<'_> {
    type Item = FreeBlock;

    fn next(&mut self) -> Option<FreeBlock> {
        if self.cur == NIL {
            return None;
        }
        let offset = self.cur;
        let header = self.heap.read(offset);
        self.cur = header.next;
        Some(FreeBlock {
            offset,
            size: header.size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(4096))]
    struct Region([u8; 4096]);

    fn heap_over(region: &mut Region, len: u32) -> Heap {
        unsafe { Heap::new(NonNull::from(&mut region.0).cast(), len) }
    }

    #[test]
    fn starts_as_one_block() {
        let mut region = Region([0; 4096]);
        let heap = heap_over(&mut region, 4096);
        assert_eq!(
            heap.free_blocks().collect::<Vec<_>>(),
            vec![FreeBlock {
                offset: 0,
                size: 4096 - HEADER_SIZE
            }]
        );
    }

    #[test]
    fn tiny_region_never_allocates() {
        let mut region = Region([0; 4096]);
        let mut heap = heap_over(&mut region, HEADER_SIZE + 4);
        assert_eq!(heap.stats(), HeapStats::default());
        assert!(heap.allocate(1).is_none());
    }

    #[test]
    fn zero_and_oversized_requests_fail() {
        let mut region = Region([0; 4096]);
        let mut heap = heap_over(&mut region, 256);
        assert!(heap.allocate(0).is_none());
        assert!(heap.allocate(256).is_none());
        assert!(heap.allocate(usize::MAX).is_none());
        assert_eq!(heap.stats().free_bytes, 256 - HEADER_SIZE);
    }

    #[test]
    fn allocations_are_aligned_sized_and_disjoint() {
        let mut region = Region([0; 4096]);
        let mut heap = heap_over(&mut region, 4096);
        let sizes = [1_usize, 7, 8, 13, 64, 100, 3];
        let mut spans = Vec::new();
        for &n in &sizes {
            let p = heap.allocate(n).unwrap();
            assert_eq!(p.as_ptr() as usize % HEAP_ALIGN as usize, 0);
            unsafe { p.as_ptr().write_bytes(0xAB, n) };
            spans.push((p.as_ptr() as usize, n));
        }
        spans.sort_unstable();
        for pair in spans.windows(2) {
            assert!(pair[0].0 + pair[0].1 <= pair[1].0, "overlap: {pair:?}");
        }
    }

    #[test]
    fn best_fit_prefers_smallest_block() {
        let mut region = Region([0; 4096]);
        let mut heap = heap_over(&mut region, 4096);
        let a = heap.allocate(64).unwrap();
        let _fence1 = heap.allocate(8).unwrap();
        let b = heap.allocate(16).unwrap();
        let _fence2 = heap.allocate(8).unwrap();
        unsafe {
            heap.free(a.as_ptr());
            heap.free(b.as_ptr());
        }
        // Free list: 64 bytes, 16 bytes, and the large tail.
        assert_eq!(heap.allocate(16), Some(b));
        assert_eq!(heap.allocate(40), Some(a));
    }

    #[test]
    fn small_surplus_is_not_split() {
        let mut region = Region([0; 4096]);
        let mut heap = heap_over(&mut region, HEADER_SIZE + 24);
        heap.allocate(8).unwrap();
        // 24 - 8 = 16 is exactly header + minimum payload, so it splits.
        assert_eq!(heap.stats().free_bytes, 8);

        let mut region = Region([0; 4096]);
        let mut heap = heap_over(&mut region, HEADER_SIZE + 16);
        heap.allocate(8).unwrap();
        assert_eq!(heap.stats(), HeapStats::default());
    }

    #[test]
    fn sixteen_unit_scenario() {
        let unit = HEAP_ALIGN;
        let mut region = Region([0; 4096]);
        let mut heap = heap_over(&mut region, HEADER_SIZE + 16 * unit);
        let initial = heap.stats();
        assert_eq!(initial.free_bytes, 16 * unit);

        let first = heap.allocate(4).unwrap();
        let second = heap.allocate(4).unwrap();
        unsafe { heap.free(first.as_ptr()) };
        let third = heap.allocate(4).unwrap();
        let (lo, hi) = if third < second { (third, second) } else { (second, third) };
        assert!(lo.as_ptr() as usize + 4 <= hi.as_ptr() as usize);

        unsafe {
            heap.free(third.as_ptr());
            heap.free(second.as_ptr());
        }
        assert_eq!(heap.stats(), HeapStats {
            free_blocks: 1,
            ..initial
        });
    }

    #[test]
    fn coalesces_in_either_order() {
        for reverse in [false, true] {
            let mut region = Region([0; 4096]);
            let mut heap = heap_over(&mut region, 1024);
            let initial = heap.stats();
            let mut blocks: Vec<_> = (0..6).map(|i| heap.allocate(8 + i * 8).unwrap()).collect();
            if reverse {
                blocks.reverse();
            }
            for b in blocks {
                unsafe { heap.free(b.as_ptr()) };
            }
            assert_eq!(heap.stats(), initial);
        }
    }

    #[test]
    fn merged_block_serves_what_neither_half_could() {
        for reverse in [false, true] {
            let mut region = Region([0; 4096]);
            let mut heap = heap_over(&mut region, 1024);
            let a = heap.allocate(32).unwrap();
            let b = heap.allocate(32).unwrap();
            let _rest = heap.allocate(1024 - 3 * HEADER_SIZE as usize - 64).unwrap();
            let (first, second) = if reverse { (b, a) } else { (a, b) };

            unsafe { heap.free(first.as_ptr()) };
            assert!(heap.allocate(64).is_none());
            unsafe { heap.free(second.as_ptr()) };

            assert_eq!(heap.stats().free_blocks, 1);
            assert_eq!(heap.allocate(64 + HEADER_SIZE as usize), Some(a));
            assert_eq!(heap.stats().free_blocks, 0);
        }
    }

    #[test]
    fn middle_free_merges_both_sides() {
        let mut region = Region([0; 4096]);
        let mut heap = heap_over(&mut region, 1024);
        let a = heap.allocate(32).unwrap();
        let b = heap.allocate(32).unwrap();
        let c = heap.allocate(32).unwrap();
        let _rest = heap.allocate(1024 - 4 * HEADER_SIZE as usize - 96).unwrap();
        assert_eq!(heap.stats().free_blocks, 0);

        unsafe {
            heap.free(a.as_ptr());
            heap.free(c.as_ptr());
        }
        assert_eq!(heap.stats().free_blocks, 2);
        unsafe { heap.free(b.as_ptr()) };
        assert_eq!(heap.free_blocks().collect::<Vec<_>>(), vec![FreeBlock {
            offset: 0,
            size: 96 + 2 * HEADER_SIZE
        }]);
    }

    #[test]
    fn bogus_frees_are_ignored() {
        let mut region = Region([0; 4096]);
        let mut heap = heap_over(&mut region, 512);
        let p = heap.allocate(16).unwrap();
        let before = heap.stats();

        let mut outside = 0_u8;
        unsafe {
            heap.free(core::ptr::null_mut());
            heap.free(&raw mut outside);
            heap.free(region_end(&heap));
            heap.free(p.as_ptr().add(1));
        }
        assert_eq!(heap.stats(), before);

        unsafe {
            heap.free(p.as_ptr());
            heap.free(p.as_ptr());
        }
        assert_eq!(heap.stats().free_blocks, 1);
    }

    #[test]
    fn second_free_of_a_merged_block_is_ignored() {
        let mut region = Region([0; 4096]);
        let mut heap = heap_over(&mut region, 256);
        let a = heap.allocate(32).unwrap();
        let b = heap.allocate(32).unwrap();

        unsafe {
            heap.free(b.as_ptr());
            heap.free(a.as_ptr());
        }
        let merged: Vec<_> = heap.free_blocks().collect();
        assert_eq!(merged, vec![FreeBlock { offset: 0, size: 256 - HEADER_SIZE }]);

        unsafe { heap.free(b.as_ptr()) };
        assert_eq!(heap.free_blocks().collect::<Vec<_>>(), merged);

        let big = heap.allocate(200).unwrap();
        assert!(heap.allocate(64).is_none());
        assert_eq!(big, a);
    }

    fn region_end(heap: &Heap) -> *mut u8 {
        heap.base().as_ptr().wrapping_add(heap.len() as usize)
    }
}
