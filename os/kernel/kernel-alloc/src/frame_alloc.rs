//! # Physical Frame Bitmap
//!
//! One bit per 4 KiB frame, most significant bit first within each byte; a set
//! bit means the frame is allocated. The bitmap is the only record of frame
//! ownership. The resume hint only shortens scans: every search that starts
//! at the hint wraps around to frame 0 before giving up.

use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::FrameAlloc;
use kernel_vmem::info::{PAGE_SIZE, TOTAL_FRAMES};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameStats {
    pub total: u32,
    pub allocated: u32,
    pub hint: u32,
}

pub struct BitmapFrameAlloc<'b> {
    bitmap: &'b mut [u8],
    total: u32,
    hint: u32,
    allocated: u32,
}

impl<'b> BitmapFrameAlloc<'b> {
    /// Track `bitmap.len() * 8` frames, all free.
    /// Bits beyond [`TOTAL_FRAMES`] are ignored.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(bitmap: &'b mut [u8]) -> Self {
        bitmap.fill(0);
        let total = (bitmap.len() * 8).min(TOTAL_FRAMES) as u32;
        Self {
            bitmap,
            total,
            hint: 0,
            allocated: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn total_frames(&self) -> u32 {
        self.total
    }

    #[inline]
    #[must_use]
    pub const fn allocated_frames(&self) -> u32 {
        self.allocated
    }

    #[inline]
    #[must_use]
    pub const fn free_frames(&self) -> u32 {
        self.total - self.allocated
    }

    #[must_use]
    pub const fn stats(&self) -> FrameStats {
        FrameStats {
            total: self.total,
            allocated: self.allocated,
            hint: self.hint,
        }
    }

    #[inline]
    fn test(&self, index: u32) -> bool {
        self.bitmap[(index / 8) as usize] & (0x80 >> (index % 8)) != 0
    }

    #[inline]
    fn set(&mut self, index: u32) {
        self.bitmap[(index / 8) as usize] |= 0x80 >> (index % 8);
    }

    #[inline]
    fn clear(&mut self, index: u32) {
        self.bitmap[(index / 8) as usize] &= !(0x80 >> (index % 8));
    }

    fn first_free_in(&self, from: u32, to: u32) -> Option<u32> {
        let mut index = from;
        while index < to {
            // Skip whole bytes that are full.
            if index % 8 == 0 && index + 8 <= to && self.bitmap[(index / 8) as usize] == 0xFF {
                index += 8;
                continue;
            }
            if !self.test(index) {
                return Some(index);
            }
            index += 1;
        }
        None
    }

    /// Allocate one frame.
    ///
    /// Returns `None` only when every frame is allocated.
    pub fn allocate_frame(&mut self) -> Option<PhysicalPage<Size4K>> {
        let index = self
            .first_free_in(self.hint, self.total)
            .or_else(|| self.first_free_in(0, self.hint))?;

        self.set(index);
        self.allocated += 1;
        self.hint = index + 1;
        Some(PhysicalPage::from_frame_index(index))
    }

    /// Allocate `count` physically contiguous frames and return the first.
    pub fn allocate_contiguous(&mut self, count: u32) -> Option<PhysicalPage<Size4K>> {
        if count == 0 || count > self.total {
            return None;
        }

        let start = self
            .find_run(self.hint, self.total, count)
            .or_else(|| {
                let wrap_end = self.hint.saturating_add(count - 1).min(self.total);
                self.find_run(0, wrap_end, count)
            })?;

        for index in start..start + count {
            self.set(index);
        }
        self.allocated += count;
        self.hint = start + count;
        log::debug!("allocated {count} contiguous frames at frame {start}");
        Some(PhysicalPage::from_frame_index(start))
    }

    /// First index of `count` free frames lying entirely inside `from..to`.
    fn find_run(&self, from: u32, to: u32, count: u32) -> Option<u32> {
        let mut start = from;
        while start.checked_add(count).is_some_and(|end| end <= to) {
            match (start..start + count).find(|&i| self.test(i)) {
                Some(taken) => start = taken + 1,
                None => return Some(start),
            }
        }
        None
    }

    /// Return a frame to the pool. Freeing a free or out-of-range frame is a
    /// logged no-op.
    pub fn free_frame(&mut self, frame: PhysicalPage<Size4K>) {
        let index = frame.frame_index();
        if index >= self.total {
            log::warn!("free of untracked frame {}", frame.base());
            return;
        }
        if !self.test(index) {
            log::warn!("double free of frame {}", frame.base());
            return;
        }

        self.clear(index);
        self.allocated -= 1;
        if index < self.hint {
            self.hint = index;
        }
    }

    /// Mark every frame overlapping `[start, end)` as allocated.
    pub fn reserve_range(&mut self, start: PhysicalAddress, end: PhysicalAddress) {
        let first = start.page::<Size4K>().frame_index();
        let last = end.as_u32().div_ceil(PAGE_SIZE).min(self.total);
        for index in first..last {
            if !self.test(index) {
                self.set(index);
                self.allocated += 1;
            }
        }
        log::debug!("reserved physical {start}..{end}");
    }

    #[must_use]
    pub fn is_allocated(&self, pa: PhysicalAddress) -> bool {
        let index = pa.page::<Size4K>().frame_index();
        index < self.total && self.test(index)
    }
}

impl FrameAlloc for BitmapFrameAlloc<'_> {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.allocate_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn set_bits(bitmap: &[u8]) -> u32 {
        bitmap.iter().map(|b| b.count_ones()).sum()
    }

    #[test]
    fn frames_are_unique_and_counted() {
        let mut storage = vec![0u8; 4];
        let mut frames = BitmapFrameAlloc::new(&mut storage);
        let mut seen = BTreeSet::new();
        while let Some(f) = frames.allocate_frame() {
            assert!(seen.insert(f.frame_index()));
        }
        assert_eq!(seen.len(), 32);
        assert_eq!(frames.allocated_frames(), 32);
        assert_eq!(frames.free_frames(), 0);
        drop(frames);
        assert_eq!(set_bits(&storage), 32);
    }

    #[test]
    fn interleaved_allocs_and_frees_keep_bits_and_count_in_step() {
        let mut storage = vec![0u8; 8];
        let mut frames = BitmapFrameAlloc::new(&mut storage);
        let mut live: Vec<PhysicalPage<Size4K>> = Vec::new();
        let mut seed = 0x2545_F491_u32;

        for _ in 0..1000 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            if live.is_empty() || seed % 3 != 0 {
                if let Some(f) = frames.allocate_frame() {
                    assert!(!live.contains(&f), "frame {} handed out twice", f.frame_index());
                    live.push(f);
                }
            } else {
                let victim = live.swap_remove(seed as usize % live.len());
                frames.free_frame(victim);
            }

            let marked = (0..64)
                .map(|i| PhysicalPage::<Size4K>::from_frame_index(i).base())
                .filter(|&pa| frames.is_allocated(pa))
                .count();
            assert_eq!(marked, live.len());
            assert_eq!(frames.allocated_frames() as usize, live.len());
        }

        let outstanding = live.len();
        drop(frames);
        assert_eq!(set_bits(&storage) as usize, outstanding);
    }

    #[test]
    fn bits_are_msb_first() {
        let mut storage = vec![0u8; 2];
        let mut frames = BitmapFrameAlloc::new(&mut storage);
        frames.allocate_frame();
        frames.allocate_frame();
        drop(frames);
        assert_eq!(storage, vec![0b1100_0000, 0]);
    }

    #[test]
    fn hint_wraps_to_find_lower_frames() {
        let mut storage = vec![0u8; 2];
        let mut frames = BitmapFrameAlloc::new(&mut storage);
        let all: Vec<_> = (0..16).filter_map(|_| frames.allocate_frame()).collect();
        assert!(frames.allocate_frame().is_none());

        frames.free_frame(all[3]);
        frames.free_frame(all[12]);
        assert_eq!(frames.stats().hint, 3);
        assert_eq!(frames.allocate_frame(), Some(all[3]));
        assert_eq!(frames.allocate_frame(), Some(all[12]));
        assert!(frames.allocate_frame().is_none());
    }

    #[test]
    fn scan_resumes_past_hint_then_wraps() {
        let mut storage = vec![0u8; 2];
        let mut frames = BitmapFrameAlloc::new(&mut storage);
        let first = frames.allocate_frame().unwrap();
        frames.reserve_range(PhysicalAddress::new(0x1000), PhysicalAddress::new(0x10000));
        frames.free_frame(first);
        // The hint moved down to 0, so frame 0 is found again.
        assert_eq!(frames.allocate_frame().map(|f| f.frame_index()), Some(0));
        assert!(frames.allocate_frame().is_none());
    }

    #[test]
    fn double_free_does_not_underflow() {
        let mut storage = vec![0u8; 1];
        let mut frames = BitmapFrameAlloc::new(&mut storage);
        let f = frames.allocate_frame().unwrap();
        frames.free_frame(f);
        frames.free_frame(f);
        frames.free_frame(PhysicalPage::from_frame_index(100));
        assert_eq!(frames.allocated_frames(), 0);
    }

    #[test]
    fn contiguous_run_was_free_and_is_now_taken() {
        let mut storage = vec![0u8; 4];
        let mut frames = BitmapFrameAlloc::new(&mut storage);
        frames.reserve_range(PhysicalAddress::new(0x2000), PhysicalAddress::new(0x3000));
        frames.reserve_range(PhysicalAddress::new(0x6000), PhysicalAddress::new(0x7000));

        let start = frames.allocate_contiguous(4).unwrap().frame_index();
        assert_eq!(start, 7);
        for i in start..start + 4 {
            assert!(frames.is_allocated(PhysicalPage::<Size4K>::from_frame_index(i).base()));
        }
        assert_eq!(frames.allocated_frames(), 6);
    }

    #[test]
    fn contiguous_wraps_once() {
        let mut storage = vec![0u8; 2];
        let mut frames = BitmapFrameAlloc::new(&mut storage);
        frames.reserve_range(PhysicalAddress::new(0x2000), PhysicalAddress::new(0x3000));

        // Frames 0 and 1 are skipped and stay free below the hint.
        assert_eq!(frames.allocate_contiguous(4).map(|f| f.frame_index()), Some(3));
        frames.reserve_range(PhysicalAddress::new(0x7000), PhysicalAddress::new(0x10000));

        assert_eq!(frames.allocate_contiguous(2).map(|f| f.frame_index()), Some(0));
        assert!(frames.allocate_contiguous(1).is_none());
        assert!(frames.allocate_frame().is_none());
    }

    #[test]
    fn contiguous_rejects_degenerate_counts() {
        let mut storage = vec![0u8; 1];
        let mut frames = BitmapFrameAlloc::new(&mut storage);
        assert!(frames.allocate_contiguous(0).is_none());
        assert!(frames.allocate_contiguous(9).is_none());
        assert_eq!(frames.allocate_contiguous(8).map(|f| f.frame_index()), Some(0));
    }

    #[test]
    fn reserve_range_rounds_outward() {
        let mut storage = vec![0u8; 2];
        let mut frames = BitmapFrameAlloc::new(&mut storage);
        frames.reserve_range(PhysicalAddress::new(0x1800), PhysicalAddress::new(0x3001));
        assert_eq!(frames.allocated_frames(), 3);
        assert!(frames.is_allocated(PhysicalAddress::new(0x1000)));
        assert!(frames.is_allocated(PhysicalAddress::new(0x3000)));
        assert!(!frames.is_allocated(PhysicalAddress::new(0x4000)));
    }
}
