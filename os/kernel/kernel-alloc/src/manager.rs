//! # Memory Manager
//!
//! One value owning the frame bitmap, the page-table manager and the heap.
//! The kernel keeps it in a [`SpinLock`] and always goes through
//! [`SpinLock::lock_irq`], so every mutation runs with interrupts masked.

use crate::frame_alloc::{BitmapFrameAlloc, FrameStats};
use crate::heap::{Heap, HeapStats};
use crate::kernel_heap::HeapSource;
use crate::MemoryError;
use core::ptr::NonNull;
use kernel_info::MemoryLayout;
use kernel_info::memory::PAGE_SIZE;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress};
use kernel_sync::SpinLock;
use kernel_vmem::{Mmu, NewDirectory, PageEntryBits, PageTableManager, VirtualMemory};

pub struct MemoryManager<'m, V: VirtualMemory, M: Mmu> {
    frames: BitmapFrameAlloc<'m>,
    pages: PageTableManager<V, M>,
    heap: Option<Heap>,
}

impl<'m, V: VirtualMemory, M: Mmu> MemoryManager<'m, V, M> {
    pub const fn new(frames: BitmapFrameAlloc<'m>, pages: PageTableManager<V, M>) -> Self {
        Self {
            frames,
            pages,
            heap: None,
        }
    }

    #[inline]
    pub const fn frames(&self) -> &BitmapFrameAlloc<'m> {
        &self.frames
    }

    #[inline]
    pub const fn pages(&self) -> &PageTableManager<V, M> {
        &self.pages
    }

    #[inline]
    pub const fn heap(&self) -> Option<&Heap> {
        self.heap.as_ref()
    }

    #[inline]
    pub const fn heap_mut(&mut self) -> Option<&mut Heap> {
        self.heap.as_mut()
    }

    pub fn allocate_frame(&mut self) -> Option<PhysicalPage<Size4K>> {
        self.frames.allocate_frame()
    }

    pub fn allocate_contiguous(&mut self, count: u32) -> Option<PhysicalPage<Size4K>> {
        self.frames.allocate_contiguous(count)
    }

    pub fn free_frame(&mut self, frame: PhysicalPage<Size4K>) {
        self.frames.free_frame(frame);
    }

    pub fn reserve_range(&mut self, start: PhysicalAddress, end: PhysicalAddress) {
        self.frames.reserve_range(start, end);
    }

    #[must_use]
    pub const fn frame_stats(&self) -> FrameStats {
        self.frames.stats()
    }

    /// # Errors
    /// See [`PageTableManager::map_page`].
    pub fn map_page(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        flags: PageEntryBits,
    ) -> Result<(), MemoryError> {
        Ok(self.pages.map_page(&mut self.frames, va, pa, flags)?)
    }

    /// # Errors
    /// See [`PageTableManager::map_range`].
    pub fn map_range(
        &mut self,
        va: VirtualAddress,
        pa: PhysicalAddress,
        count: u32,
        flags: PageEntryBits,
    ) -> Result<(), MemoryError> {
        Ok(self.pages.map_range(&mut self.frames, va, pa, count, flags)?)
    }

    pub fn unmap_page(&mut self, va: VirtualAddress) -> bool {
        self.pages.unmap_page(va)
    }

    /// # Errors
    /// See [`PageTableManager::create_page_directory`].
    pub fn create_page_directory(&mut self) -> Result<NewDirectory, MemoryError> {
        Ok(self.pages.create_page_directory(&mut self.frames)?)
    }

    #[must_use]
    pub fn translate(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.pages.translate(va)
    }

    /// Back the heap window of `layout` with fresh frames and hand it to the
    /// heap as one free block.
    ///
    /// # Errors
    /// - [`MemoryError::HeapAlreadyInitialized`] on a second call.
    /// - [`MemoryError::OutOfFrames`] or a paging error while mapping; pages
    ///   mapped so far stay mapped.
    pub fn heap_init(&mut self, layout: &MemoryLayout) -> Result<(), MemoryError> {
        if self.heap.is_some() {
            return Err(MemoryError::HeapAlreadyInitialized);
        }

        let start = layout.heap_start();
        for i in 0..layout.heap_pages() {
            let frame = self.frames.allocate_frame().ok_or(MemoryError::OutOfFrames)?;
            self.pages
                .map_page(
                    &mut self.frames,
                    start + i * PAGE_SIZE,
                    frame.base(),
                    PageEntryBits::kernel_rw(),
                )?;
        }

        let base = NonNull::from(unsafe { self.pages.vm().virt_to_mut::<u8>(start) });
        self.heap = Some(unsafe { Heap::new(base, layout.heap_len()) });
        log::info!(
            "heap ready at {start}: {} bytes in {} pages",
            layout.heap_len(),
            layout.heap_pages()
        );
        Ok(())
    }

    /// `None` for `n == 0`, before [`heap_init`](Self::heap_init), or when
    /// the heap is exhausted.
    pub fn allocate(&mut self, n: usize) -> Option<NonNull<u8>> {
        self.heap.as_mut()?.allocate(n)
    }

    /// # Safety
    /// See [`Heap::free`].
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        if let Some(heap) = self.heap.as_mut() {
            unsafe { heap.free(ptr) };
        }
    }

    /// # Errors
    /// [`MemoryError::HeapNotInitialized`] before [`heap_init`](Self::heap_init).
    pub fn heap_stats(&self) -> Result<HeapStats, MemoryError> {
        self.heap.as_ref().map(Heap::stats).ok_or(MemoryError::HeapNotInitialized)
    }

    pub fn dump_heap(&self) {
        match &self.heap {
            Some(heap) => heap.dump(),
            None => log::info!("heap not initialized"),
        }
    }
}

impl<V, M> HeapSource for SpinLock<MemoryManager<'_, V, M>>
where
    V: VirtualMemory + Send,
    M: Mmu + Send,
{
    fn with_heap<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> Option<R> {
        let mut mm = self.lock_irq();
        mm.heap_mut().map(f)
    }
}
