//! `#[global_allocator]` glue.

use crate::heap::{HEAP_ALIGN, Heap};
use core::alloc::{GlobalAlloc, Layout};
use core::ptr::{NonNull, null_mut};
use kernel_sync::SyncOnceCell;

/// Something that can lend out the kernel heap for the duration of a call,
/// typically by taking a lock.
pub trait HeapSource: Sync {
    /// Run `f` on the heap, or return `None` if there is none yet.
    fn with_heap<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> Option<R>;
}

/// A [`GlobalAlloc`] forwarding to a [`HeapSource`] attached at boot.
///
/// Allocations fail (return null) until a source is attached and its heap is
/// initialized, and for alignments above [`HEAP_ALIGN`].
pub struct KernelHeap<H: 'static> {
    source: SyncOnceCell<&'static H>,
}

impl<H: HeapSource + 'static> KernelHeap<H> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            source: SyncOnceCell::new(),
        }
    }

    /// Attach the heap source. Only the first call has an effect.
    pub fn attach(&self, source: &'static H) -> bool {
        self.source.set(source).is_ok()
    }

    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.source.get().is_some()
    }
}

impl<H: HeapSource + 'static> Default for KernelHeap<H> {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl<H: HeapSource + 'static> GlobalAlloc for KernelHeap<H> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > HEAP_ALIGN as usize {
            return null_mut();
        }
        self.source
            .get()
            .and_then(|s| s.with_heap(|heap| heap.allocate(layout.size())))
            .flatten()
            .map_or(null_mut(), NonNull::as_ptr)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        if let Some(source) = self.source.get() {
            source.with_heap(|heap| unsafe { heap.free(ptr) });
        }
    }
}
