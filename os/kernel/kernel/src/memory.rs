//! The kernel's [`MemoryManager`] singleton and global allocator.

use kernel_alloc::{BitmapFrameAlloc, KernelHeap, MemoryManager};
use kernel_info::MemoryLayout;
use kernel_info::memory::FRAME_BITMAP_BYTES;
use kernel_sync::{SpinLock, SyncOnceCell};
use kernel_vmem::PageTableManager;
use kernel_vmem::cpu::{CpuMemory, CpuMmu};

pub type Manager = MemoryManager<'static, CpuMemory, CpuMmu>;

/// The manager behind its interrupts-disabled lock.
pub type KernelMemory = SpinLock<Manager>;

/// One bit per 4 KiB frame of the 4 GiB physical space.
// TODO: reserve the frames above the end of RAM once the multiboot memory map is parsed.
static mut FRAME_BITMAP: [u8; FRAME_BITMAP_BYTES] = [0; FRAME_BITMAP_BYTES];

static MEMORY: SyncOnceCell<KernelMemory> = SyncOnceCell::new();

#[global_allocator]
static ALLOCATOR: KernelHeap<KernelMemory> = KernelHeap::new();

/// A manager over the frame bitmap, working on the active address space.
///
/// # Safety
/// Call at most once; the manager takes exclusive ownership of the bitmap.
pub unsafe fn new_manager(layout: &MemoryLayout) -> Manager {
    let bitmap = unsafe { &mut *(&raw mut FRAME_BITMAP) };
    let pages = PageTableManager::new(CpuMemory, CpuMmu, layout.scratch_page());
    MemoryManager::new(BitmapFrameAlloc::new(bitmap), pages)
}

/// Move the manager into its static home and serve `alloc` from its heap.
pub fn install(manager: Manager) -> &'static KernelMemory {
    let memory = MEMORY.get_or_init(|| SpinLock::new(manager));
    ALLOCATOR.attach(memory);
    memory
}
