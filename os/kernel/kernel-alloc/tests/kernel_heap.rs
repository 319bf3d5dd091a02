use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use kernel_alloc::{Heap, HeapSource, KernelHeap};
use kernel_sync::SpinLock;

#[repr(C, align(4096))]
struct Region([u8; 4096]);

struct LockedHeap(SpinLock<Option<Heap>>);

impl HeapSource for LockedHeap {
    fn with_heap<R>(&self, f: impl FnOnce(&mut Heap) -> R) -> Option<R> {
        self.0.lock_irq().as_mut().map(f)
    }
}

fn leaked_heap() -> &'static LockedHeap {
    let region = Box::leak(Box::new(Region([0; 4096])));
    let heap = unsafe { Heap::new(NonNull::from(&mut region.0).cast(), 4096) };
    Box::leak(Box::new(LockedHeap(SpinLock::new(Some(heap)))))
}

#[test]
fn unattached_heap_returns_null() {
    let global = KernelHeap::<LockedHeap>::new();
    let p = unsafe { global.alloc(Layout::from_size_align(16, 8).unwrap()) };
    assert!(p.is_null());
    assert!(!global.is_attached());
}

#[test]
fn alloc_and_dealloc_round_through_the_source() {
    let global = KernelHeap::new();
    let source = leaked_heap();
    assert!(global.attach(source));
    assert!(!global.attach(leaked_heap()), "second attach is ignored");

    let before = source.with_heap(|h| h.stats()).unwrap();
    let layout = Layout::new::<[u64; 4]>();
    let p = unsafe { global.alloc(layout) };
    assert!(!p.is_null());
    unsafe {
        p.cast::<[u64; 4]>().write([1, 2, 3, 4]);
        global.dealloc(p, layout);
    }
    assert_eq!(source.with_heap(|h| h.stats()).unwrap(), before);
}

#[test]
fn over_aligned_requests_fail() {
    let global = KernelHeap::new();
    global.attach(leaked_heap());
    let p = unsafe { global.alloc(Layout::from_size_align(64, 64).unwrap()) };
    assert!(p.is_null());
}

#[test]
fn missing_heap_returns_null() {
    let global = KernelHeap::new();
    global.attach(Box::leak(Box::new(LockedHeap(SpinLock::new(None)))));
    let p = unsafe { global.alloc(Layout::new::<u32>()) };
    assert!(p.is_null());
}
