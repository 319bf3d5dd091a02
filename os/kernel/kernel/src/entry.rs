//! Boot path from the loader's jump to the idle loop.

use crate::memory;
use alloc::vec::Vec;
use core::panic::PanicInfo;
use kernel_boot::bootstrap::enable_paging;
use kernel_boot::gdt;
use kernel_boot::stack::relocate_stack;
use kernel_boot::{
    BootError, BootPhase, BootState, BootstrapTables, GdtCopy, StackRelocation,
    build_permanent_directory,
};
use kernel_info::memory::{
    BOOTSTRAP_STACK_BASE, BOOTSTRAP_STACK_TOP, VGA_PHYS_START, VGA_VIRT_START,
};
use kernel_info::{KernelImage, MemoryLayout};
use kernel_memory_addresses::PhysicalAddress;
use kernel_serial::{Hex, SerialLogger, serial_trace};
use log::LevelFilter;

const MULTIBOOT_MAGIC: u32 = 0x1BAD_B002;
const MULTIBOOT_FLAGS: u32 = 0;

#[used]
#[unsafe(link_section = ".multiboot")]
static MULTIBOOT_HEADER: [u32; 3] = [
    MULTIBOOT_MAGIC,
    MULTIBOOT_FLAGS,
    0u32.wrapping_sub(MULTIBOOT_MAGIC.wrapping_add(MULTIBOOT_FLAGS)),
];

#[unsafe(link_section = ".bootstrap.data")]
static mut BOOTSTRAP_TABLES: BootstrapTables = BootstrapTables::new();

static mut GDT: GdtCopy = GdtCopy::new();

unsafe extern "C" {
    /// Physical end of the bootstrap part, start of the higher-half part.
    static __phys_after_bootstrap_data: u8;
    /// Physical end of the kernel image.
    static __phys_after_kernel: u8;
}

#[allow(clippy::cast_possible_truncation)]
fn kernel_image() -> KernelImage {
    let base = (&raw const __phys_after_bootstrap_data) as usize as u32;
    let end = (&raw const __phys_after_kernel) as usize as u32;
    KernelImage::new(PhysicalAddress::new(base), PhysicalAddress::new(end))
}

/// Loader entry. Runs at its physical address with paging off.
///
/// Sets up the bootstrap stack, calls [`bootstrap_paging`] and then jumps to
/// the higher half.
#[unsafe(no_mangle)]
#[unsafe(naked)]
#[unsafe(link_section = ".bootstrap.text")]
pub unsafe extern "C" fn _start() -> ! {
    core::arch::naked_asm!(
        "cli",
        "mov esp, {stack_top}",
        "xor ebp, ebp",
        "push offset {phys_base}",
        "call {bootstrap}",
        "add esp, 4",
        // paging is on, the higher half is reachable
        "mov eax, offset {main}",
        "jmp eax",
        stack_top = const BOOTSTRAP_STACK_TOP,
        phys_base = sym __phys_after_bootstrap_data,
        bootstrap = sym bootstrap_paging,
        main = sym kernel_main,
    );
}

const VGA_PAGES: u32 = MemoryLayout::DEFAULT.vga_pages();

/// Build the bootstrap tables and switch paging on.
///
/// Lives in the bootstrap section next to `_start`, so it runs at its link
/// address. Everything it calls is inlined and takes scalars; nothing here
/// may reach the higher-half `.text` or `.rodata` before CR0.PG is set.
#[unsafe(link_section = ".bootstrap.text")]
#[allow(clippy::cast_possible_truncation)]
extern "C" fn bootstrap_paging(phys_base: u32) {
    let tables = &raw mut BOOTSTRAP_TABLES;
    let tables_phys = tables as usize as u32;
    unsafe {
        (*tables).fill(tables_phys, phys_base, VGA_PHYS_START, VGA_PAGES, VGA_VIRT_START);
        enable_paging(tables_phys);
    }
}

/// First code at a higher-half address, still on the bootstrap stack.
extern "C" fn kernel_main() -> ! {
    let image = kernel_image();
    let relocation = StackRelocation::for_image(&image);
    unsafe { relocate_stack(BOOTSTRAP_STACK_BASE, BOOTSTRAP_STACK_TOP, relocation.offset()) };
    high_half_main(image)
}

#[inline(never)]
fn high_half_main(image: KernelImage) -> ! {
    let layout = MemoryLayout::DEFAULT;
    let mut state = BootState::new();
    advance(&mut state, BootPhase::BootstrapPaging);

    unsafe { gdt::reload_into(&mut *(&raw mut GDT)) };
    let mut mm = unsafe { memory::new_manager(&layout) };
    if let Err(e) = unsafe { build_permanent_directory(&mut mm, &image) } {
        fail(&state, e);
    }
    advance(&mut state, BootPhase::HighHalf);

    kernel_serial::init_console();
    let level = if cfg!(feature = "trace-mm") {
        LevelFilter::Trace
    } else {
        LevelFilter::Info
    };
    SerialLogger::new(level).init().ok();
    advance(&mut state, BootPhase::Reporting);

    log::info!(
        "kernel image {}..{}, stack top {}",
        image.phys_base(),
        image.phys_end(),
        image.high_half_stack_top()
    );
    log::info!("frames: {:?}", mm.frame_stats());
    #[cfg(feature = "trace-mm")]
    mm.pages().dump_mappings();

    if let Err(e) = mm.heap_init(&layout) {
        fail(&state, e.into());
    }
    let memory = memory::install(mm);
    advance(&mut state, BootPhase::Heap);

    let squares: Vec<u32> = (0..64).map(|i| i * i).collect();
    log::info!("heap check: sum of squares {}", Hex(squares.iter().sum::<u32>()));
    drop(squares);
    memory.with_lock(|mm| {
        mm.dump_heap();
        log::info!("frames: {:?}", mm.frame_stats());
    });

    advance(&mut state, BootPhase::Running);
    idle()
}

fn advance(state: &mut BootState, to: BootPhase) {
    if let Err(e) = state.advance(to) {
        fail(state, e);
    }
}

/// Stop the boot. Without a console the only trace is the halted CPU.
fn fail(state: &BootState, error: BootError) -> ! {
    if state.can_report() {
        log::error!("boot failed in {:?}: {error}", state.phase());
    }
    idle()
}

fn idle() -> ! {
    loop {
        unsafe { core::arch::asm!("hlt", options(nomem, nostack)) };
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_trace!("kernel panic: {info}\n");
    idle()
}
