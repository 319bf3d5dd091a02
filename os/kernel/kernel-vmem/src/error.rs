use kernel_memory_addresses::VirtualAddress;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum VmemError {
    #[error("no free physical frame for a page table")]
    OutOfFrames,
    #[error("address {0:#010x} is not page aligned")]
    Unaligned(u32),
    #[error("the physical window is already in use")]
    WindowBusy,
    #[error("{0} is covered by a 4 MiB page")]
    LargePage(VirtualAddress),
    #[error("{pages} pages from {start} run past the end of the address space")]
    RangeOverflow { start: VirtualAddress, pages: u32 },
}
