use kernel_vmem::VmemError;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MemoryError {
    #[error("physical memory exhausted")]
    OutOfFrames,
    #[error("the heap is already initialized")]
    HeapAlreadyInitialized,
    #[error("the heap is not initialized")]
    HeapNotInitialized,
    #[error(transparent)]
    Vmem(#[from] VmemError),
}
