use crate::BootPhase;
use kernel_alloc::MemoryError;
use kernel_vmem::VmemError;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootError {
    #[error("cannot go from boot phase {from:?} to {to:?}")]
    PhaseOrder { from: BootPhase, to: BootPhase },
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Vmem(#[from] VmemError),
}
