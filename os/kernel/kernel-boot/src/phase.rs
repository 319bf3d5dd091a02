//! Boot phases, in the only order they may happen.

use crate::BootError;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BootPhase {
    /// Protected mode, paging off.
    Firmware,
    /// Bootstrap directory active, still running from low addresses.
    BootstrapPaging,
    /// Stack and descriptor table relocated, permanent directory active.
    HighHalf,
    /// Serial console up; diagnostics may be emitted.
    Reporting,
    /// Heap window mapped.
    Heap,
    Running,
}

impl BootPhase {
    /// The phase that must follow this one.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Firmware => Some(Self::BootstrapPaging),
            Self::BootstrapPaging => Some(Self::HighHalf),
            Self::HighHalf => Some(Self::Reporting),
            Self::Reporting => Some(Self::Heap),
            Self::Heap => Some(Self::Running),
            Self::Running => None,
        }
    }
}

/// Tracks the current [`BootPhase`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootState {
    phase: BootPhase,
}

impl Default for BootState {
    fn default() -> Self {
        Self::new()
    }
}

impl BootState {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: BootPhase::Firmware,
        }
    }

    #[inline]
    #[must_use]
    pub const fn phase(&self) -> BootPhase {
        self.phase
    }

    /// Move to `to`, which must be the direct successor of the current phase.
    ///
    /// # Errors
    /// [`BootError::PhaseOrder`] for any other transition; the phase is left unchanged.
    pub fn advance(&mut self, to: BootPhase) -> Result<(), BootError> {
        if self.phase.next() != Some(to) {
            return Err(BootError::PhaseOrder {
                from: self.phase,
                to,
            });
        }
        self.phase = to;
        log::debug!("boot phase: {to:?}");
        Ok(())
    }

    /// Whether diagnostics have somewhere to go.
    #[inline]
    #[must_use]
    pub fn can_report(&self) -> bool {
        self.phase >= BootPhase::Reporting
    }
}
