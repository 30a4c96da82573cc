//! Implementation-level failures, as distinct from architectural
//! interrupts.
//!
//! A [`MachineCheck`] means the emulator itself found something it
//! cannot proceed from — a configuration mismatch, a storage backend that
//! rejected an access the translation layer already approved, an
//! instruction table hole the decoder should never have reached. None of
//! these are visible to emulated software; they stop the processor and
//! surface through [`ux2200_core::OperatorConsole::get_stop_reason`].

use thiserror::Error;

use ux2200_core::StorageError;

/// An implementation error that stops the processor outright.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MachineCheck {
    /// The storage backend rejected an access that address translation
    /// had already approved.
    #[error("storage access failed after translation: {0}")]
    Storage(#[from] StorageError),

    /// The instruction decode table selected no handler for a decoded
    /// `(f, j, a)` key that the dispatch table is supposed to cover
    /// exhaustively; reaching this means the table itself has a gap.
    #[error("dispatch table has no handler registered for f={f:#04o} j={j:#02o} a={a:#02o}")]
    DispatchTableGap { f: u8, j: u8, a: u8 },

    /// A bank descriptor table level was referenced with no base
    /// configured for it — an inventory-manager configuration error, not
    /// an architectural addressing exception.
    #[error("no bank descriptor table configured for level {0}")]
    UnconfiguredLevel(u8),

    /// An interrupt vector was required for delivery but none was
    /// configured for that class.
    #[error("no interrupt vector configured for this interrupt class")]
    UnconfiguredVector,
}

/// The outcome of executing one instruction: either the step completed
/// (possibly after delivering an interrupt internally) or the processor
/// hit an implementation error and must stop.
pub type StepOutcome = Result<(), MachineCheck>;
