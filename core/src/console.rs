//! Operator console surface.
//!
//! The console is the only supported way to start, stop, and inspect a
//! processor from outside the emulator. It never reaches into architectural
//! state directly — every operation here is implemented by the processor
//! crate in terms of the register file and run loop.

use thiserror::Error;

/// Why a processor is stopped.
///
/// Mirrors the stop-reason vocabulary of the real console: a `HALT`
/// instruction, an operator-issued clear, or a hardware condition the
/// processor could not recover from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Never stopped, or cleared since the last stop.
    Running,
    /// A `HALT` instruction executed; detail carries the operand.
    Debug,
    /// An illegal opcode or otherwise malformed instruction was decoded.
    IllegalOperation,
    /// A breakpoint condition matched.
    BreakpointHalt,
    /// A hardware-check interrupt could not be delivered (non-deferrable and
    /// already at the highest priority) and the processor halted instead.
    HardwareCheck,
    /// An implementation-level machine check stopped the processor.
    MachineCheck,
    /// The operator issued `clear`.
    ClearedByOperator,
}

/// Detail accompanying a [`StopReason`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StopDetail(pub u32);

/// Console-level failures — issuing an operation that doesn't make sense
/// given the processor's current run state.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleError {
    /// `start` was issued on a processor that is already running.
    #[error("processor is already running")]
    AlreadyRunning,
    /// A register operation named a slot that doesn't exist.
    #[error("no such register: {0}")]
    NoSuchRegister(&'static str),
}

/// Operations exposed to an external operator / debugger.
///
/// Implemented by the processor crate's `Processor` type. `read_register`
/// and `write_register` use the same dotted-path vocabulary as
/// [`crate::Observable::query`] so a console and a debugger can share one
/// addressing scheme for architectural state.
pub trait OperatorConsole {
    /// Begin (or resume) instruction execution.
    fn start(&mut self) -> Result<(), ConsoleError>;

    /// Request the processor stop, recording `reason`/`detail`. The
    /// currently executing instruction runs to its next interruptible
    /// boundary before the stop takes effect.
    fn stop(&mut self, reason: StopReason, detail: StopDetail);

    /// Reset to the cleared state: registers zeroed, stop reason cleared.
    fn clear(&mut self);

    /// The reason the processor is currently stopped.
    fn get_stop_reason(&self) -> StopReason;

    /// Detail accompanying `get_stop_reason`.
    fn get_stop_detail(&self) -> StopDetail;

    /// Read an architectural register by dotted path (e.g. `"a.4"`, `"dr"`).
    fn read_register(&self, path: &str) -> Result<u64, ConsoleError>;

    /// Write an architectural register by dotted path.
    fn write_register(&mut self, path: &str, value: u64) -> Result<(), ConsoleError>;
}
