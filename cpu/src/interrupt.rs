//! Interrupt and trap machinery: the pending-interrupt queue, priority
//! ordering, and delivery into an interrupt-control-stack frame.
//!
//! Interrupts are plain data, not a Rust `Error` type — they are
//! architectural events the emulated program can see and handle, not bugs
//! in the emulator. Handlers raise one by returning
//! `Err(Interrupt)` from a `Result<(), Interrupt>`-shaped step; the run
//! loop (component G) catches it and re-enters this module's pending
//! queue at the fault site rather than unwinding the process.

use crate::bank::AddressingException;
use crate::registers::{DesignatorRegister, IndicatorKeyRegister, ProgramAddressRegister};

/// Why an arithmetic instruction trapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticExceptionReason {
    DivideCheck,
    CharacteristicOverflow,
    CharacteristicUnderflow,
}

/// Why an instruction was rejected before it could execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidInstructionReason {
    /// The decoded `f`/`j`/`a` combination names no handler.
    IllegalOperation,
    /// A privileged instruction ran at a `DR.processor_privilege` weaker
    /// than it requires.
    InvalidProcessorPrivilege,
}

/// The ISW0 code the architecture reference assigns to a "+0" word
/// decoded as an instruction: all handler fields are zero, which names no
/// instruction.
pub const ISW_ILLEGAL_OPERATION: u32 = 0o01016;

/// The architectural reason a specific interrupt was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptReason {
    HardwareCheck,
    MachineCheck,
    ReferenceViolation,
    Addressing(AddressingException),
    Arithmetic(ArithmeticExceptionReason),
    InvalidInstruction(InvalidInstructionReason),
    OperationTrap,
    Breakpoint,
    QuantumTimer,
    Dayclock,
    Signal,
    UpiInitial,
    UpiNormal,
    IoInterrupt,
    SoftwareBreak,
}

impl InterruptReason {
    /// Priority order, lowest value delivered first. Matches the
    /// architecture's documented class ordering: Hardware-check highest,
    /// Software-break lowest.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            InterruptReason::HardwareCheck => 0,
            InterruptReason::MachineCheck => 1,
            InterruptReason::ReferenceViolation => 2,
            InterruptReason::Addressing(_) => 3,
            InterruptReason::Arithmetic(_) => 4,
            InterruptReason::InvalidInstruction(_) => 5,
            InterruptReason::OperationTrap => 6,
            InterruptReason::Breakpoint => 7,
            InterruptReason::QuantumTimer => 8,
            InterruptReason::Dayclock => 9,
            InterruptReason::Signal => 10,
            InterruptReason::UpiInitial => 11,
            InterruptReason::UpiNormal => 12,
            InterruptReason::IoInterrupt => 13,
            InterruptReason::SoftwareBreak => 14,
        }
    }

    /// Synchronous faults and hardware/machine checks are delivered
    /// immediately; only genuinely asynchronous classes are held back by
    /// `DR.deferrable_interrupt_enabled`.
    #[must_use]
    pub const fn is_deferrable(self) -> bool {
        matches!(
            self,
            InterruptReason::QuantumTimer
                | InterruptReason::Dayclock
                | InterruptReason::Signal
                | InterruptReason::UpiInitial
                | InterruptReason::UpiNormal
                | InterruptReason::IoInterrupt
                | InterruptReason::SoftwareBreak
        )
    }
}

/// A structured interrupt: reason plus the short-status/ISW detail words
/// the console and diagnostic tooling surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interrupt {
    pub reason: InterruptReason,
    pub ssf: u32,
    pub isw0: u32,
    pub isw1: u32,
}

impl Interrupt {
    #[must_use]
    pub const fn new(reason: InterruptReason) -> Self {
        Self { reason, ssf: 0, isw0: 0, isw1: 0 }
    }

    #[must_use]
    pub const fn with_isw(reason: InterruptReason, isw0: u32, isw1: u32) -> Self {
        Self { reason, ssf: 0, isw0, isw1 }
    }

    #[must_use]
    pub const fn illegal_operation() -> Self {
        Self::with_isw(InterruptReason::InvalidInstruction(InvalidInstructionReason::IllegalOperation), ISW_ILLEGAL_OPERATION, 0)
    }

    #[must_use]
    pub const fn invalid_processor_privilege() -> Self {
        Self::new(InterruptReason::InvalidInstruction(InvalidInstructionReason::InvalidProcessorPrivilege))
    }

    #[must_use]
    pub const fn addressing(exception: AddressingException) -> Self {
        Self::new(InterruptReason::Addressing(exception))
    }
}

/// Saved processor state for one interrupt nesting level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterruptControlStackFrame {
    pub par: ProgramAddressRegister,
    pub dr: DesignatorRegister,
    pub ikr: IndicatorKeyRegister,
}

/// Where control transfers to for a given interrupt class, configured by
/// the inventory manager at boot — analogous to [`crate::bank::BankDescriptorTableConfig`].
#[derive(Debug, Clone, Copy)]
pub struct InterruptVector {
    pub l: u8,
    pub bdi: u16,
    pub offset: u32,
}

const VECTOR_SLOTS: usize = 15;

/// Per-class interrupt vectors and the interrupt-control stack.
#[derive(Debug, Clone)]
pub struct InterruptVectorTable {
    vectors: [Option<InterruptVector>; VECTOR_SLOTS],
}

impl Default for InterruptVectorTable {
    fn default() -> Self {
        Self { vectors: [None; VECTOR_SLOTS] }
    }
}

impl InterruptVectorTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_vector(&mut self, reason: InterruptReason, vector: InterruptVector) {
        self.vectors[reason.priority() as usize] = Some(vector);
    }

    #[must_use]
    pub fn vector_for(&self, reason: InterruptReason) -> Option<InterruptVector> {
        self.vectors[reason.priority() as usize]
    }
}

struct PendingEntry {
    interrupt: Interrupt,
    arrival: u64,
}

/// The pending-interrupt queue plus the interrupt-control stack (saved
/// PAR/DR/IKR frames, one per nested interrupt).
#[derive(Default)]
pub struct InterruptState {
    pending: Vec<PendingEntry>,
    ics: Vec<InterruptControlStackFrame>,
    next_arrival: u64,
}

impl InterruptState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an interrupt. Multiple pending interrupts are serviced
    /// highest-priority-first; ties are broken by arrival order.
    pub fn raise(&mut self, interrupt: Interrupt) {
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        self.pending.push(PendingEntry { interrupt, arrival });
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Remove and return the highest-priority interrupt eligible for
    /// delivery right now: non-deferrable interrupts are always eligible;
    /// deferrable ones require `deferrable_enabled`.
    pub fn take_eligible(&mut self, deferrable_enabled: bool) -> Option<Interrupt> {
        let best_index = self
            .pending
            .iter()
            .enumerate()
            .filter(|(_, entry)| deferrable_enabled || !entry.interrupt.reason.is_deferrable())
            .min_by_key(|(_, entry)| (entry.interrupt.reason.priority(), entry.arrival))
            .map(|(index, _)| index)?;
        Some(self.pending.remove(best_index).interrupt)
    }

    /// Save `par`/`dr`/`ikr` onto the interrupt-control stack, returning
    /// the new nesting depth.
    pub fn push_frame(&mut self, par: ProgramAddressRegister, dr: DesignatorRegister, ikr: IndicatorKeyRegister) -> usize {
        self.ics.push(InterruptControlStackFrame { par, dr, ikr });
        self.ics.len()
    }

    /// Pop the most recently saved frame, for interrupt return.
    pub fn pop_frame(&mut self) -> Option<InterruptControlStackFrame> {
        self.ics.pop()
    }
}

/// Deliver `interrupt`: save PAR/DR/IKR, clear the deferrable-enabled bit
/// if the class is non-deferrable, load the vector into PAR, and raise
/// privilege to 0. Returns the saved frame's nesting depth.
///
/// `par` must still point at the faulting instruction (or the
/// about-to-execute one, for asynchronous classes) on entry; the run loop
/// is responsible for not having advanced it yet.
pub fn deliver(
    state: &mut InterruptState,
    vectors: &InterruptVectorTable,
    interrupt: Interrupt,
    par: &mut ProgramAddressRegister,
    dr: &mut DesignatorRegister,
    ikr: &IndicatorKeyRegister,
) -> usize {
    let depth = state.push_frame(*par, *dr, *ikr);
    if !interrupt.reason.is_deferrable() {
        dr.deferrable_interrupt_enabled = false;
    }
    if let Some(vector) = vectors.vector_for(interrupt.reason) {
        par.level = vector.l;
        par.bdi = vector.bdi;
        par.pc = vector.offset;
    }
    dr.processor_privilege = 0;
    tracing::trace!(reason = ?interrupt.reason, depth, l = par.level, bdi = par.bdi, pc = par.pc, "interrupt delivered");
    depth
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_priority_pending_interrupt_is_taken_first() {
        let mut state = InterruptState::new();
        state.raise(Interrupt::new(InterruptReason::SoftwareBreak));
        state.raise(Interrupt::new(InterruptReason::HardwareCheck));
        state.raise(Interrupt::new(InterruptReason::Breakpoint));
        let first = state.take_eligible(true).unwrap();
        assert_eq!(first.reason, InterruptReason::HardwareCheck);
    }

    #[test]
    fn ties_broken_by_arrival_order() {
        let mut state = InterruptState::new();
        state.raise(Interrupt::new(InterruptReason::Dayclock));
        state.raise(Interrupt::new(InterruptReason::Signal));
        // Dayclock and Signal have distinct priorities; use two same-class
        // raises to exercise the arrival tie-break directly.
        let mut same_class = InterruptState::new();
        same_class.raise(Interrupt::with_isw(InterruptReason::IoInterrupt, 1, 0));
        same_class.raise(Interrupt::with_isw(InterruptReason::IoInterrupt, 2, 0));
        let first = same_class.take_eligible(true).unwrap();
        assert_eq!(first.isw0, 1);
    }

    #[test]
    fn deferrable_interrupt_withheld_until_enabled() {
        let mut state = InterruptState::new();
        state.raise(Interrupt::new(InterruptReason::Signal));
        assert!(state.take_eligible(false).is_none());
        assert!(state.take_eligible(true).is_some());
    }

    #[test]
    fn non_deferrable_interrupt_delivered_regardless() {
        let mut state = InterruptState::new();
        state.raise(Interrupt::new(InterruptReason::HardwareCheck));
        assert!(state.take_eligible(false).is_some());
    }

    #[test]
    fn delivery_clears_deferrable_bit_for_non_deferrable_class() {
        let mut state = InterruptState::new();
        let mut vectors = InterruptVectorTable::new();
        vectors.set_vector(InterruptReason::HardwareCheck, InterruptVector { l: 0, bdi: 1, offset: 0o100 });
        let mut par = ProgramAddressRegister { level: 2, bdi: 5, pc: 40 };
        let mut dr = DesignatorRegister { deferrable_interrupt_enabled: true, processor_privilege: 3, ..DesignatorRegister::default() };
        let ikr = IndicatorKeyRegister::default();
        deliver(&mut state, &vectors, Interrupt::new(InterruptReason::HardwareCheck), &mut par, &mut dr, &ikr);
        assert!(!dr.deferrable_interrupt_enabled);
        assert_eq!(dr.processor_privilege, 0);
        assert_eq!((par.level, par.bdi, par.pc), (0, 1, 0o100));
    }

    #[test]
    fn delivery_preserves_deferrable_bit_for_deferrable_class() {
        let mut state = InterruptState::new();
        let vectors = InterruptVectorTable::new();
        let mut par = ProgramAddressRegister::default();
        let mut dr = DesignatorRegister { deferrable_interrupt_enabled: true, ..DesignatorRegister::default() };
        let ikr = IndicatorKeyRegister::default();
        deliver(&mut state, &vectors, Interrupt::new(InterruptReason::Signal), &mut par, &mut dr, &ikr);
        assert!(dr.deferrable_interrupt_enabled);
    }
}
