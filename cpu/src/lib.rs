//! Instruction execution core for a 36-bit word-addressed 1100/2200-family
//! processor: ones-complement arithmetic, the architectural register file,
//! banked virtual memory translation, operand resolution, the
//! interrupt/trap queue, and the opcode dispatch table that ties them
//! together into a runnable [`Processor`].
//!
//! Module layout mirrors the architecture's own component boundaries
//! rather than a generic "cpu/mmu/io" split: [`word`] and [`registers`]
//! are pure data; [`bank`] and [`operand`] are the addressing pipeline;
//! [`interrupt`] and [`error`] are the two kinds of "this didn't execute
//! normally"; [`dispatch`] and [`processor`] assemble all of the above
//! into the fetch/decode/execute loop.

mod bank;
mod dayclock;
mod dispatch;
mod error;
mod interrupt;
mod operand;
mod processor;
mod registers;
mod word;

pub use bank::{
    AbsoluteAddress, AccessUsage, AddressingException, AddressingExceptionReason, BankDescriptor,
    BankDescriptorTableConfig, BankType, VirtualAddress, decode_bank_descriptor, encode_bank_descriptor,
};
pub use dayclock::DayClock;
pub use dispatch::Advance;
pub use error::{MachineCheck, StepOutcome};
pub use interrupt::{
    ArithmeticExceptionReason, Interrupt, InterruptControlStackFrame, InterruptReason, InterruptState,
    InterruptVector, InterruptVectorTable, InvalidInstructionReason, ISW_ILLEGAL_OPERATION,
};
pub use operand::{DecodedInstruction, OperandLocation, RcsState, decode};
pub use processor::{Processor, ProcessorConfig, RCS_BASE_REGISTER};
pub use registers::{
    BaseRegister, DesignatorRegister, IndicatorKeyRegister, PartialWord, PrivilegeLevel, ProgramAddressRegister,
    RegisterFile, get_partial, set_partial,
};
pub use word::{
    AddResult, NEGATIVE_ZERO, WORD_BITS, WORD_MASK, Word36, add36, add72, add_complement, compare36, field,
    is_negative, is_zero, left_shift_logical36, negate36, ones_complement_to_signed, right_shift_algebraic36,
    right_shift_algebraic72, right_shift_circular36, set_field, sign_extend_to_word,
};
