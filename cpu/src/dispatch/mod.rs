//! Instruction dispatch: decode's `f`/`j`/`a` fields select a handler, and
//! each handler is responsible for its own operand resolution, register
//! side effects, and the interrupts its own semantics call for.
//!
//! The handler table covers the instruction families this core implements;
//! it is not a transcription of a real `f`-field assignment. An `f` value
//! with no handler here is, from the emulated program's point of view,
//! exactly as illegal as a genuinely unassigned opcode, so the fallback
//! arm raises the same interrupt a real illegal-instruction trap would.
//!
//! The `j` field's low bit selects immediate addressing (operand is the
//! instruction's own `U` field, sign-extended) versus register/storage
//! addressing through [`operand::get_operand`]; this core does not
//! implement the full partial-word `j`-field table real hardware uses.

use ux2200_core::{OperatorConsole, StopDetail, StopReason, StorageUnit};

use crate::bank::{self, AccessUsage, BankType};
use crate::interrupt::Interrupt;
use crate::operand::{self, DecodedInstruction};
use crate::processor::Processor;
use crate::registers::{get_partial, PartialWord, RegisterFile};
use crate::word::{self, Word36};

/// How the run loop should move the program counter after a handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Advance {
    /// Step PC by one word, the common case.
    Normal,
    /// Step PC by two words (a conditional skip was taken).
    Skip,
    /// The handler set PAR itself; leave it alone.
    Jumped,
}

/// Execute one decoded instruction against `proc`.
pub fn execute<S: StorageUnit>(
    proc: &mut Processor<S>,
    raw: Word36,
    instr: &DecodedInstruction,
) -> Result<Advance, Interrupt> {
    if raw == 0 {
        return Err(Interrupt::illegal_operation());
    }

    match instr.f {
        0o00 => halt(proc, instr),
        0o01 => load(proc, instr, RegisterFile::set_r),
        0o02 => load(proc, instr, RegisterFile::set_a),
        0o03 => load(proc, instr, RegisterFile::set_x),
        0o04 => load_xi(proc, instr),
        0o10 => store(proc, instr, RegisterFile::r),
        0o11 => store(proc, instr, RegisterFile::a),
        0o12 => store(proc, instr, RegisterFile::x),
        0o20 => add_sub(proc, instr, false),
        0o21 => add_sub(proc, instr, true),
        0o30 => logical(proc, instr, |a, b| a & b),
        0o31 => logical(proc, instr, |a, b| a | b),
        0o32 => logical(proc, instr, |a, b| a ^ b),
        0o40 => dsa(proc, instr),
        0o41 => lbu(proc, instr),
        0o50 => jump(proc, instr, |_| true),
        0o51 => jump(proc, instr, word::is_zero),
        0o52 => jump(proc, instr, |v| !word::is_zero(v)),
        0o53 => jump(proc, instr, |v| !word::is_negative(v) && !word::is_zero(v)),
        0o54 => jump(proc, instr, word::is_negative),
        0o56 => jnfo(proc, instr),
        0o60 => lbn(proc, instr),
        0o61 => locl(proc, instr),
        0o62 => aaij(proc, instr),
        0o63 => rmd(proc, instr),
        _ => Err(Interrupt::illegal_operation()),
    }
}

fn operand_base<S: StorageUnit>(proc: &Processor<S>, instr: &DecodedInstruction) -> crate::registers::BaseRegister {
    proc.active_base(instr)
}

/// Resolve this instruction's read operand: immediate when `j`'s low bit
/// is set, otherwise the indexed register-or-storage value `get_operand`
/// resolves.
fn operand_value<S: StorageUnit>(proc: &mut Processor<S>, instr: &DecodedInstruction) -> Result<Word36, Interrupt> {
    if instr.j & 1 != 0 {
        return Ok(operand::get_immediate_operand(instr));
    }
    let base = operand_base(proc, instr);
    let access_key = proc.access_key();
    let privilege = proc.privilege();
    operand::get_operand(&mut proc.regs, &proc.storage, instr, true, true, true, base, access_key, privilege)
        .map_err(Interrupt::addressing)
}

/// Resolve this instruction's write operand location and store `value`
/// there. Immediate addressing makes no sense for a store, so the `j`
/// low-bit immediate selector is not consulted here.
fn store_operand<S: StorageUnit>(proc: &mut Processor<S>, instr: &DecodedInstruction, value: Word36) -> Result<(), Interrupt> {
    let base = operand_base(proc, instr);
    let access_key = proc.access_key();
    let privilege = proc.privilege();
    operand::put_operand(&mut proc.regs, &mut proc.storage, instr, true, true, true, base, access_key, privilege, value)
        .map_err(Interrupt::addressing)
}

/// `HALT`. A raw all-zero instruction word (every handler field zero) is
/// the architecture's illegal-operation case, not a legitimate halt — see
/// [`execute`]'s leading check. Any other `f=0` encoding is a real halt;
/// the instruction's own `U` field is carried as the stop detail, matching
/// the console-visible "halt code" operators key into the stop/start panel.
fn halt<S: StorageUnit>(proc: &mut Processor<S>, instr: &DecodedInstruction) -> Result<Advance, Interrupt> {
    proc.stop(StopReason::Debug, StopDetail(instr.u));
    Ok(Advance::Normal)
}

fn load<S: StorageUnit>(
    proc: &mut Processor<S>,
    instr: &DecodedInstruction,
    set: fn(&mut RegisterFile, usize, Word36),
) -> Result<Advance, Interrupt> {
    let value = operand_value(proc, instr)?;
    set(&mut proc.regs, instr.a as usize, value);
    Ok(Advance::Normal)
}

fn store<S: StorageUnit>(
    proc: &mut Processor<S>,
    instr: &DecodedInstruction,
    get: fn(&RegisterFile, usize) -> Word36,
) -> Result<Advance, Interrupt> {
    let value = get(&proc.regs, instr.a as usize);
    store_operand(proc, instr, value)?;
    Ok(Advance::Normal)
}

/// `LXI`: loads only `X[a].XI`, leaving `X[a].XM` exactly as it was. This
/// is deliberately narrower than [`load`], which overwrites the whole
/// register.
fn load_xi<S: StorageUnit>(proc: &mut Processor<S>, instr: &DecodedInstruction) -> Result<Advance, Interrupt> {
    let value = operand_value(proc, instr)?;
    proc.regs.set_x_partial(instr.a as usize, PartialWord::Xi, value);
    Ok(Advance::Normal)
}

/// `ADD`/`SUB`: ones-complement arithmetic on `A[a]`, updating
/// `DR.carry`/`DR.overflow`. An overflow with `DR.operation_trap_enabled`
/// set raises an operation trap rather than silently wrapping.
fn add_sub<S: StorageUnit>(proc: &mut Processor<S>, instr: &DecodedInstruction, subtract: bool) -> Result<Advance, Interrupt> {
    let operand = operand_value(proc, instr)?;
    let rhs = if subtract { word::negate36(operand) } else { operand };
    let a = proc.regs.a(instr.a as usize);
    let result = word::add36(a, rhs);
    proc.regs.set_a(instr.a as usize, result.sum);
    proc.regs.dr.carry = result.carry;
    proc.regs.dr.overflow = result.overflow;
    if result.overflow && proc.regs.dr.operation_trap_enabled {
        return Err(Interrupt::new(crate::interrupt::InterruptReason::OperationTrap));
    }
    Ok(Advance::Normal)
}

/// `AND`/`OR`/`XOR`: bitwise combination of `A[a]` and the operand, written
/// to `A[a+1]` — the destination is always the accumulator one past the
/// source, never `A[a]` itself.
fn logical<S: StorageUnit>(
    proc: &mut Processor<S>,
    instr: &DecodedInstruction,
    op: fn(Word36, Word36) -> Word36,
) -> Result<Advance, Interrupt> {
    let operand = operand_value(proc, instr)?;
    let a = proc.regs.a(instr.a as usize);
    let result = op(a, operand) & word::WORD_MASK;
    proc.regs.set_a((instr.a as usize + 1) % 16, result);
    Ok(Advance::Normal)
}

/// `DSA`: algebraic right shift of the 72-bit double accumulator
/// `(A[a], A[a+1])`, shift count taken from the low 7 bits of the operand.
fn dsa<S: StorageUnit>(proc: &mut Processor<S>, instr: &DecodedInstruction) -> Result<Advance, Interrupt> {
    let operand = operand_value(proc, instr)?;
    let count = word::field(operand, 29, 7) as u32;
    let hi = proc.regs.a(instr.a as usize);
    let lo = proc.regs.a((instr.a as usize + 1) % 16);
    let (hi_out, lo_out) = word::right_shift_algebraic72(hi, lo, count);
    proc.regs.set_a(instr.a as usize, hi_out);
    proc.regs.set_a((instr.a as usize + 1) % 16, lo_out);
    Ok(Advance::Normal)
}

/// `LBU`: load base register `B[a]` from the bank descriptor named by the
/// operand's `(L,BDI)` fields, walking any indirect/gate chain exactly
/// once. Operand and RCS references through `B[a]` afterward resolve
/// against this snapshot rather than re-reading the bank descriptor table.
fn lbu<S: StorageUnit>(proc: &mut Processor<S>, instr: &DecodedInstruction) -> Result<Advance, Interrupt> {
    let operand = operand_value(proc, instr)?;
    let l = word::field(operand, 0, 3) as u8;
    let bdi = word::field(operand, 3, 15) as u16;
    let addr = bank::VirtualAddress { l, bdi, offset: 0 };
    proc.load_base_register(instr.a as usize, addr, AccessUsage::Read)?;
    Ok(Advance::Normal)
}

/// `J`/`JZ`/`JNZ`/`JP`/`JN`: jump to the operand address when `test(A[a])`
/// holds.
fn jump<S: StorageUnit>(
    proc: &mut Processor<S>,
    instr: &DecodedInstruction,
    test: fn(Word36) -> bool,
) -> Result<Advance, Interrupt> {
    let a = proc.regs.a(instr.a as usize);
    if !test(a) {
        return Ok(Advance::Normal);
    }
    let access_key = proc.access_key();
    let privilege = proc.privilege();
    let return_pc = proc.regs.par.pc;
    let target = operand::get_jump_operand(
        &mut proc.regs,
        &mut proc.storage,
        &mut proc.rcs,
        instr,
        return_pc,
        false,
        access_key,
        privilege,
    )
    .map_err(Interrupt::addressing)?;
    proc.regs.par.pc = target;
    Ok(Advance::Jumped)
}

/// `JNFO`: clear `DR.characteristic_overflow` unconditionally, and jump
/// only if the flag had not already been set (so the first overflow since
/// it was last cleared is reported by falling through, not by jumping).
fn jnfo<S: StorageUnit>(proc: &mut Processor<S>, instr: &DecodedInstruction) -> Result<Advance, Interrupt> {
    let was_set = proc.regs.dr.characteristic_overflow;
    proc.regs.dr.characteristic_overflow = false;
    if was_set {
        return Ok(Advance::Normal);
    }
    let access_key = proc.access_key();
    let privilege = proc.privilege();
    let return_pc = proc.regs.par.pc;
    let target = operand::get_jump_operand(
        &mut proc.regs,
        &mut proc.storage,
        &mut proc.rcs,
        instr,
        return_pc,
        false,
        access_key,
        privilege,
    )
    .map_err(Interrupt::addressing)?;
    proc.regs.par.pc = target;
    Ok(Advance::Jumped)
}

/// `LBN`: load a bank name into `X[a]`.
///
/// Short-circuits on a direct `(L,BDI)` pair at or below `(0,31)`: those
/// slots name a bank directly rather than through a descriptor, so the
/// bank name is read straight out of the operand word's `H1` rather than
/// by translating through the bank descriptor table — and the short
/// circuit itself is always reported back to the caller as a skip, since
/// no descriptor fetch or type check ever ran. When the operand instead
/// names a real bank descriptor, it is fetched to read its own target
/// `BDI` as the bank name, and the skip is conditioned on the descriptor's
/// own type: only a non-`BasicMode` bank skips.
///
/// Unlike `LXI`, this instruction always clears `X[a].XM` — it is loading
/// a fresh bank name, not adjusting an existing index value, so the old
/// modifier half must not survive.
fn lbn<S: StorageUnit>(proc: &mut Processor<S>, instr: &DecodedInstruction) -> Result<Advance, Interrupt> {
    let operand = operand_value(proc, instr)?;
    let l = word::field(operand, 0, 3) as u8;
    let bdi = word::field(operand, 3, 15) as u16;

    let (bank_name, skip) = if l == 0 && bdi <= 31 {
        (get_partial(operand, PartialWord::H1), true)
    } else {
        let access_key = proc.access_key();
        let privilege = proc.privilege();
        let addr = bank::VirtualAddress { l, bdi, offset: 0 };
        let (_, bd) = bank::translate(&proc.storage, &proc.bdt, access_key, privilege, addr, AccessUsage::Read)
            .map_err(Interrupt::addressing)?;
        let bank_type = bd.bank_type().unwrap_or(BankType::BasicMode);
        (u64::from(bd.target_bdi), bank_type != BankType::BasicMode)
    };

    proc.regs.set_x_partial(instr.a as usize, PartialWord::Xi, bank_name);
    proc.regs.set_x_partial(instr.a as usize, PartialWord::Xm, 0);

    if skip {
        Ok(Advance::Skip)
    } else {
        Ok(Advance::Normal)
    }
}

/// `LOCL`: subroutine call. Pushes the return address onto the return
/// control stack, records the calling bank's `(L,BDI)` in `X0` as linkage
/// for the eventual return, and jumps.
fn locl<S: StorageUnit>(proc: &mut Processor<S>, instr: &DecodedInstruction) -> Result<Advance, Interrupt> {
    let caller_l = proc.regs.par.level;
    let caller_bdi = proc.regs.par.bdi;
    let access_key = proc.access_key();
    let privilege = proc.privilege();
    let return_pc = proc.regs.par.pc;
    let target = operand::get_jump_operand(
        &mut proc.regs,
        &mut proc.storage,
        &mut proc.rcs,
        instr,
        return_pc,
        true,
        access_key,
        privilege,
    )
    .map_err(Interrupt::addressing)?;
    proc.regs.set_x_partial(0, PartialWord::H1, u64::from(caller_l));
    proc.regs.set_x_partial(0, PartialWord::H2, u64::from(caller_bdi));
    proc.regs.par.pc = target;
    Ok(Advance::Jumped)
}

/// `AAIJ`: atomically enable deferrable interrupts and jump. Enabling the
/// bit and moving PAR within the same step, before the run loop's next
/// `take_eligible` check, is what makes any interrupt already pending wait
/// until the *following* instruction boundary rather than firing between
/// the enable and the jump.
fn aaij<S: StorageUnit>(proc: &mut Processor<S>, instr: &DecodedInstruction) -> Result<Advance, Interrupt> {
    proc.regs.dr.deferrable_interrupt_enabled = true;
    let access_key = proc.access_key();
    let privilege = proc.privilege();
    let return_pc = proc.regs.par.pc;
    let target = operand::get_jump_operand(
        &mut proc.regs,
        &mut proc.storage,
        &mut proc.rcs,
        instr,
        return_pc,
        false,
        access_key,
        privilege,
    )
    .map_err(Interrupt::addressing)?;
    proc.regs.par.pc = target;
    Ok(Advance::Jumped)
}

/// `RMD`: read the day clock, privileged to rings 0-2. The 41-bit result
/// splits into a 5-bit high part in `R[a]` and the 36-bit low part in
/// `R[a+1]`.
fn rmd<S: StorageUnit>(proc: &mut Processor<S>, instr: &DecodedInstruction) -> Result<Advance, Interrupt> {
    if proc.privilege() > 2 {
        return Err(Interrupt::invalid_processor_privilege());
    }
    let reading = proc.dayclock.read_now();
    let high = reading >> word::WORD_BITS;
    let low = reading & word::WORD_MASK;
    proc.regs.set_r(instr.a as usize, high);
    proc.regs.set_r((instr.a as usize + 1) % 16, low);
    Ok(Advance::Normal)
}
