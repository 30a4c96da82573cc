//! Operand resolution: turning an instruction's `u`/`x`/`h`/`i` fields into
//! a register slot or an absolute storage word.
//!
//! Indexing is the subtle part. Reading the index register's `XI` field
//! and folding it into `u` happens the same way for every operand kind;
//! what differs is *when* the post-read `XI += XM` write-back fires.
//! `getOperand` write-back is gated by the caller's `index_inc` flag (most
//! loads/stores pass `true`); `getJumpOperand` applies indexing, and its
//! write-back, only when `h` is set — a narrower rule specific to jump
//! targets.

use ux2200_core::StorageUnit;

use crate::bank::{self, AccessUsage};
use crate::registers::{BaseRegister, PartialWord, RegisterFile};
use crate::word::{self, Word36};

/// Decoded instruction-word fields needed for operand resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub f: u8,
    pub j: u8,
    pub a: u8,
    pub x: u8,
    pub h: bool,
    pub i: bool,
    pub u: u32,
    pub basic_mode_b: u8,
    pub basic_mode_d: u16,
}

/// Decode a raw 36-bit instruction word.
#[must_use]
pub fn decode(raw: Word36, basic_mode: bool) -> DecodedInstruction {
    let f = word::field(raw, 0, 6) as u8;
    let j = word::field(raw, 6, 4) as u8;
    let a = word::field(raw, 10, 4) as u8;
    let x = word::field(raw, 14, 4) as u8;
    let h = word::field(raw, 18, 1) != 0;
    let i = word::field(raw, 19, 1) != 0;
    if basic_mode {
        let b = word::field(raw, 20, 3) as u8;
        let d = word::field(raw, 23, 13) as u16;
        DecodedInstruction { f, j, a, x, h, i, u: u32::from(d), basic_mode_b: b, basic_mode_d: d }
    } else {
        let u = word::field(raw, 20, 16) as u32;
        DecodedInstruction { f, j, a, x, h, i, u, basic_mode_b: 0, basic_mode_d: 0 }
    }
}

/// Lowest GRS address covered by each named register bank, in the
/// simplified addressing scheme this core uses (X0-15, A0-15, R0-15
/// packed contiguously into the low 48 of the architecture's 128 GRS
/// slots; the remaining slots are unassigned and read as zero).
mod grs_layout {
    pub const X_BASE: usize = 0;
    pub const A_BASE: usize = 16;
    pub const R_BASE: usize = 32;
    pub const GRS_LIMIT: usize = 128;
}

fn grs_read(regs: &RegisterFile, slot: usize) -> Word36 {
    use grs_layout::{A_BASE, R_BASE, X_BASE};
    match slot {
        s if s < A_BASE => regs.x(s - X_BASE),
        s if s < R_BASE => regs.a(s - A_BASE),
        s if s < grs_layout::GRS_LIMIT => regs.r(s - R_BASE),
        _ => 0,
    }
}

fn grs_write(regs: &mut RegisterFile, slot: usize, value: Word36) {
    use grs_layout::{A_BASE, R_BASE, X_BASE};
    match slot {
        s if s < A_BASE => regs.set_x(s - X_BASE, value),
        s if s < R_BASE => regs.set_a(s - A_BASE, value),
        s if s < grs_layout::GRS_LIMIT => regs.set_r(s - R_BASE, value),
        _ => {}
    }
}

/// Where an operand lives once indexing has been applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandLocation {
    Register(usize),
    Storage(u32),
}

/// Apply indexing (`u += XI`, with the `h`-gated `XI += XM` write-back)
/// and decide whether the result names a GRS register or a storage offset.
fn resolve_address(
    regs: &mut RegisterFile,
    instr: &DecodedInstruction,
    indexed: bool,
    index_inc: bool,
    grs_allowed: bool,
) -> OperandLocation {
    let mut u = u64::from(instr.u);
    if indexed && instr.x != 0 {
        let xi = regs.x_partial(instr.x as usize, PartialWord::Xi);
        u = word::add_complement(u, xi, 18).sum;
        if index_inc && instr.h {
            let xm = regs.x_partial(instr.x as usize, PartialWord::Xm);
            let new_xi = word::add_complement(xi, xm, 18).sum;
            regs.set_x_partial(instr.x as usize, PartialWord::Xi, new_xi);
        }
    }
    if grs_allowed && u < grs_layout::GRS_LIMIT as u64 {
        OperandLocation::Register(u as usize)
    } else {
        OperandLocation::Storage(u as u32)
    }
}

fn fetch_storage_word(
    storage: &dyn StorageUnit,
    base: BaseRegister,
    offset: u32,
    access_key: u16,
    privilege: u8,
    usage: AccessUsage,
) -> Result<Word36, bank::AddressingException> {
    let absolute = bank::resolve_cached(base, offset, access_key, privilege, usage)?;
    storage.read_absolute(absolute.upi, absolute.offset).map_err(|_| {
        bank::AddressingException { reason: bank::AddressingExceptionReason::GeneralFault, l: base.l, bdi: base.bdi }
    })
}

/// Resolve and read the operand addressed by `instr`, from a register
/// (when `grs_allowed` and the indexed `u` names one) or, through `base`,
/// from storage — `base` must already be loaded (see
/// [`crate::processor::Processor::load_base_register`]); this never walks
/// the bank descriptor table itself.
#[allow(clippy::too_many_arguments)]
pub fn get_operand(
    regs: &mut RegisterFile,
    storage: &dyn StorageUnit,
    instr: &DecodedInstruction,
    grs_allowed: bool,
    indexed: bool,
    index_inc: bool,
    base: BaseRegister,
    access_key: u16,
    privilege: u8,
) -> Result<Word36, bank::AddressingException> {
    match resolve_address(regs, instr, indexed, index_inc, grs_allowed) {
        OperandLocation::Register(slot) => Ok(grs_read(regs, slot)),
        OperandLocation::Storage(offset) => {
            fetch_storage_word(storage, base, offset, access_key, privilege, AccessUsage::Read)
        }
    }
}

/// Resolve the operand address addressed by `instr` and write `value`
/// there, through a register or through already-loaded `base`.
#[allow(clippy::too_many_arguments)]
pub fn put_operand(
    regs: &mut RegisterFile,
    storage: &mut dyn StorageUnit,
    instr: &DecodedInstruction,
    grs_allowed: bool,
    indexed: bool,
    index_inc: bool,
    base: BaseRegister,
    access_key: u16,
    privilege: u8,
    value: Word36,
) -> Result<(), bank::AddressingException> {
    match resolve_address(regs, instr, indexed, index_inc, grs_allowed) {
        OperandLocation::Register(slot) => {
            grs_write(regs, slot, value);
            Ok(())
        }
        OperandLocation::Storage(offset) => {
            let absolute = bank::resolve_cached(base, offset, access_key, privilege, AccessUsage::Write)?;
            storage.write_absolute(absolute.upi, absolute.offset, value).map_err(|_| bank::AddressingException {
                reason: bank::AddressingExceptionReason::GeneralFault,
                l: base.l,
                bdi: base.bdi,
            })
        }
    }
}

/// The sign-extended immediate value of the instruction's `u` field.
#[must_use]
pub fn get_immediate_operand(instr: &DecodedInstruction) -> Word36 {
    word::sign_extend_to_word(u64::from(instr.u), 16)
}

/// Resolve a jump target (a PC within the currently-based instruction
/// bank). Unlike [`get_operand`], indexing is applied only when `h` is
/// set, and the `XI += XM` write-back fires in that same case.
pub fn get_jump_operand(
    regs: &mut RegisterFile,
    storage: &mut dyn StorageUnit,
    rcs: &mut RcsState,
    instr: &DecodedInstruction,
    return_pc: u32,
    store_after: bool,
    access_key: u16,
    privilege: u8,
) -> Result<u32, bank::AddressingException> {
    let mut target = u64::from(instr.u);
    if instr.h && instr.x != 0 {
        let xi = regs.x_partial(instr.x as usize, PartialWord::Xi);
        target = word::add_complement(target, xi, 18).sum;
        let xm = regs.x_partial(instr.x as usize, PartialWord::Xm);
        let new_xi = word::add_complement(xi, xm, 18).sum;
        regs.set_x_partial(instr.x as usize, PartialWord::Xi, new_xi);
    }
    if store_after {
        rcs_push(regs, storage, rcs, u64::from(return_pc), access_key, privilege)?;
    }
    Ok(target as u32)
}

/// Return-control-stack bookkeeping: which base register holds the RCS
/// bank, and the current stack depth (in words) within it. The RCS
/// pointer is processor state, not an architectural register — real
/// hardware keeps it in a reserved base/index pair the ISA doesn't expose
/// directly to instructions other than call/return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RcsState {
    pub depth: u32,
}

/// Push `value` onto the return-control stack.
pub fn rcs_push(
    regs: &RegisterFile,
    storage: &mut dyn StorageUnit,
    rcs: &mut RcsState,
    value: Word36,
    access_key: u16,
    privilege: u8,
) -> Result<(), bank::AddressingException> {
    let base = regs.base_register(crate::processor::RCS_BASE_REGISTER);
    let absolute = bank::resolve_cached(base, rcs.depth, access_key, privilege, AccessUsage::Write)?;
    storage.write_absolute(absolute.upi, absolute.offset, value).map_err(|_| bank::AddressingException {
        reason: bank::AddressingExceptionReason::GeneralFault,
        l: base.l,
        bdi: base.bdi,
    })?;
    rcs.depth += 1;
    Ok(())
}

/// Pop and return the top of the return-control stack.
pub fn rcs_pop(
    regs: &RegisterFile,
    storage: &dyn StorageUnit,
    rcs: &mut RcsState,
    access_key: u16,
    privilege: u8,
) -> Result<Word36, bank::AddressingException> {
    rcs.depth = rcs.depth.saturating_sub(1);
    let base = regs.base_register(crate::processor::RCS_BASE_REGISTER);
    let absolute = bank::resolve_cached(base, rcs.depth, access_key, privilege, AccessUsage::Read)?;
    storage.read_absolute(absolute.upi, absolute.offset).map_err(|_| bank::AddressingException {
        reason: bank::AddressingExceptionReason::GeneralFault,
        l: base.l,
        bdi: base.bdi,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::BankDescriptorTableConfig;
    use crate::registers::PartialWord;
    use ux2200_core::{FlatStorage, Upi};

    #[test]
    fn grs_addressed_operand_reads_register_not_storage() {
        let mut regs = RegisterFile::default();
        regs.set_a(4, 0o555);
        let instr = DecodedInstruction { f: 0, j: 0, a: 0, x: 0, h: false, i: false, u: 20, basic_mode_b: 0, basic_mode_d: 0 };
        let storage = FlatStorage::new(Upi(1), 4);
        let base = BaseRegister::void();
        let word = get_operand(&mut regs, &storage, &instr, true, true, true, base, 0, 0).unwrap();
        assert_eq!(word, 0o555);
    }

    #[test]
    fn indexing_writes_back_xi_only_when_h_set() {
        let mut regs = RegisterFile::default();
        regs.set_x_partial(1, PartialWord::Xi, 5);
        regs.set_x_partial(1, PartialWord::Xm, 3);
        let instr = DecodedInstruction { f: 0, j: 0, a: 0, x: 1, h: false, i: false, u: 200, basic_mode_b: 0, basic_mode_d: 0 };
        let storage = FlatStorage::new(Upi(1), 4096);
        let base = BaseRegister::void();
        let _ = get_operand(&mut regs, &storage, &instr, true, true, true, base, 0, 0);
        assert_eq!(regs.x_partial(1, PartialWord::Xi), 5, "h=0 must not write back");

        regs.set_x_partial(1, PartialWord::Xi, 5);
        let instr_h1 = DecodedInstruction { h: true, ..instr };
        let _ = get_operand(&mut regs, &storage, &instr_h1, true, true, true, base, 0, 0);
        assert_eq!(regs.x_partial(1, PartialWord::Xi), 8, "h=1 writes XI += XM");
    }

    #[test]
    fn get_immediate_operand_sign_extends() {
        let instr = DecodedInstruction { f: 0, j: 0, a: 0, x: 0, h: false, i: false, u: 0xFFFF, basic_mode_b: 0, basic_mode_d: 0 };
        let value = get_immediate_operand(&instr);
        assert!(word::is_negative(value));
    }

    #[test]
    fn rcs_push_then_pop_round_trips() {
        let mut regs = RegisterFile::default();
        let upi = Upi(1);
        let mut storage = FlatStorage::new(upi, 4096);
        let mut bdt = BankDescriptorTableConfig::new();
        bdt.set_level(0, upi, 0);

        // base_address is offset past the BD's own 8-word storage so the
        // RCS push/pop area doesn't alias the descriptor it is read from.
        let bd_words = crate::bank::encode_bank_descriptor(&crate::bank::BankDescriptor {
            bank_type_code: 0,
            general_access_permissions: 0b111,
            special_access_permissions: 0,
            access_lock: 0,
            lower_limit: 0,
            upper_limit: 0o777,
            base_address: 100,
            displacement: 0,
            general_fault: false,
            target_l: 0,
            target_bdi: 0,
        });
        storage.write_block(upi, 0, &bd_words).unwrap();

        let base = crate::bank::load_base_register(
            &storage,
            &bdt,
            0,
            0,
            crate::bank::VirtualAddress { l: 0, bdi: 0, offset: 0 },
            AccessUsage::Read,
        )
        .unwrap();
        regs.set_base_register(crate::processor::RCS_BASE_REGISTER, base);

        let mut rcs = RcsState::default();
        rcs_push(&regs, &mut storage, &mut rcs, 0o42, 0, 0).unwrap();
        let popped = rcs_pop(&regs, &storage, &mut rcs, 0, 0).unwrap();
        assert_eq!(popped, 0o42);
        assert_eq!(rcs.depth, 0);
    }
}
