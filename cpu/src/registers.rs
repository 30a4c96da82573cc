//! The architectural register file: general registers, the designator,
//! indicator-key, and program-address registers, and the base-register
//! cache.
//!
//! Every accessor here is careful about one thing: partial-word access
//! must never disturb bits outside the requested field, and reading a
//! signed field (`XM`, `XI`, `XH1`, `XH2`) sign-extends while writing one
//! truncates. Get this wrong and LXI-style instructions corrupt the half
//! of the register they were never asked to touch.

use ux2200_core::Upi;

use crate::word::{self, sign_extend_to_word, Word36};

/// A named view onto part of a 36-bit word.
///
/// Bit ranges follow the architecture's left-to-right numbering (bit 0 is
/// the MSB); see [`PartialWord::bounds`] for the concrete layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialWord {
    Whole,
    H1,
    H2,
    Q1,
    Q2,
    Q3,
    Q4,
    S1,
    S2,
    S3,
    S4,
    S5,
    S6,
    T1,
    T2,
    T3,
    /// Sign-extended first half.
    Xh1,
    /// Sign-extended second half.
    Xh2,
    /// 18-bit signed modifier — the register's H1.
    Xm,
    /// 18-bit signed increment — the register's H2.
    Xi,
}

impl PartialWord {
    /// `(msb_start, width)` of this field within a 36-bit word.
    #[must_use]
    pub const fn bounds(self) -> (u32, u32) {
        match self {
            PartialWord::Whole => (0, 36),
            PartialWord::H1 | PartialWord::Xh1 | PartialWord::Xm => (0, 18),
            PartialWord::H2 | PartialWord::Xh2 | PartialWord::Xi => (18, 18),
            PartialWord::Q1 => (0, 9),
            PartialWord::Q2 => (9, 9),
            PartialWord::Q3 => (18, 9),
            PartialWord::Q4 => (27, 9),
            PartialWord::S1 => (0, 6),
            PartialWord::S2 => (6, 6),
            PartialWord::S3 => (12, 6),
            PartialWord::S4 => (18, 6),
            PartialWord::S5 => (24, 6),
            PartialWord::S6 => (30, 6),
            PartialWord::T1 => (0, 12),
            PartialWord::T2 => (12, 12),
            PartialWord::T3 => (24, 12),
        }
    }

    const fn is_sign_extended_on_read(self) -> bool {
        matches!(self, PartialWord::Xh1 | PartialWord::Xh2 | PartialWord::Xm | PartialWord::Xi)
    }
}

/// Read `field` out of `word`, sign-extending `XM`/`XI`/`XH1`/`XH2` reads.
#[must_use]
pub fn get_partial(word: Word36, field: PartialWord) -> Word36 {
    let (start, width) = field.bounds();
    let raw = word::field(word, start, width);
    if field.is_sign_extended_on_read() {
        sign_extend_to_word(raw, width)
    } else {
        raw
    }
}

/// Overwrite `field` within `word` with `value`, leaving the rest of the
/// word untouched. Writes truncate to the field's width.
#[must_use]
pub fn set_partial(word: Word36, field: PartialWord, value: Word36) -> Word36 {
    let (start, width) = field.bounds();
    word::set_field(word, start, width, value)
}

/// Processor privilege level, 0 (most privileged) through 3.
pub type PrivilegeLevel = u8;

/// The designator register: single-bit processor mode and condition flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DesignatorRegister {
    pub basic_mode_enabled: bool,
    pub processor_privilege: PrivilegeLevel,
    pub carry: bool,
    pub overflow: bool,
    pub characteristic_overflow: bool,
    pub characteristic_underflow: bool,
    pub divide_check: bool,
    pub operation_trap_enabled: bool,
    pub deferrable_interrupt_enabled: bool,
    pub exec_register_set_selection: bool,
    pub quarter_word_mode: bool,
    pub arithmetic_exception_enabled: bool,
}

impl Default for DesignatorRegister {
    fn default() -> Self {
        Self {
            basic_mode_enabled: false,
            processor_privilege: 0,
            carry: false,
            overflow: false,
            characteristic_overflow: false,
            characteristic_underflow: false,
            divide_check: false,
            operation_trap_enabled: false,
            deferrable_interrupt_enabled: false,
            exec_register_set_selection: false,
            quarter_word_mode: false,
            arithmetic_exception_enabled: false,
        }
    }
}

/// Bit positions used by [`DesignatorRegister::to_word`] /
/// [`DesignatorRegister::from_word`]. Not load-bearing for any instruction
/// semantics — the console and tests read fields through the struct's
/// named members — but real firmware dumps the whole register as one word,
/// so a stable packing is provided for that path.
mod dr_bits {
    pub const BASIC_MODE: u32 = 0;
    pub const PRIVILEGE_HI: u32 = 1;
    pub const CARRY: u32 = 3;
    pub const OVERFLOW: u32 = 4;
    pub const CHAR_OVERFLOW: u32 = 5;
    pub const CHAR_UNDERFLOW: u32 = 6;
    pub const DIVIDE_CHECK: u32 = 7;
    pub const OP_TRAP_ENABLED: u32 = 8;
    pub const DEFERRABLE_ENABLED: u32 = 9;
    pub const EXEC_REG_SET: u32 = 10;
    pub const QUARTER_WORD: u32 = 11;
    pub const ARITH_EXC_ENABLED: u32 = 12;
}

impl DesignatorRegister {
    /// Pack into a 36-bit word, for console dumps and interrupt-frame saves.
    #[must_use]
    pub fn to_word(&self) -> Word36 {
        let mut w = 0u64;
        w = word::set_field(w, dr_bits::BASIC_MODE, 1, u64::from(self.basic_mode_enabled));
        w = word::set_field(w, dr_bits::PRIVILEGE_HI, 2, u64::from(self.processor_privilege));
        w = word::set_field(w, dr_bits::CARRY, 1, u64::from(self.carry));
        w = word::set_field(w, dr_bits::OVERFLOW, 1, u64::from(self.overflow));
        w = word::set_field(w, dr_bits::CHAR_OVERFLOW, 1, u64::from(self.characteristic_overflow));
        w = word::set_field(w, dr_bits::CHAR_UNDERFLOW, 1, u64::from(self.characteristic_underflow));
        w = word::set_field(w, dr_bits::DIVIDE_CHECK, 1, u64::from(self.divide_check));
        w = word::set_field(w, dr_bits::OP_TRAP_ENABLED, 1, u64::from(self.operation_trap_enabled));
        w = word::set_field(
            w,
            dr_bits::DEFERRABLE_ENABLED,
            1,
            u64::from(self.deferrable_interrupt_enabled),
        );
        w = word::set_field(w, dr_bits::EXEC_REG_SET, 1, u64::from(self.exec_register_set_selection));
        w = word::set_field(w, dr_bits::QUARTER_WORD, 1, u64::from(self.quarter_word_mode));
        w = word::set_field(
            w,
            dr_bits::ARITH_EXC_ENABLED,
            1,
            u64::from(self.arithmetic_exception_enabled),
        );
        w
    }

    /// Unpack from a 36-bit word in the layout [`DesignatorRegister::to_word`] produces.
    #[must_use]
    pub fn from_word(w: Word36) -> Self {
        Self {
            basic_mode_enabled: word::field(w, dr_bits::BASIC_MODE, 1) != 0,
            processor_privilege: word::field(w, dr_bits::PRIVILEGE_HI, 2) as u8,
            carry: word::field(w, dr_bits::CARRY, 1) != 0,
            overflow: word::field(w, dr_bits::OVERFLOW, 1) != 0,
            characteristic_overflow: word::field(w, dr_bits::CHAR_OVERFLOW, 1) != 0,
            characteristic_underflow: word::field(w, dr_bits::CHAR_UNDERFLOW, 1) != 0,
            divide_check: word::field(w, dr_bits::DIVIDE_CHECK, 1) != 0,
            operation_trap_enabled: word::field(w, dr_bits::OP_TRAP_ENABLED, 1) != 0,
            deferrable_interrupt_enabled: word::field(w, dr_bits::DEFERRABLE_ENABLED, 1) != 0,
            exec_register_set_selection: word::field(w, dr_bits::EXEC_REG_SET, 1) != 0,
            quarter_word_mode: word::field(w, dr_bits::QUARTER_WORD, 1) != 0,
            arithmetic_exception_enabled: word::field(w, dr_bits::ARITH_EXC_ENABLED, 1) != 0,
        }
    }
}

/// Access key, short status, and mid-instruction resumption state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndicatorKeyRegister {
    pub access_key: u16,
    pub short_status: u8,
    /// Opaque resumption state for a partially-executed resumable
    /// instruction (block moves); interpreted only by the handler that set it.
    pub mid_instruction_description: u32,
}

/// The program-address register: (level, bank-descriptor-index, PC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgramAddressRegister {
    pub level: u8,
    pub bdi: u16,
    pub pc: u32,
}

/// A cached, loaded bank descriptor plus its absolute-address base.
///
/// Populated only by bank-load handlers (`LBU`, [`crate::processor::Processor::load_base_register`]);
/// address translation through a loaded base register consults this cache
/// (re-checking the access lock, limits, and permission bit against the
/// snapshot) and never re-reads the backing bank descriptor table on its
/// own — see [`crate::bank::resolve_cached`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseRegister {
    pub loaded: bool,
    pub l: u8,
    pub bdi: u16,
    pub bank_type: u8,
    pub access_lock: u32,
    pub lower_limit: u32,
    pub upper_limit: u32,
    pub general_access_permissions: u16,
    pub absolute_base: u32,
    pub upi: Upi,
}

impl BaseRegister {
    /// The unloaded (void) base register.
    #[must_use]
    pub const fn void() -> Self {
        Self {
            loaded: false,
            l: 0,
            bdi: 0,
            bank_type: 0,
            access_lock: 0,
            lower_limit: 0,
            upper_limit: 0,
            general_access_permissions: 0,
            absolute_base: 0,
            upi: Upi(0),
        }
    }

    #[must_use]
    pub const fn is_void(self) -> bool {
        !self.loaded
    }
}

impl Default for BaseRegister {
    fn default() -> Self {
        Self::void()
    }
}

const GRS_COUNT: usize = 16;
const BASE_REGISTER_COUNT: usize = 32;

/// The full architectural register file for one instruction processor.
pub struct RegisterFile {
    x: [Word36; GRS_COUNT],
    a: [Word36; GRS_COUNT],
    r: [Word36; GRS_COUNT],
    ex: [Word36; GRS_COUNT],
    ea: [Word36; GRS_COUNT],
    er: [Word36; GRS_COUNT],
    base: [BaseRegister; BASE_REGISTER_COUNT],
    pub dr: DesignatorRegister,
    pub ikr: IndicatorKeyRegister,
    pub par: ProgramAddressRegister,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self {
            x: [0; GRS_COUNT],
            a: [0; GRS_COUNT],
            r: [0; GRS_COUNT],
            ex: [0; GRS_COUNT],
            ea: [0; GRS_COUNT],
            er: [0; GRS_COUNT],
            base: [BaseRegister::void(); BASE_REGISTER_COUNT],
            dr: DesignatorRegister::default(),
            ikr: IndicatorKeyRegister::default(),
            par: ProgramAddressRegister::default(),
        }
    }
}

macro_rules! register_bank_accessors {
    ($get:ident, $set:ident, $get_partial:ident, $set_partial:ident, $user:ident, $exec:ident) => {
        #[must_use]
        pub fn $get(&self, n: usize) -> Word36 {
            if self.dr.exec_register_set_selection {
                self.$exec[n]
            } else {
                self.$user[n]
            }
        }

        pub fn $set(&mut self, n: usize, value: Word36) {
            let slot = if self.dr.exec_register_set_selection {
                &mut self.$exec[n]
            } else {
                &mut self.$user[n]
            };
            *slot = value & word::WORD_MASK;
        }

        #[must_use]
        pub fn $get_partial(&self, n: usize, field: PartialWord) -> Word36 {
            get_partial(self.$get(n), field)
        }

        pub fn $set_partial(&mut self, n: usize, field: PartialWord, value: Word36) {
            let updated = set_partial(self.$get(n), field, value);
            self.$set(n, updated);
        }
    };
}

impl RegisterFile {
    register_bank_accessors!(x, set_x, x_partial, set_x_partial, x, ex);
    register_bank_accessors!(a, set_a, a_partial, set_a_partial, a, ea);
    register_bank_accessors!(r, set_r, r_partial, set_r_partial, r, er);

    #[must_use]
    pub fn base_register(&self, n: usize) -> BaseRegister {
        self.base[n]
    }

    pub fn set_base_register(&mut self, n: usize, bd: BaseRegister) {
        self.base[n] = bd;
    }

    /// Alias matching the architecture's own verb for this operation.
    #[must_use]
    pub fn get_base_pointer(&self, n: usize) -> BaseRegister {
        self.base_register(n)
    }

    /// Alias matching the architecture's own verb for this operation.
    pub fn set_base_pointer(&mut self, n: usize, bd: BaseRegister) {
        self.set_base_register(n, bd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_word_write_preserves_sibling_field() {
        let w = set_partial(0, PartialWord::H2, 0o654321);
        let w = set_partial(w, PartialWord::H1, 0o123456);
        assert_eq!(get_partial(w, PartialWord::H1), 0o123456);
        assert_eq!(get_partial(w, PartialWord::H2), 0o654321);
    }

    #[test]
    fn lxi_style_write_leaves_xm_untouched() {
        let mut regs = RegisterFile::default();
        regs.set_x_partial(5, PartialWord::Xi, 0o123456);
        assert_eq!(regs.x_partial(5, PartialWord::Xi), 0o123456);
        assert_eq!(regs.x_partial(5, PartialWord::Xm), 0);
    }

    #[test]
    fn xm_sign_extends_on_read_but_truncates_on_write() {
        let mut regs = RegisterFile::default();
        let negative_one_18bit = 0o777776u64;
        regs.set_x_partial(3, PartialWord::Xm, negative_one_18bit);
        let read_back = regs.x_partial(3, PartialWord::Xm);
        assert_eq!(read_back, word::sign_extend_to_word(negative_one_18bit, 18));
        assert!(word::is_negative(read_back));
    }

    #[test]
    fn exec_register_set_selection_switches_banks() {
        let mut regs = RegisterFile::default();
        regs.set_a(2, 0o111);
        regs.dr.exec_register_set_selection = true;
        regs.set_a(2, 0o222);
        assert_eq!(regs.a(2), 0o222);
        regs.dr.exec_register_set_selection = false;
        assert_eq!(regs.a(2), 0o111);
    }

    #[test]
    fn base_pointer_round_trips() {
        let mut regs = RegisterFile::default();
        let bd = BaseRegister {
            loaded: true,
            l: 0,
            bdi: 12,
            bank_type: 0,
            access_lock: 0,
            lower_limit: 0,
            upper_limit: 0o7777,
            general_access_permissions: 0b111,
            absolute_base: 0o20000,
            upi: Upi(1),
        };
        regs.set_base_pointer(6, bd);
        assert_eq!(regs.get_base_pointer(6), bd);
    }

    #[test]
    fn designator_register_word_round_trips() {
        let mut dr = DesignatorRegister::default();
        dr.processor_privilege = 2;
        dr.carry = true;
        dr.operation_trap_enabled = true;
        let round_tripped = DesignatorRegister::from_word(dr.to_word());
        assert_eq!(round_tripped, dr);
    }
}
