//! Bank descriptors and virtual-to-absolute address translation.
//!
//! A bank descriptor table is not itself a first-class value the core
//! passes around: it is 8-word records living in main storage, located by
//! a per-level base the inventory manager configures at boot
//! ([`BankDescriptorTableConfig`]). Translation walks indirect and gate
//! chains by re-reading those records, which is why it takes a
//! [`StorageUnit`] rather than a cached structure — the base-register
//! cache (see [`crate::registers::BaseRegister`]) is a different, and
//! deliberately stale-tolerant, thing.

use ux2200_core::{StorageUnit, Upi};

use crate::registers::BaseRegister;
use crate::word::{self, Word36};

/// The six architectural bank types, packed into the low 3 bits of BD word 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankType {
    ExtendedMode,
    BasicMode,
    Gate,
    Indirect,
    QueueRepository,
    Queue,
}

impl BankType {
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(BankType::ExtendedMode),
            1 => Some(BankType::BasicMode),
            2 => Some(BankType::Gate),
            3 => Some(BankType::Indirect),
            4 => Some(BankType::QueueRepository),
            5 => Some(BankType::Queue),
            _ => None,
        }
    }

    const fn code(self) -> u8 {
        match self {
            BankType::ExtendedMode => 0,
            BankType::BasicMode => 1,
            BankType::Gate => 2,
            BankType::Indirect => 3,
            BankType::QueueRepository => 4,
            BankType::Queue => 5,
        }
    }
}

/// A decoded 8-word bank descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankDescriptor {
    pub bank_type_code: u8,
    pub general_access_permissions: u16,
    pub special_access_permissions: u32,
    pub access_lock: u32,
    pub lower_limit: u32,
    pub upper_limit: u32,
    pub base_address: u32,
    pub displacement: u32,
    pub general_fault: bool,
    pub target_l: u8,
    pub target_bdi: u16,
}

impl BankDescriptor {
    #[must_use]
    pub const fn bank_type(&self) -> Option<BankType> {
        BankType::from_code(self.bank_type_code)
    }
}

/// Decode the 8 raw BD words into a [`BankDescriptor`].
///
/// Layout (word:bit-range), per the architecture reference: word0 bits
/// 0-2 bank-type, 3-17 general-access-permissions, 18-35
/// special-access-permissions; word1 access-lock; word2/3 lower/upper
/// limit; word4 base-address, word5 displacement (bits 0-17) and
/// general-fault (bit 18); word6 target L, word7 target BDI.
#[must_use]
pub fn decode_bank_descriptor(words: &[Word36; 8]) -> BankDescriptor {
    BankDescriptor {
        bank_type_code: word::field(words[0], 0, 3) as u8,
        general_access_permissions: word::field(words[0], 3, 15) as u16,
        special_access_permissions: word::field(words[0], 18, 18) as u32,
        access_lock: words[1] as u32,
        lower_limit: words[2] as u32,
        upper_limit: words[3] as u32,
        base_address: words[4] as u32,
        displacement: word::field(words[5], 0, 18) as u32,
        general_fault: word::field(words[5], 18, 1) != 0,
        target_l: word::field(words[6], 0, 3) as u8,
        target_bdi: word::field(words[7], 0, 15) as u16,
    }
}

/// Encode a [`BankDescriptor`] back into its 8-word storage form, for the
/// loader populating a bank descriptor table.
#[must_use]
pub fn encode_bank_descriptor(bd: &BankDescriptor) -> [Word36; 8] {
    let word0 = word::set_field(0, 0, 3, u64::from(bd.bank_type_code));
    let word0 = word::set_field(word0, 3, 15, u64::from(bd.general_access_permissions));
    let word0 = word::set_field(word0, 18, 18, u64::from(bd.special_access_permissions));
    let word5 = word::set_field(0, 0, 18, u64::from(bd.displacement));
    let word5 = word::set_field(word5, 18, 1, u64::from(bd.general_fault));
    let word6 = word::set_field(0, 0, 3, u64::from(bd.target_l));
    let word7 = word::set_field(0, 0, 15, u64::from(bd.target_bdi));
    [
        word0,
        u64::from(bd.access_lock),
        u64::from(bd.lower_limit),
        u64::from(bd.upper_limit),
        u64::from(bd.base_address),
        word5,
        word6,
        word7,
    ]
}

/// A virtual address: level, bank-descriptor index, and intra-bank offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualAddress {
    pub l: u8,
    pub bdi: u16,
    pub offset: u32,
}

/// The purpose an address is being resolved for — governs which access
/// permission bit of the bank descriptor gates the translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessUsage {
    Read,
    Write,
    Execute,
    Jump,
    GateCall,
}

/// Why address translation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingExceptionReason {
    BdTypeInvalid,
    OutsideLimits,
    AccessViolation(AccessUsage),
    GeneralFault,
    IndirectBankError,
    IndirectDepthExceeded,
}

/// An addressing exception, carrying the (L,BDI) that faulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressingException {
    pub reason: AddressingExceptionReason,
    pub l: u8,
    pub bdi: u16,
}

/// A resolved absolute storage location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbsoluteAddress {
    pub upi: Upi,
    pub offset: u32,
}

/// Per-level bank descriptor table location, configured once by the
/// inventory manager at boot. `None` for a level with no table loaded.
#[derive(Debug, Clone, Copy, Default)]
pub struct BankDescriptorTableConfig {
    levels: [Option<(Upi, u32)>; 8],
}

impl BankDescriptorTableConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self { levels: [None; 8] }
    }

    pub fn set_level(&mut self, l: u8, upi: Upi, base_offset: u32) {
        self.levels[l as usize] = Some((upi, base_offset));
    }
}

/// Security check against a requester's (privilege, access-key) pair.
///
/// Modeled on the architecture's ring/domain lock scheme: a domain match
/// grants access outright; otherwise the requester's privilege ring must
/// be at least as tight as the bank's lock ring.
fn keys_satisfy_lock(access_lock: u32, access_key: u16, privilege: u8) -> bool {
    let lock_ring = (access_lock >> 16) & 0x3;
    let lock_domain = access_lock & 0xFFFF;
    u32::from(access_key) == lock_domain || u32::from(privilege) <= lock_ring
}

fn permission_bit_for(usage: AccessUsage, general_access_permissions: u16) -> bool {
    let bit = match usage {
        AccessUsage::Read => 0b100,
        AccessUsage::Write => 0b010,
        AccessUsage::Execute | AccessUsage::Jump | AccessUsage::GateCall => 0b001,
    };
    general_access_permissions & bit != 0
}

const MAX_INDIRECT_DEPTH: u32 = 7;
const LOWER_LIMIT_BLOCK_WORDS: u32 = 512;

/// Resolve a virtual address to an absolute (UPI, offset), following
/// indirect and gate bank chains per the architecture's translation
/// algorithm. Callers must special-case `l == 0 && bdi < 32` (a bank name,
/// not a descriptor reference) before calling this.
pub fn translate(
    storage: &dyn StorageUnit,
    bdt: &BankDescriptorTableConfig,
    access_key: u16,
    privilege: u8,
    addr: VirtualAddress,
    usage: AccessUsage,
) -> Result<(AbsoluteAddress, BankDescriptor), AddressingException> {
    translate_depth(storage, bdt, access_key, privilege, addr, usage, 0)
}

fn translate_depth(
    storage: &dyn StorageUnit,
    bdt: &BankDescriptorTableConfig,
    access_key: u16,
    privilege: u8,
    addr: VirtualAddress,
    usage: AccessUsage,
    depth: u32,
) -> Result<(AbsoluteAddress, BankDescriptor), AddressingException> {
    if depth > MAX_INDIRECT_DEPTH {
        return Err(AddressingException {
            reason: AddressingExceptionReason::IndirectDepthExceeded,
            l: addr.l,
            bdi: addr.bdi,
        });
    }

    let fault = |reason| AddressingException { reason, l: addr.l, bdi: addr.bdi };

    let (bdt_upi, bdt_base) = bdt
        .levels
        .get(addr.l as usize)
        .copied()
        .flatten()
        .ok_or_else(|| fault(AddressingExceptionReason::BdTypeInvalid))?;

    let bd_offset = bdt_base + u32::from(addr.bdi) * 8;
    let words = storage
        .read_block(bdt_upi, bd_offset, 8)
        .map_err(|_| fault(AddressingExceptionReason::IndirectBankError))?;
    let words: [Word36; 8] = words.try_into().expect("read_block(..,8) returns 8 words");
    let bd = decode_bank_descriptor(&words);

    if !keys_satisfy_lock(bd.access_lock, access_key, privilege) {
        return Err(fault(AddressingExceptionReason::AccessViolation(usage)));
    }

    match bd.bank_type() {
        Some(BankType::Indirect) => translate_depth(
            storage,
            bdt,
            access_key,
            privilege,
            VirtualAddress { l: bd.target_l, bdi: bd.target_bdi, offset: addr.offset },
            usage,
            depth + 1,
        ),
        Some(BankType::Gate) if usage != AccessUsage::GateCall => {
            Err(fault(AddressingExceptionReason::BdTypeInvalid))
        }
        Some(BankType::QueueRepository) => Err(fault(AddressingExceptionReason::BdTypeInvalid)),
        Some(_) => {
            let lower_limit_words = bd.lower_limit * LOWER_LIMIT_BLOCK_WORDS;
            if addr.offset < lower_limit_words || addr.offset > bd.upper_limit {
                return Err(fault(AddressingExceptionReason::OutsideLimits));
            }
            if !permission_bit_for(usage, bd.general_access_permissions) {
                return Err(fault(AddressingExceptionReason::AccessViolation(usage)));
            }
            if bd.general_fault {
                return Err(fault(AddressingExceptionReason::GeneralFault));
            }
            let absolute = bd.base_address + addr.offset - bd.displacement;
            Ok((AbsoluteAddress { upi: bdt_upi, offset: absolute }, bd))
        }
        None => Err(fault(AddressingExceptionReason::BdTypeInvalid)),
    }
}

/// Populate a base register by fully resolving `addr` through the bank
/// descriptor table exactly once — including any indirect/gate chain walk
/// [`translate`] performs. Every subsequent reference through the returned
/// cache goes through [`resolve_cached`] instead, which re-validates the
/// access lock, limits, and permission bit against this snapshot but never
/// re-reads bank descriptor storage.
pub fn load_base_register(
    storage: &dyn StorageUnit,
    bdt: &BankDescriptorTableConfig,
    access_key: u16,
    privilege: u8,
    addr: VirtualAddress,
    usage: AccessUsage,
) -> Result<BaseRegister, AddressingException> {
    let (absolute, bd) = translate(storage, bdt, access_key, privilege, addr, usage)?;
    Ok(BaseRegister {
        loaded: true,
        l: addr.l,
        bdi: addr.bdi,
        bank_type: bd.bank_type_code,
        access_lock: bd.access_lock,
        lower_limit: bd.lower_limit * LOWER_LIMIT_BLOCK_WORDS,
        upper_limit: bd.upper_limit,
        general_access_permissions: bd.general_access_permissions,
        absolute_base: absolute.offset.wrapping_sub(addr.offset),
        upi: absolute.upi,
    })
}

/// Resolve an offset through an already-loaded base register without
/// touching the bank descriptor table. Re-checks the access lock, the
/// limits, and the permission bit against the snapshot [`load_base_register`]
/// took; an unloaded (void) base register always faults.
pub fn resolve_cached(
    base: BaseRegister,
    offset: u32,
    access_key: u16,
    privilege: u8,
    usage: AccessUsage,
) -> Result<AbsoluteAddress, AddressingException> {
    let fault = |reason| AddressingException { reason, l: base.l, bdi: base.bdi };
    if !base.loaded {
        return Err(fault(AddressingExceptionReason::BdTypeInvalid));
    }
    if !keys_satisfy_lock(base.access_lock, access_key, privilege) {
        return Err(fault(AddressingExceptionReason::AccessViolation(usage)));
    }
    if offset < base.lower_limit || offset > base.upper_limit {
        return Err(fault(AddressingExceptionReason::OutsideLimits));
    }
    if !permission_bit_for(usage, base.general_access_permissions) {
        return Err(fault(AddressingExceptionReason::AccessViolation(usage)));
    }
    Ok(AbsoluteAddress { upi: base.upi, offset: base.absolute_base.wrapping_add(offset) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ux2200_core::FlatStorage;

    fn store_bd(storage: &mut FlatStorage, upi: Upi, offset: u32, bd: &BankDescriptor) {
        let words = encode_bank_descriptor(bd);
        storage.write_block(upi, offset, &words).unwrap();
    }

    fn extended_mode_bd(base_address: u32, upper_limit: u32) -> BankDescriptor {
        BankDescriptor {
            bank_type_code: BankType::ExtendedMode.code(),
            general_access_permissions: 0b111,
            special_access_permissions: 0,
            access_lock: 0,
            lower_limit: 0,
            upper_limit,
            base_address,
            displacement: 0,
            general_fault: false,
            target_l: 0,
            target_bdi: 0,
        }
    }

    #[test]
    fn simple_extended_mode_translation() {
        let upi = Upi(1);
        let mut storage = FlatStorage::new(upi, 4096);
        let mut bdt = BankDescriptorTableConfig::new();
        bdt.set_level(0, upi, 0);
        store_bd(&mut storage, upi, 0, &extended_mode_bd(0o10000, 0o777));

        let (abs, bd) = translate(
            &storage,
            &bdt,
            0,
            0,
            VirtualAddress { l: 0, bdi: 0, offset: 5 },
            AccessUsage::Read,
        )
        .unwrap();
        assert_eq!(abs.offset, 0o10000 + 5);
        assert_eq!(bd.bank_type(), Some(BankType::ExtendedMode));
    }

    #[test]
    fn offset_outside_limits_is_rejected() {
        let upi = Upi(1);
        let mut storage = FlatStorage::new(upi, 4096);
        let mut bdt = BankDescriptorTableConfig::new();
        bdt.set_level(0, upi, 0);
        store_bd(&mut storage, upi, 0, &extended_mode_bd(0o10000, 10));

        let err = translate(
            &storage,
            &bdt,
            0,
            0,
            VirtualAddress { l: 0, bdi: 0, offset: 100 },
            AccessUsage::Read,
        )
        .unwrap_err();
        assert_eq!(err.reason, AddressingExceptionReason::OutsideLimits);
    }

    #[test]
    fn indirect_chain_resolves_through_target() {
        let upi = Upi(1);
        let mut storage = FlatStorage::new(upi, 4096);
        let mut bdt = BankDescriptorTableConfig::new();
        bdt.set_level(0, upi, 0);
        bdt.set_level(1, upi, 64);

        let mut indirect = extended_mode_bd(0, 0);
        indirect.bank_type_code = BankType::Indirect.code();
        indirect.target_l = 1;
        indirect.target_bdi = 3;
        store_bd(&mut storage, upi, 0, &indirect);
        store_bd(&mut storage, upi, 64 + 3 * 8, &extended_mode_bd(0o5000, 0o777));

        let (abs, bd) = translate(
            &storage,
            &bdt,
            0,
            0,
            VirtualAddress { l: 0, bdi: 0, offset: 2 },
            AccessUsage::Read,
        )
        .unwrap();
        assert_eq!(abs.offset, 0o5000 + 2);
        assert_eq!(bd.bank_type(), Some(BankType::ExtendedMode));
    }

    #[test]
    fn indirect_chain_deeper_than_seven_hops_faults() {
        let upi = Upi(1);
        let mut storage = FlatStorage::new(upi, 8192);
        let mut bdt = BankDescriptorTableConfig::new();
        for l in 0..8u8 {
            bdt.set_level(l, upi, u32::from(l) * 64);
        }
        for l in 0..8u8 {
            let mut indirect = extended_mode_bd(0, 0);
            indirect.bank_type_code = BankType::Indirect.code();
            let next_l = (l + 1) % 8;
            indirect.target_l = next_l;
            indirect.target_bdi = 0;
            store_bd(&mut storage, upi, u32::from(l) * 64, &indirect);
        }

        let err = translate(
            &storage,
            &bdt,
            0,
            0,
            VirtualAddress { l: 0, bdi: 0, offset: 0 },
            AccessUsage::Read,
        )
        .unwrap_err();
        assert_eq!(err.reason, AddressingExceptionReason::IndirectDepthExceeded);
    }

    #[test]
    fn gate_bank_rejected_outside_gate_call() {
        let upi = Upi(1);
        let mut storage = FlatStorage::new(upi, 4096);
        let mut bdt = BankDescriptorTableConfig::new();
        bdt.set_level(0, upi, 0);
        let mut gate = extended_mode_bd(0, 0);
        gate.bank_type_code = BankType::Gate.code();
        store_bd(&mut storage, upi, 0, &gate);

        let err = translate(
            &storage,
            &bdt,
            0,
            0,
            VirtualAddress { l: 0, bdi: 0, offset: 0 },
            AccessUsage::Read,
        )
        .unwrap_err();
        assert_eq!(err.reason, AddressingExceptionReason::BdTypeInvalid);
    }

    #[test]
    fn load_base_register_caches_fields_resolve_cached_then_needs() {
        let upi = Upi(1);
        let mut storage = FlatStorage::new(upi, 4096);
        let mut bdt = BankDescriptorTableConfig::new();
        bdt.set_level(0, upi, 0);
        store_bd(&mut storage, upi, 0, &extended_mode_bd(0o10000, 0o777));

        let base = load_base_register(&storage, &bdt, 0, 0, VirtualAddress { l: 0, bdi: 0, offset: 0 }, AccessUsage::Read).unwrap();
        assert!(base.loaded);

        let addr = resolve_cached(base, 5, 0, 0, AccessUsage::Read).unwrap();
        assert_eq!(addr.offset, 0o10000 + 5);
    }

    #[test]
    fn resolve_cached_rejects_offset_outside_cached_limits() {
        let upi = Upi(1);
        let mut storage = FlatStorage::new(upi, 4096);
        let mut bdt = BankDescriptorTableConfig::new();
        bdt.set_level(0, upi, 0);
        store_bd(&mut storage, upi, 0, &extended_mode_bd(0o10000, 10));

        let base = load_base_register(&storage, &bdt, 0, 0, VirtualAddress { l: 0, bdi: 0, offset: 0 }, AccessUsage::Read).unwrap();
        let err = resolve_cached(base, 100, 0, 0, AccessUsage::Read).unwrap_err();
        assert_eq!(err.reason, AddressingExceptionReason::OutsideLimits);
    }

    #[test]
    fn resolve_cached_never_touches_storage() {
        // A base register loaded from a bank whose descriptor has since
        // been overwritten in storage still resolves from the cached
        // snapshot, not the now-corrupted descriptor.
        let upi = Upi(1);
        let mut storage = FlatStorage::new(upi, 4096);
        let mut bdt = BankDescriptorTableConfig::new();
        bdt.set_level(0, upi, 0);
        store_bd(&mut storage, upi, 0, &extended_mode_bd(0o10000, 0o777));
        let base = load_base_register(&storage, &bdt, 0, 0, VirtualAddress { l: 0, bdi: 0, offset: 0 }, AccessUsage::Read).unwrap();

        store_bd(&mut storage, upi, 0, &extended_mode_bd(0, 0));

        let addr = resolve_cached(base, 5, 0, 0, AccessUsage::Read).unwrap();
        assert_eq!(addr.offset, 0o10000 + 5);
    }
}
