//! The instruction processor: owns the register file, the bank descriptor
//! table configuration, the pending-interrupt queue, and the run loop that
//! ties components A-G together.

use ux2200_core::{ConsoleError, Observable, OperatorConsole, StopDetail, StopReason, StorageUnit, Upi, Value};

use crate::bank::{self, AccessUsage, BankDescriptorTableConfig, VirtualAddress};
use crate::dayclock::DayClock;
use crate::dispatch::{self, Advance};
use crate::error::{MachineCheck, StepOutcome};
use crate::interrupt::{self, Interrupt, InterruptState, InterruptVectorTable};
use crate::operand::RcsState;
use crate::registers::RegisterFile;

/// Base register reserved for the return-control stack. Real hardware
/// dedicates a fixed base to the RCS; instructions other than call/return
/// never name it directly, so there is no architectural conflict in
/// fixing the slot here rather than making it configurable.
pub const RCS_BASE_REGISTER: usize = 25;

/// Fixed, boot-time configuration for a processor — the handful of
/// settings an inventory manager supplies when it creates one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessorConfig {
    /// Processor privilege the register file starts at after `clear`.
    pub initial_privilege: u8,
}

/// One instruction processor: fetch/decode/execute loop plus the full
/// architectural register and interrupt state.
pub struct Processor<S: StorageUnit> {
    pub(crate) upi: Upi,
    pub(crate) regs: RegisterFile,
    pub(crate) bdt: BankDescriptorTableConfig,
    pub(crate) vectors: InterruptVectorTable,
    pub(crate) interrupts: InterruptState,
    pub(crate) rcs: RcsState,
    pub(crate) dayclock: DayClock,
    pub(crate) storage: S,
    config: ProcessorConfig,
    running: bool,
    stop_reason: StopReason,
    stop_detail: StopDetail,
}

impl<S: StorageUnit> Processor<S> {
    /// Create a processor identified by `upi`, backed by `storage`, sharing
    /// `dayclock` with any sibling processors in the same complex.
    pub fn new(upi: Upi, storage: S, dayclock: DayClock, config: ProcessorConfig) -> Self {
        let mut regs = RegisterFile::default();
        regs.dr.processor_privilege = config.initial_privilege;
        Self {
            upi,
            regs,
            bdt: BankDescriptorTableConfig::new(),
            vectors: InterruptVectorTable::new(),
            interrupts: InterruptState::new(),
            rcs: RcsState::default(),
            dayclock,
            storage,
            config,
            running: false,
            stop_reason: StopReason::Running,
            stop_detail: StopDetail::default(),
        }
    }

    #[must_use]
    pub fn upi(&self) -> Upi {
        self.upi
    }

    #[must_use]
    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut RegisterFile {
        &mut self.regs
    }

    /// Direct storage access, for loaders and test harnesses that need to
    /// place code/data or a bank descriptor table before the processor's
    /// first `step`.
    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Populate one level of the bank descriptor table. Forwarded from
    /// the loader's `load_bank_descriptor` interface.
    pub fn load_bank_descriptor_table_base(&mut self, l: u8, upi: Upi, base_offset: u32) {
        self.bdt.set_level(l, upi, base_offset);
    }

    /// Populate base register `n` from the bank named by `addr`, walking
    /// any indirect/gate chain exactly once. The cache [`RegisterFile`]
    /// keeps is the only thing subsequent operand and RCS references
    /// consult — this is the only place that writes it outside tests.
    /// Used both by the `LBU` handler and by loaders that set up a
    /// processor's base registers before its first `step`.
    pub fn load_base_register(&mut self, n: usize, addr: VirtualAddress, usage: AccessUsage) -> Result<(), Interrupt> {
        let access_key = self.access_key();
        let privilege = self.privilege();
        let base = bank::load_base_register(&self.storage, &self.bdt, access_key, privilege, addr, usage)
            .map_err(Interrupt::addressing)?;
        self.regs.set_base_register(n, base);
        Ok(())
    }

    pub fn set_interrupt_vector(&mut self, reason: interrupt::InterruptReason, vector: interrupt::InterruptVector) {
        self.vectors.set_vector(reason, vector);
    }

    /// Queue an interrupt for delivery at the next eligible run-loop
    /// boundary. Used by external signalling (UPI messages, I/O
    /// completion) rather than by instruction handlers, which return
    /// `Err(Interrupt)` instead.
    pub fn raise_interrupt(&mut self, interrupt: Interrupt) {
        self.interrupts.raise(interrupt);
    }

    pub(crate) fn privilege(&self) -> u8 {
        self.regs.dr.processor_privilege
    }

    pub(crate) fn access_key(&self) -> u16 {
        self.regs.ikr.access_key
    }

    /// The base register operand addressing uses for this instruction.
    ///
    /// Basic mode selects among B12-B15 via the instruction's `b` field;
    /// extended mode always operands off B0. Real ISA tables vary the
    /// extended-mode base per opcode; this core uses one fixed operand
    /// base, matching the illustrative scope of the instruction families
    /// it implements.
    pub(crate) fn active_base(&self, instr: &crate::operand::DecodedInstruction) -> crate::registers::BaseRegister {
        if self.regs.dr.basic_mode_enabled {
            self.regs.base_register(12 + instr.basic_mode_b as usize)
        } else {
            self.regs.base_register(0)
        }
    }

    /// Execute one fetch/decode/execute cycle: deliver the highest
    /// priority eligible pending interrupt if there is one, otherwise
    /// fetch and run the instruction at PAR.
    ///
    /// A [`MachineCheck`] escaping the cycle stops the processor first, so
    /// `get_stop_reason` always reflects it — the error is never left to
    /// propagate out from underneath a still-`Running` processor.
    pub fn step(&mut self) -> StepOutcome {
        let result = self.step_inner();
        if let Err(check) = result {
            self.stop(StopReason::MachineCheck, StopDetail(machine_check_detail(check)));
        }
        result
    }

    fn step_inner(&mut self) -> StepOutcome {
        if !self.running {
            return Ok(());
        }
        if let Some(interrupt) = self.interrupts.take_eligible(self.regs.dr.deferrable_interrupt_enabled) {
            return self.deliver(interrupt);
        }

        let fetch_addr = VirtualAddress { l: self.regs.par.level, bdi: self.regs.par.bdi, offset: self.regs.par.pc };
        let fetch = bank::translate(&self.storage, &self.bdt, self.access_key(), self.privilege(), fetch_addr, AccessUsage::Execute);
        let (absolute, _) = match fetch {
            Ok(resolved) => resolved,
            Err(exception) => {
                self.interrupts.raise(Interrupt::addressing(exception));
                return Ok(());
            }
        };
        let raw = self.storage.read_absolute(absolute.upi, absolute.offset).map_err(MachineCheck::from)?;
        let instr = crate::operand::decode(raw, self.regs.dr.basic_mode_enabled);

        tracing::trace!(upi = self.upi.0, pc = self.regs.par.pc, f = instr.f, j = instr.j, a = instr.a, "fetch");

        match dispatch::execute(self, raw, &instr) {
            Ok(Advance::Normal) => self.regs.par.pc = self.regs.par.pc.wrapping_add(1),
            Ok(Advance::Skip) => self.regs.par.pc = self.regs.par.pc.wrapping_add(2),
            Ok(Advance::Jumped) => {}
            Err(raised) => self.interrupts.raise(raised),
        }
        Ok(())
    }

    fn deliver(&mut self, interrupt: Interrupt) -> StepOutcome {
        if self.vectors.vector_for(interrupt.reason).is_none() {
            return Err(MachineCheck::UnconfiguredVector);
        }
        let mut par = self.regs.par;
        let mut dr = self.regs.dr;
        let ikr = self.regs.ikr;
        interrupt::deliver(&mut self.interrupts, &self.vectors, interrupt, &mut par, &mut dr, &ikr);
        self.regs.par = par;
        self.regs.dr = dr;
        Ok(())
    }

    /// Run until stopped, delivering interrupts and executing instructions.
    /// Checks the stop flag between instructions, per the cooperative
    /// cancellation model: the in-flight instruction always completes.
    pub fn run(&mut self) -> StepOutcome {
        while self.running {
            self.step()?;
        }
        Ok(())
    }
}

impl<S: StorageUnit> OperatorConsole for Processor<S> {
    fn start(&mut self) -> Result<(), ConsoleError> {
        if self.running {
            return Err(ConsoleError::AlreadyRunning);
        }
        self.running = true;
        self.stop_reason = StopReason::Running;
        Ok(())
    }

    fn stop(&mut self, reason: StopReason, detail: StopDetail) {
        self.running = false;
        self.stop_reason = reason;
        self.stop_detail = detail;
    }

    fn clear(&mut self) {
        self.running = false;
        self.regs = RegisterFile::default();
        self.regs.dr.processor_privilege = self.config.initial_privilege;
        self.interrupts = InterruptState::new();
        self.rcs = RcsState::default();
        self.stop_reason = StopReason::Running;
        self.stop_detail = StopDetail::default();
    }

    fn get_stop_reason(&self) -> StopReason {
        self.stop_reason
    }

    fn get_stop_detail(&self) -> StopDetail {
        self.stop_detail
    }

    fn read_register(&self, path: &str) -> Result<u64, ConsoleError> {
        match self.query(path) {
            Some(Value::Word(w)) => Ok(w),
            Some(Value::Bool(b)) => Ok(u64::from(b)),
            Some(Value::Signed(s)) => Ok(s as u64),
            Some(Value::String(_)) | None => Err(ConsoleError::NoSuchRegister("unknown register path")),
        }
    }

    fn write_register(&mut self, path: &str, value: u64) -> Result<(), ConsoleError> {
        let mut parts = path.split('.');
        match (parts.next(), parts.next()) {
            (Some("x"), Some(n)) => set_indexed(&mut self.regs, n, value, RegisterFile::set_x),
            (Some("a"), Some(n)) => set_indexed(&mut self.regs, n, value, RegisterFile::set_a),
            (Some("r"), Some(n)) => set_indexed(&mut self.regs, n, value, RegisterFile::set_r),
            (Some("par"), Some("pc")) => {
                self.regs.par.pc = value as u32;
                Ok(())
            }
            _ => Err(ConsoleError::NoSuchRegister("unknown register path")),
        }
    }
}

/// A short numeric code for a [`MachineCheck`], carried as the
/// [`StopDetail`] so a console operator has something to key into
/// diagnostics by without needing the full error value.
fn machine_check_detail(check: MachineCheck) -> u32 {
    match check {
        MachineCheck::Storage(_) => 1,
        MachineCheck::DispatchTableGap { f, j, a } => {
            0x100_0000 | (u32::from(f) << 16) | (u32::from(j) << 8) | u32::from(a)
        }
        MachineCheck::UnconfiguredLevel(l) => 0x200_0000 | u32::from(l),
        MachineCheck::UnconfiguredVector => 3,
    }
}

/// Parse a GRS index out of a dotted-path segment, bounds-checked the same
/// way `set_indexed` guards the write path: an out-of-range index must
/// fail the query, not index the underlying array.
fn parse_register_index(n: &str) -> Option<usize> {
    let index: usize = n.parse().ok()?;
    (index < 16).then_some(index)
}

fn set_indexed(
    regs: &mut RegisterFile,
    n: &str,
    value: u64,
    setter: impl Fn(&mut RegisterFile, usize, u64),
) -> Result<(), ConsoleError> {
    let index: usize = n.parse().map_err(|_| ConsoleError::NoSuchRegister("bad register index"))?;
    if index >= 16 {
        return Err(ConsoleError::NoSuchRegister("register index out of range"));
    }
    setter(regs, index, value);
    Ok(())
}

impl<S: StorageUnit> Observable for Processor<S> {
    fn query(&self, path: &str) -> Option<Value> {
        let mut parts = path.split('.');
        match (parts.next(), parts.next()) {
            (Some("x"), Some(n)) => Some(Value::Word(self.regs.x(parse_register_index(n)?))),
            (Some("a"), Some(n)) => Some(Value::Word(self.regs.a(parse_register_index(n)?))),
            (Some("r"), Some(n)) => Some(Value::Word(self.regs.r(parse_register_index(n)?))),
            (Some("dr"), Some("carry")) => Some(Value::Bool(self.regs.dr.carry)),
            (Some("dr"), Some("overflow")) => Some(Value::Bool(self.regs.dr.overflow)),
            (Some("dr"), Some("processor_privilege")) => Some(Value::Word(u64::from(self.regs.dr.processor_privilege))),
            (Some("dr"), Some("deferrable_interrupt_enabled")) => {
                Some(Value::Bool(self.regs.dr.deferrable_interrupt_enabled))
            }
            (Some("par"), Some("pc")) => Some(Value::Word(u64::from(self.regs.par.pc))),
            (Some("par"), Some("l")) => Some(Value::Word(u64::from(self.regs.par.level))),
            (Some("par"), Some("bdi")) => Some(Value::Word(u64::from(self.regs.par.bdi))),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "x.N", "a.N", "r.N", "dr.carry", "dr.overflow", "dr.processor_privilege",
            "dr.deferrable_interrupt_enabled", "par.pc", "par.l", "par.bdi",
        ]
    }
}
