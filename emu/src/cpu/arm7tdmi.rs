//! # ARM7TDMI Decode-Execute Engine
//!
//! Ties the register file, the pipeline, the exception controller, the
//! coprocessor table and the event scheduler together around a memory
//! interface.
//!
//! ```text
//!            ┌──────────────┐  sample   ┌────────────────────┐
//!  step ───► │  boundary    │ ────────► │ ExceptionController│
//!            └──────┬───────┘           └────────────────────┘
//!                   │ fetch pc+2s
//!            ┌──────▼───────┐
//!            │   Pipeline   │ decoded ──► ARM / Thumb execute ──► Flow
//!            └──────────────┘
//!                   │ retire (cost of the step)
//!            ┌──────▼───────┐
//!            │  Scheduler   │ fires due events, may raise lines or stop
//!            └──────────────┘
//! ```
//!
//! `registers[15]` always holds the address of the executing instruction.
//! Instructions that read r15 see it two instructions ahead, as the real
//! pipeline does.

use serde::{Deserialize, Serialize};

use crate::bus::{AccessWidth, CycleKind, MemoryInterface};
use crate::config::{EmulatorConfig, ProcessorProperties};
use crate::cpu::arm::instructions::ArmModeInstruction;
use crate::cpu::condition::Condition;
use crate::cpu::coprocessor::{Coprocessor, CoprocessorTable};
use crate::cpu::cpu_modes::{Bank, Mode};
use crate::cpu::exception::{AbortKind, ExceptionController, ExceptionKind};
use crate::cpu::host::{DebugAction, DebugHook, HostOs};
use crate::cpu::pipeline::{Pipeline, Prefetched};
use crate::cpu::psr::{CpuState, MODE_MASK, Psr};
use crate::cpu::register_bank::RegisterBank;
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER, Registers};
use crate::cpu::scheduler::{EventContext, EventId, Scheduler};
use crate::cpu::thumb::instruction::Instruction;
use crate::error::{CpuError, InitError};

/// Only the low 40 bits of the accumulator exist.
const ACCUMULATOR_MASK: u64 = (1 << 40) - 1;

/// Cycles spent so far, split by bus cycle type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCounters {
    pub sequential: u64,
    pub non_sequential: u64,
    pub internal: u64,
    pub coprocessor: u64,
    /// Instruction fetches, a subset of the S and N cycles.
    pub fetch: u64,
    /// Retired instructions, including those whose condition failed.
    pub instructions: u64,
}

impl CycleCounters {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.sequential + self.non_sequential + self.internal + self.coprocessor
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
}

/// Why a run handed control back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// A scheduled event or the host asked for it.
    Requested,
    /// `run_for` executed its whole budget.
    BudgetExhausted,
    /// The debug hook stopped before an instruction.
    Breakpoint,
    /// The exception's vector-catch bit is set.
    VectorCatch(ExceptionKind),
}

/// What an executed instruction did to the flow of control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Continue with the next sequential instruction.
    Next,
    /// PC was written; the pipeline refills from it.
    Jump,
    Trap(ExceptionKind),
}

impl Flow {
    /// Effect of two register writes in a row: a jump by either is kept.
    pub(crate) fn and(self, other: Self) -> Self {
        if self == Self::Next { other } else { self }
    }
}

enum Entry {
    Taken,
    /// The host dealt with it.
    Handled,
    Caught,
}

pub struct Arm7tdmi<'h, M: MemoryInterface> {
    pub bus: M,

    pub(crate) cpsr: Psr,
    pub(crate) registers: Registers,
    pub(crate) register_bank: RegisterBank,

    pub(crate) pipeline: Pipeline,
    pub(crate) counters: CycleCounters,
    pub(crate) exceptions: ExceptionController,
    pub(crate) scheduler: Scheduler,
    pub(crate) coprocessors: CoprocessorTable<'h>,
    pub(crate) host: Option<&'h mut dyn HostOs>,
    debug: Option<&'h mut dyn DebugHook>,
    pub(crate) properties: ProcessorProperties,

    accumulator: u64,
    run_state: RunState,
    stop_reason: Option<StopReason>,
    stop_requested: bool,

    /// A breakpoint is not reported twice in a row for the same address.
    resume_at: Option<u32>,

    /// Address continuing the data stream of the current instruction.
    data_next: Option<u32>,

    /// Cycles charged by the step in progress.
    step_cost: u64,

    /// Why the last synchronous exception was raised.
    pub(crate) last_exception: Option<CpuError>,
}

impl<M: MemoryInterface> std::fmt::Debug for Arm7tdmi<'_, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arm7tdmi")
            .field("cpsr", &self.cpsr)
            .field("registers", &self.registers)
            .field("counters", &self.counters)
            .field("run_state", &self.run_state)
            .finish_non_exhaustive()
    }
}

impl<'h, M: MemoryInterface> Arm7tdmi<'h, M> {
    /// A processor in its reset state: Supervisor mode, ARM state, IRQ and
    /// FIQ masked, PC at the reset vector.
    pub fn new(bus: M, config: &EmulatorConfig) -> Self {
        let mut cpu = Self {
            bus,
            cpsr: Psr::from(Mode::Supervisor),
            registers: Registers::default(),
            register_bank: RegisterBank::default(),
            pipeline: Pipeline::default(),
            counters: CycleCounters::default(),
            exceptions: ExceptionController::new(config.vector_catch),
            scheduler: Scheduler::default(),
            coprocessors: CoprocessorTable::default(),
            host: None,
            debug: None,
            properties: config.properties,
            accumulator: 0,
            run_state: RunState::Stopped,
            stop_reason: None,
            stop_requested: false,
            resume_at: None,
            data_next: None,
            step_cost: 0,
            last_exception: None,
        };
        cpu.reset();
        cpu
    }

    /// Puts every piece of architectural state back to its reset value and
    /// drops pending events. Bound coprocessors and hooks stay attached.
    pub fn reset(&mut self) {
        let vector_catch = self.exceptions.vector_catch();
        self.exceptions = ExceptionController::new(vector_catch);
        self.exceptions.mark_reseted();

        let mut cpsr = Psr::from(Mode::Supervisor);
        cpsr.set_irq_disable(true);
        cpsr.set_fiq_disable(true);
        self.cpsr = cpsr;

        self.registers = Registers::default();
        self.register_bank = RegisterBank::default();
        self.pipeline.flush();
        self.counters = CycleCounters::default();
        self.scheduler.clear();
        self.bus.clear_abort();

        self.accumulator = 0;
        self.run_state = RunState::Stopped;
        self.stop_reason = None;
        self.stop_requested = false;
        self.resume_at = None;
        self.data_next = None;
        self.step_cost = 0;
        self.last_exception = None;

        tracing::debug!("processor reset");
    }

    /// Runs until something asks to stop.
    pub fn run(&mut self) -> StopReason {
        self.run_state = RunState::Running;
        loop {
            if let Some(reason) = self.step() {
                return reason;
            }
        }
    }

    /// Runs at most `budget` instructions.
    pub fn run_for(&mut self, budget: u64) -> StopReason {
        self.run_state = RunState::Running;
        for _ in 0..budget {
            if let Some(reason) = self.step() {
                return reason;
            }
        }
        self.halt(StopReason::BudgetExhausted)
    }

    /// Executes one instruction, or enters one asynchronous exception.
    ///
    /// Returns why the processor stopped, if it did.
    pub fn step(&mut self) -> Option<StopReason> {
        if std::mem::take(&mut self.stop_requested) {
            return Some(self.halt(StopReason::Requested));
        }

        self.step_cost = 0;

        let irq_disabled = self.cpsr.irq_disable();
        let fiq_disabled = self.cpsr.fiq_disable();
        if let Some(kind) = self.exceptions.sample(irq_disabled, fiq_disabled) {
            let pc = self.registers.program_counter();
            match self.enter_exception(kind, pc) {
                Entry::Taken => {
                    self.refill();
                    return self.end_step();
                }
                Entry::Caught => return Some(self.halt(StopReason::VectorCatch(kind))),
                Entry::Handled => {}
            }
        }

        if !self.pipeline.is_primed() {
            self.refill();
        }

        let size = self.instruction_size();
        let pc = self.registers.program_counter();

        if let Some(reason) = self.consult_debugger(pc) {
            return Some(reason);
        }

        let prefetch = self
            .pipeline
            .prefetch_address(size)
            .unwrap_or_else(|| pc.wrapping_add(2 * size));
        let incoming = self.fetch(prefetch);
        let Some(slot) = self.pipeline.advance(incoming) else {
            return self.end_step();
        };

        self.data_next = None;
        let flow = if slot.aborted {
            self.exceptions.abort(slot.address, AbortKind::Prefetch);
            Flow::Trap(ExceptionKind::PrefetchAbort)
        } else {
            match self.cpsr.cpu_state() {
                CpuState::Arm => self.execute_arm_word(slot),
                CpuState::Thumb => self.execute_thumb_half_word(slot),
            }
        };

        let flow = if self.exceptions.aborted() == Some(AbortKind::Data) {
            Flow::Trap(ExceptionKind::DataAbort)
        } else {
            flow
        };

        match flow {
            Flow::Next => self.registers.advance_program_counter(size),
            Flow::Jump => self.refill(),
            Flow::Trap(kind) => match self.enter_exception(kind, pc) {
                Entry::Taken => self.refill(),
                Entry::Handled => self.registers.advance_program_counter(size),
                Entry::Caught => return Some(self.halt(StopReason::VectorCatch(kind))),
            },
        }

        self.counters.instructions += 1;
        self.end_step()
    }

    fn execute_arm_word(&mut self, slot: Prefetched) -> Flow {
        let instruction = ArmModeInstruction::from(slot.raw);
        if !self.cpsr.can_execute(instruction.condition()) {
            return Flow::Next;
        }

        tracing::trace!("{:08X}: {instruction}", slot.address);
        self.execute_arm(instruction, slot.raw)
    }

    fn execute_thumb_half_word(&mut self, slot: Prefetched) -> Flow {
        let raw = slot.raw as u16;
        let instruction = Instruction::from(raw);

        tracing::trace!("{:08X}: {instruction}", slot.address);
        self.execute_thumb(instruction, raw)
    }

    fn end_step(&mut self) -> Option<StopReason> {
        if self
            .scheduler
            .advance(self.step_cost, &mut self.exceptions.lines)
        {
            return Some(self.halt(StopReason::Requested));
        }
        None
    }

    fn halt(&mut self, reason: StopReason) -> StopReason {
        tracing::debug!("stopped at 0x{:08X}: {reason:?}", self.registers.program_counter());
        self.run_state = RunState::Stopped;
        self.stop_reason = Some(reason);
        reason
    }

    fn consult_debugger(&mut self, pc: u32) -> Option<StopReason> {
        if !self.properties.debug || self.resume_at.take() == Some(pc) {
            return None;
        }

        let slot = self.pipeline.decoded()?;
        let executes = match self.cpsr.cpu_state() {
            CpuState::Arm => self.cpsr.can_execute(Condition::from((slot.raw >> 28) as u8)),
            CpuState::Thumb => true,
        };
        if !executes && !self.properties.nexec {
            return None;
        }

        let hook = self.debug.as_deref_mut()?;
        match hook.on_instruction(pc, slot.raw) {
            DebugAction::Continue => None,
            DebugAction::Stop => {
                self.resume_at = Some(pc);
                Some(self.halt(StopReason::Breakpoint))
            }
        }
    }

    fn enter_exception(&mut self, kind: ExceptionKind, pc: u32) -> Entry {
        let abort = match kind {
            ExceptionKind::PrefetchAbort => Some(AbortKind::Prefetch),
            ExceptionKind::DataAbort => Some(AbortKind::Data),
            _ => None,
        };
        if let Some(abort) = abort {
            self.last_exception = Some(CpuError::MemoryAbort {
                kind: abort,
                address: self.exceptions.abort_address().unwrap_or(pc),
            });
            self.bus.clear_abort();
            self.exceptions.clear_abort();
        }

        if self.exceptions.catches(kind) {
            tracing::debug!("vector catch: {kind} at 0x{pc:08X}");
            self.pipeline.flush();
            return Entry::Caught;
        }

        if self
            .host
            .as_deref_mut()
            .is_some_and(|host| host.exception(kind, pc))
        {
            tracing::debug!("{kind} at 0x{pc:08X} handled by the host");
            return Entry::Handled;
        }

        let old = self.cpsr;
        let mode = kind.mode();

        let mut new = old;
        new.set_mode(mode);
        new.set_state_bit(false);
        new.set_irq_disable(true);
        if kind.disables_fiq() {
            new.set_fiq_disable(true);
        }
        self.write_cpsr(new);

        if let Some(return_address) = kind.return_address(pc, old.cpu_state()) {
            self.registers.set_register_at(REG_LR, return_address);
        }
        self.register_bank.set_spsr(mode.bank(), old);
        self.registers.set_program_counter(kind.vector());
        self.pipeline.flush();

        if kind == ExceptionKind::Reset {
            self.exceptions.mark_reseted();
        }

        tracing::debug!("{kind} taken at 0x{pc:08X}, {old} -> {}", self.cpsr);
        Entry::Taken
    }

    /// Empties both slots and fetches the instruction at PC and the one
    /// after it.
    fn refill(&mut self) {
        self.pipeline.flush();
        let size = self.instruction_size();
        let pc = self.registers.program_counter();

        let decoded = self.fetch(pc);
        let loaded = self.fetch(pc.wrapping_add(size));
        self.pipeline.prime(decoded, loaded);
    }

    fn fetch(&mut self, address: u32) -> Prefetched {
        let size = self.instruction_size();
        let width = match self.cpsr.cpu_state() {
            CpuState::Arm => AccessWidth::Word,
            CpuState::Thumb => AccessWidth::HalfWord,
        };

        let cycle = self.pipeline.fetch_cycle(address);
        let raw = self.bus.load_instruction(address, width, cycle);
        self.charge(cycle, address, width);
        self.counters.fetch += 1;

        let aborted = self.bus.abort_signal().is_some();
        if aborted {
            self.bus.clear_abort();
        }

        self.pipeline.fetched(address, raw, size, aborted)
    }

    fn charge(&mut self, cycle: CycleKind, address: u32, width: AccessWidth) {
        match cycle {
            CycleKind::Sequential => self.counters.sequential += 1,
            CycleKind::NonSequential => self.counters.non_sequential += 1,
            CycleKind::Internal => self.counters.internal += 1,
            CycleKind::Coprocessor => self.counters.coprocessor += 1,
        }
        let wait = self.bus.wait_states(address, width, cycle);
        self.step_cost += 1 + u64::from(wait);
    }

    pub(crate) fn idle(&mut self, count: u32) {
        if count == 0 {
            return;
        }
        self.bus.internal_cycles(count);
        self.counters.internal += u64::from(count);
        self.step_cost += u64::from(count);
    }

    pub(crate) fn coprocessor_wait(&mut self, count: u32) {
        self.bus.coprocessor_cycles(count);
        self.counters.coprocessor += u64::from(count);
        self.step_cost += u64::from(count);
    }

    /// Bus cycle of a data access: sequential when it continues the
    /// previous access of the same instruction.
    fn data_cycle(&mut self, address: u32, width: AccessWidth) -> CycleKind {
        let cycle = if self.data_next == Some(address) {
            CycleKind::Sequential
        } else {
            CycleKind::NonSequential
        };
        self.data_next = Some(address.wrapping_add(width.size()));
        self.charge(cycle, address, width);
        cycle
    }

    fn latch_data_abort(&mut self) {
        if let Some(address) = self.bus.abort_signal() {
            self.exceptions.abort(address, AbortKind::Data);
        }
    }

    /// Raw aligned load. Rotation of misaligned words is up to the caller.
    pub(crate) fn load(&mut self, address: u32, width: AccessWidth) -> u32 {
        let cycle = self.data_cycle(address, width);
        let value = match width {
            AccessWidth::Word => self.bus.load_word(address & !3, cycle),
            AccessWidth::HalfWord => u32::from(self.bus.load_half_word(address & !1, cycle)),
            AccessWidth::Byte => u32::from(self.bus.load_byte(address, cycle)),
        };
        self.latch_data_abort();
        value
    }

    pub(crate) fn store(&mut self, address: u32, width: AccessWidth, value: u32) {
        let cycle = self.data_cycle(address, width);
        match width {
            AccessWidth::Word => self.bus.store_word(address & !3, value, cycle),
            AccessWidth::HalfWord => self.bus.store_half_word(address & !1, value as u16, cycle),
            AccessWidth::Byte => self.bus.store_byte(address, value as u8, cycle),
        }
        self.latch_data_abort();
    }

    /// SWP: locked read then write, 2N + 1I.
    pub(crate) fn swap(&mut self, address: u32, width: AccessWidth, value: u32) -> u32 {
        self.charge(CycleKind::NonSequential, address, width);
        self.charge(CycleKind::NonSequential, address, width);
        let old = match width {
            AccessWidth::Byte => u32::from(self.bus.swap_byte(address, value as u8)),
            _ => self.bus.swap_word(address & !3, value),
        };
        self.latch_data_abort();
        self.idle(1);
        old
    }

    /// A data access of the current instruction aborted.
    pub(crate) fn data_aborted(&self) -> bool {
        self.exceptions.aborted() == Some(AbortKind::Data)
    }

    pub(crate) fn instruction_size(&self) -> u32 {
        self.cpsr.cpu_state().instruction_size()
    }

    /// Register as an operand: r15 reads two instructions ahead.
    pub(crate) fn operand(&self, register: u32) -> u32 {
        if register as usize == REG_PROGRAM_COUNTER {
            self.r15()
        } else {
            self.registers.register_at(register as usize)
        }
    }

    pub(crate) fn set_register(&mut self, register: u32, value: u32) -> Flow {
        if register as usize == REG_PROGRAM_COUNTER {
            self.jump(value)
        } else {
            self.registers.set_register_at(register as usize, value);
            Flow::Next
        }
    }

    /// Writes PC, aligned for the current state.
    pub(crate) fn jump(&mut self, address: u32) -> Flow {
        let aligned = address & !(self.instruction_size() - 1);
        self.registers.set_program_counter(aligned);
        Flow::Jump
    }

    /// Routes an encoding the core does not implement, giving the host a
    /// chance to emulate it first.
    pub(crate) fn undefined(&mut self, raw: u32) -> Flow {
        if self
            .host
            .as_deref_mut()
            .is_some_and(|host| host.undefined_instruction(raw))
        {
            return Flow::Next;
        }

        tracing::debug!("undefined instruction 0x{raw:08X}");
        self.last_exception = Some(CpuError::UndefinedInstruction(raw));
        Flow::Trap(ExceptionKind::Undefined)
    }

    /// SWI: the host may service the call, otherwise the vector is taken.
    pub(crate) fn software_interrupt(&mut self, number: u32) -> Flow {
        if let Some(host) = self.host.as_deref_mut() {
            if host.handle_swi(number, &mut self.registers, &mut self.bus) {
                return Flow::Next;
            }
        }
        self.last_exception = Some(CpuError::SoftwareInterrupt(number));
        Flow::Trap(ExceptionKind::SoftwareInterrupt)
    }

    fn bank_of(psr: Psr) -> Bank {
        psr.mode().map_or(Bank::User, Mode::bank)
    }

    pub(crate) fn active_bank(&self) -> Bank {
        Self::bank_of(self.cpsr)
    }

    /// Writes the CPSR, swapping banks when the mode changes. Mode bits
    /// that do not name a supported mode keep the current mode.
    pub(crate) fn write_cpsr(&mut self, value: Psr) {
        let old = self.cpsr;
        let supported = value
            .mode()
            .is_ok_and(|mode| self.properties.v4 || mode != Mode::System);

        let mut value = if supported {
            value
        } else {
            tracing::warn!("ignoring mode bits 0b{:05b} in a CPSR write", value.mode_bits());
            value.masked_write(old.into(), MODE_MASK)
        };
        if !self.properties.v4 {
            value.set_state_bit(false);
        }

        self.register_bank
            .switch(Self::bank_of(old), Self::bank_of(value), &mut self.registers);
        self.cpsr = value;

        if old.mode_bits() != value.mode_bits() || old.state_bit() != value.state_bit() {
            tracing::debug!("CPSR {old} -> {value}");
            self.pipeline.flush();
        }
    }

    /// CPSR = SPSR of the current mode. Ignored in modes without one.
    pub(crate) fn restore_cpsr(&mut self) {
        match self.register_bank.spsr(self.active_bank()) {
            Some(spsr) => self.write_cpsr(spsr),
            None => tracing::warn!("SPSR restore attempted in {}", self.cpsr),
        }
    }

    /// r0-r14 as seen by `bank`, whatever the active mode.
    pub(crate) fn banked_register(&self, bank: Bank, register: usize) -> u32 {
        let active = self.active_bank();
        match RegisterBank::owner(bank, register) {
            Some(owner) if RegisterBank::owner(active, register) != Some(owner) => {
                self.register_bank.stored(owner, register)
            }
            _ => self.registers.register_at(register),
        }
    }

    pub(crate) fn set_banked_register(&mut self, bank: Bank, register: usize, value: u32) {
        let active = self.active_bank();
        match RegisterBank::owner(bank, register) {
            Some(owner) if RegisterBank::owner(active, register) != Some(owner) => {
                self.register_bank.store(owner, register, value);
            }
            _ => self.registers.set_register_at(register, value),
        }
    }

    pub(crate) fn accumulate(&mut self, value: u64) {
        self.accumulator = value & ACCUMULATOR_MASK;
    }
}

/// Processor state accessors.
impl<'h, M: MemoryInterface> Arm7tdmi<'h, M> {
    /// Register `register` as seen from `mode` (raw mode bits, 26-bit
    /// numbers included).
    ///
    /// # Errors
    ///
    /// [`CpuError::InvalidMode`] for unknown mode bits,
    /// [`CpuError::InvalidRegister`] above 15.
    pub fn get_reg(&self, mode: u32, register: usize) -> Result<u32, CpuError> {
        let bank = Bank::from_mode_bits(mode)?;
        match register {
            REG_PROGRAM_COUNTER => Ok(self.registers.program_counter()),
            0..REG_PROGRAM_COUNTER => Ok(self.banked_register(bank, register)),
            _ => Err(CpuError::InvalidRegister(register)),
        }
    }

    /// # Errors
    ///
    /// Same as [`Self::get_reg`].
    pub fn set_reg(&mut self, mode: u32, register: usize, value: u32) -> Result<(), CpuError> {
        let bank = Bank::from_mode_bits(mode)?;
        match register {
            REG_PROGRAM_COUNTER => self.set_pc(value),
            0..REG_PROGRAM_COUNTER => self.set_banked_register(bank, register, value),
            _ => return Err(CpuError::InvalidRegister(register)),
        }
        Ok(())
    }

    #[must_use]
    pub const fn cpsr(&self) -> Psr {
        self.cpsr
    }

    /// # Errors
    ///
    /// [`CpuError::InvalidMode`] when the mode bits do not name a mode this
    /// processor implements. The CPSR is left untouched.
    pub fn set_cpsr(&mut self, value: u32) -> Result<(), CpuError> {
        let psr = Psr::from(value);
        let mode = psr.mode()?;
        if mode == Mode::System && !self.properties.v4 {
            return Err(CpuError::InvalidMode(psr.mode_bits()));
        }
        self.write_cpsr(psr);
        Ok(())
    }

    /// # Errors
    ///
    /// [`CpuError::NoSpsr`] for User, System and unknown modes.
    pub fn get_spsr(&self, mode: u32) -> Result<Psr, CpuError> {
        let bank = Bank::from_mode_bits(mode).map_err(|_| CpuError::NoSpsr(mode))?;
        self.register_bank.spsr(bank).ok_or(CpuError::NoSpsr(mode))
    }

    /// # Errors
    ///
    /// Same as [`Self::get_spsr`].
    pub fn set_spsr(&mut self, mode: u32, value: u32) -> Result<(), CpuError> {
        let bank = Bank::from_mode_bits(mode).map_err(|_| CpuError::NoSpsr(mode))?;
        if self.register_bank.set_spsr(bank, Psr::from(value)) {
            Ok(())
        } else {
            Err(CpuError::NoSpsr(mode))
        }
    }

    /// Address of the instruction executing (or about to).
    #[must_use]
    pub const fn pc(&self) -> u32 {
        self.registers.program_counter()
    }

    #[must_use]
    pub fn next_pc(&self) -> u32 {
        self.pc().wrapping_add(self.instruction_size())
    }

    /// Moves execution to `address` and flushes the pipeline.
    pub fn set_pc(&mut self, address: u32) {
        self.jump(address);
        self.pipeline.flush();
    }

    /// PC as an executing instruction reads it.
    #[must_use]
    pub fn r15(&self) -> u32 {
        self.pc().wrapping_add(2 * self.instruction_size())
    }

    /// Inverse of [`Self::r15`].
    pub fn set_r15(&mut self, value: u32) {
        self.set_pc(value.wrapping_sub(2 * self.instruction_size()));
    }

    #[must_use]
    pub const fn registers(&self) -> &Registers {
        &self.registers
    }

    #[must_use]
    pub const fn counters(&self) -> CycleCounters {
        self.counters
    }

    /// The cycle clock.
    #[must_use]
    pub const fn time(&self) -> u64 {
        self.scheduler.time()
    }

    #[must_use]
    pub const fn accumulator(&self) -> u64 {
        self.accumulator & ACCUMULATOR_MASK
    }

    pub const fn set_accumulator(&mut self, value: u64) {
        self.accumulator = value & ACCUMULATOR_MASK;
    }

    #[must_use]
    pub const fn exceptions(&self) -> &ExceptionController {
        &self.exceptions
    }

    /// The cause of the most recent undefined instruction, SWI, missing
    /// coprocessor or abort routed to the vector table. Reset clears it.
    #[must_use]
    pub const fn last_exception(&self) -> Option<CpuError> {
        self.last_exception
    }

    #[must_use]
    pub const fn properties(&self) -> ProcessorProperties {
        self.properties
    }

    #[must_use]
    pub const fn run_state(&self) -> RunState {
        self.run_state
    }

    #[must_use]
    pub const fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }
}

/// Host-facing controls.
impl<'h, M: MemoryInterface> Arm7tdmi<'h, M> {
    pub fn schedule_event(
        &mut self,
        delay: u64,
        callback: impl FnOnce(&mut EventContext<'_>) + 'static,
    ) -> EventId {
        self.scheduler.schedule(delay, callback)
    }

    pub fn cancel_event(&mut self, id: EventId) -> bool {
        self.scheduler.cancel(id)
    }

    pub const fn set_irq(&mut self, level: bool) {
        self.exceptions.lines.irq = level;
    }

    pub const fn set_fiq(&mut self, level: bool) {
        self.exceptions.lines.fiq = level;
    }

    pub const fn set_reset(&mut self, level: bool) {
        self.exceptions.lines.reset = level;
    }

    pub const fn set_vector_catch(&mut self, mask: u8) {
        self.exceptions.set_vector_catch(mask);
    }

    /// Stops the current run at the next instruction boundary.
    pub const fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// # Errors
    ///
    /// [`InitError::Coprocessor`] when the slot does not exist or the
    /// coprocessor refuses to initialise.
    pub fn bind_coprocessor(
        &mut self,
        number: u32,
        coprocessor: &'h mut dyn Coprocessor,
    ) -> Result<(), InitError> {
        self.coprocessors.bind(number, coprocessor)
    }

    pub fn unbind_coprocessor(&mut self, number: u32) -> bool {
        self.coprocessors.unbind(number).is_some()
    }

    /// Raw coprocessor register read for a debugger.
    pub fn read_coprocessor_register(&mut self, number: u32, register: u32) -> Option<u32> {
        self.coprocessors.read_register(number, register)
    }

    pub fn write_coprocessor_register(&mut self, number: u32, register: u32, value: u32) -> bool {
        self.coprocessors.write_register(number, register, value)
    }

    /// Attaches the operating-system shim and tells it which variant it
    /// runs on.
    pub fn set_host(&mut self, host: &'h mut dyn HostOs) {
        host.select_processor(self.properties);
        self.host = Some(host);
    }

    pub fn set_debug_hook(&mut self, hook: &'h mut dyn DebugHook) {
        self.debug = Some(hook);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MemoryInterface;
    use crate::memory::flat_memory::FlatMemory;
    use pretty_assertions::assert_eq;
    use rand::Rng;
    use rstest::rstest;

    fn cpu_with<'h>(config: &EmulatorConfig, program: &[u32]) -> Arm7tdmi<'h, FlatMemory> {
        let mut memory = FlatMemory::with_size(0x1000).unwrap();
        for (i, word) in program.iter().enumerate() {
            assert!(memory.write_word(i as u32 * 4, *word));
        }
        Arm7tdmi::new(memory, config)
    }

    fn cpu<'h>(program: &[u32]) -> Arm7tdmi<'h, FlatMemory> {
        cpu_with(&EmulatorConfig::default(), program)
    }

    fn bits(mode: Mode) -> u32 {
        u32::from(mode)
    }

    #[test]
    fn starts_in_the_reset_state() {
        let cpu = cpu(&[]);
        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Supervisor);
        assert!(cpu.cpsr().irq_disable());
        assert!(cpu.cpsr().fiq_disable());
        assert_eq!(cpu.cpsr().cpu_state(), CpuState::Arm);
        assert_eq!(cpu.pc(), 0);
        assert_eq!(cpu.r15(), 8);
        assert_eq!(cpu.next_pc(), 4);
        assert!(cpu.exceptions().reseted());
    }

    #[test]
    fn every_mode_sees_its_own_stack_pointer_and_link_register() {
        let mut cpu = cpu(&[]);

        for mode in Mode::ALL {
            cpu.set_cpsr(bits(mode)).unwrap();
            let tag = mode.bank().index() as u32;
            cpu.registers.set_register_at(13, 0x1000 + tag);
            cpu.registers.set_register_at(14, 0x2000 + tag);
        }

        for mode in Mode::ALL {
            cpu.set_cpsr(bits(mode)).unwrap();
            let tag = mode.bank().index() as u32;
            assert_eq!(cpu.registers.register_at(13), 0x1000 + tag, "{mode}");
            assert_eq!(cpu.registers.register_at(14), 0x2000 + tag, "{mode}");
            assert_eq!(cpu.get_reg(bits(mode), 13).unwrap(), 0x1000 + tag);
        }
    }

    #[test]
    fn invalid_mode_writes_are_refused() {
        let mut cpu = cpu(&[]);
        let before = cpu.cpsr();

        assert_eq!(cpu.set_cpsr(0b10101), Err(CpuError::InvalidMode(0b10101)));
        assert_eq!(cpu.set_cpsr(0b00011), Err(CpuError::InvalidMode(0b00011)));
        assert_eq!(cpu.cpsr(), before);
    }

    #[test]
    fn system_mode_needs_the_v4_extensions() {
        let config = EmulatorConfig::default().with_properties(ProcessorProperties {
            v4: false,
            ..ProcessorProperties::default()
        });
        let mut cpu = cpu_with(&config, &[]);
        assert_eq!(
            cpu.set_cpsr(bits(Mode::System)),
            Err(CpuError::InvalidMode(bits(Mode::System)))
        );
    }

    #[rstest]
    #[case(Mode::User)]
    #[case(Mode::System)]
    fn user_and_system_have_no_spsr(#[case] mode: Mode) {
        let mut cpu = cpu(&[]);
        assert_eq!(cpu.get_spsr(bits(mode)), Err(CpuError::NoSpsr(bits(mode))));
        assert_eq!(cpu.set_spsr(bits(mode), 0), Err(CpuError::NoSpsr(bits(mode))));
    }

    #[rstest]
    #[case(Mode::Fiq)]
    #[case(Mode::Irq)]
    #[case(Mode::Supervisor)]
    #[case(Mode::Abort)]
    #[case(Mode::Undefined)]
    fn exception_modes_round_trip_their_spsr(#[case] mode: Mode) {
        let mut cpu = cpu(&[]);
        let value = 0xA000_0010 | bits(mode);
        cpu.set_spsr(bits(mode), value).unwrap();
        assert_eq!(u32::from(cpu.get_spsr(bits(mode)).unwrap()), value);

        for other in Mode::ALL.into_iter().filter(|m| m.has_spsr() && *m != mode) {
            assert_eq!(u32::from(cpu.get_spsr(bits(other)).unwrap()), 0);
        }
    }

    fn shares_storage(a: Mode, b: Mode, register: usize) -> bool {
        match register {
            8..=12 => (a.bank() == Bank::Fiq) == (b.bank() == Bank::Fiq),
            13 | 14 => a.bank() == b.bank(),
            _ => true,
        }
    }

    #[test]
    fn set_reg_round_trips_without_touching_other_banks() {
        let mut rng = rand::thread_rng();

        for active in [Mode::User, Mode::Fiq, Mode::Irq] {
            let mut cpu = cpu(&[]);
            cpu.set_cpsr(bits(active)).unwrap();

            for mode in Mode::ALL {
                for register in 0..=15 {
                    let before: Vec<(Mode, usize, u32)> = Mode::ALL
                        .into_iter()
                        .flat_map(|m| (0..=15).map(move |r| (m, r)))
                        .map(|(m, r)| (m, r, cpu.get_reg(bits(m), r).unwrap()))
                        .collect();

                    let value = rng.r#gen::<u32>() & !3;
                    cpu.set_reg(bits(mode), register, value).unwrap();
                    assert_eq!(cpu.get_reg(bits(mode), register).unwrap(), value);

                    for (m, r, old) in before {
                        if r != register || !shares_storage(m, mode, r) {
                            assert_eq!(cpu.get_reg(bits(m), r).unwrap(), old, "{m} r{r}");
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn register_access_rejects_bad_arguments() {
        let mut cpu = cpu(&[]);
        assert_eq!(cpu.get_reg(bits(Mode::User), 16), Err(CpuError::InvalidRegister(16)));
        assert_eq!(cpu.set_reg(0b00101, 0, 1), Err(CpuError::InvalidMode(0b00101)));
    }

    #[test]
    fn legacy_mode_numbers_alias_the_32_bit_banks() {
        let mut cpu = cpu(&[]);
        cpu.set_reg(0b00001, 13, 0xF1F1).unwrap();
        assert_eq!(cpu.get_reg(bits(Mode::Fiq), 13).unwrap(), 0xF1F1);
        assert_eq!(cpu.set_cpsr(0b00001), Err(CpuError::InvalidMode(0b00001)));
    }

    #[test]
    fn unmet_conditions_only_cost_the_fetch() {
        // MOV r0, #0 / MOVEQ r1, #1 / MOVNE r2, #1
        let mut cpu = cpu(&[0xE3A0_0000, 0x03A0_1001, 0x13A0_2001]);
        cpu.set_cpsr(0x4000_0000 | bits(Mode::Supervisor)).unwrap();
        assert_eq!(cpu.step(), None);

        let before = cpu.counters();
        cpu.step();
        let after = cpu.counters();
        assert_eq!(cpu.registers.register_at(1), 1);
        assert_eq!(after.instructions - before.instructions, 1);
        assert_eq!(after.fetch - before.fetch, 1);
        assert_eq!(after.total() - before.total(), 1);
        assert_eq!(after.sequential - before.sequential, 1);

        let before = after;
        cpu.step();
        let after = cpu.counters();
        assert_eq!(cpu.registers.register_at(2), 0);
        assert_eq!(after.instructions - before.instructions, 1);
        assert_eq!(after.fetch - before.fetch, 1);
        assert_eq!(after.total() - before.total(), 1);
        assert_eq!(cpu.pc(), 12);
    }

    #[test]
    fn reset_wins_over_irq() {
        let mut cpu = cpu(&[]);
        cpu.set_pc(0x100);
        cpu.set_cpsr(bits(Mode::User)).unwrap();
        cpu.set_irq(true);
        cpu.set_reset(true);

        assert_eq!(cpu.step(), None);
        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Supervisor);
        assert_eq!(cpu.pc(), 0);
        assert!(cpu.cpsr().irq_disable());
        assert!(cpu.cpsr().fiq_disable());
    }

    #[test]
    fn vector_catch_reports_the_winning_exception() {
        let config = EmulatorConfig::default().with_vector_catch(0xFF);
        let mut cpu = cpu_with(&config, &[]);
        cpu.set_cpsr(bits(Mode::User)).unwrap();
        cpu.set_irq(true);
        cpu.set_reset(true);

        assert_eq!(cpu.step(), Some(StopReason::VectorCatch(ExceptionKind::Reset)));
        assert_eq!(cpu.run_state(), RunState::Stopped);
    }

    #[test]
    fn caught_software_interrupts_leave_pc_on_the_instruction() {
        // SWI 0x42
        let config = EmulatorConfig::default().with_vector_catch(1 << 2);
        let mut cpu = cpu_with(&config, &[0xEF00_0042]);

        assert_eq!(
            cpu.step(),
            Some(StopReason::VectorCatch(ExceptionKind::SoftwareInterrupt))
        );
        assert_eq!(cpu.pc(), 0);
        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Supervisor);
        assert_eq!(cpu.counters().instructions, 0);
        assert_eq!(cpu.last_exception(), Some(CpuError::SoftwareInterrupt(0x42)));
    }

    #[test]
    fn last_exception_names_the_undefined_word_until_reset() {
        let mut cpu = cpu(&[0xE600_0010]);
        assert_eq!(cpu.last_exception(), None);

        cpu.step();
        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Undefined);
        assert_eq!(
            cpu.last_exception(),
            Some(CpuError::UndefinedInstruction(0xE600_0010))
        );
        assert_eq!(
            cpu.last_exception().unwrap().to_string(),
            "undefined instruction 0xE6000010"
        );

        cpu.reset();
        assert_eq!(cpu.last_exception(), None);
    }

    #[rstest]
    #[case::mrc(0xEE11_0710)]
    #[case::mcr(0xEE01_0710)]
    #[case::cdp(0xEE02_1703)]
    #[case::ldc(0xED92_1700)]
    #[case::stc(0xED82_1700)]
    fn unbound_coprocessors_are_undefined(#[case] instruction: u32) {
        let mut cpu = cpu(&[instruction]);
        cpu.registers.set_register_at(0, 0x1234);
        cpu.registers.set_register_at(2, 0x800);
        cpu.bus.write_word(0x800, 0xCAFE);

        cpu.step();

        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Undefined);
        assert_eq!(cpu.pc(), 0x04);
        assert_eq!(cpu.registers.register_at(14), 0x04);
        assert_eq!(cpu.registers.register_at(0), 0x1234);
        assert_eq!(cpu.registers.register_at(2), 0x800);
        assert_eq!(cpu.bus.read_word(0x800), Some(0xCAFE));
        assert_eq!(
            cpu.last_exception(),
            Some(CpuError::UnsupportedCoprocessor(7))
        );
        assert_eq!(
            cpu.get_spsr(bits(Mode::Undefined)).unwrap().mode().unwrap(),
            Mode::Supervisor
        );
    }

    #[test]
    fn data_abort_is_taken_before_a_pending_fiq() {
        // LDR r0, [r1]
        let mut cpu = cpu(&[0xE591_0000]);
        cpu.set_cpsr(bits(Mode::User)).unwrap();
        cpu.registers.set_register_at(0, 0x55);
        cpu.registers.set_register_at(1, 0x8000);
        cpu.schedule_event(1, |context| context.set_fiq(true));

        cpu.step();
        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Abort);
        assert_eq!(cpu.pc(), 0x10);
        assert_eq!(cpu.registers.register_at(14), 0x08);
        assert_eq!(cpu.registers.register_at(0), 0x55);
        assert_eq!(cpu.exceptions().abort_address(), Some(0x8000));
        assert_eq!(cpu.bus.abort_signal(), None);
        assert_eq!(
            cpu.last_exception(),
            Some(CpuError::MemoryAbort {
                kind: AbortKind::Data,
                address: 0x8000
            })
        );

        cpu.step();
        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Fiq);
        assert_eq!(cpu.registers.register_at(14), 0x14);
        assert_eq!(
            cpu.get_spsr(bits(Mode::Fiq)).unwrap().mode().unwrap(),
            Mode::Abort
        );
    }

    #[test]
    fn prefetch_aborts_only_when_the_instruction_executes() {
        let mut cpu = cpu(&[]);
        cpu.set_pc(0x0FFC);
        // B . at 0xFFC: the aborted slot at 0x1000 never executes.
        cpu.bus.write_word(0x0FFC, 0xEAFF_FFFE);
        cpu.step();
        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Supervisor);
        assert_eq!(cpu.pc(), 0x0FFC);

        // MOV r0, r0 falls through into the hole.
        cpu.bus.write_word(0x0FFC, 0xE1A0_0000);
        cpu.set_pc(0x0FFC);
        cpu.step();
        cpu.step();
        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Abort);
        assert_eq!(cpu.pc(), 0x0C);
        assert_eq!(cpu.registers.register_at(14), 0x1004);
    }

    #[test]
    fn scheduled_interrupts_are_taken_at_the_next_boundary() {
        // B .
        let mut cpu = cpu(&[0xEAFF_FFFE]);
        cpu.set_cpsr(bits(Mode::User)).unwrap();
        cpu.schedule_event(5, |context| context.set_irq(true));

        assert_eq!(cpu.run_for(1), StopReason::BudgetExhausted);
        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::User);
        assert_eq!(cpu.time(), 5);

        cpu.step();
        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Irq);
        assert_eq!(cpu.pc(), 0x18);
        assert_eq!(cpu.registers.register_at(14), 0x04);
    }

    #[test]
    fn events_can_end_a_run() {
        let mut cpu = cpu(&[0xEAFF_FFFE]);
        cpu.schedule_event(100, |context| context.request_stop());

        assert_eq!(cpu.run(), StopReason::Requested);
        assert!(cpu.time() >= 100);
        assert_eq!(cpu.stop_reason(), Some(StopReason::Requested));
    }

    #[test]
    fn stop_requests_are_honoured_before_the_next_instruction() {
        let mut cpu = cpu(&[0xEAFF_FFFE]);
        cpu.request_stop();
        assert_eq!(cpu.step(), Some(StopReason::Requested));
        assert_eq!(cpu.counters().instructions, 0);
    }

    struct BreakAt(u32);

    impl DebugHook for BreakAt {
        fn on_instruction(&mut self, pc: u32, _instruction: u32) -> DebugAction {
            if pc == self.0 {
                DebugAction::Stop
            } else {
                DebugAction::Continue
            }
        }
    }

    #[test]
    fn debug_hook_stops_before_the_instruction() {
        let mut hook = BreakAt(4);
        let config = EmulatorConfig::default().with_properties(ProcessorProperties {
            debug: true,
            ..ProcessorProperties::default()
        });
        // MOV r0, r0 / MOV r1, #1 / B .
        let mut cpu = cpu_with(&config, &[0xE1A0_0000, 0xE3A0_1001, 0xEAFF_FFFE]);
        cpu.set_debug_hook(&mut hook);

        assert_eq!(cpu.run(), StopReason::Breakpoint);
        assert_eq!(cpu.pc(), 4);
        assert_eq!(cpu.registers.register_at(1), 0);

        assert_eq!(cpu.step(), None);
        assert_eq!(cpu.registers.register_at(1), 1);
    }

    #[test]
    fn accumulator_is_forty_bits_wide() {
        let mut cpu = cpu(&[]);
        cpu.set_accumulator(u64::MAX);
        assert_eq!(cpu.accumulator(), 0xFF_FFFF_FFFF);
    }

    #[test]
    fn reset_clears_state_and_events() {
        let mut cpu = cpu(&[0xEAFF_FFFE]);
        cpu.schedule_event(1_000, |context| context.request_stop());
        cpu.run_for(3);
        cpu.set_cpsr(bits(Mode::User)).unwrap();

        cpu.reset();
        assert_eq!(cpu.counters(), CycleCounters::default());
        assert_eq!(cpu.time(), 0);
        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Supervisor);
        assert_eq!(cpu.scheduler.pending(), 0);
    }
}
