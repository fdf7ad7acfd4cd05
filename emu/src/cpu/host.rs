//! Hooks the engine calls out to: the operating-system shim that services
//! SWIs and vets exceptions, and the per-instruction debugger hook.

use crate::bus::MemoryInterface;
use crate::config::ProcessorProperties;
use crate::cpu::exception::ExceptionKind;
use crate::cpu::psr::Psr;
use crate::cpu::registers::Registers;

/// Operating-system services backing an emulated program.
///
/// Every method has a default that leaves the emulated hardware in charge,
/// so a host only overrides what it implements.
pub trait HostOs {
    /// Services `SWI number`. Returning `true` consumes the SWI: execution
    /// continues with the next instruction and no exception is taken.
    fn handle_swi(
        &mut self,
        _number: u32,
        _registers: &mut Registers,
        _memory: &mut dyn MemoryInterface,
    ) -> bool {
        false
    }

    /// Error code of the last failed host call.
    fn last_error(&self) -> u32 {
        0
    }

    fn console_print(&mut self, text: &str) {
        tracing::info!("{text}");
    }

    /// Last chance to emulate an instruction the core does not implement.
    /// `true` skips it instead of taking the undefined-instruction trap.
    fn undefined_instruction(&mut self, _instruction: u32) -> bool {
        false
    }

    /// Adjusts a value an MSR is about to write into the CPSR.
    fn fix_cpsr(&mut self, _instruction: u32, value: Psr) -> Psr {
        value
    }

    /// Consulted before vectoring. `true` means the host dealt with it and
    /// the exception is not entered.
    fn exception(&mut self, _kind: ExceptionKind, _pc: u32) -> bool {
        false
    }

    fn select_processor(&mut self, _properties: ProcessorProperties) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugAction {
    Continue,
    /// Stop before the instruction executes.
    Stop,
}

pub trait DebugHook {
    /// Called with the address and raw word of every instruction about to
    /// execute.
    fn on_instruction(&mut self, pc: u32, instruction: u32) -> DebugAction;
}
