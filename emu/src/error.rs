use thiserror::Error;

use crate::cpu::exception::AbortKind;

/// Failures of the processor-state API.
///
/// Undefined instructions, unsupported coprocessors, aborts and SWIs never
/// fail a `step`. They are routed into the emulated vector table and
/// reported afterwards through `Arm7tdmi::last_exception`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CpuError {
    /// Mode bits that do not name one of the ARMv4 modes.
    #[error("invalid processor mode 0b{0:05b}")]
    InvalidMode(u32),

    /// Register index outside `0..=15`.
    #[error("invalid register index {0}")]
    InvalidRegister(usize),

    /// User, System and unmapped banks have no SPSR.
    #[error("mode 0b{0:05b} has no SPSR")]
    NoSpsr(u32),

    #[error("undefined instruction 0x{0:08X}")]
    UndefinedInstruction(u32),

    #[error("{kind} abort at 0x{address:08X}")]
    MemoryAbort { kind: AbortKind, address: u32 },

    #[error("no coprocessor bound to slot {0}")]
    UnsupportedCoprocessor(u32),

    #[error("software interrupt 0x{0:06X}")]
    SoftwareInterrupt(u32),
}

/// Host-level failures while setting a session up.
#[derive(Debug, Error)]
pub enum InitError {
    /// Allocating the backing memory store failed.
    #[error("cannot bind {size} bytes of backing memory")]
    MemoryExhausted {
        size: usize,
        #[source]
        source: std::collections::TryReserveError,
    },

    #[error("backing memory size must be a non-zero multiple of 4, got {0}")]
    InvalidMemorySize(usize),

    /// A bound coprocessor refused to initialise.
    #[error("coprocessor {0} failed to initialise")]
    Coprocessor(u32),

    #[error("failed to install the tracing subscriber: {0}")]
    Logging(String),
}
