//! # Exceptions and Aborts
//!
//! The fixed vector table and the bookkeeping that decides which exception
//! is taken at an instruction boundary.
//!
//! ```text
//! 0x00 Reset                 svc  I F   priority 1
//! 0x04 Undefined instruction und  I     priority 6
//! 0x08 Software interrupt    svc  I     priority 6
//! 0x0C Prefetch abort        abt  I     priority 5
//! 0x10 Data abort            abt  I     priority 2
//! 0x14 Address exception     (26-bit only, never raised)
//! 0x18 IRQ                   irq  I     priority 4
//! 0x1C FIQ                   fiq  I F   priority 3
//! ```
//!
//! Reset, FIQ and IRQ are level-sensitive lines raised by the host or by
//! scheduled events. Aborts come from the memory interface and are sticky:
//! the first faulting address of a window is kept until the handler is
//! entered.

use serde::{Deserialize, Serialize};

use crate::cpu::cpu_modes::Mode;
use crate::cpu::psr::CpuState;

/// Bookkeeping offset past the last vector. Never a real vector.
pub const ERROR_OFFSET: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExceptionKind {
    Reset,
    Undefined,
    SoftwareInterrupt,
    PrefetchAbort,
    DataAbort,
    AddressException,
    Irq,
    Fiq,
}

impl ExceptionKind {
    #[must_use]
    pub const fn vector(self) -> u32 {
        match self {
            Self::Reset => 0x00,
            Self::Undefined => 0x04,
            Self::SoftwareInterrupt => 0x08,
            Self::PrefetchAbort => 0x0C,
            Self::DataAbort => 0x10,
            Self::AddressException => 0x14,
            Self::Irq => 0x18,
            Self::Fiq => 0x1C,
        }
    }

    /// Mode the handler runs in.
    #[must_use]
    pub const fn mode(self) -> Mode {
        match self {
            Self::Reset | Self::SoftwareInterrupt | Self::AddressException => Mode::Supervisor,
            Self::Undefined => Mode::Undefined,
            Self::PrefetchAbort | Self::DataAbort => Mode::Abort,
            Self::Irq => Mode::Irq,
            Self::Fiq => Mode::Fiq,
        }
    }

    /// Lower is more urgent.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Reset => 1,
            Self::DataAbort => 2,
            Self::Fiq => 3,
            Self::Irq => 4,
            Self::PrefetchAbort => 5,
            Self::Undefined | Self::SoftwareInterrupt => 6,
            Self::AddressException => 7,
        }
    }

    /// Reset and FIQ also mask FIQ.
    #[must_use]
    pub const fn disables_fiq(self) -> bool {
        matches!(self, Self::Reset | Self::Fiq)
    }

    /// Value for the handler's r14, relative to the address `pc` of the
    /// instruction concerned. `None` for reset, whose r14 is unpredictable.
    #[must_use]
    pub const fn return_address(self, pc: u32, state: CpuState) -> Option<u32> {
        match self {
            Self::Reset => None,
            Self::Undefined | Self::SoftwareInterrupt => {
                Some(pc.wrapping_add(state.instruction_size()))
            }
            Self::PrefetchAbort | Self::Irq | Self::Fiq | Self::AddressException => {
                Some(pc.wrapping_add(4))
            }
            Self::DataAbort => Some(pc.wrapping_add(8)),
        }
    }

    /// Bit of the vector-catch mask guarding this vector.
    #[must_use]
    pub const fn catch_bit(self) -> u8 {
        1 << (self.vector() / 4)
    }

    /// The most urgent of `kinds`.
    pub fn most_urgent(kinds: impl IntoIterator<Item = Self>) -> Option<Self> {
        kinds.into_iter().min_by_key(|kind| kind.priority())
    }
}

impl std::fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reset => f.write_str("reset"),
            Self::Undefined => f.write_str("undefined instruction"),
            Self::SoftwareInterrupt => f.write_str("software interrupt"),
            Self::PrefetchAbort => f.write_str("prefetch abort"),
            Self::DataAbort => f.write_str("data abort"),
            Self::AddressException => f.write_str("address exception"),
            Self::Irq => f.write_str("IRQ"),
            Self::Fiq => f.write_str("FIQ"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortKind {
    /// Raised on an instruction fetch.
    Prefetch,
    /// Raised on a data access.
    Data,
}

impl std::fmt::Display for AbortKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prefetch => f.write_str("prefetch"),
            Self::Data => f.write_str("data"),
        }
    }
}

impl From<AbortKind> for ExceptionKind {
    fn from(kind: AbortKind) -> Self {
        match kind {
            AbortKind::Prefetch => Self::PrefetchAbort,
            AbortKind::Data => Self::DataAbort,
        }
    }
}

/// Levels of the asynchronous inputs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptLines {
    pub reset: bool,
    pub fiq: bool,
    pub irq: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionController {
    pub lines: InterruptLines,

    /// FIQ (bit 0) and IRQ (bit 1) as seen at the current boundary.
    inted: u8,

    /// Same, one boundary earlier.
    last_inted: u8,

    /// Set once a reset has been taken.
    reseted: bool,

    aborted: Option<AbortKind>,

    abort_address: Option<u32>,

    vector_catch: u8,
}

impl ExceptionController {
    #[must_use]
    pub fn new(vector_catch: u8) -> Self {
        Self {
            vector_catch,
            ..Default::default()
        }
    }

    /// Records an abort. Only the first one of a window is kept.
    pub fn abort(&mut self, address: u32, kind: AbortKind) {
        if self.aborted.is_none() {
            tracing::debug!("{kind} abort at 0x{address:08X}");
            self.aborted = Some(kind);
            self.abort_address = Some(address);
        }
    }

    /// Closes the fault window; the address stays readable.
    pub const fn clear_abort(&mut self) {
        self.aborted = None;
    }

    #[must_use]
    pub const fn aborted(&self) -> Option<AbortKind> {
        self.aborted
    }

    #[must_use]
    pub const fn abort_address(&self) -> Option<u32> {
        self.abort_address
    }

    #[must_use]
    pub const fn reseted(&self) -> bool {
        self.reseted
    }

    pub const fn mark_reseted(&mut self) {
        self.reseted = true;
    }

    #[must_use]
    pub const fn inted(&self) -> u8 {
        self.inted
    }

    #[must_use]
    pub const fn last_inted(&self) -> u8 {
        self.last_inted
    }

    #[must_use]
    pub const fn vector_catch(&self) -> u8 {
        self.vector_catch
    }

    pub const fn set_vector_catch(&mut self, mask: u8) {
        self.vector_catch = mask;
    }

    #[must_use]
    pub const fn catches(&self, kind: ExceptionKind) -> bool {
        self.vector_catch & kind.catch_bit() != 0
    }

    /// Samples the lines at a boundary and returns the asynchronous
    /// exception to take, honouring the I and F masks.
    pub fn sample(&mut self, irq_disabled: bool, fiq_disabled: bool) -> Option<ExceptionKind> {
        self.last_inted = self.inted;
        self.inted = u8::from(self.lines.fiq) | (u8::from(self.lines.irq) << 1);

        let candidates = [
            self.lines.reset.then_some(ExceptionKind::Reset),
            (self.lines.fiq && !fiq_disabled).then_some(ExceptionKind::Fiq),
            (self.lines.irq && !irq_disabled).then_some(ExceptionKind::Irq),
        ];

        ExceptionKind::most_urgent(candidates.into_iter().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(ExceptionKind::Reset, 0x00, Mode::Supervisor)]
    #[case(ExceptionKind::Undefined, 0x04, Mode::Undefined)]
    #[case(ExceptionKind::SoftwareInterrupt, 0x08, Mode::Supervisor)]
    #[case(ExceptionKind::PrefetchAbort, 0x0C, Mode::Abort)]
    #[case(ExceptionKind::DataAbort, 0x10, Mode::Abort)]
    #[case(ExceptionKind::Irq, 0x18, Mode::Irq)]
    #[case(ExceptionKind::Fiq, 0x1C, Mode::Fiq)]
    fn vector_table(#[case] kind: ExceptionKind, #[case] vector: u32, #[case] mode: Mode) {
        assert_eq!(kind.vector(), vector);
        assert_eq!(kind.mode(), mode);
        assert!(kind.vector() < ERROR_OFFSET);
    }

    #[test]
    fn priority_order() {
        use ExceptionKind::*;
        assert_eq!(
            ExceptionKind::most_urgent([Irq, Reset, SoftwareInterrupt]),
            Some(Reset)
        );
        assert_eq!(ExceptionKind::most_urgent([Irq, DataAbort, Fiq]), Some(DataAbort));
        assert_eq!(ExceptionKind::most_urgent([PrefetchAbort, Irq]), Some(Irq));
        assert_eq!(ExceptionKind::most_urgent([Undefined, PrefetchAbort]), Some(PrefetchAbort));
        assert_eq!(ExceptionKind::most_urgent(std::iter::empty()), None);
    }

    #[test]
    fn return_addresses() {
        use ExceptionKind::*;
        assert_eq!(SoftwareInterrupt.return_address(0x100, CpuState::Arm), Some(0x104));
        assert_eq!(Undefined.return_address(0x100, CpuState::Thumb), Some(0x102));
        assert_eq!(PrefetchAbort.return_address(0x100, CpuState::Arm), Some(0x104));
        assert_eq!(DataAbort.return_address(0x100, CpuState::Thumb), Some(0x108));
        assert_eq!(Irq.return_address(0x100, CpuState::Arm), Some(0x104));
        assert_eq!(Reset.return_address(0x100, CpuState::Arm), None);
    }

    #[test]
    fn abort_address_is_sticky_within_a_window() {
        let mut controller = ExceptionController::default();
        controller.abort(0x4000, AbortKind::Data);
        controller.abort(0x8000, AbortKind::Prefetch);
        assert_eq!(controller.aborted(), Some(AbortKind::Data));
        assert_eq!(controller.abort_address(), Some(0x4000));

        controller.clear_abort();
        assert_eq!(controller.aborted(), None);
        controller.abort(0x8000, AbortKind::Prefetch);
        assert_eq!(controller.abort_address(), Some(0x8000));
    }

    #[test]
    fn masked_lines_are_not_taken() {
        let mut controller = ExceptionController::default();
        controller.lines.irq = true;
        assert_eq!(controller.sample(true, false), None);
        assert_eq!(controller.inted(), 0b10);

        controller.lines.fiq = true;
        assert_eq!(controller.sample(false, false), Some(ExceptionKind::Fiq));
        assert_eq!(controller.last_inted(), 0b10);
        assert_eq!(controller.inted(), 0b11);

        controller.lines.reset = true;
        assert_eq!(controller.sample(true, true), Some(ExceptionKind::Reset));
    }

    #[test]
    fn catch_bits_follow_vector_offsets() {
        let controller = ExceptionController::new(0b0000_0100);
        assert!(controller.catches(ExceptionKind::SoftwareInterrupt));
        assert!(!controller.catches(ExceptionKind::Undefined));
        assert_eq!(ExceptionKind::Fiq.catch_bit(), 0x80);
    }
}
