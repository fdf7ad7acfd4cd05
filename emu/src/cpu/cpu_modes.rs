//! # Processor Modes
//!
//! Every mode selects one of seven register banks. System mode runs with
//! privileges but shares the user registers, and FIQ is the only mode that
//! also shadows r8-r12.
//!
//! ```text
//!            r0-r7   r8-r12   r13-r14   SPSR
//! User       ─────── user ─── user      none
//! System     ─────── user ─── user      none
//! FIQ        shared  fiq      fiq       fiq
//! IRQ        shared  user     irq       irq
//! Supervisor shared  user     svc       svc
//! Abort      shared  user     abt       abt
//! Undefined  shared  user     und       und
//! ```
//!
//! The legacy 26-bit mode numbers (`0b00000..=0b00011`) are still mapped
//! onto the user/FIQ/IRQ/supervisor banks so a debugger can inspect them,
//! but they never become the active mode.

use serde::{Deserialize, Serialize};

use crate::error::CpuError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    /// The normal program execution state.
    User = 0b10000,

    /// Fast interrupt, banks r8-r14.
    Fiq = 0b10001,

    /// General-purpose interrupt handling.
    Irq = 0b10010,

    /// Entered on reset and SWI.
    Supervisor = 0b10011,

    /// Entered after a data or prefetch abort.
    Abort = 0b10111,

    /// Entered when an undefined instruction is executed.
    Undefined = 0b11011,

    /// Privileged mode sharing the user registers.
    System = 0b11111,
}

impl Mode {
    pub const ALL: [Self; 7] = [
        Self::User,
        Self::Fiq,
        Self::Irq,
        Self::Supervisor,
        Self::Abort,
        Self::Undefined,
        Self::System,
    ];

    #[must_use]
    pub const fn bank(self) -> Bank {
        match self {
            Self::User | Self::System => Bank::User,
            Self::Fiq => Bank::Fiq,
            Self::Irq => Bank::Irq,
            Self::Supervisor => Bank::Supervisor,
            Self::Abort => Bank::Abort,
            Self::Undefined => Bank::Undefined,
        }
    }

    #[must_use]
    pub const fn is_privileged(self) -> bool {
        !matches!(self, Self::User)
    }

    #[must_use]
    pub const fn has_spsr(self) -> bool {
        self.bank().has_spsr()
    }
}

impl From<Mode> for u32 {
    fn from(m: Mode) -> Self {
        m as Self
    }
}

impl TryFrom<u32> for Mode {
    type Error = CpuError;

    fn try_from(n: u32) -> Result<Self, Self::Error> {
        match n {
            0b10000 => Ok(Self::User),
            0b10001 => Ok(Self::Fiq),
            0b10010 => Ok(Self::Irq),
            0b10011 => Ok(Self::Supervisor),
            0b10111 => Ok(Self::Abort),
            0b11011 => Ok(Self::Undefined),
            0b11111 => Ok(Self::System),
            _ => Err(CpuError::InvalidMode(n)),
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => f.write_str("usr"),
            Self::Fiq => f.write_str("fiq"),
            Self::Irq => f.write_str("irq"),
            Self::Supervisor => f.write_str("svc"),
            Self::Abort => f.write_str("abt"),
            Self::Undefined => f.write_str("und"),
            Self::System => f.write_str("sys"),
        }
    }
}

/// Physical register banks. `Dummy` backs mode numbers with no bank of
/// their own and never holds an SPSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bank {
    User = 0,
    Fiq = 1,
    Irq = 2,
    Supervisor = 3,
    Abort = 4,
    Undefined = 5,
    Dummy = 6,
}

pub const BANK_COUNT: usize = 7;

impl Bank {
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub const fn has_spsr(self) -> bool {
        matches!(
            self,
            Self::Fiq | Self::Irq | Self::Supervisor | Self::Abort | Self::Undefined
        )
    }

    /// Maps raw mode bits onto a bank, accepting the 26-bit encodings.
    ///
    /// # Errors
    ///
    /// Returns [`CpuError::InvalidMode`] for anything else.
    pub const fn from_mode_bits(bits: u32) -> Result<Self, CpuError> {
        match bits {
            0b00000 | 0b10000 | 0b11111 => Ok(Self::User),
            0b00001 | 0b10001 => Ok(Self::Fiq),
            0b00010 | 0b10010 => Ok(Self::Irq),
            0b00011 | 0b10011 => Ok(Self::Supervisor),
            0b10111 => Ok(Self::Abort),
            0b11011 => Ok(Self::Undefined),
            _ => Err(CpuError::InvalidMode(bits)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(Mode::User, 0b10000, Bank::User)]
    #[case(Mode::Fiq, 0b10001, Bank::Fiq)]
    #[case(Mode::Irq, 0b10010, Bank::Irq)]
    #[case(Mode::Supervisor, 0b10011, Bank::Supervisor)]
    #[case(Mode::Abort, 0b10111, Bank::Abort)]
    #[case(Mode::Undefined, 0b11011, Bank::Undefined)]
    #[case(Mode::System, 0b11111, Bank::User)]
    fn mode_bits_and_banks(#[case] mode: Mode, #[case] bits: u32, #[case] bank: Bank) {
        assert_eq!(u32::from(mode), bits);
        assert_eq!(Mode::try_from(bits), Ok(mode));
        assert_eq!(mode.bank(), bank);
        assert_eq!(Bank::from_mode_bits(bits), Ok(bank));
    }

    #[test]
    fn legacy_modes_alias_banks_but_are_not_modes() {
        assert_eq!(Bank::from_mode_bits(0b00000), Ok(Bank::User));
        assert_eq!(Bank::from_mode_bits(0b00001), Ok(Bank::Fiq));
        assert_eq!(Bank::from_mode_bits(0b00010), Ok(Bank::Irq));
        assert_eq!(Bank::from_mode_bits(0b00011), Ok(Bank::Supervisor));
        assert_eq!(Mode::try_from(0b00011), Err(CpuError::InvalidMode(0b00011)));
    }

    #[test]
    fn unknown_mode_bits_are_rejected() {
        assert_eq!(Bank::from_mode_bits(0b10100), Err(CpuError::InvalidMode(0b10100)));
        assert_eq!(Mode::try_from(0b10110), Err(CpuError::InvalidMode(0b10110)));
    }

    #[test]
    fn only_exception_banks_carry_an_spsr() {
        assert!(!Mode::User.has_spsr());
        assert!(!Mode::System.has_spsr());
        assert!(!Bank::Dummy.has_spsr());
        assert!(Mode::Fiq.has_spsr());
        assert!(Mode::Undefined.has_spsr());
    }
}
