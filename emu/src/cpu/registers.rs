//! # Visible Register File
//!
//! - **R0-R12**: general purpose
//! - **R13 (SP)**: stack pointer by convention
//! - **R14 (LR)**: link register
//! - **R15 (PC)**: here always the address of the executing instruction;
//!   the `+8`/`+4` pipeline offset is added by the engine when an
//!   instruction reads it.

use serde::{Deserialize, Serialize};

pub const REG_SP: usize = 0xD;

pub const REG_LR: usize = 0xE;

pub const REG_PROGRAM_COUNTER: usize = 0xF;

/// The 16 registers of the active mode.
///
/// Banked copies for the other modes live in
/// [`RegisterBank`](super::register_bank::RegisterBank).
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registers([u32; 16]);

impl Registers {
    #[must_use]
    pub const fn program_counter(&self) -> u32 {
        self.0[REG_PROGRAM_COUNTER]
    }

    pub const fn set_program_counter(&mut self, new_value: u32) {
        self.0[REG_PROGRAM_COUNTER] = new_value;
    }

    pub const fn advance_program_counter(&mut self, bytes: u32) {
        self.0[REG_PROGRAM_COUNTER] = self.0[REG_PROGRAM_COUNTER].wrapping_add(bytes);
    }

    /// # Panics
    ///
    /// Panics when `reg` is not in `0..=15`.
    pub fn set_register_at(&mut self, reg: usize, new_value: u32) {
        assert!(reg <= 15, "Invalid register index: {reg} (0x{reg:X})");
        self.0[reg] = new_value;
    }

    #[must_use]
    pub const fn register_at(&self, reg: usize) -> u32 {
        self.0[reg]
    }

    #[must_use]
    pub const fn as_array(&self) -> &[u32; 16] {
        &self.0
    }
}

impl From<[u32; 16]> for Registers {
    fn from(values: [u32; 16]) -> Self {
        Self(values)
    }
}
