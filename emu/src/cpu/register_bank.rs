//! # Banked Registers
//!
//! Storage for the registers that are swapped out of the visible file on a
//! mode change. See [`cpu_modes`](super::cpu_modes) for the banking table.
//!
//! Only r8-r14 are ever banked. r8-r12 have two owners (the FIQ bank and
//! the user bank shared by every other mode); r13-r14 have one owner per
//! bank.

use serde::{Deserialize, Serialize};

use crate::cpu::cpu_modes::{BANK_COUNT, Bank};
use crate::cpu::psr::Psr;
use crate::cpu::registers::Registers;

const FIRST_BANKED: usize = 8;
const BANKED_PER_MODE: usize = 7;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterBank {
    /// r8-r14 of every bank. Slots a bank does not own stay unused.
    high: [[u32; BANKED_PER_MODE]; BANK_COUNT],

    spsr: [Psr; BANK_COUNT],
}

impl RegisterBank {
    /// The bank physically holding register `reg` while `bank` is active,
    /// or `None` when the register is shared by every mode.
    #[must_use]
    pub const fn owner(bank: Bank, reg: usize) -> Option<Bank> {
        match reg {
            8..=12 => match bank {
                Bank::Fiq => Some(Bank::Fiq),
                _ => Some(Bank::User),
            },
            13 | 14 => Some(bank),
            _ => None,
        }
    }

    /// Stored copy of an r8-r14 register. Meaningless while `bank` is the
    /// active one: the live value is in the visible file.
    #[must_use]
    pub const fn stored(&self, bank: Bank, reg: usize) -> u32 {
        self.high[bank.index()][reg - FIRST_BANKED]
    }

    pub const fn store(&mut self, bank: Bank, reg: usize, value: u32) {
        self.high[bank.index()][reg - FIRST_BANKED] = value;
    }

    /// Swaps the visible file from `from`'s registers to `to`'s.
    pub fn switch(&mut self, from: Bank, to: Bank, registers: &mut Registers) {
        if from == to {
            return;
        }

        for reg in FIRST_BANKED..=14 {
            if let Some(owner) = Self::owner(from, reg) {
                self.store(owner, reg, registers.register_at(reg));
            }
        }

        for reg in FIRST_BANKED..=14 {
            if let Some(owner) = Self::owner(to, reg) {
                registers.set_register_at(reg, self.stored(owner, reg));
            }
        }
    }

    #[must_use]
    pub const fn spsr(&self, bank: Bank) -> Option<Psr> {
        if bank.has_spsr() {
            Some(self.spsr[bank.index()])
        } else {
            None
        }
    }

    /// Returns `false` when `bank` has no SPSR.
    pub const fn set_spsr(&mut self, bank: Bank, psr: Psr) -> bool {
        if bank.has_spsr() {
            self.spsr[bank.index()] = psr;
            true
        } else {
            false
        }
    }
}
