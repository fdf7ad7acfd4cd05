//! # Memory Access Interface
//!
//! Everything the core reads or writes goes through [`MemoryInterface`].
//! Each access carries the bus cycle type the ARM7TDMI would drive for it,
//! so a memory model can charge wait states the way real hardware does:
//!
//! ```text
//! S  sequential      address follows the previous access of the stream
//! N  non-sequential  new address
//! I  internal        no memory traffic
//! C  coprocessor     coprocessor busy cycle
//! ```
//!
//! Faults are reported through a sticky latch: an access that cannot be
//! served records its address, the engine polls [`MemoryInterface::abort_signal`]
//! after every access and clears the latch when it enters the abort handler.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CycleKind {
    Sequential,
    NonSequential,
    Internal,
    Coprocessor,
}

impl std::fmt::Display for CycleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => f.write_str("S"),
            Self::NonSequential => f.write_str("N"),
            Self::Internal => f.write_str("I"),
            Self::Coprocessor => f.write_str("C"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessWidth {
    Byte,
    HalfWord,
    Word,
}

impl AccessWidth {
    #[must_use]
    pub const fn size(self) -> u32 {
        match self {
            Self::Byte => 1,
            Self::HalfWord => 2,
            Self::Word => 4,
        }
    }
}

/// Backing memory as seen by the processor.
///
/// Addresses handed to the load/store methods may be unaligned; the
/// implementation is expected to ignore the low bits below the access
/// width. Rotating misaligned word and halfword loads is the engine's job.
pub trait MemoryInterface {
    fn load_word(&mut self, address: u32, cycle: CycleKind) -> u32;

    fn load_half_word(&mut self, address: u32, cycle: CycleKind) -> u16;

    fn load_byte(&mut self, address: u32, cycle: CycleKind) -> u8;

    fn store_word(&mut self, address: u32, value: u32, cycle: CycleKind);

    fn store_half_word(&mut self, address: u32, value: u16, cycle: CycleKind);

    fn store_byte(&mut self, address: u32, value: u8, cycle: CycleKind);

    /// Latest unserved address, if any. Stays set until [`Self::clear_abort`].
    fn abort_signal(&self) -> Option<u32>;

    fn clear_abort(&mut self);

    /// Debugger peek: no timing, no abort. `None` when unmapped.
    fn read_word(&self, address: u32) -> Option<u32>;

    fn read_byte(&self, address: u32) -> Option<u8>;

    /// Debugger poke. Returns `false` when the address is unmapped.
    fn write_word(&mut self, address: u32, value: u32) -> bool;

    fn write_byte(&mut self, address: u32, value: u8) -> bool;

    /// Instruction fetch. `width` is [`AccessWidth::Word`] in ARM state and
    /// [`AccessWidth::HalfWord`] in Thumb state.
    fn load_instruction(&mut self, address: u32, width: AccessWidth, cycle: CycleKind) -> u32 {
        match width {
            AccessWidth::Word => self.load_word(address, cycle),
            AccessWidth::HalfWord => u32::from(self.load_half_word(address, cycle)),
            AccessWidth::Byte => u32::from(self.load_byte(address, cycle)),
        }
    }

    /// Locked read-then-write used by SWP. The write is skipped when the
    /// read aborts.
    fn swap_word(&mut self, address: u32, value: u32) -> u32 {
        let old = self.load_word(address, CycleKind::NonSequential);
        if self.abort_signal().is_none() {
            self.store_word(address, value, CycleKind::NonSequential);
        }
        old
    }

    fn swap_byte(&mut self, address: u32, value: u8) -> u8 {
        let old = self.load_byte(address, CycleKind::NonSequential);
        if self.abort_signal().is_none() {
            self.store_byte(address, value, CycleKind::NonSequential);
        }
        old
    }

    /// `count` internal cycles with no memory traffic.
    fn internal_cycles(&mut self, _count: u32) {}

    /// `count` cycles spent waiting on a coprocessor.
    fn coprocessor_cycles(&mut self, _count: u32) {}

    /// Extra cycles an access costs on top of its bus cycle.
    fn wait_states(&self, _address: u32, _width: AccessWidth, _cycle: CycleKind) -> u32 {
        0
    }
}

impl<T: MemoryInterface + ?Sized> MemoryInterface for &mut T {
    fn load_word(&mut self, address: u32, cycle: CycleKind) -> u32 {
        (**self).load_word(address, cycle)
    }

    fn load_half_word(&mut self, address: u32, cycle: CycleKind) -> u16 {
        (**self).load_half_word(address, cycle)
    }

    fn load_byte(&mut self, address: u32, cycle: CycleKind) -> u8 {
        (**self).load_byte(address, cycle)
    }

    fn store_word(&mut self, address: u32, value: u32, cycle: CycleKind) {
        (**self).store_word(address, value, cycle);
    }

    fn store_half_word(&mut self, address: u32, value: u16, cycle: CycleKind) {
        (**self).store_half_word(address, value, cycle);
    }

    fn store_byte(&mut self, address: u32, value: u8, cycle: CycleKind) {
        (**self).store_byte(address, value, cycle);
    }

    fn abort_signal(&self) -> Option<u32> {
        (**self).abort_signal()
    }

    fn clear_abort(&mut self) {
        (**self).clear_abort();
    }

    fn read_word(&self, address: u32) -> Option<u32> {
        (**self).read_word(address)
    }

    fn read_byte(&self, address: u32) -> Option<u8> {
        (**self).read_byte(address)
    }

    fn write_word(&mut self, address: u32, value: u32) -> bool {
        (**self).write_word(address, value)
    }

    fn write_byte(&mut self, address: u32, value: u8) -> bool {
        (**self).write_byte(address, value)
    }

    fn load_instruction(&mut self, address: u32, width: AccessWidth, cycle: CycleKind) -> u32 {
        (**self).load_instruction(address, width, cycle)
    }

    fn swap_word(&mut self, address: u32, value: u32) -> u32 {
        (**self).swap_word(address, value)
    }

    fn swap_byte(&mut self, address: u32, value: u8) -> u8 {
        (**self).swap_byte(address, value)
    }

    fn internal_cycles(&mut self, count: u32) {
        (**self).internal_cycles(count);
    }

    fn coprocessor_cycles(&mut self, count: u32) {
        (**self).coprocessor_cycles(count);
    }

    fn wait_states(&self, address: u32, width: AccessWidth, cycle: CycleKind) -> u32 {
        (**self).wait_states(address, width, cycle)
    }
}
