//! Little-endian RAM covering `0..size`, with a fixed wait-state cost per
//! cycle type. Accesses past the end raise the abort latch.

use serde::{Deserialize, Serialize};

use crate::bus::{AccessWidth, CycleKind, MemoryInterface};
use crate::cpu::exception::AbortKind;
use crate::error::{CpuError, InitError};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitStates {
    pub sequential: u32,
    pub non_sequential: u32,
}

#[derive(Debug, Default)]
pub struct FlatMemory {
    data: Vec<u8>,
    abort: Option<u32>,
    wait_states: WaitStates,
}

impl FlatMemory {
    /// Binds `size` bytes of zeroed memory.
    ///
    /// # Errors
    ///
    /// [`InitError::InvalidMemorySize`] unless `size` is a non-zero multiple
    /// of 4, [`InitError::MemoryExhausted`] when the allocation fails.
    pub fn with_size(size: usize) -> Result<Self, InitError> {
        if size == 0 || size % 4 != 0 {
            return Err(InitError::InvalidMemorySize(size));
        }

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|source| InitError::MemoryExhausted { size, source })?;
        data.resize(size, 0);

        tracing::debug!("bound {size} bytes of memory");

        Ok(Self {
            data,
            ..Default::default()
        })
    }

    #[must_use]
    pub fn with_wait_states(mut self, wait_states: WaitStates) -> Self {
        self.wait_states = wait_states;
        self
    }

    /// Frees the backing store. Every later access aborts.
    pub fn release(&mut self) {
        tracing::debug!("released {} bytes of memory", self.data.len());
        self.data = Vec::new();
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Copies `bytes` in at `address`.
    ///
    /// # Errors
    ///
    /// A data [`CpuError::MemoryAbort`] at the first byte that does not fit.
    pub fn load_image(&mut self, address: u32, bytes: &[u8]) -> Result<(), CpuError> {
        let start = address as usize;
        let end = start.saturating_add(bytes.len());
        if end > self.data.len() {
            return Err(CpuError::MemoryAbort {
                kind: AbortKind::Data,
                address: u32::try_from(self.data.len().max(start)).unwrap_or(u32::MAX),
            });
        }

        self.data[start..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Index of the aligned access, if it fits.
    fn offset(&self, address: u32, width: AccessWidth) -> Option<usize> {
        let size = width.size();
        let aligned = (address & !(size - 1)) as usize;
        (aligned + size as usize <= self.data.len()).then_some(aligned)
    }

    fn signal(&mut self, address: u32) {
        if self.abort.is_none() {
            self.abort = Some(address);
        }
    }

    fn read(&self, address: u32, width: AccessWidth) -> Option<u32> {
        let o = self.offset(address, width)?;
        let d = &self.data;
        Some(match width {
            AccessWidth::Byte => u32::from(d[o]),
            AccessWidth::HalfWord => u32::from(u16::from_le_bytes([d[o], d[o + 1]])),
            AccessWidth::Word => u32::from_le_bytes([d[o], d[o + 1], d[o + 2], d[o + 3]]),
        })
    }

    fn write(&mut self, address: u32, value: u32, width: AccessWidth) -> bool {
        let Some(o) = self.offset(address, width) else {
            return false;
        };

        let bytes = value.to_le_bytes();
        let len = width.size() as usize;
        self.data[o..o + len].copy_from_slice(&bytes[..len]);
        true
    }

    fn load(&mut self, address: u32, width: AccessWidth) -> u32 {
        self.read(address, width).unwrap_or_else(|| {
            self.signal(address);
            0
        })
    }

    fn store(&mut self, address: u32, value: u32, width: AccessWidth) {
        if !self.write(address, value, width) {
            self.signal(address);
        }
    }
}

impl MemoryInterface for FlatMemory {
    fn load_word(&mut self, address: u32, _cycle: CycleKind) -> u32 {
        self.load(address, AccessWidth::Word)
    }

    fn load_half_word(&mut self, address: u32, _cycle: CycleKind) -> u16 {
        self.load(address, AccessWidth::HalfWord) as u16
    }

    fn load_byte(&mut self, address: u32, _cycle: CycleKind) -> u8 {
        self.load(address, AccessWidth::Byte) as u8
    }

    fn store_word(&mut self, address: u32, value: u32, _cycle: CycleKind) {
        self.store(address, value, AccessWidth::Word);
    }

    fn store_half_word(&mut self, address: u32, value: u16, _cycle: CycleKind) {
        self.store(address, value.into(), AccessWidth::HalfWord);
    }

    fn store_byte(&mut self, address: u32, value: u8, _cycle: CycleKind) {
        self.store(address, value.into(), AccessWidth::Byte);
    }

    fn abort_signal(&self) -> Option<u32> {
        self.abort
    }

    fn clear_abort(&mut self) {
        self.abort = None;
    }

    fn read_word(&self, address: u32) -> Option<u32> {
        self.read(address, AccessWidth::Word)
    }

    fn read_byte(&self, address: u32) -> Option<u8> {
        self.read(address, AccessWidth::Byte).map(|b| b as u8)
    }

    fn write_word(&mut self, address: u32, value: u32) -> bool {
        self.write(address, value, AccessWidth::Word)
    }

    fn write_byte(&mut self, address: u32, value: u8) -> bool {
        self.write(address, value.into(), AccessWidth::Byte)
    }

    fn wait_states(&self, _address: u32, _width: AccessWidth, cycle: CycleKind) -> u32 {
        match cycle {
            CycleKind::Sequential => self.wait_states.sequential,
            CycleKind::NonSequential => self.wait_states.non_sequential,
            CycleKind::Internal | CycleKind::Coprocessor => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const N: CycleKind = CycleKind::NonSequential;

    #[test]
    fn size_must_be_a_non_zero_word_multiple() {
        assert!(matches!(FlatMemory::with_size(0), Err(InitError::InvalidMemorySize(0))));
        assert!(matches!(FlatMemory::with_size(6), Err(InitError::InvalidMemorySize(6))));
        assert_eq!(FlatMemory::with_size(0x100).map(|m| m.size()).ok(), Some(0x100));
    }

    #[test]
    fn little_endian_and_force_aligned() {
        let mut memory = FlatMemory::with_size(0x100).unwrap();
        memory.store_word(0x10, 0x1122_3344, N);

        assert_eq!(memory.load_byte(0x10, N), 0x44);
        assert_eq!(memory.load_byte(0x13, N), 0x11);
        assert_eq!(memory.load_half_word(0x12, N), 0x1122);
        assert_eq!(memory.load_half_word(0x13, N), 0x1122);
        assert_eq!(memory.load_word(0x12, N), 0x1122_3344);

        memory.store_half_word(0x11, 0xBEEF, N);
        assert_eq!(memory.load_word(0x10, N), 0x1122_BEEF);
        assert_eq!(memory.abort_signal(), None);
    }

    #[test]
    fn out_of_range_access_latches_the_first_address() {
        let mut memory = FlatMemory::with_size(0x10).unwrap();
        assert_eq!(memory.load_word(0x10, N), 0);
        memory.store_byte(0x20, 1, N);
        assert_eq!(memory.abort_signal(), Some(0x10));

        memory.clear_abort();
        assert_eq!(memory.abort_signal(), None);
    }

    #[test]
    fn swap_returns_the_old_value() {
        let mut memory = FlatMemory::with_size(0x10).unwrap();
        memory.store_word(0x4, 7, N);
        assert_eq!(memory.swap_word(0x4, 9), 7);
        assert_eq!(memory.read_word(0x4), Some(9));
        assert_eq!(memory.swap_byte(0x4, 1), 9);
        assert_eq!(memory.read_byte(0x4), Some(1));
    }

    #[test]
    fn raw_access_never_latches() {
        let mut memory = FlatMemory::with_size(0x10).unwrap();
        assert_eq!(memory.read_word(0x100), None);
        assert!(!memory.write_byte(0x10, 1));
        assert!(memory.write_byte(0xF, 1));
        assert_eq!(memory.abort_signal(), None);
    }

    #[test]
    fn released_memory_aborts() {
        let mut memory = FlatMemory::with_size(0x10).unwrap();
        memory.release();
        assert_eq!(memory.size(), 0);
        memory.load_word(0, N);
        assert_eq!(memory.abort_signal(), Some(0));
    }

    #[test]
    fn images_must_fit() {
        let mut memory = FlatMemory::with_size(0x8).unwrap();
        assert_eq!(memory.load_image(4, &[1, 2, 3, 4]), Ok(()));
        assert_eq!(memory.read_word(4), Some(0x0403_0201));
        assert_eq!(
            memory.load_image(6, &[1, 2, 3, 4]),
            Err(CpuError::MemoryAbort {
                kind: AbortKind::Data,
                address: 8
            })
        );
    }

    #[test]
    fn wait_states_by_cycle_kind() {
        let memory = FlatMemory::with_size(0x8).unwrap().with_wait_states(WaitStates {
            sequential: 1,
            non_sequential: 3,
        });
        assert_eq!(memory.wait_states(0, AccessWidth::Word, CycleKind::Sequential), 1);
        assert_eq!(memory.wait_states(0, AccessWidth::Word, N), 3);
        assert_eq!(memory.wait_states(0, AccessWidth::Word, CycleKind::Internal), 0);
    }
}
