//! # Coprocessor Dispatch
//!
//! Sixteen slots, each optionally bound to a [`Coprocessor`]. CDP, MRC,
//! MCR, LDC and STC carry the slot number in bits 11-8; an empty slot or a
//! handler answering [`CopResponse::NotHandled`] turns the instruction into
//! an undefined-instruction exception.

use crate::error::InitError;

pub const COPROCESSOR_SLOTS: usize = 16;

/// A coprocessor's answer to one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopResponse<T> {
    Handled(T),
    /// Refused: the engine raises an undefined-instruction exception.
    NotHandled,
    /// Accepted but failed: the engine raises a data abort.
    Fault,
}

/// Whether an LDC/STC wants another word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    More,
    Last,
}

/// Operation set of one coprocessor. Every operation receives the full
/// instruction word and decodes the fields it cares about.
pub trait Coprocessor {
    /// Called when bound. `false` refuses the binding.
    fn init(&mut self) -> bool {
        true
    }

    /// Called when unbound or when the session goes away.
    fn exit(&mut self) {}

    fn cdp(&mut self, _instruction: u32) -> CopResponse<()> {
        CopResponse::NotHandled
    }

    /// Coprocessor to ARM register.
    fn mrc(&mut self, _instruction: u32) -> CopResponse<u32> {
        CopResponse::NotHandled
    }

    /// ARM register to coprocessor.
    fn mcr(&mut self, _instruction: u32, _value: u32) -> CopResponse<()> {
        CopResponse::NotHandled
    }

    /// Asked once before an LDC/STC touches memory.
    fn accepts_transfer(&mut self, _instruction: u32) -> CopResponse<()> {
        CopResponse::NotHandled
    }

    /// Word `index` of an LDC.
    fn ldc(&mut self, _instruction: u32, _index: usize, _value: u32) -> CopResponse<Transfer> {
        CopResponse::NotHandled
    }

    /// Word `index` of an STC.
    fn stc(&mut self, _instruction: u32, _index: usize) -> CopResponse<(u32, Transfer)> {
        CopResponse::NotHandled
    }

    /// Debugger access to coprocessor register `register`.
    fn read_register(&mut self, _register: u32) -> Option<u32> {
        None
    }

    fn write_register(&mut self, _register: u32, _value: u32) -> bool {
        false
    }
}

pub struct CoprocessorTable<'h> {
    slots: [Option<&'h mut dyn Coprocessor>; COPROCESSOR_SLOTS],
}

impl Default for CoprocessorTable<'_> {
    fn default() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }
}

impl std::fmt::Debug for CoprocessorTable<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bound = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(n, slot)| slot.as_ref().map(|_| n))
            .collect::<Vec<_>>();
        f.debug_struct("CoprocessorTable").field("bound", &bound).finish()
    }
}

impl<'h> CoprocessorTable<'h> {
    /// Binds `coprocessor` to slot `number`, replacing (and exiting) any
    /// previous one.
    ///
    /// # Errors
    ///
    /// [`InitError::Coprocessor`] for a slot above 15 or when `init` refuses.
    pub fn bind(&mut self, number: u32, coprocessor: &'h mut dyn Coprocessor) -> Result<(), InitError> {
        let slot = self
            .slots
            .get_mut(number as usize)
            .ok_or(InitError::Coprocessor(number))?;

        if !coprocessor.init() {
            return Err(InitError::Coprocessor(number));
        }

        if let Some(previous) = slot.replace(coprocessor) {
            previous.exit();
        }

        tracing::debug!("coprocessor {number} bound");
        Ok(())
    }

    /// Calls `exit` and empties the slot.
    pub fn unbind(&mut self, number: u32) -> Option<&'h mut dyn Coprocessor> {
        let coprocessor = self.slots.get_mut(number as usize)?.take()?;
        coprocessor.exit();
        tracing::debug!("coprocessor {number} unbound");
        Some(coprocessor)
    }

    pub fn get(&mut self, number: u32) -> Option<&mut (dyn Coprocessor + 'h)> {
        self.slots.get_mut(number as usize)?.as_deref_mut()
    }

    #[must_use]
    pub fn is_bound(&self, number: u32) -> bool {
        self.slots
            .get(number as usize)
            .is_some_and(Option::is_some)
    }

    pub fn read_register(&mut self, number: u32, register: u32) -> Option<u32> {
        self.get(number)?.read_register(register)
    }

    pub fn write_register(&mut self, number: u32, register: u32, value: u32) -> bool {
        self.get(number)
            .is_some_and(|coprocessor| coprocessor.write_register(register, value))
    }

    pub fn release_all(&mut self) {
        for number in 0..COPROCESSOR_SLOTS as u32 {
            self.unbind(number);
        }
    }
}

impl Drop for CoprocessorTable<'_> {
    fn drop(&mut self) {
        self.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Scratch {
        registers: [u32; 16],
        exited: bool,
        refuse_init: bool,
    }

    impl Coprocessor for Scratch {
        fn init(&mut self) -> bool {
            !self.refuse_init
        }

        fn exit(&mut self) {
            self.exited = true;
        }

        fn read_register(&mut self, register: u32) -> Option<u32> {
            self.registers.get(register as usize).copied()
        }

        fn write_register(&mut self, register: u32, value: u32) -> bool {
            self.registers
                .get_mut(register as usize)
                .map(|r| *r = value)
                .is_some()
        }
    }

    #[test]
    fn slots_start_unbound() {
        let mut table = CoprocessorTable::default();
        assert!(!table.is_bound(15));
        assert!(table.get(3).is_none());
        assert_eq!(table.read_register(3, 0), None);
        assert!(!table.write_register(3, 0, 1));
    }

    #[test]
    fn bind_exposes_raw_registers() {
        let mut scratch = Scratch::default();
        {
            let mut table = CoprocessorTable::default();
            table.bind(7, &mut scratch).unwrap();
            assert!(table.is_bound(7));
            assert!(table.write_register(7, 2, 0xCAFE));
            assert_eq!(table.read_register(7, 2), Some(0xCAFE));
        }
        assert!(scratch.exited);
        assert_eq!(scratch.registers[2], 0xCAFE);
    }

    #[test]
    fn refused_or_out_of_range_bindings_fail() {
        let mut refusing = Scratch {
            refuse_init: true,
            ..Default::default()
        };
        let mut other = Scratch::default();
        let mut table = CoprocessorTable::default();
        assert!(matches!(table.bind(1, &mut refusing), Err(InitError::Coprocessor(1))));
        assert!(!table.is_bound(1));
        assert!(matches!(table.bind(16, &mut other), Err(InitError::Coprocessor(16))));
    }

    #[test]
    fn unbind_calls_exit() {
        let mut scratch = Scratch::default();
        let mut table = CoprocessorTable::default();
        table.bind(4, &mut scratch).unwrap();
        let released = table.unbind(4);
        assert!(released.is_some());
        assert!(!table.is_bound(4));
        assert_eq!(table.unbind(4).map(|_| ()), None);
    }
}
