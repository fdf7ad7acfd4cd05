//! # Prefetch Pipeline
//!
//! The ARM7TDMI overlaps fetch, decode and execute. Two shadow slots model
//! the overlap: while the instruction in `decoded` executes, the one in
//! `loaded` has already been fetched.
//!
//! ```text
//!            fetch        decode       execute
//! step n     pc+2s  ───►  pc+s   ───►  pc
//!                         (loaded)     (decoded)
//! ```
//!
//! Any write to PC, mode switch or state switch empties both slots; the next
//! step refills them starting with a non-sequential fetch.

use serde::{Deserialize, Serialize};

use crate::bus::CycleKind;

/// One fetched instruction word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prefetched {
    pub address: u32,
    pub raw: u32,
    /// The fetch was refused by memory. Only raises a prefetch abort if the
    /// slot reaches execute.
    pub aborted: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    decoded: Option<Prefetched>,
    loaded: Option<Prefetched>,

    /// Address that continues the fetch stream.
    next_fetch: Option<u32>,
}

impl Pipeline {
    #[must_use]
    pub const fn is_primed(&self) -> bool {
        self.decoded.is_some() && self.loaded.is_some()
    }

    pub const fn flush(&mut self) {
        self.decoded = None;
        self.loaded = None;
        self.next_fetch = None;
    }

    /// Bus cycle for a fetch from `address`.
    #[must_use]
    pub fn fetch_cycle(&self, address: u32) -> CycleKind {
        if self.next_fetch == Some(address) {
            CycleKind::Sequential
        } else {
            CycleKind::NonSequential
        }
    }

    /// Records a fetch of `size` bytes and returns the slot for it.
    pub const fn fetched(&mut self, address: u32, raw: u32, size: u32, aborted: bool) -> Prefetched {
        self.next_fetch = Some(address.wrapping_add(size));
        Prefetched {
            address,
            raw,
            aborted,
        }
    }

    /// Fills both slots after a flush.
    pub const fn prime(&mut self, decoded: Prefetched, loaded: Prefetched) {
        self.decoded = Some(decoded);
        self.loaded = Some(loaded);
    }

    /// Address the next fetch will come from, once primed.
    #[must_use]
    pub fn prefetch_address(&self, size: u32) -> Option<u32> {
        self.loaded.map(|slot| slot.address.wrapping_add(size))
    }

    /// Shifts `loaded` into `decoded`, puts `incoming` in `loaded` and hands
    /// back the instruction to execute.
    pub const fn advance(&mut self, incoming: Prefetched) -> Option<Prefetched> {
        let executing = self.decoded;
        self.decoded = self.loaded;
        self.loaded = Some(incoming);
        executing
    }

    #[must_use]
    pub const fn decoded(&self) -> Option<Prefetched> {
        self.decoded
    }

    #[must_use]
    pub const fn loaded(&self) -> Option<Prefetched> {
        self.loaded
    }
}
