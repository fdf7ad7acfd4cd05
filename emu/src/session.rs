//! A processor bound to its own flat memory, the way a host drives it.

use tracing_appender::non_blocking::WorkerGuard;

use crate::config::EmulatorConfig;
use crate::cpu::arm7tdmi::{Arm7tdmi, StopReason};
use crate::error::{CpuError, InitError};
use crate::logging;
use crate::memory::flat_memory::FlatMemory;

const BANNER: &str = concat!("armulator ", env!("CARGO_PKG_VERSION"), " (ARM7TDMI, ARMv4T)");

pub struct Session<'h> {
    pub cpu: Arm7tdmi<'h, FlatMemory>,
}

impl<'h> Session<'h> {
    /// Allocates a zeroed processor with `config.memory_size` bytes of
    /// memory bound, in the reset state.
    ///
    /// # Errors
    ///
    /// Whatever [`FlatMemory::with_size`] reports.
    pub fn new(config: &EmulatorConfig) -> Result<Self, InitError> {
        let memory = FlatMemory::with_size(config.memory_size)?;
        Ok(Self {
            cpu: Arm7tdmi::new(memory, config),
        })
    }

    /// One-time process setup: installs logging and prints the banner.
    ///
    /// Hold on to the returned guard when logging to a file.
    ///
    /// # Errors
    ///
    /// [`InitError::Logging`] when called twice.
    pub fn global_init(config: &EmulatorConfig) -> Result<Option<WorkerGuard>, InitError> {
        let guard = logging::init(config)?;
        if config.verbose {
            tracing::info!("{BANNER}");
        }
        Ok(guard)
    }

    /// Replaces the backing store with `size` fresh zeroed bytes.
    ///
    /// # Errors
    ///
    /// On failure the old memory stays bound.
    pub fn bind_memory(&mut self, size: usize) -> Result<(), InitError> {
        self.cpu.bus = FlatMemory::with_size(size)?;
        Ok(())
    }

    pub fn release_memory(&mut self) {
        self.cpu.bus.release();
    }

    /// Copies a raw binary image into memory.
    ///
    /// # Errors
    ///
    /// A data abort when the image does not fit.
    pub fn load_image(&mut self, address: u32, bytes: &[u8]) -> Result<(), CpuError> {
        self.cpu.bus.load_image(address, bytes)
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    pub fn run(&mut self) -> StopReason {
        self.cpu.run()
    }

    pub fn run_for(&mut self, budget: u64) -> StopReason {
        self.cpu.run_for(budget)
    }

    pub fn step(&mut self) -> Option<StopReason> {
        self.cpu.step()
    }
}
