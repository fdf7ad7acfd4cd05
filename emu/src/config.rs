//! # Session Configuration
//!
//! Everything a host would otherwise keep in process-wide flags (banner
//! printing, logging, vector catching, processor variant) lives in an
//! [`EmulatorConfig`] handed to the session when it is created.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default backing store: 8 MiB, enough for the usual bare-metal images.
pub const DEFAULT_MEMORY_SIZE: usize = 0x0080_0000;

/// Architectural features the emulated part implements.
///
/// Mirrors the property bits a host selects a processor variant with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorProperties {
    /// `ARMv4` extensions: halfword transfers, BX, Thumb and System mode.
    pub v4: bool,
    /// SWP/SWPB are implemented.
    pub lock: bool,
    /// The debug hook is consulted on every instruction.
    pub debug: bool,
    /// Conditionally skipped instructions are still reported to the debug hook.
    pub nexec: bool,
}

impl Default for ProcessorProperties {
    fn default() -> Self {
        Self {
            v4: true,
            lock: true,
            debug: false,
            nexec: false,
        }
    }
}

/// Where log lines end up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogTarget {
    #[default]
    Stdout,
    /// A single file written through a non-blocking appender.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Size in bytes of the flat backing store bound at session creation.
    pub memory_size: usize,

    /// One bit per vector (`offset / 4`): a set bit stops the run instead of
    /// entering that exception.
    pub vector_catch: u8,

    /// Print the startup banner.
    pub verbose: bool,

    /// `EnvFilter` directives used when `RUST_LOG` is not set.
    pub log_filter: String,

    pub log_target: LogTarget,

    pub properties: ProcessorProperties,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            memory_size: DEFAULT_MEMORY_SIZE,
            vector_catch: 0,
            verbose: false,
            log_filter: String::from("info"),
            log_target: LogTarget::default(),
            properties: ProcessorProperties::default(),
        }
    }
}

impl EmulatorConfig {
    #[must_use]
    pub const fn with_memory_size(mut self, memory_size: usize) -> Self {
        self.memory_size = memory_size;
        self
    }

    #[must_use]
    pub const fn with_vector_catch(mut self, mask: u8) -> Self {
        self.vector_catch = mask;
        self
    }

    #[must_use]
    pub const fn with_properties(mut self, properties: ProcessorProperties) -> Self {
        self.properties = properties;
        self
    }
}
