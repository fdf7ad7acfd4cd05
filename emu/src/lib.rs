//! ARMv4T (ARM7TDMI) instruction-level emulation core.
//!
//! [`session::Session`] is the usual entry point: it binds a flat memory
//! to an [`cpu::arm7tdmi::Arm7tdmi`] and drives it. Hosts that bring their
//! own memory system implement [`bus::MemoryInterface`] and use the
//! processor directly.

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
pub mod bitwise;

#[allow(clippy::cast_lossless)]
pub mod bus;
pub mod config;
pub mod cpu;
pub mod error;
pub mod logging;
pub mod memory;
pub mod session;
