//! 16-bit Thumb state, entered by BX to an odd address or by restoring an
//! SPSR with T set.
//!
//! Thumb opcodes reuse the ARM execution paths wherever one exists: loads
//! and stores, LDM/STM and branches all go through the same helpers as
//! their ARM counterparts with the Thumb-implied fields filled in. r15
//! reads as the instruction address plus 4.

pub mod alu_instructions;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_lossless)]
pub mod instruction;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_lossless)]
pub mod operations;
