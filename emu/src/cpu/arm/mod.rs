//! 32-bit ARM state.
//!
//! Every word carries a condition in its top nibble, the rest is picked
//! apart by bits 27..25 (and a few more inside the `000` group):
//!
//! ```text
//! 000  data processing (register operand), MUL/MLA, MULL/MLAL, SWP,
//!      LDRH/STRH/LDRSB/LDRSH, MRS/MSR, BX
//! 001  data processing (immediate operand), MSR immediate
//! 01x  LDR/STR, with bit 4 set under 011 the undefined space
//! 100  LDM/STM
//! 101  B/BL
//! 110  LDC/STC
//! 1110 CDP (bit 4 clear), MCR/MRC (bit 4 set)
//! 1111 SWI
//! ```
//!
//! [`instructions`] turns a word into an [`ArmModeInstruction`](instructions::ArmModeInstruction),
//! [`operations`] runs it against the core and [`alu_instruction`] holds
//! the data processing opcodes and the shifter operand encodings.

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_lossless)]
pub mod alu_instruction;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::similar_names)]
pub mod instructions;

#[allow(clippy::cast_possible_truncation)]
#[allow(clippy::cast_sign_loss)]
#[allow(clippy::cast_possible_wrap)]
#[allow(clippy::cast_lossless)]
#[allow(clippy::similar_names)]
pub mod operations;
