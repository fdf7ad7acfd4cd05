//! # Thumb decoding
//!
//! Bits 11-15 pick the format; a few formats then look at one or two
//! more bits.
//!
//! ```text
//!  15 14 13 12 11 | format
//! ----------------+-----------------------------------------------
//!  0  0  0  x  x  | shift by immediate (xx != 11)
//!  0  0  0  1  1  | add / subtract, register or 3-bit immediate
//!  0  0  1  x  x  | MOV / CMP / ADD / SUB with 8-bit immediate
//!  0  1  0  0  0  | ALU (bit 10 clear) or high registers / BX
//!  0  1  0  0  1  | LDR Rd, [PC, #imm]
//!  0  1  0  1  x  | register offset (bit 9 selects the signed forms)
//!  0  1  1  x  x  | LDR / STR / LDRB / STRB, immediate offset
//!  1  0  0  0  x  | LDRH / STRH, immediate offset
//!  1  0  0  1  x  | SP-relative LDR / STR
//!  1  0  1  0  x  | ADD Rd, PC|SP, #imm
//!  1  0  1  1  x  | ADD SP, #imm / PUSH / POP
//!  1  1  0  0  x  | LDMIA / STMIA
//!  1  1  0  1  x  | Bcc, SWI when cond is 1111
//!  1  1  1  0  0  | B
//!  1  1  1  1  x  | BL, one half at a time
//! ```
//!
//! Encodings with no ARMv4T meaning decode to [`Instruction::Undefined`]:
//! the BLX forms, condition 1110 in a conditional branch, and the `1011`
//! space outside ADD SP and PUSH/POP.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::condition::Condition;
use crate::cpu::flags::{HalfwordTransferKind, LoadStoreKind, OperandKind, ReadWriteKind, ShiftKind};
use crate::cpu::thumb::alu_instructions::{
    Operation, ThumbHighRegisterOperation, ThumbModeAluInstruction,
};

#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum Instruction {
    ShiftImmediate {
        kind: ShiftKind,
        amount: u16,
        rs: u16,
        rd: u16,
    },
    AddSubtract {
        operand: OperandKind,
        subtract: bool,
        /// Register number or 3-bit immediate, depending on `operand`.
        rn: u16,
        rs: u16,
        rd: u16,
    },
    Immediate {
        operation: Operation,
        rd: u16,
        value: u32,
    },
    Alu {
        operation: ThumbModeAluInstruction,
        rs: u16,
        rd: u16,
    },
    /// `rs` and `rd` are full 4-bit register numbers.
    HighRegister {
        operation: ThumbHighRegisterOperation,
        rs: u16,
        rd: u16,
    },
    LoadLiteral {
        rd: u16,
        offset: u16,
    },
    TransferRegister {
        load_store: LoadStoreKind,
        width: ReadWriteKind,
        ro: u16,
        rb: u16,
        rd: u16,
    },
    /// STRH, LDRH, LDSB and LDSH with a register offset.
    TransferSigned {
        load_store: LoadStoreKind,
        kind: HalfwordTransferKind,
        ro: u16,
        rb: u16,
        rd: u16,
    },
    TransferImmediate {
        load_store: LoadStoreKind,
        width: ReadWriteKind,
        offset: u16,
        rb: u16,
        rd: u16,
    },
    TransferHalfword {
        load_store: LoadStoreKind,
        offset: u16,
        rb: u16,
        rd: u16,
    },
    TransferStack {
        load_store: LoadStoreKind,
        rd: u16,
        offset: u16,
    },
    AddressOf {
        from_sp: bool,
        rd: u16,
        offset: u32,
    },
    AdjustStack {
        offset: i32,
    },
    /// PUSH may add LR, POP may add PC.
    PushPop {
        load_store: LoadStoreKind,
        extra: bool,
        list: u16,
    },
    Multiple {
        load_store: LoadStoreKind,
        rb: u16,
        list: u16,
    },
    BranchConditional {
        condition: Condition,
        offset: i32,
    },
    SoftwareInterrupt {
        comment: u16,
    },
    Branch {
        offset: i32,
    },
    /// `low` is the second half, which links and jumps.
    BranchLink {
        low: bool,
        offset: u32,
    },
    Undefined,
}

const fn signed_kind(sign_extend: bool, half: bool) -> (LoadStoreKind, HalfwordTransferKind) {
    match (sign_extend, half) {
        (false, false) => (LoadStoreKind::Store, HalfwordTransferKind::UnsignedHalfwords),
        (false, true) => (LoadStoreKind::Load, HalfwordTransferKind::UnsignedHalfwords),
        (true, false) => (LoadStoreKind::Load, HalfwordTransferKind::SignedByte),
        (true, true) => (LoadStoreKind::Load, HalfwordTransferKind::SignedHalfwords),
    }
}

impl Instruction {
    fn decode_register_offset(op_code: u16) -> Self {
        let ro = op_code.get_bits(6..=8);
        let rb = op_code.get_bits(3..=5);
        let rd = op_code.get_bits(0..=2);

        if op_code.get_bit(9) {
            let (load_store, kind) = signed_kind(op_code.get_bit(10), op_code.get_bit(11));
            Self::TransferSigned {
                load_store,
                kind,
                ro,
                rb,
                rd,
            }
        } else {
            Self::TransferRegister {
                load_store: op_code.get_bit(11).into(),
                width: op_code.get_bit(10).into(),
                ro,
                rb,
                rd,
            }
        }
    }

    fn decode_special_data(op_code: u16) -> Self {
        if !op_code.get_bit(10) {
            return Self::Alu {
                operation: op_code.get_bits(6..=9).into(),
                rs: op_code.get_bits(3..=5),
                rd: op_code.get_bits(0..=2),
            };
        }

        let operation = ThumbHighRegisterOperation::from(op_code.get_bits(8..=9));
        let h1 = op_code.get_bit(7);
        if operation == ThumbHighRegisterOperation::Bx && h1 {
            return Self::Undefined;
        }

        Self::HighRegister {
            operation,
            rs: op_code.get_bits(3..=6),
            rd: op_code.get_bits(0..=2) | (u16::from(h1) << 3),
        }
    }

    /// The `1011` space.
    fn decode_miscellaneous(op_code: u16) -> Self {
        if op_code.get_bits(8..=11) == 0 {
            let magnitude = i32::from(op_code.get_bits(0..=6) << 2);
            Self::AdjustStack {
                offset: if op_code.get_bit(7) {
                    -magnitude
                } else {
                    magnitude
                },
            }
        } else if op_code.get_bits(9..=10) == 0b10 {
            Self::PushPop {
                load_store: op_code.get_bit(11).into(),
                extra: op_code.get_bit(8),
                list: op_code.get_bits(0..=7),
            }
        } else {
            Self::Undefined
        }
    }

    fn decode_conditional(op_code: u16) -> Self {
        match op_code.get_bits(8..=11) {
            0xE => Self::Undefined,
            0xF => Self::SoftwareInterrupt {
                comment: op_code.get_bits(0..=7),
            },
            condition => Self::BranchConditional {
                condition: Condition::from(condition as u8),
                offset: (u32::from(op_code.get_bits(0..=7)) << 1).sign_extended(9) as i32,
            },
        }
    }
}

impl From<u16> for Instruction {
    fn from(op_code: u16) -> Self {
        let rb = op_code.get_bits(3..=5);
        let rd = op_code.get_bits(0..=2);
        let load_store = LoadStoreKind::from(op_code.get_bit(11));

        match op_code.get_bits(11..=15) {
            0b00011 => Self::AddSubtract {
                operand: op_code.get_bit(10).into(),
                subtract: op_code.get_bit(9),
                rn: op_code.get_bits(6..=8),
                rs: rb,
                rd,
            },
            0b00000..=0b00010 => Self::ShiftImmediate {
                kind: op_code.get_bits(11..=12).into(),
                amount: op_code.get_bits(6..=10),
                rs: rb,
                rd,
            },
            0b00100..=0b00111 => Self::Immediate {
                operation: op_code.get_bits(11..=12).into(),
                rd: op_code.get_bits(8..=10),
                value: op_code.get_bits(0..=7).into(),
            },
            0b01000 => Self::decode_special_data(op_code),
            0b01001 => Self::LoadLiteral {
                rd: op_code.get_bits(8..=10),
                offset: op_code.get_bits(0..=7) << 2,
            },
            0b01010 | 0b01011 => Self::decode_register_offset(op_code),
            0b01100..=0b01111 => {
                let width = ReadWriteKind::from(op_code.get_bit(12));
                let scale = match width {
                    ReadWriteKind::Word => 2,
                    ReadWriteKind::Byte => 0,
                };
                Self::TransferImmediate {
                    load_store,
                    width,
                    offset: op_code.get_bits(6..=10) << scale,
                    rb,
                    rd,
                }
            }
            0b10000 | 0b10001 => Self::TransferHalfword {
                load_store,
                offset: op_code.get_bits(6..=10) << 1,
                rb,
                rd,
            },
            0b10010 | 0b10011 => Self::TransferStack {
                load_store,
                rd: op_code.get_bits(8..=10),
                offset: op_code.get_bits(0..=7) << 2,
            },
            0b10100 | 0b10101 => Self::AddressOf {
                from_sp: op_code.get_bit(11),
                rd: op_code.get_bits(8..=10),
                offset: u32::from(op_code.get_bits(0..=7)) << 2,
            },
            0b10110 | 0b10111 => Self::decode_miscellaneous(op_code),
            0b11000 | 0b11001 => Self::Multiple {
                load_store,
                rb: op_code.get_bits(8..=10),
                list: op_code.get_bits(0..=7),
            },
            0b11010 | 0b11011 => Self::decode_conditional(op_code),
            0b11100 => Self::Branch {
                offset: (u32::from(op_code.get_bits(0..=10)) << 1).sign_extended(12) as i32,
            },
            // BLX suffix, ARMv5 only.
            0b11101 => Self::Undefined,
            _ => Self::BranchLink {
                low: op_code.get_bit(11),
                offset: op_code.get_bits(0..=10).into(),
            },
        }
    }
}

/// `{R0,R4,LR}`
struct RegisterList {
    list: u16,
    extra: Option<&'static str>,
}

impl fmt::Display for RegisterList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = (0..8)
            .filter(|&r| self.list.get_bit(r))
            .map(|r| format!("R{r}"))
            .chain(self.extra.map(str::to_owned))
            .collect::<Vec<_>>();
        write!(f, "{{{}}}", names.join(","))
    }
}

const fn mnemonic(load_store: LoadStoreKind, width: ReadWriteKind) -> &'static str {
    match (load_store, width) {
        (LoadStoreKind::Load, ReadWriteKind::Word) => "LDR",
        (LoadStoreKind::Load, ReadWriteKind::Byte) => "LDRB",
        (LoadStoreKind::Store, ReadWriteKind::Word) => "STR",
        (LoadStoreKind::Store, ReadWriteKind::Byte) => "STRB",
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::ShiftImmediate { kind, amount, rs, rd } => write!(f, "{kind} R{rd}, R{rs}, #{amount}"),
            Self::AddSubtract {
                operand,
                subtract,
                rn,
                rs,
                rd,
            } => {
                let name = if subtract { "SUB" } else { "ADD" };
                match operand {
                    OperandKind::Immediate => write!(f, "{name} R{rd}, R{rs}, #{rn}"),
                    OperandKind::Register => write!(f, "{name} R{rd}, R{rs}, R{rn}"),
                }
            }
            Self::Immediate { operation, rd, value } => write!(f, "{operation} R{rd}, #{value}"),
            Self::Alu { operation, rs, rd } => write!(f, "{operation} R{rd}, R{rs}"),
            Self::HighRegister {
                operation: ThumbHighRegisterOperation::Bx,
                rs,
                ..
            } => write!(f, "BX R{rs}"),
            Self::HighRegister { operation, rs, rd } => write!(f, "{operation} R{rd}, R{rs}"),
            Self::LoadLiteral { rd, offset } => write!(f, "LDR R{rd}, [PC, #{offset}]"),
            Self::TransferRegister {
                load_store,
                width,
                ro,
                rb,
                rd,
            } => write!(f, "{} R{rd}, [R{rb}, R{ro}]", mnemonic(load_store, width)),
            Self::TransferSigned {
                load_store,
                kind,
                ro,
                rb,
                rd,
            } => {
                let name = match (load_store, kind) {
                    (LoadStoreKind::Store, _) => "STRH",
                    (LoadStoreKind::Load, HalfwordTransferKind::UnsignedHalfwords) => "LDRH",
                    (LoadStoreKind::Load, HalfwordTransferKind::SignedByte) => "LDSB",
                    (LoadStoreKind::Load, HalfwordTransferKind::SignedHalfwords) => "LDSH",
                };
                write!(f, "{name} R{rd}, [R{rb}, R{ro}]")
            }
            Self::TransferImmediate {
                load_store,
                width,
                offset,
                rb,
                rd,
            } => write!(f, "{} R{rd}, [R{rb}, #{offset}]", mnemonic(load_store, width)),
            Self::TransferHalfword {
                load_store,
                offset,
                rb,
                rd,
            } => write!(f, "{load_store}H R{rd}, [R{rb}, #{offset}]"),
            Self::TransferStack {
                load_store,
                rd,
                offset,
            } => write!(f, "{load_store} R{rd}, [SP, #{offset}]"),
            Self::AddressOf { from_sp, rd, offset } => {
                let base = if from_sp { "SP" } else { "PC" };
                write!(f, "ADD R{rd}, {base}, #{offset}")
            }
            Self::AdjustStack { offset } if offset < 0 => write!(f, "SUB SP, #{}", -offset),
            Self::AdjustStack { offset } => write!(f, "ADD SP, #{offset}"),
            Self::PushPop {
                load_store: LoadStoreKind::Store,
                extra,
                list,
            } => {
                let registers = RegisterList {
                    list,
                    extra: extra.then_some("LR"),
                };
                write!(f, "PUSH {registers}")
            }
            Self::PushPop { extra, list, .. } => {
                let registers = RegisterList {
                    list,
                    extra: extra.then_some("PC"),
                };
                write!(f, "POP {registers}")
            }
            Self::Multiple { load_store, rb, list } => {
                let name = match load_store {
                    LoadStoreKind::Load => "LDMIA",
                    LoadStoreKind::Store => "STMIA",
                };
                write!(f, "{name} R{rb}!, {}", RegisterList { list, extra: None })
            }
            Self::BranchConditional { condition, offset } => write!(f, "B{condition} {offset:+}"),
            Self::SoftwareInterrupt { comment } => write!(f, "SWI 0x{comment:02X}"),
            Self::Branch { offset } => write!(f, "B {offset:+}"),
            Self::BranchLink { low: false, offset } => {
                write!(f, "BL {:+}", (offset << 12).sign_extended(23) as i32)
            }
            Self::BranchLink { low: true, offset } => write!(f, "BL.LO #{}", offset << 1),
            Self::Undefined => f.write_str("UND"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::Rng;
    use rstest::rstest;

    fn decoded(op_code: u16) -> (Instruction, String) {
        let instruction = Instruction::from(op_code);
        (instruction, instruction.to_string())
    }

    #[test]
    fn shift_and_add_subtract_share_the_first_block() {
        assert_eq!(
            decoded(0b000_01_00011_010_001),
            (
                Instruction::ShiftImmediate {
                    kind: ShiftKind::Lsr,
                    amount: 3,
                    rs: 2,
                    rd: 1,
                },
                "LSR R1, R2, #3".to_owned()
            )
        );
        assert_eq!(decoded(0b00011_1_1_101_010_001).1, "SUB R1, R2, #5");
        assert_eq!(decoded(0b00011_0_0_011_010_001).1, "ADD R1, R2, R3");
    }

    #[test]
    fn eight_bit_immediates() {
        assert_eq!(
            Instruction::from(0b001_01_011_1111_1111),
            Instruction::Immediate {
                operation: Operation::Cmp,
                rd: 3,
                value: 0xFF,
            }
        );
    }

    #[rstest]
    #[case(0b0100_0011_0110_0000, ThumbModeAluInstruction::Mul, 4, 0, "MUL R0, R4")]
    #[case(0b0100_0000_0001_1000, ThumbModeAluInstruction::And, 3, 0, "AND R0, R3")]
    #[case(0b0100_0010_0011_1110, ThumbModeAluInstruction::Tst, 7, 6, "TST R6, R7")]
    #[case(0b0100_0011_1100_1111, ThumbModeAluInstruction::Mvn, 1, 7, "MVN R7, R1")]
    #[case(0b0100_0001_1110_0011, ThumbModeAluInstruction::Ror, 4, 3, "ROR R3, R4")]
    #[case(0b0100_0010_0100_0000, ThumbModeAluInstruction::Neg, 0, 0, "NEG R0, R0")]
    fn alu_operations(
        #[case] op_code: u16,
        #[case] operation: ThumbModeAluInstruction,
        #[case] rs: u16,
        #[case] rd: u16,
        #[case] text: &str,
    ) {
        assert_eq!(
            decoded(op_code),
            (Instruction::Alu { operation, rs, rd }, text.to_owned())
        );
    }

    #[test]
    fn high_register_operands_use_the_h_bits() {
        assert_eq!(
            decoded(0b010001_00_0_1_000_001),
            (
                Instruction::HighRegister {
                    operation: ThumbHighRegisterOperation::Add,
                    rs: 8,
                    rd: 1,
                },
                "ADD R1, R8".to_owned()
            )
        );
        assert_eq!(decoded(0b010001_10_1_0_011_111).1, "MOV R15, R3");
        assert_eq!(decoded(0b0100_0111_0111_0000).1, "BX R14");
    }

    #[test]
    fn pc_relative_load_scales_the_offset() {
        assert_eq!(
            decoded(0b01001_001_0101_1000),
            (
                Instruction::LoadLiteral { rd: 1, offset: 352 },
                "LDR R1, [PC, #352]".to_owned()
            )
        );
    }

    #[rstest]
    #[case(0b0101_00_0_000_001_010, "STR R2, [R1, R0]")]
    #[case(0b0101_11_0_000_001_010, "LDRB R2, [R1, R0]")]
    #[case(0b0101_00_1_001_010_011, "STRH R3, [R2, R1]")]
    #[case(0b0101_10_1_001_010_011, "LDRH R3, [R2, R1]")]
    #[case(0b0101_01_1_001_010_011, "LDSB R3, [R2, R1]")]
    #[case(0b0101_11_1_001_010_011, "LDSH R3, [R2, R1]")]
    fn register_offset_transfers(#[case] op_code: u16, #[case] text: &str) {
        assert_eq!(Instruction::from(op_code).to_string(), text);
    }

    #[test]
    fn signed_forms_carry_their_transfer_kind() {
        assert_eq!(
            Instruction::from(0b0101_01_1_001_010_011),
            Instruction::TransferSigned {
                load_store: LoadStoreKind::Load,
                kind: HalfwordTransferKind::SignedByte,
                ro: 1,
                rb: 2,
                rd: 3,
            }
        );
    }

    #[rstest]
    // Word offsets are stored >> 2, byte offsets as is.
    #[case(0b0110_1_00010_001_010, "LDR R2, [R1, #8]")]
    #[case(0b0110_0_00100_100_011, "STR R3, [R4, #16]")]
    #[case(0b0111_1_00111_110_101, "LDRB R5, [R6, #7]")]
    #[case(0b0111_0_00000_001_000, "STRB R0, [R1, #0]")]
    // Halfword offsets are stored >> 1.
    #[case(0b1000_1_00001_000_001, "LDRH R1, [R0, #2]")]
    #[case(0b1000_0_00001_000_001, "STRH R1, [R0, #2]")]
    #[case(0b1001_1_100_0000_0001, "LDR R4, [SP, #4]")]
    fn immediate_offset_transfers(#[case] op_code: u16, #[case] text: &str) {
        assert_eq!(Instruction::from(op_code).to_string(), text);
    }

    #[rstest]
    #[case(0b1010_1_010_0000_0010, "ADD R2, SP, #8")]
    #[case(0b1010_0_000_0000_0001, "ADD R0, PC, #4")]
    #[case(0b1011_0000_1000_0011, "SUB SP, #12")]
    #[case(0b1011_0000_0000_0011, "ADD SP, #12")]
    #[case(0b1011_0101_1111_0000, "PUSH {R4,R5,R6,R7,LR}")]
    #[case(0b1011_1101_0000_0001, "POP {R0,PC}")]
    #[case(0b1100_1001_1010_0000, "LDMIA R1!, {R5,R7}")]
    fn stack_and_multiple_transfers(#[case] op_code: u16, #[case] text: &str) {
        assert_eq!(Instruction::from(op_code).to_string(), text);
    }

    #[test]
    fn branch_offsets_are_sign_extended() {
        assert_eq!(
            Instruction::from(0b11100_001_0010_1111),
            Instruction::Branch { offset: 606 }
        );
        assert_eq!(
            Instruction::from(0b11100_111_1111_1110),
            Instruction::Branch { offset: -4 }
        );
        assert_eq!(
            decoded(0b1101_0001_1111_1100),
            (
                Instruction::BranchConditional {
                    condition: Condition::NE,
                    offset: -8,
                },
                "BNE -8".to_owned()
            )
        );
    }

    #[test]
    fn long_branch_halves() {
        assert_eq!(
            decoded(0b11110_000_0000_0001),
            (
                Instruction::BranchLink {
                    low: false,
                    offset: 1,
                },
                "BL +4096".to_owned()
            )
        );
        assert_eq!(
            Instruction::from(0b11111_000_0000_0010),
            Instruction::BranchLink { low: true, offset: 2 }
        );
    }

    #[rstest]
    #[case::swi(0b1101_1111_0001_0001, Instruction::SoftwareInterrupt { comment: 0x11 })]
    #[case::condition_always(0b1101_1110_0000_0000, Instruction::Undefined)]
    #[case::blx_register(0b0100_0111_1000_1000, Instruction::Undefined)]
    #[case::blx_suffix(0b1110_1000_0000_0000, Instruction::Undefined)]
    #[case::sign_extend(0b1011_0010_0000_0000, Instruction::Undefined)]
    #[case::breakpoint(0b1011_1110_0000_0000, Instruction::Undefined)]
    fn software_interrupt_and_undefined_space(#[case] op_code: u16, #[case] expected: Instruction) {
        assert_eq!(Instruction::from(op_code), expected);
    }

    #[test]
    fn every_half_word_decodes_and_prints() {
        let mut rng = rand::thread_rng();
        for _ in 0..10_000 {
            let op_code: u16 = rng.r#gen();
            assert!(!Instruction::from(op_code).to_string().is_empty());
        }
    }
}
