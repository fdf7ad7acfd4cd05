//! Classifies a 32-bit word and extracts its fields. Decoding never fails:
//! encodings the ARM7TDMI does not implement come out as
//! [`ArmModeInstruction::Undefined`].
//!
//! Checks run top to bottom, the first match wins:
//!
//! ```text
//! xxxx 0001 0010 1111 1111 1111 0001 xxxx   BX
//! xxxx 000x xxxx xxxx xxxx xxxx 1xx1 xxxx   multiply, swap, halfword
//! xxxx 011x xxxx xxxx xxxx xxxx xxx1 xxxx   undefined
//! xxxx 00xx xxxx xxxx xxxx xxxx xxxx xxxx   data processing, MRS, MSR
//! xxxx 01xx xxxx xxxx xxxx xxxx xxxx xxxx   LDR, STR
//! xxxx 100x xxxx xxxx xxxx xxxx xxxx xxxx   LDM, STM
//! xxxx 101x xxxx xxxx xxxx xxxx xxxx xxxx   B, BL
//! xxxx 110x xxxx xxxx xxxx xxxx xxxx xxxx   LDC, STC
//! xxxx 1110 xxxx xxxx xxxx xxxx xxx0 xxxx   CDP
//! xxxx 1110 xxxx xxxx xxxx xxxx xxx1 xxxx   MCR, MRC
//! xxxx 1111 xxxx xxxx xxxx xxxx xxxx xxxx   SWI
//! ```

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::arm::alu_instruction::{
    AluSecondOperandInfo, ArmModeAluInstr, PsrKind, PsrOpKind, ShiftOperator,
};
use crate::cpu::condition::Condition;
use crate::cpu::flags::{
    HalfwordDataTransferOffsetKind, HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting,
    OperandKind, ReadWriteKind, ShiftKind,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum SingleDataTransferOffsetInfo {
    Immediate {
        offset: u32,
    },
    RegisterImmediate {
        shift_amount: u32,
        shift_kind: ShiftKind,
        reg_offset: u32,
    },
}

impl std::fmt::Display for SingleDataTransferOffsetInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate { offset } => write!(f, "#{offset}"),
            Self::RegisterImmediate {
                shift_amount: 0,
                shift_kind: ShiftKind::Lsl,
                reg_offset,
            } => write!(f, "R{reg_offset}"),
            Self::RegisterImmediate {
                shift_amount,
                shift_kind,
                reg_offset,
            } => write!(f, "R{reg_offset}, {shift_kind} #{shift_amount}"),
        }
    }
}

/// A decoded ARM instruction.
///
/// | Variant                       | Instructions              |
/// |-------------------------------|---------------------------|
/// | `DataProcessing`              | AND, ADD, CMP, MOV, ...   |
/// | `Multiply`                    | MUL, MLA                  |
/// | `MultiplyLong`                | UMULL, UMLAL, SMULL, SMLAL|
/// | `PSRTransfer`                 | MRS, MSR                  |
/// | `SingleDataSwap`              | SWP, SWPB                 |
/// | `BranchAndExchange`           | BX                        |
/// | `HalfwordDataTransfer`        | LDRH, STRH, LDRSB, LDRSH  |
/// | `SingleDataTransfer`          | LDR, STR, LDRB, STRB      |
/// | `BlockDataTransfer`           | LDM, STM                  |
/// | `Branch`                      | B, BL                     |
/// | `CoprocessorDataTransfer`     | LDC, STC                  |
/// | `CoprocessorDataOperation`    | CDP                       |
/// | `CoprocessorRegisterTransfer` | MRC, MCR                  |
/// | `SoftwareInterrupt`           | SWI                       |
/// | `Undefined`                   | everything else           |
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum ArmModeInstruction {
    DataProcessing {
        condition: Condition,
        alu_instruction: ArmModeAluInstr,
        set_conditions: bool,
        op_kind: OperandKind,
        rn: u32,
        destination: u32,
        op2: AluSecondOperandInfo,
    },
    Multiply {
        variant: ArmModeMultiplyVariant,
        condition: Condition,
        should_set_codes: bool,
        rd_destination_register: u32,
        rn_accumulate_register: u32,
        rs_operand_register: u32,
        rm_operand_register: u32,
    },
    MultiplyLong {
        variant: ArmModeMultiplyLongVariant,
        condition: Condition,
        should_set_codes: bool,
        rdhi_destination_register: u32,
        rdlo_destination_register: u32,
        rs_operand_register: u32,
        rm_operand_register: u32,
    },
    PSRTransfer {
        condition: Condition,
        psr_kind: PsrKind,
        kind: PsrOpKind,
    },
    SingleDataSwap {
        condition: Condition,
        byte: bool,
        rn: u32,
        rd: u32,
        rm: u32,
    },
    BranchAndExchange {
        condition: Condition,
        register: usize,
    },
    HalfwordDataTransfer {
        condition: Condition,
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store_kind: LoadStoreKind,
        offset_kind: HalfwordDataTransferOffsetKind,
        base_register: u32,
        source_destination_register: u32,
        transfer_kind: HalfwordTransferKind,
    },
    SingleDataTransfer {
        condition: Condition,
        kind: LoadStoreKind,
        quantity: ReadWriteKind,
        write_back: bool,
        indexing: Indexing,
        rd: u32,
        base_register: u32,
        offset_info: SingleDataTransferOffsetInfo,
        offsetting: Offsetting,
    },
    BlockDataTransfer {
        condition: Condition,
        indexing: Indexing,
        offsetting: Offsetting,
        load_psr: bool,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: u32,
        register_list: u32,
    },
    Branch {
        condition: Condition,
        link: bool,
        /// Byte offset from PC + 8.
        offset: i32,
    },
    CoprocessorDataTransfer {
        condition: Condition,
        indexing: Indexing,
        offsetting: Offsetting,
        transfer_length: bool,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: u32,
        crd: u32,
        cp_number: u32,
        /// Word offset.
        offset: u32,
    },
    CoprocessorDataOperation {
        condition: Condition,
        cp_opcode: u32,
        crn: u32,
        crd: u32,
        cp_number: u32,
        cp: u32,
        crm: u32,
    },
    /// `Load` is MRC (coprocessor to ARM), `Store` is MCR.
    CoprocessorRegisterTransfer {
        condition: Condition,
        cp_opcode: u32,
        load_store: LoadStoreKind,
        crn: u32,
        rd: u32,
        cp_number: u32,
        cp: u32,
        crm: u32,
    },
    SoftwareInterrupt {
        condition: Condition,
        comment: u32,
    },
    Undefined {
        condition: Condition,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmModeMultiplyVariant {
    Mul,
    Mla,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmModeMultiplyLongVariant {
    Umull,
    Umlal,
    Smull,
    Smlal,
}

impl ArmModeMultiplyLongVariant {
    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Smull | Self::Smlal)
    }

    #[must_use]
    pub const fn accumulates(self) -> bool {
        matches!(self, Self::Umlal | Self::Smlal)
    }
}

impl std::fmt::Display for ArmModeMultiplyLongVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Umull => f.write_str("UMULL"),
            Self::Umlal => f.write_str("UMLAL"),
            Self::Smull => f.write_str("SMULL"),
            Self::Smlal => f.write_str("SMLAL"),
        }
    }
}

impl From<u32> for ArmModeMultiplyVariant {
    fn from(op_code: u32) -> Self {
        if op_code.get_bit(21) { Self::Mla } else { Self::Mul }
    }
}

impl From<u32> for ArmModeMultiplyLongVariant {
    fn from(op_code: u32) -> Self {
        match op_code.get_bits(21..=22) {
            0b00 => Self::Umull,
            0b01 => Self::Umlal,
            0b10 => Self::Smull,
            _ => Self::Smlal,
        }
    }
}

fn register_list_string(register_list: u32, count: u8) -> String {
    (0..count)
        .filter(|&i| register_list.get_bit(i))
        .map(|i| format!("R{i}"))
        .collect::<Vec<_>>()
        .join(",")
}

impl ArmModeInstruction {
    #[must_use]
    pub const fn condition(&self) -> Condition {
        match self {
            Self::DataProcessing { condition, .. }
            | Self::Multiply { condition, .. }
            | Self::MultiplyLong { condition, .. }
            | Self::PSRTransfer { condition, .. }
            | Self::SingleDataSwap { condition, .. }
            | Self::BranchAndExchange { condition, .. }
            | Self::HalfwordDataTransfer { condition, .. }
            | Self::SingleDataTransfer { condition, .. }
            | Self::BlockDataTransfer { condition, .. }
            | Self::Branch { condition, .. }
            | Self::CoprocessorDataTransfer { condition, .. }
            | Self::CoprocessorDataOperation { condition, .. }
            | Self::CoprocessorRegisterTransfer { condition, .. }
            | Self::SoftwareInterrupt { condition, .. }
            | Self::Undefined { condition } => *condition,
        }
    }

    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn disassembler(&self) -> String {
        match self {
            Self::DataProcessing {
                condition,
                alu_instruction,
                set_conditions,
                rn,
                destination,
                op2,
                ..
            } => {
                let set_string = if *set_conditions { "S" } else { "" };
                match alu_instruction {
                    ArmModeAluInstr::Tst
                    | ArmModeAluInstr::Teq
                    | ArmModeAluInstr::Cmp
                    | ArmModeAluInstr::Cmn => {
                        format!("{alu_instruction}{condition} R{rn}, {op2}")
                    }
                    ArmModeAluInstr::Mov | ArmModeAluInstr::Mvn => {
                        format!("{alu_instruction}{condition}{set_string} R{destination}, {op2}")
                    }
                    _ => format!(
                        "{alu_instruction}{condition}{set_string} R{destination}, R{rn}, {op2}"
                    ),
                }
            }
            Self::Multiply {
                variant,
                condition,
                should_set_codes,
                rd_destination_register,
                rn_accumulate_register,
                rs_operand_register,
                rm_operand_register,
            } => {
                let s = if *should_set_codes { "S" } else { "" };
                match variant {
                    ArmModeMultiplyVariant::Mul => format!(
                        "MUL{condition}{s} R{rd_destination_register}, R{rm_operand_register}, R{rs_operand_register}"
                    ),
                    ArmModeMultiplyVariant::Mla => format!(
                        "MLA{condition}{s} R{rd_destination_register}, R{rm_operand_register}, R{rs_operand_register}, R{rn_accumulate_register}"
                    ),
                }
            }
            Self::MultiplyLong {
                variant,
                condition,
                should_set_codes,
                rdhi_destination_register,
                rdlo_destination_register,
                rs_operand_register,
                rm_operand_register,
            } => {
                let s = if *should_set_codes { "S" } else { "" };
                format!(
                    "{variant}{condition}{s} R{rdlo_destination_register}, R{rdhi_destination_register}, R{rm_operand_register}, R{rs_operand_register}"
                )
            }
            Self::PSRTransfer {
                condition,
                psr_kind,
                kind,
            } => match kind {
                PsrOpKind::Mrs {
                    destination_register,
                } => format!("MRS{condition} R{destination_register}, {psr_kind}"),
                PsrOpKind::Msr {
                    operand,
                    field_mask,
                } => {
                    let fields = ['c', 'x', 's', 'f']
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| field_mask & (1 << i) != 0)
                        .map(|(_, c)| *c)
                        .collect::<String>();
                    format!("MSR{condition} {psr_kind}_{fields}, {operand}")
                }
            },
            Self::SingleDataSwap {
                condition,
                byte,
                rn,
                rd,
                rm,
            } => {
                let b = if *byte { "B" } else { "" };
                format!("SWP{condition}{b} R{rd}, R{rm}, [R{rn}]")
            }
            Self::BranchAndExchange {
                condition,
                register,
            } => format!("BX{condition} R{register}"),
            Self::HalfwordDataTransfer {
                condition,
                indexing,
                offsetting,
                load_store_kind,
                transfer_kind,
                source_destination_register,
                offset_kind,
                base_register,
                write_back,
            } => {
                let sign = match offsetting {
                    Offsetting::Up => "",
                    Offsetting::Down => "-",
                };

                let offset = match offset_kind {
                    HalfwordDataTransferOffsetKind::Immediate { offset: 0 } => String::new(),
                    HalfwordDataTransferOffsetKind::Immediate { offset } => {
                        format!(", #{sign}{offset}")
                    }
                    HalfwordDataTransferOffsetKind::Register { register } => {
                        format!(", {sign}R{register}")
                    }
                };

                let w = if *write_back { "!" } else { "" };

                let address = match indexing {
                    Indexing::Pre => format!("[R{base_register}{offset}]{w}"),
                    Indexing::Post => format!("[R{base_register}]{offset}"),
                };

                format!(
                    "{load_store_kind}{condition}{transfer_kind} R{source_destination_register}, {address}"
                )
            }
            Self::SingleDataTransfer {
                condition,
                kind,
                quantity,
                write_back,
                indexing,
                rd,
                base_register,
                offset_info,
                offsetting,
            } => {
                let b = match quantity {
                    ReadWriteKind::Word => "",
                    ReadWriteKind::Byte => "B",
                };
                let sign = match offsetting {
                    Offsetting::Up => "",
                    Offsetting::Down => "-",
                };
                let w = if *write_back { "!" } else { "" };

                let address = match (indexing, offset_info) {
                    (Indexing::Pre, SingleDataTransferOffsetInfo::Immediate { offset: 0 }) => {
                        format!("[R{base_register}]{w}")
                    }
                    (Indexing::Pre, _) => format!("[R{base_register}, {sign}{offset_info}]{w}"),
                    (Indexing::Post, _) => format!("[R{base_register}], {sign}{offset_info}"),
                };

                format!("{kind}{condition}{b} R{rd}, {address}")
            }
            Self::BlockDataTransfer {
                condition,
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
            } => {
                let op = match load_store {
                    LoadStoreKind::Store => "STM",
                    LoadStoreKind::Load => "LDM",
                };

                let offset_modifier = match offsetting {
                    Offsetting::Down => "D",
                    Offsetting::Up => "I",
                };
                let index_type = match indexing {
                    Indexing::Pre => "B",
                    Indexing::Post => "A",
                };

                let registers = register_list_string(*register_list, 16);
                let w = if *write_back { "!" } else { "" };
                let f = if *load_psr { "^" } else { "" };
                format!("{op}{condition}{offset_modifier}{index_type} R{rn}{w}, {{{registers}}}{f}")
            }
            Self::Branch {
                condition,
                link,
                offset,
            } => {
                let link = if *link { "L" } else { "" };
                format!("B{link}{condition} {offset:+}")
            }
            Self::CoprocessorDataTransfer {
                condition,
                indexing,
                offsetting,
                transfer_length,
                write_back,
                load_store,
                rn,
                crd,
                cp_number,
                offset,
            } => {
                let op = match load_store {
                    LoadStoreKind::Store => "STC",
                    LoadStoreKind::Load => "LDC",
                };
                let long_transfer = if *transfer_length { "L" } else { "" };
                let sign = match offsetting {
                    Offsetting::Up => "",
                    Offsetting::Down => "-",
                };
                let w = if *write_back { "!" } else { "" };
                let bytes = offset * 4;
                let address = match indexing {
                    Indexing::Pre => format!("[R{rn}, #{sign}{bytes}]{w}"),
                    Indexing::Post => format!("[R{rn}], #{sign}{bytes}"),
                };
                format!("{op}{condition}{long_transfer} p{cp_number}, c{crd}, {address}")
            }
            Self::CoprocessorDataOperation {
                condition,
                cp_opcode,
                crn,
                crd,
                cp_number,
                cp,
                crm,
            } => format!("CDP{condition} p{cp_number}, {cp_opcode}, c{crd}, c{crn}, c{crm}, {cp}"),
            Self::CoprocessorRegisterTransfer {
                condition,
                cp_opcode,
                load_store,
                crn,
                rd,
                cp_number,
                cp,
                crm,
            } => {
                let op = match load_store {
                    LoadStoreKind::Load => "MRC",
                    LoadStoreKind::Store => "MCR",
                };
                format!("{op}{condition} p{cp_number}, {cp_opcode}, R{rd}, c{crn}, c{crm}, {cp}")
            }
            Self::SoftwareInterrupt { condition, comment } => {
                format!("SWI{condition} 0x{comment:06X}")
            }
            Self::Undefined { condition } => format!("UND{condition}"),
        }
    }
}

impl ArmModeInstruction {
    /// MUL, MLA, long multiplies, SWP and the halfword transfers: bits 27-25
    /// are `000` and bits 7 and 4 are both set.
    fn decode_multiply_or_extra_transfer(op_code: u32, condition: Condition) -> Self {
        let sh_bits = op_code.get_bits(5..=6);

        if sh_bits == 0b00 {
            return match op_code.get_bits(22..=27) {
                0b00_0000 => Self::Multiply {
                    variant: ArmModeMultiplyVariant::from(op_code),
                    condition,
                    should_set_codes: op_code.get_bit(20),
                    rd_destination_register: op_code.get_bits(16..=19),
                    rn_accumulate_register: op_code.get_bits(12..=15),
                    rs_operand_register: op_code.get_bits(8..=11),
                    rm_operand_register: op_code.get_bits(0..=3),
                },
                0b00_0010 | 0b00_0011 => Self::MultiplyLong {
                    variant: ArmModeMultiplyLongVariant::from(op_code),
                    condition,
                    should_set_codes: op_code.get_bit(20),
                    rdhi_destination_register: op_code.get_bits(16..=19),
                    rdlo_destination_register: op_code.get_bits(12..=15),
                    rs_operand_register: op_code.get_bits(8..=11),
                    rm_operand_register: op_code.get_bits(0..=3),
                },
                0b00_0100 | 0b00_0101
                    if op_code.get_bits(20..=21) == 0b00 && op_code.get_bits(8..=11) == 0 =>
                {
                    Self::SingleDataSwap {
                        condition,
                        byte: op_code.get_bit(22),
                        rn: op_code.get_bits(16..=19),
                        rd: op_code.get_bits(12..=15),
                        rm: op_code.get_bits(0..=3),
                    }
                }
                _ => Self::Undefined { condition },
            };
        }

        let load_store_kind: LoadStoreKind = op_code.get_bit(20).into();
        let transfer_kind = match sh_bits {
            0b01 => HalfwordTransferKind::UnsignedHalfwords,
            0b10 => HalfwordTransferKind::SignedByte,
            _ => HalfwordTransferKind::SignedHalfwords,
        };

        // Signed stores do not exist on ARMv4.
        if load_store_kind == LoadStoreKind::Store
            && transfer_kind != HalfwordTransferKind::UnsignedHalfwords
        {
            return Self::Undefined { condition };
        }

        let operand_kind: OperandKind = op_code.get_bit(22).into();
        let offset_kind = match operand_kind {
            OperandKind::Register => HalfwordDataTransferOffsetKind::Register {
                register: op_code.get_bits(0..=3),
            },
            OperandKind::Immediate => HalfwordDataTransferOffsetKind::Immediate {
                offset: (op_code.get_bits(8..=11) << 4) | op_code.get_bits(0..=3),
            },
        };

        Self::HalfwordDataTransfer {
            condition,
            indexing: op_code.get_bit(24).into(),
            offsetting: op_code.get_bit(23).into(),
            write_back: op_code.get_bit(21),
            load_store_kind,
            offset_kind,
            base_register: op_code.get_bits(16..=19),
            source_destination_register: op_code.get_bits(12..=15),
            transfer_kind,
        }
    }

    /// Opcodes TST/TEQ/CMP/CMN with S clear encode the PSR transfers.
    fn decode_psr_transfer(op_code: u32, condition: Condition) -> Self {
        let psr_kind = PsrKind::from(op_code.get_bit(22));

        if op_code.is_bit_off(21) {
            let is_mrs = op_code.is_bit_off(25) && op_code.get_bits(16..=19) == 0b1111;
            if !is_mrs {
                return Self::Undefined { condition };
            }

            return Self::PSRTransfer {
                condition,
                psr_kind,
                kind: PsrOpKind::Mrs {
                    destination_register: op_code.get_bits(12..=15),
                },
            };
        }

        if op_code.get_bits(12..=15) != 0b1111 {
            return Self::Undefined { condition };
        }

        let operand = if op_code.get_bit(25) {
            AluSecondOperandInfo::Immediate {
                base: op_code.get_bits(0..=7),
                shift: op_code.get_bits(8..=11) * 2,
            }
        } else {
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Immediate(0),
                shift_kind: ShiftKind::Lsl,
                register: op_code.get_bits(0..=3),
            }
        };

        Self::PSRTransfer {
            condition,
            psr_kind,
            kind: PsrOpKind::Msr {
                operand,
                field_mask: op_code.get_bits(16..=19),
            },
        }
    }

    fn decode_data_processing(op_code: u32, condition: Condition) -> Self {
        let alu_instruction = ArmModeAluInstr::from(op_code.get_bits(21..=24));
        let set_conditions = op_code.get_bit(20);

        if alu_instruction.is_test() && !set_conditions {
            return Self::decode_psr_transfer(op_code, condition);
        }

        let op_kind: OperandKind = op_code.get_bit(25).into();
        let op2 = match op_kind {
            OperandKind::Immediate => AluSecondOperandInfo::Immediate {
                base: op_code.get_bits(0..=7),
                shift: op_code.get_bits(8..=11) * 2,
            },
            OperandKind::Register => {
                let shift_op = if op_code.get_bit(4) {
                    ShiftOperator::Register(op_code.get_bits(8..=11))
                } else {
                    ShiftOperator::Immediate(op_code.get_bits(7..=11))
                };
                AluSecondOperandInfo::Register {
                    shift_op,
                    shift_kind: op_code.get_bits(5..=6).into(),
                    register: op_code.get_bits(0..=3),
                }
            }
        };

        Self::DataProcessing {
            condition,
            alu_instruction,
            set_conditions,
            op_kind,
            rn: op_code.get_bits(16..=19),
            destination: op_code.get_bits(12..=15),
            op2,
        }
    }

    fn decode_single_data_transfer(op_code: u32, condition: Condition) -> Self {
        // The I bit is inverted with respect to data processing.
        let op_kind: OperandKind = (!op_code.get_bit(25)).into();
        let offset_info = match op_kind {
            OperandKind::Immediate => SingleDataTransferOffsetInfo::Immediate {
                offset: op_code.get_bits(0..=11),
            },
            OperandKind::Register => SingleDataTransferOffsetInfo::RegisterImmediate {
                shift_amount: op_code.get_bits(7..=11),
                shift_kind: op_code.get_bits(5..=6).into(),
                reg_offset: op_code.get_bits(0..=3),
            },
        };

        Self::SingleDataTransfer {
            condition,
            kind: op_code.get_bit(20).into(),
            quantity: op_code.get_bit(22).into(),
            write_back: op_code.get_bit(21),
            indexing: op_code.get_bit(24).into(),
            rd: op_code.get_bits(12..=15),
            base_register: op_code.get_bits(16..=19),
            offset_info,
            offsetting: op_code.get_bit(23).into(),
        }
    }
}

impl From<u32> for ArmModeInstruction {
    fn from(op_code: u32) -> Self {
        let condition = Condition::from(op_code.get_bits(28..=31) as u8);

        if op_code.get_bits(4..=27) == 0b0001_0010_1111_1111_1111_0001 {
            Self::BranchAndExchange {
                condition,
                register: op_code.get_bits(0..=3) as usize,
            }
        } else if op_code.get_bits(25..=27) == 0b000 && op_code.get_bit(7) && op_code.get_bit(4) {
            Self::decode_multiply_or_extra_transfer(op_code, condition)
        } else if op_code.get_bits(25..=27) == 0b011 && op_code.get_bit(4) {
            Self::Undefined { condition }
        } else if op_code.get_bits(26..=27) == 0b00 {
            Self::decode_data_processing(op_code, condition)
        } else if op_code.get_bits(26..=27) == 0b01 {
            Self::decode_single_data_transfer(op_code, condition)
        } else if op_code.get_bits(25..=27) == 0b100 {
            Self::BlockDataTransfer {
                condition,
                indexing: op_code.get_bit(24).into(),
                offsetting: op_code.get_bit(23).into(),
                load_psr: op_code.get_bit(22),
                write_back: op_code.get_bit(21),
                load_store: op_code.get_bit(20).into(),
                rn: op_code.get_bits(16..=19),
                register_list: op_code.get_bits(0..=15),
            }
        } else if op_code.get_bits(25..=27) == 0b101 {
            Self::Branch {
                condition,
                link: op_code.get_bit(24),
                offset: (op_code.get_bits(0..=23) << 2).sign_extended(26) as i32,
            }
        } else if op_code.get_bits(25..=27) == 0b110 {
            Self::CoprocessorDataTransfer {
                condition,
                indexing: op_code.get_bit(24).into(),
                offsetting: op_code.get_bit(23).into(),
                transfer_length: op_code.get_bit(22),
                write_back: op_code.get_bit(21),
                load_store: op_code.get_bit(20).into(),
                rn: op_code.get_bits(16..=19),
                crd: op_code.get_bits(12..=15),
                cp_number: op_code.get_bits(8..=11),
                offset: op_code.get_bits(0..=7),
            }
        } else if op_code.get_bits(24..=27) == 0b1110 && op_code.get_bit(4) {
            Self::CoprocessorRegisterTransfer {
                condition,
                cp_opcode: op_code.get_bits(21..=23),
                load_store: op_code.get_bit(20).into(),
                crn: op_code.get_bits(16..=19),
                rd: op_code.get_bits(12..=15),
                cp_number: op_code.get_bits(8..=11),
                cp: op_code.get_bits(5..=7),
                crm: op_code.get_bits(0..=3),
            }
        } else if op_code.get_bits(24..=27) == 0b1110 {
            Self::CoprocessorDataOperation {
                condition,
                cp_opcode: op_code.get_bits(20..=23),
                crn: op_code.get_bits(16..=19),
                crd: op_code.get_bits(12..=15),
                cp_number: op_code.get_bits(8..=11),
                cp: op_code.get_bits(5..=7),
                crm: op_code.get_bits(0..=3),
            }
        } else {
            Self::SoftwareInterrupt {
                condition,
                comment: op_code.get_bits(0..=23),
            }
        }
    }
}

impl std::fmt::Display for ArmModeInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.disassembler())
    }
}
