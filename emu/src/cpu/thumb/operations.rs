use crate::bitwise::Bits;
use crate::bus::{AccessWidth, MemoryInterface};
use crate::cpu::alu::{self, ArithmeticOpResult};
use crate::cpu::arm::instructions::SingleDataTransferOffsetInfo;
use crate::cpu::arm7tdmi::{Arm7tdmi, Flow};
use crate::cpu::condition::Condition;
use crate::cpu::flags::{
    HalfwordDataTransferOffsetKind, HalfwordTransferKind, Indexing, LoadStoreKind, OperandKind,
    Offsetting, ReadWriteKind, ShiftKind,
};
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER, REG_SP};
use crate::cpu::thumb::alu_instructions::{
    Operation, ThumbHighRegisterOperation, ThumbModeAluInstruction,
};
use crate::cpu::thumb::instruction::Instruction;

const SP: u32 = REG_SP as u32;

// Thumb transfers other than LDM/STM/PUSH/POP are pre-indexed, upward,
// without write-back.
const PRE: Indexing = Indexing::Pre;
const UP: Offsetting = Offsetting::Up;

impl<M: MemoryInterface> Arm7tdmi<'_, M> {
    pub(crate) fn execute_thumb(&mut self, instruction: Instruction, raw: u16) -> Flow {
        use Instruction::{
            AddSubtract, AddressOf, AdjustStack, Alu, Branch, BranchConditional, BranchLink,
            HighRegister, Immediate, LoadLiteral, Multiple, PushPop, ShiftImmediate,
            SoftwareInterrupt, TransferHalfword, TransferImmediate, TransferRegister,
            TransferSigned, TransferStack, Undefined,
        };

        match instruction {
            ShiftImmediate {
                kind,
                amount,
                rs,
                rd,
            } => self.shift_immediate(kind, amount, rs, rd),
            AddSubtract {
                operand,
                subtract,
                rn,
                rs,
                rd,
            } => self.add_subtract(operand, subtract, rn, rs, rd),
            Immediate {
                operation,
                rd,
                value,
            } => self.immediate_operation(operation, rd, value),
            Alu { operation, rs, rd } => self.alu_operation(operation, rs, rd),
            HighRegister { operation, rs, rd } => self.high_register_operation(operation, rs, rd),
            LoadLiteral { rd, offset } => self.load_literal(rd, offset),
            TransferRegister {
                load_store,
                width,
                ro,
                rb,
                rd,
            } => {
                let offset = SingleDataTransferOffsetInfo::RegisterImmediate {
                    shift_amount: 0,
                    shift_kind: ShiftKind::Lsl,
                    reg_offset: ro.into(),
                };
                self.single_data_transfer(
                    load_store, width, false, PRE, rd.into(), rb.into(), offset, UP,
                )
            }
            TransferSigned {
                load_store,
                kind,
                ro,
                rb,
                rd,
            } => {
                let offset = HalfwordDataTransferOffsetKind::Register {
                    register: ro.into(),
                };
                self.half_word_data_transfer(
                    PRE, UP, false, load_store, offset, rb.into(), rd.into(), kind,
                )
            }
            TransferImmediate {
                load_store,
                width,
                offset,
                rb,
                rd,
            } => {
                let offset = SingleDataTransferOffsetInfo::Immediate {
                    offset: offset.into(),
                };
                self.single_data_transfer(
                    load_store, width, false, PRE, rd.into(), rb.into(), offset, UP,
                )
            }
            TransferHalfword {
                load_store,
                offset,
                rb,
                rd,
            } => {
                let offset = HalfwordDataTransferOffsetKind::Immediate {
                    offset: offset.into(),
                };
                self.half_word_data_transfer(
                    PRE,
                    UP,
                    false,
                    load_store,
                    offset,
                    rb.into(),
                    rd.into(),
                    HalfwordTransferKind::UnsignedHalfwords,
                )
            }
            TransferStack {
                load_store,
                rd,
                offset,
            } => {
                let offset = SingleDataTransferOffsetInfo::Immediate {
                    offset: offset.into(),
                };
                self.single_data_transfer(
                    load_store,
                    ReadWriteKind::Word,
                    false,
                    PRE,
                    rd.into(),
                    SP,
                    offset,
                    UP,
                )
            }
            AddressOf {
                from_sp,
                rd,
                offset,
            } => self.address_of(from_sp, rd, offset),
            AdjustStack { offset } => {
                let sp = self.operand(SP).wrapping_add_signed(offset);
                self.set_register(SP, sp)
            }
            PushPop {
                load_store,
                extra,
                list,
            } => self.push_pop(load_store, extra, list),
            Multiple {
                load_store,
                rb,
                list,
            } => self.block_data_transfer(
                Indexing::Post,
                UP,
                false,
                true,
                load_store,
                rb.into(),
                list.into(),
            ),
            BranchConditional { condition, offset } => self.branch_conditional(condition, offset),
            SoftwareInterrupt { comment } => self.software_interrupt(comment.into()),
            Branch { offset } => self.branch(false, offset),
            BranchLink { low, offset } => self.branch_link(low, offset),
            Undefined => self.undefined(raw.into()),
        }
    }

    fn shift_immediate(&mut self, kind: ShiftKind, amount: u16, rs: u16, rd: u16) -> Flow {
        let source = self.operand(rs.into());
        let shifted = alu::shift_by_immediate(kind, amount.into(), source, self.cpsr.carry_flag());

        self.cpsr.set_carry_flag(shifted.carry);
        self.cpsr.set_nz(shifted.value);
        self.set_register(rd.into(), shifted.value)
    }

    fn add_subtract(
        &mut self,
        operand: OperandKind,
        subtract: bool,
        rn: u16,
        rs: u16,
        rd: u16,
    ) -> Flow {
        let first = self.operand(rs.into());
        let second = match operand {
            OperandKind::Immediate => rn.into(),
            OperandKind::Register => self.operand(rn.into()),
        };

        let outcome = if subtract {
            alu::sub_inner_op(first, second, true)
        } else {
            alu::add_inner_op(first, second, false)
        };
        self.cpsr.set_flags(&outcome);
        self.set_register(rd.into(), outcome.result)
    }

    fn immediate_operation(&mut self, operation: Operation, rd: u16, value: u32) -> Flow {
        let current = self.operand(rd.into());
        match operation {
            Operation::Mov => {
                self.cpsr.set_nz(value);
                self.set_register(rd.into(), value)
            }
            Operation::Cmp => {
                let outcome = alu::sub_inner_op(current, value, true);
                self.cpsr.set_flags(&outcome);
                Flow::Next
            }
            Operation::Add => {
                let outcome = alu::add_inner_op(current, value, false);
                self.cpsr.set_flags(&outcome);
                self.set_register(rd.into(), outcome.result)
            }
            Operation::Sub => {
                let outcome = alu::sub_inner_op(current, value, true);
                self.cpsr.set_flags(&outcome);
                self.set_register(rd.into(), outcome.result)
            }
        }
    }

    fn alu_operation(&mut self, operation: ThumbModeAluInstruction, rs: u16, rd: u16) -> Flow {
        use ThumbModeAluInstruction::{
            Adc, And, Asr, Bic, Cmn, Cmp, Eor, Lsl, Lsr, Mul, Mvn, Neg, Orr, Ror, Sbc, Tst,
        };

        let first = self.operand(rd.into());
        let second = self.operand(rs.into());
        let carry_in = self.cpsr.carry_flag();

        let logical = |result: u32, carry: bool| ArithmeticOpResult {
            result,
            carry,
            overflow: self.cpsr.overflow_flag(),
            sign: result.get_bit(31),
            zero: result == 0,
        };
        let shift = |kind: ShiftKind| {
            let shifted = alu::shift_by_register(kind, second, first, carry_in);
            logical(shifted.value, shifted.carry)
        };

        let outcome = match operation {
            And | Tst => logical(first & second, carry_in),
            Eor => logical(first ^ second, carry_in),
            Orr => logical(first | second, carry_in),
            Bic => logical(first & !second, carry_in),
            Mvn => logical(!second, carry_in),
            Lsl => shift(ShiftKind::Lsl),
            Lsr => shift(ShiftKind::Lsr),
            Asr => shift(ShiftKind::Asr),
            Ror => shift(ShiftKind::Ror),
            Adc => alu::add_inner_op(first, second, carry_in),
            Sbc => alu::sub_inner_op(first, second, carry_in),
            Neg => alu::sub_inner_op(0, second, true),
            Cmp => alu::sub_inner_op(first, second, true),
            Cmn => alu::add_inner_op(first, second, false),
            // C is meaningless after a multiply and is left alone.
            Mul => logical(first.wrapping_mul(second), carry_in),
        };

        match operation {
            Lsl | Lsr | Asr | Ror => self.idle(1),
            Mul => self.idle(alu::multiply_cycles(first, true)),
            _ => {}
        }

        self.cpsr.set_flags(&outcome);
        if operation.is_test() {
            Flow::Next
        } else {
            self.set_register(rd.into(), outcome.result)
        }
    }

    fn high_register_operation(
        &mut self,
        operation: ThumbHighRegisterOperation,
        rs: u16,
        rd: u16,
    ) -> Flow {
        let source = self.operand(rs.into());
        match operation {
            ThumbHighRegisterOperation::Add => {
                let result = self.operand(rd.into()).wrapping_add(source);
                self.set_register(rd.into(), result)
            }
            ThumbHighRegisterOperation::Cmp => {
                let outcome = alu::sub_inner_op(self.operand(rd.into()), source, true);
                self.cpsr.set_flags(&outcome);
                Flow::Next
            }
            ThumbHighRegisterOperation::Mov => self.set_register(rd.into(), source),
            ThumbHighRegisterOperation::Bx => self.branch_and_exchange(rs.into()),
        }
    }

    /// Word-aligned view of r15 used as a base by PC-relative addressing.
    fn aligned_r15(&self) -> u32 {
        self.r15() & !3
    }

    fn load_literal(&mut self, rd: u16, offset: u16) -> Flow {
        let address = self.aligned_r15().wrapping_add(offset.into());
        let value = self.load(address, AccessWidth::Word);
        self.idle(1);

        if self.data_aborted() {
            return Flow::Next;
        }
        self.set_register(rd.into(), value)
    }

    fn address_of(&mut self, from_sp: bool, rd: u16, offset: u32) -> Flow {
        let base = if from_sp {
            self.operand(SP)
        } else {
            self.aligned_r15()
        };
        self.set_register(rd.into(), base.wrapping_add(offset))
    }

    /// PUSH is STMDB sp!, POP is LDMIA sp!.
    fn push_pop(&mut self, load_store: LoadStoreKind, extra: bool, list: u16) -> Flow {
        let mut list = u32::from(list);
        let (indexing, offsetting, register) = match load_store {
            LoadStoreKind::Store => (Indexing::Pre, Offsetting::Down, REG_LR),
            LoadStoreKind::Load => (Indexing::Post, Offsetting::Up, REG_PROGRAM_COUNTER),
        };
        if extra {
            list.set_bit_on(register as u8);
        }

        self.block_data_transfer(indexing, offsetting, false, true, load_store, SP, list)
    }

    fn branch_conditional(&mut self, condition: Condition, offset: i32) -> Flow {
        if self.cpsr.can_execute(condition) {
            self.branch(false, offset)
        } else {
            Flow::Next
        }
    }

    /// BL is split in two halves. The first parks the upper part of the
    /// target in LR, the second adds the lower part and links.
    fn branch_link(&mut self, low: bool, offset: u32) -> Flow {
        if low {
            let target = self.operand(REG_LR as u32).wrapping_add(offset << 1);
            let return_address = self.next_pc() | 1;
            self.registers.set_register_at(REG_LR, return_address);
            self.jump(target)
        } else {
            let high = (offset << 12).sign_extended(23);
            let partial = self.r15().wrapping_add(high);
            self.registers.set_register_at(REG_LR, partial);
            Flow::Next
        }
    }
}
