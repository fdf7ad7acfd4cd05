use crate::bitwise::Bits;
use crate::bus::{AccessWidth, MemoryInterface};
use crate::cpu::alu::{self, ArithmeticOpResult, ShifterOutput};
use crate::cpu::arm::alu_instruction::{
    AluSecondOperandInfo, ArmModeAluInstr, PsrKind, PsrOpKind, ShiftOperator,
};
use crate::cpu::arm::instructions::{
    ArmModeInstruction, ArmModeMultiplyLongVariant, ArmModeMultiplyVariant,
    SingleDataTransferOffsetInfo,
};
use crate::cpu::arm7tdmi::{Arm7tdmi, Flow};
use crate::cpu::coprocessor::{CopResponse, Coprocessor, Transfer};
use crate::cpu::cpu_modes::{Bank, Mode};
use crate::cpu::exception::{AbortKind, ExceptionKind};
use crate::cpu::flags::{
    HalfwordDataTransferOffsetKind, HalfwordTransferKind, Indexing, LoadStoreKind, Offsetting,
    ReadWriteKind,
};
use crate::cpu::psr::{CpuState, FIELD_MASKS, FLAGS_MASK};
use crate::cpu::registers::{REG_LR, REG_PROGRAM_COUNTER};
use crate::error::CpuError;

/// Words an LDC/STC may move before the engine gives up on the coprocessor.
const MAX_COPROCESSOR_WORDS: usize = 16;

/// The T bit can only change through BX and exception entry/return.
const STATE_BIT_MASK: u32 = 1 << 5;

impl<M: MemoryInterface> Arm7tdmi<'_, M> {
    pub(crate) fn execute_arm(&mut self, instruction: ArmModeInstruction, raw: u32) -> Flow {
        use ArmModeInstruction::{
            Branch, BranchAndExchange, BlockDataTransfer, CoprocessorDataOperation,
            CoprocessorDataTransfer, CoprocessorRegisterTransfer, DataProcessing,
            HalfwordDataTransfer, Multiply, MultiplyLong, PSRTransfer, SingleDataSwap,
            SingleDataTransfer, SoftwareInterrupt, Undefined,
        };

        match instruction {
            DataProcessing {
                alu_instruction,
                set_conditions,
                rn,
                destination,
                op2,
                ..
            } => self.data_processing(alu_instruction, set_conditions, rn, destination, op2),
            Multiply {
                variant,
                should_set_codes,
                rd_destination_register,
                rn_accumulate_register,
                rs_operand_register,
                rm_operand_register,
                ..
            } => self.multiply(
                variant,
                should_set_codes,
                rd_destination_register,
                rn_accumulate_register,
                rs_operand_register,
                rm_operand_register,
            ),
            MultiplyLong {
                variant,
                should_set_codes,
                rdhi_destination_register,
                rdlo_destination_register,
                rs_operand_register,
                rm_operand_register,
                ..
            } => self.multiply_long(
                variant,
                should_set_codes,
                rdhi_destination_register,
                rdlo_destination_register,
                rs_operand_register,
                rm_operand_register,
            ),
            PSRTransfer { psr_kind, kind, .. } => self.psr_transfer(raw, psr_kind, kind),
            SingleDataSwap { byte, rn, rd, rm, .. } if self.properties.lock => {
                self.single_data_swap(byte, rn, rd, rm)
            }
            BranchAndExchange { register, .. } if self.properties.v4 => {
                self.branch_and_exchange(register as u32)
            }
            HalfwordDataTransfer {
                indexing,
                offsetting,
                write_back,
                load_store_kind,
                offset_kind,
                base_register,
                source_destination_register,
                transfer_kind,
                ..
            } if self.properties.v4 => self.half_word_data_transfer(
                indexing,
                offsetting,
                write_back,
                load_store_kind,
                offset_kind,
                base_register,
                source_destination_register,
                transfer_kind,
            ),
            SingleDataTransfer {
                kind,
                quantity,
                write_back,
                indexing,
                rd,
                base_register,
                offset_info,
                offsetting,
                ..
            } => self.single_data_transfer(
                kind,
                quantity,
                write_back,
                indexing,
                rd,
                base_register,
                offset_info,
                offsetting,
            ),
            BlockDataTransfer {
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
                ..
            } => self.block_data_transfer(
                indexing,
                offsetting,
                load_psr,
                write_back,
                load_store,
                rn,
                register_list,
            ),
            Branch { link, offset, .. } => self.branch(link, offset),
            CoprocessorDataTransfer {
                indexing,
                offsetting,
                write_back,
                load_store,
                rn,
                cp_number,
                offset,
                ..
            } => self.coprocessor_data_transfer(
                raw, indexing, offsetting, write_back, load_store, rn, cp_number, offset,
            ),
            CoprocessorDataOperation { cp_number, .. } => {
                self.coprocessor_data_operation(raw, cp_number)
            }
            CoprocessorRegisterTransfer {
                load_store,
                rd,
                cp_number,
                ..
            } => self.coprocessor_register_transfer(raw, load_store, rd, cp_number),
            SoftwareInterrupt { comment, .. } => self.software_interrupt(comment),
            SingleDataSwap { .. }
            | BranchAndExchange { .. }
            | HalfwordDataTransfer { .. }
            | Undefined { .. } => self.undefined(raw),
        }
    }

    /// Operand 2 through the barrel shifter.
    fn shifter_operand(&mut self, op2: AluSecondOperandInfo, carry_in: bool) -> ShifterOutput {
        match op2 {
            AluSecondOperandInfo::Immediate { base, shift } => {
                alu::rotated_immediate(base, shift, carry_in)
            }
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Immediate(amount),
                shift_kind,
                register,
            } => alu::shift_by_immediate(shift_kind, amount, self.operand(register), carry_in),
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Register(rs),
                shift_kind,
                register,
            } => {
                // The extra cycle moves PC one more word ahead.
                self.idle(1);
                let value = self.pipelined_operand(register);
                let amount = self.operand(rs) & 0xFF;
                alu::shift_by_register(shift_kind, amount, value, carry_in)
            }
        }
    }

    /// Register read during an instruction that spent an internal cycle
    /// first: r15 is PC + 12.
    fn pipelined_operand(&self, register: u32) -> u32 {
        if register as usize == REG_PROGRAM_COUNTER {
            self.r15().wrapping_add(4)
        } else {
            self.operand(register)
        }
    }

    fn data_processing(
        &mut self,
        alu_instruction: ArmModeAluInstr,
        set_conditions: bool,
        rn: u32,
        destination: u32,
        op2: AluSecondOperandInfo,
    ) -> Flow {
        let carry_in = self.cpsr.carry_flag();
        let register_shift = matches!(
            op2,
            AluSecondOperandInfo::Register {
                shift_op: ShiftOperator::Register(_),
                ..
            }
        );

        let shifter = self.shifter_operand(op2, carry_in);
        let op1 = if register_shift {
            self.pipelined_operand(rn)
        } else {
            self.operand(rn)
        };
        let op2 = shifter.value;

        let logical = |result: u32| ArithmeticOpResult {
            result,
            carry: shifter.carry,
            overflow: self.cpsr.overflow_flag(),
            sign: result.get_bit(31),
            zero: result == 0,
        };

        use ArmModeAluInstr::{
            Adc, Add, And, Bic, Cmn, Cmp, Eor, Mov, Mvn, Orr, Rsb, Rsc, Sbc, Sub, Teq, Tst,
        };
        let outcome = match alu_instruction {
            And | Tst => logical(op1 & op2),
            Eor | Teq => logical(op1 ^ op2),
            Orr => logical(op1 | op2),
            Mov => logical(op2),
            Bic => logical(op1 & !op2),
            Mvn => logical(!op2),
            Sub | Cmp => alu::sub_inner_op(op1, op2, true),
            Rsb => alu::sub_inner_op(op2, op1, true),
            Add | Cmn => alu::add_inner_op(op1, op2, false),
            Adc => alu::add_inner_op(op1, op2, carry_in),
            Sbc => alu::sub_inner_op(op1, op2, carry_in),
            Rsc => alu::sub_inner_op(op2, op1, carry_in),
        };

        if set_conditions {
            if destination as usize == REG_PROGRAM_COUNTER && !alu_instruction.is_test() {
                self.restore_cpsr();
            } else {
                self.cpsr.set_flags(&outcome);
            }
        }

        if alu_instruction.is_test() {
            Flow::Next
        } else {
            self.set_register(destination, outcome.result)
        }
    }

    fn multiply(
        &mut self,
        variant: ArmModeMultiplyVariant,
        set_codes: bool,
        rd: u32,
        rn: u32,
        rs: u32,
        rm: u32,
    ) -> Flow {
        let rs_value = self.operand(rs);
        let mut result = self.operand(rm).wrapping_mul(rs_value);
        let mut cycles = alu::multiply_cycles(rs_value, true);

        if variant == ArmModeMultiplyVariant::Mla {
            result = result.wrapping_add(self.operand(rn));
            cycles += 1;
        }
        self.idle(cycles);

        if set_codes {
            self.cpsr.set_nz(result);
        }
        self.set_register(rd, result)
    }

    fn multiply_long(
        &mut self,
        variant: ArmModeMultiplyLongVariant,
        set_codes: bool,
        rdhi: u32,
        rdlo: u32,
        rs: u32,
        rm: u32,
    ) -> Flow {
        let rs_value = self.operand(rs);
        let rm_value = self.operand(rm);
        let signed = variant.is_signed();

        let product = if signed {
            (i64::from(rm_value as i32) * i64::from(rs_value as i32)) as u64
        } else {
            u64::from(rm_value) * u64::from(rs_value)
        };

        let mut cycles = alu::multiply_cycles(rs_value, signed) + 1;
        let result = if variant.accumulates() {
            cycles += 1;
            let accumulator =
                (u64::from(self.operand(rdhi)) << 32) | u64::from(self.operand(rdlo));
            product.wrapping_add(accumulator)
        } else {
            product
        };
        self.idle(cycles);

        if set_codes {
            self.cpsr.set_sign_flag(result >> 63 == 1);
            self.cpsr.set_zero_flag(result == 0);
        }

        let low = self.set_register(rdlo, result as u32);
        let high = self.set_register(rdhi, (result >> 32) as u32);
        low.and(high)
    }

    fn psr_transfer(&mut self, raw: u32, psr_kind: PsrKind, kind: PsrOpKind) -> Flow {
        match kind {
            PsrOpKind::Mrs {
                destination_register,
            } => {
                let psr = match psr_kind {
                    PsrKind::Cpsr => self.cpsr,
                    PsrKind::Spsr => self
                        .register_bank
                        .spsr(self.active_bank())
                        .unwrap_or_else(|| {
                            tracing::warn!("MRS of SPSR in {}", self.cpsr);
                            self.cpsr
                        }),
                };
                self.set_register(destination_register, psr.into())
            }
            PsrOpKind::Msr {
                operand,
                field_mask,
            } => {
                let value = match operand {
                    AluSecondOperandInfo::Immediate { base, shift } => base.rotate_right(shift),
                    AluSecondOperandInfo::Register { register, .. } => self.operand(register),
                };
                let mask = FIELD_MASKS
                    .iter()
                    .enumerate()
                    .filter(|(field, _)| field_mask.get_bit(*field as u8))
                    .fold(0, |acc, (_, bits)| acc | bits);

                match psr_kind {
                    PsrKind::Cpsr => self.write_cpsr_fields(raw, value, mask),
                    PsrKind::Spsr => {
                        let bank = self.active_bank();
                        match self.register_bank.spsr(bank) {
                            Some(spsr) => {
                                self.register_bank.set_spsr(bank, spsr.masked_write(value, mask));
                            }
                            None => tracing::warn!("MSR to SPSR in {}", self.cpsr),
                        }
                    }
                }
                Flow::Next
            }
        }
    }

    fn write_cpsr_fields(&mut self, raw: u32, value: u32, mask: u32) {
        let privileged = self.cpsr.mode().is_ok_and(Mode::is_privileged);
        let mask = if privileged { mask } else { mask & FLAGS_MASK };

        let new = self.cpsr.masked_write(value, mask & !STATE_BIT_MASK);
        let new = match self.host.as_deref_mut() {
            Some(host) => host.fix_cpsr(raw, new),
            None => new,
        };
        self.write_cpsr(new);
    }

    pub(crate) fn branch(&mut self, link: bool, offset: i32) -> Flow {
        let target = self.r15().wrapping_add_signed(offset);
        if link {
            let return_address = self.next_pc();
            self.registers.set_register_at(REG_LR, return_address);
        }
        self.jump(target)
    }

    pub(crate) fn branch_and_exchange(&mut self, register: u32) -> Flow {
        let target = self.operand(register);

        let mut cpsr = self.cpsr;
        cpsr.set_cpu_state(CpuState::from(target.get_bit(0)));
        self.write_cpsr(cpsr);

        self.jump(target)
    }

    /// Value a store puts on the bus: r15 is PC + 12.
    fn store_operand(&self, register: u32) -> u32 {
        self.pipelined_operand(register)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn single_data_transfer(
        &mut self,
        kind: LoadStoreKind,
        quantity: ReadWriteKind,
        write_back: bool,
        indexing: Indexing,
        rd: u32,
        base_register: u32,
        offset_info: SingleDataTransferOffsetInfo,
        offsetting: Offsetting,
    ) -> Flow {
        let offset = match offset_info {
            SingleDataTransferOffsetInfo::Immediate { offset } => offset,
            SingleDataTransferOffsetInfo::RegisterImmediate {
                shift_amount,
                shift_kind,
                reg_offset,
            } => {
                alu::shift_by_immediate(
                    shift_kind,
                    shift_amount,
                    self.operand(reg_offset),
                    self.cpsr.carry_flag(),
                )
                .value
            }
        };

        let base = self.operand(base_register);
        let offset_address = offsetting.apply(base, offset);
        let address = match indexing {
            Indexing::Pre => offset_address,
            Indexing::Post => base,
        };
        // Post-indexing always writes back.
        let writes_back = write_back || indexing == Indexing::Post;
        let width = match quantity {
            ReadWriteKind::Word => AccessWidth::Word,
            ReadWriteKind::Byte => AccessWidth::Byte,
        };

        match kind {
            LoadStoreKind::Store => {
                let value = self.store_operand(rd);
                self.store(address, width, value);
                if self.data_aborted() {
                    return Flow::Next;
                }
                self.write_back(writes_back, base_register, offset_address)
            }
            LoadStoreKind::Load => {
                let value = self.load(address, width);
                self.idle(1);

                // An aborted access leaves both the base and Rd untouched.
                if self.data_aborted() {
                    return Flow::Next;
                }
                let flow = self.write_back(writes_back, base_register, offset_address);

                let value = match width {
                    AccessWidth::Word => value.rotate_right(8 * (address & 3)),
                    _ => value,
                };
                flow.and(self.set_register(rd, value))
            }
        }
    }

    fn write_back(&mut self, enabled: bool, register: u32, value: u32) -> Flow {
        if enabled {
            self.set_register(register, value)
        } else {
            Flow::Next
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn half_word_data_transfer(
        &mut self,
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store_kind: LoadStoreKind,
        offset_kind: HalfwordDataTransferOffsetKind,
        base_register: u32,
        rd: u32,
        transfer_kind: HalfwordTransferKind,
    ) -> Flow {
        let offset = match offset_kind {
            HalfwordDataTransferOffsetKind::Immediate { offset } => offset,
            HalfwordDataTransferOffsetKind::Register { register } => self.operand(register),
        };

        let base = self.operand(base_register);
        let offset_address = offsetting.apply(base, offset);
        let address = match indexing {
            Indexing::Pre => offset_address,
            Indexing::Post => base,
        };
        let writes_back = write_back || indexing == Indexing::Post;

        match load_store_kind {
            LoadStoreKind::Store => {
                let value = self.store_operand(rd);
                self.store(address, AccessWidth::HalfWord, value);
                if self.data_aborted() {
                    return Flow::Next;
                }
                self.write_back(writes_back, base_register, offset_address)
            }
            LoadStoreKind::Load => {
                let value = match transfer_kind {
                    HalfwordTransferKind::UnsignedHalfwords => self
                        .load(address, AccessWidth::HalfWord)
                        .rotate_right(8 * (address & 1)),
                    HalfwordTransferKind::SignedHalfwords if address.is_bit_off(0) => {
                        self.load(address, AccessWidth::HalfWord).sign_extended(16)
                    }
                    // A misaligned LDRSH reads the addressed byte only.
                    HalfwordTransferKind::SignedHalfwords | HalfwordTransferKind::SignedByte => {
                        self.load(address, AccessWidth::Byte).sign_extended(8)
                    }
                };
                self.idle(1);

                if self.data_aborted() {
                    return Flow::Next;
                }
                let flow = self.write_back(writes_back, base_register, offset_address);
                flow.and(self.set_register(rd, value))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn block_data_transfer(
        &mut self,
        indexing: Indexing,
        offsetting: Offsetting,
        load_psr: bool,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: u32,
        register_list: u32,
    ) -> Flow {
        let mut registers: Vec<usize> = (0..16u8)
            .filter(|&r| register_list.get_bit(r))
            .map(usize::from)
            .collect();

        // An empty list moves r15 but steps the base over sixteen words.
        let size = if registers.is_empty() {
            registers.push(REG_PROGRAM_COUNTER);
            0x40
        } else {
            4 * registers.len() as u32
        };

        let base = self.operand(rn);
        let lowest = match (offsetting, indexing) {
            (Offsetting::Up, Indexing::Pre) => base.wrapping_add(4),
            (Offsetting::Up, Indexing::Post) => base,
            (Offsetting::Down, Indexing::Pre) => base.wrapping_sub(size),
            (Offsetting::Down, Indexing::Post) => base.wrapping_sub(size).wrapping_add(4),
        };
        let final_base = offsetting.apply(base, size);

        let loads_pc = load_store == LoadStoreKind::Load && register_list.get_bit(15);
        let bank = if load_psr && !loads_pc {
            Bank::User
        } else {
            self.active_bank()
        };

        match load_store {
            LoadStoreKind::Store => {
                for (index, &register) in registers.iter().enumerate() {
                    let address = lowest.wrapping_add(4 * index as u32);
                    // A base stored after the first slot is already updated.
                    let value = if register == REG_PROGRAM_COUNTER {
                        self.store_operand(register as u32)
                    } else if register == rn as usize && write_back && index != 0 {
                        final_base
                    } else {
                        self.banked_register(bank, register)
                    };
                    self.store(address, AccessWidth::Word, value);
                }
                self.write_back(write_back, rn, final_base)
            }
            LoadStoreKind::Load => {
                let values: Vec<u32> = (0..registers.len())
                    .map(|index| self.load(lowest.wrapping_add(4 * index as u32), AccessWidth::Word))
                    .collect();
                self.idle(1);

                let mut flow = self.write_back(write_back, rn, final_base);
                if self.data_aborted() {
                    return flow;
                }

                for (register, value) in registers.into_iter().zip(values) {
                    if register == REG_PROGRAM_COUNTER {
                        if load_psr {
                            self.restore_cpsr();
                        }
                        flow = self.jump(value);
                    } else {
                        self.set_banked_register(bank, register, value);
                    }
                }
                flow
            }
        }
    }

    fn single_data_swap(&mut self, byte: bool, rn: u32, rd: u32, rm: u32) -> Flow {
        let address = self.operand(rn);
        let value = self.operand(rm);

        let old = if byte {
            self.swap(address, AccessWidth::Byte, value)
        } else {
            self.swap(address, AccessWidth::Word, value)
                .rotate_right(8 * (address & 3))
        };

        if self.data_aborted() {
            return Flow::Next;
        }
        self.set_register(rd, old)
    }

    fn with_coprocessor<T>(
        &mut self,
        number: u32,
        call: impl FnOnce(&mut dyn Coprocessor) -> CopResponse<T>,
    ) -> CopResponse<T> {
        match self.coprocessors.get(number) {
            Some(coprocessor) => call(coprocessor),
            None => CopResponse::NotHandled,
        }
    }

    /// Nobody answered: the undefined trap, tagged with the empty slot when
    /// nothing is bound there.
    fn coprocessor_missing(&mut self, raw: u32, cp_number: u32) -> Flow {
        let flow = self.undefined(raw);
        if matches!(flow, Flow::Trap(_)) && !self.coprocessors.is_bound(cp_number) {
            self.last_exception = Some(CpuError::UnsupportedCoprocessor(cp_number));
        }
        flow
    }

    fn coprocessor_fault(&mut self, address: u32) -> Flow {
        self.exceptions.abort(address, AbortKind::Data);
        Flow::Trap(ExceptionKind::DataAbort)
    }

    fn coprocessor_data_operation(&mut self, raw: u32, cp_number: u32) -> Flow {
        match self.with_coprocessor(cp_number, |coprocessor| coprocessor.cdp(raw)) {
            CopResponse::Handled(()) => Flow::Next,
            CopResponse::NotHandled => self.coprocessor_missing(raw, cp_number),
            CopResponse::Fault => self.coprocessor_fault(self.pc()),
        }
    }

    fn coprocessor_register_transfer(
        &mut self,
        raw: u32,
        load_store: LoadStoreKind,
        rd: u32,
        cp_number: u32,
    ) -> Flow {
        match load_store {
            LoadStoreKind::Load => {
                match self.with_coprocessor(cp_number, |coprocessor| coprocessor.mrc(raw)) {
                    CopResponse::Handled(value) => {
                        self.coprocessor_wait(1);
                        // MRC to r15 only sets the flags.
                        if rd as usize == REG_PROGRAM_COUNTER {
                            self.cpsr.set_nzcv(value);
                            Flow::Next
                        } else {
                            self.set_register(rd, value)
                        }
                    }
                    CopResponse::NotHandled => self.coprocessor_missing(raw, cp_number),
                    CopResponse::Fault => self.coprocessor_fault(self.pc()),
                }
            }
            LoadStoreKind::Store => {
                let value = self.store_operand(rd);
                match self.with_coprocessor(cp_number, |coprocessor| coprocessor.mcr(raw, value)) {
                    CopResponse::Handled(()) => {
                        self.coprocessor_wait(1);
                        Flow::Next
                    }
                    CopResponse::NotHandled => self.coprocessor_missing(raw, cp_number),
                    CopResponse::Fault => self.coprocessor_fault(self.pc()),
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn coprocessor_data_transfer(
        &mut self,
        raw: u32,
        indexing: Indexing,
        offsetting: Offsetting,
        write_back: bool,
        load_store: LoadStoreKind,
        rn: u32,
        cp_number: u32,
        offset: u32,
    ) -> Flow {
        match self.with_coprocessor(cp_number, |coprocessor| coprocessor.accepts_transfer(raw)) {
            CopResponse::Handled(()) => {}
            CopResponse::NotHandled => return self.coprocessor_missing(raw, cp_number),
            CopResponse::Fault => return self.coprocessor_fault(self.pc()),
        }

        let base = self.operand(rn);
        let offset_address = offsetting.apply(base, offset * 4);
        let mut address = match indexing {
            Indexing::Pre => offset_address,
            Indexing::Post => base,
        };

        for index in 0..MAX_COPROCESSOR_WORDS {
            let response = match load_store {
                LoadStoreKind::Load => {
                    let value = self.load(address, AccessWidth::Word);
                    if self.data_aborted() {
                        break;
                    }
                    self.with_coprocessor(cp_number, |coprocessor| {
                        coprocessor.ldc(raw, index, value)
                    })
                }
                LoadStoreKind::Store => {
                    match self.with_coprocessor(cp_number, |coprocessor| {
                        coprocessor.stc(raw, index)
                    }) {
                        CopResponse::Handled((value, transfer)) => {
                            self.store(address, AccessWidth::Word, value);
                            CopResponse::Handled(transfer)
                        }
                        CopResponse::NotHandled => CopResponse::NotHandled,
                        CopResponse::Fault => CopResponse::Fault,
                    }
                }
            };

            match response {
                CopResponse::Handled(Transfer::More) if !self.data_aborted() => {}
                CopResponse::Handled(_) | CopResponse::NotHandled => break,
                CopResponse::Fault => return self.coprocessor_fault(address),
            }
            address = address.wrapping_add(4);
        }

        if self.data_aborted() {
            return Flow::Next;
        }
        self.write_back(write_back, rn, offset_address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EmulatorConfig;
    use crate::cpu::host::HostOs;
    use crate::cpu::psr::Psr;
    use crate::cpu::registers::Registers;
    use crate::memory::flat_memory::FlatMemory;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn cpu<'h>(program: &[u32]) -> Arm7tdmi<'h, FlatMemory> {
        let mut memory = FlatMemory::with_size(0x1000).unwrap();
        for (i, word) in program.iter().enumerate() {
            assert!(memory.write_word(i as u32 * 4, *word));
        }
        Arm7tdmi::new(memory, &EmulatorConfig::default())
    }

    fn reg(cpu: &Arm7tdmi<'_, FlatMemory>, register: usize) -> u32 {
        cpu.registers().register_at(register)
    }

    fn set(cpu: &mut Arm7tdmi<'_, FlatMemory>, register: usize, value: u32) {
        cpu.registers.set_register_at(register, value);
    }

    #[test]
    fn adds_sets_carry_and_zero() {
        // MVN r0, #0 / ADDS r1, r0, #1
        let mut cpu = cpu(&[0xE3E0_0000, 0xE290_1001]);
        cpu.step();
        cpu.step();

        assert_eq!(reg(&cpu, 1), 0);
        assert!(cpu.cpsr().carry_flag());
        assert!(cpu.cpsr().zero_flag());
        assert!(!cpu.cpsr().overflow_flag());
        assert!(!cpu.cpsr().sign_flag());
    }

    #[test]
    fn subs_detects_signed_overflow() {
        // SUBS r1, r0, #1
        let mut cpu = cpu(&[0xE250_1001]);
        set(&mut cpu, 0, 0x8000_0000);
        cpu.step();

        assert_eq!(reg(&cpu, 1), 0x7FFF_FFFF);
        assert!(cpu.cpsr().overflow_flag());
        assert!(cpu.cpsr().carry_flag());
        assert!(!cpu.cpsr().sign_flag());
    }

    #[test]
    fn flags_only_change_with_s() {
        // ADD r1, r0, #1
        let mut cpu = cpu(&[0xE280_1001]);
        set(&mut cpu, 0, u32::MAX);
        cpu.step();

        assert_eq!(reg(&cpu, 1), 0);
        assert!(!cpu.cpsr().zero_flag());
        assert!(!cpu.cpsr().carry_flag());
    }

    #[test]
    fn register_shift_reads_pc_one_word_further() {
        // ADD r0, r15, r1, LSL r2
        let mut cpu = cpu(&[0xE08F_0211]);
        cpu.step();

        assert_eq!(reg(&cpu, 0), 12);
        assert_eq!(cpu.counters().internal, 1);
    }

    #[test]
    fn movs_pc_restores_the_saved_status() {
        // MOVS pc, lr
        let mut cpu = cpu(&[0xE1B0_F00E]);
        cpu.set_spsr(u32::from(Mode::Supervisor), 0x2000_0010).unwrap();
        set(&mut cpu, 14, 0x100);
        cpu.step();

        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::User);
        assert!(cpu.cpsr().carry_flag());
        assert_eq!(cpu.pc(), 0x100);
    }

    #[test]
    fn misaligned_word_loads_rotate() {
        // LDR r0, [r1]
        let mut cpu = cpu(&[0xE591_0000]);
        cpu.bus.write_word(0x100, 0x1122_3344);
        set(&mut cpu, 1, 0x101);
        cpu.step();

        assert_eq!(reg(&cpu, 0), 0x4411_2233);
    }

    #[test]
    fn pre_and_post_indexing() {
        // STR r0, [r1, #4]! / LDR r2, [r3], #4
        let mut cpu = cpu(&[0xE5A1_0004, 0xE493_2004]);
        set(&mut cpu, 0, 0xDEAD);
        set(&mut cpu, 1, 0x100);
        set(&mut cpu, 3, 0x104);
        cpu.step();
        cpu.step();

        assert_eq!(cpu.bus.read_word(0x104), Some(0xDEAD));
        assert_eq!(reg(&cpu, 1), 0x104);
        assert_eq!(reg(&cpu, 2), 0xDEAD);
        assert_eq!(reg(&cpu, 3), 0x108);
    }

    #[test]
    fn loads_cost_a_non_sequential_and_an_internal_cycle() {
        // MOV r0, r0 / LDR r0, [r1]
        let mut cpu = cpu(&[0xE1A0_0000, 0xE591_0000]);
        set(&mut cpu, 1, 0x100);
        cpu.step();

        let before = cpu.counters();
        cpu.step();
        let after = cpu.counters();
        assert_eq!(after.non_sequential - before.non_sequential, 1);
        assert_eq!(after.internal - before.internal, 1);
        assert_eq!(after.sequential - before.sequential, 1);
    }

    #[rstest]
    // LDRH
    #[case(0xE1D1_00B0, 0x100, 0x0000_8180)]
    #[case(0xE1D1_00B0, 0x101, 0x8000_0081)]
    // LDRSB
    #[case(0xE1D1_00D0, 0x101, 0xFFFF_FF81)]
    #[case(0xE1D1_00D0, 0x102, 0x0000_0002)]
    // LDRSH
    #[case(0xE1D1_00F0, 0x100, 0xFFFF_8180)]
    #[case(0xE1D1_00F0, 0x101, 0xFFFF_FF81)]
    fn halfword_and_signed_loads(#[case] instruction: u32, #[case] address: u32, #[case] expected: u32) {
        let mut cpu = cpu(&[instruction]);
        cpu.bus.write_word(0x100, 0x8302_8180);
        set(&mut cpu, 1, address);
        cpu.step();

        assert_eq!(reg(&cpu, 0), expected);
    }

    #[test]
    fn strh_stores_the_low_half() {
        // STRH r0, [r1]
        let mut cpu = cpu(&[0xE1C1_00B0]);
        cpu.bus.write_word(0x100, 0xFFFF_FFFF);
        set(&mut cpu, 0, 0x1234_5678);
        set(&mut cpu, 1, 0x100);
        cpu.step();

        assert_eq!(cpu.bus.read_word(0x100), Some(0xFFFF_5678));
    }

    #[test]
    fn push_and_pop_through_the_stack() {
        // STMDB r13!, {r0, r1, r14} / LDMIA r13!, {r2, r3, r15}
        let mut cpu = cpu(&[0xE92D_4003, 0xE8BD_800C]);
        set(&mut cpu, 0, 0xA);
        set(&mut cpu, 1, 0xB);
        set(&mut cpu, 14, 0x200);
        set(&mut cpu, 13, 0x300);

        cpu.step();
        assert_eq!(reg(&cpu, 13), 0x2F4);
        assert_eq!(cpu.bus.read_word(0x2F4), Some(0xA));
        assert_eq!(cpu.bus.read_word(0x2F8), Some(0xB));
        assert_eq!(cpu.bus.read_word(0x2FC), Some(0x200));

        cpu.step();
        assert_eq!(reg(&cpu, 2), 0xA);
        assert_eq!(reg(&cpu, 3), 0xB);
        assert_eq!(reg(&cpu, 13), 0x300);
        assert_eq!(cpu.pc(), 0x200);
    }

    #[test]
    fn block_transfers_are_one_n_then_sequential() {
        // MOV r0, r0 / STMIA r0, {r1-r4}
        let mut cpu = cpu(&[0xE1A0_0000, 0xE880_001E]);
        set(&mut cpu, 0, 0x100);
        cpu.step();

        let before = cpu.counters();
        cpu.step();
        let after = cpu.counters();
        assert_eq!(after.non_sequential - before.non_sequential, 1);
        // Three data words and the fetch.
        assert_eq!(after.sequential - before.sequential, 4);
    }

    #[rstest]
    // STMIA r1!, {r0, r1}: base is not first, the new value is stored.
    #[case(0xE8A1_0003, 1, 0x108)]
    // STMIA r0!, {r0, r1}: base is first, the old value is stored.
    #[case(0xE8A0_0003, 0, 0x100)]
    fn stored_base_depends_on_its_position(
        #[case] instruction: u32,
        #[case] base: usize,
        #[case] stored: u32,
    ) {
        let mut cpu = cpu(&[instruction]);
        set(&mut cpu, 0, 0x100);
        set(&mut cpu, 1, 0x100);
        cpu.step();

        assert_eq!(cpu.bus.read_word(0x100 + 4 * base as u32), Some(stored));
    }

    #[test]
    fn empty_register_list_moves_pc_and_sixteen_words() {
        // LDMIA r0!, {}
        let mut cpu = cpu(&[0xE8B0_0000]);
        cpu.bus.write_word(0x100, 0x200);
        set(&mut cpu, 0, 0x100);
        cpu.step();

        assert_eq!(cpu.pc(), 0x200);
        assert_eq!(reg(&cpu, 0), 0x140);
    }

    #[test]
    fn caret_without_pc_uses_the_user_bank() {
        // STMIA r0, {r13}^
        let mut cpu = cpu(&[0xE8C0_2000]);
        cpu.set_reg(u32::from(Mode::User), 13, 0xAAAA).unwrap();
        set(&mut cpu, 13, 0xBBBB);
        set(&mut cpu, 0, 0x100);
        cpu.step();

        assert_eq!(cpu.bus.read_word(0x100), Some(0xAAAA));
    }

    #[test]
    fn caret_with_pc_restores_the_saved_status() {
        // LDMIA r0, {r15}^
        let mut cpu = cpu(&[0xE8D0_8000]);
        cpu.bus.write_word(0x100, 0x200);
        cpu.set_spsr(u32::from(Mode::Supervisor), 0x10).unwrap();
        set(&mut cpu, 0, 0x100);
        cpu.step();

        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::User);
        assert_eq!(cpu.pc(), 0x200);
    }

    #[test]
    fn multiplies() {
        // MUL r0, r1, r2 / MLAS r0, r1, r2, r3
        let mut cpu = cpu(&[0xE000_0291, 0xE030_3291]);
        set(&mut cpu, 1, 3);
        set(&mut cpu, 2, 5);
        cpu.step();
        assert_eq!(reg(&cpu, 0), 15);

        set(&mut cpu, 1, 2);
        set(&mut cpu, 2, u32::MAX);
        set(&mut cpu, 3, 2);
        cpu.step();
        assert_eq!(reg(&cpu, 0), 0);
        assert!(cpu.cpsr().zero_flag());
    }

    #[rstest]
    // UMULL r0, r1, r2, r3
    #[case(0xE081_0392, (0, 0), (0xFFFF_FFFE, 1))]
    // SMULL r0, r1, r2, r3
    #[case(0xE0C1_0392, (0, 0), (0xFFFF_FFFE, 0xFFFF_FFFF))]
    // SMLAL r0, r1, r2, r3
    #[case(0xE0E1_0392, (2, 0), (0, 0))]
    // UMLAL r0, r1, r2, r3
    #[case(0xE0A1_0392, (2, 0), (0, 2))]
    fn long_multiplies(
        #[case] instruction: u32,
        #[case] (lo, hi): (u32, u32),
        #[case] (expected_lo, expected_hi): (u32, u32),
    ) {
        let mut cpu = cpu(&[instruction]);
        set(&mut cpu, 0, lo);
        set(&mut cpu, 1, hi);
        set(&mut cpu, 2, u32::MAX);
        set(&mut cpu, 3, 2);
        cpu.step();

        assert_eq!((reg(&cpu, 0), reg(&cpu, 1)), (expected_lo, expected_hi));
    }

    #[test]
    fn multiply_timing_follows_the_multiplier() {
        // MOV r0, r0 / UMLAL r0, r1, r2, r3
        let mut cpu = cpu(&[0xE1A0_0000, 0xE0A1_0392]);
        set(&mut cpu, 3, 0x0001_0000);
        cpu.step();

        let before = cpu.counters().internal;
        cpu.step();
        // Three bytes of Rs, then long and accumulate.
        assert_eq!(cpu.counters().internal - before, 3 + 1 + 1);
    }

    #[test]
    fn swap_word_and_byte() {
        // SWP r0, r1, [r2] / SWPB r3, r1, [r4]
        let mut cpu = cpu(&[0xE102_0091, 0xE144_3091]);
        cpu.bus.write_word(0x100, 7);
        cpu.bus.write_word(0x200, 0x1234_5678);
        set(&mut cpu, 1, 0x9A);
        set(&mut cpu, 2, 0x100);
        set(&mut cpu, 4, 0x201);
        cpu.step();
        cpu.step();

        assert_eq!(reg(&cpu, 0), 7);
        assert_eq!(cpu.bus.read_word(0x100), Some(0x9A));
        assert_eq!(reg(&cpu, 3), 0x56);
        assert_eq!(cpu.bus.read_word(0x200), Some(0x1234_9A78));
    }

    #[test]
    fn mrs_and_msr() {
        // MSR CPSR_f, #0xF0000000 / MRS r0, CPSR
        let mut cpu = cpu(&[0xE328_F4F0, 0xE10F_0000]);
        cpu.step();
        cpu.step();

        assert_eq!(reg(&cpu, 0), 0xF000_00D3);
    }

    #[test]
    fn user_mode_msr_only_reaches_the_flags() {
        // MSR CPSR_fc, r0
        let mut cpu = cpu(&[0xE129_F000]);
        cpu.set_cpsr(0x10).unwrap();
        set(&mut cpu, 0, 0x8000_0013);
        cpu.step();

        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::User);
        assert!(cpu.cpsr().sign_flag());
    }

    #[test]
    fn msr_switches_mode_but_never_the_state() {
        // MSR CPSR_c, r0 / MOV r1, #1
        let mut cpu = cpu(&[0xE121_F000, 0xE3A0_1001]);
        set(&mut cpu, 0, 0x3F);
        cpu.step();
        cpu.step();

        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::System);
        assert_eq!(cpu.cpsr().cpu_state(), CpuState::Arm);
        assert_eq!(reg(&cpu, 1), 1);
    }

    #[test]
    fn msr_to_spsr_uses_the_field_mask() {
        // MSR SPSR_fc, r0
        let mut cpu = cpu(&[0xE169_F000]);
        cpu.set_spsr(u32::from(Mode::Supervisor), 0x0000_FF10).unwrap();
        set(&mut cpu, 0, 0xA000_0011);
        cpu.step();

        assert_eq!(
            u32::from(cpu.get_spsr(u32::from(Mode::Supervisor)).unwrap()),
            0xA000_FF11
        );
    }

    #[test]
    fn branch_with_link() {
        // BL +8 lands on 0x10
        let mut cpu = cpu(&[0xEB00_0002]);
        cpu.step();

        assert_eq!(cpu.pc(), 0x10);
        assert_eq!(reg(&cpu, 14), 4);
    }

    #[test]
    fn bx_enters_thumb() {
        // BX r0
        let mut cpu = cpu(&[0xE12F_FF10]);
        set(&mut cpu, 0, 0x201);
        cpu.step();

        assert_eq!(cpu.cpsr().cpu_state(), CpuState::Thumb);
        assert_eq!(cpu.pc(), 0x200);
        assert_eq!(cpu.r15(), 0x204);
    }

    #[test]
    fn bx_is_undefined_without_thumb() {
        let config = EmulatorConfig::default().with_properties(crate::config::ProcessorProperties {
            v4: false,
            ..Default::default()
        });
        let mut memory = FlatMemory::with_size(0x100).unwrap();
        memory.write_word(0, 0xE12F_FF10);
        let mut cpu = Arm7tdmi::new(memory, &config);
        cpu.step();

        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Undefined);
    }

    struct Services {
        calls: Vec<u32>,
    }

    impl HostOs for Services {
        fn handle_swi(
            &mut self,
            number: u32,
            registers: &mut Registers,
            _memory: &mut dyn MemoryInterface,
        ) -> bool {
            self.calls.push(number);
            registers.set_register_at(0, 42);
            number == 0x11
        }

        fn fix_cpsr(&mut self, _instruction: u32, mut value: Psr) -> Psr {
            value.set_overflow_flag(true);
            value
        }
    }

    #[test]
    fn host_services_software_interrupts() {
        let mut host = Services { calls: Vec::new() };
        // SWI 0x11 / SWI 0x12
        let mut cpu = cpu(&[0xEF00_0011, 0xEF00_0012]);
        cpu.set_host(&mut host);

        cpu.step();
        assert_eq!(reg(&cpu, 0), 42);
        assert_eq!(cpu.pc(), 4);
        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Supervisor);

        cpu.step();
        assert_eq!(cpu.pc(), 0x08);
        assert_eq!(reg(&cpu, 14), 0x08);
        drop(cpu);
        assert_eq!(host.calls, vec![0x11, 0x12]);
    }

    #[test]
    fn host_fixes_msr_values() {
        let mut host = Services { calls: Vec::new() };
        // MSR CPSR_f, #0xE0000000
        let mut cpu = cpu(&[0xE328_F4E0]);
        cpu.set_host(&mut host);
        cpu.step();

        assert!(cpu.cpsr().overflow_flag());
    }

    #[derive(Default)]
    struct Registers7 {
        registers: [u32; 16],
    }

    impl Coprocessor for Registers7 {
        fn cdp(&mut self, instruction: u32) -> CopResponse<()> {
            if instruction.get_bits(20..=23) == 0xF {
                CopResponse::Fault
            } else {
                CopResponse::Handled(())
            }
        }

        fn mrc(&mut self, instruction: u32) -> CopResponse<u32> {
            CopResponse::Handled(self.registers[instruction.get_bits(16..=19) as usize])
        }

        fn mcr(&mut self, instruction: u32, value: u32) -> CopResponse<()> {
            self.registers[instruction.get_bits(16..=19) as usize] = value;
            CopResponse::Handled(())
        }

        fn accepts_transfer(&mut self, _instruction: u32) -> CopResponse<()> {
            CopResponse::Handled(())
        }

        fn ldc(&mut self, instruction: u32, index: usize, value: u32) -> CopResponse<Transfer> {
            let crd = instruction.get_bits(12..=15) as usize;
            self.registers[crd + index] = value;
            CopResponse::Handled(if index == 1 { Transfer::Last } else { Transfer::More })
        }

        fn stc(&mut self, instruction: u32, index: usize) -> CopResponse<(u32, Transfer)> {
            let crd = instruction.get_bits(12..=15) as usize;
            let transfer = if index == 1 { Transfer::Last } else { Transfer::More };
            CopResponse::Handled((self.registers[crd + index], transfer))
        }
    }

    #[test]
    fn register_transfers_reach_the_bound_coprocessor() {
        let mut coprocessor = Registers7::default();
        // MCR p7, 0, r0, c1, c0 / MRC p7, 0, r1, c1, c0 / MRC p7, 0, r15, c1, c0
        let mut cpu = cpu(&[0xEE01_0710, 0xEE11_1710, 0xEE11_F710]);
        cpu.bind_coprocessor(7, &mut coprocessor).unwrap();
        set(&mut cpu, 0, 0x6000_0000);

        cpu.step();
        cpu.step();
        cpu.step();

        assert_eq!(reg(&cpu, 1), 0x6000_0000);
        assert!(cpu.cpsr().zero_flag());
        assert!(cpu.cpsr().carry_flag());
        assert_eq!(cpu.pc(), 12);
        assert_eq!(cpu.counters().coprocessor, 3);
        assert_eq!(cpu.read_coprocessor_register(7, 1), None);
    }

    #[test]
    fn ldc_and_stc_move_words_until_the_last() {
        let mut coprocessor = Registers7::default();
        // LDC p7, c1, [r2, #8]! / STC p7, c1, [r3]
        let mut cpu = cpu(&[0xEDB2_1702, 0xED83_1700]);
        cpu.bind_coprocessor(7, &mut coprocessor).unwrap();
        cpu.bus.write_word(0x108, 0x11);
        cpu.bus.write_word(0x10C, 0x22);
        cpu.bus.write_word(0x110, 0x33);
        set(&mut cpu, 2, 0x100);
        set(&mut cpu, 3, 0x200);

        cpu.step();
        assert_eq!(reg(&cpu, 2), 0x108);

        cpu.step();
        assert_eq!(cpu.bus.read_word(0x200), Some(0x11));
        assert_eq!(cpu.bus.read_word(0x204), Some(0x22));
        assert_eq!(cpu.bus.read_word(0x208), Some(0));
    }

    #[rstest]
    // LDR r0, [r1, #4]!
    #[case(0xE5B1_0004)]
    // STR r0, [r1], #4
    #[case(0xE481_0004)]
    // LDRH r0, [r1, #2]!
    #[case(0xE1F1_00B2)]
    // STRH r0, [r1], #2
    #[case(0xE0C1_00B2)]
    fn aborted_transfers_keep_the_base(#[case] op_code: u32) {
        let mut cpu = cpu(&[op_code]);
        set(&mut cpu, 0, 0x55);
        set(&mut cpu, 1, 0x8000);
        cpu.step();

        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Abort);
        assert_eq!(cpu.pc(), 0x10);
        assert_eq!(reg(&cpu, 1), 0x8000);
        assert_eq!(reg(&cpu, 0), 0x55);
    }

    #[test]
    fn aborted_ldc_keeps_the_base() {
        let mut coprocessor = Registers7::default();
        // LDC p7, c1, [r2, #8]!
        let mut cpu = cpu(&[0xEDB2_1702]);
        cpu.bind_coprocessor(7, &mut coprocessor).unwrap();
        set(&mut cpu, 2, 0x8000);
        cpu.step();

        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Abort);
        assert_eq!(reg(&cpu, 2), 0x8000);
    }

    #[test]
    fn coprocessor_faults_raise_data_aborts() {
        let mut coprocessor = Registers7::default();
        // CDP p7, 15, c1, c2, c3
        let mut cpu = cpu(&[0xEEF2_1703]);
        cpu.bind_coprocessor(7, &mut coprocessor).unwrap();
        cpu.step();

        assert_eq!(cpu.cpsr().mode().unwrap(), Mode::Abort);
        assert_eq!(cpu.pc(), 0x10);
        assert_eq!(reg(&cpu, 14), 8);
    }
}
