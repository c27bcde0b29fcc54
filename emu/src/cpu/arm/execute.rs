//! ARM execute handlers, one per decoded form.
//!
//! The run loop has already evaluated the condition; handlers only do the
//! work. Reads of R15 yield the current instruction address plus 8 (the
//! fetch pipeline made architectural). Handlers that write PC themselves
//! report [`ExecOutcome::PcWritten`] so the loop skips its own +4.
//!
//! Unaligned word/halfword addresses are force-aligned by masking; the
//! rotated-load quirk of real hardware is not modelled.

use crate::bitwise::Bits;
use crate::bus::Bus;
use crate::cpu::alu::{self, ShiftOutput};
use crate::cpu::arm::decoded::{AluOp, ArmHandler, DecodedArm, HalfwordKind};
use crate::cpu::arm7tdmi::{Arm7tdmi, ExecOutcome};
use crate::cpu::exception::Exception;
use crate::cpu::mode::Mode;
use crate::cpu::psr::CpuState;
use crate::cpu::registers::{REG_LR, REG_PC};

impl Arm7tdmi {
    /// Dispatches a decoded ARM instruction to its handler.
    pub(crate) fn execute_arm<B: Bus>(&mut self, bus: &mut B, decoded: &DecodedArm) -> ExecOutcome {
        match decoded.handler {
            ArmHandler::DataProcessing => self.arm_data_processing(decoded),
            ArmHandler::Multiply => self.arm_multiply(decoded),
            ArmHandler::MultiplyLong => self.arm_multiply_long(decoded),
            ArmHandler::SingleDataSwap => self.arm_single_data_swap(bus, decoded),
            ArmHandler::BranchAndExchange => self.arm_branch_and_exchange(decoded),
            ArmHandler::HalfwordTransfer => self.arm_halfword_transfer(bus, decoded),
            ArmHandler::SingleDataTransfer => self.arm_single_data_transfer(bus, decoded),
            ArmHandler::BlockDataTransfer => self.arm_block_data_transfer(bus, decoded),
            ArmHandler::Branch => self.arm_branch(decoded),
            ArmHandler::PsrRead => self.arm_psr_read(decoded),
            ArmHandler::PsrWrite => self.arm_psr_write(decoded),
            ArmHandler::SoftwareInterrupt => {
                let return_address = self.registers.program_counter().wrapping_add(4);
                self.enter_exception(Exception::SoftwareInterrupt, return_address);
                ExecOutcome::ExceptionEntered
            }
            ArmHandler::Undefined => {
                let return_address = self.registers.program_counter().wrapping_add(4);
                self.enter_exception(Exception::UndefinedInstruction, return_address);
                ExecOutcome::ExceptionEntered
            }
        }
    }

    /// Reads a register as an instruction operand, applying the ARM
    /// pipeline offset to R15.
    pub(crate) fn arm_operand(&self, reg: u8) -> u32 {
        let reg = usize::from(reg);
        if reg == REG_PC {
            self.registers.program_counter().wrapping_add(8)
        } else {
            self.registers.register_at(reg)
        }
    }

    /// Computes operand2 and the shifter carry-out.
    fn arm_operand2(&self, decoded: &DecodedArm) -> ShiftOutput {
        let carry = self.cpsr.carry_flag();
        if decoded.immediate {
            return alu::rotated_immediate(decoded.imm8.into(), decoded.rotate_imm.into(), carry);
        }

        let value = self.arm_operand(decoded.rm);
        if decoded.shift_by_register {
            // only the low byte of Rs participates; zero bypasses the
            // shifter entirely (no amount-0 reinterpretation)
            let amount = self.arm_operand(decoded.rs) & 0xFF;
            if amount == 0 {
                ShiftOutput { value, carry }
            } else {
                alu::shift(decoded.shift_kind, amount, value, carry)
            }
        } else {
            alu::shift(decoded.shift_kind, decoded.shift_amount.into(), value, carry)
        }
    }

    fn arm_data_processing(&mut self, decoded: &DecodedArm) -> ExecOutcome {
        let op1 = self.arm_operand(decoded.rn);
        let ShiftOutput {
            value: op2,
            carry: shifter_carry,
        } = self.arm_operand2(decoded);
        let carry_in = self.cpsr.carry_flag();

        let writes_flags = decoded.set_flags && usize::from(decoded.rd) != REG_PC;
        if decoded.set_flags && !writes_flags && decoded.alu_op.writes_result() {
            // S=1 with Rd=15 would restore CPSR from the unmodelled SPSR
            tracing::debug!(
                "flag-setting write to PC at 0x{:08X}: SPSR restore unmodelled",
                self.registers.program_counter()
            );
        }

        let result = match decoded.alu_op {
            AluOp::And | AluOp::Tst => {
                let result = op1 & op2;
                if writes_flags || !decoded.alu_op.writes_result() {
                    self.cpsr.set_logical_flags(result, shifter_carry);
                }
                result
            }
            AluOp::Eor | AluOp::Teq => {
                let result = op1 ^ op2;
                if writes_flags || !decoded.alu_op.writes_result() {
                    self.cpsr.set_logical_flags(result, shifter_carry);
                }
                result
            }
            AluOp::Orr => {
                let result = op1 | op2;
                if writes_flags {
                    self.cpsr.set_logical_flags(result, shifter_carry);
                }
                result
            }
            AluOp::Bic => {
                let result = op1 & !op2;
                if writes_flags {
                    self.cpsr.set_logical_flags(result, shifter_carry);
                }
                result
            }
            AluOp::Mov => {
                if writes_flags {
                    self.cpsr.set_logical_flags(op2, shifter_carry);
                }
                op2
            }
            AluOp::Mvn => {
                let result = !op2;
                if writes_flags {
                    self.cpsr.set_logical_flags(result, shifter_carry);
                }
                result
            }
            AluOp::Sub | AluOp::Cmp => {
                let op = alu::sub(op1, op2);
                if writes_flags || !decoded.alu_op.writes_result() {
                    self.cpsr.set_flags(&op);
                }
                op.result
            }
            AluOp::Rsb => {
                let op = alu::sub(op2, op1);
                if writes_flags {
                    self.cpsr.set_flags(&op);
                }
                op.result
            }
            AluOp::Add | AluOp::Cmn => {
                let op = alu::add(op1, op2);
                if writes_flags || !decoded.alu_op.writes_result() {
                    self.cpsr.set_flags(&op);
                }
                op.result
            }
            AluOp::Adc => {
                let op = alu::adc(op1, op2, carry_in);
                if writes_flags {
                    self.cpsr.set_flags(&op);
                }
                op.result
            }
            AluOp::Sbc => {
                let op = alu::sbc(op1, op2, carry_in);
                if writes_flags {
                    self.cpsr.set_flags(&op);
                }
                op.result
            }
            AluOp::Rsc => {
                let op = alu::sbc(op2, op1, carry_in);
                if writes_flags {
                    self.cpsr.set_flags(&op);
                }
                op.result
            }
        };

        if !decoded.alu_op.writes_result() {
            return ExecOutcome::Sequential;
        }
        if usize::from(decoded.rd) == REG_PC {
            self.registers.set_program_counter(result & !0b11);
            return ExecOutcome::PcWritten;
        }
        self.registers.set_register_at(decoded.rd.into(), result);
        ExecOutcome::Sequential
    }

    fn arm_multiply(&mut self, decoded: &DecodedArm) -> ExecOutcome {
        let mut result = self
            .arm_operand(decoded.rm)
            .wrapping_mul(self.arm_operand(decoded.rs));
        if decoded.accumulate {
            result = result.wrapping_add(self.arm_operand(decoded.rn));
        }
        self.registers.set_register_at(decoded.rd.into(), result);
        if decoded.set_flags {
            // C and V are left untouched (unpredictable on ARMv4)
            self.cpsr.set_sign_flag(result.get_bit(31));
            self.cpsr.set_zero_flag(result == 0);
        }
        ExecOutcome::Sequential
    }

    fn arm_multiply_long(&mut self, decoded: &DecodedArm) -> ExecOutcome {
        let rm = self.arm_operand(decoded.rm);
        let rs = self.arm_operand(decoded.rs);
        let mut result: u64 = if decoded.signed_op {
            i64::from(rm as i32).wrapping_mul(i64::from(rs as i32)) as u64
        } else {
            u64::from(rm) * u64::from(rs)
        };
        if decoded.accumulate {
            let accumulator = (u64::from(self.registers.register_at(decoded.rd_hi.into())) << 32)
                | u64::from(self.registers.register_at(decoded.rd_lo.into()));
            result = result.wrapping_add(accumulator);
        }
        self.registers
            .set_register_at(decoded.rd_lo.into(), result as u32);
        self.registers
            .set_register_at(decoded.rd_hi.into(), (result >> 32) as u32);
        if decoded.set_flags {
            self.cpsr.set_sign_flag(result.get_bit(63));
            self.cpsr.set_zero_flag(result == 0);
        }
        ExecOutcome::Sequential
    }

    fn arm_single_data_swap<B: Bus>(&mut self, bus: &mut B, decoded: &DecodedArm) -> ExecOutcome {
        let address = self.arm_operand(decoded.rn);
        let source = self.arm_operand(decoded.rm);
        let loaded = if decoded.byte {
            let loaded = bus.read_byte(address);
            bus.write_byte(address, source as u8);
            u32::from(loaded)
        } else {
            let aligned = address & !0b11;
            let loaded = bus.read_word(aligned);
            bus.write_word(aligned, source);
            loaded
        };
        self.registers.set_register_at(decoded.rd.into(), loaded);
        ExecOutcome::Sequential
    }

    fn arm_branch_and_exchange(&mut self, decoded: &DecodedArm) -> ExecOutcome {
        let target = self.arm_operand(decoded.rm);
        if target.get_bit(0) {
            self.cpsr.set_cpu_state(CpuState::Thumb);
            self.registers.set_program_counter(target & !0b1);
        } else {
            self.cpsr.set_cpu_state(CpuState::Arm);
            self.registers.set_program_counter(target & !0b11);
        }
        ExecOutcome::PcWritten
    }

    fn arm_branch(&mut self, decoded: &DecodedArm) -> ExecOutcome {
        let pc = self.registers.program_counter();
        if decoded.link {
            self.registers
                .set_register_at(REG_LR, pc.wrapping_add(4));
        }
        self.registers
            .set_program_counter(pc.wrapping_add_signed(decoded.branch_offset));
        ExecOutcome::PcWritten
    }

    fn arm_single_data_transfer<B: Bus>(
        &mut self,
        bus: &mut B,
        decoded: &DecodedArm,
    ) -> ExecOutcome {
        let offset = if decoded.immediate {
            decoded.transfer_offset
        } else {
            let value = self.arm_operand(decoded.rm);
            alu::shift(
                decoded.shift_kind,
                decoded.shift_amount.into(),
                value,
                self.cpsr.carry_flag(),
            )
            .value
        };

        let mut base = self.arm_operand(decoded.rn);
        if usize::from(decoded.rn) == REG_PC {
            // PC-relative transfers use the word-aligned base
            base &= !0b11;
        }
        let stepped = if decoded.up {
            base.wrapping_add(offset)
        } else {
            base.wrapping_sub(offset)
        };
        let address = if decoded.pre_index { stepped } else { base };
        // post-indexing always writes the stepped address back
        let write_back = !decoded.pre_index || decoded.write_back;

        if decoded.load {
            let value = if decoded.byte {
                u32::from(bus.read_byte(address))
            } else {
                bus.read_word(address & !0b11)
            };
            if write_back {
                self.registers.set_register_at(decoded.rn.into(), stepped);
            }
            if usize::from(decoded.rd) == REG_PC {
                self.registers.set_program_counter(value & !0b11);
                return ExecOutcome::PcWritten;
            }
            // a loaded Rd wins over the write-back when Rd == Rn
            self.registers.set_register_at(decoded.rd.into(), value);
        } else {
            let value = self.arm_operand(decoded.rd);
            if decoded.byte {
                bus.write_byte(address, value as u8);
            } else {
                bus.write_word(address & !0b11, value);
            }
            if write_back {
                self.registers.set_register_at(decoded.rn.into(), stepped);
            }
        }
        ExecOutcome::Sequential
    }

    fn arm_halfword_transfer<B: Bus>(&mut self, bus: &mut B, decoded: &DecodedArm) -> ExecOutcome {
        let offset = if decoded.immediate {
            decoded.transfer_offset
        } else {
            self.arm_operand(decoded.rm)
        };

        let base = self.arm_operand(decoded.rn);
        let stepped = if decoded.up {
            base.wrapping_add(offset)
        } else {
            base.wrapping_sub(offset)
        };
        let address = if decoded.pre_index { stepped } else { base };
        let write_back = !decoded.pre_index || decoded.write_back;

        if decoded.load {
            let value = match decoded.halfword_kind {
                HalfwordKind::UnsignedHalfword => u32::from(bus.read_half_word(address & !0b1)),
                HalfwordKind::SignedHalfword => {
                    bus.read_half_word(address & !0b1) as i16 as i32 as u32
                }
                HalfwordKind::SignedByte => bus.read_byte(address) as i8 as i32 as u32,
            };
            if write_back {
                self.registers.set_register_at(decoded.rn.into(), stepped);
            }
            if usize::from(decoded.rd) == REG_PC {
                self.registers.set_program_counter(value & !0b11);
                return ExecOutcome::PcWritten;
            }
            self.registers.set_register_at(decoded.rd.into(), value);
        } else {
            let value = self.arm_operand(decoded.rd);
            bus.write_half_word(address & !0b1, value as u16);
            if write_back {
                self.registers.set_register_at(decoded.rn.into(), stepped);
            }
        }
        ExecOutcome::Sequential
    }

    fn arm_block_data_transfer<B: Bus>(
        &mut self,
        bus: &mut B,
        decoded: &DecodedArm,
    ) -> ExecOutcome {
        let list = decoded.register_list;
        let total = 4 * list.count_ones();
        let base = self.registers.register_at(decoded.rn.into());

        // the four addressing modes collapse to a start address plus an
        // always-ascending walk
        let start = match (decoded.pre_index, decoded.up) {
            (false, true) => base,                                      // IA
            (true, true) => base.wrapping_add(4),                       // IB
            (false, false) => base.wrapping_sub(total).wrapping_add(4), // DA
            (true, false) => base.wrapping_sub(total),                  // DB
        };
        let new_base = if decoded.up {
            base.wrapping_add(total)
        } else {
            base.wrapping_sub(total)
        };

        if decoded.set_flags {
            tracing::debug!(
                "LDM/STM with S bit at 0x{:08X}: user-bank transfer unmodelled",
                self.registers.program_counter()
            );
        }

        if decoded.load {
            // write-back first so a loaded Rn overrides it
            if decoded.write_back {
                self.registers.set_register_at(decoded.rn.into(), new_base);
            }
            let mut address = start;
            let mut outcome = ExecOutcome::Sequential;
            for reg in 0..16u8 {
                if !list.get_bit(reg) {
                    continue;
                }
                let value = bus.read_word(address & !0b11);
                if usize::from(reg) == REG_PC {
                    self.registers.set_program_counter(value & !0b11);
                    outcome = ExecOutcome::PcWritten;
                } else {
                    self.registers.set_register_at(reg.into(), value);
                }
                address = address.wrapping_add(4);
            }
            outcome
        } else {
            // stores see the original Rn; PC stores with the extra +4 on
            // top of the usual pipeline offset
            let pc_value = self.registers.program_counter().wrapping_add(12);
            let mut address = start;
            for reg in 0..16u8 {
                if !list.get_bit(reg) {
                    continue;
                }
                let value = if usize::from(reg) == REG_PC {
                    pc_value
                } else {
                    self.registers.register_at(reg.into())
                };
                bus.write_word(address & !0b11, value);
                address = address.wrapping_add(4);
            }
            if decoded.write_back {
                self.registers.set_register_at(decoded.rn.into(), new_base);
            }
            ExecOutcome::Sequential
        }
    }

    fn arm_psr_read(&mut self, decoded: &DecodedArm) -> ExecOutcome {
        let value = if decoded.use_spsr {
            tracing::debug!("MRS from SPSR: register bank unmodelled, returning 0");
            0
        } else {
            u32::from(self.cpsr)
        };
        self.registers.set_register_at(decoded.rd.into(), value);
        ExecOutcome::Sequential
    }

    fn arm_psr_write(&mut self, decoded: &DecodedArm) -> ExecOutcome {
        let operand = if decoded.immediate {
            alu::rotated_immediate(
                decoded.imm8.into(),
                decoded.rotate_imm.into(),
                self.cpsr.carry_flag(),
            )
            .value
        } else {
            self.arm_operand(decoded.rm)
        };

        if decoded.use_spsr {
            tracing::debug!("MSR to SPSR: register bank unmodelled, write dropped");
            return ExecOutcome::Sequential;
        }

        if decoded.field_mask.get_bit(3) {
            self.cpsr.set_flags_field(operand);
        }
        if decoded.field_mask.get_bit(0) {
            // mode changes must go through the bank-swap primitive
            match Mode::try_from(operand) {
                Ok(mode) => self.swap_mode(mode),
                Err(bits) => {
                    tracing::warn!("MSR writes invalid mode bits 0b{bits:05b}; mode unchanged");
                }
            }
            self.cpsr.set_irq_disable(operand.get_bit(7));
            self.cpsr.set_fiq_disable(operand.get_bit(6));
            if operand.get_bit(5) != self.cpsr.state_bit() {
                tracing::warn!("MSR cannot flip the T bit; use BX");
            }
        }
        ExecOutcome::Sequential
    }
}
