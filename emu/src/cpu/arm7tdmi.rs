//! The ARM7TDMI CPU record and its cooperative run loop.
//!
//! The processor state is an owned record: sixteen visible registers, the
//! CPSR, the banked SP/LR storage and the ARM decoded-instruction cache.
//! Memory, timing and the interrupt lines are borrowed for the duration
//! of one [`run`](Arm7tdmi::run) call and never retained.
//!
//! ## The execution cycle
//!
//! ```text
//! loop {
//!     T bit changed since entry?      ──▶ return StateChanged
//!     budget exhausted?               ──▶ return BudgetExhausted
//!     FIQ/IRQ pending and enabled?    ──▶ vector entry, return ExceptionTaken
//!     fetch at PC (word or halfword, by T)
//!     price the instruction (C10)
//!     does not fit before next event? ──▶ advance to event, process it, retry
//!     execute; advance PC unless the handler wrote it
//! }
//! ```
//!
//! Exception entry and every other mode change funnel through
//! [`swap_mode`](Arm7tdmi::swap_mode), the only place that touches the
//! register banks, so the CPSR mode field and the live SP/LR pair can
//! never drift apart.

use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::cpu::arm::cache::{CacheStats, InstructionCache};
use crate::cpu::arm::decode::decode_arm;
use crate::cpu::arm::timing::{self as arm_timing, EXCEPTION_CYCLES};
use crate::cpu::exception::Exception;
use crate::cpu::mode::Mode;
use crate::cpu::psr::{CpuState, Psr};
use crate::cpu::register_bank::RegisterBank;
use crate::cpu::registers::{REG_LR, REG_SP, Registers};
use crate::cpu::thumb::instruction::ThumbInstruction;
use crate::cpu::thumb::timing as thumb_timing;
use crate::interrupt::{InterruptController, InterruptKind};
use crate::timing::TimingState;

/// What a single executed instruction did to control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// PC untouched; the loop advances it by the instruction width.
    Sequential,
    /// The handler wrote PC itself (branch, interworking, loaded PC).
    PcWritten,
    /// The handler entered an exception; PC points at the vector.
    ExceptionEntered,
}

/// Why [`Arm7tdmi::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunExit {
    /// The cycle budget ran out.
    BudgetExhausted,
    /// The T bit flipped; re-enter to continue in the other state.
    StateChanged,
    /// An exception (SWI, Undefined, IRQ, FIQ) was entered.
    ExceptionTaken,
}

/// A by-value copy of the visible machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSnapshot {
    pub registers: [u32; 16],
    pub cpsr: u32,
}

/// The ARM7TDMI processor state.
#[derive(Serialize, Deserialize)]
pub struct Arm7tdmi {
    pub registers: Registers,
    pub cpsr: Psr,
    pub register_bank: RegisterBank,

    /// Rebuilt on demand; never part of a snapshot.
    #[serde(skip)]
    icache: InstructionCache,
}

impl Default for Arm7tdmi {
    fn default() -> Self {
        let mut cpsr = Psr::from(Mode::Supervisor);
        cpsr.set_cpu_state(CpuState::Arm);
        cpsr.set_irq_disable(true);
        cpsr.set_fiq_disable(true);

        Self {
            registers: Registers::default(),
            cpsr,
            register_bank: RegisterBank::default(),
            icache: InstructionCache::default(),
        }
    }
}

impl Arm7tdmi {
    /// Runs whole instructions until the budget is spent, the T bit flips
    /// or an exception fires.
    ///
    /// Instructions are priced before execution and never straddle the
    /// next timing event: when the next instruction does not fit, time is
    /// advanced to the event, timer and video events are processed, and
    /// the fetch is retried.
    pub fn run<B: Bus>(
        &mut self,
        bus: &mut B,
        timing: &mut TimingState,
        interrupts: &mut InterruptController,
        budget: u32,
    ) -> RunExit {
        let entry_state = self.cpsr.cpu_state();
        let mut remaining = i64::from(budget);

        loop {
            if self.cpsr.cpu_state() != entry_state {
                return RunExit::StateChanged;
            }
            if remaining <= 0 {
                return RunExit::BudgetExhausted;
            }

            // interrupts are sampled only between instructions
            if let Some(exception) = self.take_pending_interrupt(interrupts) {
                let return_address = self.registers.program_counter().wrapping_add(4);
                self.enter_exception(exception, return_address);
                timing.advance(EXCEPTION_CYCLES);
                return RunExit::ExceptionTaken;
            }

            let until_event = timing.cycles_until_next_event();
            let (cost, raw_word, raw_half) = match self.cpsr.cpu_state() {
                CpuState::Arm => {
                    let pc = self.registers.program_counter() & !0b11;
                    let raw = bus.read_word(pc);
                    (
                        arm_timing::cycles_for(raw, &self.registers, self.cpsr),
                        raw,
                        0,
                    )
                }
                CpuState::Thumb => {
                    let pc = self.registers.program_counter() & !0b1;
                    let raw = bus.read_half_word(pc);
                    (
                        thumb_timing::cycles_for(raw, &self.registers, self.cpsr),
                        0,
                        raw,
                    )
                }
            };

            if cost > until_event {
                // let the scheduled event happen first
                timing.advance(until_event);
                let _ = timing.process_timer_events();
                let _ = timing.process_video_events();
                remaining -= i64::from(until_event);
                continue;
            }

            let outcome = match self.cpsr.cpu_state() {
                CpuState::Arm => self.execute_fetched_arm(bus, raw_word),
                CpuState::Thumb => self.execute_fetched_thumb(bus, raw_half),
            };
            timing.advance(cost);
            remaining -= i64::from(cost);

            if outcome == ExecOutcome::ExceptionEntered {
                return RunExit::ExceptionTaken;
            }
        }
    }

    /// Executes exactly one instruction, returning its cycle cost.
    ///
    /// A debugging and test convenience: no event or interrupt handling.
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> u32 {
        match self.cpsr.cpu_state() {
            CpuState::Arm => {
                let pc = self.registers.program_counter() & !0b11;
                let raw = bus.read_word(pc);
                let cost = arm_timing::cycles_for(raw, &self.registers, self.cpsr);
                let _ = self.execute_fetched_arm(bus, raw);
                cost
            }
            CpuState::Thumb => {
                let pc = self.registers.program_counter() & !0b1;
                let raw = bus.read_half_word(pc);
                let cost = thumb_timing::cycles_for(raw, &self.registers, self.cpsr);
                let _ = self.execute_fetched_thumb(bus, raw);
                cost
            }
        }
    }

    /// Cache-assisted decode and execute of one fetched ARM word.
    fn execute_fetched_arm<B: Bus>(&mut self, bus: &mut B, raw: u32) -> ExecOutcome {
        let pc = self.registers.program_counter() & !0b11;
        // the record is Copy, so the cache borrow ends before execution
        let decoded = match self.icache.lookup(pc, raw) {
            Some(decoded) => *decoded,
            None => {
                let decoded = decode_arm(raw);
                self.icache.insert(pc, decoded);
                decoded
            }
        };

        if !self.cpsr.can_execute(decoded.condition) {
            self.registers.advance_program_counter(4);
            return ExecOutcome::Sequential;
        }
        let outcome = self.execute_arm(bus, &decoded);
        if outcome == ExecOutcome::Sequential {
            self.registers.advance_program_counter(4);
        }
        outcome
    }

    /// Decode and execute of one fetched Thumb halfword (no cache).
    fn execute_fetched_thumb<B: Bus>(&mut self, bus: &mut B, raw: u16) -> ExecOutcome {
        let instruction = ThumbInstruction::from(raw);
        let outcome = self.execute_thumb(bus, &instruction);
        if outcome == ExecOutcome::Sequential {
            self.registers.advance_program_counter(2);
        }
        outcome
    }

    /// The mode-switch primitive: banks the outgoing SP/LR, loads the
    /// incoming pair and updates the CPSR mode bits in one step.
    ///
    /// Every mode change (exception entry, MSR control writes) must come
    /// through here.
    pub fn swap_mode(&mut self, new_mode: Mode) {
        let current = self.cpsr.mode();
        if current == new_mode {
            return;
        }

        self.register_bank.save(
            current,
            self.registers.register_at(REG_SP),
            self.registers.register_at(REG_LR),
        );
        let (sp, lr) = self.register_bank.load(new_mode);
        self.registers.set_register_at(REG_SP, sp);
        self.registers.set_register_at(REG_LR, lr);
        self.cpsr.set_mode(new_mode);
    }

    /// Enters an exception: mode switch, banked LR write, interrupt
    /// masking, vector jump. The vector code runs in ARM state.
    pub(crate) fn enter_exception(&mut self, exception: Exception, return_address: u32) {
        self.swap_mode(exception.mode());
        self.registers.set_register_at(REG_LR, return_address);
        self.cpsr.set_irq_disable(true);
        if exception.disables_fiq() {
            self.cpsr.set_fiq_disable(true);
        }
        self.cpsr.set_cpu_state(CpuState::Arm);
        self.registers.set_program_counter(exception.vector());
    }

    fn take_pending_interrupt(&self, interrupts: &mut InterruptController) -> Option<Exception> {
        if interrupts.pending(InterruptKind::Fiq) && !self.cpsr.fiq_disable() {
            interrupts.acknowledge(InterruptKind::Fiq);
            return Some(Exception::Fiq);
        }
        if interrupts.pending(InterruptKind::Irq) && !self.cpsr.irq_disable() {
            interrupts.acknowledge(InterruptKind::Irq);
            return Some(Exception::Irq);
        }
        None
    }

    /// Flushes decoded-cache entries covering `start..=end`.
    ///
    /// An optimisation hint after rewriting code: the stored-raw-word
    /// check already catches stale entries on their next execution.
    pub fn invalidate_icache(&mut self, start: u32, end: u32) {
        tracing::trace!("icache invalidate 0x{start:08X}..=0x{end:08X}");
        self.icache.invalidate_range(start, end);
    }

    #[must_use]
    pub const fn icache_stats(&self) -> &CacheStats {
        self.icache.stats()
    }

    /// A by-value snapshot of registers and CPSR.
    #[must_use]
    pub fn state(&self) -> CpuSnapshot {
        CpuSnapshot {
            registers: self.registers.snapshot(),
            cpsr: self.cpsr.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SystemMemory;
    use pretty_assertions::assert_eq;

    const IWRAM: u32 = 0x0300_0000;

    fn load_arm(memory: &mut SystemMemory, base: u32, words: &[u32]) {
        for (i, word) in words.iter().enumerate() {
            memory.write_word(base + (i as u32) * 4, *word);
        }
    }

    fn machine() -> (Arm7tdmi, SystemMemory, TimingState, InterruptController) {
        (
            Arm7tdmi::default(),
            SystemMemory::default(),
            TimingState::default(),
            InterruptController::default(),
        )
    }

    #[test]
    fn mov_add_cmp_sequence() {
        let (mut cpu, mut memory, mut timing, mut interrupts) = machine();
        load_arm(
            &mut memory,
            IWRAM,
            &[
                0xE3A0_002A, // MOV R0, #42
                0xE280_100A, // ADD R1, R0, #10
                0xE351_0034, // CMP R1, #52
            ],
        );
        cpu.registers.set_program_counter(IWRAM);

        let exit = cpu.run(&mut memory, &mut timing, &mut interrupts, 3);
        assert_eq!(exit, RunExit::BudgetExhausted);
        assert_eq!(cpu.registers.register_at(0), 42);
        assert_eq!(cpu.registers.register_at(1), 52);
        assert!(cpu.cpsr.zero_flag());
        assert!(cpu.cpsr.carry_flag());
        assert!(!cpu.cpsr.sign_flag());
        assert!(!cpu.cpsr.overflow_flag());
        assert_eq!(cpu.registers.program_counter(), IWRAM + 12);
    }

    #[test]
    fn push_pop_through_memory() {
        let (mut cpu, mut memory, _timing, _interrupts) = machine();
        load_arm(
            &mut memory,
            IWRAM,
            &[
                0xE92D_400F, // STMDB SP!, {R0-R3, LR}
                0xE8BD_800F, // LDMIA SP!, {R0-R3, PC}
            ],
        );
        cpu.registers.set_program_counter(IWRAM);
        cpu.registers.set_register_at(REG_SP, 0x0300_8000);
        cpu.registers.set_register_at(REG_LR, 0x0800_0100);
        for reg in 0..4 {
            cpu.registers.set_register_at(reg, 0xA0 + reg as u32);
        }

        cpu.step(&mut memory);
        assert_eq!(cpu.registers.register_at(REG_SP), 0x0300_8000 - 20);

        for reg in 0..4 {
            cpu.registers.set_register_at(reg, 0);
        }
        cpu.step(&mut memory);

        assert_eq!(cpu.registers.program_counter(), 0x0800_0100);
        assert_eq!(cpu.registers.register_at(REG_SP), 0x0300_8000);
        for reg in 0..4 {
            assert_eq!(cpu.registers.register_at(reg), 0xA0 + reg as u32);
        }
    }

    #[test]
    fn swi_from_user_mode() {
        let (mut cpu, _, mut timing, mut interrupts) = machine();
        let mut memory = SystemMemory::with_rom(vec![0x42, 0x00, 0x00, 0xEF]); // SWI #0x42
        cpu.swap_mode(Mode::User);
        cpu.registers.set_program_counter(0x0800_0000);

        let exit = cpu.run(&mut memory, &mut timing, &mut interrupts, 16);
        assert_eq!(exit, RunExit::ExceptionTaken);
        assert_eq!(cpu.registers.program_counter(), 0x08);
        assert_eq!(cpu.cpsr.mode(), Mode::Supervisor);
        assert_eq!(cpu.registers.register_at(REG_LR), 0x0800_0004);
        assert!(cpu.cpsr.irq_disable());
        // the User SP/LR pair survives in its bank
        assert_eq!(cpu.register_bank.r14_usr, 0);
    }

    #[test]
    fn bx_to_thumb_reports_state_change() {
        let (mut cpu, mut memory, mut timing, mut interrupts) = machine();
        load_arm(&mut memory, IWRAM, &[0xE12F_FF10]); // BX R0
        cpu.registers.set_program_counter(IWRAM);
        cpu.registers.set_register_at(0, 0x0800_1001);

        let exit = cpu.run(&mut memory, &mut timing, &mut interrupts, 64);
        assert_eq!(exit, RunExit::StateChanged);
        assert_eq!(cpu.cpsr.cpu_state(), CpuState::Thumb);
        assert_eq!(cpu.registers.program_counter(), 0x0800_1000);
    }

    #[test]
    fn self_modifying_code_is_detected_without_invalidation() {
        let (mut cpu, mut memory, _timing, _interrupts) = machine();
        load_arm(&mut memory, IWRAM, &[0xE3A0_0001]); // MOV R0, #1
        cpu.registers.set_program_counter(IWRAM);
        cpu.step(&mut memory);
        assert_eq!(cpu.registers.register_at(0), 1);

        // rewrite the same PC, no invalidate call
        memory.write_word(IWRAM, 0xE3A0_0002); // MOV R0, #2
        cpu.registers.set_program_counter(IWRAM);
        cpu.step(&mut memory);
        assert_eq!(cpu.registers.register_at(0), 2);
    }

    #[test]
    fn explicit_invalidation_is_a_hint_not_a_requirement() {
        let (mut cpu, mut memory, _timing, _interrupts) = machine();
        load_arm(&mut memory, IWRAM, &[0xE3A0_0001]);
        cpu.registers.set_program_counter(IWRAM);
        cpu.step(&mut memory);
        let misses_before = cpu.icache_stats().misses;

        cpu.invalidate_icache(IWRAM, IWRAM + 4);
        cpu.registers.set_program_counter(IWRAM);
        cpu.step(&mut memory);
        assert_eq!(cpu.icache_stats().misses, misses_before + 1);
        assert_eq!(cpu.icache_stats().invalidations, 1);
    }

    #[test]
    fn cache_hits_on_a_loop() {
        let (mut cpu, mut memory, mut timing, mut interrupts) = machine();
        load_arm(
            &mut memory,
            IWRAM,
            &[
                0xE3A0_0005, // MOV R0, #5
                0xE250_0001, // loop: SUBS R0, R0, #1
                0x1AFF_FFFD, // BNE loop
            ],
        );
        cpu.registers.set_program_counter(IWRAM);

        // MOV(1) + 5*SUBS(1) + 4 taken BNE(3) + 1 skipped BNE(1)
        let exit = cpu.run(&mut memory, &mut timing, &mut interrupts, 19);
        assert_eq!(exit, RunExit::BudgetExhausted);
        assert_eq!(cpu.registers.register_at(0), 0);
        assert_eq!(cpu.registers.program_counter(), IWRAM + 12);
        // only the first pass through the loop body misses
        assert_eq!(cpu.icache_stats().misses, 3);
        assert_eq!(cpu.icache_stats().hits, 8);
    }

    #[test]
    fn skipped_condition_costs_one_cycle_and_advances() {
        let (mut cpu, mut memory, mut timing, mut interrupts) = machine();
        // Z is clear, so ADDEQ is skipped
        load_arm(&mut memory, IWRAM, &[0x0280_0001, 0xE3A0_1007]);
        cpu.registers.set_program_counter(IWRAM);

        let exit = cpu.run(&mut memory, &mut timing, &mut interrupts, 2);
        assert_eq!(exit, RunExit::BudgetExhausted);
        assert_eq!(cpu.registers.register_at(0), 0);
        assert_eq!(cpu.registers.register_at(1), 7);
        assert_eq!(timing.total_cycles(), 2);
    }

    #[test]
    fn irq_serviced_between_instructions() {
        let (mut cpu, mut memory, mut timing, mut interrupts) = machine();
        load_arm(&mut memory, IWRAM, &[0xE3A0_0001]);
        cpu.registers.set_program_counter(IWRAM);
        cpu.cpsr.set_irq_disable(false);
        interrupts.request(InterruptKind::Irq);

        let exit = cpu.run(&mut memory, &mut timing, &mut interrupts, 8);
        assert_eq!(exit, RunExit::ExceptionTaken);
        assert_eq!(cpu.cpsr.mode(), Mode::Irq);
        assert_eq!(cpu.registers.program_counter(), 0x18);
        assert_eq!(cpu.registers.register_at(REG_LR), IWRAM + 4);
        assert!(cpu.cpsr.irq_disable());
        assert!(!interrupts.pending(InterruptKind::Irq));
    }

    #[test]
    fn masked_irq_is_left_pending() {
        let (mut cpu, mut memory, mut timing, mut interrupts) = machine();
        load_arm(&mut memory, IWRAM, &[0xE3A0_0001]);
        cpu.registers.set_program_counter(IWRAM);
        interrupts.request(InterruptKind::Irq); // I is set by default

        let exit = cpu.run(&mut memory, &mut timing, &mut interrupts, 1);
        assert_eq!(exit, RunExit::BudgetExhausted);
        assert_eq!(cpu.registers.register_at(0), 1);
        assert!(interrupts.pending(InterruptKind::Irq));
    }

    #[test]
    fn fiq_wins_over_irq_and_masks_both() {
        let (mut cpu, mut memory, mut timing, mut interrupts) = machine();
        load_arm(&mut memory, IWRAM, &[0xE3A0_0001]);
        cpu.registers.set_program_counter(IWRAM);
        cpu.cpsr.set_irq_disable(false);
        cpu.cpsr.set_fiq_disable(false);
        interrupts.request(InterruptKind::Irq);
        interrupts.request(InterruptKind::Fiq);

        let exit = cpu.run(&mut memory, &mut timing, &mut interrupts, 8);
        assert_eq!(exit, RunExit::ExceptionTaken);
        assert_eq!(cpu.cpsr.mode(), Mode::Fiq);
        assert_eq!(cpu.registers.program_counter(), 0x1C);
        assert!(cpu.cpsr.irq_disable());
        assert!(cpu.cpsr.fiq_disable());
        assert!(interrupts.pending(InterruptKind::Irq));
    }

    #[test]
    fn thumb_sequence_runs_through_the_halfword_path() {
        let (mut cpu, mut memory, mut timing, mut interrupts) = machine();
        memory.write_half_word(IWRAM, 0b001_00_000_00101010); // MOV R0, #42
        memory.write_half_word(IWRAM + 2, 0b001_10_000_00001010); // ADD R0, #10
        cpu.cpsr.set_cpu_state(CpuState::Thumb);
        cpu.registers.set_program_counter(IWRAM);

        let exit = cpu.run(&mut memory, &mut timing, &mut interrupts, 2);
        assert_eq!(exit, RunExit::BudgetExhausted);
        assert_eq!(cpu.registers.register_at(0), 52);
        assert_eq!(cpu.registers.program_counter(), IWRAM + 4);
    }

    #[test]
    fn mode_swap_round_trip_restores_banks() {
        let (mut cpu, _memory, _timing, _interrupts) = machine();
        cpu.registers.set_register_at(REG_SP, 0x0300_7F00);
        cpu.registers.set_register_at(REG_LR, 0x0800_0040);

        cpu.swap_mode(Mode::Irq);
        assert_eq!(cpu.cpsr.mode(), Mode::Irq);
        assert_eq!(cpu.registers.register_at(REG_SP), 0);

        cpu.registers.set_register_at(REG_SP, 0x0300_7000);
        cpu.swap_mode(Mode::Supervisor);
        assert_eq!(cpu.registers.register_at(REG_SP), 0x0300_7F00);
        assert_eq!(cpu.registers.register_at(REG_LR), 0x0800_0040);
        assert_eq!(cpu.register_bank.r13_irq, 0x0300_7000);
    }

    #[test]
    fn state_snapshot_matches_registers() {
        let (mut cpu, _memory, _timing, _interrupts) = machine();
        cpu.registers.set_register_at(3, 0x1234);
        let snapshot = cpu.state();
        assert_eq!(snapshot.registers[3], 0x1234);
        assert_eq!(snapshot.cpsr, u32::from(cpu.cpsr));
    }

    #[test]
    fn timing_events_do_not_starve_execution() {
        let (mut cpu, mut memory, mut timing, mut interrupts) = machine();
        // advance close to the HBlank boundary so the first instruction
        // does not fit
        timing.advance(959);
        load_arm(&mut memory, IWRAM, &[0xE92D_400F]); // STMDB SP!, {R0-R3, LR}: 11 cycles
        cpu.registers.set_program_counter(IWRAM);
        cpu.registers.set_register_at(REG_SP, 0x0300_8000);

        let exit = cpu.run(&mut memory, &mut timing, &mut interrupts, 64);
        assert_eq!(exit, RunExit::BudgetExhausted);
        // the store happened after the event boundary
        assert_eq!(cpu.registers.register_at(REG_SP), 0x0300_8000 - 20);
        assert!(timing.in_hblank() || timing.total_cycles() > 960);
    }
}
