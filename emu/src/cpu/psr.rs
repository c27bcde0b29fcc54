//! Current Program Status Register.
//!
//! ```text
//! 31 30 29 28         8 7 6 5 4   0
//! ┌──┬──┬──┬──┬────────┬─┬─┬─┬─────┐
//! │N │Z │C │V │Reserved│I│F│T│Mode │
//! └──┴──┴──┴──┴────────┴─┴─┴─┴─────┘
//! ```
//!
//! - **Flags (28-31)**: tested by [`Condition`], updated by flag-setting
//!   instructions.
//! - **I/F (7/6)**: IRQ/FIQ disable.
//! - **T (5)**: ARM (0) or Thumb (1) state.
//! - **Mode (0-4)**: see [`Mode`](super::mode::Mode).
//!
//! This core does not model the per-mode SPSR copies; exception entry
//! changes CPSR in place and returning guests are expected to rebuild
//! their state (documented limitation).

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::alu::ArithmeticOpResult;
use crate::cpu::condition::Condition;
use crate::cpu::mode::Mode;

/// The CPSR, wrapping a raw `u32` with type-safe field accessors.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Psr(u32);

impl Psr {
    /// Evaluates a condition code against the current flags.
    #[must_use]
    pub fn can_execute(self, cond: Condition) -> bool {
        use Condition::{AL, CC, CS, EQ, GE, GT, HI, LE, LS, LT, MI, NE, NV, PL, VC, VS};
        match cond {
            EQ => self.zero_flag(),
            NE => !self.zero_flag(),
            CS => self.carry_flag(),
            CC => !self.carry_flag(),
            MI => self.sign_flag(),
            PL => !self.sign_flag(),
            VS => self.overflow_flag(),
            VC => !self.overflow_flag(),
            HI => self.carry_flag() && !self.zero_flag(),
            LS => !self.carry_flag() || self.zero_flag(),
            GE => self.sign_flag() == self.overflow_flag(),
            LT => self.sign_flag() != self.overflow_flag(),
            GT => !self.zero_flag() && (self.sign_flag() == self.overflow_flag()),
            LE => self.zero_flag() || (self.sign_flag() != self.overflow_flag()),
            AL => true,
            // Reserved from ARMv3 on; treated as "never".
            NV => false,
        }
    }

    /// N => Bit 31, set when the result is negative.
    #[must_use]
    pub fn sign_flag(self) -> bool {
        self.0.get_bit(31)
    }

    /// Z => Bit 30, set when the result is zero.
    #[must_use]
    pub fn zero_flag(self) -> bool {
        self.0.get_bit(30)
    }

    /// C => Bit 29, carry out / not-borrow.
    #[must_use]
    pub fn carry_flag(self) -> bool {
        self.0.get_bit(29)
    }

    /// V => Bit 28, signed overflow.
    #[must_use]
    pub fn overflow_flag(self) -> bool {
        self.0.get_bit(28)
    }

    /// I => Bit 7, (0=Enable, 1=Disable).
    #[must_use]
    pub fn irq_disable(self) -> bool {
        self.0.get_bit(7)
    }

    /// F => Bit 6, (0=Enable, 1=Disable).
    #[must_use]
    pub fn fiq_disable(self) -> bool {
        self.0.get_bit(6)
    }

    /// T => Bit 5, (0=ARM, 1=Thumb). Changed only through BX and exception
    /// entry.
    #[must_use]
    pub fn state_bit(self) -> bool {
        self.0.get_bit(5)
    }

    /// M4-M0 => Bits 4-0.
    ///
    /// Invalid mode bits cannot be produced through this crate's own write
    /// paths; if a stale snapshot carries them anyway, Supervisor is used
    /// as a safe default.
    #[must_use]
    pub fn mode(self) -> Mode {
        Mode::try_from(self.0).unwrap_or_else(|bits| {
            tracing::debug!("invalid mode bits 0b{bits:05b} in PSR=0x{:08X}", self.0);
            Mode::Supervisor
        })
    }

    pub fn set_sign_flag(&mut self, value: bool) {
        self.0.set_bit(31, value);
    }

    pub fn set_zero_flag(&mut self, value: bool) {
        self.0.set_bit(30, value);
    }

    pub fn set_carry_flag(&mut self, value: bool) {
        self.0.set_bit(29, value);
    }

    pub fn set_overflow_flag(&mut self, value: bool) {
        self.0.set_bit(28, value);
    }

    /// Applies all four flags of an arithmetic result.
    pub fn set_flags(&mut self, op_result: &ArithmeticOpResult) {
        self.set_sign_flag(op_result.sign);
        self.set_zero_flag(op_result.zero);
        self.set_carry_flag(op_result.carry);
        self.set_overflow_flag(op_result.overflow);
    }

    /// N and Z from a result, C from the shifter, V preserved. The rule for
    /// every logical operation.
    pub fn set_logical_flags(&mut self, result: u32, shifter_carry: bool) {
        self.set_sign_flag(result.get_bit(31));
        self.set_zero_flag(result == 0);
        self.set_carry_flag(shifter_carry);
    }

    pub fn set_irq_disable(&mut self, value: bool) {
        self.0.set_bit(7, value);
    }

    pub fn set_fiq_disable(&mut self, value: bool) {
        self.0.set_bit(6, value);
    }

    pub fn set_state_bit(&mut self, value: bool) {
        self.0.set_bit(5, value);
    }

    /// Writes the mode bits. This must only be reached through the bank
    /// swap primitive, which keeps the banked SP/LR consistent.
    pub(crate) const fn set_mode(&mut self, m: Mode) {
        self.0 &= !0b11111;
        self.0 |= m as u32;
    }

    /// Replaces the flag byte (bits 31-24), the `f` field of an MSR write.
    pub fn set_flags_field(&mut self, value: u32) {
        self.0 = (self.0 & 0x00FF_FFFF) | (value & 0xFF00_0000);
    }

    #[must_use]
    pub fn cpu_state(self) -> CpuState {
        self.state_bit().into()
    }

    pub fn set_cpu_state(&mut self, state: CpuState) {
        self.set_state_bit(state.into());
    }
}

impl From<Mode> for Psr {
    fn from(m: Mode) -> Self {
        let mut s = Self(0);
        s.set_mode(m);
        s
    }
}

impl From<Psr> for u32 {
    fn from(p: Psr) -> Self {
        p.0
    }
}

/// The CPU execution state (ARM or Thumb), the T bit made explicit.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CpuState {
    Arm,
    Thumb,
}

impl From<CpuState> for bool {
    fn from(state: CpuState) -> Self {
        match state {
            CpuState::Arm => false,
            CpuState::Thumb => true,
        }
    }
}

impl From<bool> for CpuState {
    fn from(state: bool) -> Self {
        if state { Self::Thumb } else { Self::Arm }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flag_accessors() {
        let mut cpsr = Psr::default();
        cpsr.set_sign_flag(true);
        assert!(cpsr.sign_flag());
        cpsr.set_zero_flag(true);
        assert!(cpsr.zero_flag());
        cpsr.set_carry_flag(true);
        assert!(cpsr.carry_flag());
        cpsr.set_overflow_flag(true);
        assert!(cpsr.overflow_flag());
        assert_eq!(u32::from(cpsr) >> 28, 0b1111);
    }

    #[test]
    fn control_bits() {
        let mut cpsr = Psr::default();
        cpsr.set_irq_disable(true);
        cpsr.set_fiq_disable(true);
        assert!(cpsr.irq_disable());
        assert!(cpsr.fiq_disable());

        assert_eq!(cpsr.cpu_state(), CpuState::Arm);
        cpsr.set_cpu_state(CpuState::Thumb);
        assert!(cpsr.state_bit());
        assert_eq!(cpsr.cpu_state(), CpuState::Thumb);
    }

    #[test]
    fn mode_round_trip() {
        for mode in [
            Mode::User,
            Mode::Fiq,
            Mode::Irq,
            Mode::Supervisor,
            Mode::Abort,
            Mode::Undefined,
            Mode::System,
        ] {
            let cpsr = Psr::from(mode);
            assert_eq!(cpsr.mode(), mode);
            assert_eq!(u32::from(cpsr) & 0b11111, mode as u32);
        }
    }

    #[test]
    fn flags_field_write_preserves_control_byte() {
        let mut cpsr = Psr::from(Mode::User);
        cpsr.set_irq_disable(true);
        cpsr.set_flags_field(0xF000_0000);
        assert!(cpsr.sign_flag() && cpsr.zero_flag() && cpsr.carry_flag() && cpsr.overflow_flag());
        assert!(cpsr.irq_disable());
        assert_eq!(cpsr.mode(), Mode::User);
    }

    /// The full ARMv4 condition truth table over all 16 flag vectors.
    #[test]
    fn condition_truth_table() {
        for flags in 0..16u32 {
            let mut cpsr = Psr::default();
            let n = flags.get_bit(3);
            let z = flags.get_bit(2);
            let c = flags.get_bit(1);
            let v = flags.get_bit(0);
            cpsr.set_sign_flag(n);
            cpsr.set_zero_flag(z);
            cpsr.set_carry_flag(c);
            cpsr.set_overflow_flag(v);

            assert_eq!(cpsr.can_execute(Condition::EQ), z);
            assert_eq!(cpsr.can_execute(Condition::NE), !z);
            assert_eq!(cpsr.can_execute(Condition::CS), c);
            assert_eq!(cpsr.can_execute(Condition::CC), !c);
            assert_eq!(cpsr.can_execute(Condition::MI), n);
            assert_eq!(cpsr.can_execute(Condition::PL), !n);
            assert_eq!(cpsr.can_execute(Condition::VS), v);
            assert_eq!(cpsr.can_execute(Condition::VC), !v);
            assert_eq!(cpsr.can_execute(Condition::HI), c && !z);
            assert_eq!(cpsr.can_execute(Condition::LS), !c || z);
            assert_eq!(cpsr.can_execute(Condition::GE), n == v);
            assert_eq!(cpsr.can_execute(Condition::LT), n != v);
            assert_eq!(cpsr.can_execute(Condition::GT), !z && n == v);
            assert_eq!(cpsr.can_execute(Condition::LE), z || n != v);
            assert!(cpsr.can_execute(Condition::AL));
            assert!(!cpsr.can_execute(Condition::NV));
        }
    }
}
