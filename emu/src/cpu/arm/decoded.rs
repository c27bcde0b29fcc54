//! The decoded form of an ARM instruction.
//!
//! One flat record holds every field any handler might need; the
//! [`ArmHandler`] tag says which subset is meaningful. Keeping the record
//! `Copy` lets the cache hand out values without borrowing itself across
//! execution.

use serde::{Deserialize, Serialize};

use crate::cpu::alu::ShiftKind;
use crate::cpu::condition::Condition;

/// Execute-handler selector stored in each decoded instruction.
///
/// A plain tag rather than a function pointer: the executor matches on it,
/// which keeps cache entries inert data.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmHandler {
    DataProcessing,
    Multiply,
    MultiplyLong,
    SingleDataSwap,
    BranchAndExchange,
    HalfwordTransfer,
    SingleDataTransfer,
    BlockDataTransfer,
    Branch,
    /// MRS: PSR to register.
    PsrRead,
    /// MSR: register or immediate to PSR fields.
    PsrWrite,
    SoftwareInterrupt,
    #[default]
    Undefined,
}

/// The 16 data-processing opcodes, bits 24-21.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum AluOp {
    #[default]
    And = 0x0,
    Eor = 0x1,
    Sub = 0x2,
    Rsb = 0x3,
    Add = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Rsc = 0x7,
    Tst = 0x8,
    Teq = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mov = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl AluOp {
    /// TST/TEQ/CMP/CMN only update flags.
    #[must_use]
    pub const fn writes_result(self) -> bool {
        !matches!(self, Self::Tst | Self::Teq | Self::Cmp | Self::Cmn)
    }
}

impl From<u32> for AluOp {
    fn from(bits: u32) -> Self {
        match bits & 0xF {
            0x0 => Self::And,
            0x1 => Self::Eor,
            0x2 => Self::Sub,
            0x3 => Self::Rsb,
            0x4 => Self::Add,
            0x5 => Self::Adc,
            0x6 => Self::Sbc,
            0x7 => Self::Rsc,
            0x8 => Self::Tst,
            0x9 => Self::Teq,
            0xA => Self::Cmp,
            0xB => Self::Cmn,
            0xC => Self::Orr,
            0xD => Self::Mov,
            0xE => Self::Bic,
            0xF => Self::Mvn,
            _ => unreachable!(),
        }
    }
}

impl std::fmt::Display for AluOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::And => "AND",
            Self::Eor => "EOR",
            Self::Sub => "SUB",
            Self::Rsb => "RSB",
            Self::Add => "ADD",
            Self::Adc => "ADC",
            Self::Sbc => "SBC",
            Self::Rsc => "RSC",
            Self::Tst => "TST",
            Self::Teq => "TEQ",
            Self::Cmp => "CMP",
            Self::Cmn => "CMN",
            Self::Orr => "ORR",
            Self::Mov => "MOV",
            Self::Bic => "BIC",
            Self::Mvn => "MVN",
        })
    }
}

/// SH bits of a halfword/signed transfer (bits 6-5).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HalfwordKind {
    #[default]
    UnsignedHalfword,
    SignedByte,
    SignedHalfword,
}

/// A fully decoded ARM instruction.
///
/// Created by [`decode_arm`](super::decode::decode_arm) on a cache miss and
/// destroyed by slot displacement or range invalidation. Fields outside the
/// handler's encoding keep their defaults.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedArm {
    /// The original instruction word, re-checked by the cache against
    /// memory on every hit.
    pub raw: u32,
    pub condition: Condition,
    pub handler: ArmHandler,
    pub alu_op: AluOp,

    pub rd: u8,
    pub rn: u8,
    pub rm: u8,
    pub rs: u8,
    pub rd_lo: u8,
    pub rd_hi: u8,

    /// Data-processing immediate (bits 7-0).
    pub imm8: u8,
    /// 4-bit rotate field; the applied rotation is twice this.
    pub rotate_imm: u8,
    pub shift_kind: ShiftKind,
    /// Immediate shift amount (bits 11-7).
    pub shift_amount: u8,
    /// The shift amount comes from Rs instead of `shift_amount`.
    pub shift_by_register: bool,

    /// LDM/STM register list (bits 15-0).
    pub register_list: u16,
    /// Sign-extended 24-bit branch offset shifted left two, with the +8
    /// pipeline adjustment already folded in.
    pub branch_offset: i32,
    /// 12-bit single-transfer or split halfword-transfer immediate offset.
    pub transfer_offset: u32,
    pub halfword_kind: HalfwordKind,
    /// MSR field mask (bits 19-16); bit 0 = control byte, bit 3 = flags.
    pub field_mask: u8,

    pub set_flags: bool,
    /// Operand 2 (or the transfer offset) is an immediate.
    pub immediate: bool,
    pub pre_index: bool,
    pub up: bool,
    pub write_back: bool,
    pub load: bool,
    pub byte: bool,
    pub link: bool,
    pub accumulate: bool,
    pub signed_op: bool,
    /// PSR transfer targets the (unmodelled) SPSR.
    pub use_spsr: bool,
    /// The instruction writes PC itself, so the outer loop must not
    /// advance it.
    pub pc_modified: bool,
}
