//! Thumb instruction decoding.
//!
//! The nineteen formats are identified from the high bits of the
//! halfword:
//!
//! ```text
//! Format 1:  000xx        Move shifted register
//! Format 2:  00011        Add/subtract
//! Format 3:  001xx        Move/compare/add/subtract immediate
//! Format 4:  010000       ALU operations
//! Format 5:  010001       Hi register operations / BX
//! Format 6:  01001        PC-relative load
//! Format 7:  0101xx0      Load/store with register offset
//! Format 8:  0101xx1      Load/store sign-extended byte/halfword
//! Format 9:  011xx        Load/store with immediate offset
//! Format 10: 1000x        Load/store halfword
//! Format 11: 1001x        SP-relative load/store
//! Format 12: 1010x        Load address
//! Format 13: 10110000     Add offset to stack pointer
//! Format 14: 1011x10x     Push/pop registers
//! Format 15: 1100x        Multiple load/store
//! Format 16: 1101xxxx     Conditional branch
//! Format 17: 11011111     Software interrupt
//! Format 18: 11100        Unconditional branch
//! Format 19: 1111x        Long branch with link
//! ```
//!
//! Offsets are pre-scaled here (word offsets shifted left two, branch
//! offsets shifted left one and sign-extended) so the executor works in
//! byte addresses throughout.

use serde::{Deserialize, Serialize};

use crate::bitwise::Bits;
use crate::cpu::alu::ShiftKind;
use crate::cpu::condition::Condition;

/// Format 3 operations (immediate forms).
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum ImmediateOp {
    Mov,
    Cmp,
    Add,
    Sub,
}

impl From<u16> for ImmediateOp {
    fn from(op: u16) -> Self {
        match op & 0b11 {
            0 => Self::Mov,
            1 => Self::Cmp,
            2 => Self::Add,
            3 => Self::Sub,
            _ => unreachable!(),
        }
    }
}

/// The sixteen format 4 register-register operations.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum ThumbAluOp {
    And = 0x0,
    Eor = 0x1,
    Lsl = 0x2,
    Lsr = 0x3,
    Asr = 0x4,
    Adc = 0x5,
    Sbc = 0x6,
    Ror = 0x7,
    Tst = 0x8,
    Neg = 0x9,
    Cmp = 0xA,
    Cmn = 0xB,
    Orr = 0xC,
    Mul = 0xD,
    Bic = 0xE,
    Mvn = 0xF,
}

impl From<u16> for ThumbAluOp {
    fn from(op: u16) -> Self {
        match op & 0xF {
            0x0 => Self::And,
            0x1 => Self::Eor,
            0x2 => Self::Lsl,
            0x3 => Self::Lsr,
            0x4 => Self::Asr,
            0x5 => Self::Adc,
            0x6 => Self::Sbc,
            0x7 => Self::Ror,
            0x8 => Self::Tst,
            0x9 => Self::Neg,
            0xA => Self::Cmp,
            0xB => Self::Cmn,
            0xC => Self::Orr,
            0xD => Self::Mul,
            0xE => Self::Bic,
            0xF => Self::Mvn,
            _ => unreachable!(),
        }
    }
}

/// Format 5 operations on the full register range.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum HiRegisterOp {
    Add,
    Cmp,
    Mov,
    Bx,
}

impl From<u16> for HiRegisterOp {
    fn from(op: u16) -> Self {
        match op & 0b11 {
            0 => Self::Add,
            1 => Self::Cmp,
            2 => Self::Mov,
            3 => Self::Bx,
            _ => unreachable!(),
        }
    }
}

/// A classified Thumb instruction with its fields extracted.
#[derive(Debug, PartialEq, Eq, Copy, Clone, Serialize, Deserialize)]
pub enum ThumbInstruction {
    MoveShifted {
        shift_kind: ShiftKind,
        offset: u16,
        rs: u16,
        rd: u16,
    },
    AddSubtract {
        immediate: bool,
        subtract: bool,
        /// Rn or the 3-bit immediate, by `immediate`.
        value: u16,
        rs: u16,
        rd: u16,
    },
    MoveCompareAddSubImm {
        op: ImmediateOp,
        rd: u16,
        imm8: u32,
    },
    AluOperation {
        op: ThumbAluOp,
        rs: u16,
        rd: u16,
    },
    HiRegisterOp {
        op: HiRegisterOp,
        /// Source register, 0-15.
        rs: u16,
        /// Destination register, 0-15.
        rd: u16,
    },
    PcRelativeLoad {
        rd: u16,
        /// Word-aligned literal-pool offset, already scaled.
        offset: u32,
    },
    LoadStoreRegisterOffset {
        load: bool,
        byte: bool,
        ro: u16,
        rb: u16,
        rd: u16,
    },
    LoadStoreSignExtended {
        /// The S bit: sign-extend the loaded value.
        sign_extend: bool,
        /// The H bit: halfword rather than byte.
        halfword: bool,
        ro: u16,
        rb: u16,
        rd: u16,
    },
    LoadStoreImmOffset {
        load: bool,
        byte: bool,
        /// Byte offset, pre-scaled for word transfers.
        offset: u32,
        rb: u16,
        rd: u16,
    },
    LoadStoreHalfword {
        load: bool,
        /// Byte offset, pre-scaled.
        offset: u32,
        rb: u16,
        rd: u16,
    },
    SpRelativeLoadStore {
        load: bool,
        rd: u16,
        /// Byte offset, pre-scaled.
        offset: u32,
    },
    LoadAddress {
        /// Base is SP rather than the aligned PC.
        from_sp: bool,
        rd: u16,
        offset: u32,
    },
    AddOffsetToSp {
        negative: bool,
        offset: u32,
    },
    PushPop {
        /// POP rather than PUSH.
        load: bool,
        /// Include LR in the push / PC in the pop.
        pc_lr: bool,
        register_list: u16,
    },
    MultipleLoadStore {
        load: bool,
        rb: u16,
        register_list: u16,
    },
    ConditionalBranch {
        condition: Condition,
        /// Signed byte offset from PC+4.
        offset: i32,
    },
    SoftwareInterrupt,
    UnconditionalBranch {
        offset: i32,
    },
    LongBranchLink {
        /// Second halfword of the pair (adds the low part and branches).
        low: bool,
        offset: u32,
    },
    /// Unallocated encoding; raises the Undefined exception.
    Undefined,
}

impl From<u16> for ThumbInstruction {
    #[allow(clippy::too_many_lines)]
    fn from(op_code: u16) -> Self {
        if op_code.get_bits(8..=15) == 0b1101_1111 {
            Self::SoftwareInterrupt
        } else if op_code.get_bits(8..=15) == 0b1011_0000 {
            Self::AddOffsetToSp {
                negative: op_code.get_bit(7),
                offset: u32::from(op_code.get_bits(0..=6)) << 2,
            }
        } else if op_code.get_bits(10..=15) == 0b01_0000 {
            Self::AluOperation {
                op: ThumbAluOp::from(op_code.get_bits(6..=9)),
                rs: op_code.get_bits(3..=5),
                rd: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(10..=15) == 0b01_0001 {
            // H1/H2 extend both register fields to the full range
            let rd = op_code.get_bits(0..=2) | (u16::from(op_code.get_bit(7)) << 3);
            Self::HiRegisterOp {
                op: HiRegisterOp::from(op_code.get_bits(8..=9)),
                rs: op_code.get_bits(3..=6),
                rd,
            }
        } else if op_code.get_bits(12..=15) == 0b1011 && op_code.get_bits(9..=10) == 0b10 {
            Self::PushPop {
                load: op_code.get_bit(11),
                pc_lr: op_code.get_bit(8),
                register_list: op_code.get_bits(0..=7),
            }
        } else if op_code.get_bits(11..=15) == 0b00011 {
            Self::AddSubtract {
                immediate: op_code.get_bit(10),
                subtract: op_code.get_bit(9),
                value: op_code.get_bits(6..=8),
                rs: op_code.get_bits(3..=5),
                rd: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(11..=15) == 0b01001 {
            Self::PcRelativeLoad {
                rd: op_code.get_bits(8..=10),
                offset: u32::from(op_code.get_bits(0..=7)) << 2,
            }
        } else if op_code.get_bits(12..=15) == 0b0101 {
            if op_code.get_bit(9) {
                Self::LoadStoreSignExtended {
                    sign_extend: op_code.get_bit(10),
                    halfword: op_code.get_bit(11),
                    ro: op_code.get_bits(6..=8),
                    rb: op_code.get_bits(3..=5),
                    rd: op_code.get_bits(0..=2),
                }
            } else {
                Self::LoadStoreRegisterOffset {
                    load: op_code.get_bit(11),
                    byte: op_code.get_bit(10),
                    ro: op_code.get_bits(6..=8),
                    rb: op_code.get_bits(3..=5),
                    rd: op_code.get_bits(0..=2),
                }
            }
        } else if op_code.get_bits(13..=15) == 0b011 {
            let byte = op_code.get_bit(12);
            let offset5 = u32::from(op_code.get_bits(6..=10));
            Self::LoadStoreImmOffset {
                load: op_code.get_bit(11),
                byte,
                offset: if byte { offset5 } else { offset5 << 2 },
                rb: op_code.get_bits(3..=5),
                rd: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(12..=15) == 0b1000 {
            Self::LoadStoreHalfword {
                load: op_code.get_bit(11),
                offset: u32::from(op_code.get_bits(6..=10)) << 1,
                rb: op_code.get_bits(3..=5),
                rd: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(12..=15) == 0b1001 {
            Self::SpRelativeLoadStore {
                load: op_code.get_bit(11),
                rd: op_code.get_bits(8..=10),
                offset: u32::from(op_code.get_bits(0..=7)) << 2,
            }
        } else if op_code.get_bits(12..=15) == 0b1010 {
            Self::LoadAddress {
                from_sp: op_code.get_bit(11),
                rd: op_code.get_bits(8..=10),
                offset: u32::from(op_code.get_bits(0..=7)) << 2,
            }
        } else if op_code.get_bits(12..=15) == 0b1100 {
            Self::MultipleLoadStore {
                load: op_code.get_bit(11),
                rb: op_code.get_bits(8..=10),
                register_list: op_code.get_bits(0..=7),
            }
        } else if op_code.get_bits(12..=15) == 0b1101 {
            let condition_bits = op_code.get_bits(8..=11) as u8;
            if condition_bits == 0b1110 {
                // 1110 is unallocated; 1111 was caught above as SWI
                Self::Undefined
            } else {
                let offset = (u32::from(op_code.get_bits(0..=7)) << 1).sign_extended(9);
                Self::ConditionalBranch {
                    condition: Condition::from(condition_bits),
                    offset: offset as i32,
                }
            }
        } else if op_code.get_bits(11..=15) == 0b11100 {
            let offset = (u32::from(op_code.get_bits(0..=10)) << 1).sign_extended(12);
            Self::UnconditionalBranch {
                offset: offset as i32,
            }
        } else if op_code.get_bits(12..=15) == 0b1111 {
            Self::LongBranchLink {
                low: op_code.get_bit(11),
                offset: u32::from(op_code.get_bits(0..=10)),
            }
        } else if op_code.get_bits(13..=15) == 0b000 {
            Self::MoveShifted {
                shift_kind: ShiftKind::from(op_code.get_bits(11..=12)),
                offset: op_code.get_bits(6..=10),
                rs: op_code.get_bits(3..=5),
                rd: op_code.get_bits(0..=2),
            }
        } else if op_code.get_bits(13..=15) == 0b001 {
            Self::MoveCompareAddSubImm {
                op: ImmediateOp::from(op_code.get_bits(11..=12)),
                rd: op_code.get_bits(8..=10),
                imm8: u32::from(op_code.get_bits(0..=7)),
            }
        } else {
            // the unallocated 1011 holes and the 11101 BLX prefix
            tracing::debug!("unallocated Thumb encoding 0x{op_code:04X}");
            Self::Undefined
        }
    }
}
