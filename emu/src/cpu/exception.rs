//! Exception vectors and their target modes.
//!
//! | Exception        | Vector | Mode       |
//! |------------------|--------|------------|
//! | Reset            | 0x00   | Supervisor |
//! | Undefined        | 0x04   | Undefined  |
//! | SWI              | 0x08   | Supervisor |
//! | Prefetch Abort   | 0x0C   | Abort      |
//! | Data Abort       | 0x10   | Abort      |
//! | IRQ              | 0x18   | IRQ        |
//! | FIQ              | 0x1C   | FIQ        |
//!
//! Entry itself lives on `Arm7tdmi::enter_exception`, which funnels the
//! mode change through the bank-swap primitive. Every entry sets the I
//! bit; Reset and FIQ additionally set F. Aborts never fire on the GBA
//! but keep their slots so the vector table stays complete.

use serde::{Deserialize, Serialize};

use crate::cpu::mode::Mode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Exception {
    Reset,
    UndefinedInstruction,
    SoftwareInterrupt,
    PrefetchAbort,
    DataAbort,
    Irq,
    Fiq,
}

impl Exception {
    /// The fixed low-memory address PC is set to on entry.
    #[must_use]
    pub const fn vector(self) -> u32 {
        match self {
            Self::Reset => 0x00,
            Self::UndefinedInstruction => 0x04,
            Self::SoftwareInterrupt => 0x08,
            Self::PrefetchAbort => 0x0C,
            Self::DataAbort => 0x10,
            Self::Irq => 0x18,
            Self::Fiq => 0x1C,
        }
    }

    /// The mode the CPU lands in.
    #[must_use]
    pub const fn mode(self) -> Mode {
        match self {
            Self::Reset | Self::SoftwareInterrupt => Mode::Supervisor,
            Self::UndefinedInstruction => Mode::Undefined,
            Self::PrefetchAbort | Self::DataAbort => Mode::Abort,
            Self::Irq => Mode::Irq,
            Self::Fiq => Mode::Fiq,
        }
    }

    /// Reset and FIQ entry mask FIQs as well as IRQs.
    #[must_use]
    pub const fn disables_fiq(self) -> bool {
        matches!(self, Self::Reset | Self::Fiq)
    }
}
