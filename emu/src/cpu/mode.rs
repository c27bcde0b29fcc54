//! Processor operating modes.
//!
//! The low five CPSR bits select the mode, which in turn selects the live
//! SP/LR bank (see [`register_bank`](super::register_bank)). User and
//! System share one bank; every exception mode has its own.

use serde::{Deserialize, Serialize};

/// The seven ARM7TDMI operating modes, with their CPSR encodings.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
#[repr(u32)]
pub enum Mode {
    /// Normal program execution, unprivileged.
    User = 0x10,
    /// Fast interrupt handling.
    Fiq = 0x11,
    /// Normal interrupt handling.
    Irq = 0x12,
    /// Supervisor, entered on reset and SWI.
    Supervisor = 0x13,
    /// Entered on data/prefetch aborts (unused on the GBA).
    Abort = 0x17,
    /// Entered on undefined instructions.
    Undefined = 0x1B,
    /// Privileged, but shares the User register bank.
    System = 0x1F,
}

impl Mode {
    /// User and System are the only modes sharing a SP/LR bank.
    #[must_use]
    pub const fn uses_user_bank(self) -> bool {
        matches!(self, Self::User | Self::System)
    }

    #[must_use]
    pub const fn is_privileged(self) -> bool {
        !matches!(self, Self::User)
    }
}

impl TryFrom<u32> for Mode {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value & 0b11111 {
            0x10 => Ok(Self::User),
            0x11 => Ok(Self::Fiq),
            0x12 => Ok(Self::Irq),
            0x13 => Ok(Self::Supervisor),
            0x17 => Ok(Self::Abort),
            0x1B => Ok(Self::Undefined),
            0x1F => Ok(Self::System),
            invalid => Err(invalid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn encodings_round_trip() {
        for mode in [
            Mode::User,
            Mode::Fiq,
            Mode::Irq,
            Mode::Supervisor,
            Mode::Abort,
            Mode::Undefined,
            Mode::System,
        ] {
            assert_eq!(Mode::try_from(mode as u32), Ok(mode));
        }
    }

    #[test]
    fn invalid_bits_are_rejected() {
        assert_eq!(Mode::try_from(0b00000), Err(0));
        assert_eq!(Mode::try_from(0b10110), Err(0b10110));
    }

    #[test]
    fn bank_sharing() {
        assert!(Mode::User.uses_user_bank());
        assert!(Mode::System.uses_user_bank());
        assert!(!Mode::Irq.uses_user_bank());
        assert!(!Mode::User.is_privileged());
        assert!(Mode::System.is_privileged());
    }
}
