//! The sixteen general-purpose registers visible at any time.
//!
//! - **R0-R12**: general purpose
//! - **R13 (SP)**: stack pointer by convention
//! - **R14 (LR)**: link register
//! - **R15 (PC)**: program counter
//!
//! In this interpreter R15 holds the address of the instruction currently
//! executing; the pipeline illusion (reads of R15 yielding +8 in ARM, +4
//! in Thumb) is applied by the executors, not stored here.

use serde::{Deserialize, Serialize};

/// Stack Pointer register index.
pub const REG_SP: usize = 13;

/// Link Register index.
pub const REG_LR: usize = 14;

/// Program Counter register index.
pub const REG_PC: usize = 15;

/// The currently-visible register file. Banked copies for the exception
/// modes live in [`RegisterBank`](super::register_bank::RegisterBank).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Registers([u32; 16]);

impl Registers {
    #[must_use]
    pub const fn program_counter(&self) -> u32 {
        self.0[REG_PC]
    }

    pub const fn set_program_counter(&mut self, new_value: u32) {
        self.0[REG_PC] = new_value;
    }

    pub const fn advance_program_counter(&mut self, bytes: u32) {
        self.0[REG_PC] = self.0[REG_PC].wrapping_add(bytes);
    }

    #[must_use]
    pub const fn register_at(&self, reg: usize) -> u32 {
        self.0[reg]
    }

    pub fn set_register_at(&mut self, reg: usize, new_value: u32) {
        assert!(reg <= REG_PC, "invalid register index: {reg}");
        self.0[reg] = new_value;
    }

    /// The raw register file, for snapshots.
    #[must_use]
    pub const fn snapshot(&self) -> [u32; 16] {
        self.0
    }
}
