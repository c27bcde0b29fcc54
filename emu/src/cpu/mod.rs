//! # ARM7TDMI CPU core
//!
//! The processor behind the Game Boy Advance: a 32-bit RISC core running
//! two instruction sets, 32-bit ARM and 16-bit Thumb, selected by the T bit
//! of the CPSR.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Instruction dispatch                      │
//! ├──────────────────────────────────────────────────────────────┤
//! │  T=0  fetch word ──▶ decoded cache ──▶ ARM handler           │
//! │                         │ miss                               │
//! │                         ▼                                    │
//! │                   512-entry decode table (+ secondary)       │
//! │                                                              │
//! │  T=1  fetch halfword ──▶ format match ──▶ Thumb handler      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Submodules, roughly leaves first:
//!
//! - [`condition`] / [`psr`] / [`mode`]: flags, condition evaluation and
//!   the processor mode field.
//! - [`registers`] / [`register_bank`]: the visible register file and the
//!   banked SP/LR storage behind it.
//! - [`alu`]: the barrel shifter and the flag arithmetic shared by both
//!   instruction sets.
//! - [`arm`] and [`thumb`]: decoders, executors and their cycle models.
//! - [`exception`] and [`arm7tdmi`]: vector entry and the cooperative
//!   cycle-budget run loop.

pub mod alu;
pub mod arm;
pub mod arm7tdmi;
pub mod condition;
pub mod exception;
pub mod mode;
pub mod psr;
pub mod register_bank;
pub mod registers;
pub mod thumb;
