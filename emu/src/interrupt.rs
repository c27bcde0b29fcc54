//! Interrupt request surface between the outer driver and the core.
//!
//! Hardware (or tests) raise a line with [`InterruptController::request`];
//! the CPU samples the lines between instructions and takes the matching
//! exception when the corresponding CPSR disable bit is clear. The line
//! stays asserted until acknowledged, mirroring a level-triggered IF flag.

use serde::{Deserialize, Serialize};

/// The two interrupt lines an ARM7TDMI exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InterruptKind {
    Irq,
    Fiq,
}

/// Pending-interrupt latch shared between the driver and the CPU.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct InterruptController {
    irq_line: bool,
    fiq_line: bool,
}

impl InterruptController {
    pub fn request(&mut self, kind: InterruptKind) {
        match kind {
            InterruptKind::Irq => self.irq_line = true,
            InterruptKind::Fiq => self.fiq_line = true,
        }
    }

    pub fn acknowledge(&mut self, kind: InterruptKind) {
        match kind {
            InterruptKind::Irq => self.irq_line = false,
            InterruptKind::Fiq => self.fiq_line = false,
        }
    }

    #[must_use]
    pub const fn pending(&self, kind: InterruptKind) -> bool {
        match kind {
            InterruptKind::Irq => self.irq_line,
            InterruptKind::Fiq => self.fiq_line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_latch_until_acknowledged() {
        let mut controller = InterruptController::default();
        assert!(!controller.pending(InterruptKind::Irq));

        controller.request(InterruptKind::Irq);
        assert!(controller.pending(InterruptKind::Irq));
        assert!(!controller.pending(InterruptKind::Fiq));

        controller.acknowledge(InterruptKind::Irq);
        assert!(!controller.pending(InterruptKind::Irq));
    }
}
