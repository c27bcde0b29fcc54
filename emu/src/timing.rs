//! System timing state driving the cooperative execution loop.
//!
//! The GBA video beam and the four hardware timers are the only event
//! sources the core has to respect: an instruction may not straddle the
//! next scheduled event, so the run loop asks [`TimingState`] how many
//! cycles remain until one fires and prices each instruction before
//! executing it.
//!
//! # Video timing
//!
//! ```text
//! 308 dots per scanline (240 visible + 68 blanking), 4 cycles per dot
//! => 1232 cycles per scanline, HBlank starts at cycle 960
//! 228 scanlines per frame (160 visible + 68 VBlank)
//! ```

use serde::{Deserialize, Serialize};

/// GBA system clock: 16.78 MHz.
pub const CLOCK_FREQUENCY: u32 = 16_780_000;

/// Cycles per video scanline.
pub const CYCLES_PER_SCANLINE: u32 = 1232;

/// Cycle within a scanline at which HBlank begins.
pub const HBLANK_START_CYCLE: u32 = 960;

/// Total scanlines per frame, including VBlank.
pub const SCANLINES_PER_FRAME: u32 = 228;

/// First VBlank scanline.
pub const VBLANK_START_LINE: u32 = 160;

/// Prescaled ticks until a 16-bit timer overflows.
pub const TIMER_OVERFLOW_TICKS: u32 = 0x1_0000;

/// Timer prescaler selection (cycles per timer tick).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prescaler {
    #[default]
    Div1,
    Div64,
    Div256,
    Div1024,
}

impl Prescaler {
    #[must_use]
    pub const fn divider(self) -> u32 {
        match self {
            Self::Div1 => 1,
            Self::Div64 => 64,
            Self::Div256 => 256,
            Self::Div1024 => 1024,
        }
    }

    /// Tick frequency in Hz for this prescaler.
    #[must_use]
    pub const fn frequency(self) -> u32 {
        CLOCK_FREQUENCY / self.divider()
    }

    /// CPU cycles until the timer counter wraps from 0 back to 0.
    #[must_use]
    pub const fn overflow_cycles(self) -> u32 {
        TIMER_OVERFLOW_TICKS.saturating_mul(self.divider())
    }
}

/// One of the four hardware timers, reduced to its overflow cadence.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize)]
pub struct Timer {
    pub enabled: bool,
    pub prescaler: Prescaler,
    /// CPU cycles accumulated since the last overflow.
    cycles: u32,
}

/// Video events produced while advancing time.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VideoEvents {
    /// The beam entered HBlank on the current scanline.
    pub hblank_entered: bool,
    /// The beam entered the VBlank region (scanline 160).
    pub vblank_entered: bool,
}

/// Monotonic cycle counter plus the derived video/timer positions.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TimingState {
    total_cycles: u64,
    scanline: u32,
    scanline_cycles: u32,
    timers: [Timer; 4],
    hblank_seen: bool,
    vblank_seen: bool,
}

impl TimingState {
    /// Total CPU cycles executed since reset.
    #[must_use]
    pub const fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Current scanline (VCOUNT), 0-227.
    #[must_use]
    pub const fn vcount(&self) -> u32 {
        self.scanline
    }

    #[must_use]
    pub const fn in_vblank(&self) -> bool {
        self.scanline >= VBLANK_START_LINE
    }

    #[must_use]
    pub const fn in_hblank(&self) -> bool {
        self.scanline_cycles >= HBLANK_START_CYCLE
    }

    pub fn set_timer(&mut self, index: usize, enabled: bool, prescaler: Prescaler) {
        let timer = &mut self.timers[index];
        timer.enabled = enabled;
        timer.prescaler = prescaler;
        timer.cycles = 0;
    }

    /// Advances the cycle counter, rolling the scanline position and the
    /// timer accumulators forward.
    pub fn advance(&mut self, cycles: u32) {
        self.total_cycles += u64::from(cycles);
        self.scanline_cycles += cycles;

        while self.scanline_cycles >= CYCLES_PER_SCANLINE {
            self.scanline_cycles -= CYCLES_PER_SCANLINE;
            self.scanline += 1;
            self.hblank_seen = false;
            if self.scanline >= SCANLINES_PER_FRAME {
                self.scanline = 0;
                self.vblank_seen = false;
            }
        }

        for timer in &mut self.timers {
            if timer.enabled {
                timer.cycles += cycles;
            }
        }
    }

    /// Cycles until the next video event (HBlank start or scanline end).
    #[must_use]
    pub const fn cycles_until_next_video_event(&self) -> u32 {
        if self.scanline_cycles < HBLANK_START_CYCLE {
            HBLANK_START_CYCLE - self.scanline_cycles
        } else {
            CYCLES_PER_SCANLINE - self.scanline_cycles
        }
    }

    /// Cycles until the next enabled timer overflows, if any.
    #[must_use]
    pub fn cycles_until_next_timer_event(&self) -> Option<u32> {
        self.timers
            .iter()
            .filter(|timer| timer.enabled)
            .map(|timer| timer.prescaler.overflow_cycles().saturating_sub(timer.cycles))
            .min()
    }

    /// Cycles until whichever event comes first. Never zero: an event due
    /// right now is considered already processed.
    #[must_use]
    pub fn cycles_until_next_event(&self) -> u32 {
        let video = self.cycles_until_next_video_event();
        let soonest = match self.cycles_until_next_timer_event() {
            Some(timer) => video.min(timer),
            None => video,
        };
        soonest.max(1)
    }

    /// Folds overflowed timer accumulators and reports which timers fired
    /// as a bitmask (bit n = timer n).
    pub fn process_timer_events(&mut self) -> u8 {
        let mut overflowed = 0u8;
        for (index, timer) in self.timers.iter_mut().enumerate() {
            if !timer.enabled {
                continue;
            }
            let period = timer.prescaler.overflow_cycles();
            if timer.cycles >= period {
                timer.cycles %= period;
                overflowed |= 1 << index;
            }
        }
        overflowed
    }

    /// Reports blanking-region transitions since the last call.
    pub fn process_video_events(&mut self) -> VideoEvents {
        let mut events = VideoEvents::default();
        if self.in_hblank() && !self.hblank_seen {
            self.hblank_seen = true;
            events.hblank_entered = true;
        }
        if self.in_vblank() && !self.vblank_seen {
            self.vblank_seen = true;
            events.vblank_entered = true;
        }
        events
    }
}
