//! Time-related types for audio processing
//!
//! All timeline math is done in integer sample counts; beats and seconds
//! are derived views.

use serde::{Deserialize, Serialize};

/// Sample position on the timeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SamplePosition(pub u64);

impl SamplePosition {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn from_seconds(seconds: f64, sample_rate: f64) -> Self {
        Self((seconds.max(0.0) * sample_rate) as u64)
    }

    #[inline]
    pub fn to_seconds(self, sample_rate: f64) -> f64 {
        self.0 as f64 / sample_rate
    }
}

impl std::ops::Add<u64> for SamplePosition {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl std::ops::Sub for SamplePosition {
    type Output = u64;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0.saturating_sub(rhs.0)
    }
}

/// Duration in samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SampleDuration(pub u64);

impl SampleDuration {
    pub const ZERO: Self = Self(0);

    #[inline]
    pub fn from_ms(ms: f64, sample_rate: f64) -> Self {
        Self((ms.max(0.0) / 1000.0 * sample_rate) as u64)
    }

    #[inline]
    pub fn to_ms(self, sample_rate: f64) -> f64 {
        self.0 as f64 / sample_rate * 1000.0
    }
}

/// Tempo in beats per minute
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tempo(pub f64);

impl Tempo {
    pub const DEFAULT: Self = Self(120.0);
    pub const MIN_BPM: f64 = 20.0;
    pub const MAX_BPM: f64 = 999.0;

    #[inline]
    pub fn clamped(bpm: f64) -> Self {
        Self(bpm.clamp(Self::MIN_BPM, Self::MAX_BPM))
    }

    /// Length of one beat in samples
    #[inline]
    pub fn beat_duration_samples(self, sample_rate: f64) -> f64 {
        (60.0 / self.0) * sample_rate
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Time signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,
    pub denominator: u8,
}

impl TimeSignature {
    pub const FOUR_FOUR: Self = Self {
        numerator: 4,
        denominator: 4,
    };

    pub fn new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator: numerator.clamp(1, 32),
            denominator: if denominator.is_power_of_two() {
                denominator.clamp(1, 32)
            } else {
                4
            },
        }
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::FOUR_FOUR
    }
}

/// Musical time (bar, beat, tick), derived from a beat position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MusicalTime {
    pub bar: u32,
    pub beat: u32,
    pub tick: u32,
}

impl MusicalTime {
    pub const TICKS_PER_BEAT: u32 = 960;

    pub fn from_beats(beats: f64, time_sig: TimeSignature) -> Self {
        let beats = beats.max(0.0);
        let total_ticks = (beats * Self::TICKS_PER_BEAT as f64) as u64;
        let ticks_per_bar = Self::TICKS_PER_BEAT as u64 * time_sig.numerator as u64;

        let bar = (total_ticks / ticks_per_bar) as u32;
        let remaining = total_ticks % ticks_per_bar;

        Self {
            bar,
            beat: (remaining / Self::TICKS_PER_BEAT as u64) as u32,
            tick: (remaining % Self::TICKS_PER_BEAT as u64) as u32,
        }
    }
}
