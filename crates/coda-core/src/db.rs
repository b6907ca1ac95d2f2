//! Decibel/linear gain conversion

use serde::{Deserialize, Serialize};

/// Gains below this are treated as silence
pub const SILENCE_FLOOR_DB: f64 = -144.0;

/// Convert decibels to linear gain
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    if db <= SILENCE_FLOOR_DB {
        0.0
    } else {
        10.0_f64.powf(db / 20.0)
    }
}

/// Convert linear gain to decibels
#[inline]
pub fn gain_to_db(gain: f64) -> f64 {
    if gain <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

/// Decibel value wrapper
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decibels(pub f64);

impl Decibels {
    pub const ZERO: Self = Self(0.0);
    pub const NEG_INF: Self = Self(f64::NEG_INFINITY);

    #[inline]
    pub fn from_gain(gain: f64) -> Self {
        Self(gain_to_db(gain))
    }

    #[inline]
    pub fn to_gain(self) -> f64 {
        db_to_gain(self.0)
    }
}

impl Default for Decibels {
    fn default() -> Self {
        Self::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unity_gain() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-12);
        assert!(gain_to_db(1.0).abs() < 1e-12);
    }

    #[test]
    fn test_minus_six_db() {
        let gain = db_to_gain(-6.0);
        assert!((gain - 0.501187).abs() < 1e-5);
    }

    #[test]
    fn test_silence_floor() {
        assert_eq!(db_to_gain(-200.0), 0.0);
        assert_eq!(Decibels::NEG_INF.to_gain(), 0.0);
    }

    #[test]
    fn test_round_trip() {
        for db in [-60.0, -12.0, -3.0, 0.0, 6.0] {
            let back = gain_to_db(db_to_gain(db));
            assert!((back - db).abs() < 1e-9);
        }
    }
}
