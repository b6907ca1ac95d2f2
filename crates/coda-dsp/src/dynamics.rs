//! Dynamics processing: RMS-detected soft-knee compressor
//!
//! Feed-forward design: an RMS window drives a piecewise soft-knee gain
//! computer, whose target gain is smoothed with independent attack and
//! release coefficients before being applied and topped up with makeup
//! gain.

use coda_core::{db_to_gain, gain_to_db, CompressorState, Sample};

use crate::{Processor, ProcessorConfig, StereoProcessor};

/// RMS window length in samples
pub const RMS_WINDOW: usize = 256;

/// Fixed-size circular RMS accumulator
#[derive(Debug, Clone)]
pub struct RmsDetector {
    buffer: [Sample; RMS_WINDOW],
    pos: usize,
    sum: f64,
}

impl RmsDetector {
    pub fn new() -> Self {
        Self {
            buffer: [0.0; RMS_WINDOW],
            pos: 0,
            sum: 0.0,
        }
    }

    /// Push one sample, return the windowed RMS level
    #[inline]
    pub fn process(&mut self, input: Sample) -> f64 {
        self.sum -= self.buffer[self.pos];
        let squared = input * input;
        self.buffer[self.pos] = squared;
        self.sum += squared;
        self.pos = (self.pos + 1) % RMS_WINDOW;

        // Accumulated rounding error can push the sum slightly negative
        (self.sum.max(0.0) / RMS_WINDOW as f64).sqrt()
    }

    pub fn reset(&mut self) {
        self.buffer = [0.0; RMS_WINDOW];
        self.pos = 0;
        self.sum = 0.0;
    }
}

impl Default for RmsDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Feed-forward stereo compressor with linked detection
#[derive(Debug, Clone)]
pub struct Compressor {
    threshold_db: f64,
    ratio: f64,
    knee_db: f64,
    attack_ms: f64,
    release_ms: f64,
    makeup_gain: f64,

    detector: RmsDetector,
    /// Smoothed linear gain, 1.0 = no reduction
    gain_env: f64,
    gain_reduction_db: f64,
    attack_coeff: f64,
    release_coeff: f64,
    sample_rate: f64,
}

impl Compressor {
    pub fn new(sample_rate: f64) -> Self {
        let mut comp = Self {
            threshold_db: -20.0,
            ratio: 4.0,
            knee_db: 2.0,
            attack_ms: 5.0,
            release_ms: 50.0,
            makeup_gain: 1.0,
            detector: RmsDetector::new(),
            gain_env: 1.0,
            gain_reduction_db: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            sample_rate,
        };
        comp.update_coefficients();
        comp
    }

    pub fn set_threshold(&mut self, db: f64) {
        self.threshold_db = db.clamp(-60.0, 0.0);
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio.clamp(1.0, 20.0);
    }

    pub fn set_knee(&mut self, db: f64) {
        self.knee_db = db.clamp(0.0, 10.0);
    }

    pub fn set_attack(&mut self, ms: f64) {
        self.attack_ms = ms.clamp(0.1, 100.0);
        self.update_coefficients();
    }

    pub fn set_release(&mut self, ms: f64) {
        self.release_ms = ms.clamp(1.0, 1000.0);
        self.update_coefficients();
    }

    pub fn set_makeup(&mut self, db: f64) {
        self.makeup_gain = db_to_gain(db.clamp(0.0, 24.0));
    }

    /// Apply a whole settings struct, recomputing coefficients only when
    /// the time constants actually changed
    pub fn apply_state(&mut self, state: &CompressorState) {
        self.set_threshold(state.threshold_db);
        self.set_ratio(state.ratio);
        self.set_knee(state.knee_db);
        self.set_makeup(state.makeup_db);
        if state.attack_ms != self.attack_ms || state.release_ms != self.release_ms {
            self.attack_ms = state.attack_ms.clamp(0.1, 100.0);
            self.release_ms = state.release_ms.clamp(1.0, 1000.0);
            self.update_coefficients();
        }
    }

    /// Current gain reduction in dB (positive numbers mean reduction)
    pub fn gain_reduction_db(&self) -> f64 {
        self.gain_reduction_db
    }

    fn update_coefficients(&mut self) {
        self.attack_coeff = (-1.0 / (self.sample_rate * self.attack_ms * 0.001)).exp();
        self.release_coeff = (-1.0 / (self.sample_rate * self.release_ms * 0.001)).exp();
    }

    /// Piecewise soft-knee gain reduction for an input level in dB
    #[inline]
    fn calculate_gain_reduction(&self, input_db: f64) -> f64 {
        let half_knee = self.knee_db * 0.5;
        let slope = 1.0 - 1.0 / self.ratio;

        if input_db < self.threshold_db - half_knee {
            0.0
        } else if input_db > self.threshold_db + half_knee || self.knee_db <= 0.0 {
            slope * (input_db - self.threshold_db)
        } else {
            let x = input_db - (self.threshold_db - half_knee);
            slope * x * x / (2.0 * self.knee_db)
        }
    }
}

impl Processor for Compressor {
    fn reset(&mut self) {
        self.detector.reset();
        self.gain_env = 1.0;
        self.gain_reduction_db = 0.0;
    }
}

impl StereoProcessor for Compressor {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let level = self.detector.process(left.abs().max(right.abs()));

        let target_gain = if level < 1e-10 {
            1.0
        } else {
            let level_db = gain_to_db(level);
            db_to_gain(-self.calculate_gain_reduction(level_db))
        };

        let coeff = if target_gain < self.gain_env {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.gain_env = target_gain + coeff * (self.gain_env - target_gain);
        self.gain_reduction_db = -gain_to_db(self.gain_env);

        let gain = self.gain_env * self.makeup_gain;
        (left * gain, right * gain)
    }
}

impl ProcessorConfig for Compressor {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.update_coefficients();
    }
}
