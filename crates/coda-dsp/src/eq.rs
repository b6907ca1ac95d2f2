//! 4-band parametric EQ
//!
//! Each band is an independent biquad section applied in series per
//! channel. Coefficients are recomputed only when a band's parameters
//! change; filter state persists across blocks.

use coda_core::{default_eq_bands, EqBandKind, EqBandState, Sample, NUM_EQ_BANDS};

use crate::biquad::{BiquadCoeffs, BiquadTDF2};
use crate::{MonoProcessor, Processor, ProcessorConfig, StereoProcessor};

fn band_coeffs(band: &EqBandState, sample_rate: f64) -> BiquadCoeffs {
    match band.kind {
        EqBandKind::Peak => BiquadCoeffs::peaking(band.frequency, band.q, band.gain_db, sample_rate),
        EqBandKind::LowShelf => {
            BiquadCoeffs::low_shelf(band.frequency, band.q, band.gain_db, sample_rate)
        }
        EqBandKind::HighShelf => {
            BiquadCoeffs::high_shelf(band.frequency, band.q, band.gain_db, sample_rate)
        }
    }
}

/// Stereo 4-band parametric EQ
#[derive(Debug, Clone)]
pub struct FourBandEq {
    bands: [EqBandState; NUM_EQ_BANDS],
    filters_l: [BiquadTDF2; NUM_EQ_BANDS],
    filters_r: [BiquadTDF2; NUM_EQ_BANDS],
    sample_rate: f64,
}

impl FourBandEq {
    pub fn new(sample_rate: f64) -> Self {
        let bands = default_eq_bands();
        let mut eq = Self {
            bands,
            filters_l: std::array::from_fn(|_| BiquadTDF2::new(sample_rate)),
            filters_r: std::array::from_fn(|_| BiquadTDF2::new(sample_rate)),
            sample_rate,
        };
        for i in 0..NUM_EQ_BANDS {
            eq.recompute_band(i);
        }
        eq
    }

    pub fn band(&self, index: usize) -> Option<&EqBandState> {
        self.bands.get(index)
    }

    /// Update one band; coefficients are only touched when the settings
    /// actually differ
    pub fn set_band(&mut self, index: usize, band: EqBandState) {
        let Some(slot) = self.bands.get_mut(index) else {
            return;
        };
        if *slot == band {
            return;
        }
        *slot = band;
        self.recompute_band(index);
    }

    /// Apply a full band set (e.g. from a render snapshot)
    pub fn apply_bands(&mut self, bands: &[EqBandState; NUM_EQ_BANDS]) {
        for (i, band) in bands.iter().enumerate() {
            self.set_band(i, *band);
        }
    }

    fn recompute_band(&mut self, index: usize) {
        let coeffs = band_coeffs(&self.bands[index], self.sample_rate);
        self.filters_l[index].set_coeffs(coeffs);
        self.filters_r[index].set_coeffs(coeffs);
    }
}

impl Processor for FourBandEq {
    fn reset(&mut self) {
        for f in self.filters_l.iter_mut().chain(self.filters_r.iter_mut()) {
            f.reset();
        }
    }
}

impl StereoProcessor for FourBandEq {
    #[inline]
    fn process_sample(&mut self, left: Sample, right: Sample) -> (Sample, Sample) {
        let mut l = left;
        let mut r = right;
        for i in 0..NUM_EQ_BANDS {
            if !self.bands[i].enabled {
                continue;
            }
            l = self.filters_l[i].process_sample(l);
            r = self.filters_r[i].process_sample(r);
        }
        (l, r)
    }
}

impl ProcessorConfig for FourBandEq {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        for i in 0..NUM_EQ_BANDS {
            self.filters_l[i].set_sample_rate(sample_rate);
            self.filters_r[i].set_sample_rate(sample_rate);
            self.recompute_band(i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_eq_is_transparent() {
        let mut eq = FourBandEq::new(48000.0);

        for i in 0..1000 {
            let x = (i as f64 * 0.07).sin() * 0.5;
            let (l, r) = eq.process_sample(x, x);
            assert!((l - x).abs() < 1e-9);
            assert!((r - x).abs() < 1e-9);
        }
    }

    #[test]
    fn test_disabled_band_is_skipped() {
        let mut eq = FourBandEq::new(48000.0);
        let mut band = *eq.band(1).unwrap();
        band.set_gain_db(12.0);
        band.enabled = false;
        eq.set_band(1, band);

        for i in 0..1000 {
            let x = (i as f64 * 0.03).sin() * 0.5;
            let (l, _) = eq.process_sample(x, x);
            assert!((l - x).abs() < 1e-9);
        }
    }

    #[test]
    fn test_boost_changes_signal() {
        let mut eq = FourBandEq::new(48000.0);
        let mut band = *eq.band(2).unwrap();
        band.set_frequency(1000.0);
        band.set_gain_db(12.0);
        eq.set_band(2, band);

        // 1 kHz tone through a 1 kHz +12 dB bell must come out louder
        let step = 2.0 * std::f64::consts::PI * 1000.0 / 48000.0;
        let mut in_peak: f64 = 0.0;
        let mut out_peak: f64 = 0.0;
        for i in 0..48_000 {
            let x = (i as f64 * step).sin() * 0.25;
            let (l, _) = eq.process_sample(x, x);
            if i > 4800 {
                in_peak = in_peak.max(x.abs());
                out_peak = out_peak.max(l.abs());
            }
        }
        assert!(out_peak > in_peak * 2.0);
    }

    #[test]
    fn test_set_band_ignores_identical_settings() {
        let mut eq = FourBandEq::new(48000.0);
        let band = *eq.band(0).unwrap();
        let coeffs_before = *eq.filters_l[0].coeffs();
        eq.set_band(0, band);
        assert_eq!(*eq.filters_l[0].coeffs(), coeffs_before);
    }

    #[test]
    fn test_out_of_range_band_index() {
        let mut eq = FourBandEq::new(48000.0);
        eq.set_band(NUM_EQ_BANDS, EqBandState::default());
        assert!(eq.band(NUM_EQ_BANDS).is_none());
    }
}
