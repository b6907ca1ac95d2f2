//! Sample-accurate transport clock
//!
//! Owned exclusively by the audio thread; the control thread only
//! requests changes through the command queue, so position updates are
//! never torn. The beat position is accumulated incrementally, which
//! makes tempo changes forward-only: they alter the sample-to-beat
//! mapping from the moment they are applied, never retroactively.

use coda_core::{MusicalTime, Tempo, TimeSignature};

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

/// Loop region in samples, half-open `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopRegion {
    pub start: u64,
    pub end: u64,
    pub enabled: bool,
}

impl LoopRegion {
    #[inline]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Transport clock, advanced once per audio callback
#[derive(Debug)]
pub struct Transport {
    state: TransportState,
    record_enabled: bool,
    position: u64,
    beat_position: f64,
    tempo: Tempo,
    time_signature: TimeSignature,
    loop_region: LoopRegion,
    sample_rate: f64,
}

impl Transport {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            state: TransportState::Stopped,
            record_enabled: false,
            position: 0,
            beat_position: 0.0,
            tempo: Tempo::DEFAULT,
            time_signature: TimeSignature::FOUR_FOUR,
            loop_region: LoopRegion::default(),
            sample_rate,
        }
    }

    pub fn play(&mut self) {
        self.state = TransportState::Playing;
    }

    /// Halt advancement; position stays where it is
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.record_enabled = false;
    }

    pub fn set_record_enabled(&mut self, enabled: bool) {
        self.record_enabled = enabled;
    }

    pub fn set_bpm(&mut self, bpm: f64) {
        self.tempo = Tempo::clamped(bpm);
    }

    pub fn set_time_signature(&mut self, numerator: u8, denominator: u8) {
        self.time_signature = TimeSignature::new(numerator, denominator);
    }

    pub fn seek(&mut self, position: u64) {
        self.position = position;
        self.beat_position = self.beats_at(position);
    }

    pub fn set_loop_region(&mut self, start: u64, end: u64) {
        if end > start {
            self.loop_region.start = start;
            self.loop_region.end = end;
        }
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        if enabled && self.loop_region.is_empty() {
            return;
        }
        self.loop_region.enabled = enabled;
    }

    /// Advance by the number of samples just rendered. Crossing the end
    /// of an enabled loop region wraps back to its start, carrying the
    /// remainder so the boundary is sample-accurate.
    pub fn advance(&mut self, num_samples: u64) {
        if self.state != TransportState::Playing {
            return;
        }

        let mut new_pos = self.position + num_samples;
        let mut wrapped = false;

        if self.loop_region.enabled && !self.loop_region.is_empty() && self.position < self.loop_region.end
        {
            while new_pos >= self.loop_region.end {
                new_pos = self.loop_region.start + (new_pos - self.loop_region.end);
                wrapped = true;
            }
        }

        self.position = new_pos;
        if wrapped {
            self.beat_position = self.beats_at(new_pos);
        } else {
            self.beat_position += num_samples as f64 / self.samples_per_beat();
        }
    }

    /// Samples left before the loop boundary would be crossed, if the
    /// playhead is inside an enabled loop. Used to split render blocks.
    pub fn samples_until_loop_end(&self) -> Option<u64> {
        if self.state == TransportState::Playing
            && self.loop_region.enabled
            && !self.loop_region.is_empty()
            && self.position < self.loop_region.end
        {
            Some(self.loop_region.end - self.position)
        } else {
            None
        }
    }

    #[inline]
    pub fn state(&self) -> TransportState {
        self.state
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.record_enabled
    }

    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[inline]
    pub fn position_seconds(&self) -> f64 {
        self.position as f64 / self.sample_rate
    }

    #[inline]
    pub fn bpm(&self) -> f64 {
        self.tempo.0
    }

    #[inline]
    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    #[inline]
    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    /// Accumulated beat position of the playhead
    #[inline]
    pub fn beat_position(&self) -> f64 {
        self.beat_position
    }

    pub fn musical_time(&self) -> MusicalTime {
        MusicalTime::from_beats(self.beat_position, self.time_signature)
    }

    #[inline]
    pub fn samples_per_beat(&self) -> f64 {
        self.tempo.beat_duration_samples(self.sample_rate)
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.beat_position = self.beats_at(self.position);
    }

    fn beats_at(&self, position: u64) -> f64 {
        position as f64 / self.samples_per_beat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_only_while_playing() {
        let mut transport = Transport::new(44100.0);
        transport.advance(512);
        assert_eq!(transport.position(), 0);

        transport.play();
        transport.advance(512);
        assert_eq!(transport.position(), 512);

        transport.stop();
        transport.advance(512);
        assert_eq!(transport.position(), 512);
    }

    #[test]
    fn test_stop_keeps_position() {
        let mut transport = Transport::new(44100.0);
        transport.play();
        transport.advance(1000);
        transport.stop();
        assert_eq!(transport.position(), 1000);
    }

    #[test]
    fn test_loop_wrap_preserves_remainder() {
        let mut transport = Transport::new(44100.0);
        transport.set_loop_region(44100, 132300);
        transport.set_loop_enabled(true);
        transport.play();
        transport.seek(132290);

        transport.advance(20);
        assert_eq!(transport.position(), 44110);
    }

    #[test]
    fn test_loop_wrap_repeats_for_long_blocks() {
        let mut transport = Transport::new(44100.0);
        transport.set_loop_region(100, 110);
        transport.set_loop_enabled(true);
        transport.play();
        transport.seek(100);

        // 25 samples through a 10-sample loop: 2 wraps + 5
        transport.advance(25);
        assert_eq!(transport.position(), 105);
    }

    #[test]
    fn test_no_wrap_when_disabled() {
        let mut transport = Transport::new(44100.0);
        transport.set_loop_region(44100, 132300);
        transport.play();
        transport.seek(132290);
        transport.advance(20);
        assert_eq!(transport.position(), 132310);
    }

    #[test]
    fn test_no_wrap_when_already_past_loop() {
        let mut transport = Transport::new(44100.0);
        transport.set_loop_region(100, 200);
        transport.set_loop_enabled(true);
        transport.play();
        transport.seek(500);
        transport.advance(10);
        assert_eq!(transport.position(), 510);
    }

    #[test]
    fn test_samples_until_loop_end() {
        let mut transport = Transport::new(44100.0);
        transport.set_loop_region(0, 1000);
        transport.set_loop_enabled(true);
        transport.play();
        transport.seek(900);
        assert_eq!(transport.samples_until_loop_end(), Some(100));

        transport.stop();
        assert_eq!(transport.samples_until_loop_end(), None);
    }

    #[test]
    fn test_invalid_loop_region_rejected() {
        let mut transport = Transport::new(44100.0);
        transport.set_loop_region(500, 100);
        transport.set_loop_enabled(true);
        assert!(!transport.loop_region().enabled);
    }

    #[test]
    fn test_bpm_clamped() {
        let mut transport = Transport::new(44100.0);
        transport.set_bpm(0.5);
        assert_eq!(transport.bpm(), 20.0);
        transport.set_bpm(5000.0);
        assert_eq!(transport.bpm(), 999.0);
    }

    #[test]
    fn test_tempo_change_is_forward_only() {
        let mut transport = Transport::new(48000.0);
        transport.play();

        // One beat at 120 bpm = 24000 samples
        transport.advance(24000);
        assert!((transport.beat_position() - 1.0).abs() < 1e-9);

        // Doubling the tempo does not move the accumulated beat position
        transport.set_bpm(240.0);
        assert!((transport.beat_position() - 1.0).abs() < 1e-9);

        // From here on, one beat takes 12000 samples
        transport.advance(12000);
        assert!((transport.beat_position() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_seek_recomputes_beats() {
        let mut transport = Transport::new(48000.0);
        transport.seek(48000);
        // 48000 samples at 120 bpm = 2 beats
        assert!((transport.beat_position() - 2.0).abs() < 1e-9);
    }
}
