//! Metronome
//!
//! Beat-synchronous click generator driven by the transport's beat
//! position, mixed additively on top of the session render. Clicks are
//! pre-rendered sine bursts with an exponential decay; the downbeat
//! gets a higher-pitched, louder accent.

use coda_core::Sample;

use crate::transport::Transport;

fn render_click(sample_rate: f64, freq: f64, duration_s: f64, gain: f64) -> Vec<Sample> {
    let num_samples = (sample_rate * duration_s) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            let envelope = (-t * 40.0).exp();
            (t * freq * std::f64::consts::TAU).sin() * envelope * gain
        })
        .collect()
}

/// Click generator state
pub struct Metronome {
    enabled: bool,
    gain: f64,
    accent_click: Vec<Sample>,
    beat_click: Vec<Sample>,
    /// Playback position within the current click, if one is sounding
    play_pos: usize,
    playing_accent: bool,
    click_active: bool,
    /// Beat index at the previously rendered sample
    last_beat: Option<i64>,
}

impl Metronome {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            enabled: false,
            gain: 0.7,
            accent_click: render_click(sample_rate, 1000.0, 0.015, 0.8),
            beat_click: render_click(sample_rate, 800.0, 0.012, 0.5),
            play_pos: 0,
            playing_accent: false,
            click_active: false,
            last_beat: None,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_gain(&mut self, gain: f64) {
        self.gain = gain.clamp(0.0, 2.0);
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.accent_click = render_click(sample_rate, 1000.0, 0.015, 0.8);
        self.beat_click = render_click(sample_rate, 800.0, 0.012, 0.5);
        self.reset();
    }

    pub fn reset(&mut self) {
        self.click_active = false;
        self.play_pos = 0;
        self.last_beat = None;
    }

    /// Render the click for one block, additively. Call with the
    /// transport state of the block being rendered, before `advance`.
    pub fn process(
        &mut self,
        left: &mut [Sample],
        right: &mut [Sample],
        num_samples: usize,
        transport: &Transport,
    ) {
        if !transport.is_playing() {
            self.reset();
            return;
        }
        if !self.enabled {
            return;
        }

        let samples_per_beat = transport.samples_per_beat();
        if samples_per_beat <= 0.0 {
            return;
        }
        let beats_per_bar = transport.time_signature().numerator.max(1) as i64;
        let start_beat = transport.beat_position();

        for i in 0..num_samples.min(left.len()).min(right.len()) {
            let beat_pos = start_beat + i as f64 / samples_per_beat;
            let beat_index = beat_pos.floor() as i64;

            let crossed = match self.last_beat {
                Some(last) => beat_index > last,
                // First sample after start/seek: click only when it
                // lands exactly on a beat
                None => (beat_pos - beat_index as f64) < 1e-9,
            };
            self.last_beat = Some(beat_index);

            if crossed {
                self.click_active = true;
                self.play_pos = 0;
                self.playing_accent = beat_index % beats_per_bar == 0;
            }

            if self.click_active {
                let click = if self.playing_accent {
                    &self.accent_click
                } else {
                    &self.beat_click
                };
                match click.get(self.play_pos) {
                    Some(&sample) => {
                        let out = sample * self.gain;
                        left[i] += out;
                        right[i] += out;
                        self.play_pos += 1;
                    }
                    None => self.click_active = false,
                }
            }
        }
    }
}
