//! Mixer: per-track channel strips, send buses and master bus
//!
//! Each channel runs trim/polarity, EQ, compressor, pre-fader sends,
//! the smoothed fader and pan, then post-fader sends, and sums into the
//! master bus. All channels and buses are allocated up front; applying
//! a snapshot only retargets smoothers and touches DSP coefficients
//! that actually changed.

use coda_core::{db_to_gain, Sample, NUM_SENDS};
use coda_dsp::dynamics::Compressor;
use coda_dsp::eq::FourBandEq;
use coda_dsp::smoothing::{pan_gains, SmoothedPan, SmoothedParam, DEFAULT_SMOOTHING_MS};
use coda_dsp::{Processor, StereoProcessor};

use crate::snapshot::{RenderSend, RenderSnapshot, RenderStrip};

/// Fixed channel pool size; tracks beyond this are not rendered
pub const MAX_TRACKS: usize = 64;

/// Number of shared stereo send buses
pub const NUM_SEND_BUSES: usize = NUM_SENDS;

/// Stereo accumulator shared by all channels sending to one target
pub struct SendBus {
    pub left: Vec<Sample>,
    pub right: Vec<Sample>,
}

impl SendBus {
    fn new(max_block: usize) -> Self {
        Self {
            left: vec![0.0; max_block],
            right: vec![0.0; max_block],
        }
    }

    fn clear(&mut self, num_samples: usize) {
        self.left[..num_samples].fill(0.0);
        self.right[..num_samples].fill(0.0);
    }
}

/// One mixer channel strip
pub struct MixerChannel {
    muted: bool,
    soloed: bool,
    trim: f64,
    eq: FourBandEq,
    comp: Compressor,
    comp_enabled: bool,
    fader: SmoothedParam,
    pan: SmoothedPan,
    sends: [RenderSend; NUM_SENDS],
    /// False until the first snapshot lands; the first application
    /// snaps smoothers instead of ramping from construction defaults
    configured: bool,
}

impl MixerChannel {
    fn new(sample_rate: f64) -> Self {
        Self {
            muted: false,
            soloed: false,
            trim: 1.0,
            eq: FourBandEq::new(sample_rate),
            comp: Compressor::new(sample_rate),
            comp_enabled: false,
            fader: SmoothedParam::with_range(1.0, DEFAULT_SMOOTHING_MS, sample_rate, 0.0, 16.0),
            pan: SmoothedPan::new(0.0, DEFAULT_SMOOTHING_MS, sample_rate),
            sends: [RenderSend::default(); NUM_SENDS],
            configured: false,
        }
    }

    /// Apply denormalized strip parameters from a snapshot
    fn apply_strip(&mut self, strip: &RenderStrip, muted: bool, soloed: bool) {
        self.muted = muted;
        self.soloed = soloed;
        self.trim = strip.trim;
        self.eq.apply_bands(&strip.eq_bands);
        self.comp.apply_state(&strip.compressor);
        self.comp_enabled = strip.compressor.enabled;
        if self.configured {
            self.fader.set_target(strip.fader);
            self.pan.set_gains(strip.pan_l, strip.pan_r);
        } else {
            self.fader.set_immediate(strip.fader);
            self.pan.left.set_immediate(strip.pan_l);
            self.pan.right.set_immediate(strip.pan_r);
            self.configured = true;
        }
        self.sends = strip.sends;
    }

    pub fn set_fader_db(&mut self, db: f64) {
        self.fader.set_target(db_to_gain(db.clamp(-96.0, 12.0)));
    }

    /// Retarget the fader from an automation value in dB
    pub fn set_fader_target_db(&mut self, db: f64) {
        self.fader.set_target(db_to_gain(db.clamp(-96.0, 12.0)));
    }

    pub fn set_pan(&mut self, pan: f64) {
        let (l, r) = pan_gains(pan);
        self.pan.set_gains(l, r);
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    pub fn set_soloed(&mut self, soloed: bool) {
        self.soloed = soloed;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn is_soloed(&self) -> bool {
        self.soloed
    }

    fn accumulate_sends(
        &self,
        left: &[Sample],
        right: &[Sample],
        buses: &mut [SendBus],
        pre_fader: bool,
        num_samples: usize,
    ) {
        for send in &self.sends {
            if send.gain <= 0.0 || send.pre_fader != pre_fader {
                continue;
            }
            let Some(bus) = buses.get_mut(send.target) else {
                continue;
            };
            for i in 0..num_samples {
                bus.left[i] += left[i] * send.gain;
                bus.right[i] += right[i] * send.gain;
            }
        }
    }

    /// Run the channel over `left`/`right` in place, tapping sends and
    /// summing the result into the master buffers
    fn process(
        &mut self,
        left: &mut [Sample],
        right: &mut [Sample],
        buses: &mut [SendBus],
        master_l: &mut [Sample],
        master_r: &mut [Sample],
        num_samples: usize,
    ) {
        for i in 0..num_samples {
            let mut l = left[i] * self.trim;
            let mut r = right[i] * self.trim;

            (l, r) = self.eq.process_sample(l, r);
            if self.comp_enabled {
                (l, r) = self.comp.process_sample(l, r);
            }

            left[i] = l;
            right[i] = r;
        }

        self.accumulate_sends(left, right, buses, true, num_samples);

        for i in 0..num_samples {
            let g = self.fader.next();
            let (l, r) = self.pan.next(left[i] * g, right[i] * g);
            left[i] = l;
            right[i] = r;
        }

        self.accumulate_sends(left, right, buses, false, num_samples);

        for i in 0..num_samples {
            master_l[i] += left[i];
            master_r[i] += right[i];
        }
    }

    fn reset(&mut self) {
        self.eq.reset();
        self.comp.reset();
        self.fader.reset();
        self.pan.reset();
    }
}

/// Fixed pool of channels plus send and master buses
pub struct Mixer {
    channels: Vec<MixerChannel>,
    send_buses: Vec<SendBus>,
    master_gain: SmoothedParam,
    master_pan: SmoothedPan,
    num_active: usize,
    has_solo: bool,
    configured: bool,
}

impl Mixer {
    pub fn new(sample_rate: f64, max_block: usize) -> Self {
        Self {
            channels: (0..MAX_TRACKS).map(|_| MixerChannel::new(sample_rate)).collect(),
            send_buses: (0..NUM_SEND_BUSES).map(|_| SendBus::new(max_block)).collect(),
            master_gain: SmoothedParam::with_range(
                1.0,
                DEFAULT_SMOOTHING_MS,
                sample_rate,
                0.0,
                16.0,
            ),
            master_pan: SmoothedPan::new(0.0, DEFAULT_SMOOTHING_MS, sample_rate),
            num_active: 0,
            has_solo: false,
            configured: false,
        }
    }

    /// Retarget every channel from a freshly picked-up snapshot
    pub fn apply_snapshot(&mut self, snapshot: &RenderSnapshot) {
        self.num_active = snapshot.tracks.len().min(MAX_TRACKS);
        for (channel, track) in self.channels.iter_mut().zip(&snapshot.tracks) {
            channel.apply_strip(&track.strip, track.muted, track.soloed);
        }
        if self.configured {
            self.master_gain.set_target(snapshot.master_gain);
            self.master_pan
                .set_gains(snapshot.master_pan_l, snapshot.master_pan_r);
        } else {
            self.master_gain.set_immediate(snapshot.master_gain);
            self.master_pan.left.set_immediate(snapshot.master_pan_l);
            self.master_pan.right.set_immediate(snapshot.master_pan_r);
            self.configured = true;
        }
        self.update_solo_state();
    }

    pub fn num_active(&self) -> usize {
        self.num_active
    }

    pub fn channel_mut(&mut self, index: usize) -> Option<&mut MixerChannel> {
        if index < self.num_active {
            self.channels.get_mut(index)
        } else {
            None
        }
    }

    pub fn set_track_gain_db(&mut self, track: usize, db: f64) {
        if let Some(channel) = self.channel_mut(track) {
            channel.set_fader_db(db);
        }
    }

    pub fn set_track_mute(&mut self, track: usize, muted: bool) {
        if let Some(channel) = self.channel_mut(track) {
            channel.set_muted(muted);
        }
    }

    pub fn set_track_solo(&mut self, track: usize, soloed: bool) {
        if let Some(channel) = self.channel_mut(track) {
            channel.set_soloed(soloed);
        }
        self.update_solo_state();
    }

    fn update_solo_state(&mut self) {
        self.has_solo = self.channels[..self.num_active].iter().any(|c| c.soloed);
    }

    /// Solo/mute resolution: explicit mute wins; any solo mutes every
    /// non-soloed track without touching stored mute flags
    pub fn is_audible(&self, track: usize) -> bool {
        let Some(channel) = self.channels.get(track) else {
            return false;
        };
        if track >= self.num_active || channel.muted {
            return false;
        }
        !self.has_solo || channel.soloed
    }

    /// Clear send buses for a new block
    pub fn begin_block(&mut self, num_samples: usize) {
        for bus in &mut self.send_buses {
            bus.clear(num_samples);
        }
    }

    /// Process one track's rendered audio through its channel strip
    pub fn process_channel(
        &mut self,
        track: usize,
        left: &mut [Sample],
        right: &mut [Sample],
        master_l: &mut [Sample],
        master_r: &mut [Sample],
        num_samples: usize,
    ) {
        if track >= self.num_active {
            return;
        }
        let Some(channel) = self.channels.get_mut(track) else {
            return;
        };
        channel.process(left, right, &mut self.send_buses, master_l, master_r, num_samples);
    }

    /// Sum the accumulated send buses into the master bus
    pub fn mix_sends_into(&mut self, master_l: &mut [Sample], master_r: &mut [Sample], num_samples: usize) {
        for bus in &self.send_buses {
            for i in 0..num_samples {
                master_l[i] += bus.left[i];
                master_r[i] += bus.right[i];
            }
        }
    }

    pub fn send_bus(&self, index: usize) -> Option<&SendBus> {
        self.send_buses.get(index)
    }

    /// Apply smoothed master gain and pan
    pub fn apply_master(&mut self, left: &mut [Sample], right: &mut [Sample], num_samples: usize) {
        for i in 0..num_samples {
            let g = self.master_gain.next();
            let (l, r) = self.master_pan.next(left[i] * g, right[i] * g);
            left[i] = l;
            right[i] = r;
        }
    }

    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        self.master_gain.reset();
        self.master_pan.reset();
    }
}
