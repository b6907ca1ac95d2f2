//! Session renderer: snapshot publish and real-time render
//!
//! The control thread turns the mutable `Session` into an immutable
//! `RenderSnapshot` (gains resolved to linear, pans to constant-power
//! coefficients, MIDI flattened to absolute time) and publishes it
//! through the atomic slot. The audio thread picks the snapshot up,
//! mixes overlapping clip ranges and synth voices per track, and runs
//! everything through the mixer. Nothing on the render path allocates.

use std::sync::Arc;

use log::debug;

use coda_core::{db_to_gain, Sample, Session, TrackKind};
use coda_dsp::smoothing::pan_gains;

use crate::automation::{AutomationBank, ParamId};
use crate::mixer::{Mixer, MAX_TRACKS};
use crate::snapshot::{
    RenderClip, RenderMidiClip, RenderNote, RenderSend, RenderSnapshot, RenderStrip, RenderTrack,
    SnapshotSlot,
};

/// Fixed polyphony for the built-in MIDI synth
pub const NUM_SYNTH_VOICES: usize = 32;

/// Build an immutable render snapshot from the current session state
pub fn build_snapshot(session: &Session, automation: &AutomationBank) -> Box<RenderSnapshot> {
    let mut snapshot = RenderSnapshot {
        tracks: Vec::with_capacity(session.tracks.len()),
        has_solo: session.any_solo(),
        master_gain: db_to_gain(session.master.gain_db),
        ..Default::default()
    };
    (snapshot.master_pan_l, snapshot.master_pan_r) = pan_gains(session.master.pan);

    for (index, track) in session.tracks.iter().enumerate() {
        let strip = &track.strip;
        let (pan_l, pan_r) = pan_gains(strip.pan);

        let mut sends = [RenderSend::default(); coda_core::NUM_SENDS];
        for (slot, send) in strip.sends.iter().enumerate() {
            if send.is_active() {
                sends[slot] = RenderSend {
                    gain: db_to_gain(send.level_db),
                    target: send.target.unwrap_or(0),
                    pre_fader: send.pre_fader,
                };
            }
        }

        let mut trim = db_to_gain(strip.trim_db);
        if strip.polarity_inverted {
            trim = -trim;
        }

        let clips = track
            .clips
            .iter()
            .filter(|clip| clip.asset.num_channels() > 0 && clip.source_len > 0)
            .map(|clip| RenderClip {
                asset: Arc::clone(&clip.asset),
                timeline_start: clip.timeline_start,
                source_start: clip.source_start,
                source_len: clip.source_len,
                gain: db_to_gain(clip.gain_db),
                fade_in: clip.fade_in.min(clip.source_len),
                fade_out: clip.fade_out.min(clip.source_len),
            })
            .collect();

        let midi_clips = track
            .midi_clips
            .iter()
            .map(|clip| RenderMidiClip {
                notes: clip
                    .notes
                    .iter()
                    .map(|note| RenderNote {
                        note: note.note,
                        velocity: note.velocity.clamp(0.0, 1.0),
                        start: clip.timeline_start + note.start,
                        end: clip.timeline_start + note.start + note.length,
                    })
                    .collect(),
            })
            .collect();

        snapshot.tracks.push(RenderTrack {
            muted: strip.muted,
            soloed: strip.soloed,
            is_midi: track.kind == TrackKind::Midi,
            clips,
            midi_clips,
            strip: RenderStrip {
                trim,
                fader: db_to_gain(strip.volume_db),
                pan_l,
                pan_r,
                eq_bands: strip.eq_bands,
                compressor: strip.compressor,
                sends,
            },
            volume_lane: automation.lane(&ParamId::track_volume(index)),
            pan_lane: automation.lane(&ParamId::track_pan(index)),
        });
    }

    Box::new(snapshot)
}

/// Control-thread handle for publishing snapshots
pub struct SnapshotPublisher {
    slot: Arc<SnapshotSlot>,
}

impl SnapshotPublisher {
    pub fn new(slot: Arc<SnapshotSlot>) -> Self {
        Self { slot }
    }

    pub fn publish_session(&self, session: &Session, automation: &AutomationBank) {
        let snapshot = build_snapshot(session, automation);
        debug!(
            "publishing snapshot: {} tracks, solo={}",
            snapshot.tracks.len(),
            snapshot.has_solo
        );
        self.slot.publish(snapshot);
    }
}

#[derive(Debug, Clone, Copy)]
struct SynthVoice {
    note: u8,
    velocity: f64,
    phase: f64,
    phase_inc: f64,
    started_at: u64,
    active: bool,
}

impl SynthVoice {
    const fn idle() -> Self {
        Self {
            note: 0,
            velocity: 0.0,
            phase: 0.0,
            phase_inc: 0.0,
            started_at: 0,
            active: false,
        }
    }
}

/// Audio-thread side of the session renderer
pub struct SessionRenderer {
    slot: Arc<SnapshotSlot>,
    active: Option<Box<RenderSnapshot>>,
    /// Previous active snapshot, kept one generation to avoid freeing
    /// memory an in-flight read might still touch
    retired: Option<Box<RenderSnapshot>>,
    mixer: Mixer,
    voices: [SynthVoice; NUM_SYNTH_VOICES],
    scratch_l: Vec<Sample>,
    scratch_r: Vec<Sample>,
    sample_rate: f64,
    max_block: usize,
}

impl SessionRenderer {
    pub fn new(slot: Arc<SnapshotSlot>, sample_rate: f64, max_block: usize) -> Self {
        Self {
            slot,
            active: None,
            retired: None,
            mixer: Mixer::new(sample_rate, max_block),
            voices: [SynthVoice::idle(); NUM_SYNTH_VOICES],
            scratch_l: vec![0.0; max_block],
            scratch_r: vec![0.0; max_block],
            sample_rate,
            max_block,
        }
    }

    pub fn mixer_mut(&mut self) -> &mut Mixer {
        &mut self.mixer
    }

    pub fn has_active_snapshot(&self) -> bool {
        self.active.is_some()
    }

    /// The previously active snapshot, still alive for one generation
    pub fn retired_snapshot(&self) -> Option<&RenderSnapshot> {
        self.retired.as_deref()
    }

    /// Pick up a pending snapshot, if any. Part of every `process`
    /// call; also invoked on its own while the transport is stopped.
    pub fn poll_snapshot(&mut self) {
        if let Some(new_snapshot) = self.slot.take() {
            self.mixer.apply_snapshot(&new_snapshot);
            // Dropping the old retired snapshot here gives the previous
            // active one its one-generation grace period
            self.retired = self.active.take();
            self.active = Some(new_snapshot);
        }
    }

    /// Render one block additively into `left`/`right` at the given
    /// transport position. RT-safe: no allocation, no locks.
    pub fn process(&mut self, left: &mut [Sample], right: &mut [Sample], position: u64) {
        self.poll_snapshot();

        let num_samples = left.len().min(right.len()).min(self.max_block);
        if num_samples == 0 {
            return;
        }

        let Some(snapshot) = self.active.as_deref() else {
            return;
        };

        self.mixer.begin_block(num_samples);

        for (index, track) in snapshot.tracks.iter().enumerate().take(MAX_TRACKS) {
            if !self.mixer.is_audible(index) {
                continue;
            }

            self.scratch_l[..num_samples].fill(0.0);
            self.scratch_r[..num_samples].fill(0.0);

            if track.is_midi {
                render_midi_track(
                    track,
                    &mut self.voices,
                    &mut self.scratch_l[..num_samples],
                    &mut self.scratch_r[..num_samples],
                    position,
                    self.sample_rate,
                );
            } else {
                render_audio_track(
                    track,
                    &mut self.scratch_l[..num_samples],
                    &mut self.scratch_r[..num_samples],
                    position,
                );
            }

            if let Some(channel) = self.mixer.channel_mut(index) {
                if let Some(lane) = &track.volume_lane {
                    channel.set_fader_target_db(lane.value_at(position));
                }
                if let Some(lane) = &track.pan_lane {
                    channel.set_pan(lane.value_at(position));
                }
            }

            self.mixer.process_channel(
                index,
                &mut self.scratch_l,
                &mut self.scratch_r,
                left,
                right,
                num_samples,
            );
        }

        self.mixer.mix_sends_into(left, right, num_samples);
        self.mixer.apply_master(left, right, num_samples);
    }

    pub fn reset(&mut self) {
        self.mixer.reset();
        self.voices = [SynthVoice::idle(); NUM_SYNTH_VOICES];
    }
}

/// Mix every clip range overlapping the block, with bounds-checked
/// source reads and linear fade envelopes
fn render_audio_track(
    track: &RenderTrack,
    out_l: &mut [Sample],
    out_r: &mut [Sample],
    position: u64,
) {
    let num_samples = out_l.len() as u64;

    for clip in &track.clips {
        let clip_end = clip.timeline_end();
        if position >= clip_end || position + num_samples <= clip.timeline_start {
            continue;
        }

        let block_start = clip.timeline_start.saturating_sub(position) as usize;
        let block_end = (clip_end - position).min(num_samples) as usize;

        let ch0 = clip.asset.channel(0);
        let ch1 = clip.asset.channel(1);

        for i in block_start..block_end {
            let pos_in_clip = position + i as u64 - clip.timeline_start;
            let source_pos = clip.source_start + pos_in_clip;

            // Out-of-bounds asset reads render silence for that sample
            let idx = source_pos as usize;
            let (Some(&sample_l), Some(&sample_r)) = (ch0.get(idx), ch1.get(idx)) else {
                continue;
            };

            let mut envelope = 1.0;
            if clip.fade_in > 0 && pos_in_clip < clip.fade_in {
                envelope = pos_in_clip as f64 / clip.fade_in as f64;
            }
            if clip.fade_out > 0 && pos_in_clip >= clip.source_len - clip.fade_out {
                let remaining = clip.source_len - pos_in_clip;
                envelope *= remaining as f64 / clip.fade_out as f64;
            }

            let gain = clip.gain * envelope;
            out_l[i] += sample_l * gain;
            out_r[i] += sample_r * gain;
        }
    }
}

/// Sine synth with a fixed voice pool. When every voice is busy the
/// oldest one is stolen rather than dropping the note.
fn render_midi_track(
    track: &RenderTrack,
    voices: &mut [SynthVoice; NUM_SYNTH_VOICES],
    out_l: &mut [Sample],
    out_r: &mut [Sample],
    position: u64,
    sample_rate: f64,
) {
    let num_samples = out_l.len() as u64;
    let block_end = position + num_samples;

    let attack_samples = (sample_rate * 0.005) as u64;
    let release_samples = (sample_rate * 0.01) as u64;

    for clip in &track.midi_clips {
        for note in &clip.notes {
            if position >= note.end || block_end <= note.start {
                continue;
            }

            let start_in_block = note.start.saturating_sub(position) as usize;
            let end_in_block = (note.end - position).min(num_samples) as usize;

            let voice = match allocate_voice(voices, note, position, sample_rate) {
                Some(voice) => voice,
                None => continue,
            };

            let gain = note.velocity * 0.25;
            let note_len = note.end - note.start;

            for i in start_in_block..end_in_block {
                let sample = (voice.phase * std::f64::consts::TAU).sin();

                let pos_in_note = position + i as u64 - note.start;
                let mut env = 1.0;
                if attack_samples > 0 && pos_in_note < attack_samples {
                    env = pos_in_note as f64 / attack_samples as f64;
                }
                if release_samples > 0 && pos_in_note + release_samples > note_len {
                    let remaining = note_len - pos_in_note;
                    env *= (remaining as f64 / release_samples as f64).min(1.0);
                }

                let out = sample * gain * env;
                out_l[i] += out;
                out_r[i] += out;

                voice.phase += voice.phase_inc;
                if voice.phase >= 1.0 {
                    voice.phase -= 1.0;
                }
            }

            if block_end >= note.end {
                voice.active = false;
            }
        }
    }
}

/// Find the voice already playing this note, a free voice, or steal the
/// oldest active one
fn allocate_voice<'a>(
    voices: &'a mut [SynthVoice; NUM_SYNTH_VOICES],
    note: &RenderNote,
    position: u64,
    sample_rate: f64,
) -> Option<&'a mut SynthVoice> {
    let mut free: Option<usize> = None;
    let mut oldest: usize = 0;
    let mut oldest_start = u64::MAX;

    for (i, voice) in voices.iter().enumerate() {
        if voice.active && voice.note == note.note {
            return Some(&mut voices[i]);
        }
        if !voice.active && free.is_none() {
            free = Some(i);
        }
        if voice.active && voice.started_at < oldest_start {
            oldest_start = voice.started_at;
            oldest = i;
        }
    }

    let slot = free.unwrap_or(oldest);
    let voice = &mut voices[slot];
    voice.note = note.note;
    voice.velocity = note.velocity;
    voice.active = true;
    voice.phase = 0.0;
    voice.started_at = position.max(note.start);
    // A4 = 440 Hz at MIDI note 69
    let freq = 440.0 * 2.0_f64.powf((note.note as f64 - 69.0) / 12.0);
    voice.phase_inc = freq / sample_rate;
    Some(voice)
}
