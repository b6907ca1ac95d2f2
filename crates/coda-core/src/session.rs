//! Control-thread session model
//!
//! Tracks, clips and assets as edited by the UI/command layer. Nothing in
//! here is touched by the audio thread; the engine turns a `Session` into
//! an immutable render snapshot on publish.

use std::sync::Arc;

use crate::{ChannelStripState, CoreError, CoreResult, Sample};

/// Immutable, reference-counted audio sample data
#[derive(Debug)]
pub struct AudioAsset {
    pub name: String,
    pub sample_rate: f64,
    channels: Vec<Vec<Sample>>,
}

impl AudioAsset {
    pub fn new(name: impl Into<String>, sample_rate: f64, channels: Vec<Vec<Sample>>) -> Self {
        Self {
            name: name.into(),
            sample_rate,
            channels,
        }
    }

    #[inline]
    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length in samples of the longest channel
    #[inline]
    pub fn len(&self) -> u64 {
        self.channels.iter().map(|c| c.len()).max().unwrap_or(0) as u64
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Channel data; out-of-range channels fall back to channel 0
    #[inline]
    pub fn channel(&self, index: usize) -> &[Sample] {
        self.channels
            .get(index)
            .or_else(|| self.channels.first())
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }
}

/// An audio clip placed on the timeline
#[derive(Debug, Clone)]
pub struct AudioClip {
    pub asset: Arc<AudioAsset>,
    pub timeline_start: u64,
    /// Offset into the asset where playback starts
    pub source_start: u64,
    /// Number of source samples the clip spans
    pub source_len: u64,
    pub gain_db: f64,
    pub fade_in: u64,
    pub fade_out: u64,
}

impl AudioClip {
    pub fn new(asset: Arc<AudioAsset>, timeline_start: u64) -> Self {
        let source_len = asset.len();
        Self {
            asset,
            timeline_start,
            source_start: 0,
            source_len,
            gain_db: 0.0,
            fade_in: 0,
            fade_out: 0,
        }
    }

    #[inline]
    pub fn timeline_end(&self) -> u64 {
        self.timeline_start + self.source_len
    }
}

/// A note inside a MIDI clip, clip-relative start
#[derive(Debug, Clone, Copy)]
pub struct MidiNote {
    pub note: u8,
    /// Normalized velocity, 0..1
    pub velocity: f64,
    pub start: u64,
    pub length: u64,
}

/// A MIDI clip placed on the timeline
#[derive(Debug, Clone, Default)]
pub struct MidiClip {
    pub timeline_start: u64,
    pub notes: Vec<MidiNote>,
}

/// Track content kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Midi,
}

/// One session track
#[derive(Debug, Clone)]
pub struct Track {
    pub name: String,
    pub kind: TrackKind,
    pub strip: ChannelStripState,
    pub clips: Vec<AudioClip>,
    pub midi_clips: Vec<MidiClip>,
}

impl Track {
    pub fn audio(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TrackKind::Audio,
            strip: ChannelStripState::default(),
            clips: Vec::new(),
            midi_clips: Vec::new(),
        }
    }

    pub fn midi(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TrackKind::Midi,
            strip: ChannelStripState::default(),
            clips: Vec::new(),
            midi_clips: Vec::new(),
        }
    }
}

/// Master bus state
#[derive(Debug, Clone)]
pub struct MasterState {
    pub gain_db: f64,
    pub pan: f64,
}

impl MasterState {
    pub fn set_gain_db(&mut self, db: f64) {
        self.gain_db = db.clamp(-96.0, 12.0);
    }

    pub fn set_pan(&mut self, pan: f64) {
        self.pan = pan.clamp(-1.0, 1.0);
    }
}

impl Default for MasterState {
    fn default() -> Self {
        Self {
            gain_db: 0.0,
            pan: 0.0,
        }
    }
}

/// The whole editable session
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub tracks: Vec<Track>,
    pub master: MasterState,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_track(&mut self, track: Track) -> usize {
        self.tracks.push(track);
        self.tracks.len() - 1
    }

    pub fn track(&self, index: usize) -> CoreResult<&Track> {
        self.tracks.get(index).ok_or(CoreError::TrackNotFound(index))
    }

    pub fn track_mut(&mut self, index: usize) -> CoreResult<&mut Track> {
        self.tracks
            .get_mut(index)
            .ok_or(CoreError::TrackNotFound(index))
    }

    /// True if any track is currently soloed
    pub fn any_solo(&self) -> bool {
        self.tracks.iter().any(|t| t.strip.soloed)
    }

    /// True if the track would be audible under the current solo/mute state.
    /// Explicit mute always wins; solo on any track mutes the others without
    /// touching their stored mute flags.
    pub fn is_track_audible(&self, index: usize) -> CoreResult<bool> {
        let track = self.track(index)?;
        if track.strip.muted {
            return Ok(false);
        }
        Ok(!self.any_solo() || track.strip.soloed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_asset(len: usize) -> Arc<AudioAsset> {
        Arc::new(AudioAsset::new(
            "test",
            44100.0,
            vec![vec![0.5; len], vec![0.5; len]],
        ))
    }

    #[test]
    fn test_clip_span() {
        let clip = AudioClip::new(test_asset(1000), 500);
        assert_eq!(clip.timeline_end(), 1500);
        assert_eq!(clip.source_len, 1000);
    }

    #[test]
    fn test_asset_channel_fallback() {
        let asset = AudioAsset::new("mono", 44100.0, vec![vec![1.0; 10]]);
        assert_eq!(asset.channel(1).len(), 10);
        assert_eq!(asset.num_channels(), 1);
    }

    #[test]
    fn test_solo_overrides_without_clearing_mute() {
        let mut session = Session::new();
        session.add_track(Track::audio("drums"));
        session.add_track(Track::audio("bass"));
        session.add_track(Track::audio("keys"));
        session.track_mut(1).unwrap().strip.muted = true;

        // No solo: only the muted track is silent
        assert!(session.is_track_audible(0).unwrap());
        assert!(!session.is_track_audible(1).unwrap());

        // Solo track 0: everything else silent, mute flags untouched
        session.track_mut(0).unwrap().strip.soloed = true;
        assert!(session.is_track_audible(0).unwrap());
        assert!(!session.is_track_audible(2).unwrap());
        assert!(session.track(1).unwrap().strip.muted);

        // Clear solo: previous state restored
        session.track_mut(0).unwrap().strip.soloed = false;
        assert!(session.is_track_audible(2).unwrap());
        assert!(!session.is_track_audible(1).unwrap());
    }

    #[test]
    fn test_missing_track() {
        let session = Session::new();
        assert!(matches!(
            session.track(3),
            Err(CoreError::TrackNotFound(3))
        ));
    }
}
