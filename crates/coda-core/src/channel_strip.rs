//! Channel strip state
//!
//! The control-thread view of one mixer channel: fader, pan, mute/solo,
//! record arm, sends, insert slots, VCA assignment, trim and polarity,
//! plus the built-in EQ and compressor settings. Every setter clamps to
//! the documented range; the audio thread only ever sees a denormalized
//! copy of these fields through a render snapshot.

use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// Sends per channel
pub const NUM_SENDS: usize = 8;

/// Insert slots per channel
pub const NUM_INSERT_SLOTS: usize = 15;

/// EQ bands per channel
pub const NUM_EQ_BANDS: usize = 4;

/// Send levels at or below this are treated as inactive
pub const SEND_FLOOR_DB: f64 = -60.0;

/// EQ band filter shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum EqBandKind {
    LowShelf,
    #[default]
    Peak,
    HighShelf,
}

/// One parametric EQ band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EqBandState {
    pub kind: EqBandKind,
    pub frequency: f64,
    pub gain_db: f64,
    pub q: f64,
    pub enabled: bool,
}

impl EqBandState {
    pub fn new(kind: EqBandKind, frequency: f64) -> Self {
        Self {
            kind,
            frequency: frequency.clamp(20.0, 20_000.0),
            gain_db: 0.0,
            q: 1.0,
            enabled: true,
        }
    }

    pub fn set_frequency(&mut self, freq: f64) {
        self.frequency = freq.clamp(20.0, 20_000.0);
    }

    pub fn set_gain_db(&mut self, db: f64) {
        self.gain_db = db.clamp(-24.0, 24.0);
    }

    pub fn set_q(&mut self, q: f64) {
        self.q = q.clamp(0.1, 10.0);
    }
}

impl Default for EqBandState {
    fn default() -> Self {
        Self::new(EqBandKind::Peak, 1000.0)
    }
}

/// Default band layout: low shelf, two mids, high shelf
pub fn default_eq_bands() -> [EqBandState; NUM_EQ_BANDS] {
    [
        EqBandState::new(EqBandKind::LowShelf, 80.0),
        EqBandState::new(EqBandKind::Peak, 250.0),
        EqBandState::new(EqBandKind::Peak, 1000.0),
        EqBandState::new(EqBandKind::HighShelf, 8000.0),
    ]
}

/// Compressor settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompressorState {
    pub enabled: bool,
    pub threshold_db: f64,
    pub ratio: f64,
    pub attack_ms: f64,
    pub release_ms: f64,
    pub knee_db: f64,
    pub makeup_db: f64,
}

impl CompressorState {
    pub fn set_threshold_db(&mut self, db: f64) {
        self.threshold_db = db.clamp(-60.0, 0.0);
    }

    pub fn set_ratio(&mut self, ratio: f64) {
        self.ratio = ratio.clamp(1.0, 20.0);
    }

    pub fn set_attack_ms(&mut self, ms: f64) {
        self.attack_ms = ms.clamp(0.1, 100.0);
    }

    pub fn set_release_ms(&mut self, ms: f64) {
        self.release_ms = ms.clamp(1.0, 1000.0);
    }

    pub fn set_knee_db(&mut self, db: f64) {
        self.knee_db = db.clamp(0.0, 10.0);
    }

    pub fn set_makeup_db(&mut self, db: f64) {
        self.makeup_db = db.clamp(0.0, 24.0);
    }
}

impl Default for CompressorState {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold_db: -20.0,
            ratio: 4.0,
            attack_ms: 5.0,
            release_ms: 50.0,
            knee_db: 2.0,
            makeup_db: 0.0,
        }
    }
}

/// One aux send slot
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SendSlot {
    /// Send level in dB; levels at or below [`SEND_FLOOR_DB`] are inactive
    pub level_db: f64,
    /// Destination send bus index
    pub target: Option<usize>,
    /// Tap before the fader instead of after
    pub pre_fader: bool,
}

impl SendSlot {
    pub fn set_level_db(&mut self, db: f64) {
        self.level_db = db.clamp(-96.0, 12.0);
    }

    pub fn is_active(&self) -> bool {
        self.target.is_some() && self.level_db > SEND_FLOOR_DB
    }
}

impl Default for SendSlot {
    fn default() -> Self {
        Self {
            level_db: -96.0,
            target: None,
            pre_fader: false,
        }
    }
}

/// One insert slot in the plugin chain
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsertSlot {
    pub plugin_id: Option<String>,
    pub bypassed: bool,
}

/// Complete per-channel mixer state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelStripState {
    /// Fader level in dB
    pub volume_db: f64,
    /// Pan position, -1 (left) to 1 (right)
    pub pan: f64,
    pub muted: bool,
    pub soloed: bool,
    pub record_armed: bool,
    pub sends: [SendSlot; NUM_SENDS],
    pub inserts: [InsertSlot; NUM_INSERT_SLOTS],
    pub vca: Option<String>,
    /// Input trim in dB, applied before everything else
    pub trim_db: f64,
    pub polarity_inverted: bool,
    pub eq_bands: [EqBandState; NUM_EQ_BANDS],
    pub compressor: CompressorState,
}

impl ChannelStripState {
    pub fn set_volume_db(&mut self, db: f64) {
        self.volume_db = db.clamp(-96.0, 12.0);
    }

    pub fn set_pan(&mut self, pan: f64) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    pub fn set_trim_db(&mut self, db: f64) {
        self.trim_db = db.clamp(-24.0, 24.0);
    }

    pub fn send_mut(&mut self, index: usize) -> CoreResult<&mut SendSlot> {
        self.sends
            .get_mut(index)
            .ok_or(CoreError::SendOutOfRange(index))
    }

    pub fn insert_plugin(&mut self, slot: usize, plugin_id: impl Into<String>) -> CoreResult<()> {
        let insert = self
            .inserts
            .get_mut(slot)
            .ok_or(CoreError::InsertOutOfRange(slot))?;
        insert.plugin_id = Some(plugin_id.into());
        insert.bypassed = false;
        Ok(())
    }

    pub fn remove_plugin(&mut self, slot: usize) -> CoreResult<Option<String>> {
        let insert = self
            .inserts
            .get_mut(slot)
            .ok_or(CoreError::InsertOutOfRange(slot))?;
        insert.bypassed = false;
        Ok(insert.plugin_id.take())
    }

    pub fn bypass_plugin(&mut self, slot: usize, bypassed: bool) -> CoreResult<()> {
        let insert = self
            .inserts
            .get_mut(slot)
            .ok_or(CoreError::InsertOutOfRange(slot))?;
        insert.bypassed = bypassed;
        Ok(())
    }

    pub fn assign_vca(&mut self, vca: Option<String>) {
        self.vca = vca;
    }
}

impl Default for ChannelStripState {
    fn default() -> Self {
        Self {
            volume_db: 0.0,
            pan: 0.0,
            muted: false,
            soloed: false,
            record_armed: false,
            sends: [SendSlot::default(); NUM_SENDS],
            inserts: std::array::from_fn(|_| InsertSlot::default()),
            vca: None,
            trim_db: 0.0,
            polarity_inverted: false,
            eq_bands: default_eq_bands(),
            compressor: CompressorState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setters_clamp() {
        let mut strip = ChannelStripState::default();
        strip.set_volume_db(-300.0);
        assert_eq!(strip.volume_db, -96.0);
        strip.set_pan(3.0);
        assert_eq!(strip.pan, 1.0);
        strip.set_trim_db(100.0);
        assert_eq!(strip.trim_db, 24.0);
    }

    #[test]
    fn test_send_activation() {
        let mut strip = ChannelStripState::default();
        assert!(!strip.sends[0].is_active());

        let send = strip.send_mut(0).unwrap();
        send.target = Some(2);
        send.set_level_db(-12.0);
        assert!(strip.sends[0].is_active());

        strip.send_mut(0).unwrap().set_level_db(-80.0);
        assert!(!strip.sends[0].is_active());
    }

    #[test]
    fn test_send_index_out_of_range() {
        let mut strip = ChannelStripState::default();
        assert!(strip.send_mut(NUM_SENDS).is_err());
    }

    #[test]
    fn test_insert_chain() {
        let mut strip = ChannelStripState::default();
        strip.insert_plugin(0, "eq.alpha").unwrap();
        strip.bypass_plugin(0, true).unwrap();
        assert!(strip.inserts[0].bypassed);

        let removed = strip.remove_plugin(0).unwrap();
        assert_eq!(removed.as_deref(), Some("eq.alpha"));
        assert!(strip.inserts[0].plugin_id.is_none());
        assert!(!strip.inserts[0].bypassed);
    }

    #[test]
    fn test_strip_serde_round_trip() {
        let mut strip = ChannelStripState::default();
        strip.set_volume_db(-6.0);
        strip.send_mut(3).unwrap().target = Some(1);

        let json = serde_json::to_string(&strip).unwrap();
        let back: ChannelStripState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.volume_db, -6.0);
        assert_eq!(back.sends[3].target, Some(1));
    }
}
