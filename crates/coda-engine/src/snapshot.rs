//! Render snapshots
//!
//! An immutable, fully self-contained view of everything the audio
//! thread needs to render: resolved asset references, precomputed
//! gains and pan coefficients, flattened MIDI notes and denormalized
//! channel-strip parameters. Built on the control thread, handed over
//! through a single atomic pointer exchange, never mutated afterwards.

use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

use coda_core::{AudioAsset, CompressorState, EqBandState, NUM_EQ_BANDS, NUM_SENDS};

use crate::automation::AutomationLane;

/// One audio clip, resolved for rendering.
///
/// The held `Arc` keeps the asset's sample data alive for the
/// snapshot's lifetime; the session's own references outlive every
/// snapshot, so the audio thread never ends up freeing asset data.
#[derive(Debug, Clone)]
pub struct RenderClip {
    pub asset: Arc<AudioAsset>,
    pub timeline_start: u64,
    pub source_start: u64,
    pub source_len: u64,
    /// Clip gain, linear
    pub gain: f64,
    pub fade_in: u64,
    pub fade_out: u64,
}

impl RenderClip {
    #[inline]
    pub fn timeline_end(&self) -> u64 {
        self.timeline_start + self.source_len
    }
}

/// A MIDI note flattened to absolute timeline samples
#[derive(Debug, Clone, Copy)]
pub struct RenderNote {
    pub note: u8,
    pub velocity: f64,
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RenderMidiClip {
    pub notes: Vec<RenderNote>,
}

/// One send slot, denormalized: linear gain, resolved target
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderSend {
    /// Linear gain; 0.0 means the slot is inactive
    pub gain: f64,
    pub target: usize,
    pub pre_fader: bool,
}

/// Denormalized channel-strip parameters for the audio thread
#[derive(Debug, Clone)]
pub struct RenderStrip {
    /// Input trim, linear, sign-flipped when polarity is inverted
    pub trim: f64,
    /// Fader gain, linear
    pub fader: f64,
    /// Constant-power pan coefficients
    pub pan_l: f64,
    pub pan_r: f64,
    pub eq_bands: [EqBandState; NUM_EQ_BANDS],
    pub compressor: CompressorState,
    pub sends: [RenderSend; NUM_SENDS],
}

/// One track, resolved for rendering
#[derive(Debug, Clone)]
pub struct RenderTrack {
    pub muted: bool,
    pub soloed: bool,
    pub is_midi: bool,
    pub clips: Vec<RenderClip>,
    pub midi_clips: Vec<RenderMidiClip>,
    pub strip: RenderStrip,
    /// Fader automation in dB, overrides the static fader when present
    pub volume_lane: Option<Arc<AutomationLane>>,
    /// Pan automation in -1..1
    pub pan_lane: Option<Arc<AutomationLane>>,
}

/// The whole render state, published as one unit
#[derive(Debug, Clone, Default)]
pub struct RenderSnapshot {
    pub tracks: Vec<RenderTrack>,
    pub has_solo: bool,
    pub master_gain: f64,
    pub master_pan_l: f64,
    pub master_pan_r: f64,
}

/// Single-slot atomic hand-off for snapshots.
///
/// Only one snapshot can be pending: publishing while an unconsumed
/// one is still in the slot discards the older one on the publishing
/// side. The consumer takes ownership with a single pointer exchange.
pub struct SnapshotSlot {
    pending: AtomicPtr<RenderSnapshot>,
}

impl SnapshotSlot {
    pub fn new() -> Self {
        Self {
            pending: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Control thread: publish a snapshot. An older still-pending
    /// snapshot is dropped here, never on the audio thread.
    pub fn publish(&self, snapshot: Box<RenderSnapshot>) {
        let old = self
            .pending
            .swap(Box::into_raw(snapshot), Ordering::AcqRel);
        if !old.is_null() {
            // SAFETY: the pointer came from Box::into_raw in a previous
            // publish and was never handed to the consumer.
            drop(unsafe { Box::from_raw(old) });
        }
    }

    /// Audio thread: take the pending snapshot, if any
    pub fn take(&self) -> Option<Box<RenderSnapshot>> {
        let ptr = self.pending.swap(ptr::null_mut(), Ordering::AcqRel);
        if ptr.is_null() {
            None
        } else {
            // SAFETY: non-null pointers in the slot always come from
            // Box::into_raw and ownership transfers exactly once.
            Some(unsafe { Box::from_raw(ptr) })
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.load(Ordering::Acquire).is_null()
    }
}

impl Default for SnapshotSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SnapshotSlot {
    fn drop(&mut self) {
        let ptr = self.pending.swap(ptr::null_mut(), Ordering::AcqRel);
        if !ptr.is_null() {
            // SAFETY: same ownership argument as in take()
            drop(unsafe { Box::from_raw(ptr) });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot_with_gain(gain: f64) -> Box<RenderSnapshot> {
        Box::new(RenderSnapshot {
            master_gain: gain,
            ..Default::default()
        })
    }

    #[test]
    fn test_take_empty() {
        let slot = SnapshotSlot::new();
        assert!(slot.take().is_none());
        assert!(!slot.has_pending());
    }

    #[test]
    fn test_publish_then_take() {
        let slot = SnapshotSlot::new();
        slot.publish(snapshot_with_gain(0.5));
        assert!(slot.has_pending());

        let taken = slot.take().unwrap();
        assert_eq!(taken.master_gain, 0.5);
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_second_publish_supersedes_first() {
        let slot = SnapshotSlot::new();
        slot.publish(snapshot_with_gain(0.1));
        slot.publish(snapshot_with_gain(0.2));

        // Only the newest snapshot is ever seen by the consumer
        let taken = slot.take().unwrap();
        assert_eq!(taken.master_gain, 0.2);
        assert!(slot.take().is_none());
    }

    #[test]
    fn test_drop_frees_pending() {
        let asset = Arc::new(AudioAsset::new("a", 44100.0, vec![vec![0.0; 4]]));
        let weak = Arc::downgrade(&asset);

        {
            let slot = SnapshotSlot::new();
            let mut snapshot = RenderSnapshot::default();
            snapshot.tracks.push(RenderTrack {
                muted: false,
                soloed: false,
                is_midi: false,
                clips: vec![RenderClip {
                    asset,
                    timeline_start: 0,
                    source_start: 0,
                    source_len: 4,
                    gain: 1.0,
                    fade_in: 0,
                    fade_out: 0,
                }],
                midi_clips: Vec::new(),
                strip: RenderStrip {
                    trim: 1.0,
                    fader: 1.0,
                    pan_l: 1.0,
                    pan_r: 1.0,
                    eq_bands: coda_core::default_eq_bands(),
                    compressor: CompressorState::default(),
                    sends: [RenderSend::default(); NUM_SENDS],
                },
                volume_lane: None,
                pan_lane: None,
            });
            slot.publish(Box::new(snapshot));
        }

        // Slot dropped with a pending snapshot: the asset reference is
        // released
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_concurrent_publish_take() {
        use std::sync::Arc as StdArc;

        let slot = StdArc::new(SnapshotSlot::new());
        let publisher = StdArc::clone(&slot);

        let handle = std::thread::spawn(move || {
            for i in 0..10_000 {
                publisher.publish(snapshot_with_gain(i as f64));
            }
        });

        // Gains must only ever move forward: a consumed snapshot is
        // always at least as new as the previous one
        let mut last = -1.0;
        for _ in 0..10_000 {
            if let Some(snapshot) = slot.take() {
                assert!(snapshot.master_gain > last);
                last = snapshot.master_gain;
            }
        }
        handle.join().unwrap();
    }
}
