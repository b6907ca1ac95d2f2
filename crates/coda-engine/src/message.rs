//! Cross-thread message types
//!
//! Plain `Copy` payloads: created by the sender, consumed exactly once
//! by the receiver, never retained.

/// Control-thread → audio-thread commands
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EngineCommand {
    #[default]
    Play,
    Stop,
    SetBpm(f64),
    Seek(u64),
    SetTimeSignature {
        numerator: u8,
        denominator: u8,
    },
    SetLoopRegion {
        start: u64,
        end: u64,
    },
    SetLoopEnabled(bool),
    SetRecordEnabled(bool),
    SetMetronomeEnabled(bool),
    SetMetronomeGain(f64),
    SetTrackGain {
        track: usize,
        gain_db: f64,
    },
    SetTrackMute {
        track: usize,
        muted: bool,
    },
    SetTrackSolo {
        track: usize,
        soloed: bool,
    },
}

/// Audio-thread → control-thread telemetry
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EngineEvent {
    PlayheadPosition {
        samples: u64,
        seconds: f64,
    },
    PeakLevel {
        left: f64,
        right: f64,
    },
    #[default]
    TransportStateChanged,
}
