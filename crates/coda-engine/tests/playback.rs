//! End-to-end playback tests: session → snapshot → audio callback

use std::sync::Arc;

use coda_core::{db_to_gain, AudioAsset, AudioClip, Sample, Session, Track};
use coda_dsp::smoothing::pan_gains;
use coda_engine::{AudioEngine, AutomationBank, EngineEvent, EngineProcess};

const SR: f64 = 44100.0;
const BLOCK: usize = 512;

fn constant_session(value: Sample, len: usize) -> Session {
    let asset = Arc::new(AudioAsset::new(
        "tone",
        SR,
        vec![vec![value; len], vec![value; len]],
    ));
    let mut session = Session::new();
    let mut track = Track::audio("track");
    track.clips.push(AudioClip::new(asset, 0));
    session.add_track(track);
    session
}

fn run_block(process: &mut EngineProcess, n: usize) -> (Vec<Sample>, Vec<Sample>) {
    let mut left = vec![0.0; n];
    let mut right = vec![0.0; n];
    {
        let mut outputs: [&mut [Sample]; 2] = [&mut left, &mut right];
        process.process(&mut outputs);
    }
    (left, right)
}

#[test]
fn published_session_reaches_audio_output() {
    let (controller, mut process) = AudioEngine::new(SR, BLOCK);
    let session = constant_session(0.5, SR as usize);
    controller.publish_session(&session, &AutomationBank::new());

    // Nothing audible until playback starts
    let (left, _) = run_block(&mut process, BLOCK);
    assert!(left.iter().all(|&s| s == 0.0));

    controller.play();
    let (left, right) = run_block(&mut process, BLOCK);

    // Constant source through center track pan and center master pan
    let pan = pan_gains(0.0).0;
    let expected = 0.5 * pan * pan;
    assert!((left[BLOCK - 1] - expected).abs() < 1e-9);
    assert!((right[BLOCK - 1] - expected).abs() < 1e-9);
}

#[test]
fn track_gain_command_scales_output() {
    let (controller, mut process) = AudioEngine::new(SR, BLOCK);
    let session = constant_session(0.5, 4 * SR as usize);
    controller.publish_session(&session, &AutomationBank::new());
    controller.play();

    let (reference, _) = run_block(&mut process, BLOCK);

    controller.set_track_gain(0, -6.0);
    // Let the fader smoothing settle (~20 ms)
    let mut left = Vec::new();
    for _ in 0..20 {
        (left, _) = run_block(&mut process, BLOCK);
    }

    let expected = reference[BLOCK - 1] * db_to_gain(-6.0);
    assert!((left[BLOCK - 1] - expected).abs() < 1e-4);
}

#[test]
fn mute_command_controls_audibility() {
    let (controller, mut process) = AudioEngine::new(SR, BLOCK);
    let session = constant_session(0.5, 4 * SR as usize);
    controller.publish_session(&session, &AutomationBank::new());
    controller.play();

    let (left, _) = run_block(&mut process, BLOCK);
    assert!(left[BLOCK - 1] != 0.0);

    controller.set_track_mute(0, true);
    let (left, _) = run_block(&mut process, BLOCK);
    assert!(left.iter().all(|&s| s == 0.0));

    controller.set_track_mute(0, false);
    let (left, _) = run_block(&mut process, BLOCK);
    assert!(left[BLOCK - 1] != 0.0);
}

#[test]
fn loop_playback_renders_across_the_wrap() {
    let (controller, mut process) = AudioEngine::new(SR, BLOCK);

    // Clip covers the whole loop; audio must be continuous across the
    // wrap, with the position landing exactly on start + remainder
    let session = constant_session(0.25, 2 * SR as usize);
    controller.publish_session(&session, &AutomationBank::new());
    controller.set_loop_region(1000, 1000 + 4096);
    controller.set_loop_enabled(true);
    controller.seek(1000 + 4096 - 100);
    controller.play();

    let (left, _) = run_block(&mut process, BLOCK);
    assert_eq!(process.transport().position(), 1000 + (BLOCK - 100) as u64);
    assert!(left.iter().all(|&s| s != 0.0));
}

#[test]
fn playhead_telemetry_is_emitted_while_playing() {
    let (controller, mut process) = AudioEngine::new(SR, BLOCK);
    controller.play();

    for _ in 0..16 {
        run_block(&mut process, BLOCK);
    }

    let mut playhead = None;
    while let Some(event) = controller.poll_event() {
        if let EngineEvent::PlayheadPosition { samples, seconds } = event {
            playhead = Some((samples, seconds));
        }
    }
    let (samples, seconds) = playhead.expect("playhead telemetry missing");
    assert_eq!(samples, 16 * BLOCK as u64);
    assert!((seconds - samples as f64 / SR).abs() < 1e-9);
}
