//! Engine facade
//!
//! Ties the pieces together and enforces the threading contract:
//! `EngineController` lives with the UI/session logic,
//! `EngineProcess` is moved to the audio callback. They communicate
//! only through the two SPSC queues and the snapshot slot.

use std::sync::Arc;

use log::{info, warn};

use coda_core::{Sample, Session};

use crate::automation::AutomationBank;
use crate::graph::{AudioGraph, GraphError};
use crate::message::{EngineCommand, EngineEvent};
use crate::metronome::Metronome;
use crate::node::NodeId;
use crate::queue::MessageQueue;
use crate::renderer::{SessionRenderer, SnapshotPublisher};
use crate::snapshot::SnapshotSlot;
use crate::transport::Transport;

/// Telemetry is emitted every this many callbacks
pub const TELEMETRY_INTERVAL: u64 = 8;

/// Command/event queue capacity
pub const QUEUE_CAPACITY: usize = 256;

/// A node graph wired up as the master insert chain
pub struct MasterChain {
    pub graph: AudioGraph,
    pub input: NodeId,
    pub output: NodeId,
}

/// Engine entry point
pub struct AudioEngine;

impl AudioEngine {
    /// Create the paired control/audio halves
    pub fn new(sample_rate: f64, max_block: usize) -> (EngineController, EngineProcess) {
        let commands = Arc::new(MessageQueue::new(QUEUE_CAPACITY));
        let events = Arc::new(MessageQueue::new(QUEUE_CAPACITY));
        let slot = Arc::new(SnapshotSlot::new());

        info!("audio engine created: {sample_rate} Hz, max block {max_block}");

        let controller = EngineController {
            commands: Arc::clone(&commands),
            events: Arc::clone(&events),
            publisher: SnapshotPublisher::new(Arc::clone(&slot)),
        };

        let process = EngineProcess {
            commands,
            events,
            transport: Transport::new(sample_rate),
            renderer: SessionRenderer::new(slot, sample_rate, max_block),
            metronome: Metronome::new(sample_rate),
            master_chain: None,
            right_scratch: vec![0.0; max_block],
            callback_count: 0,
        };

        (controller, process)
    }
}

/// Control-thread handle: sends commands, publishes snapshots, polls
/// telemetry. Every send is best-effort; a full queue drops the
/// command and returns false, and the caller may simply retry on the
/// next edit (command values are idempotent overwrites).
pub struct EngineController {
    commands: Arc<MessageQueue<EngineCommand>>,
    events: Arc<MessageQueue<EngineEvent>>,
    publisher: SnapshotPublisher,
}

impl EngineController {
    pub fn send(&self, command: EngineCommand) -> bool {
        self.commands.try_push(command)
    }

    pub fn play(&self) -> bool {
        self.send(EngineCommand::Play)
    }

    pub fn stop(&self) -> bool {
        self.send(EngineCommand::Stop)
    }

    pub fn set_bpm(&self, bpm: f64) -> bool {
        self.send(EngineCommand::SetBpm(bpm))
    }

    pub fn seek(&self, position: u64) -> bool {
        self.send(EngineCommand::Seek(position))
    }

    pub fn set_time_signature(&self, numerator: u8, denominator: u8) -> bool {
        self.send(EngineCommand::SetTimeSignature {
            numerator,
            denominator,
        })
    }

    pub fn set_loop_region(&self, start: u64, end: u64) -> bool {
        self.send(EngineCommand::SetLoopRegion { start, end })
    }

    pub fn set_loop_enabled(&self, enabled: bool) -> bool {
        self.send(EngineCommand::SetLoopEnabled(enabled))
    }

    pub fn set_record_enabled(&self, enabled: bool) -> bool {
        self.send(EngineCommand::SetRecordEnabled(enabled))
    }

    pub fn set_metronome_enabled(&self, enabled: bool) -> bool {
        self.send(EngineCommand::SetMetronomeEnabled(enabled))
    }

    pub fn set_metronome_gain(&self, gain: f64) -> bool {
        self.send(EngineCommand::SetMetronomeGain(gain))
    }

    pub fn set_track_gain(&self, track: usize, gain_db: f64) -> bool {
        self.send(EngineCommand::SetTrackGain { track, gain_db })
    }

    pub fn set_track_mute(&self, track: usize, muted: bool) -> bool {
        self.send(EngineCommand::SetTrackMute { track, muted })
    }

    pub fn set_track_solo(&self, track: usize, soloed: bool) -> bool {
        self.send(EngineCommand::SetTrackSolo { track, soloed })
    }

    /// Build and publish a render snapshot of the session
    pub fn publish_session(&self, session: &Session, automation: &AutomationBank) {
        self.publisher.publish_session(session, automation);
    }

    /// Poll one telemetry event from the audio thread
    pub fn poll_event(&self) -> Option<EngineEvent> {
        self.events.try_pop()
    }
}

/// Audio-thread half: owns the transport, renderer and metronome.
/// `process` is the audio callback body.
pub struct EngineProcess {
    commands: Arc<MessageQueue<EngineCommand>>,
    events: Arc<MessageQueue<EngineEvent>>,
    transport: Transport,
    renderer: SessionRenderer,
    metronome: Metronome,
    master_chain: Option<MasterChain>,
    /// Stands in for the right channel on mono callbacks
    right_scratch: Vec<Sample>,
    callback_count: u64,
}

impl EngineProcess {
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Install a validated node graph as the master chain. Must be
    /// called before the process half is handed to the audio thread.
    pub fn install_master_chain(&mut self, chain: MasterChain) -> Result<(), GraphError> {
        if !chain.graph.is_valid() {
            warn!("rejected master chain: graph failed validation");
            return Err(GraphError::Invalid);
        }
        self.master_chain = Some(chain);
        Ok(())
    }

    pub fn master_chain_mut(&mut self) -> Option<&mut MasterChain> {
        self.master_chain.as_mut()
    }

    /// The audio callback. Fully populates every channel of `outputs`
    /// (silence where nothing renders) without blocking or allocating.
    pub fn process(&mut self, outputs: &mut [&mut [Sample]]) {
        self.drain_commands();

        for channel in outputs.iter_mut() {
            channel.fill(0.0);
        }

        let num_samples = outputs.first().map(|c| c.len()).unwrap_or(0);
        let num_samples = num_samples.min(self.right_scratch.len());
        if num_samples == 0 {
            return;
        }

        let block_position = self.transport.position();

        let (head, rest) = outputs.split_at_mut(1);
        let left: &mut [Sample] = &mut head[0][..num_samples];
        let right: &mut [Sample] = match rest.first_mut() {
            Some(channel) => &mut channel[..num_samples],
            None => {
                self.right_scratch[..num_samples].fill(0.0);
                &mut self.right_scratch[..num_samples]
            }
        };

        if self.transport.is_playing() {
            // Split the block at loop boundaries so a wrap lands exactly
            // on the right sample
            let mut offset = 0;
            while offset < num_samples {
                let remaining = num_samples - offset;
                let run = self
                    .transport
                    .samples_until_loop_end()
                    .map(|s| (s as usize).min(remaining))
                    .unwrap_or(remaining)
                    .max(1);

                let position = self.transport.position();
                let segment_l = &mut left[offset..offset + run];
                let segment_r = &mut right[offset..offset + run];
                self.renderer.process(segment_l, segment_r, position);
                self.metronome
                    .process(segment_l, segment_r, run, &self.transport);
                self.transport.advance(run as u64);
                offset += run;
            }
        } else {
            // Keep snapshot pickup fresh while stopped; output stays
            // silent and the metronome resets
            self.renderer.poll_snapshot();
            self.metronome.process(left, right, num_samples, &self.transport);
        }

        if let Some(chain) = &mut self.master_chain {
            let mut io: [&mut [Sample]; 2] = [&mut left[..], &mut right[..]];
            chain
                .graph
                .process_block(&mut io, chain.input, chain.output, block_position);
        }

        self.callback_count += 1;
        if self.callback_count % TELEMETRY_INTERVAL == 0 {
            self.events.try_push(EngineEvent::PlayheadPosition {
                samples: self.transport.position(),
                seconds: self.transport.position_seconds(),
            });

            let mut peak_l: f64 = 0.0;
            let mut peak_r: f64 = 0.0;
            for i in 0..num_samples {
                peak_l = peak_l.max(left[i].abs());
                peak_r = peak_r.max(right[i].abs());
            }
            self.events.try_push(EngineEvent::PeakLevel {
                left: peak_l,
                right: peak_r,
            });
        }
    }

    fn drain_commands(&mut self) {
        while let Some(command) = self.commands.try_pop() {
            match command {
                EngineCommand::Play => {
                    self.transport.play();
                    self.events.try_push(EngineEvent::TransportStateChanged);
                }
                EngineCommand::Stop => {
                    self.transport.stop();
                    self.events.try_push(EngineEvent::TransportStateChanged);
                }
                EngineCommand::SetBpm(bpm) => self.transport.set_bpm(bpm),
                EngineCommand::Seek(position) => self.transport.seek(position),
                EngineCommand::SetTimeSignature {
                    numerator,
                    denominator,
                } => self.transport.set_time_signature(numerator, denominator),
                EngineCommand::SetLoopRegion { start, end } => {
                    self.transport.set_loop_region(start, end)
                }
                EngineCommand::SetLoopEnabled(enabled) => self.transport.set_loop_enabled(enabled),
                EngineCommand::SetRecordEnabled(enabled) => {
                    self.transport.set_record_enabled(enabled)
                }
                EngineCommand::SetMetronomeEnabled(enabled) => self.metronome.set_enabled(enabled),
                EngineCommand::SetMetronomeGain(gain) => self.metronome.set_gain(gain),
                EngineCommand::SetTrackGain { track, gain_db } => {
                    self.renderer.mixer_mut().set_track_gain_db(track, gain_db)
                }
                EngineCommand::SetTrackMute { track, muted } => {
                    self.renderer.mixer_mut().set_track_mute(track, muted)
                }
                EngineCommand::SetTrackSolo { track, soloed } => {
                    self.renderer.mixer_mut().set_track_solo(track, soloed)
                }
            }
        }
    }
}
