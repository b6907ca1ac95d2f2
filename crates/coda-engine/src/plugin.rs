//! Hosted-plugin node boundary
//!
//! The graph treats a hosted native plugin purely as an opaque processor
//! behind this trait; format discovery, instantiation and UI belong to
//! the external plugin-hosting layer.

use std::any::Any;

use coda_core::Sample;

use crate::node::AudioNode;

/// A MIDI event delivered to a plugin, offset in samples from block start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEvent {
    pub offset: usize,
    pub kind: MidiEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiEventKind {
    NoteOn { note: u8, velocity: f64 },
    NoteOff { note: u8 },
}

/// Descriptor for one plugin parameter
#[derive(Debug, Clone, PartialEq)]
pub struct PluginParamInfo {
    pub id: String,
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

/// An instantiated plugin, opaque to the engine
pub trait PluginInstance: Send {
    /// Process one block; `audio_out` is pre-cleared by the caller
    fn process(
        &mut self,
        audio_in: &[&[Sample]],
        audio_out: &mut [&mut [Sample]],
        midi_in: &[MidiEvent],
    );

    fn parameters(&self) -> Vec<PluginParamInfo>;

    fn parameter_value(&self, id: &str) -> Option<f64>;

    fn set_parameter_value(&mut self, id: &str, value: f64);

    /// Opaque state blob for project persistence
    fn state(&self) -> Vec<u8>;

    fn set_state(&mut self, state: &[u8]);

    fn latency(&self) -> usize {
        0
    }
}

/// Adapts a hosted plugin into the audio graph. Without an instance, or
/// when bypassed, the node passes audio through unmodified.
pub struct PluginNode {
    instance: Option<Box<dyn PluginInstance>>,
    bypassed: bool,
}

impl PluginNode {
    pub fn new(instance: Option<Box<dyn PluginInstance>>) -> Self {
        Self {
            instance,
            bypassed: false,
        }
    }

    pub fn instance(&self) -> Option<&dyn PluginInstance> {
        self.instance.as_deref()
    }

    pub fn instance_mut(&mut self) -> Option<&mut (dyn PluginInstance + 'static)> {
        self.instance.as_deref_mut()
    }

    pub fn replace_instance(
        &mut self,
        instance: Option<Box<dyn PluginInstance>>,
    ) -> Option<Box<dyn PluginInstance>> {
        std::mem::replace(&mut self.instance, instance)
    }

    fn passthrough(inputs: &[&[Sample]], outputs: &mut [&mut [Sample]]) {
        for (input, output) in inputs.iter().zip(outputs.iter_mut()) {
            let n = input.len().min(output.len());
            output[..n].copy_from_slice(&input[..n]);
        }
    }
}

impl AudioNode for PluginNode {
    fn num_inputs(&self) -> usize {
        2
    }

    fn num_outputs(&self) -> usize {
        2
    }

    fn process(&mut self, inputs: &[&[Sample]], outputs: &mut [&mut [Sample]], _position: u64) {
        match &mut self.instance {
            Some(instance) if !self.bypassed => {
                instance.process(inputs, outputs, &[]);
            }
            _ => Self::passthrough(inputs, outputs),
        }
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    fn latency(&self) -> usize {
        self.instance.as_ref().map(|i| i.latency()).unwrap_or(0)
    }

    fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    fn set_bypassed(&mut self, bypassed: bool) {
        self.bypassed = bypassed;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestGainPlugin {
        gain: f64,
    }

    impl PluginInstance for TestGainPlugin {
        fn process(
            &mut self,
            audio_in: &[&[Sample]],
            audio_out: &mut [&mut [Sample]],
            _midi_in: &[MidiEvent],
        ) {
            for (input, output) in audio_in.iter().zip(audio_out.iter_mut()) {
                for (i, o) in input.iter().zip(output.iter_mut()) {
                    *o = *i * self.gain;
                }
            }
        }

        fn parameters(&self) -> Vec<PluginParamInfo> {
            vec![PluginParamInfo {
                id: "gain".to_string(),
                name: "Gain".to_string(),
                min: 0.0,
                max: 2.0,
                default: 1.0,
            }]
        }

        fn parameter_value(&self, id: &str) -> Option<f64> {
            (id == "gain").then_some(self.gain)
        }

        fn set_parameter_value(&mut self, id: &str, value: f64) {
            if id == "gain" {
                self.gain = value.clamp(0.0, 2.0);
            }
        }

        fn state(&self) -> Vec<u8> {
            self.gain.to_le_bytes().to_vec()
        }

        fn set_state(&mut self, state: &[u8]) {
            if let Ok(bytes) = <[u8; 8]>::try_from(state) {
                self.gain = f64::from_le_bytes(bytes);
            }
        }
    }

    fn run(node: &mut PluginNode, input: &[Sample]) -> Vec<Sample> {
        let mut out_l = vec![0.0; input.len()];
        let mut out_r = vec![0.0; input.len()];
        let inputs = [input, input];
        let mut outs = [out_l.as_mut_slice(), out_r.as_mut_slice()];
        node.process(&inputs, &mut outs, 0);
        out_l
    }

    #[test]
    fn test_plugin_processes_audio() {
        let mut node = PluginNode::new(Some(Box::new(TestGainPlugin { gain: 0.5 })));
        let out = run(&mut node, &[1.0, 1.0]);
        assert_eq!(out, vec![0.5, 0.5]);
    }

    #[test]
    fn test_missing_instance_is_passthrough() {
        let mut node = PluginNode::new(None);
        let out = run(&mut node, &[0.3, 0.4]);
        assert_eq!(out, vec![0.3, 0.4]);
    }

    #[test]
    fn test_bypass_is_passthrough() {
        let mut node = PluginNode::new(Some(Box::new(TestGainPlugin { gain: 0.5 })));
        node.set_bypassed(true);
        let out = run(&mut node, &[0.8]);
        assert_eq!(out, vec![0.8]);
    }

    #[test]
    fn test_parameter_and_state_round_trip() {
        let mut plugin = TestGainPlugin { gain: 1.0 };
        plugin.set_parameter_value("gain", 1.5);
        assert_eq!(plugin.parameter_value("gain"), Some(1.5));

        let state = plugin.state();
        let mut restored = TestGainPlugin { gain: 0.0 };
        restored.set_state(&state);
        assert_eq!(restored.gain, 1.5);
    }
}
