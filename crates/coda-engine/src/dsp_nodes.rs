//! Graph nodes wrapping coda-dsp processors

use std::any::Any;
use std::sync::Arc;

use coda_core::{db_to_gain, CompressorState, EqBandState, Sample, NUM_EQ_BANDS};
use coda_dsp::dynamics::Compressor;
use coda_dsp::eq::FourBandEq;
use coda_dsp::smoothing::{SmoothedPan, SmoothedParam, DEFAULT_SMOOTHING_MS};
use coda_dsp::{Processor, ProcessorConfig, StereoProcessor};

use crate::automation::AutomationLane;
use crate::node::AudioNode;

/// Stereo gain + pan with click-free smoothing and optional automation
pub struct GainNode {
    gain: SmoothedParam,
    pan: SmoothedPan,
    gain_lane: Option<Arc<AutomationLane>>,
    pan_lane: Option<Arc<AutomationLane>>,
    bypassed: bool,
}

impl GainNode {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            gain: SmoothedParam::with_range(1.0, DEFAULT_SMOOTHING_MS, sample_rate, 0.0, 16.0),
            pan: SmoothedPan::new(0.0, DEFAULT_SMOOTHING_MS, sample_rate),
            gain_lane: None,
            pan_lane: None,
            bypassed: false,
        }
    }

    pub fn set_gain_db(&mut self, db: f64) {
        self.gain.set_target(db_to_gain(db.clamp(-96.0, 12.0)));
    }

    pub fn set_pan(&mut self, pan: f64) {
        self.pan.set_pan(pan.clamp(-1.0, 1.0));
    }

    /// Attach a gain automation lane (linear gain values)
    pub fn set_gain_lane(&mut self, lane: Option<Arc<AutomationLane>>) {
        self.gain_lane = lane;
    }

    /// Attach a pan automation lane (pan position values)
    pub fn set_pan_lane(&mut self, lane: Option<Arc<AutomationLane>>) {
        self.pan_lane = lane;
    }
}

impl AudioNode for GainNode {
    fn num_inputs(&self) -> usize {
        2
    }

    fn num_outputs(&self) -> usize {
        2
    }

    fn process(&mut self, inputs: &[&[Sample]], outputs: &mut [&mut [Sample]], position: u64) {
        if let Some(lane) = &self.gain_lane {
            self.gain.set_target(lane.value_at(position).clamp(0.0, 16.0));
        }
        if let Some(lane) = &self.pan_lane {
            self.pan.set_pan(lane.value_at(position).clamp(-1.0, 1.0));
        }

        let (Some(in_l), Some(in_r)) = (inputs.first(), inputs.get(1)) else {
            return;
        };
        let n = in_l.len().min(in_r.len());

        let [out_l, out_r, ..] = outputs else {
            return;
        };

        for i in 0..n.min(out_l.len()).min(out_r.len()) {
            let g = self.gain.next();
            let (l, r) = self.pan.next(in_l[i] * g, in_r[i] * g);
            out_l[i] = l;
            out_r[i] = r;
        }
    }

    fn reset(&mut self) {
        self.gain.reset();
        self.pan.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.gain.set_sample_rate(sample_rate);
        self.pan.set_sample_rate(sample_rate);
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

/// 4-band parametric EQ node
pub struct EqNode {
    eq: FourBandEq,
    bypassed: bool,
}

impl EqNode {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            eq: FourBandEq::new(sample_rate),
            bypassed: false,
        }
    }

    pub fn set_band(&mut self, index: usize, band: EqBandState) {
        self.eq.set_band(index, band);
    }

    pub fn apply_bands(&mut self, bands: &[EqBandState; NUM_EQ_BANDS]) {
        self.eq.apply_bands(bands);
    }
}

impl AudioNode for EqNode {
    fn num_inputs(&self) -> usize {
        2
    }

    fn num_outputs(&self) -> usize {
        2
    }

    fn process(&mut self, inputs: &[&[Sample]], outputs: &mut [&mut [Sample]], _position: u64) {
        let (Some(in_l), Some(in_r)) = (inputs.first(), inputs.get(1)) else {
            return;
        };
        let [out_l, out_r, ..] = outputs else {
            return;
        };

        let n = in_l.len().min(in_r.len()).min(out_l.len()).min(out_r.len());
        for i in 0..n {
            let (l, r) = self.eq.process_sample(in_l[i], in_r[i]);
            out_l[i] = l;
            out_r[i] = r;
        }
    }

    fn reset(&mut self) {
        self.eq.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.eq.set_sample_rate(sample_rate);
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

/// Compressor node
pub struct CompressorNode {
    comp: Compressor,
    bypassed: bool,
}

impl CompressorNode {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            comp: Compressor::new(sample_rate),
            bypassed: false,
        }
    }

    pub fn apply_state(&mut self, state: &CompressorState) {
        self.comp.apply_state(state);
    }

    pub fn compressor_mut(&mut self) -> &mut Compressor {
        &mut self.comp
    }

    pub fn gain_reduction_db(&self) -> f64 {
        self.comp.gain_reduction_db()
    }
}

impl AudioNode for CompressorNode {
    fn num_inputs(&self) -> usize {
        2
    }

    fn num_outputs(&self) -> usize {
        2
    }

    fn process(&mut self, inputs: &[&[Sample]], outputs: &mut [&mut [Sample]], _position: u64) {
        let (Some(in_l), Some(in_r)) = (inputs.first(), inputs.get(1)) else {
            return;
        };
        let [out_l, out_r, ..] = outputs else {
            return;
        };

        let n = in_l.len().min(in_r.len()).min(out_l.len()).min(out_r.len());
        for i in 0..n {
            let (l, r) = self.comp.process_sample(in_l[i], in_r[i]);
            out_l[i] = l;
            out_r[i] = r;
        }
    }

    fn reset(&mut self) {
        self.comp.reset();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.comp.set_sample_rate(sample_rate);
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

/// Sums any number of inputs onto a stereo output.
///
/// The graph already sums multiple edges landing on the same input
/// channel; this node exists for explicit N-to-2 mix points.
pub struct SumNode {
    num_inputs: usize,
}

impl SumNode {
    pub fn new(num_inputs: usize) -> Self {
        Self { num_inputs }
    }
}

impl AudioNode for SumNode {
    fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    fn num_outputs(&self) -> usize {
        2
    }

    fn process(&mut self, inputs: &[&[Sample]], outputs: &mut [&mut [Sample]], _position: u64) {
        for output in outputs.iter_mut() {
            output.fill(0.0);
        }
        let num_outputs = outputs.len();
        for (idx, input) in inputs.iter().enumerate() {
            let Some(output) = outputs.get_mut(idx % num_outputs.max(1)) else {
                continue;
            };
            let n = input.len().min(output.len());
            for i in 0..n {
                output[i] += input[i];
            }
        }
    }

    fn reset(&mut self) {}

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Fixed delay line used for latency compensation.
///
/// Reports its delay as latency so the graph's path math stays honest.
pub struct DelayNode {
    delay: usize,
    buffers: [Vec<Sample>; 2],
    pos: usize,
}

impl DelayNode {
    pub fn new(delay: usize) -> Self {
        let len = delay.max(1);
        Self {
            delay,
            buffers: [vec![0.0; len], vec![0.0; len]],
            pos: 0,
        }
    }

    pub fn delay(&self) -> usize {
        self.delay
    }
}

impl AudioNode for DelayNode {
    fn num_inputs(&self) -> usize {
        2
    }

    fn num_outputs(&self) -> usize {
        2
    }

    fn process(&mut self, inputs: &[&[Sample]], outputs: &mut [&mut [Sample]], _position: u64) {
        let (Some(in_l), Some(in_r)) = (inputs.first(), inputs.get(1)) else {
            return;
        };
        let [out_l, out_r, ..] = outputs else {
            return;
        };

        let n = in_l.len().min(in_r.len()).min(out_l.len()).min(out_r.len());

        if self.delay == 0 {
            out_l[..n].copy_from_slice(&in_l[..n]);
            out_r[..n].copy_from_slice(&in_r[..n]);
            return;
        }

        let len = self.buffers[0].len();
        for i in 0..n {
            out_l[i] = self.buffers[0][self.pos];
            out_r[i] = self.buffers[1][self.pos];
            self.buffers[0][self.pos] = in_l[i];
            self.buffers[1][self.pos] = in_r[i];
            self.pos = (self.pos + 1) % len;
        }
    }

    fn reset(&mut self) {
        for buffer in &mut self.buffers {
            buffer.fill(0.0);
        }
        self.pos = 0;
    }

    fn set_sample_rate(&mut self, _sample_rate: f64) {}

    fn latency(&self) -> usize {
        self.delay
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

    fn run_stereo(node: &mut dyn AudioNode, in_l: &[Sample], in_r: &[Sample]) -> (Vec<Sample>, Vec<Sample>) {
        let mut out_l = vec![0.0; in_l.len()];
        let mut out_r = vec![0.0; in_r.len()];
        let inputs = [in_l, in_r];
        let mut outs = [out_l.as_mut_slice(), out_r.as_mut_slice()];
        node.process(&inputs, &mut outs, 0);
        (out_l, out_r)
    }

    #[test]
    fn test_gain_node_converges_to_target() {
        let mut node = GainNode::new(48000.0);
        node.set_gain_db(-6.0);

        let input = vec![1.0; 48000];
        let (out_l, _) = run_stereo(&mut node, &input, &input);

        let expected = db_to_gain(-6.0) * coda_dsp::smoothing::pan_gains(0.0).0;
        let last = out_l[out_l.len() - 1];
        assert!((last - expected).abs() < 1e-3);
    }

    #[test]
    fn test_gain_node_automation_lane() {
        use crate::automation::AutomationPoint;

        let mut lane = AutomationLane::new(1.0);
        lane.add_point(AutomationPoint::new(0, 0.25));
        let mut node = GainNode::new(48000.0);
        node.set_gain_lane(Some(Arc::new(lane)));

        let input = vec![1.0; 48000];
        let (out_l, _) = run_stereo(&mut node, &input, &input);

        let expected = 0.25 * coda_dsp::smoothing::pan_gains(0.0).0;
        assert!((out_l[out_l.len() - 1] - expected).abs() < 1e-3);
    }

    #[test]
    fn test_sum_node_mixes() {
        let mut node = SumNode::new(4);
        let a = vec![0.25; 8];
        let b = vec![0.5; 8];
        let mut out_l = vec![0.0; 8];
        let mut out_r = vec![0.0; 8];

        let inputs: [&[Sample]; 4] = [&a, &b, &a, &b];
        let mut outs = [out_l.as_mut_slice(), out_r.as_mut_slice()];
        node.process(&inputs, &mut outs, 0);

        // Inputs 0 and 2 land on the left, 1 and 3 on the right
        assert!((out_l[0] - 0.5).abs() < 1e-12);
        assert!((out_r[0] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_delay_node_shifts_by_latency() {
        let mut node = DelayNode::new(3);
        assert_eq!(node.latency(), 3);

        let mut input = vec![0.0; 8];
        input[0] = 1.0;
        let (out_l, _) = run_stereo(&mut node, &input, &input);

        assert_eq!(out_l[0], 0.0);
        assert_eq!(out_l[2], 0.0);
        assert_eq!(out_l[3], 1.0);
        assert_eq!(out_l[4], 0.0);
    }

    #[test]
    fn test_zero_delay_passthrough() {
        let mut node = DelayNode::new(0);
        let input = vec![0.7; 16];
        let (out_l, out_r) = run_stereo(&mut node, &input, &input);
        assert_eq!(out_l, input);
        assert_eq!(out_r, input);
    }
}
