//! Gain node - multiplies its summed input by an automatable gain
//!
//! Output[i] = Input[i] * Gain[i] for all frames. With nothing connected to
//! its input a gain node outputs silence, which makes an LFO-into-gain pair
//! a depth control for parameter modulation.

use crate::audio_node::{AudioNode, ProcessContext, StereoBlock};

/// Parameter index of the gain amount
pub const GAIN: usize = 0;

/// Gain node: out = input * gain
pub struct GainNode {
    gain: f32,
}

impl GainNode {
    /// Negative gains are clamped to zero
    pub fn new(gain: f32) -> Self {
        Self { gain: gain.max(0.0) }
    }
}

impl AudioNode for GainNode {
    fn process_block(
        &mut self,
        input: &StereoBlock,
        params: &[&[f32]],
        output: &mut StereoBlock,
        _context: &ProcessContext,
    ) {
        let gain = params[GAIN];
        debug_assert_eq!(gain.len(), output.len(), "Gain input length mismatch");

        for i in 0..output.len() {
            output.left[i] = input.left[i] * gain[i];
            output.right[i] = input.right[i] * gain[i];
        }
    }

    fn param_defaults(&self) -> Vec<f32> {
        vec![self.gain]
    }

    fn name(&self) -> &str {
        "GainNode"
    }
}
