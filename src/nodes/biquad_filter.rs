//! Biquad filter node - lowpass or highpass with automatable cutoff
//!
//! Uses biquad::DirectForm2Transposed (one per stereo side) for efficient
//! IIR filtering with minimal state and good numerical stability.
//!
//! Filter coefficients are updated when cutoff or Q change significantly
//! (> 0.1 Hz for cutoff, > 0.01 for Q) to avoid unnecessary recomputation
//! while still tracking ramps.

use crate::audio_node::{AudioNode, ProcessContext, StereoBlock};
use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Q_BUTTERWORTH_F32};
use serde::{Deserialize, Serialize};

/// Parameter index of the cutoff frequency
pub const FREQUENCY: usize = 0;
/// Parameter index of the resonance
pub const Q: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    LowPass,
    HighPass,
}

pub struct BiquadFilterNode {
    kind: FilterKind,
    sample_rate: f32,
    left: DirectForm2Transposed<f32>,
    right: DirectForm2Transposed<f32>,
    /// Last cutoff value (for detecting changes)
    last_cutoff: f32,
    /// Last Q value (for detecting changes)
    last_q: f32,
}

impl BiquadFilterNode {
    /// Create a filter; `q` of [`Q_BUTTERWORTH_F32`] gives a flat passband
    pub fn new(kind: FilterKind, cutoff: f32, q: f32, sample_rate: f32) -> Self {
        let cutoff = clamp_cutoff(cutoff, sample_rate);
        let q = clamp_q(q);
        let coeffs = coefficients(kind, sample_rate, cutoff, q);
        Self {
            kind,
            sample_rate,
            left: DirectForm2Transposed::<f32>::new(coeffs),
            right: DirectForm2Transposed::<f32>::new(coeffs),
            last_cutoff: cutoff,
            last_q: q,
        }
    }

    pub fn butterworth(kind: FilterKind, cutoff: f32, sample_rate: f32) -> Self {
        Self::new(kind, cutoff, Q_BUTTERWORTH_F32, sample_rate)
    }

    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Get current cutoff frequency
    pub fn cutoff(&self) -> f32 {
        self.last_cutoff
    }
}

fn clamp_cutoff(cutoff: f32, sample_rate: f32) -> f32 {
    if cutoff.is_finite() {
        cutoff.clamp(10.0, sample_rate * 0.49)
    } else {
        sample_rate * 0.49
    }
}

fn clamp_q(q: f32) -> f32 {
    if q.is_finite() {
        q.clamp(0.1, 20.0)
    } else {
        Q_BUTTERWORTH_F32
    }
}

fn coefficients(kind: FilterKind, sample_rate: f32, cutoff: f32, q: f32) -> Coefficients<f32> {
    // Inputs are clamped into the range from_params accepts; the fallback
    // is a pass-through should that ever not hold.
    let filter = match kind {
        FilterKind::LowPass => biquad::Type::LowPass,
        FilterKind::HighPass => biquad::Type::HighPass,
    };
    Coefficients::<f32>::from_params(filter, sample_rate.hz(), cutoff.hz(), q)
        .unwrap_or(Coefficients {
            a1: 0.0,
            a2: 0.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
        })
}

impl AudioNode for BiquadFilterNode {
    fn process_block(
        &mut self,
        input: &StereoBlock,
        params: &[&[f32]],
        output: &mut StereoBlock,
        context: &ProcessContext,
    ) {
        let cutoff_buffer = params[FREQUENCY];
        let q_buffer = params[Q];
        debug_assert_eq!(cutoff_buffer.len(), output.len(), "Cutoff buffer length mismatch");

        self.sample_rate = context.sample_rate;
        for i in 0..output.len() {
            let cutoff = clamp_cutoff(cutoff_buffer[i], self.sample_rate);
            let q = clamp_q(q_buffer[i]);

            if (cutoff - self.last_cutoff).abs() > 0.1 || (q - self.last_q).abs() > 0.01 {
                let coeffs = coefficients(self.kind, self.sample_rate, cutoff, q);
                self.left.update_coefficients(coeffs);
                self.right.update_coefficients(coeffs);
                self.last_cutoff = cutoff;
                self.last_q = q;
            }

            output.left[i] = self.left.run(input.left[i]);
            output.right[i] = self.right.run(input.right[i]);
        }
    }

    fn param_defaults(&self) -> Vec<f32> {
        vec![self.last_cutoff, self.last_q]
    }

    fn name(&self) -> &str {
        match self.kind {
            FilterKind::LowPass => "LowPassFilterNode",
            FilterKind::HighPass => "HighPassFilterNode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::TAU;

    fn sine_block(freq: f32, frames: usize) -> StereoBlock {
        let mut block = StereoBlock::new(frames);
        for i in 0..frames {
            let s = (TAU * freq * i as f32 / 44100.0).sin();
            block.left[i] = s;
            block.right[i] = s;
        }
        block
    }

    fn rms(buf: &[f32]) -> f32 {
        (buf.iter().map(|x| x * x).sum::<f32>() / buf.len() as f32).sqrt()
    }

    fn filter(node: &mut BiquadFilterNode, input: &StereoBlock) -> StereoBlock {
        let frames = input.len();
        let context = ProcessContext::new(44100.0, frames, 0.0);
        let cutoff = vec![node.cutoff(); frames];
        let q = vec![Q_BUTTERWORTH_F32; frames];
        let mut out = StereoBlock::new(frames);
        node.process_block(input, &[&cutoff, &q], &mut out, &context);
        out
    }

    #[test]
    fn test_lowpass_attenuates_highs() {
        let mut lpf = BiquadFilterNode::butterworth(FilterKind::LowPass, 500.0, 44100.0);
        let high = filter(&mut lpf, &sine_block(8000.0, 8192));
        let input_rms = rms(&sine_block(8000.0, 8192).left);
        assert!(rms(&high.left[4096..]) < input_rms * 0.1);
    }

    #[test]
    fn test_highpass_attenuates_lows() {
        let mut hpf = BiquadFilterNode::butterworth(FilterKind::HighPass, 2000.0, 44100.0);
        let low = filter(&mut hpf, &sine_block(60.0, 8192));
        assert!(rms(&low.left[4096..]) < 0.05);
    }

    #[test]
    fn test_cutoff_clamped_below_nyquist() {
        let f = BiquadFilterNode::butterworth(FilterKind::LowPass, 40000.0, 44100.0);
        assert!(f.cutoff() < 22050.0);
        let g = BiquadFilterNode::butterworth(FilterKind::LowPass, f32::NAN, 44100.0);
        assert!(g.cutoff().is_finite());
    }
}
