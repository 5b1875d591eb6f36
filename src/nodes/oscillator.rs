//! Oscillator node - sine voice with an automatable frequency
//!
//! Silent until started and again once stopped. The frequency parameter
//! may be modulated by other nodes (a vibrato LFO feeding through a gain
//! node adds its output, in Hz, to the scheduled frequency).

use crate::audio_node::{AudioNode, ProcessContext, StereoBlock};
use std::f32::consts::TAU;

/// Parameter index of the oscillator frequency
pub const FREQUENCY: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Pending,
    Running,
    Stopped,
}

/// Sine oscillator
///
/// # Example
/// ```ignore
/// let osc = OscillatorNode::new(220.0);
/// // frequency is parameter 0, ramped by the render graph
/// ```
pub struct OscillatorNode {
    frequency: f32,
    phase: f32, // 0.0 to 1.0
    lifecycle: Lifecycle,
}

impl OscillatorNode {
    pub fn new(frequency: f32) -> Self {
        Self {
            frequency,
            phase: 0.0,
            lifecycle: Lifecycle::Pending,
        }
    }

    /// Get current phase (0.0 to 1.0)
    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }
}

impl AudioNode for OscillatorNode {
    fn process_block(
        &mut self,
        _input: &StereoBlock,
        params: &[&[f32]],
        output: &mut StereoBlock,
        context: &ProcessContext,
    ) {
        if self.lifecycle != Lifecycle::Running {
            output.clear(context.block_size);
            return;
        }

        let freq_buffer = params[FREQUENCY];
        debug_assert_eq!(freq_buffer.len(), output.len(), "Frequency buffer length mismatch");

        for i in 0..output.len() {
            let sample = (self.phase * TAU).sin();
            output.left[i] = sample;
            output.right[i] = sample;

            self.phase += freq_buffer[i] / context.sample_rate;
            // Modulation can push the frequency negative; wrap both ways
            self.phase -= self.phase.floor();
        }
    }

    fn param_defaults(&self) -> Vec<f32> {
        vec![self.frequency]
    }

    fn start(&mut self) {
        if self.lifecycle == Lifecycle::Pending {
            self.lifecycle = Lifecycle::Running;
        }
    }

    fn stop(&mut self) {
        self.lifecycle = Lifecycle::Stopped;
    }

    fn is_source(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "OscillatorNode"
    }
}
