//! Convolution node - FFT-based convolution reverb using impulse responses
//!
//! This node implements uniformly partitioned overlap-save convolution:
//! - Splits the impulse response into block-sized partitions
//! - FFT of each incoming block (previous + current, zero-latency padding)
//! - Complex multiply-accumulate against a frequency-domain delay line
//! - IFFT back to time domain, keep the second half
//!
//! Output lags the input by one partition (512 frames), which is inaudible
//! on a multi-second room tail.

use crate::audio_node::{AudioNode, ProcessContext, StereoBlock, BLOCK_SIZE};
use crate::impulse::ImpulseResponse;
use num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Single-channel partitioned convolver
struct Convolver {
    block: usize,
    r2c: Arc<dyn RealToComplex<f32>>,
    c2r: Arc<dyn ComplexToReal<f32>>,

    // Pre-computed IR FFT partitions
    partitions: Vec<Vec<Complex<f32>>>,
    // Input spectra, newest at `head`
    delay_line: Vec<Vec<Complex<f32>>>,
    head: usize,

    // Processing buffers
    window: Vec<f32>,              // previous block + current block
    time_buffer: Vec<f32>,         // FFT workspace (time domain)
    accumulator: Vec<Complex<f32>>, // FFT workspace (frequency domain)
    forward_scratch: Vec<Complex<f32>>,
    inverse_scratch: Vec<Complex<f32>>,

    input: Vec<f32>,  // samples collected for the next partition
    output: Vec<f32>, // samples ready to emit
    pos: usize,
}

impl Convolver {
    fn new(impulse: &[f32], block: usize, planner: &mut RealFftPlanner<f32>) -> Self {
        let fft_size = block * 2;
        let r2c = planner.plan_fft_forward(fft_size);
        let c2r = planner.plan_fft_inverse(fft_size);

        let mut partitions = Vec::new();
        for chunk in impulse.chunks(block) {
            let mut padded = r2c.make_input_vec();
            padded[..chunk.len()].copy_from_slice(chunk);
            let mut spectrum = r2c.make_output_vec();
            if r2c.process(&mut padded, &mut spectrum).is_err() {
                spectrum.fill(Complex::new(0.0, 0.0));
            }
            partitions.push(spectrum);
        }
        if partitions.is_empty() {
            partitions.push(r2c.make_output_vec());
        }

        let delay_line = vec![r2c.make_output_vec(); partitions.len()];
        let forward_scratch = r2c.make_scratch_vec();
        let inverse_scratch = c2r.make_scratch_vec();

        Self {
            block,
            time_buffer: r2c.make_input_vec(),
            accumulator: r2c.make_output_vec(),
            window: vec![0.0; fft_size],
            r2c,
            c2r,
            partitions,
            delay_line,
            head: 0,
            forward_scratch,
            inverse_scratch,
            input: vec![0.0; block],
            output: vec![0.0; block],
            pos: 0,
        }
    }

    fn process_sample(&mut self, x: f32) -> f32 {
        let y = self.output[self.pos];
        self.input[self.pos] = x;
        self.pos += 1;
        if self.pos == self.block {
            self.run_partition();
            self.pos = 0;
        }
        y
    }

    fn run_partition(&mut self) {
        let block = self.block;
        self.window.copy_within(block.., 0);
        self.window[block..].copy_from_slice(&self.input);

        // Forward FFT of the sliding window into the delay line head
        self.time_buffer.copy_from_slice(&self.window);
        if self
            .r2c
            .process_with_scratch(
                &mut self.time_buffer,
                &mut self.delay_line[self.head],
                &mut self.forward_scratch,
            )
            .is_err()
        {
            self.output.fill(0.0);
            return;
        }

        // Multiply-accumulate: newest input spectrum pairs with partition 0
        let count = self.partitions.len();
        self.accumulator.fill(Complex::new(0.0, 0.0));
        for (p, partition) in self.partitions.iter().enumerate() {
            let spectrum = &self.delay_line[(self.head + count - p) % count];
            for ((acc, x), h) in self.accumulator.iter_mut().zip(spectrum).zip(partition) {
                *acc += x * h;
            }
        }
        // DC and Nyquist bins of a real signal carry no imaginary part
        let bins = self.accumulator.len();
        self.accumulator[0].im = 0.0;
        self.accumulator[bins - 1].im = 0.0;

        if self
            .c2r
            .process_with_scratch(
                &mut self.accumulator,
                &mut self.time_buffer,
                &mut self.inverse_scratch,
            )
            .is_err()
        {
            self.output.fill(0.0);
            return;
        }

        // Normalize by FFT size (realfft convention), keep the valid half
        let scale = 1.0 / (2 * block) as f32;
        for (out, sample) in self.output.iter_mut().zip(&self.time_buffer[block..]) {
            *out = sample * scale;
        }

        self.head = (self.head + 1) % count;
    }
}

/// Stereo convolution reverb (fully wet)
///
/// The dry/wet balance lives outside the node, in two gain taps.
pub struct ConvolutionNode {
    left: Convolver,
    right: Convolver,
}

impl ConvolutionNode {
    pub fn new(impulse: &ImpulseResponse) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        Self {
            left: Convolver::new(&impulse.left, BLOCK_SIZE, &mut planner),
            right: Convolver::new(&impulse.right, BLOCK_SIZE, &mut planner),
        }
    }

    /// Latency in frames between input and output
    pub fn latency(&self) -> usize {
        self.left.block
    }
}

impl AudioNode for ConvolutionNode {
    fn process_block(
        &mut self,
        input: &StereoBlock,
        _params: &[&[f32]],
        output: &mut StereoBlock,
        _context: &ProcessContext,
    ) {
        for i in 0..output.len() {
            output.left[i] = self.left.process_sample(input.left[i]);
            output.right[i] = self.right.process_sample(input.right[i]);
        }
    }

    fn name(&self) -> &str {
        "ConvolutionNode"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(left: Vec<f32>, right: Vec<f32>) -> ImpulseResponse {
        ImpulseResponse {
            left: Arc::new(left),
            right: Arc::new(right),
            sample_rate: 44100.0,
        }
    }

    fn run(node: &mut ConvolutionNode, input: &[f32]) -> StereoBlock {
        let mut block = StereoBlock::new(input.len());
        block.left.copy_from_slice(input);
        block.right.copy_from_slice(input);
        let mut out = StereoBlock::new(input.len());
        let ctx = ProcessContext::new(44100.0, input.len(), 0.0);
        node.process_block(&block, &[], &mut out, &ctx);
        out
    }

    #[test]
    fn test_unit_impulse_is_delayed_identity() {
        let mut node = ConvolutionNode::new(&impulse(vec![1.0], vec![0.5]));
        let mut input = vec![0.0; 2048];
        input[10] = 1.0;
        input[700] = -0.25;
        let out = run(&mut node, &input);

        let latency = node.latency();
        assert!((out.left[10 + latency] - 1.0).abs() < 1e-4);
        assert!((out.left[700 + latency] + 0.25).abs() < 1e-4);
        assert!((out.right[10 + latency] - 0.5).abs() < 1e-4);
        assert!(out.left[..latency].iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn test_long_impulse_spans_partitions() {
        // Echo 1500 frames after the direct sound: third partition
        let mut ir = vec![0.0; 1600];
        ir[0] = 1.0;
        ir[1500] = 0.5;
        let mut node = ConvolutionNode::new(&impulse(ir.clone(), ir));
        let mut input = vec![0.0; 4096];
        input[0] = 1.0;
        let out = run(&mut node, &input);

        let latency = node.latency();
        assert!((out.left[latency] - 1.0).abs() < 1e-4);
        assert!((out.left[latency + 1500] - 0.5).abs() < 1e-4);
        assert!(out.left[latency + 700].abs() < 1e-4);
    }

    #[test]
    fn test_empty_impulse_is_silent() {
        let mut node = ConvolutionNode::new(&impulse(Vec::new(), Vec::new()));
        let out = run(&mut node, &vec![1.0; 2048]);
        assert!(out.left.iter().all(|s| s.abs() < 1e-6));
    }
}
