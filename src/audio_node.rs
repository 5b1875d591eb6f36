/// Block-based audio processing - core abstraction for the render graph
///
/// This module defines the AudioNode trait. Nodes process whole stereo
/// blocks at once; the render graph sums their inputs and evaluates their
/// automation parameters before each call.

pub type NodeId = usize;

/// Default number of frames processed per block
pub const BLOCK_SIZE: usize = 512;

/// Context passed to all nodes during block processing
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext {
    /// Sample rate in Hz
    pub sample_rate: f32,

    /// Number of frames in this block
    pub block_size: usize,

    /// Audio clock time (seconds) of the first frame in the block
    pub block_start: f64,
}

impl ProcessContext {
    pub fn new(sample_rate: f32, block_size: usize, block_start: f64) -> Self {
        Self {
            sample_rate,
            block_size,
            block_start,
        }
    }

    /// Audio clock time of frame `offset` within the block
    pub fn time_at(&self, offset: usize) -> f64 {
        self.block_start + offset as f64 / self.sample_rate as f64
    }
}

/// One block of stereo audio
#[derive(Debug, Clone, Default)]
pub struct StereoBlock {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBlock {
    pub fn new(frames: usize) -> Self {
        Self {
            left: vec![0.0; frames],
            right: vec![0.0; frames],
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Resize to `frames` and zero every sample
    pub fn clear(&mut self, frames: usize) {
        self.left.clear();
        self.left.resize(frames, 0.0);
        self.right.clear();
        self.right.resize(frames, 0.0);
    }

    /// Mix `other` into this block
    pub fn add(&mut self, other: &StereoBlock) {
        for (dst, src) in self.left.iter_mut().zip(&other.left) {
            *dst += src;
        }
        for (dst, src) in self.right.iter_mut().zip(&other.right) {
            *dst += src;
        }
    }

    /// Mono view used when a node output modulates a parameter
    pub fn mono(&self, index: usize) -> f32 {
        0.5 * (self.left[index] + self.right[index])
    }
}

/// Core trait for block-based audio processing
///
/// Every audio-producing entity in the render graph implements this trait.
pub trait AudioNode: Send {
    /// Process an entire block of audio
    ///
    /// # Arguments
    /// * `input` - Sum of every node connected to this node's input
    /// * `params` - Per-frame values of each automation parameter, in the
    ///   order returned by [`AudioNode::param_defaults`]
    /// * `output` - Output block (already sized to `context.block_size`)
    /// * `context` - Timing for this block
    fn process_block(
        &mut self,
        input: &StereoBlock,
        params: &[&[f32]],
        output: &mut StereoBlock,
        context: &ProcessContext,
    );

    /// Initial values of this node's automation parameters
    fn param_defaults(&self) -> Vec<f32> {
        Vec::new()
    }

    /// Begin producing sound (sources only)
    fn start(&mut self) {}

    /// Stop producing sound for good (sources only)
    fn stop(&mut self) {}

    /// True for nodes with a start/stop lifecycle
    fn is_source(&self) -> bool {
        false
    }

    /// Get a human-readable name for this node (for debugging)
    fn name(&self) -> &str {
        "AudioNode"
    }
}
