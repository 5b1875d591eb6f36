//! Destination node - the graph's output bus
//!
//! Everything audible is connected here; the render graph reads this
//! node's output block after each pass.

use crate::audio_node::{AudioNode, ProcessContext, StereoBlock};

#[derive(Default)]
pub struct DestinationNode;

impl AudioNode for DestinationNode {
    fn process_block(
        &mut self,
        input: &StereoBlock,
        _params: &[&[f32]],
        output: &mut StereoBlock,
        _context: &ProcessContext,
    ) {
        output.left.copy_from_slice(&input.left);
        output.right.copy_from_slice(&input.right);
    }

    fn name(&self) -> &str {
        "DestinationNode"
    }
}
