//! RenderGraph - block-based audio graph driven by control commands
//!
//! The render side of a backend. It owns every node, evaluates automation
//! parameters, and pulls blocks of [`BLOCK_SIZE`] frames through the graph
//! in topological order. Topology and automation only change through
//! [`GraphCommand`]s, applied between blocks, so a realtime callback can
//! drain a lock-free command queue and never wait on the control thread.

use crate::audio_node::{AudioNode, NodeId, ProcessContext, StereoBlock, BLOCK_SIZE};
use crate::envelope::RampCurve;
use crate::nodes::{AudioParam, DestinationNode};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

/// Node id of the output bus, present in every graph
pub const DESTINATION: NodeId = 0;

/// Most automation parameters any node exposes
const MAX_PARAMS: usize = 2;

/// Control-plane instruction for the render graph
pub enum GraphCommand {
    AddNode {
        id: NodeId,
        node: Box<dyn AudioNode>,
    },
    /// Sum `from`'s output into `to`'s input
    Connect { from: NodeId, to: NodeId },
    /// Add `from`'s (mono) output to parameter `param` of `to`
    ConnectParam {
        from: NodeId,
        to: NodeId,
        param: usize,
    },
    Start(NodeId),
    Stop(NodeId),
    /// Freeze a parameter wherever its in-flight ramp has reached
    CancelScheduled { node: NodeId, param: usize },
    /// Ramp a parameter from its current value to `target` by `end_time`
    Ramp {
        node: NodeId,
        param: usize,
        target: f32,
        end_time: f64,
        curve: RampCurve,
    },
    /// Drop every node except the destination
    Clear,
}

struct Slot {
    node: Box<dyn AudioNode>,
    params: Vec<AudioParam>,
    inputs: Vec<NodeId>,
    param_inputs: Vec<(usize, NodeId)>,
}

impl Slot {
    fn new(node: Box<dyn AudioNode>) -> Self {
        let params = node
            .param_defaults()
            .into_iter()
            .take(MAX_PARAMS)
            .map(AudioParam::new)
            .collect();
        Self {
            node,
            params,
            inputs: Vec::new(),
            param_inputs: Vec::new(),
        }
    }
}

pub struct RenderGraph {
    sample_rate: f32,
    slots: Vec<Option<Slot>>,
    order: Vec<NodeId>,
    dirty: bool,

    /// Frames rendered so far (the audio clock)
    frame: u64,

    outputs: Vec<StereoBlock>,
    input_scratch: StereoBlock,
    param_scratch: [Vec<f32>; MAX_PARAMS],
    mod_scratch: Vec<f32>,

    /// Read position inside the destination's last block
    cursor: usize,
}

impl RenderGraph {
    pub fn new(sample_rate: f32) -> Self {
        let mut graph = Self {
            sample_rate,
            slots: Vec::new(),
            order: Vec::new(),
            dirty: true,
            frame: 0,
            outputs: Vec::new(),
            input_scratch: StereoBlock::new(BLOCK_SIZE),
            param_scratch: [vec![0.0; BLOCK_SIZE], vec![0.0; BLOCK_SIZE]],
            mod_scratch: vec![0.0; BLOCK_SIZE],
            cursor: BLOCK_SIZE,
        };
        graph.insert(DESTINATION, Box::new(DestinationNode));
        graph
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Audio clock in seconds
    pub fn time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Number of live nodes, destination included
    pub fn node_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Current value of a parameter (no modulation applied)
    pub fn param_value(&self, node: NodeId, param: usize) -> Option<f32> {
        let slot = self.slots.get(node)?.as_ref()?;
        slot.params.get(param).map(|p| p.value_at(self.time()))
    }

    fn insert(&mut self, id: NodeId, node: Box<dyn AudioNode>) {
        if self.slots.len() <= id {
            self.slots.resize_with(id + 1, || None);
            self.outputs.resize_with(id + 1, || StereoBlock::new(BLOCK_SIZE));
        }
        self.slots[id] = Some(Slot::new(node));
        self.dirty = true;
    }

    fn slot_mut(&mut self, id: NodeId) -> Option<&mut Slot> {
        self.slots.get_mut(id).and_then(|s| s.as_mut())
    }

    /// Apply a control command. Invalid references are ignored: the
    /// backend validates commands before they reach the render side.
    pub fn apply(&mut self, command: GraphCommand) {
        let now = self.time();
        match command {
            GraphCommand::AddNode { id, node } => self.insert(id, node),
            GraphCommand::Connect { from, to } => {
                if self.slot_mut(from).is_some() {
                    if let Some(slot) = self.slot_mut(to) {
                        slot.inputs.push(from);
                        self.dirty = true;
                    }
                }
            }
            GraphCommand::ConnectParam { from, to, param } => {
                if self.slot_mut(from).is_some() {
                    if let Some(slot) = self.slot_mut(to) {
                        if param < slot.params.len() {
                            slot.param_inputs.push((param, from));
                            self.dirty = true;
                        }
                    }
                }
            }
            GraphCommand::Start(id) => {
                if let Some(slot) = self.slot_mut(id) {
                    slot.node.start();
                }
            }
            GraphCommand::Stop(id) => {
                if let Some(slot) = self.slot_mut(id) {
                    slot.node.stop();
                }
            }
            GraphCommand::CancelScheduled { node, param } => {
                if let Some(p) = self.slot_mut(node).and_then(|s| s.params.get_mut(param)) {
                    p.cancel_and_hold(now);
                }
            }
            GraphCommand::Ramp {
                node,
                param,
                target,
                end_time,
                curve,
            } => {
                if let Some(p) = self.slot_mut(node).and_then(|s| s.params.get_mut(param)) {
                    p.ramp_to(target, now, end_time.max(now), curve);
                }
            }
            GraphCommand::Clear => {
                for id in 0..self.slots.len() {
                    if id != DESTINATION {
                        self.slots[id] = None;
                    }
                }
                if let Some(dest) = self.slot_mut(DESTINATION) {
                    dest.inputs.clear();
                    dest.param_inputs.clear();
                }
                self.dirty = true;
            }
        }
    }

    fn rebuild_order(&mut self) {
        let mut graph = DiGraph::<NodeId, ()>::new();
        let mut index = vec![None; self.slots.len()];
        for (id, slot) in self.slots.iter().enumerate() {
            if slot.is_some() {
                index[id] = Some(graph.add_node(id));
            }
        }

        let edge = |from: NodeId, to: NodeId| -> Option<(NodeIndex, NodeIndex)> {
            Some((index.get(from).copied().flatten()?, index[to]?))
        };
        let mut edges = Vec::new();
        for (id, slot) in self.slots.iter().enumerate() {
            if let Some(slot) = slot {
                let sources = slot.inputs.iter().chain(slot.param_inputs.iter().map(|(_, s)| s));
                edges.extend(sources.filter_map(|&src| edge(src, id)));
            }
        }
        for (a, b) in edges {
            graph.add_edge(a, b, ());
        }

        self.order = match toposort(&graph, None) {
            Ok(order) => order.iter().map(|&idx| graph[idx]).collect(),
            // Feedback: process in id order, cycles read last block's output
            Err(_cycle) => (0..self.slots.len())
                .filter(|&id| self.slots[id].is_some())
                .collect(),
        };
        self.dirty = false;
    }

    /// Render one block and return the destination output
    pub fn process_block(&mut self) -> &StereoBlock {
        if self.dirty {
            self.rebuild_order();
        }

        let context = ProcessContext::new(self.sample_rate, BLOCK_SIZE, self.time());
        let order = std::mem::take(&mut self.order);

        for &id in &order {
            let Some(slot) = self.slots.get_mut(id).and_then(|s| s.as_mut()) else {
                continue;
            };

            self.input_scratch.clear(BLOCK_SIZE);
            for &src in &slot.inputs {
                self.input_scratch.add(&self.outputs[src]);
            }

            let param_count = slot.params.len();
            for (p, param) in slot.params.iter_mut().enumerate() {
                let mut modulated = false;
                for &(target, src) in &slot.param_inputs {
                    if target != p {
                        continue;
                    }
                    if !modulated {
                        self.mod_scratch.fill(0.0);
                        modulated = true;
                    }
                    let source = &self.outputs[src];
                    for (i, m) in self.mod_scratch.iter_mut().enumerate() {
                        *m += source.mono(i);
                    }
                }
                let modulation = modulated.then_some(self.mod_scratch.as_slice());
                param.fill(
                    &mut self.param_scratch[p],
                    context.block_start,
                    self.sample_rate,
                    modulation,
                );
            }

            let empty: &[f32] = &[];
            let mut views = [empty; MAX_PARAMS];
            for (view, buffer) in views.iter_mut().zip(&self.param_scratch) {
                *view = buffer.as_slice();
            }

            let mut output = std::mem::take(&mut self.outputs[id]);
            output.clear(BLOCK_SIZE);
            slot.node
                .process_block(&self.input_scratch, &views[..param_count], &mut output, &context);
            self.outputs[id] = output;
        }

        self.order = order;
        self.frame += BLOCK_SIZE as u64;
        &self.outputs[DESTINATION]
    }

    /// Pull the next stereo frame, rendering a new block when needed
    pub fn next_frame(&mut self) -> (f32, f32) {
        if self.cursor >= BLOCK_SIZE {
            self.process_block();
            self.cursor = 0;
        }
        let out = &self.outputs[DESTINATION];
        let frame = (out.left[self.cursor], out.right[self.cursor]);
        self.cursor += 1;
        frame
    }

    /// Fill an interleaved buffer with `channels` channels
    ///
    /// Mono output averages the two sides; channels past the second repeat
    /// the stereo pair.
    pub fn render_interleaved(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        for frame in out.chunks_mut(channels) {
            let (l, r) = self.next_frame();
            if channels == 1 {
                frame[0] = 0.5 * (l + r);
                continue;
            }
            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = if c % 2 == 0 { l } else { r };
            }
        }
    }
}
