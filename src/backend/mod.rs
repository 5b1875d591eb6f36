//! Audio backend capability surface
//!
//! The control plane never touches samples. It builds nodes, wires them
//! and schedules parameter ramps through an [`AudioBackend`]; the backend
//! forwards each request as a [`GraphCommand`] to whatever render graph it
//! drives (a realtime cpal callback or an offline renderer).
//!
//! Backends implement only the clock, the lifecycle, a [`NodeRegistry`]
//! accessor and `submit`. Node construction and validation are provided
//! methods shared by every backend.

pub mod offline;
pub mod realtime;

pub use offline::{OfflineBackend, OfflineBackendFactory, OfflineRenderHandle};
pub use realtime::CpalBackend;

use crate::envelope::RampCurve;
use crate::error::{BackendError, BackendResult};
use crate::impulse::ImpulseResponse;
use crate::nodes::{BiquadFilterNode, ConvolutionNode, FilterKind, GainNode, OscillatorNode};
use crate::render_graph::DESTINATION;
pub use crate::render_graph::GraphCommand;

/// Opaque reference to a node created on a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle(usize);

impl NodeHandle {
    /// The output bus every backend provides
    pub const DESTINATION: NodeHandle = NodeHandle(DESTINATION);

    pub fn index(&self) -> usize {
        self.0
    }
}

/// One automatable parameter of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamRef {
    pub node: NodeHandle,
    pub index: usize,
}

impl ParamRef {
    pub fn new(node: NodeHandle, index: usize) -> Self {
        Self { node, index }
    }
}

/// Lifecycle state reported by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendState {
    Running,
    /// Constructed but not producing audio (power-save, autoplay policy)
    Suspended,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Destination,
    Oscillator,
    Gain,
    Filter(FilterKind),
    Convolver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Pending,
    Started,
    Stopped,
}

#[derive(Debug, Clone, Copy)]
struct NodeInfo {
    kind: NodeKind,
    param_count: usize,
    source: Option<SourceState>,
}

/// Control-side record of every node on a backend
///
/// Lets the provided [`AudioBackend`] methods validate requests before
/// they reach the render side, which cannot report errors.
#[derive(Debug, Clone)]
pub struct NodeRegistry {
    nodes: Vec<NodeInfo>,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeInfo {
                kind: NodeKind::Destination,
                param_count: 0,
                source: None,
            }],
        }
    }

    fn add(&mut self, kind: NodeKind, param_count: usize) -> NodeHandle {
        let source = matches!(kind, NodeKind::Oscillator).then_some(SourceState::Pending);
        self.nodes.push(NodeInfo {
            kind,
            param_count,
            source,
        });
        NodeHandle(self.nodes.len() - 1)
    }

    fn info(&self, handle: NodeHandle) -> BackendResult<&NodeInfo> {
        self.nodes
            .get(handle.0)
            .ok_or(BackendError::UnknownNode(handle))
    }

    fn check_param(&self, param: ParamRef) -> BackendResult<()> {
        if param.index < self.info(param.node)?.param_count {
            Ok(())
        } else {
            Err(BackendError::UnknownParam {
                node: param.node,
                index: param.index,
            })
        }
    }

    fn source_mut(&mut self, handle: NodeHandle) -> BackendResult<&mut SourceState> {
        self.nodes
            .get_mut(handle.0)
            .ok_or(BackendError::UnknownNode(handle))?
            .source
            .as_mut()
            .ok_or(BackendError::Unsupported {
                node: handle,
                operation: "start/stop",
            })
    }

    pub fn kind(&self, handle: NodeHandle) -> Option<NodeKind> {
        self.nodes.get(handle.0).map(|n| n.kind)
    }

    /// Number of nodes, destination included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Forget every node except the destination
    pub fn reset(&mut self) {
        self.nodes.truncate(1);
    }
}

/// Capability surface the engine needs from an audio backend
pub trait AudioBackend: Send {
    fn sample_rate(&self) -> f32;

    /// Seconds on the backend's audio clock
    fn current_time(&self) -> f64;

    fn state(&self) -> BackendState;

    /// Ask the backend to produce audio; returns the resulting state
    fn resume(&mut self) -> BackendResult<BackendState>;

    fn suspend(&mut self) -> BackendResult<()>;

    /// Release the backend; a second call yields `AlreadyClosed`
    fn close(&mut self) -> BackendResult<()>;

    fn registry(&mut self) -> &mut NodeRegistry;

    /// Forward a validated command to the render side
    fn submit(&mut self, command: GraphCommand) -> BackendResult<()>;

    fn ensure_open(&self) -> BackendResult<()> {
        match self.state() {
            BackendState::Closed => Err(BackendError::Closed),
            _ => Ok(()),
        }
    }

    fn destination(&self) -> NodeHandle {
        NodeHandle::DESTINATION
    }

    /// Sine oscillator; parameter 0 is its frequency
    fn create_oscillator(&mut self, frequency: f32) -> BackendResult<NodeHandle> {
        self.ensure_open()?;
        let handle = self.registry().add(NodeKind::Oscillator, 1);
        self.submit(GraphCommand::AddNode {
            id: handle.index(),
            node: Box::new(OscillatorNode::new(frequency)),
        })?;
        Ok(handle)
    }

    /// Gain stage; parameter 0 is its gain
    fn create_gain(&mut self, gain: f32) -> BackendResult<NodeHandle> {
        self.ensure_open()?;
        let handle = self.registry().add(NodeKind::Gain, 1);
        self.submit(GraphCommand::AddNode {
            id: handle.index(),
            node: Box::new(GainNode::new(gain)),
        })?;
        Ok(handle)
    }

    /// Biquad filter; parameters are cutoff (0) and Q (1)
    fn create_filter(&mut self, kind: FilterKind, cutoff: f32, q: f32) -> BackendResult<NodeHandle> {
        self.ensure_open()?;
        let node = BiquadFilterNode::new(kind, cutoff, q, self.sample_rate());
        let handle = self.registry().add(NodeKind::Filter(kind), 2);
        self.submit(GraphCommand::AddNode {
            id: handle.index(),
            node: Box::new(node),
        })?;
        Ok(handle)
    }

    /// Convolution reverb over a pre-rendered impulse response
    fn create_convolver(&mut self, impulse: &ImpulseResponse) -> BackendResult<NodeHandle> {
        self.ensure_open()?;
        let node = ConvolutionNode::new(impulse);
        let handle = self.registry().add(NodeKind::Convolver, 0);
        self.submit(GraphCommand::AddNode {
            id: handle.index(),
            node: Box::new(node),
        })?;
        Ok(handle)
    }

    fn connect(&mut self, from: NodeHandle, to: NodeHandle) -> BackendResult<()> {
        self.ensure_open()?;
        let registry = self.registry();
        registry.info(from)?;
        if registry.info(to)?.kind == NodeKind::Oscillator {
            return Err(BackendError::Unsupported {
                node: to,
                operation: "audio input",
            });
        }
        self.submit(GraphCommand::Connect {
            from: from.index(),
            to: to.index(),
        })
    }

    /// Add `from`'s output to a parameter (modulation)
    fn connect_param(&mut self, from: NodeHandle, param: ParamRef) -> BackendResult<()> {
        self.ensure_open()?;
        let registry = self.registry();
        registry.info(from)?;
        registry.check_param(param)?;
        self.submit(GraphCommand::ConnectParam {
            from: from.index(),
            to: param.node.index(),
            param: param.index,
        })
    }

    /// Starting an already started oscillator is a no-op
    fn start_oscillator(&mut self, handle: NodeHandle) -> BackendResult<()> {
        self.ensure_open()?;
        let source = self.registry().source_mut(handle)?;
        match *source {
            SourceState::Stopped => return Err(BackendError::AlreadyStopped(handle)),
            SourceState::Started => return Ok(()),
            SourceState::Pending => *source = SourceState::Started,
        }
        self.submit(GraphCommand::Start(handle.index()))
    }

    fn stop_oscillator(&mut self, handle: NodeHandle) -> BackendResult<()> {
        self.ensure_open()?;
        let source = self.registry().source_mut(handle)?;
        if *source == SourceState::Stopped {
            return Err(BackendError::AlreadyStopped(handle));
        }
        *source = SourceState::Stopped;
        self.submit(GraphCommand::Stop(handle.index()))
    }

    /// Cancel the in-flight ramp, holding the parameter where it is
    fn cancel_scheduled(&mut self, param: ParamRef) -> BackendResult<()> {
        self.ensure_open()?;
        self.registry().check_param(param)?;
        self.submit(GraphCommand::CancelScheduled {
            node: param.node.index(),
            param: param.index,
        })
    }

    /// Ramp from the current value to `target`, arriving at `end_time`
    fn schedule_ramp(
        &mut self,
        param: ParamRef,
        target: f32,
        end_time: f64,
        curve: RampCurve,
    ) -> BackendResult<()> {
        self.ensure_open()?;
        self.registry().check_param(param)?;
        if !target.is_finite() {
            return Err(BackendError::UnknownParam {
                node: param.node,
                index: param.index,
            });
        }
        self.submit(GraphCommand::Ramp {
            node: param.node.index(),
            param: param.index,
            target,
            end_time,
            curve,
        })
    }
}

/// Builds a backend each time the engine starts
pub trait BackendFactory: Send {
    fn create(&mut self) -> BackendResult<Box<dyn AudioBackend>>;
}

impl<F> BackendFactory for F
where
    F: FnMut() -> BackendResult<Box<dyn AudioBackend>> + Send,
{
    fn create(&mut self) -> BackendResult<Box<dyn AudioBackend>> {
        self()
    }
}
