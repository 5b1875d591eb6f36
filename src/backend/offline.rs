//! Offline backend - renders the graph on demand instead of on a device
//!
//! The engine drives an [`OfflineBackend`] exactly like the realtime one;
//! an [`OfflineRenderHandle`] pulls frames out of the same render graph,
//! and the audio clock only advances as frames are pulled. Used by the
//! `render` command, benches and tests.

use super::{AudioBackend, BackendFactory, BackendState, NodeRegistry, ParamRef};
use crate::error::{BackendError, BackendResult};
use crate::render_graph::{GraphCommand, RenderGraph};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

struct OfflineShared {
    graph: RenderGraph,
    state: BackendState,
    /// Resume attempts that will still leave the backend suspended
    resume_failures: u32,
}

impl OfflineShared {
    fn new(sample_rate: f32, suspended_resumes: Option<u32>) -> Self {
        let (state, resume_failures) = match suspended_resumes {
            Some(failures) => (BackendState::Suspended, failures),
            None => (BackendState::Running, 0),
        };
        Self {
            graph: RenderGraph::new(sample_rate),
            state,
            resume_failures,
        }
    }
}

/// Builds [`OfflineBackend`]s that all render through one shared slot
///
/// Every `create()` replaces the slot with a fresh graph, so a render
/// handle taken once keeps following the engine across restarts.
pub struct OfflineBackendFactory {
    sample_rate: f32,
    suspended_resumes: Option<u32>,
    shared: Arc<Mutex<OfflineShared>>,
}

impl OfflineBackendFactory {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            suspended_resumes: None,
            shared: Arc::new(Mutex::new(OfflineShared::new(sample_rate, None))),
        }
    }

    /// Start every backend suspended, staying suspended for `attempts`
    /// resume calls (platform power-save / autoplay restrictions)
    pub fn simulate_suspended(mut self, attempts: u32) -> Self {
        self.suspended_resumes = Some(attempts);
        self
    }

    pub fn render_handle(&self) -> OfflineRenderHandle {
        OfflineRenderHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Build a backend over a fresh render graph
    pub fn build(&self) -> OfflineBackend {
        *self.shared.lock() = OfflineShared::new(self.sample_rate, self.suspended_resumes);
        OfflineBackend {
            sample_rate: self.sample_rate,
            registry: NodeRegistry::new(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl BackendFactory for OfflineBackendFactory {
    fn create(&mut self) -> BackendResult<Box<dyn AudioBackend>> {
        Ok(Box::new(self.build()))
    }
}

/// Control side of the offline backend
pub struct OfflineBackend {
    sample_rate: f32,
    registry: NodeRegistry,
    shared: Arc<Mutex<OfflineShared>>,
}

impl OfflineBackend {
    pub fn render_handle(&self) -> OfflineRenderHandle {
        OfflineRenderHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl AudioBackend for OfflineBackend {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.shared.lock().graph.time()
    }

    fn state(&self) -> BackendState {
        self.shared.lock().state
    }

    fn resume(&mut self) -> BackendResult<BackendState> {
        let mut shared = self.shared.lock();
        match shared.state {
            BackendState::Closed => Err(BackendError::Closed),
            BackendState::Suspended if shared.resume_failures > 0 => {
                shared.resume_failures -= 1;
                debug!("offline backend stays suspended");
                Ok(BackendState::Suspended)
            }
            _ => {
                shared.state = BackendState::Running;
                Ok(BackendState::Running)
            }
        }
    }

    fn suspend(&mut self) -> BackendResult<()> {
        let mut shared = self.shared.lock();
        if shared.state == BackendState::Closed {
            return Err(BackendError::Closed);
        }
        shared.state = BackendState::Suspended;
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        let mut shared = self.shared.lock();
        if shared.state == BackendState::Closed {
            return Err(BackendError::AlreadyClosed);
        }
        shared.state = BackendState::Closed;
        shared.graph.apply(GraphCommand::Clear);
        self.registry.reset();
        Ok(())
    }

    fn registry(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    fn submit(&mut self, command: GraphCommand) -> BackendResult<()> {
        let mut shared = self.shared.lock();
        if shared.state == BackendState::Closed {
            return Err(BackendError::Closed);
        }
        shared.graph.apply(command);
        Ok(())
    }
}

/// Render side of the offline backend (cloneable)
#[derive(Clone)]
pub struct OfflineRenderHandle {
    shared: Arc<Mutex<OfflineShared>>,
}

impl OfflineRenderHandle {
    /// Fill an interleaved stereo buffer
    ///
    /// A suspended or closed backend renders silence and its clock stands
    /// still.
    pub fn render(&self, out: &mut [f32]) {
        let mut shared = self.shared.lock();
        if shared.state == BackendState::Running {
            shared.graph.render_interleaved(out, 2);
        } else {
            out.fill(0.0);
        }
    }

    pub fn current_time(&self) -> f64 {
        self.shared.lock().graph.time()
    }

    pub fn state(&self) -> BackendState {
        self.shared.lock().state
    }

    pub fn sample_rate(&self) -> f32 {
        self.shared.lock().graph.sample_rate()
    }

    /// Automation value of a parameter at the current render time
    pub fn param_value(&self, param: ParamRef) -> Option<f32> {
        self.shared
            .lock()
            .graph
            .param_value(param.node.index(), param.index)
    }

    /// Live nodes in the render graph, destination included
    pub fn node_count(&self) -> usize {
        self.shared.lock().graph.node_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::RampCurve;
    use crate::nodes::gain;

    #[test]
    fn test_clock_advances_only_when_rendering() {
        let factory = OfflineBackendFactory::new(48000.0);
        let backend = factory.build();
        let handle = factory.render_handle();
        assert_eq!(backend.current_time(), 0.0);

        let mut buf = vec![0.0; 2 * 4800];
        handle.render(&mut buf);
        // Whole blocks are rendered ahead of the read position
        assert!(backend.current_time() >= 0.1);
        assert!(backend.current_time() < 0.1 + 512.0 / 48000.0 + 1e-9);
    }

    #[test]
    fn test_suspended_backend_needs_resumes() {
        let factory = OfflineBackendFactory::new(44100.0).simulate_suspended(1);
        let mut backend = factory.build();
        assert_eq!(backend.state(), BackendState::Suspended);
        assert_eq!(backend.resume().unwrap(), BackendState::Suspended);
        assert_eq!(backend.resume().unwrap(), BackendState::Running);
    }

    #[test]
    fn test_suspended_backend_is_silent_and_frozen() {
        let factory = OfflineBackendFactory::new(44100.0).simulate_suspended(5);
        let mut backend = factory.build();
        let osc = backend.create_oscillator(440.0).unwrap();
        let dest = backend.destination();
        backend.connect(osc, dest).unwrap();
        backend.start_oscillator(osc).unwrap();

        let handle = backend.render_handle();
        let mut buf = vec![1.0; 1024];
        handle.render(&mut buf);
        assert!(buf.iter().all(|&s| s == 0.0));
        assert_eq!(handle.current_time(), 0.0);
    }

    #[test]
    fn test_ramps_are_visible_through_handle() {
        let factory = OfflineBackendFactory::new(44100.0);
        let mut backend = factory.build();
        let g = backend.create_gain(0.0).unwrap();
        let param = ParamRef::new(g, gain::GAIN);
        backend
            .schedule_ramp(param, 1.0, 0.5, RampCurve::Linear)
            .unwrap();

        let handle = factory.render_handle();
        let mut buf = vec![0.0; 2 * 22050];
        handle.render(&mut buf);
        let value = handle.param_value(param).unwrap();
        assert!(value > 0.9, "value {}", value);
    }

    #[test]
    fn test_close_clears_graph() {
        let factory = OfflineBackendFactory::new(44100.0);
        let mut backend = factory.build();
        backend.create_gain(1.0).unwrap();
        assert_eq!(factory.render_handle().node_count(), 2);
        backend.close().unwrap();
        assert_eq!(factory.render_handle().node_count(), 1);
        assert_eq!(backend.state(), BackendState::Closed);
    }
}
