//! Automation parameter - a node input driven by scheduled ramps
//!
//! Holds the last settled value plus at most one in-flight
//! [`EnvelopeRamp`]. Cancelling freezes the value wherever the ramp was,
//! so a superseding ramp always starts from the audible value.

use crate::envelope::{EnvelopeRamp, RampCurve};

#[derive(Debug, Clone)]
pub struct AudioParam {
    value: f32,
    ramp: Option<EnvelopeRamp>,
}

impl AudioParam {
    pub fn new(value: f32) -> Self {
        Self { value, ramp: None }
    }

    /// Value at audio clock time `t`
    pub fn value_at(&self, t: f64) -> f32 {
        match &self.ramp {
            Some(ramp) => ramp.value_at(t),
            None => self.value,
        }
    }

    /// Drop any in-flight ramp, holding the value it had reached at `t`
    pub fn cancel_and_hold(&mut self, t: f64) {
        self.value = self.value_at(t);
        self.ramp = None;
    }

    /// Ramp from the value at `now` to `target`, finishing at `end_time`
    pub fn ramp_to(&mut self, target: f32, now: f64, end_time: f64, curve: RampCurve) {
        let from = self.value_at(now);
        self.ramp = Some(EnvelopeRamp::new(from, target, now, end_time - now, curve));
    }

    /// Write one automation value per frame into `out`
    ///
    /// `modulation` (summed outputs of nodes connected to this parameter)
    /// is added on top of the automation curve.
    pub fn fill(
        &mut self,
        out: &mut [f32],
        block_start: f64,
        sample_rate: f32,
        modulation: Option<&[f32]>,
    ) {
        let dt = 1.0 / sample_rate as f64;
        match self.ramp {
            Some(ramp) => {
                for (i, slot) in out.iter_mut().enumerate() {
                    *slot = ramp.value_at(block_start + i as f64 * dt);
                }
                let block_end = block_start + out.len() as f64 * dt;
                if ramp.is_complete(block_end) {
                    self.value = ramp.target();
                    self.ramp = None;
                }
            }
            None => out.fill(self.value),
        }
        if let Some(modulation) = modulation {
            for (slot, m) in out.iter_mut().zip(modulation) {
                *slot += m;
            }
        }
    }
}
