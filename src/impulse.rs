//! Synthetic room impulse responses
//!
//! The reverb tail is uniform noise shaped by a power-law decay,
//! `noise * (1 - t/len)^decay`, rendered independently per stereo side so
//! the room sounds wide and diffuse.

use rand::Rng;
use std::sync::Arc;

/// Stereo impulse response, shared between render nodes
#[derive(Debug, Clone)]
pub struct ImpulseResponse {
    pub left: Arc<Vec<f32>>,
    pub right: Arc<Vec<f32>>,
    pub sample_rate: f32,
}

impl ImpulseResponse {
    /// Render a diffuse tail of `duration_secs` seconds
    ///
    /// `decay` is the exponent of the envelope; 2.0–2.5 keeps the tail dense
    /// without a long audible hiss. Each side is normalized to unit energy
    /// so wet level tracks dry level.
    pub fn generate<R: Rng>(
        sample_rate: f32,
        duration_secs: f32,
        decay: f32,
        rng: &mut R,
    ) -> Self {
        let length = (sample_rate * duration_secs.max(0.0)) as usize;
        let mut left = Vec::with_capacity(length);
        let mut right = Vec::with_capacity(length);

        for i in 0..length {
            let envelope = (1.0 - i as f32 / length as f32).powf(decay);
            left.push(rng.gen_range(-1.0f32..=1.0) * envelope);
            right.push(rng.gen_range(-1.0f32..=1.0) * envelope);
        }

        normalize(&mut left);
        normalize(&mut right);

        Self {
            left: Arc::new(left),
            right: Arc::new(right),
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.left.len().max(self.right.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn duration_secs(&self) -> f32 {
        self.len() as f32 / self.sample_rate
    }
}

fn normalize(samples: &mut [f32]) {
    let energy: f32 = samples.iter().map(|s| s * s).sum();
    if energy > 0.0 {
        let scale = 1.0 / energy.sqrt();
        for s in samples.iter_mut() {
            *s *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_impulse_length_and_energy() {
        let mut rng = StdRng::seed_from_u64(7);
        let ir = ImpulseResponse::generate(44100.0, 3.25, 2.25, &mut rng);
        assert_eq!(ir.len(), (44100.0f32 * 3.25) as usize);
        assert!((ir.duration_secs() - 3.25).abs() < 0.001);

        let energy: f32 = ir.left.iter().map(|s| s * s).sum();
        assert!((energy - 1.0).abs() < 1e-3, "energy {}", energy);
    }

    #[test]
    fn test_impulse_decays() {
        let mut rng = StdRng::seed_from_u64(7);
        let ir = ImpulseResponse::generate(44100.0, 3.0, 2.0, &mut rng);
        let n = ir.len() / 10;
        let head: f32 = ir.left[..n].iter().map(|s| s.abs()).sum();
        let tail: f32 = ir.left[ir.len() - n..].iter().map(|s| s.abs()).sum();
        assert!(tail < head * 0.05);
    }

    #[test]
    fn test_sides_are_decorrelated() {
        let mut rng = StdRng::seed_from_u64(11);
        let ir = ImpulseResponse::generate(8000.0, 1.0, 2.0, &mut rng);
        assert_ne!(ir.left, ir.right);
    }

    #[test]
    fn test_zero_duration_is_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        let ir = ImpulseResponse::generate(44100.0, 0.0, 2.0, &mut rng);
        assert!(ir.is_empty());
    }
}
