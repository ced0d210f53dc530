//! Exponential smoothing
//!
//! `v' = v * (1 - alpha) + x * alpha`. Higher alpha tracks the input more
//! closely. Vector variants compose one scalar smoother per axis.

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

/// Exponential moving average over a scalar signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialSmoother {
    value: f64,
    alpha: f64,
}

impl ExponentialSmoother {
    /// Create a smoother starting at `initial`. Alpha is clamped to [0, 1].
    pub fn new(initial: f64, alpha: f64) -> Self {
        Self {
            value: initial,
            alpha: alpha.clamp(0.0, 1.0),
        }
    }

    /// Feed one sample and return the smoothed value
    pub fn update(&mut self, sample: f64) -> f64 {
        self.value = self.value * (1.0 - self.alpha) + sample * self.alpha;
        self.value
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Jump straight to `value`, discarding history
    pub fn reset(&mut self, value: f64) {
        self.value = value;
    }
}

/// Per-axis exponential smoothing for 2D points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector2Smoother {
    x: ExponentialSmoother,
    y: ExponentialSmoother,
}

impl Vector2Smoother {
    pub fn new(initial: DVec2, alpha: f64) -> Self {
        Self {
            x: ExponentialSmoother::new(initial.x, alpha),
            y: ExponentialSmoother::new(initial.y, alpha),
        }
    }

    pub fn update(&mut self, sample: DVec2) -> DVec2 {
        DVec2::new(self.x.update(sample.x), self.y.update(sample.y))
    }

    pub fn value(&self) -> DVec2 {
        DVec2::new(self.x.value(), self.y.value())
    }

    pub fn reset(&mut self, value: DVec2) {
        self.x.reset(value.x);
        self.y.reset(value.y);
    }
}

/// Per-axis exponential smoothing for 3D points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vector3Smoother {
    x: ExponentialSmoother,
    y: ExponentialSmoother,
    z: ExponentialSmoother,
}

impl Vector3Smoother {
    pub fn new(initial: DVec3, alpha: f64) -> Self {
        Self {
            x: ExponentialSmoother::new(initial.x, alpha),
            y: ExponentialSmoother::new(initial.y, alpha),
            z: ExponentialSmoother::new(initial.z, alpha),
        }
    }

    pub fn update(&mut self, sample: DVec3) -> DVec3 {
        DVec3::new(
            self.x.update(sample.x),
            self.y.update(sample.y),
            self.z.update(sample.z),
        )
    }

    pub fn value(&self) -> DVec3 {
        DVec3::new(self.x.value(), self.y.value(), self.z.value())
    }

    pub fn reset(&mut self, value: DVec3) {
        self.x.reset(value.x);
        self.y.reset(value.y);
        self.z.reset(value.z);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_update_formula() {
        let mut smoother = ExponentialSmoother::new(0.0, 0.3);
        let v = smoother.update(1.0);
        assert!((v - 0.3).abs() < 1e-12);
        let v = smoother.update(1.0);
        // 0.3 * 0.7 + 0.3
        assert!((v - 0.51).abs() < 1e-12);
    }

    #[test]
    fn test_alpha_one_passes_input_through() {
        let mut smoother = ExponentialSmoother::new(5.0, 1.0);
        assert_eq!(smoother.update(-2.0), -2.0);
    }

    #[test]
    fn test_reset_avoids_startup_transient() {
        let mut smoother = ExponentialSmoother::new(0.0, 0.1);
        smoother.reset(10.0);
        let v = smoother.update(10.0);
        assert!((v - 10.0).abs() < 1e-12);
    }

    #[test]
    fn test_converges_towards_constant_input() {
        let mut smoother = ExponentialSmoother::new(0.0, 0.3);
        for _ in 0..100 {
            smoother.update(1.0);
        }
        assert!((smoother.value() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_vector2_axes_are_independent() {
        let mut smoother = Vector2Smoother::new(DVec2::new(0.5, 0.5), 0.8);
        let v = smoother.update(DVec2::new(1.0, 0.5));
        assert!((v.x - 0.9).abs() < 1e-12);
        assert!((v.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_vector3_reset() {
        let mut smoother = Vector3Smoother::new(DVec3::ZERO, 0.15);
        smoother.update(DVec3::ONE);
        smoother.reset(DVec3::new(1.0, 2.0, 3.0));
        assert_eq!(smoother.value(), DVec3::new(1.0, 2.0, 3.0));
    }
}
