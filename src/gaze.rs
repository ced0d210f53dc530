//! Optional gaze ray channel
//!
//! A secondary input alongside the hands. Disabled unless configured; when on,
//! confident readings become world-space rays from the camera.

use crate::scene::{Camera, Ray};
use crate::types::GazeReading;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeConfig {
    pub enabled: bool,
    /// Readings below this confidence produce no ray
    pub min_confidence: f64,
    /// Length of the emitted ray segment
    pub max_length: f64,
}

impl Default for GazeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_confidence: 0.5,
            max_length: 10.0,
        }
    }
}

/// World-space gaze segment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeRay {
    pub ray: Ray,
    pub length: f64,
    pub confidence: f64,
}

impl GazeRay {
    pub fn end(&self) -> DVec3 {
        self.ray.at(self.length)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GazeTracker {
    config: GazeConfig,
    last: Option<GazeRay>,
}

impl GazeTracker {
    pub fn new(config: GazeConfig) -> Self {
        Self { config, last: None }
    }

    pub fn config(&self) -> &GazeConfig {
        &self.config
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.config.enabled = enabled;
        if !enabled {
            self.last = None;
        }
    }

    /// Most recent ray, cleared whenever a reading is missing or weak
    pub fn last(&self) -> Option<GazeRay> {
        self.last
    }

    pub fn reset(&mut self) {
        self.last = None;
    }

    pub fn update(&mut self, reading: Option<&GazeReading>, camera: &dyn Camera) -> Option<GazeRay> {
        self.last = if self.config.enabled {
            reading.and_then(|r| gaze_ray(r, camera, &self.config))
        } else {
            None
        };
        self.last
    }
}

/// Build the gaze ray for one reading
pub fn gaze_ray(reading: &GazeReading, camera: &dyn Camera, config: &GazeConfig) -> Option<GazeRay> {
    if reading.confidence < config.min_confidence {
        trace!(confidence = reading.confidence, "gaze reading below threshold");
        return None;
    }
    let direction = camera.to_world_direction(reading.direction);
    if direction == DVec3::ZERO {
        return None;
    }
    Some(GazeRay {
        ray: Ray::new(camera.position(), direction),
        length: config.max_length,
        confidence: reading.confidence,
    })
}
