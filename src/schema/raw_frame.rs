//! hand.frame.v1 record definition
//!
//! One record per detector frame, as emitted by the landmark detector:
//!
//! ```json
//! {"timestamp": "2026-01-01T00:00:00Z",
//!  "hands": [{"landmarks": [{"x": 0.5, "y": 0.8, "z": 0.0}, ...], "handedness": "right", "score": 0.93}],
//!  "gaze": {"direction": [0.0, 0.0, -1.0], "confidence": 0.8}}
//! ```

use crate::types::{GazeReading, Handedness, Landmark};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current record version
pub const FRAME_SCHEMA_VERSION: &str = "hand.frame.v1";

/// A landmark as written by the detector; `z` is optional
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawLandmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

impl From<RawLandmark> for Landmark {
    fn from(raw: RawLandmark) -> Self {
        Landmark::new(raw.x, raw.y, raw.z)
    }
}

impl From<Landmark> for RawLandmark {
    fn from(l: Landmark) -> Self {
        Self {
            x: l.x,
            y: l.y,
            z: l.z,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawHand {
    pub landmarks: Vec<RawLandmark>,
    /// Detector's own label; may be absent on some backends
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handedness: Option<Handedness>,
    /// Detection confidence in [0, 1]
    #[serde(default = "default_score")]
    pub score: f64,
}

fn default_score() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub hands: Vec<RawHand>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaze: Option<GazeReading>,
}

impl RawFrame {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            schema_version: Some(FRAME_SCHEMA_VERSION.to_string()),
            timestamp,
            hands: Vec::new(),
            gaze: None,
        }
    }

    pub fn with_hand(
        mut self,
        landmarks: impl IntoIterator<Item = Landmark>,
        handedness: Option<Handedness>,
        score: f64,
    ) -> Self {
        self.hands.push(RawHand {
            landmarks: landmarks.into_iter().map(RawLandmark::from).collect(),
            handedness,
            score,
        });
        self
    }

    pub fn with_gaze(mut self, gaze: GazeReading) -> Self {
        self.gaze = Some(gaze);
        self
    }

    /// Validate the record.
    ///
    /// Short hands are not an error here; they are dropped during conversion.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(version) = &self.schema_version {
            if version != FRAME_SCHEMA_VERSION {
                return Err(ValidationError::InvalidSchemaVersion {
                    expected: FRAME_SCHEMA_VERSION.to_string(),
                    actual: version.clone(),
                });
            }
        }

        for (hand_idx, hand) in self.hands.iter().enumerate() {
            if !(0.0..=1.0).contains(&hand.score) {
                return Err(ValidationError::ScoreOutOfRange {
                    hand: hand_idx,
                    score: hand.score,
                });
            }
            if let Some(point) = hand
                .landmarks
                .iter()
                .position(|l| !(l.x.is_finite() && l.y.is_finite() && l.z.is_finite()))
            {
                return Err(ValidationError::NonFiniteLandmark {
                    hand: hand_idx,
                    point,
                });
            }
        }

        if let Some(gaze) = &self.gaze {
            if !(0.0..=1.0).contains(&gaze.confidence) {
                return Err(ValidationError::GazeConfidenceOutOfRange(gaze.confidence));
            }
            if !gaze.direction.is_finite() {
                return Err(ValidationError::NonFiniteGaze);
            }
        }

        Ok(())
    }
}

/// Validation errors for frame records
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Hand {hand} has score {score} outside [0, 1]")]
    ScoreOutOfRange { hand: usize, score: f64 },

    #[error("Hand {hand} has a non-finite coordinate at landmark {point}")]
    NonFiniteLandmark { hand: usize, point: usize },

    #[error("Gaze confidence {0} outside [0, 1]")]
    GazeConfidenceOutOfRange(f64),

    #[error("Gaze direction is not finite")]
    NonFiniteGaze,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use glam::DVec3;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_parse_minimal_record() {
        let json = r#"{
            "timestamp": "2026-01-01T00:00:00Z",
            "hands": [{"landmarks": [{"x": 0.1, "y": 0.2}], "handedness": "Left"}]
        }"#;
        let frame: RawFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.timestamp, ts());
        assert_eq!(frame.hands[0].landmarks[0].z, 0.0);
        assert_eq!(frame.hands[0].score, 1.0);
        assert_eq!(frame.hands[0].handedness, Some(Handedness::Left));
        assert!(frame.validate().is_ok());
    }

    #[test]
    fn test_validate_schema_version() {
        let mut frame = RawFrame::new(ts());
        assert!(frame.validate().is_ok());

        frame.schema_version = Some("hand.frame.v0".into());
        assert!(matches!(
            frame.validate(),
            Err(ValidationError::InvalidSchemaVersion { .. })
        ));
    }

    #[test]
    fn test_validate_score_and_coordinates() {
        let frame = RawFrame::new(ts()).with_hand(vec![Landmark::default(); 21], None, 1.4);
        assert_eq!(
            frame.validate(),
            Err(ValidationError::ScoreOutOfRange {
                hand: 0,
                score: 1.4
            })
        );

        let mut landmarks = vec![Landmark::default(); 21];
        landmarks[7].y = f64::NAN;
        let frame = RawFrame::new(ts()).with_hand(landmarks, None, 0.9);
        assert_eq!(
            frame.validate(),
            Err(ValidationError::NonFiniteLandmark { hand: 0, point: 7 })
        );
    }

    #[test]
    fn test_validate_gaze() {
        let frame = RawFrame::new(ts()).with_gaze(GazeReading {
            direction: DVec3::NEG_Z,
            confidence: 2.0,
        });
        assert_eq!(
            frame.validate(),
            Err(ValidationError::GazeConfidenceOutOfRange(2.0))
        );
    }
}
