//! Adapter from detector records to [`HandFrame`]s
//!
//! Parses JSON / NDJSON records, drops hands with incomplete skeletons,
//! settles each hand's handedness through a swappable policy, and hands the
//! result to [`HandFrame::new`] for deduplication and ordering.

use crate::classifier::thumb_side_handedness;
use crate::error::InteractionError;
use crate::schema::raw_frame::*;
use crate::types::{HandFrame, HandObservation, Handedness, Landmark, LANDMARK_COUNT};
use std::fmt::Debug;
use tracing::{debug, trace};

/// Decides the handedness label attached to an observation
pub trait HandednessPolicy: Debug + Send + Sync {
    fn resolve(&self, detected: Option<Handedness>, landmarks: &[Landmark]) -> Handedness;
}

/// Label the hand from which side of the palm the thumb is on, overriding the
/// detector when the two disagree. The detector label is only used if the
/// skeleton is too short for the thumb test.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThumbSideOverride;

impl HandednessPolicy for ThumbSideOverride {
    fn resolve(&self, detected: Option<Handedness>, landmarks: &[Landmark]) -> Handedness {
        match (thumb_side_handedness(landmarks), detected) {
            (Some(thumb), Some(label)) if thumb != label => {
                trace!(detected = label.as_str(), thumb = thumb.as_str(), "handedness overridden");
                thumb
            }
            (Some(thumb), _) => thumb,
            (None, Some(label)) => label,
            (None, None) => Handedness::Right,
        }
    }
}

/// Keep the detector's label; the thumb test only fills in a missing one
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustDetector;

impl HandednessPolicy for TrustDetector {
    fn resolve(&self, detected: Option<Handedness>, landmarks: &[Landmark]) -> Handedness {
        detected
            .or_else(|| thumb_side_handedness(landmarks))
            .unwrap_or(Handedness::Right)
    }
}

/// Adapter for converting detector records to hand frames
#[derive(Debug)]
pub struct FrameAdapter {
    policy: Box<dyn HandednessPolicy>,
}

impl Default for FrameAdapter {
    fn default() -> Self {
        Self::with_policy(ThumbSideOverride)
    }
}

impl FrameAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: impl HandednessPolicy + 'static) -> Self {
        Self {
            policy: Box::new(policy),
        }
    }

    /// Parse a JSON string containing an array of records
    pub fn parse_array(json: &str) -> Result<Vec<RawFrame>, InteractionError> {
        let frames: Vec<RawFrame> = serde_json::from_str(json)?;
        Ok(frames)
    }

    /// Parse newline-delimited JSON records, skipping blank lines
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<RawFrame>, InteractionError> {
        let mut frames = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<RawFrame>(trimmed) {
                Ok(frame) => frames.push(frame),
                Err(e) => {
                    return Err(InteractionError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(frames)
    }

    /// Convert one validated record into a hand frame
    pub fn to_hand_frame(&self, record: &RawFrame) -> Result<HandFrame, InteractionError> {
        record.validate()?;

        let mut observations = Vec::with_capacity(record.hands.len());
        for hand in &record.hands {
            if hand.landmarks.len() < LANDMARK_COUNT {
                trace!(count = hand.landmarks.len(), "dropping incomplete hand");
                continue;
            }
            let landmarks: Vec<Landmark> = hand
                .landmarks
                .iter()
                .take(LANDMARK_COUNT)
                .map(|&l| Landmark::from(l))
                .collect();
            let handedness = self.policy.resolve(hand.handedness, &landmarks);
            observations.push(HandObservation::new(landmarks, handedness, hand.score));
        }

        let detected = observations.len();
        let frame = HandFrame::new(record.timestamp, observations).with_gaze(record.gaze);
        if frame.hands.len() < detected {
            debug!(
                detected,
                kept = frame.hands.len(),
                "duplicate handedness removed"
            );
        }
        Ok(frame)
    }

    /// Convert a batch, sorted by timestamp
    pub fn to_hand_frames(&self, records: &[RawFrame]) -> Result<Vec<HandFrame>, InteractionError> {
        let mut frames = records
            .iter()
            .map(|r| self.to_hand_frame(r))
            .collect::<Result<Vec<_>, _>>()?;
        frames.sort_by_key(|f| f.timestamp);
        Ok(frames)
    }

    /// Validate a batch of records, returning only the failures
    pub fn validate_frames(records: &[RawFrame]) -> Vec<ValidationResult> {
        records
            .iter()
            .enumerate()
            .filter_map(|(idx, record)| {
                record.validate().err().map(|error| ValidationResult {
                    index: idx,
                    timestamp: record.timestamp,
                    error,
                })
            })
            .collect()
    }
}

/// A record that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub index: usize,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub error: ValidationError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::fixtures::open_hand;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn ts(ms: i64) -> chrono::DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn mirrored(landmarks: Vec<Landmark>) -> Vec<Landmark> {
        landmarks
            .into_iter()
            .map(|l| Landmark::new(1.0 - l.x, l.y, l.z))
            .collect()
    }

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let ndjson = r#"
{"timestamp": "2026-01-01T00:00:00Z", "hands": []}

{"timestamp": "2026-01-01T00:00:00.033Z"}
"#;
        let frames = FrameAdapter::parse_ndjson(ndjson).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(frames[1].hands.is_empty());
    }

    #[test]
    fn test_parse_ndjson_reports_line_number() {
        let ndjson = "{\"timestamp\": \"2026-01-01T00:00:00Z\"}\nnot json\n";
        let err = FrameAdapter::parse_ndjson(ndjson).unwrap_err();
        match err {
            InteractionError::ParseError(msg) => assert!(msg.contains("line 2"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_parse_array() {
        let json = r#"[{"timestamp": "2026-01-01T00:00:00Z"}, {"timestamp": "2026-01-01T00:00:01Z"}]"#;
        assert_eq!(FrameAdapter::parse_array(json).unwrap().len(), 2);
    }

    #[test]
    fn test_incomplete_hand_dropped() {
        let record = RawFrame::new(ts(0))
            .with_hand(open_hand(0.0).into_iter().take(20), Some(Handedness::Right), 0.9);
        let frame = FrameAdapter::new().to_hand_frame(&record).unwrap();
        assert!(frame.hands.is_empty());
    }

    #[test]
    fn test_thumb_side_overrides_detector() {
        // Thumb on the image-left: the thumb rule says Right
        let record = RawFrame::new(ts(0)).with_hand(open_hand(0.0), Some(Handedness::Left), 0.9);

        let frame = FrameAdapter::new().to_hand_frame(&record).unwrap();
        assert_eq!(frame.hands[0].handedness, Handedness::Right);

        let frame = FrameAdapter::with_policy(TrustDetector)
            .to_hand_frame(&record)
            .unwrap();
        assert_eq!(frame.hands[0].handedness, Handedness::Left);
    }

    #[test]
    fn test_trust_detector_fills_missing_label() {
        let record = RawFrame::new(ts(0)).with_hand(mirrored(open_hand(0.0)), None, 0.9);
        let frame = FrameAdapter::with_policy(TrustDetector)
            .to_hand_frame(&record)
            .unwrap();
        assert_eq!(frame.hands[0].handedness, Handedness::Left);
    }

    #[test]
    fn test_duplicates_removed_by_confidence() {
        let record = RawFrame::new(ts(0))
            .with_hand(open_hand(0.0), None, 0.6)
            .with_hand(open_hand(-0.05), None, 0.8)
            .with_hand(mirrored(open_hand(0.0)), None, 0.7);

        let frame = FrameAdapter::new().to_hand_frame(&record).unwrap();
        assert_eq!(frame.hands.len(), 2);
        assert_eq!(frame.hands[0].confidence, 0.8);
        assert_eq!(frame.hands[0].handedness, Handedness::Right);
        assert_eq!(frame.hands[1].confidence, 0.7);
        assert_eq!(frame.hands[1].handedness, Handedness::Left);
    }

    #[test]
    fn test_invalid_record_rejected() {
        let record = RawFrame::new(ts(0)).with_hand(open_hand(0.0), None, -0.1);
        let err = FrameAdapter::new().to_hand_frame(&record).unwrap_err();
        assert!(matches!(err, InteractionError::InvalidRecord(_)));
    }

    #[test]
    fn test_batch_sorted_and_validated() {
        let records = vec![
            RawFrame::new(ts(66)),
            RawFrame::new(ts(0)),
            RawFrame::new(ts(33)).with_hand(open_hand(0.0), None, 3.0),
        ];
        let failures = FrameAdapter::validate_frames(&records);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 2);

        let frames = FrameAdapter::new().to_hand_frames(&records[..2]).unwrap();
        assert_eq!(frames[0].timestamp, ts(0));
        assert_eq!(frames[1].timestamp, ts(66));
    }
}
