//! Core data types
//!
//! This module defines the types that flow through the interaction pipeline:
//! per-frame hand observations going in, and click gesture snapshots and
//! interaction states coming out.

use chrono::{DateTime, Utc};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Number of points in a complete hand skeleton
pub const LANDMARK_COUNT: usize = 21;

/// One tracked point on a hand skeleton.
///
/// `x` and `y` are normalized image coordinates in [0, 1] (origin top-left),
/// `z` is a relative depth where more negative means closer to the camera.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Landmark {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in landmark space
    pub fn distance(&self, other: &Landmark) -> f64 {
        self.as_vec3().distance(other.as_vec3())
    }

    pub fn as_vec3(&self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }
}

impl From<DVec3> for Landmark {
    fn from(v: DVec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

/// Which hand an observation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Handedness {
    #[serde(alias = "left", alias = "LEFT")]
    Left,
    #[serde(alias = "right", alias = "RIGHT")]
    Right,
}

impl Handedness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
        }
    }
}

/// A single hand reported by the landmark detector for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandObservation {
    /// Skeleton points indexed by the standard 21-point hand topology
    pub landmarks: Vec<Landmark>,
    pub handedness: Handedness,
    /// Detector confidence (0-1)
    pub confidence: f64,
}

impl HandObservation {
    pub fn new(landmarks: Vec<Landmark>, handedness: Handedness, confidence: f64) -> Self {
        Self {
            landmarks,
            handedness,
            confidence,
        }
    }

    /// Whether the skeleton carries all 21 points
    pub fn is_complete(&self) -> bool {
        self.landmarks.len() >= LANDMARK_COUNT
    }
}

/// Optional head/gaze direction reading delivered alongside hand frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GazeReading {
    /// Unit direction in camera space
    pub direction: DVec3,
    pub confidence: f64,
}

/// All hands observed in one tracking frame.
///
/// At most one observation per handedness survives construction; when the
/// detector reports two hands with the same label the more confident one wins.
/// Hands are ordered by descending confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandFrame {
    pub timestamp: DateTime<Utc>,
    pub hands: Vec<HandObservation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gaze: Option<GazeReading>,
}

impl HandFrame {
    /// Build a frame, deduplicating observations by handedness
    pub fn new(timestamp: DateTime<Utc>, observations: Vec<HandObservation>) -> Self {
        let mut sorted = observations;
        sorted.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
        });

        let mut hands: Vec<HandObservation> = Vec::with_capacity(2);
        for hand in sorted {
            if hands.iter().all(|h| h.handedness != hand.handedness) {
                hands.push(hand);
            }
        }

        Self {
            timestamp,
            hands,
            gaze: None,
        }
    }

    /// A frame with no hands detected
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            hands: Vec::new(),
            gaze: None,
        }
    }

    pub fn with_gaze(mut self, gaze: Option<GazeReading>) -> Self {
        self.gaze = gaze;
        self
    }

    pub fn hand(&self, handedness: Handedness) -> Option<&HandObservation> {
        self.hands.iter().find(|h| h.handedness == handedness)
    }
}

/// Which raw gesture triggers a click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClickMode {
    #[default]
    Pinch,
    Fist,
    Both,
}

impl ClickMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pinch => "pinch",
            Self::Fist => "fist",
            Self::Both => "both",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pinch" => Some(Self::Pinch),
            "fist" => Some(Self::Fist),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    /// Whether pinch contributes to the raw click signal
    pub fn uses_pinch(&self) -> bool {
        matches!(self, Self::Pinch | Self::Both)
    }

    /// Whether fist contributes to the raw click signal
    pub fn uses_fist(&self) -> bool {
        matches!(self, Self::Fist | Self::Both)
    }
}

/// A finger whose tip can take part in the pinch gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerType {
    Thumb,
    Index,
    Middle,
    Ring,
    Pinky,
}

impl FingerType {
    pub const ALL: [FingerType; 5] = [
        Self::Thumb,
        Self::Index,
        Self::Middle,
        Self::Ring,
        Self::Pinky,
    ];

    /// Landmark index of this finger's tip
    pub fn tip_index(&self) -> usize {
        match self {
            Self::Thumb => 4,
            Self::Index => 8,
            Self::Middle => 12,
            Self::Ring => 16,
            Self::Pinky => 20,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thumb => "thumb",
            Self::Index => "index",
            Self::Middle => "middle",
            Self::Ring => "ring",
            Self::Pinky => "pinky",
        }
    }
}

/// The two finger tips that define the pinch gesture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerSettings {
    /// Pointer finger
    pub primary: FingerType,
    /// Finger that closes onto the pointer finger
    pub secondary: FingerType,
}

impl Default for FingerSettings {
    fn default() -> Self {
        Self {
            primary: FingerType::Index,
            secondary: FingerType::Thumb,
        }
    }
}

/// Which hand should drive the pointer when two hands are visible
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryHandPreference {
    Left,
    Right,
    #[default]
    Auto,
}

impl PrimaryHandPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Auto => "auto",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Maximum number of hands the tracker is configured to report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum HandCount {
    #[default]
    One,
    Two,
}

impl HandCount {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl TryFrom<u8> for HandCount {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("unsupported hand count {other}")),
        }
    }
}

impl From<HandCount> for u8 {
    fn from(count: HandCount) -> Self {
        count.as_u8()
    }
}

/// Click gesture snapshot produced by the engine every frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClickGesture {
    /// Debounced click signal
    pub is_clicking: bool,
    /// Mirrored screen position (x, y in [0, 1]) plus derived depth in z
    pub click_position: DVec3,
    /// Smoothed click strength (0-1)
    pub click_strength: f64,
    pub click_mode: ClickMode,
    /// Normalized hand depth (0 = far, 1 = near)
    pub hand_depth: f64,
    /// Hand expansion relative to the reference span
    pub hand_scale: f64,
}

impl ClickGesture {
    /// Neutral output used when no pointer hand is available
    pub fn idle(click_mode: ClickMode) -> Self {
        Self {
            is_clicking: false,
            click_position: DVec3::new(0.5, 0.5, 0.0),
            click_strength: 0.0,
            click_mode,
            hand_depth: 0.5,
            hand_scale: 1.0,
        }
    }
}

/// State of the hover/grab state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InteractionState {
    #[default]
    Idle,
    Hover,
    Grabbing,
    Release,
}

impl InteractionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Hover => "HOVER",
            Self::Grabbing => "GRABBING",
            Self::Release => "RELEASE",
        }
    }
}
