//! Geometric hand classifiers
//!
//! Pure functions over a 21-point hand skeleton (wrist = 0, thumb 1-4,
//! index 5-8, middle 9-12, ring 13-16, pinky 17-20). Every classifier
//! tolerates short landmark arrays and returns a safe default instead of
//! failing: `false` for boolean tests, 0.5 for depth, 1.0 for scale.

use crate::types::{FingerType, Handedness, Landmark, LANDMARK_COUNT};
use serde::{Deserialize, Serialize};

pub const WRIST: usize = 0;
pub const THUMB_CMC: usize = 1;
pub const THUMB_MCP: usize = 2;
pub const THUMB_IP: usize = 3;
pub const THUMB_TIP: usize = 4;
pub const INDEX_MCP: usize = 5;
pub const INDEX_PIP: usize = 6;
pub const INDEX_DIP: usize = 7;
pub const INDEX_TIP: usize = 8;
pub const MIDDLE_MCP: usize = 9;
pub const MIDDLE_PIP: usize = 10;
pub const MIDDLE_DIP: usize = 11;
pub const MIDDLE_TIP: usize = 12;
pub const RING_MCP: usize = 13;
pub const RING_PIP: usize = 14;
pub const RING_DIP: usize = 15;
pub const RING_TIP: usize = 16;
pub const PINKY_MCP: usize = 17;
pub const PINKY_PIP: usize = 18;
pub const PINKY_DIP: usize = 19;
pub const PINKY_TIP: usize = 20;

/// Thumb straightness ratio: tip-to-IP must exceed this fraction of IP-to-MCP
const THUMB_STRAIGHTNESS: f64 = 0.8;

/// Empirical wrist-to-middle-tip span of a hand at a typical working distance
pub const REFERENCE_HAND_SPAN: f64 = 0.225;

/// Depth returned when the skeleton is incomplete
pub const DEFAULT_HAND_DEPTH: f64 = 0.5;

/// Scale returned when the skeleton is incomplete
pub const DEFAULT_HAND_SCALE: f64 = 1.0;

/// Image-space "up" test: the tip sits above its PIP joint
pub fn is_tip_above_pip(tip: &Landmark, pip: &Landmark) -> bool {
    tip.y < pip.y
}

/// Thumb extension test.
///
/// The thumb does not fold along the image y axis, so it is judged by radial
/// extension (tip further from the wrist than the IP joint) combined with
/// joint straightness.
pub fn is_thumb_extended(landmarks: &[Landmark]) -> bool {
    if landmarks.len() < LANDMARK_COUNT {
        return false;
    }

    let tip = &landmarks[THUMB_TIP];
    let ip = &landmarks[THUMB_IP];
    let mcp = &landmarks[THUMB_MCP];
    let wrist = &landmarks[WRIST];

    let tip_to_wrist = tip.distance(wrist);
    let ip_to_wrist = ip.distance(wrist);
    let tip_to_ip = tip.distance(ip);
    let ip_to_mcp = ip.distance(mcp);

    tip_to_wrist > ip_to_wrist && tip_to_ip > ip_to_mcp * THUMB_STRAIGHTNESS
}

/// Extension test for any finger, dispatching to the thumb rule where needed
pub fn is_finger_extended(landmarks: &[Landmark], finger: FingerType) -> bool {
    if landmarks.len() < LANDMARK_COUNT {
        return false;
    }

    let (tip, pip) = match finger {
        FingerType::Thumb => return is_thumb_extended(landmarks),
        FingerType::Index => (INDEX_TIP, INDEX_PIP),
        FingerType::Middle => (MIDDLE_TIP, MIDDLE_PIP),
        FingerType::Ring => (RING_TIP, RING_PIP),
        FingerType::Pinky => (PINKY_TIP, PINKY_PIP),
    };

    is_tip_above_pip(&landmarks[tip], &landmarks[pip])
}

/// Per-finger extension for one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FingerStatus {
    pub thumb: bool,
    pub index: bool,
    pub middle: bool,
    pub ring: bool,
    pub pinky: bool,
    /// Number of extended fingers (0-5)
    pub total: u8,
}

impl FingerStatus {
    pub fn closed(&self) -> u8 {
        5 - self.total
    }
}

/// Evaluate all five fingers
pub fn finger_status(landmarks: &[Landmark]) -> FingerStatus {
    if landmarks.len() < LANDMARK_COUNT {
        return FingerStatus::default();
    }

    let thumb = is_finger_extended(landmarks, FingerType::Thumb);
    let index = is_finger_extended(landmarks, FingerType::Index);
    let middle = is_finger_extended(landmarks, FingerType::Middle);
    let ring = is_finger_extended(landmarks, FingerType::Ring);
    let pinky = is_finger_extended(landmarks, FingerType::Pinky);

    let total = [thumb, index, middle, ring, pinky]
        .iter()
        .filter(|&&e| e)
        .count() as u8;

    FingerStatus {
        thumb,
        index,
        middle,
        ring,
        pinky,
        total,
    }
}

pub fn count_extended_fingers(landmarks: &[Landmark]) -> u8 {
    finger_status(landmarks).total
}

/// Tolerant fist rule.
///
/// A hand is a fist when every finger is closed, or when at least
/// `min_closed` fingers are closed and no more than `max_extended` are
/// extended. The second clause absorbs the ambiguous thumb. Both numbers were
/// tuned by hand and should be rechecked against real hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FistTolerance {
    pub min_closed: u8,
    pub max_extended: u8,
}

impl Default for FistTolerance {
    fn default() -> Self {
        Self {
            min_closed: 4,
            max_extended: 1,
        }
    }
}

pub fn is_fist(landmarks: &[Landmark]) -> bool {
    is_fist_with(landmarks, FistTolerance::default())
}

pub fn is_fist_with(landmarks: &[Landmark], tolerance: FistTolerance) -> bool {
    if landmarks.len() < LANDMARK_COUNT {
        return false;
    }

    let status = finger_status(landmarks);
    let closed = status.closed();

    let strict = closed == 5;
    let lenient = closed >= tolerance.min_closed && status.total <= tolerance.max_extended;

    strict || lenient
}

/// Mean of the four non-thumb MCP joints
pub fn palm_center(landmarks: &[Landmark]) -> Option<Landmark> {
    if landmarks.len() < LANDMARK_COUNT {
        return None;
    }

    let sum = [INDEX_MCP, MIDDLE_MCP, RING_MCP, PINKY_MCP]
        .iter()
        .map(|&i| landmarks[i].as_vec3())
        .sum::<glam::DVec3>();

    Some(Landmark::from(sum / 4.0))
}

/// Distance between two finger tips, or `None` if either tip is missing
pub fn pinch_distance(landmarks: &[Landmark], a: FingerType, b: FingerType) -> Option<f64> {
    let tip_a = landmarks.get(a.tip_index())?;
    let tip_b = landmarks.get(b.tip_index())?;
    Some(tip_a.distance(tip_b))
}

/// Weights and normalization ranges for the depth blend.
///
/// Landmark z alone is noisy, so apparent hand span and palm width
/// cross-check it. The 50/30/20 split and the ranges are empirical.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthWeights {
    pub z: f64,
    pub span: f64,
    pub width: f64,
    /// Mean landmark z mapped onto [0, 1] (inverted: negative = near)
    pub z_range: (f64, f64),
    /// Wrist-to-middle-tip span range
    pub span_range: (f64, f64),
    /// Index-MCP-to-pinky-MCP width range
    pub width_range: (f64, f64),
}

impl Default for DepthWeights {
    fn default() -> Self {
        Self {
            z: 0.5,
            span: 0.3,
            width: 0.2,
            z_range: (-0.1, 0.1),
            span_range: (0.1, 0.3),
            width_range: (0.05, 0.15),
        }
    }
}

fn normalize_clamped(value: f64, (min, max): (f64, f64)) -> f64 {
    ((value - min) / (max - min)).clamp(0.0, 1.0)
}

/// Normalized depth estimate: 0 = far, 1 = near
pub fn hand_depth(landmarks: &[Landmark]) -> f64 {
    hand_depth_with(landmarks, &DepthWeights::default())
}

pub fn hand_depth_with(landmarks: &[Landmark], weights: &DepthWeights) -> f64 {
    if landmarks.len() < LANDMARK_COUNT {
        return DEFAULT_HAND_DEPTH;
    }

    let span = landmarks[WRIST].distance(&landmarks[MIDDLE_TIP]);
    let width = landmarks[INDEX_MCP].distance(&landmarks[PINKY_MCP]);
    let mean_z = landmarks.iter().map(|l| l.z).sum::<f64>() / landmarks.len() as f64;

    let norm_span = normalize_clamped(span, weights.span_range);
    let norm_width = normalize_clamped(width, weights.width_range);
    // Negated so that closer (more negative z) maps towards 1
    let (z_min, z_max) = weights.z_range;
    let norm_z = normalize_clamped(-mean_z, (-z_max, -z_min));

    let depth = norm_z * weights.z + norm_span * weights.span + norm_width * weights.width;
    depth.clamp(0.0, 1.0)
}

/// Hand expansion relative to [`REFERENCE_HAND_SPAN`], clamped to [0.5, 2.0]
pub fn hand_scale(landmarks: &[Landmark]) -> f64 {
    if landmarks.len() < LANDMARK_COUNT {
        return DEFAULT_HAND_SCALE;
    }

    let span = landmarks[WRIST].distance(&landmarks[MIDDLE_TIP]);
    (span / REFERENCE_HAND_SPAN).clamp(0.5, 2.0)
}

/// Handedness implied by which side of the palm the thumb sits on.
///
/// In raw (unmirrored) camera coordinates a left hand's thumb lies to the
/// right of the palm midline.
pub fn thumb_side_handedness(landmarks: &[Landmark]) -> Option<Handedness> {
    if landmarks.len() < LANDMARK_COUNT {
        return None;
    }

    let palm_mid_x = (landmarks[INDEX_MCP].x + landmarks[PINKY_MCP].x) / 2.0;
    if landmarks[THUMB_TIP].x > palm_mid_x {
        Some(Handedness::Left)
    } else {
        Some(Handedness::Right)
    }
}
