//! Click calibration
//!
//! A calibration run samples the user's own gesture while the debounced click
//! is active and derives personalized thresholds from the sample mean. The
//! resulting record is persisted through the settings store; until one
//! exists the engine runs on the built-in defaults.

use crate::classifier::{count_extended_fingers, pinch_distance};
use crate::types::{ClickGesture, ClickMode, FingerSettings, HandFrame};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};
use uuid::Uuid;

/// Default pinch threshold in normalized landmark units
pub const DEFAULT_PINCH_THRESHOLD: f64 = 0.05;
/// Default number of extended fingers tolerated in a fist
pub const DEFAULT_FIST_THRESHOLD: f64 = 0.0;
/// Raw signal must hold this long before a click registers
pub const DEFAULT_CLICK_DELAY_MS: u64 = 100;
/// Release holds longer than press to suppress flicker
pub const DEFAULT_RELEASE_DELAY_MS: u64 = 150;

pub const PINCH_THRESHOLD_RANGE: (f64, f64) = (0.01, 0.2);
pub const FIST_THRESHOLD_RANGE: (f64, f64) = (0.0, 5.0);

/// Samples kept per calibration run
pub const CALIBRATION_SAMPLE_LIMIT: usize = 20;

/// Pinch samples wider than this are not a pinch and are ignored
const PINCH_SAMPLE_CEILING: f64 = 0.1;

/// Longer stored delays are clamped to this
pub const MAX_DELAY_MS: u64 = 60_000;

/// Persisted click thresholds and debounce timing.
///
/// The timestamp is kept at millisecond precision, the resolution it is
/// stored with. Decoding is lenient: see [`StoredCalibration`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredCalibration")]
pub struct ClickCalibration {
    pub pinch_threshold: f64,
    pub fist_threshold: f64,
    /// Milliseconds
    pub click_delay: u64,
    /// Milliseconds
    pub release_delay: u64,
    #[serde(serialize_with = "chrono::serde::ts_milliseconds::serialize")]
    pub timestamp: DateTime<Utc>,
}

/// Wire form of a stored calibration.
///
/// Every field is optional and numeric fields accept any JSON number, so one
/// bad field falls back on its own instead of discarding the whole record.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCalibration {
    #[serde(default)]
    pub pinch_threshold: Option<f64>,
    #[serde(default)]
    pub fist_threshold: Option<f64>,
    #[serde(default)]
    pub click_delay: Option<f64>,
    #[serde(default)]
    pub release_delay: Option<f64>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<StoredCalibration> for ClickCalibration {
    fn from(stored: StoredCalibration) -> Self {
        let delay = |value: Option<f64>, default: u64| match value {
            Some(ms) if ms.is_finite() && ms > 0.0 => ms.round().min(MAX_DELAY_MS as f64) as u64,
            _ => default,
        };

        Self {
            pinch_threshold: stored.pinch_threshold.unwrap_or(DEFAULT_PINCH_THRESHOLD),
            fist_threshold: stored.fist_threshold.unwrap_or(DEFAULT_FIST_THRESHOLD),
            click_delay: delay(stored.click_delay, DEFAULT_CLICK_DELAY_MS),
            release_delay: delay(stored.release_delay, DEFAULT_RELEASE_DELAY_MS),
            timestamp: stored.timestamp.unwrap_or_else(Utc::now),
        }
        .sanitized()
    }
}

impl Default for ClickCalibration {
    fn default() -> Self {
        Self::defaults_at(Utc::now())
    }
}

impl ClickCalibration {
    /// Built-in defaults stamped with `timestamp`
    pub fn defaults_at(timestamp: DateTime<Utc>) -> Self {
        Self {
            pinch_threshold: DEFAULT_PINCH_THRESHOLD,
            fist_threshold: DEFAULT_FIST_THRESHOLD,
            click_delay: DEFAULT_CLICK_DELAY_MS,
            release_delay: DEFAULT_RELEASE_DELAY_MS,
            timestamp: timestamp.trunc_subsecs(3),
        }
    }

    /// Force every field into its safe range.
    ///
    /// Non-finite thresholds and zero delays fall back to the defaults.
    /// Finite thresholds and long delays are clamped.
    pub fn sanitized(self) -> Self {
        let pinch_threshold = if self.pinch_threshold.is_finite() {
            self.pinch_threshold
                .clamp(PINCH_THRESHOLD_RANGE.0, PINCH_THRESHOLD_RANGE.1)
        } else {
            DEFAULT_PINCH_THRESHOLD
        };

        let fist_threshold = if self.fist_threshold.is_finite() {
            self.fist_threshold
                .clamp(FIST_THRESHOLD_RANGE.0, FIST_THRESHOLD_RANGE.1)
        } else {
            DEFAULT_FIST_THRESHOLD
        };

        let delay_or = |value: u64, default: u64| {
            if value == 0 {
                default
            } else {
                value.min(MAX_DELAY_MS)
            }
        };

        Self {
            pinch_threshold,
            fist_threshold,
            click_delay: delay_or(self.click_delay, DEFAULT_CLICK_DELAY_MS),
            release_delay: delay_or(self.release_delay, DEFAULT_RELEASE_DELAY_MS),
            timestamp: self.timestamp.trunc_subsecs(3),
        }
    }

    pub fn click_delay(&self) -> Duration {
        Duration::milliseconds(self.click_delay as i64)
    }

    pub fn release_delay(&self) -> Duration {
        Duration::milliseconds(self.release_delay as i64)
    }

    /// Whether thresholds and delays equal the built-in defaults
    pub fn is_default(&self) -> bool {
        self.pinch_threshold == DEFAULT_PINCH_THRESHOLD
            && self.fist_threshold == DEFAULT_FIST_THRESHOLD
            && self.click_delay == DEFAULT_CLICK_DELAY_MS
            && self.release_delay == DEFAULT_RELEASE_DELAY_MS
    }
}

/// Which gesture a calibration run samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStep {
    Pinch,
    Fist,
}

/// One in-flight calibration run
#[derive(Debug, Clone)]
pub struct CalibrationSession {
    id: Uuid,
    step: CalibrationStep,
    fingers: FingerSettings,
    base: ClickCalibration,
    pinch_samples: VecDeque<f64>,
    fist_samples: VecDeque<u8>,
    limit: usize,
}

impl CalibrationSession {
    /// Start a run. Fist mode samples the fist; pinch and both sample the
    /// distance between the configured `fingers`.
    pub fn start(mode: ClickMode, fingers: FingerSettings, current: ClickCalibration) -> Self {
        let step = match mode {
            ClickMode::Fist => CalibrationStep::Fist,
            ClickMode::Pinch | ClickMode::Both => CalibrationStep::Pinch,
        };
        let id = Uuid::new_v4();
        info!(session = %id, ?step, "calibration started");

        Self {
            id,
            step,
            fingers,
            base: current,
            pinch_samples: VecDeque::with_capacity(CALIBRATION_SAMPLE_LIMIT),
            fist_samples: VecDeque::with_capacity(CALIBRATION_SAMPLE_LIMIT),
            limit: CALIBRATION_SAMPLE_LIMIT,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn step(&self) -> CalibrationStep {
        self.step
    }

    pub fn sample_count(&self) -> usize {
        match self.step {
            CalibrationStep::Pinch => self.pinch_samples.len(),
            CalibrationStep::Fist => self.fist_samples.len(),
        }
    }

    /// Whether the sample window is full
    pub fn is_ready(&self) -> bool {
        self.sample_count() >= self.limit
    }

    /// Offer one frame. Samples are only taken while the debounced click is
    /// active, so the user is confidently holding the gesture. Returns
    /// whether a sample was recorded.
    pub fn observe(&mut self, frame: &HandFrame, gesture: &ClickGesture) -> bool {
        if !gesture.is_clicking {
            return false;
        }
        let Some(hand) = frame.hands.first() else {
            return false;
        };
        if !hand.is_complete() {
            return false;
        }

        match self.step {
            CalibrationStep::Pinch => {
                let Some(distance) =
                    pinch_distance(&hand.landmarks, self.fingers.primary, self.fingers.secondary)
                else {
                    return false;
                };
                if distance >= PINCH_SAMPLE_CEILING {
                    return false;
                }
                push_bounded(&mut self.pinch_samples, distance, self.limit);
            }
            CalibrationStep::Fist => {
                let extended = count_extended_fingers(&hand.landmarks);
                if extended != 0 {
                    return false;
                }
                push_bounded(&mut self.fist_samples, extended, self.limit);
            }
        }

        debug!(session = %self.id, samples = self.sample_count(), "calibration sample");
        true
    }

    /// Finish the run and derive the new calibration.
    ///
    /// Thresholds without samples keep their previous value. Delays are reset
    /// to the defaults.
    pub fn finish(self, now: DateTime<Utc>) -> ClickCalibration {
        let pinch_threshold = mean(self.pinch_samples.iter().copied())
            .unwrap_or(self.base.pinch_threshold);
        let fist_threshold = mean(self.fist_samples.iter().map(|&n| n as f64))
            .map(f64::round)
            .unwrap_or(self.base.fist_threshold);

        let calibration = ClickCalibration {
            pinch_threshold,
            fist_threshold,
            click_delay: DEFAULT_CLICK_DELAY_MS,
            release_delay: DEFAULT_RELEASE_DELAY_MS,
            timestamp: now,
        }
        .sanitized();

        info!(
            session = %self.id,
            pinch_threshold = calibration.pinch_threshold,
            fist_threshold = calibration.fist_threshold,
            "calibration finished"
        );
        calibration
    }
}

fn push_bounded<T>(queue: &mut VecDeque<T>, value: T, limit: usize) {
    queue.push_back(value);
    while queue.len() > limit {
        queue.pop_front();
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
