//! Click gesture engine
//!
//! Turns each hand frame into a [`ClickGesture`]: a debounced click flag, a
//! smoothed and mirrored pointer position with a derived depth channel, and
//! a smoothed click strength. All state (smoothers, debounce bookkeeping) is
//! owned by the engine instance, so independent consumers never share it.

use crate::classifier::{
    hand_depth_with, hand_scale, is_fist_with, palm_center, DepthWeights, FistTolerance, WRIST,
};
use crate::roles::{resolve_roles, HandRoles};
use crate::settings::Settings;
use crate::smoothing::{ExponentialSmoother, Vector2Smoother};
use crate::types::{ClickGesture, ClickMode, HandFrame, Landmark};
use chrono::{DateTime, Duration, Utc};
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Pointer hands with fewer landmarks than this are treated as absent
pub const MIN_POINTER_LANDMARKS: usize = 9;

/// Tunables for the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Pointer position smoothing. Kept high: heavier smoothing lags the cursor.
    pub position_alpha: f64,
    pub strength_alpha: f64,
    pub fist_tolerance: FistTolerance,
    pub depth_weights: DepthWeights,
    /// World-space z range covered by the depth estimate (± half of this)
    pub depth_span: f64,
    /// Weight of hand scale in the z channel
    pub scale_gain: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            position_alpha: 0.8,
            strength_alpha: 0.3,
            fist_tolerance: FistTolerance::default(),
            depth_weights: DepthWeights::default(),
            depth_span: 6.0,
            scale_gain: 0.5,
        }
    }
}

/// Map depth and scale onto the z channel: near hands give negative z
pub fn depth_to_z(hand_depth: f64, hand_scale: f64, config: &EngineConfig) -> f64 {
    let base = (hand_depth - 0.5) * config.depth_span;
    let scale = (hand_scale - 1.0) * config.scale_gain;
    -(base + scale)
}

/// Edge-triggered debounce.
///
/// The click goes active once the raw signal has been continuously true for
/// the click delay, measured from its most recent rising edge. Release is
/// symmetric with the release delay. Every raw edge restarts the relevant
/// timer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClickDebouncer {
    raw: bool,
    debounced: bool,
    click_started: Option<DateTime<Utc>>,
    release_started: Option<DateTime<Utc>>,
}

impl ClickDebouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the raw signal observed at `now`, returning the debounced state
    pub fn update(
        &mut self,
        raw: bool,
        now: DateTime<Utc>,
        click_delay: Duration,
        release_delay: Duration,
    ) -> bool {
        if raw && !self.raw {
            self.click_started = Some(now);
        }
        if !raw && self.raw {
            self.release_started = Some(now);
        }
        self.raw = raw;

        if raw {
            if let Some(start) = self.click_started {
                if !self.debounced && now - start >= click_delay {
                    self.debounced = true;
                    debug!("click pressed");
                }
            }
        } else if let Some(start) = self.release_started {
            if now - start >= release_delay {
                if self.debounced {
                    debug!("click released");
                }
                self.debounced = false;
                self.click_started = None;
                self.release_started = None;
            }
        }

        self.debounced
    }

    pub fn is_active(&self) -> bool {
        self.debounced
    }

    pub fn raw(&self) -> bool {
        self.raw
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Instantaneous gesture tests for one frame, before debouncing
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RawClickSignals {
    pub pinch_distance: Option<f64>,
    pub is_pinching: bool,
    pub is_fisting: bool,
    pub is_clicking_raw: bool,
}

/// Which landmark source produced the pointer position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerSource {
    /// Pointer finger of the pointer hand while the other hand fists
    SplitHandFinger,
    /// Palm center of a single fisting hand
    PalmCenter,
    /// Wrist, when the palm center is unavailable
    Wrist,
    /// Midpoint of the two pinching finger tips
    PinchMidpoint,
    /// Pointer finger tip
    PrimaryFinger,
    /// No pointer hand
    None,
}

/// Stateful per-consumer click engine
#[derive(Debug, Clone)]
pub struct ClickGestureEngine {
    settings: Settings,
    config: EngineConfig,
    position: Vector2Smoother,
    strength: ExponentialSmoother,
    debouncer: ClickDebouncer,
    last_signals: RawClickSignals,
    last_source: PointerSource,
}

impl ClickGestureEngine {
    pub fn new(settings: Settings) -> Self {
        Self::with_config(settings, EngineConfig::default())
    }

    pub fn with_config(settings: Settings, config: EngineConfig) -> Self {
        Self {
            settings,
            position: Vector2Smoother::new(DVec2::splat(0.5), config.position_alpha),
            strength: ExponentialSmoother::new(0.0, config.strength_alpha),
            config,
            debouncer: ClickDebouncer::new(),
            last_signals: RawClickSignals::default(),
            last_source: PointerSource::None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Replace the active settings. Smoothing and debounce state carry over.
    pub fn set_settings(&mut self, settings: Settings) {
        self.settings = settings;
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Raw gesture tests from the most recent frame
    pub fn last_signals(&self) -> RawClickSignals {
        self.last_signals
    }

    pub fn last_pointer_source(&self) -> PointerSource {
        self.last_source
    }

    /// Drop all smoothing and debounce state
    pub fn reset(&mut self) {
        self.position.reset(DVec2::splat(0.5));
        self.strength.reset(0.0);
        self.debouncer.reset();
        self.last_signals = RawClickSignals::default();
        self.last_source = PointerSource::None;
    }

    /// Process one hand frame
    pub fn update(&mut self, frame: &HandFrame) -> ClickGesture {
        let settings = self.settings;
        let mode = settings.click_mode;
        let roles = resolve_roles(frame, settings.max_hands, settings.primary_hand);

        let Some(pointer) = roles
            .pointer
            .filter(|h| h.landmarks.len() >= MIN_POINTER_LANDMARKS)
        else {
            return self.idle(mode);
        };

        let fingers = settings.fingers;
        let (Some(primary_tip), Some(secondary_tip)) = (
            pointer.landmarks.get(fingers.primary.tip_index()).copied(),
            pointer.landmarks.get(fingers.secondary.tip_index()).copied(),
        ) else {
            return self.idle(mode);
        };

        let threshold = settings.calibration.pinch_threshold;
        let distance = primary_tip.distance(&secondary_tip);
        let is_pinching = distance < threshold;
        let is_fisting = roles
            .fist_hand()
            .map(|h| is_fist_with(&h.landmarks, self.config.fist_tolerance))
            .unwrap_or(false);

        let is_clicking_raw = match mode {
            ClickMode::Pinch => is_pinching,
            ClickMode::Fist => is_fisting,
            ClickMode::Both => is_pinching || is_fisting,
        };

        self.last_signals = RawClickSignals {
            pinch_distance: Some(distance),
            is_pinching,
            is_fisting,
            is_clicking_raw,
        };

        let is_clicking = self.debouncer.update(
            is_clicking_raw,
            frame.timestamp,
            settings.calibration.click_delay(),
            settings.calibration.release_delay(),
        );

        let pinch_strength = 1.0 - (distance / (threshold * 2.0)).min(1.0);
        let strength_target = match mode {
            ClickMode::Pinch if is_clicking => pinch_strength,
            ClickMode::Fist if is_clicking => 1.0,
            ClickMode::Both if is_pinching => pinch_strength,
            ClickMode::Both if is_fisting => 1.0,
            _ => 0.0,
        };
        let click_strength = self.strength.update(strength_target);

        let (raw_position, source) = self.resolve_pointer(
            &roles,
            &pointer.landmarks,
            primary_tip,
            secondary_tip,
            is_pinching,
            is_fisting,
        );
        if source != self.last_source {
            trace!(?source, "pointer source changed");
        }
        self.last_source = source;

        // Mirror x to undo the selfie-camera flip
        let mirrored = DVec2::new(1.0 - raw_position.x, raw_position.y);
        let smoothed = self.position.update(mirrored);

        let hand_depth = hand_depth_with(&pointer.landmarks, &self.config.depth_weights);
        let hand_scale = hand_scale(&pointer.landmarks);
        let z = depth_to_z(hand_depth, hand_scale, &self.config);

        ClickGesture {
            is_clicking,
            click_position: DVec3::new(smoothed.x, smoothed.y, z),
            click_strength,
            click_mode: mode,
            hand_depth,
            hand_scale,
        }
    }

    /// Pick the landmark that drives the pointer, in priority order
    fn resolve_pointer(
        &self,
        roles: &HandRoles<'_>,
        pointer_landmarks: &[Landmark],
        primary_tip: Landmark,
        secondary_tip: Landmark,
        is_pinching: bool,
        is_fisting: bool,
    ) -> (DVec2, PointerSource) {
        let mode = self.settings.click_mode;

        if is_fisting && mode.uses_fist() {
            if roles.is_split() {
                return (
                    DVec2::new(primary_tip.x, primary_tip.y),
                    PointerSource::SplitHandFinger,
                );
            }
            if let Some(center) = palm_center(pointer_landmarks) {
                return (DVec2::new(center.x, center.y), PointerSource::PalmCenter);
            }
            let wrist = pointer_landmarks[WRIST];
            return (DVec2::new(wrist.x, wrist.y), PointerSource::Wrist);
        }

        if is_pinching && mode.uses_pinch() {
            let mid = (primary_tip.as_vec3() + secondary_tip.as_vec3()) / 2.0;
            return (DVec2::new(mid.x, mid.y), PointerSource::PinchMidpoint);
        }

        (DVec2::new(primary_tip.x, primary_tip.y), PointerSource::PrimaryFinger)
    }

    fn idle(&mut self, mode: ClickMode) -> ClickGesture {
        if self.last_source != PointerSource::None || self.debouncer.is_active() {
            debug!("pointer hand lost, resetting click engine");
        }
        self.reset();
        ClickGesture::idle(mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::ClickCalibration;
    use crate::classifier::fixtures::{fist_hand, observation, open_hand, pinch_hand, translate};
    use crate::classifier::INDEX_TIP;
    use crate::types::{HandCount, Handedness, PrimaryHandPreference};
    use chrono::TimeZone;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn settings(mode: ClickMode) -> Settings {
        Settings {
            click_mode: mode,
            calibration: ClickCalibration::defaults_at(ts(0)),
            ..Settings::default()
        }
    }

    fn one_hand(ms: i64, landmarks: Vec<Landmark>) -> HandFrame {
        HandFrame::new(ts(ms), vec![observation(landmarks, Handedness::Right, 0.9)])
    }

    fn ms(n: i64) -> Duration {
        Duration::milliseconds(n)
    }

    #[test]
    fn test_debounce_short_pulse_never_trips() {
        let mut d = ClickDebouncer::new();
        for t in 0..100 {
            assert!(!d.update(true, ts(t), ms(100), ms(150)));
        }
        for t in 100..400 {
            assert!(!d.update(false, ts(t), ms(100), ms(150)));
        }
    }

    #[test]
    fn test_debounce_trips_exactly_once() {
        let mut d = ClickDebouncer::new();
        let mut rising = 0;
        let mut previous = false;
        for t in 0..=101 {
            let active = d.update(true, ts(t), ms(100), ms(150));
            if active && !previous {
                rising += 1;
                assert_eq!(t, 100);
            }
            previous = active;
        }
        assert_eq!(rising, 1);
    }

    #[test]
    fn test_debounce_release_waits_for_release_delay() {
        let mut d = ClickDebouncer::new();
        d.update(true, ts(0), ms(100), ms(150));
        assert!(d.update(true, ts(100), ms(100), ms(150)));

        assert!(d.update(false, ts(110), ms(100), ms(150)));
        assert!(d.update(false, ts(259), ms(100), ms(150)));
        assert!(!d.update(false, ts(260), ms(100), ms(150)));
    }

    #[test]
    fn test_debounce_flicker_during_release_keeps_click() {
        let mut d = ClickDebouncer::new();
        d.update(true, ts(0), ms(100), ms(150));
        d.update(true, ts(100), ms(100), ms(150));
        d.update(false, ts(120), ms(100), ms(150));
        // Raw comes back before the release delay elapses
        assert!(d.update(true, ts(200), ms(100), ms(150)));
        assert!(d.update(true, ts(400), ms(100), ms(150)));
    }

    #[test]
    fn test_debounce_timer_restarts_on_every_edge() {
        let mut d = ClickDebouncer::new();
        d.update(true, ts(0), ms(100), ms(150));
        d.update(false, ts(60), ms(100), ms(150));
        d.update(true, ts(70), ms(100), ms(150));
        // 100ms since the first edge, but only 60ms since the latest one
        assert!(!d.update(true, ts(130), ms(100), ms(150)));
        assert!(d.update(true, ts(170), ms(100), ms(150)));
    }

    #[test]
    fn test_pinch_scenario_clicks_at_100ms() {
        let mut engine = ClickGestureEngine::new(settings(ClickMode::Pinch));
        let hand = pinch_hand(0.03, 0.0);

        for t in (0..=150).step_by(10) {
            let gesture = engine.update(&one_hand(t, hand.clone()));
            assert!(engine.last_signals().is_pinching);
            assert_eq!(gesture.is_clicking, t >= 100, "at {t}ms");
        }
    }

    #[test]
    fn test_open_hand_does_not_click() {
        let mut engine = ClickGestureEngine::new(settings(ClickMode::Both));
        for t in (0..500).step_by(33) {
            let gesture = engine.update(&one_hand(t, open_hand(0.0)));
            assert!(!gesture.is_clicking);
        }
        assert_eq!(engine.last_pointer_source(), PointerSource::PrimaryFinger);
    }

    #[test]
    fn test_fist_mode_clicks_and_uses_palm_center() {
        let mut engine = ClickGestureEngine::with_config(
            settings(ClickMode::Fist),
            EngineConfig {
                position_alpha: 1.0,
                ..EngineConfig::default()
            },
        );
        let mut last = ClickGesture::idle(ClickMode::Fist);
        for t in (0..=200).step_by(20) {
            last = engine.update(&one_hand(t, fist_hand(0.0)));
        }
        assert!(last.is_clicking);
        assert_eq!(engine.last_pointer_source(), PointerSource::PalmCenter);

        let center = palm_center(&fist_hand(0.0)).unwrap();
        assert!((last.click_position.x - (1.0 - center.x)).abs() < 1e-9);
        assert!((last.click_position.y - center.y).abs() < 1e-9);
    }

    #[test]
    fn test_pinch_position_is_mirrored_midpoint() {
        let mut engine = ClickGestureEngine::with_config(
            settings(ClickMode::Pinch),
            EngineConfig {
                position_alpha: 1.0,
                ..EngineConfig::default()
            },
        );
        let hand = pinch_hand(0.03, 0.0);
        let gesture = engine.update(&one_hand(0, hand.clone()));
        let mid_x = (hand[4].x + hand[8].x) / 2.0;
        assert_eq!(engine.last_pointer_source(), PointerSource::PinchMidpoint);
        assert!((gesture.click_position.x - (1.0 - mid_x)).abs() < 1e-9);
    }

    #[test]
    fn test_two_hand_split_points_with_pointer_finger() {
        let mut s = settings(ClickMode::Both);
        s.max_hands = HandCount::Two;
        s.primary_hand = PrimaryHandPreference::Left;
        let mut engine = ClickGestureEngine::with_config(
            s,
            EngineConfig {
                position_alpha: 1.0,
                ..EngineConfig::default()
            },
        );

        let left = translate(&open_hand(0.0), -0.2, 0.0);
        let right = fist_hand(0.0);
        let frame = HandFrame::new(
            ts(0),
            vec![
                observation(right, Handedness::Right, 0.95),
                observation(left.clone(), Handedness::Left, 0.9),
            ],
        );

        let gesture = engine.update(&frame);
        assert!(engine.last_signals().is_fisting);
        assert_eq!(engine.last_pointer_source(), PointerSource::SplitHandFinger);
        assert!((gesture.click_position.x - (1.0 - left[INDEX_TIP].x)).abs() < 1e-9);
        assert!((gesture.click_position.y - left[INDEX_TIP].y).abs() < 1e-9);
    }

    #[test]
    fn test_two_hand_split_fist_on_pointer_hand_is_ignored() {
        let mut s = settings(ClickMode::Both);
        s.max_hands = HandCount::Two;
        s.primary_hand = PrimaryHandPreference::Left;
        let mut engine = ClickGestureEngine::new(s);

        // Pointer (left) hand fists, click (right) hand stays open
        let frame = HandFrame::new(
            ts(0),
            vec![
                observation(fist_hand(0.0), Handedness::Left, 0.9),
                observation(translate(&open_hand(0.0), 0.2, 0.0), Handedness::Right, 0.8),
            ],
        );
        engine.update(&frame);
        assert!(!engine.last_signals().is_fisting);
        assert_ne!(engine.last_pointer_source(), PointerSource::PalmCenter);
    }

    #[test]
    fn test_lost_hand_resets_to_neutral() {
        let mut engine = ClickGestureEngine::new(settings(ClickMode::Pinch));
        for t in (0..=200).step_by(20) {
            engine.update(&one_hand(t, pinch_hand(0.01, 0.0)));
        }
        assert!(engine.update(&one_hand(220, pinch_hand(0.01, 0.0))).is_clicking);

        let gesture = engine.update(&HandFrame::empty(ts(240)));
        assert_eq!(gesture, ClickGesture::idle(ClickMode::Pinch));

        // Smoothers restart from neutral, not from the old hand
        let mut fresh = ClickGestureEngine::new(settings(ClickMode::Pinch));
        let a = engine.update(&one_hand(260, open_hand(0.0)));
        let b = fresh.update(&one_hand(260, open_hand(0.0)));
        assert_eq!(a, b);
    }

    #[test]
    fn test_short_pointer_hand_is_absent() {
        let mut engine = ClickGestureEngine::new(settings(ClickMode::Pinch));
        let short = open_hand(0.0)[..8].to_vec();
        let gesture = engine.update(&one_hand(0, short));
        assert_eq!(gesture, ClickGesture::idle(ClickMode::Pinch));
    }

    #[test]
    fn test_strength_decays_after_release() {
        let mut engine = ClickGestureEngine::new(settings(ClickMode::Pinch));
        let mut peak = 0.0;
        for t in (0..=300).step_by(20) {
            peak = engine.update(&one_hand(t, pinch_hand(0.01, 0.0))).click_strength;
        }
        assert!(peak > 0.5);
        let mut strength = peak;
        for t in (320..=1000).step_by(20) {
            strength = engine.update(&one_hand(t, open_hand(0.0))).click_strength;
        }
        assert!(strength < 0.01);
    }

    #[test]
    fn test_depth_to_z_mapping() {
        let config = EngineConfig::default();
        assert_eq!(depth_to_z(0.5, 1.0, &config), 0.0);
        assert!((depth_to_z(1.0, 1.0, &config) + 3.0).abs() < 1e-12);
        assert!((depth_to_z(0.0, 1.0, &config) - 3.0).abs() < 1e-12);
        assert!((depth_to_z(0.5, 2.0, &config) + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_engines_do_not_share_state() {
        let mut a = ClickGestureEngine::new(settings(ClickMode::Pinch));
        let mut b = ClickGestureEngine::new(settings(ClickMode::Pinch));
        for t in (0..=200).step_by(20) {
            a.update(&one_hand(t, pinch_hand(0.01, 0.0)));
        }
        let gesture = b.update(&HandFrame::empty(ts(200)));
        assert!(!gesture.is_clicking);
        assert!(a.update(&one_hand(220, pinch_hand(0.01, 0.0))).is_clicking);
    }
}
