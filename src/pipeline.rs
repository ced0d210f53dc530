//! Pipeline orchestration
//!
//! This module provides the public API for handgrab. Two independent drivers
//! feed [`InteractionProcessor`]: landmark frames (classifiers, role
//! resolution and the click engine) and render ticks (hover, grab and
//! release against the scene). A tick always uses the most recent gesture,
//! however many ticks ago it was produced.

use crate::calibration::{CalibrationSession, ClickCalibration};
use crate::classifier::{finger_status, FingerStatus};
use crate::click::{ClickGestureEngine, EngineConfig, PointerSource, RawClickSignals};
use crate::error::InteractionError;
use crate::gaze::{GazeConfig, GazeRay, GazeTracker};
use crate::grab::{GrabConfig, GrabController};
use crate::scene::{InteractionScene, ObjectId};
use crate::schema::FrameAdapter;
use crate::settings::{Settings, SettingsStore};
use crate::types::{ClickGesture, GazeReading, HandFrame, InteractionState};
use chrono::{DateTime, Duration, Utc};
use glam::DVec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Replay NDJSON detector records against a scene.
///
/// Each frame is followed by `ticks_per_frame` render ticks spread evenly up
/// to the next frame's timestamp.
///
/// # Returns
/// One JSON line per replay step
///
/// # Example
/// ```ignore
/// let mut scene = BoxScene::from_description(&description);
/// let lines = replay_ndjson(&ndjson, &mut scene, Settings::default(), 2)?;
/// ```
pub fn replay_ndjson(
    ndjson: &str,
    scene: &mut dyn InteractionScene,
    settings: Settings,
    ticks_per_frame: u32,
) -> Result<Vec<String>, InteractionError> {
    let records = FrameAdapter::parse_ndjson(ndjson)?;
    let frames = FrameAdapter::new().to_hand_frames(&records)?;

    let mut processor = InteractionProcessor::new(settings);
    processor
        .replay(&frames, scene, ticks_per_frame)
        .iter()
        .map(|step| serde_json::to_string(step).map_err(InteractionError::from))
        .collect()
}

/// What the frame driver produced for one hand frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameSnapshot {
    pub timestamp: DateTime<Utc>,
    pub hands: usize,
    pub gesture: ClickGesture,
    pub signals: RawClickSignals,
    pub pointer_source: PointerSource,
    /// Extension of the most confident hand's fingers
    pub finger_status: FingerStatus,
}

/// What the render driver produced for one tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TickSnapshot {
    pub timestamp: DateTime<Utc>,
    pub state: InteractionState,
    pub hovered: Option<ObjectId>,
    pub grabbed: Option<ObjectId>,
    pub object_position: Option<DVec3>,
    pub gaze: Option<GazeRay>,
}

/// A frame and the render ticks that followed it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayStep {
    pub frame: FrameSnapshot,
    pub ticks: Vec<TickSnapshot>,
}

/// Stateful interaction core for one hand source and one scene
#[derive(Debug, Clone)]
pub struct InteractionProcessor {
    settings: Settings,
    engine: ClickGestureEngine,
    grab: GrabController,
    gaze: GazeTracker,
    gesture: ClickGesture,
    gaze_reading: Option<GazeReading>,
    calibration: Option<CalibrationSession>,
}

impl Default for InteractionProcessor {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl InteractionProcessor {
    pub fn new(settings: Settings) -> Self {
        Self::with_configs(
            settings,
            EngineConfig::default(),
            GrabConfig::default(),
            GazeConfig::default(),
        )
    }

    pub fn with_configs(
        settings: Settings,
        engine: EngineConfig,
        grab: GrabConfig,
        gaze: GazeConfig,
    ) -> Self {
        Self {
            settings,
            engine: ClickGestureEngine::with_config(settings, engine),
            grab: GrabController::with_config(grab),
            gaze: GazeTracker::new(gaze),
            gesture: ClickGesture::idle(settings.click_mode),
            gaze_reading: None,
            calibration: None,
        }
    }

    /// Create a processor from persisted settings
    pub fn from_store(store: &dyn SettingsStore) -> Self {
        Self::new(Settings::load(store))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Load settings from JSON. Out-of-range values are recovered the same
    /// way the settings store recovers them.
    pub fn load_settings(&mut self, json: &str, scene: &mut dyn InteractionScene) -> Result<(), InteractionError> {
        let settings: Settings = serde_json::from_str(json)?;
        self.apply_settings(settings.sanitized(), scene);
        Ok(())
    }

    /// Save settings to JSON
    pub fn save_settings(&self) -> Result<String, InteractionError> {
        Ok(serde_json::to_string(&self.settings)?)
    }

    /// Latest gesture from the frame driver
    pub fn gesture(&self) -> ClickGesture {
        self.gesture
    }

    pub fn state(&self) -> InteractionState {
        self.grab.state()
    }

    pub fn grab(&self) -> &GrabController {
        &self.grab
    }

    pub fn engine(&self) -> &ClickGestureEngine {
        &self.engine
    }

    pub fn set_gaze_enabled(&mut self, enabled: bool) {
        self.gaze.set_enabled(enabled);
    }

    /// Frame driver: classify one hand frame and update the click gesture
    pub fn process_frame(&mut self, frame: &HandFrame) -> FrameSnapshot {
        self.gesture = self.engine.update(frame);
        self.gaze_reading = frame.gaze;

        if let Some(session) = self.calibration.as_mut() {
            session.observe(frame, &self.gesture);
        }

        FrameSnapshot {
            timestamp: frame.timestamp,
            hands: frame.hands.len(),
            gesture: self.gesture,
            signals: self.engine.last_signals(),
            pointer_source: self.engine.last_pointer_source(),
            finger_status: frame
                .hands
                .first()
                .map(|h| finger_status(&h.landmarks))
                .unwrap_or_default(),
        }
    }

    /// Render driver: hover, grab and release against the scene
    pub fn tick(&mut self, scene: &mut dyn InteractionScene, now: DateTime<Utc>) -> TickSnapshot {
        let grab = self.grab.tick(&self.gesture, scene, now);
        let gaze = self.gaze.update(self.gaze_reading.as_ref(), scene.camera());

        TickSnapshot {
            timestamp: now,
            state: grab.state,
            hovered: grab.hovered,
            grabbed: grab.grabbed,
            object_position: grab.object_position,
            gaze,
        }
    }

    /// Run frames and interleaved ticks in timestamp order
    pub fn replay(
        &mut self,
        frames: &[HandFrame],
        scene: &mut dyn InteractionScene,
        ticks_per_frame: u32,
    ) -> Vec<ReplayStep> {
        let ticks_per_frame = ticks_per_frame.max(1);
        let mut steps = Vec::with_capacity(frames.len());

        for (idx, frame) in frames.iter().enumerate() {
            let snapshot = self.process_frame(frame);
            let span = frames
                .get(idx + 1)
                .map(|next| next.timestamp - frame.timestamp)
                .unwrap_or_else(Duration::zero);

            let ticks = (0..ticks_per_frame)
                .map(|i| {
                    let offset = span * i as i32 / ticks_per_frame as i32;
                    self.tick(scene, frame.timestamp + offset)
                })
                .collect();

            steps.push(ReplayStep {
                frame: snapshot,
                ticks,
            });
        }
        steps
    }

    /// Replace the active settings.
    ///
    /// A hand-count change tears the hand source down: every smoother,
    /// debounce timer and grab session is dropped.
    pub fn apply_settings(&mut self, settings: Settings, scene: &mut dyn InteractionScene) {
        let hands_changed = settings.max_hands != self.settings.max_hands;
        self.settings = settings;
        self.engine.set_settings(settings);
        if hands_changed {
            info!(max_hands = settings.max_hands.as_u8(), "hand count changed, resetting");
            self.reset(scene);
        }
    }

    /// Return everything to its initial state, releasing any held object
    pub fn reset(&mut self, scene: &mut dyn InteractionScene) {
        self.engine.reset();
        self.grab.reset(scene);
        self.gaze.reset();
        self.gesture = ClickGesture::idle(self.settings.click_mode);
        self.gaze_reading = None;
        if self.calibration.take().is_some() {
            debug!("calibration cancelled by reset");
        }
    }

    /// Forget an object removed from the scene registry
    pub fn object_removed(&mut self, object: ObjectId) {
        self.grab.forget_object(object);
    }

    pub fn start_calibration(&mut self) -> &CalibrationSession {
        let session = CalibrationSession::start(
            self.settings.click_mode,
            self.settings.fingers,
            self.settings.calibration,
        );
        self.calibration.insert(session)
    }

    pub fn calibration(&self) -> Option<&CalibrationSession> {
        self.calibration.as_ref()
    }

    /// Abandon the running calibration; collected samples are discarded
    pub fn cancel_calibration(&mut self) -> bool {
        let cancelled = self.calibration.take();
        if let Some(session) = &cancelled {
            info!(session = %session.id(), "calibration cancelled");
        }
        cancelled.is_some()
    }

    /// Complete the running calibration and make it active
    pub fn finish_calibration(&mut self, now: DateTime<Utc>) -> Option<ClickCalibration> {
        let calibration = self.calibration.take()?.finish(now);
        self.settings.calibration = calibration;
        self.engine.set_settings(self.settings);
        Some(calibration)
    }
}
