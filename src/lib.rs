//! handgrab - gesture interpretation core for hand-tracked 3D manipulation
//!
//! handgrab turns a noisy per-frame stream of hand landmarks into stable click
//! and grab events: geometric classification → hand-role resolution →
//! debounced click engine → hover/grab/release against a scene.
//!
//! ## Modules
//!
//! - **Frame driver**: classify landmark frames into a [`ClickGesture`]
//! - **Render driver**: hover, grab and release objects through the
//!   [`scene::InteractionScene`] interface, including physics bodies

pub mod calibration;
pub mod classifier;
pub mod click;
pub mod error;
pub mod gaze;
pub mod grab;
pub mod pipeline;
pub mod roles;
pub mod scene;
pub mod schema;
pub mod settings;
pub mod smoothing;
pub mod types;

pub use calibration::{CalibrationSession, ClickCalibration};
pub use click::{ClickGestureEngine, EngineConfig};
pub use error::InteractionError;
pub use grab::{GrabConfig, GrabController};
pub use pipeline::{replay_ndjson, InteractionProcessor};
pub use settings::{JsonFileStore, MemoryStore, Settings, SettingsStore};
pub use types::{
    ClickGesture, ClickMode, FingerSettings, FingerType, HandCount, HandFrame, HandObservation,
    Handedness, InteractionState, Landmark, PrimaryHandPreference,
};

// Schema exports
pub use schema::{FrameAdapter, RawFrame, FRAME_SCHEMA_VERSION};

/// handgrab version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
