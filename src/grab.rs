//! Hover / grab / release state machine
//!
//! Driven once per render tick with the latest [`ClickGesture`]. Hover is a
//! screen-space ray cast at the pointer. A rising click edge over a hovered
//! object starts a grab session; while it lasts the object follows the hand
//! by projecting the hand's displacement since grab start onto world planes,
//! so camera perspective does not distort the motion. A falling edge drops
//! the object into a short RELEASE tail before returning to IDLE.

use crate::scene::{screen_to_world_plane, InteractionScene, ObjectId, RayHit};
use crate::types::{ClickGesture, InteractionState};
use chrono::{DateTime, Duration, Utc};
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrabConfig {
    /// Lerp factor applied to the target position each tick
    pub smoothing: f64,
    /// Targets further than this from the projected position jump straight to it
    pub snap_distance: f64,
    /// How long RELEASE lasts before returning to IDLE
    pub release_tail_ms: i64,
    /// Velocity handed to the physics body when dropped
    pub release_velocity: DVec3,
    pub held_mass: f64,
    pub released_mass: f64,
}

impl Default for GrabConfig {
    fn default() -> Self {
        Self {
            smoothing: 0.15,
            snap_distance: 5.0,
            release_tail_ms: 100,
            release_velocity: DVec3::new(0.0, -0.5, 0.0),
            held_mass: 0.0,
            released_mass: 1.0,
        }
    }
}

impl GrabConfig {
    pub fn release_tail(&self) -> Duration {
        Duration::milliseconds(self.release_tail_ms)
    }
}

/// Bookkeeping for one held object; exists only while GRABBING
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrabSession {
    pub id: Uuid,
    pub object: ObjectId,
    /// Hit point minus object position at grab start
    pub grab_offset: DVec3,
    /// Click position (screen x/y, depth z) at grab start
    pub initial_hand_position: DVec3,
    pub initial_object_position: DVec3,
    /// Smoothed target, before the grab offset is applied
    pub target_position: DVec3,
    pub started_at: DateTime<Utc>,
}

/// Serializable view of the controller after a tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrabSnapshot {
    pub state: InteractionState,
    pub hovered: Option<ObjectId>,
    pub grabbed: Option<ObjectId>,
    pub grab_offset: Option<DVec3>,
    /// Position of the grabbed object after this tick
    pub object_position: Option<DVec3>,
}

#[derive(Debug, Clone, Default)]
pub struct GrabController {
    config: GrabConfig,
    state: InteractionState,
    hovered: Option<ObjectId>,
    session: Option<GrabSession>,
    was_clicking: bool,
    release_started: Option<DateTime<Utc>>,
}

impl GrabController {
    pub fn new() -> Self {
        Self::with_config(GrabConfig::default())
    }

    pub fn with_config(config: GrabConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &GrabConfig {
        &self.config
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    pub fn hovered(&self) -> Option<ObjectId> {
        self.hovered
    }

    pub fn grabbed(&self) -> Option<ObjectId> {
        self.session.map(|s| s.object)
    }

    pub fn session(&self) -> Option<&GrabSession> {
        self.session.as_ref()
    }

    /// Advance the state machine by one render tick
    pub fn tick(
        &mut self,
        gesture: &ClickGesture,
        scene: &mut dyn InteractionScene,
        now: DateTime<Utc>,
    ) -> GrabSnapshot {
        let tail_expired = self.expire_release(now);

        if self.state != InteractionState::Grabbing && !tail_expired {
            self.update_hover(gesture, scene);
        }

        let clicking = gesture.is_clicking;
        if clicking && !self.was_clicking {
            if self.state != InteractionState::Grabbing {
                if let Some(object) = self.hovered {
                    self.begin_grab(object, gesture, scene, now);
                }
            }
        } else if !clicking && self.was_clicking && self.state == InteractionState::Grabbing {
            self.release(scene, now);
        }
        self.was_clicking = clicking;

        let object_position = if self.state == InteractionState::Grabbing {
            self.track(gesture, scene)
        } else {
            None
        };

        GrabSnapshot {
            state: self.state,
            hovered: self.hovered,
            grabbed: self.grabbed(),
            grab_offset: self.session.map(|s| s.grab_offset),
            object_position,
        }
    }

    /// Drop any held object and return to IDLE
    pub fn reset(&mut self, scene: &mut dyn InteractionScene) {
        if let Some(session) = self.session.take() {
            if let Some(body) = scene.physics_body(session.object) {
                body.set_mass(self.config.released_mass);
            }
            debug!(object = %session.object, "grab cancelled by reset");
        }
        self.clear();
    }

    /// Reset without touching the scene
    pub fn clear(&mut self) {
        let config = self.config;
        *self = Self::with_config(config);
    }

    /// Forget an object the scene no longer contains
    pub fn forget_object(&mut self, object: ObjectId) {
        if self.hovered == Some(object) {
            self.hovered = None;
            if self.state == InteractionState::Hover {
                self.state = InteractionState::Idle;
            }
        }
        if self.grabbed() == Some(object) {
            self.session = None;
            self.state = InteractionState::Idle;
        }
    }

    fn expire_release(&mut self, now: DateTime<Utc>) -> bool {
        if self.state != InteractionState::Release {
            return false;
        }
        match self.release_started {
            Some(start) if now - start >= self.config.release_tail() => {
                self.state = InteractionState::Idle;
                self.release_started = None;
                self.hovered = None;
                true
            }
            Some(_) => false,
            None => {
                self.state = InteractionState::Idle;
                self.hovered = None;
                true
            }
        }
    }

    fn update_hover(&mut self, gesture: &ClickGesture, scene: &dyn InteractionScene) {
        let hit = cast(scene, screen_point(gesture.click_position));

        match hit {
            Some(hit) => {
                if self.hovered != Some(hit.object) {
                    debug!(object = %hit.object, "hover enter");
                }
                self.hovered = Some(hit.object);
                if self.state != InteractionState::Release {
                    self.state = InteractionState::Hover;
                }
            }
            None => {
                if let Some(previous) = self.hovered.take() {
                    debug!(object = %previous, "hover exit");
                }
                if self.state == InteractionState::Hover {
                    self.state = InteractionState::Idle;
                }
            }
        }
    }

    fn begin_grab(
        &mut self,
        object: ObjectId,
        gesture: &ClickGesture,
        scene: &mut dyn InteractionScene,
        now: DateTime<Utc>,
    ) {
        let Some(object_position) = scene.object_position(object) else {
            warn!(%object, "hovered object vanished before grab");
            self.forget_object(object);
            return;
        };

        let grab_offset = match scene.intersect_object(object, screen_point(gesture.click_position)) {
            Ok(Some(hit)) => hit.point - object_position,
            Ok(None) => DVec3::ZERO,
            Err(e) => {
                warn!(%object, error = %e, "grab ray cast failed");
                DVec3::ZERO
            }
        };

        if let Some(body) = scene.physics_body(object) {
            body.set_mass(self.config.held_mass);
            body.set_velocity(DVec3::ZERO);
            body.set_angular_velocity(DVec3::ZERO);
        }

        let session = GrabSession {
            id: Uuid::new_v4(),
            object,
            grab_offset,
            initial_hand_position: gesture.click_position,
            initial_object_position: object_position,
            target_position: object_position,
            started_at: now,
        };
        info!(session = %session.id, %object, "grab started");

        self.session = Some(session);
        self.release_started = None;
        self.state = InteractionState::Grabbing;
    }

    fn release(&mut self, scene: &mut dyn InteractionScene, now: DateTime<Utc>) {
        if let Some(session) = self.session.take() {
            if let Some(body) = scene.physics_body(session.object) {
                body.set_mass(self.config.released_mass);
                body.set_velocity(self.config.release_velocity);
            }
            info!(
                session = %session.id,
                object = %session.object,
                held_ms = (now - session.started_at).num_milliseconds(),
                "grab released"
            );
        }
        self.state = InteractionState::Release;
        self.release_started = Some(now);
    }

    /// Move the held object toward the hand, returning its new position
    fn track(&mut self, gesture: &ClickGesture, scene: &mut dyn InteractionScene) -> Option<DVec3> {
        let mut session = self.session?;
        let object = session.object;

        let Some(current_position) = scene.object_position(object) else {
            warn!(%object, "grabbed object left the scene");
            self.forget_object(object);
            return None;
        };

        let target = grab_target(&session, gesture.click_position, scene);
        session.target_position = if session.target_position.distance(target) > self.config.snap_distance {
            debug!(%object, "grab target snapped");
            target
        } else {
            session.target_position.lerp(target, self.config.smoothing)
        };
        self.session = Some(session);

        let desired = session.target_position - session.grab_offset;
        let applied = match scene.physics_body(object) {
            Some(body) => {
                body.set_position(desired);
                body.set_velocity(DVec3::ZERO);
                body.set_angular_velocity(DVec3::ZERO);
                desired
            }
            None => {
                let next = current_position.lerp(desired, self.config.smoothing);
                scene.set_object_position(object, next);
                next
            }
        };
        Some(applied)
    }
}

/// Where the hand wants the object, from its displacement since grab start.
///
/// Both the initial and current hand positions are projected onto world
/// planes (the current one at the depth-shifted target plane) and only the
/// difference is applied, so a hand that has not moved maps exactly onto the
/// initial object position.
pub fn grab_target(session: &GrabSession, hand: DVec3, scene: &dyn InteractionScene) -> DVec3 {
    let initial_hand = session.initial_hand_position;
    let initial_object = session.initial_object_position;
    let target_z = initial_object.z + (hand.z - initial_hand.z);

    let camera = scene.camera();
    let current_world = screen_to_world_plane(camera, screen_point(hand), target_z);
    let initial_world = screen_to_world_plane(camera, screen_point(initial_hand), initial_object.z);
    let delta = current_world - initial_world;

    DVec3::new(
        initial_object.x + delta.x,
        initial_object.y + delta.y,
        target_z,
    )
}

fn screen_point(position: DVec3) -> DVec2 {
    DVec2::new(position.x, position.y)
}

/// Ray cast where a failing scene query counts as a miss
fn cast(scene: &dyn InteractionScene, screen: DVec2) -> Option<RayHit> {
    match scene.cast_ray(screen) {
        Ok(hit) => hit,
        Err(e) => {
            warn!(error = %e, "hover ray cast failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InteractionError;
    use crate::scene::{BoxScene, Camera, PerspectiveCamera, PhysicsControllable};
    use crate::types::ClickMode;
    use chrono::TimeZone;

    fn ts(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn gesture(x: f64, y: f64, z: f64, clicking: bool) -> ClickGesture {
        ClickGesture {
            is_clicking: clicking,
            click_position: DVec3::new(x, y, z),
            click_strength: if clicking { 1.0 } else { 0.0 },
            ..ClickGesture::idle(ClickMode::Pinch)
        }
    }

    fn scene_with_box(physics: bool) -> (BoxScene, ObjectId) {
        let mut scene = BoxScene::new(PerspectiveCamera::default());
        let id = scene.register(DVec3::ZERO, DVec3::splat(0.5), physics);
        (scene, id)
    }

    /// Screen x whose ray meets the z = 0 plane at world x = `world_x`
    fn screen_x_for(camera: &PerspectiveCamera, world_x: f64) -> f64 {
        let half_height = (camera.fov_y_degrees.to_radians() / 2.0).tan();
        let half_width = half_height * camera.aspect * camera.position.z;
        0.5 + world_x / (2.0 * half_width)
    }

    struct FailingScene(BoxScene);

    impl InteractionScene for FailingScene {
        fn camera(&self) -> &dyn Camera {
            self.0.camera()
        }
        fn cast_ray(&self, _: DVec2) -> Result<Option<RayHit>, InteractionError> {
            Err(InteractionError::SceneQuery("renderer not ready".into()))
        }
        fn intersect_object(&self, _: ObjectId, _: DVec2) -> Result<Option<RayHit>, InteractionError> {
            Err(InteractionError::SceneQuery("renderer not ready".into()))
        }
        fn object_position(&self, object: ObjectId) -> Option<DVec3> {
            self.0.object_position(object)
        }
        fn set_object_position(&mut self, object: ObjectId, position: DVec3) {
            self.0.set_object_position(object, position)
        }
        fn physics_body(&mut self, object: ObjectId) -> Option<&mut dyn PhysicsControllable> {
            self.0.physics_body(object)
        }
    }

    #[test]
    fn test_hover_enter_and_exit() {
        let (mut scene, id) = scene_with_box(false);
        let mut grab = GrabController::new();

        let snap = grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(0));
        assert_eq!(snap.state, InteractionState::Hover);
        assert_eq!(snap.hovered, Some(id));

        let snap = grab.tick(&gesture(0.95, 0.1, 0.0, false), &mut scene, ts(16));
        assert_eq!(snap.state, InteractionState::Idle);
        assert_eq!(snap.hovered, None);
    }

    #[test]
    fn test_empty_scene_stays_idle() {
        let mut scene = BoxScene::new(PerspectiveCamera::default());
        let mut grab = GrabController::new();
        for t in 0..5 {
            let snap = grab.tick(&gesture(0.5, 0.5, 0.0, t > 1), &mut scene, ts(t * 16));
            assert_eq!(snap.state, InteractionState::Idle);
            assert_eq!(snap.grabbed, None);
        }
    }

    #[test]
    fn test_failed_ray_cast_counts_as_miss() {
        let (inner, _) = scene_with_box(false);
        let mut scene = FailingScene(inner);
        let mut grab = GrabController::new();
        let snap = grab.tick(&gesture(0.5, 0.5, 0.0, true), &mut scene, ts(0));
        assert_eq!(snap.state, InteractionState::Idle);
        assert_eq!(snap.hovered, None);
    }

    #[test]
    fn test_click_without_hover_does_not_grab() {
        let (mut scene, _) = scene_with_box(false);
        let mut grab = GrabController::new();
        // Rising edge away from the box
        grab.tick(&gesture(0.95, 0.1, 0.0, true), &mut scene, ts(0));
        // Dragging onto the box while still clicking is not a new rising edge
        let snap = grab.tick(&gesture(0.5, 0.5, 0.0, true), &mut scene, ts(16));
        assert_eq!(snap.state, InteractionState::Hover);
        assert_eq!(snap.grabbed, None);
    }

    #[test]
    fn test_grab_offset_from_hit_point() {
        let (mut scene, id) = scene_with_box(false);
        let mut grab = GrabController::new();
        grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(0));
        let snap = grab.tick(&gesture(0.5, 0.5, 0.0, true), &mut scene, ts(16));

        assert_eq!(snap.state, InteractionState::Grabbing);
        assert_eq!(snap.grabbed, Some(id));
        // The center ray enters the box through its front face
        let offset = snap.grab_offset.unwrap();
        assert!((offset - DVec3::new(0.0, 0.0, 0.5)).length() < 1e-9);
    }

    #[test]
    fn test_stationary_hand_targets_initial_position() {
        let (mut scene, _) = scene_with_box(true);
        let mut grab = GrabController::new();
        let hand = gesture(0.5, 0.5, 0.0, true);
        grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(0));
        grab.tick(&hand, &mut scene, ts(16));

        let session = *grab.session().unwrap();
        let target = grab_target(&session, hand.click_position, &scene);
        assert_eq!(target, session.initial_object_position);

        // Off-center grab: still exact when the hand has not moved
        let shifted = GrabSession {
            initial_hand_position: DVec3::new(0.62, 0.41, 0.3),
            ..session
        };
        let target = grab_target(&shifted, shifted.initial_hand_position, &scene);
        assert!((target - shifted.initial_object_position).length() < 1e-9);
    }

    #[test]
    fn test_hand_depth_moves_target_plane() {
        let (mut scene, _) = scene_with_box(true);
        let mut grab = GrabController::new();
        grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(0));
        grab.tick(&gesture(0.5, 0.5, 0.0, true), &mut scene, ts(16));

        let session = *grab.session().unwrap();
        let target = grab_target(&session, DVec3::new(0.5, 0.5, -1.25), &scene);
        assert!((target.z + 1.25).abs() < 1e-9);
    }

    fn drag_scenario(physics: bool) {
        let (mut scene, id) = scene_with_box(physics);
        let camera = PerspectiveCamera::default();
        let mut grab = GrabController::new();
        let mut t = 0;

        grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(t));
        let mut snap = grab.tick(&gesture(0.5, 0.5, 0.0, true), &mut scene, ts(t));
        for _ in 0..60 {
            t += 16;
            snap = grab.tick(&gesture(0.5, 0.5, 0.0, true), &mut scene, ts(t));
        }
        let before = snap.object_position.unwrap();

        let x = screen_x_for(&camera, 1.0);
        for _ in 0..200 {
            t += 16;
            snap = grab.tick(&gesture(x, 0.5, 0.0, true), &mut scene, ts(t));
        }
        assert_eq!(snap.state, InteractionState::Grabbing);
        let after = snap.object_position.unwrap();
        let moved = after - before;
        assert!((moved - DVec3::new(1.0, 0.0, 0.0)).length() < 1e-3, "moved {moved:?}");
        assert!((scene.object_position(id).unwrap() - after).length() < 1e-12);

        // Falling edge
        t += 16;
        let released_at = t;
        let snap = grab.tick(&gesture(x, 0.5, 0.0, false), &mut scene, ts(t));
        assert_eq!(snap.state, InteractionState::Release);
        assert_eq!(snap.grabbed, None);

        let snap = grab.tick(&gesture(x, 0.5, 0.0, false), &mut scene, ts(released_at + 50));
        assert_eq!(snap.state, InteractionState::Release);

        let snap = grab.tick(&gesture(x, 0.5, 0.0, false), &mut scene, ts(released_at + 100));
        assert_eq!(snap.state, InteractionState::Idle);
        assert_eq!(snap.grabbed, None);
    }

    #[test]
    fn test_drag_moves_object_with_hand_physics() {
        drag_scenario(true);
    }

    #[test]
    fn test_drag_moves_object_with_hand_kinematic() {
        drag_scenario(false);
    }

    #[test]
    fn test_physics_body_held_and_dropped() {
        let (mut scene, id) = scene_with_box(true);
        if let Some(body) = scene.physics_body(id) {
            body.set_velocity(DVec3::new(3.0, 0.0, 0.0));
            body.set_angular_velocity(DVec3::ONE);
        }
        let mut grab = GrabController::new();
        grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(0));
        grab.tick(&gesture(0.5, 0.5, 0.0, true), &mut scene, ts(16));

        let body = scene.object(id).unwrap().body.unwrap();
        assert_eq!(body.mass, 0.0);
        assert_eq!(body.velocity, DVec3::ZERO);
        assert_eq!(body.angular_velocity, DVec3::ZERO);

        grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(32));
        let body = scene.object(id).unwrap().body.unwrap();
        assert_eq!(body.mass, 1.0);
        assert_eq!(body.velocity, DVec3::new(0.0, -0.5, 0.0));
    }

    #[test]
    fn test_far_target_snaps() {
        let (mut scene, _) = scene_with_box(true);
        let camera = PerspectiveCamera::default();
        let mut grab = GrabController::new();
        grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(0));
        grab.tick(&gesture(0.5, 0.5, 0.0, true), &mut scene, ts(16));

        // A jump of 8 world units exceeds the snap distance
        let x = screen_x_for(&camera, 8.0);
        grab.tick(&gesture(x, 0.5, 0.0, true), &mut scene, ts(32));
        let target = grab.session().unwrap().target_position;
        assert!((target.x - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_hover_resumes_after_release_tail() {
        let (mut scene, id) = scene_with_box(false);
        let mut grab = GrabController::new();
        grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(0));
        grab.tick(&gesture(0.5, 0.5, 0.0, true), &mut scene, ts(16));
        grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(32));
        assert_eq!(grab.state(), InteractionState::Release);

        let snap = grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(140));
        assert_eq!(snap.state, InteractionState::Idle);
        assert_eq!(snap.hovered, None);
        assert_eq!(grab.hovered(), None);
        let snap = grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(156));
        assert_eq!(snap.state, InteractionState::Hover);
        assert_eq!(snap.hovered, Some(id));
    }

    #[test]
    fn test_unregistered_object_ends_grab() {
        let (mut scene, id) = scene_with_box(false);
        let mut grab = GrabController::new();
        grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(0));
        grab.tick(&gesture(0.5, 0.5, 0.0, true), &mut scene, ts(16));
        scene.unregister(id);

        let snap = grab.tick(&gesture(0.5, 0.5, 0.0, true), &mut scene, ts(32));
        assert_eq!(snap.state, InteractionState::Idle);
        assert_eq!(snap.grabbed, None);
    }

    #[test]
    fn test_reset_restores_mass() {
        let (mut scene, id) = scene_with_box(true);
        let mut grab = GrabController::new();
        grab.tick(&gesture(0.5, 0.5, 0.0, false), &mut scene, ts(0));
        grab.tick(&gesture(0.5, 0.5, 0.0, true), &mut scene, ts(16));
        grab.reset(&mut scene);

        assert_eq!(grab.state(), InteractionState::Idle);
        assert_eq!(grab.grabbed(), None);
        assert_eq!(scene.object(id).unwrap().body.unwrap().mass, 1.0);
    }
}
