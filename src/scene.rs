//! Scene collaborators
//!
//! The renderer, camera and physics engine live outside this crate. This
//! module fixes the interface the grab controller needs from them (a
//! screen-space ray cast over registered objects, object positions, and an
//! optional physics capability per object) and provides a small box scene
//! implementing it for replay tooling and tests.

use crate::error::InteractionError;
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Denominators smaller than this count as a ray parallel to the plane
const PARALLEL_EPSILON: f64 = 1e-4;

/// Map normalized screen coordinates ([0, 1], y down) to NDC ([-1, 1], y up)
pub fn screen_to_ndc(screen: DVec2) -> DVec2 {
    DVec2::new(screen.x * 2.0 - 1.0, -(screen.y * 2.0 - 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: DVec3,
    /// Unit direction
    pub direction: DVec3,
}

impl Ray {
    pub fn new(origin: DVec3, direction: DVec3) -> Self {
        Self {
            origin,
            direction: direction.normalize_or_zero(),
        }
    }

    pub fn at(&self, t: f64) -> DVec3 {
        self.origin + self.direction * t
    }

    /// Intersection with the plane `z = plane_z`, or `None` when parallel
    pub fn intersect_z_plane(&self, plane_z: f64) -> Option<DVec3> {
        let denom = self.direction.z;
        if denom.abs() < PARALLEL_EPSILON {
            return None;
        }
        let t = (plane_z - self.origin.z) / denom;
        Some(self.at(t))
    }

    /// Slab test against an axis-aligned box, returning the entry distance
    pub fn intersect_aabb(&self, min: DVec3, max: DVec3) -> Option<f64> {
        let mut t_near = f64::NEG_INFINITY;
        let mut t_far = f64::INFINITY;

        for axis in 0..3 {
            let origin = self.origin[axis];
            let dir = self.direction[axis];
            if dir.abs() < f64::EPSILON {
                if origin < min[axis] || origin > max[axis] {
                    return None;
                }
                continue;
            }
            let t1 = (min[axis] - origin) / dir;
            let t2 = (max[axis] - origin) / dir;
            t_near = t_near.max(t1.min(t2));
            t_far = t_far.min(t1.max(t2));
            if t_near > t_far {
                return None;
            }
        }

        if t_far < 0.0 {
            None
        } else {
            Some(t_near.max(0.0))
        }
    }
}

/// Projection from screen space into the world
pub trait Camera {
    /// Ray from the eye through a normalized screen point
    fn screen_ray(&self, screen: DVec2) -> Ray;

    /// Eye position in world space
    fn position(&self) -> DVec3;

    /// Rotate a camera-space direction (x right, y up, looking down -z) into world space
    fn to_world_direction(&self, direction: DVec3) -> DVec3;
}

/// World point under `screen` on the plane `z = plane_z`.
///
/// A ray parallel to the plane has no intersection; the point `(0, 0, plane_z)`
/// stands in for it.
pub fn screen_to_world_plane(camera: &dyn Camera, screen: DVec2, plane_z: f64) -> DVec3 {
    camera
        .screen_ray(screen)
        .intersect_z_plane(plane_z)
        .unwrap_or(DVec3::new(0.0, 0.0, plane_z))
}

/// Pinhole camera looking from `position` at `target`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveCamera {
    pub position: DVec3,
    pub target: DVec3,
    #[serde(default = "default_up")]
    pub up: DVec3,
    /// Vertical field of view in degrees
    pub fov_y_degrees: f64,
    /// Width / height
    pub aspect: f64,
}

fn default_up() -> DVec3 {
    DVec3::Y
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self {
            position: DVec3::new(0.0, 0.0, 5.0),
            target: DVec3::ZERO,
            up: DVec3::Y,
            fov_y_degrees: 75.0,
            aspect: 16.0 / 9.0,
        }
    }
}

impl PerspectiveCamera {
    /// Orthonormal (right, up, forward) basis
    fn basis(&self) -> (DVec3, DVec3, DVec3) {
        let forward = (self.target - self.position).normalize_or_zero();
        let forward = if forward == DVec3::ZERO {
            DVec3::NEG_Z
        } else {
            forward
        };
        let right = forward.cross(self.up).normalize_or_zero();
        let right = if right == DVec3::ZERO { DVec3::X } else { right };
        let up = right.cross(forward);
        (right, up, forward)
    }
}

impl Camera for PerspectiveCamera {
    fn screen_ray(&self, screen: DVec2) -> Ray {
        let ndc = screen_to_ndc(screen);
        let half_height = (self.fov_y_degrees.to_radians() / 2.0).tan();
        let half_width = half_height * self.aspect;
        let (right, up, forward) = self.basis();

        let direction = forward + right * (ndc.x * half_width) + up * (ndc.y * half_height);
        Ray::new(self.position, direction)
    }

    fn position(&self) -> DVec3 {
        self.position
    }

    fn to_world_direction(&self, direction: DVec3) -> DVec3 {
        let (right, up, forward) = self.basis();
        (right * direction.x + up * direction.y - forward * direction.z).normalize_or_zero()
    }
}

/// Handle of a registered interactive object
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ObjectId(pub u64);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "object-{}", self.0)
    }
}

/// Nearest intersection of a ray with an interactive object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RayHit {
    pub object: ObjectId,
    pub point: DVec3,
    pub distance: f64,
}

/// Physics body the controller can drive while an object is held
pub trait PhysicsControllable {
    fn set_position(&mut self, position: DVec3);
    fn set_velocity(&mut self, velocity: DVec3);
    fn set_angular_velocity(&mut self, angular_velocity: DVec3);
    fn set_mass(&mut self, mass: f64);
}

/// What the grab controller needs from the scene
pub trait InteractionScene {
    fn camera(&self) -> &dyn Camera;

    /// Nearest registered object under a normalized screen point
    fn cast_ray(&self, screen: DVec2) -> Result<Option<RayHit>, InteractionError>;

    /// Intersection of the screen ray with one specific object
    fn intersect_object(
        &self,
        object: ObjectId,
        screen: DVec2,
    ) -> Result<Option<RayHit>, InteractionError>;

    fn object_position(&self, object: ObjectId) -> Option<DVec3>;

    /// Move an object that has no physics body
    fn set_object_position(&mut self, object: ObjectId, position: DVec3);

    /// Physics capability of an object, if it has one
    fn physics_body(&mut self, object: ObjectId) -> Option<&mut dyn PhysicsControllable>;
}

/// Minimal rigid body state. Integration is left to the physics engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RigidBody {
    pub position: DVec3,
    pub velocity: DVec3,
    pub angular_velocity: DVec3,
    pub mass: f64,
}

impl RigidBody {
    pub fn new(position: DVec3, mass: f64) -> Self {
        Self {
            position,
            velocity: DVec3::ZERO,
            angular_velocity: DVec3::ZERO,
            mass,
        }
    }
}

impl PhysicsControllable for RigidBody {
    fn set_position(&mut self, position: DVec3) {
        self.position = position;
    }

    fn set_velocity(&mut self, velocity: DVec3) {
        self.velocity = velocity;
    }

    fn set_angular_velocity(&mut self, angular_velocity: DVec3) {
        self.angular_velocity = angular_velocity;
    }

    fn set_mass(&mut self, mass: f64) {
        self.mass = mass;
    }
}

/// An axis-aligned box in the reference scene
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub position: DVec3,
    pub half_extents: DVec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<RigidBody>,
}

impl SceneObject {
    /// Current position, taken from the physics body when present
    pub fn position(&self) -> DVec3 {
        self.body.map(|b| b.position).unwrap_or(self.position)
    }
}

/// Object description used to build a [`BoxScene`] from JSON
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    pub position: DVec3,
    /// Edge lengths
    #[serde(default = "default_size")]
    pub size: DVec3,
    #[serde(default)]
    pub physics: bool,
}

fn default_size() -> DVec3 {
    DVec3::ONE
}

/// Scene file format: camera plus interactive objects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    #[serde(default)]
    pub camera: PerspectiveCamera,
    #[serde(default)]
    pub objects: Vec<ObjectSpec>,
}

/// Registry of interactive boxes with a perspective camera
#[derive(Debug, Clone, Default)]
pub struct BoxScene {
    camera: PerspectiveCamera,
    objects: BTreeMap<ObjectId, SceneObject>,
    next_id: u64,
}

impl BoxScene {
    pub fn new(camera: PerspectiveCamera) -> Self {
        Self {
            camera,
            objects: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn from_description(description: &SceneDescription) -> Self {
        let mut scene = Self::new(description.camera);
        for spec in &description.objects {
            scene.register(spec.position, spec.size / 2.0, spec.physics);
        }
        scene
    }

    /// Register a box; `physics` attaches a unit-mass rigid body
    pub fn register(&mut self, position: DVec3, half_extents: DVec3, physics: bool) -> ObjectId {
        self.next_id = self.next_id.max(1);
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.insert(
            id,
            SceneObject {
                position,
                half_extents,
                body: physics.then(|| RigidBody::new(position, 1.0)),
            },
        );
        id
    }

    pub fn unregister(&mut self, object: ObjectId) -> Option<SceneObject> {
        self.objects.remove(&object)
    }

    pub fn object(&self, object: ObjectId) -> Option<&SceneObject> {
        self.objects.get(&object)
    }

    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &SceneObject)> {
        self.objects.iter().map(|(id, obj)| (*id, obj))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    fn hit(&self, ray: &Ray, id: ObjectId, object: &SceneObject) -> Option<RayHit> {
        let center = object.position();
        let distance = ray.intersect_aabb(center - object.half_extents, center + object.half_extents)?;
        Some(RayHit {
            object: id,
            point: ray.at(distance),
            distance,
        })
    }
}

impl InteractionScene for BoxScene {
    fn camera(&self) -> &dyn Camera {
        &self.camera
    }

    fn cast_ray(&self, screen: DVec2) -> Result<Option<RayHit>, InteractionError> {
        let ray = self.camera.screen_ray(screen);
        let nearest = self
            .objects
            .iter()
            .filter_map(|(id, obj)| self.hit(&ray, *id, obj))
            .min_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(nearest)
    }

    fn intersect_object(
        &self,
        object: ObjectId,
        screen: DVec2,
    ) -> Result<Option<RayHit>, InteractionError> {
        let Some(obj) = self.objects.get(&object) else {
            return Ok(None);
        };
        let ray = self.camera.screen_ray(screen);
        Ok(self.hit(&ray, object, obj))
    }

    fn object_position(&self, object: ObjectId) -> Option<DVec3> {
        self.objects.get(&object).map(SceneObject::position)
    }

    fn set_object_position(&mut self, object: ObjectId, position: DVec3) {
        if let Some(obj) = self.objects.get_mut(&object) {
            obj.position = position;
        }
    }

    fn physics_body(&mut self, object: ObjectId) -> Option<&mut dyn PhysicsControllable> {
        self.objects
            .get_mut(&object)?
            .body
            .as_mut()
            .map(|b| b as &mut dyn PhysicsControllable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_to_ndc() {
        assert_eq!(screen_to_ndc(DVec2::new(0.5, 0.5)), DVec2::ZERO);
        assert_eq!(screen_to_ndc(DVec2::new(0.0, 0.0)), DVec2::new(-1.0, 1.0));
        assert_eq!(screen_to_ndc(DVec2::new(1.0, 1.0)), DVec2::new(1.0, -1.0));
    }

    #[test]
    fn test_center_ray_points_at_target() {
        let camera = PerspectiveCamera::default();
        let ray = camera.screen_ray(DVec2::splat(0.5));
        assert!((ray.direction - DVec3::NEG_Z).length() < 1e-12);
        let p = screen_to_world_plane(&camera, DVec2::splat(0.5), 0.0);
        assert!(p.length() < 1e-12);
    }

    #[test]
    fn test_screen_right_maps_to_world_right() {
        let camera = PerspectiveCamera::default();
        let p = screen_to_world_plane(&camera, DVec2::new(0.75, 0.25), 0.0);
        assert!(p.x > 0.0);
        assert!(p.y > 0.0);
        assert!(p.z.abs() < 1e-9);
    }

    #[test]
    fn test_parallel_ray_falls_back() {
        // Looking along +x: every screen ray through the center is parallel to z planes
        let camera = PerspectiveCamera {
            position: DVec3::ZERO,
            target: DVec3::X,
            ..PerspectiveCamera::default()
        };
        let p = screen_to_world_plane(&camera, DVec2::splat(0.5), 2.0);
        assert_eq!(p, DVec3::new(0.0, 0.0, 2.0));
    }

    #[test]
    fn test_aabb_slab() {
        let ray = Ray::new(DVec3::new(0.0, 0.0, 5.0), DVec3::NEG_Z);
        let t = ray
            .intersect_aabb(DVec3::splat(-0.5), DVec3::splat(0.5))
            .unwrap();
        assert!((t - 4.5).abs() < 1e-12);

        let miss = Ray::new(DVec3::new(2.0, 0.0, 5.0), DVec3::NEG_Z);
        assert!(miss
            .intersect_aabb(DVec3::splat(-0.5), DVec3::splat(0.5))
            .is_none());

        let behind = Ray::new(DVec3::new(0.0, 0.0, 5.0), DVec3::Z);
        assert!(behind
            .intersect_aabb(DVec3::splat(-0.5), DVec3::splat(0.5))
            .is_none());
    }

    #[test]
    fn test_cast_ray_returns_nearest() {
        let mut scene = BoxScene::new(PerspectiveCamera::default());
        let far = scene.register(DVec3::new(0.0, 0.0, -3.0), DVec3::splat(0.5), false);
        let near = scene.register(DVec3::new(0.0, 0.0, 1.0), DVec3::splat(0.5), false);

        let hit = scene.cast_ray(DVec2::splat(0.5)).unwrap().unwrap();
        assert_eq!(hit.object, near);
        assert!((hit.point.z - 1.5).abs() < 1e-9);

        scene.unregister(near);
        let hit = scene.cast_ray(DVec2::splat(0.5)).unwrap().unwrap();
        assert_eq!(hit.object, far);
    }

    #[test]
    fn test_empty_scene_has_no_hits() {
        let scene = BoxScene::new(PerspectiveCamera::default());
        assert!(scene.cast_ray(DVec2::splat(0.5)).unwrap().is_none());
        assert!(scene.is_empty());
    }

    #[test]
    fn test_physics_body_capability() {
        let mut scene = BoxScene::new(PerspectiveCamera::default());
        let plain = scene.register(DVec3::ZERO, DVec3::splat(0.5), false);
        let dynamic = scene.register(DVec3::new(2.0, 0.0, 0.0), DVec3::splat(0.5), true);

        assert!(scene.physics_body(plain).is_none());
        let body = scene.physics_body(dynamic).unwrap();
        body.set_position(DVec3::new(3.0, 1.0, 0.0));
        assert_eq!(
            scene.object_position(dynamic),
            Some(DVec3::new(3.0, 1.0, 0.0))
        );
    }

    #[test]
    fn test_scene_description_parses() {
        let json = r#"{
            "camera": {"position": [0, 0, 5], "target": [0, 0, 0], "fov_y_degrees": 75, "aspect": 1.5},
            "objects": [{"position": [0, 0, 0]}, {"position": [2, 0, 0], "size": [1, 2, 1], "physics": true}]
        }"#;
        let description: SceneDescription = serde_json::from_str(json).unwrap();
        let scene = BoxScene::from_description(&description);
        assert_eq!(scene.len(), 2);
        let (_, second) = scene.objects().nth(1).unwrap();
        assert_eq!(second.half_extents, DVec3::new(0.5, 1.0, 0.5));
        assert!(second.body.is_some());
    }
}
