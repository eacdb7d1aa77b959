//! Physics and root-motion collaborators.
//!
//! This module provides:
//! - The kinematic movement interface controllers drive
//! - A reference kinematic world with previous/current snapshots
//! - Root-motion clip data used to prefer animation-driven displacement

use arena_common::ActorId;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

/// Root-motion speeds at or below this are ignored.
pub const ROOT_MOTION_MIN_SPEED: f32 = 0.01;

/// Errors that can occur in the physics collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhysicsError {
    /// Actor has no physics body
    #[error("physics actor not found: {0}")]
    UnknownActor(ActorId),
}

/// Result type alias for physics operations.
pub type PhysicsResult<T> = Result<T, PhysicsError>;

/// Kinematic movement interface.
///
/// Every call names an actor; unknown actors are errors, never ignored.
pub trait PhysicsWorld {
    /// Queues a displacement, applied on the next step.
    fn move_actor(&mut self, id: ActorId, displacement: Vec3) -> PhysicsResult<()>;

    /// Queues a rotation, applied on the next step.
    fn rotate(&mut self, id: ActorId, rotation: Quat) -> PhysicsResult<()>;

    /// Places an actor immediately, resetting interpolation.
    fn teleport(&mut self, id: ActorId, position: Vec3, rotation: Option<Quat>) -> PhysicsResult<()>;

    /// Position interpolated between the last two steps (`alpha` in `[0, 1]`).
    fn position(&self, id: ActorId, alpha: f32) -> PhysicsResult<Vec3>;

    /// Rotation interpolated between the last two steps (`alpha` in `[0, 1]`).
    fn rotation(&self, id: ActorId, alpha: f32) -> PhysicsResult<Quat>;

    /// Velocity over the last step.
    fn linear_velocity(&self, id: ActorId) -> PhysicsResult<Vec3>;

    /// Advances the world by one fixed step.
    fn step(&mut self, dt: f32);
}

// ============================================================================
// Kinematic World
// ============================================================================

#[derive(Debug, Clone)]
struct KinematicBody {
    previous_position: Vec3,
    position: Vec3,
    previous_rotation: Quat,
    rotation: Quat,
    pending_translation: Vec3,
    pending_rotation: Option<Quat>,
    velocity: Vec3,
}

impl KinematicBody {
    fn new(position: Vec3, rotation: Quat) -> Self {
        Self {
            previous_position: position,
            position,
            previous_rotation: rotation,
            rotation,
            pending_translation: Vec3::ZERO,
            pending_rotation: None,
            velocity: Vec3::ZERO,
        }
    }
}

/// Collision-free kinematic world.
///
/// Displacements queued during a tick are summed and applied by `step`.
#[derive(Debug, Clone, Default)]
pub struct KinematicWorld {
    bodies: HashMap<ActorId, KinematicBody>,
}

impl KinematicWorld {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a body for `id`, replacing any existing one.
    pub fn add_actor(&mut self, id: ActorId, position: Vec3, rotation: Quat) {
        self.bodies.insert(id, KinematicBody::new(position, rotation));
    }

    /// Removes a body.
    pub fn remove_actor(&mut self, id: ActorId) -> bool {
        self.bodies.remove(&id).is_some()
    }

    /// Whether `id` has a body.
    #[must_use]
    pub fn contains(&self, id: ActorId) -> bool {
        self.bodies.contains_key(&id)
    }

    /// Number of bodies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    /// Whether the world has no bodies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    fn body(&self, id: ActorId) -> PhysicsResult<&KinematicBody> {
        self.bodies.get(&id).ok_or(PhysicsError::UnknownActor(id))
    }

    fn body_mut(&mut self, id: ActorId) -> PhysicsResult<&mut KinematicBody> {
        self.bodies.get_mut(&id).ok_or(PhysicsError::UnknownActor(id))
    }
}

impl PhysicsWorld for KinematicWorld {
    fn move_actor(&mut self, id: ActorId, displacement: Vec3) -> PhysicsResult<()> {
        let body = self.body_mut(id)?;
        if displacement.is_finite() {
            body.pending_translation += displacement;
        }
        Ok(())
    }

    fn rotate(&mut self, id: ActorId, rotation: Quat) -> PhysicsResult<()> {
        let body = self.body_mut(id)?;
        if rotation.is_finite() {
            body.pending_rotation = Some(rotation.normalize());
        }
        Ok(())
    }

    fn teleport(&mut self, id: ActorId, position: Vec3, rotation: Option<Quat>) -> PhysicsResult<()> {
        let body = self.body_mut(id)?;
        body.position = position;
        body.previous_position = position;
        body.pending_translation = Vec3::ZERO;
        if let Some(rotation) = rotation {
            body.rotation = rotation;
            body.previous_rotation = rotation;
            body.pending_rotation = None;
        }
        Ok(())
    }

    fn position(&self, id: ActorId, alpha: f32) -> PhysicsResult<Vec3> {
        let body = self.body(id)?;
        Ok(body
            .previous_position
            .lerp(body.position, alpha.clamp(0.0, 1.0)))
    }

    fn rotation(&self, id: ActorId, alpha: f32) -> PhysicsResult<Quat> {
        let body = self.body(id)?;
        Ok(body
            .previous_rotation
            .slerp(body.rotation, alpha.clamp(0.0, 1.0)))
    }

    fn linear_velocity(&self, id: ActorId) -> PhysicsResult<Vec3> {
        Ok(self.body(id)?.velocity)
    }

    fn step(&mut self, dt: f32) {
        for body in self.bodies.values_mut() {
            body.previous_position = body.position;
            body.previous_rotation = body.rotation;

            body.position += body.pending_translation;
            body.velocity = if dt > 0.0 {
                body.pending_translation / dt
            } else {
                Vec3::ZERO
            };
            body.pending_translation = Vec3::ZERO;

            if let Some(rotation) = body.pending_rotation.take() {
                body.rotation = rotation;
            }
        }
    }
}

// ============================================================================
// Root Motion
// ============================================================================

/// Root-motion data extracted from an animation clip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RootMotionClip {
    /// Whether the clip moves its root bone.
    pub has_root_motion: bool,
    /// Average planar root velocity in clip space (+Z forward).
    pub velocity: Vec3,
}

impl RootMotionClip {
    /// A clip that moves at `velocity`.
    #[must_use]
    pub fn moving(velocity: Vec3) -> Self {
        Self {
            has_root_motion: true,
            velocity,
        }
    }

    /// Root speed scaled by the actor's scale, if above the threshold.
    #[must_use]
    pub fn usable_speed(&self, scale: f32) -> Option<f32> {
        if !self.has_root_motion {
            return None;
        }
        let scale = if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            1.0
        };
        let speed = self.velocity.length() * scale;
        (speed > ROOT_MOTION_MIN_SPEED).then_some(speed)
    }
}

/// Supplies root-motion data by clip name.
///
/// Locomotion uses the clip `"Run"`; attacks use the move or special ID.
pub trait RootMotionSource {
    /// Returns root motion for a clip, if known.
    fn clip(&self, name: &str) -> Option<RootMotionClip>;
}

/// Root-motion lookup table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RootMotionTable {
    clips: HashMap<String, RootMotionClip>,
}

impl RootMotionTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a clip.
    #[must_use]
    pub fn with_clip(mut self, name: impl Into<String>, clip: RootMotionClip) -> Self {
        self.insert(name, clip);
        self
    }

    /// Adds or replaces a clip.
    pub fn insert(&mut self, name: impl Into<String>, clip: RootMotionClip) {
        let name = name.into();
        debug!("Registered root motion for clip {name}");
        self.clips.insert(name, clip);
    }
}

impl RootMotionSource for RootMotionTable {
    fn clip(&self, name: &str) -> Option<RootMotionClip> {
        self.clips.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_actor_fails() {
        let mut world = KinematicWorld::new();
        let ghost = ActorId::from_raw(99);
        assert_eq!(
            world.move_actor(ghost, Vec3::X),
            Err(PhysicsError::UnknownActor(ghost))
        );
        assert!(world.position(ghost, 1.0).is_err());
    }

    #[test]
    fn test_step_applies_moves_and_velocity() {
        let mut world = KinematicWorld::new();
        let id = ActorId::from_raw(1);
        world.add_actor(id, Vec3::ZERO, Quat::IDENTITY);

        assert!(world.move_actor(id, Vec3::new(0.1, 0.0, 0.0)).is_ok());
        assert!(world.move_actor(id, Vec3::new(0.1, 0.0, 0.0)).is_ok());
        world.step(0.1);

        let pos = world.position(id, 1.0).unwrap_or_default();
        assert!((pos.x - 0.2).abs() < 1e-6);
        let vel = world.linear_velocity(id).unwrap_or_default();
        assert!((vel.x - 2.0).abs() < 1e-5);
    }

    #[test]
    fn test_interpolation() {
        let mut world = KinematicWorld::new();
        let id = ActorId::from_raw(1);
        world.add_actor(id, Vec3::ZERO, Quat::IDENTITY);
        assert!(world.move_actor(id, Vec3::new(1.0, 0.0, 0.0)).is_ok());
        assert!(world.rotate(id, Quat::from_rotation_y(1.0)).is_ok());
        world.step(1.0 / 60.0);

        let half = world.position(id, 0.5).unwrap_or_default();
        assert!((half.x - 0.5).abs() < 1e-6);
        let clamped = world.position(id, 3.0).unwrap_or_default();
        assert!((clamped.x - 1.0).abs() < 1e-6);

        let rot = world.rotation(id, 0.5).unwrap_or_default();
        assert!(rot.angle_between(Quat::from_rotation_y(0.5)) < 1e-4);
    }

    #[test]
    fn test_teleport_resets_interpolation() {
        let mut world = KinematicWorld::new();
        let id = ActorId::from_raw(1);
        world.add_actor(id, Vec3::ZERO, Quat::IDENTITY);
        assert!(world.teleport(id, Vec3::new(5.0, 0.0, 0.0), None).is_ok());
        let start = world.position(id, 0.0).unwrap_or_default();
        assert!((start.x - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_root_motion_threshold() {
        let still = RootMotionClip::moving(Vec3::new(0.0, 0.0, 0.005));
        assert!(still.usable_speed(1.0).is_none());

        let run = RootMotionClip::moving(Vec3::new(0.0, 0.0, 3.0));
        assert_eq!(run.usable_speed(2.0), Some(6.0));
        assert_eq!(run.usable_speed(f32::NAN), Some(3.0));
        assert!(RootMotionClip::default().usable_speed(1.0).is_none());

        let table = RootMotionTable::new().with_clip("Run", run);
        assert!(table.clip("Run").is_some());
        assert!(table.clip("Walk").is_none());
    }
}
