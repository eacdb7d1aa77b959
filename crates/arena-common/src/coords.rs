//! World-space helpers for the arena floor.
//!
//! The arena uses a Y-up right-handed frame. Actors face along their yaw,
//! where yaw 0 looks down +Z and positive yaw turns toward +X.

use glam::{Quat, Vec3};

/// Planar (XZ) length below which a vector is treated as zero.
pub const PLANAR_EPSILON: f32 = 1.0e-4;

/// Returns the unit facing vector for a yaw angle (radians).
#[must_use]
pub fn facing_from_yaw(yaw: f32) -> Vec3 {
    Vec3::new(yaw.sin(), 0.0, yaw.cos())
}

/// Returns the yaw angle that looks along `direction`, ignoring Y.
///
/// Returns `None` when the planar component is degenerate.
#[must_use]
pub fn yaw_from_direction(direction: Vec3) -> Option<f32> {
    let planar = flatten(direction);
    if planar.length_squared() < PLANAR_EPSILON * PLANAR_EPSILON {
        return None;
    }
    Some(planar.x.atan2(planar.z))
}

/// Rotation about the world up axis for a yaw angle.
#[must_use]
pub fn yaw_rotation(yaw: f32) -> Quat {
    Quat::from_rotation_y(yaw)
}

/// Drops the vertical component of a vector.
#[must_use]
pub fn flatten(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Distance between two points on the arena floor.
#[must_use]
pub fn planar_distance(a: Vec3, b: Vec3) -> f32 {
    flatten(b - a).length()
}

/// Wraps an angle difference into `[-PI, PI)`.
#[must_use]
pub fn wrap_angle(angle: f32) -> f32 {
    use std::f32::consts::{PI, TAU};
    (angle + PI).rem_euclid(TAU) - PI
}

/// Turns `current` toward `target` by at most `max_step` radians.
#[must_use]
pub fn step_yaw(current: f32, target: f32, max_step: f32) -> f32 {
    let diff = wrap_angle(target - current);
    current + diff.signum() * diff.abs().min(max_step.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_facing_from_yaw() {
        let forward = facing_from_yaw(0.0);
        assert!((forward - Vec3::Z).length() < 1e-6);

        let right = facing_from_yaw(FRAC_PI_2);
        assert!((right - Vec3::X).length() < 1e-6);
    }

    #[test]
    fn test_yaw_round_trip() {
        let yaw = 0.8;
        let recovered = yaw_from_direction(facing_from_yaw(yaw)).unwrap_or_default();
        assert!((recovered - yaw).abs() < 1e-5);
        assert!(yaw_from_direction(Vec3::Y).is_none());
    }

    #[test]
    fn test_step_yaw_takes_short_way() {
        // From just below +PI to just above -PI is a tiny positive turn.
        let next = step_yaw(PI - 0.05, -PI + 0.05, 1.0);
        assert!((wrap_angle(next) - (-PI + 0.05)).abs() < 1e-4);

        let limited = step_yaw(0.0, 1.0, 0.25);
        assert!((limited - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_planar_distance_ignores_height() {
        let d = planar_distance(Vec3::new(0.0, 5.0, 0.0), Vec3::new(3.0, -2.0, 4.0));
        assert!((d - 5.0).abs() < 1e-6);
    }
}
