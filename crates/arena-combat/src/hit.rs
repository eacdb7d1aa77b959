//! Melee hit resolution.
//!
//! An attack probes a single point `range` units in front of the attacker and
//! picks the closest target whose body overlaps the probe sphere.

use arena_common::{facing_from_yaw, ActorId};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Body radius assumed when a target does not declare one.
pub const DEFAULT_TARGET_RADIUS: f32 = 0.6;

/// A candidate target for hit checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetHandle {
    /// Target actor.
    pub id: ActorId,
    /// World position.
    pub position: Vec3,
    /// Body radius.
    pub hit_radius: f32,
}

impl TargetHandle {
    /// Creates a target with the default body radius.
    #[must_use]
    pub fn new(id: ActorId, position: Vec3) -> Self {
        Self {
            id,
            position,
            hit_radius: DEFAULT_TARGET_RADIUS,
        }
    }

    /// Set body radius.
    #[must_use]
    pub fn with_radius(mut self, radius: f32) -> Self {
        self.hit_radius = radius;
        self
    }
}

/// Supplies hit-check candidates to an attacker.
pub trait TargetProvider {
    /// Returns the targets `attacker` may hit. May include the attacker itself.
    fn targets_for(&self, attacker: ActorId) -> Vec<TargetHandle>;
}

/// A fixed list of targets.
#[derive(Debug, Clone, Default)]
pub struct TargetList {
    targets: Vec<TargetHandle>,
}

impl TargetList {
    /// Creates a list from handles.
    #[must_use]
    pub fn new(targets: Vec<TargetHandle>) -> Self {
        Self { targets }
    }

    /// Adds a target.
    pub fn push(&mut self, target: TargetHandle) {
        self.targets.push(target);
    }

    /// Removes every target.
    pub fn clear(&mut self) {
        self.targets.clear();
    }
}

impl TargetProvider for TargetList {
    fn targets_for(&self, attacker: ActorId) -> Vec<TargetHandle> {
        self.targets
            .iter()
            .filter(|t| t.id != attacker)
            .copied()
            .collect()
    }
}

/// Provider with no targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTargets;

impl TargetProvider for NoTargets {
    fn targets_for(&self, _attacker: ActorId) -> Vec<TargetHandle> {
        Vec::new()
    }
}

/// Returns the probe point of an attack.
#[must_use]
pub fn probe_point(position: Vec3, yaw: f32, range: f32) -> Vec3 {
    position + facing_from_yaw(yaw) * range
}

/// Finds the nearest target overlapping the probe sphere.
///
/// The attacker is never returned. On equal distances the earlier candidate
/// wins.
#[must_use]
pub fn find_target(
    attacker: ActorId,
    position: Vec3,
    yaw: f32,
    range: f32,
    radius: f32,
    targets: &[TargetHandle],
) -> Option<TargetHandle> {
    let probe = probe_point(position, yaw, range);
    let mut closest: Option<(TargetHandle, f32)> = None;

    for target in targets.iter().filter(|t| t.id != attacker) {
        let target_radius = if target.hit_radius.is_finite() && target.hit_radius >= 0.0 {
            target.hit_radius
        } else {
            DEFAULT_TARGET_RADIUS
        };
        let dist = probe.distance(target.position);
        if dist > radius + target_radius {
            continue;
        }
        match closest {
            Some((_, best)) if dist >= best => {},
            _ => closest = Some((*target, dist)),
        }
    }

    closest.map(|(target, _)| target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(raw: u32, x: f32, z: f32) -> TargetHandle {
        TargetHandle::new(ActorId::from_raw(raw), Vec3::new(x, 0.0, z))
    }

    #[test]
    fn test_probe_point_follows_yaw() {
        let p = probe_point(Vec3::ZERO, 0.0, 2.0);
        assert!((p - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-6);
    }

    #[test]
    fn test_find_nearest_target() {
        let me = ActorId::from_raw(1);
        let targets = [target(2, 0.0, 2.5), target(3, 0.0, 1.8)];
        let hit = find_target(me, Vec3::ZERO, 0.0, 1.75, 0.9, &targets);
        assert_eq!(hit.map(|t| t.id.raw()), Some(3));
    }

    #[test]
    fn test_out_of_reach() {
        let me = ActorId::from_raw(1);
        // Probe at z=1.75, reach 0.9 + 0.6 = 1.5, so z=3.3 misses.
        let targets = [target(2, 0.0, 3.3)];
        assert!(find_target(me, Vec3::ZERO, 0.0, 1.75, 0.9, &targets).is_none());

        // Behind the attacker.
        let targets = [target(2, 0.0, -1.0)];
        assert!(find_target(me, Vec3::ZERO, 0.0, 1.75, 0.9, &targets).is_none());
    }

    #[test]
    fn test_excludes_self() {
        let me = ActorId::from_raw(1);
        let targets = [target(1, 0.0, 1.75)];
        assert!(find_target(me, Vec3::ZERO, 0.0, 1.75, 0.9, &targets).is_none());
    }

    #[test]
    fn test_tie_keeps_first() {
        let me = ActorId::from_raw(1);
        let targets = [target(2, 0.5, 1.75), target(3, -0.5, 1.75)];
        let hit = find_target(me, Vec3::ZERO, 0.0, 1.75, 0.9, &targets);
        assert_eq!(hit.map(|t| t.id.raw()), Some(2));
    }

    #[test]
    fn test_target_list_filters_attacker() {
        let list = TargetList::new(vec![target(1, 0.0, 0.0), target(2, 0.0, 1.0)]);
        let targets = list.targets_for(ActorId::from_raw(1));
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].id.raw(), 2);
    }
}
