//! Damage payloads and hit impacts.

use arena_common::{ActorId, MoveId};
use serde::{Deserialize, Serialize};

use crate::moves::{
    BuffKind, HitStop, MoveDefinition, MoveFlags, DEFAULT_BLOCK_STUN, STAMINA_ON_BLOCK,
};
use crate::state::ActiveBuff;

/// Multiplier applied to declared stun values.
pub const STUN_DECAY: f32 = 0.75;
/// Shortest stun a positive declared value can produce.
pub const STUN_MIN: f32 = 0.05;
/// Longest stun any single hit can apply.
pub const STUN_MAX: f32 = 0.7;
/// Fraction of pushback kept on block when a move declares none.
pub const BLOCK_PUSH_RATIO: f32 = 0.6;

/// Converts a declared stun into the applied stun.
///
/// `clamp(v * 0.75, 0.05, 0.7)` for positive values, zero otherwise.
#[must_use]
pub fn resolve_stun(declared: f32) -> f32 {
    if !declared.is_finite() || declared <= 0.0 {
        return 0.0;
    }
    (declared * STUN_DECAY).clamp(STUN_MIN, STUN_MAX)
}

/// Everything a defender needs to resolve an incoming hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HitPayload {
    /// Attacking actor.
    pub attacker: ActorId,
    /// Defending actor.
    pub target: ActorId,
    /// Move that produced the hit.
    pub move_id: MoveId,
    /// Health damage before combo scaling.
    pub damage: f32,
    /// Guard damage before block scaling.
    pub guard_damage: f32,
    /// Chip fraction.
    pub chip_percent: f32,
    /// Declared stun on hit.
    pub hit_stun: f32,
    /// Declared stun on block.
    pub block_stun: f32,
    /// Pushback on hit.
    pub push_back: f32,
    /// Pushback on block.
    pub block_push: f32,
    /// Focus the attacker gains on hit.
    pub focus_gain: f32,
    /// Hitstop values.
    pub hit_stop: HitStop,
    /// Attacker yaw at the time of the hit.
    pub attacker_yaw: f32,
    /// Move flags.
    pub flags: MoveFlags,
    /// Stamina drained from a blocker.
    pub stamina_on_block: f32,
    /// Attacker combo multiplier.
    pub combo_scale: f32,
}

impl Default for HitPayload {
    fn default() -> Self {
        Self {
            attacker: ActorId::NULL,
            target: ActorId::NULL,
            move_id: MoveId::new("UNNAMED"),
            damage: 0.0,
            guard_damage: 0.0,
            chip_percent: 0.0,
            hit_stun: 0.0,
            block_stun: DEFAULT_BLOCK_STUN,
            push_back: 0.0,
            block_push: 0.0,
            focus_gain: 0.0,
            hit_stop: HitStop::default(),
            attacker_yaw: 0.0,
            flags: MoveFlags::default(),
            stamina_on_block: STAMINA_ON_BLOCK,
            combo_scale: 1.0,
        }
    }
}

impl HitPayload {
    /// Builds the payload for `definition` landing on `target`.
    #[must_use]
    pub fn from_move(
        definition: &MoveDefinition,
        attacker: ActorId,
        target: ActorId,
        attacker_yaw: f32,
    ) -> Self {
        let block_push = if definition.block_push > 0.0 {
            definition.block_push
        } else {
            (definition.push_back * BLOCK_PUSH_RATIO).max(0.0)
        };
        Self {
            attacker,
            target,
            move_id: definition.id.clone(),
            damage: definition.damage,
            guard_damage: definition.guard_damage,
            chip_percent: definition.chip_percent,
            hit_stun: definition.hit_stun,
            block_stun: definition.block_stun,
            push_back: definition.push_back,
            block_push,
            focus_gain: definition.focus_gain,
            hit_stop: definition.hit_stop,
            attacker_yaw,
            flags: definition.flags,
            stamina_on_block: definition.stamina_on_block,
            combo_scale: 1.0,
        }
    }

    /// A bare damage payload with default everything else.
    #[must_use]
    pub fn damage_only(attacker: ActorId, target: ActorId, damage: f32) -> Self {
        Self {
            attacker,
            target,
            damage,
            ..Self::default()
        }
    }

    /// Set combo scale.
    #[must_use]
    pub fn with_combo_scale(mut self, combo_scale: f32) -> Self {
        self.combo_scale = combo_scale;
        self
    }

    /// Multiplies damage and guard damage by every active damage buff.
    pub fn apply_damage_buffs<'a>(&mut self, buffs: impl IntoIterator<Item = &'a ActiveBuff>) {
        let mut scale = 1.0;
        let mut buffed = false;
        for buff in buffs {
            if buff.kind == BuffKind::Damage && buff.magnitude != 0.0 {
                scale *= 1.0 + buff.magnitude;
                buffed = true;
            }
        }
        if buffed {
            self.damage = (self.damage * scale).round();
            self.guard_damage = (self.guard_damage * scale).round();
        }
    }

    /// Replaces non-finite or out-of-range fields with baseline values.
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        let baseline = Self::default();
        self.damage = finite_or(self.damage, 0.0).max(0.0);
        self.guard_damage = finite_or(self.guard_damage, 0.0).max(0.0);
        self.chip_percent = finite_or(self.chip_percent, 0.0).clamp(0.0, 1.0);
        self.hit_stun = finite_or(self.hit_stun, 0.0);
        self.block_stun = finite_or(self.block_stun, baseline.block_stun);
        self.push_back = finite_or(self.push_back, 0.0);
        self.block_push = finite_or(self.block_push, self.push_back * BLOCK_PUSH_RATIO);
        self.focus_gain = finite_or(self.focus_gain, 0.0).max(0.0);
        self.hit_stop.on_hit = finite_or(self.hit_stop.on_hit, 0.0);
        self.hit_stop.on_block = finite_or(self.hit_stop.on_block, 0.0);
        self.attacker_yaw = finite_or(self.attacker_yaw, 0.0);
        self.stamina_on_block = finite_or(self.stamina_on_block, baseline.stamina_on_block);
        self.combo_scale = finite_or(self.combo_scale, 1.0).max(0.0);
        self
    }
}

fn finite_or(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}

/// Outcome of resolving a hit on a defender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HitImpact {
    /// The hit landed unblocked.
    pub hit: bool,
    /// The hit was blocked.
    pub blocked: bool,
    /// The block was a parry.
    pub parry: bool,
    /// Chip damage taken through the block.
    pub chip: f32,
    /// Damage taken unblocked.
    pub damage: f32,
    /// Health after resolution.
    pub hp: f32,
    /// Guard after resolution.
    pub guard: f32,
}

impl HitImpact {
    /// An impact that changed nothing.
    #[must_use]
    pub fn none(hp: f32, guard: f32) -> Self {
        Self {
            hp,
            guard,
            ..Self::default()
        }
    }

    /// Whether the hit had any effect.
    #[must_use]
    pub fn connected(&self) -> bool {
        self.hit || self.blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_common::BuffId;

    #[test]
    fn test_resolve_stun() {
        assert!((resolve_stun(0.52) - 0.39).abs() < 1e-6);
        assert!((resolve_stun(2.0) - STUN_MAX).abs() < f32::EPSILON);
        assert!((resolve_stun(0.01) - STUN_MIN).abs() < f32::EPSILON);
        assert!(resolve_stun(0.0).abs() < f32::EPSILON);
        assert!(resolve_stun(f32::NAN).abs() < f32::EPSILON);
    }

    #[test]
    fn test_payload_from_move() {
        let payload = HitPayload::from_move(
            &MoveDefinition::heavy(),
            ActorId::from_raw(1),
            ActorId::from_raw(2),
            0.0,
        );
        assert!((payload.guard_damage - 36.0).abs() < f32::EPSILON);
        assert!((payload.stamina_on_block - 20.0).abs() < f32::EPSILON);
        assert!((payload.combo_scale - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_block_push_defaults_from_push_back() {
        let def = MoveDefinition::new("SHOVE").with_push(2.0, 0.0);
        let payload = HitPayload::from_move(&def, ActorId::from_raw(1), ActorId::from_raw(2), 0.0);
        assert!((payload.block_push - 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_damage_buffs_round() {
        let mut payload = HitPayload::from_move(
            &MoveDefinition::light(),
            ActorId::from_raw(1),
            ActorId::from_raw(2),
            0.0,
        );
        let buff = ActiveBuff {
            id: BuffId::new("FIRE_BLADE_BUFF"),
            kind: BuffKind::Damage,
            magnitude: 0.25,
            duration: 5.0,
            remaining: 5.0,
        };
        payload.apply_damage_buffs([&buff]);
        // 12 * 1.25 = 15, 24 * 1.25 = 30
        assert!((payload.damage - 15.0).abs() < f32::EPSILON);
        assert!((payload.guard_damage - 30.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_sanitize_non_finite() {
        let payload = HitPayload {
            damage: f32::NAN,
            block_stun: f32::INFINITY,
            combo_scale: f32::NAN,
            ..HitPayload::default()
        }
        .sanitized();
        assert!(payload.damage.abs() < f32::EPSILON);
        assert!((payload.block_stun - DEFAULT_BLOCK_STUN).abs() < f32::EPSILON);
        assert!((payload.combo_scale - 1.0).abs() < f32::EPSILON);
    }
}
