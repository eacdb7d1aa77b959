//! Per-actor combat state: resource pools, timers, attack state and snapshots.

use arena_common::{BuffId, SpecialId};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::moves::{AttackKind, BuffKind, MoveDefinition};

/// Default maximum health.
pub const HP_MAX: f32 = 100.0;
/// Default maximum stamina.
pub const STAMINA_MAX: f32 = 100.0;
/// Default maximum focus.
pub const FOCUS_MAX: f32 = 50.0;
/// Default maximum guard gauge.
pub const GUARD_MAX: f32 = 120.0;

// ============================================================================
// Resource Pools
// ============================================================================

/// A bounded resource. `0 <= value <= max` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourcePool {
    value: f32,
    max: f32,
}

impl ResourcePool {
    /// Creates a full pool.
    #[must_use]
    pub fn full(max: f32) -> Self {
        let max = sanitize_max(max);
        Self { value: max, max }
    }

    /// Creates a pool with a starting value, clamped into range.
    #[must_use]
    pub fn new(value: f32, max: f32) -> Self {
        let mut pool = Self::full(max);
        pool.set(value);
        pool
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// Maximum value.
    #[must_use]
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Fill ratio in `[0, 1]`.
    #[must_use]
    pub fn ratio(&self) -> f32 {
        if self.max > 0.0 {
            self.value / self.max
        } else {
            0.0
        }
    }

    /// Whether the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value <= 0.0
    }

    /// Sets the value, clamped. Non-finite values are ignored.
    pub fn set(&mut self, value: f32) {
        if value.is_finite() {
            self.value = value.clamp(0.0, self.max);
        }
    }

    /// Changes the maximum and re-clamps the value.
    pub fn set_max(&mut self, max: f32) {
        self.max = sanitize_max(max);
        self.value = self.value.min(self.max);
    }

    /// Adds `amount` (may be negative), clamped.
    pub fn add(&mut self, amount: f32) {
        self.set(self.value + amount);
    }

    /// Subtracts `amount`, clamped at zero.
    pub fn drain(&mut self, amount: f32) {
        self.add(-amount);
    }

    /// Restores the pool to max.
    pub fn fill(&mut self) {
        self.value = self.max;
    }

    /// Consumes `cost` if affordable.
    ///
    /// With `force`, the cost is always paid and the pool clamps at zero.
    /// Returns `false` without side effects when not affordable.
    pub fn try_consume(&mut self, cost: f32, force: bool) -> bool {
        if !cost.is_finite() || cost <= 0.0 {
            return true;
        }
        if force {
            self.drain(cost);
            return true;
        }
        if self.value < cost {
            return false;
        }
        self.drain(cost);
        true
    }
}

fn sanitize_max(max: f32) -> f32 {
    if max.is_finite() {
        max.max(1.0)
    } else {
        1.0
    }
}

// ============================================================================
// Timers
// ============================================================================

/// Countdown timers of an actor (seconds, never negative).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CombatTimers {
    /// Remaining block window.
    pub block: f32,
    /// Remaining dodge.
    pub dodge: f32,
    /// Remaining invulnerability.
    pub invuln: f32,
    /// Remaining hitstop freeze.
    pub hit_stop: f32,
    /// Remaining stun.
    pub stun: f32,
    /// Delay before guard regeneration resumes.
    pub guard_regen_delay: f32,
}

impl CombatTimers {
    /// Counts the action timers down. Guard regen delay is handled by regen.
    pub fn tick(&mut self, dt: f32) {
        self.hit_stop = (self.hit_stop - dt).max(0.0);
        self.block = (self.block - dt).max(0.0);
        self.dodge = (self.dodge - dt).max(0.0);
        self.invuln = (self.invuln - dt).max(0.0);
        self.stun = (self.stun - dt).max(0.0);
    }

    /// Raises the stun timer to at least `duration`.
    pub fn extend_stun(&mut self, duration: f32) {
        if duration > 0.0 {
            self.stun = self.stun.max(duration);
        }
    }

    /// Raises the hitstop timer to at least `duration`.
    pub fn extend_hit_stop(&mut self, duration: f32) {
        if duration > 0.0 {
            self.hit_stop = self.hit_stop.max(duration);
        }
    }

    /// Raises the guard regen delay to at least `delay`.
    pub fn delay_guard_regen(&mut self, delay: f32) {
        if delay > 0.0 {
            self.guard_regen_delay = self.guard_regen_delay.max(delay);
        }
    }
}

// ============================================================================
// Attack State
// ============================================================================

/// Phase of an attack in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackPhase {
    /// Windup before the hit window.
    Startup,
    /// Hit window.
    Active,
    /// Recovery after the hit window.
    Recovery,
}

/// What started an attack.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackOrigin {
    /// A basic attack.
    Basic(AttackKind),
    /// A special move.
    Special(SpecialId),
}

impl fmt::Display for AttackOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic(kind) => f.write_str(kind.input_action().as_str()),
            Self::Special(id) => write!(f, "{id}"),
        }
    }
}

/// An attack in progress.
///
/// Controllers hold this as an `Option`, so "active" and "has a phase" are the
/// same fact.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAttack {
    /// What started the attack.
    pub origin: AttackOrigin,
    /// Move being performed.
    pub definition: MoveDefinition,
    /// Current phase.
    pub phase: AttackPhase,
    /// Time left in the current phase.
    pub phase_timer: f32,
    /// Whether the single hit of this attack has landed.
    pub has_hit: bool,
    /// Time left until the attack ends.
    pub remaining_total: f32,
}

impl ActiveAttack {
    /// Starts an attack in the startup phase.
    #[must_use]
    pub fn new(origin: AttackOrigin, definition: MoveDefinition) -> Self {
        Self {
            origin,
            phase: AttackPhase::Startup,
            phase_timer: definition.startup.max(0.0),
            has_hit: false,
            remaining_total: definition.total_duration().max(0.0),
            definition,
        }
    }
}

// ============================================================================
// Buffs
// ============================================================================

/// A buff currently applied to an actor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveBuff {
    /// Buff identifier.
    pub id: BuffId,
    /// Effect kind.
    pub kind: BuffKind,
    /// Effect strength.
    pub magnitude: f32,
    /// Full lifetime.
    pub duration: f32,
    /// Time left.
    pub remaining: f32,
}

// ============================================================================
// Controller State
// ============================================================================

/// High-level state of an actor's controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Standing still.
    Idle,
    /// Moving.
    Moving,
    /// Performing an attack.
    Attack(AttackPhase),
    /// Raising the guard.
    BlockStart,
    /// Holding the guard.
    BlockIdle,
    /// Absorbing a blocked hit.
    BlockHit,
    /// Dodging.
    Dodge,
    /// Hit-stunned.
    Stunned,
    /// Defeated. Terminal until reset.
    Dead,
}

impl ControllerState {
    /// Whether this is a block sub-state.
    #[must_use]
    pub fn is_block(self) -> bool {
        matches!(self, Self::BlockStart | Self::BlockIdle | Self::BlockHit)
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("Idle"),
            Self::Moving => f.write_str("Moving"),
            Self::Attack(AttackPhase::Startup) => f.write_str("Windup"),
            Self::Attack(AttackPhase::Active) => f.write_str("Active"),
            Self::Attack(AttackPhase::Recovery) => f.write_str("Recovery"),
            Self::BlockStart => f.write_str("BlockStart"),
            Self::BlockIdle => f.write_str("BlockIdle"),
            Self::BlockHit => f.write_str("BlockHit"),
            Self::Dodge => f.write_str("Dodge"),
            Self::Stunned => f.write_str("Stunned"),
            Self::Dead => f.write_str("Dead"),
        }
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Read-only copy of an actor's pools and timers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CombatSnapshot {
    /// Health.
    pub hp: f32,
    /// Maximum health.
    pub max_hp: f32,
    /// Stamina.
    pub stamina: f32,
    /// Maximum stamina.
    pub max_stamina: f32,
    /// Focus.
    pub focus: f32,
    /// Maximum focus.
    pub max_focus: f32,
    /// Guard gauge.
    pub guard: f32,
    /// Maximum guard gauge.
    pub guard_max: f32,
    /// Timers.
    pub timers: CombatTimers,
    /// Controller state.
    pub state: ControllerState,
}

impl CombatSnapshot {
    /// Whether the actor is dead.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.hp <= 0.0
    }

    /// Health ratio.
    #[must_use]
    pub fn hp_ratio(&self) -> f32 {
        ratio(self.hp, self.max_hp)
    }

    /// Stamina ratio.
    #[must_use]
    pub fn stamina_ratio(&self) -> f32 {
        ratio(self.stamina, self.max_stamina)
    }

    /// Focus ratio.
    #[must_use]
    pub fn focus_ratio(&self) -> f32 {
        ratio(self.focus, self.max_focus)
    }
}

fn ratio(value: f32, max: f32) -> f32 {
    if value > 0.0 {
        value / max.max(1.0)
    } else {
        0.0
    }
}

/// Read-only view of the attack in progress.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AttackSnapshot {
    /// Whether an attack is in progress.
    pub active: bool,
    /// Current phase.
    pub phase: Option<AttackPhase>,
    /// Time left in the phase.
    pub phase_timer: f32,
    /// Time left in the attack.
    pub total_remaining: f32,
    /// What started the attack.
    pub kind: Option<AttackOrigin>,
}

impl From<Option<&ActiveAttack>> for AttackSnapshot {
    fn from(attack: Option<&ActiveAttack>) -> Self {
        match attack {
            Some(attack) => Self {
                active: true,
                phase: Some(attack.phase),
                phase_timer: attack.phase_timer,
                total_remaining: attack.remaining_total,
                kind: Some(attack.origin.clone()),
            },
            None => Self::default(),
        }
    }
}

/// Buff entry of a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffStatus {
    /// Buff identifier.
    pub id: BuffId,
    /// Effect kind.
    pub kind: BuffKind,
    /// Time left.
    pub remaining: f32,
    /// Full lifetime.
    pub duration: f32,
}

/// Cooldown entry of a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CooldownStatus {
    /// Special identifier.
    pub id: SpecialId,
    /// Time left.
    pub remaining: f32,
}

/// Buffs and special cooldowns of an actor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Active buffs.
    pub buffs: Vec<BuffStatus>,
    /// Specials on cooldown.
    pub cooldowns: Vec<CooldownStatus>,
}

// ============================================================================
// Reset Overrides
// ============================================================================

/// Values applied by a round reset. Unset fields keep the current values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetOverrides {
    /// Maximum health.
    pub max_hp: Option<f32>,
    /// Health.
    pub hp: Option<f32>,
    /// Maximum stamina.
    pub max_stamina: Option<f32>,
    /// Stamina.
    pub stamina: Option<f32>,
    /// Maximum focus.
    pub max_focus: Option<f32>,
    /// Focus.
    pub focus: Option<f32>,
    /// Maximum guard.
    pub guard_max: Option<f32>,
    /// Guard gauge.
    pub guard: Option<f32>,
    /// Initial guard regen delay.
    pub guard_regen_delay: Option<f32>,
}

impl ResetOverrides {
    /// Overrides that refill every pool.
    #[must_use]
    pub fn full() -> Self {
        Self {
            hp: Some(f32::MAX),
            stamina: Some(f32::MAX),
            guard: Some(f32::MAX),
            ..Self::default()
        }
    }

    /// Set health.
    #[must_use]
    pub fn with_hp(mut self, hp: f32) -> Self {
        self.hp = Some(hp);
        self
    }

    /// Set stamina.
    #[must_use]
    pub fn with_stamina(mut self, stamina: f32) -> Self {
        self.stamina = Some(stamina);
        self
    }

    /// Set focus.
    #[must_use]
    pub fn with_focus(mut self, focus: f32) -> Self {
        self.focus = Some(focus);
        self
    }

    /// Set maximum focus.
    #[must_use]
    pub fn with_max_focus(mut self, max_focus: f32) -> Self {
        self.max_focus = Some(max_focus);
        self
    }

    /// Set guard.
    #[must_use]
    pub fn with_guard(mut self, guard: f32) -> Self {
        self.guard = Some(guard);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_clamps() {
        let mut pool = ResourcePool::full(100.0);
        pool.add(50.0);
        assert!((pool.value() - 100.0).abs() < f32::EPSILON);
        pool.drain(250.0);
        assert!(pool.value().abs() < f32::EPSILON);
        pool.set(f32::NAN);
        assert!(pool.value().abs() < f32::EPSILON);
    }

    #[test]
    fn test_try_consume() {
        let mut pool = ResourcePool::new(10.0, 100.0);
        assert!(!pool.try_consume(12.0, false));
        assert!((pool.value() - 10.0).abs() < f32::EPSILON);

        assert!(pool.try_consume(8.0, false));
        assert!((pool.value() - 2.0).abs() < 1e-6);

        assert!(pool.try_consume(18.0, true));
        assert!(pool.value().abs() < f32::EPSILON);
    }

    #[test]
    fn test_set_max_reclamps() {
        let mut pool = ResourcePool::full(100.0);
        pool.set_max(40.0);
        assert!((pool.value() - 40.0).abs() < f32::EPSILON);
        pool.set_max(-3.0);
        assert!((pool.max() - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_timers_tick_to_zero() {
        let mut timers = CombatTimers {
            block: 0.1,
            stun: 0.5,
            ..CombatTimers::default()
        };
        timers.tick(0.2);
        assert!(timers.block.abs() < f32::EPSILON);
        assert!((timers.stun - 0.3).abs() < 1e-6);

        timers.extend_stun(0.1);
        assert!((timers.stun - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_attack_snapshot() {
        let idle = AttackSnapshot::from(None);
        assert!(!idle.active);
        assert!(idle.phase.is_none());

        let attack = ActiveAttack::new(
            AttackOrigin::Basic(AttackKind::Light),
            MoveDefinition::light(),
        );
        let snap = AttackSnapshot::from(Some(&attack));
        assert!(snap.active);
        assert_eq!(snap.phase, Some(AttackPhase::Startup));
        assert!((snap.phase_timer - 0.12).abs() < 1e-6);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ControllerState::Attack(AttackPhase::Startup).to_string(), "Windup");
        assert!(ControllerState::BlockHit.is_block());
        assert!(!ControllerState::Dodge.is_block());
    }
}
