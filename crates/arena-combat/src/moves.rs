//! Move and special definitions.
//!
//! This module provides:
//! - Immutable attack definitions (damage, timing, costs, flags)
//! - Special moves bound to input patterns and focus costs
//! - A registry built once at startup and shared by every controller

use arena_common::{BuffId, MoveId, SpecialId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Default melee probe distance in front of the attacker.
pub const MELEE_RANGE: f32 = 1.75;
/// Default melee probe radius.
pub const MELEE_RADIUS: f32 = 0.9;
/// Block stun used when a payload does not provide one.
pub const DEFAULT_BLOCK_STUN: f32 = 0.2;
/// Stamina drained from a blocker by ordinary moves.
pub const STAMINA_ON_BLOCK: f32 = 10.0;
/// Stamina drained from a blocker by heavy-class moves.
pub const HEAVY_STAMINA_ON_BLOCK: f32 = 20.0;

// ============================================================================
// Input Actions
// ============================================================================

/// A discrete, executed combat action recorded into the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InputAction {
    /// Light attack.
    Light,
    /// Heavy attack.
    Heavy,
    /// Block.
    Block,
    /// Dodge.
    Dodge,
}

impl InputAction {
    /// Upper-case name used in logs and persisted data.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "LIGHT",
            Self::Heavy => "HEAVY",
            Self::Block => "BLOCK",
            Self::Dodge => "DODGE",
        }
    }
}

/// Basic attack kinds a controller can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttackKind {
    /// Fast, cheap attack.
    Light,
    /// Slow, expensive attack.
    Heavy,
}

impl AttackKind {
    /// Registry ID of the move performed for this kind.
    #[must_use]
    pub fn move_id(self) -> MoveId {
        MoveId::new(self.input_action().as_str())
    }

    /// Input action recorded when this attack starts.
    #[must_use]
    pub fn input_action(self) -> InputAction {
        match self {
            Self::Light => InputAction::Light,
            Self::Heavy => InputAction::Heavy,
        }
    }
}

// ============================================================================
// Move Definitions
// ============================================================================

/// Hitstop durations applied on impact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HitStop {
    /// Freeze applied when the hit lands unblocked (seconds).
    pub on_hit: f32,
    /// Freeze applied when the hit is blocked (seconds).
    pub on_block: f32,
}

impl HitStop {
    /// Creates hitstop values.
    #[must_use]
    pub const fn new(on_hit: f32, on_block: f32) -> Self {
        Self { on_hit, on_block }
    }
}

/// Behavioural flags of a move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveFlags {
    /// Ignores the defender's block.
    pub unblockable: bool,
    /// Lands through dodge i-frames.
    pub ignore_invuln: bool,
    /// Cannot be parried.
    pub disable_parry: bool,
    /// Checks for hits on every active tick instead of once.
    pub multi_hit: bool,
}

/// Immutable definition of an attack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveDefinition {
    /// Move identifier.
    pub id: MoveId,
    /// Stamina consumed on start.
    pub stamina_cost: f32,
    /// Health damage on an unblocked hit.
    pub damage: f32,
    /// Guard gauge damage on a blocked hit.
    pub guard_damage: f32,
    /// Fraction of damage that leaks through a block.
    pub chip_percent: f32,
    /// Windup duration (seconds).
    pub startup: f32,
    /// Active (hitting) duration (seconds).
    pub active: f32,
    /// Recovery duration (seconds).
    pub recovery: f32,
    /// Declared stun on an unblocked hit.
    pub hit_stun: f32,
    /// Declared stun on a blocked hit.
    pub block_stun: f32,
    /// Pushback distance on hit.
    pub push_back: f32,
    /// Pushback distance on block.
    pub block_push: f32,
    /// Hitstop values.
    pub hit_stop: HitStop,
    /// Probe distance in front of the attacker.
    pub range: f32,
    /// Probe radius.
    pub radius: f32,
    /// Focus granted to the attacker on an unblocked hit.
    pub focus_gain: f32,
    /// Stamina drained from a blocker.
    pub stamina_on_block: f32,
    /// Behavioural flags.
    pub flags: MoveFlags,
}

impl Default for MoveDefinition {
    fn default() -> Self {
        Self {
            id: MoveId::new("UNNAMED"),
            stamina_cost: 0.0,
            damage: 0.0,
            guard_damage: 0.0,
            chip_percent: 0.0,
            startup: 0.0,
            active: 0.0,
            recovery: 0.0,
            hit_stun: 0.0,
            block_stun: DEFAULT_BLOCK_STUN,
            push_back: 0.0,
            block_push: 0.0,
            hit_stop: HitStop::default(),
            range: MELEE_RANGE,
            radius: MELEE_RADIUS,
            focus_gain: 0.0,
            stamina_on_block: STAMINA_ON_BLOCK,
            flags: MoveFlags::default(),
        }
    }
}

impl MoveDefinition {
    /// Creates an empty move with the given ID.
    #[must_use]
    pub fn new(id: impl Into<MoveId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// The stock light attack.
    #[must_use]
    pub fn light() -> Self {
        Self::new("LIGHT")
            .with_cost(8.0)
            .with_damage(12.0, 24.0)
            .with_chip(0.07)
            .with_timing(0.12, 0.16, 0.26)
            .with_stun(0.52, 0.28)
            .with_push(0.85, 0.55)
            .with_hit_stop(HitStop::new(0.045, 0.025))
            .with_reach(MELEE_RANGE, MELEE_RADIUS)
            .with_focus_gain(4.0)
    }

    /// The stock heavy attack.
    #[must_use]
    pub fn heavy() -> Self {
        Self::new("HEAVY")
            .with_cost(18.0)
            .with_damage(22.0, 36.0)
            .with_chip(0.12)
            .with_timing(0.22, 0.22, 0.48)
            .with_stun(0.85, 0.36)
            .with_push(1.35, 0.9)
            .with_hit_stop(HitStop::new(0.065, 0.032))
            .with_reach(1.9, 0.95)
            .with_focus_gain(8.0)
            .with_stamina_on_block(HEAVY_STAMINA_ON_BLOCK)
    }

    /// Set stamina cost.
    #[must_use]
    pub fn with_cost(mut self, stamina_cost: f32) -> Self {
        self.stamina_cost = stamina_cost;
        self
    }

    /// Set health and guard damage.
    #[must_use]
    pub fn with_damage(mut self, damage: f32, guard_damage: f32) -> Self {
        self.damage = damage;
        self.guard_damage = guard_damage;
        self
    }

    /// Set chip fraction.
    #[must_use]
    pub fn with_chip(mut self, chip_percent: f32) -> Self {
        self.chip_percent = chip_percent;
        self
    }

    /// Set phase durations.
    #[must_use]
    pub fn with_timing(mut self, startup: f32, active: f32, recovery: f32) -> Self {
        self.startup = startup.max(0.0);
        self.active = active.max(0.0);
        self.recovery = recovery.max(0.0);
        self
    }

    /// Set declared stun values.
    #[must_use]
    pub fn with_stun(mut self, hit_stun: f32, block_stun: f32) -> Self {
        self.hit_stun = hit_stun;
        self.block_stun = block_stun;
        self
    }

    /// Set pushback distances.
    #[must_use]
    pub fn with_push(mut self, push_back: f32, block_push: f32) -> Self {
        self.push_back = push_back;
        self.block_push = block_push;
        self
    }

    /// Set hitstop.
    #[must_use]
    pub fn with_hit_stop(mut self, hit_stop: HitStop) -> Self {
        self.hit_stop = hit_stop;
        self
    }

    /// Set probe range and radius.
    #[must_use]
    pub fn with_reach(mut self, range: f32, radius: f32) -> Self {
        self.range = range;
        self.radius = radius;
        self
    }

    /// Set focus gain.
    #[must_use]
    pub fn with_focus_gain(mut self, focus_gain: f32) -> Self {
        self.focus_gain = focus_gain;
        self
    }

    /// Set stamina drained from a blocker.
    #[must_use]
    pub fn with_stamina_on_block(mut self, stamina: f32) -> Self {
        self.stamina_on_block = stamina;
        self
    }

    /// Set flags.
    #[must_use]
    pub fn with_flags(mut self, flags: MoveFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sum of the three phase durations.
    #[must_use]
    pub fn total_duration(&self) -> f32 {
        self.startup + self.active + self.recovery
    }
}

// ============================================================================
// Special Definitions
// ============================================================================

/// Focus cost of a special.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusCost {
    /// Fixed amount of focus.
    Flat(f32),
    /// Fraction of the actor's maximum focus, rounded.
    Percent(f32),
}

impl FocusCost {
    /// Resolves the cost for an actor with `max_focus`.
    #[must_use]
    pub fn resolve(self, max_focus: f32) -> f32 {
        let cost = match self {
            Self::Flat(amount) => amount,
            Self::Percent(pct) => (pct * max_focus).round(),
        };
        if cost.is_finite() {
            cost.max(0.0)
        } else {
            0.0
        }
    }
}

impl Default for FocusCost {
    fn default() -> Self {
        Self::Flat(0.0)
    }
}

/// Kind of effect a buff applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuffKind {
    /// Multiplies outgoing damage and guard damage by `1 + magnitude`.
    Damage,
    /// Tracked and reported but has no built-in effect.
    Custom(String),
}

/// Buff granted by a special.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuffDescriptor {
    /// Buff identifier.
    pub id: BuffId,
    /// Effect kind.
    pub kind: BuffKind,
    /// Effect strength.
    pub magnitude: f32,
    /// Lifetime (seconds).
    pub duration: f32,
}

/// A special move triggered by an input pattern or by request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialDefinition {
    /// Special identifier.
    pub id: SpecialId,
    /// Ordered input pattern that triggers the special.
    pub pattern: Vec<InputAction>,
    /// Focus cost.
    pub focus_cost: FocusCost,
    /// Cooldown after use (seconds).
    pub cooldown: f32,
    /// The attack performed.
    pub payload: MoveDefinition,
    /// Optional buff applied on start.
    #[serde(default)]
    pub buff: Option<BuffDescriptor>,
}

impl SpecialDefinition {
    /// Creates a special with no pattern, cost or buff.
    #[must_use]
    pub fn new(id: impl Into<SpecialId>, payload: MoveDefinition) -> Self {
        Self {
            id: id.into(),
            pattern: Vec::new(),
            focus_cost: FocusCost::default(),
            cooldown: 0.0,
            payload,
            buff: None,
        }
    }

    /// Set trigger pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: Vec<InputAction>) -> Self {
        self.pattern = pattern;
        self
    }

    /// Set focus cost.
    #[must_use]
    pub fn with_focus_cost(mut self, cost: FocusCost) -> Self {
        self.focus_cost = cost;
        self
    }

    /// Set cooldown.
    #[must_use]
    pub fn with_cooldown(mut self, cooldown: f32) -> Self {
        self.cooldown = cooldown.max(0.0);
        self
    }

    /// Set buff.
    #[must_use]
    pub fn with_buff(mut self, buff: BuffDescriptor) -> Self {
        self.buff = Some(buff);
        self
    }

    /// LIGHT, LIGHT, HEAVY: a flaming slash that also empowers later strikes.
    #[must_use]
    pub fn fire_blade() -> Self {
        let payload = MoveDefinition::new("FIRE_BLADE")
            .with_damage(32.0, 48.0)
            .with_chip(0.2)
            .with_timing(0.32, 0.28, 0.65)
            .with_stun(1.1, 0.52)
            .with_push(1.6, 1.2)
            .with_hit_stop(HitStop::new(0.08, 0.04))
            .with_reach(2.0, 0.95)
            .with_focus_gain(10.0);
        Self::new("FIRE_BLADE", payload)
            .with_pattern(vec![InputAction::Light, InputAction::Light, InputAction::Heavy])
            .with_focus_cost(FocusCost::Percent(0.5))
            .with_cooldown(6.0)
            .with_buff(BuffDescriptor {
                id: BuffId::new("FIRE_BLADE_BUFF"),
                kind: BuffKind::Damage,
                magnitude: 0.25,
                duration: 5.0,
            })
    }

    /// BLOCK, LIGHT: a guard-crushing shove that ignores i-frames.
    #[must_use]
    pub fn power_push() -> Self {
        let payload = MoveDefinition::new("POWER_PUSH")
            .with_damage(18.0, 60.0)
            .with_timing(0.25, 0.2, 0.55)
            .with_stun(1.35, 0.75)
            .with_push(2.2, 1.8)
            .with_hit_stop(HitStop::new(0.09, 0.05))
            .with_reach(MELEE_RANGE, MELEE_RADIUS)
            .with_flags(MoveFlags {
                ignore_invuln: true,
                ..MoveFlags::default()
            });
        Self::new("POWER_PUSH", payload)
            .with_pattern(vec![InputAction::Block, InputAction::Light])
            .with_focus_cost(FocusCost::Percent(0.3))
            .with_cooldown(5.0)
    }
}

/// Reference to a special: either by registry ID or carried inline.
#[derive(Debug, Clone, PartialEq)]
pub enum SpecialRef {
    /// Look the special up in the registry.
    ById(SpecialId),
    /// Use this definition directly.
    ByValue(Box<SpecialDefinition>),
}

impl From<SpecialId> for SpecialRef {
    fn from(id: SpecialId) -> Self {
        Self::ById(id)
    }
}

impl From<&str> for SpecialRef {
    fn from(id: &str) -> Self {
        Self::ById(SpecialId::new(id))
    }
}

impl From<SpecialDefinition> for SpecialRef {
    fn from(def: SpecialDefinition) -> Self {
        Self::ByValue(Box::new(def))
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Registry of moves and specials.
///
/// Built once and shared (behind an `Arc`) by every controller.
#[derive(Debug, Clone, Default)]
pub struct MoveRegistry {
    moves: HashMap<MoveId, MoveDefinition>,
    /// Kept in registration order so pattern checks are deterministic.
    specials: Vec<SpecialDefinition>,
}

impl MoveRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with LIGHT, HEAVY, FIRE_BLADE and POWER_PUSH.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_move(MoveDefinition::light());
        registry.register_move(MoveDefinition::heavy());
        registry.register_special(SpecialDefinition::fire_blade());
        registry.register_special(SpecialDefinition::power_push());
        registry
    }

    /// Registers or replaces a move.
    pub fn register_move(&mut self, def: MoveDefinition) {
        self.moves.insert(def.id.clone(), def);
    }

    /// Registers or replaces a special.
    pub fn register_special(&mut self, def: SpecialDefinition) {
        if let Some(existing) = self.specials.iter_mut().find(|s| s.id == def.id) {
            *existing = def;
        } else {
            self.specials.push(def);
        }
    }

    /// Looks up a move.
    #[must_use]
    pub fn get_move(&self, id: &MoveId) -> Option<&MoveDefinition> {
        self.moves.get(id)
    }

    /// Looks up the move for a basic attack kind.
    #[must_use]
    pub fn attack(&self, kind: AttackKind) -> Option<&MoveDefinition> {
        self.get_move(&kind.move_id())
    }

    /// Looks up a special.
    #[must_use]
    pub fn get_special(&self, id: &SpecialId) -> Option<&SpecialDefinition> {
        self.specials.iter().find(|s| &s.id == id)
    }

    /// Resolves a special reference, logging when an ID is unknown.
    #[must_use]
    pub fn resolve_special<'a>(&'a self, special: &'a SpecialRef) -> Option<&'a SpecialDefinition> {
        match special {
            SpecialRef::ByValue(def) => Some(def),
            SpecialRef::ById(id) => {
                let found = self.get_special(id);
                if found.is_none() {
                    warn!("No special definition registered for {id}");
                }
                found
            },
        }
    }

    /// Iterates specials in registration order.
    pub fn specials(&self) -> impl Iterator<Item = &SpecialDefinition> {
        self.specials.iter()
    }

    /// Number of registered moves.
    #[must_use]
    pub fn move_count(&self) -> usize {
        self.moves.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_registry() {
        let registry = MoveRegistry::with_defaults();
        assert_eq!(registry.move_count(), 2);
        assert_eq!(registry.specials().count(), 2);

        let light = registry.attack(AttackKind::Light);
        assert!(light.is_some_and(|m| (m.damage - 12.0).abs() < f32::EPSILON));
        let heavy = registry.attack(AttackKind::Heavy);
        assert!(heavy.is_some_and(|m| (m.stamina_on_block - 20.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_total_duration() {
        let light = MoveDefinition::light();
        assert!((light.total_duration() - 0.54).abs() < 1e-6);
    }

    #[test]
    fn test_focus_cost_resolution() {
        assert!((FocusCost::Percent(0.5).resolve(50.0) - 25.0).abs() < f32::EPSILON);
        assert!((FocusCost::Percent(0.3).resolve(50.0) - 15.0).abs() < f32::EPSILON);
        assert!((FocusCost::Flat(7.0).resolve(50.0) - 7.0).abs() < f32::EPSILON);
        assert!(FocusCost::Flat(f32::NAN).resolve(50.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_resolve_special_ref() {
        let registry = MoveRegistry::with_defaults();

        let by_id = SpecialRef::from("FIRE_BLADE");
        let resolved = registry.resolve_special(&by_id);
        assert_eq!(resolved.map(|s| s.cooldown), Some(6.0));

        let missing = SpecialRef::from("NOPE");
        assert!(registry.resolve_special(&missing).is_none());

        let inline = SpecialRef::from(SpecialDefinition::new("CUSTOM", MoveDefinition::light()));
        assert_eq!(
            registry.resolve_special(&inline).map(|s| s.id.as_str()),
            Some("CUSTOM")
        );
    }

    #[test]
    fn test_register_special_replaces() {
        let mut registry = MoveRegistry::with_defaults();
        registry.register_special(SpecialDefinition::fire_blade().with_cooldown(1.0));
        assert_eq!(registry.specials().count(), 2);
        let fire = registry.get_special(&SpecialId::new("FIRE_BLADE"));
        assert_eq!(fire.map(|s| s.cooldown), Some(1.0));
    }

    #[test]
    fn test_special_patterns() {
        let fire = SpecialDefinition::fire_blade();
        assert_eq!(
            fire.pattern,
            vec![InputAction::Light, InputAction::Light, InputAction::Heavy]
        );
        let push = SpecialDefinition::power_push();
        assert!(push.payload.flags.ignore_invuln);
    }
}
