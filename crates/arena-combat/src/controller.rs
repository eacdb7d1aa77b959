//! Per-actor combat state machine.
//!
//! The controller owns an actor's pools, timers, attack, buffs, cooldowns and
//! input buffer. It is mutated only by its own requests, by incoming hits, and
//! once per tick by [`ActorCombatController::update`].

use arena_common::{
    facing_from_yaw, flatten, step_yaw, wrap_angle, yaw_from_direction, yaw_rotation, ActorId,
    BuffId, SpecialId,
};
use glam::Vec3;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::combo::ComboRecognizer;
use crate::config::{ControllerConfig, PushbackPolicy};
use crate::damage::{resolve_stun, HitImpact, HitPayload};
use crate::error::CombatResult;
use crate::events::{CombatEvent, EventSink};
use crate::hit::{find_target, TargetProvider};
use crate::moves::{
    AttackKind, InputAction, MoveDefinition, MoveRegistry, SpecialDefinition, SpecialRef,
};
use crate::physics::{PhysicsWorld, RootMotionSource};
use crate::state::{
    ActiveAttack, ActiveBuff, AttackOrigin, AttackPhase, AttackSnapshot, BuffStatus,
    CombatSnapshot, CombatTimers, ControllerState, CooldownStatus, ResetOverrides, ResourcePool,
    StatusSnapshot,
};

/// Guard regen delay applied when a block starts (seconds).
pub const BLOCK_START_REGEN_DELAY: f32 = 0.35;
/// Longest BlockStart presentation (seconds).
pub const BLOCK_START_TIME: f32 = 0.25;
/// BlockHit presentation after a parry (seconds).
pub const BLOCK_HIT_PARRY_TIME: f32 = 0.18;
/// BlockHit presentation after an ordinary block (seconds).
pub const BLOCK_HIT_TIME: f32 = 0.35;
/// Dodge impulse uses at least this duration (seconds).
pub const DODGE_IMPULSE_MIN_TIME: f32 = 0.35;
/// Fraction of the nominal dodge distance applied as an impulse.
pub const DODGE_IMPULSE_SCALE: f32 = 0.6;
/// Clip name used for locomotion root motion.
pub const LOCOMOTION_CLIP: &str = "Run";

const MOVE_INTENT_EPSILON: f32 = 1.0e-4;

// ============================================================================
// Collaborator Interfaces
// ============================================================================

/// Effects one actor may apply to another outside of a hit.
pub trait ActorHandle {
    /// Raises the actor's stun timer to at least `duration`.
    fn apply_stun(&mut self, duration: f32);
}

/// Resolves actor IDs to handles, used for parry counter-stuns.
pub trait ActorLookup {
    /// Returns the actor with `id`, if present.
    fn resolve(&mut self, id: ActorId) -> Option<&mut dyn ActorHandle>;
}

/// Lookup that resolves nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoActors;

impl ActorLookup for NoActors {
    fn resolve(&mut self, _id: ActorId) -> Option<&mut dyn ActorHandle> {
        None
    }
}

// ============================================================================
// Special Requests
// ============================================================================

/// Options for [`ActorCombatController::request_special`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialOptions {
    /// Ignore cooldown and busy checks; an unaffordable cost clamps focus to zero.
    pub force: bool,
    /// Buffer the request when busy or on cooldown.
    pub queue_if_busy: bool,
}

impl Default for SpecialOptions {
    fn default() -> Self {
        Self {
            force: false,
            queue_if_busy: true,
        }
    }
}

impl SpecialOptions {
    /// Forced, never queued.
    #[must_use]
    pub fn forced() -> Self {
        Self {
            force: true,
            queue_if_busy: false,
        }
    }

    /// Not forced, never queued.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            force: false,
            queue_if_busy: false,
        }
    }
}

/// Result of attempting to start a special.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialOutcome {
    /// The special started.
    Started,
    /// The special is cooling down.
    OnCooldown,
    /// The actor cannot act right now.
    Busy,
    /// Not enough focus.
    InsufficientFocus,
    /// The actor is dead.
    Dead,
}

impl SpecialOutcome {
    /// Whether the request may succeed later without outside changes.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::OnCooldown | Self::Busy)
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Authoritative combat state machine for one actor.
pub struct ActorCombatController {
    id: ActorId,
    config: ControllerConfig,
    registry: Arc<MoveRegistry>,
    events: EventSink,
    root_motion: Option<Arc<dyn RootMotionSource + Send + Sync>>,

    hp: ResourcePool,
    stamina: ResourcePool,
    focus: ResourcePool,
    guard: ResourcePool,
    timers: CombatTimers,

    attack: Option<ActiveAttack>,
    buffs: BTreeMap<BuffId, ActiveBuff>,
    cooldowns: BTreeMap<SpecialId, f32>,
    combo: ComboRecognizer,
    pending_special: Option<SpecialRef>,

    state: ControllerState,
    block_phase: ControllerState,
    block_phase_timer: f32,
    was_stunned: bool,

    yaw: f32,
    move_intent: Vec3,
    look_target: Option<Vec3>,
    pending_displacement: Vec3,
    outgoing_hits: Vec<HitPayload>,
}

impl std::fmt::Debug for ActorCombatController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActorCombatController")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("hp", &self.hp)
            .field("stamina", &self.stamina)
            .field("focus", &self.focus)
            .field("guard", &self.guard)
            .field("timers", &self.timers)
            .field("attack", &self.attack)
            .finish_non_exhaustive()
    }
}

impl ActorCombatController {
    /// Creates a controller with full pools and no active timers.
    #[must_use]
    pub fn new(id: ActorId, registry: Arc<MoveRegistry>, config: ControllerConfig) -> Self {
        let combo = ComboRecognizer::new(config.combo_window).with_latch(config.combo_latch);
        Self {
            id,
            hp: ResourcePool::full(config.max_hp),
            stamina: ResourcePool::full(config.max_stamina),
            focus: ResourcePool::new(0.0, config.max_focus),
            guard: ResourcePool::full(config.guard_max),
            timers: CombatTimers::default(),
            attack: None,
            buffs: BTreeMap::new(),
            cooldowns: BTreeMap::new(),
            combo,
            pending_special: None,
            state: ControllerState::Idle,
            block_phase: ControllerState::BlockStart,
            block_phase_timer: 0.0,
            was_stunned: false,
            yaw: 0.0,
            move_intent: Vec3::ZERO,
            look_target: None,
            pending_displacement: Vec3::ZERO,
            outgoing_hits: Vec::new(),
            config,
            registry,
            events: EventSink::disconnected(),
            root_motion: None,
        }
    }

    /// Set event sink.
    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    /// Set root-motion source.
    #[must_use]
    pub fn with_root_motion(mut self, source: Arc<dyn RootMotionSource + Send + Sync>) -> Self {
        self.root_motion = Some(source);
        self
    }

    /// Set initial facing.
    #[must_use]
    pub fn with_yaw(mut self, yaw: f32) -> Self {
        self.yaw = wrap_angle(yaw);
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Actor ID.
    #[must_use]
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Controller tunables.
    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Shared move registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<MoveRegistry> {
        &self.registry
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ControllerState {
        self.state
    }

    /// Health pool.
    #[must_use]
    pub fn hp(&self) -> ResourcePool {
        self.hp
    }

    /// Stamina pool.
    #[must_use]
    pub fn stamina(&self) -> ResourcePool {
        self.stamina
    }

    /// Focus pool.
    #[must_use]
    pub fn focus(&self) -> ResourcePool {
        self.focus
    }

    /// Guard gauge.
    #[must_use]
    pub fn guard(&self) -> ResourcePool {
        self.guard
    }

    /// Timers.
    #[must_use]
    pub fn timers(&self) -> CombatTimers {
        self.timers
    }

    /// Attack in progress.
    #[must_use]
    pub fn attack(&self) -> Option<&ActiveAttack> {
        self.attack.as_ref()
    }

    /// Input buffer.
    #[must_use]
    pub fn combo(&self) -> &ComboRecognizer {
        &self.combo
    }

    /// Buffered special, if any.
    #[must_use]
    pub fn pending_special(&self) -> Option<&SpecialRef> {
        self.pending_special.as_ref()
    }

    /// Facing yaw (radians).
    #[must_use]
    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    /// Whether health is zero.
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.hp.is_empty()
    }

    /// Whether the actor may start an attack or special.
    #[must_use]
    pub fn can_act(&self) -> bool {
        !self.is_dead()
            && self.attack.is_none()
            && self.timers.stun <= 0.0
            && self.timers.block <= 0.0
            && self.timers.dodge <= 0.0
            && self.timers.hit_stop <= 0.0
    }

    /// Whether the actor is attacking, stunned or blocking.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.attack.is_some() || self.timers.stun > 0.0 || self.timers.block > 0.0
    }

    /// Remaining cooldown of a special.
    #[must_use]
    pub fn cooldown(&self, id: &SpecialId) -> f32 {
        self.cooldowns.get(id).copied().unwrap_or(0.0)
    }

    /// Sets the desired planar movement direction. Zero stops.
    pub fn set_move_intent(&mut self, intent: Vec3) {
        self.move_intent = if intent.is_finite() {
            flatten(intent)
        } else {
            Vec3::ZERO
        };
    }

    /// Sets a world point to face, overriding movement-driven turning.
    pub fn set_look_target(&mut self, target: Option<Vec3>) {
        self.look_target = target.filter(|t| t.is_finite());
    }

    /// Takes hits produced since the last call.
    pub fn take_outgoing_hits(&mut self) -> Vec<HitPayload> {
        std::mem::take(&mut self.outgoing_hits)
    }

    // ------------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------------

    /// Pools, timers and state.
    #[must_use]
    pub fn combat_state(&self) -> CombatSnapshot {
        CombatSnapshot {
            hp: self.hp.value(),
            max_hp: self.hp.max(),
            stamina: self.stamina.value(),
            max_stamina: self.stamina.max(),
            focus: self.focus.value(),
            max_focus: self.focus.max(),
            guard: self.guard.value(),
            guard_max: self.guard.max(),
            timers: self.timers,
            state: self.state,
        }
    }

    /// Attack in progress.
    #[must_use]
    pub fn attack_snapshot(&self) -> AttackSnapshot {
        AttackSnapshot::from(self.attack.as_ref())
    }

    /// Buffs and cooldowns.
    #[must_use]
    pub fn status_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            buffs: self
                .buffs
                .values()
                .map(|buff| BuffStatus {
                    id: buff.id.clone(),
                    kind: buff.kind.clone(),
                    remaining: buff.remaining.max(0.0),
                    duration: buff.duration,
                })
                .collect(),
            cooldowns: self
                .cooldowns
                .iter()
                .map(|(id, remaining)| CooldownStatus {
                    id: id.clone(),
                    remaining: *remaining,
                })
                .collect(),
        }
    }

    // ------------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------------

    /// Starts a basic attack. Returns `false` without side effects on failure.
    pub fn request_attack(&mut self, kind: AttackKind) -> bool {
        if !self.can_act() {
            return false;
        }
        let Some(definition) = self.registry.attack(kind).cloned() else {
            warn!("{}: no move definition for {:?}", self.id, kind);
            return false;
        };
        if !self.stamina.try_consume(definition.stamina_cost, false) {
            return false;
        }
        self.start_attack(AttackOrigin::Basic(kind), definition);
        self.record_input(kind.input_action());
        true
    }

    /// Raises the guard. Cancels an attack in progress.
    pub fn request_block(&mut self) -> bool {
        if self.is_dead() || self.timers.block > 0.0 || self.timers.stun > 0.0 {
            return false;
        }
        if !self.stamina.try_consume(self.config.block_cost, false) {
            return false;
        }
        self.interrupt_attack();
        self.timers.block = self.config.block_duration;
        self.timers.delay_guard_regen(BLOCK_START_REGEN_DELAY);
        self.events.emit(CombatEvent::BlockStart { actor: self.id });
        self.block_phase = ControllerState::BlockStart;
        self.block_phase_timer = BLOCK_START_TIME.min(self.config.block_duration * 0.5);
        self.set_state(ControllerState::BlockStart);
        self.record_input(InputAction::Block);
        true
    }

    /// Dodges along the current facing. Cancels an attack in progress.
    pub fn request_dodge(&mut self) -> bool {
        if self.is_dead() || self.timers.dodge > 0.0 || self.timers.stun > 0.0 {
            return false;
        }
        if !self.stamina.try_consume(self.config.dodge_cost, false) {
            return false;
        }
        self.interrupt_attack();
        let dodge = self.config.dodge_duration;
        self.timers.dodge = dodge;
        self.timers.invuln = self.timers.invuln.max(self.config.iframe_duration.min(dodge));
        self.events.emit(CombatEvent::DodgeStart { actor: self.id });
        self.set_state(ControllerState::Dodge);

        let distance = self.config.move_speed * dodge.max(DODGE_IMPULSE_MIN_TIME);
        self.pending_displacement += facing_from_yaw(self.yaw) * distance * DODGE_IMPULSE_SCALE;

        self.record_input(InputAction::Dodge);
        true
    }

    /// Starts a special move.
    ///
    /// When the special is cooling down or the actor is busy, the request is
    /// buffered (if `queue_if_busy`) and retried on later ticks.
    pub fn request_special(&mut self, special: impl Into<SpecialRef>, options: SpecialOptions) -> bool {
        let special = special.into();
        let registry = Arc::clone(&self.registry);
        let Some(definition) = registry.resolve_special(&special) else {
            return false;
        };
        let outcome = self.start_special(definition, options);
        if outcome == SpecialOutcome::Started {
            return true;
        }
        if outcome.is_retryable() && options.queue_if_busy && !options.force {
            debug!("{}: buffering special ({outcome:?})", self.id);
            self.pending_special = Some(special);
        }
        false
    }

    fn start_special(&mut self, def: &SpecialDefinition, options: SpecialOptions) -> SpecialOutcome {
        if self.is_dead() {
            return SpecialOutcome::Dead;
        }
        if self.cooldown(&def.id) > 0.0 && !options.force {
            return SpecialOutcome::OnCooldown;
        }
        if !self.can_act() && !options.force {
            return SpecialOutcome::Busy;
        }
        let cost = def.focus_cost.resolve(self.focus.max());
        if !self.focus.try_consume(cost, options.force) {
            return SpecialOutcome::InsufficientFocus;
        }

        if def.cooldown > 0.0 {
            self.cooldowns.insert(def.id.clone(), def.cooldown);
        }
        if let Some(buff) = &def.buff {
            let duration = buff.duration.max(0.0);
            self.buffs.insert(
                buff.id.clone(),
                ActiveBuff {
                    id: buff.id.clone(),
                    kind: buff.kind.clone(),
                    magnitude: buff.magnitude,
                    duration,
                    remaining: duration,
                },
            );
            self.events.emit(CombatEvent::SpecialBuffStart {
                actor: self.id,
                id: def.id.clone(),
                buff: buff.id.clone(),
                duration,
            });
        }
        self.pending_special = None;
        self.start_attack(AttackOrigin::Special(def.id.clone()), def.payload.clone());
        self.events.emit(CombatEvent::SpecialStart {
            actor: self.id,
            id: def.id.clone(),
        });
        info!("{} performs special {}", self.id, def.id);
        SpecialOutcome::Started
    }

    // ------------------------------------------------------------------------
    // Hits
    // ------------------------------------------------------------------------

    /// Resolves an incoming hit.
    ///
    /// Non-finite payload fields are replaced with baseline values first.
    pub fn receive_hit(&mut self, payload: HitPayload, lookup: &mut dyn ActorLookup) -> HitImpact {
        let payload = payload.sanitized();
        let mut impact = HitImpact::none(self.hp.value(), self.guard.value());

        if self.is_dead() {
            return impact;
        }
        if self.timers.invuln > 0.0 && !payload.flags.ignore_invuln {
            debug!("{} evaded {} (invulnerable)", self.id, payload.move_id);
            return impact;
        }

        let combo_scale = payload.combo_scale;
        let blocking = self.timers.block > 0.0 && !payload.flags.unblockable;

        if blocking {
            let parry_threshold = self.config.block_duration - self.config.parry_window;
            let is_parry = self.timers.block >= parry_threshold && !payload.flags.disable_parry;
            impact.blocked = true;

            if is_parry {
                impact.parry = true;
                match lookup.resolve(payload.attacker) {
                    Some(attacker) => attacker.apply_stun(self.config.parry_counter_stun),
                    None => debug!("{}: parried attacker {} not found", self.id, payload.attacker),
                }
            } else {
                // 0.65 of guard damage at scale 1, rising with the attacker's chain.
                let guard_scale = 0.65 + (combo_scale - 1.0).max(0.0) * 0.35;
                self.guard.drain(payload.guard_damage * guard_scale);
                self.timers.delay_guard_regen(self.config.guard_regen_delay);
                self.timers.extend_stun(resolve_stun(payload.block_stun));
                self.stamina.drain(payload.stamina_on_block);
                if payload.chip_percent > 0.0 && payload.damage > 0.0 {
                    let chip = (payload.damage * payload.chip_percent).round().max(1.0);
                    self.hp.drain(chip);
                    impact.chip = chip;
                }
                self.queue_pushback(payload.block_push, payload.attacker_yaw);
                if self.guard.is_empty() {
                    self.guard.fill();
                    self.timers.extend_stun(self.config.guard_break_stun);
                    info!("{} guard broken by {}", self.id, payload.attacker);
                    self.events.emit(CombatEvent::GuardBreak {
                        actor: self.id,
                        attacker: payload.attacker,
                    });
                }
            }

            self.on_block_impact(is_parry);
            self.timers.extend_hit_stop(payload.hit_stop.on_block);
            impact.hp = self.hp.value();
            impact.guard = self.guard.value();
            if self.is_dead() {
                self.die();
            }
            return impact;
        }

        let damage = (payload.damage * combo_scale).round().max(0.0);
        self.hp.drain(damage);
        self.timers.delay_guard_regen(self.config.guard_regen_delay);
        self.timers.extend_stun(resolve_stun(payload.hit_stun));
        self.queue_pushback(payload.push_back, payload.attacker_yaw);
        impact.hit = true;
        impact.damage = damage;
        self.timers.extend_hit_stop(payload.hit_stop.on_hit);
        impact.hp = self.hp.value();
        impact.guard = self.guard.value();

        if self.is_dead() {
            self.die();
        } else {
            self.interrupt_attack();
            self.set_state(ControllerState::Stunned);
        }
        impact
    }

    /// Applies the attacker side of a resolved hit: focus gain and hitstop.
    pub fn apply_offensive_result(&mut self, impact: &HitImpact, payload: &HitPayload) {
        if !impact.connected() {
            return;
        }
        if impact.hit && payload.focus_gain > 0.0 {
            self.focus.add(payload.focus_gain);
        }
        let hit_stop = if impact.blocked {
            payload.hit_stop.on_block
        } else {
            payload.hit_stop.on_hit
        };
        self.timers.extend_hit_stop(hit_stop);
    }

    /// Raises hitstop to at least `duration`.
    pub fn apply_hit_stop(&mut self, duration: f32) {
        self.timers.extend_hit_stop(duration);
    }

    fn queue_pushback(&mut self, distance: f32, attacker_yaw: f32) {
        if self.config.pushback == PushbackPolicy::Enabled && distance > 0.0 {
            self.pending_displacement += facing_from_yaw(attacker_yaw) * distance;
        }
    }

    fn on_block_impact(&mut self, parry: bool) {
        self.block_phase = ControllerState::BlockHit;
        self.block_phase_timer = if parry {
            BLOCK_HIT_PARRY_TIME
        } else {
            BLOCK_HIT_TIME
        };
        self.set_state(ControllerState::BlockHit);
        self.events.emit(CombatEvent::BlockImpact {
            actor: self.id,
            parry,
        });
    }

    fn die(&mut self) {
        self.hp.set(0.0);
        self.interrupt_attack();
        self.pending_special = None;
        self.move_intent = Vec3::ZERO;
        if self.state != ControllerState::Dead {
            self.set_state(ControllerState::Dead);
            info!("{} was defeated", self.id);
            self.events.emit(CombatEvent::Death { actor: self.id });
        }
    }

    // ------------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------------

    /// Advances the actor by `dt` seconds.
    pub fn update(
        &mut self,
        dt: f32,
        physics: &mut dyn PhysicsWorld,
        targets: &dyn TargetProvider,
    ) -> CombatResult<()> {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };

        self.combo.advance(dt);
        self.tick_cooldowns(dt);
        self.tick_buffs(dt);
        self.tick_combat(dt);

        if self.is_dead() {
            self.pending_displacement = Vec3::ZERO;
            self.die();
            return Ok(());
        }

        if self.pending_displacement != Vec3::ZERO {
            physics.move_actor(self.id, self.pending_displacement)?;
            self.pending_displacement = Vec3::ZERO;
        }

        if self.timers.hit_stop > 0.0 {
            return Ok(());
        }

        if self.attack.is_some() {
            self.update_attack(dt, physics, targets)?;
        }

        let stunned = self.timers.stun > 0.0;
        if stunned && !self.was_stunned {
            self.interrupt_attack();
            self.pending_special = None;
            self.events.emit(CombatEvent::StunStart {
                actor: self.id,
                duration: self.timers.stun,
            });
        } else if !stunned && self.was_stunned {
            self.events.emit(CombatEvent::StunEnd { actor: self.id });
        }
        self.was_stunned = stunned;

        let moving = self.move_intent.length_squared() > MOVE_INTENT_EPSILON;
        let can_move = self.attack.is_none()
            && !stunned
            && self.timers.block <= 0.0
            && self.timers.dodge <= 0.0;

        if let Some(target) = self.look_target {
            let position = physics.position(self.id, 1.0)?;
            self.rotate_towards(target - position, dt, physics)?;
        } else if moving && can_move {
            self.rotate_towards(self.move_intent, dt, physics)?;
        }

        if can_move && moving {
            let direction = self.move_intent.normalize_or_zero();
            let speed = self
                .root_motion
                .as_ref()
                .and_then(|source| source.clip(LOCOMOTION_CLIP))
                .and_then(|clip| clip.usable_speed(self.config.root_motion_scale))
                .unwrap_or(self.config.move_speed);
            physics.move_actor(self.id, direction * speed * dt)?;
        }

        self.update_block_phase(dt);
        let next = self.resolve_state(moving);
        self.set_state(next);

        self.retry_pending_special();
        Ok(())
    }

    fn tick_combat(&mut self, dt: f32) {
        self.timers.tick(dt);

        if self.timers.stun <= 0.0 {
            self.stamina.add(self.config.stamina_regen * dt);
            self.focus.add(self.config.focus_regen * dt);
        }

        if self.timers.guard_regen_delay > 0.0 {
            self.timers.guard_regen_delay = (self.timers.guard_regen_delay - dt).max(0.0);
        } else {
            let factor = if self.timers.block > 0.0 { 0.35 } else { 1.0 };
            self.guard.add(self.config.guard_regen_rate * factor * dt);
        }
    }

    fn tick_cooldowns(&mut self, dt: f32) {
        let mut ready = Vec::new();
        self.cooldowns.retain(|id, remaining| {
            *remaining = (*remaining - dt).max(0.0);
            if *remaining <= 0.0 {
                ready.push(id.clone());
                false
            } else {
                true
            }
        });
        for id in ready {
            self.events.emit(CombatEvent::SpecialReady { actor: self.id, id });
        }
    }

    fn tick_buffs(&mut self, dt: f32) {
        let mut expired = Vec::new();
        self.buffs.retain(|id, buff| {
            buff.remaining = (buff.remaining - dt).max(0.0);
            if buff.remaining <= 0.0 {
                expired.push(id.clone());
                false
            } else {
                true
            }
        });
        for buff in expired {
            self.events.emit(CombatEvent::SpecialBuffEnd { actor: self.id, buff });
        }
    }

    fn update_attack(
        &mut self,
        dt: f32,
        physics: &mut dyn PhysicsWorld,
        targets: &dyn TargetProvider,
    ) -> CombatResult<()> {
        let Some(mut attack) = self.attack.take() else {
            return Ok(());
        };

        attack.remaining_total = (attack.remaining_total - dt).max(0.0);
        self.apply_attack_root_motion(&attack.origin, dt, physics)?;

        match attack.phase {
            AttackPhase::Startup => {
                attack.phase_timer -= dt;
                if attack.phase_timer <= 0.0 {
                    attack.phase = AttackPhase::Active;
                    attack.phase_timer = attack.definition.active.max(0.0);
                }
            },
            AttackPhase::Active => {
                if !attack.has_hit || attack.definition.flags.multi_hit {
                    let position = physics.position(self.id, 1.0)?;
                    let candidates = targets.targets_for(self.id);
                    let found = find_target(
                        self.id,
                        position,
                        self.yaw,
                        attack.definition.range,
                        attack.definition.radius,
                        &candidates,
                    );
                    if let Some(target) = found {
                        attack.has_hit = !attack.definition.flags.multi_hit;
                        let payload = self.build_payload(&attack.definition, target.id);
                        debug!("{} hits {} with {}", self.id, target.id, payload.move_id);
                        self.events.emit(CombatEvent::Hit {
                            attacker: self.id,
                            target: target.id,
                            payload: payload.clone(),
                        });
                        self.outgoing_hits.push(payload);
                    }
                }
                attack.phase_timer -= dt;
                if attack.phase_timer <= 0.0 {
                    attack.phase = AttackPhase::Recovery;
                    attack.phase_timer = attack.definition.recovery.max(0.0);
                }
            },
            AttackPhase::Recovery => {
                attack.phase_timer -= dt;
                if attack.phase_timer <= 0.0 {
                    self.events.emit(CombatEvent::AttackEnd {
                        actor: self.id,
                        kind: attack.origin,
                        interrupted: false,
                    });
                    return Ok(());
                }
            },
        }

        self.attack = Some(attack);
        Ok(())
    }

    fn build_payload(&self, definition: &MoveDefinition, target: ActorId) -> HitPayload {
        let mut payload = HitPayload::from_move(definition, self.id, target, self.yaw);
        payload.apply_damage_buffs(self.buffs.values());
        payload
    }

    fn apply_attack_root_motion(
        &self,
        origin: &AttackOrigin,
        dt: f32,
        physics: &mut dyn PhysicsWorld,
    ) -> CombatResult<()> {
        let Some(source) = &self.root_motion else {
            return Ok(());
        };
        let Some(clip) = source.clip(&origin.to_string()) else {
            return Ok(());
        };
        if clip.has_root_motion && clip.velocity.is_finite() {
            let world = yaw_rotation(self.yaw) * clip.velocity;
            physics.move_actor(self.id, world * self.config.root_motion_scale * dt)?;
        }
        Ok(())
    }

    fn rotate_towards(
        &mut self,
        direction: Vec3,
        dt: f32,
        physics: &mut dyn PhysicsWorld,
    ) -> CombatResult<()> {
        let Some(target_yaw) = yaw_from_direction(direction) else {
            return Ok(());
        };
        let next = wrap_angle(step_yaw(self.yaw, target_yaw, self.config.rotation_speed * dt));
        if (next - self.yaw).abs() > f32::EPSILON {
            self.yaw = next;
            physics.rotate(self.id, yaw_rotation(self.yaw))?;
        }
        Ok(())
    }

    fn update_block_phase(&mut self, dt: f32) {
        if self.timers.block <= 0.0 {
            self.block_phase = ControllerState::BlockStart;
            self.block_phase_timer = 0.0;
            return;
        }
        self.block_phase_timer = (self.block_phase_timer - dt).max(0.0);
        if self.block_phase_timer <= 0.0 && self.block_phase != ControllerState::BlockIdle {
            self.block_phase = ControllerState::BlockIdle;
        }
    }

    fn resolve_state(&self, moving: bool) -> ControllerState {
        if self.is_dead() {
            ControllerState::Dead
        } else if let Some(attack) = &self.attack {
            ControllerState::Attack(attack.phase)
        } else if self.timers.block > 0.0 {
            self.block_phase
        } else if self.timers.stun > 0.0 {
            ControllerState::Stunned
        } else if self.timers.dodge > 0.0 {
            ControllerState::Dodge
        } else if moving {
            ControllerState::Moving
        } else {
            ControllerState::Idle
        }
    }

    fn retry_pending_special(&mut self) {
        let Some(special) = self.pending_special.take() else {
            return;
        };
        if self.timers.stun > 0.0 || self.is_dead() {
            debug!("{}: dropping buffered special", self.id);
            return;
        }
        let registry = Arc::clone(&self.registry);
        let Some(definition) = registry.resolve_special(&special) else {
            return;
        };
        let outcome = self.start_special(definition, SpecialOptions::immediate());
        if outcome.is_retryable() {
            self.pending_special = Some(special);
        } else if outcome != SpecialOutcome::Started {
            debug!("{}: buffered special failed ({outcome:?})", self.id);
        }
    }

    // ------------------------------------------------------------------------
    // State helpers
    // ------------------------------------------------------------------------

    fn start_attack(&mut self, origin: AttackOrigin, definition: MoveDefinition) {
        self.interrupt_attack();
        let duration = definition.total_duration();
        let attack = ActiveAttack::new(origin.clone(), definition);
        let phase = attack.phase;
        self.attack = Some(attack);
        self.set_state(ControllerState::Attack(phase));
        self.events.emit(CombatEvent::AttackStart {
            actor: self.id,
            kind: origin,
            duration,
        });
    }

    fn interrupt_attack(&mut self) {
        if let Some(attack) = self.attack.take() {
            self.events.emit(CombatEvent::AttackEnd {
                actor: self.id,
                kind: attack.origin,
                interrupted: true,
            });
        }
    }

    fn set_state(&mut self, next: ControllerState) {
        if self.state == next {
            return;
        }
        let previous = self.state;
        self.state = next;
        self.events.emit(CombatEvent::StateChange {
            actor: self.id,
            state: next,
            previous,
        });
    }

    fn record_input(&mut self, action: InputAction) {
        self.combo.record(action);
        self.check_combo_patterns();
    }

    fn check_combo_patterns(&mut self) {
        let registry = Arc::clone(&self.registry);
        for def in registry.specials() {
            if !self.combo.matches(&def.pattern) || !self.combo.try_latch(&def.id) {
                continue;
            }
            if self.request_special(SpecialRef::ById(def.id.clone()), SpecialOptions::default()) {
                self.combo.consume(def.pattern.len());
                break;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Reset
    // ------------------------------------------------------------------------

    /// Restores pools and clears timers, attack, buffs, cooldowns and input.
    pub fn reset_combat_state(&mut self, overrides: ResetOverrides) {
        reset_pool(&mut self.hp, overrides.max_hp, overrides.hp);
        reset_pool(&mut self.stamina, overrides.max_stamina, overrides.stamina);
        reset_pool(&mut self.focus, overrides.max_focus, overrides.focus);
        reset_pool(&mut self.guard, overrides.guard_max, overrides.guard);

        self.timers = CombatTimers {
            guard_regen_delay: overrides.guard_regen_delay.unwrap_or(0.0).max(0.0),
            ..CombatTimers::default()
        };
        self.attack = None;
        self.buffs.clear();
        self.cooldowns.clear();
        self.combo.clear();
        self.pending_special = None;
        self.outgoing_hits.clear();
        self.pending_displacement = Vec3::ZERO;
        self.block_phase = ControllerState::BlockStart;
        self.block_phase_timer = 0.0;
        self.was_stunned = false;
        self.move_intent = Vec3::ZERO;

        let next = if self.is_dead() {
            ControllerState::Dead
        } else {
            ControllerState::Idle
        };
        self.set_state(next);
    }
}

fn reset_pool(pool: &mut ResourcePool, max: Option<f32>, value: Option<f32>) {
    if let Some(max) = max {
        pool.set_max(max);
    }
    if let Some(value) = value {
        pool.set(value);
    }
}

impl ActorHandle for ActorCombatController {
    fn apply_stun(&mut self, duration: f32) {
        if duration <= 0.0 || !duration.is_finite() || self.is_dead() {
            return;
        }
        self.timers.extend_stun(duration);
        self.interrupt_attack();
        self.set_state(ControllerState::Stunned);
    }
}
