//! Fixed-timestep combat loop.
//!
//! Each tick runs in a fixed order:
//! 1. AI decisions for every fighter, from pre-tick views of the others
//! 2. Controller updates against pre-tick target positions
//! 3. Hit resolution (defender first, then the attacker's offensive result)
//! 4. One physics step, then the arena bounds clamp
//! 5. Event dispatch to subscribers
//!
//! Hitstop stays local to the actor that owns it; the loop itself never pauses.

use std::sync::Arc;

use arena_common::{yaw_rotation, ActorId};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::ai::{AiDecisionEngine, OpponentView, Personality, SituationKey};
use crate::combo::ComboCounter;
use crate::config::{AiConfig, CombatConfig, ControllerConfig, SimulationConfig};
use crate::controller::{ActorCombatController, ActorHandle, ActorLookup};
use crate::damage::HitPayload;
use crate::error::{CombatError, CombatResult};
use crate::events::{CombatEvent, CombatEventKind, EventBus, EventDispatcher, EventHandler};
use crate::hit::{TargetHandle, TargetList};
use crate::knowledge::{CombatLog, KnowledgeBase};
use crate::moves::MoveRegistry;
use crate::physics::{KinematicWorld, PhysicsWorld, RootMotionSource};
use crate::state::ResetOverrides;

// ============================================================================
// Round Outcome
// ============================================================================

/// How a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundOutcome {
    /// At most one fighter is left standing.
    Knockout {
        /// Surviving fighter, if any
        winner: Option<ActorId>,
    },
    /// The round clock ran out.
    TimeUp {
        /// Fighter with the highest health ratio, `None` on a tie
        leader: Option<ActorId>,
    },
}

impl RoundOutcome {
    /// The fighter credited with the round.
    #[must_use]
    pub fn winner(self) -> Option<ActorId> {
        match self {
            Self::Knockout { winner } => winner,
            Self::TimeUp { leader } => leader,
        }
    }
}

/// Per-fighter summary of a finished round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FighterSummary {
    /// Fighter
    pub actor: ActorId,
    /// Remaining health
    pub hp: f32,
    /// Remaining stamina
    pub stamina: f32,
    /// Remaining focus
    pub focus: f32,
    /// Log entries learned by this fighter's AI
    pub learned: usize,
}

/// Summary returned by [`SimulationLoop::finish_round`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundSummary {
    /// Outcome, if the round actually ended
    pub outcome: Option<RoundOutcome>,
    /// Round time (seconds)
    pub duration: f64,
    /// Fixed steps taken during the round
    pub ticks: u64,
    /// Per-fighter results
    pub fighters: Vec<FighterSummary>,
}

// ============================================================================
// Fighters
// ============================================================================

#[derive(Debug)]
struct Fighter {
    controller: ActorCombatController,
    ai: Option<AiDecisionEngine>,
    combo: ComboCounter,
    spawn_position: Vec3,
    spawn_yaw: f32,
}

impl Fighter {
    fn id(&self) -> ActorId {
        self.controller.id()
    }
}

/// Pre-tick view of one fighter.
#[derive(Debug, Clone)]
struct TickView {
    view: OpponentView,
    dead: bool,
}

/// Resolves the attacker while its target is borrowed.
struct AttackerLookup<'a> {
    id: ActorId,
    controller: &'a mut ActorCombatController,
}

impl ActorLookup for AttackerLookup<'_> {
    fn resolve(&mut self, id: ActorId) -> Option<&mut dyn ActorHandle> {
        if id == self.id {
            Some(&mut *self.controller)
        } else {
            None
        }
    }
}

/// Borrows two distinct fighters mutably.
fn pair_mut(fighters: &mut [Fighter], first: usize, second: usize) -> (&mut Fighter, &mut Fighter) {
    if first < second {
        let (left, right) = fighters.split_at_mut(second);
        (&mut left[first], &mut right[0])
    } else {
        let (left, right) = fighters.split_at_mut(first);
        (&mut right[0], &mut left[second])
    }
}

// ============================================================================
// Simulation Loop
// ============================================================================

/// Fixed-timestep loop driving every fighter, their AI and the physics world.
pub struct SimulationLoop<P: PhysicsWorld = KinematicWorld> {
    config: SimulationConfig,
    controller_config: ControllerConfig,
    ai_config: AiConfig,
    registry: Arc<MoveRegistry>,
    root_motion: Option<Arc<dyn RootMotionSource + Send + Sync>>,
    physics: P,
    fighters: Vec<Fighter>,
    events: EventBus,
    dispatcher: EventDispatcher,
    log: CombatLog,
    /// Monotonic simulation clock (seconds)
    clock: f64,
    /// Time since the round started (seconds)
    round_time: f64,
    /// Unsimulated frame time
    accumulator: f32,
    ticks: u64,
    round_ticks: u64,
    failed_handlers: usize,
}

impl<P: PhysicsWorld> std::fmt::Debug for SimulationLoop<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationLoop")
            .field("fighters", &self.fighters.len())
            .field("clock", &self.clock)
            .field("round_time", &self.round_time)
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

impl SimulationLoop<KinematicWorld> {
    /// Creates a loop over a fresh kinematic world.
    #[must_use]
    pub fn kinematic(config: &CombatConfig) -> Self {
        Self::new(config, KinematicWorld::new())
    }

    /// Adds a kinematic body and a fighter for it.
    pub fn spawn_fighter(&mut self, id: ActorId, position: Vec3, yaw: f32) -> CombatResult<()> {
        if self.index_of(id).is_some() {
            return Err(CombatError::DuplicateActor(id));
        }
        self.physics.add_actor(id, position, yaw_rotation(yaw));
        self.add_fighter(id, position, yaw)
    }
}

impl<P: PhysicsWorld> SimulationLoop<P> {
    /// Creates a loop over an existing physics world.
    ///
    /// The registry is built once from the configuration and shared by every
    /// controller.
    #[must_use]
    pub fn new(config: &CombatConfig, physics: P) -> Self {
        let mut config = config.clone();
        config.validate();
        let registry = Arc::new(config.build_registry());
        info!(
            "Combat loop ready: {} moves, {} specials, dt {:.4}s",
            registry.move_count(),
            registry.specials().count(),
            config.simulation.fixed_dt
        );

        Self {
            events: EventBus::new(config.simulation.event_capacity),
            config: config.simulation,
            controller_config: config.controller,
            ai_config: config.ai,
            registry,
            root_motion: None,
            physics,
            fighters: Vec::new(),
            dispatcher: EventDispatcher::new(),
            log: CombatLog::new(),
            clock: 0.0,
            round_time: 0.0,
            accumulator: 0.0,
            ticks: 0,
            round_ticks: 0,
            failed_handlers: 0,
        }
    }

    /// Root motion shared by fighters added after this call.
    #[must_use]
    pub fn with_root_motion(mut self, source: Arc<dyn RootMotionSource + Send + Sync>) -> Self {
        self.root_motion = Some(source);
        self
    }

    /// Adds a fighter whose body already exists in the physics world.
    ///
    /// The body is placed at `position` facing `yaw`; an unknown body fails.
    pub fn add_fighter(&mut self, id: ActorId, position: Vec3, yaw: f32) -> CombatResult<()> {
        if self.index_of(id).is_some() {
            return Err(CombatError::DuplicateActor(id));
        }
        self.physics
            .teleport(id, position, Some(yaw_rotation(yaw)))?;

        let mut controller =
            ActorCombatController::new(id, Arc::clone(&self.registry), self.controller_config.clone())
                .with_events(self.events.sink())
                .with_yaw(yaw);
        if let Some(source) = &self.root_motion {
            controller = controller.with_root_motion(Arc::clone(source));
        }

        self.fighters.push(Fighter {
            controller,
            ai: None,
            combo: ComboCounter::new(),
            spawn_position: position,
            spawn_yaw: yaw,
        });
        info!("Added fighter {id} at ({:.1}, {:.1})", position.x, position.z);
        Ok(())
    }

    /// Puts a fighter under AI control.
    pub fn attach_ai(
        &mut self,
        id: ActorId,
        personality: Personality,
        knowledge: KnowledgeBase,
    ) -> CombatResult<()> {
        let ai_config = self.ai_config.clone();
        let fighter = self.fighter_mut(id)?;
        fighter.ai = Some(AiDecisionEngine::new(id, ai_config, personality).with_knowledge(knowledge));
        debug!("Attached AI to {id}");
        Ok(())
    }

    /// Returns a fighter to manual control, handing back its engine.
    pub fn detach_ai(&mut self, id: ActorId) -> CombatResult<Option<AiDecisionEngine>> {
        Ok(self.fighter_mut(id)?.ai.take())
    }

    /// Subscribes a handler to one event kind.
    pub fn subscribe(&mut self, kind: CombatEventKind, handler: impl EventHandler + 'static) {
        self.dispatcher.subscribe(kind, handler);
    }

    /// Subscribes a handler to every event.
    pub fn subscribe_all(&mut self, handler: impl EventHandler + 'static) {
        self.dispatcher.subscribe_all(handler);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Loop tunables.
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Shared move registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<MoveRegistry> {
        &self.registry
    }

    /// Fighter IDs in insertion order.
    pub fn actors(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.fighters.iter().map(Fighter::id)
    }

    /// Number of fighters.
    #[must_use]
    pub fn fighter_count(&self) -> usize {
        self.fighters.len()
    }

    /// A fighter's controller.
    #[must_use]
    pub fn controller(&self, id: ActorId) -> Option<&ActorCombatController> {
        self.index_of(id).map(|i| &self.fighters[i].controller)
    }

    /// A fighter's controller, for manual input.
    pub fn controller_mut(&mut self, id: ActorId) -> Option<&mut ActorCombatController> {
        self.index_of(id).map(|i| &mut self.fighters[i].controller)
    }

    /// A fighter's AI, if attached.
    #[must_use]
    pub fn ai(&self, id: ActorId) -> Option<&AiDecisionEngine> {
        self.index_of(id).and_then(|i| self.fighters[i].ai.as_ref())
    }

    /// A fighter's AI, if attached.
    pub fn ai_mut(&mut self, id: ActorId) -> Option<&mut AiDecisionEngine> {
        self.index_of(id).and_then(|i| self.fighters[i].ai.as_mut())
    }

    /// A fighter's current combo chain.
    #[must_use]
    pub fn combo_count(&self, id: ActorId) -> u32 {
        self.index_of(id)
            .map_or(0, |i| self.fighters[i].combo.count(self.clock))
    }

    /// Physics world.
    #[must_use]
    pub fn physics(&self) -> &P {
        &self.physics
    }

    /// Physics world, for adding bodies.
    pub fn physics_mut(&mut self) -> &mut P {
        &mut self.physics
    }

    /// Outcome log of the current round.
    #[must_use]
    pub fn log(&self) -> &CombatLog {
        &self.log
    }

    /// Simulation clock (seconds since creation).
    #[must_use]
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Time since the round started (seconds).
    #[must_use]
    pub fn round_time(&self) -> f64 {
        self.round_time
    }

    /// Fixed steps taken since creation.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Subscriber calls that failed since creation.
    #[must_use]
    pub fn failed_handlers(&self) -> usize {
        self.failed_handlers
    }

    /// Interpolation factor between the last two fixed steps.
    #[must_use]
    pub fn alpha(&self) -> f32 {
        (self.accumulator / self.config.fixed_dt).clamp(0.0, 1.0)
    }

    /// Interpolated position for rendering.
    pub fn position(&self, id: ActorId) -> CombatResult<Vec3> {
        Ok(self.physics.position(id, self.alpha())?)
    }

    /// Interpolated rotation for rendering.
    pub fn rotation(&self, id: ActorId) -> CombatResult<Quat> {
        Ok(self.physics.rotation(id, self.alpha())?)
    }

    // ========================================================================
    // Stepping
    // ========================================================================

    /// Advances by a frame's worth of time, running as many fixed steps as fit.
    ///
    /// At most `max_steps_per_frame` steps run; if the loop is still more than
    /// two steps behind afterwards, the backlog is dropped.
    /// Returns the number of steps taken.
    pub fn advance(&mut self, frame_dt: f32) -> CombatResult<u32> {
        if !frame_dt.is_finite() || frame_dt <= 0.0 {
            return Ok(0);
        }

        let fixed_dt = self.config.fixed_dt;
        self.accumulator += frame_dt;

        let mut steps = 0;
        while self.accumulator >= fixed_dt && steps < self.config.max_steps_per_frame {
            self.accumulator -= fixed_dt;
            self.tick()?;
            steps += 1;
        }

        if self.accumulator > fixed_dt * 2.0 {
            debug!(
                "Combat loop {:.3}s behind, dropping backlog",
                self.accumulator
            );
            self.accumulator = 0.0;
        }

        Ok(steps)
    }

    /// Runs exactly one fixed step.
    pub fn tick(&mut self) -> CombatResult<()> {
        let dt = self.config.fixed_dt;
        self.clock += f64::from(dt);
        self.round_time += f64::from(dt);
        self.ticks += 1;
        self.round_ticks += 1;

        let views = self.snapshot_views()?;

        // AI decisions
        for fighter in &mut self.fighters {
            let Some(ai) = fighter.ai.as_mut() else {
                continue;
            };
            let id = fighter.controller.id();
            let Some(own) = views.iter().find(|v| v.view.id == id) else {
                continue;
            };
            let opponent = nearest_opponent(&views, id, own.view.position);
            ai.update(dt, &mut fighter.controller, own.view.position, opponent);
        }

        // Controllers
        let radius = self.controller_config.body_radius;
        let targets = TargetList::new(
            views
                .iter()
                .filter(|v| !v.dead)
                .map(|v| TargetHandle::new(v.view.id, v.view.position).with_radius(radius))
                .collect(),
        );
        for fighter in &mut self.fighters {
            fighter.controller.update(dt, &mut self.physics, &targets)?;
        }

        // Hits
        let hits: Vec<HitPayload> = self
            .fighters
            .iter_mut()
            .flat_map(|f| f.controller.take_outgoing_hits())
            .collect();
        for payload in hits {
            self.resolve_hit(payload, &views);
        }

        // Physics
        self.physics.step(dt);
        self.clamp_to_bounds()?;

        // Events
        let events = self.events.drain();
        self.failed_handlers += self.dispatcher.dispatch_all(&events);

        Ok(())
    }

    fn snapshot_views(&self) -> CombatResult<Vec<TickView>> {
        self.fighters
            .iter()
            .map(|fighter| -> CombatResult<TickView> {
                let controller = &fighter.controller;
                let combat = controller.combat_state();
                Ok(TickView {
                    dead: combat.is_dead(),
                    view: OpponentView {
                        id: controller.id(),
                        position: self.physics.position(controller.id(), 1.0)?,
                        combat,
                        attack: controller.attack_snapshot(),
                    },
                })
            })
            .collect()
    }

    fn resolve_hit(&mut self, payload: HitPayload, views: &[TickView]) {
        let attacker_id = payload.attacker;
        let target_id = payload.target;
        let (Some(attacker), Some(target)) = (self.index_of(attacker_id), self.index_of(target_id))
        else {
            warn!("Dropping hit {attacker_id} -> {target_id}: fighter not in loop");
            return;
        };
        if attacker == target {
            return;
        }

        let payload = payload.with_combo_scale(self.fighters[attacker].combo.scale(self.clock));
        let situation = match (views.get(attacker), views.get(target)) {
            (Some(own), Some(other)) => SituationKey::classify(
                own.view.position.distance(other.view.position),
                other.view.activity(),
                &own.view.combat,
                &self.ai_config,
            )
            .to_string(),
            _ => String::new(),
        };

        let (attacking, defending) = pair_mut(&mut self.fighters, attacker, target);
        let impact = {
            let mut lookup = AttackerLookup {
                id: attacker_id,
                controller: &mut attacking.controller,
            };
            defending.controller.receive_hit(payload.clone(), &mut lookup)
        };

        attacking.controller.apply_offensive_result(&impact, &payload);
        if impact.hit {
            attacking.combo.register_hit(self.clock);
        }
        debug!(
            "{attacker_id} -> {target_id}: hit={} blocked={} parry={} damage={:.0} hp={:.0}",
            impact.hit, impact.blocked, impact.parry, impact.damage, impact.hp
        );

        self.log
            .record_impact(attacker_id, target_id, &impact, &situation, self.clock);
        self.events.publish(CombatEvent::HitResolved {
            attacker: attacker_id,
            target: target_id,
            impact,
        });
    }

    fn clamp_to_bounds(&mut self) -> CombatResult<()> {
        let bounds = self.config.arena_bounds;
        if bounds <= 0.0 {
            return Ok(());
        }
        for fighter in &self.fighters {
            let id = fighter.id();
            let position = self.physics.position(id, 1.0)?;
            let planar = position.x.hypot(position.z);
            if planar > bounds {
                let scale = bounds / planar;
                let clamped = Vec3::new(position.x * scale, position.y, position.z * scale);
                self.physics.teleport(id, clamped, None)?;
                debug!("Clamped {id} to arena bounds");
            }
        }
        Ok(())
    }

    // ========================================================================
    // Rounds
    // ========================================================================

    /// Whether the current round has ended, and how.
    #[must_use]
    pub fn round_outcome(&self) -> Option<RoundOutcome> {
        if self.fighters.len() >= 2 {
            let mut alive = self.fighters.iter().filter(|f| !f.controller.is_dead());
            let first = alive.next();
            if alive.next().is_none() {
                return Some(RoundOutcome::Knockout {
                    winner: first.map(Fighter::id),
                });
            }
        }

        let limit = f64::from(self.config.round_time_limit);
        if limit > 0.0 && self.round_time >= limit {
            return Some(RoundOutcome::TimeUp {
                leader: self.leader(),
            });
        }
        None
    }

    fn leader(&self) -> Option<ActorId> {
        let mut best: Option<(ActorId, f32)> = None;
        let mut tied = false;
        for fighter in &self.fighters {
            let ratio = fighter.controller.combat_state().hp_ratio();
            match best {
                Some((_, top)) if (ratio - top).abs() < f32::EPSILON => tied = true,
                Some((_, top)) if ratio < top => {},
                _ => {
                    best = Some((fighter.id(), ratio));
                    tied = false;
                },
            }
        }
        if tied {
            None
        } else {
            best.map(|(id, _)| id)
        }
    }

    /// Ends the round: every AI learns from the log, then the log is cleared.
    pub fn finish_round(&mut self) -> RoundSummary {
        let outcome = self.round_outcome();
        let fighters = self
            .fighters
            .iter_mut()
            .map(|fighter| {
                let learned = fighter
                    .ai
                    .as_mut()
                    .map_or(0, |ai| ai.learn_from(&self.log));
                let state = fighter.controller.combat_state();
                FighterSummary {
                    actor: fighter.controller.id(),
                    hp: state.hp,
                    stamina: state.stamina,
                    focus: state.focus,
                    learned,
                }
            })
            .collect();

        match outcome.and_then(RoundOutcome::winner) {
            Some(winner) => info!("Round over after {:.1}s, {winner} wins", self.round_time),
            None => info!("Round over after {:.1}s, no winner", self.round_time),
        }

        let summary = RoundSummary {
            outcome,
            duration: self.round_time,
            ticks: self.round_ticks,
            fighters,
        };
        self.log.clear();
        summary
    }

    /// Restores every fighter to full pools at its spawn point.
    ///
    /// Learned knowledge survives; pending events are dropped.
    pub fn reset_round(&mut self) -> CombatResult<()> {
        for fighter in &mut self.fighters {
            let id = fighter.controller.id();
            fighter.controller.reset_combat_state(ResetOverrides::full());
            fighter.controller.set_move_intent(Vec3::ZERO);
            fighter.controller.set_look_target(None);
            let _ = fighter.controller.take_outgoing_hits();
            fighter.combo.reset();
            if let Some(ai) = fighter.ai.as_mut() {
                ai.reset_round();
            }
            self.physics.teleport(
                id,
                fighter.spawn_position,
                Some(yaw_rotation(fighter.spawn_yaw)),
            )?;
        }
        let dropped = self.events.drain().len();
        if dropped > 0 {
            debug!("Dropped {dropped} events on round reset");
        }
        self.log.clear();
        self.round_time = 0.0;
        self.round_ticks = 0;
        self.accumulator = 0.0;
        Ok(())
    }

    fn index_of(&self, id: ActorId) -> Option<usize> {
        self.fighters.iter().position(|f| f.id() == id)
    }

    fn fighter_mut(&mut self, id: ActorId) -> CombatResult<&mut Fighter> {
        self.fighters
            .iter_mut()
            .find(|f| f.id() == id)
            .ok_or(CombatError::UnknownActor(id))
    }
}

fn nearest_opponent(views: &[TickView], id: ActorId, position: Vec3) -> Option<&OpponentView> {
    views
        .iter()
        .filter(|v| v.view.id != id && !v.dead)
        .map(|v| &v.view)
        .min_by(|a, b| {
            position
                .distance_squared(a.position)
                .total_cmp(&position.distance_squared(b.position))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerError;
    use crate::moves::AttackKind;
    use crate::state::ControllerState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn failing_handler(_: &CombatEvent) -> Result<(), HandlerError> {
        Err(HandlerError::Failed("subscriber rejected event".into()))
    }

    fn two_fighters(distance: f32) -> (SimulationLoop, ActorId, ActorId) {
        let mut sim = SimulationLoop::kinematic(&CombatConfig::default());
        let a = ActorId::from_raw(1);
        let b = ActorId::from_raw(2);
        assert!(sim.spawn_fighter(a, Vec3::ZERO, 0.0).is_ok());
        // Facing each other along +Z / -Z
        assert!(sim
            .spawn_fighter(b, Vec3::new(0.0, 0.0, distance), std::f32::consts::PI)
            .is_ok());
        (sim, a, b)
    }

    fn run(sim: &mut SimulationLoop, ticks: usize) {
        for _ in 0..ticks {
            assert!(sim.tick().is_ok());
        }
    }

    #[test]
    fn test_duplicate_and_unknown_actors() {
        let (mut sim, a, _) = two_fighters(1.5);
        assert!(matches!(
            sim.spawn_fighter(a, Vec3::ZERO, 0.0),
            Err(CombatError::DuplicateActor(id)) if id == a
        ));

        let ghost = ActorId::from_raw(9);
        assert!(matches!(
            sim.add_fighter(ghost, Vec3::ZERO, 0.0),
            Err(CombatError::Physics(_))
        ));
        assert!(matches!(
            sim.attach_ai(ghost, Personality::default(), KnowledgeBase::new()),
            Err(CombatError::UnknownActor(_))
        ));
        assert_eq!(sim.fighter_count(), 2);
    }

    #[test]
    fn test_advance_runs_fixed_steps() {
        let (mut sim, _, _) = two_fighters(5.0);
        let dt = sim.config().fixed_dt;

        assert_eq!(sim.advance(dt * 2.5).unwrap_or_default(), 2);
        assert!((sim.alpha() - 0.5).abs() < 1e-3);
        assert_eq!(sim.ticks(), 2);

        assert_eq!(sim.advance(0.0).unwrap_or_default(), 0);
        assert_eq!(sim.advance(f32::NAN).unwrap_or_default(), 0);
    }

    #[test]
    fn test_advance_drops_backlog() {
        let (mut sim, _, _) = two_fighters(5.0);
        let steps = sim.advance(5.0).unwrap_or_default();
        assert_eq!(steps, sim.config().max_steps_per_frame);
        assert!(sim.alpha().abs() < f32::EPSILON);
    }

    #[test]
    fn test_light_hit_lands_through_loop() {
        let (mut sim, a, b) = two_fighters(1.5);
        assert!(sim.controller_mut(a).is_some_and(|c| c.request_attack(AttackKind::Light)));
        run(&mut sim, 60);

        let hp = sim.controller(b).map(|c| c.hp().value()).unwrap_or_default();
        assert!((hp - 88.0).abs() < f32::EPSILON);
        assert_eq!(sim.combo_count(a), 1);
        assert!(sim
            .log()
            .entries()
            .iter()
            .any(|e| e.actor == b && matches!(e.outcome, crate::knowledge::Outcome::DamageTaken)));
    }

    #[test]
    fn test_combo_scale_grows_with_chain() {
        let (mut sim, a, b) = two_fighters(1.5);
        for _ in 0..2 {
            assert!(sim.controller_mut(a).is_some_and(|c| c.request_attack(AttackKind::Light)));
            run(&mut sim, 45);
        }
        // 12 + round(12 * 1.035)
        let hp = sim.controller(b).map(|c| c.hp().value()).unwrap_or_default();
        assert!((hp - 76.0).abs() < f32::EPSILON);
        assert_eq!(sim.combo_count(a), 2);
    }

    #[test]
    fn test_subscribers_receive_events_and_failures_are_isolated() {
        let (mut sim, a, _) = two_fighters(1.5);
        let resolved = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&resolved);
        sim.subscribe(CombatEventKind::HitResolved, move |_: &CombatEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<(), HandlerError>(())
        });
        sim.subscribe(CombatEventKind::HitResolved, failing_handler);

        assert!(sim.controller_mut(a).is_some_and(|c| c.request_attack(AttackKind::Light)));
        run(&mut sim, 60);

        assert_eq!(resolved.load(Ordering::SeqCst), 1);
        assert_eq!(sim.failed_handlers(), 1);
    }

    #[test]
    fn test_bounds_clamp() {
        let mut config = CombatConfig::default();
        config.simulation.arena_bounds = 5.0;
        let mut sim = SimulationLoop::kinematic(&config);
        let a = ActorId::from_raw(1);
        assert!(sim.spawn_fighter(a, Vec3::new(4.99, 0.0, 0.0), 0.0).is_ok());
        if let Some(c) = sim.controller_mut(a) {
            c.set_move_intent(Vec3::X);
        }
        run(&mut sim, 30);

        let pos = sim.position(a).unwrap_or_default();
        assert!(pos.x.hypot(pos.z) <= 5.0 + 1e-4);
    }

    #[test]
    fn test_knockout_and_reset() {
        let (mut sim, a, b) = two_fighters(1.5);
        if let Some(c) = sim.controller_mut(b) {
            c.reset_combat_state(ResetOverrides::full().with_hp(10.0));
        }
        assert!(sim.round_outcome().is_none());

        assert!(sim.controller_mut(a).is_some_and(|c| c.request_attack(AttackKind::Light)));
        run(&mut sim, 60);

        assert_eq!(
            sim.round_outcome(),
            Some(RoundOutcome::Knockout { winner: Some(a) })
        );
        assert_eq!(
            sim.controller(b).map(ActorCombatController::state),
            Some(ControllerState::Dead)
        );

        let summary = sim.finish_round();
        assert_eq!(summary.outcome.and_then(RoundOutcome::winner), Some(a));
        assert_eq!(summary.fighters.len(), 2);
        assert!(sim.log().is_empty());

        assert!(sim.reset_round().is_ok());
        assert!(sim.round_outcome().is_none());
        let hp = sim.controller(b).map(|c| c.hp().value()).unwrap_or_default();
        assert!((hp - 100.0).abs() < f32::EPSILON);
        let pos = sim.position(b).unwrap_or_default();
        assert!((pos.z - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_time_up_leader() {
        let mut config = CombatConfig::default();
        config.simulation.round_time_limit = 0.5;
        let mut sim = SimulationLoop::kinematic(&config);
        let a = ActorId::from_raw(1);
        let b = ActorId::from_raw(2);
        assert!(sim.spawn_fighter(a, Vec3::ZERO, 0.0).is_ok());
        assert!(sim.spawn_fighter(b, Vec3::new(0.0, 0.0, 10.0), 0.0).is_ok());

        run(&mut sim, 31);
        assert_eq!(sim.round_outcome(), Some(RoundOutcome::TimeUp { leader: None }));

        if let Some(c) = sim.controller_mut(b) {
            c.reset_combat_state(ResetOverrides::full().with_hp(40.0));
        }
        assert_eq!(sim.round_outcome(), Some(RoundOutcome::TimeUp { leader: Some(a) }));
    }

    #[test]
    fn test_ai_duel_is_deterministic_with_seed() {
        fn duel() -> (f32, f32) {
            let mut config = CombatConfig::default();
            config.ai.seed = Some(7);
            let mut sim = SimulationLoop::kinematic(&config);
            let a = ActorId::from_raw(1);
            let b = ActorId::from_raw(2);
            assert!(sim.spawn_fighter(a, Vec3::new(0.0, 0.0, -4.0), 0.0).is_ok());
            assert!(sim
                .spawn_fighter(b, Vec3::new(0.0, 0.0, 4.0), std::f32::consts::PI)
                .is_ok());
            for id in [a, b] {
                assert!(sim
                    .attach_ai(id, Personality::default(), KnowledgeBase::new())
                    .is_ok());
            }
            for _ in 0..600 {
                assert!(sim.tick().is_ok());
                if sim.round_outcome().is_some() {
                    break;
                }
            }
            let hp = |id| sim.controller(id).map(|c| c.hp().value()).unwrap_or_default();
            (hp(a), hp(b))
        }

        assert_eq!(duel(), duel());
    }
}
