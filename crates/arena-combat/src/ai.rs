//! AI decision engine for non-player combatants.
//!
//! This module provides:
//! - Utility scoring biased by a personality profile and learned knowledge
//! - Situation keys indexing the knowledge base
//! - Engage/retreat strategy with hysteresis
//! - A per-actor engine that steers and issues controller requests

use arena_common::{flatten, planar_distance, ActorId, SpecialId};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info};

use crate::config::AiConfig;
use crate::controller::{ActorCombatController, SpecialOptions};
use crate::knowledge::{ActionRecorder, CombatLog, KnowledgeBase};
use crate::moves::AttackKind;
use crate::state::{AttackSnapshot, CombatSnapshot};

/// Number of AI action kinds.
pub const ACTION_COUNT: usize = 6;
/// Aggression ratio used when a profile has none.
pub const DEFAULT_AGGRESSION: f32 = 0.6;
/// Block-vs-evade ratio used when a profile has none.
pub const DEFAULT_BLOCK_VS_EVADE: f32 = 0.5;
/// Action timer floor while the actor is busy (seconds).
pub const BUSY_ACTION_HOLD: f32 = 0.1;

const STRAFE_WEIGHT: f32 = 0.65;
const PULSE_WEIGHT: f32 = 0.15;
const PULSE_RATE: f64 = 2.5;

// ============================================================================
// Actions
// ============================================================================

/// Discrete action an AI can choose.
///
/// Declaration order is the tie-break order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AiAction {
    /// Light attack.
    Light,
    /// Heavy attack.
    Heavy,
    /// Raise the guard.
    Block,
    /// Dodge.
    Dodge,
    /// Do nothing.
    Wait,
    /// A learned special.
    Special,
}

impl AiAction {
    /// All actions in tie-break order.
    #[must_use]
    pub const fn all() -> [Self; ACTION_COUNT] {
        [
            Self::Light,
            Self::Heavy,
            Self::Block,
            Self::Dodge,
            Self::Wait,
            Self::Special,
        ]
    }

    /// Position in [`AiAction::all`].
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Light => 0,
            Self::Heavy => 1,
            Self::Block => 2,
            Self::Dodge => 3,
            Self::Wait => 4,
            Self::Special => 5,
        }
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Light => "LIGHT",
            Self::Heavy => "HEAVY",
            Self::Block => "BLOCK",
            Self::Dodge => "DODGE",
            Self::Wait => "WAIT",
            Self::Special => "SPECIAL",
        }
    }

    /// Time before the next action after this one executes (seconds).
    #[must_use]
    pub fn cooldown(self) -> f32 {
        match self {
            Self::Light => 0.45,
            Self::Heavy => 0.75,
            Self::Block => 0.4,
            Self::Dodge => 0.35,
            Self::Special => 0.6,
            Self::Wait => 0.25,
        }
    }
}

impl fmt::Display for AiAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One score per action.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActionScores([f32; ACTION_COUNT]);

impl ActionScores {
    /// Score of `action`.
    #[must_use]
    pub fn get(&self, action: AiAction) -> f32 {
        self.0[action.index()]
    }

    /// Adds `amount` to the score of `action`.
    pub fn add(&mut self, action: AiAction, amount: f32) {
        self.0[action.index()] += amount;
    }

    /// Adds every score of `other`.
    pub fn merge(&mut self, other: &Self) {
        for action in AiAction::all() {
            self.add(action, other.get(action));
        }
    }

    /// Action with the strictly greatest score; the earliest action wins ties.
    #[must_use]
    pub fn best(&self) -> AiAction {
        let mut best = AiAction::Wait;
        let mut best_score = f32::NEG_INFINITY;
        for action in AiAction::all() {
            let score = self.get(action);
            if score > best_score {
                best = action;
                best_score = score;
            }
        }
        best
    }
}

// ============================================================================
// Personality
// ============================================================================

/// Behavioral profile of an AI fighter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Personality {
    /// Offense preference (ratio, `>= 0`).
    pub aggression_ratio: f32,
    /// Blocking over dodging preference (ratio, `>= 0`).
    pub block_vs_evade_ratio: f32,
    /// Preferred fighting distance, if learned.
    pub mean_engagement_distance: Option<f32>,
    /// Specials this fighter may use.
    pub learned_specials: Vec<SpecialId>,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            aggression_ratio: DEFAULT_AGGRESSION,
            block_vs_evade_ratio: DEFAULT_BLOCK_VS_EVADE,
            mean_engagement_distance: None,
            learned_specials: Vec::new(),
        }
    }
}

impl Personality {
    /// Set aggression ratio.
    #[must_use]
    pub fn with_aggression(mut self, ratio: f32) -> Self {
        self.aggression_ratio = ratio;
        self
    }

    /// Set block-vs-evade ratio.
    #[must_use]
    pub fn with_block_vs_evade(mut self, ratio: f32) -> Self {
        self.block_vs_evade_ratio = ratio;
        self
    }

    /// Set preferred engagement distance.
    #[must_use]
    pub fn with_engagement_distance(mut self, distance: f32) -> Self {
        self.mean_engagement_distance = Some(distance);
        self
    }

    /// Set learned specials.
    #[must_use]
    pub fn with_specials(mut self, specials: Vec<SpecialId>) -> Self {
        self.learned_specials = specials;
        self
    }

    /// `aggression / (aggression + 1)`.
    #[must_use]
    pub fn aggression(&self) -> f32 {
        normalized_ratio(self.aggression_ratio)
    }

    /// `blockVsEvade / (blockVsEvade + 1)`.
    #[must_use]
    pub fn block_bias(&self) -> f32 {
        normalized_ratio(self.block_vs_evade_ratio)
    }

    /// Distance the utility scoring measures against.
    #[must_use]
    pub fn preferred_distance(&self, close: f32) -> f32 {
        self.mean_engagement_distance
            .filter(|d| d.is_finite())
            .unwrap_or(close * 1.2)
    }

    /// Distance movement tries to hold.
    #[must_use]
    pub fn engage_distance(&self, close: f32, engage: f32) -> f32 {
        self.mean_engagement_distance
            .filter(|d| d.is_finite())
            .map_or(close * 1.2, |d| d.clamp(close * 0.6, engage.max(close * 0.6)))
    }
}

fn normalized_ratio(raw: f32) -> f32 {
    let raw = if raw.is_finite() { raw.max(0.0) } else { 0.0 };
    raw / (raw + 1.0)
}

// ============================================================================
// Strategy
// ============================================================================

/// Coarse AI stance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Strategy {
    /// Fighting.
    #[default]
    Engaged,
    /// Backing off to recover.
    Retreat,
}

impl Strategy {
    /// Next stance given health and stamina ratios.
    ///
    /// Engaged flips to Retreat when hp < 30 % and stamina < 25 %. Retreat
    /// flips back when hp > 55 % or stamina > 60 %.
    #[must_use]
    pub fn next(self, hp_ratio: f32, stamina_ratio: f32) -> Self {
        match self {
            Self::Engaged if hp_ratio < 0.3 && stamina_ratio < 0.25 => Self::Retreat,
            Self::Retreat if hp_ratio > 0.55 || stamina_ratio > 0.6 => Self::Engaged,
            other => other,
        }
    }

    /// Next stance for an actor snapshot. Non-positive pools count as zero.
    #[must_use]
    pub fn update(self, own: &CombatSnapshot) -> Self {
        let hp = if own.hp > 0.0 { own.hp / own.max_hp } else { 0.0 };
        let stamina = if own.stamina > 0.0 {
            own.stamina / own.max_stamina
        } else {
            0.0
        };
        self.next(hp, stamina)
    }
}

// ============================================================================
// Situation Keys
// ============================================================================

/// Distance to the opponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistanceBucket {
    /// Closer than the close distance.
    Near,
    /// Closer than the engage distance.
    Mid,
    /// Anything further.
    Far,
}

/// What the opponent is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpponentActivity {
    /// Mid-attack.
    Attacking,
    /// Holding a block.
    Blocking,
    /// Neither.
    Free,
}

/// Fill level of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceLevel {
    /// Upper bucket.
    High,
    /// Middle bucket.
    Mid,
    /// Lower bucket.
    Low,
}

impl ResourceLevel {
    fn bucket(ratio: f32, high: f32, mid: f32) -> Self {
        if ratio > high {
            Self::High
        } else if ratio > mid {
            Self::Mid
        } else {
            Self::Low
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Mid => "mid",
            Self::Low => "low",
        }
    }
}

/// Bucketed description of a moment in a fight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SituationKey {
    /// Distance bucket.
    pub distance: DistanceBucket,
    /// Opponent activity.
    pub opponent: OpponentActivity,
    /// Own stamina bucket (> 60 %, > 35 %).
    pub stamina: ResourceLevel,
    /// Own focus bucket (> 66 %, > 33 %).
    pub focus: ResourceLevel,
}

impl SituationKey {
    /// Classifies a situation. Pool ratios divide by `max(1, max)`.
    #[must_use]
    pub fn classify(
        distance: f32,
        opponent: OpponentActivity,
        own: &CombatSnapshot,
        config: &AiConfig,
    ) -> Self {
        let distance = if distance < config.close_distance {
            DistanceBucket::Near
        } else if distance < config.engage_distance {
            DistanceBucket::Mid
        } else {
            DistanceBucket::Far
        };
        let stamina = own.stamina / own.max_stamina.max(1.0);
        let focus = own.focus / own.max_focus.max(1.0);
        Self {
            distance,
            opponent,
            stamina: ResourceLevel::bucket(stamina, 0.6, 0.35),
            focus: ResourceLevel::bucket(focus, 0.66, 0.33),
        }
    }
}

impl fmt::Display for SituationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let distance = match self.distance {
            DistanceBucket::Near => "near",
            DistanceBucket::Mid => "mid",
            DistanceBucket::Far => "far",
        };
        let opponent = match self.opponent {
            OpponentActivity::Attacking => "attacking",
            OpponentActivity::Blocking => "blocking",
            OpponentActivity::Free => "free",
        };
        write!(
            f,
            "{distance}|{opponent}|st-{}|fo-{}",
            self.stamina.as_str(),
            self.focus.as_str()
        )
    }
}

// ============================================================================
// Utility Scoring
// ============================================================================

/// What the AI perceives of its opponent.
#[derive(Debug, Clone, PartialEq)]
pub struct OpponentView {
    /// Opponent actor.
    pub id: ActorId,
    /// Opponent position.
    pub position: Vec3,
    /// Opponent pools and timers.
    pub combat: CombatSnapshot,
    /// Opponent attack.
    pub attack: AttackSnapshot,
}

impl OpponentView {
    /// Attacking takes precedence over blocking.
    #[must_use]
    pub fn activity(&self) -> OpponentActivity {
        if self.attack.total_remaining > 0.0 {
            OpponentActivity::Attacking
        } else if self.combat.timers.block > 0.0 {
            OpponentActivity::Blocking
        } else {
            OpponentActivity::Free
        }
    }
}

/// Inputs to one utility evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionContext {
    /// Distance to the opponent.
    pub distance: f32,
    /// Opponent is mid-attack.
    pub opponent_attacking: bool,
    /// Own stamina.
    pub stamina: f32,
    /// Own focus.
    pub focus: f32,
}

/// Scores every action for a context, including knowledge-base scores.
#[must_use]
pub fn utility_scores(
    personality: &Personality,
    context: &DecisionContext,
    config: &AiConfig,
    knowledge: &ActionScores,
) -> ActionScores {
    let aggr = personality.aggression();
    let bias = personality.block_bias();
    let distance_delta = context.distance - personality.preferred_distance(config.close_distance);

    let mut scores = ActionScores::default();
    scores.add(AiAction::Wait, 0.1);
    scores.add(AiAction::Light, 0.4 + 0.8 * aggr);
    scores.add(AiAction::Heavy, 0.2 + 1.0 * aggr);
    scores.add(AiAction::Block, 0.3 + 0.9 * bias);
    scores.add(AiAction::Dodge, 0.25 + 0.8 * (1.0 - bias));

    if context.opponent_attacking {
        scores.add(AiAction::Block, 0.8);
        scores.add(AiAction::Dodge, 0.6);
    } else {
        scores.add(AiAction::Light, 0.3);
        scores.add(AiAction::Heavy, 0.2);
    }

    if context.stamina < config.low_stamina {
        scores.add(AiAction::Block, 0.6);
        scores.add(AiAction::Dodge, 0.4);
        scores.add(AiAction::Heavy, -0.6);
        scores.add(AiAction::Wait, 0.7);
    }

    if distance_delta > 0.5 {
        scores.add(AiAction::Light, -0.4);
        scores.add(AiAction::Heavy, -0.6);
        scores.add(AiAction::Special, -0.8);
        scores.add(AiAction::Wait, 0.5);
    }

    if context.focus > config.high_focus {
        scores.add(AiAction::Special, 0.6);
    }

    scores.merge(knowledge);
    scores
}

/// Picks the highest-scoring action.
#[must_use]
pub fn choose_action(
    personality: &Personality,
    context: &DecisionContext,
    config: &AiConfig,
    knowledge: &ActionScores,
) -> AiAction {
    utility_scores(personality, context, config, knowledge).best()
}

// ============================================================================
// Decision Engine
// ============================================================================

/// Drives one actor's controller from utility decisions.
#[derive(Debug)]
pub struct AiDecisionEngine {
    actor: ActorId,
    config: AiConfig,
    personality: Personality,
    strategy: Strategy,
    queue: VecDeque<AiAction>,
    action_timer: f32,
    decision_timer: f32,
    strafe_timer: f32,
    strafe_dir: f32,
    clock: f64,
    rng: fastrand::Rng,
    knowledge: KnowledgeBase,
    recorder: ActionRecorder,
    last_situation: Option<SituationKey>,
}

impl AiDecisionEngine {
    /// Creates an engine. A configured seed makes decisions reproducible.
    #[must_use]
    pub fn new(actor: ActorId, config: AiConfig, personality: Personality) -> Self {
        let rng = config
            .seed
            .map_or_else(fastrand::Rng::new, fastrand::Rng::with_seed);
        let recorder = ActionRecorder::new(config.sequence_length);
        Self {
            actor,
            config,
            personality,
            strategy: Strategy::Engaged,
            queue: VecDeque::new(),
            action_timer: 0.0,
            decision_timer: 0.0,
            strafe_timer: 0.0,
            strafe_dir: 1.0,
            clock: 0.0,
            rng,
            knowledge: KnowledgeBase::new(),
            recorder,
            last_situation: None,
        }
    }

    /// Set learned knowledge.
    #[must_use]
    pub fn with_knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = knowledge;
        self
    }

    /// Controlled actor.
    #[must_use]
    pub fn actor(&self) -> ActorId {
        self.actor
    }

    /// Current stance.
    #[must_use]
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Profile.
    #[must_use]
    pub fn personality(&self) -> &Personality {
        &self.personality
    }

    /// Queued actions, front first.
    pub fn queued(&self) -> impl Iterator<Item = AiAction> + '_ {
        self.queue.iter().copied()
    }

    /// Time until the next action may execute.
    #[must_use]
    pub fn action_timer(&self) -> f32 {
        self.action_timer
    }

    /// Situation of the latest decision.
    #[must_use]
    pub fn last_situation(&self) -> Option<SituationKey> {
        self.last_situation
    }

    /// Learned knowledge.
    #[must_use]
    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    /// Learned knowledge, mutable.
    pub fn knowledge_mut(&mut self) -> &mut KnowledgeBase {
        &mut self.knowledge
    }

    /// Executed-action recorder.
    #[must_use]
    pub fn recorder(&self) -> &ActionRecorder {
        &self.recorder
    }

    /// Engagement distance for the current stance.
    #[must_use]
    pub fn engage_distance(&self) -> f32 {
        let close = self.config.close_distance;
        let engage = self
            .personality
            .engage_distance(close, self.config.engage_distance);
        match self.strategy {
            Strategy::Retreat => engage.max(close * 1.8),
            Strategy::Engaged => engage,
        }
    }

    /// Runs one AI step: stance, steering, then actions.
    pub fn update(
        &mut self,
        dt: f32,
        controller: &mut ActorCombatController,
        position: Vec3,
        opponent: Option<&OpponentView>,
    ) {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        self.clock += f64::from(dt);

        let Some(opponent) = opponent else {
            controller.set_move_intent(Vec3::ZERO);
            controller.set_look_target(None);
            return;
        };

        let own = controller.combat_state();
        if own.timers.hit_stop > 0.0 || own.timers.stun > 0.0 {
            controller.set_move_intent(Vec3::ZERO);
            return;
        }

        let previous = self.strategy;
        self.strategy = self.strategy.update(&own);
        if self.strategy != previous {
            info!("{} switches to {:?}", self.actor, self.strategy);
        }

        let intent = self.steer(dt, position, opponent.position);
        controller.set_move_intent(intent);
        controller.set_look_target(Some(opponent.position));

        self.update_actions(dt, controller, &own, position, opponent);
    }

    fn steer(&mut self, dt: f32, position: Vec3, target: Vec3) -> Vec3 {
        let mut to_target = flatten(target - position);
        let distance = to_target.length();
        if distance > 1.0e-4 {
            to_target /= distance;
        }
        let engage = self.engage_distance();

        self.strafe_timer -= dt;
        if self.strafe_timer <= 0.0 {
            self.strafe_timer = 0.3 + self.rng.f32() * 0.4;
            self.strafe_dir = if self.rng.bool() { -1.0 } else { 1.0 };
        }

        let steering = match self.strategy {
            Strategy::Retreat => -to_target,
            Strategy::Engaged if distance > engage * 1.05 => to_target,
            Strategy::Engaged => {
                let perp = Vec3::new(to_target.z, 0.0, -to_target.x)
                    .try_normalize()
                    .unwrap_or(Vec3::Z);
                #[allow(clippy::cast_possible_truncation)]
                let pulse = (self.clock * PULSE_RATE).sin() as f32;
                perp * self.strafe_dir * STRAFE_WEIGHT + to_target * pulse * PULSE_WEIGHT
            },
        };
        steering.normalize_or_zero()
    }

    fn update_actions(
        &mut self,
        dt: f32,
        controller: &mut ActorCombatController,
        own: &CombatSnapshot,
        position: Vec3,
        opponent: &OpponentView,
    ) {
        let busy = controller.attack_snapshot().active || own.timers.stun > 0.0 || own.timers.block > 0.0;
        if busy {
            self.queue.clear();
            self.action_timer = self.action_timer.max(BUSY_ACTION_HOLD);
            return;
        }

        self.action_timer = (self.action_timer - dt).max(0.0);
        self.decision_timer = (self.decision_timer - dt).max(0.0);

        if self.queue.is_empty() && self.action_timer <= 0.0 && self.decision_timer <= 0.0 {
            let distance = planar_distance(position, opponent.position);
            let situation = SituationKey::classify(distance, opponent.activity(), own, &self.config);
            let learned = self.knowledge.action_scores(&situation.to_string());
            let context = DecisionContext {
                distance,
                opponent_attacking: opponent.activity() == OpponentActivity::Attacking,
                stamina: own.stamina,
                focus: own.focus,
            };
            let action = choose_action(&self.personality, &context, &self.config, &learned);
            debug!("{} chooses {action} in {situation}", self.actor);
            self.queue.push_back(action);
            self.last_situation = Some(situation);
            self.decision_timer =
                self.config.decision_interval + self.rng.f32() * self.config.decision_jitter;
        }

        let Some(&action) = self.queue.front() else {
            return;
        };
        if self.execute(action, controller) {
            self.queue.pop_front();
            self.action_timer = action.cooldown();
            if let Some(situation) = self.last_situation {
                self.recorder
                    .record(action, &situation.to_string(), &mut self.knowledge);
            }
        }
    }

    fn execute(&mut self, action: AiAction, controller: &mut ActorCombatController) -> bool {
        match action {
            AiAction::Light => controller.request_attack(AttackKind::Light),
            AiAction::Heavy => controller.request_attack(AttackKind::Heavy),
            AiAction::Block => controller.request_block(),
            AiAction::Dodge => controller.request_dodge(),
            AiAction::Wait => true,
            AiAction::Special => {
                let specials = &self.personality.learned_specials;
                if specials.is_empty() {
                    return false;
                }
                let pick = self.rng.usize(..specials.len());
                match specials.get(pick).cloned() {
                    Some(id) => controller.request_special(id, SpecialOptions::default()),
                    None => false,
                }
            },
        }
    }

    /// Reinforces learned sequences from this actor's log entries.
    ///
    /// Returns the number of entries applied.
    pub fn learn_from(&mut self, log: &CombatLog) -> usize {
        log.learn(self.actor, &self.recorder, &mut self.knowledge)
    }

    /// Clears queue, timers, stance and the partial sequence. Knowledge stays.
    pub fn reset_round(&mut self) {
        self.queue.clear();
        self.action_timer = 0.0;
        self.decision_timer = 0.0;
        self.strafe_timer = 0.0;
        self.strategy = Strategy::Engaged;
        self.last_situation = None;
        self.recorder.reset_sequence();
    }
}
