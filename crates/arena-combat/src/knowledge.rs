//! Situational knowledge base learned from past fights.
//!
//! Executed AI actions are grouped into fixed-length sequences and stored per
//! situation key. Hit outcomes logged during a round later reinforce the last
//! sequence used in the situation where the outcome happened.

use arena_common::{ActorId, SchemaVersion};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::ai::{ActionScores, AiAction};
use crate::damage::HitImpact;
use crate::error::KnowledgeError;

/// Default number of actions per learned sequence.
pub const KB_SEQUENCE_LEN: usize = 4;
/// Lowest effectiveness a sequence can reach.
pub const EFFECTIVENESS_MIN: f32 = -5.0;
/// Highest effectiveness a sequence can reach.
pub const EFFECTIVENESS_MAX: f32 = 25.0;
/// A hit taken this soon after dealing damage counts as a trade (seconds).
pub const TRADE_WINDOW: f64 = 0.45;

// ============================================================================
// Knowledge Base
// ============================================================================

/// An action sequence and how well it has worked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedSequence {
    /// Actions in execution order.
    pub sequence: Vec<AiAction>,
    /// Learned effectiveness, clamped to `[-5, 25]`.
    pub effectiveness: f32,
}

impl LearnedSequence {
    /// A new sequence with zero effectiveness.
    #[must_use]
    pub fn new(sequence: Vec<AiAction>) -> Self {
        Self {
            sequence,
            effectiveness: 0.0,
        }
    }

    /// Set effectiveness.
    #[must_use]
    pub fn with_effectiveness(mut self, effectiveness: f32) -> Self {
        self.effectiveness = effectiveness.clamp(EFFECTIVENESS_MIN, EFFECTIVENESS_MAX);
        self
    }
}

/// Learned sequences indexed by situation key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Format version of the stored data.
    pub version: SchemaVersion,
    #[serde(default)]
    entries: BTreeMap<String, Vec<LearnedSequence>>,
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::new()
    }
}

impl KnowledgeBase {
    /// Creates an empty knowledge base at the current version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: SchemaVersion::KNOWLEDGE_BASE,
            entries: BTreeMap::new(),
        }
    }

    /// Sequences learned under `situation`.
    #[must_use]
    pub fn sequences(&self, situation: &str) -> &[LearnedSequence] {
        self.entries.get(situation).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of situations with sequences.
    #[must_use]
    pub fn situation_count(&self) -> usize {
        self.entries.len()
    }

    /// Total number of sequences.
    #[must_use]
    pub fn sequence_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether nothing has been learned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds a sequence under `situation`, replacing an identical one.
    pub fn insert(&mut self, situation: impl Into<String>, learned: LearnedSequence) {
        let list = self.entries.entry(situation.into()).or_default();
        match list.iter_mut().find(|s| s.sequence == learned.sequence) {
            Some(existing) => *existing = learned,
            None => list.push(learned),
        }
    }

    /// Stores `sequence` under `situation` unless already known.
    ///
    /// Returns `true` when the sequence is new.
    pub fn record_sequence(&mut self, situation: &str, sequence: &[AiAction]) -> bool {
        let list = self.entries.entry(situation.to_string()).or_default();
        if list.iter().any(|s| s.sequence == sequence) {
            return false;
        }
        list.push(LearnedSequence::new(sequence.to_vec()));
        true
    }

    /// Sums effectiveness by each sequence's first action.
    #[must_use]
    pub fn action_scores(&self, situation: &str) -> ActionScores {
        let mut scores = ActionScores::default();
        for learned in self.sequences(situation) {
            if let Some(&first) = learned.sequence.first() {
                scores.add(first, learned.effectiveness);
            }
        }
        scores
    }

    /// Adjusts a sequence's effectiveness.
    ///
    /// Targets `sequence` when it is stored under `situation`, otherwise the
    /// most recently stored sequence there. Returns the new effectiveness.
    pub fn reinforce(
        &mut self,
        situation: &str,
        sequence: Option<&[AiAction]>,
        delta: f32,
    ) -> Option<f32> {
        let list = self.entries.get_mut(situation)?;
        let index = sequence
            .and_then(|seq| list.iter().position(|s| s.sequence == seq))
            .or_else(|| list.len().checked_sub(1))?;
        let target = list.get_mut(index)?;
        target.effectiveness =
            (target.effectiveness + delta).clamp(EFFECTIVENESS_MIN, EFFECTIVENESS_MAX);
        Some(target.effectiveness)
    }

    /// Drops everything learned.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    // ------------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------------

    /// Writes the knowledge base as pretty JSON (temp file, then rename).
    pub fn save_to(&self, path: &Path) -> Result<(), KnowledgeError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = path.with_extension("json.tmp");
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        fs::rename(&temp_path, path).map_err(|e| {
            let _ = fs::remove_file(&temp_path);
            e
        })?;

        info!(
            "Saved knowledge base ({} sequences) to {:?}",
            self.sequence_count(),
            path
        );
        Ok(())
    }

    /// Reads a knowledge base, rejecting data from another major version.
    pub fn load_from(path: &Path) -> Result<Self, KnowledgeError> {
        let reader = BufReader::new(File::open(path)?);
        let loaded: Self = serde_json::from_reader(reader)?;
        if !SchemaVersion::KNOWLEDGE_BASE.can_read(&loaded.version) {
            return Err(KnowledgeError::Version {
                found: loaded.version,
                expected: SchemaVersion::KNOWLEDGE_BASE,
            });
        }
        debug!("Loaded knowledge base from {:?}", path);
        Ok(loaded)
    }

    /// Reads a knowledge base, starting empty when missing or unreadable.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            info!("No knowledge base at {:?}, starting fresh", path);
            return Self::new();
        }
        match Self::load_from(path) {
            Ok(kb) => kb,
            Err(e) => {
                warn!("Discarding knowledge base {:?}: {}", path, e);
                Self::new()
            },
        }
    }
}

// ============================================================================
// Action Recording
// ============================================================================

/// Collects executed actions into sequences for one actor.
#[derive(Debug, Clone)]
pub struct ActionRecorder {
    sequence_len: usize,
    current: Vec<AiAction>,
    last_by_situation: HashMap<String, Vec<AiAction>>,
}

impl Default for ActionRecorder {
    fn default() -> Self {
        Self::new(KB_SEQUENCE_LEN)
    }
}

impl ActionRecorder {
    /// Creates a recorder flushing every `sequence_len` actions (at least 1).
    #[must_use]
    pub fn new(sequence_len: usize) -> Self {
        Self {
            sequence_len: sequence_len.max(1),
            current: Vec::new(),
            last_by_situation: HashMap::new(),
        }
    }

    /// Appends an executed action; a completed sequence is stored under
    /// `situation` and becomes that situation's latest sequence.
    pub fn record(&mut self, action: AiAction, situation: &str, knowledge: &mut KnowledgeBase) {
        self.current.push(action);
        if self.current.len() < self.sequence_len {
            return;
        }
        let sequence = std::mem::take(&mut self.current);
        if situation.is_empty() {
            return;
        }
        if knowledge.record_sequence(situation, &sequence) {
            debug!("Learned sequence {:?} under {}", sequence, situation);
        }
        self.last_by_situation.insert(situation.to_string(), sequence);
    }

    /// Actions recorded since the last flush.
    #[must_use]
    pub fn pending(&self) -> &[AiAction] {
        &self.current
    }

    /// Latest sequence stored under `situation`.
    #[must_use]
    pub fn last_sequence(&self, situation: &str) -> Option<&[AiAction]> {
        self.last_by_situation.get(situation).map(Vec::as_slice)
    }

    /// Discards the partial sequence.
    pub fn reset_sequence(&mut self) {
        self.current.clear();
    }
}

// ============================================================================
// Combat Log
// ============================================================================

/// What happened to an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Landed an unblocked hit.
    DamageDealt,
    /// Defeated the opponent.
    Kill,
    /// Took an unblocked hit.
    DamageTaken,
    /// Own attack was blocked.
    AttackBlocked,
    /// Own attack was parried.
    AttackParried,
    /// Anything else.
    Other {
        /// Whether it went well.
        success: bool,
    },
}

impl Outcome {
    /// Effectiveness change before trade detection.
    #[must_use]
    pub fn base_delta(self) -> f32 {
        match self {
            Self::DamageDealt => 0.6,
            Self::Kill => 10.0,
            Self::DamageTaken => -1.5,
            Self::AttackBlocked => -0.6,
            Self::AttackParried => -2.2,
            Self::Other { success: true } => 0.4,
            Self::Other { success: false } => -0.4,
        }
    }
}

/// A logged outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Actor the outcome belongs to.
    pub actor: ActorId,
    /// Outcome.
    pub outcome: Outcome,
    /// Situation key at the time.
    pub situation: String,
    /// Simulation time (seconds).
    pub time: f64,
}

/// Outcomes gathered during a round.
#[derive(Debug, Clone, Default)]
pub struct CombatLog {
    entries: Vec<LogEntry>,
}

impl CombatLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn push(&mut self, actor: ActorId, outcome: Outcome, situation: impl Into<String>, time: f64) {
        self.entries.push(LogEntry {
            actor,
            outcome,
            situation: situation.into(),
            time,
        });
    }

    /// Logs the outcomes of a resolved hit under the attacker's situation.
    pub fn record_impact(
        &mut self,
        attacker: ActorId,
        target: ActorId,
        impact: &HitImpact,
        situation: &str,
        time: f64,
    ) {
        if impact.blocked {
            let outcome = if impact.parry {
                Outcome::AttackParried
            } else {
                Outcome::AttackBlocked
            };
            self.push(attacker, outcome, situation, time);
        } else if impact.hit {
            self.push(attacker, Outcome::DamageDealt, situation, time);
            if impact.hp <= 0.0 {
                self.push(attacker, Outcome::Kill, situation, time);
            }
            self.push(target, Outcome::DamageTaken, situation, time);
        }
    }

    /// Logged entries in order.
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Empties the log.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Reinforces `knowledge` from `actor`'s entries.
    ///
    /// Damage dealt counts for less when the same actor takes damage within
    /// [`TRADE_WINDOW`]. Returns the number of entries applied.
    pub fn learn(&self, actor: ActorId, recorder: &ActionRecorder, knowledge: &mut KnowledgeBase) -> usize {
        let mut applied = 0;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.actor != actor || knowledge.sequences(&entry.situation).is_empty() {
                continue;
            }
            let delta = match entry.outcome {
                Outcome::DamageDealt if self.traded(actor, i) => 0.15,
                outcome => outcome.base_delta(),
            };
            let sequence = recorder.last_sequence(&entry.situation);
            if knowledge.reinforce(&entry.situation, sequence, delta).is_some() {
                applied += 1;
            }
        }
        if applied > 0 {
            debug!("{} reinforced {} outcomes", actor, applied);
        }
        applied
    }

    fn traded(&self, actor: ActorId, index: usize) -> bool {
        let Some(dealt) = self.entries.get(index) else {
            return false;
        };
        for next in self.entries.iter().skip(index + 1).filter(|e| e.actor == actor) {
            if next.time - dealt.time > TRADE_WINDOW {
                break;
            }
            if next.outcome == Outcome::DamageTaken {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const KEY: &str = "near|free|st-high|fo-low";

    fn seq(actions: &[AiAction]) -> Vec<AiAction> {
        actions.to_vec()
    }

    #[test]
    fn test_record_sequence_dedup() {
        let mut kb = KnowledgeBase::new();
        let s = [AiAction::Light, AiAction::Light, AiAction::Heavy, AiAction::Wait];
        assert!(kb.record_sequence(KEY, &s));
        assert!(!kb.record_sequence(KEY, &s));
        assert_eq!(kb.sequence_count(), 1);
        assert_eq!(kb.situation_count(), 1);
    }

    #[test]
    fn test_recorder_flushes_every_four() {
        let mut kb = KnowledgeBase::new();
        let mut recorder = ActionRecorder::default();
        for action in [AiAction::Light, AiAction::Block, AiAction::Light] {
            recorder.record(action, KEY, &mut kb);
        }
        assert!(kb.is_empty());
        assert_eq!(recorder.pending().len(), 3);

        recorder.record(AiAction::Heavy, KEY, &mut kb);
        assert!(recorder.pending().is_empty());
        let expected = seq(&[AiAction::Light, AiAction::Block, AiAction::Light, AiAction::Heavy]);
        assert_eq!(kb.sequences(KEY)[0].sequence, expected);
        assert_eq!(recorder.last_sequence(KEY), Some(expected.as_slice()));
    }

    #[test]
    fn test_action_scores_sum_first_actions() {
        let mut kb = KnowledgeBase::new();
        kb.insert(KEY, LearnedSequence::new(seq(&[AiAction::Light, AiAction::Wait])).with_effectiveness(2.0));
        kb.insert(KEY, LearnedSequence::new(seq(&[AiAction::Light, AiAction::Heavy])).with_effectiveness(1.5));
        kb.insert(KEY, LearnedSequence::new(seq(&[AiAction::Dodge])).with_effectiveness(-1.0));

        let scores = kb.action_scores(KEY);
        assert!((scores.get(AiAction::Light) - 3.5).abs() < f32::EPSILON);
        assert!((scores.get(AiAction::Dodge) + 1.0).abs() < f32::EPSILON);
        assert!(scores.get(AiAction::Heavy).abs() < f32::EPSILON);
        assert_eq!(kb.action_scores("far|free|st-low|fo-low"), ActionScores::default());
    }

    #[test]
    fn test_reinforce_clamps_and_falls_back() {
        let mut kb = KnowledgeBase::new();
        kb.record_sequence(KEY, &[AiAction::Light]);
        kb.record_sequence(KEY, &[AiAction::Heavy]);

        assert_eq!(kb.reinforce(KEY, Some(&[AiAction::Light][..]), 30.0), Some(25.0));
        // Unknown sequence: most recent entry.
        assert_eq!(kb.reinforce(KEY, Some(&[AiAction::Wait][..]), -9.0), Some(-5.0));
        assert!((kb.sequences(KEY)[1].effectiveness + 5.0).abs() < f32::EPSILON);
        assert_eq!(kb.reinforce("missing", None, 1.0), None);
    }

    #[test]
    fn test_learning_from_log() {
        let me = ActorId::from_raw(1);
        let them = ActorId::from_raw(2);
        let mut kb = KnowledgeBase::new();
        let mut recorder = ActionRecorder::new(1);
        recorder.record(AiAction::Light, KEY, &mut kb);

        let mut log = CombatLog::new();
        let hit = HitImpact {
            hit: true,
            hp: 50.0,
            ..HitImpact::default()
        };
        log.record_impact(me, them, &hit, KEY, 1.0);
        // Opponent entries are ignored.
        assert_eq!(log.len(), 2);
        assert_eq!(log.learn(me, &recorder, &mut kb), 1);
        assert!((kb.sequences(KEY)[0].effectiveness - 0.6).abs() < 1e-6);

        // Trade: damage dealt then damage taken within 0.45 s.
        let mut kb2 = KnowledgeBase::new();
        recorder.record(AiAction::Light, KEY, &mut kb2);
        let mut log = CombatLog::new();
        log.push(me, Outcome::DamageDealt, KEY, 1.0);
        log.push(me, Outcome::DamageTaken, KEY, 1.3);
        log.learn(me, &recorder, &mut kb2);
        assert!((kb2.sequences(KEY)[0].effectiveness - (0.15 - 1.5)).abs() < 1e-6);

        // Outside the window it is not a trade.
        let mut kb3 = KnowledgeBase::new();
        recorder.record(AiAction::Light, KEY, &mut kb3);
        let mut log = CombatLog::new();
        log.push(me, Outcome::DamageDealt, KEY, 1.0);
        log.push(me, Outcome::DamageTaken, KEY, 1.5);
        log.learn(me, &recorder, &mut kb3);
        assert!((kb3.sequences(KEY)[0].effectiveness - (0.6 - 1.5)).abs() < 1e-6);
    }

    #[test]
    fn test_kill_and_block_outcomes() {
        let me = ActorId::from_raw(1);
        let them = ActorId::from_raw(2);
        let mut log = CombatLog::new();

        let kill = HitImpact {
            hit: true,
            hp: 0.0,
            ..HitImpact::default()
        };
        log.record_impact(me, them, &kill, KEY, 0.0);
        let outcomes: Vec<_> = log.entries().iter().map(|e| e.outcome).collect();
        assert_eq!(
            outcomes,
            vec![Outcome::DamageDealt, Outcome::Kill, Outcome::DamageTaken]
        );

        let parried = HitImpact {
            blocked: true,
            parry: true,
            ..HitImpact::default()
        };
        log.record_impact(me, them, &parried, KEY, 1.0);
        assert_eq!(log.entries().last().map(|e| e.outcome), Some(Outcome::AttackParried));

        log.record_impact(me, them, &HitImpact::default(), KEY, 2.0);
        assert_eq!(log.len(), 4);

        assert!((Outcome::AttackBlocked.base_delta() + 0.6).abs() < f32::EPSILON);
        assert!((Outcome::Other { success: false }.base_delta() + 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("kb").join("fighter.json");

        let mut kb = KnowledgeBase::new();
        kb.insert(KEY, LearnedSequence::new(seq(&[AiAction::Special, AiAction::Wait])).with_effectiveness(4.0));
        kb.save_to(&path).expect("save");

        let loaded = KnowledgeBase::load_from(&path).expect("load");
        assert_eq!(loaded, kb);

        let text = std::fs::read_to_string(&path).expect("read");
        assert!(text.contains("\"SPECIAL\""));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("old.json");
        std::fs::write(
            &path,
            r#"{"version":{"major":1,"minor":0,"patch":0},"entries":{}}"#,
        )
        .expect("write");

        assert!(matches!(
            KnowledgeBase::load_from(&path),
            Err(KnowledgeError::Version { .. })
        ));
        assert!(KnowledgeBase::load_or_default(&path).is_empty());
        assert!(KnowledgeBase::load_or_default(&dir.path().join("missing.json")).is_empty());
    }
}
