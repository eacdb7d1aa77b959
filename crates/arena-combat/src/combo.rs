//! Input-buffered combo recognition and the attacker combo counter.

use arena_common::SpecialId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::moves::InputAction;

/// Default rolling window for buffered inputs (seconds).
pub const COMBO_WINDOW: f32 = 1.5;
/// Minimum time between two triggers of the same special (seconds).
pub const SPECIAL_BUFFER_LATCH: f32 = 0.2;
/// Time after which an attacker's hit chain drops (seconds).
pub const COMBO_DROP_TIME: f32 = 1.4;
/// Combo scale gained per chained hit.
pub const COMBO_SCALE_PER_HIT: f32 = 0.035;
/// Upper bound of the combo scale bonus.
pub const COMBO_SCALE_MAX_BONUS: f32 = 0.45;

// ============================================================================
// Combo Recognizer
// ============================================================================

/// A recorded action and the buffer clock at which it happened.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferedInput {
    /// Action performed.
    pub action: InputAction,
    /// Buffer clock at record time (seconds).
    pub time: f64,
}

/// Per-actor input buffer matched against special patterns.
#[derive(Debug, Clone)]
pub struct ComboRecognizer {
    window: f32,
    latch: f32,
    clock: f64,
    buffer: VecDeque<BufferedInput>,
    latches: HashMap<SpecialId, f64>,
}

impl Default for ComboRecognizer {
    fn default() -> Self {
        Self::new(COMBO_WINDOW)
    }
}

impl ComboRecognizer {
    /// Creates a recognizer with the given rolling window.
    #[must_use]
    pub fn new(window: f32) -> Self {
        Self {
            window: window.max(0.0),
            latch: SPECIAL_BUFFER_LATCH,
            clock: 0.0,
            buffer: VecDeque::new(),
            latches: HashMap::new(),
        }
    }

    /// Set debounce latch.
    #[must_use]
    pub fn with_latch(mut self, latch: f32) -> Self {
        self.latch = latch.max(0.0);
        self
    }

    /// Current buffer clock (seconds).
    #[must_use]
    pub fn clock(&self) -> f64 {
        self.clock
    }

    /// Advances the clock and drops expired inputs.
    pub fn advance(&mut self, dt: f32) {
        self.clock += f64::from(dt.max(0.0));
        self.prune();
    }

    /// Appends an action at the current clock.
    pub fn record(&mut self, action: InputAction) {
        self.prune();
        self.buffer.push_back(BufferedInput {
            action,
            time: self.clock,
        });
        self.prune();
    }

    fn prune(&mut self) {
        let cutoff = self.clock - f64::from(self.window);
        while self.buffer.front().is_some_and(|input| input.time < cutoff) {
            self.buffer.pop_front();
        }
    }

    /// Checks whether the trailing inputs equal `pattern` exactly.
    #[must_use]
    pub fn matches(&self, pattern: &[InputAction]) -> bool {
        if pattern.is_empty() || self.buffer.len() < pattern.len() {
            return false;
        }
        let start = self.buffer.len() - pattern.len();
        self.buffer
            .iter()
            .skip(start)
            .zip(pattern)
            .all(|(input, expected)| input.action == *expected)
    }

    /// Marks `special` as triggered unless it triggered within the latch.
    ///
    /// Returns `false` when debounced.
    pub fn try_latch(&mut self, special: &SpecialId) -> bool {
        if let Some(&last) = self.latches.get(special) {
            if self.clock - last < f64::from(self.latch) {
                return false;
            }
        }
        self.latches.insert(special.clone(), self.clock);
        true
    }

    /// Removes the trailing `count` inputs.
    pub fn consume(&mut self, count: usize) {
        let keep = self.buffer.len().saturating_sub(count);
        self.buffer.truncate(keep);
    }

    /// Buffered actions, oldest first.
    pub fn actions(&self) -> impl Iterator<Item = InputAction> + '_ {
        self.buffer.iter().map(|input| input.action)
    }

    /// Number of buffered inputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clears inputs and latches. The clock keeps running.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.latches.clear();
    }
}

// ============================================================================
// Combo Counter
// ============================================================================

/// Chain of unblocked hits landed by an attacker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComboCounter {
    count: u32,
    last_hit: Option<f64>,
    drop_time: f32,
}

impl Default for ComboCounter {
    fn default() -> Self {
        Self {
            count: 0,
            last_hit: None,
            drop_time: COMBO_DROP_TIME,
        }
    }
}

impl ComboCounter {
    /// Creates an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn expired(&self, now: f64) -> bool {
        self.last_hit
            .map_or(true, |last| now - last > f64::from(self.drop_time))
    }

    /// Chain length as seen at `now`.
    #[must_use]
    pub fn count(&self, now: f64) -> u32 {
        if self.expired(now) {
            0
        } else {
            self.count
        }
    }

    /// Damage multiplier for the next hit landed at `now`.
    #[must_use]
    pub fn scale(&self, now: f64) -> f32 {
        1.0 + (self.count(now) as f32 * COMBO_SCALE_PER_HIT).min(COMBO_SCALE_MAX_BONUS)
    }

    /// Counts an unblocked hit.
    pub fn register_hit(&mut self, now: f64) {
        if self.expired(now) {
            self.count = 0;
        }
        self.count += 1;
        self.last_hit = Some(now);
    }

    /// Drops the chain.
    pub fn reset(&mut self) {
        self.count = 0;
        self.last_hit = None;
    }
}
