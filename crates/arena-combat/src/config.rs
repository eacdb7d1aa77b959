//! Combat configuration.
//!
//! Provides tunables for controllers, the AI and the simulation loop, plus
//! optional move and special overrides. Configuration can be loaded from and
//! saved to a TOML file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::moves::{MoveDefinition, MoveRegistry, SpecialDefinition};

/// Default combat configuration file name.
pub const CONFIG_FILE: &str = "combat.toml";

/// Whether computed pushback is applied to positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PushbackPolicy {
    /// Pushback is computed and reported but never moves anyone.
    #[default]
    Disabled,
    /// Hits push the defender along the attacker's facing.
    Enabled,
}

/// Per-actor controller tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    // === Pools ===
    /// Maximum health
    pub max_hp: f32,
    /// Maximum stamina
    pub max_stamina: f32,
    /// Maximum focus
    pub max_focus: f32,
    /// Maximum guard gauge
    pub guard_max: f32,

    // === Regeneration ===
    /// Stamina regained per second
    pub stamina_regen: f32,
    /// Focus regained per second
    pub focus_regen: f32,
    /// Guard regained per second
    pub guard_regen_rate: f32,
    /// Delay before guard regen after taking a hit (seconds)
    pub guard_regen_delay: f32,
    /// Stun applied when the guard breaks (seconds)
    pub guard_break_stun: f32,

    // === Defense ===
    /// Block window (seconds)
    pub block_duration: f32,
    /// Dodge duration (seconds)
    pub dodge_duration: f32,
    /// Invulnerability granted by a dodge (seconds)
    pub iframe_duration: f32,
    /// Stamina cost of a block
    pub block_cost: f32,
    /// Stamina cost of a dodge
    pub dodge_cost: f32,
    /// Tail of the block window that counts as a parry (seconds)
    pub parry_window: f32,
    /// Stun dealt to a parried attacker (seconds)
    pub parry_counter_stun: f32,
    /// Pushback application
    pub pushback: PushbackPolicy,

    // === Movement ===
    /// Locomotion speed (units per second)
    pub move_speed: f32,
    /// Turn rate (radians per second)
    pub rotation_speed: f32,
    /// Body radius used by hit checks
    pub body_radius: f32,
    /// Scale applied to root-motion speeds
    pub root_motion_scale: f32,

    // === Combos ===
    /// Input buffer window (seconds)
    pub combo_window: f32,
    /// Debounce between repeated pattern triggers (seconds)
    pub combo_latch: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_hp: 100.0,
            max_stamina: 100.0,
            max_focus: 50.0,
            guard_max: 120.0,

            stamina_regen: 12.0,
            focus_regen: 5.0,
            guard_regen_rate: 32.0,
            guard_regen_delay: 1.2,
            guard_break_stun: 1.15,

            block_duration: 0.6,
            dodge_duration: 0.25,
            iframe_duration: 0.18,
            block_cost: 5.0,
            dodge_cost: 12.0,
            parry_window: 0.15,
            parry_counter_stun: 0.55,
            pushback: PushbackPolicy::Disabled,

            move_speed: 4.5,
            rotation_speed: 8.0,
            body_radius: 0.6,
            root_motion_scale: 1.0,

            combo_window: 1.5,
            combo_latch: 0.2,
        }
    }
}

impl ControllerConfig {
    /// Clamps values into sane ranges.
    pub fn validate(&mut self) {
        self.max_hp = self.max_hp.max(1.0);
        self.max_stamina = self.max_stamina.max(1.0);
        self.max_focus = self.max_focus.max(1.0);
        self.guard_max = self.guard_max.max(1.0);

        self.stamina_regen = self.stamina_regen.max(0.0);
        self.focus_regen = self.focus_regen.max(0.0);
        self.guard_regen_rate = self.guard_regen_rate.max(0.0);
        self.guard_regen_delay = self.guard_regen_delay.max(0.0);
        self.guard_break_stun = self.guard_break_stun.max(0.0);

        self.block_duration = self.block_duration.clamp(0.05, 5.0);
        self.dodge_duration = self.dodge_duration.clamp(0.05, 2.0);
        self.iframe_duration = self.iframe_duration.clamp(0.0, 2.0);
        self.block_cost = self.block_cost.max(0.0);
        self.dodge_cost = self.dodge_cost.max(0.0);
        self.parry_window = self.parry_window.clamp(0.0, self.block_duration);
        self.parry_counter_stun = self.parry_counter_stun.max(0.0);

        self.move_speed = self.move_speed.clamp(0.0, 50.0);
        self.rotation_speed = self.rotation_speed.clamp(0.1, 100.0);
        self.body_radius = self.body_radius.clamp(0.0, 5.0);
        self.root_motion_scale = self.root_motion_scale.clamp(0.01, 100.0);

        self.combo_window = self.combo_window.clamp(0.1, 10.0);
        self.combo_latch = self.combo_latch.clamp(0.0, 2.0);
    }
}

/// AI decision tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Time between decisions (seconds)
    pub decision_interval: f32,
    /// Random extra delay added to each interval (seconds)
    pub decision_jitter: f32,
    /// Upper bound of the "near" distance bucket
    pub close_distance: f32,
    /// Upper bound of the "mid" distance bucket
    pub engage_distance: f32,
    /// Stamina below which the AI plays defensively
    pub low_stamina: f32,
    /// Focus above which specials become attractive
    pub high_focus: f32,
    /// Number of actions per learned sequence
    pub sequence_length: usize,
    /// RNG seed (None = random)
    pub seed: Option<u64>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            decision_interval: 0.18,
            decision_jitter: 0.05,
            close_distance: 3.0,
            engage_distance: 16.0,
            low_stamina: 15.0,
            high_focus: 25.0,
            sequence_length: 4,
            seed: None,
        }
    }
}

impl AiConfig {
    /// Clamps values into sane ranges.
    pub fn validate(&mut self) {
        self.decision_interval = self.decision_interval.clamp(0.01, 5.0);
        self.decision_jitter = self.decision_jitter.clamp(0.0, 1.0);
        self.close_distance = self.close_distance.clamp(0.5, 50.0);
        self.engage_distance = self.engage_distance.clamp(self.close_distance, 200.0);
        self.low_stamina = self.low_stamina.max(0.0);
        self.high_focus = self.high_focus.max(0.0);
        self.sequence_length = self.sequence_length.clamp(1, 16);
    }
}

/// Fixed-step loop tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed timestep (seconds)
    pub fixed_dt: f32,
    /// Maximum fixed steps per advance
    pub max_steps_per_frame: u32,
    /// Planar arena radius actors are kept inside (0 disables)
    pub arena_bounds: f32,
    /// Round time limit (seconds, 0 disables)
    pub round_time_limit: f32,
    /// Event bus capacity
    pub event_capacity: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            max_steps_per_frame: 10,
            arena_bounds: 39.0,
            round_time_limit: 99.0,
            event_capacity: 4096,
        }
    }
}

impl SimulationConfig {
    /// Clamps values into sane ranges.
    pub fn validate(&mut self) {
        self.fixed_dt = self.fixed_dt.clamp(0.001, 0.1);
        self.max_steps_per_frame = self.max_steps_per_frame.clamp(1, 120);
        self.arena_bounds = self.arena_bounds.max(0.0);
        self.round_time_limit = self.round_time_limit.max(0.0);
        self.event_capacity = self.event_capacity.clamp(16, 1 << 20);
    }
}

/// Complete combat configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    /// Controller tunables
    pub controller: ControllerConfig,
    /// AI tunables
    pub ai: AiConfig,
    /// Loop tunables
    pub simulation: SimulationConfig,
    /// Moves added to or replacing the stock set
    pub moves: Vec<MoveDefinition>,
    /// Specials added to or replacing the stock set
    pub specials: Vec<SpecialDefinition>,
}

impl CombatConfig {
    /// Load configuration from a specific path.
    ///
    /// Falls back to defaults when the file is missing or invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        match Self::try_load_from(path) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to load config file: {e}");
                Self::default()
            },
        }
    }

    /// Load and validate configuration, reporting failures.
    pub fn try_load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        config.validate();
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate and clamp configuration values.
    pub fn validate(&mut self) {
        self.controller.validate();
        self.ai.validate();
        self.simulation.validate();
    }

    /// Builds the move registry: stock moves plus configured overrides.
    #[must_use]
    pub fn build_registry(&self) -> MoveRegistry {
        let mut registry = MoveRegistry::with_defaults();
        for def in &self.moves {
            registry.register_move(def.clone());
        }
        for def in &self.specials {
            registry.register_special(def.clone());
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moves::{FocusCost, InputAction};
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = CombatConfig::default();
        assert!((config.controller.max_focus - 50.0).abs() < f32::EPSILON);
        assert!((config.simulation.fixed_dt - 1.0 / 60.0).abs() < 1e-9);
        assert_eq!(config.controller.pushback, PushbackPolicy::Disabled);
        assert_eq!(config.ai.sequence_length, 4);
    }

    #[test]
    fn test_config_validation() {
        let mut config = CombatConfig::default();
        config.controller.block_duration = 100.0;
        config.controller.max_hp = -5.0;
        config.simulation.fixed_dt = 0.0;
        config.ai.engage_distance = 1.0;

        config.validate();

        assert!((config.controller.block_duration - 5.0).abs() < f32::EPSILON);
        assert!((config.controller.max_hp - 1.0).abs() < f32::EPSILON);
        assert!((config.simulation.fixed_dt - 0.001).abs() < f32::EPSILON);
        assert!((config.ai.engage_distance - config.ai.close_distance).abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("temp dir");
        let config_path = temp_dir.path().join("nested").join(CONFIG_FILE);

        let mut config = CombatConfig::default();
        config.controller.pushback = PushbackPolicy::Enabled;
        config.ai.seed = Some(7);
        config.specials.push(
            SpecialDefinition::new("SWEEP", MoveDefinition::heavy())
                .with_pattern(vec![InputAction::Dodge, InputAction::Heavy])
                .with_focus_cost(FocusCost::Flat(10.0)),
        );

        config.save_to(&config_path).expect("save config");
        let loaded = CombatConfig::load_from(&config_path);

        assert_eq!(loaded.controller.pushback, PushbackPolicy::Enabled);
        assert_eq!(loaded.ai.seed, Some(7));
        assert_eq!(loaded.specials.len(), 1);
        assert_eq!(loaded.specials[0].pattern.len(), 2);
    }

    #[test]
    fn test_missing_or_invalid_file_uses_defaults() {
        let temp_dir = TempDir::new().expect("temp dir");
        let missing = CombatConfig::load_from(temp_dir.path().join("missing.toml"));
        assert_eq!(missing, CombatConfig::default());

        let bad_path = temp_dir.path().join("bad.toml");
        fs::write(&bad_path, "controller = [not toml").expect("write");
        assert_eq!(CombatConfig::load_from(&bad_path), CombatConfig::default());
        assert!(CombatConfig::try_load_from(&bad_path).is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "[controller]\nblock_duration = 0.8\n").expect("write");

        let config = CombatConfig::load_from(&path);
        assert!((config.controller.block_duration - 0.8).abs() < f32::EPSILON);
        assert!((config.controller.dodge_duration - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn test_build_registry_overrides() {
        let mut config = CombatConfig::default();
        config
            .moves
            .push(MoveDefinition::light().with_damage(20.0, 24.0));
        let registry = config.build_registry();
        let light = registry.attack(crate::moves::AttackKind::Light);
        assert!(light.is_some_and(|m| (m.damage - 20.0).abs() < f32::EPSILON));
    }
}
