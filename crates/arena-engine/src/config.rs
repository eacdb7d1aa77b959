//! Duel runner configuration.
//!
//! One TOML file holds the runner settings, the fighter roster and the full
//! combat configuration. Missing or invalid files fall back to defaults.

use arena_combat::{CombatConfig, Personality};
use arena_common::{ArenaError, ArenaResult, SpecialId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuration file name.
const CONFIG_FILE: &str = "arena.toml";

/// Environment variable overriding the config path.
const CONFIG_ENV: &str = "ARENA_CONFIG";

/// One AI-controlled fighter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FighterProfile {
    /// Display name, also the knowledge-base file stem
    pub name: String,
    /// Offense-to-defense ratio
    pub aggression: f32,
    /// Block-to-dodge ratio
    pub block_vs_evade: f32,
    /// Preferred engagement distance (None = AI default)
    pub engagement_distance: Option<f32>,
    /// Specials the AI may pick
    pub specials: Vec<String>,
}

impl Default for FighterProfile {
    fn default() -> Self {
        Self {
            name: "fighter".to_string(),
            aggression: 0.6,
            block_vs_evade: 0.5,
            engagement_distance: None,
            specials: vec!["FIRE_BLADE".to_string(), "POWER_PUSH".to_string()],
        }
    }
}

impl FighterProfile {
    /// Creates a profile with default tendencies.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set aggression.
    #[must_use]
    pub fn with_aggression(mut self, aggression: f32) -> Self {
        self.aggression = aggression;
        self
    }

    /// Builds the AI personality for this profile.
    #[must_use]
    pub fn personality(&self) -> Personality {
        let mut personality = Personality::default()
            .with_aggression(self.aggression)
            .with_block_vs_evade(self.block_vs_evade)
            .with_specials(self.specials.iter().map(|s| SpecialId::new(s.as_str())).collect());
        if let Some(distance) = self.engagement_distance {
            personality = personality.with_engagement_distance(distance);
        }
        personality
    }
}

/// Duel runner configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Duel Settings ===
    /// Rounds to fight
    pub rounds: u32,
    /// Simulated render rate driving the fixed-step loop
    pub frame_rate: u32,
    /// Starting distance between fighters
    pub spawn_distance: f32,
    /// Hard cap on simulated seconds per round
    pub max_round_seconds: f32,

    // === Persistence ===
    /// Directory holding one knowledge base per fighter (None = no persistence)
    pub knowledge_dir: Option<PathBuf>,

    // === Diagnostics ===
    /// Log every combat event at debug level
    pub log_events: bool,

    /// Fighter roster (exactly two are used)
    pub fighters: Vec<FighterProfile>,

    /// Combat tunables
    pub combat: CombatConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rounds: 3,
            frame_rate: 144,
            spawn_distance: 8.0,
            max_round_seconds: 120.0,
            knowledge_dir: Some(PathBuf::from("knowledge")),
            log_events: false,
            fighters: vec![
                FighterProfile::named("red").with_aggression(0.75),
                FighterProfile::named("blue").with_aggression(0.45),
            ],
            combat: CombatConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from `ARENA_CONFIG` or `./arena.toml`.
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
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
    pub fn try_load_from<P: AsRef<Path>>(path: P) -> ArenaResult<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Self =
            toml::from_str(&contents).map_err(|e| ArenaError::Config(e.to_string()))?;
        config.validate();
        Ok(config)
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> ArenaResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents =
            toml::to_string_pretty(self).map_err(|e| ArenaError::Serialization(e.to_string()))?;
        fs::write(path, contents)?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Config path: `ARENA_CONFIG` if set, else `./arena.toml`.
    pub fn config_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV).map_or_else(|| PathBuf::from(CONFIG_FILE), PathBuf::from)
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.rounds = self.rounds.clamp(1, 1000);
        self.frame_rate = self.frame_rate.clamp(10, 1000);
        self.spawn_distance = self.spawn_distance.clamp(1.0, 30.0);
        self.max_round_seconds = self.max_round_seconds.clamp(1.0, 3600.0);

        while self.fighters.len() < 2 {
            let name = format!("fighter-{}", self.fighters.len() + 1);
            self.fighters.push(FighterProfile::named(name));
        }
        for fighter in &mut self.fighters {
            fighter.aggression = fighter.aggression.clamp(0.0, 10.0);
            fighter.block_vs_evade = fighter.block_vs_evade.clamp(0.0, 10.0);
        }

        self.combat.validate();
    }

    /// Frame time fed to the loop each simulated frame.
    #[must_use]
    pub fn frame_dt(&self) -> f32 {
        1.0 / self.frame_rate.max(1) as f32
    }

    /// Knowledge-base path for a fighter.
    #[must_use]
    pub fn knowledge_path(&self, fighter: &FighterProfile) -> Option<PathBuf> {
        self.knowledge_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", fighter.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.rounds, 3);
        assert_eq!(config.fighters.len(), 2);
        assert!((config.frame_dt() - 1.0 / 144.0).abs() < 1e-9);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig {
            rounds: 0,
            frame_rate: 1,
            fighters: vec![FighterProfile::named("solo").with_aggression(-4.0)],
            ..EngineConfig::default()
        };
        config.validate();

        assert_eq!(config.rounds, 1);
        assert_eq!(config.frame_rate, 10);
        assert_eq!(config.fighters.len(), 2);
        assert!(config.fighters[0].aggression.abs() < f32::EPSILON);
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap_or_else(|e| panic!("temp dir: {e}"));
        let path = temp_dir.path().join(CONFIG_FILE);

        let mut config = EngineConfig {
            rounds: 7,
            log_events: true,
            ..EngineConfig::default()
        };
        config.combat.ai.seed = Some(11);
        assert!(config.save_to(&path).is_ok());

        let loaded = EngineConfig::load_from(&path);
        assert_eq!(loaded.rounds, 7);
        assert!(loaded.log_events);
        assert_eq!(loaded.combat.ai.seed, Some(11));
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = EngineConfig::load_from("/nonexistent/path/arena.toml");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_invalid_config_reports_error() {
        let temp_dir = TempDir::new().unwrap_or_else(|e| panic!("temp dir: {e}"));
        let path = temp_dir.path().join(CONFIG_FILE);
        assert!(fs::write(&path, "rounds = \"many\"").is_ok());

        assert!(matches!(
            EngineConfig::try_load_from(&path),
            Err(ArenaError::Config(_))
        ));
        assert_eq!(EngineConfig::load_from(&path).rounds, 3);
    }

    #[test]
    fn test_profile_personality() {
        let mut profile = FighterProfile::named("red");
        profile.engagement_distance = Some(5.0);
        let personality = profile.personality();
        assert_eq!(personality.learned_specials.len(), 2);
        assert_eq!(personality.mean_engagement_distance, Some(5.0));
    }
}
