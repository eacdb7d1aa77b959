//! Duel lifecycle.
//!
//! Spawns two AI fighters, runs rounds on the fixed-step loop, logs the
//! results and persists what each fighter learned.

use anyhow::{Context, Result};
use arena_combat::{
    CombatEvent, CombatEventKind, HandlerError, KnowledgeBase, RoundOutcome, RoundSummary,
    SimulationLoop,
};
use arena_common::ActorId;
use glam::Vec3;
use serde::Serialize;
use std::f32::consts::PI;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, FighterProfile};

/// Results of a full duel.
#[derive(Debug, Clone, Serialize)]
pub struct DuelReport {
    /// Fighter names, indexed like the round summaries' fighters
    pub names: Vec<String>,
    /// Round-by-round results
    pub rounds: Vec<RoundSummary>,
    /// Rounds won per fighter
    pub wins: Vec<u32>,
    /// Rounds without a winner
    pub draws: u32,
}

/// Runs the duel described by the default config file.
///
/// `arena --init` writes the default config instead.
pub fn run() -> Result<()> {
    if std::env::args().nth(1).as_deref() == Some("--init") {
        let path = EngineConfig::config_path();
        EngineConfig::default()
            .save_to(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        return Ok(());
    }

    let config = EngineConfig::load();
    let report = run_duel(&config)?;

    for (name, wins) in report.names.iter().zip(&report.wins) {
        info!("{name}: {wins} round(s) won");
    }
    info!("Draws: {}", report.draws);
    debug!("Duel report: {}", serde_json::to_string(&report)?);
    Ok(())
}

/// Fights every configured round and saves the fighters' knowledge.
pub fn run_duel(config: &EngineConfig) -> Result<DuelReport> {
    let mut sim = SimulationLoop::kinematic(&config.combat);
    let fighters: Vec<(ActorId, &FighterProfile)> = config
        .fighters
        .iter()
        .take(2)
        .enumerate()
        .map(|(i, profile)| (ActorId::from_raw(i as u32 + 1), profile))
        .collect();

    let half = config.spawn_distance * 0.5;
    for (slot, (id, profile)) in fighters.iter().enumerate() {
        let (z, yaw) = if slot == 0 { (-half, 0.0) } else { (half, PI) };
        sim.spawn_fighter(*id, Vec3::new(0.0, 0.0, z), yaw)
            .with_context(|| format!("spawning {}", profile.name))?;

        let knowledge = config
            .knowledge_path(profile)
            .map_or_else(KnowledgeBase::new, |path| KnowledgeBase::load_or_default(&path));
        info!(
            "{} enters with {} learned sequence(s)",
            profile.name,
            knowledge.sequence_count()
        );
        sim.attach_ai(*id, profile.personality(), knowledge)?;
    }

    subscribe_logging(&mut sim, config.log_events);

    let frame_dt = config.frame_dt();
    let max_frames = (config.max_round_seconds / frame_dt).ceil() as u64;
    let mut report = DuelReport {
        names: fighters.iter().map(|(_, p)| p.name.clone()).collect(),
        rounds: Vec::new(),
        wins: vec![0; fighters.len()],
        draws: 0,
    };

    for round in 1..=config.rounds {
        if round > 1 {
            sim.reset_round()?;
        }
        info!("Round {round} begins");

        let mut frames = 0;
        while sim.round_outcome().is_none() && frames < max_frames {
            sim.advance(frame_dt)?;
            frames += 1;
        }
        if frames >= max_frames && sim.round_outcome().is_none() {
            warn!("Round {round} hit the {:.0}s cap", config.max_round_seconds);
        }

        let summary = sim.finish_round();
        match summary
            .outcome
            .and_then(RoundOutcome::winner)
            .and_then(|winner| fighters.iter().position(|(id, _)| *id == winner))
        {
            Some(slot) => {
                report.wins[slot] += 1;
                info!("Round {round} goes to {}", fighters[slot].1.name);
            },
            None => {
                report.draws += 1;
                info!("Round {round} is a draw");
            },
        }
        for fighter in &summary.fighters {
            debug!(
                "{}: hp {:.0}, stamina {:.0}, focus {:.0}, {} outcome(s) learned",
                fighter.actor, fighter.hp, fighter.stamina, fighter.focus, fighter.learned
            );
        }
        report.rounds.push(summary);
    }

    for (id, profile) in &fighters {
        let (Some(path), Some(ai)) = (config.knowledge_path(profile), sim.ai(*id)) else {
            continue;
        };
        ai.knowledge()
            .save_to(&path)
            .with_context(|| format!("saving knowledge for {}", profile.name))?;
        info!(
            "Saved {} sequence(s) for {} to {}",
            ai.knowledge().sequence_count(),
            profile.name,
            path.display()
        );
    }

    Ok(report)
}

/// Logs notable combat events; every event too when `verbose`.
fn subscribe_logging(sim: &mut SimulationLoop, verbose: bool) {
    sim.subscribe(CombatEventKind::GuardBreak, |event: &CombatEvent| {
        if let CombatEvent::GuardBreak { actor, attacker } = event {
            info!("{attacker} breaks {actor}'s guard");
        }
        Ok::<(), HandlerError>(())
    });
    sim.subscribe(CombatEventKind::Death, |event: &CombatEvent| {
        info!("{} is down", event.actor());
        Ok::<(), HandlerError>(())
    });
    sim.subscribe(CombatEventKind::SpecialStart, |event: &CombatEvent| {
        if let CombatEvent::SpecialStart { actor, id } = event {
            info!("{actor} unleashes {id}");
        }
        Ok::<(), HandlerError>(())
    });

    if verbose {
        sim.subscribe_all(|event: &CombatEvent| {
            debug!("{:?}", event);
            Ok::<(), HandlerError>(())
        });
    }
}
