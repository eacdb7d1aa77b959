//! # Arena Combat
//!
//! Real-time combat core for 1v1 melee duels.
//!
//! This crate provides:
//! - Move and special definitions with a shared registry
//! - Per-actor combat controllers (pools, state machine, blocking, parry, dodge)
//! - Hit detection and defender-side hit resolution
//! - Combo recognition and attacker combo chains
//! - Utility-scoring AI with a persistent knowledge base
//! - Physics and root-motion collaborator interfaces
//! - Typed combat events with isolated subscribers
//! - A fixed-timestep simulation loop

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod ai;
pub mod combo;
pub mod config;
pub mod controller;
pub mod damage;
pub mod error;
pub mod events;
pub mod hit;
pub mod knowledge;
pub mod moves;
pub mod physics;
pub mod simulation;
pub mod state;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::ai::*;
    pub use crate::combo::*;
    pub use crate::config::*;
    pub use crate::controller::*;
    pub use crate::damage::*;
    pub use crate::error::*;
    pub use crate::events::*;
    pub use crate::hit::*;
    pub use crate::knowledge::*;
    pub use crate::moves::*;
    pub use crate::physics::*;
    pub use crate::simulation::*;
    pub use crate::state::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use crate::combo::ComboCounter;
    use crate::config::ControllerConfig;
    use crate::controller::{ActorCombatController, ActorHandle, NoActors, SpecialOptions};
    use crate::damage::HitPayload;
    use crate::hit::NoTargets;
    use crate::moves::{AttackKind, MoveRegistry};
    use crate::physics::KinematicWorld;
    use crate::state::{ControllerState, ResetOverrides, ResourcePool};
    use arena_common::{ActorId, SpecialId};
    use glam::{Quat, Vec3};
    use proptest::prelude::*;
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    enum Op {
        Attack(AttackKind),
        Block,
        Dodge,
        Special(&'static str, bool),
        Hit(AttackKind, f32),
        Stun(f32),
        Tick(f32),
        Reset,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let kind = prop_oneof![Just(AttackKind::Light), Just(AttackKind::Heavy)];
        prop_oneof![
            kind.clone().prop_map(Op::Attack),
            Just(Op::Block),
            Just(Op::Dodge),
            (prop_oneof![Just("FIRE_BLADE"), Just("POWER_PUSH")], any::<bool>())
                .prop_map(|(id, force)| Op::Special(id, force)),
            (kind, 1.0f32..1.5).prop_map(|(kind, scale)| Op::Hit(kind, scale)),
            (0.0f32..2.0).prop_map(Op::Stun),
            (0.0f32..0.5).prop_map(Op::Tick),
            Just(Op::Reset),
        ]
    }

    fn assert_in_pool(pool: ResourcePool) -> Result<(), TestCaseError> {
        prop_assert!(pool.value() >= 0.0, "pool below zero: {:?}", pool);
        prop_assert!(pool.value() <= pool.max(), "pool above max: {:?}", pool);
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_pools_and_attack_state_stay_consistent(
            ops in proptest::collection::vec(op_strategy(), 1..80)
        ) {
            let id = ActorId::from_raw(1);
            let attacker = ActorId::from_raw(2);
            let registry = Arc::new(MoveRegistry::with_defaults());
            let mut world = KinematicWorld::new();
            world.add_actor(id, Vec3::ZERO, Quat::IDENTITY);
            let mut controller =
                ActorCombatController::new(id, Arc::clone(&registry), ControllerConfig::default());

            for op in ops {
                match op {
                    Op::Attack(kind) => {
                        let _ = controller.request_attack(kind);
                    },
                    Op::Block => {
                        let _ = controller.request_block();
                    },
                    Op::Dodge => {
                        let _ = controller.request_dodge();
                    },
                    Op::Special(name, force) => {
                        let options = if force {
                            SpecialOptions::forced()
                        } else {
                            SpecialOptions::default()
                        };
                        let _ = controller.request_special(SpecialId::new(name), options);
                    },
                    Op::Hit(kind, scale) => {
                        if let Some(def) = registry.attack(kind) {
                            let payload = HitPayload::from_move(def, attacker, id, std::f32::consts::PI)
                                .with_combo_scale(scale);
                            let _ = controller.receive_hit(payload, &mut NoActors);
                        }
                    },
                    Op::Stun(duration) => controller.apply_stun(duration),
                    Op::Tick(dt) => {
                        prop_assert!(controller.update(dt, &mut world, &NoTargets).is_ok());
                    },
                    Op::Reset => controller.reset_combat_state(ResetOverrides::full()),
                }

                assert_in_pool(controller.hp())?;
                assert_in_pool(controller.stamina())?;
                assert_in_pool(controller.focus())?;
                assert_in_pool(controller.guard())?;

                let attack = controller.attack_snapshot();
                prop_assert_eq!(attack.active, attack.phase.is_some());
                prop_assert_eq!(attack.active, controller.attack().is_some());
                if controller.is_dead() {
                    prop_assert_eq!(controller.state(), ControllerState::Dead);
                }
            }
        }

        #[test]
        fn prop_combo_scale_is_bounded(hits in 0usize..60, gap in 0.0f64..2.0) {
            let mut counter = ComboCounter::new();
            let mut now = 0.0;
            for _ in 0..hits {
                now += gap;
                let scale = counter.scale(now);
                prop_assert!((1.0..=1.45 + 1e-6).contains(&scale));
                counter.register_hit(now);
            }
        }
    }
}
