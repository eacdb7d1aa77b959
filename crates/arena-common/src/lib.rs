//! # Arena Common
//!
//! Common types, utilities, and shared abstractions for Project Arena.
//!
//! This crate provides foundational types used across all Arena subsystems:
//! - ID types (ActorId, MoveId, SpecialId, BuffId)
//! - World-space helpers for yaw and planar distance
//! - Version information for persisted schemas
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod coords;
pub mod error;
pub mod ids;
pub mod version;

pub use glam;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::coords::*;
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::version::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_actor_id_generation() {
        let id1 = ActorId::new();
        let id2 = ActorId::new();
        assert_ne!(id1, id2);
        assert!(id1.is_valid());
        assert!(!ActorId::NULL.is_valid());
    }

    #[test]
    fn test_string_ids() {
        let light = MoveId::from("LIGHT");
        assert_eq!(light.as_str(), "LIGHT");
        assert_eq!(light.to_string(), "LIGHT");
        assert_eq!(SpecialId::new("FIRE_BLADE"), SpecialId::from("FIRE_BLADE"));
    }

    #[test]
    fn test_version_compatibility() {
        let v1 = SchemaVersion::new(2, 0, 0);
        let v2 = SchemaVersion::new(2, 1, 0);
        let v3 = SchemaVersion::new(3, 0, 0);

        assert!(v2.is_compatible_with(&v1));
        assert!(!v1.is_compatible_with(&v3));
        assert!(SchemaVersion::KNOWLEDGE_BASE.can_read(&v1));
    }

    proptest! {
        #[test]
        fn prop_wrap_angle_in_range(angle in -100.0f32..100.0) {
            let wrapped = wrap_angle(angle);
            prop_assert!(wrapped >= -std::f32::consts::PI - 1e-4);
            prop_assert!(wrapped < std::f32::consts::PI + 1e-4);
        }
    }
}
