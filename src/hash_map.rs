//! Re-exports deterministically seeded hash maps/sets, so that
//! iteration order is reproducible between runs.

pub use bevy_utils::HashMap;
pub use bevy_utils::HashSet;
