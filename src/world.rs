//! Read-only view of the live simulation that a save captures from.
//!
//! The host engine implements these traits over its own object model.
//! Capture workers call them from several threads at once, hence the `Sync`
//! bounds; nothing here is ever mutated by a save.

use crate::class::ClassRegistry;
use crate::error::Result;
use crate::record::{PhysicsState, Transform};

pub trait SimWorld: Sync {
    fn map_name(&self) -> &str;

    /// Simulation clock in seconds since the world started.
    fn time_seconds(&self) -> f64;

    /// Only the authoritative instance (server or standalone) may save.
    fn has_authority(&self) -> bool;

    fn classes(&self) -> &ClassRegistry;

    fn main_level(&self) -> &dyn SimLevel;

    /// Every streaming level known to the world, loaded or not.
    fn streaming_levels(&self) -> Vec<StreamingLevel<'_>>;
}

pub struct StreamingLevel<'a> {
    pub package: String,
    /// `None` while the level is streamed out.
    pub loaded: Option<&'a dyn SimLevel>,
}

pub trait SimLevel: Sync {
    fn entity_count(&self) -> usize;

    /// `None` for an emptied slot in the level's entity list.
    fn entity(&self, index: usize) -> Option<&dyn SimEntity>;
}

pub trait SimEntity: Sync {
    fn name(&self) -> &str;
    fn class(&self) -> &str;

    /// False once the entity is pending destruction.
    fn is_valid(&self) -> bool {
        true
    }

    fn tags(&self) -> &[String];

    fn has_movable_root(&self) -> bool;
    fn transform(&self) -> Transform;
    fn physics(&self) -> PhysicsState;

    fn spawned_at_runtime(&self) -> bool;

    fn components(&self) -> Vec<&dyn SimComponent>;

    /// Game-specific state, already encoded by the game.
    fn save_properties(&self) -> Result<Vec<u8>>;
}

pub trait SimComponent: Sync {
    fn name(&self) -> &str;
    fn class(&self) -> &str;

    fn is_valid(&self) -> bool {
        true
    }

    fn tags(&self) -> &[String];

    /// `Some` for components placed in space.
    fn transform(&self) -> Option<Transform>;

    fn children(&self) -> Vec<&dyn SimComponent> {
        Vec::new()
    }

    fn save_properties(&self) -> Result<Vec<u8>>;
}
