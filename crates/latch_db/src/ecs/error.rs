use crate::ecs::{ComponentHandle, ComponentId, Entity};
use crate::pool::ArenaError;
use thiserror::Error;

/// Failures raised while minting component ids.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("component id space exhausted after {limit} types")]
    IdSpaceExhausted { limit: ComponentId },
}

/// Errors returned by [`Database`](crate::ecs::Database) operations.
///
/// Every variant except `Arena`, `Registry`, `InvalidConfig` and `Config`
/// describes misuse of a handle or view.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("entity {0} is not alive in this database")]
    StaleEntity(Entity),

    #[error("component handle {0} no longer points at a live component")]
    StaleComponent(ComponentHandle),

    #[error("view does not refer to a component")]
    EmptyView,

    #[error("requested `{requested}` but the component is `{found}`")]
    TypeMismatch {
        requested: &'static str,
        found: &'static str,
    },

    #[error("tag component `{name}` has no payload")]
    NoPayload { name: &'static str },

    #[error("component id {id} is not known to this database")]
    UnknownComponent { id: ComponentId },

    #[error("invalid database config: {reason}")]
    InvalidConfig { reason: String },

    #[error("failed to parse database config: {0}")]
    Config(#[from] serde_json::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Arena(#[from] ArenaError),
}
