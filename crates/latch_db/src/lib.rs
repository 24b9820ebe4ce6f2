//! Latch DB
//!
//! Generic entity–component storage:
//! - Type registry minting component ids on first use
//! - Paged per-type arenas for component payloads
//! - Entities, component handles and typed views
//! - Typed visits and queries over every entity

pub mod config;
pub mod ecs;
pub mod pool;

pub use config::DatabaseConfig;
pub use ecs::{
    Component, ComponentData, ComponentHandle, ComponentInfo, ComponentView, Database, DbError,
    Entity, EntityRecord, Not, Tag, TypeRegistry,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
