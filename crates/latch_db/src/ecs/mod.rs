//! Entity–component database.
//!
//! Entities are handles to records holding at most one component per type.
//! Any `'static` type can be a component; ids are minted by a
//! [`TypeRegistry`] on first use. Components are read through handles and
//! typed views, or matched in bulk with [`Database::visit`] and
//! [`Database::query`].

mod component;
mod database;
mod entity;
mod error;
mod handle;
mod query;
mod record;

pub use component::{Component, ComponentId, ComponentMeta, Not, Tag, TypeRegistry};
pub use database::Database;
pub use entity::Entity;
pub use error::{DbError, RegistryError};
pub use handle::{ComponentHandle, ComponentInfo, ComponentView, ViewSet};
#[doc(hidden)]
pub use query::{Access, Arenas, Row};
pub use query::{QueryOwned, QueryParam};
pub use record::{ComponentData, EntityRecord};
