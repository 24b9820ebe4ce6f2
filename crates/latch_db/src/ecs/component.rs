// component.rs - Component identity and the type registry
//
// Component ids are small integers minted on first use, one per distinct
// Rust type. Ids start at 1 and are never reused within a registry.

use crate::ecs::RegistryError;
use crate::pool::{new_arena, ErasedArena};
use once_cell::sync::Lazy;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};
use std::sync::{Arc, PoisonError, RwLock};

pub type ComponentId = u32;

/// Anything `'static` can be stored as a component; no registration step is needed.
pub trait Component: Any {}

impl<T: Any> Component for T {}

/// Presence-only marker for `T`.
///
/// Attached with [`Database::create_tag`](crate::ecs::Database::create_tag) and
/// requested in a query as `Tag<T>`. A tag is a component type of its own,
/// distinct from `T`.
pub struct Tag<T>(PhantomData<fn() -> T>);

/// Query parameter that matches entities lacking `T`.
pub struct Not<T>(PhantomData<fn() -> T>);

macro_rules! marker_impls {
    ($($marker:ident),+) => {$(
        impl<T> $marker<T> {
            pub const fn new() -> Self {
                Self(PhantomData)
            }
        }

        impl<T> Clone for $marker<T> {
            fn clone(&self) -> Self {
                *self
            }
        }

        impl<T> Copy for $marker<T> {}

        impl<T> Default for $marker<T> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<T> PartialEq for $marker<T> {
            fn eq(&self, _other: &Self) -> bool {
                true
            }
        }

        impl<T> Eq for $marker<T> {}

        impl<T> fmt::Debug for $marker<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}<{}>", stringify!($marker), type_name::<T>())
            }
        }
    )+};
}

marker_impls!(Tag, Not);

/// Metadata recorded the first time a type is seen by a registry.
#[derive(Clone, Debug)]
pub struct ComponentMeta {
    pub id: ComponentId,
    pub name: &'static str,
    pub type_id: TypeId,
    pub size: usize,
    pub align: usize,
    pub(crate) new_arena: fn(usize) -> Box<dyn ErasedArena>,
}

impl ComponentMeta {
    fn of<T: Component>(id: ComponentId) -> Self {
        Self {
            id,
            name: type_name::<T>(),
            type_id: TypeId::of::<T>(),
            size: size_of::<T>(),
            align: align_of::<T>(),
            new_arena: new_arena::<T>,
        }
    }
}

#[derive(Default)]
struct RegistryState {
    by_type: HashMap<TypeId, ComponentId>,
    metas: Vec<ComponentMeta>,
}

/// Maps Rust types to component ids.
///
/// Databases share the process-wide [`TypeRegistry::global`] unless given a
/// scoped registry, so ids agree across databases by default.
pub struct TypeRegistry {
    state: RwLock<RegistryState>,
    limit: ComponentId,
}

static GLOBAL: Lazy<Arc<TypeRegistry>> = Lazy::new(|| Arc::new(TypeRegistry::new()));

impl TypeRegistry {
    pub fn new() -> Self {
        Self::with_limit(ComponentId::MAX)
    }

    /// Registry that refuses to mint more than `limit` ids.
    pub fn with_limit(limit: ComponentId) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            limit,
        }
    }

    pub fn global() -> Arc<TypeRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Id for `T`, minting one on first use.
    ///
    /// # Panics
    /// When the id space is exhausted. This is not recoverable.
    pub fn id_of<T: Component>(&self) -> ComponentId {
        match self.try_id_of::<T>() {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(component = type_name::<T>(), %err, "cannot register component");
                panic!("{err}");
            }
        }
    }

    pub fn try_id_of<T: Component>(&self) -> Result<ComponentId, RegistryError> {
        if let Some(id) = self.lookup::<T>() {
            return Ok(id);
        }
        self.mint(TypeId::of::<T>(), ComponentMeta::of::<T>)
    }

    /// Id for `T` if it has been registered. Never mints.
    pub fn lookup<T: Component>(&self) -> Option<ComponentId> {
        self.lookup_type(TypeId::of::<T>())
    }

    pub fn lookup_type(&self, type_id: TypeId) -> Option<ComponentId> {
        self.read().by_type.get(&type_id).copied()
    }

    pub fn meta(&self, id: ComponentId) -> Option<ComponentMeta> {
        let index = id.checked_sub(1)? as usize;
        self.read().metas.get(index).cloned()
    }

    /// Id in this registry for a type described by metadata from any registry.
    pub fn adopt(&self, meta: &ComponentMeta) -> Result<ComponentId, RegistryError> {
        if let Some(id) = self.lookup_type(meta.type_id) {
            return Ok(id);
        }
        self.mint(meta.type_id, |id| ComponentMeta {
            id,
            ..meta.clone()
        })
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.read().metas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn mint(
        &self,
        type_id: TypeId,
        build: impl FnOnce(ComponentId) -> ComponentMeta,
    ) -> Result<ComponentId, RegistryError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have registered the type between the read and the write.
        if let Some(&id) = state.by_type.get(&type_id) {
            return Ok(id);
        }
        if state.metas.len() >= self.limit as usize {
            return Err(RegistryError::IdSpaceExhausted { limit: self.limit });
        }
        let id = state.metas.len() as ComponentId + 1;
        let meta = build(id);
        tracing::debug!(id, component = meta.name, "registered component type");
        state.by_type.insert(type_id, id);
        state.metas.push(meta);
        Ok(id)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("len", &self.len())
            .field("limit", &self.limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Position;
    struct Velocity;

    #[test]
    fn ids_are_stable_and_distinct() {
        let registry = TypeRegistry::new();
        let p = registry.id_of::<Position>();
        let v = registry.id_of::<Velocity>();

        assert_eq!(p, 1);
        assert_eq!(v, 2);
        assert_eq!(registry.id_of::<Position>(), p);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn tag_is_distinct_from_its_type() {
        let registry = TypeRegistry::new();
        assert_ne!(
            registry.id_of::<Velocity>(),
            registry.id_of::<Tag<Velocity>>()
        );
    }

    #[test]
    fn lookup_does_not_mint() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.lookup::<Position>(), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn meta_describes_layout() {
        let registry = TypeRegistry::new();
        let id = registry.id_of::<u64>();
        let meta = registry.meta(id).unwrap();
        assert_eq!(meta.id, id);
        assert_eq!(meta.size, 8);
        assert_eq!(meta.type_id, TypeId::of::<u64>());
        assert!(registry.meta(0).is_none());
        assert!(registry.meta(id + 1).is_none());
    }

    #[test]
    fn exhaustion_is_reported() {
        let registry = TypeRegistry::with_limit(1);
        assert_eq!(registry.try_id_of::<Position>(), Ok(1));
        assert_eq!(
            registry.try_id_of::<Velocity>(),
            Err(RegistryError::IdSpaceExhausted { limit: 1 })
        );
        // Known types still resolve.
        assert_eq!(registry.try_id_of::<Position>(), Ok(1));
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn id_of_panics_when_exhausted() {
        let registry = TypeRegistry::with_limit(0);
        registry.id_of::<Position>();
    }

    #[test]
    fn adopt_rekeys_by_rust_type() {
        let source = TypeRegistry::new();
        source.id_of::<Position>();
        let v = source.id_of::<Velocity>();
        let meta = source.meta(v).unwrap();

        let target = TypeRegistry::new();
        let adopted = target.adopt(&meta).unwrap();
        assert_eq!(adopted, 1);
        assert_eq!(target.lookup::<Velocity>(), Some(adopted));
        assert_eq!(target.meta(adopted).unwrap().name, meta.name);
        assert_eq!(target.adopt(&meta).unwrap(), adopted);
    }

    #[test]
    fn global_registry_is_shared() {
        let a = TypeRegistry::global();
        let b = TypeRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.id_of::<Position>(), b.id_of::<Position>());
    }

    #[test]
    fn markers_are_zero_sized() {
        assert_eq!(size_of::<Tag<String>>(), 0);
        assert_eq!(size_of::<Not<String>>(), 0);
        assert_eq!(Tag::<u8>::new(), Tag::default());
    }
}
