//! Component handles and typed views.

use crate::ecs::record::StoredRecord;
use crate::ecs::{Component, ComponentId, Database, Entity};
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

/// Untyped reference to one component of one entity.
///
/// Stays valid until a component is inserted into or removed from the same
/// entity, or the entity leaves the database. Overwriting the component's
/// value keeps it valid.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentHandle {
    pub(crate) entity: Entity,
    pub(crate) position: u32,
    pub(crate) revision: u32,
    pub(crate) component: ComponentId,
}

impl ComponentHandle {
    pub(crate) fn at(entity: Entity, record: &StoredRecord, position: usize) -> Self {
        Self {
            entity,
            position: position as u32,
            revision: record.revision(),
            component: record.components()[position].id,
        }
    }

    /// Entity that owns the component.
    pub fn entity(&self) -> Entity {
        self.entity
    }

    pub fn component_id(&self) -> ComponentId {
        self.component
    }
}

impl fmt::Display for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.entity, self.component, self.position)
    }
}

/// Handle to a component of type `T`, or an empty view when the entity
/// has no such component.
pub struct ComponentView<T> {
    handle: Option<ComponentHandle>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ComponentView<T> {
    pub(crate) fn new(handle: ComponentHandle) -> Self {
        Self {
            handle: Some(handle),
            _marker: PhantomData,
        }
    }

    pub fn empty() -> Self {
        Self {
            handle: None,
            _marker: PhantomData,
        }
    }

    /// Whether the view referred to a component when it was produced.
    pub fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Option<ComponentHandle> {
        self.handle
    }
}

impl<T> Clone for ComponentView<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ComponentView<T> {}

impl<T> Default for ComponentView<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> PartialEq for ComponentView<T> {
    fn eq(&self, other: &Self) -> bool {
        self.handle == other.handle
    }
}

impl<T> Eq for ComponentView<T> {}

impl<T> fmt::Debug for ComponentView<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentView")
            .field("type", &std::any::type_name::<T>())
            .field("handle", &self.handle)
            .finish()
    }
}

impl<T> From<ComponentView<T>> for bool {
    fn from(view: ComponentView<T>) -> bool {
        view.is_valid()
    }
}

/// Query parameter granting the component's value together with its handle.
///
/// Dereferences to `T`.
pub struct ComponentInfo<'a, T> {
    handle: ComponentHandle,
    value: &'a mut T,
}

impl<'a, T> ComponentInfo<'a, T> {
    pub(crate) fn new(handle: ComponentHandle, value: &'a mut T) -> Self {
        Self { handle, value }
    }

    pub fn handle(&self) -> ComponentHandle {
        self.handle
    }

    pub fn entity(&self) -> Entity {
        self.handle.entity
    }

    pub fn view(&self) -> ComponentView<T> {
        ComponentView::new(self.handle)
    }

    pub fn into_inner(self) -> &'a mut T {
        self.value
    }
}

impl<T> Deref for ComponentInfo<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T> DerefMut for ComponentInfo<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
    }
}

impl<T: fmt::Debug> fmt::Debug for ComponentInfo<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInfo")
            .field("handle", &self.handle)
            .field("value", &self.value)
            .finish()
    }
}

/// Tuple of component types looked up together by
/// [`Database::get_many`](crate::ecs::Database::get_many).
pub trait ViewSet {
    type Views;

    fn views(db: &Database, entity: Entity) -> Self::Views;
}

macro_rules! impl_view_set {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ViewSet for ($($name,)+) {
            type Views = ($(ComponentView<$name>,)+);

            fn views(db: &Database, entity: Entity) -> Self::Views {
                ($(db.get::<$name>(entity),)+)
            }
        }
    };
}

impl_view_set!(A);
impl_view_set!(A, B);
impl_view_set!(A, B, C);
impl_view_set!(A, B, C, D);
impl_view_set!(A, B, C, D, E);
impl_view_set!(A, B, C, D, E, F);
impl_view_set!(A, B, C, D, E, F, G);
impl_view_set!(A, B, C, D, E, F, G, H);

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(position: u32) -> ComponentHandle {
        ComponentHandle {
            entity: Entity::new(1, 0),
            position,
            revision: 2,
            component: 5,
        }
    }

    #[test]
    fn default_view_is_invalid() {
        let view = ComponentView::<u8>::default();
        assert!(!view.is_valid());
        assert!(!bool::from(view));
        assert_eq!(view.handle(), None);
    }

    #[test]
    fn view_carries_handle() {
        let view = ComponentView::<u8>::new(handle(0));
        assert!(view.is_valid());
        assert_eq!(view.handle().map(|h| h.entity()), Some(Entity::new(1, 0)));
    }

    #[test]
    fn handles_order_by_position() {
        assert!(handle(0) < handle(1));
        assert_eq!(handle(3).to_string(), "1v0#5@3");
    }

    #[test]
    fn info_derefs_to_value() {
        let mut value = 3u32;
        let mut info = ComponentInfo::new(handle(0), &mut value);
        *info += 1;
        assert_eq!(*info, 4);
        assert_eq!(info.view().handle(), Some(handle(0)));
        assert_eq!(value, 4);
    }
}
