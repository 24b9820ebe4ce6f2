//! Per-entity component index and its detached, owning form.

use crate::ecs::{Component, ComponentId, ComponentMeta, DbError, Tag, TypeRegistry};
use std::any::{type_name, Any};
use std::fmt;
use std::ptr::NonNull;

/// Where a component's payload lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Row in the arena for the component's id.
    Value(usize),
    /// Presence only.
    Marker,
}

/// Stand-in for the value of a presence-only slot.
///
/// Markers are only ever stored under `Tag<_>` ids, and tags are zero-sized,
/// so a dangling pointer is a valid reference to one. Any type with a size
/// yields `None`.
pub(crate) fn presence<T>() -> Option<NonNull<T>> {
    (std::mem::size_of::<T>() == 0).then(NonNull::dangling)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StoredComponent {
    pub id: ComponentId,
    pub slot: Slot,
}

/// Components of one live entity, sorted by id with at most one entry per id.
///
/// `revision` changes whenever an entry is inserted or removed. Component
/// handles capture it, so any structural change retires every handle into
/// the record while an in-place overwrite keeps them valid.
#[derive(Debug, Default)]
pub(crate) struct StoredRecord {
    components: Vec<StoredComponent>,
    revision: u32,
}

impl StoredRecord {
    pub fn components(&self) -> &[StoredComponent] {
        &self.components
    }

    pub fn revision(&self) -> u32 {
        self.revision
    }

    /// `Ok(position)` of `id`, or `Err(position)` where it would be inserted.
    #[inline]
    pub fn search(&self, id: ComponentId) -> Result<usize, usize> {
        self.components.binary_search_by_key(&id, |c| c.id)
    }

    pub fn contains(&self, id: ComponentId) -> bool {
        self.search(id).is_ok()
    }

    pub fn slot_of(&self, id: ComponentId) -> Option<Slot> {
        self.search(id).ok().map(|pos| self.components[pos].slot)
    }

    pub fn get(&self, position: usize) -> Option<&StoredComponent> {
        self.components.get(position)
    }

    pub fn insert_at(&mut self, position: usize, component: StoredComponent) {
        self.components.insert(position, component);
        self.revision = self.revision.wrapping_add(1);
    }

    pub fn remove_at(&mut self, position: usize) -> StoredComponent {
        let removed = self.components.remove(position);
        self.revision = self.revision.wrapping_add(1);
        removed
    }

    /// Repoint an existing entry without disturbing handles.
    pub fn set_slot(&mut self, position: usize, slot: Slot) {
        self.components[position].slot = slot;
    }
}

/// A component detached from any database: its type metadata plus the boxed
/// payload (absent for tags).
///
/// Produced by [`Database::displace_component`](crate::ecs::Database::displace_component)
/// and accepted by [`Database::emplace_component`](crate::ecs::Database::emplace_component).
pub struct ComponentData {
    meta: ComponentMeta,
    payload: Option<Box<dyn Any>>,
}

impl ComponentData {
    pub(crate) fn from_parts(meta: ComponentMeta, payload: Option<Box<dyn Any>>) -> Self {
        Self { meta, payload }
    }

    pub(crate) fn into_parts(self) -> (ComponentMeta, Option<Box<dyn Any>>) {
        (self.meta, self.payload)
    }

    /// Wrap a value, registering its type in `registry` if needed.
    pub fn from_value<T: Component>(registry: &TypeRegistry, value: T) -> Self {
        let id = registry.id_of::<T>();
        Self {
            meta: registry_meta(registry, id),
            payload: Some(Box::new(value)),
        }
    }

    /// Payload-less marker for `Tag<T>`.
    pub fn tag<T: Component>(registry: &TypeRegistry) -> Self {
        let id = registry.id_of::<Tag<T>>();
        Self {
            meta: registry_meta(registry, id),
            payload: None,
        }
    }

    /// Id in the registry this data was detached from.
    pub fn component_id(&self) -> ComponentId {
        self.meta.id
    }

    pub fn meta(&self) -> &ComponentMeta {
        &self.meta
    }

    pub fn type_name(&self) -> &'static str {
        self.meta.name
    }

    pub fn is_tag(&self) -> bool {
        self.payload.is_none()
    }

    pub fn is<T: Component>(&self) -> bool {
        self.meta.type_id == std::any::TypeId::of::<T>()
    }

    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        self.payload.as_mut()?.downcast_mut::<T>()
    }

    /// Take the payload back out as a `T`.
    pub fn into_inner<T: Component>(self) -> Result<T, DbError> {
        let name = self.meta.name;
        let payload = self.payload.ok_or(DbError::NoPayload { name })?;
        payload
            .downcast::<T>()
            .map(|boxed| *boxed)
            .map_err(|_| DbError::TypeMismatch {
                requested: type_name::<T>(),
                found: name,
            })
    }
}

fn registry_meta(registry: &TypeRegistry, id: ComponentId) -> ComponentMeta {
    registry
        .meta(id)
        .expect("registry returned an id without metadata")
}

impl fmt::Debug for ComponentData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentData")
            .field("id", &self.meta.id)
            .field("type", &self.meta.name)
            .field("tag", &self.is_tag())
            .finish()
    }
}

/// An entity's components detached from any database.
///
/// Produced by [`Database::displace_entity`](crate::ecs::Database::displace_entity)
/// and accepted by [`Database::emplace_entity`](crate::ecs::Database::emplace_entity).
/// Holds at most one component per Rust type.
#[derive(Debug, Default)]
pub struct EntityRecord {
    components: Vec<ComponentData>,
}

impl EntityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component, replacing any existing one of the same type.
    pub fn insert(&mut self, data: ComponentData) -> Option<ComponentData> {
        match self
            .components
            .iter_mut()
            .find(|existing| existing.meta.type_id == data.meta.type_id)
        {
            Some(existing) => Some(std::mem::replace(existing, data)),
            None => {
                self.components.push(data);
                None
            }
        }
    }

    pub fn with(mut self, data: ComponentData) -> Self {
        self.insert(data);
        self
    }

    pub fn get<T: Component>(&self) -> Option<&ComponentData> {
        self.components.iter().find(|data| data.is::<T>())
    }

    /// Remove the component of type `T`.
    pub fn take<T: Component>(&mut self) -> Option<ComponentData> {
        let position = self.components.iter().position(|data| data.is::<T>())?;
        Some(self.components.remove(position))
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentData> {
        self.components.iter()
    }
}

impl IntoIterator for EntityRecord {
    type Item = ComponentData;
    type IntoIter = std::vec::IntoIter<ComponentData>;

    fn into_iter(self) -> Self::IntoIter {
        self.components.into_iter()
    }
}

impl FromIterator<ComponentData> for EntityRecord {
    fn from_iter<I: IntoIterator<Item = ComponentData>>(iter: I) -> Self {
        let mut record = Self::new();
        for data in iter {
            record.insert(data);
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Health(u32);
    struct Frozen;

    #[test]
    fn structural_changes_bump_revision() {
        let mut record = StoredRecord::default();
        let first = StoredComponent {
            id: 4,
            slot: Slot::Marker,
        };
        record.insert_at(0, first);
        assert_eq!(record.revision(), 1);

        let pos = record.search(2).unwrap_err();
        assert_eq!(pos, 0);
        record.insert_at(
            pos,
            StoredComponent {
                id: 2,
                slot: Slot::Value(9),
            },
        );
        let ids: Vec<ComponentId> = record.components().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 4]);

        let before = record.revision();
        record.set_slot(0, Slot::Value(10));
        assert_eq!(record.revision(), before);
        assert_eq!(record.slot_of(2), Some(Slot::Value(10)));

        assert_eq!(record.remove_at(1), first);
        assert_eq!(record.revision(), before + 1);
        assert!(!record.contains(4));
    }

    #[test]
    fn component_data_round_trip() {
        let registry = TypeRegistry::new();
        let data = ComponentData::from_value(&registry, Health(10));
        assert!(!data.is_tag());
        assert!(data.is::<Health>());
        assert_eq!(data.downcast_ref::<Health>(), Some(&Health(10)));
        assert_eq!(data.into_inner::<Health>().unwrap(), Health(10));
    }

    #[test]
    fn component_data_rejects_wrong_type() {
        let registry = TypeRegistry::new();
        let data = ComponentData::from_value(&registry, Health(1));
        assert!(matches!(
            data.into_inner::<u32>(),
            Err(DbError::TypeMismatch { .. })
        ));

        let tag = ComponentData::tag::<Frozen>(&registry);
        assert!(tag.is_tag());
        assert!(tag.is::<Tag<Frozen>>());
        assert!(matches!(
            tag.into_inner::<Tag<Frozen>>(),
            Err(DbError::NoPayload { .. })
        ));
    }

    #[test]
    fn entity_record_keeps_one_per_type() {
        let registry = TypeRegistry::new();
        let mut record = EntityRecord::new()
            .with(ComponentData::from_value(&registry, Health(1)))
            .with(ComponentData::tag::<Frozen>(&registry));

        let replaced = record.insert(ComponentData::from_value(&registry, Health(2)));
        assert_eq!(replaced.unwrap().into_inner::<Health>().unwrap(), Health(1));
        assert_eq!(record.len(), 2);
        assert_eq!(
            record.get::<Health>().and_then(|d| d.downcast_ref::<Health>()),
            Some(&Health(2))
        );

        assert!(record.take::<Tag<Frozen>>().is_some());
        assert_eq!(record.len(), 1);
    }
}
