// database.rs - Entity store with type-erased component payloads
//
// Each entity owns a sorted list of (component id, slot) pairs. Payloads live
// in one paged arena per component id, so attaching or detaching a component
// moves an index around rather than the value itself.

use crate::config::DatabaseConfig;
use crate::ecs::entity::EntityTable;
use crate::ecs::record::{presence, Slot, StoredComponent, StoredRecord};
use crate::ecs::{
    Component, ComponentData, ComponentHandle, ComponentId, ComponentMeta, ComponentView, DbError,
    Entity, EntityRecord, Tag, TypeRegistry, ViewSet,
};
use crate::pool::{Arena, ErasedArena};
use latch_metrics::Counter;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;
use tracing::{debug, trace};

pub(crate) type ArenaMap = HashMap<ComponentId, Box<dyn ErasedArena>>;

/// A single-threaded entity–component store.
pub struct Database {
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) entities: EntityTable,
    pub(crate) arenas: ArenaMap,
    config: DatabaseConfig,
    pub(crate) counters: Counter,
}

impl Database {
    /// Empty database on the process-wide registry with default config.
    pub fn new() -> Self {
        Self::build(TypeRegistry::global(), DatabaseConfig::default())
    }

    pub fn with_config(config: DatabaseConfig) -> Result<Self, DbError> {
        Self::with_registry_and_config(TypeRegistry::global(), config)
    }

    /// Empty database minting ids from `registry` instead of the global one.
    pub fn with_registry(registry: Arc<TypeRegistry>) -> Self {
        Self::build(registry, DatabaseConfig::default())
    }

    pub fn with_registry_and_config(
        registry: Arc<TypeRegistry>,
        config: DatabaseConfig,
    ) -> Result<Self, DbError> {
        config.validate()?;
        Ok(Self::build(registry, config))
    }

    fn build(registry: Arc<TypeRegistry>, config: DatabaseConfig) -> Self {
        debug!(
            rows_per_page = config.rows_per_page,
            entity_capacity = config.entity_capacity,
            "creating database"
        );
        Self {
            registry,
            entities: EntityTable::with_capacity(config.entity_capacity),
            arenas: HashMap::new(),
            config,
            counters: Counter::new(),
        }
    }

    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn counters(&self) -> &Counter {
        &self.counters
    }

    /// Number of live entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.len() == 0
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(entity)
    }

    /// Live entities in creation order.
    pub fn entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter().map(|(entity, _)| entity)
    }

    // ------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------

    /// Append an entity with no components.
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.entities.insert(StoredRecord::default());
        self.counters.increment("entities_created", 1);
        debug!(%entity, "created entity");
        entity
    }

    /// Remove an entity and drop its component payloads.
    pub fn erase_entity(&mut self, entity: Entity) -> Result<(), DbError> {
        let record = self
            .entities
            .remove(entity)
            .ok_or(DbError::StaleEntity(entity))?;
        release_all(&mut self.arenas, &record)?;
        self.counters.increment("entities_erased", 1);
        debug!(%entity, components = record.components().len(), "erased entity");
        Ok(())
    }

    /// Remove an entity and hand its components to the caller.
    pub fn displace_entity(&mut self, entity: Entity) -> Result<EntityRecord, DbError> {
        let record = self
            .entities
            .remove(entity)
            .ok_or(DbError::StaleEntity(entity))?;
        let components = record.components();
        let mut detached = EntityRecord::new();
        for (i, component) in components.iter().enumerate() {
            match detach(&mut self.arenas, &self.registry, *component) {
                Ok(data) => {
                    detached.insert(data);
                }
                Err(err) => {
                    // The record is already unlinked; nothing else owns these rows.
                    let _ = release_rows(&mut self.arenas, &components[i..]);
                    return Err(err);
                }
            }
        }
        self.counters.increment("entities_erased", 1);
        debug!(%entity, components = detached.len(), "displaced entity");
        Ok(detached)
    }

    /// Move a detached record in as a new entity.
    pub fn emplace_entity(&mut self, record: EntityRecord) -> Result<Entity, DbError> {
        let mut stored = StoredRecord::default();
        for data in record {
            if let Err(err) = attach(
                &mut self.arenas,
                &self.registry,
                self.config.rows_per_page,
                &mut stored,
                data,
            ) {
                // Best effort: the original error is the one worth reporting.
                let _ = release_all(&mut self.arenas, &stored);
                return Err(err);
            }
        }
        let components = stored.components().len();
        let entity = self.entities.insert(stored);
        self.counters.increment("entities_created", 1);
        debug!(%entity, components, "emplaced entity");
        Ok(entity)
    }

    /// Erase every entity.
    pub fn clear(&mut self) {
        let erased = self.entities.len();
        self.entities.clear();
        for arena in self.arenas.values_mut() {
            arena.clear();
        }
        self.counters.increment("entities_erased", erased);
        debug!(erased, "cleared database");
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Attach `value` to `entity`, overwriting an existing `T` in place.
    ///
    /// Overwriting keeps existing handles into the entity valid; inserting a
    /// new component type retires them.
    pub fn create_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<ComponentView<T>, DbError> {
        let id = self.registry.id_of::<T>();
        let record = self
            .entities
            .get_mut(entity)
            .ok_or(DbError::StaleEntity(entity))?;
        let arena = typed_arena::<T>(&mut self.arenas, id, self.config.rows_per_page)?;

        let position = match record.search(id) {
            Ok(position) => {
                match record.components()[position].slot {
                    Slot::Value(row) => {
                        arena.replace(row, value)?;
                    }
                    Slot::Marker => {
                        let row = arena.insert(value);
                        record.set_slot(position, Slot::Value(row));
                    }
                }
                trace!(%entity, component = type_name::<T>(), "overwrote component");
                position
            }
            Err(position) => {
                let row = arena.insert(value);
                record.insert_at(
                    position,
                    StoredComponent {
                        id,
                        slot: Slot::Value(row),
                    },
                );
                self.counters.increment("components_created", 1);
                trace!(%entity, component = type_name::<T>(), "created component");
                position
            }
        };
        Ok(ComponentView::new(ComponentHandle::at(entity, record, position)))
    }

    /// Mark `entity` with `Tag<T>`. Attaching the same tag again is a no-op
    /// and returns an equal view.
    pub fn create_tag<T: Component>(
        &mut self,
        entity: Entity,
    ) -> Result<ComponentView<Tag<T>>, DbError> {
        let id = self.registry.id_of::<Tag<T>>();
        let record = self
            .entities
            .get_mut(entity)
            .ok_or(DbError::StaleEntity(entity))?;
        let position = match record.search(id) {
            Ok(position) => position,
            Err(position) => {
                record.insert_at(
                    position,
                    StoredComponent {
                        id,
                        slot: Slot::Marker,
                    },
                );
                self.counters.increment("components_created", 1);
                trace!(%entity, tag = type_name::<T>(), "created tag");
                position
            }
        };
        Ok(ComponentView::new(ComponentHandle::at(entity, record, position)))
    }

    /// Remove one component and drop its payload.
    pub fn erase_component(&mut self, handle: ComponentHandle) -> Result<(), DbError> {
        let record = self
            .entities
            .get_mut(handle.entity)
            .ok_or(DbError::StaleComponent(handle))?;
        let position = checked_position(record, &handle)?;
        let removed = record.remove_at(position);
        if let Slot::Value(row) = removed.slot {
            release(&mut self.arenas, removed.id, row)?;
        }
        self.counters.increment("components_erased", 1);
        trace!(%handle, "erased component");
        Ok(())
    }

    /// Remove one component and hand it to the caller.
    pub fn displace_component(
        &mut self,
        handle: ComponentHandle,
    ) -> Result<ComponentData, DbError> {
        let record = self
            .entities
            .get_mut(handle.entity)
            .ok_or(DbError::StaleComponent(handle))?;
        let position = checked_position(record, &handle)?;
        let removed = record.remove_at(position);
        let data = detach(&mut self.arenas, &self.registry, removed)?;
        self.counters.increment("components_erased", 1);
        trace!(%handle, component = data.type_name(), "displaced component");
        Ok(data)
    }

    /// Attach detached component data to `entity`, overwriting a component
    /// of the same type. Ids are re-keyed through this database's registry.
    pub fn emplace_component(
        &mut self,
        entity: Entity,
        data: ComponentData,
    ) -> Result<ComponentHandle, DbError> {
        let record = self
            .entities
            .get_mut(entity)
            .ok_or(DbError::StaleEntity(entity))?;
        let before = record.components().len();
        let position = attach(
            &mut self.arenas,
            &self.registry,
            self.config.rows_per_page,
            record,
            data,
        )?;
        if record.components().len() > before {
            self.counters.increment("components_created", 1);
        }
        let handle = ComponentHandle::at(entity, record, position);
        trace!(%handle, "emplaced component");
        Ok(handle)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// View of `entity`'s `T`, or an empty view if it has none.
    pub fn get<T: Component>(&self, entity: Entity) -> ComponentView<T> {
        self.registry
            .lookup::<T>()
            .and_then(|id| {
                let record = self.entities.get(entity)?;
                let position = record.search(id).ok()?;
                Some(ComponentHandle::at(entity, record, position))
            })
            .map_or_else(ComponentView::empty, ComponentView::new)
    }

    /// Views of several component types at once, e.g.
    /// `db.get_many::<(Position, Velocity)>(e)`.
    pub fn get_many<V: ViewSet>(&self, entity: Entity) -> V::Views {
        V::views(self, entity)
    }

    pub fn value<T: Component>(&self, view: &ComponentView<T>) -> Result<&T, DbError> {
        self.cast(view.handle().ok_or(DbError::EmptyView)?)
    }

    pub fn value_mut<T: Component>(&mut self, view: &ComponentView<T>) -> Result<&mut T, DbError> {
        self.cast_mut(view.handle().ok_or(DbError::EmptyView)?)
    }

    /// Typed access through an untyped handle.
    ///
    /// A tag attached without a payload still reads back as its zero-sized
    /// value, the same as one stored through `create_component`.
    pub fn cast<T: Component>(&self, handle: ComponentHandle) -> Result<&T, DbError> {
        let row = match self.slot(&handle)? {
            Slot::Value(row) => row,
            // SAFETY: `marker` only yields pointers to zero-sized tags.
            Slot::Marker => return self.marker::<T>(&handle).map(|tag| unsafe { tag.as_ref() }),
        };
        let arena = self
            .arenas
            .get(&handle.component)
            .ok_or(DbError::UnknownComponent { id: handle.component })?;
        let found = arena.type_name();
        let arena = arena
            .as_any()
            .downcast_ref::<Arena<T>>()
            .ok_or(DbError::TypeMismatch {
                requested: type_name::<T>(),
                found,
            })?;
        Ok(arena.get(row)?)
    }

    pub fn cast_mut<T: Component>(&mut self, handle: ComponentHandle) -> Result<&mut T, DbError> {
        let row = match self.slot(&handle)? {
            Slot::Value(row) => row,
            // SAFETY: as in `cast`.
            Slot::Marker => {
                return self
                    .marker::<T>(&handle)
                    .map(|mut tag| unsafe { tag.as_mut() })
            }
        };
        let arena = self
            .arenas
            .get_mut(&handle.component)
            .ok_or(DbError::UnknownComponent { id: handle.component })?;
        let found = arena.type_name();
        let arena = arena
            .as_any_mut()
            .downcast_mut::<Arena<T>>()
            .ok_or(DbError::TypeMismatch {
                requested: type_name::<T>(),
                found,
            })?;
        Ok(arena.get_mut(row)?)
    }

    /// Whether `handle` still names a live component.
    pub fn is_valid(&self, handle: ComponentHandle) -> bool {
        self.entities
            .get(handle.entity)
            .is_some_and(|record| checked_position(record, &handle).is_ok())
    }

    fn slot(&self, handle: &ComponentHandle) -> Result<Slot, DbError> {
        let record = self
            .entities
            .get(handle.entity)
            .ok_or(DbError::StaleComponent(*handle))?;
        let position = checked_position(record, handle)?;
        Ok(record.components()[position].slot)
    }

    /// Zero-sized stand-in for a marker slot, once `T` is checked against the
    /// type registered under the handle's id.
    fn marker<T: Component>(&self, handle: &ComponentHandle) -> Result<NonNull<T>, DbError> {
        let meta = self
            .registry
            .meta(handle.component)
            .ok_or(DbError::UnknownComponent { id: handle.component })?;
        if meta.type_id != TypeId::of::<T>() {
            return Err(DbError::TypeMismatch {
                requested: type_name::<T>(),
                found: meta.name,
            });
        }
        presence::<T>().ok_or(DbError::NoPayload { name: meta.name })
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        debug!(entities = self.entities.len(), "dropping database");
    }
}

fn checked_position(record: &StoredRecord, handle: &ComponentHandle) -> Result<usize, DbError> {
    let position = handle.position as usize;
    let current = record.revision() == handle.revision
        && record
            .get(position)
            .is_some_and(|component| component.id == handle.component);
    if current {
        Ok(position)
    } else {
        Err(DbError::StaleComponent(*handle))
    }
}

fn arena_for<'a>(
    arenas: &'a mut ArenaMap,
    id: ComponentId,
    meta: &ComponentMeta,
    rows_per_page: usize,
) -> &'a mut Box<dyn ErasedArena> {
    arenas
        .entry(id)
        .or_insert_with(|| (meta.new_arena)(rows_per_page))
}

fn typed_arena<T: Component>(
    arenas: &mut ArenaMap,
    id: ComponentId,
    rows_per_page: usize,
) -> Result<&mut Arena<T>, DbError> {
    let arena = arenas
        .entry(id)
        .or_insert_with(|| Box::new(Arena::<T>::with_rows_per_page(rows_per_page)));
    let found = arena.type_name();
    arena
        .as_any_mut()
        .downcast_mut::<Arena<T>>()
        .ok_or(DbError::TypeMismatch {
            requested: type_name::<T>(),
            found,
        })
}

fn release(arenas: &mut ArenaMap, id: ComponentId, row: usize) -> Result<(), DbError> {
    arenas
        .get_mut(&id)
        .ok_or(DbError::UnknownComponent { id })?
        .remove(row)?;
    Ok(())
}

fn release_all(arenas: &mut ArenaMap, record: &StoredRecord) -> Result<(), DbError> {
    release_rows(arenas, record.components())
}

/// Drop every payload in `components`, attempting all of them and reporting
/// the first failure.
fn release_rows(arenas: &mut ArenaMap, components: &[StoredComponent]) -> Result<(), DbError> {
    let mut first_err = None;
    for component in components {
        if let Slot::Value(row) = component.slot {
            if let Err(err) = release(arenas, component.id, row) {
                first_err.get_or_insert(err);
            }
        }
    }
    first_err.map_or(Ok(()), Err)
}

fn take(arenas: &mut ArenaMap, id: ComponentId, row: usize) -> Result<Box<dyn Any>, DbError> {
    Ok(arenas
        .get_mut(&id)
        .ok_or(DbError::UnknownComponent { id })?
        .take_boxed(row)?)
}

/// Move a component's payload out of its arena.
fn detach(
    arenas: &mut ArenaMap,
    registry: &TypeRegistry,
    component: StoredComponent,
) -> Result<ComponentData, DbError> {
    let meta = registry
        .meta(component.id)
        .ok_or(DbError::UnknownComponent { id: component.id })?;
    let payload = match component.slot {
        Slot::Value(row) => Some(take(arenas, component.id, row)?),
        Slot::Marker => None,
    };
    Ok(ComponentData::from_parts(meta, payload))
}

/// Store detached data into `record`, returning its position.
fn attach(
    arenas: &mut ArenaMap,
    registry: &TypeRegistry,
    rows_per_page: usize,
    record: &mut StoredRecord,
    data: ComponentData,
) -> Result<usize, DbError> {
    let (meta, payload) = data.into_parts();
    let id = registry.adopt(&meta)?;

    match record.search(id) {
        Ok(position) => {
            let slot = match (record.components()[position].slot, payload) {
                (Slot::Value(row), Some(value)) => {
                    arena_for(arenas, id, &meta, rows_per_page).replace_boxed(row, value)?;
                    Slot::Value(row)
                }
                (Slot::Marker, Some(value)) => {
                    Slot::Value(arena_for(arenas, id, &meta, rows_per_page).insert_boxed(value)?)
                }
                (Slot::Value(row), None) => {
                    release(arenas, id, row)?;
                    Slot::Marker
                }
                (Slot::Marker, None) => Slot::Marker,
            };
            record.set_slot(position, slot);
            Ok(position)
        }
        Err(position) => {
            let slot = match payload {
                Some(value) => {
                    Slot::Value(arena_for(arenas, id, &meta, rows_per_page).insert_boxed(value)?)
                }
                None => Slot::Marker,
            };
            record.insert_at(position, StoredComponent { id, slot });
            Ok(position)
        }
    }
}
