// query.rs - Typed visits over every entity
//
// A query is a type: `&T`, `&mut T`, `ComponentInfo<T>`, `Tag<T>`, `Not<T>`,
// `Entity`, or a tuple of those. Each element decides on its own whether an
// entity matches and what argument to hand the callback. Tuples check their
// elements left to right and stop at the first miss.

use crate::ecs::database::ArenaMap;
use crate::ecs::entity::EntityTable;
use crate::ecs::record::{presence, Slot, StoredRecord};
use crate::ecs::{
    Component, ComponentHandle, ComponentId, ComponentInfo, ComponentView, Database, Entity, Not,
    Tag, TypeRegistry,
};
use crate::pool::{Arena, ErasedArena};
use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::ptr::NonNull;
use tracing::trace;

/// One component type a query touches.
#[doc(hidden)]
pub struct Access {
    type_id: TypeId,
    name: &'static str,
    mutable: bool,
}

impl Access {
    fn of<T: Component>(mutable: bool) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            name: type_name::<T>(),
            mutable,
        }
    }
}

/// The entity currently being matched.
#[doc(hidden)]
pub struct Row<'w> {
    entity: Entity,
    record: &'w StoredRecord,
}

/// Arena pointers taken from one exclusive borrow of the database's arenas.
#[doc(hidden)]
pub struct Arenas<'a> {
    ptrs: HashMap<ComponentId, NonNull<dyn ErasedArena>>,
    _borrow: PhantomData<&'a mut ArenaMap>,
}

impl<'a> Arenas<'a> {
    fn new(arenas: &'a mut ArenaMap) -> Self {
        let ptrs = arenas
            .iter_mut()
            .map(|(&id, arena)| (id, NonNull::from(&mut **arena)))
            .collect();
        Self {
            ptrs,
            _borrow: PhantomData,
        }
    }

    fn shared<T: Component>(&self, id: ComponentId) -> Option<NonNull<Arena<T>>> {
        let ptr = self.ptrs.get(&id)?;
        // SAFETY: every pointer targets a distinct boxed arena borrowed for `'a`.
        let arena = unsafe { ptr.as_ref() };
        arena.as_any().downcast_ref::<Arena<T>>().map(NonNull::from)
    }

    fn exclusive<T: Component>(&self, id: ComponentId) -> Option<NonNull<Arena<T>>> {
        let mut ptr = *self.ptrs.get(&id)?;
        // SAFETY: as above; access checking guarantees no other parameter of
        // the same query touches this arena.
        let arena = unsafe { ptr.as_mut() };
        arena.as_any_mut().downcast_mut::<Arena<T>>().map(NonNull::from)
    }
}

/// A parameter of [`Database::visit`].
pub trait QueryParam {
    /// Argument handed to the callback for a matching entity.
    type Item<'w>;

    /// Per-visit data resolved once before iteration.
    type State;

    /// Record every component type this parameter reads or writes.
    fn access(out: &mut Vec<Access>);

    fn prepare(registry: &TypeRegistry, arenas: &Arenas<'_>) -> Self::State;

    /// Produce the argument for `row`, or `None` if the entity does not match.
    ///
    /// # Safety
    /// `state` must come from [`QueryParam::prepare`] over arenas that stay
    /// exclusively borrowed for `'w`, the query's accesses must be disjoint,
    /// and each row may be fetched at most once per visit.
    unsafe fn fetch<'w>(state: &Self::State, row: &Row<'w>) -> Option<Self::Item<'w>>;
}

/// Query whose items can be turned into owned values, used by [`Database::query`].
pub trait QueryOwned: QueryParam {
    type Owned;

    fn to_owned_item(item: Self::Item<'_>) -> Self::Owned;
}

/// Locate the value `slot` names for an exclusive fetch.
///
/// # Safety
/// `arena` must stay exclusively borrowed for the visit and no reference to
/// the row behind `slot` may be live.
unsafe fn locate<T: Component>(
    arena: Option<NonNull<Arena<T>>>,
    slot: Slot,
) -> Option<NonNull<T>> {
    match slot {
        Slot::Value(row) => unsafe { Arena::value_ptr(arena?.as_ptr(), row) }.ok(),
        Slot::Marker => presence::<T>(),
    }
}

impl<'a, T: Component> QueryParam for &'a T {
    type Item<'w> = &'w T;
    type State = Option<(ComponentId, Option<NonNull<Arena<T>>>)>;

    fn access(out: &mut Vec<Access>) {
        out.push(Access::of::<T>(false));
    }

    fn prepare(registry: &TypeRegistry, arenas: &Arenas<'_>) -> Self::State {
        let id = registry.lookup::<T>()?;
        Some((id, arenas.shared::<T>(id)))
    }

    unsafe fn fetch<'w>(state: &Self::State, row: &Row<'w>) -> Option<Self::Item<'w>> {
        let (id, arena) = (*state)?;
        match row.record.slot_of(id)? {
            Slot::Value(index) => unsafe { arena?.as_ref() }.get(index).ok(),
            Slot::Marker => presence::<T>().map(|value| unsafe { value.as_ref() }),
        }
    }
}

impl<'a, T: Component + Clone> QueryOwned for &'a T {
    type Owned = T;

    fn to_owned_item(item: &T) -> T {
        item.clone()
    }
}

impl<'a, T: Component> QueryParam for &'a mut T {
    type Item<'w> = &'w mut T;
    type State = Option<(ComponentId, Option<NonNull<Arena<T>>>)>;

    fn access(out: &mut Vec<Access>) {
        out.push(Access::of::<T>(true));
    }

    fn prepare(registry: &TypeRegistry, arenas: &Arenas<'_>) -> Self::State {
        let id = registry.lookup::<T>()?;
        Some((id, arenas.exclusive::<T>(id)))
    }

    unsafe fn fetch<'w>(state: &Self::State, row: &Row<'w>) -> Option<Self::Item<'w>> {
        let (id, arena) = (*state)?;
        let slot = row.record.slot_of(id)?;
        Some(unsafe { locate(arena, slot)?.as_mut() })
    }
}

impl<'a, T: Component + Clone> QueryOwned for &'a mut T {
    type Owned = T;

    fn to_owned_item(item: &mut T) -> T {
        item.clone()
    }
}

impl<'a, T: Component> QueryParam for ComponentInfo<'a, T> {
    type Item<'w> = ComponentInfo<'w, T>;
    type State = Option<(ComponentId, Option<NonNull<Arena<T>>>)>;

    fn access(out: &mut Vec<Access>) {
        out.push(Access::of::<T>(true));
    }

    fn prepare(registry: &TypeRegistry, arenas: &Arenas<'_>) -> Self::State {
        let id = registry.lookup::<T>()?;
        Some((id, arenas.exclusive::<T>(id)))
    }

    unsafe fn fetch<'w>(state: &Self::State, row: &Row<'w>) -> Option<Self::Item<'w>> {
        let (id, arena) = (*state)?;
        let position = row.record.search(id).ok()?;
        let slot = row.record.components()[position].slot;
        let value = unsafe { locate(arena, slot)?.as_mut() };
        let handle = ComponentHandle::at(row.entity, row.record, position);
        Some(ComponentInfo::new(handle, value))
    }
}

impl<'a, T: Component> QueryOwned for ComponentInfo<'a, T> {
    type Owned = ComponentView<T>;

    fn to_owned_item(item: ComponentInfo<'_, T>) -> ComponentView<T> {
        item.view()
    }
}

impl<T: Component> QueryParam for Tag<T> {
    type Item<'w> = Tag<T>;
    type State = Option<ComponentId>;

    fn access(_out: &mut Vec<Access>) {}

    fn prepare(registry: &TypeRegistry, _arenas: &Arenas<'_>) -> Self::State {
        registry.lookup::<Tag<T>>()
    }

    unsafe fn fetch<'w>(state: &Self::State, row: &Row<'w>) -> Option<Self::Item<'w>> {
        row.record.contains((*state)?).then(Tag::new)
    }
}

impl<T: Component> QueryOwned for Tag<T> {
    type Owned = Tag<T>;

    fn to_owned_item(item: Tag<T>) -> Tag<T> {
        item
    }
}

impl<T: Component> QueryParam for Not<T> {
    type Item<'w> = Not<T>;
    type State = Option<ComponentId>;

    fn access(_out: &mut Vec<Access>) {}

    fn prepare(registry: &TypeRegistry, _arenas: &Arenas<'_>) -> Self::State {
        registry.lookup::<T>()
    }

    unsafe fn fetch<'w>(state: &Self::State, row: &Row<'w>) -> Option<Self::Item<'w>> {
        match *state {
            // Nobody has ever attached a `T`.
            None => Some(Not::new()),
            Some(id) => (!row.record.contains(id)).then(Not::new),
        }
    }
}

impl<T: Component> QueryOwned for Not<T> {
    type Owned = Not<T>;

    fn to_owned_item(item: Not<T>) -> Not<T> {
        item
    }
}

impl QueryParam for Entity {
    type Item<'w> = Entity;
    type State = ();

    fn access(_out: &mut Vec<Access>) {}

    fn prepare(_registry: &TypeRegistry, _arenas: &Arenas<'_>) {}

    unsafe fn fetch<'w>(_state: &(), row: &Row<'w>) -> Option<Entity> {
        Some(row.entity)
    }
}

impl QueryOwned for Entity {
    type Owned = Entity;

    fn to_owned_item(item: Entity) -> Entity {
        item
    }
}

macro_rules! impl_query_param_tuple {
    ($($name:ident),+) => {
        #[allow(non_snake_case)]
        impl<$($name: QueryParam),+> QueryParam for ($($name,)+) {
            type Item<'w> = ($(<$name as QueryParam>::Item<'w>,)+);
            type State = ($(<$name as QueryParam>::State,)+);

            fn access(out: &mut Vec<Access>) {
                $(<$name as QueryParam>::access(out);)+
            }

            fn prepare(registry: &TypeRegistry, arenas: &Arenas<'_>) -> Self::State {
                ($(<$name as QueryParam>::prepare(registry, arenas),)+)
            }

            unsafe fn fetch<'w>(state: &Self::State, row: &Row<'w>) -> Option<Self::Item<'w>> {
                let ($($name,)+) = state;
                Some(($( unsafe { <$name as QueryParam>::fetch($name, row)? }, )+))
            }
        }

        #[allow(non_snake_case)]
        impl<$($name: QueryOwned),+> QueryOwned for ($($name,)+) {
            type Owned = ($(<$name as QueryOwned>::Owned,)+);

            fn to_owned_item(item: Self::Item<'_>) -> Self::Owned {
                let ($($name,)+) = item;
                ($(<$name as QueryOwned>::to_owned_item($name),)+)
            }
        }
    };
}

impl_query_param_tuple!(A);
impl_query_param_tuple!(A, B);
impl_query_param_tuple!(A, B, C);
impl_query_param_tuple!(A, B, C, D);
impl_query_param_tuple!(A, B, C, D, E);
impl_query_param_tuple!(A, B, C, D, E, F);
impl_query_param_tuple!(A, B, C, D, E, F, G);
impl_query_param_tuple!(A, B, C, D, E, F, G, H);

/// Panic if `Q` names one component type twice with any mutable access.
fn assert_disjoint<Q: QueryParam>() {
    let mut access = Vec::new();
    Q::access(&mut access);
    for (i, first) in access.iter().enumerate() {
        for second in &access[i + 1..] {
            assert!(
                first.type_id != second.type_id || !(first.mutable || second.mutable),
                "query `{}` borrows `{}` mutably more than once",
                type_name::<Q>(),
                first.name
            );
        }
    }
}

impl Database {
    /// Call `f` once for every entity matching `Q`, in creation order.
    /// Returns the number of calls.
    ///
    /// ```ignore
    /// db.visit::<(&mut Position, &Velocity, Not<Frozen>), _>(|(pos, vel, _)| {
    ///     pos.0 += vel.0;
    /// });
    /// ```
    ///
    /// # Panics
    /// If `Q` requests the same component type twice and at least one of the
    /// requests is mutable.
    pub fn visit<'w, Q, F>(&'w mut self, mut f: F) -> usize
    where
        Q: QueryParam,
        F: FnMut(Q::Item<'w>),
    {
        assert_disjoint::<Q>();

        let Database {
            registry,
            entities,
            arenas,
            counters,
            ..
        } = self;
        let arenas = Arenas::new(arenas);
        let state = Q::prepare(&**registry, &arenas);
        let entities: &'w EntityTable = entities;

        let mut matched = 0;
        for (entity, record) in entities.iter() {
            let row = Row { entity, record };
            // SAFETY: accesses are disjoint, every entity is visited once, and
            // the arenas stay borrowed through `self` for `'w`.
            if let Some(item) = unsafe { Q::fetch(&state, &row) } {
                matched += 1;
                f(item);
            }
        }

        counters.increment("visits", 1);
        trace!(query = type_name::<Q>(), matched, "visited");
        matched
    }

    /// Owned copies of every match of `Q`, in creation order.
    ///
    /// Plain components are cloned, `ComponentInfo<T>` becomes a
    /// [`ComponentView<T>`], markers and entities are copied.
    pub fn query<Q: QueryOwned>(&mut self) -> Vec<Q::Owned> {
        let mut out = Vec::new();
        self.visit::<Q, _>(|item| out.push(Q::to_owned_item(item)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position(f32, f32);

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity(f32, f32);

    #[derive(Debug, Clone, PartialEq)]
    struct Label(&'static str);

    struct Frozen;

    #[test]
    fn visits_in_creation_order() {
        let mut db = Database::new();
        let e1 = db.create_entity();
        let e2 = db.create_entity();
        let e3 = db.create_entity();
        db.create_component(e1, 1i32).unwrap();
        db.create_component(e2, 2i32).unwrap();
        db.create_component(e3, 3i32).unwrap();

        assert_eq!(db.query::<&i32>(), vec![1, 2, 3]);

        db.erase_entity(e2).unwrap();
        let e4 = db.create_entity();
        db.create_component(e4, 4i32).unwrap();
        assert_eq!(db.query::<&i32>(), vec![1, 3, 4]);
    }

    #[test]
    fn tag_parameter_filters_entities() {
        let mut db = Database::new();
        let e1 = db.create_entity();
        db.create_component(e1, Position(1.0, 1.0)).unwrap();
        let e2 = db.create_entity();
        db.create_component(e2, Position(2.0, 2.0)).unwrap();
        db.create_tag::<Velocity>(e2).unwrap();

        let mut tagged = Vec::new();
        let calls = db.visit::<(&Position, Tag<Velocity>), _>(|(position, _)| {
            tagged.push(*position);
        });
        assert_eq!(calls, 1);
        assert_eq!(tagged, vec![Position(2.0, 2.0)]);

        let mut all = 0;
        db.visit::<&Position, _>(|_| all += 1);
        assert_eq!(all, 2);
    }

    #[test]
    fn plain_and_not_are_complements() {
        let mut db = Database::new();
        let mut with = Vec::new();
        for i in 0..6 {
            let e = db.create_entity();
            db.create_component(e, Label("any")).unwrap();
            if i % 2 == 0 {
                db.create_component(e, Velocity(i as f32, 0.0)).unwrap();
                with.push(e);
            }
        }

        let has: Vec<Entity> = db
            .query::<(Entity, &Velocity)>()
            .into_iter()
            .map(|(e, _)| e)
            .collect();
        let lacks: Vec<Entity> = db
            .query::<(Entity, Not<Velocity>)>()
            .into_iter()
            .map(|(e, _)| e)
            .collect();

        assert_eq!(has, with);
        assert_eq!(has.len() + lacks.len(), db.len());
        assert!(lacks.iter().all(|e| !has.contains(e)));
    }

    #[test]
    fn not_of_unregistered_type_matches_everything() {
        struct NeverAttached;

        let mut db = Database::new();
        db.create_entity();
        db.create_entity();
        assert_eq!(db.query::<Not<NeverAttached>>().len(), 2);
    }

    #[test]
    fn not_of_tag_excludes_tagged_entities() {
        let mut db = Database::new();
        let moving = db.create_entity();
        db.create_component(moving, Position(0.0, 0.0)).unwrap();
        let frozen = db.create_entity();
        db.create_component(frozen, Position(0.0, 0.0)).unwrap();
        db.create_tag::<Frozen>(frozen).unwrap();

        let found = db.query::<(Entity, Not<Tag<Frozen>>)>();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, moving);
    }

    #[test]
    fn tags_match_however_they_were_attached() {
        let mut db = Database::new();
        let marked = db.create_entity();
        db.create_tag::<Frozen>(marked).unwrap();
        let valued = db.create_entity();
        db.create_component(valued, Tag::<Frozen>::new()).unwrap();
        db.create_entity();

        let has: Vec<Entity> = db
            .query::<(Entity, &Tag<Frozen>)>()
            .into_iter()
            .map(|(e, _)| e)
            .collect();
        let lacks = db.query::<(Entity, Not<Tag<Frozen>>)>();

        assert_eq!(has, vec![marked, valued]);
        assert_eq!(has.len() + lacks.len(), db.len());
        assert_eq!(db.query::<Tag<Frozen>>().len(), 2);
        assert_eq!(db.query::<ComponentInfo<Tag<Frozen>>>().len(), 2);
    }

    #[test]
    fn marker_only_tags_need_no_arena() {
        struct Sleeping;

        let mut db = Database::new();
        let e = db.create_entity();
        db.create_tag::<Sleeping>(e).unwrap();
        db.create_entity();

        let mut seen = Vec::new();
        db.visit::<(Entity, &mut Tag<Sleeping>), _>(|(entity, _)| seen.push(entity));
        assert_eq!(seen, vec![e]);
        assert_eq!(db.query::<Not<Tag<Sleeping>>>().len(), 1);
    }

    #[test]
    fn mutable_items_can_be_held_across_calls() {
        let mut db = Database::new();
        for i in 0..3 {
            let e = db.create_entity();
            db.create_component(e, Position(i as f32, 0.0)).unwrap();
        }

        let mut held = Vec::new();
        db.visit::<&mut Position, _>(|p| held.push(p));
        assert_eq!(held.len(), 3);
        for p in &mut held {
            p.1 = 9.0;
        }

        assert_eq!(
            db.query::<&Position>(),
            vec![
                Position(0.0, 9.0),
                Position(1.0, 9.0),
                Position(2.0, 9.0)
            ]
        );
    }

    #[test]
    fn identity_parameter_yields_created_handles() {
        let mut db = Database::new();
        let created: Vec<Entity> = (0..3).map(|_| db.create_entity()).collect();
        assert_eq!(db.query::<Entity>(), created);
    }

    #[test]
    fn mutable_parameters_write_through() {
        let mut db = Database::new();
        let moving = db.create_entity();
        db.create_component(moving, Position(0.0, 0.0)).unwrap();
        db.create_component(moving, Velocity(1.0, 2.0)).unwrap();
        let frozen = db.create_entity();
        db.create_component(frozen, Position(0.0, 0.0)).unwrap();
        db.create_component(frozen, Velocity(5.0, 5.0)).unwrap();
        db.create_tag::<Frozen>(frozen).unwrap();

        for _ in 0..2 {
            db.visit::<(&mut Position, &Velocity, Not<Tag<Frozen>>), _>(|(p, v, _)| {
                p.0 += v.0;
                p.1 += v.1;
            });
        }

        let moved = db.get::<Position>(moving);
        assert_eq!(db.value(&moved).unwrap(), &Position(2.0, 4.0));
        let still = db.get::<Position>(frozen);
        assert_eq!(db.value(&still).unwrap(), &Position(0.0, 0.0));
    }

    #[test]
    fn info_parameter_carries_handle() {
        let mut db = Database::new();
        let e = db.create_entity();
        db.create_component(e, Label("before")).unwrap();

        let mut handles = Vec::new();
        db.visit::<ComponentInfo<Label>, _>(|mut info| {
            *info = Label("after");
            handles.push(info.handle());
        });

        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].entity(), e);
        assert_eq!(db.cast::<Label>(handles[0]).unwrap(), &Label("after"));

        let views = db.query::<ComponentInfo<Label>>();
        assert_eq!(views, vec![db.get::<Label>(e)]);
    }

    #[test]
    fn shared_duplicates_are_allowed() {
        let mut db = Database::new();
        let e = db.create_entity();
        db.create_component(e, Position(3.0, 3.0)).unwrap();
        assert_eq!(
            db.query::<(&Position, &Position)>(),
            vec![(Position(3.0, 3.0), Position(3.0, 3.0))]
        );
    }

    #[test]
    #[should_panic(expected = "mutably more than once")]
    fn mutable_duplicates_are_rejected() {
        let mut db = Database::new();
        let e = db.create_entity();
        db.create_component(e, Position(0.0, 0.0)).unwrap();
        db.visit::<(&mut Position, &Position), _>(|_| {});
    }

    #[test]
    fn no_match_is_not_an_error() {
        #[derive(Clone)]
        struct Unused;

        let mut db = Database::new();
        db.create_entity();
        assert_eq!(db.visit::<&Unused, _>(|_| unreachable!()), 0);
        assert!(db.query::<(Entity, &Unused)>().is_empty());
    }

    #[test]
    fn tuple_matching_stops_at_first_miss() {
        let mut db = Database::new();
        let e = db.create_entity();
        db.create_component(e, Label("only")).unwrap();

        // The leading parameter misses, so the mutable one is never fetched.
        let mut calls = 0;
        db.visit::<(&Velocity, &mut Label), _>(|_| calls += 1);
        assert_eq!(calls, 0);
        assert_eq!(db.query::<&Label>(), vec![Label("only")]);
    }

    #[cfg(feature = "metrics")]
    #[test]
    fn visits_are_counted() {
        let mut db = Database::new();
        db.visit::<Entity, _>(|_| {});
        db.query::<Entity>();
        assert_eq!(db.counters().get("visits"), 2);
    }
}
