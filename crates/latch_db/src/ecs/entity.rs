//! Entity handle with generational index
//!
//! Entities are lightweight handles (8 bytes) that name a record in a
//! [`Database`](crate::ecs::Database). The generation counter makes handles to
//! erased or displaced records detectably stale.

use crate::ecs::record::StoredRecord;
use std::fmt;

/// Entity handle (generation-indexed for safety)
///
/// Format: [32-bit index | 32-bit generation]
/// - Index: slot in the entity table
/// - Generation: incremented whenever the slot's record leaves the table
///
/// Equality and ordering compare the referenced slot, so two handles are equal
/// exactly when they name the same record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity {
    index: u32,
    generation: u32,
}

impl Entity {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Pack into a 64-bit integer.
    pub fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }

    /// Unpack from [`Entity::to_bits`].
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

struct EntitySlot {
    generation: u32,
    record: Option<StoredRecord>,
    prev: Option<u32>,
    next: Option<u32>,
}

/// Slab of entity records threaded into a doubly linked list in creation
/// order. Slots are recycled, but iteration always follows the list, so a
/// reused slot is visited where its new record was appended.
#[derive(Default)]
pub(crate) struct EntityTable {
    slots: Vec<EntitySlot>,
    free: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl EntityTable {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Append a record and return the handle naming it.
    pub fn insert(&mut self, record: StoredRecord) -> Entity {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.slots.len()).expect("entity table overflow");
                self.slots.push(EntitySlot {
                    generation: 0,
                    record: None,
                    prev: None,
                    next: None,
                });
                index
            }
        };

        let prev = self.tail;
        let slot = &mut self.slots[index as usize];
        slot.record = Some(record);
        slot.prev = prev;
        slot.next = None;
        let generation = slot.generation;

        match prev {
            Some(tail) => self.slots[tail as usize].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;
        Entity::new(index, generation)
    }

    fn live_slot(&self, entity: Entity) -> Option<&EntitySlot> {
        self.slots
            .get(entity.index as usize)
            .filter(|slot| slot.generation == entity.generation && slot.record.is_some())
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.live_slot(entity).is_some()
    }

    pub fn get(&self, entity: Entity) -> Option<&StoredRecord> {
        self.live_slot(entity)?.record.as_ref()
    }

    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut StoredRecord> {
        self.slots
            .get_mut(entity.index as usize)
            .filter(|slot| slot.generation == entity.generation)?
            .record
            .as_mut()
    }

    /// Unlink a record and retire its handle.
    pub fn remove(&mut self, entity: Entity) -> Option<StoredRecord> {
        let slot = self
            .slots
            .get_mut(entity.index as usize)
            .filter(|slot| slot.generation == entity.generation)?;
        let record = slot.record.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        let (prev, next) = (slot.prev.take(), slot.next.take());

        match prev {
            Some(p) => self.slots[p as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n as usize].prev = prev,
            None => self.tail = prev,
        }
        self.free.push(entity.index);
        self.len -= 1;
        Some(record)
    }

    /// Live records in creation order.
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            table: self,
            cursor: self.head,
        }
    }

    /// Drop every record, retiring all outstanding handles.
    pub fn clear(&mut self) {
        let mut cursor = self.head;
        while let Some(index) = cursor {
            let slot = &mut self.slots[index as usize];
            cursor = slot.next.take();
            slot.prev = None;
            slot.record = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(index);
        }
        self.head = None;
        self.tail = None;
        self.len = 0;
    }
}

pub(crate) struct Iter<'a> {
    table: &'a EntityTable,
    cursor: Option<u32>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = (Entity, &'a StoredRecord);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = &self.table.slots[index as usize];
        self.cursor = slot.next;
        let record = slot.record.as_ref()?;
        Some((Entity::new(index, slot.generation), record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(table: &EntityTable) -> Vec<Entity> {
        table.iter().map(|(entity, _)| entity).collect()
    }

    #[test]
    fn bits_round_trip() {
        let entity = Entity::new(7, 3);
        assert_eq!(Entity::from_bits(entity.to_bits()), entity);
        assert_eq!(entity.to_string(), "7v3");
    }

    #[test]
    fn iteration_follows_creation_order() {
        let mut table = EntityTable::default();
        let a = table.insert(StoredRecord::default());
        let b = table.insert(StoredRecord::default());
        let c = table.insert(StoredRecord::default());

        assert!(table.remove(b).is_some());
        let d = table.insert(StoredRecord::default());

        // `d` reuses b's slot but is visited last.
        assert_eq!(d.index(), b.index());
        assert_eq!(collect(&table), vec![a, c, d]);
    }

    #[test]
    fn removed_handles_go_stale() {
        let mut table = EntityTable::default();
        let a = table.insert(StoredRecord::default());
        assert!(table.remove(a).is_some());

        assert!(!table.contains(a));
        assert!(table.get(a).is_none());
        assert!(table.remove(a).is_none());

        let b = table.insert(StoredRecord::default());
        assert_ne!(a, b);
        assert!(table.get_mut(a).is_none());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn removing_head_and_tail_relinks() {
        let mut table = EntityTable::with_capacity(4);
        let a = table.insert(StoredRecord::default());
        let b = table.insert(StoredRecord::default());
        let c = table.insert(StoredRecord::default());

        table.remove(a);
        table.remove(c);
        assert_eq!(collect(&table), vec![b]);

        let d = table.insert(StoredRecord::default());
        assert_eq!(collect(&table), vec![b, d]);
    }

    #[test]
    fn clear_retires_everything() {
        let mut table = EntityTable::default();
        let a = table.insert(StoredRecord::default());
        table.insert(StoredRecord::default());
        table.clear();

        assert_eq!(table.len(), 0);
        assert!(table.iter().next().is_none());
        assert!(!table.contains(a));

        let b = table.insert(StoredRecord::default());
        assert_eq!(collect(&table), vec![b]);
    }
}
