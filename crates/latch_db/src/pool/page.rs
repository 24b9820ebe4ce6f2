use super::ArenaError;
use std::ptr::NonNull;

/// One arena row: either a live value or a link in the free list.
pub(crate) enum Entry<T> {
    Occupied(T),
    Vacant { next_free: Option<usize> },
}

/// Fixed-capacity block of rows. The backing vector is reserved once and
/// never grows past `capacity`, so rows never relocate.
pub(crate) struct Page<T> {
    entries: Vec<Entry<T>>,
    capacity: usize,
}

impl<T> Page<T> {
    pub fn with_capacity(rows: usize) -> Self {
        Self {
            entries: Vec::with_capacity(rows),
            capacity: rows,
        }
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.entries.len() == self.capacity
    }

    /// Append a value to the next untouched row.
    #[inline]
    pub fn push(&mut self, value: T) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        let idx = self.entries.len();
        self.entries.push(Entry::Occupied(value));
        Some(idx)
    }

    /// Refill a vacant row, returning the free-list link it held.
    pub fn fill(&mut self, idx: usize, value: T) -> Result<Option<usize>, ArenaError> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(idx)
            .ok_or(ArenaError::IndexOutOfBounds { index: idx, len })?;
        match *entry {
            Entry::Vacant { next_free } => {
                *entry = Entry::Occupied(value);
                Ok(next_free)
            }
            Entry::Occupied(_) => Err(ArenaError::Occupied { index: idx }),
        }
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Result<&T, ArenaError> {
        match self.entries.get(idx) {
            Some(Entry::Occupied(value)) => Ok(value),
            Some(Entry::Vacant { .. }) => Err(ArenaError::Vacant { index: idx }),
            None => Err(ArenaError::IndexOutOfBounds {
                index: idx,
                len: self.entries.len(),
            }),
        }
    }

    #[inline]
    pub fn get_mut(&mut self, idx: usize) -> Result<&mut T, ArenaError> {
        let len = self.entries.len();
        match self.entries.get_mut(idx) {
            Some(Entry::Occupied(value)) => Ok(value),
            Some(Entry::Vacant { .. }) => Err(ArenaError::Vacant { index: idx }),
            None => Err(ArenaError::IndexOutOfBounds { index: idx, len }),
        }
    }

    /// Pointer to the value at `idx`. Only that row is reborrowed, so
    /// references already handed out for other rows stay usable.
    ///
    /// # Safety
    /// `this` must be valid for writes and no reference to row `idx` may be live.
    pub unsafe fn value_ptr(this: *mut Self, idx: usize) -> Result<NonNull<T>, ArenaError> {
        let entries = unsafe { &mut (*this).entries };
        let len = entries.len();
        if idx >= len {
            return Err(ArenaError::IndexOutOfBounds { index: idx, len });
        }
        // `as_mut_ptr` never materializes a reference to the whole slice.
        match unsafe { &mut *entries.as_mut_ptr().add(idx) } {
            Entry::Occupied(value) => Ok(NonNull::from(value)),
            Entry::Vacant { .. } => Err(ArenaError::Vacant { index: idx }),
        }
    }

    /// Move a value out, leaving the row vacant and linked to `next_free`.
    pub fn vacate(&mut self, idx: usize, next_free: Option<usize>) -> Result<T, ArenaError> {
        let len = self.entries.len();
        let entry = self
            .entries
            .get_mut(idx)
            .ok_or(ArenaError::IndexOutOfBounds { index: idx, len })?;
        if let Entry::Vacant { .. } = entry {
            return Err(ArenaError::Vacant { index: idx });
        }
        match std::mem::replace(entry, Entry::Vacant { next_free }) {
            Entry::Occupied(value) => Ok(value),
            Entry::Vacant { .. } => unreachable!("vacant rows are rejected above"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_stops_at_capacity() {
        let mut page = Page::with_capacity(2);
        assert_eq!(page.push('a'), Some(0));
        assert_eq!(page.push('b'), Some(1));
        assert_eq!(page.push('c'), None);
        assert!(page.is_full());
    }

    #[test]
    fn vacate_then_fill_reuses_row() {
        let mut page = Page::with_capacity(4);
        page.push(10).unwrap();
        page.push(20).unwrap();

        assert_eq!(page.vacate(0, Some(7)).unwrap(), 10);
        assert_eq!(page.get(0), Err(ArenaError::Vacant { index: 0 }));
        assert_eq!(*page.get(1).unwrap(), 20);

        assert_eq!(page.fill(0, 30).unwrap(), Some(7));
        assert_eq!(*page.get(0).unwrap(), 30);
        assert_eq!(page.fill(1, 40), Err(ArenaError::Occupied { index: 1 }));
    }

    #[test]
    fn out_of_range_rows_are_reported() {
        let mut page: Page<u8> = Page::with_capacity(4);
        assert_eq!(
            page.get_mut(3),
            Err(ArenaError::IndexOutOfBounds { index: 3, len: 0 })
        );
    }
}
