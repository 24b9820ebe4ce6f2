use super::page::Page;
use super::ArenaError;
use std::any::Any;
use std::ptr::NonNull;

/// Paged per-type storage for component payloads.
///
/// Rows are addressed by a global index that stays valid until the row is
/// removed; removal never moves other rows. Vacated rows are threaded into a
/// free list and reused before new rows are appended. Pages are fixed size,
/// so growth allocates a new page instead of reallocating existing ones.
pub struct Arena<T> {
    rows_per_page: usize,
    shift: u32,
    mask: usize,
    pages: Vec<Page<T>>,
    free_head: Option<usize>,
    len: usize,
}

impl<T> Arena<T> {
    /// `rows_per_page` must be a non-zero power of two.
    pub fn with_rows_per_page(rows_per_page: usize) -> Self {
        assert!(
            rows_per_page.is_power_of_two(),
            "rows_per_page must be a non-zero power of two, got {rows_per_page}"
        );
        Self {
            rows_per_page,
            shift: rows_per_page.trailing_zeros(),
            mask: rows_per_page - 1,
            pages: Vec::new(),
            free_head: None,
            len: 0,
        }
    }

    #[inline]
    pub fn rows_per_page(&self) -> usize {
        self.rows_per_page
    }

    /// Number of live values.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    fn page_of(&self, gidx: usize) -> usize {
        gidx >> self.shift
    }

    #[inline]
    fn local_of(&self, gidx: usize) -> usize {
        gidx & self.mask
    }

    fn page(&self, gidx: usize) -> Result<&Page<T>, ArenaError> {
        let page = self.page_of(gidx);
        self.pages.get(page).ok_or(ArenaError::PageMissing { page })
    }

    fn page_mut(&mut self, gidx: usize) -> Result<&mut Page<T>, ArenaError> {
        let page = self.page_of(gidx);
        self.pages.get_mut(page).ok_or(ArenaError::PageMissing { page })
    }

    /// Store a value and return its stable index.
    pub fn insert(&mut self, value: T) -> usize {
        if let Some(gidx) = self.free_head {
            let local = self.local_of(gidx);
            let next = self
                .page_mut(gidx)
                .and_then(|page| page.fill(local, value))
                .expect("free list must point at a vacant row");
            self.free_head = next;
            self.len += 1;
            return gidx;
        }

        if self.pages.last().map_or(true, Page::is_full) {
            self.pages.push(Page::with_capacity(self.rows_per_page));
        }
        let pid = self.pages.len() - 1;
        let local = self.pages[pid]
            .push(value)
            .expect("page should have capacity");
        self.len += 1;
        (pid << self.shift) | local
    }

    pub fn get(&self, gidx: usize) -> Result<&T, ArenaError> {
        let local = self.local_of(gidx);
        self.page(gidx)?.get(local)
    }

    pub fn get_mut(&mut self, gidx: usize) -> Result<&mut T, ArenaError> {
        let local = self.local_of(gidx);
        self.page_mut(gidx)?.get_mut(local)
    }

    /// Pointer to the value at `gidx` that does not borrow the arena's other
    /// rows. Used by visits that hand out many `&mut T` from one arena.
    ///
    /// # Safety
    /// `this` must be valid for writes and no reference to row `gidx` may be live.
    pub(crate) unsafe fn value_ptr(
        this: *mut Self,
        gidx: usize,
    ) -> Result<NonNull<T>, ArenaError> {
        let arena = unsafe { &mut *this };
        let local = arena.local_of(gidx);
        let page = arena.page_of(gidx);
        if page >= arena.pages.len() {
            return Err(ArenaError::PageMissing { page });
        }
        unsafe { Page::value_ptr(arena.pages.as_mut_ptr().add(page), local) }
    }

    /// Swap in a new value at an occupied row, returning the old one.
    pub fn replace(&mut self, gidx: usize, value: T) -> Result<T, ArenaError> {
        Ok(std::mem::replace(self.get_mut(gidx)?, value))
    }

    /// Move a value out of the arena and recycle its row.
    pub fn remove(&mut self, gidx: usize) -> Result<T, ArenaError> {
        let local = self.local_of(gidx);
        let next_free = self.free_head;
        let value = self.page_mut(gidx)?.vacate(local, next_free)?;
        self.free_head = Some(gidx);
        self.len -= 1;
        Ok(value)
    }

    /// Drop every value at once and release all pages.
    pub fn clear(&mut self) {
        self.pages.clear();
        self.free_head = None;
        self.len = 0;
    }
}

/// Object-safe view of an [`Arena`] whose element type has been erased.
///
/// The database keeps one arena per component id behind this trait and
/// recovers the typed arena with a checked downcast through [`ErasedArena::as_any_mut`].
pub trait ErasedArena {
    /// Name of the element type, for diagnostics.
    fn type_name(&self) -> &'static str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the value at `index`.
    fn remove(&mut self, index: usize) -> Result<(), ArenaError>;

    /// Move the value at `index` out as a boxed payload.
    fn take_boxed(&mut self, index: usize) -> Result<Box<dyn Any>, ArenaError>;

    /// Store a boxed payload of the arena's element type.
    fn insert_boxed(&mut self, value: Box<dyn Any>) -> Result<usize, ArenaError>;

    /// Overwrite the value at `index` with a boxed payload.
    fn replace_boxed(&mut self, index: usize, value: Box<dyn Any>) -> Result<(), ArenaError>;

    fn clear(&mut self);

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> ErasedArena for Arena<T> {
    fn type_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn len(&self) -> usize {
        Arena::len(self)
    }

    fn remove(&mut self, index: usize) -> Result<(), ArenaError> {
        Arena::remove(self, index).map(drop)
    }

    fn take_boxed(&mut self, index: usize) -> Result<Box<dyn Any>, ArenaError> {
        Ok(Box::new(Arena::remove(self, index)?))
    }

    fn insert_boxed(&mut self, value: Box<dyn Any>) -> Result<usize, ArenaError> {
        let value = downcast_payload::<T>(value)?;
        Ok(self.insert(value))
    }

    fn replace_boxed(&mut self, index: usize, value: Box<dyn Any>) -> Result<(), ArenaError> {
        let value = downcast_payload::<T>(value)?;
        self.replace(index, value).map(drop)
    }

    fn clear(&mut self) {
        Arena::clear(self);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn downcast_payload<T: Any>(value: Box<dyn Any>) -> Result<T, ArenaError> {
    value
        .downcast::<T>()
        .map(|boxed| *boxed)
        .map_err(|_| ArenaError::PayloadMismatch {
            expected: std::any::type_name::<T>(),
        })
}

/// Factory stored in component metadata so an arena can be created for a
/// type that is only known through a type-erased payload.
pub(crate) fn new_arena<T: Any>(rows_per_page: usize) -> Box<dyn ErasedArena> {
    Box::new(Arena::<T>::with_rows_per_page(rows_per_page))
}
