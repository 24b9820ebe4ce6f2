//! Paged, per-type payload storage.
//!
//! Every component type gets its own [`Arena`]. Rows are grouped into
//! fixed-size pages so stored values never move once written, and vacated
//! rows are reused through an intrusive free list.

mod arena;
mod page;

pub use arena::{Arena, ErasedArena};
pub(crate) use arena::new_arena;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error("row {index} is out of bounds for page of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("page {page} has not been allocated")]
    PageMissing { page: usize },
    #[error("row {index} is already occupied")]
    Occupied { index: usize },
    #[error("row {index} is vacant")]
    Vacant { index: usize },
    #[error("payload is not a `{expected}`")]
    PayloadMismatch { expected: &'static str },
}
