//! Recoverable failures of the physical memory manager.
//!
//! Running out of pages is not an error; allocation calls report it as
//! `None` or a short count. Violated invariants (double free, misaligned
//! arenas) panic instead.

use crate::page::PageRef;

/// Registering an arena failed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("arena registry is full ({capacity} arenas)")]
    RegistryFull { capacity: usize },
    #[error("boot allocator could not provide {bytes} bytes for the page array")]
    OutOfBootMemory { bytes: usize },
    #[error("arena spans {pages} pages, more than a page descriptor can index")]
    TooManyPages { pages: u64 },
}

/// The page handed to [`Arena::free_one`](crate::arena::Arena::free_one)
/// belongs to a different arena.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
#[error("page {0} is not owned by this arena")]
pub struct NotOwned(pub PageRef);
