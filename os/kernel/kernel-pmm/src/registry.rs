//! # Arena Registry
//!
//! Fixed-capacity table of registered arenas, kept sorted by ascending
//! priority. Arenas with equal priority keep their registration order.
//! Every allocation walks the table front to back, so lower priority values
//! are preferred.
//!
//! The table itself is not synchronized; it lives inside the
//! [`PhysicalMemoryManager`](crate::PhysicalMemoryManager) lock.

use crate::addresses::PhysicalAddress;
use crate::arena::Arena;
use crate::error::RegisterError;
use crate::page::{ArenaId, PageRef};
use kernel_info::memory::MAX_PMM_ARENAS;

pub struct ArenaList {
    arenas: [Option<Arena>; MAX_PMM_ARENAS],
    len: usize,
}

impl ArenaList {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            arenas: [const { None }; MAX_PMM_ARENAS],
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == MAX_PMM_ARENAS
    }

    /// Assigns the next [`ArenaId`] to `arena` and inserts it after every
    /// arena whose priority is lower than or equal to its own.
    ///
    /// # Errors
    /// [`RegisterError::RegistryFull`] if all slots are taken.
    #[allow(clippy::cast_possible_truncation)]
    pub fn insert(&mut self, mut arena: Arena) -> Result<ArenaId, RegisterError> {
        if self.is_full() {
            return Err(RegisterError::RegistryFull {
                capacity: MAX_PMM_ARENAS,
            });
        }

        // MAX_PMM_ARENAS fits into a u8.
        let id = ArenaId::new(self.len as u8);
        arena.set_id(id);

        let pos = self
            .iter()
            .position(|a| a.priority() > arena.priority())
            .unwrap_or(self.len);

        self.arenas[self.len] = Some(arena);
        self.arenas[pos..=self.len].rotate_right(1);
        self.len += 1;
        Ok(id)
    }

    /// Arenas in priority order.
    pub fn iter(&self) -> impl Iterator<Item = &Arena> {
        self.arenas[..self.len].iter().flatten()
    }

    /// Arenas in priority order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Arena> {
        self.arenas[..self.len].iter_mut().flatten()
    }

    /// Arena whose range contains `pa`.
    #[must_use]
    pub fn find_owning(&self, pa: PhysicalAddress) -> Option<&Arena> {
        self.iter().find(|a| a.contains(pa))
    }

    pub fn find_owning_mut(&mut self, pa: PhysicalAddress) -> Option<&mut Arena> {
        self.iter_mut().find(|a| a.contains(pa))
    }

    /// Arena that issued `page`.
    #[must_use]
    pub fn find_owning_by_page(&self, page: PageRef) -> Option<&Arena> {
        self.iter().find(|a| a.owns(page))
    }

    pub fn find_owning_by_page_mut(&mut self, page: PageRef) -> Option<&mut Arena> {
        self.iter_mut().find(|a| a.owns(page))
    }

    /// Descriptor handle of the frame containing `pa`, if any arena manages it.
    #[must_use]
    pub fn physical_to_page(&self, pa: PhysicalAddress) -> Option<PageRef> {
        self.find_owning(pa)?.page_at(pa)
    }

    /// Physical address of `page`, if some arena issued it.
    #[must_use]
    pub fn page_to_physical(&self, page: PageRef) -> Option<PhysicalAddress> {
        self.find_owning_by_page(page)?.address_of(page)
    }
}

impl Default for ArenaList {
    fn default() -> Self {
        Self::new()
    }
}
