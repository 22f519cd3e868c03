//! Per-page bookkeeping.
//!
//! Every physical page frame managed by an [`Arena`](crate::arena::Arena) has
//! exactly one [`PageDescriptor`] in that arena's descriptor array. The
//! descriptor's identity is its index: `base + index * PAGE_SIZE` is the
//! frame's physical address.
//!
//! ### Descriptor layout
//!
//! | Bits    | Field   | Meaning |
//! |---------|---------|---------|
//! | 0..31   | `next`  | Index of the next free descriptor, or [`NIL`] |
//! | 31..62  | `prev`  | Index of the previous free descriptor, or [`NIL`] |
//! | 62      | `state` | [`PageState`] |
//! | 63      | -       | Reserved |
//!
//! The links are only meaningful while the page sits on its arena's free
//! list; allocated descriptors always carry [`NIL`] links.

use bitfield_struct::bitfield;
use core::fmt;

/// Link value meaning "no neighbor".
pub const NIL: u32 = (1 << 31) - 1;

/// Largest number of pages a single arena can track.
///
/// Every valid index must be distinguishable from [`NIL`].
pub const MAX_ARENA_PAGES: usize = NIL as usize;

/// Allocation state of a page frame.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum PageState {
    Free = 0,
    Allocated = 1,
}

impl PageState {
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        if bits & 1 == 0 {
            Self::Free
        } else {
            Self::Allocated
        }
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => f.write_str("free"),
            Self::Allocated => f.write_str("alloc"),
        }
    }
}

/// Packed per-page record; see the [module documentation](self).
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct PageDescriptor {
    #[bits(31, default = NIL)]
    pub(crate) next: u32,
    #[bits(31, default = NIL)]
    pub(crate) prev: u32,
    #[bits(1, default = PageState::Free)]
    pub state: PageState,
    #[bits(1)]
    __: u8,
}

impl PageDescriptor {
    #[inline]
    #[must_use]
    pub fn is_free(&self) -> bool {
        matches!(self.state(), PageState::Free)
    }

    /// Clears both free-list links.
    #[inline]
    pub(crate) fn unlink(&mut self) {
        self.set_next(NIL);
        self.set_prev(NIL);
    }
}

/// Identifier of a registered arena, assigned in registration order.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ArenaId(u8);

impl ArenaId {
    #[inline]
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self(id)
    }

    #[inline]
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self.0
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle to one page descriptor: the owning arena plus the index into its
/// descriptor array.
///
/// A `PageRef` is what the allocation façade hands out and takes back. It
/// does not borrow the arena; it is translated back into a descriptor under
/// the registry lock.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct PageRef {
    arena: ArenaId,
    index: u32,
}

impl PageRef {
    #[inline]
    #[must_use]
    pub const fn new(arena: ArenaId, index: u32) -> Self {
        Self { arena, index }
    }

    #[inline]
    #[must_use]
    pub const fn arena(self) -> ArenaId {
        self.arena
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.arena, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_descriptor_is_free_and_unlinked() {
        let d = PageDescriptor::new();
        assert!(d.is_free());
        assert_eq!(d.next(), NIL);
        assert_eq!(d.prev(), NIL);
        assert_eq!(d, PageDescriptor::default());
    }

    #[test]
    fn fields_do_not_overlap() {
        let mut d = PageDescriptor::new()
            .with_next(NIL - 1)
            .with_prev(0)
            .with_state(PageState::Allocated);
        assert_eq!(d.next(), NIL - 1);
        assert_eq!(d.prev(), 0);
        assert_eq!(d.state(), PageState::Allocated);

        d.unlink();
        assert_eq!(d.next(), NIL);
        assert_eq!(d.prev(), NIL);
        assert!(!d.is_free());
    }

    #[test]
    fn page_ref_display() {
        let page = PageRef::new(ArenaId::new(2), 17);
        assert_eq!(page.index(), 17);
        assert_eq!(format!("{page}"), "#2[17]");
    }
}
