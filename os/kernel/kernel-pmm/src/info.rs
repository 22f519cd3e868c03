//! Arena registration records and allocation flags.

use crate::addresses::PhysicalAddress;
use bitfield_struct::bitfield;

/// Capabilities of a physical memory arena.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct ArenaFlags {
    /// The arena is covered by the kernel's direct map, so its pages can be
    /// reached through a kernel virtual address.
    pub kmap: bool,
    #[bits(31)]
    __: u32,
}

impl ArenaFlags {
    /// Arena that is part of the kernel direct map.
    pub const KMAP: Self = Self::new().with_kmap(true);
}

/// Restrictions on which arenas an allocation may be served from.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct AllocFlags {
    /// Only consider arenas flagged [`ArenaFlags::kmap`].
    pub kmap: bool,
    #[bits(31)]
    __: u32,
}

impl AllocFlags {
    /// No restriction; every arena is eligible.
    pub const ANY: Self = Self::new();

    /// Only arenas that are part of the kernel direct map.
    pub const KMAP: Self = Self::new().with_kmap(true);

    /// Whether an arena with `flags` may serve a request made with `self`.
    #[inline]
    #[must_use]
    pub const fn admits(self, flags: ArenaFlags) -> bool {
        !self.kmap() || flags.kmap()
    }
}

/// Description of one contiguous range of physical memory, supplied by the
/// platform at boot.
///
/// `base` and `size` must be page aligned and `size` must be non-zero.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ArenaInfo {
    pub name: &'static str,
    pub base: PhysicalAddress,
    pub size: u64,
    pub flags: ArenaFlags,
    /// Lower values are tried first.
    pub priority: u32,
}

impl ArenaInfo {
    #[must_use]
    pub const fn new(
        name: &'static str,
        base: PhysicalAddress,
        size: u64,
        flags: ArenaFlags,
        priority: u32,
    ) -> Self {
        Self {
            name,
            base,
            size,
            flags,
            priority,
        }
    }
}
