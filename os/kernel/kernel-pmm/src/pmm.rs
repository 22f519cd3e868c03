//! # Physical Memory Manager
//!
//! [`PhysicalMemoryManager`] is the allocation façade: the arena registry
//! behind one spin lock, plus the fallthrough and flag-filtering policy that
//! decides which arena serves a request.
//!
//! Every operation holds the lock for its entire body and returns as soon as
//! it knows the answer; exhaustion is reported as `None` or a short count,
//! never waited out.
//!
//! ## Example
//! ```rust
//! use kernel_pmm::boot_alloc::BumpBootAlloc;
//! use kernel_pmm::{AllocFlags, ArenaFlags, ArenaInfo, PhysicalAddress, PhysicalMemoryManager};
//!
//! static PMM: PhysicalMemoryManager = PhysicalMemoryManager::new();
//!
//! let mut boot = BumpBootAlloc::new(Box::leak(vec![0u8; 4096].into_boxed_slice()));
//! let info = ArenaInfo::new("low", PhysicalAddress::new(0x10_0000), 16 * 4096, ArenaFlags::KMAP, 0);
//! PMM.add_arena(info, &mut boot).unwrap();
//!
//! let (page, pa) = PMM.alloc_page(AllocFlags::ANY).unwrap();
//! assert_eq!(pa, PhysicalAddress::new(0x10_0000));
//! assert_eq!(PMM.free_page_count(), 15);
//! assert_eq!(PMM.free_page(page), 1);
//! ```

use crate::addresses::PhysicalAddress;
use crate::arena::Arena;
use crate::boot_alloc::BootAlloc;
use crate::error::RegisterError;
use crate::info::{AllocFlags, ArenaInfo};
use crate::page::{ArenaId, PageRef};
use crate::registry::ArenaList;
use core::iter;
use kernel_info::memory::{MAX_PMM_ARENAS, PAGE_SHIFT, PAGE_SIZE};
use kernel_sync::SpinMutex;
use log::{debug, trace, warn};

pub struct PhysicalMemoryManager {
    arenas: SpinMutex<ArenaList>,
}

impl PhysicalMemoryManager {
    /// Creates a manager without any arenas; usable in `static` initializers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            arenas: SpinMutex::new(ArenaList::new()),
        }
    }

    /// Builds an arena for `info`, reserving its descriptor array from
    /// `boot`, and registers it.
    ///
    /// The descriptor array is built before the lock is taken; the arena only
    /// becomes visible to allocations once it is fully initialized.
    ///
    /// # Errors
    /// See [`RegisterError`].
    ///
    /// # Panics
    /// If `info` describes an empty, unaligned or wrapping range.
    pub fn add_arena(
        &self,
        info: ArenaInfo,
        boot: &mut impl BootAlloc,
    ) -> Result<ArenaId, RegisterError> {
        if self.arenas.lock().is_full() {
            return Err(RegisterError::RegistryFull {
                capacity: MAX_PMM_ARENAS,
            });
        }

        let mut arena = Arena::new(info);
        arena.allocate_array(boot)?;
        self.register(arena)
    }

    /// Registers an arena whose descriptor array is already allocated.
    ///
    /// # Errors
    /// [`RegisterError::RegistryFull`] if all slots are taken.
    ///
    /// # Panics
    /// If the arena has no descriptor array.
    pub fn register(&self, arena: Arena) -> Result<ArenaId, RegisterError> {
        assert!(
            arena.page_count() > 0,
            "arena '{}' registered without a page array",
            arena.name()
        );

        let (name, base, size, priority, pages) = (
            arena.name(),
            arena.base(),
            arena.size(),
            arena.priority(),
            arena.page_count(),
        );
        let id = self.arenas.lock().insert(arena)?;

        debug!(
            "registered arena {id} '{name}': base {base} size {size:#x} priority {priority}, {pages} pages"
        );
        Ok(id)
    }

    /// Allocates a single page from the first eligible arena with a free page.
    pub fn alloc_page(&self, flags: AllocFlags) -> Option<(PageRef, PhysicalAddress)> {
        trace!("alloc_page: flags {:#x}", flags.into_bits());

        let mut arenas = self.arenas.lock();
        let page = arenas
            .iter_mut()
            .filter(|a| flags.admits(a.flags()))
            .find_map(Arena::allocate_one);

        if page.is_none() {
            trace!("alloc_page: failed to allocate page");
        }
        page
    }

    /// Allocates up to `count` pages from a single arena and appends them to
    /// `pages`.
    ///
    /// The first eligible arena that yields any page serves the whole request,
    /// even if it comes up short; the remainder is not topped up from other
    /// arenas. Returns the number of pages allocated.
    pub fn alloc_pages(
        &self,
        count: usize,
        flags: AllocFlags,
        pages: &mut impl Extend<PageRef>,
    ) -> usize {
        trace!("alloc_pages: count {count}, flags {:#x}", flags.into_bits());
        if count == 0 {
            return 0;
        }

        let mut arenas = self.arenas.lock();
        for arena in arenas.iter_mut().filter(|a| flags.admits(a.flags())) {
            let allocated = arena.allocate_many(count, pages);
            if allocated > 0 {
                return allocated;
            }
        }

        trace!("alloc_pages: failed to allocate {count} pages");
        0
    }

    /// Allocates the specific pages `[address, address + count * PAGE_SIZE)`,
    /// `address` rounded down to a page boundary, and appends them to `pages`
    /// in ascending address order.
    ///
    /// Within each arena the walk stops at the first page that is not free.
    /// Returns the number of pages allocated.
    pub fn alloc_range(
        &self,
        address: PhysicalAddress,
        count: usize,
        pages: &mut impl Extend<PageRef>,
    ) -> usize {
        trace!("alloc_range: address {address}, count {count}");
        if count == 0 {
            return 0;
        }

        let mut address = address.align_down(PAGE_SIZE);
        let mut allocated = 0;

        let mut arenas = self.arenas.lock();
        for arena in arenas.iter_mut() {
            while allocated < count && arena.contains(address) {
                let Some(page) = arena.allocate_specific(address) else {
                    break;
                };
                pages.extend(iter::once(page));
                allocated += 1;

                match address.checked_add(PAGE_SIZE) {
                    Some(next) => address = next,
                    None => return allocated,
                }
            }

            if allocated == count {
                break;
            }
        }

        if allocated < count {
            trace!("alloc_range: only {allocated} of {count} pages at {address}");
        }
        allocated
    }

    /// Allocates `count` physically contiguous pages whose base is aligned to
    /// `2^alignment_log2` (at least one page) from a single eligible arena and
    /// appends them to `pages` in ascending address order.
    ///
    /// Returns the base address of the run. On failure nothing is allocated.
    pub fn alloc_contiguous(
        &self,
        count: usize,
        flags: AllocFlags,
        alignment_log2: u32,
        pages: &mut impl Extend<PageRef>,
    ) -> Option<PhysicalAddress> {
        let alignment_log2 = alignment_log2.max(PAGE_SHIFT);
        trace!(
            "alloc_contiguous: count {count}, flags {:#x}, align {alignment_log2}",
            flags.into_bits()
        );
        if count == 0 {
            return None;
        }

        let mut arenas = self.arenas.lock();
        let base = arenas
            .iter_mut()
            .filter(|a| flags.admits(a.flags()))
            .find_map(|a| a.allocate_contiguous(count, alignment_log2, pages));

        if base.is_none() {
            trace!("alloc_contiguous: no run of {count} pages");
        }
        base
    }

    /// Returns every page in `pages` to its arena. Pages no arena issued are
    /// skipped. Returns the number of pages freed.
    ///
    /// # Panics
    /// If a page is already free.
    pub fn free(&self, pages: impl IntoIterator<Item = PageRef>) -> usize {
        trace!("free");

        let mut arenas = self.arenas.lock();
        let mut freed = 0;
        for page in pages {
            match arenas.find_owning_by_page_mut(page).map(|a| a.free_one(page)) {
                Some(Ok(())) => freed += 1,
                _ => warn!("free: page {page} belongs to no arena, skipped"),
            }
        }
        freed
    }

    /// Returns a single page; `1` if it was freed, `0` if no arena owns it.
    pub fn free_page(&self, page: PageRef) -> usize {
        self.free(iter::once(page))
    }

    /// Descriptor handle of the frame containing `pa`.
    #[must_use]
    pub fn physical_to_page(&self, pa: PhysicalAddress) -> Option<PageRef> {
        self.arenas.lock().physical_to_page(pa)
    }

    /// Physical address of the frame behind `page`.
    #[must_use]
    pub fn page_to_physical(&self, page: PageRef) -> Option<PhysicalAddress> {
        self.arenas.lock().page_to_physical(page)
    }

    #[must_use]
    pub fn free_page_count(&self) -> usize {
        self.arenas.lock().iter().map(Arena::free_count).sum()
    }

    #[must_use]
    pub fn total_page_count(&self) -> usize {
        self.arenas.lock().iter().map(Arena::page_count).sum()
    }

    #[must_use]
    pub fn arena_count(&self) -> usize {
        self.arenas.lock().len()
    }

    /// Calls `f` for every arena in priority order while holding the lock.
    ///
    /// `f` must not call back into the manager.
    pub fn for_each_arena(&self, f: impl FnMut(&Arena)) {
        self.arenas.lock().iter().for_each(f);
    }

    /// Logs every arena's report in priority order.
    pub fn dump(&self, verbose: bool) {
        self.for_each_arena(|arena| arena.dump(verbose));
    }
}

impl Default for PhysicalMemoryManager {
    fn default() -> Self {
        Self::new()
    }
}
