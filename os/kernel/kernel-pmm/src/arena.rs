//! # Physical Memory Arena
//!
//! An [`Arena`] owns one contiguous, page-aligned range of physical memory
//! `[base, base + size)` together with one [`PageDescriptor`] per page frame.
//! Free descriptors are threaded onto a doubly linked free list whose links
//! are *indices* into the descriptor array, so membership and address
//! translation are plain bounds-checked index arithmetic.
//!
//! ```text
//!   base                                              base + size
//!    │  page 0  │  page 1  │  page 2  │   ...   │  page n-1  │
//!    └────┬─────┴────┬─────┴────┬─────┴─────────┴─────┬──────┘
//!   pages[0]    pages[1]    pages[2]      ...     pages[n-1]
//!
//!   free_head ─► pages[i] ⇄ pages[j] ⇄ ... ⇄ pages[k] ─► NIL
//! ```
//!
//! An arena knows nothing about other arenas and does no locking; the
//! [`PhysicalMemoryManager`](crate::PhysicalMemoryManager) serializes every
//! call behind its single lock.

use crate::addresses::PhysicalAddress;
use crate::boot_alloc::BootAlloc;
use crate::error::{NotOwned, RegisterError};
use crate::info::{ArenaFlags, ArenaInfo};
use crate::page::{ArenaId, MAX_ARENA_PAGES, NIL, PageDescriptor, PageRef, PageState};
use core::alloc::Layout;
use core::{fmt, iter};
use kernel_info::memory::{PAGE_SHIFT, PAGE_SIZE};
use log::{debug, info};

pub struct Arena {
    id: ArenaId,
    info: ArenaInfo,
    pages: &'static mut [PageDescriptor],
    free_head: u32,
    free_count: usize,
}

/// Converts a descriptor index into a free-list link.
#[inline]
#[allow(clippy::cast_possible_truncation)]
const fn link(index: usize) -> u32 {
    debug_assert!(index < MAX_ARENA_PAGES);
    index as u32
}

impl Arena {
    /// Creates an arena without a page array; call
    /// [`allocate_array`](Self::allocate_array) before allocating from it.
    ///
    /// # Panics
    /// If `info.base` or `info.size` is not page aligned, if `info.size` is
    /// zero, or if the range wraps around the physical address space.
    #[must_use]
    pub fn new(info: ArenaInfo) -> Self {
        assert!(info.size > 0, "arena '{}' is empty", info.name);
        assert!(
            info.base.is_aligned(PAGE_SIZE),
            "arena '{}' base {} is not page aligned",
            info.name,
            info.base
        );
        assert!(
            info.size.is_multiple_of(PAGE_SIZE),
            "arena '{}' size {:#x} is not page aligned",
            info.name,
            info.size
        );
        assert!(
            info.base.checked_add(info.size).is_some(),
            "arena '{}' wraps around the physical address space",
            info.name
        );

        Self {
            id: ArenaId::default(),
            info,
            pages: &mut [],
            free_head: NIL,
            free_count: 0,
        }
    }

    /// Reserves the descriptor array from the boot allocator and puts every
    /// page on the free list in ascending address order.
    ///
    /// # Errors
    /// [`RegisterError::TooManyPages`] if the arena cannot be indexed by a
    /// free-list link, [`RegisterError::OutOfBootMemory`] if the boot
    /// allocator is exhausted.
    ///
    /// # Panics
    /// If the array was already allocated.
    pub fn allocate_array(&mut self, boot: &mut impl BootAlloc) -> Result<(), RegisterError> {
        assert!(
            self.pages.is_empty(),
            "page array of arena '{}' allocated twice",
            self.info.name
        );

        let pages = self.info.size >> PAGE_SHIFT;
        let count = usize::try_from(pages)
            .ok()
            .filter(|&count| count <= MAX_ARENA_PAGES)
            .ok_or(RegisterError::TooManyPages { pages })?;
        let layout = Layout::array::<PageDescriptor>(count)
            .map_err(|_| RegisterError::TooManyPages { pages })?;
        let storage = boot
            .reserve(layout)
            .ok_or(RegisterError::OutOfBootMemory {
                bytes: layout.size(),
            })?
            .cast::<PageDescriptor>();

        for index in 0..count {
            let prev = index.checked_sub(1).map_or(NIL, link);
            let next = if index + 1 < count { link(index + 1) } else { NIL };
            let descriptor = PageDescriptor::new().with_prev(prev).with_next(next);

            // SAFETY: the block holds `count` descriptors per the `BootAlloc` contract.
            unsafe { storage.add(index).write(descriptor) };
        }

        // SAFETY: every element was initialized above; `BootAlloc` grants
        // exclusive ownership of the block for the kernel's lifetime.
        self.pages = unsafe { core::slice::from_raw_parts_mut(storage.as_ptr(), count) };
        self.free_head = 0;
        self.free_count = count;

        debug!(
            "arena '{}': {} pages, page array at {:p} ({} bytes)",
            self.info.name,
            count,
            storage,
            layout.size()
        );
        Ok(())
    }

    #[inline]
    #[must_use]
    pub const fn id(&self) -> ArenaId {
        self.id
    }

    pub(crate) const fn set_id(&mut self, id: ArenaId) {
        self.id = id;
    }

    #[inline]
    #[must_use]
    pub const fn info(&self) -> &ArenaInfo {
        &self.info
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.info.name
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> PhysicalAddress {
        self.info.base
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.info.size
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> ArenaFlags {
        self.info.flags
    }

    #[inline]
    #[must_use]
    pub const fn priority(&self) -> u32 {
        self.info.priority
    }

    /// Number of descriptors; zero until the page array is allocated.
    #[inline]
    #[must_use]
    pub const fn page_count(&self) -> usize {
        self.pages.len()
    }

    #[inline]
    #[must_use]
    pub const fn free_count(&self) -> usize {
        self.free_count
    }

    /// Whether `pa` lies in `[base, base + size)`.
    #[inline]
    #[must_use]
    pub const fn contains(&self, pa: PhysicalAddress) -> bool {
        pa.as_u64() >= self.info.base.as_u64() && pa.as_u64() - self.info.base.as_u64() < self.info.size
    }

    /// Whether `page` refers to a descriptor of this arena.
    #[inline]
    #[must_use]
    pub const fn owns(&self, page: PageRef) -> bool {
        page.arena().as_u8() == self.id.as_u8() && page.index() < self.pages.len()
    }

    /// Physical address of the frame described by `page`.
    #[inline]
    #[must_use]
    pub fn address_of(&self, page: PageRef) -> Option<PhysicalAddress> {
        self.owns(page).then(|| self.address_at(page.index()))
    }

    /// Descriptor handle for the frame containing `pa`.
    #[inline]
    #[must_use]
    pub fn page_at(&self, pa: PhysicalAddress) -> Option<PageRef> {
        if !self.contains(pa) {
            return None;
        }
        let index = self.index_of(pa);
        (index < self.pages.len()).then(|| self.page_ref(index))
    }

    #[inline]
    #[must_use]
    pub fn page_state(&self, page: PageRef) -> Option<PageState> {
        self.owns(page).then(|| self.pages[page.index()].state())
    }

    /// Takes the page at the head of the free list. O(1).
    pub fn allocate_one(&mut self) -> Option<(PageRef, PhysicalAddress)> {
        if self.free_head == NIL {
            return None;
        }
        let index = self.free_head as usize;
        self.take(index);
        Some((self.page_ref(index), self.address_at(index)))
    }

    /// Takes the page frame containing `pa`, provided it is free.
    pub fn allocate_specific(&mut self, pa: PhysicalAddress) -> Option<PageRef> {
        let page = self.page_at(pa)?;
        if !self.pages[page.index()].is_free() {
            return None;
        }
        self.take(page.index());
        Some(page)
    }

    /// Takes up to `count` pages in free-list order and appends them to
    /// `pages`. Returns how many were taken; fewer than `count` only if this
    /// arena ran out.
    pub fn allocate_many(&mut self, count: usize, pages: &mut impl Extend<PageRef>) -> usize {
        let mut allocated = 0;
        while allocated < count {
            let Some((page, _)) = self.allocate_one() else {
                break;
            };
            pages.extend(iter::once(page));
            allocated += 1;
        }
        allocated
    }

    /// Finds the lowest `2^alignment_log2`-aligned run of `count` free pages,
    /// takes all of them and appends them to `pages` in ascending address
    /// order. Returns the run's base address.
    ///
    /// Alignment is relative to the physical address, not to the arena base.
    /// Alignments below one page are treated as page alignment. If no run
    /// exists the arena is left untouched.
    pub fn allocate_contiguous(
        &mut self,
        count: usize,
        alignment_log2: u32,
        pages: &mut impl Extend<PageRef>,
    ) -> Option<PhysicalAddress> {
        let page_count = self.pages.len();
        if count == 0 || count > self.free_count {
            return None;
        }

        let alignment = 1u64.checked_shl(alignment_log2.max(PAGE_SHIFT))?;
        let first = self.info.base.align_up(alignment)?;
        if !self.contains(first) {
            return None;
        }

        let aligned_offset = self.index_of(first);
        let stride = usize::try_from(alignment >> PAGE_SHIFT).ok()?;

        let mut start = aligned_offset;
        while let Some(end) = start.checked_add(count).filter(|&end| end <= page_count) {
            if let Some(busy) = self.pages[start..end].iter().rposition(|d| !d.is_free()) {
                // Any aligned start at or before the busy page would include it.
                let skip = (start - aligned_offset + busy + 1).checked_next_multiple_of(stride)?;
                start = aligned_offset.checked_add(skip)?;
                continue;
            }

            for index in start..end {
                self.take(index);
                pages.extend(iter::once(self.page_ref(index)));
            }
            return Some(self.address_at(start));
        }

        None
    }

    /// Returns `page` to the free list.
    ///
    /// # Errors
    /// [`NotOwned`] if the page belongs to a different arena.
    ///
    /// # Panics
    /// If the page is already free (double free).
    pub fn free_one(&mut self, page: PageRef) -> Result<(), NotOwned> {
        if !self.owns(page) {
            return Err(NotOwned(page));
        }

        let index = page.index();
        assert!(
            !self.pages[index].is_free(),
            "double free of page {page} at {} in arena '{}'",
            self.address_at(index),
            self.info.name
        );

        self.pages[index].set_state(PageState::Free);
        self.push_free(index);
        self.free_count += 1;
        Ok(())
    }

    /// Walks the free list and counts its entries. O(n); meant for
    /// consistency checks against [`free_count`](Self::free_count).
    #[must_use]
    pub fn free_list_len(&self) -> usize {
        let mut len = 0;
        let mut cursor = self.free_head;
        while cursor != NIL {
            let descriptor = &self.pages[cursor as usize];
            debug_assert!(descriptor.is_free(), "allocated page on the free list");
            len += 1;
            debug_assert!(len <= self.pages.len(), "cycle in free list");
            cursor = descriptor.next();
        }
        len
    }

    /// Maximal runs of free pages as `[start, end)` address pairs, ascending.
    pub fn free_ranges(&self) -> impl Iterator<Item = (PhysicalAddress, PhysicalAddress)> + '_ {
        let mut cursor = 0;
        iter::from_fn(move || {
            let start = cursor + self.pages[cursor..].iter().position(PageDescriptor::is_free)?;
            let end = self.pages[start..]
                .iter()
                .position(|d| !d.is_free())
                .map_or(self.pages.len(), |run| start + run);
            cursor = end;
            Some((self.address_at(start), self.address_at(end)))
        })
    }

    /// Logs the arena's metadata and free ranges; with `verbose`, also the
    /// state of every page.
    pub fn dump(&self, verbose: bool) {
        info!(
            "arena {} '{}': base {} size {:#x} priority {} flags {:#x}",
            self.id,
            self.info.name,
            self.info.base,
            self.info.size,
            self.info.priority,
            self.info.flags.into_bits()
        );
        info!(
            "\tpage_array {:p}, {} pages, free_count {}",
            self.pages.as_ptr(),
            self.pages.len(),
            self.free_count
        );

        if verbose {
            for (index, descriptor) in self.pages.iter().enumerate() {
                info!(
                    "\t\tpage {index} ({}): {}",
                    self.address_at(index),
                    descriptor.state()
                );
            }
        }

        info!("\tfree ranges:");
        for (start, end) in self.free_ranges() {
            info!("\t\t{start} - {end}");
        }
    }

    #[inline]
    fn page_ref(&self, index: usize) -> PageRef {
        PageRef::new(self.id, link(index))
    }

    #[inline]
    fn address_at(&self, index: usize) -> PhysicalAddress {
        self.info.base + ((index as u64) << PAGE_SHIFT)
    }

    /// Index of the frame containing `pa`; `pa` must be inside the arena.
    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    fn index_of(&self, pa: PhysicalAddress) -> usize {
        debug_assert!(self.contains(pa));
        ((pa.as_u64() - self.info.base.as_u64()) >> PAGE_SHIFT) as usize
    }

    /// Moves a free page off the free list and marks it allocated.
    fn take(&mut self, index: usize) {
        self.unlink_free(index);
        self.pages[index].set_state(PageState::Allocated);
        self.free_count -= 1;
    }

    fn unlink_free(&mut self, index: usize) {
        let descriptor = self.pages[index];
        debug_assert!(descriptor.is_free());

        let (prev, next) = (descriptor.prev(), descriptor.next());
        if prev == NIL {
            debug_assert_eq!(self.free_head as usize, index);
            self.free_head = next;
        } else {
            self.pages[prev as usize].set_next(next);
        }
        if next != NIL {
            self.pages[next as usize].set_prev(prev);
        }
        self.pages[index].unlink();
    }

    fn push_free(&mut self, index: usize) {
        let head = self.free_head;
        self.pages[index].set_prev(NIL);
        self.pages[index].set_next(head);
        if head != NIL {
            self.pages[head as usize].set_prev(link(index));
        }
        self.free_head = link(index);
    }
}

impl fmt::Debug for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("name", &self.info.name)
            .field("base", &self.info.base)
            .field("size", &self.info.size)
            .field("priority", &self.info.priority)
            .field("free_count", &self.free_count)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot_alloc::BumpBootAlloc;

    fn boot() -> BumpBootAlloc {
        BumpBootAlloc::new(Box::leak(vec![0u8; 64 * 1024].into_boxed_slice()))
    }

    fn arena(base: u64, pages: u64) -> Arena {
        let info = ArenaInfo::new(
            "test",
            PhysicalAddress::new(base),
            pages * PAGE_SIZE,
            ArenaFlags::KMAP,
            0,
        );
        let mut arena = Arena::new(info);
        arena.allocate_array(&mut boot()).unwrap();
        arena
    }

    fn addr(a: &Arena, page: PageRef) -> u64 {
        a.address_of(page).unwrap().as_u64()
    }

    #[test]
    fn fresh_arena_hands_out_ascending_addresses() {
        let mut a = arena(0x1000, 4);
        assert_eq!(a.free_count(), 4);
        assert_eq!(a.free_list_len(), 4);

        let got: Vec<u64> = (0..4).map(|_| a.allocate_one().unwrap().1.as_u64()).collect();
        assert_eq!(got, [0x1000, 0x2000, 0x3000, 0x4000]);
        assert!(a.allocate_one().is_none());
        assert_eq!(a.free_count(), 0);
        assert_eq!(a.free_list_len(), 0);
    }

    #[test]
    fn contains_is_half_open() {
        let a = arena(0x10_000, 2);
        assert!(!a.contains(PhysicalAddress::new(0xF_FFF)));
        assert!(a.contains(PhysicalAddress::new(0x10_000)));
        assert!(a.contains(PhysicalAddress::new(0x11_FFF)));
        assert!(!a.contains(PhysicalAddress::new(0x12_000)));
    }

    #[test]
    fn address_translation_round_trips() {
        let mut a = arena(0x20_0000, 8);
        for _ in 0..8 {
            let (page, pa) = a.allocate_one().unwrap();
            assert!(a.owns(page));
            assert_eq!(a.address_of(page), Some(pa));
            assert_eq!(a.page_at(pa), Some(page));
            assert_eq!(a.page_at(pa + 0x123), Some(page));
        }
        assert_eq!(a.page_at(PhysicalAddress::new(0x1000)), None);
    }

    #[test]
    fn foreign_pages_are_not_owned() {
        let mut a = arena(0x1000, 2);
        let foreign = PageRef::new(ArenaId::new(3), 0);
        let past_end = PageRef::new(a.id(), 2);
        assert!(!a.owns(foreign));
        assert!(!a.owns(past_end));
        assert_eq!(a.address_of(foreign), None);
        assert_eq!(a.free_one(foreign), Err(NotOwned(foreign)));
        assert_eq!(a.free_one(past_end), Err(NotOwned(past_end)));
    }

    #[test]
    fn allocate_specific_removes_from_the_middle_of_the_free_list() {
        let mut a = arena(0x1000, 4);
        let page = a.allocate_specific(PhysicalAddress::new(0x3000)).unwrap();
        assert_eq!(addr(&a, page), 0x3000);
        assert_eq!(a.page_state(page), Some(PageState::Allocated));
        assert_eq!(a.free_count(), 3);
        assert_eq!(a.free_list_len(), 3);

        // already taken
        assert!(a.allocate_specific(PhysicalAddress::new(0x3000)).is_none());
        // outside
        assert!(a.allocate_specific(PhysicalAddress::new(0x5000)).is_none());

        let rest: Vec<u64> = (0..3).map(|_| a.allocate_one().unwrap().1.as_u64()).collect();
        assert_eq!(rest, [0x1000, 0x2000, 0x4000]);
    }

    #[test]
    fn allocate_many_stops_when_exhausted() {
        let mut a = arena(0x1000, 3);
        let mut pages = Vec::new();
        assert_eq!(a.allocate_many(2, &mut pages), 2);
        assert_eq!(a.allocate_many(5, &mut pages), 1);
        assert_eq!(a.allocate_many(1, &mut pages), 0);
        assert_eq!(pages.len(), 3);
        assert_eq!(a.free_count(), 0);
    }

    #[test]
    fn freed_pages_are_reused_first() {
        let mut a = arena(0x1000, 4);
        let (first, _) = a.allocate_one().unwrap();
        let (second, _) = a.allocate_one().unwrap();
        a.free_one(first).unwrap();
        assert_eq!(a.page_state(first), Some(PageState::Free));
        assert_eq!(a.free_count(), 3);
        assert_eq!(a.free_list_len(), 3);

        let (again, _) = a.allocate_one().unwrap();
        assert_eq!(again, first);
        a.free_one(second).unwrap();
        a.free_one(again).unwrap();
        assert_eq!(a.free_count(), 4);
        assert_eq!(a.free_list_len(), 4);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_panics() {
        let mut a = arena(0x1000, 2);
        let (page, _) = a.allocate_one().unwrap();
        a.free_one(page).unwrap();
        let _ = a.free_one(page);
    }

    #[test]
    fn contiguous_run_skips_busy_pages() {
        let mut a = arena(0x0, 8);
        a.allocate_specific(PhysicalAddress::new(0x2000)).unwrap();

        let mut pages = Vec::new();
        let base = a.allocate_contiguous(3, PAGE_SHIFT, &mut pages).unwrap();
        assert_eq!(base.as_u64(), 0x3000);
        let addrs: Vec<u64> = pages.iter().map(|&p| addr(&a, p)).collect();
        assert_eq!(addrs, [0x3000, 0x4000, 0x5000]);
        assert_eq!(a.free_count(), 4);
        assert_eq!(a.free_list_len(), 4);
    }

    #[test]
    fn contiguous_run_honors_physical_alignment() {
        // arena starts at 0x1000, so the first 16 KiB boundary is page 3
        let mut a = arena(0x1000, 16);
        let mut pages = Vec::new();
        let base = a.allocate_contiguous(2, 14, &mut pages).unwrap();
        assert_eq!(base.as_u64(), 0x4000);
        assert_eq!(addr(&a, pages[0]), 0x4000);
        assert_eq!(addr(&a, pages[1]), 0x5000);

        // next 16 KiB slot is 0x8000
        pages.clear();
        let base = a.allocate_contiguous(4, 14, &mut pages).unwrap();
        assert_eq!(base.as_u64(), 0x8000);

        // 0xC000..0x10000 still free, 0x10000 is the last page
        pages.clear();
        assert_eq!(a.allocate_contiguous(4, 14, &mut pages).unwrap().as_u64(), 0xC000);
        assert!(a.allocate_contiguous(2, 14, &mut pages).is_none());
    }

    #[test]
    fn failed_contiguous_search_leaves_arena_untouched() {
        let mut a = arena(0x1000, 4);
        a.allocate_specific(PhysicalAddress::new(0x2000)).unwrap();
        let mut pages = Vec::new();
        assert!(a.allocate_contiguous(3, PAGE_SHIFT, &mut pages).is_none());
        assert!(a.allocate_contiguous(0, PAGE_SHIFT, &mut pages).is_none());
        assert!(a.allocate_contiguous(1, 64, &mut pages).is_none());
        assert!(pages.is_empty());
        assert_eq!(a.free_count(), 3);
        assert_eq!(a.free_list_len(), 3);
    }

    #[test]
    fn small_alignment_is_clamped_to_a_page() {
        let mut a = arena(0x1000, 2);
        let mut pages = Vec::new();
        assert_eq!(a.allocate_contiguous(2, 0, &mut pages).unwrap().as_u64(), 0x1000);
    }

    #[test]
    fn free_ranges_report_maximal_runs() {
        let mut a = arena(0x0, 6);
        a.allocate_specific(PhysicalAddress::new(0x1000)).unwrap();
        a.allocate_specific(PhysicalAddress::new(0x4000)).unwrap();
        let ranges: Vec<(u64, u64)> = a
            .free_ranges()
            .map(|(s, e)| (s.as_u64(), e.as_u64()))
            .collect();
        assert_eq!(ranges, [(0x0, 0x1000), (0x2000, 0x4000), (0x5000, 0x6000)]);
        a.dump(true);
    }

    #[test]
    fn boot_exhaustion_is_reported() {
        let info = ArenaInfo::new("big", PhysicalAddress::new(0), 1024 * PAGE_SIZE, ArenaFlags::new(), 0);
        let mut a = Arena::new(info);
        let mut boot = BumpBootAlloc::new(Box::leak(vec![0u8; 16].into_boxed_slice()));
        assert_eq!(
            a.allocate_array(&mut boot),
            Err(RegisterError::OutOfBootMemory { bytes: 1024 * 8 })
        );
        assert_eq!(a.page_count(), 0);
    }

    #[test]
    #[should_panic(expected = "not page aligned")]
    fn unaligned_base_panics() {
        let info = ArenaInfo::new("bad", PhysicalAddress::new(0x1234), PAGE_SIZE, ArenaFlags::new(), 0);
        let _ = Arena::new(info);
    }

    #[test]
    #[should_panic(expected = "is empty")]
    fn empty_arena_panics() {
        let info = ArenaInfo::new("bad", PhysicalAddress::new(0x1000), 0, ArenaFlags::new(), 0);
        let _ = Arena::new(info);
    }
}
