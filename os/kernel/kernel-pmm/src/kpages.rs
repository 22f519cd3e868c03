//! # Kernel Pages
//!
//! Allocation helpers for memory the kernel wants to touch directly: pages
//! are taken only from [`kmap`](crate::info::ArenaFlags::kmap) arenas and
//! handed out as kernel virtual addresses through a [`PhysMapper`].
//!
//! The mapper is always consulted after the manager's lock is released (on
//! allocation) or before it is taken (on free).

use crate::addresses::{PhysicalAddress, VirtualAddress};
use crate::info::AllocFlags;
use crate::page::PageRef;
use crate::phys_mapper::PhysMapper;
use crate::pmm::PhysicalMemoryManager;
use kernel_info::memory::{PAGE_SHIFT, PAGE_SIZE};
use log::{trace, warn};

/// Page list sink for callers that only need the run's base address.
struct Discard;

impl Extend<PageRef> for Discard {
    fn extend<I: IntoIterator<Item = PageRef>>(&mut self, pages: I) {
        pages.into_iter().for_each(drop);
    }
}

impl PhysicalMemoryManager {
    /// Allocates `count` physically contiguous kernel pages.
    ///
    /// A single page takes the O(1) path; larger requests need a contiguous
    /// run. Returns the kernel virtual and the physical base address.
    pub fn alloc_kpages(
        &self,
        mapper: &impl PhysMapper,
        count: usize,
    ) -> Option<(VirtualAddress, PhysicalAddress)> {
        trace!("alloc_kpages: count {count}");

        let pa = match count {
            0 => return None,
            1 => self.alloc_page(AllocFlags::KMAP)?.1,
            _ => self.alloc_contiguous(count, AllocFlags::KMAP, PAGE_SHIFT, &mut Discard)?,
        };
        Some((mapper.phys_to_virt(pa), pa))
    }

    /// Allocates a single kernel page and also returns its descriptor handle.
    pub fn alloc_kpage(
        &self,
        mapper: &impl PhysMapper,
    ) -> Option<(VirtualAddress, PhysicalAddress, PageRef)> {
        trace!("alloc_kpage");

        let (page, pa) = self.alloc_page(AllocFlags::KMAP)?;
        Some((mapper.phys_to_virt(pa), pa, page))
    }

    /// Frees `count` consecutive kernel pages starting at `va`.
    ///
    /// Pages whose address does not translate, or which no arena manages, are
    /// skipped. Returns the number of pages freed.
    ///
    /// # Panics
    /// If one of the pages is already free.
    pub fn free_kpages(&self, mapper: &impl PhysMapper, va: VirtualAddress, count: usize) -> usize {
        trace!("free_kpages: va {va}, count {count}");

        let mut freed = 0;
        let mut va = va.align_down(PAGE_SIZE);
        for _ in 0..count {
            match mapper.virt_to_phys(va) {
                Some(pa) => match self.physical_to_page(pa) {
                    Some(page) => freed += self.free_page(page),
                    None => warn!("free_kpages: {pa} is not managed by any arena"),
                },
                None => warn!("free_kpages: {va} is not a kernel mapping"),
            }

            match va.checked_add(PAGE_SIZE) {
                Some(next) => va = next,
                None => break,
            }
        }
        freed
    }
}
