//! # Physical ↔ Kernel Virtual Translation
//!
//! The page allocator itself only deals in physical addresses. The
//! kernel-page helpers ([`alloc_kpages`](crate::PhysicalMemoryManager::alloc_kpages)
//! and friends) additionally need to turn a frame into something the kernel
//! can dereference, and back again when the pages are returned. That
//! translation belongs to the virtual memory layer; [`PhysMapper`] is the
//! seam through which the PMM asks for it.
//!
//! ## How does it work?
//! - With HHDM, every physical address is mapped at `HHDM_BASE + pa`.
//! - [`HhdmPhysMapper`] adds (or subtracts) the HHDM base; it never touches
//!   memory.
//!
//! ## Example
//! ```rust
//! use kernel_info::memory::HHDM_BASE;
//! use kernel_pmm::phys_mapper::{HhdmPhysMapper, PhysMapper};
//! use kernel_pmm::{PhysicalAddress, VirtualAddress};
//!
//! let mapper = HhdmPhysMapper;
//! let va = mapper.phys_to_virt(PhysicalAddress::new(0x1234_0000));
//! assert_eq!(va, VirtualAddress::new(HHDM_BASE + 0x1234_0000));
//! assert_eq!(mapper.virt_to_phys(va), Some(PhysicalAddress::new(0x1234_0000)));
//! ```

use crate::addresses::{PhysicalAddress, VirtualAddress};
use kernel_info::memory::{HHDM_BASE, HHDM_SIZE};

/// Translation between physical addresses and kernel virtual addresses for
/// memory that is permanently mapped into the kernel.
///
/// Implementations must be pure address arithmetic or table lookups; the PMM
/// never calls them while holding its lock.
pub trait PhysMapper {
    /// Kernel virtual address of the physical address `pa`.
    ///
    /// Only called for pages from arenas flagged
    /// [`kmap`](crate::info::ArenaFlags::kmap), which must be covered.
    fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress;

    /// Physical address behind `va`, or `None` if `va` is not a kernel
    /// mapping this translator knows about.
    fn virt_to_phys(&self, va: VirtualAddress) -> Option<PhysicalAddress>;
}

/// [`PhysMapper`] implementation for kernels with a higher-half direct map (HHDM).
pub struct HhdmPhysMapper;

impl PhysMapper for HhdmPhysMapper {
    #[inline]
    fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress {
        debug_assert!(pa.as_u64() < HHDM_SIZE, "{pa} is outside the direct map");
        VirtualAddress::new(HHDM_BASE + pa.as_u64())
    }

    #[inline]
    fn virt_to_phys(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let offset = va.as_u64().checked_sub(HHDM_BASE)?;
        (offset < HHDM_SIZE).then(|| PhysicalAddress::new(offset))
    }
}
