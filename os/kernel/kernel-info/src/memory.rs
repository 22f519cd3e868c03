//! # Memory Layout

/// Size of a base page frame in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// `log2(PAGE_SIZE)`, i.e. the number of in-page offset bits.
pub const PAGE_SHIFT: u32 = 12;

/// Number of physical memory arenas the PMM registry can hold.
///
/// The registry lives below the kernel heap and therefore uses a fixed-size
/// table. Arena identifiers are stored as `u8`.
pub const MAX_PMM_ARENAS: usize = 16;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Extent of the direct map (64 TiB of physical memory).
pub const HHDM_SIZE: u64 = 0x0000_4000_0000_0000;

const _: () = {
    assert!(1 << PAGE_SHIFT == PAGE_SIZE);
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(MAX_PMM_ARENAS > 0 && MAX_PMM_ARENAS <= u8::MAX as usize);
    assert!(HHDM_BASE.is_multiple_of(PAGE_SIZE));
    assert!(HHDM_BASE.checked_add(HHDM_SIZE).is_some());
};
