//! # Boot-Time Storage for Page Arrays
//!
//! The PMM sits below the kernel heap, so the descriptor array of each arena
//! has to come from somewhere else: the boot allocator. [`BootAlloc`] is that
//! seam; [`BumpBootAlloc`] is a bump allocator over a statically reserved pool
//! that never frees.
//!
//! ```rust
//! use core::alloc::Layout;
//! use kernel_pmm::boot_alloc::{BootAlloc, BumpBootAlloc};
//!
//! let pool: &'static mut [u8] = Box::leak(vec![0u8; 256].into_boxed_slice());
//! let mut boot = BumpBootAlloc::new(pool);
//! let block = boot.reserve(Layout::from_size_align(64, 8).unwrap()).unwrap();
//! assert_eq!(block.as_ptr() as usize % 8, 0);
//! ```

use core::alloc::Layout;
use core::ptr::NonNull;

/// Source of permanent, identity-reachable memory before the page allocator
/// is online.
///
/// # Safety
/// A returned block must be valid for reads and writes of `layout.size()`
/// bytes, aligned to `layout.align()`, not aliased by any other live object,
/// and must stay valid and unused by anyone else for the rest of the kernel's
/// lifetime.
pub unsafe trait BootAlloc {
    /// Reserves a block for `layout`; `None` if the pool is exhausted.
    fn reserve(&mut self, layout: Layout) -> Option<NonNull<u8>>;
}

/// Never-freeing bump allocator over a `'static` byte pool.
pub struct BumpBootAlloc {
    base: NonNull<u8>,
    len: usize,
    used: usize,
}

impl BumpBootAlloc {
    /// Takes ownership of `pool` for the rest of the kernel's lifetime.
    #[must_use]
    pub fn new(pool: &'static mut [u8]) -> Self {
        let len = pool.len();
        Self {
            base: NonNull::from(pool).cast::<u8>(),
            len,
            used: 0,
        }
    }

    /// Bytes not yet handed out (ignoring alignment padding).
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.len - self.used
    }
}

unsafe impl BootAlloc for BumpBootAlloc {
    fn reserve(&mut self, layout: Layout) -> Option<NonNull<u8>> {
        let cursor = self.base.as_ptr().wrapping_add(self.used);
        let padding = cursor.align_offset(layout.align());
        let start = self.used.checked_add(padding)?;
        let end = start.checked_add(layout.size())?;
        if end > self.len {
            return None;
        }
        self.used = end;

        // SAFETY: `start <= len`, so the pointer stays within (or one past) the pool.
        Some(unsafe { self.base.add(start) })
    }
}
