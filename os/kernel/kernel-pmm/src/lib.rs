//! # Kernel Physical Memory Manager
//!
//! This crate tracks every physical page frame the kernel may hand out and
//! serves page allocations from them. Physical memory is described as a set of
//! *arenas*, contiguous page-aligned ranges supplied by the platform at boot,
//! each with its own per-page bookkeeping. The arenas are kept in a single
//! priority-ordered registry behind one lock.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │          PhysicalMemoryManager (façade)             │
//! │    • alloc_page / alloc_pages / alloc_range         │
//! │    • alloc_contiguous / free                        │
//! │    • kernel pages through a PhysMapper              │
//! └─────────────────┬───────────────────────────────────┘
//!                   │  SpinMutex (single global lock)
//! ┌─────────────────▼───────────────────────────────────┐
//! │               ArenaList (registry)                  │
//! │    • fixed capacity, sorted by priority             │
//! │    • address / descriptor ownership lookups         │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │                     Arena                           │
//! │    • one PageDescriptor per page frame              │
//! │    • index-linked free list                         │
//! │    • single, batch, specific and aligned runs       │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Core Components
//!
//! ### Arenas ([`arena`])
//!
//! An arena owns `[base, base + size)` and a descriptor array reserved from the
//! [`BootAlloc`](boot_alloc::BootAlloc) at registration. Free descriptors form
//! a doubly linked list whose links are array indices, so "does this page
//! belong here" is a bounds check and translation is index arithmetic.
//!
//! ### Registry ([`registry`])
//!
//! At most [`MAX_PMM_ARENAS`](kernel_info::memory::MAX_PMM_ARENAS) arenas,
//! ordered by ascending priority; equal priorities keep registration order.
//! Allocation requests fall through the arenas in that order.
//!
//! ### Façade ([`pmm`])
//!
//! [`PhysicalMemoryManager`] is the only type that needs to be shared. It can
//! live in a `static`, holds its lock for the whole body of each operation
//! and never blocks waiting for memory: exhaustion is `None` or a short count.
//!
//! * `alloc_pages` is served by the *first* eligible arena that yields any
//!   page and is not topped up from later arenas.
//! * `alloc_contiguous` never assembles a run across arenas.
//! * Freeing a page no arena issued is logged and skipped.
//! * Freeing a page twice panics.
//!
//! ### Kernel pages ([`kpages`])
//!
//! `alloc_kpages` / `alloc_kpage` / `free_kpages` restrict allocation to arenas
//! flagged [`ArenaFlags::kmap`] and translate through a
//! [`PhysMapper`](phys_mapper::PhysMapper), outside the lock.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_pmm::boot_alloc::BumpBootAlloc;
//! use kernel_pmm::{AllocFlags, ArenaFlags, ArenaInfo, PhysicalAddress, PhysicalMemoryManager};
//!
//! let pmm = PhysicalMemoryManager::new();
//! let mut boot = BumpBootAlloc::new(Box::leak(vec![0u8; 4096].into_boxed_slice()));
//!
//! let info = ArenaInfo::new("ram", PhysicalAddress::new(0x1000), 16 * 4096, ArenaFlags::KMAP, 0);
//! pmm.add_arena(info, &mut boot).unwrap();
//!
//! let mut pages = Vec::new();
//! assert_eq!(pmm.alloc_pages(4, AllocFlags::ANY, &mut pages), 4);
//! assert_eq!(pmm.free_page_count(), 12);
//!
//! let base = pmm.alloc_contiguous(8, AllocFlags::ANY, 12, &mut pages).unwrap();
//! assert!(base.is_aligned(4096));
//!
//! assert_eq!(pmm.free(pages), 12);
//! assert_eq!(pmm.free_page_count(), 16);
//! ```
//!
//! ## Integration Points
//!
//! * **kernel-info**: page size and registry capacity
//! * **kernel-sync**: the spin lock guarding the registry

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod addresses;
pub mod arena;
pub mod boot_alloc;
pub mod error;
pub mod info;
pub mod kpages;
pub mod page;
pub mod phys_mapper;
pub mod pmm;
pub mod registry;

pub use addresses::{PhysicalAddress, VirtualAddress};
pub use arena::Arena;
pub use error::{NotOwned, RegisterError};
pub use info::{AllocFlags, ArenaFlags, ArenaInfo};
pub use page::{ArenaId, PageDescriptor, PageRef, PageState};
pub use pmm::PhysicalMemoryManager;
