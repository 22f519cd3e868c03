//! # Kernel Configuration
//!
//! Compile-time constants shared by the kernel's memory subsystem. Everything
//! in here is a `const`; nothing is computed at runtime, so the values can be
//! used in `const` contexts (array lengths, static initializers) by the crates
//! that build on top of them.
//!
//! ## Memory Layout ([`memory`])
//!
//! * **Page Geometry**: base page size and its shift
//! * **Physical Memory Manager**: capacity of the arena registry
//! * **Direct Mapping**: HHDM (Higher Half Direct Mapping) window used to
//!   reach physical memory from kernel virtual addresses
//!
//! ```text
//! Virtual Address Space (kernel half):
//!
//! HHDM_BASE             ├─────────────────────────────────┤ 0xffff_8880_0000_0000
//!                       │   Higher Half Direct Mapping    │
//!                       │   (Physical Memory Access)      │
//! HHDM_BASE + HHDM_SIZE ├─────────────────────────────────┤
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
