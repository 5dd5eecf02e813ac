#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! A fixed-capacity slot allocator that hands out small, reusable integer handles.
//!
//! This crate provides [`SlotAllocator`], a pool of `N` indexed slots that can be claimed and
//! released in O(1). Claiming a slot stores a payload in it and returns the slot index, which the
//! caller uses as an opaque handle for lookup and release. This is the kind of primitive that sits
//! inside object pools, connection tables or entity systems that need a dense handle space
//! without per-allocation heap traffic.
//!
//! # Key Features
//!
//! - **Fixed capacity**: all slots are allocated once at construction and never resized
//! - **O(1) operations**: claim, release and lookup are constant-time list splices
//! - **LIFO reuse**: the most recently released slot is the first one to be claimed again
//! - **Idempotent release**: releasing a slot that is not claimed does nothing
//! - **Thread-safe**: all methods take `&self`, with mutation and lookup sharing one lock
//! - **Explicit slot state**: any payload is valid data, including `()`, `0` or `None`
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::thread;
//!
//! use slot_allocator::SlotAllocator;
//!
//! let connections = Arc::new(SlotAllocator::new(4));
//!
//! let handle = connections.claim("10.0.0.1:443").unwrap();
//!
//! thread::spawn({
//!     let connections = Arc::clone(&connections);
//!
//!     move || {
//!         assert_eq!(connections.get(handle), Some("10.0.0.1:443"));
//!         connections.release(handle);
//!     }
//! })
//! .join()
//! .unwrap();
//!
//! assert!(connections.is_empty());
//! ```
//!
//! # Handles are not versioned
//!
//! A released index may be handed out again by a later claim. The allocator does not track
//! generations, so a stale handle is indistinguishable from the handle of the new occupant.
//! Embedding systems that need to detect stale handles must layer a generation counter on top.

mod builder;
mod drop_policy;
mod error;
mod slot_allocator;
mod slot_table;

pub use builder::*;
pub use drop_policy::*;
pub use error::*;
pub use slot_allocator::SlotAllocator;
pub(crate) use slot_table::*;
