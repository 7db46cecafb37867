//! # tagalloc - An Implicit Free List Allocator
//!
//! This crate provides a dynamic memory allocator that manages one growable
//! heap region with an **implicit free list**, **next-fit placement** and
//! **boundary-tag coalescing**.
//!
//! ## Overview
//!
//! The heap is a single contiguous range. Blocks are never linked by
//! pointers: each block starts with a header holding its size, so the next
//! block is always `size` bytes further. A copy of the header at the end of
//! the block (the footer) lets a block find its predecessor just as cheaply.
//!
//! ```text
//!   Heap Layout:
//!
//!   begin                                                            end
//!   ┌─────┬──────────┬──────────┬──────────────────────────┬──────────┐
//!   │ pad │ hdr(8:a) │ ftr(8:a) │  zero or more user blocks │ hdr(0:a) │
//!   └─────┴──────────┴──────────┴──────────────────────────┴──────────┘
//!         │      prologue       │                          │ epilogue │
//!
//!   The allocated prologue and epilogue remove every edge case from
//!   coalescing: a block always has a neighbour on both sides.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── block      - Boundary tags and block address arithmetic
//!   ├── region     - Region trait, MemRegion and SbrkRegion
//!   ├── config     - HeapConfig and SearchMode
//!   ├── error      - AllocError and RegionError
//!   ├── implicit   - ImplicitAllocator implementation
//!   └── check      - Heap consistency checker
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagalloc::{ImplicitAllocator, MemRegion};
//!
//! let mut heap = ImplicitAllocator::init(MemRegion::new(1 << 20)).unwrap();
//!
//! let ptr = heap.allocate(100);
//! assert!(!ptr.is_null());
//!
//! unsafe {
//!     ptr.write_bytes(0xAB, 100);
//!     heap.deallocate(ptr);
//! }
//!
//! assert!(heap.check_heap(false).is_ok());
//! ```
//!
//! ## How It Works
//!
//! Allocation rounds the request up to a block size, searches for a free
//! block starting where the previous search stopped, and splits off the
//! unused tail when it is big enough to be a block:
//!
//! ```text
//!   place(asize = 24) into a free block of 64:
//!
//!   ┌────────────────────────────────────────────────┐
//!   │ hdr(64:f)              free               ftr  │
//!   └────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//!   ┌────────────────┬───────────────────────────────┐
//!   │ hdr(24:a)  ftr │ hdr(40:f)      free       ftr │
//!   └────────────────┴───────────────────────────────┘
//! ```
//!
//! Freeing clears the allocated bit and merges with free neighbours right
//! away, so two free blocks are never adjacent:
//!
//! ```text
//!   prev   │ cur  │ next      result
//!   ───────┼──────┼──────     ───────────────────────
//!   alloc  │ free │ alloc     cur alone
//!   alloc  │ free │ free      cur + next
//!   free   │ free │ alloc     prev + cur
//!   free   │ free │ free      prev + cur + next
//! ```
//!
//! When nothing fits, the heap grows through its [`Region`]: either a
//! fixed in-process reservation ([`MemRegion`]) or the program break
//! ([`SbrkRegion`]).
//!
//! ## Limitations
//!
//! - **Single-threaded only**: No synchronization primitives
//! - **Never shrinks**: Freed memory stays in the heap
//! - **Double-word alignment**: Layouts aligned above 8 bytes are refused
//! - **Linear search**: Fit search walks every block in the worst case
//!
//! ## Safety
//!
//! Freeing and reallocating take raw pointers and are `unsafe`; passing a
//! pointer that did not come from the same allocator corrupts the heap.
//! [`ImplicitAllocator::check_heap`] can be used to look for damage.

pub mod align;
pub mod block;
mod check;
mod config;
mod error;
mod implicit;
pub mod region;

pub use block::{CHUNK_SIZE, DSIZE, MIN_BLOCK_SIZE, OVERHEAD, WSIZE};
pub use check::{BlockInfo, HeapReport, Violation};
pub use config::{HeapConfig, SearchMode};
pub use error::{AllocError, RegionError};
pub use implicit::{Blocks, ImplicitAllocator};
pub use region::{MemRegion, Region, SbrkRegion};
