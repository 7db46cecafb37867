//! Block layout primitives.
//!
//! Every block is framed by two identical boundary tags:
//!
//! ```text
//!      31                     3  2  1  0
//!     -----------------------------------
//!    | s  s  s  s  ... s  s  s  0  0  a/f |
//!     -----------------------------------
//!
//!    ┌────────┬──────────────────────────────┬────────┐
//!    │ header │           payload            │ footer │
//!    └────────┴──────────────────────────────┴────────┘
//!             ▲
//!             └── BlockPtr (payload address, double-word aligned)
//! ```
//!
//! This is the only module that does offset arithmetic on heap addresses.
//! Everything above it talks in terms of [`BlockPtr`] and [`Tag`].

use std::{fmt, ptr::NonNull};

/// Word size in bytes (one boundary tag).
pub const WSIZE: usize = 4;

/// Double word size in bytes, the alignment unit.
pub const DSIZE: usize = 8;

/// Header plus footer.
pub const OVERHEAD: usize = 2 * WSIZE;

/// Header, footer and one double word of payload.
pub const MIN_BLOCK_SIZE: usize = 2 * DSIZE;

/// Default heap extension in bytes.
pub const CHUNK_SIZE: usize = 1 << 12;

/// Largest block size a 32-bit tag can describe.
pub const MAX_BLOCK_SIZE: usize = (u32::MAX as usize) & !(DSIZE - 1);

const ALLOC_BIT: u32 = 0x1;
const SIZE_MASK: u32 = !0x7;

/// A packed `(size, allocated)` boundary tag.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Tag(u32);

impl Tag {
  /// The zero-size allocated tag written at the end of the heap.
  pub const EPILOGUE: Tag = Tag(ALLOC_BIT);

  pub fn pack(
    size: usize,
    allocated: bool,
  ) -> Self {
    debug_assert!(size % DSIZE == 0, "block size {size} is not double-word aligned");
    debug_assert!(size <= MAX_BLOCK_SIZE, "block size {size} does not fit in a tag");

    Self(size as u32 | allocated as u32)
  }

  pub const fn from_raw(raw: u32) -> Self {
    Self(raw)
  }

  pub const fn raw(self) -> u32 {
    self.0
  }

  pub const fn size(self) -> usize {
    (self.0 & SIZE_MASK) as usize
  }

  pub const fn is_allocated(self) -> bool {
    self.0 & ALLOC_BIT != 0
  }
}

impl fmt::Debug for Tag {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "[{}:{}]", self.size(), if self.is_allocated() { 'a' } else { 'f' })
  }
}

/// Reads the word at `p`.
///
/// # Safety
///
/// `p` must be valid for a 4-byte aligned read.
pub unsafe fn get(p: *const u8) -> Tag {
  unsafe { Tag(p.cast::<u32>().read()) }
}

/// Writes `tag` at `p`.
///
/// # Safety
///
/// `p` must be valid for a 4-byte aligned write.
pub unsafe fn put(
  p: *mut u8,
  tag: Tag,
) {
  unsafe { p.cast::<u32>().write(tag.0) }
}

/// Pointer to the first payload byte of a block.
///
/// All accessors are `unsafe`: they trust the surrounding tags, so the
/// caller must guarantee the pointer addresses a block inside a formatted
/// heap (the epilogue counts, with size zero).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockPtr(NonNull<u8>);

impl BlockPtr {
  pub const fn new(payload: NonNull<u8>) -> Self {
    Self(payload)
  }

  pub const fn payload(self) -> NonNull<u8> {
    self.0
  }

  pub fn as_ptr(self) -> *mut u8 {
    self.0.as_ptr()
  }

  pub fn addr(self) -> usize {
    self.0.as_ptr() as usize
  }

  pub fn is_aligned(self) -> bool {
    self.addr() % DSIZE == 0
  }

  pub unsafe fn header_ptr(self) -> *mut u8 {
    unsafe { self.0.as_ptr().sub(WSIZE) }
  }

  /// Footer address as derived from the current header size.
  pub unsafe fn footer_ptr(self) -> *mut u8 {
    unsafe { self.0.as_ptr().add(self.size()).sub(DSIZE) }
  }

  pub unsafe fn header(self) -> Tag {
    unsafe { get(self.header_ptr()) }
  }

  pub unsafe fn footer(self) -> Tag {
    unsafe { get(self.footer_ptr()) }
  }

  pub unsafe fn size(self) -> usize {
    unsafe { self.header().size() }
  }

  pub unsafe fn is_allocated(self) -> bool {
    unsafe { self.header().is_allocated() }
  }

  pub unsafe fn payload_size(self) -> usize {
    unsafe { self.size().saturating_sub(OVERHEAD) }
  }

  pub unsafe fn set_header(
    self,
    tag: Tag,
  ) {
    unsafe { put(self.header_ptr(), tag) }
  }

  /// Writes the header, then the footer at the position implied by `size`.
  pub unsafe fn set_tags(
    self,
    size: usize,
    allocated: bool,
  ) {
    let tag = Tag::pack(size, allocated);

    unsafe {
      self.set_header(tag);
      put(self.footer_ptr(), tag);
    }
  }

  /// Footer of the block physically before this one.
  pub unsafe fn prev_footer(self) -> Tag {
    unsafe { get(self.0.as_ptr().sub(DSIZE)) }
  }

  pub unsafe fn next(self) -> BlockPtr {
    unsafe { BlockPtr(self.0.add(self.size())) }
  }

  pub unsafe fn prev(self) -> BlockPtr {
    unsafe { BlockPtr(self.0.sub(self.prev_footer().size())) }
  }

  /// Returns `true` once the walk has reached the epilogue.
  pub unsafe fn is_epilogue(self) -> bool {
    unsafe { self.size() == 0 }
  }
}

impl fmt::Debug for BlockPtr {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "{:p}", self.0)
  }
}
