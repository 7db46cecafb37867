//! Region-growth primitives.
//!
//! A [`Region`] hands out bytes at the end of one contiguous range and never
//! takes them back, the same contract as `sbrk(2)`:
//!
//! ```text
//!   base                                  break
//!    ┌──────────────────────────────────────┬─────────────────────┐
//!    │        bytes already handed out      │   grow(n) lands here│
//!    └──────────────────────────────────────┴─────────────────────┘
//! ```

use std::{alloc, ptr::NonNull};

use libc::{c_void, intptr_t, sbrk};

use crate::{align, block::DSIZE, error::RegionError};

/// Extends the managed range by `bytes` and returns the start of the new
/// bytes. Previously returned addresses stay valid.
pub trait Region {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, RegionError>;
}

impl<R: Region + ?Sized> Region for &mut R {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, RegionError> {
    (**self).grow(bytes)
  }
}

/// A fixed-capacity region reserved up front, handed out monotonically.
///
/// The reservation is double-word aligned and lives as long as the region,
/// so pointers into it stay valid while the owning allocator exists.
pub struct MemRegion {
  start: NonNull<u8>,
  capacity: usize,
  brk: usize,
}

impl MemRegion {
  /// Reserves `capacity` bytes (rounded up to a double word).
  ///
  /// # Panics
  ///
  /// Panics if `capacity` is zero or the reservation itself fails.
  pub fn new(capacity: usize) -> Self {
    let layout = Self::layout(align!(capacity));
    let start = unsafe { alloc::alloc_zeroed(layout) };

    let Some(start) = NonNull::new(start) else {
      alloc::handle_alloc_error(layout)
    };

    Self {
      start,
      capacity: layout.size(),
      brk: 0,
    }
  }

  fn layout(capacity: usize) -> alloc::Layout {
    assert!(capacity > 0, "a region needs at least one byte");

    match alloc::Layout::from_size_align(capacity, DSIZE) {
      Ok(layout) => layout,
      Err(err) => panic!("invalid region capacity {capacity}: {err}"),
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes handed out so far.
  pub fn used(&self) -> usize {
    self.brk
  }

  pub fn start(&self) -> *const u8 {
    self.start.as_ptr()
  }
}

impl Region for MemRegion {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, RegionError> {
    let available = self.capacity - self.brk;

    if bytes > available {
      return Err(RegionError::Exhausted {
        requested: bytes,
        available,
      });
    }

    let old_brk = unsafe { self.start.add(self.brk) };
    self.brk += bytes;

    Ok(old_brk)
  }
}

impl Drop for MemRegion {
  fn drop(&mut self) {
    unsafe { alloc::dealloc(self.start.as_ptr(), Self::layout(self.capacity)) }
  }
}

/// The process program break, moved with `sbrk(2)`.
///
/// Any other user of `sbrk` (including the system allocator) can move the
/// break between two calls; such a gap is reported as
/// [`RegionError::Discontiguous`] instead of being handed out, and the bytes
/// requested by the failed call are returned to the OS.
pub struct SbrkRegion {
  end: Option<usize>,
}

impl SbrkRegion {
  pub fn new() -> Self {
    Self { end: None }
  }

  /// Current program break, as reported by `sbrk(0)`.
  pub fn program_break() -> *mut c_void {
    unsafe { sbrk(0) }
  }

  unsafe fn move_break(increment: intptr_t) -> Result<usize, RegionError> {
    let address = unsafe { sbrk(increment) };

    if address == usize::MAX as *mut c_void {
      let errno = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
      return Err(RegionError::Os(errno));
    }

    Ok(address as usize)
  }
}

impl Default for SbrkRegion {
  fn default() -> Self {
    Self::new()
  }
}

impl Region for SbrkRegion {
  fn grow(
    &mut self,
    bytes: usize,
  ) -> Result<NonNull<u8>, RegionError> {
    let increment = intptr_t::try_from(bytes).map_err(|_| RegionError::TooLarge { requested: bytes })?;

    unsafe {
      if self.end.is_none() {
        let current = Self::program_break() as usize;
        let padding = align!(current) - current;

        if padding > 0 {
          Self::move_break(padding as intptr_t)?;
        }
      }

      let address = Self::move_break(increment)?;

      match self.end {
        Some(expected) if expected != address => {
          // Hand the bytes back unless someone moved the break again.
          if Self::program_break() as usize == address + bytes {
            let _ = Self::move_break(-increment);
          }

          return Err(RegionError::Discontiguous {
            expected,
            found: address,
          });
        }
        _ => {}
      }

      self.end = Some(address + bytes);

      NonNull::new(address as *mut u8).ok_or(RegionError::Os(0))
    }
  }
}
