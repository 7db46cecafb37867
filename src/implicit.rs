use std::{alloc, marker::PhantomData, ptr, ptr::NonNull};

use log::{debug, trace, warn};

use crate::{
  block::{self, BlockPtr, DSIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE, OVERHEAD, Tag, WSIZE},
  check::BlockInfo,
  config::{HeapConfig, SearchMode},
  error::{AllocError, RegionError},
  region::Region,
};

/// Allocated state of the two physical neighbours of a block being freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Neighbors {
  BothAllocated,
  NextFree,
  PrevFree,
  BothFree,
}

impl Neighbors {
  fn of(
    prev_allocated: bool,
    next_allocated: bool,
  ) -> Self {
    match (prev_allocated, next_allocated) {
      (true, true) => Neighbors::BothAllocated,
      (true, false) => Neighbors::NextFree,
      (false, true) => Neighbors::PrevFree,
      (false, false) => Neighbors::BothFree,
    }
  }
}

/// Rounds a payload request up to a block size: header and footer added,
/// double-word aligned, never below [`MIN_BLOCK_SIZE`].
fn adjust_size(size: usize) -> Option<usize> {
  let asize = if size <= DSIZE {
    MIN_BLOCK_SIZE
  } else {
    DSIZE * (size.checked_add(OVERHEAD + DSIZE - 1)? / DSIZE)
  };

  (asize <= MAX_BLOCK_SIZE).then_some(asize)
}

/// An implicit free list allocator with boundary-tag coalescing.
///
/// The heap is one contiguous range obtained from a [`Region`]. Blocks are
/// found by walking sizes from header to header; there is no separate list.
/// The only state outside the heap is its bounds, the search cursor and the
/// configuration.
///
/// The allocator is single-threaded: it holds raw pointers into the region
/// and is neither `Send` nor `Sync`.
pub struct ImplicitAllocator<R: Region> {
  pub(crate) region: R,
  pub(crate) config: HeapConfig,
  /// First byte obtained from the region (the alignment pad word).
  pub(crate) base: NonNull<u8>,
  /// Prologue block.
  pub(crate) heap_start: BlockPtr,
  /// One past the last heap byte, which is also the epilogue's block pointer.
  pub(crate) heap_end: NonNull<u8>,
  /// Where the next fit search starts.
  pub(crate) cursor: BlockPtr,
}

impl<R: Region> ImplicitAllocator<R> {
  /// Formats a fresh heap on `region` with the default configuration.
  pub fn init(region: R) -> Result<Self, AllocError> {
    Self::init_with(region, HeapConfig::default())
  }

  /// Formats a fresh heap: pad word, prologue, epilogue, then one free
  /// block of `config.initial_chunk()` bytes.
  pub fn init_with(
    mut region: R,
    config: HeapConfig,
  ) -> Result<Self, AllocError> {
    let base = region.grow(4 * WSIZE).map_err(AllocError::InitFailed)?;

    if base.as_ptr() as usize % DSIZE != 0 {
      return Err(AllocError::InitFailed(RegionError::Misaligned {
        address: base.as_ptr() as usize,
      }));
    }

    let (heap_start, heap_end) = unsafe {
      block::put(base.as_ptr(), Tag::from_raw(0));

      let prologue = BlockPtr::new(base.add(2 * WSIZE));
      prologue.set_tags(DSIZE, true);

      let epilogue = prologue.next();
      epilogue.set_header(Tag::EPILOGUE);

      (prologue, epilogue.payload())
    };

    let mut heap = Self {
      region,
      config,
      base,
      heap_start,
      heap_end,
      cursor: heap_start,
    };

    heap.extend_heap(config.initial_chunk() / WSIZE).map_err(AllocError::InitFailed)?;

    debug!(
      "heap initialized at {:?}, {} bytes, search mode {:?}",
      heap.base,
      heap.heap_size(),
      config.search_mode()
    );

    Ok(heap)
  }

  pub fn config(&self) -> &HeapConfig {
    &self.config
  }

  /// Bytes obtained from the region so far, sentinels included.
  pub fn heap_size(&self) -> usize {
    self.heap_end.as_ptr() as usize - self.base.as_ptr() as usize
  }

  /// Borrows the region the heap lives in.
  pub fn region(&self) -> &R {
    &self.region
  }

  /// Iterates over every block between the prologue and the epilogue.
  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      next: unsafe { self.heap_start.next() },
      end: self.heap_end.as_ptr() as usize,
      _heap: PhantomData,
    }
  }

  /// Usable bytes of the block behind a pointer returned by this allocator.
  ///
  /// # Safety
  ///
  /// `ptr` must be a live allocation of this allocator.
  pub unsafe fn payload_size(
    &self,
    ptr: NonNull<u8>,
  ) -> usize {
    unsafe { BlockPtr::new(ptr).payload_size() }
  }

  /// Allocates at least `size` bytes, double-word aligned.
  ///
  /// Returns null for a zero-size request or when the heap cannot grow.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    match self.try_allocate(size) {
      Ok(Some(payload)) => payload.as_ptr(),
      Ok(None) => ptr::null_mut(),
      Err(err) => {
        warn!("{err}");
        ptr::null_mut()
      }
    }
  }

  /// Allocates for a [`Layout`](alloc::Layout). Alignments above a double
  /// word are not supported and yield null.
  pub fn allocate_layout(
    &mut self,
    layout: alloc::Layout,
  ) -> *mut u8 {
    if layout.align() > DSIZE {
      warn!("alignment {} exceeds the {DSIZE}-byte block alignment", layout.align());
      return ptr::null_mut();
    }

    self.allocate(layout.size())
  }

  /// Allocates at least `size` bytes.
  ///
  /// `Ok(None)` for `size == 0`, which touches nothing. On
  /// [`AllocError::OutOfMemory`] the heap is left exactly as it was.
  pub fn try_allocate(
    &mut self,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    if size == 0 {
      return Ok(None);
    }

    let asize = adjust_size(size).ok_or(AllocError::RequestTooLarge { requested: size })?;

    let bp = match self.find_fit(asize) {
      Some(bp) => bp,
      None => {
        let extend = asize.max(self.config.grow_chunk());

        self
          .extend_heap(extend / WSIZE)
          .map_err(|source| AllocError::OutOfMemory { requested: size, source })?
      }
    };

    unsafe { self.place(bp, asize) };

    trace!("allocated {size} bytes ({asize} byte block) at {bp:?}");

    Ok(Some(bp.payload()))
  }

  /// Returns a block to the heap and merges it with free neighbours.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live allocation of this allocator.
  pub unsafe fn deallocate(
    &mut self,
    ptr: *mut u8,
  ) {
    let Some(payload) = NonNull::new(ptr) else {
      return;
    };

    unsafe {
      let bp = BlockPtr::new(payload);
      debug_assert!(bp.is_allocated(), "double free of {bp:?}");

      bp.set_tags(bp.size(), false);
      self.coalesce(bp);
    }
  }

  /// Moves an allocation into a fresh block of `size` bytes.
  ///
  /// Copies `min(size, old payload)` bytes and frees the old block. The
  /// block is never resized in place. If the new block cannot be obtained
  /// the old one is left untouched and the error is returned.
  ///
  /// A null `ptr` allocates; a zero `size` frees and yields `Ok(None)`.
  ///
  /// # Safety
  ///
  /// `ptr` must be null or a live allocation of this allocator.
  pub unsafe fn reallocate(
    &mut self,
    ptr: *mut u8,
    size: usize,
  ) -> Result<Option<NonNull<u8>>, AllocError> {
    let Some(old) = NonNull::new(ptr) else {
      return self.try_allocate(size);
    };

    if size == 0 {
      unsafe { self.deallocate(ptr) };
      return Ok(None);
    }

    let Some(new) = self.try_allocate(size)? else {
      return Ok(None);
    };

    unsafe {
      let copy = size.min(BlockPtr::new(old).payload_size());
      ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), copy);

      self.deallocate(old.as_ptr());
    }

    Ok(Some(new))
  }

  /// Grows the heap by `words` (rounded up to even) and returns the
  /// resulting free block, merged with a free tail if there was one.
  fn extend_heap(
    &mut self,
    words: usize,
  ) -> Result<BlockPtr, RegionError> {
    let size = if words % 2 == 1 { (words + 1) * WSIZE } else { words * WSIZE };

    if self.heap_size().saturating_add(size) > MAX_BLOCK_SIZE {
      return Err(RegionError::TooLarge { requested: size });
    }

    let found = self.region.grow(size)?;

    if found != self.heap_end {
      return Err(RegionError::Discontiguous {
        expected: self.heap_end.as_ptr() as usize,
        found: found.as_ptr() as usize,
      });
    }

    unsafe {
      // The new header lands on the old epilogue.
      let bp = BlockPtr::new(found);
      bp.set_tags(size, false);

      let epilogue = bp.next();
      epilogue.set_header(Tag::EPILOGUE);
      self.heap_end = epilogue.payload();

      debug!("heap extended by {size} bytes at {bp:?}, now {} bytes", self.heap_size());

      Ok(self.coalesce(bp))
    }
  }

  /// Next-fit search: from the cursor to the epilogue, then from the heap
  /// start back up to the cursor.
  fn find_fit(
    &mut self,
    asize: usize,
  ) -> Option<BlockPtr> {
    if self.config.search_mode() == SearchMode::FirstFit {
      self.cursor = self.heap_start;
    }

    let start = self.cursor;

    unsafe {
      let mut bp = start;

      while !bp.is_epilogue() {
        if !bp.is_allocated() && asize <= bp.size() {
          self.cursor = bp;
          return Some(bp);
        }
        bp = bp.next();
      }

      bp = self.heap_start;

      while bp < start {
        if !bp.is_allocated() && asize <= bp.size() {
          self.cursor = bp;
          return Some(bp);
        }
        bp = bp.next();
      }
    }

    None
  }

  /// Carves `asize` bytes off the front of the free block `bp`, splitting
  /// only when the remainder can stand as a block of its own.
  unsafe fn place(
    &mut self,
    bp: BlockPtr,
    asize: usize,
  ) {
    unsafe {
      let csize = bp.size();

      if csize - asize >= MIN_BLOCK_SIZE {
        bp.set_tags(asize, true);
        bp.next().set_tags(csize - asize, false);
      } else {
        bp.set_tags(csize, true);
      }
    }
  }

  /// Merges the free block `bp` with its free neighbours and returns the
  /// merged block. A cursor left inside the merged range is moved to its
  /// start.
  unsafe fn coalesce(
    &mut self,
    bp: BlockPtr,
  ) -> BlockPtr {
    unsafe {
      let neighbors = Neighbors::of(bp.prev_footer().is_allocated(), bp.next().is_allocated());
      let size = bp.size();

      let merged = match neighbors {
        Neighbors::BothAllocated => return bp,
        Neighbors::NextFree => {
          bp.set_tags(size + bp.next().size(), false);
          bp
        }
        Neighbors::PrevFree => {
          let prev = bp.prev();
          prev.set_tags(prev.size() + size, false);
          prev
        }
        Neighbors::BothFree => {
          let prev = bp.prev();
          let next = bp.next();
          prev.set_tags(prev.size() + size + next.size(), false);
          prev
        }
      };

      if self.cursor >= merged && self.cursor < merged.next() {
        self.cursor = merged;
      }

      trace!("coalesced {bp:?} ({neighbors:?}) into {merged:?}, {} bytes", merged.size());

      merged
    }
  }
}

/// Iterator over the blocks of a heap, see [`ImplicitAllocator::blocks`].
pub struct Blocks<'a> {
  next: BlockPtr,
  end: usize,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    let bp = self.next;

    if bp.addr() >= self.end {
      return None;
    }

    unsafe {
      let header = bp.header();

      if header.size() == 0 || bp.addr() + header.size() > self.end {
        return None;
      }

      self.next = bp.next();

      Some(BlockInfo {
        payload: bp.payload(),
        header,
        footer: bp.footer(),
      })
    }
  }
}
