//! Heap consistency checking.
//!
//! The checker walks the heap from the prologue to the epilogue and reports
//! every structural problem it finds instead of stopping at the first one.
//! It only reads the heap.

use std::{fmt, ptr::NonNull};

use log::{error, info};

use crate::{
  block::{BlockPtr, DSIZE, OVERHEAD, Tag},
  implicit::ImplicitAllocator,
  region::Region,
};

/// A block as seen by a heap walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: NonNull<u8>,
  pub header: Tag,
  pub footer: Tag,
}

impl BlockInfo {
  pub fn size(&self) -> usize {
    self.header.size()
  }

  pub fn is_allocated(&self) -> bool {
    self.header.is_allocated()
  }

  pub fn payload_size(&self) -> usize {
    self.size().saturating_sub(OVERHEAD)
  }

  /// Whether `ptr` falls inside this block's payload.
  pub fn contains(
    &self,
    ptr: *const u8,
  ) -> bool {
    let start = self.payload.as_ptr() as usize;
    (start..start + self.payload_size()).contains(&(ptr as usize))
  }
}

impl fmt::Display for BlockInfo {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(f, "{:p}: header: {:?} footer: {:?}", self.payload, self.header, self.footer)
  }
}

/// One structural problem found by [`ImplicitAllocator::check_heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
  BadPrologue(Tag),
  Misaligned { payload: usize },
  TagMismatch { payload: usize, header: Tag, footer: Tag },
  AdjacentFree { first: usize, second: usize },
  /// A block claims to extend past the end of the heap. The walk stops here.
  Overrun { payload: usize, size: usize, heap_end: usize },
  /// A zero-size header appeared before the end of the heap.
  Truncated { payload: usize, heap_end: usize },
  BadEpilogue(Tag),
  /// The search cursor is not the start of any block.
  CursorOutOfHeap { cursor: usize },
}

impl fmt::Display for Violation {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      Violation::BadPrologue(tag) => write!(f, "bad prologue header {tag:?}"),
      Violation::Misaligned { payload } => write!(f, "{payload:#x} is not doubleword aligned"),
      Violation::TagMismatch { payload, header, footer } => {
        write!(f, "{payload:#x}: header {header:?} does not match footer {footer:?}")
      }
      Violation::AdjacentFree { first, second } => {
        write!(f, "free blocks {first:#x} and {second:#x} are not coalesced")
      }
      Violation::Overrun { payload, size, heap_end } => {
        write!(f, "{payload:#x}: size {size} runs past heap end {heap_end:#x}")
      }
      Violation::Truncated { payload, heap_end } => {
        write!(f, "block list ends at {payload:#x}, heap ends at {heap_end:#x}")
      }
      Violation::BadEpilogue(tag) => write!(f, "bad epilogue header {tag:?}"),
      Violation::CursorOutOfHeap { cursor } => write!(f, "search cursor {cursor:#x} is not on a block"),
    }
  }
}

/// Result of a heap walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapReport {
  pub heap_start: usize,
  pub heap_end: usize,
  /// Every block between the prologue and the epilogue.
  pub blocks: Vec<BlockInfo>,
  pub violations: Vec<Violation>,
}

impl HeapReport {
  pub fn is_ok(&self) -> bool {
    self.violations.is_empty()
  }

  pub fn free_blocks(&self) -> impl Iterator<Item = &BlockInfo> {
    self.blocks.iter().filter(|b| !b.is_allocated())
  }

  pub fn allocated_blocks(&self) -> impl Iterator<Item = &BlockInfo> {
    self.blocks.iter().filter(|b| b.is_allocated())
  }

  pub fn free_bytes(&self) -> usize {
    self.free_blocks().map(BlockInfo::size).sum()
  }

  fn violation(
    &mut self,
    violation: Violation,
  ) {
    error!("{violation}");
    self.violations.push(violation);
  }
}

impl fmt::Display for HeapReport {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    writeln!(f, "Heap ({:#x}):", self.heap_start)?;

    for block in &self.blocks {
      writeln!(f, "{block}")?;
    }

    writeln!(f, "{:#x}: EOL", self.heap_end)?;

    for violation in &self.violations {
      writeln!(f, "Error: {violation}")?;
    }

    Ok(())
  }
}

impl<R: Region> ImplicitAllocator<R> {
  /// Walks the whole heap and validates the prologue, every block's tags
  /// and alignment, coalescing, the epilogue and the search cursor.
  ///
  /// With `verbose` every block is logged at `info` level. Violations are
  /// always logged at `error` level.
  pub fn check_heap(
    &self,
    verbose: bool,
  ) -> HeapReport {
    let end = self.heap_end.as_ptr() as usize;

    let mut report = HeapReport {
      heap_start: self.heap_start.addr(),
      heap_end: end,
      blocks: Vec::new(),
      violations: Vec::new(),
    };

    if verbose {
      info!("Heap ({:#x}):", report.heap_start);
    }

    unsafe {
      let prologue = self.heap_start.header();
      if prologue.size() != DSIZE || !prologue.is_allocated() {
        report.violation(Violation::BadPrologue(prologue));
      }

      let mut bp = self.heap_start;
      let mut prev_free: Option<BlockPtr> = None;
      let mut cursor_seen = false;

      while bp.addr() < end {
        let header = bp.header();

        if header.size() == 0 {
          report.violation(Violation::Truncated {
            payload: bp.addr(),
            heap_end: end,
          });
          break;
        }

        if bp.addr() + header.size() > end {
          report.violation(Violation::Overrun {
            payload: bp.addr(),
            size: header.size(),
            heap_end: end,
          });
          break;
        }

        let block = BlockInfo {
          payload: bp.payload(),
          header,
          footer: bp.footer(),
        };

        if verbose {
          info!("{block}");
        }

        // Only reachable on a corrupted walk or a misaligned base.
        if !bp.is_aligned() {
          report.violation(Violation::Misaligned { payload: bp.addr() });
        }

        if block.header != block.footer {
          report.violation(Violation::TagMismatch {
            payload: bp.addr(),
            header: block.header,
            footer: block.footer,
          });
        }

        match prev_free {
          Some(prev) if !header.is_allocated() => report.violation(Violation::AdjacentFree {
            first: prev.addr(),
            second: bp.addr(),
          }),
          _ => {}
        }
        prev_free = (!header.is_allocated()).then_some(bp);

        cursor_seen |= bp == self.cursor;

        if bp != self.heap_start {
          report.blocks.push(block);
        }

        bp = bp.next();
      }

      if bp.addr() == end {
        let epilogue = bp.header();

        if verbose {
          info!("{:#x}: EOL", bp.addr());
        }

        if epilogue.size() != 0 || !epilogue.is_allocated() {
          report.violation(Violation::BadEpilogue(epilogue));
        }
      }

      if !cursor_seen {
        report.violation(Violation::CursorOutOfHeap {
          cursor: self.cursor.addr(),
        });
      }
    }

    report
  }
}
