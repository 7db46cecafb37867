use std::{error, fmt};

/// Failures of the region-growth primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionError {
  /// A fixed-capacity region has no room left.
  Exhausted { requested: usize, available: usize },
  /// The increment cannot be expressed to the underlying primitive.
  TooLarge { requested: usize },
  /// The first base address handed out is not double-word aligned.
  Misaligned { address: usize },
  /// New bytes did not start where the previous ones ended.
  Discontiguous { expected: usize, found: usize },
  /// The OS refused to move the program break.
  Os(i32),
}

impl fmt::Display for RegionError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      RegionError::Exhausted { requested, available } => {
        write!(f, "region exhausted: requested {requested} bytes, {available} available")
      }
      RegionError::TooLarge { requested } => write!(f, "cannot grow region by {requested} bytes"),
      RegionError::Misaligned { address } => write!(f, "region base {address:#x} is not double-word aligned"),
      RegionError::Discontiguous { expected, found } => {
        write!(f, "region grew at {found:#x}, expected {expected:#x}")
      }
      RegionError::Os(errno) => write!(f, "sbrk failed (errno {errno})"),
    }
  }
}

impl error::Error for RegionError {}

/// Failures surfaced by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
  /// The region could not supply the prologue or the first chunk.
  InitFailed(RegionError),
  /// The heap could not be extended to satisfy a request. The heap is unchanged.
  OutOfMemory { requested: usize, source: RegionError },
  /// The adjusted block size does not fit in a boundary tag.
  RequestTooLarge { requested: usize },
}

impl fmt::Display for AllocError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      AllocError::InitFailed(source) => write!(f, "allocator unusable: {source}"),
      AllocError::OutOfMemory { requested, source } => {
        write!(f, "out of memory allocating {requested} bytes: {source}")
      }
      AllocError::RequestTooLarge { requested } => {
        write!(f, "request of {requested} bytes exceeds the largest block")
      }
    }
  }
}

impl error::Error for AllocError {
  fn source(&self) -> Option<&(dyn error::Error + 'static)> {
    match self {
      AllocError::InitFailed(source) | AllocError::OutOfMemory { source, .. } => Some(source),
      AllocError::RequestTooLarge { .. } => None,
    }
  }
}
