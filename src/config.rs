use crate::{
  align,
  block::{CHUNK_SIZE, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE},
};

/// Where a fit search starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchMode {
  /// Resume from the block the previous search stopped at, wrapping around
  /// to the heap start when the tail has no fit.
  #[default]
  NextFit,
  /// Always scan from the heap start.
  FirstFit,
}

/// Tunables of an [`ImplicitAllocator`](crate::ImplicitAllocator).
///
/// ```rust
/// use tagalloc::{HeapConfig, SearchMode};
///
/// let config = HeapConfig::default()
///   .with_initial_chunk(1000)
///   .with_search_mode(SearchMode::FirstFit);
///
/// assert_eq!(config.initial_chunk(), 1000);
/// assert_eq!(config.grow_chunk(), 4096);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapConfig {
  initial_chunk: usize,
  grow_chunk: usize,
  search: SearchMode,
}

impl Default for HeapConfig {
  fn default() -> Self {
    Self {
      initial_chunk: CHUNK_SIZE,
      grow_chunk: CHUNK_SIZE,
      search: SearchMode::NextFit,
    }
  }
}

impl HeapConfig {
  /// Bytes of free space created by initialization.
  pub fn with_initial_chunk(
    mut self,
    bytes: usize,
  ) -> Self {
    self.initial_chunk = chunk(bytes);
    self
  }

  /// Minimum number of bytes requested whenever no free block fits.
  pub fn with_grow_chunk(
    mut self,
    bytes: usize,
  ) -> Self {
    self.grow_chunk = chunk(bytes);
    self
  }

  pub fn with_search_mode(
    mut self,
    search: SearchMode,
  ) -> Self {
    self.search = search;
    self
  }

  pub fn initial_chunk(&self) -> usize {
    self.initial_chunk
  }

  pub fn grow_chunk(&self) -> usize {
    self.grow_chunk
  }

  pub fn search_mode(&self) -> SearchMode {
    self.search
  }
}

fn chunk(bytes: usize) -> usize {
  align!(bytes.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let config = HeapConfig::default();

    assert_eq!(CHUNK_SIZE, config.initial_chunk());
    assert_eq!(CHUNK_SIZE, config.grow_chunk());
    assert_eq!(SearchMode::NextFit, config.search_mode());
  }

  #[test]
  fn test_chunks_are_rounded_and_clamped() {
    let config = HeapConfig::default().with_initial_chunk(100).with_grow_chunk(1);

    assert_eq!(104, config.initial_chunk());
    assert_eq!(MIN_BLOCK_SIZE, config.grow_chunk());
  }
}
