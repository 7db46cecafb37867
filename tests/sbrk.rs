use std::sync::Mutex;

use tagalloc::{DSIZE, Region, RegionError, SbrkRegion};
use test_log::test;

/// The program break is process-wide; tests that move it take this lock.
static BREAK: Mutex<()> = Mutex::new(());

#[test]
fn test_first_grow_is_aligned() {
  let _guard = BREAK.lock().unwrap_or_else(|e| e.into_inner());
  let mut region = SbrkRegion::new();

  let start = region.grow(24).unwrap();

  assert_eq!(0, start.as_ptr() as usize % DSIZE);
  assert!(SbrkRegion::program_break() as usize >= start.as_ptr() as usize + 24);
}

#[test]
fn test_contiguous_grows_follow_each_other() {
  let _guard = BREAK.lock().unwrap_or_else(|e| e.into_inner());
  let mut region = SbrkRegion::new();

  let first = region.grow(32).unwrap();
  let second = region.grow(64).unwrap();

  assert_eq!(first.as_ptr() as usize + 32, second.as_ptr() as usize);
}

#[test]
fn test_discontiguous_grow_restores_break() {
  let _guard = BREAK.lock().unwrap_or_else(|e| e.into_inner());
  let mut region = SbrkRegion::new();

  let start = region.grow(64).unwrap();

  // Someone else moves the break past our end.
  let foreign = unsafe { libc::sbrk(4096) };
  assert_ne!(usize::MAX, foreign as usize);

  let before = SbrkRegion::program_break();

  assert_eq!(
    Err(RegionError::Discontiguous {
      expected: start.as_ptr() as usize + 64,
      found: before as usize,
    }),
    region.grow(4096)
  );
  assert_eq!(before, SbrkRegion::program_break());
}
