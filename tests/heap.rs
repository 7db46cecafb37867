use std::ptr::NonNull;

use tagalloc::{
  AllocError, CHUNK_SIZE, DSIZE, HeapConfig, ImplicitAllocator, MIN_BLOCK_SIZE, MemRegion, RegionError, SearchMode,
  WSIZE,
};
use test_log::test;

/// Xorshift generator for reproducible traces.
struct Trace(u64);

impl Trace {
  fn next(&mut self) -> u64 {
    self.0 ^= self.0 << 13;
    self.0 ^= self.0 >> 7;
    self.0 ^= self.0 << 17;
    self.0
  }

  fn below(
    &mut self,
    n: u64,
  ) -> u64 {
    self.next() % n
  }
}

struct Live {
  ptr: NonNull<u8>,
  size: usize,
  fill: u8,
}

fn assert_intact(live: &[Live]) {
  for block in live {
    let bytes = unsafe { std::slice::from_raw_parts(block.ptr.as_ptr(), block.size) };
    assert!(bytes.iter().all(|&b| b == block.fill), "payload at {:p} was overwritten", block.ptr);
  }
}

fn assert_disjoint(live: &[Live]) {
  let mut ranges: Vec<_> = live
    .iter()
    .map(|b| (b.ptr.as_ptr() as usize, b.ptr.as_ptr() as usize + b.size))
    .collect();
  ranges.sort();

  for pair in ranges.windows(2) {
    assert!(pair[0].1 <= pair[1].0, "{:x?} overlaps {:x?}", pair[0], pair[1]);
  }
}

fn run_trace(
  search: SearchMode,
  seed: u64,
) {
  let config = HeapConfig::default().with_search_mode(search);
  let mut heap = ImplicitAllocator::init_with(MemRegion::new(8 << 20), config).unwrap();
  let mut rng = Trace(seed);
  let mut live: Vec<Live> = Vec::new();

  for step in 0..2_000u32 {
    match rng.below(10) {
      0..=5 => {
        let size = 1 + rng.below(600) as usize;
        let ptr = heap.try_allocate(size).unwrap().unwrap();
        let fill = step as u8;

        assert_eq!(0, ptr.as_ptr() as usize % DSIZE);
        unsafe { ptr.as_ptr().write_bytes(fill, size) };

        live.push(Live { ptr, size, fill });
      }
      6..=8 if !live.is_empty() => {
        let victim = live.swap_remove(rng.below(live.len() as u64) as usize);
        unsafe { heap.deallocate(victim.ptr.as_ptr()) };

        let report = heap.check_heap(false);
        assert!(report.is_ok(), "step {step}:\n{report}");
      }
      _ if !live.is_empty() => {
        let index = rng.below(live.len() as u64) as usize;
        let size = 1 + rng.below(1200) as usize;
        let old = &live[index];

        let ptr = unsafe { heap.reallocate(old.ptr.as_ptr(), size) }.unwrap().unwrap();
        let kept = old.size.min(size);
        let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), kept) };
        assert!(bytes.iter().all(|&b| b == old.fill));

        let fill = old.fill;
        unsafe { ptr.as_ptr().write_bytes(fill, size) };
        live[index] = Live { ptr, size, fill };
      }
      _ => {}
    }

    assert_disjoint(&live);
  }

  assert_intact(&live);

  for block in live.drain(..) {
    unsafe { heap.deallocate(block.ptr.as_ptr()) };
  }

  let report = heap.check_heap(false);
  assert!(report.is_ok(), "{report}");
  assert_eq!(1, report.blocks.len(), "everything should merge back into one block");
  assert_eq!(heap.heap_size() - 4 * WSIZE, report.free_bytes());
}

#[test]
fn test_random_trace_next_fit() {
  run_trace(SearchMode::NextFit, 0x9E37_79B9_7F4A_7C15);
}

#[test]
fn test_random_trace_first_fit() {
  run_trace(SearchMode::FirstFit, 0xD1B5_4A32_D192_ED03);
}

#[test]
fn test_unrelated_operations_leave_payloads_alone() {
  let mut heap = ImplicitAllocator::init(MemRegion::new(1 << 20)).unwrap();

  let keep = heap.allocate(256);
  unsafe { keep.write_bytes(0x42, 256) };

  let others: Vec<_> = (1..40).map(|i| heap.allocate(i * 24)).collect();
  for (i, &p) in others.iter().enumerate() {
    if i % 3 != 0 {
      unsafe { heap.deallocate(p) };
    }
  }
  heap.allocate(10_000);

  let bytes = unsafe { std::slice::from_raw_parts(keep, 256) };
  assert!(bytes.iter().all(|&b| b == 0x42));
  assert!(heap.check_heap(false).is_ok());
}

#[test]
fn test_zero_size_allocation_changes_nothing() {
  let mut heap = ImplicitAllocator::init(MemRegion::new(1 << 20)).unwrap();
  heap.allocate(64);

  let before = heap.check_heap(false);

  assert!(heap.allocate(0).is_null());
  assert_eq!(Ok(None), heap.try_allocate(0));

  assert_eq!(before, heap.check_heap(false));
}

#[test]
fn test_freed_block_is_reused_without_growing() {
  let config = HeapConfig::default().with_search_mode(SearchMode::FirstFit);
  let mut heap = ImplicitAllocator::init_with(MemRegion::new(1 << 20), config).unwrap();

  let p1 = heap.allocate(100);
  let p2 = heap.allocate(200);

  assert!(!p1.is_null() && !p2.is_null());
  assert_ne!(p1, p2);
  assert!(p1 as usize + 100 <= p2 as usize);

  let size = heap.heap_size();
  unsafe { heap.deallocate(p1) };

  assert_eq!(p1, heap.allocate(90));
  assert_eq!(size, heap.heap_size());
}

#[test]
fn test_next_fit_does_not_grow_when_tail_fits() {
  let mut heap = ImplicitAllocator::init(MemRegion::new(1 << 20)).unwrap();

  let p1 = heap.allocate(100);
  heap.allocate(200);
  let used = heap.region().used();

  unsafe { heap.deallocate(p1) };
  let p3 = heap.allocate(90);

  assert!(!p3.is_null());
  assert_eq!(used, heap.region().used());
}

#[test]
fn test_large_request_extends_the_heap() {
  let mut heap = ImplicitAllocator::init(MemRegion::new(1 << 20)).unwrap();
  let before = heap.heap_size();

  let p = heap.try_allocate(2 * CHUNK_SIZE).unwrap().unwrap();

  assert!(heap.heap_size() > before);
  assert!(unsafe { heap.payload_size(p) } >= 2 * CHUNK_SIZE);
  assert_eq!(0, p.as_ptr() as usize % DSIZE);
  assert!(heap.check_heap(false).is_ok());
}

#[test]
fn test_adjacent_frees_merge_into_one_block() {
  let mut heap = ImplicitAllocator::init(MemRegion::new(1 << 20)).unwrap();

  let p1 = heap.allocate(48);
  let p2 = heap.allocate(48);
  let guard = heap.allocate(48);
  assert!(!guard.is_null());

  unsafe {
    heap.deallocate(p1);
    heap.deallocate(p2);
  }

  let report = heap.check_heap(true);
  assert!(report.is_ok(), "{report}");

  let free: Vec<_> = report.free_blocks().collect();
  assert_eq!(2, free.len());
  assert_eq!(p1, free[0].payload.as_ptr());
  assert_eq!(2 * 56, free[0].size());
  assert!(free[0].contains(p2));
}

#[test]
fn test_no_free_fragment_below_minimum() {
  let mut heap = ImplicitAllocator::init(MemRegion::new(1 << 20)).unwrap();

  for size in [1, 7, 8, 9, 15, 16, 17, 23, 24, 25, 4000, 33, 2] {
    heap.allocate(size);
  }

  let report = heap.check_heap(false);
  assert!(report.is_ok(), "{report}");
  assert!(report.blocks.iter().all(|b| b.size() >= MIN_BLOCK_SIZE));
  assert!(report.blocks.iter().all(|b| b.size() % DSIZE == 0));
}

#[test]
fn test_realloc_preserves_prefix() {
  let mut heap = ImplicitAllocator::init(MemRegion::new(1 << 20)).unwrap();

  let p = heap.allocate(40);
  unsafe {
    for i in 0..40 {
      p.add(i).write(i as u8 ^ 0x5C);
    }

    let q = heap.reallocate(p, 4000).unwrap().unwrap().as_ptr();

    for i in 0..40 {
      assert_eq!(i as u8 ^ 0x5C, q.add(i).read());
    }
  }
  assert!(heap.check_heap(false).is_ok());
}

#[test]
fn test_out_of_memory_is_recoverable() {
  let mut heap = ImplicitAllocator::init(MemRegion::new(4 * WSIZE + CHUNK_SIZE)).unwrap();

  let err = heap.try_allocate(CHUNK_SIZE).unwrap_err();
  assert!(matches!(
    err,
    AllocError::OutOfMemory {
      source: RegionError::Exhausted { available: 0, .. },
      ..
    }
  ));

  assert!(heap.check_heap(false).is_ok());
  assert!(!heap.allocate(CHUNK_SIZE / 2).is_null());
}

#[test]
fn test_independent_heaps_coexist() {
  let mut a = ImplicitAllocator::init(MemRegion::new(1 << 16)).unwrap();
  let mut b = ImplicitAllocator::init(MemRegion::new(1 << 16)).unwrap();

  let pa = a.allocate(32);
  let pb = b.allocate(32);

  unsafe {
    pa.write_bytes(1, 32);
    pb.write_bytes(2, 32);
    a.deallocate(pa);
  }

  assert!(a.check_heap(false).is_ok());
  assert!(b.check_heap(false).is_ok());
  assert_eq!(2, unsafe { pb.read() });
}

#[test]
fn test_borrowed_region_outlives_heap() {
  let mut region = MemRegion::new(1 << 16);

  {
    let mut heap = ImplicitAllocator::init(&mut region).unwrap();
    assert!(!heap.allocate(100).is_null());
  }

  assert_eq!(4 * WSIZE + CHUNK_SIZE, region.used());
}
