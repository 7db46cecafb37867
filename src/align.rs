/// Rounds `value` up to the next multiple of the double word (`DSIZE`),
/// the alignment unit of every block in the heap.
///
/// # Examples
///
/// ```rust
/// use tagalloc::align;
///
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(13), 16);
/// assert_eq!(align!(16), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    $crate::align_to!($value, $crate::DSIZE)
  };
}

/// Rounds `value` up to the next multiple of `unit`, which must be a power
/// of two.
///
/// ```rust
/// use tagalloc::align_to;
///
/// assert_eq!(align_to!(5, 4), 8);
/// assert_eq!(align_to!(4096, 4096), 4096);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $unit:expr) => {
    (($value) + ($unit) - 1) & !(($unit) - 1)
  };
}
