//! Word-alignment helpers.
//!
//! Every block header and payload size this crate hands out is rounded up
//! to `A = 8` bytes (see [`crate::WORD_ALIGN`]). Alignment beyond this fixed
//! word size is out of scope — see the crate's Non-goals.

/// Rounds `$value` up to the next multiple of the machine word size (8 bytes
/// on the targets this crate supports).
///
/// # Examples
///
/// ```
/// use block_manager::align;
///
/// assert_eq!(align!(1), 8);
/// assert_eq!(align!(8), 8);
/// assert_eq!(align!(9), 16);
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + $crate::WORD_ALIGN - 1) & !($crate::WORD_ALIGN - 1)
  };
}

#[cfg(test)]
mod tests {
  use crate::WORD_ALIGN;

  #[test]
  fn test_align() {
    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (WORD_ALIGN * i + 1)..=(WORD_ALIGN * (i + 1));
      let expected_alignment = WORD_ALIGN * (i + 1);
      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
      }
    }
  }

  #[test]
  fn zero_aligns_to_zero() {
    assert_eq!(align!(0), 0);
  }
}
