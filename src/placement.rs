//! Placement policy: chooses between mapping and heap placement, performs
//! the one-time heap preallocation, runs best-fit search with lazy
//! coalescing, and falls back to growing the topmost heap block.

use crate::align;
use crate::block::{self, BlockHeader, Status};
use crate::syscall::Syscalls;
use crate::{BlockAllocator, MALLOC_THRESHOLD, WORD_ALIGN};
use std::ptr;

impl<S: Syscalls> BlockAllocator<S> {
  /// `malloc`. Requests `n` bytes; the mapping threshold is
  /// [`MALLOC_THRESHOLD`] (128 KiB). Returns null when `align(n) == 0`.
  ///
  /// # Safety
  /// Must not be called concurrently with any other entry point on the
  /// same allocator — see the crate's concurrency notes.
  pub unsafe fn alloc(&self, n: usize) -> *mut u8 {
    unsafe { self.alloc_inner(n, MALLOC_THRESHOLD, false) }
  }

  /// `calloc`. Requests `nmemb * size` bytes, zero-filled. The mapping
  /// threshold here is the OS page size rather than [`MALLOC_THRESHOLD`] —
  /// large zeroed allocations are expected to come from freshly-mapped
  /// pages, which the kernel already hands back zeroed.
  ///
  /// # Safety
  /// See [`BlockAllocator::alloc`].
  pub unsafe fn zeroed_alloc(&self, nmemb: usize, size: usize) -> *mut u8 {
    let requested = nmemb.wrapping_mul(size);
    let threshold = self.calls().page_size();
    unsafe { self.alloc_inner(requested, threshold, true) }
  }

  unsafe fn alloc_inner(&self, requested: usize, threshold: usize, zero_fill: bool) -> *mut u8 {
    let s = align!(requested);
    if s == 0 {
      return ptr::null_mut();
    }

    let h = block::header_size();

    let result = if s + h >= threshold {
      unsafe { self.place_mapped(s) }
    } else if !*self.preallocated() {
      unsafe { self.place_first_heap_touch(s) }
    } else {
      unsafe { self.place_reuse_or_grow(s, h) }
    };

    if zero_fill && !result.is_null() {
      unsafe { ptr::write_bytes(result, 0, s) };
    }

    result
  }

  unsafe fn place_mapped(&self, s: usize) -> *mut u8 {
    unsafe {
      let h = block::header_size();
      let base = self.calls().map_pages(s + h);
      let header = base as *mut BlockHeader;
      ptr::write(header, BlockHeader::new(s, Status::Mapped, ptr::null_mut()));
      self.registry().insert(header);
      tracing::debug!(size = s, "allocated via map path");
      block::address_of(header)
    }
  }

  /// First touch always claims the full [`MALLOC_THRESHOLD`] arena via a
  /// single break move, regardless of the triggering request's own size or
  /// threshold — `zeroed_alloc`'s page-size threshold only governs the
  /// map-path decision above, not this one. The arena is then split down to
  /// the caller's request, leaving the remainder as an immediately-reusable
  /// free trailer rather than handing the whole arena to the first caller.
  unsafe fn place_first_heap_touch(&self, s: usize) -> *mut u8 {
    unsafe {
      *self.preallocated() = true;

      let h = block::header_size();
      let base = self.calls().request_break(MALLOC_THRESHOLD as isize);
      let header = base as *mut BlockHeader;
      ptr::write(
        header,
        BlockHeader::new(MALLOC_THRESHOLD - h, Status::HeapAlloc, ptr::null_mut()),
      );
      self.registry().insert(header);
      tracing::debug!(threshold = MALLOC_THRESHOLD, "preallocated heap arena");
      block::address_of(self.split(header, s))
    }
  }

  unsafe fn place_reuse_or_grow(&self, s: usize, h: usize) -> *mut u8 {
    unsafe {
      let found = self.find_fit(s);
      if !found.is_null() {
        return block::address_of(found);
      }

      let base = self.calls().request_break((s + h) as isize);
      let header = base as *mut BlockHeader;
      ptr::write(header, BlockHeader::new(s, Status::HeapAlloc, ptr::null_mut()));
      self.registry().insert(header);
      tracing::debug!(size = s, "grew heap for new block");
      block::address_of(header)
    }
  }

  /// Best-fit search with lazy coalescing: merges adjacent free runs, then
  /// picks the smallest free block that fits, splitting off any excess.
  /// Falls back to extending the topmost heap block via the break when no
  /// free block is large enough. Returns null if neither succeeds.
  pub(crate) unsafe fn find_fit(&self, s: usize) -> *mut BlockHeader {
    unsafe {
      let h = block::header_size();
      let registry = self.registry();

      let mut current = registry.head();
      while !current.is_null() {
        loop {
          let next = (*current).next;
          if next.is_null() || !(*current).is_free() || !(*next).is_free() {
            break;
          }
          (*current).size += (*next).size + h;
          (*current).next = (*next).next;
        }
        current = (*current).next;
      }

      let mut best: *mut BlockHeader = ptr::null_mut();
      let mut current = registry.head();
      while !current.is_null() {
        if (*current).is_free() && (*current).size >= s && (best.is_null() || (*current).size < (*best).size) {
          best = current;
        }
        current = (*current).next;
      }

      if !best.is_null() {
        (*best).status = Status::HeapAlloc;
        return self.split(best, s);
      }

      let last = registry.last_heap();
      if !last.is_null() && (*last).is_free() {
        let grow_by = s - (*last).size;
        self.calls().request_break(grow_by as isize);
        (*last).size = s;
        (*last).status = Status::HeapAlloc;
        return last;
      }

      ptr::null_mut()
    }
  }

  /// Carves a trailing free block from `block` iff enough room remains for
  /// a usable trailer (`payload >= s + H + A`). Otherwise `block` is
  /// returned unsplit at its original, larger size.
  pub(crate) unsafe fn split(&self, block: *mut BlockHeader, s: usize) -> *mut BlockHeader {
    unsafe {
      let h = block::header_size();
      let payload = (*block).size;

      if payload >= s + h + WORD_ALIGN {
        let trailer = (block as *mut u8).add(h + s) as *mut BlockHeader;
        ptr::write(trailer, BlockHeader::new(payload - s - h, Status::Free, (*block).next));
        (*block).size = s;
        (*block).next = trailer;
      }

      block
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::block::{self, Status};
  use crate::syscall::mock::MockCalls;
  use crate::BlockAllocator;

  unsafe fn status_of(ptr: *mut u8) -> Status {
    unsafe { (*block::descriptor_of(ptr)).status }
  }

  unsafe fn size_of_block(ptr: *mut u8) -> usize {
    unsafe { (*block::descriptor_of(ptr)).size }
  }

  #[test]
  fn small_first_alloc_triggers_preallocation() {
    let allocator = BlockAllocator::new(MockCalls::new());

    unsafe {
      let p1 = allocator.alloc(100);
      assert!(!p1.is_null());
      assert_eq!(allocator.calls().break_moves(), &[131072]);

      let p2 = allocator.alloc(200);
      assert!(!p2.is_null());
      // Second small alloc is served from the preallocated arena: no
      // further break moves.
      assert_eq!(allocator.calls().break_moves(), &[131072]);
    }
  }

  #[test]
  fn large_alloc_takes_map_path() {
    let allocator = BlockAllocator::new(MockCalls::new());
    let h = block::header_size();

    unsafe {
      let p = allocator.alloc(200_000);
      assert!(!p.is_null());
      assert_eq!(allocator.calls().map_lengths(), &[200_000 + h]);
      assert_eq!(status_of(p), Status::Mapped);

      allocator.release(p);
      assert_eq!(allocator.calls().unmap_lengths(), &[200_000 + h]);
    }
  }

  #[test]
  fn split_and_reuse_trailer() {
    let allocator = BlockAllocator::new(MockCalls::new());
    let h = block::header_size();

    unsafe {
      let p = allocator.alloc(100);
      allocator.release(p);

      let reused = allocator.alloc(48);
      assert_eq!(reused, p);

      let trailer = allocator.alloc(16);
      assert_eq!(trailer, (p as usize + 48 + h) as *mut u8);
    }
  }

  #[test]
  fn coalesce_across_three_neighbors() {
    let allocator = BlockAllocator::new(MockCalls::new());
    let h = block::header_size();

    unsafe {
      let a = allocator.alloc(64);
      let b = allocator.alloc(96);
      let c = allocator.alloc(32);

      let a_size = size_of_block(a);
      let b_size = size_of_block(b);
      let c_size = size_of_block(c);

      allocator.release(a);
      allocator.release(c);
      allocator.release(b);

      let before = allocator.calls().break_moves().len();

      let merged = allocator.alloc(a_size + b_size + c_size + 2 * h);
      assert_eq!(merged, a);
      assert_eq!(allocator.calls().break_moves().len(), before);
    }
  }

  #[test]
  fn zero_sized_request_returns_null() {
    let allocator = BlockAllocator::new(MockCalls::new());
    unsafe {
      assert!(allocator.alloc(0).is_null());
    }
  }

  #[test]
  fn zeroed_alloc_zero_fills_payload() {
    let allocator = BlockAllocator::new(MockCalls::new());

    unsafe {
      let p = allocator.zeroed_alloc(16, 8) as *mut u64;
      for i in 0..16 {
        assert_eq!(*p.add(i), 0);
        p.add(i).write(0xAAAA_AAAA_AAAA_AAAA);
      }
    }
  }
}
