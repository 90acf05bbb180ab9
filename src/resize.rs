//! Resize policy: shrink-in-place via split, grow-in-place via
//! right-neighbor absorption or break extension, otherwise
//! relocate-and-copy.

use crate::align;
use crate::block::{self, BlockHeader, Status};
use crate::syscall::Syscalls;
use crate::{BlockAllocator, MALLOC_THRESHOLD};
use std::ptr;

impl<S: Syscalls> BlockAllocator<S> {
  /// `realloc`. See the crate docs for the full decision table; in short:
  /// null `ptr` behaves like [`BlockAllocator::alloc`], `n == 0` behaves
  /// like [`BlockAllocator::release`], and resizing a block that is
  /// already `Free` is a caller-contract violation (returns null, state
  /// unchanged).
  ///
  /// # Safety
  /// `ptr` must be null or a live address previously returned by this
  /// allocator's `alloc`/`zeroed_alloc`/`resize`, not yet released.
  pub unsafe fn resize(&self, ptr: *mut u8, n: usize) -> *mut u8 {
    unsafe {
      if ptr.is_null() {
        return self.alloc(n);
      }

      let s = align!(n);
      if s == 0 {
        self.release(ptr);
        return ptr::null_mut();
      }

      let header = block::descriptor_of(ptr);
      let h = block::header_size();

      if (*header).is_free() {
        return ptr::null_mut();
      }

      if (*header).is_mapped() || s + h >= MALLOC_THRESHOLD {
        return self.relocate(ptr, header, s);
      }

      if s < (*header).size {
        return block::address_of(self.split(header, s));
      }

      if s == (*header).size {
        return ptr;
      }

      if self.grow(header, s) {
        return block::address_of(header);
      }

      self.relocate(ptr, header, s)
    }
  }

  unsafe fn relocate(&self, ptr: *mut u8, header: *mut BlockHeader, s: usize) -> *mut u8 {
    unsafe {
      let new_ptr = self.alloc(s);
      if !new_ptr.is_null() {
        ptr::copy_nonoverlapping(ptr, new_ptr, (*header).size.min(s));
      }
      self.release(ptr);
      new_ptr
    }
  }

  /// Absorbs consecutive free right-neighbors of `block` until it reaches
  /// payload `s` or the absorption run halts. If it halts because `block`
  /// is itself the topmost heap block, extends via the break instead.
  /// Returns whether the block now has payload `>= s` (it is left
  /// unsplit-to-exact-size by the caller only if this returns `true`).
  pub(crate) unsafe fn grow(&self, block: *mut BlockHeader, s: usize) -> bool {
    unsafe {
      let h = block::header_size();
      let registry = self.registry();

      loop {
        let next = (*block).next;

        if next.is_null() {
          break;
        }

        if !(*next).is_free() {
          return false;
        }

        (*block).size += (*next).size + h;
        (*block).next = (*next).next;

        if (*block).size >= s {
          self.split(block, s);
          return true;
        }
      }

      if registry.last_heap() == block {
        let grow_by = s - (*block).size;
        self.calls().request_break(grow_by as isize);
        (*block).size = s;
        (*block).status = Status::HeapAlloc;
        return true;
      }

      false
    }
  }
}
