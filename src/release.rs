//! Release policy: returns a heap block to the free list, or unmaps a
//! mapped block outright. Never physically shrinks the break — the
//! freed heap space stays under management for the next best-fit search.

use crate::block::{self, Status};
use crate::syscall::Syscalls;
use crate::BlockAllocator;

impl<S: Syscalls> BlockAllocator<S> {
  /// `free`. Null is a no-op. A block already `Free` is a no-op — this
  /// tolerates a caller-contract violation (double free) rather than
  /// corrupting the registry, at the cost of silently masking the bug.
  ///
  /// # Safety
  /// `ptr` must be null or a live address previously returned by
  /// [`BlockAllocator::alloc`], [`BlockAllocator::zeroed_alloc`], or
  /// [`BlockAllocator::resize`].
  pub unsafe fn release(&self, ptr: *mut u8) {
    unsafe {
      if ptr.is_null() {
        return;
      }

      let header = block::descriptor_of(ptr);

      match (*header).status {
        Status::Free => {}
        Status::HeapAlloc => {
          (*header).status = Status::Free;
          tracing::debug!(size = (*header).size, "released heap block");
        }
        Status::Mapped => {
          let size = (*header).size;
          self.registry().remove(header);
          self.calls().unmap_pages(header as *mut u8, size + block::header_size());
          tracing::debug!(size, "unmapped block");
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::block;
  use crate::syscall::mock::MockCalls;
  use crate::BlockAllocator;

  #[test]
  fn release_of_null_is_noop() {
    let allocator = BlockAllocator::new(MockCalls::new());
    unsafe { allocator.release(std::ptr::null_mut()) };
  }

  #[test]
  fn heap_block_becomes_free_and_stays_in_registry() {
    let allocator = BlockAllocator::new(MockCalls::new());

    unsafe {
      let p = allocator.alloc(64);
      allocator.release(p);

      assert_eq!((*block::descriptor_of(p)).status, block::Status::Free);
      assert_eq!(allocator.registry().head(), block::descriptor_of(p));
    }
  }

  #[test]
  fn mapped_block_is_unmapped_and_unlinked() {
    let allocator = BlockAllocator::new(MockCalls::new());
    let h = block::header_size();

    unsafe {
      let p = allocator.alloc(200_000);
      let header = block::descriptor_of(p);

      allocator.release(p);

      assert_eq!(allocator.calls().unmap_lengths(), &[200_000 + h]);
      assert!(allocator.registry().head().is_null() || allocator.registry().head() != header);
    }
  }

  #[test]
  fn double_release_of_heap_block_is_noop() {
    let allocator = BlockAllocator::new(MockCalls::new());

    unsafe {
      let p = allocator.alloc(64);
      allocator.release(p);
      allocator.release(p);

      assert_eq!((*block::descriptor_of(p)).status, block::Status::Free);
    }
  }
}
