//! # A block-based general-purpose allocator
//!
//! This crate replaces the C standard library's `malloc`/`calloc`/
//! `realloc`/`free` family with a single-threaded, process-wide allocator
//! built on two OS primitives: `sbrk` to grow the heap in place, and
//! anonymous `mmap` for requests too large to keep on the heap.
//!
//! ## Overview
//!
//! ```text
//!   Request size decides the path:
//!
//!   ┌─────────────────────────────────────────────────────────────────┐
//!   │  size + header >= MALLOC_THRESHOLD (128 KiB)                    │
//!   │        │                                                        │
//!   │        ├── yes ──► anonymous mmap, own block, never split       │
//!   │        │                                                        │
//!   │        └── no ───► heap path:                                   │
//!   │                      first touch ever?                          │
//!   │                        ├── yes ─► sbrk(128 KiB), split to fit    │
//!   │                        └── no ──► best-fit search + coalescing,  │
//!   │                                   else extend the break          │
//!   └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Crate structure
//!
//! ```text
//!   (this crate)
//!   ├── align      - word-alignment helpers (align!)
//!   ├── block      - the inline BlockHeader descriptor
//!   ├── registry   - the singly-linked block list and its ordering invariant
//!   ├── syscall    - the Syscalls trait + production and test backends
//!   ├── placement  - alloc/zeroed_alloc: mapping, first touch, best-fit
//!   ├── resize     - resize: split, grow-in-place, relocate-and-copy
//!   └── release    - release: free or unmap
//! ```
//!
//! ## Concurrency
//!
//! A single [`BlockAllocator`] is not safe to drive from more than one
//! thread at a time: its entry points take `&self` and mutate shared state
//! through [`std::cell::UnsafeCell`] with no locking. The process-wide
//! singleton behind [`alloc`]/[`zeroed_alloc`]/[`resize`]/[`release`] and
//! the [`GlobalAlloc`] impl is exposed this way because the C functions it
//! replaces make the same assumption; callers that need to allocate from
//! more than one thread must serialize access themselves.
//!
//! ## Safety
//!
//! Every entry point is `unsafe`: callers must uphold the usual C allocator
//! contract (pointers came from this allocator, aren't used after release,
//! aren't released twice except where documented as tolerated).

pub mod align;
pub mod block;
pub mod registry;
pub mod syscall;

mod placement;
mod release;
mod resize;

use registry::Registry;
use std::alloc::{GlobalAlloc, Layout};
use std::cell::UnsafeCell;
use std::sync::OnceLock;
use syscall::{Syscalls, SystemCalls};

/// Word size every payload and header is aligned to.
pub const WORD_ALIGN: usize = std::mem::size_of::<usize>();

/// The boundary, in bytes of `align(n) + header`, above which a request is
/// served by its own anonymous mapping instead of the managed heap. Also
/// the fixed size of the one-time heap preallocation — see
/// [`placement`]'s first-touch path.
pub const MALLOC_THRESHOLD: usize = 128 * 1024;

/// The allocator itself: a block registry plus a syscall backend, generic
/// so tests can swap [`syscall::SystemCalls`] for an in-memory double.
///
/// # Safety
/// Not [`Sync`] in any meaningful sense — see the crate's concurrency
/// notes. The unsafe `impl` below only exists so a single static instance
/// can back [`alloc`]/[`zeroed_alloc`]/[`resize`]/[`release`], matching the
/// process-wide state the C allocator this crate replaces assumes.
pub struct BlockAllocator<S: Syscalls = SystemCalls> {
  registry: UnsafeCell<Registry>,
  calls: UnsafeCell<S>,
  preallocated: UnsafeCell<bool>,
}

unsafe impl<S: Syscalls> Sync for BlockAllocator<S> {}

impl<S: Syscalls> BlockAllocator<S> {
  pub const fn new(calls: S) -> Self {
    Self {
      registry: UnsafeCell::new(Registry::new()),
      calls: UnsafeCell::new(calls),
      preallocated: UnsafeCell::new(false),
    }
  }

  #[allow(clippy::mut_from_ref)]
  fn registry(&self) -> &mut Registry {
    unsafe { &mut *self.registry.get() }
  }

  #[allow(clippy::mut_from_ref)]
  fn calls(&self) -> &mut S {
    unsafe { &mut *self.calls.get() }
  }

  #[allow(clippy::mut_from_ref)]
  fn preallocated(&self) -> &mut bool {
    unsafe { &mut *self.preallocated.get() }
  }
}

impl Default for BlockAllocator<SystemCalls> {
  fn default() -> Self {
    Self::new(SystemCalls)
  }
}

static GLOBAL: OnceLock<BlockAllocator<SystemCalls>> = OnceLock::new();

fn global() -> &'static BlockAllocator<SystemCalls> {
  GLOBAL.get_or_init(BlockAllocator::default)
}

/// `malloc` against the process-wide allocator. See
/// [`BlockAllocator::alloc`].
///
/// # Safety
/// See [`BlockAllocator::alloc`].
pub unsafe fn alloc(n: usize) -> *mut u8 {
  unsafe { global().alloc(n) }
}

/// `calloc` against the process-wide allocator. See
/// [`BlockAllocator::zeroed_alloc`].
///
/// # Safety
/// See [`BlockAllocator::zeroed_alloc`].
pub unsafe fn zeroed_alloc(nmemb: usize, size: usize) -> *mut u8 {
  unsafe { global().zeroed_alloc(nmemb, size) }
}

/// `realloc` against the process-wide allocator. See
/// [`BlockAllocator::resize`].
///
/// # Safety
/// See [`BlockAllocator::resize`].
pub unsafe fn resize(ptr: *mut u8, n: usize) -> *mut u8 {
  unsafe { global().resize(ptr, n) }
}

/// `free` against the process-wide allocator. See
/// [`BlockAllocator::release`].
///
/// # Safety
/// See [`BlockAllocator::release`].
pub unsafe fn release(ptr: *mut u8) {
  unsafe { global().release(ptr) }
}

/// Lets this allocator stand in for the process's global allocator via
/// `#[global_allocator]`. Layout requests are served at whatever alignment
/// [`WORD_ALIGN`] provides; callers requesting a stricter alignment than
/// that are not supported by the underlying block registry.
unsafe impl GlobalAlloc for BlockAllocator<SystemCalls> {
  unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
    unsafe { BlockAllocator::alloc(self, layout.size()) }
  }

  unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
    unsafe { BlockAllocator::release(self, ptr) }
  }

  unsafe fn realloc(&self, ptr: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
    unsafe { BlockAllocator::resize(self, ptr, new_size) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use syscall::mock::MockCalls;

  #[test]
  fn fresh_allocator_has_not_preallocated() {
    let allocator = BlockAllocator::new(MockCalls::new());
    assert!(!*allocator.preallocated());
  }

  #[test]
  fn global_singleton_is_lazily_initialised_once() {
    let a = global() as *const _;
    let b = global() as *const _;
    assert_eq!(a, b);
  }
}
