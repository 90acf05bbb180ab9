//! The syscall adapter: the only place this crate talks to the kernel.
//!
//! Two address-space sources are wrapped behind the [`Syscalls`] trait —
//! a movable program break for small allocations, and anonymous private
//! page mappings for large ones. Both are fatal on failure: there is no
//! byte of memory left to hand back to a caller if the OS refuses, so the
//! adapter logs the failing call and terminates the process with the
//! system `errno`, mirroring the original implementation's `DIE` macro.

use libc::{c_void, intptr_t};
use std::io;
use std::ptr;

/// Abstracts the three OS operations the allocator needs so that the
/// placement/resize/release policies can be exercised against an in-memory
/// double in tests instead of the real process break.
pub trait Syscalls {
  /// Moves the program break by `delta` bytes. Returns the *previous*
  /// break on success. Fatal on failure.
  ///
  /// # Safety
  /// Must only be called while the caller holds exclusive access to the
  /// allocator's registry (see the crate's concurrency notes).
  unsafe fn request_break(&mut self, delta: isize) -> *mut u8;

  /// Obtains an anonymous, private, read/write mapping of at least
  /// `length` bytes. Fatal on failure.
  ///
  /// # Safety
  /// See [`Syscalls::request_break`].
  unsafe fn map_pages(&mut self, length: usize) -> *mut u8;

  /// Releases a mapping previously returned by [`Syscalls::map_pages`].
  /// Fatal on failure.
  ///
  /// # Safety
  /// `base`/`length` must match a prior `map_pages` call exactly.
  unsafe fn unmap_pages(&mut self, base: *mut u8, length: usize);

  /// The OS page size, used as the mapping threshold for `zeroed_alloc`.
  fn page_size(&self) -> usize;
}

/// Production [`Syscalls`] backend: real `sbrk`/`mmap`/`munmap`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemCalls;

impl Syscalls for SystemCalls {
  unsafe fn request_break(&mut self, delta: isize) -> *mut u8 {
    let previous = unsafe { libc::sbrk(delta as intptr_t) };
    if previous == usize::MAX as *mut c_void {
      fatal("sbrk");
    }
    previous as *mut u8
  }

  unsafe fn map_pages(&mut self, length: usize) -> *mut u8 {
    let mapping = unsafe {
      libc::mmap(
        ptr::null_mut(),
        length,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };
    if mapping == libc::MAP_FAILED {
      fatal("mmap");
    }
    mapping as *mut u8
  }

  unsafe fn unmap_pages(&mut self, base: *mut u8, length: usize) {
    let result = unsafe { libc::munmap(base as *mut c_void, length) };
    if result == -1 {
      fatal("munmap");
    }
  }

  fn page_size(&self) -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
  }
}

/// Logs the failing call and its `errno`, then terminates the process.
///
/// There is no recoverable path here: every policy above this adapter
/// assumes the OS call it just made either succeeded or the process is
/// already gone.
#[cold]
fn fatal(call: &str) -> ! {
  let err = io::Error::last_os_error();
  tracing::error!(call, error = %err, "syscall failed, terminating process");
  std::process::exit(err.raw_os_error().unwrap_or(1));
}

#[cfg(test)]
pub mod mock;
