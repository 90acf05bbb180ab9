use std::io::Read;
use std::ptr;

use block_manager::{alloc, release, resize};
use libc::sbrk;

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, `gdb`, or just visually track how the program break changes.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  tracing_subscriber::fmt::init();

  unsafe {
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) A small first request. Below 128 KiB, so it preallocates the heap
    //    in one `sbrk` move and hands back a trailer-split block.
    // --------------------------------------------------------------------
    let first_block = alloc(100);
    println!("\n[1] alloc(100) -> {:?}", first_block);
    (first_block as *mut u32).write(0xDEADBEEF);
    println!("[1] Value written = 0x{:X}", (first_block as *mut u32).read());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) A second small request. Served from the preallocated trailer with
    //    no further `sbrk` call.
    // --------------------------------------------------------------------
    let second_block = alloc(12);
    println!("\n[2] alloc(12) -> {:?}", second_block);
    ptr::write_bytes(second_block, 0xAB, 12);
    println!("[2] Initialized second block with 0xAB");

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Release the second block, then grow the first one past it. With
    //    second_block now free and physically adjacent, resize absorbs it
    //    in place instead of relocating.
    // --------------------------------------------------------------------
    release(second_block);
    println!("\n[3] Released second_block at {:?}", second_block);

    let grown = resize(first_block, 256);
    println!(
      "[3] resize(first_block, 256) == first_block? {}",
      if grown == first_block { "yes, grew in place" } else { "no, relocated" }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) A large request crosses the mapping threshold and goes straight
    //    to an anonymous mmap — the program break does not move.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");

    let big_block = alloc(256 * 1024);
    println!("\n[4] alloc(256 KiB) -> {:?}", big_block);

    print_program_break("after large alloc");
    release(big_block);

    println!("\n[5] End of demo. Process will exit and the OS will reclaim the rest.");
  }
}
