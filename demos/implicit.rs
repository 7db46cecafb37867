use std::{io::Read, ptr};

use tagalloc::{ImplicitAllocator, SbrkRegion};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    SbrkRegion::program_break(),
  );
}

fn print_alloc(
  size: usize,
  addr: *mut u8,
) {
  println!(
    "Allocated {} bytes, address = {:?}, program break = {:?}",
    size,
    addr,
    SbrkRegion::program_break()
  );
}

fn print_heap(heap: &ImplicitAllocator<SbrkRegion>) {
  print!("{}", heap.check_heap(false));
}

fn main() {
  env_logger::init();

  // Initial heap state. Printing first lets stdout set up its buffer before
  // the allocator starts owning the program break.
  print_program_break("start");

  // The heap takes the prologue, the epilogue and one 4 KiB free block
  // from the program break.
  let mut heap = match ImplicitAllocator::init(SbrkRegion::new()) {
    Ok(heap) => heap,
    Err(err) => {
      eprintln!("cannot initialize the heap: {err}");
      std::process::exit(1);
    }
  };

  print_program_break("after init");
  print_heap(&heap);
  block_until_enter_pressed();

  unsafe {
    // --------------------------------------------------------------------
    // 1) Allocate 4 bytes. The smallest block is 16 bytes: header, footer
    //    and one double word of payload.
    // --------------------------------------------------------------------
    let first_block = heap.allocate(4);
    println!("\n[1] Allocate 4 bytes");
    print_alloc(4, first_block);

    let first_ptr = first_block as *mut u32;
    first_ptr.write(0xDEADBEEF);
    println!("[1] Value written to first_block = 0x{:X}", first_ptr.read());

    print_heap(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate 12 bytes: 12 + 8 bytes of tags, rounded up to 24.
    // --------------------------------------------------------------------
    let second_block = heap.allocate(12);
    println!("\n[2] Allocate 12 bytes");
    print_alloc(12, second_block);

    ptr::write_bytes(second_block, 0xAB, 12);
    println!("[2] Initialized second block with 0xAB");

    print_heap(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Allocate an array of u16 and check its alignment.
    // --------------------------------------------------------------------
    let third_block = heap.allocate(32);
    println!("\n[3] Allocate [u16; 16] (observe alignment)");
    print_alloc(32, third_block);

    let third_ptr = third_block as *mut u16;
    for i in 0..16 {
      third_ptr.add(i).write(i as u16);
    }
    println!("[3] Address = {:#X}, addr % 8 = {}", third_block as usize, third_block as usize % 8);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Free the first block. Its neighbours are the prologue and the
    //    second block, both allocated, so it stays a 16 byte free block.
    // --------------------------------------------------------------------
    heap.deallocate(first_block);
    println!("\n[4] Deallocated first_block at {:?}", first_block);
    print_heap(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Free the second block. It merges with the free first block.
    // --------------------------------------------------------------------
    heap.deallocate(second_block);
    println!("\n[5] Deallocated second_block at {:?}", second_block);
    print_heap(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Allocate a large block to observe heap growth.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");

    let big_size = 64 * 1024;
    let big_block = heap.allocate(big_size);
    println!("\n[6] Allocate large 64 KiB block");
    print_alloc(big_size, big_block);

    print_program_break("after large alloc");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 7) Grow the u16 array with realloc. The contents move to a new block.
    // --------------------------------------------------------------------
    match heap.reallocate(third_block, 256) {
      Ok(Some(moved)) => {
        let moved = moved.as_ptr() as *mut u16;
        println!("\n[7] Reallocated {:?} -> {:?}, moved[15] = {}", third_block, moved, moved.add(15).read());
      }
      Ok(None) => println!("\n[7] Reallocation returned no block"),
      Err(err) => println!("\n[7] Reallocation failed: {err}"),
    }

    print_heap(&heap);
  }

  // ----------------------------------------------------------------------
  // 8) End of demo. The heap never shrinks; the OS reclaims it on exit.
  // ----------------------------------------------------------------------
  println!("\n[8] End of example. Process will exit and the OS will reclaim all memory.");
}
