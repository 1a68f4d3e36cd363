//! Runs a few allocations with the strategy given as first argument
//! (`first-fit` by default) and prints the heap after every step.
//!
//! ```text
//! cargo run --example heap_walk -- best-fit
//! ```

use std::{env, process, time::Instant};

use fitalloc::{MemAlloc, Strategy};

fn print_blocks(allocator: &MemAlloc) {
    println!("Block List:");
    for (i, block) in allocator.blocks().enumerate() {
        println!(
            "  [{i}] addr={:?} size={} free={}",
            block.addr, block.size, block.is_free
        );
    }
    println!("  {}", allocator.stats());
}

fn timed_alloc(allocator: &mut MemAlloc, size: usize) -> *mut u8 {
    let start = Instant::now();
    let addr = allocator.alloc(size);
    let elapsed = start.elapsed();

    if addr.is_null() {
        println!("alloc({size}) failed after {elapsed:?}");
    } else {
        println!("alloc({size}) -> {addr:?} in {elapsed:?}");
    }

    addr
}

fn timed_free(allocator: &mut MemAlloc, addr: *mut u8) {
    let start = Instant::now();
    unsafe { allocator.free(addr) };
    println!("free({addr:?}) in {:?}", start.elapsed());
}

fn main() {
    let strategy = match env::args().nth(1).map(|arg| arg.parse::<Strategy>()) {
        None => Strategy::default(),
        Some(Ok(strategy)) => strategy,
        Some(Err(err)) => {
            eprintln!("{err}");
            process::exit(1);
        }
    };

    let mut allocator = MemAlloc::new();
    if let Err(err) = allocator.init(strategy) {
        eprintln!("could not initialize the allocator: {err}");
        process::exit(1);
    }
    println!("Allocator initialized with {strategy}.");

    let p = timed_alloc(&mut allocator, 100);
    timed_free(&mut allocator, p);
    let q = timed_alloc(&mut allocator, 50);
    timed_free(&mut allocator, q);
    print_blocks(&allocator);

    // Leave free holes of different sizes and see which one gets picked.
    let mut holes = Vec::new();
    for size in [500, 50, 300] {
        holes.push(timed_alloc(&mut allocator, size));
        timed_alloc(&mut allocator, 1);
    }
    for hole in holes {
        timed_free(&mut allocator, hole);
    }
    print_blocks(&allocator);

    timed_alloc(&mut allocator, 40);
    timed_alloc(&mut allocator, 64 * 1024);
    print_blocks(&allocator);

    allocator.collect();
}
