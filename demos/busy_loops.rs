//! Preemptive slicing of CPU-bound threads, with virtual-time accounting

use std::sync::atomic::{AtomicU64, Ordering};

use uthreads::os_thread_vtime_ms;

static COUNTS: [AtomicU64; 3] = [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)];

fn burn(arg: i32) {
    let me = arg as usize;
    loop {
        COUNTS[me].fetch_add(1, Ordering::Relaxed);
        // Thread 0 ends the demo once it has been charged a bit over one
        // preemption window of CPU
        if me == 0 && os_thread_vtime_ms(0).unwrap_or(0) >= 1200 {
            return;
        }
    }
}

fn main() {
    println!("Busy-Loops Demo: three CPU-bound threads, one-second windows");

    uthreads::os_init(4).expect("init failed");
    for i in 0..3 {
        uthreads::os_thread_create(burn, i).expect("create failed");
    }

    println!("Starting...");
    uthreads::os_start().expect("start failed");

    println!("Scheduler stopped; per-thread totals:");
    for tid in 0..3 {
        let ms = os_thread_vtime_ms(tid).expect("vtime query failed");
        let iters = COUNTS[tid].load(Ordering::Relaxed);
        println!("  thread {}: {:>5} ms virtual time, {} iterations", tid, ms, iters);
    }
}
