//! Ping-pong handoff between two threads over binary semaphores

use std::sync::atomic::{AtomicU32, Ordering};

use uthreads::OsBinSem;

static PING: OsBinSem = OsBinSem::new(1);
static PONG: OsBinSem = OsBinSem::new(0);
static ROUNDS: AtomicU32 = AtomicU32::new(0);

fn ping(_arg: i32) {
    loop {
        PING.down().expect("yield failed");
        let n = ROUNDS.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[ping] round {}", n);
        if n >= 5 {
            // Returning from the entry hands the process back to main
            return;
        }
        PONG.up();
    }
}

fn pong(_arg: i32) {
    loop {
        PONG.down().expect("yield failed");
        println!("[pong] round {}", ROUNDS.load(Ordering::Relaxed));
        PING.up();
    }
}

fn main() {
    println!("Ping-Pong Demo");

    uthreads::os_init(4).expect("init failed");
    uthreads::os_thread_create(ping, 0).expect("create ping failed");
    uthreads::os_thread_create(pong, 1).expect("create pong failed");

    println!("Starting...");
    uthreads::os_start().expect("start failed");

    println!("Scheduler stopped after {} rounds", ROUNDS.load(Ordering::Relaxed));
}
