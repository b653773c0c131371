//! A task sleeps for a fixed tick count and must become runnable again
//! within one quantum of its wake deadline, never early and never
//! indefinitely late.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pxos_kernel::Kernel;
use pxos_port_std::StdPort;

const N: usize = 4;
const Q: u32 = 10;
const NAME_MAX: usize = 16;
const SLEEP_TICKS: u32 = 100;

static KERNEL: Kernel<StdPort, N, Q, NAME_MAX> = Kernel::new();
static SLEPT_AT: AtomicU32 = AtomicU32::new(0);
static WOKE_AT: AtomicU32 = AtomicU32::new(0);

fn sleeper() -> ! {
    let me = KERNEL.current_id();
    SLEPT_AT.store(KERNEL.ticks(), Ordering::Relaxed);
    KERNEL.sleep(me, SLEEP_TICKS).unwrap();
    WOKE_AT.store(KERNEL.ticks(), Ordering::Relaxed);
    loop {
        KERNEL.yield_now();
    }
}

pub fn run() -> bool {
    KERNEL
        .create(sleeper, crate::leak_stack(64 * 1024), 1, "sleeper")
        .unwrap();
    std::thread::spawn(|| KERNEL.start(crate::leak_stack(64 * 1024), 1000));

    let woke = crate::poll_until(Duration::from_secs(1), || {
        WOKE_AT.load(Ordering::Relaxed) > 0
    });
    if !woke {
        log::error!("sleeper never woke up");
        return false;
    }

    let slept_at = SLEPT_AT.load(Ordering::Relaxed);
    let woke_at = WOKE_AT.load(Ordering::Relaxed);
    let elapsed = woke_at.wrapping_sub(slept_at);
    log::info!("slept at tick {slept_at}, woke at tick {woke_at} ({elapsed} ticks elapsed)");

    let in_window = elapsed >= SLEEP_TICKS && elapsed <= SLEEP_TICKS + Q;
    if !in_window {
        log::error!("wake happened outside [{SLEEP_TICKS}, {}]", SLEEP_TICKS + Q);
    }
    in_window
}
