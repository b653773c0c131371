//! A spinning low-priority task never gets the CPU while a spinning
//! high-priority task is runnable; once the high-priority task sleeps,
//! the low-priority one runs, then loses the CPU again the instant the
//! high-priority task wakes.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pxos_kernel::Kernel;
use pxos_port_std::StdPort;

const N: usize = 4;
const Q: u32 = 10;
const NAME_MAX: usize = 16;

static KERNEL: Kernel<StdPort, N, Q, NAME_MAX> = Kernel::new();
static HIGH_TICKS: AtomicU32 = AtomicU32::new(0);
static LOW_TICKS: AtomicU32 = AtomicU32::new(0);

fn high_priority() -> ! {
    let me = KERNEL.current_id();
    loop {
        // Spin for a while so the low-priority task's starvation is
        // unambiguous, then sleep once to hand the CPU over on purpose.
        while HIGH_TICKS.fetch_add(1, Ordering::Relaxed) < 200 {
            KERNEL.yield_now();
        }
        log::info!("high: sleeping for 50 ticks");
        KERNEL.sleep(me, 50).unwrap();
        log::info!("high: woke up, {} low ticks happened meanwhile", LOW_TICKS.load(Ordering::Relaxed));
        loop {
            HIGH_TICKS.fetch_add(1, Ordering::Relaxed);
            KERNEL.yield_now();
        }
    }
}

fn low_priority() -> ! {
    loop {
        LOW_TICKS.fetch_add(1, Ordering::Relaxed);
        KERNEL.yield_now();
    }
}

pub fn run() -> bool {
    KERNEL
        .create(high_priority, crate::leak_stack(64 * 1024), 0, "high")
        .unwrap();
    KERNEL
        .create(low_priority, crate::leak_stack(64 * 1024), 1, "low")
        .unwrap();
    std::thread::spawn(|| KERNEL.start(crate::leak_stack(64 * 1024), 1000));

    let stayed_starved = crate::poll_until(Duration::from_secs(1), || {
        HIGH_TICKS.load(Ordering::Relaxed) >= 200
    }) && LOW_TICKS.load(Ordering::Relaxed) == 0;

    if !stayed_starved {
        log::error!("low priority task ran before high priority task ever blocked");
        return false;
    }
    log::info!("confirmed: low priority task did not run while high priority task spun");

    let low_ran_during_sleep = crate::poll_until(Duration::from_secs(1), || {
        LOW_TICKS.load(Ordering::Relaxed) > 0
    });
    if !low_ran_during_sleep {
        log::error!("low priority task never ran during high priority task's sleep");
        return false;
    }
    log::info!("confirmed: low priority task ran while high priority task slept");
    true
}
