//! A suspended task does not run no matter how long it would otherwise
//! have waited; resuming it makes it preempt immediately if it outranks
//! whatever is currently running.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pxos_kernel::{Kernel, TaskId};
use pxos_port_std::StdPort;

const N: usize = 4;
const Q: u32 = 10;
const NAME_MAX: usize = 16;

static KERNEL: Kernel<StdPort, N, Q, NAME_MAX> = Kernel::new();
static HIGH_TICKS: AtomicU32 = AtomicU32::new(0);
static LOW_TICKS: AtomicU32 = AtomicU32::new(0);
static HIGH_ID: std::sync::OnceLock<TaskId> = std::sync::OnceLock::new();
static RESUMED_AT: AtomicU32 = AtomicU32::new(0);

fn high_priority() -> ! {
    // Sleeps briefly first so the lower-priority task below gets a
    // chance to run at all: otherwise, being strictly higher priority
    // and never blocking, it would never give up the CPU for `low` to
    // call `suspend` on it in the first place.
    let me = KERNEL.current_id();
    KERNEL.sleep(me, 5).unwrap();
    loop {
        HIGH_TICKS.fetch_add(1, Ordering::Relaxed);
        KERNEL.yield_now();
    }
}

fn low_priority() -> ! {
    KERNEL.suspend(*HIGH_ID.get().unwrap()).unwrap();

    let ticks_while_suspended_started = LOW_TICKS.load(Ordering::Relaxed);
    loop {
        let ticks = LOW_TICKS.fetch_add(1, Ordering::Relaxed);
        if ticks - ticks_while_suspended_started >= 200 {
            break;
        }
        KERNEL.yield_now();
    }

    RESUMED_AT.store(KERNEL.ticks(), Ordering::Relaxed);
    KERNEL.resume(*HIGH_ID.get().unwrap()).unwrap();
    loop {
        LOW_TICKS.fetch_add(1, Ordering::Relaxed);
        KERNEL.yield_now();
    }
}

pub fn run() -> bool {
    let high_id = KERNEL
        .create(high_priority, crate::leak_stack(64 * 1024), 0, "high")
        .unwrap();
    HIGH_ID.set(high_id).unwrap();
    KERNEL
        .create(low_priority, crate::leak_stack(64 * 1024), 1, "low")
        .unwrap();
    std::thread::spawn(|| KERNEL.start(crate::leak_stack(64 * 1024), 1000));

    let suspended = crate::poll_until(Duration::from_secs(1), || {
        RESUMED_AT.load(Ordering::Relaxed) > 0
    });
    if !suspended {
        log::error!("low priority task never reached the resume point");
        return false;
    }
    let high_ticks_while_suspended = HIGH_TICKS.load(Ordering::Relaxed);
    log::info!(
        "high priority ticks accumulated before resume: {high_ticks_while_suspended} \
         (all from before suspend() was called)"
    );

    let resumed_and_ran = crate::poll_until(Duration::from_secs(1), || {
        HIGH_TICKS.load(Ordering::Relaxed) > high_ticks_while_suspended
    });
    if !resumed_and_ran {
        log::error!("high priority task never ran again after resume()");
        return false;
    }
    log::info!("confirmed: high priority task resumed and preempted after resume()");
    true
}
