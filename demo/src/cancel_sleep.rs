//! Cancelling another task's sleep makes it runnable immediately, and
//! because cancellation itself invokes the scheduler, a higher-priority
//! task preempts the canceller within one quantum.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use pxos_kernel::Kernel;
use pxos_port_std::StdPort;

const N: usize = 4;
const Q: u32 = 10;
const NAME_MAX: usize = 16;

static KERNEL: Kernel<StdPort, N, Q, NAME_MAX> = Kernel::new();
static SLEEPER_ID: std::sync::OnceLock<pxos_kernel::TaskId> = std::sync::OnceLock::new();
static CANCELLED: AtomicBool = AtomicBool::new(false);
static WOKE_AT: AtomicU32 = AtomicU32::new(0);
static CANCELLED_AT: AtomicU32 = AtomicU32::new(0);

fn sleeper() -> ! {
    let me = KERNEL.current_id();
    SLEEPER_ID.set(me).unwrap();
    // A sleep far longer than this scenario's patience; only
    // `cancel_sleep` should ever end it.
    KERNEL.sleep(me, 1_000_000).unwrap();
    WOKE_AT.store(KERNEL.ticks(), Ordering::Relaxed);
    loop {
        KERNEL.yield_now();
    }
}

fn canceller() -> ! {
    loop {
        if let Some(&id) = SLEEPER_ID.get() {
            if !CANCELLED.load(Ordering::Relaxed) {
                CANCELLED.store(true, Ordering::Relaxed);
                CANCELLED_AT.store(KERNEL.ticks(), Ordering::Relaxed);
                KERNEL.cancel_sleep(id).unwrap();
            }
        }
        KERNEL.yield_now();
    }
}

pub fn run() -> bool {
    KERNEL
        .create(sleeper, crate::leak_stack(64 * 1024), 0, "sleeper")
        .unwrap();
    KERNEL
        .create(canceller, crate::leak_stack(64 * 1024), 1, "canceller")
        .unwrap();
    std::thread::spawn(|| KERNEL.start(crate::leak_stack(64 * 1024), 1000));

    let woke = crate::poll_until(Duration::from_secs(1), || {
        WOKE_AT.load(Ordering::Relaxed) > 0
    });
    if !woke {
        log::error!("sleeper never woke up after cancel_sleep");
        return false;
    }

    let cancelled_at = CANCELLED_AT.load(Ordering::Relaxed);
    let woke_at = WOKE_AT.load(Ordering::Relaxed);
    let latency = woke_at.wrapping_sub(cancelled_at);
    log::info!("cancelled at tick {cancelled_at}, woke at tick {woke_at} ({latency} ticks)");

    latency <= Q
}
