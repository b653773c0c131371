//! A blocked, higher-priority waiter receives the token the instant a
//! lower-priority task signals it, rather than waiting for that task to
//! be scheduled away first.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pxos_kernel::{Kernel, Semaphore};
use pxos_port_std::StdPort;

const N: usize = 4;
const Q: u32 = 10;
const NAME_MAX: usize = 16;
const SIGNAL_DELAY_TICKS: u32 = 20;

static KERNEL: Kernel<StdPort, N, Q, NAME_MAX> = Kernel::new();
static SEM: Semaphore<N> = Semaphore::new(0);
static SIGNALED_AT: AtomicU32 = AtomicU32::new(0);
static RECEIVED_AT: AtomicU32 = AtomicU32::new(0);

fn consumer() -> ! {
    SEM.wait(&KERNEL);
    RECEIVED_AT.store(KERNEL.ticks(), Ordering::Relaxed);
    loop {
        KERNEL.yield_now();
    }
}

fn producer() -> ! {
    let me = KERNEL.current_id();
    KERNEL.sleep(me, SIGNAL_DELAY_TICKS).unwrap();
    SIGNALED_AT.store(KERNEL.ticks(), Ordering::Relaxed);
    SEM.signal(&KERNEL).unwrap();
    loop {
        KERNEL.yield_now();
    }
}

pub fn run() -> bool {
    KERNEL
        .create(consumer, crate::leak_stack(64 * 1024), 1, "consumer")
        .unwrap();
    KERNEL
        .create(producer, crate::leak_stack(64 * 1024), 2, "producer")
        .unwrap();
    std::thread::spawn(|| KERNEL.start(crate::leak_stack(64 * 1024), 1000));

    let received = crate::poll_until(Duration::from_secs(1), || {
        RECEIVED_AT.load(Ordering::Relaxed) > 0
    });
    if !received {
        log::error!("consumer never received the token");
        return false;
    }

    let signaled_at = SIGNALED_AT.load(Ordering::Relaxed);
    let received_at = RECEIVED_AT.load(Ordering::Relaxed);
    let latency = received_at.wrapping_sub(signaled_at);
    log::info!("signaled at tick {signaled_at}, received at tick {received_at} ({latency} ticks)");

    let count_after = SEM.count(&KERNEL);
    if count_after != 0 {
        log::error!("expected count 0 after handoff, got {count_after}");
        return false;
    }

    // The handoff happens synchronously inside `signal`'s own critical
    // section, so the wait only has to wait out one quantum at most.
    latency <= Q
}
