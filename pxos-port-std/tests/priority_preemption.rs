//! A low-priority task spins forever, cooperatively yielding every
//! iteration (the checkpoint this port requires in place of a real
//! asynchronous preemption trap). A high-priority task sleeps, then
//! signals it woke. The low-priority task must have made progress while
//! the high-priority one slept, and the high-priority task must still
//! wake up and run to completion despite the other task never blocking
//! on its own.

use std::{
    mem::MaybeUninit,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
    time::{Duration, Instant},
};

use pxos_kernel::Kernel;
use pxos_port_std::StdPort;

fn init_logger() {
    // `is_test(true)` would drop log messages from the task threads.
    let _ = env_logger::try_init();
}

const N: usize = 4;
const Q: u32 = 2;
const NAME_MAX: usize = 16;

static KERNEL: Kernel<StdPort, N, Q, NAME_MAX> = Kernel::new();
static LOW_PRIORITY_TICKS: AtomicU32 = AtomicU32::new(0);
static HIGH_PRIORITY_WOKE: AtomicBool = AtomicBool::new(false);

fn leak_stack(size: usize) -> &'static mut [MaybeUninit<u8>] {
    Box::leak(vec![MaybeUninit::uninit(); size].into_boxed_slice())
}

fn low_priority_spinner() -> ! {
    loop {
        LOW_PRIORITY_TICKS.fetch_add(1, Ordering::Relaxed);
        KERNEL.yield_now();
    }
}

fn high_priority_sleeper() -> ! {
    let me = KERNEL.current_id();
    KERNEL.sleep(me, 20).unwrap();
    HIGH_PRIORITY_WOKE.store(true, Ordering::Release);
    loop {
        KERNEL.yield_now();
    }
}

#[test]
fn high_priority_task_wakes_after_sleep_and_low_priority_makes_progress() {
    init_logger();

    KERNEL
        .create(high_priority_sleeper, leak_stack(64 * 1024), 0, "high")
        .unwrap();
    KERNEL
        .create(low_priority_spinner, leak_stack(64 * 1024), 1, "low")
        .unwrap();

    std::thread::spawn(|| {
        KERNEL.start(leak_stack(64 * 1024), 1000);
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while !HIGH_PRIORITY_WOKE.load(Ordering::Acquire) {
        if Instant::now() > deadline {
            panic!("high priority task never woke up");
        }
        std::thread::sleep(Duration::from_millis(5));
    }

    assert!(
        LOW_PRIORITY_TICKS.load(Ordering::Relaxed) > 0,
        "the low priority task should have run while the high priority one slept"
    );
}
