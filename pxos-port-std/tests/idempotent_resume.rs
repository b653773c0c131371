//! spec.md §8 invariant #7: `resume` on a task that is not suspended is
//! a no-op. Calls `resume` repeatedly on a task that is freely running
//! and checks neither call disturbs its progress or returns an error.

use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pxos_kernel::{Kernel, TaskId};
use pxos_port_std::StdPort;

fn init_logger() {
    let _ = env_logger::try_init();
}

fn leak_stack(size: usize) -> &'static mut [MaybeUninit<u8>] {
    Box::leak(vec![MaybeUninit::uninit(); size].into_boxed_slice())
}

fn poll_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while !cond() {
        if std::time::Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    true
}

const N: usize = 4;
const Q: u32 = 10;
const NAME_MAX: usize = 16;

static KERNEL: Kernel<StdPort, N, Q, NAME_MAX> = Kernel::new();
static TICKS: AtomicU32 = AtomicU32::new(0);
static SPINNER_ID: std::sync::OnceLock<TaskId> = std::sync::OnceLock::new();

fn spinner() -> ! {
    loop {
        TICKS.fetch_add(1, Ordering::Relaxed);
        KERNEL.yield_now();
    }
}

#[test]
fn resume_on_a_running_task_is_a_no_op() {
    init_logger();

    let id = KERNEL
        .create(spinner, leak_stack(64 * 1024), 0, "spinner")
        .unwrap();
    SPINNER_ID.set(id).unwrap();
    std::thread::spawn(|| KERNEL.start(leak_stack(64 * 1024), 1000));

    assert!(
        poll_until(Duration::from_secs(1), || TICKS.load(Ordering::Relaxed) > 0),
        "spinner never ran"
    );

    // Never suspended at any point: `resume` must be a plain no-op, not
    // an error, and must not perturb its progress.
    assert_eq!(KERNEL.resume(id), Ok(()));

    let before = TICKS.load(Ordering::Relaxed);
    assert!(
        poll_until(Duration::from_secs(1), || TICKS.load(Ordering::Relaxed) > before),
        "spinner stalled after a no-op resume()"
    );

    // Idempotent: calling it again changes nothing either.
    assert_eq!(KERNEL.resume(id), Ok(()));
    let before = TICKS.load(Ordering::Relaxed);
    assert!(
        poll_until(Duration::from_secs(1), || TICKS.load(Ordering::Relaxed) > before),
        "spinner stalled after a second no-op resume()"
    );
}
