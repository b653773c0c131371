//! `KernelError::BadState` (spec.md §7): every lifecycle call rejects a
//! task id that is well-formed (in `[0, N)`) but no longer refers to a
//! live task, and the vacated slot becomes available to a new task.

use std::mem::MaybeUninit;

use pxos_kernel::{Kernel, KernelError};
use pxos_port_std::StdPort;

fn init_logger() {
    let _ = env_logger::try_init();
}

fn leak_stack(size: usize) -> &'static mut [MaybeUninit<u8>] {
    Box::leak(vec![MaybeUninit::uninit(); size].into_boxed_slice())
}

fn noop_task() -> ! {
    loop {
        std::thread::park();
    }
}

const N: usize = 4;
const Q: u32 = 10;
const NAME_MAX: usize = 16;

static KERNEL: Kernel<StdPort, N, Q, NAME_MAX> = Kernel::new();

#[test]
fn bad_state_follows_a_removed_task() {
    init_logger();

    // `Kernel::start` is never called in this test, so `remove`'s
    // internal `reschedule` finds nothing runnable and simply returns
    // without a context switch.
    let victim = KERNEL
        .create(noop_task, leak_stack(64 * 1024), 1, "victim")
        .unwrap();

    assert_eq!(KERNEL.remove(victim), Ok(()));

    assert_eq!(KERNEL.remove(victim), Err(KernelError::BadState));
    assert_eq!(KERNEL.get_priority(victim), Err(KernelError::BadState));
    assert_eq!(KERNEL.set_priority(victim, 2), Err(KernelError::BadState));
    assert_eq!(KERNEL.set_name(victim, "x"), Err(KernelError::BadState));
    assert_eq!(KERNEL.get_name(victim), Err(KernelError::BadState));
    assert_eq!(KERNEL.sleep(victim, 10), Err(KernelError::BadState));
    assert_eq!(KERNEL.cancel_sleep(victim), Err(KernelError::BadState));
    assert_eq!(KERNEL.suspend(victim), Err(KernelError::BadState));
    assert_eq!(KERNEL.resume(victim), Err(KernelError::BadState));

    // The slot `victim` vacated is free again for a brand new task.
    let replacement = KERNEL
        .create(noop_task, leak_stack(64 * 1024), 1, "replacement")
        .unwrap();
    assert_eq!(KERNEL.get_priority(replacement), Ok(1));
}
