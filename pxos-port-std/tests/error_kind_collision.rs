//! `KernelError::Collision` (spec.md §7): creating or reprioritizing
//! into an occupied priority slot is rejected while the table still has
//! room elsewhere (distinct from `Exhaustion`, covered in its own test
//! file — see `error_kind_exhaustion.rs`).

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

const N: usize = 3;
const Q: u32 = 10;
const NAME_MAX: usize = 16;

static KERNEL: Kernel<StdPort, N, Q, NAME_MAX> = Kernel::new();

#[test]
fn collision_is_rejected_while_the_table_still_has_room() {
    init_logger();

    let a = KERNEL
        .create(noop_task, leak_stack(64 * 1024), 0, "a")
        .unwrap();
    // Two slots remain free, so this is a pure priority collision, not
    // exhaustion.
    assert_eq!(
        KERNEL.create(noop_task, leak_stack(64 * 1024), 0, "b"),
        Err(KernelError::Collision)
    );

    let b = KERNEL
        .create(noop_task, leak_stack(64 * 1024), 1, "b")
        .unwrap();
    assert_eq!(
        KERNEL.set_priority(b, 0),
        Err(KernelError::Collision),
        "set_priority into a's occupied slot must also collide"
    );
    assert_eq!(KERNEL.get_priority(a), Ok(0));
    assert_eq!(KERNEL.get_priority(b), Ok(1));
}
