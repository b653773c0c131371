//! A semaphore signalled past its 8-bit count ceiling fails instead of
//! wrapping, and the failed call leaves the count untouched.

use pxos_kernel::{Kernel, KernelError, Semaphore};
use pxos_port_std::StdPort;

const N: usize = 4;
const Q: u32 = 10;
const NAME_MAX: usize = 16;

static KERNEL: Kernel<StdPort, N, Q, NAME_MAX> = Kernel::new();
static SEM: Semaphore<N> = Semaphore::new(254);

pub fn run() -> bool {
    // No task ever blocks on this semaphore, so it can be exercised
    // directly from the thread that calls `Kernel::start` — there is no
    // handoff to race, just the saturating-add check in `signal`.
    std::thread::spawn(|| KERNEL.start(crate::leak_stack(64 * 1024), 1000));
    std::thread::sleep(std::time::Duration::from_millis(20));

    let first = SEM.signal(&KERNEL);
    let count_after_first = SEM.count(&KERNEL);
    log::info!("first signal: {first:?}, count now {count_after_first}");
    if first != Ok(()) || count_after_first != 255 {
        log::error!("expected count 255 after the 255th token, got {count_after_first}");
        return false;
    }

    let second = SEM.signal(&KERNEL);
    let count_after_second = SEM.count(&KERNEL);
    log::info!("second signal: {second:?}, count now {count_after_second}");
    if second != Err(KernelError::Saturation) {
        log::error!("expected Saturation once count == 255, got {second:?}");
        return false;
    }
    count_after_second == 255
}
