//! Runs the kernel's documented end-to-end scenarios against the hosted
//! simulator port, one per process (exactly one [`pxos_kernel::Kernel`]
//! is ever live per program — see `pxos-port-std`'s own doc comment for
//! why running two in the same process would contend over one "current
//! task" slot).
//!
//! ```text
//! cargo run -p demo -- strict-priority
//! cargo run -p demo -- round-trip-sleep
//! cargo run -p demo -- semaphore-handoff
//! cargo run -p demo -- signal-saturation
//! cargo run -p demo -- cancel-sleep
//! cargo run -p demo -- suspend-resume
//! ```

use std::process::ExitCode;

mod cancel_sleep;
mod round_trip_sleep;
mod semaphore_handoff;
mod signal_saturation;
mod strict_priority;
mod suspend_resume;

fn main() -> ExitCode {
    env_logger::init();

    let scenario = std::env::args().nth(1);
    let ok = match scenario.as_deref() {
        Some("strict-priority") => strict_priority::run(),
        Some("round-trip-sleep") => round_trip_sleep::run(),
        Some("semaphore-handoff") => semaphore_handoff::run(),
        Some("signal-saturation") => signal_saturation::run(),
        Some("cancel-sleep") => cancel_sleep::run(),
        Some("suspend-resume") => suspend_resume::run(),
        _ => {
            eprintln!(
                "usage: demo <strict-priority|round-trip-sleep|semaphore-handoff|\
                 signal-saturation|cancel-sleep|suspend-resume>"
            );
            return ExitCode::FAILURE;
        }
    };

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Shared by every scenario: leaks a zeroed stack buffer to get the
/// `&'static mut [MaybeUninit<u8>]` `Kernel::create`/`start` want,
/// without reaching for a `static mut`.
fn leak_stack(size: usize) -> &'static mut [std::mem::MaybeUninit<u8>] {
    Box::leak(vec![std::mem::MaybeUninit::uninit(); size].into_boxed_slice())
}

/// Polls `condition` until it's true or `timeout` elapses, sleeping
/// briefly between checks. Every scenario ends this way rather than
/// joining `Kernel::start`'s thread, since it never returns.
fn poll_until(
    timeout: std::time::Duration,
    mut condition: impl FnMut() -> bool,
) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if std::time::Instant::now() > deadline {
            return false;
        }
        std::thread::sleep(std::time::Duration::from_millis(2));
    }
}
