//! Kernel error kinds.
//!
//! Grounded on `r3_kernel::error`'s `define_suberror!`-generated,
//! `#[repr(i8)]`, `Copy` error enums convertible into a raw status code —
//! simplified here to a single flat enum since this kernel does not need
//! per-call error-subset types.

use core::fmt;

/// A fallible kernel operation's failure reason.
///
/// `BadState` covers operations that are well-formed but not valid given
/// the current state of the kernel or the referenced task (e.g. querying
/// the priority of a task that was never created, or removing the idle
/// task).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i8)]
pub enum KernelError {
    /// A priority level or task id fell outside `[0, N)`.
    OutOfRange = -1,
    /// The requested priority slot is already occupied.
    Collision = -2,
    /// The task table has no free slot.
    Exhaustion = -3,
    /// A semaphore signal would push `count` past 255.
    Saturation = -4,
    /// The call is not valid for the referenced object's current state.
    BadState = -5,
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Self::OutOfRange => "priority or task id out of range",
            Self::Collision => "priority slot already occupied",
            Self::Exhaustion => "task table is full",
            Self::Saturation => "semaphore count saturated at 255",
            Self::BadState => "operation not valid in current state",
        };
        f.write_str(msg)
    }
}

/// Convert to the raw negative status code a C-ABI-facing or `no_std`
/// caller expects: zero on success is the caller's responsibility, this
/// only covers the failure side.
impl From<KernelError> for i8 {
    fn from(e: KernelError) -> i8 {
        e as i8
    }
}
