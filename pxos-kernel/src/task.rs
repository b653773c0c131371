//! Task control blocks and the small fixed-capacity name buffer.

use bitflags::bitflags;
use core::fmt;

/// A task's identity: its slot index in the fixed task table.
///
/// Distinct from a *priority slot* (an index into the priority table) —
/// a `TaskId` never changes for the lifetime of a task, while its
/// priority can be reassigned with [`crate::Kernel::set_priority`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(pub(crate) u8);

impl TaskId {
    /// The task table slot this id refers to.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

bitflags! {
    /// The four independent state bits of a task control block, packed
    /// into one byte.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub(crate) struct TaskState: u8 {
        /// Slot is allocated to a live task.
        const IN_USE      = 0b0001;
        /// Sleeping until `wake_at`.
        const DELAYED     = 0b0010;
        /// Explicitly paused by another task.
        const SUSPENDED   = 0b0100;
        /// Waiting on a semaphore.
        const SEM_BLOCKED = 0b1000;
    }
}

/// A fixed-capacity, always-null-terminated task name.
///
/// Replaces the original source's `copy_string`, which wrote its
/// terminator unconditionally at `buf[size - 1]` regardless of how much
/// of the source actually fit: here the copy length is capped to
/// `NAME_MAX - 1` up front, so the terminator is never written over an
/// input byte that was actually copied.
#[derive(Clone, Copy)]
pub struct TaskName<const NAME_MAX: usize> {
    buf: [u8; NAME_MAX],
    len: u8,
}

impl<const NAME_MAX: usize> TaskName<NAME_MAX> {
    pub(crate) const EMPTY: Self = Self {
        buf: [0; NAME_MAX],
        len: 0,
    };

    pub(crate) fn set(&mut self, name: &str) {
        assert!(NAME_MAX > 0, "NAME_MAX must reserve room for a terminator");
        let cap = NAME_MAX - 1;
        // Truncate at the last char boundary at or before `cap`, not a
        // raw byte offset: cutting `name` mid-codepoint would leave
        // `buf` holding invalid UTF-8 for `as_str` to read back.
        let n = if name.len() <= cap {
            name.len()
        } else {
            (0..=cap).rfind(|&i| name.is_char_boundary(i)).unwrap_or(0)
        };
        self.buf[..n].copy_from_slice(&name.as_bytes()[..n]);
        self.buf[n] = 0;
        self.len = n as u8;
    }

    /// The name as a `&str`. Always valid UTF-8: [`TaskName::set`] only
    /// ever stores a prefix of the input cut on a char boundary.
    pub fn as_str(&self) -> &str {
        // SAFETY: `set` only ever writes a char-boundary-truncated
        // prefix of a `&str` into `buf[..len]`.
        unsafe { core::str::from_utf8_unchecked(&self.buf[..self.len as usize]) }
    }
}

impl<const NAME_MAX: usize> fmt::Debug for TaskName<NAME_MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const NAME_MAX: usize> fmt::Display for TaskName<NAME_MAX> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task control block. `Copy` so the whole task table can be a plain
/// array (`[Tcb<NAME_MAX>; N]`) inside a single `UnsafeCell`, rather than
/// requiring per-slot interior mutability.
#[derive(Clone, Copy)]
pub(crate) struct Tcb<const NAME_MAX: usize> {
    pub(crate) name: TaskName<NAME_MAX>,
    /// Saved top-of-stack pointer when this task is not running.
    pub(crate) stack_top: usize,
    /// Tick timestamp at which a delayed task becomes runnable.
    pub(crate) wake_at: u32,
    pub(crate) state: TaskState,
}

impl<const NAME_MAX: usize> Tcb<NAME_MAX> {
    pub(crate) const EMPTY: Self = Self {
        name: TaskName::EMPTY,
        stack_top: 0,
        wake_at: 0,
        state: TaskState::empty(),
    };

    /// A task is runnable iff `in_use ∧ ¬suspended ∧ ¬sem_blocked ∧
    /// (¬delayed ∨ now ≥ wake_at)`. This only checks the state-bit half
    /// of that; the delay-expiry half is time-dependent and handled by
    /// the caller (selection clears `DELAYED` itself, at selection
    /// time).
    pub(crate) fn runnable_ignoring_delay(&self) -> bool {
        self.state.contains(TaskState::IN_USE)
            && !self
                .state
                .intersects(TaskState::SUSPENDED | TaskState::SEM_BLOCKED)
    }
}
