//! Counting semaphore.

use crate::{error::KernelError, kernel::Kernel, port::Port};

struct SemInner<const N: usize> {
    count: u8,
    /// Bitmap of tasks blocked on this semaphore, indexed by `TaskId`.
    waiters: [bool; N],
}

/// A counting semaphore shared between tasks on the same [`Kernel`].
///
/// `N` must match the task-table capacity of any `Kernel` this semaphore
/// is used with, so the waiter bitmap can be indexed directly by task
/// id.
pub struct Semaphore<const N: usize> {
    inner: core::cell::UnsafeCell<SemInner<N>>,
}

// SAFETY: every access to `inner` happens with interrupts masked, the
// same discipline `Kernel` relies on (see its `Sync` impl).
unsafe impl<const N: usize> Sync for Semaphore<N> {}

impl<const N: usize> Semaphore<N> {
    /// Sets the initial count and clears the wait-list.
    pub const fn new(initial_count: u8) -> Self {
        Self {
            inner: core::cell::UnsafeCell::new(SemInner {
                count: initial_count,
                waiters: [false; N],
            }),
        }
    }

    /// If tokens are available, takes one and returns immediately.
    /// Otherwise marks the caller `sem_blocked`, records it in the
    /// wait-list, and yields; returns once a matching `signal` has
    /// handed this task the token.
    ///
    /// Unlike the original source, the token is transferred to exactly
    /// the woken waiter atomically inside `signal`'s critical section —
    /// `wait` never decrements `count` itself on the wake path, so there
    /// is no window where two racing waiters could both observe a stale
    /// count.
    pub fn wait<P: Port, const Q: u32, const NAME_MAX: usize>(
        &self,
        kernel: &'static Kernel<P, N, Q, NAME_MAX>,
    ) {
        let irq = unsafe { Kernel::<P, N, Q, NAME_MAX>::raw_irq_save_disable() };
        let inner = unsafe { &mut *self.inner.get() };
        if inner.count > 0 {
            inner.count -= 1;
            unsafe { Kernel::<P, N, Q, NAME_MAX>::raw_irq_restore(irq) };
            return;
        }

        let id = kernel.current_id();
        inner.waiters[id.index()] = true;
        kernel.mark_sem_blocked(id);
        #[cfg(feature = "log")]
        log::trace!("sem: task {:?} blocking", id);
        unsafe { kernel.raw_reschedule(irq) };
        // Resumed here once `signal` handed this task the token; the
        // token was already accounted for by `signal`, nothing left to
        // decrement.
    }

    /// If any task is waiting, hands the token directly to the
    /// highest-priority waiter (ascending scan of the priority table)
    /// and yields so it — or any other task that became runnable — can
    /// preempt immediately. Otherwise increments `count`, saturating:
    /// signalling at `count == 255` fails.
    ///
    /// A signal can either wake every waiter (thundering herd) or a
    /// single highest-priority waiter; this implementation takes the
    /// single-waiter option, which both documents the choice and
    /// sidesteps the original's decrement-after-wake race.
    pub fn signal<P: Port, const Q: u32, const NAME_MAX: usize>(
        &self,
        kernel: &'static Kernel<P, N, Q, NAME_MAX>,
    ) -> Result<(), KernelError> {
        let irq = unsafe { Kernel::<P, N, Q, NAME_MAX>::raw_irq_save_disable() };
        let inner = unsafe { &mut *self.inner.get() };

        if let Some(waiter) = kernel.pick_blocked_waiter_locked(&inner.waiters) {
            inner.waiters[waiter.index()] = false;
            kernel.clear_sem_blocked(waiter);
            #[cfg(feature = "log")]
            log::trace!("sem: handing token to task {:?}", waiter);
            unsafe { kernel.raw_reschedule(irq) };
            return Ok(());
        }

        if inner.count == 255 {
            unsafe { Kernel::<P, N, Q, NAME_MAX>::raw_irq_restore(irq) };
            return Err(KernelError::Saturation);
        }
        inner.count += 1;
        unsafe { Kernel::<P, N, Q, NAME_MAX>::raw_irq_restore(irq) };
        Ok(())
    }

    /// Current token count, for introspection and tests.
    pub fn count<P: Port, const Q: u32, const NAME_MAX: usize>(
        &self,
        _kernel: &'static Kernel<P, N, Q, NAME_MAX>,
    ) -> u8 {
        let irq = unsafe { Kernel::<P, N, Q, NAME_MAX>::raw_irq_save_disable() };
        let count = unsafe { (*self.inner.get()).count };
        unsafe { Kernel::<P, N, Q, NAME_MAX>::raw_irq_restore(irq) };
        count
    }
}
