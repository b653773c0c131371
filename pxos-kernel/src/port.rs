//! The platform port contract.
//!
//! Everything architecture-specific lives behind this trait. The rest of
//! the kernel — task table, scheduler, semaphore — never mentions a
//! register, an instruction, or a vendor peripheral; it only calls
//! through `Port`.

use core::mem::MaybeUninit;

/// Architecture glue the kernel needs: interrupt masking, stack-image
/// construction, context switching, and the periodic tick source.
///
/// # Safety
///
/// Implementors must uphold:
///
/// - `irq_save_disable`/`irq_restore` nest correctly when paired by the
///   caller (save, then restore in reverse order) and disable exactly the
///   interrupts the kernel depends on for mutual exclusion.
/// - `context_switch` must not return to its caller until the *calling*
///   task is dispatched again; interrupts must be masked for the whole
///   switch and restored only as a side effect of resuming a task (the
///   popped flags register, on a real core).
/// - A stack image built by `initialize_stack` must, when dispatched via
///   `context_switch`, begin executing `entry` with interrupts enabled.
pub trait Port: Sized + 'static {
    /// Opaque token returned by [`Port::irq_save_disable`] and consumed by
    /// [`Port::irq_restore`]. Must be treated as an unforgeable capability,
    /// not reconstructed from raw parts by kernel code.
    type IrqState: Copy;

    /// Disable interrupts relevant to kernel state and return a token
    /// that can later restore exactly the previous state (possibly
    /// "already disabled", supporting nesting by the caller).
    ///
    /// # Safety
    /// Must be paired with a later [`Port::irq_restore`] of the returned
    /// token before the enclosing scope exits on the same execution
    /// context.
    unsafe fn irq_save_disable() -> Self::IrqState;

    /// Restore the interrupt-enable state captured by `state`.
    ///
    /// # Safety
    /// `state` must be a token produced by a matching
    /// [`Port::irq_save_disable`] that has not already been restored.
    unsafe fn irq_restore(state: Self::IrqState);

    /// Build a stack image for a task that has never run.
    ///
    /// On first dispatch the task must begin executing `entry` with
    /// interrupts enabled, as if freshly called. If `entry` ever
    /// returns, control must instead land in `on_return` (the
    /// terminator trampoline) — conventionally arranged by pushing its
    /// address beneath `entry`'s return address on the prepared stack.
    ///
    /// Returns the initial stack-top value to store in the task's TCB.
    fn initialize_stack(
        stack: &'static mut [MaybeUninit<u8>],
        entry: fn() -> !,
        on_return: fn() -> !,
    ) -> usize;

    /// Switch execution from the current context to the task whose
    /// saved stack-top is `to`.
    ///
    /// If `out_from` is `Some(slot)`, the outgoing task's current
    /// register state is saved to its stack and the resulting stack-top
    /// is written to `*slot` before the switch. If `out_from` is `None`
    /// there is no outgoing task to save (startup dispatch).
    ///
    /// Returns only once this same call site's task is dispatched again
    /// by a future `context_switch`.
    ///
    /// # Safety
    /// Must be called with interrupts already masked (e.g. by a prior
    /// `irq_save_disable`) and `to` must be a stack-top value produced
    /// by `initialize_stack` or a previous `context_switch` for a task
    /// that is not currently running.
    unsafe fn context_switch(out_from: Option<&mut usize>, to: usize);

    /// Arrange for `on_tick` to run from a periodic interrupt source at
    /// approximately `hz` ticks per second. Called exactly once, from
    /// [`crate::Kernel::start`].
    fn start_tick_source(hz: u32, on_tick: fn());

    /// Enter a low-power wait until the next interrupt. Called only by
    /// the kernel-owned idle task, with interrupts enabled.
    fn wait_for_interrupt();
}
