//! The task table, priority map, scheduler, tick/time base, and lifecycle
//! API bound together into one `Kernel` object whose mutable state is
//! gated entirely on the interrupt-mask primitive.

use core::{
    mem::MaybeUninit,
    sync::atomic::{AtomicU32, AtomicUsize, Ordering},
};

use crate::{
    error::KernelError,
    port::Port,
    task::{Tcb, TaskId, TaskName, TaskState},
};

/// All kernel-owned mutable state gated behind a single critical section.
/// A plain `Copy` array of `Tcb`s, so the whole thing can be built with a
/// `const fn` without `unsafe` array-initialization tricks.
struct Inner<const N: usize, const NAME_MAX: usize> {
    tasks: [Tcb<NAME_MAX>; N],
    /// `priority[slot]` is the task occupying that priority level, or
    /// `None`. Invariant: each in-use task appears exactly once.
    priority: [Option<u8>; N],
    current: Option<u8>,
    idle: Option<u8>,
    quantum_ticks: u32,
}

impl<const N: usize, const NAME_MAX: usize> Inner<N, NAME_MAX> {
    const fn new() -> Self {
        Self {
            tasks: [Tcb::EMPTY; N],
            priority: [None; N],
            current: None,
            idle: None,
            quantum_ticks: 0,
        }
    }

    fn priority_slot_of(&self, id: u8) -> Option<usize> {
        self.priority.iter().position(|p| *p == Some(id))
    }

    fn first_free_slot(&self) -> Option<u8> {
        (0..N as u8).find(|&i| !self.tasks[i as usize].state.contains(TaskState::IN_USE))
    }

    /// Selection algorithm: scan the priority table ascending; the
    /// first occupied slot whose task is runnable (or whose delay has
    /// just expired) is chosen. Clears `DELAYED` at selection time, as
    /// the data model requires.
    fn select_next(&mut self, now: u32) -> Option<u8> {
        for slot in 0..N {
            let Some(id) = self.priority[slot] else {
                continue;
            };
            let tcb = &mut self.tasks[id as usize];
            if !tcb.runnable_ignoring_delay() {
                continue;
            }
            if tcb.state.contains(TaskState::DELAYED) {
                // Rollover of `system_ticks` is a documented limitation,
                // not patched around here — this is a plain unsigned
                // comparison, exactly as specified.
                if now >= tcb.wake_at {
                    tcb.state.remove(TaskState::DELAYED);
                } else {
                    continue;
                }
            }
            return Some(id);
        }
        None
    }
}

/// The kernel: fixed task table of `N` slots, priority map, and tick/time
/// base, parameterized by the platform [`Port`] and two compile-time
/// constants (`Q`, the preemption quantum in ticks, and `NAME_MAX`, the
/// task name capacity, both folded in as const generics). The stack
/// buffer passed to [`Kernel::start`] supplies its own size at the call
/// site.
///
/// Exactly one `Kernel` is expected per program, stored in a `'static`
/// (matching real hardware: one microcontroller, one scheduler). Methods
/// that need to hand a plain `fn() -> !` to the port (task entry,
/// terminator, tick handler) recover `&'static Self` through a
/// monomorphization-local static set once by [`Kernel::start`], the same
/// trick `static`s-inside-generic-functions are commonly used for.
pub struct Kernel<P: Port, const N: usize, const Q: u32, const NAME_MAX: usize> {
    inner: core::cell::UnsafeCell<Inner<N, NAME_MAX>>,
    system_ticks: AtomicU32,
    _port: core::marker::PhantomData<P>,
}

// SAFETY: every access to `inner` happens while interrupts are masked via
// `P::irq_save_disable`/`irq_restore`, so at most one context ever
// observes it at a time.
unsafe impl<P: Port, const N: usize, const Q: u32, const NAME_MAX: usize> Sync
    for Kernel<P, N, Q, NAME_MAX>
{
}

impl<P: Port, const N: usize, const Q: u32, const NAME_MAX: usize> Kernel<P, N, Q, NAME_MAX> {
    pub const fn new() -> Self {
        assert!(N >= 2, "N must leave room for at least one task plus idle");
        assert!(Q >= 1, "quantum must be at least one tick");
        Self {
            inner: core::cell::UnsafeCell::new(Inner::new()),
            system_ticks: AtomicU32::new(0),
            _port: core::marker::PhantomData,
        }
    }

    fn self_ptr_cell() -> &'static AtomicUsize {
        // One instance of this `static` per monomorphization of
        // `Kernel<P, N, Q, NAME_MAX>` — safe because there is exactly
        // one live `Kernel` per such instantiation in practice.
        static PTR: AtomicUsize = AtomicUsize::new(0);
        &PTR
    }

    fn shared() -> &'static Self {
        let ptr = Self::self_ptr_cell().load(Ordering::Acquire);
        assert_ne!(ptr, 0, "Kernel::start was never called");
        // SAFETY: only ever set by `start` to `self as *const Self`,
        // and `start` requires `&'static self`.
        unsafe { &*(ptr as *const Self) }
    }

    #[inline]
    fn mutate<R>(&self, f: impl FnOnce(&mut Inner<N, NAME_MAX>) -> R) -> R {
        let irq = unsafe { P::irq_save_disable() };
        let inner = unsafe { &mut *self.inner.get() };
        let r = f(inner);
        unsafe { P::irq_restore(irq) };
        r
    }

    #[inline]
    fn mutate_and_schedule<R>(&self, f: impl FnOnce(&mut Inner<N, NAME_MAX>) -> R) -> R {
        let irq = unsafe { P::irq_save_disable() };
        let inner = unsafe { &mut *self.inner.get() };
        let r = f(inner);
        unsafe { self.reschedule(irq) };
        r
    }

    fn validate_id(&self, id: TaskId) -> Result<(), KernelError> {
        if id.index() >= N {
            Err(KernelError::OutOfRange)
        } else {
            Ok(())
        }
    }

    /// Runs the selection algorithm and switches to its result.
    ///
    /// # Safety
    /// Caller must hold `irq` from a matching `irq_save_disable` that has
    /// not yet been restored; this consumes it (restoring it immediately
    /// if no switch is needed, or implicitly via the port's context
    /// switch otherwise).
    unsafe fn reschedule(&self, irq: P::IrqState) {
        let now = self.system_ticks.load(Ordering::Relaxed);
        let inner = unsafe { &mut *self.inner.get() };
        let Some(next) = inner.select_next(now) else {
            // The idle task guarantees this never happens once
            // `start` has run.
            unsafe { P::irq_restore(irq) };
            return;
        };
        let prev = inner.current;
        if prev == Some(next) {
            unsafe { P::irq_restore(irq) };
            return;
        }
        inner.current = Some(next);
        let to = inner.tasks[next as usize].stack_top;
        #[cfg(feature = "log")]
        log::trace!("schedule: {:?} -> {:?}", prev, next);
        match prev {
            Some(p) => {
                let from_slot = &mut inner.tasks[p as usize].stack_top;
                unsafe { P::context_switch(Some(from_slot), to) };
            }
            None => unsafe { P::context_switch(None, to) },
        }
    }

    /// Manually invoke the scheduler, as if a quantum boundary had been
    /// reached. Exposed for ports/tests that need to force a dispatch
    /// decision outside the tick ISR or a blocking call.
    pub fn yield_now(&self) {
        let irq = unsafe { P::irq_save_disable() };
        unsafe { self.reschedule(irq) };
    }

    // ---- Task table & priority map ------------------------------------

    /// Create a task. Errors: out-of-range priority, priority collision,
    /// table full. The new task is immediately runnable (no separate
    /// activation step) unless `create` is called for the kernel-owned
    /// idle task from [`Kernel::start`].
    pub fn create(
        &self,
        entry: fn() -> !,
        stack: &'static mut [MaybeUninit<u8>],
        priority: usize,
        name: &str,
    ) -> Result<TaskId, KernelError> {
        if priority >= N {
            return Err(KernelError::OutOfRange);
        }
        let irq = unsafe { P::irq_save_disable() };
        let inner = unsafe { &mut *self.inner.get() };
        // Free-slot search runs before the priority check, matching the
        // original source's `os_add_task` (its free-slot scan runs to
        // completion before the combined collision/exhaustion check): a
        // fully occupied table is reported as `Exhaustion` regardless of
        // which priority was requested, while `Collision` is reserved
        // for a still-roomy table whose one requested priority happens
        // to be taken.
        let Some(slot) = inner.first_free_slot() else {
            unsafe { P::irq_restore(irq) };
            return Err(KernelError::Exhaustion);
        };
        if inner.priority[priority].is_some() {
            unsafe { P::irq_restore(irq) };
            return Err(KernelError::Collision);
        }

        let stack_top = P::initialize_stack(stack, entry, Self::terminator_trampoline);

        let mut name_buf = TaskName::EMPTY;
        name_buf.set(name);
        inner.tasks[slot as usize] = Tcb {
            name: name_buf,
            stack_top,
            wake_at: 0,
            state: TaskState::IN_USE,
        };
        inner.priority[priority] = Some(slot);
        #[cfg(feature = "log")]
        log::debug!("create: task {slot} {name:?} at priority {priority}");

        unsafe { P::irq_restore(irq) };
        Ok(TaskId(slot))
    }

    fn terminator_trampoline() -> ! {
        let this = Self::shared();
        let id = this.current_id();
        let _ = this.remove(id);
        unreachable!("remove() of the running task never returns")
    }

    /// Remove a task. Clears `in_use` and its priority slot, then
    /// yields. Calling this on the currently running task never returns
    /// to the caller. Rejects removal of the kernel-owned idle task.
    pub fn remove(&self, id: TaskId) -> Result<(), KernelError> {
        self.validate_id(id)?;
        let irq = unsafe { P::irq_save_disable() };
        let inner = unsafe { &mut *self.inner.get() };
        if !inner.tasks[id.index()].state.contains(TaskState::IN_USE) {
            unsafe { P::irq_restore(irq) };
            return Err(KernelError::BadState);
        }
        if inner.idle == Some(id.0) {
            unsafe { P::irq_restore(irq) };
            return Err(KernelError::BadState);
        }
        inner.tasks[id.index()].state = TaskState::empty();
        if let Some(slot) = inner.priority_slot_of(id.0) {
            inner.priority[slot] = None;
        }
        #[cfg(feature = "log")]
        log::debug!("remove: task {}", id.0);
        let removing_current = inner.current == Some(id.0);
        unsafe { self.reschedule(irq) };
        if removing_current {
            unreachable!("reschedule never returns to a task it just removed");
        }
        Ok(())
    }

    /// The running task's id, O(1).
    pub fn current_id(&self) -> TaskId {
        self.mutate(|inner| TaskId(inner.current.expect("no task is currently running")))
    }

    pub fn set_name(&self, id: TaskId, name: &str) -> Result<(), KernelError> {
        self.validate_id(id)?;
        self.mutate(|inner| {
            if !inner.tasks[id.index()].state.contains(TaskState::IN_USE) {
                return Err(KernelError::BadState);
            }
            inner.tasks[id.index()].name.set(name);
            Ok(())
        })
    }

    pub fn get_name(&self, id: TaskId) -> Result<TaskName<NAME_MAX>, KernelError> {
        self.validate_id(id)?;
        self.mutate(|inner| {
            if !inner.tasks[id.index()].state.contains(TaskState::IN_USE) {
                return Err(KernelError::BadState);
            }
            Ok(inner.tasks[id.index()].name)
        })
    }

    /// Move `id`'s priority map entry; fails if the destination slot is
    /// occupied. Invokes the scheduler.
    pub fn set_priority(&self, id: TaskId, new_priority: usize) -> Result<(), KernelError> {
        if new_priority >= N {
            return Err(KernelError::OutOfRange);
        }
        self.validate_id(id)?;
        let irq = unsafe { P::irq_save_disable() };
        let inner = unsafe { &mut *self.inner.get() };
        if !inner.tasks[id.index()].state.contains(TaskState::IN_USE) {
            unsafe { P::irq_restore(irq) };
            return Err(KernelError::BadState);
        }
        if inner.priority[new_priority].is_some() {
            unsafe { P::irq_restore(irq) };
            return Err(KernelError::Collision);
        }
        if let Some(old) = inner.priority_slot_of(id.0) {
            inner.priority[old] = None;
        }
        inner.priority[new_priority] = Some(id.0);
        unsafe { self.reschedule(irq) };
        Ok(())
    }

    /// Linear scan of the priority table.
    pub fn get_priority(&self, id: TaskId) -> Result<usize, KernelError> {
        self.validate_id(id)?;
        self.mutate(|inner| {
            if !inner.tasks[id.index()].state.contains(TaskState::IN_USE) {
                return Err(KernelError::BadState);
            }
            inner
                .priority_slot_of(id.0)
                .ok_or(KernelError::BadState)
        })
    }

    /// A consistent snapshot of the priority table, for introspection
    /// and property tests (priority uniqueness, selection correctness).
    pub fn priority_table_snapshot(&self) -> [Option<TaskId>; N] {
        self.mutate(|inner| {
            let mut out = [None; N];
            for (slot, id) in inner.priority.iter().enumerate() {
                out[slot] = id.map(TaskId);
            }
            out
        })
    }

    // ---- Lifecycle modifiers ------------------------------------------

    /// Sets `wake_at = now + ticks`, sets `delayed`, then yields.
    pub fn sleep(&self, id: TaskId, ticks: u32) -> Result<(), KernelError> {
        self.validate_id(id)?;
        let now = self.system_ticks.load(Ordering::Relaxed);
        self.mutate_and_schedule(|inner| {
            if !inner.tasks[id.index()].state.contains(TaskState::IN_USE) {
                return Err(KernelError::BadState);
            }
            let tcb = &mut inner.tasks[id.index()];
            tcb.wake_at = now.wrapping_add(ticks);
            tcb.state.insert(TaskState::DELAYED);
            Ok(())
        })
    }

    /// Clears `delayed`. Any API that may make a higher-priority task
    /// runnable invokes the scheduler, and this is no exception: it
    /// also yields, so a caller cancelling another task's sleep lets
    /// that task preempt immediately if it outranks the caller.
    pub fn cancel_sleep(&self, id: TaskId) -> Result<(), KernelError> {
        self.validate_id(id)?;
        self.mutate_and_schedule(|inner| {
            if !inner.tasks[id.index()].state.contains(TaskState::IN_USE) {
                return Err(KernelError::BadState);
            }
            inner.tasks[id.index()].state.remove(TaskState::DELAYED);
            Ok(())
        })
    }

    pub fn suspend(&self, id: TaskId) -> Result<(), KernelError> {
        self.validate_id(id)?;
        self.mutate_and_schedule(|inner| {
            if !inner.tasks[id.index()].state.contains(TaskState::IN_USE) {
                return Err(KernelError::BadState);
            }
            inner.tasks[id.index()].state.insert(TaskState::SUSPENDED);
            Ok(())
        })
    }

    /// A no-op on a task that isn't suspended.
    pub fn resume(&self, id: TaskId) -> Result<(), KernelError> {
        self.validate_id(id)?;
        self.mutate_and_schedule(|inner| {
            if !inner.tasks[id.index()].state.contains(TaskState::IN_USE) {
                return Err(KernelError::BadState);
            }
            inner.tasks[id.index()].state.remove(TaskState::SUSPENDED);
            Ok(())
        })
    }

    // ---- Semaphore support (crate-internal; see `semaphore.rs`) ------

    pub(crate) fn mark_sem_blocked(&self, id: TaskId) {
        self.mutate(|inner| inner.tasks[id.index()].state.insert(TaskState::SEM_BLOCKED));
    }

    pub(crate) fn clear_sem_blocked(&self, id: TaskId) {
        self.mutate(|inner| inner.tasks[id.index()].state.remove(TaskState::SEM_BLOCKED));
    }

    /// Scan the priority table ascending (highest priority first) for
    /// the first task that is both blocked on this semaphore and
    /// currently `SEM_BLOCKED`. Must be called with the kernel's
    /// critical section already held by the caller.
    pub(crate) fn pick_blocked_waiter_locked(
        &self,
        waiters: &[bool],
    ) -> Option<TaskId> {
        let inner = unsafe { &*self.inner.get() };
        for slot in 0..N {
            if let Some(id) = inner.priority[slot] {
                if waiters[id as usize] && inner.tasks[id as usize].state.contains(TaskState::SEM_BLOCKED)
                {
                    return Some(TaskId(id));
                }
            }
        }
        None
    }

    pub(crate) unsafe fn raw_irq_save_disable() -> P::IrqState {
        unsafe { P::irq_save_disable() }
    }

    pub(crate) unsafe fn raw_irq_restore(irq: P::IrqState) {
        unsafe { P::irq_restore(irq) }
    }

    pub(crate) unsafe fn raw_reschedule(&self, irq: P::IrqState) {
        unsafe { self.reschedule(irq) }
    }

    // ---- Tick & time base ----------------------------------------------

    /// The monotonic tick counter. 32-bit; rollover after ~49 days at
    /// 1 kHz is a documented limitation, not silently patched.
    pub fn ticks(&self) -> u32 {
        self.system_ticks.load(Ordering::Relaxed)
    }

    /// The tick interrupt handler. Increments `system_ticks` and
    /// `quantum_ticks`; invokes the scheduler once every `Q` ticks. Must
    /// not be called from task context.
    fn on_tick(&self) {
        let irq = unsafe { P::irq_save_disable() };
        self.system_ticks.fetch_add(1, Ordering::Relaxed);
        let inner = unsafe { &mut *self.inner.get() };
        inner.quantum_ticks += 1;
        if inner.quantum_ticks >= Q {
            inner.quantum_ticks = 0;
            unsafe { self.reschedule(irq) };
        } else {
            unsafe { P::irq_restore(irq) };
        }
    }

    fn tick_trampoline() {
        Self::shared().on_tick();
    }

    fn idle_entry() -> ! {
        loop {
            P::wait_for_interrupt();
        }
    }

    /// Bring up the kernel: creates the kernel-owned idle task at the
    /// lowest priority slot, starts the periodic tick source, and
    /// dispatches the first task. Never returns.
    ///
    /// `idle_stack` is owned by the caller for the lifetime of the
    /// program, matching the ownership rule for all task stacks.
    pub fn start(&'static self, idle_stack: &'static mut [MaybeUninit<u8>], tick_hz: u32) -> ! {
        Self::self_ptr_cell().store(self as *const Self as usize, Ordering::Release);

        let idle_id = self
            .create(Self::idle_entry, idle_stack, N - 1, "idle")
            .expect("idle task's priority slot (N - 1) must be free at startup");
        self.mutate(|inner| inner.idle = Some(idle_id.0));

        P::start_tick_source(tick_hz, Self::tick_trampoline);

        let irq = unsafe { P::irq_save_disable() };
        unsafe { self.reschedule(irq) };
        unreachable!("reschedule() at startup always switches into a task and never returns")
    }
}

impl<P: Port, const N: usize, const Q: u32, const NAME_MAX: usize> Default
    for Kernel<P, N, Q, NAME_MAX>
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runnable<const NAME_MAX: usize>(slot: u8, inner: &mut Inner<4, NAME_MAX>) {
        inner.tasks[slot as usize].state = TaskState::IN_USE;
        inner.priority[slot as usize] = Some(slot);
    }

    #[test]
    fn select_next_on_empty_table_is_none() {
        let mut inner: Inner<4, 8> = Inner::new();
        assert_eq!(inner.select_next(0), None);
    }

    #[test]
    fn select_next_picks_highest_priority_runnable() {
        let mut inner: Inner<4, 8> = Inner::new();
        runnable(0, &mut inner);
        runnable(2, &mut inner);
        // Both task 0 (priority slot 0) and task 2 (priority slot 2) are
        // runnable; the ascending scan must pick the lower slot first.
        assert_eq!(inner.select_next(0), Some(0));
    }

    #[test]
    fn select_next_skips_suspended_and_sem_blocked() {
        let mut inner: Inner<4, 8> = Inner::new();
        runnable(0, &mut inner);
        inner.tasks[0].state.insert(TaskState::SUSPENDED);
        runnable(1, &mut inner);
        inner.tasks[1].state.insert(TaskState::SEM_BLOCKED);
        runnable(2, &mut inner);
        assert_eq!(inner.select_next(0), Some(2));
    }

    #[test]
    fn select_next_respects_unexpired_delay() {
        let mut inner: Inner<4, 8> = Inner::new();
        runnable(0, &mut inner);
        inner.tasks[0].state.insert(TaskState::DELAYED);
        inner.tasks[0].wake_at = 100;
        runnable(1, &mut inner);

        assert_eq!(inner.select_next(50), Some(1));
        assert!(inner.tasks[0].state.contains(TaskState::DELAYED));
    }

    #[test]
    fn select_next_clears_delayed_once_expired() {
        let mut inner: Inner<4, 8> = Inner::new();
        runnable(0, &mut inner);
        inner.tasks[0].state.insert(TaskState::DELAYED);
        inner.tasks[0].wake_at = 100;

        assert_eq!(inner.select_next(100), Some(0));
        assert!(!inner.tasks[0].state.contains(TaskState::DELAYED));
    }

    #[test]
    fn first_free_slot_finds_lowest_index() {
        let mut inner: Inner<4, 8> = Inner::new();
        runnable(0, &mut inner);
        assert_eq!(inner.first_free_slot(), Some(1));
    }

    #[test]
    fn priority_slot_of_reflects_the_priority_table() {
        let mut inner: Inner<4, 8> = Inner::new();
        runnable(3, &mut inner);
        assert_eq!(inner.priority_slot_of(3), Some(3));
        assert_eq!(inner.priority_slot_of(0), None);
    }

    mod select_next_matches_reference {
        use super::*;
        use quickcheck_macros::quickcheck;

        const LEN: usize = 4;

        /// A modifying operation on the task table, decoded from random
        /// bytes by `interpret`.
        #[derive(Debug, Clone, Copy)]
        enum Cmd {
            Occupy { slot: u8, priority: u8 },
            Vacate { slot: u8 },
            SetSuspended { slot: u8, on: bool },
            SetSemBlocked { slot: u8, on: bool },
            Delay { slot: u8, wake_at: u32 },
            CancelDelay { slot: u8 },
        }

        /// Turns an arbitrary byte string into a bounded sequence of
        /// `Cmd`s, each consuming a fixed number of bytes so the mapping
        /// stays stable as quickcheck shrinks the input.
        fn interpret(bytecode: &[u8]) -> impl Iterator<Item = Cmd> + '_ {
            let mut i = 0;
            std::iter::from_fn(move || {
                let chunk = bytecode.get(i..i + 6)?;
                i += 6;
                let slot = chunk[0] % LEN as u8;
                Some(match chunk[1] % 6 {
                    0 => Cmd::Occupy {
                        slot,
                        priority: chunk[2] % LEN as u8,
                    },
                    1 => Cmd::Vacate { slot },
                    2 => Cmd::SetSuspended {
                        slot,
                        on: chunk[2] % 2 == 0,
                    },
                    3 => Cmd::SetSemBlocked {
                        slot,
                        on: chunk[2] % 2 == 0,
                    },
                    4 => Cmd::Delay {
                        slot,
                        wake_at: u32::from_le_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]),
                    },
                    _ => Cmd::CancelDelay { slot },
                })
            })
        }

        /// Applies a command to the task table, keeping `priority` as a
        /// one-task-per-slot table exactly like [`Kernel::create`] and
        /// [`Kernel::set_priority`] do: occupying a priority slot first
        /// evicts whichever task already held it.
        fn apply(inner: &mut Inner<LEN, 8>, cmd: Cmd) {
            match cmd {
                Cmd::Occupy { slot, priority } => {
                    for p in inner.priority.iter_mut() {
                        if *p == Some(slot) {
                            *p = None;
                        }
                    }
                    inner.priority[priority as usize] = Some(slot);
                    inner.tasks[slot as usize].state.insert(TaskState::IN_USE);
                }
                Cmd::Vacate { slot } => {
                    for p in inner.priority.iter_mut() {
                        if *p == Some(slot) {
                            *p = None;
                        }
                    }
                    inner.tasks[slot as usize].state = TaskState::empty();
                }
                Cmd::SetSuspended { slot, on } => {
                    inner.tasks[slot as usize]
                        .state
                        .set(TaskState::SUSPENDED, on);
                }
                Cmd::SetSemBlocked { slot, on } => {
                    inner.tasks[slot as usize]
                        .state
                        .set(TaskState::SEM_BLOCKED, on);
                }
                Cmd::Delay { slot, wake_at } => {
                    let tcb = &mut inner.tasks[slot as usize];
                    tcb.state.insert(TaskState::DELAYED);
                    tcb.wake_at = wake_at;
                }
                Cmd::CancelDelay { slot } => {
                    inner.tasks[slot as usize].state.remove(TaskState::DELAYED);
                }
            }
        }

        /// A from-scratch restatement of the selection rule, over the
        /// priority table's `(slot, id)` pairs rather than `select_next`'s
        /// hand-written loop, so the two can disagree if either has a
        /// bug. Does not mutate `DELAYED`, unlike `select_next`.
        fn reference_select(inner: &Inner<LEN, 8>, now: u32) -> Option<u8> {
            inner
                .priority
                .iter()
                .enumerate()
                .filter_map(|(_, id)| *id)
                .find(|&id| {
                    let tcb = &inner.tasks[id as usize];
                    tcb.runnable_ignoring_delay()
                        && (!tcb.state.contains(TaskState::DELAYED) || now >= tcb.wake_at)
                })
        }

        #[quickcheck]
        fn test(bytecode: Vec<u8>, now: u32) {
            let mut inner: Inner<LEN, 8> = Inner::new();
            for cmd in interpret(&bytecode) {
                apply(&mut inner, cmd);
            }

            let expected = reference_select(&inner, now);
            assert_eq!(inner.select_next(now), expected);

            // `select_next` must have cleared `DELAYED` on the winner
            // (if any) exactly when its delay had expired, and touched
            // no other slot's flag.
            if let Some(id) = expected {
                if now >= inner.tasks[id as usize].wake_at {
                    assert!(!inner.tasks[id as usize].state.contains(TaskState::DELAYED));
                }
            }
        }
    }
}
