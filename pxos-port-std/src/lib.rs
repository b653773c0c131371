//! A hosted simulator [`Port`] for `pxos-kernel`, used for development and
//! testing without real target hardware.
//!
//! Each task is a real OS thread; a single mutex-guarded [`Scheduler`]
//! tracks which one is allowed to actually run at any moment (its
//! `current` field is the same "run token" real hardware keeps in a
//! single core's program counter). `irq_save_disable`/`irq_restore` are a
//! thread-reentrant wrapper around that same mutex, so task threads and
//! the tick-source thread never observe the kernel's state concurrently.
//!
//! Unlike real hardware, this port cannot forcibly suspend a thread that
//! never calls back into it — there is no interrupt to trap a tight
//! `loop {}` on a host OS. Tick-driven preemption therefore only takes
//! effect at the next checkpoint a task thread makes into the kernel
//! (any call on [`pxos_kernel::Kernel`], including [`pxos_kernel::Kernel::yield_now`]).
//! CPU-bound task bodies should call `yield_now()` periodically — the
//! kernel-owned idle task already does this via `wait_for_interrupt`.
//! This mirrors `r3_port_std`'s own remote-park thread library in spirit
//! (same "one logical runner at a time" structure, grounded on its
//! `ums::ThreadGroup`), but trades its raw signal/longjmp-based
//! asynchronous park for a safe, cooperative `Condvar` wait — see
//! `DESIGN.md` for the tradeoff.

use std::{
    cell::{Cell, RefCell},
    mem::MaybeUninit,
    sync::{Condvar, Mutex, MutexGuard, OnceLock},
    thread,
    time::Duration,
};

use slab::Slab;

use pxos_kernel::Port;

type GateId = usize;

struct WorkerThread {
    _join_handle: thread::JoinHandle<()>,
}

/// The single piece of shared state every task thread and the tick
/// source contend over: the thread registry and whose turn it is.
struct Scheduler {
    threads: Slab<WorkerThread>,
    current: Option<GateId>,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            threads: Slab::new(),
            current: None,
        }
    }
}

fn state() -> &'static Mutex<Scheduler> {
    static STATE: OnceLock<Mutex<Scheduler>> = OnceLock::new();
    STATE.get_or_init(|| Mutex::new(Scheduler::new()))
}

fn resched_cond() -> &'static Condvar {
    static COND: Condvar = Condvar::new();
    &COND
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    /// The thread that called `Kernel::start`. Never dispatched again
    /// once it has handed off to the first task.
    Bootstrap,
    /// The periodic tick-source thread.
    Ticker,
    /// A task's own worker thread.
    Task(GateId),
}

thread_local! {
    static ROLE: Cell<Role> = const { Cell::new(Role::Bootstrap) };
    static DEPTH: Cell<u32> = const { Cell::new(0) };
    static HELD: RefCell<Option<MutexGuard<'static, Scheduler>>> = const { RefCell::new(None) };
}

/// Runs `f` with the scheduler state locked, reusing this thread's
/// already-held critical section if it has one instead of taking the
/// mutex again (it would deadlock otherwise: `Kernel::create` calls
/// [`StdPort::initialize_stack`] from inside its own critical section).
fn with_state<R>(f: impl FnOnce(&mut Scheduler) -> R) -> R {
    if DEPTH.with(Cell::get) > 0 {
        HELD.with(|h| {
            let mut borrow = h.borrow_mut();
            let guard = borrow
                .as_mut()
                .expect("DEPTH > 0 implies this thread is holding the guard");
            f(&mut *guard)
        })
    } else {
        let mut guard = state().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}

fn park_until_my_turn(gate: GateId) {
    let mut guard = state().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    while guard.current != Some(gate) {
        guard = resched_cond()
            .wait(guard)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
    }
}

/// The hosted port itself: a zero-sized marker implementing [`Port`]
/// entirely with associated functions, matching the trait's shape (no
/// `&self` — there is exactly one port per program).
pub struct StdPort;

impl Port for StdPort {
    type IrqState = u32;

    unsafe fn irq_save_disable() -> u32 {
        let depth = DEPTH.with(Cell::get);
        if depth == 0 {
            let guard = state().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            HELD.with(|h| *h.borrow_mut() = Some(guard));
        }
        DEPTH.with(|d| d.set(depth + 1));
        depth
    }

    unsafe fn irq_restore(prev_depth: u32) {
        let depth = DEPTH.with(Cell::get);
        debug_assert!(depth > 0, "irq_restore without a matching irq_save_disable");
        DEPTH.with(|d| d.set(depth - 1));
        if prev_depth == 0 {
            HELD.with(|h| {
                h.borrow_mut().take();
            });
        }
    }

    fn initialize_stack(
        stack: &'static mut [MaybeUninit<u8>],
        entry: fn() -> !,
        _on_return: fn() -> !,
    ) -> usize {
        // `_on_return` is unreachable through safe Rust: `entry`'s
        // return type is `!`, so a call to it can never actually
        // return control to the line after. The parameter exists only
        // to keep this port's signature identical to a register-level
        // one, where a corrupted stack image really could "return" out
        // of `entry` by executing a bare `ret`.
        let stack_size = stack.len().max(64 * 1024);

        let gate = with_state(|s| s.threads.vacant_key());
        let join_handle = thread::Builder::new()
            .name(format!("pxos-task-{gate}"))
            .stack_size(stack_size)
            .spawn(move || {
                ROLE.with(|r| r.set(Role::Task(gate)));
                park_until_my_turn(gate);
                entry();
            })
            .expect("failed to spawn task thread");
        with_state(|s| {
            let inserted = s.threads.insert(WorkerThread {
                _join_handle: join_handle,
            });
            debug_assert_eq!(inserted, gate, "vacant_key must match the following insert");
        });

        #[cfg(feature = "log")]
        log::debug!("initialize_stack: spawned worker thread for gate {gate}");

        gate
    }

    unsafe fn context_switch(out_from: Option<&mut usize>, to: usize) {
        if let Some(slot) = out_from {
            if let Role::Task(my_gate) = ROLE.with(Cell::get) {
                debug_assert_eq!(
                    *slot, my_gate,
                    "a task's stack_top is its own gate id and never changes"
                );
            }
        }

        #[cfg(feature = "log")]
        log::trace!("context_switch: {out_from:?} -> {to}");

        HELD.with(|h| {
            let mut borrow = h.borrow_mut();
            let guard = borrow
                .as_mut()
                .expect("context_switch called outside the critical section");
            guard.current = Some(to);
        });
        resched_cond().notify_all();

        debug_assert_eq!(
            DEPTH.with(Cell::get),
            1,
            "context_switch only ever runs at the outermost critical section"
        );
        DEPTH.with(|d| d.set(0));
        let guard = HELD
            .with(|h| h.borrow_mut().take())
            .expect("the outermost critical section must hold the scheduler guard");

        match ROLE.with(Cell::get) {
            Role::Task(my_gate) => {
                let mut guard = guard;
                while guard.current != Some(my_gate) {
                    guard = resched_cond()
                        .wait(guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner());
                }
                // Dropped here: this task's next kernel call reacquires
                // the critical section fresh, exactly as if it had
                // just been dispatched on real hardware with the
                // popped flags register enabling interrupts again.
            }
            Role::Ticker => {
                // The tick source never "runs" a task; it only ever
                // redirects who does, then returns to keep ticking.
            }
            Role::Bootstrap => {
                drop(guard);
                // `Kernel::start` never returns; neither does the
                // thread that called it, once dispatch has happened.
                loop {
                    thread::park();
                }
            }
        }
    }

    fn start_tick_source(hz: u32, on_tick: fn()) {
        let period = Duration::from_secs_f64(1.0 / f64::from(hz.max(1)));
        thread::Builder::new()
            .name("pxos-tick".into())
            .spawn(move || {
                ROLE.with(|r| r.set(Role::Ticker));
                loop {
                    thread::sleep(period);
                    on_tick();
                }
            })
            .expect("failed to spawn tick source thread");
    }

    fn wait_for_interrupt() {
        thread::sleep(Duration::from_micros(200));
        if let Role::Task(my_gate) = ROLE.with(Cell::get) {
            let mut guard = state().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            while guard.current != Some(my_gate) {
                guard = resched_cond()
                    .wait(guard)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
        }
    }
}
