//! Round-robin scheduler: global thread/process arenas, the ready queue, and
//! the tick/yield/switch paths that drive them.
//!
//! Threads and processes live in flat arenas (`Vec<Option<Tcb/Pcb>>`)
//! indexed by their id — an external arena with a stable identifier per the
//! source's raw TCB/PCB pointer graph, minus the raw pointers. Nothing is
//! ever removed from an arena; a zombie thread's slot just never leaves that
//! state, which is the same "reaping is stubbed" limitation the source has.

use alloc::vec::Vec;

use spin::Mutex;

use super::queue::ReadyQueue;
use super::task::{Pcb, ProcessId, Tcb, ThreadId, ThreadState, DEFAULT_TIME_SLICE, KERNEL_STACK_SIZE};
use crate::arch::x86_64::context::Context;
use crate::arch::x86_64::gdt;
use crate::mm::{heap, page_table};

static THREADS: Mutex<Vec<Option<Tcb>>> = Mutex::new(Vec::new());
static PROCESSES: Mutex<Vec<Option<Pcb>>> = Mutex::new(Vec::new());
static READY: Mutex<ReadyQueue> = Mutex::new(ReadyQueue::new());
static CURRENT: Mutex<Option<ThreadId>> = Mutex::new(None);
static IDLE_TID: Mutex<Option<ThreadId>> = Mutex::new(None);

/// Throwaway save slot for the very first [`schedule`] call, which has no
/// current thread to save a context into — the kernel's boot stack is never
/// resumed through it.
static BOOT_CONTEXT: Mutex<Context> = Mutex::new(Context::dummy());

extern "C" fn idle_entry() -> ! {
    loop {
        crate::arch::x86_64::idle();
    }
}

/// Brings up the scheduler: allocates the idle process (pid 0) and makes it
/// the current thread without yet running [`schedule`].
pub fn init() {
    let idle_pid = create_process_inner("idle", None);
    let idle_tid = create_thread_inner(idle_pid, idle_entry, 0);
    if let Some(pcb) = PROCESSES.lock()[idle_pid as usize].as_mut() {
        pcb.main_thread = idle_tid;
    }
    // The idle thread starts "running" rather than sitting in the ready
    // queue: it's the fallback, not a normal participant until something
    // else preempts it.
    READY.lock().pop_front();
    if let Some(tcb) = THREADS.lock()[idle_tid as usize].as_mut() {
        tcb.state = ThreadState::Running;
    }
    *CURRENT.lock() = Some(idle_tid);
    *IDLE_TID.lock() = Some(idle_tid);
}

fn idle_tid() -> ThreadId {
    IDLE_TID.lock().expect("sched::init was not called")
}

fn create_process_inner(name: &str, parent: Option<ProcessId>) -> ProcessId {
    let root = page_table::read_cr3();
    let mut processes = PROCESSES.lock();
    let pid = processes.len() as ProcessId;
    processes.push(Some(Pcb::new(pid, name, root, parent)));
    pid
}

fn create_thread_inner(pid: ProcessId, entry: extern "C" fn() -> !, priority: u8) -> ThreadId {
    let stack_base = heap::aligned_alloc(16, KERNEL_STACK_SIZE) as usize;
    assert!(stack_base != 0, "out of memory allocating a kernel stack");
    let context = Context::new(entry, stack_base, KERNEL_STACK_SIZE);

    let mut threads = THREADS.lock();
    let tid = threads.len() as ThreadId;
    threads.push(Some(Tcb {
        tid,
        process: pid,
        state: ThreadState::Ready,
        context,
        stack_base,
        stack_size: KERNEL_STACK_SIZE,
        priority,
        time_slice: DEFAULT_TIME_SLICE,
        runtime: 0,
    }));
    drop(threads);

    if let Some(pcb) = PROCESSES.lock()[pid as usize].as_mut() {
        pcb.threads.push(tid);
    }
    READY.lock().push_back(tid);
    tid
}

/// Creates a process with a main thread at `entry`, per spec §4.8.
pub fn process_create(name: &str, entry: extern "C" fn() -> !) -> ProcessId {
    let pid = create_process_inner(name, None);
    let tid = create_thread_inner(pid, entry, 0);
    if let Some(pcb) = PROCESSES.lock()[pid as usize].as_mut() {
        pcb.main_thread = tid;
    }
    pid
}

/// Creates an additional thread in an existing process.
pub fn thread_create(pid: ProcessId, entry: extern "C" fn() -> !, priority: u8) -> ThreadId {
    create_thread_inner(pid, entry, priority)
}

/// The pid of the currently running thread's process, or `-1` if no thread
/// is current (should not happen once [`init`] has run).
pub fn current_pid() -> i64 {
    let tid = match *CURRENT.lock() {
        Some(t) => t,
        None => return -1,
    };
    THREADS
        .lock()
        .get(tid as usize)
        .and_then(|t| t.as_ref())
        .map(|t| t.process as i64)
        .unwrap_or(-1)
}

/// Marks the caller's thread zombie and reschedules. Never returns.
pub fn thread_exit() -> ! {
    if let Some(tid) = *CURRENT.lock() {
        if let Some(tcb) = THREADS.lock()[tid as usize].as_mut() {
            tcb.state = ThreadState::Zombie;
        }
    }
    schedule();
    unreachable!("a zombie thread was rescheduled");
}

/// Marks every thread in the calling process zombie and records `code`.
/// Reaping zombies is not implemented, matching the source.
pub fn process_exit(code: i32) -> ! {
    let pid = {
        let tid = CURRENT.lock().expect("process_exit with no current thread");
        THREADS.lock()[tid as usize].as_ref().unwrap().process
    };
    let thread_ids = {
        let mut processes = PROCESSES.lock();
        let pcb = processes[pid as usize].as_mut().unwrap();
        pcb.exit_code = Some(code);
        pcb.threads.clone()
    };
    let mut threads = THREADS.lock();
    for tid in thread_ids {
        if let Some(tcb) = threads[tid as usize].as_mut() {
            tcb.state = ThreadState::Zombie;
        }
    }
    drop(threads);
    schedule();
    unreachable!("a zombie process was rescheduled");
}

/// Called on every timer tick. Decrements the running thread's time slice;
/// invokes the scheduler once it reaches zero.
pub fn timer_tick() {
    let expired = {
        let current = *CURRENT.lock();
        let Some(tid) = current else { return };
        let mut threads = THREADS.lock();
        let Some(tcb) = threads.get_mut(tid as usize).and_then(|t| t.as_mut()) else {
            return;
        };
        if tcb.state != ThreadState::Running {
            return;
        }
        tcb.runtime += 1;
        tcb.time_slice = tcb.time_slice.saturating_sub(1);
        tcb.time_slice == 0
    };
    if expired {
        schedule();
    }
}

/// Forces the calling thread to give up the rest of its quantum immediately.
pub fn yield_now() {
    if let Some(tid) = *CURRENT.lock() {
        if let Some(tcb) = THREADS.lock()[tid as usize].as_mut() {
            tcb.time_slice = 0;
        }
    }
    schedule();
}

/// Picks the next thread to run and switches to it if it differs from the
/// current one. The current thread, if still runnable, goes to the tail of
/// the ready queue first so the FIFO ordering spec requires holds.
///
/// The idle thread is never enqueued: it is pure fallback (spec.md §4.7,
/// "if the ready queue is empty the idle process is the fallback"), not a
/// rotating participant. Letting it occupy a FIFO slot like any other thread
/// would steal every Kth quantum from real work and, since idle's own loop
/// never yields, would stall the whole system until the next timer tick
/// happened to preempt it.
pub fn schedule() {
    let prev = *CURRENT.lock();
    let idle = idle_tid();

    let next = {
        let mut ready = READY.lock();
        if let Some(prev_tid) = prev {
            let mut threads = THREADS.lock();
            if let Some(tcb) = threads.get_mut(prev_tid as usize).and_then(|t| t.as_mut()) {
                if tcb.state == ThreadState::Running {
                    tcb.state = ThreadState::Ready;
                    if prev_tid != idle {
                        ready.push_back(prev_tid);
                    }
                }
            }
        }
        ready.pop_front().unwrap_or(idle)
    };

    {
        let mut threads = THREADS.lock();
        if let Some(tcb) = threads.get_mut(next as usize).and_then(|t| t.as_mut()) {
            tcb.state = ThreadState::Running;
            tcb.time_slice = DEFAULT_TIME_SLICE;
        }
    }
    *CURRENT.lock() = Some(next);

    if prev == Some(next) {
        return;
    }

    let next_stack_top = THREADS.lock()[next as usize]
        .as_ref()
        .map(|t| (t.stack_base + t.stack_size) as u64)
        .unwrap();
    gdt::set_kernel_stack(next_stack_top);

    let next_ctx_ptr: *const Context =
        { &THREADS.lock()[next as usize].as_ref().unwrap().context as *const Context };

    match prev {
        None => {
            // SAFETY: `BOOT_CONTEXT` is never resumed into again; `next_ctx_ptr`
            // is a live `Tcb`'s context, kept alive by its arena slot forever.
            unsafe {
                crate::arch::x86_64::context::switch(&mut *BOOT_CONTEXT.lock(), next_ctx_ptr);
            }
        }
        Some(prev_tid) => {
            let prev_ctx_ptr: *mut Context =
                { &mut THREADS.lock()[prev_tid as usize].as_mut().unwrap().context as *mut Context };
            // SAFETY: `prev_tid != next` (checked above), so these point at
            // two distinct, live arena slots; both stay alive for the
            // kernel's lifetime once allocated.
            unsafe {
                crate::arch::x86_64::context::switch(prev_ctx_ptr, next_ctx_ptr);
            }
        }
    }
}

/// Number of threads currently on the ready queue. Exposed for tests.
pub fn ready_len() -> usize {
    READY.lock().len()
}
