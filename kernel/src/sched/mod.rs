//! Round-robin scheduling: thread/process control blocks, the ready queue,
//! and the tick/yield/switch paths that drive them.

mod queue;
mod scheduler;
mod task;

pub use scheduler::{
    current_pid, init, process_create, process_exit, ready_len, schedule, thread_create, thread_exit, timer_tick,
    yield_now,
};
pub use task::{Pcb, ProcessId, Tcb, ThreadId, ThreadState, DEFAULT_TIME_SLICE, KERNEL_STACK_SIZE};
