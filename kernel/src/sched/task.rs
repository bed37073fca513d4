//! Thread and process control blocks.

use alloc::vec::Vec;

use crate::arch::x86_64::context::Context;
use crate::mm::PhysicalAddress;

pub type ThreadId = u32;
pub type ProcessId = u32;

/// Kernel stack every thread gets, per spec's `thread_create` contract.
pub const KERNEL_STACK_SIZE: usize = 8 * 1024;
/// Default scheduling quantum, in timer ticks.
pub const DEFAULT_TIME_SLICE: u32 = 10;
/// `rflags` a fresh thread starts with: IF set, reserved bit 1 set.
pub const DEFAULT_RFLAGS: u64 = 0x202;

const NAME_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    New,
    Ready,
    Running,
    Blocked,
    Sleeping,
    Zombie,
    Dead,
}

/// Thread Control Block.
pub struct Tcb {
    pub tid: ThreadId,
    pub process: ProcessId,
    pub state: ThreadState,
    pub context: Context,
    pub stack_base: usize,
    pub stack_size: usize,
    pub priority: u8,
    pub time_slice: u32,
    pub runtime: u64,
}

/// Process Control Block. Every process shares the kernel's page-table root
/// for now — per-process address spaces are not part of this core.
pub struct Pcb {
    pub pid: ProcessId,
    name: [u8; NAME_CAPACITY],
    name_len: usize,
    pub page_table_root: PhysicalAddress,
    pub main_thread: ThreadId,
    pub threads: Vec<ThreadId>,
    pub parent: Option<ProcessId>,
    pub children: Vec<ProcessId>,
    pub exit_code: Option<i32>,
}

impl Pcb {
    pub fn new(pid: ProcessId, name: &str, page_table_root: PhysicalAddress, parent: Option<ProcessId>) -> Self {
        let mut buf = [0u8; NAME_CAPACITY];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_CAPACITY - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self {
            pid,
            name: buf,
            name_len: len,
            page_table_root,
            main_thread: 0,
            threads: Vec::new(),
            parent,
            children: Vec::new(),
            exit_code: None,
        }
    }

    pub fn name(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len]).unwrap_or("")
    }
}
