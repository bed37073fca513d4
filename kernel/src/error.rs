//! Internal kernel error type.
//!
//! Distinct from the negative-errno convention used at the syscall boundary
//! (see `crate::syscall::errno`): this is the `Result` currency for
//! fallible internal APIs (frame allocation, virtual memory mapping, heap
//! expansion). The syscall dispatcher maps these onto errno values.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// Physical memory exhausted.
    OutOfMemory,
    /// A virtual address or argument was invalid for the operation.
    InvalidArgument,
    /// The requested mapping does not exist.
    NotMapped,
    /// The requested mapping already exists.
    AlreadyMapped,
    /// A heap or allocator invariant was violated (double free, bad magic).
    CorruptState,
}

pub type KernelResult<T> = Result<T, KernelError>;

impl KernelError {
    /// Maps to the negative-errno convention of spec.md §6.
    pub const fn errno(self) -> i64 {
        match self {
            KernelError::InvalidArgument => -(crate::syscall::errno::EINVAL as i64),
            KernelError::OutOfMemory => -(crate::syscall::errno::ENOMEM as i64),
            KernelError::NotMapped | KernelError::AlreadyMapped => {
                -(crate::syscall::errno::EINVAL as i64)
            }
            KernelError::CorruptState => -(crate::syscall::errno::EIO as i64),
        }
    }
}
