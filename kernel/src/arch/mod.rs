//! Architecture support. x86_64 only — see the module root docs for why the
//! rest of this tree doesn't carry dead multi-arch branches.

pub mod x86_64;

pub use x86_64::*;
