//! Top-level facade crate for the Mycelia Kernel.
//!
//! Re-exports core types and the kernel runtime so users can depend on a single crate.

pub mod core {
    pub use mycelia_core::*;
}

pub mod kernel {
    pub use mycelia_kernel::*;
}
