//! GPU shared-image collaborator.
//!
//! Canvas resources never touch a graphics driver directly. Everything they need from the GPU
//! process (shared image allocation, uploads, read-back and sync tokens) goes through
//! [`GpuContext`]. [`SoftwareGpu`] implements it in process memory.

mod context;
mod software;

pub use context::{GpuContext, Mailbox, SharedImageDesc, SyncToken};
pub use software::{SoftwareGpu, SoftwareGpuStats};
