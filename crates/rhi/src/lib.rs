//! Thin Vulkan layer over `ash` used by the frame pacer.
//!
//! This crate owns the native objects the frame core is built from:
//! - Instance creation and GPU selection
//! - The logical device, its queues and the memory allocator
//! - Command pools and command buffers
//! - Fences and semaphores
//! - The swapchain
//! - Allocator-backed buffers
//!
//! Every wrapper releases its handle on drop. Ordering of those drops
//! against in-flight GPU work is the frame core's job, not this crate's.

mod error;

pub mod buffer;
pub mod command;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
