//! GPU backend seam.
//!
//! The frame loop only needs a handful of operations from the device:
//! create and wait on fences, create semaphores and command targets, record
//! and submit. [`GpuBackend`] names exactly those, so the scheduler runs the
//! same against Vulkan and against a simulated device.
//!
//! Resources are plain RAII values. Dropping a fence, semaphore or command
//! target destroys it; keeping that drop behind the GPU is the scheduler's
//! job.

use std::time::Duration;

use crate::error::FrameResult;

/// Result of a bounded fence wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceStatus {
    Signaled,
    TimedOut,
}

/// One batch of recorded work handed to the queue.
pub struct Submission<'a, B: GpuBackend + ?Sized> {
    pub commands: &'a B::CommandTarget,
    /// Semaphore the batch waits on before writing colour output.
    pub wait: Option<&'a B::Semaphore>,
    /// Semaphore signalled when the batch completes.
    pub signal: Option<&'a B::Semaphore>,
    /// Fence signalled when the batch completes. Must be unsignaled.
    pub fence: &'a B::Fence,
}

pub trait GpuBackend {
    /// Something commands are recorded into (pool plus primary buffer).
    type CommandTarget;
    type Fence;
    type Semaphore;

    fn create_fence(&self, signaled: bool) -> FrameResult<Self::Fence>;

    fn create_semaphore(&self) -> FrameResult<Self::Semaphore>;

    fn create_command_target(&self) -> FrameResult<Self::CommandTarget>;

    /// Blocks for at most `timeout` waiting for `fence` to signal.
    fn wait_for_fence(&self, fence: &Self::Fence, timeout: Duration) -> FrameResult<FenceStatus>;

    /// Returns a fence to unsignaled. It must not be pending.
    fn reset_fence(&self, fence: &Self::Fence) -> FrameResult<()>;

    /// Discards recorded commands. The target must not be pending.
    fn reset_command_target(&self, target: &Self::CommandTarget) -> FrameResult<()>;

    fn begin_recording(&self, target: &Self::CommandTarget) -> FrameResult<()>;

    fn end_recording(&self, target: &Self::CommandTarget) -> FrameResult<()>;

    fn submit(&self, submission: Submission<'_, Self>) -> FrameResult<()>;

    /// Blocks until all submitted work has retired.
    fn wait_idle(&self) -> FrameResult<()>;
}
