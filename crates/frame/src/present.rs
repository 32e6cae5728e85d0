//! Presentation seam.

use std::time::Duration;

use ash::vk;

use crate::backend::GpuBackend;
use crate::error::FrameResult;

/// Outcome of asking for the next presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { index: u32, suboptimal: bool },
    /// The target must be recreated before anything can be acquired.
    OutOfDate,
    Timeout,
}

/// Outcome of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented { suboptimal: bool },
    OutOfDate,
    DeviceLost,
}

/// Provider of presentable images, usually a swapchain.
///
/// Errors returned from these methods are fatal. Recoverable conditions
/// are reported through the outcome enums instead.
pub trait Presenter<B: GpuBackend> {
    /// Acquires an image, arranging for `signal` to be signalled once it
    /// is safe to write.
    fn acquire_next_target(
        &mut self,
        timeout: Duration,
        signal: &B::Semaphore,
    ) -> FrameResult<AcquireOutcome>;

    /// Presents image `index` after `wait_on` signals.
    fn present(&mut self, index: u32, wait_on: &B::Semaphore) -> FrameResult<PresentOutcome>;

    /// Rebuilds the presentable images for `extent`. Called with the device
    /// idle.
    fn recreate(&mut self, extent: vk::Extent2D) -> FrameResult<()>;

    fn extent(&self) -> vk::Extent2D;
}
