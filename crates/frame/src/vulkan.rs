//! Vulkan implementation of the backend and presenter seams.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use pacer_rhi::command::{CommandBuffer, CommandPool};
use pacer_rhi::device::{self, Device};
use pacer_rhi::swapchain::Swapchain;
use pacer_rhi::sync::{Fence, Semaphore};
use tracing::debug;

use crate::backend::{FenceStatus, GpuBackend, Submission};
use crate::error::{FrameError, FrameResult};
use crate::present::{AcquireOutcome, PresentOutcome, Presenter};

/// [`GpuBackend`] over a logical device's graphics queue.
#[derive(Clone)]
pub struct VulkanBackend {
    device: Arc<Device>,
}

impl VulkanBackend {
    pub fn new(device: Arc<Device>) -> Self {
        Self { device }
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

/// A command pool with one primary buffer allocated from it.
///
/// Each slot gets its own pool so that resetting one slot's buffer never
/// touches another's.
pub struct VulkanCommands {
    buffer: CommandBuffer,
    // Freed after `buffer` by declaration order.
    pool: CommandPool,
}

impl VulkanCommands {
    #[inline]
    pub fn buffer(&self) -> &CommandBuffer {
        &self.buffer
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer.handle()
    }

    #[inline]
    pub fn pool(&self) -> &CommandPool {
        &self.pool
    }
}

fn rhi_err(operation: &'static str) -> impl FnOnce(pacer_rhi::RhiError) -> FrameError {
    move |e| FrameError::from_rhi(operation, e)
}

impl GpuBackend for VulkanBackend {
    type CommandTarget = VulkanCommands;
    type Fence = Fence;
    type Semaphore = Semaphore;

    fn create_fence(&self, signaled: bool) -> FrameResult<Fence> {
        Fence::new(self.device.clone(), signaled).map_err(rhi_err("create fence"))
    }

    fn create_semaphore(&self) -> FrameResult<Semaphore> {
        Semaphore::new(self.device.clone()).map_err(rhi_err("create semaphore"))
    }

    fn create_command_target(&self) -> FrameResult<VulkanCommands> {
        let family = self.device.queue_families().graphics_family.ok_or_else(|| {
            FrameError::InvalidState("device has no graphics queue family".to_string())
        })?;
        let pool =
            CommandPool::new(self.device.clone(), family).map_err(rhi_err("create command pool"))?;
        let buffer = CommandBuffer::new(&pool).map_err(rhi_err("allocate command buffer"))?;
        Ok(VulkanCommands { buffer, pool })
    }

    fn wait_for_fence(&self, fence: &Fence, timeout: Duration) -> FrameResult<FenceStatus> {
        match fence.wait(timeout) {
            Ok(true) => Ok(FenceStatus::Signaled),
            Ok(false) => Ok(FenceStatus::TimedOut),
            Err(e) => Err(FrameError::from_rhi("wait for fence", e)),
        }
    }

    fn reset_fence(&self, fence: &Fence) -> FrameResult<()> {
        fence.reset().map_err(rhi_err("reset fence"))
    }

    fn reset_command_target(&self, target: &VulkanCommands) -> FrameResult<()> {
        target.buffer.reset().map_err(rhi_err("reset command buffer"))
    }

    fn begin_recording(&self, target: &VulkanCommands) -> FrameResult<()> {
        target.buffer.begin().map_err(rhi_err("begin command buffer"))
    }

    fn end_recording(&self, target: &VulkanCommands) -> FrameResult<()> {
        target.buffer.end().map_err(rhi_err("end command buffer"))
    }

    fn submit(&self, submission: Submission<'_, Self>) -> FrameResult<()> {
        let commands =
            [vk::CommandBufferSubmitInfo::default().command_buffer(submission.commands.handle())];
        let wait: Vec<vk::SemaphoreSubmitInfo<'_>> = submission
            .wait
            .map(|s| {
                device::semaphore_submit_info(
                    s.handle(),
                    vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                )
            })
            .into_iter()
            .collect();
        let signal: Vec<vk::SemaphoreSubmitInfo<'_>> = submission
            .signal
            .map(|s| device::semaphore_submit_info(s.handle(), vk::PipelineStageFlags2::ALL_GRAPHICS))
            .into_iter()
            .collect();

        let submit = device::submit_info(&commands, &wait, &signal);

        // SAFETY: the scheduler ends recording before submitting and only
        // passes fences it has just reset.
        let result = unsafe {
            self.device
                .submit_graphics(std::slice::from_ref(&submit), submission.fence.handle())
        };
        result.map_err(rhi_err("queue submit"))
    }

    fn wait_idle(&self) -> FrameResult<()> {
        self.device.wait_idle().map_err(rhi_err("device wait idle"))
    }
}

impl Presenter<VulkanBackend> for Swapchain {
    fn acquire_next_target(
        &mut self,
        timeout: Duration,
        signal: &Semaphore,
    ) -> FrameResult<AcquireOutcome> {
        match self.acquire_next_image(timeout, signal.handle()) {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Acquired { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => Ok(AcquireOutcome::Timeout),
            Err(e) => Err(FrameError::from_vk("acquire next image", timeout, e)),
        }
    }

    fn present(&mut self, index: u32, wait_on: &Semaphore) -> FrameResult<PresentOutcome> {
        match Swapchain::present(self, index, wait_on.handle()) {
            Ok(suboptimal) => Ok(PresentOutcome::Presented { suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(vk::Result::ERROR_DEVICE_LOST) => Ok(PresentOutcome::DeviceLost),
            Err(e) => Err(FrameError::from_vk("present", Duration::ZERO, e)),
        }
    }

    fn recreate(&mut self, extent: vk::Extent2D) -> FrameResult<()> {
        debug!("Swapchain recreate requested: {}x{}", extent.width, extent.height);
        Swapchain::recreate(self, extent.width, extent.height).map_err(rhi_err("swapchain recreate"))
    }

    fn extent(&self) -> vk::Extent2D {
        Swapchain::extent(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::FrameScheduler;

    #[test]
    fn test_vulkan_scheduler_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<VulkanBackend>();
        assert_send::<VulkanCommands>();
        assert_send::<FrameScheduler<VulkanBackend, Swapchain>>();
    }
}
