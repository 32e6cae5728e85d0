//! Demo renderer driving the frame scheduler.
//!
//! Each frame clears the acquired swapchain image and uploads a small
//! constants block through a transient staging buffer. The renderer holds
//! no per-frame state of its own: slot handles, fences and deferred
//! releases all live in the [`FrameScheduler`].

use std::mem::size_of;
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use tracing::{debug, info, warn};

use pacer_core::EngineConfig;
use pacer_frame::vulkan::VulkanBackend;
use pacer_frame::{
    BeginFrame, FrameError, FrameResult, FrameScheduler, PresentStatus, ReleaseScope,
    SchedulerConfig,
};
use pacer_platform::{FramebufferSize, Surface, Window};
use pacer_rhi::buffer::{Buffer, BufferUsage};
use pacer_rhi::device::Device;
use pacer_rhi::instance::{Instance, InstanceDesc};
use pacer_rhi::physical_device::select_physical_device;
use pacer_rhi::swapchain::Swapchain;

/// Per-frame constants uploaded to the device-local buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct FrameConstants {
    time: f32,
    frame: u32,
    width: u32,
    height: u32,
}

const CONSTANTS_SIZE: vk::DeviceSize = size_of::<FrameConstants>() as vk::DeviceSize;

/// Seconds per full pulse of the clear colour.
const PULSE_PERIOD: f32 = 2.0;

type Scheduler = FrameScheduler<VulkanBackend, Swapchain>;

/// Owns the Vulkan objects and the scheduler that paces them.
///
/// Field order is drop order: the scheduler (and with it the swapchain)
/// goes first, then the surface, the device and finally the instance.
pub struct Renderer {
    scheduler: Option<Scheduler>,
    /// Owned by a release action in the engine-scoped queue.
    constants_buffer: vk::Buffer,
    needs_recreate: bool,
    _surface: Surface,
    device: Arc<Device>,
    _instance: Instance,
}

/// Frame-loop settings from the `[frames]` config table.
pub fn scheduler_config(config: &EngineConfig) -> SchedulerConfig {
    let frames = &config.frames;
    SchedulerConfig {
        frames_in_flight: frames.frames_in_flight,
        fence_timeout: frames.fence_timeout(),
        acquire_timeout: frames.acquire_timeout(),
    }
}

impl Renderer {
    /// Brings up Vulkan for `window` and zero-fills the constants buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if any step of the initialization chain fails.
    pub fn new(window: &Window, config: &EngineConfig) -> Result<Self> {
        let size = window.size();
        info!("Initializing renderer ({}x{})", size.width, size.height);

        let surface_extensions = window.required_extensions()?;
        let instance = Instance::new(&InstanceDesc {
            application_name: c"Frame Pacer",
            validation: config.vulkan.validation,
            surface_extensions,
        })
        .context("failed to create Vulkan instance")?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())
                .context("failed to select a GPU")?;
        let device = Device::new(&instance, &physical_device)
            .context("failed to create logical device")?;

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            size.width,
            size.height,
        )
        .context("failed to create swapchain")?;
        let image_count = swapchain.image_count();

        let mut scheduler = FrameScheduler::new(
            VulkanBackend::new(device.clone()),
            swapchain,
            scheduler_config(config),
        )?;

        let constants = Buffer::new(device.clone(), BufferUsage::DeviceLocal, CONSTANTS_SIZE)
            .context("failed to create constants buffer")?;
        let constants_buffer = constants.handle();
        // Registered before use: if the fill fails, teardown still frees the
        // buffer only after the device is idle.
        scheduler.register_deferred_release(ReleaseScope::Engine, move || drop(constants));
        scheduler.run_immediate(|commands| {
            let cmd = commands.buffer();
            cmd.fill_buffer(constants_buffer, 0);
            cmd.buffer_transfer_barrier(constants_buffer);
        })?;

        info!(
            "Renderer initialized on {}: {} swapchain images, {} frames in flight",
            physical_device.device_name(),
            image_count,
            scheduler.frames_in_flight()
        );

        Ok(Self {
            scheduler: Some(scheduler),
            constants_buffer,
            needs_recreate: false,
            _surface: surface,
            device,
            _instance: instance,
        })
    }

    /// Marks the swapchain for recreation before the next frame.
    pub fn request_recreate(&mut self) {
        self.needs_recreate = true;
    }

    /// Records, submits and presents one frame.
    ///
    /// `elapsed` drives the clear-colour animation and `size` is the
    /// current framebuffer size, used if the swapchain has to be rebuilt.
    ///
    /// # Errors
    ///
    /// Returns the scheduler's error. Anything but
    /// [`FrameError::OutOfDate`] is fatal.
    pub fn render_frame(&mut self, elapsed: f32, size: FramebufferSize) -> FrameResult<()> {
        let Some(scheduler) = self.scheduler.as_mut() else {
            return Ok(());
        };

        if self.needs_recreate {
            recreate(scheduler, size)?;
            self.needs_recreate = false;
        }

        let frame = match scheduler.begin_frame()? {
            BeginFrame::Ready(frame) => frame,
            BeginFrame::OutOfDate => {
                debug!("Swapchain out of date on acquire");
                return recreate(scheduler, size);
            }
        };

        let image = scheduler
            .presenter()
            .image(frame.image_index())
            .ok_or_else(|| {
                FrameError::InvalidState(format!(
                    "acquired image {} out of range",
                    frame.image_index()
                ))
            })?;
        let extent = frame.extent();
        if frame.is_suboptimal() {
            debug!("Frame {} acquired a suboptimal image", frame.frame_number());
            self.needs_recreate = true;
        }

        let constants = FrameConstants {
            time: elapsed,
            frame: frame.frame_number() as u32,
            width: extent.width,
            height: extent.height,
        };
        let staging = Buffer::staging_with_data(self.device.clone(), bytemuck::bytes_of(&constants))
            .map_err(|e| FrameError::from_rhi("frame constants upload", e))?;

        let cmd = scheduler.recording_target(&frame).buffer();
        cmd.copy_buffer(staging.handle(), self.constants_buffer, CONSTANTS_SIZE);
        cmd.buffer_transfer_barrier(self.constants_buffer);

        cmd.transition_image(
            image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        cmd.clear_color_image(
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            clear_color(elapsed),
        );
        cmd.transition_image(
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );

        // The copy reads the staging buffer until this slot's fence signals.
        scheduler.register_deferred_release(ReleaseScope::Frame, move || drop(staging));

        let status = scheduler.submit_frame(frame)?;
        scheduler.advance();

        if status == PresentStatus::NeedsRecreate {
            self.needs_recreate = true;
        }
        Ok(())
    }

    /// Drains the GPU, runs every deferred release and destroys the
    /// scheduler.
    ///
    /// # Errors
    ///
    /// Returns the idle-wait error; pending releases are leaked in that case.
    pub fn shutdown(&mut self) -> FrameResult<()> {
        match self.scheduler.take() {
            Some(scheduler) => scheduler.shutdown(),
            None => Ok(()),
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Renderer shutdown on drop failed: {}", e);
        }
        info!("Renderer destroyed");
    }
}

fn recreate(scheduler: &mut Scheduler, size: FramebufferSize) -> FrameResult<()> {
    if size.is_empty() {
        debug!("Skipping swapchain recreation for an empty framebuffer");
        return Ok(());
    }
    scheduler.recreate_presentation(size.to_extent())
}

/// Dark blue that pulses towards bright blue once per period.
fn clear_color(elapsed: f32) -> [f32; 4] {
    let phase = (elapsed / PULSE_PERIOD) * std::f32::consts::TAU;
    let blue = 0.5 + 0.5 * phase.sin();
    [0.0, 0.0, blue, 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_constants_layout() {
        assert_eq!(CONSTANTS_SIZE, 16);
        assert_eq!(CONSTANTS_SIZE % 4, 0);
    }

    #[test]
    fn test_clear_color_stays_in_range() {
        for step in 0..40 {
            let color = clear_color(step as f32 * 0.1);
            assert!((0.0..=1.0).contains(&color[2]));
            assert_eq!(color[3], 1.0);
        }
    }

    #[test]
    fn test_scheduler_config_from_engine_config() {
        let config = EngineConfig::from_toml_str(
            "[frames]\nframes_in_flight = 3\nfence_timeout_ms = 250\n",
        )
        .unwrap();
        let scheduler = scheduler_config(&config);
        assert_eq!(scheduler.frames_in_flight, 3);
        assert_eq!(scheduler.fence_timeout, std::time::Duration::from_millis(250));
        assert!(scheduler.validate().is_ok());
    }
}
