//! The begin / record / submit / present cycle.
//!
//! ```text
//! begin_frame()        wait slot fence -> flush slot releases -> acquire
//!                      -> reset fence -> reset + begin commands
//! (caller records into recording_target())
//! submit_frame(frame)  end commands -> submit -> present
//! advance()            next slot
//! ```
//!
//! The fence is reset only after a successful acquire, so an out-of-date
//! swapchain never leaves a slot waiting on a fence nobody will signal.

use std::time::Duration;

use ash::vk;
use tracing::{debug, error, info, warn};

use crate::backend::{FenceStatus, GpuBackend, Submission};
use crate::deletion::GlobalDeletionQueue;
use crate::error::{FrameError, FrameResult};
use crate::immediate::ImmediateSubmitChannel;
use crate::present::{AcquireOutcome, PresentOutcome, Presenter};
use crate::slot::{FrameRing, FrameSlot, MAX_FRAMES_IN_FLIGHT, SlotState};

/// Ring size and the bounds on every blocking GPU wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub frames_in_flight: usize,
    /// Bound on frame and immediate fence waits.
    pub fence_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            fence_timeout: Duration::from_secs(1),
            acquire_timeout: Duration::from_secs(1),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> FrameResult<()> {
        if self.frames_in_flight == 0 || self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(FrameError::InvalidState(format!(
                "frames in flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }
        if self.fence_timeout.is_zero() || self.acquire_timeout.is_zero() {
            return Err(FrameError::InvalidState(
                "fence and acquire timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lifetime a deferred release is tied to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReleaseScope {
    /// Released when the frame that used the resource has retired.
    Frame,
    /// Released at shutdown, after the device is idle.
    Engine,
}

/// Token for a frame between `begin_frame` and `submit_frame`.
///
/// Not `Clone`: a frame is submitted at most once.
#[derive(Debug)]
pub struct ActiveFrame {
    slot: usize,
    image_index: u32,
    extent: vk::Extent2D,
    frame_number: u64,
    suboptimal: bool,
}

impl ActiveFrame {
    #[inline]
    pub fn slot_index(&self) -> usize {
        self.slot
    }

    /// Index of the acquired presentable image.
    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// The presenter accepted the acquire but would like to be recreated.
    #[inline]
    pub fn is_suboptimal(&self) -> bool {
        self.suboptimal
    }
}

/// Result of [`FrameScheduler::begin_frame`].
#[must_use]
#[derive(Debug)]
pub enum BeginFrame {
    Ready(ActiveFrame),
    /// Nothing was acquired; recreate the presenter and try again.
    OutOfDate,
}

/// Result of [`FrameScheduler::submit_frame`].
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    /// The frame was submitted but the presenter should be recreated.
    NeedsRecreate,
}

/// Drives a ring of frame slots against a backend and a presenter.
///
/// Field order is teardown order: slots, then the immediate channel, then
/// the presenter, with the backend last.
pub struct FrameScheduler<B: GpuBackend, P: Presenter<B>> {
    ring: FrameRing<B>,
    immediate: ImmediateSubmitChannel<B>,
    presenter: P,
    global_releases: GlobalDeletionQueue,
    config: SchedulerConfig,
    torn_down: bool,
    backend: B,
}

impl<B: GpuBackend, P: Presenter<B>> FrameScheduler<B, P> {
    /// Creates the ring and the immediate channel.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidState`] for an invalid config, or any
    /// backend error from creating slot handles.
    pub fn new(backend: B, presenter: P, config: SchedulerConfig) -> FrameResult<Self> {
        config.validate()?;

        let ring = FrameRing::new(&backend, config.frames_in_flight)?;
        let immediate = ImmediateSubmitChannel::new(&backend, config.fence_timeout)?;

        info!(
            "Frame scheduler ready: {} frame(s) in flight, fence timeout {:?}",
            config.frames_in_flight, config.fence_timeout
        );

        Ok(Self {
            ring,
            immediate,
            presenter,
            global_releases: GlobalDeletionQueue::new(),
            config,
            torn_down: false,
            backend,
        })
    }

    /// Starts the next frame on the current slot.
    ///
    /// Blocks until the slot's previous submission has retired, runs the
    /// releases queued during that occupancy and acquires a presentable
    /// image.
    ///
    /// # Errors
    ///
    /// - [`FrameError::InvalidState`] if the current slot is still recording.
    /// - [`FrameError::Timeout`] if the fence or the acquire does not complete
    ///   in time.
    /// - Any backend error.
    pub fn begin_frame(&mut self) -> FrameResult<BeginFrame> {
        let index = self.ring.current_index();
        let frame_number = self.ring.frame_number();
        let slot = slot_mut(&mut self.ring, index)?;

        if slot.state() == SlotState::Recording {
            return Err(FrameError::InvalidState(format!(
                "slot {} is already recording frame {:?}",
                index,
                slot.last_frame()
            )));
        }

        let fence_timeout = self.config.fence_timeout;
        match self.backend.wait_for_fence(slot.frame_done(), fence_timeout)? {
            FenceStatus::Signaled => {}
            FenceStatus::TimedOut => {
                error!(
                    "Slot {} fence not signaled after {:?}; assuming a device hang",
                    index, fence_timeout
                );
                return Err(FrameError::Timeout {
                    operation: "frame fence wait",
                    timeout: fence_timeout,
                });
            }
        }

        slot.mark_idle();
        let released = slot.deletion_queue_mut().flush();
        if released > 0 {
            debug!("Slot {}: released {} deferred resource(s)", index, released);
        }

        let acquire_timeout = self.config.acquire_timeout;
        let (image_index, suboptimal) = match self
            .presenter
            .acquire_next_target(acquire_timeout, slot.image_acquired())?
        {
            AcquireOutcome::Acquired { index, suboptimal } => (index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("Acquire reported out-of-date on frame {}", frame_number);
                return Ok(BeginFrame::OutOfDate);
            }
            AcquireOutcome::Timeout => {
                return Err(FrameError::Timeout {
                    operation: "acquire next image",
                    timeout: acquire_timeout,
                });
            }
        };

        self.backend.reset_fence(slot.frame_done())?;
        self.backend.reset_command_target(slot.commands())?;
        self.backend.begin_recording(slot.commands())?;
        slot.mark_recording(frame_number);

        Ok(BeginFrame::Ready(ActiveFrame {
            slot: index,
            image_index,
            extent: self.presenter.extent(),
            frame_number,
            suboptimal,
        }))
    }

    /// Command target to record the frame's work into.
    ///
    /// # Panics
    ///
    /// Panics if `frame` came from a scheduler with a smaller ring.
    pub fn recording_target(&self, frame: &ActiveFrame) -> &B::CommandTarget {
        self.ring[frame.slot].commands()
    }

    /// Semaphore signalled when the frame's image may be written.
    pub fn image_acquired(&self, frame: &ActiveFrame) -> &B::Semaphore {
        self.ring[frame.slot].image_acquired()
    }

    /// Semaphore signalled when the frame's work has finished.
    pub fn render_complete(&self, frame: &ActiveFrame) -> &B::Semaphore {
        self.ring[frame.slot].render_complete()
    }

    /// Ends recording, submits the frame and presents it.
    ///
    /// # Errors
    ///
    /// [`FrameError::InvalidState`] if `frame` does not belong to the
    /// current slot; [`FrameError::DeviceLost`] if presentation reports a
    /// lost device; any submission error.
    pub fn submit_frame(&mut self, frame: ActiveFrame) -> FrameResult<PresentStatus> {
        let index = self.ring.current_index();
        if frame.slot != index || frame.frame_number != self.ring.frame_number() {
            return Err(FrameError::InvalidState(format!(
                "frame {} (slot {}) is not the current frame {} (slot {})",
                frame.frame_number,
                frame.slot,
                self.ring.frame_number(),
                index
            )));
        }

        let slot = slot_mut(&mut self.ring, index)?;
        if slot.state() != SlotState::Recording {
            return Err(FrameError::InvalidState(format!(
                "slot {} is {:?}, expected Recording",
                index,
                slot.state()
            )));
        }

        self.backend.end_recording(slot.commands())?;
        self.backend.submit(Submission {
            commands: slot.commands(),
            wait: Some(slot.image_acquired()),
            signal: Some(slot.render_complete()),
            fence: slot.frame_done(),
        })?;
        slot.mark_submitted();

        let outcome = self
            .presenter
            .present(frame.image_index, slot.render_complete())?;

        match outcome {
            PresentOutcome::Presented { suboptimal } if !suboptimal && !frame.suboptimal => {
                Ok(PresentStatus::Presented)
            }
            PresentOutcome::Presented { .. } | PresentOutcome::OutOfDate => {
                debug!("Frame {} presented; presenter needs recreation", frame.frame_number);
                Ok(PresentStatus::NeedsRecreate)
            }
            PresentOutcome::DeviceLost => Err(FrameError::DeviceLost { operation: "present" }),
        }
    }

    /// Moves to the next slot.
    pub fn advance(&mut self) {
        if self.current_slot_state() == SlotState::Recording {
            warn!(
                "Advancing past slot {} while it is still recording",
                self.ring.current_index()
            );
        }
        self.ring.advance();
    }

    /// Waits for the device to go idle and rebuilds the presenter.
    ///
    /// Slots are left untouched.
    pub fn recreate_presentation(&mut self, extent: vk::Extent2D) -> FrameResult<()> {
        self.backend.wait_idle()?;
        self.presenter.recreate(extent)?;
        info!(
            "Presentation recreated at {}x{}",
            extent.width, extent.height
        );
        Ok(())
    }

    /// Queues `action` to run once its resource is provably unused.
    ///
    /// [`ReleaseScope::Frame`] ties it to the frame currently being
    /// recorded or, between frames, to the most recently submitted one.
    /// [`ReleaseScope::Engine`] defers it to shutdown.
    pub fn register_deferred_release<F>(&mut self, scope: ReleaseScope, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match scope {
            ReleaseScope::Engine => self.global_releases.push(action),
            ReleaseScope::Frame => {
                let target = self.frame_release_slot();
                if let Some(slot) = self.ring.slot_mut(target) {
                    slot.deletion_queue_mut().push(action);
                }
            }
        }
    }

    fn frame_release_slot(&self) -> usize {
        let current = self.ring.current_index();
        let slot = &self.ring[current];
        match slot.state() {
            SlotState::Recording => current,
            // Submitted but not yet advanced past.
            SlotState::Submitted if slot.last_frame() == Some(self.ring.frame_number()) => current,
            // The current slot still holds an older occupancy, or none.
            _ => self.ring.previous_index(current),
        }
    }

    fn current_slot_state(&self) -> SlotState {
        self.slot_state(self.ring.current_index())
            .unwrap_or(SlotState::Idle)
    }

    /// Records and runs one-off work, blocking until the GPU finishes it.
    pub fn run_immediate<F>(&mut self, work: F) -> FrameResult<()>
    where
        F: FnOnce(&B::CommandTarget),
    {
        self.immediate.run(&self.backend, work)
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.ring.frame_number()
    }

    #[inline]
    pub fn current_slot_index(&self) -> usize {
        self.ring.current_index()
    }

    pub fn slot_state(&self, index: usize) -> Option<SlotState> {
        self.ring.slot(index).map(FrameSlot::state)
    }

    /// Releases queued on slot `index`.
    pub fn pending_releases(&self, index: usize) -> Option<usize> {
        self.ring.slot(index).map(FrameSlot::pending_releases)
    }

    pub fn pending_global_releases(&self) -> usize {
        self.global_releases.len()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.presenter.extent()
    }

    #[inline]
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    #[inline]
    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Waits for the device to go idle, runs every outstanding release and
    /// destroys the slots, the immediate channel and the presenter.
    ///
    /// Per-slot releases run before the engine-lifetime ones.
    ///
    /// # Errors
    ///
    /// If the idle wait fails, pending releases are leaked rather than run
    /// and the error is returned.
    pub fn shutdown(mut self) -> FrameResult<()> {
        let result = self.teardown();
        self.torn_down = true;
        result
    }

    fn teardown(&mut self) -> FrameResult<()> {
        match self.backend.wait_idle() {
            Ok(()) => {
                // Frame releases may depend on engine-lifetime resources
                // (a staging buffer on the allocator), so they go first.
                let per_slot: usize = self
                    .ring
                    .slots_mut()
                    .map(|slot| slot.deletion_queue_mut().flush())
                    .sum();
                let global = self.global_releases.flush();
                info!(
                    "Frame scheduler shut down ({} engine and {} frame release(s) run)",
                    global, per_slot
                );
                Ok(())
            }
            Err(e) => {
                let leaked = self.global_releases.leak()
                    + self
                        .ring
                        .slots_mut()
                        .map(|slot| slot.deletion_queue_mut().leak())
                        .sum::<usize>();
                error!(
                    "Device did not go idle at shutdown ({}); leaking {} pending release(s)",
                    e, leaked
                );
                Err(e)
            }
        }
    }
}

impl<B: GpuBackend, P: Presenter<B>> Drop for FrameScheduler<B, P> {
    fn drop(&mut self) {
        if !self.torn_down {
            if let Err(e) = self.teardown() {
                error!("Frame scheduler teardown on drop failed: {}", e);
            }
        }
    }
}

fn slot_mut<B: GpuBackend>(ring: &mut FrameRing<B>, index: usize) -> FrameResult<&mut FrameSlot<B>> {
    let len = ring.len();
    ring.slot_mut(index).ok_or_else(|| {
        FrameError::InvalidState(format!("slot {} out of range for ring of {}", index, len))
    })
}
