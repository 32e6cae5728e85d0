//! Frame slots and the ring that cycles through them.

use tracing::debug;

use crate::backend::GpuBackend;
use crate::deletion::DeletionQueue;
use crate::error::{FrameError, FrameResult};

/// Largest supported ring. More slots only add input latency.
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Where a slot is in its cycle.
///
/// `Idle -> Recording -> Submitted -> Idle`, where the last step happens
/// only once the slot's fence has been observed signaled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    Idle,
    Recording,
    Submitted,
}

/// One reusable per-frame execution context.
///
/// Its handles are created once and live as long as the ring. Only the
/// recorded commands and the queued releases change between occupancies.
pub struct FrameSlot<B: GpuBackend> {
    commands: B::CommandTarget,
    image_acquired: B::Semaphore,
    render_complete: B::Semaphore,
    frame_done: B::Fence,
    deletion_queue: DeletionQueue,
    state: SlotState,
    last_frame: Option<u64>,
}

impl<B: GpuBackend> FrameSlot<B> {
    /// Creates the slot's handles. The fence starts signaled so the first
    /// occupancy does not wait.
    pub fn new(backend: &B) -> FrameResult<Self> {
        let commands = backend.create_command_target()?;
        let image_acquired = backend.create_semaphore()?;
        let render_complete = backend.create_semaphore()?;
        let frame_done = backend.create_fence(true)?;

        Ok(Self {
            commands,
            image_acquired,
            render_complete,
            frame_done,
            deletion_queue: DeletionQueue::new(),
            state: SlotState::Idle,
            last_frame: None,
        })
    }

    #[inline]
    pub fn commands(&self) -> &B::CommandTarget {
        &self.commands
    }

    #[inline]
    pub fn image_acquired(&self) -> &B::Semaphore {
        &self.image_acquired
    }

    #[inline]
    pub fn render_complete(&self) -> &B::Semaphore {
        &self.render_complete
    }

    #[inline]
    pub fn frame_done(&self) -> &B::Fence {
        &self.frame_done
    }

    #[inline]
    pub fn state(&self) -> SlotState {
        self.state
    }

    /// Frame number of the most recent occupancy, if any.
    #[inline]
    pub fn last_frame(&self) -> Option<u64> {
        self.last_frame
    }

    #[inline]
    pub fn pending_releases(&self) -> usize {
        self.deletion_queue.len()
    }

    pub(crate) fn deletion_queue_mut(&mut self) -> &mut DeletionQueue {
        &mut self.deletion_queue
    }

    pub(crate) fn mark_idle(&mut self) {
        self.state = SlotState::Idle;
    }

    pub(crate) fn mark_recording(&mut self, frame_number: u64) {
        self.state = SlotState::Recording;
        self.last_frame = Some(frame_number);
    }

    pub(crate) fn mark_submitted(&mut self) {
        self.state = SlotState::Submitted;
    }
}

/// Fixed ring of `N` frame slots selected round-robin by a frame counter.
pub struct FrameRing<B: GpuBackend> {
    slots: Vec<FrameSlot<B>>,
    counter: u64,
}

impl<B: GpuBackend> FrameRing<B> {
    /// Creates `frames_in_flight` slots.
    ///
    /// # Errors
    ///
    /// Returns [`FrameError::InvalidState`] if the count is outside
    /// `1..=MAX_FRAMES_IN_FLIGHT`, or any backend error from slot creation.
    pub fn new(backend: &B, frames_in_flight: usize) -> FrameResult<Self> {
        if frames_in_flight == 0 || frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(FrameError::InvalidState(format!(
                "frames in flight must be in 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT, frames_in_flight
            )));
        }

        let slots = (0..frames_in_flight)
            .map(|_| FrameSlot::new(backend))
            .collect::<FrameResult<Vec<_>>>()?;

        debug!("Frame ring created with {} slot(s)", frames_in_flight);

        Ok(Self { slots, counter: 0 })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Number of frames begun so far; also the counter for the current slot.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.counter
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        (self.counter % self.slots.len() as u64) as usize
    }

    #[inline]
    pub fn next_index(&self, index: usize) -> usize {
        next_index(index, self.slots.len())
    }

    #[inline]
    pub fn previous_index(&self, index: usize) -> usize {
        previous_index(index, self.slots.len())
    }

    pub fn slot(&self, index: usize) -> Option<&FrameSlot<B>> {
        self.slots.get(index)
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> Option<&mut FrameSlot<B>> {
        self.slots.get_mut(index)
    }

    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = &mut FrameSlot<B>> {
        self.slots.iter_mut()
    }

    pub(crate) fn advance(&mut self) {
        self.counter += 1;
    }
}

impl<B: GpuBackend> std::ops::Index<usize> for FrameRing<B> {
    type Output = FrameSlot<B>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.slots[index]
    }
}

/// Index after `index` in a ring of `len` slots.
#[inline]
pub fn next_index(index: usize, len: usize) -> usize {
    (index + 1) % len
}

/// Index before `index` in a ring of `len` slots.
#[inline]
pub fn previous_index(index: usize, len: usize) -> usize {
    (index + len - 1) % len
}
