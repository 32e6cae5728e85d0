//! Frame pacing and deferred teardown.
//!
//! A [`FrameScheduler`] cycles a small ring of frame slots so the CPU can
//! record frame `n + 1` while the GPU still executes frame `n`, without
//! ever letting more than `N` frames run ahead. Resources retired during a
//! frame are released through a [`DeletionQueue`] only once the slot's
//! fence proves the GPU is done with them; engine-lifetime resources wait
//! in a [`GlobalDeletionQueue`] until shutdown.
//!
//! The scheduler is generic over a [`GpuBackend`] and a [`Presenter`].
//! [`vulkan`] implements both over `pacer-rhi`.

mod backend;
mod deletion;
mod error;
mod immediate;
mod present;
mod scheduler;
mod slot;

pub mod vulkan;

pub use backend::{FenceStatus, GpuBackend, Submission};
pub use deletion::{DeletionQueue, GlobalDeletionQueue, ReleaseAction};
pub use error::{FrameError, FrameResult};
pub use immediate::ImmediateSubmitChannel;
pub use present::{AcquireOutcome, PresentOutcome, Presenter};
pub use scheduler::{
    ActiveFrame, BeginFrame, FrameScheduler, PresentStatus, ReleaseScope, SchedulerConfig,
};
pub use slot::{FrameRing, FrameSlot, MAX_FRAMES_IN_FLIGHT, SlotState, next_index, previous_index};
