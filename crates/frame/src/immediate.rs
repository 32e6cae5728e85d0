//! Blocking one-off GPU work outside the frame ring.

use std::time::Duration;

use tracing::{debug, error};

use crate::backend::{FenceStatus, GpuBackend, Submission};
use crate::error::{FrameError, FrameResult};

/// A single execution context with its own fence and command target.
///
/// [`run`](Self::run) submits and then waits for the GPU to finish, so it
/// stalls the calling thread. Use it for uploads and initialisation, not
/// for per-frame work.
pub struct ImmediateSubmitChannel<B: GpuBackend> {
    commands: B::CommandTarget,
    fence: B::Fence,
    timeout: Duration,
    submissions: u64,
}

impl<B: GpuBackend> ImmediateSubmitChannel<B> {
    /// Creates the channel. `timeout` bounds the completion wait.
    pub fn new(backend: &B, timeout: Duration) -> FrameResult<Self> {
        let commands = backend.create_command_target()?;
        let fence = backend.create_fence(true)?;
        Ok(Self {
            commands,
            fence,
            timeout,
            submissions: 0,
        })
    }

    /// Records `work`, submits it and blocks until it has executed.
    ///
    /// `&mut self` keeps at most one submission outstanding.
    ///
    /// # Errors
    ///
    /// Any backend failure, or [`FrameError::Timeout`] if the work does not
    /// complete in time. Both are fatal.
    pub fn run<F>(&mut self, backend: &B, work: F) -> FrameResult<()>
    where
        F: FnOnce(&B::CommandTarget),
    {
        backend.reset_fence(&self.fence)?;
        backend.reset_command_target(&self.commands)?;
        backend.begin_recording(&self.commands)?;

        work(&self.commands);

        backend.end_recording(&self.commands)?;
        backend.submit(Submission {
            commands: &self.commands,
            wait: None,
            signal: None,
            fence: &self.fence,
        })?;

        match backend.wait_for_fence(&self.fence, self.timeout)? {
            FenceStatus::Signaled => {
                self.submissions += 1;
                debug!("Immediate submission #{} complete", self.submissions);
                Ok(())
            }
            FenceStatus::TimedOut => {
                error!("Immediate submission did not complete within {:?}", self.timeout);
                Err(FrameError::Timeout {
                    operation: "immediate submit",
                    timeout: self.timeout,
                })
            }
        }
    }

    /// Number of completed runs.
    #[inline]
    pub fn submissions(&self) -> u64 {
        self.submissions
    }
}
