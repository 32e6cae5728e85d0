//! Simulated GPU and presenter shared by the integration tests.
//!
//! The simulated queue never makes progress on its own: submitted work only
//! retires when a fence is waited on (or the device is idled), in FIFO
//! order, exactly like a GPU that is infinitely slow until the host blocks.
//! That makes "how many frames are in flight" fully deterministic.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ash::vk;
use pacer_frame::{
    AcquireOutcome, ActiveFrame, BeginFrame, FenceStatus, FrameError, FrameResult, FrameScheduler,
    GpuBackend, PresentOutcome, PresentStatus, Presenter, SchedulerConfig, Submission,
};

/// Ordered log of GPU-side events, drops and test release actions.
pub type EventLog = Arc<Mutex<Vec<String>>>;

pub fn push_event(log: &EventLog, event: impl Into<String>) {
    log.lock().unwrap().push(event.into());
}

pub fn events(log: &EventLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

type Work = Box<dyn FnOnce()>;

struct PendingSubmission {
    fence: u64,
    target: u64,
    work: Vec<Work>,
}

#[derive(Default)]
struct SimState {
    next_id: u64,
    signaled: HashMap<u64, bool>,
    pending: VecDeque<PendingSubmission>,
    hung: bool,
    idle_fails: bool,
    submissions: u64,
    max_pending: usize,
}

#[derive(Clone)]
pub struct SimGpu {
    state: Rc<RefCell<SimState>>,
    events: EventLog,
}

impl SimGpu {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState::default())),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn events(&self) -> EventLog {
        self.events.clone()
    }

    /// Stops all further progress: fences never signal again.
    pub fn hang(&self) {
        self.state.borrow_mut().hung = true;
    }

    /// Lets a hung device make progress again.
    pub fn resume(&self) {
        self.state.borrow_mut().hung = false;
    }

    /// Makes every later `wait_idle` report a lost device.
    pub fn fail_idle_wait(&self) {
        self.state.borrow_mut().idle_fails = true;
    }

    pub fn submissions(&self) -> u64 {
        self.state.borrow().submissions
    }

    /// Submissions that have not retired yet.
    pub fn pending(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn max_pending(&self) -> usize {
        self.state.borrow().max_pending
    }

    fn allocate_id(&self) -> u64 {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        state.next_id
    }

    /// Retires submissions in order until the one signalling `fence` is done.
    fn retire_through(&self, fence: u64) {
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                if state.hung || !state.pending.iter().any(|p| p.fence == fence) {
                    return;
                }
                state.pending.pop_front()
            };
            let Some(submission) = next else { return };
            let retired = submission.fence;
            self.retire(submission);
            if retired == fence {
                return;
            }
        }
    }

    fn retire_all(&self) {
        loop {
            let next = self.state.borrow_mut().pending.pop_front();
            match next {
                Some(submission) => self.retire(submission),
                None => return,
            }
        }
    }

    fn retire(&self, submission: PendingSubmission) {
        // Run outside the borrow: work may inspect the GPU.
        for work in submission.work {
            work();
        }
        self.state
            .borrow_mut()
            .signaled
            .insert(submission.fence, true);
    }

    fn is_pending_fence(&self, fence: u64) -> bool {
        self.state.borrow().pending.iter().any(|p| p.fence == fence)
    }

    fn is_pending_target(&self, target: u64) -> bool {
        self.state.borrow().pending.iter().any(|p| p.target == target)
    }
}

pub struct SimFence {
    id: u64,
    events: EventLog,
}

impl Drop for SimFence {
    fn drop(&mut self) {
        push_event(&self.events, format!("fence {}", self.id));
    }
}

pub struct SimSemaphore {
    id: u64,
    events: EventLog,
}

impl Drop for SimSemaphore {
    fn drop(&mut self) {
        push_event(&self.events, format!("semaphore {}", self.id));
    }
}

/// Command target whose "commands" are closures run when the work retires.
pub struct SimCommands {
    id: u64,
    recording: Cell<bool>,
    recorded: RefCell<Vec<Work>>,
    events: EventLog,
}

impl SimCommands {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Records a command whose effect becomes visible when the GPU retires
    /// this submission.
    pub fn record(&self, command: impl FnOnce() + 'static) {
        assert!(self.recording.get(), "recorded outside begin/end");
        self.recorded.borrow_mut().push(Box::new(command));
    }
}

impl Drop for SimCommands {
    fn drop(&mut self) {
        push_event(&self.events, format!("commands {}", self.id));
    }
}

impl GpuBackend for SimGpu {
    type CommandTarget = SimCommands;
    type Fence = SimFence;
    type Semaphore = SimSemaphore;

    fn create_fence(&self, signaled: bool) -> FrameResult<SimFence> {
        let id = self.allocate_id();
        self.state.borrow_mut().signaled.insert(id, signaled);
        Ok(SimFence {
            id,
            events: self.events.clone(),
        })
    }

    fn create_semaphore(&self) -> FrameResult<SimSemaphore> {
        Ok(SimSemaphore {
            id: self.allocate_id(),
            events: self.events.clone(),
        })
    }

    fn create_command_target(&self) -> FrameResult<SimCommands> {
        Ok(SimCommands {
            id: self.allocate_id(),
            recording: Cell::new(false),
            recorded: RefCell::new(Vec::new()),
            events: self.events.clone(),
        })
    }

    fn wait_for_fence(&self, fence: &SimFence, _timeout: Duration) -> FrameResult<FenceStatus> {
        self.retire_through(fence.id);
        let signaled = self
            .state
            .borrow()
            .signaled
            .get(&fence.id)
            .copied()
            .unwrap_or(false);
        Ok(if signaled {
            FenceStatus::Signaled
        } else {
            FenceStatus::TimedOut
        })
    }

    fn reset_fence(&self, fence: &SimFence) -> FrameResult<()> {
        if self.is_pending_fence(fence.id) {
            return Err(FrameError::InvalidState(format!(
                "fence {} reset while pending",
                fence.id
            )));
        }
        self.state.borrow_mut().signaled.insert(fence.id, false);
        Ok(())
    }

    fn reset_command_target(&self, target: &SimCommands) -> FrameResult<()> {
        if self.is_pending_target(target.id) {
            return Err(FrameError::InvalidState(format!(
                "commands {} reset while pending",
                target.id
            )));
        }
        target.recorded.borrow_mut().clear();
        Ok(())
    }

    fn begin_recording(&self, target: &SimCommands) -> FrameResult<()> {
        if target.recording.replace(true) {
            return Err(FrameError::InvalidState("begin while recording".into()));
        }
        Ok(())
    }

    fn end_recording(&self, target: &SimCommands) -> FrameResult<()> {
        if !target.recording.replace(false) {
            return Err(FrameError::InvalidState("end while not recording".into()));
        }
        Ok(())
    }

    fn submit(&self, submission: Submission<'_, Self>) -> FrameResult<()> {
        let fence = submission.fence.id;
        let target = submission.commands.id;

        if submission.commands.recording.get() {
            return Err(FrameError::InvalidState("submit while recording".into()));
        }
        if self.state.borrow().signaled.get(&fence).copied().unwrap_or(false) {
            return Err(FrameError::InvalidState(format!(
                "fence {} submitted while signaled",
                fence
            )));
        }

        let work = std::mem::take(&mut *submission.commands.recorded.borrow_mut());
        let mut state = self.state.borrow_mut();
        state.pending.push_back(PendingSubmission {
            fence,
            target,
            work,
        });
        state.submissions += 1;
        state.max_pending = state.max_pending.max(state.pending.len());
        Ok(())
    }

    fn wait_idle(&self) -> FrameResult<()> {
        push_event(&self.events, "wait idle");
        let (fails, hung) = {
            let state = self.state.borrow();
            (state.idle_fails, state.hung)
        };
        if fails {
            return Err(FrameError::DeviceLost {
                operation: "device wait idle",
            });
        }
        if hung {
            return Err(FrameError::Timeout {
                operation: "device wait idle",
                timeout: Duration::ZERO,
            });
        }
        self.retire_all();
        Ok(())
    }
}

/// Presenter with a fixed number of images handed out round-robin.
pub struct SimPresenter {
    extent: vk::Extent2D,
    image_count: u32,
    next_image: u32,
    out_of_date: bool,
    suboptimal: bool,
    stalled: bool,
    present_script: VecDeque<PresentOutcome>,
    acquires: u32,
    presents: u32,
    recreations: u32,
    events: EventLog,
}

impl SimPresenter {
    pub fn new(gpu: &SimGpu, extent: vk::Extent2D) -> Self {
        Self {
            extent,
            image_count: 3,
            next_image: 0,
            out_of_date: false,
            suboptimal: false,
            stalled: false,
            present_script: VecDeque::new(),
            acquires: 0,
            presents: 0,
            recreations: 0,
            events: gpu.events(),
        }
    }

    /// Acquire reports out-of-date until the next `recreate`.
    pub fn invalidate(&mut self) {
        self.out_of_date = true;
    }

    /// Acquired images are flagged suboptimal until the next `recreate`.
    pub fn degrade(&mut self) {
        self.suboptimal = true;
    }

    /// Acquire never yields an image again.
    pub fn stall(&mut self) {
        self.stalled = true;
    }

    /// Queues the outcome of an upcoming present.
    pub fn script_present(&mut self, outcome: PresentOutcome) {
        self.present_script.push_back(outcome);
    }

    pub fn acquires(&self) -> u32 {
        self.acquires
    }

    pub fn presents(&self) -> u32 {
        self.presents
    }

    pub fn recreations(&self) -> u32 {
        self.recreations
    }
}

impl Presenter<SimGpu> for SimPresenter {
    fn acquire_next_target(
        &mut self,
        _timeout: Duration,
        _signal: &SimSemaphore,
    ) -> FrameResult<AcquireOutcome> {
        if self.stalled {
            return Ok(AcquireOutcome::Timeout);
        }
        if self.out_of_date {
            return Ok(AcquireOutcome::OutOfDate);
        }
        let index = self.next_image;
        self.next_image = (self.next_image + 1) % self.image_count;
        self.acquires += 1;
        Ok(AcquireOutcome::Acquired {
            index,
            suboptimal: self.suboptimal,
        })
    }

    fn present(&mut self, _index: u32, _wait_on: &SimSemaphore) -> FrameResult<PresentOutcome> {
        self.presents += 1;
        Ok(self
            .present_script
            .pop_front()
            .unwrap_or(PresentOutcome::Presented { suboptimal: false }))
    }

    fn recreate(&mut self, extent: vk::Extent2D) -> FrameResult<()> {
        self.extent = extent;
        self.out_of_date = false;
        self.suboptimal = false;
        self.next_image = 0;
        self.recreations += 1;
        Ok(())
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for SimPresenter {
    fn drop(&mut self) {
        push_event(&self.events, "presenter");
    }
}

pub type SimScheduler = FrameScheduler<SimGpu, SimPresenter>;

pub const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 640,
    height: 480,
};

/// Scheduler over a fresh simulated GPU with `frames_in_flight` slots.
pub fn scheduler(frames_in_flight: usize) -> (SimGpu, SimScheduler) {
    let gpu = SimGpu::new();
    let presenter = SimPresenter::new(&gpu, EXTENT);
    let config = SchedulerConfig {
        frames_in_flight,
        ..Default::default()
    };
    let scheduler = FrameScheduler::new(gpu.clone(), presenter, config).unwrap();
    (gpu, scheduler)
}

pub fn begin(scheduler: &mut SimScheduler) -> ActiveFrame {
    match scheduler.begin_frame().unwrap() {
        BeginFrame::Ready(frame) => frame,
        BeginFrame::OutOfDate => panic!("unexpected out-of-date acquire"),
    }
}

/// Runs one full begin / submit / advance cycle and returns the present
/// status.
pub fn present_frame(scheduler: &mut SimScheduler) -> PresentStatus {
    let frame = begin(scheduler);
    let status = scheduler.submit_frame(frame).unwrap();
    scheduler.advance();
    status
}

/// Like [`present_frame`], for callers that do not care about the status.
pub fn run_frame(scheduler: &mut SimScheduler) {
    let _ = present_frame(scheduler);
}

/// Release action that appends `label` to `log` when it runs.
pub fn log_release(log: &EventLog, label: &str) -> impl FnOnce() + Send + 'static {
    let log = log.clone();
    let label = label.to_string();
    move || push_event(&log, label)
}
