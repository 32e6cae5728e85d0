mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::{begin, events, log_release, run_frame, scheduler};
use pacer_frame::{FrameError, ReleaseScope};

/// Handle-drop sequence of a two-slot scheduler: each slot's command
/// target, semaphores and fence, then the immediate channel, then the
/// presenter.
const TWO_SLOT_DROPS: [&str; 11] = [
    "commands 1",
    "semaphore 2",
    "semaphore 3",
    "fence 4",
    "commands 5",
    "semaphore 6",
    "semaphore 7",
    "fence 8",
    "commands 9",
    "fence 10",
    "presenter",
];

fn expected_teardown(releases: &[&str]) -> Vec<String> {
    std::iter::once("wait idle")
        .chain(releases.iter().copied())
        .chain(TWO_SLOT_DROPS)
        .map(String::from)
        .collect()
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_shutdown_runs_frame_then_engine_releases_after_idle() {
    let (gpu, mut scheduler) = scheduler(2);
    let log = gpu.events();

    scheduler.register_deferred_release(ReleaseScope::Engine, log_release(&log, "allocator"));
    scheduler.register_deferred_release(ReleaseScope::Engine, log_release(&log, "pipeline"));
    scheduler.register_deferred_release(ReleaseScope::Engine, log_release(&log, "descriptor pool"));

    let frame = begin(&mut scheduler);
    scheduler.register_deferred_release(ReleaseScope::Frame, log_release(&log, "staging"));
    let _ = scheduler.submit_frame(frame).unwrap();
    scheduler.advance();
    assert_eq!(scheduler.pending_global_releases(), 3);

    scheduler.shutdown().unwrap();

    assert_eq!(
        events(&log),
        expected_teardown(&["staging", "descriptor pool", "pipeline", "allocator"])
    );
    assert_eq!(gpu.pending(), 0);
}

#[test]
fn test_frame_release_runs_before_engine_resource_it_was_built_from() {
    let (gpu, mut scheduler) = scheduler(2);
    let log = gpu.events();

    scheduler.register_deferred_release(ReleaseScope::Engine, log_release(&log, "allocator"));
    let frame = begin(&mut scheduler);
    scheduler.register_deferred_release(ReleaseScope::Frame, log_release(&log, "staging"));
    let _ = scheduler.submit_frame(frame).unwrap();
    scheduler.advance();

    scheduler.shutdown().unwrap();

    let releases: Vec<String> = events(&log)
        .into_iter()
        .filter(|e| e == "staging" || e == "allocator")
        .collect();
    assert_eq!(releases, ["staging", "allocator"]);
}

#[test]
fn test_drop_without_shutdown_tears_down_the_same_way() {
    let (gpu, mut scheduler) = scheduler(2);
    let log = gpu.events();

    scheduler.register_deferred_release(ReleaseScope::Engine, log_release(&log, "allocator"));
    run_frame(&mut scheduler);
    drop(scheduler);

    assert_eq!(events(&log), expected_teardown(&["allocator"]));
}

#[test]
fn test_shutdown_with_frames_in_flight_waits_for_them() {
    let (gpu, mut scheduler) = scheduler(2);
    run_frame(&mut scheduler);
    run_frame(&mut scheduler);
    assert_eq!(gpu.pending(), 2);

    scheduler.shutdown().unwrap();
    assert_eq!(gpu.pending(), 0);
}

#[test]
fn test_failed_idle_wait_leaks_pending_releases() {
    let (gpu, mut scheduler) = scheduler(2);
    let log = gpu.events();

    let ran = Arc::new(AtomicBool::new(false));
    let dropped = Arc::new(AtomicBool::new(false));

    let ran_flag = ran.clone();
    let guard = DropFlag(dropped.clone());
    scheduler.register_deferred_release(ReleaseScope::Engine, move || {
        let _guard = guard;
        ran_flag.store(true, Ordering::SeqCst);
    });
    let frame = begin(&mut scheduler);
    scheduler.register_deferred_release(ReleaseScope::Frame, log_release(&log, "staging"));
    let _ = scheduler.submit_frame(frame).unwrap();

    gpu.fail_idle_wait();
    let err = scheduler.shutdown().unwrap_err();

    assert!(matches!(err, FrameError::DeviceLost { .. }));
    assert!(err.is_fatal());
    assert!(!ran.load(Ordering::SeqCst));
    assert!(!dropped.load(Ordering::SeqCst));

    let log = events(&log);
    assert!(!log.iter().any(|e| e == "staging"));
    assert_eq!(log.last().map(String::as_str), Some("presenter"));
}
