//! End-to-end orchestrator scenarios on the simulated backend

use std::sync::Arc;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;

use touchlink::backend::simulated::{FailPoint, SimulatedBackend};
use touchlink::backend::{ConnectedDevices, TrackingState};
use touchlink::core::WatchdogConfig;
use touchlink::events::LogCollector;
use touchlink::foundation::math::{quat_xyzw, Pose, PoseState, Vec3};
use touchlink::prelude::*;
use touchlink::tracking::LifecycleState;
use touchlink::watchdog::{FixedLocator, ScriptedController, ToolEvent};

struct Harness {
    backend: SimulatedBackend,
    tool: ScriptedController,
    log: LogCollector,
    tracking: TrackingOrchestrator,
}

fn harness_with(backend: SimulatedBackend, config: TouchLinkConfig) -> Harness {
    let tool = ScriptedController::new();
    let tracking = TrackingOrchestrator::with_tool(
        config,
        Box::new(backend.clone()),
        Arc::new(tool.clone()),
        Box::new(FixedLocator::new("odt")),
    );
    let log = LogCollector::new();
    log.attach(tracking.log_channel());
    Harness {
        backend,
        tool,
        log,
        tracking,
    }
}

fn harness() -> Harness {
    let config = TouchLinkConfig {
        watchdog: WatchdogConfig::fast(),
        ..TouchLinkConfig::default()
    };
    harness_with(SimulatedBackend::new(), config)
}

fn oriented(position: Vec3, x: f32, y: f32, z: f32, w: f32) -> PoseState {
    PoseState::at_rest(Pose::new(position, quat_xyzw(x, y, z, w)))
}

#[test]
fn reinitialize_tears_down_the_previous_session_first() {
    let mut h = harness();
    assert_eq!(h.tracking.initialize(), STATUS_SUCCESS);
    assert_eq!(h.tracking.initialize(), STATUS_SUCCESS);

    let journal = h.backend.journal();
    let destroy = journal.iter().position(|call| *call == "destroy_session");
    let second_create = journal
        .iter()
        .enumerate()
        .filter(|(_, call)| **call == "create_session")
        .map(|(index, _)| index)
        .nth(1);

    assert!(destroy.is_some());
    assert!(destroy < second_create);
    assert_eq!(h.backend.state().sessions_created, 2);
    assert!(h.log.contains("Handler already initialized"));
}

#[test]
fn status_codes_follow_the_lifecycle() {
    let mut h = harness();
    assert_eq!(h.tracking.status_result(), STATUS_NOT_STARTED);
    assert!(h.tracking.status().describe().contains("E_NOT_STARTED"));

    h.tracking.initialize();
    assert_eq!(h.tracking.status_result(), 0);
    assert!(h.tracking.status().describe().contains("I_OK"));
    assert_eq!(h.tracking.lifecycle(), LifecycleState::Running);

    h.tracking.shutdown();
    assert_eq!(h.tracking.lifecycle(), LifecycleState::NotStarted);
    assert!(!h.tracking.is_initialized());
}

#[test]
fn failed_initialize_reports_init_failed() {
    let backend = SimulatedBackend::new();
    backend.fail(FailPoint::CreateSwapChain);
    let mut h = harness_with(backend, TouchLinkConfig::default());

    assert_eq!(h.tracking.initialize(), STATUS_INIT_FAILED);
    assert_eq!(STATUS_INIT_FAILED, 0x0001_0001);
    assert!(h.tracking.status().describe().contains("E_INIT_FAILED"));
    assert_eq!(h.log.with_severity(Severity::Error).len(), 1);

    // Whatever was acquired before the failure is released on shutdown
    h.backend.clear_faults();
    assert_eq!(h.tracking.shutdown(), STATUS_SUCCESS);
    assert_eq!(h.backend.live_swap_chains(), 0);
    assert_eq!(h.backend.live_depth_targets(), 0);
    assert!(!h.backend.state().device_alive);
}

#[test]
fn update_is_a_no_op_unless_running() {
    let mut h = harness();
    h.tracking.update();
    assert!(h.backend.journal().is_empty());
    assert_eq!(h.tracking.frame_count(), 0);

    h.backend.fail(FailPoint::RuntimeInit);
    h.tracking.initialize();
    h.backend.clear_journal();
    h.tracking.update();
    assert!(h.backend.journal().is_empty());
}

#[test]
fn headset_pose_is_copied_verbatim() {
    let mut h = harness();
    h.tracking.initialize();
    h.backend.set_tracking_state(TrackingState {
        head_pose: oriented(Vec3::new(1.0, 2.0, 3.0), 0.0, 0.0, 0.0, 1.0),
        ..TrackingState::default()
    });

    h.tracking.update();

    let headset = h.tracking.joint(JointId::Headset).map(|joint| joint.state);
    let headset = headset.unwrap_or_default();
    assert_relative_eq!(headset.pose.position, Vec3::new(1.0, 2.0, 3.0));
    assert_relative_eq!(headset.pose.orientation.w, 1.0);
    assert_relative_eq!(headset.linear_velocity, Vec3::zeros());
    assert_relative_eq!(headset.angular_acceleration, Vec3::zeros());
}

#[test]
fn first_auxiliary_object_overrides_headset_only_with_orientation() {
    let backend = SimulatedBackend::new();
    backend.set_connected(ConnectedDevices::TOUCH | ConnectedDevices::OBJECT0);
    let mut h = harness_with(backend, TouchLinkConfig::default());
    h.tracking.initialize();

    h.backend.set_tracking_state(TrackingState {
        head_pose: oriented(Vec3::new(1.0, 2.0, 3.0), 0.0, 0.0, 0.0, 1.0),
        ..TrackingState::default()
    });

    // Blank orientation: the headset keeps its own pose
    h.backend
        .set_object_pose(0, oriented(Vec3::new(9.0, 9.0, 9.0), 0.0, 0.0, 0.0, 1.0));
    h.tracking.update();
    let joints = h.tracking.tracked_joints();
    assert_relative_eq!(joints[2].position().x, 1.0);

    // Oriented object wins the slot
    h.backend
        .set_object_pose(0, oriented(Vec3::new(9.0, 8.0, 7.0), 0.0, 0.5, 0.2, 0.8));
    h.tracking.update();
    let joints = h.tracking.tracked_joints();
    assert_eq!(joints.len(), 3);
    assert_eq!(joints[2].name, "Oculus VR Headset");
    assert_relative_eq!(joints[2].position(), Vec3::new(9.0, 8.0, 7.0));
    assert_relative_eq!(joints[2].orientation().j, 0.5);
}

#[test]
fn orientation_with_one_zero_axis_still_counts_as_a_fix() {
    let backend = SimulatedBackend::new();
    backend.set_connected(ConnectedDevices::TOUCH | ConnectedDevices::OBJECT0);
    let mut h = harness_with(backend, TouchLinkConfig::default());
    h.tracking.initialize();

    h.backend
        .set_object_pose(0, oriented(Vec3::new(9.0, 0.0, 0.0), 0.1, 0.0, 0.2, 0.97));
    h.tracking.update();

    let joints = h.tracking.tracked_joints();
    assert_relative_eq!(joints[2].position().x, 9.0);
    assert_relative_eq!(joints[2].orientation().i, 0.1);
}

#[test]
fn further_auxiliary_objects_get_their_own_joints() {
    let backend = SimulatedBackend::new();
    backend.set_connected(
        ConnectedDevices::TOUCH | ConnectedDevices::OBJECT1 | ConnectedDevices::OBJECT3,
    );
    let mut h = harness_with(backend, TouchLinkConfig::default());
    h.tracking.initialize();

    let pose = oriented(Vec3::new(0.5, 0.5, 0.5), 0.0, 0.5, 0.2, 0.8);
    h.backend.set_object_pose(1, pose);
    h.backend.set_object_pose(3, pose);
    h.tracking.update();

    let names: Vec<String> = h
        .tracking
        .tracked_joints()
        .into_iter()
        .map(|joint| joint.name)
        .collect();
    assert_eq!(
        names,
        vec![
            "Left Touch Controller",
            "Right Touch Controller",
            "Oculus VR Headset",
            "VR Object 4",
        ]
    );
}

#[test]
fn frames_are_submitted_with_increasing_indices() {
    let mut h = harness();
    h.tracking.initialize();
    for _ in 0..3 {
        h.tracking.update();
    }

    assert_eq!(h.backend.state().submitted_frames, vec![0, 1, 2]);
    assert_eq!(h.backend.call_count("commit_swap_chain"), 6);
    assert_eq!(h.tracking.frame_count(), 3);
}

#[test]
fn submit_failure_is_logged_and_frames_continue() {
    let mut h = harness();
    h.tracking.initialize();
    h.backend.fail(FailPoint::SubmitFrame);
    h.tracking.update();
    h.backend.clear_faults();
    h.tracking.update();

    assert!(h.log.contains("Frame 0 submission failed"));
    assert_eq!(h.backend.state().submitted_frames, vec![0, 1]);
}

#[test]
fn keep_alive_runs_and_stops_through_updates() {
    let mut h = harness();
    h.tracking.set_reduce_res(true);
    h.tracking.initialize();
    h.tracking.set_keep_alive(true);

    let deadline = Instant::now() + Duration::from_secs(5);
    while h.tracking.watchdog_state() != WatchdogState::Running && Instant::now() < deadline {
        h.tracking.update();
    }
    assert_eq!(h.tracking.watchdog_state(), WatchdogState::Running);

    h.tracking.set_keep_alive(false);
    h.tracking.update();
    assert_eq!(h.tracking.watchdog_state(), WatchdogState::Stopped);

    let events = h.tool.events();
    let position = |wanted: &ToolEvent| events.iter().rposition(|event| event == wanted);
    assert!(position(&ToolEvent::LowOverhead("odt".into())).is_some());
    let restored = position(&ToolEvent::Restored("odt".into()));
    assert!(restored.is_some());
    assert!(restored < position(&ToolEvent::Closed));
}

#[test]
fn shutdown_stops_a_running_watchdog() {
    let mut h = harness();
    h.tracking.initialize();
    h.tracking.set_keep_alive(true);
    h.tracking.update();

    assert_eq!(h.tracking.shutdown(), STATUS_SUCCESS);
    assert_eq!(h.tracking.watchdog_state(), WatchdogState::Stopped);
    assert!(!h.backend.state().runtime_initialized);
}

#[test]
fn shutdown_twice_is_harmless() {
    let mut h = harness();
    h.tracking.initialize();
    assert_eq!(h.tracking.shutdown(), STATUS_SUCCESS);
    h.backend.clear_journal();
    assert_eq!(h.tracking.shutdown(), STATUS_SUCCESS);
    assert!(h.backend.journal().is_empty());
}

#[test]
fn panic_during_teardown_is_reported() {
    let mut h = harness();
    h.tracking.initialize();
    h.backend.panic_at(FailPoint::DestroySession);

    assert_eq!(h.tracking.shutdown(), SHUTDOWN_FAILED);
    assert_eq!(h.tracking.status_result(), STATUS_INIT_FAILED);
    assert!(h.log.contains("VR shutdown failure!"));
    assert!(h.log.contains("simulated fault in destroy_session"));

    // Nothing is retried on a later call
    h.backend.clear_faults();
    h.backend.clear_journal();
    assert_eq!(h.tracking.shutdown(), STATUS_SUCCESS);
    assert!(h.backend.journal().is_empty());
}

#[test]
fn drop_releases_the_session() {
    let h = harness();
    let Harness {
        backend,
        mut tracking,
        ..
    } = h;
    tracking.initialize();
    drop(tracking);

    assert!(!backend.state().session_open);
    assert!(!backend.state().runtime_initialized);
    assert_eq!(backend.live_render_targets(), 0);
}
