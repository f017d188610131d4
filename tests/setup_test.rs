mod common;

use common::{controller, prepare_blocking, running};
use snapcam::backend::{SessionHandle, SimulatedBackend, SimulatedDevice, SimulatedSessionOptions};
use snapcam::types::{DevicePosition, FocusMode, OutputConfig};
use snapcam::{CameraDevice, CameraError, CameraPosition, SessionState, SnapcamConfig};
use std::time::{Duration, Instant};

#[test]
fn test_photo_prepare_starts_on_rear_camera() {
    let (controller, backend, session) =
        running(SimulatedBackend::front_and_rear(), SnapcamConfig::default());

    assert_eq!(controller.state(), SessionState::Running);
    assert_eq!(controller.current_camera_position(), Some(CameraPosition::Rear));
    assert!(session.is_running());

    let inputs = session.inputs();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].device_id(), "rear-wide");
    assert!(matches!(session.output(), Some(OutputConfig::Photo(_))));
    assert_eq!(backend.sessions_created(), 1);
}

#[test]
fn test_rear_autofocus_uses_scoped_lock() {
    let (_controller, backend, _session) =
        running(SimulatedBackend::front_and_rear(), SnapcamConfig::default());

    let rear = backend.device("rear-wide").unwrap();
    assert_eq!(rear.focus_mode(), FocusMode::ContinuousAutoFocus);
    assert_eq!(rear.lock_count(), 1);
    assert_eq!(rear.unlock_count(), 1);
    assert!(!rear.is_locked());

    // Front camera is never reconfigured
    let front = backend.device("front-wide").unwrap();
    assert_eq!(front.lock_count(), 0);
    assert_eq!(front.focus_mode(), FocusMode::Locked);
}

#[test]
fn test_rear_without_continuous_focus_still_unlocks() {
    let backend = SimulatedBackend::new(vec![
        SimulatedDevice::back("rear").with_focus_modes(vec![FocusMode::Locked]),
        SimulatedDevice::front("front"),
    ]);
    let (_controller, backend, _session) = running(backend, SnapcamConfig::default());

    let rear = backend.device("rear").unwrap();
    assert_eq!(rear.focus_mode(), FocusMode::Locked);
    assert_eq!(rear.unlock_count(), 1);
}

#[test]
fn test_frame_stream_prepare_starts_on_front_camera() {
    let (controller, _backend, session) =
        running(SimulatedBackend::front_and_rear(), SnapcamConfig::frame_stream());

    assert_eq!(controller.current_camera_position(), Some(CameraPosition::Front));
    let Some(OutputConfig::FrameStream(stream)) = session.output() else {
        panic!("expected a frame stream output");
    };
    assert!(stream.mirrored);
    assert!(stream.discard_late_frames);
    assert!(stream.orientation.is_some());
}

#[test]
fn test_unsupported_connection_properties_are_skipped() {
    let backend = SimulatedBackend::front_and_rear().with_options(SimulatedSessionOptions {
        supports_mirroring: false,
        supports_orientation: false,
        ..Default::default()
    });
    let (_controller, _backend, session) = running(backend, SnapcamConfig::frame_stream());

    let Some(OutputConfig::FrameStream(stream)) = session.output() else {
        panic!("expected a frame stream output");
    };
    assert!(!stream.mirrored);
    assert_eq!(stream.orientation, None);
}

#[test]
fn test_preferred_camera_override() {
    let mut config = SnapcamConfig::default();
    config.session.preferred_camera = Some(CameraPosition::Front);
    let (controller, _backend, session) = running(SimulatedBackend::front_and_rear(), config);

    assert_eq!(controller.current_camera_position(), Some(CameraPosition::Front));
    assert_eq!(session.inputs()[0].device_id(), "front-wide");
}

#[test]
fn test_falls_back_to_other_camera() {
    let backend = SimulatedBackend::new(vec![SimulatedDevice::front("only-front")]);
    let (controller, _backend, session) = running(backend, SnapcamConfig::default());

    assert_eq!(controller.current_camera_position(), Some(CameraPosition::Front));
    assert_eq!(session.inputs()[0].device_id(), "only-front");
}

#[test]
fn test_last_discovered_device_wins() {
    let backend = SimulatedBackend::new(vec![
        SimulatedDevice::back("rear-a"),
        SimulatedDevice::back("rear-b"),
    ]);
    let (_controller, _backend, session) = running(backend, SnapcamConfig::default());
    assert_eq!(session.inputs()[0].device_id(), "rear-b");
}

#[test]
fn test_empty_discovery_fails() {
    let (controller, _backend) =
        controller(SimulatedBackend::new(vec![]), SnapcamConfig::default());
    assert_eq!(prepare_blocking(&controller), Err(CameraError::NoCamerasAvailable));
    assert_eq!(controller.state(), SessionState::SessionCreated);
}

#[test]
fn test_only_unspecified_devices_fail_at_input() {
    let backend =
        SimulatedBackend::new(vec![SimulatedDevice::new("usb", DevicePosition::Unspecified)]);
    let (controller, _backend) = controller(backend, SnapcamConfig::default());
    assert_eq!(prepare_blocking(&controller), Err(CameraError::NoCamerasAvailable));
    assert_eq!(controller.state(), SessionState::DevicesDiscovered);
}

#[test]
fn test_refused_lock_fails_discovery() {
    let backend = SimulatedBackend::new(vec![
        SimulatedDevice::back("busy").refusing_lock(),
        SimulatedDevice::front("front"),
    ]);
    let (controller, backend) = controller(backend, SnapcamConfig::default());

    let result = prepare_blocking(&controller);
    assert!(matches!(result, Err(CameraError::Backend(_))));
    assert_eq!(controller.state(), SessionState::SessionCreated);
    assert!(!backend.device("busy").unwrap().is_locked());
}

#[test]
fn test_failed_focus_still_releases_lock() {
    let backend = SimulatedBackend::new(vec![
        SimulatedDevice::back("stuck").failing_focus(),
        SimulatedDevice::front("front"),
    ]);
    let (controller, backend) = controller(backend, SnapcamConfig::default());

    let result = prepare_blocking(&controller);
    assert!(matches!(result, Err(CameraError::Backend(_))));
    assert_eq!(controller.state(), SessionState::SessionCreated);

    let stuck = backend.device("stuck").unwrap();
    assert_eq!(stuck.lock_count(), 1);
    assert_eq!(stuck.unlock_count(), 1);
    assert!(!stuck.is_locked());
    assert_eq!(stuck.focus_mode(), FocusMode::Locked);
}

#[test]
fn test_session_creation_failure() {
    let backend = SimulatedBackend::front_and_rear().with_options(SimulatedSessionOptions {
        fail_session_creation: true,
        ..Default::default()
    });
    let (controller, _backend) = controller(backend, SnapcamConfig::default());
    assert!(matches!(prepare_blocking(&controller), Err(CameraError::Backend(_))));
    assert_eq!(controller.state(), SessionState::Uninitialized);
}

#[test]
fn test_rejected_input_fails_setup() {
    let backend = SimulatedBackend::front_and_rear().with_options(SimulatedSessionOptions {
        rejected_devices: vec!["rear-wide".to_string()],
        ..Default::default()
    });
    let (controller, backend) = controller(backend, SnapcamConfig::default());

    assert_eq!(prepare_blocking(&controller), Err(CameraError::InputsAreInvalid));
    assert_eq!(controller.state(), SessionState::DevicesDiscovered);
    assert!(!backend.last_session().unwrap().is_running());
}

#[test]
fn test_refused_output_still_runs() {
    let backend = SimulatedBackend::front_and_rear().with_options(SimulatedSessionOptions {
        accept_outputs: false,
        ..Default::default()
    });
    let (controller, _backend, session) = running(backend, SnapcamConfig::default());

    assert_eq!(controller.state(), SessionState::Running);
    assert!(session.output().is_none());
}

#[test]
fn test_second_prepare_is_rejected() {
    let (controller, backend, _session) =
        running(SimulatedBackend::front_and_rear(), SnapcamConfig::default());

    assert_eq!(
        prepare_blocking(&controller),
        Err(CameraError::CaptureSessionAlreadyRunning)
    );
    assert_eq!(backend.sessions_created(), 1);
}

#[test]
fn test_prepare_again_after_teardown() {
    let (controller, backend, first) =
        running(SimulatedBackend::front_and_rear(), SnapcamConfig::default());

    controller.teardown();
    assert_eq!(controller.state(), SessionState::Uninitialized);
    assert_eq!(controller.current_camera_position(), None);
    assert!(!first.is_running());

    prepare_blocking(&controller).unwrap();
    assert_eq!(backend.sessions_created(), 2);
    assert!(backend.last_session().unwrap().is_running());
}

#[tokio::test]
async fn test_prepare_async() {
    let (controller, _backend) =
        controller(SimulatedBackend::front_and_rear(), SnapcamConfig::default());
    controller.prepare_async().await.unwrap();
    assert_eq!(controller.stats().state, SessionState::Running);
}

#[test]
fn test_dropping_controller_stops_session() {
    let (controller, _backend, session) =
        running(SimulatedBackend::front_and_rear(), SnapcamConfig::default());
    drop(controller);

    // The setup thread may still hold the controller for a moment
    let deadline = Instant::now() + common::WAIT;
    while session.is_running() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(!session.is_running());
}
