//! Property-based tests for device discovery, setup and camera switching.
//!
//! Each case builds a simulated platform from a generated device list and
//! runs the real controller against it.

mod common;

use common::controller;
use proptest::prelude::*;
use snapcam::backend::{SessionHandle, SimulatedBackend, SimulatedDevice};
use snapcam::types::DevicePosition;
use snapcam::{CameraError, CameraPosition, SessionState, SnapcamConfig};

fn device_position() -> impl Strategy<Value = DevicePosition> {
    prop_oneof![
        Just(DevicePosition::Front),
        Just(DevicePosition::Back),
        Just(DevicePosition::Unspecified),
    ]
}

fn build_backend(positions: &[DevicePosition]) -> SimulatedBackend {
    SimulatedBackend::new(
        positions
            .iter()
            .enumerate()
            .map(|(i, position)| SimulatedDevice::new(format!("cam-{i}"), *position))
            .collect(),
    )
}

fn last_of(positions: &[DevicePosition], wanted: DevicePosition) -> Option<String> {
    positions
        .iter()
        .rposition(|p| *p == wanted)
        .map(|i| format!("cam-{i}"))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// INVARIANT: setup attaches the last-discovered device of the preferred
    /// position, else of the other position, and fails cleanly otherwise.
    #[test]
    fn setup_picks_last_device_per_slot(
        positions in prop::collection::vec(device_position(), 0..6),
        prefer_front in any::<bool>(),
    ) {
        let mut config = SnapcamConfig::default();
        if prefer_front {
            config.session.preferred_camera = Some(CameraPosition::Front);
        }
        let (controller, backend) = controller(build_backend(&positions), config);
        let result = common::prepare_blocking(&controller);

        let front = last_of(&positions, DevicePosition::Front);
        let rear = last_of(&positions, DevicePosition::Back);
        let front = front.map(|id| (CameraPosition::Front, id));
        let rear = rear.map(|id| (CameraPosition::Rear, id));
        let expected = if prefer_front { front.or(rear) } else { rear.or(front) };

        match expected {
            Some((position, id)) => {
                prop_assert_eq!(result, Ok(()));
                prop_assert_eq!(controller.current_camera_position(), Some(position));
                let session = backend.last_session().unwrap();
                let inputs = session.inputs();
                prop_assert_eq!(inputs.len(), 1);
                prop_assert_eq!(inputs[0].device_id(), id.as_str());
            }
            None => {
                prop_assert_eq!(result, Err(CameraError::NoCamerasAvailable));
                prop_assert!(controller.state() < SessionState::InputConfigured);
            }
        }

        // Every configuration lock taken during discovery was released
        for device in backend.devices() {
            prop_assert!(!device.is_locked());
            prop_assert_eq!(device.lock_count(), device.unlock_count());
        }
    }

    /// INVARIANT: after any number of switches the session holds exactly one
    /// input and the position alternates with each successful switch.
    #[test]
    fn switching_alternates_positions(switches in 0usize..8) {
        let (controller, backend) =
            controller(SimulatedBackend::front_and_rear(), SnapcamConfig::default());
        common::prepare_blocking(&controller).unwrap();
        let session = backend.last_session().unwrap();

        for _ in 0..switches {
            controller.switch_cameras().unwrap();
        }

        let expected = if switches % 2 == 0 { CameraPosition::Rear } else { CameraPosition::Front };
        prop_assert_eq!(controller.current_camera_position(), Some(expected));
        let inputs = session.inputs();
        prop_assert_eq!(inputs.len(), 1);
        prop_assert_eq!(inputs[0].position(), expected);
        prop_assert!(session.observed_input_counts().iter().all(|&count| count == 1));
    }
}
