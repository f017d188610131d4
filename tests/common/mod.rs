#![allow(dead_code)]

use snapcam::backend::{SimulatedBackend, SimulatedSession};
use snapcam::{CameraError, CaptureRequest, CaptureResult, SessionController, SnapcamConfig};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn controller(
    backend: SimulatedBackend,
    config: SnapcamConfig,
) -> (SessionController, Arc<SimulatedBackend>) {
    let backend = Arc::new(backend);
    let controller = SessionController::new(backend.clone(), config).unwrap();
    (controller, backend)
}

/// Run `prepare` and wait for its completion, checking it ran on the main queue.
pub fn prepare_blocking(controller: &SessionController) -> Result<(), CameraError> {
    let (tx, rx) = mpsc::channel();
    let main = controller.main_queue().clone();
    controller.prepare(move |result| {
        tx.send((result, main.is_current())).unwrap();
    });
    let (result, on_main) = rx.recv_timeout(WAIT).expect("prepare completion never ran");
    assert!(on_main, "prepare completion must run on the main queue");
    result
}

pub fn running(
    backend: SimulatedBackend,
    config: SnapcamConfig,
) -> (SessionController, Arc<SimulatedBackend>, Arc<SimulatedSession>) {
    let (controller, backend) = controller(backend, config);
    prepare_blocking(&controller).unwrap();
    let session = backend.last_session().unwrap();
    (controller, backend, session)
}

/// Submit a capture and return a receiver for its result.
pub fn submit_capture(
    controller: &SessionController,
    request: CaptureRequest,
) -> mpsc::Receiver<CaptureResult> {
    let (tx, rx) = mpsc::channel();
    controller.capture_image_with(request, move |result| {
        tx.send(result).unwrap();
    });
    rx
}

pub fn capture_blocking(controller: &SessionController, request: CaptureRequest) -> CaptureResult {
    submit_capture(controller, request)
        .recv_timeout(WAIT)
        .expect("capture completion never ran")
}
