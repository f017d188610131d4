//! Camera session controller.
//!
//! Owns the capture session, the discovered front/rear devices and the
//! active input, and exposes setup, preview, camera switching and capture.
//! Setup runs on a background thread; every completion and frame
//! notification is delivered on the controller's [`MainQueue`].

pub mod capture;
pub mod frames;
pub mod state;

pub use capture::{decode_still, CaptureCompletion, CaptureCounters, CaptureResult};
pub use frames::{frame_channel, ChannelObserver, FrameConverter, FrameObserver};
pub use state::SessionState;

use crate::backend::{
    CameraDevice, CaptureBackend, DeviceConfigurationGuard, DeviceInput, FrameDelegate,
    PhotoCaptureDelegate, PreviewSurface, SessionHandle,
};
use crate::config::SnapcamConfig;
use crate::dispatch::{spawn_background, MainQueue};
use crate::errors::{BackendError, CameraError};
use crate::types::{
    CameraPosition, CaptureRequest, CaptureTicket, CapturedImage, ConnectionProperty,
    DevicePosition, DeviceType, FlashMode, FocusMode, FrameStreamConfig, ImageCodec, OutputConfig,
    OutputMode, PhotoOutputConfig, PhotoSettings, PixelBuffer, PreviewLayer,
};
use bytes::Bytes;
use capture::{CaptureRegistry, PendingCapture};
use chrono::Utc;
use frames::FrameRouter;
use image::DynamicImage;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Instant;
use tokio::sync::oneshot;
use uuid::Uuid;

const SWITCH_INVARIANT: &str = "running session holds exactly one input of the current position";

type PrepareCompletion = Box<dyn FnOnce(Result<(), CameraError>) + Send + 'static>;

struct ControllerState {
    phase: SessionState,
    preparing: bool,
    session: Option<Arc<dyn SessionHandle>>,
    front_camera: Option<Arc<dyn CameraDevice>>,
    rear_camera: Option<Arc<dyn CameraDevice>>,
    front_input: Option<DeviceInput>,
    rear_input: Option<DeviceInput>,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            phase: SessionState::Uninitialized,
            preparing: false,
            session: None,
            front_camera: None,
            rear_camera: None,
            front_input: None,
            rear_input: None,
        }
    }

    /// Session for the next setup step, which must follow `required`.
    fn expect_phase(&self, required: SessionState) -> Result<Arc<dyn SessionHandle>, CameraError> {
        if self.phase.is_running() {
            return Err(CameraError::CaptureSessionAlreadyRunning);
        }
        let session = self
            .session
            .clone()
            .ok_or(CameraError::CaptureSessionIsMissing)?;
        if self.phase != required {
            return Err(CameraError::invalid_operation(format!(
                "setup step requires state {}, found {}",
                required.as_str(),
                self.phase.as_str()
            )));
        }
        Ok(session)
    }

    fn running_session(&self) -> Option<Arc<dyn SessionHandle>> {
        if !self.phase.is_running() {
            return None;
        }
        self.session.clone().filter(|s| s.is_running())
    }

    fn camera(&self, position: CameraPosition) -> Option<Arc<dyn CameraDevice>> {
        match position {
            CameraPosition::Front => self.front_camera.clone(),
            CameraPosition::Rear => self.rear_camera.clone(),
        }
    }

    fn input(&self, position: CameraPosition) -> Option<DeviceInput> {
        match position {
            CameraPosition::Front => self.front_input.clone(),
            CameraPosition::Rear => self.rear_input.clone(),
        }
    }

    fn set_input(&mut self, position: CameraPosition, input: Option<DeviceInput>) {
        match position {
            CameraPosition::Front => self.front_input = input,
            CameraPosition::Rear => self.rear_input = input,
        }
    }
}

enum SwapOutcome {
    Swapped,
    /// The new input was refused and the previous one put back.
    Restored(CameraError),
    /// A precondition failed before the session was touched.
    Refused(CameraError),
}

struct Inner {
    self_ref: Weak<Inner>,
    backend: Arc<dyn CaptureBackend>,
    main: MainQueue,
    config: SnapcamConfig,
    state: Mutex<ControllerState>,
    // Kept apart from `state` so delegates never wait on a setup step.
    position: Mutex<Option<CameraPosition>>,
    flash_mode: Mutex<FlashMode>,
    captures: CaptureRegistry,
    frames: FrameRouter,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn current_camera_position(&self) -> Option<CameraPosition> {
        *self.position.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_current_camera_position(&self, position: Option<CameraPosition>) {
        *self.position.lock().unwrap_or_else(|e| e.into_inner()) = position;
    }

    fn running_session(&self) -> Option<Arc<dyn SessionHandle>> {
        self.lock_state().running_session()
    }

    fn run_setup(&self) -> Result<(), CameraError> {
        let started = Instant::now();
        self.create_session()?;
        self.discover_devices()?;
        self.configure_input()?;
        self.configure_output()?;
        log::info!(
            "Camera session running on {} camera ({:?} setup)",
            self.current_camera_position()
                .map(|p| p.as_str())
                .unwrap_or("no"),
            started.elapsed()
        );
        Ok(())
    }

    fn finish_prepare(
        &self,
        slot: &Mutex<Option<PrepareCompletion>>,
        result: Result<(), CameraError>,
    ) {
        if let Err(e) = &result {
            log::warn!("Camera setup failed: {}", e);
        }
        let completion = slot.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(completion) = completion {
            self.main.dispatch(move || completion(result));
        }
    }

    fn create_session(&self) -> Result<(), CameraError> {
        let mut st = self.lock_state();
        if st.phase.is_running() {
            return Err(CameraError::CaptureSessionAlreadyRunning);
        }

        let session = self.backend.create_session()?;
        let photo_delegate: Weak<dyn PhotoCaptureDelegate> = self.self_ref.clone();
        let frame_delegate: Weak<dyn FrameDelegate> = self.self_ref.clone();
        session.set_photo_delegate(photo_delegate);
        session.set_frame_delegate(frame_delegate);
        log::debug!("Created capture session {}", session.id());

        let preparing = st.preparing;
        *st = ControllerState::new();
        st.preparing = preparing;
        st.session = Some(session);
        st.phase = SessionState::SessionCreated;
        self.set_current_camera_position(None);
        Ok(())
    }

    fn discover_devices(&self) -> Result<(), CameraError> {
        let mut st = self.lock_state();
        st.expect_phase(SessionState::SessionCreated)?;

        let devices = self
            .backend
            .discover(&[DeviceType::BuiltInWideAngle], DevicePosition::Unspecified);
        if devices.is_empty() {
            log::warn!("No wide-angle cameras discovered");
            return Err(CameraError::NoCamerasAvailable);
        }

        let mut front = None;
        let mut rear = None;
        for device in devices {
            match device.position().camera_position() {
                Some(CameraPosition::Front) => front = Some(device),
                Some(CameraPosition::Rear) => {
                    enable_continuous_autofocus(device.as_ref())?;
                    rear = Some(device);
                }
                None => log::debug!(
                    "Ignoring camera {} with unspecified position",
                    device.unique_id()
                ),
            }
        }

        log::info!(
            "Discovered cameras: front={:?} rear={:?}",
            front.as_ref().map(|d| d.unique_id()),
            rear.as_ref().map(|d| d.unique_id())
        );
        st.front_camera = front;
        st.rear_camera = rear;
        st.phase = SessionState::DevicesDiscovered;
        Ok(())
    }

    fn configure_input(&self) -> Result<(), CameraError> {
        let mut st = self.lock_state();
        let session = st.expect_phase(SessionState::DevicesDiscovered)?;

        let preferred = self.config.preferred_camera();
        let (position, device) = [preferred, preferred.opposite()]
            .into_iter()
            .find_map(|p| st.camera(p).map(|d| (p, d)))
            .ok_or(CameraError::NoCamerasAvailable)?;

        let input = DeviceInput::new(device)?;
        if !session.can_add_input(&input) {
            log::warn!("Session refused input for {} camera {}", position, input.device_id());
            return Err(CameraError::InputsAreInvalid);
        }
        session.add_input(input.clone());
        log::debug!("Attached {} camera {}", position, input.device_id());

        st.set_input(position, Some(input));
        st.phase = SessionState::InputConfigured;
        self.set_current_camera_position(Some(position));
        Ok(())
    }

    fn configure_output(&self) -> Result<(), CameraError> {
        let mut st = self.lock_state();
        let session = st.expect_phase(SessionState::InputConfigured)?;

        let position = self
            .current_camera_position()
            .unwrap_or_else(|| self.config.preferred_camera());
        let output = match self.config.session.output_mode {
            OutputMode::Photo => OutputConfig::Photo(PhotoOutputConfig {
                codec: ImageCodec::Jpeg,
            }),
            OutputMode::FrameStream => {
                OutputConfig::FrameStream(self.frame_stream_config(session.as_ref(), position))
            }
        };

        if session.can_add_output(&output) {
            session.add_output(output);
            log::debug!("Attached output {:?}", output);
        } else {
            log::warn!(
                "Session refused {:?} output; running without it",
                output.mode()
            );
        }
        st.phase = SessionState::OutputConfigured;

        session.start_running();
        st.phase = SessionState::Running;
        Ok(())
    }

    fn frame_stream_config(
        &self,
        session: &dyn SessionHandle,
        position: CameraPosition,
    ) -> FrameStreamConfig {
        let stream = &self.config.stream;
        FrameStreamConfig {
            pixel_format: stream.pixel_format,
            discard_late_frames: stream.discard_late_frames,
            mirrored: position == CameraPosition::Front
                && stream.mirror_front_camera
                && session.supports_connection_property(ConnectionProperty::Mirroring),
            orientation: session
                .supports_connection_property(ConnectionProperty::Orientation)
                .then_some(stream.orientation),
        }
    }

    fn swap_input(
        &self,
        st: &mut ControllerState,
        session: &dyn SessionHandle,
        current: CameraPosition,
        target: CameraPosition,
    ) -> SwapOutcome {
        let attached = session.inputs();
        let Some(old_input) = st.input(current).filter(|i| attached.contains(i)) else {
            return SwapOutcome::Refused(CameraError::invalid_operation(format!(
                "{current} camera input is not attached"
            )));
        };
        let Some(device) = st.camera(target) else {
            return SwapOutcome::Refused(CameraError::invalid_operation(format!(
                "no {target} camera available"
            )));
        };
        let new_input = match DeviceInput::new(device) {
            Ok(input) => input,
            Err(e) => {
                return SwapOutcome::Refused(CameraError::invalid_operation(format!(
                    "cannot create {target} camera input: {e}"
                )))
            }
        };

        session.remove_input(old_input.id());
        if !session.can_add_input(&new_input) {
            session.add_input(old_input);
            return SwapOutcome::Restored(CameraError::invalid_operation(format!(
                "{target} camera input cannot be added"
            )));
        }
        session.add_input(new_input.clone());

        st.set_input(current, None);
        st.set_input(target, Some(new_input));
        if self.config.session.output_mode == OutputMode::FrameStream {
            session.update_frame_stream(self.frame_stream_config(session, target));
        }
        SwapOutcome::Swapped
    }

    fn complete(&self, ticket: CaptureTicket, pending: PendingCapture, result: CaptureResult) {
        self.captures.record_outcome(result.is_ok());
        let elapsed = Utc::now() - pending.submitted_at;
        match &result {
            Ok(image) => log::debug!(
                "{} ({:?} flash) finished after {}ms: {}x{}",
                ticket,
                pending.request.flash_mode,
                elapsed.num_milliseconds(),
                image.width(),
                image.height()
            ),
            Err(e) => log::debug!(
                "{} failed after {}ms: {}",
                ticket,
                elapsed.num_milliseconds(),
                e
            ),
        }
        let completion = pending.completion;
        self.main.dispatch(move || completion(result));
    }

    fn resolve(&self, ticket: CaptureTicket, result: CaptureResult) {
        match self.captures.take(ticket) {
            Some(pending) => self.complete(ticket, pending, result),
            None => log::warn!("Result for unknown {}", ticket),
        }
    }
}

impl PhotoCaptureDelegate for Inner {
    fn did_finish_processing_photo(
        &self,
        ticket: CaptureTicket,
        result: Result<Bytes, BackendError>,
    ) {
        let Some(pending) = self.captures.take(ticket) else {
            log::warn!("Photo delivered for unknown {}", ticket);
            return;
        };

        let outcome = match result {
            Err(e) => Err(CameraError::Backend(e)),
            Ok(data) => decode_still(&data)
                .map(|image| CapturedImage::new(image, pending.position).with_ticket(ticket)),
        };
        self.complete(ticket, pending, outcome);
    }
}

impl FrameDelegate for Inner {
    fn did_output_frame(&self, buffer: PixelBuffer) {
        let Some(rgba) = self.frames.convert(&buffer) else {
            return;
        };
        let position = self
            .current_camera_position()
            .unwrap_or_else(|| self.config.preferred_camera());
        let image = CapturedImage::new(DynamicImage::ImageRgba8(rgba), position);

        if self.config.session.output_mode == OutputMode::FrameStream {
            for (ticket, pending) in self.captures.take_all() {
                let still = image.clone().with_ticket(ticket);
                self.complete(ticket, pending, Ok(still));
            }
        }

        if let Some(observer) = self.frames.observer() {
            self.frames.record_delivered();
            self.main.dispatch(move || {
                if let Some(observer) = observer.upgrade() {
                    observer.captured(image);
                }
            });
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let st = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(session) = st.session.take() {
            session.stop_running();
            log::debug!("Stopped capture session {} on drop", session.id());
        }
    }
}

fn enable_continuous_autofocus(device: &dyn CameraDevice) -> Result<(), CameraError> {
    let guard = DeviceConfigurationGuard::acquire(device)?;
    if device.is_focus_mode_supported(FocusMode::ContinuousAutoFocus) {
        guard.set_focus_mode(FocusMode::ContinuousAutoFocus)?;
    } else {
        log::debug!(
            "Camera {} does not support continuous autofocus",
            device.unique_id()
        );
    }
    Ok(())
}

/// Snapshot of controller state and counters.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStats {
    pub state: SessionState,
    pub current_position: Option<CameraPosition>,
    pub flash_mode: FlashMode,
    pub frames_delivered: u64,
    pub frames_dropped: u64,
    pub captures: CaptureCounters,
}

/// Camera session controller. Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl SessionController {
    /// Controller with its own main queue thread.
    pub fn new(
        backend: Arc<dyn CaptureBackend>,
        config: SnapcamConfig,
    ) -> Result<Self, CameraError> {
        let main = MainQueue::spawn("snapcam-main")?;
        Self::with_main_queue(backend, config, main)
    }

    /// Controller delivering callbacks on an existing main queue.
    pub fn with_main_queue(
        backend: Arc<dyn CaptureBackend>,
        config: SnapcamConfig,
        main: MainQueue,
    ) -> Result<Self, CameraError> {
        config.validate().map_err(CameraError::Config)?;
        let flash_mode = config.session.default_flash;
        let max_pending = config.capture.max_pending;

        let inner = Arc::new_cyclic(|self_ref| Inner {
            self_ref: self_ref.clone(),
            backend,
            main,
            config,
            state: Mutex::new(ControllerState::new()),
            position: Mutex::new(None),
            flash_mode: Mutex::new(flash_mode),
            captures: CaptureRegistry::new(max_pending),
            frames: FrameRouter::new(),
        });
        Ok(Self { inner })
    }

    pub fn main_queue(&self) -> &MainQueue {
        &self.inner.main
    }

    pub fn config(&self) -> &SnapcamConfig {
        &self.inner.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock_state().phase
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.inner.lock_state().session.as_ref().map(|s| s.id())
    }

    pub fn current_camera_position(&self) -> Option<CameraPosition> {
        self.inner.current_camera_position()
    }

    pub fn flash_mode(&self) -> FlashMode {
        *self.inner.flash_mode.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Default flash mode, snapshotted into each `capture_image` request.
    pub fn set_flash_mode(&self, mode: FlashMode) {
        *self.inner.flash_mode.lock().unwrap_or_else(|e| e.into_inner()) = mode;
    }

    pub fn toggle_flash(&self) -> FlashMode {
        let mut mode = self.inner.flash_mode.lock().unwrap_or_else(|e| e.into_inner());
        *mode = mode.toggled();
        *mode
    }

    /// Run the whole setup sequence on a background thread.
    ///
    /// `completion` runs on the main queue with `Ok(())` once the session is
    /// running, or with the first error hit. Never blocks the caller.
    pub fn prepare<F>(&self, completion: F)
    where
        F: FnOnce(Result<(), CameraError>) + Send + 'static,
    {
        let rejection = {
            let mut st = self.inner.lock_state();
            if st.phase.is_running() {
                Some(CameraError::CaptureSessionAlreadyRunning)
            } else if st.preparing {
                Some(CameraError::invalid_operation("prepare is already in progress"))
            } else {
                st.preparing = true;
                None
            }
        };
        if let Some(error) = rejection {
            log::debug!("prepare rejected: {}", error);
            self.inner.main.dispatch(move || completion(Err(error)));
            return;
        }

        let slot: Arc<Mutex<Option<PrepareCompletion>>> =
            Arc::new(Mutex::new(Some(Box::new(completion))));
        let worker_slot = Arc::clone(&slot);
        let inner = Arc::clone(&self.inner);
        let spawned = spawn_background("snapcam-prepare", move || {
            let result = inner.run_setup();
            inner.lock_state().preparing = false;
            inner.finish_prepare(&worker_slot, result);
        });

        if let Err(error) = spawned {
            self.inner.lock_state().preparing = false;
            self.inner.finish_prepare(&slot, Err(error));
        }
    }

    pub async fn prepare_async(&self) -> Result<(), CameraError> {
        let (tx, rx) = oneshot::channel();
        self.prepare(move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(CameraError::Unknown))
    }

    /// First setup step. Replaces any previous, non-running session.
    pub fn create_session(&self) -> Result<(), CameraError> {
        self.inner.create_session()
    }

    /// Find the front and rear wide-angle cameras and put the rear one in
    /// continuous autofocus.
    pub fn discover_devices(&self) -> Result<(), CameraError> {
        self.inner.discover_devices()
    }

    /// Attach the preferred camera (or the other one when it is missing).
    pub fn configure_input(&self) -> Result<(), CameraError> {
        self.inner.configure_input()
    }

    /// Attach the photo or frame stream output and start the session.
    pub fn configure_output(&self) -> Result<(), CameraError> {
        self.inner.configure_output()
    }

    /// Bind a live preview of the running session into `surface`.
    ///
    /// A surface that already shows this session gets its existing layer back.
    pub fn display_preview(
        &self,
        surface: &dyn PreviewSurface,
    ) -> Result<PreviewLayer, CameraError> {
        let session = self
            .inner
            .running_session()
            .ok_or(CameraError::CaptureSessionIsMissing)?;

        if let Some(existing) = surface
            .preview_layers()
            .into_iter()
            .find(|layer| layer.session_id == session.id())
        {
            log::debug!(
                "Surface {} already previews session {}",
                surface.surface_id(),
                session.id()
            );
            return Ok(existing);
        }

        let layer = PreviewLayer {
            id: Uuid::new_v4(),
            session_id: session.id(),
            gravity: self.inner.config.preview.gravity,
            orientation: self.inner.config.preview.orientation,
            frame: surface.bounds(),
        };
        surface.insert_preview_layer(layer.clone());
        log::debug!("Preview bound to surface {}", surface.surface_id());
        Ok(layer)
    }

    /// Swap the active camera inside one configuration transaction.
    ///
    /// On failure the previous input stays attached. Returns the new position.
    pub fn switch_cameras(&self) -> Result<CameraPosition, CameraError> {
        let inner = &self.inner;
        let mut st = inner.lock_state();
        let session = st
            .running_session()
            .ok_or(CameraError::CaptureSessionIsMissing)?;
        let current = inner
            .current_camera_position()
            .ok_or(CameraError::CaptureSessionIsMissing)?;
        let target = current.opposite();

        session.begin_configuration();
        let outcome = inner.swap_input(&mut st, session.as_ref(), current, target);
        session.commit_configuration();

        let (active, result) = match outcome {
            SwapOutcome::Swapped => (target, Ok(target)),
            SwapOutcome::Restored(e) => (current, Err(e)),
            SwapOutcome::Refused(e) => {
                drop(st);
                log::warn!("Camera switch refused: {}", e);
                return Err(e);
            }
        };

        // Inputs and position only change under the state lock.
        let inputs = session.inputs();
        crate::assert_invariant!(
            inputs.len() == 1 && inputs[0].position() == active,
            SWITCH_INVARIANT,
            "session::switch_cameras"
        );
        inner.set_current_camera_position(Some(active));
        drop(st);

        match &result {
            Ok(position) => log::info!("Switched to {} camera", position),
            Err(e) => log::warn!("Camera switch failed, staying on {}: {}", current, e),
        }
        result
    }

    /// Capture a still with the controller's current flash mode.
    pub fn capture_image<F>(&self, completion: F) -> Option<CaptureTicket>
    where
        F: FnOnce(CaptureResult) + Send + 'static,
    {
        self.capture_image_with(CaptureRequest::with_flash(self.flash_mode()), completion)
    }

    /// Capture a still with explicit request settings.
    ///
    /// `completion` runs exactly once on the main queue. Returns the ticket
    /// when the request was accepted; a request made while the pending limit
    /// is reached fails with `InvalidOperation` and earlier requests are
    /// unaffected. In frame stream mode the next streamed frame becomes the
    /// still.
    pub fn capture_image_with<F>(
        &self,
        request: CaptureRequest,
        completion: F,
    ) -> Option<CaptureTicket>
    where
        F: FnOnce(CaptureResult) + Send + 'static,
    {
        let inner = &self.inner;
        let Some(session) = inner.running_session() else {
            inner
                .main
                .dispatch(move || completion(Err(CameraError::CaptureSessionIsMissing)));
            return None;
        };

        let position = inner
            .current_camera_position()
            .unwrap_or_else(|| inner.config.preferred_camera());
        let ticket = match inner.captures.register(request, position, Box::new(completion)) {
            Ok(ticket) => ticket,
            Err(completion) => {
                log::warn!(
                    "Rejecting capture: {} already pending",
                    inner.captures.counters().pending
                );
                inner.main.dispatch(move || {
                    completion(Err(CameraError::invalid_operation(
                        "a capture is already in progress",
                    )))
                });
                return None;
            }
        };

        match inner.config.session.output_mode {
            OutputMode::Photo => {
                let settings = PhotoSettings {
                    ticket,
                    flash_mode: request.flash_mode,
                    codec: ImageCodec::Jpeg,
                };
                log::debug!("Submitting {} with flash {:?}", ticket, request.flash_mode);
                if let Err(e) = session.capture_photo(settings) {
                    inner.resolve(ticket, Err(CameraError::Backend(e)));
                    return None;
                }
            }
            OutputMode::FrameStream => {
                log::debug!("{} will resolve with the next streamed frame", ticket);
            }
        }
        Some(ticket)
    }

    pub async fn capture_image_async(&self, request: CaptureRequest) -> CaptureResult {
        let (tx, rx) = oneshot::channel();
        self.capture_image_with(request, move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(CameraError::Unknown))
    }

    pub fn pending_captures(&self) -> Vec<CaptureTicket> {
        self.inner.captures.pending_tickets()
    }

    /// Register the single frame observer, replacing any previous one. The
    /// controller holds it weakly.
    pub fn set_frame_observer<O>(&self, observer: &Arc<O>)
    where
        O: FrameObserver + 'static,
    {
        let weak: Weak<dyn FrameObserver> = Arc::downgrade(observer) as Weak<dyn FrameObserver>;
        self.inner.frames.set_observer(Some(weak));
    }

    pub fn set_frame_observer_weak(&self, observer: Weak<dyn FrameObserver>) {
        self.inner.frames.set_observer(Some(observer));
    }

    pub fn clear_frame_observer(&self) {
        self.inner.frames.set_observer(None);
    }

    /// Stop the session and return to `Uninitialized`. Pending captures fail
    /// with `CaptureSessionIsMissing`.
    pub fn teardown(&self) {
        let session = {
            let mut st = self.inner.lock_state();
            let session = st.session.take();
            // An in-flight setup thread still owns the prepare slot
            let preparing = st.preparing;
            *st = ControllerState::new();
            st.preparing = preparing;
            self.inner.set_current_camera_position(None);
            session
        };

        if let Some(session) = session {
            session.stop_running();
            log::info!("Capture session {} torn down", session.id());
        }
        for (ticket, pending) in self.inner.captures.take_all() {
            self.inner
                .complete(ticket, pending, Err(CameraError::CaptureSessionIsMissing));
        }
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            state: self.state(),
            current_position: self.current_camera_position(),
            flash_mode: self.flash_mode(),
            frames_delivered: self.inner.frames.delivered(),
            frames_dropped: self.inner.frames.dropped(),
            captures: self.inner.captures.counters(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SimulatedBackend, SimulatedDevice};

    fn controller(backend: SimulatedBackend, config: SnapcamConfig) -> SessionController {
        SessionController::new(Arc::new(backend), config).unwrap()
    }

    #[test]
    fn test_steps_run_in_order() {
        let c = controller(SimulatedBackend::front_and_rear(), SnapcamConfig::default());
        assert_eq!(c.state(), SessionState::Uninitialized);

        assert_eq!(c.discover_devices(), Err(CameraError::CaptureSessionIsMissing));

        c.create_session().unwrap();
        assert!(matches!(
            c.configure_input(),
            Err(CameraError::InvalidOperation(_))
        ));

        c.discover_devices().unwrap();
        c.configure_input().unwrap();
        c.configure_output().unwrap();
        assert_eq!(c.state(), SessionState::Running);
        assert_eq!(c.create_session(), Err(CameraError::CaptureSessionAlreadyRunning));
    }

    #[test]
    fn test_failed_step_keeps_last_state() {
        let c = controller(SimulatedBackend::new(vec![]), SnapcamConfig::default());
        c.create_session().unwrap();
        assert_eq!(c.discover_devices(), Err(CameraError::NoCamerasAvailable));
        assert_eq!(c.state(), SessionState::SessionCreated);
    }

    #[test]
    fn test_unspecified_position_is_ignored() {
        let backend = SimulatedBackend::new(vec![SimulatedDevice::new(
            "external",
            DevicePosition::Unspecified,
        )]);
        let c = controller(backend, SnapcamConfig::default());
        c.create_session().unwrap();
        c.discover_devices().unwrap();
        assert_eq!(c.configure_input(), Err(CameraError::NoCamerasAvailable));
    }

    #[test]
    fn test_toggle_flash() {
        let c = controller(SimulatedBackend::front_and_rear(), SnapcamConfig::default());
        assert_eq!(c.flash_mode(), FlashMode::Off);
        assert_eq!(c.toggle_flash(), FlashMode::On);
        assert_eq!(c.flash_mode(), FlashMode::On);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = SnapcamConfig::default();
        config.capture.max_pending = 0;
        let result = SessionController::new(Arc::new(SimulatedBackend::front_and_rear()), config);
        assert!(matches!(result, Err(CameraError::Config(_))));
    }

    #[test]
    fn test_teardown_keeps_in_flight_prepare() {
        let backend = Arc::new(SimulatedBackend::front_and_rear());
        let c = SessionController::new(backend.clone(), SnapcamConfig::default()).unwrap();

        // Stand in for a setup thread that has not finished yet
        c.inner.lock_state().preparing = true;
        c.teardown();
        assert!(c.inner.lock_state().preparing);
        assert_eq!(c.state(), SessionState::Uninitialized);

        let (tx, rx) = std::sync::mpsc::channel();
        c.prepare(move |result| tx.send(result).unwrap());
        let result = rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(CameraError::InvalidOperation(_))));
        assert_eq!(backend.sessions_created(), 0);
    }
}
