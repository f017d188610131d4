//! In-process simulated capture platform.
//!
//! Provides devices, sessions and preview surfaces that behave like a real
//! capture stack: a session holds a single camera input, outputs report
//! through weak delegates, photos finish on a separate thread and a frame
//! pump delivers synthetic frames on its own thread. Every interaction is
//! recorded so tests can inspect what the controller did.

use super::{
    CameraDevice, CaptureBackend, DeviceCatalog, DeviceInput, FrameDelegate, PhotoCaptureDelegate,
    PreviewSurface, SessionHandle,
};
use crate::errors::BackendError;
use crate::testing::{synthetic_jpeg, synthetic_pixel_buffer, SyntheticFrameSpec};
use crate::types::{
    CaptureTicket, ConnectionProperty, DevicePosition, DeviceType, FocusMode, FrameStreamConfig,
    OutputConfig, PhotoSettings, PixelBuffer, PreviewLayer, Rect,
};
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::JoinHandle;
use std::time::Duration;
use uuid::Uuid;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Simulated camera device.
#[derive(Debug)]
pub struct SimulatedDevice {
    unique_id: String,
    name: String,
    device_type: DeviceType,
    position: DevicePosition,
    focus_modes: Vec<FocusMode>,
    focus_mode: Mutex<FocusMode>,
    refuse_lock: bool,
    fail_focus: bool,
    locked: AtomicBool,
    lock_count: AtomicUsize,
    unlock_count: AtomicUsize,
}

impl SimulatedDevice {
    pub fn new(unique_id: impl Into<String>, position: DevicePosition) -> Self {
        let unique_id = unique_id.into();
        Self {
            name: format!("Simulated Camera {unique_id}"),
            unique_id,
            device_type: DeviceType::BuiltInWideAngle,
            position,
            focus_modes: vec![
                FocusMode::Locked,
                FocusMode::AutoFocus,
                FocusMode::ContinuousAutoFocus,
            ],
            focus_mode: Mutex::new(FocusMode::Locked),
            refuse_lock: false,
            fail_focus: false,
            locked: AtomicBool::new(false),
            lock_count: AtomicUsize::new(0),
            unlock_count: AtomicUsize::new(0),
        }
    }

    pub fn front(unique_id: impl Into<String>) -> Self {
        Self::new(unique_id, DevicePosition::Front)
    }

    pub fn back(unique_id: impl Into<String>) -> Self {
        Self::new(unique_id, DevicePosition::Back)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_device_type(mut self, device_type: DeviceType) -> Self {
        self.device_type = device_type;
        self
    }

    pub fn with_focus_modes(mut self, modes: Vec<FocusMode>) -> Self {
        self.focus_modes = modes;
        self
    }

    /// Make `lock_for_configuration` fail, as when another client holds the device.
    pub fn refusing_lock(mut self) -> Self {
        self.refuse_lock = true;
        self
    }

    /// Make `set_focus_mode` fail after the configuration lock is taken.
    pub fn failing_focus(mut self) -> Self {
        self.fail_focus = true;
        self
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    pub fn lock_count(&self) -> usize {
        self.lock_count.load(Ordering::SeqCst)
    }

    pub fn unlock_count(&self) -> usize {
        self.unlock_count.load(Ordering::SeqCst)
    }
}

impl CameraDevice for SimulatedDevice {
    fn unique_id(&self) -> &str {
        &self.unique_id
    }

    fn localized_name(&self) -> &str {
        &self.name
    }

    fn device_type(&self) -> DeviceType {
        self.device_type
    }

    fn position(&self) -> DevicePosition {
        self.position
    }

    fn is_focus_mode_supported(&self, mode: FocusMode) -> bool {
        self.focus_modes.contains(&mode)
    }

    fn focus_mode(&self) -> FocusMode {
        *lock(&self.focus_mode)
    }

    fn set_focus_mode(&self, mode: FocusMode) -> Result<(), BackendError> {
        if !self.is_locked() {
            return Err(BackendError::new(format!(
                "device {} is not locked for configuration",
                self.unique_id
            )));
        }
        if !self.is_focus_mode_supported(mode) {
            return Err(BackendError::new(format!("focus mode {mode:?} not supported")));
        }
        if self.fail_focus {
            return Err(BackendError::new(format!(
                "device {} failed to apply focus mode {mode:?}",
                self.unique_id
            )));
        }
        *lock(&self.focus_mode) = mode;
        Ok(())
    }

    fn lock_for_configuration(&self) -> Result<(), BackendError> {
        if self.refuse_lock {
            return Err(BackendError::new(format!(
                "device {} refused configuration lock",
                self.unique_id
            )));
        }
        self.locked.store(true, Ordering::SeqCst);
        self.lock_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn unlock_for_configuration(&self) {
        self.locked.store(false, Ordering::SeqCst);
        self.unlock_count.fetch_add(1, Ordering::SeqCst);
    }
}

/// How the simulated photo output finishes captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoBehavior {
    /// Deliver a JPEG of the given size from a background thread.
    Jpeg { width: u32, height: u32 },
    /// Hold requests until `finish_photo` is called.
    Manual,
    /// Deliver bytes that do not decode as an image.
    Corrupt,
    /// Report a processing error.
    Fail(String),
}

#[derive(Debug, Clone)]
pub struct SimulatedSessionOptions {
    pub accept_outputs: bool,
    pub supports_mirroring: bool,
    pub supports_orientation: bool,
    pub photo: PhotoBehavior,
    /// Device ids the session refuses as inputs.
    pub rejected_devices: Vec<String>,
    pub fail_session_creation: bool,
}

impl Default for SimulatedSessionOptions {
    fn default() -> Self {
        Self {
            accept_outputs: true,
            supports_mirroring: true,
            supports_orientation: true,
            photo: PhotoBehavior::Jpeg {
                width: 64,
                height: 48,
            },
            rejected_devices: Vec::new(),
            fail_session_creation: false,
        }
    }
}

struct SessionInner {
    inputs: Vec<DeviceInput>,
    output: Option<OutputConfig>,
    running: bool,
    config_depth: u32,
    transactions: u32,
    photo_delegate: Option<Weak<dyn PhotoCaptureDelegate>>,
    frame_delegate: Option<Weak<dyn FrameDelegate>>,
    submitted_photos: Vec<PhotoSettings>,
    held_photos: Vec<PhotoSettings>,
    rejected: HashSet<String>,
    observed_input_counts: Vec<usize>,
}

/// Simulated capture session holding at most one camera input.
pub struct SimulatedSession {
    id: Uuid,
    options: SimulatedSessionOptions,
    inner: Mutex<SessionInner>,
    pump_stop: Arc<AtomicBool>,
}

impl SimulatedSession {
    pub fn new(options: SimulatedSessionOptions) -> Self {
        let rejected = options.rejected_devices.iter().cloned().collect();
        Self {
            id: Uuid::new_v4(),
            options,
            inner: Mutex::new(SessionInner {
                inputs: Vec::new(),
                output: None,
                running: false,
                config_depth: 0,
                transactions: 0,
                photo_delegate: None,
                frame_delegate: None,
                submitted_photos: Vec::new(),
                held_photos: Vec::new(),
                rejected,
                observed_input_counts: Vec::new(),
            }),
            pump_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Refuse the device as an input from now on.
    pub fn reject_device(&self, device_id: &str) {
        lock(&self.inner).rejected.insert(device_id.to_string());
    }

    /// Input counts visible to observers, recorded after every change
    /// outside a transaction and at every commit.
    pub fn observed_input_counts(&self) -> Vec<usize> {
        lock(&self.inner).observed_input_counts.clone()
    }

    pub fn transactions_committed(&self) -> u32 {
        lock(&self.inner).transactions
    }

    pub fn is_configuring(&self) -> bool {
        lock(&self.inner).config_depth > 0
    }

    pub fn submitted_photos(&self) -> Vec<PhotoSettings> {
        lock(&self.inner).submitted_photos.clone()
    }

    pub fn held_photos(&self) -> Vec<PhotoSettings> {
        lock(&self.inner).held_photos.clone()
    }

    /// Finish a held capture. Returns false if the ticket was not held.
    pub fn finish_photo(&self, ticket: CaptureTicket, result: Result<Bytes, BackendError>) -> bool {
        let delegate = {
            let mut g = lock(&self.inner);
            let Some(index) = g.held_photos.iter().position(|s| s.ticket == ticket) else {
                return false;
            };
            g.held_photos.remove(index);
            g.photo_delegate.clone()
        };

        match delegate.and_then(|d| d.upgrade()) {
            Some(delegate) => {
                delegate.did_finish_processing_photo(ticket, result);
                true
            }
            None => false,
        }
    }

    /// Deliver one frame to the frame delegate. Returns false when the
    /// session is not streaming.
    pub fn push_frame(&self, buffer: PixelBuffer) -> bool {
        let delegate = {
            let g = lock(&self.inner);
            if !g.running || !matches!(g.output, Some(OutputConfig::FrameStream(_))) {
                return false;
            }
            g.frame_delegate.clone()
        };

        match delegate.and_then(|d| d.upgrade()) {
            Some(delegate) => {
                delegate.did_output_frame(buffer);
                true
            }
            None => false,
        }
    }

    /// Deliver synthetic frames from a dedicated thread until `frames` have
    /// been sent (or forever when `None`) or `stop_frame_pump` is called.
    pub fn start_frame_pump(
        self: &Arc<Self>,
        frames: Option<u64>,
        interval: Duration,
        spec: SyntheticFrameSpec,
    ) -> std::io::Result<JoinHandle<u64>> {
        self.pump_stop.store(false, Ordering::SeqCst);
        let session = Arc::clone(self);
        std::thread::Builder::new()
            .name("snapcam-sim-frames".to_string())
            .spawn(move || {
                let mut sent = 0u64;
                while frames.map_or(true, |n| sent < n) {
                    if session.pump_stop.load(Ordering::SeqCst) {
                        break;
                    }
                    if session.push_frame(synthetic_pixel_buffer(sent, spec)) {
                        sent += 1;
                    }
                    if !interval.is_zero() {
                        std::thread::sleep(interval);
                    }
                }
                sent
            })
    }

    pub fn stop_frame_pump(&self) {
        self.pump_stop.store(true, Ordering::SeqCst);
    }

    fn record_visible_inputs(g: &mut SessionInner) {
        if g.config_depth == 0 {
            let count = g.inputs.len();
            g.observed_input_counts.push(count);
        }
    }

    fn photo_result(&self) -> Result<Bytes, BackendError> {
        match &self.options.photo {
            PhotoBehavior::Jpeg { width, height } => synthetic_jpeg(*width, *height)
                .map_err(|e| BackendError::new(format!("failed to encode photo: {e}"))),
            PhotoBehavior::Corrupt => Ok(Bytes::from_static(b"definitely not an image")),
            PhotoBehavior::Fail(message) => Err(BackendError::new(message.clone())),
            PhotoBehavior::Manual => {
                Err(BackendError::new("manual photos are finished explicitly"))
            }
        }
    }
}

impl SessionHandle for SimulatedSession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn begin_configuration(&self) {
        lock(&self.inner).config_depth += 1;
    }

    fn commit_configuration(&self) {
        let mut g = lock(&self.inner);
        if g.config_depth == 0 {
            log::warn!("commit_configuration without matching begin_configuration");
            return;
        }
        g.config_depth -= 1;
        if g.config_depth == 0 {
            g.transactions += 1;
            Self::record_visible_inputs(&mut g);
        }
    }

    fn inputs(&self) -> Vec<DeviceInput> {
        lock(&self.inner).inputs.clone()
    }

    fn can_add_input(&self, input: &DeviceInput) -> bool {
        let g = lock(&self.inner);
        !g.rejected.contains(input.device_id()) && g.inputs.is_empty()
    }

    fn add_input(&self, input: DeviceInput) {
        let mut g = lock(&self.inner);
        if g.inputs.iter().any(|i| i.id() == input.id()) {
            return;
        }
        g.inputs.push(input);
        Self::record_visible_inputs(&mut g);
    }

    fn remove_input(&self, input_id: Uuid) -> Option<DeviceInput> {
        let mut g = lock(&self.inner);
        let index = g.inputs.iter().position(|i| i.id() == input_id)?;
        let removed = g.inputs.remove(index);
        Self::record_visible_inputs(&mut g);
        Some(removed)
    }

    fn can_add_output(&self, _output: &OutputConfig) -> bool {
        let g = lock(&self.inner);
        self.options.accept_outputs && g.output.is_none()
    }

    fn add_output(&self, output: OutputConfig) {
        lock(&self.inner).output = Some(output);
    }

    fn output(&self) -> Option<OutputConfig> {
        lock(&self.inner).output
    }

    fn supports_connection_property(&self, property: ConnectionProperty) -> bool {
        match property {
            ConnectionProperty::Mirroring => self.options.supports_mirroring,
            ConnectionProperty::Orientation => self.options.supports_orientation,
        }
    }

    fn update_frame_stream(&self, config: FrameStreamConfig) {
        let mut g = lock(&self.inner);
        if matches!(g.output, Some(OutputConfig::FrameStream(_))) {
            g.output = Some(OutputConfig::FrameStream(config));
        }
    }

    fn set_photo_delegate(&self, delegate: Weak<dyn PhotoCaptureDelegate>) {
        lock(&self.inner).photo_delegate = Some(delegate);
    }

    fn set_frame_delegate(&self, delegate: Weak<dyn FrameDelegate>) {
        lock(&self.inner).frame_delegate = Some(delegate);
    }

    fn capture_photo(&self, settings: PhotoSettings) -> Result<(), BackendError> {
        let delegate = {
            let mut g = lock(&self.inner);
            if !g.running {
                return Err(BackendError::new("session is not running"));
            }
            if !matches!(g.output, Some(OutputConfig::Photo(_))) {
                return Err(BackendError::new("no photo output attached"));
            }
            g.submitted_photos.push(settings);
            if self.options.photo == PhotoBehavior::Manual {
                g.held_photos.push(settings);
                return Ok(());
            }
            g.photo_delegate.clone()
        };

        let result = self.photo_result();
        std::thread::Builder::new()
            .name("snapcam-sim-photo".to_string())
            .spawn(move || {
                if let Some(delegate) = delegate.and_then(|d| d.upgrade()) {
                    delegate.did_finish_processing_photo(settings.ticket, result);
                }
            })
            .map_err(|e| BackendError::new(format!("spawn failed: {e}")))?;
        Ok(())
    }

    fn start_running(&self) {
        lock(&self.inner).running = true;
    }

    fn stop_running(&self) {
        self.pump_stop.store(true, Ordering::SeqCst);
        lock(&self.inner).running = false;
    }

    fn is_running(&self) -> bool {
        lock(&self.inner).running
    }
}

/// Simulated platform: a fixed device list plus session factory.
pub struct SimulatedBackend {
    devices: Mutex<Vec<Arc<SimulatedDevice>>>,
    options: SimulatedSessionOptions,
    sessions: Mutex<Vec<Arc<SimulatedSession>>>,
    discover_calls: AtomicUsize,
}

impl SimulatedBackend {
    pub fn new(devices: Vec<SimulatedDevice>) -> Self {
        Self {
            devices: Mutex::new(devices.into_iter().map(Arc::new).collect()),
            options: SimulatedSessionOptions::default(),
            sessions: Mutex::new(Vec::new()),
            discover_calls: AtomicUsize::new(0),
        }
    }

    /// One front and one back wide-angle camera, like a typical phone.
    pub fn front_and_rear() -> Self {
        Self::new(vec![
            SimulatedDevice::back("rear-wide").named("Back Camera"),
            SimulatedDevice::front("front-wide").named("Front Camera"),
        ])
    }

    pub fn with_options(mut self, options: SimulatedSessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn devices(&self) -> Vec<Arc<SimulatedDevice>> {
        lock(&self.devices).clone()
    }

    pub fn device(&self, unique_id: &str) -> Option<Arc<SimulatedDevice>> {
        lock(&self.devices)
            .iter()
            .find(|d| d.unique_id == unique_id)
            .cloned()
    }

    pub fn sessions_created(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn last_session(&self) -> Option<Arc<SimulatedSession>> {
        lock(&self.sessions).last().cloned()
    }

    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }
}

impl DeviceCatalog for SimulatedBackend {
    fn discover(
        &self,
        device_types: &[DeviceType],
        position: DevicePosition,
    ) -> Vec<Arc<dyn CameraDevice>> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.devices)
            .iter()
            .filter(|d| device_types.contains(&d.device_type))
            .filter(|d| position == DevicePosition::Unspecified || d.position == position)
            .map(|d| Arc::clone(d) as Arc<dyn CameraDevice>)
            .collect()
    }
}

impl CaptureBackend for SimulatedBackend {
    fn create_session(&self) -> Result<Arc<dyn SessionHandle>, BackendError> {
        if self.options.fail_session_creation {
            return Err(BackendError::new("capture session could not be created"));
        }
        let session = Arc::new(SimulatedSession::new(self.options.clone()));
        lock(&self.sessions).push(Arc::clone(&session));
        Ok(session)
    }
}

/// Simulated presentation surface that records inserted preview layers.
#[derive(Debug)]
pub struct SimulatedSurface {
    id: Uuid,
    bounds: Rect,
    layers: Mutex<Vec<PreviewLayer>>,
}

impl SimulatedSurface {
    pub fn new(bounds: Rect) -> Self {
        Self {
            id: Uuid::new_v4(),
            bounds,
            layers: Mutex::new(Vec::new()),
        }
    }
}

impl PreviewSurface for SimulatedSurface {
    fn surface_id(&self) -> Uuid {
        self.id
    }

    fn bounds(&self) -> Rect {
        self.bounds
    }

    fn insert_preview_layer(&self, layer: PreviewLayer) {
        lock(&self.layers).insert(0, layer);
    }

    fn preview_layers(&self) -> Vec<PreviewLayer> {
        lock(&self.layers).clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_filters_type_and_position() {
        let backend = SimulatedBackend::new(vec![
            SimulatedDevice::back("wide"),
            SimulatedDevice::back("tele").with_device_type(DeviceType::BuiltInTelephoto),
            SimulatedDevice::front("selfie"),
        ]);

        let wide = backend.discover(&[DeviceType::BuiltInWideAngle], DevicePosition::Unspecified);
        assert_eq!(wide.len(), 2);

        let front = backend.discover(&[DeviceType::BuiltInWideAngle], DevicePosition::Front);
        assert_eq!(front.len(), 1);
        assert_eq!(front[0].unique_id(), "selfie");
    }

    #[test]
    fn test_focus_requires_lock() {
        let device = SimulatedDevice::back("rear");
        assert!(device.set_focus_mode(FocusMode::AutoFocus).is_err());

        device.lock_for_configuration().unwrap();
        device.set_focus_mode(FocusMode::AutoFocus).unwrap();
        device.unlock_for_configuration();
        assert_eq!(device.focus_mode(), FocusMode::AutoFocus);
        assert_eq!(device.lock_count(), 1);
        assert_eq!(device.unlock_count(), 1);
    }

    #[test]
    fn test_failing_focus_keeps_mode() {
        let device = SimulatedDevice::back("rear").failing_focus();
        device.lock_for_configuration().unwrap();
        assert!(device.set_focus_mode(FocusMode::ContinuousAutoFocus).is_err());
        device.unlock_for_configuration();
        assert_eq!(device.focus_mode(), FocusMode::Locked);
    }

    #[test]
    fn test_session_holds_single_input() {
        let session = SimulatedSession::new(SimulatedSessionOptions::default());
        let rear = DeviceInput::new(Arc::new(SimulatedDevice::back("rear"))).unwrap();
        let front = DeviceInput::new(Arc::new(SimulatedDevice::front("front"))).unwrap();

        assert!(session.can_add_input(&rear));
        session.add_input(rear.clone());
        assert!(!session.can_add_input(&front));

        session.begin_configuration();
        session.remove_input(rear.id());
        assert!(session.can_add_input(&front));
        session.add_input(front);
        session.commit_configuration();

        assert_eq!(session.observed_input_counts(), vec![1, 1]);
        assert_eq!(session.transactions_committed(), 1);
    }

    #[test]
    fn test_push_frame_requires_streaming() {
        let session = SimulatedSession::new(SimulatedSessionOptions::default());
        let frame = synthetic_pixel_buffer(0, SyntheticFrameSpec::default());
        assert!(!session.push_frame(frame));
    }

    #[test]
    fn test_surface_inserts_beneath() {
        let surface = SimulatedSurface::new(Rect::new(0.0, 0.0, 100.0, 200.0));
        let layer = |n: u128| PreviewLayer {
            id: Uuid::from_u128(n),
            session_id: Uuid::nil(),
            gravity: crate::types::VideoGravity::ResizeAspectFill,
            orientation: crate::types::Orientation::Portrait,
            frame: surface.bounds(),
        };
        surface.insert_preview_layer(layer(1));
        surface.insert_preview_layer(layer(2));
        assert_eq!(surface.preview_layers()[0].id, Uuid::from_u128(2));
    }
}
