//! Capability traits for the platform capture layer.
//!
//! The controller never talks to hardware directly. A backend provides
//! device discovery ([`DeviceCatalog`]), session creation
//! ([`CaptureBackend`]) and a live session ([`SessionHandle`]) that accepts
//! inputs and outputs, and reports finished photos and streamed frames
//! through weakly held delegates.

pub mod simulated;

use crate::errors::{BackendError, CameraError};
use crate::types::{
    CameraPosition, CaptureTicket, ConnectionProperty, DevicePosition, DeviceType, FocusMode,
    FrameStreamConfig, OutputConfig, PhotoSettings, PixelBuffer, PreviewLayer, Rect,
};
use bytes::Bytes;
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

pub use simulated::{
    PhotoBehavior, SimulatedBackend, SimulatedDevice, SimulatedSession, SimulatedSessionOptions,
    SimulatedSurface,
};

/// A physical capture device found during discovery.
pub trait CameraDevice: Send + Sync + fmt::Debug {
    fn unique_id(&self) -> &str;
    fn localized_name(&self) -> &str;
    fn device_type(&self) -> DeviceType;
    fn position(&self) -> DevicePosition;
    fn is_focus_mode_supported(&self, mode: FocusMode) -> bool;
    fn focus_mode(&self) -> FocusMode;

    /// Only valid while the configuration lock is held.
    fn set_focus_mode(&self, mode: FocusMode) -> Result<(), BackendError>;

    fn lock_for_configuration(&self) -> Result<(), BackendError>;
    fn unlock_for_configuration(&self);
}

/// Scoped device configuration lock. Unlocks on drop, on every exit path.
pub struct DeviceConfigurationGuard<'a> {
    device: &'a dyn CameraDevice,
}

impl<'a> DeviceConfigurationGuard<'a> {
    pub fn acquire(device: &'a dyn CameraDevice) -> Result<Self, BackendError> {
        device.lock_for_configuration()?;
        log::trace!("Configuration lock acquired for {}", device.unique_id());
        Ok(Self { device })
    }

    pub fn set_focus_mode(&self, mode: FocusMode) -> Result<(), BackendError> {
        self.device.set_focus_mode(mode)
    }
}

impl Drop for DeviceConfigurationGuard<'_> {
    fn drop(&mut self) {
        self.device.unlock_for_configuration();
        log::trace!("Configuration lock released for {}", self.device.unique_id());
    }
}

/// Enumerates capture devices.
pub trait DeviceCatalog: Send + Sync {
    /// Devices of the given types. `DevicePosition::Unspecified` matches any position.
    fn discover(&self, device_types: &[DeviceType], position: DevicePosition)
        -> Vec<Arc<dyn CameraDevice>>;
}

/// Full platform entry point: discovery plus session creation.
pub trait CaptureBackend: DeviceCatalog {
    fn create_session(&self) -> Result<Arc<dyn SessionHandle>, BackendError>;
}

/// Binding of a camera device into a capture session.
#[derive(Clone)]
pub struct DeviceInput {
    id: Uuid,
    position: CameraPosition,
    device: Arc<dyn CameraDevice>,
}

impl DeviceInput {
    /// Fails with `InputsAreInvalid` for devices with no front/rear position.
    pub fn new(device: Arc<dyn CameraDevice>) -> Result<Self, CameraError> {
        let position = device
            .position()
            .camera_position()
            .ok_or(CameraError::InputsAreInvalid)?;
        Ok(Self {
            id: Uuid::new_v4(),
            position,
            device,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn position(&self) -> CameraPosition {
        self.position
    }

    pub fn device(&self) -> &Arc<dyn CameraDevice> {
        &self.device
    }

    pub fn device_id(&self) -> &str {
        self.device.unique_id()
    }
}

impl PartialEq for DeviceInput {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for DeviceInput {}

impl fmt::Debug for DeviceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceInput")
            .field("id", &self.id)
            .field("position", &self.position)
            .field("device", &self.device.unique_id())
            .finish()
    }
}

/// Receives the result of a still capture. Called at most once per ticket,
/// on whatever thread the backend finishes processing on.
pub trait PhotoCaptureDelegate: Send + Sync {
    fn did_finish_processing_photo(
        &self,
        ticket: CaptureTicket,
        result: Result<Bytes, BackendError>,
    );
}

/// Receives every frame delivered by a frame stream output, on the
/// backend's frame thread.
pub trait FrameDelegate: Send + Sync {
    fn did_output_frame(&self, buffer: PixelBuffer);
}

/// A live capture session.
///
/// Input and output changes made on a running session must be bracketed by
/// `begin_configuration` / `commit_configuration`; observers only see the
/// committed result.
pub trait SessionHandle: Send + Sync {
    fn id(&self) -> Uuid;

    fn begin_configuration(&self);
    fn commit_configuration(&self);

    fn inputs(&self) -> Vec<DeviceInput>;
    fn can_add_input(&self, input: &DeviceInput) -> bool;
    fn add_input(&self, input: DeviceInput);
    fn remove_input(&self, input_id: Uuid) -> Option<DeviceInput>;

    fn can_add_output(&self, output: &OutputConfig) -> bool;
    fn add_output(&self, output: OutputConfig);
    fn output(&self) -> Option<OutputConfig>;
    fn supports_connection_property(&self, property: ConnectionProperty) -> bool;
    /// Reconfigures an attached frame stream output's connection.
    fn update_frame_stream(&self, config: FrameStreamConfig);

    fn set_photo_delegate(&self, delegate: Weak<dyn PhotoCaptureDelegate>);
    fn set_frame_delegate(&self, delegate: Weak<dyn FrameDelegate>);

    /// Submits a still capture. The result arrives through the photo delegate.
    fn capture_photo(&self, settings: PhotoSettings) -> Result<(), BackendError>;

    fn start_running(&self);
    fn stop_running(&self);
    fn is_running(&self) -> bool;
}

/// Presentation-side surface a preview can be bound to.
pub trait PreviewSurface: Send + Sync {
    fn surface_id(&self) -> Uuid;
    fn bounds(&self) -> Rect;
    /// Inserts the layer beneath existing content.
    fn insert_preview_layer(&self, layer: PreviewLayer);
    fn preview_layers(&self) -> Vec<PreviewLayer>;
}
