//! Value types shared by the controller and the capture backends.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Which of the two cameras the controller is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraPosition {
    Front,
    Rear,
}

impl CameraPosition {
    pub fn opposite(self) -> Self {
        match self {
            CameraPosition::Front => CameraPosition::Rear,
            CameraPosition::Rear => CameraPosition::Front,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraPosition::Front => "front",
            CameraPosition::Rear => "rear",
        }
    }
}

impl fmt::Display for CameraPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Physical position as reported by the platform during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevicePosition {
    Front,
    Back,
    Unspecified,
}

impl DevicePosition {
    /// Slot this device fills, if any. Unspecified devices fill none.
    pub fn camera_position(self) -> Option<CameraPosition> {
        match self {
            DevicePosition::Front => Some(CameraPosition::Front),
            DevicePosition::Back => Some(CameraPosition::Rear),
            DevicePosition::Unspecified => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    BuiltInWideAngle,
    BuiltInTelephoto,
    BuiltInUltraWide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashMode {
    On,
    #[default]
    Off,
}

impl FlashMode {
    pub fn toggled(self) -> Self {
        match self {
            FlashMode::On => FlashMode::Off,
            FlashMode::Off => FlashMode::On,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusMode {
    Locked,
    AutoFocus,
    ContinuousAutoFocus,
}

/// Which kind of output the session is wired with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Photo,
    FrameStream,
}

impl OutputMode {
    /// Camera picked at setup when no preference is configured.
    pub fn default_camera(self) -> CameraPosition {
        match self {
            OutputMode::Photo => CameraPosition::Rear,
            OutputMode::FrameStream => CameraPosition::Front,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoGravity {
    ResizeAspect,
    ResizeAspectFill,
    Resize,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageCodec {
    #[default]
    Jpeg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    #[default]
    Bgra8,
    Rgba8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PhotoOutputConfig {
    pub codec: ImageCodec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStreamConfig {
    pub pixel_format: PixelFormat,
    /// Late frames are dropped by the backend instead of queued.
    pub discard_late_frames: bool,
    pub mirrored: bool,
    pub orientation: Option<Orientation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputConfig {
    Photo(PhotoOutputConfig),
    FrameStream(FrameStreamConfig),
}

impl OutputConfig {
    pub fn mode(&self) -> OutputMode {
        match self {
            OutputConfig::Photo(_) => OutputMode::Photo,
            OutputConfig::FrameStream(_) => OutputMode::FrameStream,
        }
    }
}

/// Connection properties an output may or may not support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionProperty {
    Mirroring,
    Orientation,
}

/// Per-request capture parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub flash_mode: FlashMode,
}

impl CaptureRequest {
    pub fn with_flash(flash_mode: FlashMode) -> Self {
        Self { flash_mode }
    }
}

/// Identifies one still capture request from submission to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CaptureTicket(pub u64);

impl fmt::Display for CaptureTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capture#{}", self.0)
    }
}

/// Settings handed to the photo output for one capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhotoSettings {
    pub ticket: CaptureTicket,
    pub flash_mode: FlashMode,
    pub codec: ImageCodec,
}

/// Raw frame as delivered by a frame stream output.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub bytes_per_row: usize,
    pub format: PixelFormat,
    pub data: Bytes,
}

impl PixelBuffer {
    /// Tightly packed buffer (no row padding).
    pub fn packed(width: u32, height: u32, format: PixelFormat, data: impl Into<Bytes>) -> Self {
        Self {
            width,
            height,
            bytes_per_row: width as usize * format.bytes_per_pixel(),
            format,
            data: data.into(),
        }
    }
}

/// A displayable image produced by a still capture or the frame stream.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub image: DynamicImage,
    pub position: CameraPosition,
    pub captured_at: DateTime<Utc>,
    pub ticket: Option<CaptureTicket>,
}

impl CapturedImage {
    pub fn new(image: DynamicImage, position: CameraPosition) -> Self {
        Self {
            image,
            position,
            captured_at: Utc::now(),
            ticket: None,
        }
    }

    pub fn with_ticket(mut self, ticket: CaptureTicket) -> Self {
        self.ticket = Some(ticket);
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Preview binding inserted into a presentation surface.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewLayer {
    pub id: Uuid,
    pub session_id: Uuid,
    pub gravity: VideoGravity,
    pub orientation: Orientation,
    pub frame: Rect,
}
