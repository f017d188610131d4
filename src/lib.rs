//! snapcam: camera session controller.
//!
//! Drives a capture session with a front and a rear camera: discovers the
//! devices, attaches the preferred one, wires a photo or frame stream
//! output, binds a live preview, switches cameras atomically and captures
//! flash-aware still images.
//!
//! The platform layer sits behind the traits in [`backend`]; the bundled
//! [`backend::SimulatedBackend`] runs the whole controller without hardware.
//!
//! # Usage
//! ```rust,ignore
//! use snapcam::{SessionController, SnapcamConfig, SimulatedBackend};
//! use std::sync::Arc;
//!
//! snapcam::init_logging();
//! let controller = SessionController::new(
//!     Arc::new(SimulatedBackend::front_and_rear()),
//!     SnapcamConfig::default(),
//! )?;
//! controller.prepare(|result| match result {
//!     Ok(()) => log::info!("camera ready"),
//!     Err(e) => log::error!("camera setup failed: {}", e),
//! });
//! ```
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod invariant_ppt;
pub mod session;
pub mod types;

// Synthetic frames and images for offline testing
pub mod testing;

// Re-exports for convenience
pub use backend::{
    CameraDevice, CaptureBackend, DeviceCatalog, PreviewSurface, SessionHandle, SimulatedBackend,
    SimulatedDevice, SimulatedSurface,
};
pub use config::SnapcamConfig;
pub use dispatch::MainQueue;
pub use errors::{BackendError, CameraError};
pub use session::{
    frame_channel, CaptureResult, FrameObserver, SessionController, SessionState, SessionStats,
};
pub use types::{
    CameraPosition, CaptureRequest, CaptureTicket, CapturedImage, FlashMode, OutputMode,
    PreviewLayer,
};

/// Initialize logging for the camera system
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "snapcam=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
