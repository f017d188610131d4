//! Testing utilities for snapcam
//!
//! Synthetic frames and still payloads for exercising the controller
//! without camera hardware.

pub mod synthetic_data;

pub use synthetic_data::{
    synthetic_jpeg,
    synthetic_pixel_buffer,
    SyntheticFrameSpec,
};
