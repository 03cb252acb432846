//! facetag-hw: hardware abstraction for camera capture.
//!
//! Provides V4L2-based camera access as a [`facetag_core::FrameSource`]
//! producing RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{device_path_for_index, Camera, CameraError, DeviceInfo, PixelFormat};
