//! knownface-hw — V4L2 color camera capture.
//!
//! Negotiates a color format with the device and hands out RGB frames.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameStream, PixelFormat};
pub use frame::Frame;
