//! Concrete [`MediaBackend`](crate::media::MediaBackend) implementations.

pub mod mjpeg;

pub use mjpeg::{MjpegClip, MjpegFileBackend, MjpegOutput, MjpegPipeline};
