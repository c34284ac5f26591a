//! One-shot JPEG/RTP video transmission.
//!
//! A [`SessionController`] takes a media source and a destination, drives
//! the source's [`Pipeline`](media::Pipeline) to a JPEG-over-RTP format,
//! binds it to a [`TransportSink`](media::TransportSink) and starts the
//! stream.
//!
//! ```no_run
//! use vidcast::{Destination, MediaLocator, MjpegFileBackend, SessionController, TransmitConfig};
//!
//! let controller = SessionController::from_locator(
//!     MjpegFileBackend::default(),
//!     MediaLocator::new("file:///media/clip.mjpeg"),
//!     Destination::new("10.0.0.2", 42050),
//!     TransmitConfig::default(),
//! );
//! controller.start()?;
//! // ...
//! controller.stop();
//! # Ok::<(), vidcast::TransmitError>(())
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod locator;
pub mod media;
pub mod session;
pub mod transport;

#[cfg(test)]
mod testing;

pub use backend::MjpegFileBackend;
pub use config::{MjpegConfig, TransmitConfig};
pub use error::{BackendError, Result, TransmitError};
pub use locator::{Destination, MediaLocator};
pub use media::{MediaBackend, MediaSource, Packetizer, Pipeline, VideoFormat};
pub use session::{Quality, SessionController};
