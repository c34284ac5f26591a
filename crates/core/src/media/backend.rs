use std::fmt;
use std::sync::Arc;

use super::pipeline::{DataOutput, Pipeline};
use crate::error::BackendError;
use crate::locator::MediaLocator;
use crate::transport::{RtpSink, RtpSinkConfig};

/// Lifecycle of a [`TransportSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Created and bound to its destination, nothing opened yet.
    Unbound,
    Open,
    Started,
    Closed,
}

impl fmt::Display for SinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbound => write!(f, "Unbound"),
            Self::Open => write!(f, "Open"),
            Self::Started => write!(f, "Started"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

/// Network-facing consumer of a pipeline's [`DataOutput`].
pub trait TransportSink: Send + Sync {
    fn destination(&self) -> &MediaLocator;

    fn state(&self) -> SinkState;

    fn open(&self) -> Result<(), BackendError>;

    fn start(&self) -> Result<(), BackendError>;

    /// Stop transmitting and release the socket. Idempotent.
    fn close(&self);

    /// Whether the output it consumes has ended.
    fn is_finished(&self) -> bool {
        false
    }
}

/// Media I/O backend: turns locators into pipelines and outputs into sinks.
pub trait MediaBackend: Send + Sync {
    /// Raw input handle produced from a locator.
    type Input: Send;

    fn create_input(&self, locator: &MediaLocator) -> Result<Self::Input, BackendError>;

    fn create_pipeline(&self, input: Self::Input) -> Result<Box<dyn Pipeline>, BackendError>;

    /// Create a sink sending `output` to `destination`.
    ///
    /// Defaults to an [`RtpSink`] with default packetization settings.
    fn create_sink(
        &self,
        output: Arc<dyn DataOutput>,
        destination: &MediaLocator,
    ) -> Result<Box<dyn TransportSink>, BackendError> {
        let sink = RtpSink::new(output, destination, RtpSinkConfig::default())?;
        Ok(Box::new(sink))
    }
}
