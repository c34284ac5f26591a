use std::sync::Arc;

use crate::error::{Result, TransmitError};
use crate::locator::Destination;
use crate::media::{DataOutput, MediaBackend, TransportSink};

/// Connects a pipeline's data output to a network sink.
///
/// The binder never closes what it creates; ownership of the sink passes
/// to the caller as soon as [`create`](Self::create) returns.
pub struct SinkBinder<'a, B: MediaBackend> {
    backend: &'a B,
}

impl<'a, B: MediaBackend> SinkBinder<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    /// Ask the backend for a sink sending `output` to `destination`.
    pub fn create(
        &self,
        output: Arc<dyn DataOutput>,
        destination: &Destination,
    ) -> Result<Box<dyn TransportSink>> {
        let locator = destination.locator();
        let sink = self
            .backend
            .create_sink(output, &locator)
            .map_err(TransmitError::TransportBindFailed)?;
        tracing::debug!(%locator, "transport sink created");
        Ok(sink)
    }

    /// Open and start the sink, then start the data output feeding it.
    pub fn activate(&self, sink: &dyn TransportSink, output: &dyn DataOutput) -> Result<()> {
        sink.open().map_err(TransmitError::TransportBindFailed)?;
        sink.start().map_err(TransmitError::TransportBindFailed)?;
        output.start().map_err(TransmitError::TransportBindFailed)?;
        tracing::info!(destination = %sink.destination(), "transport sink started");
        Ok(())
    }
}
