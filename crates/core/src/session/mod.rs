//! Transmission session control.
//!
//! A [`SessionController`] owns at most one live transmission: a realized
//! pipeline paired with the transport sink consuming its output.
//!
//! ## Start sequence
//!
//! ```text
//! start()
//!   -> PipelineBuilder::build      Configured, track/format, Realized
//!   -> QualityNegotiator::apply    JPEG quality (best effort)
//!   -> SinkBinder::create/activate rtp://host:port/stream
//!   -> pipeline.start()
//! ```
//!
//! Any failure once a pipeline exists closes it (and a sink, if one was
//! created) before `start()` returns. `stop()` tears the session down in
//! reverse order.

pub mod binder;
pub mod builder;
pub mod guard;
pub mod quality;
pub mod sync;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::TransmitConfig;
use crate::error::{Result, TransmitError};
use crate::locator::{Destination, MediaLocator};
use crate::media::{DataOutput, MediaBackend, MediaSource, Pipeline, TransportSink, VideoFormat};
pub use binder::SinkBinder;
pub use builder::{PipelineBuilder, RealizedPipeline};
pub use guard::CloseOnDrop;
pub use quality::{Quality, QualityNegotiator};
pub use sync::{StateSynchronizer, WaitOutcome};

/// The live pipeline/sink pair of a running transmission.
pub struct SessionState {
    pipeline: CloseOnDrop<Box<dyn Pipeline>>,
    sink: CloseOnDrop<Box<dyn TransportSink>>,
    output: Arc<dyn DataOutput>,
    format: VideoFormat,
    quality: Option<f32>,
}

impl SessionState {
    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    /// Quality set on the encoder, `None` if it exposed no control.
    pub fn quality(&self) -> Option<f32> {
        self.quality
    }

    fn shutdown(self) {
        self.output.stop();
        self.pipeline.stop();
        self.pipeline.close();
        self.sink.close();
    }
}

struct Inner {
    source: Option<MediaSource>,
    session: Option<SessionState>,
}

/// Sets up, runs and tears down one outbound JPEG/RTP transmission.
///
/// `start()` and `stop()` are serialized by an internal lock; the
/// controller can be shared between threads.
pub struct SessionController<B: MediaBackend> {
    backend: B,
    destination: Destination,
    quality: Quality,
    sync: StateSynchronizer,
    inner: Mutex<Inner>,
}

impl<B: MediaBackend> SessionController<B> {
    /// Transmit the media at `locator`. The stream name of `destination` is
    /// taken from `config`.
    pub fn from_locator(
        backend: B,
        locator: MediaLocator,
        destination: Destination,
        config: TransmitConfig,
    ) -> Self {
        let destination = Destination {
            stream_name: config.stream_name,
            ..destination
        };
        Self::new(
            backend,
            MediaSource::Locator(locator),
            destination,
            Quality::from_percent(config.quality_percent),
        )
    }

    /// Transmit from an already-built pipeline. The pipeline is consumed by
    /// the first `start()`.
    pub fn from_pipeline(
        backend: B,
        pipeline: Box<dyn Pipeline>,
        destination: Destination,
        quality_percent: f32,
    ) -> Self {
        Self::new(
            backend,
            MediaSource::Pipeline(pipeline),
            destination,
            Quality::from_percent(quality_percent),
        )
    }

    fn new(backend: B, source: MediaSource, destination: Destination, quality: Quality) -> Self {
        Self {
            backend,
            destination,
            quality,
            sync: StateSynchronizer::new(),
            inner: Mutex::new(Inner {
                source: Some(source),
                session: None,
            }),
        }
    }

    /// Build the pipeline, bind the sink and start transmitting.
    ///
    /// Fails with [`TransmitError::AlreadyRunning`] while a transmission is
    /// live; the running session is left untouched.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.session.is_some() {
            tracing::warn!(destination = %self.destination, "start() while already running");
            return Err(TransmitError::AlreadyRunning);
        }
        self.sync.reset();

        let source = match inner.source.take() {
            Some(MediaSource::Locator(locator)) => {
                inner.source = Some(MediaSource::Locator(locator.clone()));
                Some(MediaSource::Locator(locator))
            }
            other => other,
        };
        tracing::info!(source = ?source, destination = %self.destination, "starting transmission");

        let session = self.establish(source).inspect_err(|e| {
            tracing::error!(
                destination = %self.destination,
                error = %e,
                "transmission failed to start"
            );
        })?;
        tracing::info!(
            destination = %self.destination,
            format = %session.format,
            quality = ?session.quality,
            "transmission started"
        );
        inner.session = Some(session);
        Ok(())
    }

    fn establish(&self, source: Option<MediaSource>) -> Result<SessionState> {
        let realized = PipelineBuilder::new(&self.backend, &self.sync).build(source)?;
        let quality = QualityNegotiator::apply(&**realized.pipeline, self.quality);

        let binder = SinkBinder::new(&self.backend);
        let sink = CloseOnDrop::new(binder.create(realized.output.clone(), &self.destination)?);
        binder.activate(&**sink, realized.output.as_ref())?;

        realized.pipeline.start();

        let RealizedPipeline {
            pipeline,
            output,
            format,
            ..
        } = realized;
        Ok(SessionState {
            pipeline,
            sink,
            output,
            format,
            quality,
        })
    }

    /// Stop and close the pipeline, then close the sink. No-op when nothing
    /// is running.
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        let Some(session) = inner.session.take() else {
            return;
        };
        session.shutdown();
        tracing::info!(destination = %self.destination, "transmission stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().session.is_some()
    }

    /// Whether the running transmission has ended on its own (end of
    /// source, pipeline failure).
    pub fn has_finished(&self) -> bool {
        self.inner.lock().session.as_ref().is_some_and(|session| {
            session.sink.is_finished() || session.pipeline.state().is_terminal()
        })
    }

    /// Format negotiated for the running transmission.
    pub fn negotiated_format(&self) -> Option<VideoFormat> {
        self.inner
            .lock()
            .session
            .as_ref()
            .map(|session| session.format.clone())
    }

    /// Quality set on the running transmission's encoder.
    pub fn applied_quality(&self) -> Option<f32> {
        self.inner
            .lock()
            .session
            .as_ref()
            .and_then(SessionState::quality)
    }

    pub fn requested_quality(&self) -> Quality {
        self.quality
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Cancel state waits of an in-flight `start()`, which then fails.
    ///
    /// The cancel also covers waits the `start()` has not reached yet; the
    /// next `start()` clears it. Does not take the controller lock. Returns
    /// the number of waits that were blocked at the time.
    pub fn interrupt(&self) -> usize {
        self.sync.interrupt_all()
    }
}

impl<B: MediaBackend> Drop for SessionController<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
