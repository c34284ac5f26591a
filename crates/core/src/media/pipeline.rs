//! Collaborator interfaces of a media pipeline.
//!
//! A [`Pipeline`] advances through its states asynchronously: the
//! `configure()`/`realize()`/`start()` requests return immediately and the
//! pipeline reports progress later, from its own worker thread, through the
//! registered [`StateListener`]s.
//!
//! ```text
//! Unconfigured -> Configuring -> Configured -> Realizing -> Realized -> Started
//!        \______________________________________________________________/
//!                                     |
//!                              Closed / Failed   (terminal)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::format::{ContentType, TrackDescriptor, VideoFormat};
use crate::error::BackendError;
use crate::locator::MediaLocator;

/// Pipeline lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Unconfigured,
    Configuring,
    Configured,
    Realizing,
    Realized,
    Started,
    /// Closed by request or after an error. Terminal.
    Closed,
    /// Failed while advancing. Terminal.
    Failed,
}

impl PipelineState {
    /// Position in the forward progression, `None` for terminal states.
    fn progress(self) -> Option<u8> {
        match self {
            Self::Unconfigured => Some(0),
            Self::Configuring => Some(1),
            Self::Configured => Some(2),
            Self::Realizing => Some(3),
            Self::Realized => Some(4),
            Self::Started => Some(5),
            Self::Closed | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.progress().is_none()
    }

    /// Whether this state is at or beyond `target` in the forward progression.
    ///
    /// Terminal states never count as having reached anything.
    pub fn has_reached(self, target: PipelineState) -> bool {
        match (self.progress(), target.progress()) {
            (Some(current), Some(target)) => current >= target,
            _ => false,
        }
    }

    /// Whether moving from `self` to `next` respects the "no regression" rule.
    pub fn can_advance_to(self, next: PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.is_terminal() || next.has_reached(self)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconfigured => "Unconfigured",
            Self::Configuring => "Configuring",
            Self::Configured => "Configured",
            Self::Realizing => "Realizing",
            Self::Realized => "Realized",
            Self::Started => "Started",
            Self::Closed => "Closed",
            Self::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// Notification delivered to listeners from the pipeline's worker thread.
///
/// A pipeline must publish its new [`state`](Pipeline::state) before
/// dispatching the matching event.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Transition {
        from: PipelineState,
        to: PipelineState,
    },
    /// Output was stopped; the state is unchanged.
    Stopped,
    /// The pipeline was closed.
    Closed,
    /// The pipeline failed and is now in [`PipelineState::Failed`].
    Error { reason: String },
}

impl PipelineEvent {
    /// Close and error events end any pending state wait.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Closed | Self::Error { .. })
    }
}

/// Callback invoked for every [`PipelineEvent`].
pub type StateListener = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Handle returned by [`Pipeline::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Tunable 0..1 encoder fidelity/size trade-off.
pub trait QualityControl: Send + Sync {
    fn quality(&self) -> f32;

    /// Set the quality and return the value actually in effect.
    fn set_quality(&self, value: f32) -> f32;
}

/// A codec stage inside a pipeline.
pub trait EncodingUnit: Send + Sync {
    fn name(&self) -> &str;

    fn supported_output_formats(&self) -> Vec<super::format::Codec>;

    /// The unit's quality control, if it has one.
    fn quality_control(&self) -> Option<Arc<dyn QualityControl>>;
}

/// One encoded image leaving the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    pub index: u64,
    pub data: Vec<u8>,
}

/// Result of polling a [`DataOutput`].
#[derive(Debug)]
pub enum FramePoll {
    Frame(EncodedFrame),
    /// Nothing available within the timeout.
    Pending,
    /// The output is stopped or exhausted.
    Ended,
}

/// Data-output handle of a realized pipeline, consumed by a transport sink.
pub trait DataOutput: Send + Sync {
    fn content_type(&self) -> ContentType;

    fn format(&self) -> VideoFormat;

    fn start(&self) -> Result<(), BackendError>;

    fn stop(&self);

    /// Wait up to `timeout` for the next frame.
    fn poll_frame(&self, timeout: Duration) -> FramePoll;
}

/// Stateful media-processing unit.
///
/// All methods take `&self`; implementations use interior mutability and are
/// driven from both the controller thread and their own worker thread.
pub trait Pipeline: Send + Sync {
    fn state(&self) -> PipelineState;

    /// Request the Configured state. Completion is reported asynchronously.
    fn configure(&self);

    /// Request the Realized state. Completion is reported asynchronously.
    fn realize(&self);

    fn start(&self);

    fn stop(&self);

    /// Release every resource. Idempotent.
    fn close(&self);

    /// Tracks in source order. Empty before the pipeline is Configured.
    fn tracks(&self) -> Vec<TrackDescriptor>;

    fn set_track_enabled(&self, index: usize, enabled: bool) -> Result<(), BackendError>;

    fn set_track_format(&self, index: usize, format: VideoFormat) -> Result<(), BackendError>;

    fn set_content_type(&self, content_type: ContentType) -> Result<(), BackendError>;

    fn add_listener(&self, listener: StateListener) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);

    fn encoding_units(&self) -> Vec<Arc<dyn EncodingUnit>>;

    /// Output handle, available once Realized.
    fn data_output(&self) -> Option<Arc<dyn DataOutput>>;
}

/// Where the frames to transmit come from.
pub enum MediaSource {
    /// Resolved through [`MediaBackend::create_input`](super::MediaBackend::create_input).
    Locator(MediaLocator),
    /// An already-built pipeline, used as-is.
    Pipeline(Box<dyn Pipeline>),
}

impl fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locator(locator) => f.debug_tuple("Locator").field(locator).finish(),
            Self::Pipeline(pipeline) => f
                .debug_tuple("Pipeline")
                .field(&pipeline.state())
                .finish(),
        }
    }
}
