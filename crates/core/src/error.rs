//! Error types for the transmission controller.

use std::fmt;

/// Errors returned by [`SessionController::start`](crate::SessionController::start)
/// and the steps it is built from.
///
/// Variants map to the step that failed:
///
/// - **Source**: [`InvalidInput`](Self::InvalidInput),
///   [`SourceUnavailable`](Self::SourceUnavailable),
///   [`UnsupportedInput`](Self::UnsupportedInput).
/// - **Negotiation**: [`ConfigurationFailed`](Self::ConfigurationFailed),
///   [`NoTracks`](Self::NoTracks), [`NoVideoTrack`](Self::NoVideoTrack),
///   [`FormatRejected`](Self::FormatRejected),
///   [`RealizationFailed`](Self::RealizationFailed).
/// - **Transport**: [`TransportBindFailed`](Self::TransportBindFailed).
/// - **Controller**: [`AlreadyRunning`](Self::AlreadyRunning).
#[derive(Debug, thiserror::Error)]
pub enum TransmitError {
    /// No usable source was supplied (missing, empty, or already consumed).
    #[error("input is null: {0}")]
    InvalidInput(String),

    /// The locator could not be turned into an input handle.
    #[error("couldn't create input: {0}")]
    SourceUnavailable(#[source] BackendError),

    /// The backend has no pipeline able to handle the input.
    #[error("couldn't create pipeline: {0}")]
    UnsupportedInput(#[source] BackendError),

    /// The pipeline never reached the Configured state.
    #[error("couldn't configure pipeline")]
    ConfigurationFailed,

    /// The configured pipeline exposes no tracks at all.
    #[error("couldn't find tracks in pipeline")]
    NoTracks,

    /// None of the tracks is an enabled video track.
    #[error("couldn't find video track")]
    NoVideoTrack,

    /// The selected track cannot carry the JPEG/RTP target format.
    #[error("couldn't program video track: {0}")]
    FormatRejected(String),

    /// The pipeline never reached the Realized state or exposed no output.
    #[error("couldn't realize pipeline: {0}")]
    RealizationFailed(String),

    /// Creating, opening or starting the transport sink failed.
    #[error("couldn't create RTP data sink: {0}")]
    TransportBindFailed(#[source] BackendError),

    /// [`SessionController::start`](crate::SessionController::start) was
    /// called while a transmission is already running.
    #[error("transmission already running")]
    AlreadyRunning,
}

/// Failure reported by a media backend, pipeline, output or sink.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The locator or destination names something that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The input or requested format is not handled by this backend.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The operation is not valid in the component's current state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Why a JPEG byte stream could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JfifErrorKind {
    /// Data does not start with an SOI marker.
    MissingSoi,
    /// A segment length runs past the end of the data.
    Truncated,
    /// A marker byte was expected but something else was found.
    InvalidMarker,
    /// Frame type is not baseline/extended sequential DCT.
    UnsupportedFrame,
    /// No SOF segment before the scan.
    MissingFrameHeader,
    /// No SOS segment found.
    MissingScan,
}

impl fmt::Display for JfifErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSoi => write!(f, "missing SOI marker"),
            Self::Truncated => write!(f, "truncated segment"),
            Self::InvalidMarker => write!(f, "invalid marker"),
            Self::UnsupportedFrame => write!(f, "unsupported frame type"),
            Self::MissingFrameHeader => write!(f, "missing frame header"),
            Self::MissingScan => write!(f, "missing scan"),
        }
    }
}

/// JPEG parse failure at a byte offset.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("JPEG parse error at offset {offset}: {kind}")]
pub struct JfifError {
    pub kind: JfifErrorKind,
    pub offset: usize,
}

impl From<JfifError> for BackendError {
    fn from(e: JfifError) -> Self {
        BackendError::Unsupported(e.to_string())
    }
}

/// Convenience alias for `Result<T, TransmitError>`.
pub type Result<T> = std::result::Result<T, TransmitError>;
