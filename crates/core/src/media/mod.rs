//! Media model and RTP packetization.
//!
//! This module holds the interfaces the controller drives ([`Pipeline`],
//! [`DataOutput`], [`EncodingUnit`], [`TransportSink`], [`MediaBackend`]),
//! the format types negotiated over them, and the JPEG/RTP wire layer.
//!
//! ## RTP overview (RFC 3550)
//!
//! Each encoded video frame is split into one or more RTP packets.
//! Every RTP packet carries a 12-byte fixed header ([`rtp::RtpHeader`])
//! containing:
//!
//! - **Sequence number** (16-bit, wrapping): for reordering and loss detection.
//! - **Timestamp** (32-bit): 90 kHz media clock, shared by a frame's packets.
//! - **SSRC** (32-bit): randomly chosen to identify the sender.
//! - **Marker bit**: set on the last packet of a frame.
//!
//! ## Supported codecs
//!
//! | Codec | Module | RFC |
//! |-------|--------|-----|
//! | JPEG  | [`mjpeg`] | [RFC 2435](https://tools.ietf.org/html/rfc2435) |

pub mod backend;
pub mod format;
pub mod jfif;
pub mod mjpeg;
pub mod pipeline;
pub mod rtp;

pub use backend::{MediaBackend, SinkState, TransportSink};
pub use format::{
    AudioFormat, Codec, ContentType, TrackDescriptor, TrackFormat, TrackKind, VideoFormat,
};
pub use pipeline::{
    DataOutput, EncodedFrame, EncodingUnit, FramePoll, ListenerId, MediaSource, Pipeline,
    PipelineEvent, PipelineState, QualityControl, StateListener,
};

/// Codec-specific RTP packetizer.
///
/// The generic RTP header is handled by [`rtp::RtpHeader`]; packetizers
/// compose it rather than reimplementing header serialization.
pub trait Packetizer: Send {
    /// Packetize one encoded frame into complete RTP packets.
    ///
    /// `timestamp_increment` advances the RTP timestamp after this frame,
    /// typically `clock_rate / fps` (e.g. 3600 for 25 fps at 90 kHz).
    /// Frames that cannot be packetized yield no packets.
    fn packetize(&mut self, encoded_data: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>>;
}
