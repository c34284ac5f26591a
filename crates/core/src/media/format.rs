use std::fmt;

/// Size of a JPEG DCT block. RFC 2435 carries width/height in units of 8 px.
pub const BLOCK_SIZE: u32 = 8;

/// Encoding of a track or of an encoding unit's output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Codec {
    /// Uncompressed frames or samples.
    Raw,
    /// Plain JPEG images.
    Jpeg,
    /// JPEG packaged for RTP (RFC 2435).
    JpegRtp,
    H264,
    /// Linear PCM audio.
    Pcm,
    Other(String),
}

impl Codec {
    /// Whether this is JPEG, plain or RTP-packaged.
    pub fn is_jpeg(&self) -> bool {
        matches!(self, Codec::Jpeg | Codec::JpegRtp)
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Codec::Raw => write!(f, "RAW"),
            Codec::Jpeg => write!(f, "JPEG"),
            Codec::JpegRtp => write!(f, "JPEG/RTP"),
            Codec::H264 => write!(f, "H264"),
            Codec::Pcm => write!(f, "LINEAR"),
            Codec::Other(name) => write!(f, "{name}"),
        }
    }
}

/// Video format of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFormat {
    pub codec: Codec,
    pub width: u32,
    pub height: u32,
    /// Frames per second.
    pub frame_rate: f32,
}

impl VideoFormat {
    /// The JPEG/RTP format this source can be transmitted as.
    ///
    /// Width and height are floored to a multiple of [`BLOCK_SIZE`]; the
    /// frame rate is carried over unchanged.
    pub fn jpeg_rtp_target(&self) -> VideoFormat {
        VideoFormat {
            codec: Codec::JpegRtp,
            width: floor_to_block(self.width),
            height: floor_to_block(self.height),
            frame_rate: self.frame_rate,
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {}x{}, FrameRate={:.1}",
            self.codec, self.width, self.height, self.frame_rate
        )
    }
}

/// Audio format of a track.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFormat {
    pub codec: Codec,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Kind-specific format of a track.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackFormat {
    Video(VideoFormat),
    Audio(AudioFormat),
    /// Anything else (text, data), described by name only.
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Other,
}

/// One media stream exposed by a configured pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackDescriptor {
    pub enabled: bool,
    pub format: TrackFormat,
}

impl TrackDescriptor {
    pub fn video(format: VideoFormat) -> Self {
        Self {
            enabled: true,
            format: TrackFormat::Video(format),
        }
    }

    pub fn audio(format: AudioFormat) -> Self {
        Self {
            enabled: true,
            format: TrackFormat::Audio(format),
        }
    }

    pub fn kind(&self) -> TrackKind {
        match self.format {
            TrackFormat::Video(_) => TrackKind::Video,
            TrackFormat::Audio(_) => TrackKind::Audio,
            TrackFormat::Other(_) => TrackKind::Other,
        }
    }

    /// The video format, if this is a video track.
    pub fn video_format(&self) -> Option<&VideoFormat> {
        match &self.format {
            TrackFormat::Video(format) => Some(format),
            _ => None,
        }
    }
}

/// Output contract of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// Decoded/unpackaged media.
    Raw,
    /// Encoded frames ready for RTP packetization.
    RawRtp,
}

/// Floor a dimension to the nearest multiple of [`BLOCK_SIZE`] not above it.
///
/// ```
/// use vidcast::media::format::floor_to_block;
///
/// assert_eq!(floor_to_block(481), 480);
/// assert_eq!(floor_to_block(640), 640);
/// assert_eq!(floor_to_block(7), 0);
/// ```
pub fn floor_to_block(value: u32) -> u32 {
    value - value % BLOCK_SIZE
}
