//! Transmission settings.

use crate::locator::DEFAULT_STREAM_NAME;
use crate::media::mjpeg::{DEFAULT_MTU, JPEG_PAYLOAD_TYPE};
use crate::transport::RtpSinkConfig;

/// Default JPEG quality in percent.
pub const DEFAULT_QUALITY_PERCENT: f32 = 50.0;

/// Default frame rate for sources that do not carry one.
pub const DEFAULT_FRAME_RATE: f32 = 25.0;

/// Controller-level configuration.
#[derive(Debug, Clone)]
pub struct TransmitConfig {
    /// Stream name in the `rtp://host:port/<name>` destination.
    pub stream_name: String,
    /// JPEG quality in percent (0–100), applied as `percent / 100`.
    pub quality_percent: f32,
}

impl Default for TransmitConfig {
    fn default() -> Self {
        Self {
            stream_name: DEFAULT_STREAM_NAME.to_string(),
            quality_percent: DEFAULT_QUALITY_PERCENT,
        }
    }
}

/// Settings of the file-backed MJPEG backend.
#[derive(Debug, Clone)]
pub struct MjpegConfig {
    /// Frame rate reported for the source track and used for pacing.
    pub frame_rate: f32,
    /// Restart from the first frame instead of ending at end of file.
    pub loop_playback: bool,
    /// Maximum RTP payload size of the sinks it creates.
    pub mtu: usize,
    /// RTP payload type of the sinks it creates.
    pub payload_type: u8,
}

impl Default for MjpegConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            loop_playback: false,
            mtu: DEFAULT_MTU,
            payload_type: JPEG_PAYLOAD_TYPE,
        }
    }
}

impl MjpegConfig {
    pub fn sink_config(&self) -> RtpSinkConfig {
        RtpSinkConfig {
            payload_type: self.payload_type,
            mtu: self.mtu,
        }
    }
}
