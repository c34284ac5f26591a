//! Outbound media transport.
//!
//! - **UDP** ([`udp`]): one ephemeral socket per destination carrying RTP
//!   packets.
//! - **RTP sink** ([`rtp_sink`]): the [`TransportSink`](crate::media::TransportSink)
//!   that pulls frames from a pipeline's data output, packetizes them and
//!   hands the packets to the UDP transport.

pub mod rtp_sink;
pub mod udp;

pub use rtp_sink::{RtpSink, RtpSinkConfig, SinkStats};
pub use udp::UdpTransport;
