//! JPEG RTP packetizer (RFC 2435).
//!
//! Each JPEG frame maps to one or more RTP packets sharing one timestamp.
//! Only the entropy-coded scan is transmitted; the receiver rebuilds the
//! JFIF headers from the per-packet JPEG header:
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! | Type-specific |              Fragment Offset                  |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Type     |       Q       |     Width     |     Height    |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! - **Type** 0 is 4:2:2, 1 is 4:2:0; +64 when a restart marker header
//!   follows (frame has a DRI segment).
//! - **Q** is always 255: quantization tables travel in-band, in a
//!   table header on the first packet of every frame (§3.1.8).
//! - **Width/Height** are in 8-pixel blocks, so at most 2040 px.
//!
//! Uses static payload type 26 (RFC 3551) on the 90 kHz video clock.

use super::Packetizer;
use super::jfif::{self, JpegFrame};
use super::rtp::RtpHeader;
use crate::error::BackendError;

/// Static RTP payload type for JPEG (RFC 3551 §6).
pub const JPEG_PAYLOAD_TYPE: u8 = 26;

pub const DEFAULT_MTU: usize = 1400;

const MAIN_HEADER_LEN: usize = 8;
const RESTART_HEADER_LEN: usize = 4;
const QTABLE_HEADER_LEN: usize = 4;
const DYNAMIC_Q: u8 = 255;
const MAX_DIMENSION: u16 = 2040;
const MAX_FRAGMENT_OFFSET: usize = 1 << 24;

/// RFC 2435 packetizer.
#[derive(Debug)]
pub struct JpegPacketizer {
    header: RtpHeader,
    mtu: usize,
}

/// What the RTP JPEG header says about a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FrameLayout {
    rtp_type: u8,
    width_blocks: u8,
    height_blocks: u8,
    restart_interval: u16,
    tables: Vec<u8>,
    wide_mask: u8,
}

impl JpegPacketizer {
    pub fn new(pt: u8, ssrc: u32) -> Self {
        Self {
            header: RtpHeader::new(pt, ssrc),
            mtu: DEFAULT_MTU,
        }
    }

    pub fn with_random_ssrc(pt: u8) -> Self {
        Self {
            header: RtpHeader::with_random_ssrc(pt),
            mtu: DEFAULT_MTU,
        }
    }

    /// Maximum RTP payload size (bytes after the 12-byte RTP header).
    pub fn with_mtu(mut self, mtu: usize) -> Self {
        self.mtu = mtu;
        self
    }

    pub fn ssrc(&self) -> u32 {
        self.header.ssrc
    }

    fn layout(frame: &JpegFrame<'_>) -> Result<FrameLayout, BackendError> {
        let unsupported = |what: &str| BackendError::Unsupported(format!("RFC 2435: {what}"));

        if frame.components.len() != 3 {
            return Err(unsupported("frame must have exactly 3 components"));
        }
        let [luma, cb, cr] = [frame.components[0], frame.components[1], frame.components[2]];
        if (cb.h, cb.v) != (1, 1) || (cr.h, cr.v) != (1, 1) {
            return Err(unsupported("chroma must not be subsampled in the header"));
        }
        let base_type = match (luma.h, luma.v) {
            (2, 1) => 0,
            (2, 2) => 1,
            _ => return Err(unsupported("only 4:2:2 and 4:2:0 sampling")),
        };
        if frame.width == 0
            || frame.height == 0
            || frame.width > MAX_DIMENSION
            || frame.height > MAX_DIMENSION
        {
            return Err(unsupported("frame size out of range"));
        }

        let mut tables = Vec::with_capacity(128);
        let mut wide_mask = 0u8;
        for (slot, tq) in [luma.tq, cb.tq].into_iter().enumerate() {
            let table = frame
                .quant_table(tq)
                .ok_or_else(|| unsupported("missing quantization table"))?;
            if table.wide {
                wide_mask |= 1 << slot;
            }
            tables.extend_from_slice(&table.values);
        }

        let restart = frame.restart_interval > 0;
        Ok(FrameLayout {
            rtp_type: if restart { base_type + 64 } else { base_type },
            width_blocks: (frame.width / 8) as u8,
            height_blocks: (frame.height / 8) as u8,
            restart_interval: frame.restart_interval,
            tables,
            wide_mask,
        })
    }

    /// Packetize one JPEG image, or explain why it cannot be sent.
    pub fn packetize_frame(
        &mut self,
        jpeg: &[u8],
        timestamp_increment: u32,
    ) -> Result<Vec<Vec<u8>>, BackendError> {
        let frame = jfif::parse(jpeg)?;
        let layout = Self::layout(&frame)?;
        let scan = frame.scan;
        if scan.len() >= MAX_FRAGMENT_OFFSET {
            return Err(BackendError::Unsupported("scan exceeds 24-bit offset".into()));
        }

        let restart_len = if layout.restart_interval > 0 {
            RESTART_HEADER_LEN
        } else {
            0
        };
        let first_overhead =
            MAIN_HEADER_LEN + restart_len + QTABLE_HEADER_LEN + layout.tables.len();
        if self.mtu <= first_overhead {
            return Err(BackendError::Unsupported(format!(
                "MTU {} too small for JPEG headers",
                self.mtu
            )));
        }

        let mut packets = Vec::new();
        let mut offset = 0usize;
        loop {
            let first = offset == 0;
            let overhead = if first {
                first_overhead
            } else {
                MAIN_HEADER_LEN + restart_len
            };
            let chunk = std::cmp::min(self.mtu - overhead, scan.len() - offset);
            let last = offset + chunk == scan.len();

            let mut packet = Vec::with_capacity(12 + overhead + chunk);
            packet.extend_from_slice(&self.header.write(last));
            packet.push(0);
            packet.extend_from_slice(&(offset as u32).to_be_bytes()[1..]);
            packet.extend_from_slice(&[
                layout.rtp_type,
                DYNAMIC_Q,
                layout.width_blocks,
                layout.height_blocks,
            ]);
            if restart_len > 0 {
                packet.extend_from_slice(&layout.restart_interval.to_be_bytes());
                // F=1, L=1, count=0x3FFF: fragments are not aligned to intervals.
                packet.extend_from_slice(&[0xFF, 0xFF]);
            }
            if first {
                packet.push(0);
                packet.push(layout.wide_mask);
                packet.extend_from_slice(&(layout.tables.len() as u16).to_be_bytes());
                packet.extend_from_slice(&layout.tables);
            }
            packet.extend_from_slice(&scan[offset..offset + chunk]);
            packets.push(packet);

            offset += chunk;
            if last {
                break;
            }
        }

        tracing::trace!(
            width = frame.width,
            height = frame.height,
            scan_len = scan.len(),
            packets = packets.len(),
            "packetized JPEG frame"
        );

        self.header.advance_timestamp(timestamp_increment);
        Ok(packets)
    }
}

impl Packetizer for JpegPacketizer {
    fn packetize(&mut self, encoded_data: &[u8], timestamp_increment: u32) -> Vec<Vec<u8>> {
        match self.packetize_frame(encoded_data, timestamp_increment) {
            Ok(packets) => packets,
            Err(e) => {
                tracing::warn!(error = %e, "dropping JPEG frame");
                self.header.advance_timestamp(timestamp_increment);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::jfif::tests::synthetic_jpeg;

    fn packetizer() -> JpegPacketizer {
        JpegPacketizer::new(JPEG_PAYLOAD_TYPE, 0x1234_5678)
    }

    fn timestamp_of(packet: &[u8]) -> u32 {
        u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]])
    }

    fn offset_of(packet: &[u8]) -> usize {
        u32::from_be_bytes([0, packet[13], packet[14], packet[15]]) as usize
    }

    #[test]
    fn single_packet_frame() {
        let mut p = packetizer();
        let jpeg = synthetic_jpeg(640, 480, 0x22, 0);
        let packets = p.packetize_frame(&jpeg, 3600).unwrap();
        assert_eq!(packets.len(), 1);

        let pkt = &packets[0];
        assert_eq!(pkt[1], 0x80 | JPEG_PAYLOAD_TYPE);
        assert_eq!(pkt[12], 0); // type-specific
        assert_eq!(offset_of(pkt), 0);
        assert_eq!(&pkt[16..20], &[1, 255, 80, 60]);
        // quantization table header: MBZ, precision, length=128
        assert_eq!(&pkt[20..24], &[0, 0, 0, 128]);
        assert_eq!(pkt[24], 1);
        assert_eq!(pkt[24 + 64], 65);
        assert_eq!(
            &pkt[24 + 128..],
            &[0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0x56]
        );
    }

    #[test]
    fn height_is_floored_to_blocks() {
        let mut p = packetizer();
        let packets = p
            .packetize_frame(&synthetic_jpeg(640, 481, 0x21, 0), 3600)
            .unwrap();
        assert_eq!(&packets[0][16..20], &[0, 255, 80, 60]);
    }

    #[test]
    fn fragments_scan_over_mtu() {
        let mut p = packetizer().with_mtu(8 + 4 + 128 + 3);
        let jpeg = synthetic_jpeg(64, 64, 0x22, 0);
        let packets = p.packetize_frame(&jpeg, 3600).unwrap();
        // scan is 7 bytes: 3 in the first packet, then up to 135 per packet
        assert_eq!(packets.len(), 2);
        assert_eq!(offset_of(&packets[0]), 0);
        assert_eq!(offset_of(&packets[1]), 3);
        assert_eq!(packets[0][1] & 0x80, 0);
        assert_eq!(packets[1][1] & 0x80, 0x80);
        // no table header after the first packet
        assert_eq!(packets[1].len(), 12 + 8 + 4);

        let ts0 = &packets[0][4..8];
        let ts1 = &packets[1][4..8];
        assert_eq!(ts0, ts1);
    }

    #[test]
    fn restart_marker_header() {
        let mut p = packetizer();
        let packets = p
            .packetize_frame(&synthetic_jpeg(64, 64, 0x22, 4), 3600)
            .unwrap();
        let pkt = &packets[0];
        assert_eq!(pkt[16], 65);
        assert_eq!(&pkt[20..24], &[0, 4, 0xFF, 0xFF]);
        assert_eq!(&pkt[24..28], &[0, 0, 0, 128]);
    }

    #[test]
    fn timestamp_advances_per_frame() {
        let mut p = packetizer();
        let jpeg = synthetic_jpeg(64, 64, 0x22, 0);
        let first = p.packetize(&jpeg, 3600);
        let second = p.packetize(&jpeg, 3600);
        assert_eq!(timestamp_of(&first[0]), 0);
        assert_eq!(timestamp_of(&second[0]), 3600);
    }

    #[test]
    fn rejects_unsupported_sampling() {
        let mut p = packetizer();
        let jpeg = synthetic_jpeg(64, 64, 0x11, 0);
        assert!(p.packetize_frame(&jpeg, 3600).is_err());
        assert!(p.packetize(&jpeg, 3600).is_empty());
        // dropped frames still move the clock
        let next = p.packetize(&synthetic_jpeg(64, 64, 0x22, 0), 3600);
        assert_eq!(timestamp_of(&next[0]), 3600);
    }

    #[test]
    fn rejects_oversized_frames() {
        let mut p = packetizer();
        let jpeg = synthetic_jpeg(4096, 64, 0x22, 0);
        assert!(p.packetize_frame(&jpeg, 3600).is_err());
    }

    #[test]
    fn rejects_tiny_mtu() {
        let mut p = packetizer().with_mtu(64);
        let jpeg = synthetic_jpeg(64, 64, 0x22, 0);
        assert!(p.packetize_frame(&jpeg, 3600).is_err());
    }
}
