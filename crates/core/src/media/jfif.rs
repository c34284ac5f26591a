//! Minimal JPEG (JFIF) marker walker.
//!
//! Extracts what RTP packetization and source probing need from a
//! baseline JPEG image: frame size, component sampling, quantization
//! tables, restart interval and the entropy-coded scan. Nothing is decoded.
//!
//! ```text
//! FFD8            SOI
//! FFDB len ...    DQT   quantization tables (zigzag order)
//! FFC0 len ...    SOF0  precision, height, width, components
//! FFDD len ...    DRI   restart interval (optional)
//! FFDA len ...    SOS   scan header, followed by entropy-coded data
//! ...             scan  (0xFF bytes stuffed as FF00, RSTn markers inline)
//! FFD9            EOI
//! ```

use crate::error::{JfifError, JfifErrorKind};

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const DQT: u8 = 0xDB;
const DRI: u8 = 0xDD;
const SOF0: u8 = 0xC0;
const SOF1: u8 = 0xC1;
const DHT: u8 = 0xC4;
const JPG: u8 = 0xC8;
const DAC: u8 = 0xCC;

/// One colour component from the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub id: u8,
    /// Horizontal sampling factor.
    pub h: u8,
    /// Vertical sampling factor.
    pub v: u8,
    /// Quantization table selector.
    pub tq: u8,
}

/// A quantization table as stored in the DQT segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTable {
    pub id: u8,
    /// 16-bit entries (128 bytes) instead of 8-bit (64 bytes).
    pub wide: bool,
    pub values: Vec<u8>,
}

/// Parsed view of a single JPEG image.
#[derive(Debug, Clone)]
pub struct JpegFrame<'a> {
    pub width: u16,
    pub height: u16,
    pub components: Vec<Component>,
    pub quant_tables: Vec<QuantTable>,
    pub restart_interval: u16,
    /// Entropy-coded data between the SOS header and EOI.
    pub scan: &'a [u8],
    /// Bytes from SOI through EOI inclusive.
    pub len: usize,
    /// Whether an EOI marker terminated the image.
    pub complete: bool,
}

impl JpegFrame<'_> {
    pub fn quant_table(&self, id: u8) -> Option<&QuantTable> {
        self.quant_tables.iter().find(|t| t.id == id)
    }
}

fn err(kind: JfifErrorKind, offset: usize) -> JfifError {
    JfifError { kind, offset }
}

fn be16(data: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([data[at], data[at + 1]])
}

/// Parse the JPEG image starting at `data[0]`.
pub fn parse(data: &[u8]) -> Result<JpegFrame<'_>, JfifError> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != SOI {
        return Err(err(JfifErrorKind::MissingSoi, 0));
    }

    let mut size: Option<(u16, u16)> = None;
    let mut components = Vec::new();
    let mut quant_tables: Vec<QuantTable> = Vec::new();
    let mut restart_interval = 0u16;
    let mut pos = 2;

    loop {
        if pos >= data.len() {
            return Err(err(JfifErrorKind::MissingScan, pos));
        }
        if data[pos] != 0xFF {
            return Err(err(JfifErrorKind::InvalidMarker, pos));
        }
        while pos < data.len() && data[pos] == 0xFF {
            pos += 1;
        }
        if pos >= data.len() {
            return Err(err(JfifErrorKind::Truncated, pos));
        }
        let marker = data[pos];
        pos += 1;

        match marker {
            SOI | 0x01 | 0xD0..=0xD7 => continue,
            EOI => return Err(err(JfifErrorKind::MissingScan, pos - 2)),
            _ => {}
        }

        if pos + 2 > data.len() {
            return Err(err(JfifErrorKind::Truncated, pos));
        }
        let seg_len = be16(data, pos) as usize;
        if seg_len < 2 || pos + seg_len > data.len() {
            return Err(err(JfifErrorKind::Truncated, pos));
        }
        let body = &data[pos + 2..pos + seg_len];

        match marker {
            DQT => parse_dqt(body, pos + 2, &mut quant_tables)?,
            SOF0 | SOF1 => {
                if body.len() < 6 {
                    return Err(err(JfifErrorKind::Truncated, pos));
                }
                let height = be16(body, 1);
                let width = be16(body, 3);
                let count = body[5] as usize;
                if body.len() < 6 + 3 * count {
                    return Err(err(JfifErrorKind::Truncated, pos));
                }
                components = body[6..6 + 3 * count]
                    .chunks_exact(3)
                    .map(|c| Component {
                        id: c[0],
                        h: c[1] >> 4,
                        v: c[1] & 0x0f,
                        tq: c[2],
                    })
                    .collect();
                size = Some((width, height));
            }
            0xC2..=0xCF if marker != DHT && marker != JPG && marker != DAC => {
                return Err(err(JfifErrorKind::UnsupportedFrame, pos - 2));
            }
            DRI => {
                if body.len() < 2 {
                    return Err(err(JfifErrorKind::Truncated, pos));
                }
                restart_interval = be16(body, 0);
            }
            SOS => {
                let (width, height) =
                    size.ok_or_else(|| err(JfifErrorKind::MissingFrameHeader, pos - 2))?;
                let scan_start = pos + seg_len;
                let (scan_end, complete) = find_eoi(data, scan_start);
                let len = if complete { scan_end + 2 } else { data.len() };
                return Ok(JpegFrame {
                    width,
                    height,
                    components,
                    quant_tables,
                    restart_interval,
                    scan: &data[scan_start..scan_end],
                    len,
                    complete,
                });
            }
            _ => {}
        }

        pos += seg_len;
    }
}

fn parse_dqt(body: &[u8], base: usize, tables: &mut Vec<QuantTable>) -> Result<(), JfifError> {
    let mut off = 0;
    while off < body.len() {
        let pq = body[off] >> 4;
        let id = body[off] & 0x0f;
        let size = if pq == 0 { 64 } else { 128 };
        if off + 1 + size > body.len() {
            return Err(err(JfifErrorKind::Truncated, base + off));
        }
        let table = QuantTable {
            id,
            wide: pq != 0,
            values: body[off + 1..off + 1 + size].to_vec(),
        };
        tables.retain(|t| t.id != id);
        tables.push(table);
        off += 1 + size;
    }
    Ok(())
}

/// Locate the EOI marker after `from`. Returns (scan end, found).
///
/// Inside entropy-coded data a literal 0xFF is always followed by 0x00 or
/// an RSTn marker, so the first `FF D9` is the end of the image.
fn find_eoi(data: &[u8], from: usize) -> (usize, bool) {
    let mut i = from;
    while i + 1 < data.len() {
        if data[i] == 0xFF && data[i + 1] == EOI {
            return (i, true);
        }
        i += 1;
    }
    (data.len(), false)
}

/// Split a concatenated MJPEG stream into individual JPEG images.
///
/// Bytes between images are skipped. A trailing image without EOI is
/// dropped.
pub fn split_frames(data: &[u8]) -> Result<Vec<&[u8]>, JfifError> {
    let mut frames = Vec::new();
    let mut pos = 0;

    while let Some(start) = find_soi(data, pos) {
        let frame = parse(&data[start..]).map_err(|e| JfifError {
            kind: e.kind,
            offset: start + e.offset,
        })?;
        if !frame.complete {
            tracing::warn!(offset = start, "dropping incomplete trailing JPEG frame");
            break;
        }
        frames.push(&data[start..start + frame.len]);
        pos = start + frame.len;
    }

    Ok(frames)
}

fn find_soi(data: &[u8], from: usize) -> Option<usize> {
    (from..data.len().saturating_sub(1)).find(|&i| data[i] == 0xFF && data[i + 1] == SOI)
}
