//! Integration test: MJPEG file -> SessionController -> RTP/UDP.
//!
//! Writes a synthetic MJPEG clip, transmits it through the file backend and
//! the RTP sink to a local UDP socket, and checks the RFC 2435 headers of
//! what arrives.

use std::io::{self, Write};
use std::net::UdpSocket;
use std::thread;
use std::time::{Duration, Instant};

use vidcast::media::format::Codec;
use vidcast::{
    BackendError, Destination, MediaLocator, MjpegConfig, MjpegFileBackend, SessionController,
    TransmitConfig, TransmitError,
};

/// Baseline 4:2:0 JPEG with two 8-bit quantization tables and a fake scan.
fn synthetic_jpeg(width: u16, height: u16) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    for id in 0..2u8 {
        out.extend_from_slice(&[0xFF, 0xDB, 0x00, 0x43, id]);
        out.extend((1..=64u8).map(|v| v.wrapping_add(id * 64)));
    }
    out.extend_from_slice(&[0xFF, 0xC0, 0x00, 0x11, 0x08]);
    out.extend_from_slice(&height.to_be_bytes());
    out.extend_from_slice(&width.to_be_bytes());
    out.extend_from_slice(&[3, 1, 0x22, 0, 2, 0x11, 1, 3, 0x11, 1]);
    out.extend_from_slice(&[0xFF, 0xDA, 0x00, 0x0C, 3, 1, 0x00, 2, 0x11, 3, 0x11, 0, 0x3F, 0]);
    out.extend_from_slice(&[0x12, 0xFF, 0x00, 0x34, 0x56]);
    out.extend_from_slice(&[0xFF, 0xD9]);
    out
}

fn clip(frames: usize) -> tempfile::NamedTempFile {
    clip_sized(frames, 640, 481)
}

fn clip_sized(frames: usize, width: u16, height: u16) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".mjpeg").tempfile().unwrap();
    for _ in 0..frames {
        file.write_all(&synthetic_jpeg(width, height)).unwrap();
    }
    file.flush().unwrap();
    file
}

fn receiver() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

fn controller(
    file: &tempfile::NamedTempFile,
    port: u16,
    loop_playback: bool,
) -> SessionController<MjpegFileBackend> {
    let backend = MjpegFileBackend::new(MjpegConfig {
        frame_rate: 50.0,
        loop_playback,
        ..MjpegConfig::default()
    });
    SessionController::from_locator(
        backend,
        MediaLocator::new(format!("file://{}", file.path().display())),
        Destination::new("127.0.0.1", port),
        TransmitConfig {
            quality_percent: 75.0,
            ..TransmitConfig::default()
        },
    )
}

#[test]
fn streams_mjpeg_file_as_rfc2435() {
    let file = clip(3);
    let (socket, port) = receiver();
    let controller = controller(&file, port, false);

    controller.start().unwrap();
    assert!(controller.is_running());

    let format = controller.negotiated_format().unwrap();
    assert_eq!(format.codec, Codec::JpegRtp);
    assert_eq!((format.width, format.height), (640, 480));
    assert_eq!(format.frame_rate, 50.0);
    // Pre-encoded frames expose no quality control.
    assert_eq!(controller.applied_quality(), None);
    assert_eq!(
        controller.destination().locator().as_str(),
        format!("rtp://127.0.0.1:{port}/video")
    );

    let mut buf = [0u8; 2048];
    let mut timestamps = Vec::new();
    let mut sequences = Vec::new();
    for _ in 0..3 {
        let (n, _) = socket.recv_from(&mut buf).unwrap();
        let packet = &buf[..n];

        assert_eq!(packet[0] >> 6, 2, "RTP version");
        assert_eq!(packet[1] & 0x7F, 26, "payload type");
        assert_ne!(packet[1] & 0x80, 0, "single-packet frame carries the marker");
        sequences.push(u16::from_be_bytes([packet[2], packet[3]]));
        timestamps.push(u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]));

        // Main JPEG header: offset 0, type 1 (4:2:0), Q 255, 80x60 blocks.
        assert_eq!(&packet[12..16], &[0, 0, 0, 0]);
        assert_eq!(&packet[16..20], &[1, 255, 80, 60]);
        // Quantization table header: two 64-byte tables.
        assert_eq!(&packet[20..24], &[0, 0, 0, 128]);
        assert_eq!(&packet[24..26], &[1, 2]);
        assert_eq!(&packet[24 + 128..], &[0x12, 0xFF, 0x00, 0x34, 0x56]);
    }
    assert_eq!(sequences[1], sequences[0].wrapping_add(1));
    assert_eq!(sequences[2], sequences[0].wrapping_add(2));
    assert_eq!(timestamps[1].wrapping_sub(timestamps[0]), 1800);
    assert_eq!(timestamps[2].wrapping_sub(timestamps[1]), 1800);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !controller.has_finished() {
        assert!(Instant::now() < deadline, "source never ended");
        thread::sleep(Duration::from_millis(10));
    }

    controller.stop();
    assert!(!controller.is_running());
    controller.stop();
}

#[test]
fn stop_halts_transmission() {
    let file = clip(2);
    let (socket, port) = receiver();
    let controller = controller(&file, port, true);

    controller.start().unwrap();
    let mut buf = [0u8; 2048];
    for _ in 0..4 {
        socket.recv_from(&mut buf).unwrap();
    }
    assert!(!controller.has_finished());

    controller.stop();
    assert!(!controller.is_running());

    // Drain what was already in flight; then the socket stays silent.
    socket
        .set_read_timeout(Some(Duration::from_millis(200)))
        .unwrap();
    loop {
        match socket.recv_from(&mut buf) {
            Ok(_) => continue,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                break;
            }
            Err(e) => panic!("unexpected receive error: {e}"),
        }
    }
}

#[test]
fn restart_after_stop_streams_again() {
    let file = clip(2);
    let (socket, port) = receiver();
    let controller = controller(&file, port, true);
    let mut buf = [0u8; 2048];

    controller.start().unwrap();
    socket.recv_from(&mut buf).unwrap();
    controller.stop();

    controller.start().unwrap();
    let (n, _) = socket.recv_from(&mut buf).unwrap();
    assert_eq!(buf[1] & 0x7F, 26);
    assert!(n > 24);
    controller.stop();
}

#[test]
fn missing_file_is_source_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let controller = SessionController::from_locator(
        MjpegFileBackend::default(),
        MediaLocator::new(dir.path().join("absent.mjpeg").display().to_string()),
        Destination::new("127.0.0.1", 5004),
        TransmitConfig::default(),
    );

    assert!(matches!(
        controller.start(),
        Err(TransmitError::SourceUnavailable(_))
    ));
    assert!(!controller.is_running());
}

#[test]
fn unreadable_source_reports_io_inside_source_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let controller = SessionController::from_locator(
        MjpegFileBackend::default(),
        MediaLocator::new(format!("file://{}", dir.path().display())),
        Destination::new("127.0.0.1", 5004),
        TransmitConfig::default(),
    );

    assert!(matches!(
        controller.start(),
        Err(TransmitError::SourceUnavailable(BackendError::Io(_)))
    ));
    assert!(!controller.is_running());
}

#[test]
fn unresolvable_destination_is_bind_failure() {
    let file = clip(1);
    let controller = SessionController::from_locator(
        MjpegFileBackend::default(),
        MediaLocator::new(format!("file://{}", file.path().display())),
        Destination::new("host.invalid", 5004),
        TransmitConfig::default(),
    );

    assert!(matches!(
        controller.start(),
        Err(TransmitError::TransportBindFailed(_))
    ));
    assert!(!controller.is_running());
}

#[test]
fn width_off_the_block_grid_is_unsupported_input() {
    let file = clip_sized(1, 641, 480);
    let controller = SessionController::from_locator(
        MjpegFileBackend::default(),
        MediaLocator::new(format!("file:{}", file.path().display())),
        Destination::new("127.0.0.1", 5004),
        TransmitConfig::default(),
    );

    assert!(matches!(
        controller.start(),
        Err(TransmitError::UnsupportedInput(_))
    ));
    assert!(!controller.is_running());
}
