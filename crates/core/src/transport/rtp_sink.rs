use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;

use super::udp::UdpTransport;
use crate::error::BackendError;
use crate::locator::{Destination, MediaLocator};
use crate::media::mjpeg::{DEFAULT_MTU, JPEG_PAYLOAD_TYPE, JpegPacketizer};
use crate::media::rtp::frame_increment;
use crate::media::{ContentType, DataOutput, FramePoll, Packetizer, SinkState, TransportSink};

/// How long the send loop waits for a frame before rechecking `running`.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Packetization settings of an [`RtpSink`].
#[derive(Debug, Clone)]
pub struct RtpSinkConfig {
    /// RTP payload type written into every packet.
    pub payload_type: u8,
    /// Maximum RTP payload size in bytes.
    pub mtu: usize,
}

impl Default for RtpSinkConfig {
    fn default() -> Self {
        Self {
            payload_type: JPEG_PAYLOAD_TYPE,
            mtu: DEFAULT_MTU,
        }
    }
}

/// Counters of an [`RtpSink`]'s send loop.
#[derive(Debug, Default)]
pub struct SinkStats {
    pub frames: AtomicU64,
    pub packets: AtomicU64,
    pub bytes: AtomicU64,
    pub send_errors: AtomicU64,
}

/// RTP/UDP transport sink for JPEG frames.
///
/// ```text
/// Unbound --open()--> Open --start()--> Started --close()--> Closed
/// ```
///
/// `open()` resolves the destination and binds a UDP socket; `start()`
/// spawns a send thread that polls the [`DataOutput`], packetizes each
/// frame per RFC 2435 and sends the packets. `close()` stops and joins
/// the thread.
pub struct RtpSink {
    locator: MediaLocator,
    destination: Destination,
    config: RtpSinkConfig,
    output: Arc<dyn DataOutput>,
    state: Mutex<SinkState>,
    transport: Mutex<Option<Arc<UdpTransport>>>,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<SinkStats>,
}

impl RtpSink {
    /// Create a sink bound to `locator` (`rtp://host:port/stream`).
    pub fn new(
        output: Arc<dyn DataOutput>,
        locator: &MediaLocator,
        config: RtpSinkConfig,
    ) -> Result<Self, BackendError> {
        let destination = Destination::parse(locator)?;
        if output.content_type() != ContentType::RawRtp {
            return Err(BackendError::Unsupported(
                "data output is not raw RTP content".into(),
            ));
        }

        Ok(Self {
            locator: locator.clone(),
            destination,
            config,
            output,
            state: Mutex::new(SinkState::Unbound),
            transport: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
            finished: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
            stats: Arc::new(SinkStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<SinkStats> {
        self.stats.clone()
    }
}

impl TransportSink for RtpSink {
    fn destination(&self) -> &MediaLocator {
        &self.locator
    }

    fn state(&self) -> SinkState {
        *self.state.lock()
    }

    fn open(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if *state != SinkState::Unbound {
            return Err(BackendError::InvalidState(format!("open() while {}", *state)));
        }

        let transport = UdpTransport::bind(&self.destination.socket_addr())?;
        tracing::info!(destination = %self.locator, peer = %transport.peer(), "RTP sink open");
        *self.transport.lock() = Some(Arc::new(transport));
        *state = SinkState::Open;
        Ok(())
    }

    fn start(&self) -> Result<(), BackendError> {
        let mut state = self.state.lock();
        if *state != SinkState::Open {
            return Err(BackendError::InvalidState(format!("start() while {}", *state)));
        }
        let transport = self
            .transport
            .lock()
            .clone()
            .ok_or_else(|| BackendError::InvalidState("no transport".into()))?;

        let packetizer = JpegPacketizer::with_random_ssrc(self.config.payload_type)
            .with_mtu(self.config.mtu);
        let increment = frame_increment(self.output.format().frame_rate);
        tracing::info!(
            destination = %self.locator,
            ssrc = format_args!("{:#010X}", packetizer.ssrc()),
            pt = self.config.payload_type,
            increment,
            "RTP sink started"
        );

        self.running.store(true, Ordering::SeqCst);
        let send_loop = SendLoop {
            output: self.output.clone(),
            transport,
            packetizer,
            increment,
            running: self.running.clone(),
            finished: self.finished.clone(),
            stats: self.stats.clone(),
        };
        let handle = thread::Builder::new()
            .name("rtp-sink".into())
            .spawn(move || send_loop.run())
            .inspect_err(|_| self.running.store(false, Ordering::SeqCst))?;

        *self.worker.lock() = Some(handle);
        *state = SinkState::Started;
        Ok(())
    }

    fn close(&self) {
        let mut state = self.state.lock();
        if *state == SinkState::Closed {
            return;
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!(destination = %self.locator, "RTP send thread panicked");
            }
        }
        self.transport.lock().take();
        *state = SinkState::Closed;

        tracing::info!(
            destination = %self.locator,
            frames = self.stats.frames.load(Ordering::Relaxed),
            packets = self.stats.packets.load(Ordering::Relaxed),
            bytes = self.stats.bytes.load(Ordering::Relaxed),
            "RTP sink closed"
        );
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Drop for RtpSink {
    fn drop(&mut self) {
        self.close();
    }
}

struct SendLoop {
    output: Arc<dyn DataOutput>,
    transport: Arc<UdpTransport>,
    packetizer: JpegPacketizer,
    increment: u32,
    running: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    stats: Arc<SinkStats>,
}

impl SendLoop {
    fn run(mut self) {
        while self.running.load(Ordering::SeqCst) {
            let frame = match self.output.poll_frame(POLL_INTERVAL) {
                FramePoll::Frame(frame) => frame,
                FramePoll::Pending => continue,
                FramePoll::Ended => {
                    tracing::info!("data output ended");
                    self.finished.store(true, Ordering::SeqCst);
                    break;
                }
            };

            let packets = self.packetizer.packetize(&frame.data, self.increment);
            if packets.is_empty() {
                continue;
            }
            for packet in &packets {
                match self.transport.send(packet) {
                    Ok(n) => {
                        self.stats.packets.fetch_add(1, Ordering::Relaxed);
                        self.stats.bytes.fetch_add(n as u64, Ordering::Relaxed);
                    }
                    Err(e) => {
                        self.stats.send_errors.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(error = %e, frame = frame.index, "RTP send failed");
                    }
                }
            }
            self.stats.frames.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(frame = frame.index, packets = packets.len(), "frame sent");
        }
        tracing::debug!("RTP send loop exited");
    }
}
