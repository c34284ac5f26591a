//! File-backed MJPEG backend.
//!
//! The source is a file of concatenated baseline JPEG images. Frames are
//! already encoded, so the pipeline passes them through unchanged; the
//! negotiated JPEG/RTP format only changes the dimensions announced on the
//! wire (RFC 2435 carries them in 8-pixel blocks).
//!
//! Each [`MjpegPipeline`] runs a worker thread. `configure()`, `realize()`,
//! `start()` and `stop()` queue a command and return; the worker performs
//! the transition and notifies listeners from its own thread.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Condvar, Mutex};

use crate::config::MjpegConfig;
use crate::error::BackendError;
use crate::locator::MediaLocator;
use crate::media::format::BLOCK_SIZE;
use crate::media::jfif;
use crate::media::{
    Codec, ContentType, DataOutput, EncodedFrame, EncodingUnit, FramePoll, ListenerId,
    MediaBackend, Pipeline, PipelineEvent, PipelineState, QualityControl, StateListener,
    TrackDescriptor, TrackFormat, TrackKind, TransportSink, VideoFormat,
};
use crate::transport::RtpSink;

/// [`MediaBackend`] reading MJPEG files and sending over RTP/UDP.
#[derive(Debug, Clone, Default)]
pub struct MjpegFileBackend {
    config: MjpegConfig,
}

impl MjpegFileBackend {
    pub fn new(config: MjpegConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MjpegConfig {
        &self.config
    }
}

impl MediaBackend for MjpegFileBackend {
    type Input = MjpegClip;

    fn create_input(&self, locator: &MediaLocator) -> Result<MjpegClip, BackendError> {
        let path = locator.file_path().ok_or_else(|| {
            BackendError::Unsupported(format!("no file backend for {locator}"))
        })?;
        MjpegClip::open(&path)
    }

    fn create_pipeline(&self, input: MjpegClip) -> Result<Box<dyn Pipeline>, BackendError> {
        Ok(Box::new(MjpegPipeline::spawn(input, self.config.clone())?))
    }

    fn create_sink(
        &self,
        output: Arc<dyn DataOutput>,
        destination: &MediaLocator,
    ) -> Result<Box<dyn TransportSink>, BackendError> {
        let sink = RtpSink::new(output, destination, self.config.sink_config())?;
        Ok(Box::new(sink))
    }
}

/// The JPEG images of one MJPEG file.
#[derive(Debug, Clone)]
pub struct MjpegClip {
    name: String,
    frames: Vec<Vec<u8>>,
    width: u32,
    height: u32,
}

impl MjpegClip {
    /// Read and split `path`.
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let data = fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => BackendError::NotFound(path.display().to_string()),
            _ => BackendError::Io(e),
        })?;
        Self::from_bytes(path.display().to_string(), &data)
    }

    /// Split an in-memory MJPEG stream. Fails if it holds no complete image.
    pub fn from_bytes(name: impl Into<String>, data: &[u8]) -> Result<Self, BackendError> {
        let name = name.into();
        let frames = jfif::split_frames(data)?;
        let first = frames
            .first()
            .ok_or_else(|| BackendError::Unsupported(format!("no JPEG frames in {name}")))?;
        let header = jfif::parse(*first)?;

        tracing::debug!(
            source = %name,
            frames = frames.len(),
            width = header.width,
            height = header.height,
            "MJPEG source probed"
        );
        Ok(Self {
            width: u32::from(header.width),
            height: u32::from(header.height),
            frames: frames.into_iter().map(<[u8]>::to_vec).collect(),
            name,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// The encoder stage of an MJPEG pipeline. Frames are already JPEG, so
/// there is no quality to tune.
#[derive(Debug)]
struct PassthroughJpeg;

impl EncodingUnit for PassthroughJpeg {
    fn name(&self) -> &str {
        "jpeg-passthrough"
    }

    fn supported_output_formats(&self) -> Vec<Codec> {
        vec![Codec::Jpeg, Codec::JpegRtp]
    }

    fn quality_control(&self) -> Option<Arc<dyn QualityControl>> {
        None
    }
}

enum Command {
    Configure,
    Realize,
    Start,
    Stop,
    Close,
}

struct Shared {
    clip: Arc<MjpegClip>,
    config: MjpegConfig,
    state: Mutex<PipelineState>,
    tracks: Mutex<Vec<TrackDescriptor>>,
    content_type: Mutex<ContentType>,
    output: Mutex<Option<Arc<MjpegOutput>>>,
    listeners: Mutex<Vec<(ListenerId, StateListener)>>,
    next_listener: AtomicU64,
}

impl Shared {
    fn dispatch(&self, event: PipelineEvent) {
        let listeners: Vec<StateListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&event);
        }
    }

    /// Publish `to`, then notify. Terminal states are never left.
    fn publish(&self, to: PipelineState) {
        let from = {
            let mut state = self.state.lock();
            if !state.can_advance_to(to) {
                return;
            }
            std::mem::replace(&mut *state, to)
        };
        tracing::debug!(source = %self.clip.name, %from, %to, "pipeline transition");
        self.dispatch(PipelineEvent::Transition { from, to });
    }

    fn fail(&self, reason: String) {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return;
            }
            *state = PipelineState::Failed;
        }
        tracing::warn!(source = %self.clip.name, %reason, "pipeline failed");
        self.dispatch(PipelineEvent::Error { reason });
    }

    fn state(&self) -> PipelineState {
        *self.state.lock()
    }

    fn configure(&self) {
        if self.state() != PipelineState::Unconfigured {
            return;
        }
        self.publish(PipelineState::Configuring);
        self.publish(PipelineState::Configured);
    }

    fn realize(&self) {
        self.configure();
        if self.state() != PipelineState::Configured {
            return;
        }
        self.publish(PipelineState::Realizing);
        match self.build_output() {
            Ok(output) => {
                *self.output.lock() = Some(output);
                self.publish(PipelineState::Realized);
            }
            Err(reason) => self.fail(reason),
        }
    }

    fn build_output(&self) -> Result<Arc<MjpegOutput>, String> {
        if *self.content_type.lock() != ContentType::RawRtp {
            return Err("output content type must be RAW_RTP".into());
        }
        let tracks = self.tracks.lock();
        let format = tracks
            .iter()
            .filter(|track| track.enabled && track.kind() == TrackKind::Video)
            .find_map(TrackDescriptor::video_format)
            .ok_or("no enabled video track")?;
        if !format.codec.is_jpeg() {
            return Err(format!("no encoder for {}", format.codec));
        }
        Ok(Arc::new(MjpegOutput::new(
            self.clip.clone(),
            format.clone(),
            self.config.loop_playback,
        )))
    }

    fn start(&self) {
        if self.state() != PipelineState::Realized {
            tracing::warn!(source = %self.clip.name, state = %self.state(), "start() ignored");
            return;
        }
        if let Some(output) = self.output.lock().as_ref() {
            output.set_flowing(true);
        }
        self.publish(PipelineState::Started);
    }

    fn stop(&self) {
        if let Some(output) = self.output.lock().as_ref() {
            output.set_flowing(false);
        }
        self.dispatch(PipelineEvent::Stopped);
    }

    fn run(&self, commands: Receiver<Command>) {
        while let Ok(command) = commands.recv() {
            match command {
                Command::Configure => self.configure(),
                Command::Realize => self.realize(),
                Command::Start => self.start(),
                Command::Stop => self.stop(),
                Command::Close => break,
            }
        }
        tracing::debug!(source = %self.clip.name, "pipeline worker exited");
    }

    /// Track edits are only accepted while Configured.
    fn require_configured(&self, what: &str) -> Result<(), BackendError> {
        match self.state() {
            PipelineState::Configured => Ok(()),
            state => Err(BackendError::InvalidState(format!("{what} while {state}"))),
        }
    }
}

/// Pipeline over an [`MjpegClip`], driven by its own worker thread.
pub struct MjpegPipeline {
    shared: Arc<Shared>,
    commands: Mutex<Option<Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    units: Vec<Arc<dyn EncodingUnit>>,
}

impl MjpegPipeline {
    /// Spawn the worker thread. The pipeline starts Unconfigured.
    ///
    /// Frames are sent as they are, so the clip width must already fill
    /// whole 8-pixel blocks. A partial last block row is cut off by the
    /// announced height and is harmless.
    pub fn spawn(clip: MjpegClip, config: MjpegConfig) -> Result<Self, BackendError> {
        if clip.width % BLOCK_SIZE != 0 {
            return Err(BackendError::Unsupported(format!(
                "{} is {} pixels wide, not a multiple of {BLOCK_SIZE}",
                clip.name, clip.width
            )));
        }
        let track = TrackDescriptor::video(VideoFormat {
            codec: Codec::Jpeg,
            width: clip.width,
            height: clip.height,
            frame_rate: config.frame_rate,
        });
        let shared = Arc::new(Shared {
            clip: Arc::new(clip),
            config,
            state: Mutex::new(PipelineState::Unconfigured),
            tracks: Mutex::new(vec![track]),
            content_type: Mutex::new(ContentType::Raw),
            output: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        });

        let (sender, receiver) = crossbeam_channel::unbounded::<Command>();
        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("mjpeg-pipeline".into())
                .spawn(move || shared.run(receiver))?
        };

        Ok(Self {
            shared,
            commands: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            units: vec![Arc::new(PassthroughJpeg)],
        })
    }

    fn send(&self, command: Command) {
        let sent = self
            .commands
            .lock()
            .as_ref()
            .is_some_and(|sender| sender.send(command).is_ok());
        if !sent {
            tracing::debug!(source = %self.shared.clip.name, "command dropped, pipeline closed");
        }
    }
}

impl Pipeline for MjpegPipeline {
    fn state(&self) -> PipelineState {
        self.shared.state()
    }

    fn configure(&self) {
        self.send(Command::Configure);
    }

    fn realize(&self) {
        self.send(Command::Realize);
    }

    fn start(&self) {
        self.send(Command::Start);
    }

    fn stop(&self) {
        self.send(Command::Stop);
    }

    fn close(&self) {
        let Some(sender) = self.commands.lock().take() else {
            return;
        };
        let _ = sender.send(Command::Close);
        drop(sender);
        if let Some(handle) = self.worker.lock().take() {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                tracing::warn!(source = %self.shared.clip.name, "pipeline worker panicked");
            }
        }
        if let Some(output) = self.shared.output.lock().take() {
            output.stop();
        }

        let from = std::mem::replace(&mut *self.shared.state.lock(), PipelineState::Closed);
        tracing::debug!(source = %self.shared.clip.name, %from, "pipeline closed");
        self.shared.dispatch(PipelineEvent::Closed);
    }

    fn tracks(&self) -> Vec<TrackDescriptor> {
        if self.state().has_reached(PipelineState::Configured) {
            self.shared.tracks.lock().clone()
        } else {
            Vec::new()
        }
    }

    fn set_track_enabled(&self, index: usize, enabled: bool) -> Result<(), BackendError> {
        self.shared.require_configured("set_track_enabled()")?;
        let mut tracks = self.shared.tracks.lock();
        let track = tracks
            .get_mut(index)
            .ok_or_else(|| BackendError::NotFound(format!("track {index}")))?;
        track.enabled = enabled;
        Ok(())
    }

    fn set_track_format(&self, index: usize, format: VideoFormat) -> Result<(), BackendError> {
        self.shared.require_configured("set_track_format()")?;
        if !format.codec.is_jpeg() {
            return Err(BackendError::Unsupported(format!(
                "{} from an MJPEG source",
                format.codec
            )));
        }

        // No scaling: the target must describe the clip's own block grid.
        let clip = &self.shared.clip;
        if format.width == 0
            || format.height == 0
            || format.width / BLOCK_SIZE != clip.width / BLOCK_SIZE
            || format.height / BLOCK_SIZE != clip.height / BLOCK_SIZE
        {
            return Err(BackendError::Unsupported(format!(
                "{}x{} from a {}x{} source",
                format.width, format.height, clip.width, clip.height
            )));
        }

        let mut tracks = self.shared.tracks.lock();
        let track = tracks
            .get_mut(index)
            .ok_or_else(|| BackendError::NotFound(format!("track {index}")))?;
        if track.kind() != TrackKind::Video {
            return Err(BackendError::Unsupported(format!("track {index} is not video")));
        }
        track.format = TrackFormat::Video(format);
        Ok(())
    }

    fn set_content_type(&self, content_type: ContentType) -> Result<(), BackendError> {
        self.shared.require_configured("set_content_type()")?;
        *self.shared.content_type.lock() = content_type;
        Ok(())
    }

    fn add_listener(&self, listener: StateListener) -> ListenerId {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::SeqCst));
        self.shared.listeners.lock().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.shared
            .listeners
            .lock()
            .retain(|(listener, _)| *listener != id);
    }

    fn encoding_units(&self) -> Vec<Arc<dyn EncodingUnit>> {
        self.units.clone()
    }

    fn data_output(&self) -> Option<Arc<dyn DataOutput>> {
        self.shared
            .output
            .lock()
            .clone()
            .map(|output| output as Arc<dyn DataOutput>)
    }
}

impl Drop for MjpegPipeline {
    fn drop(&mut self) {
        self.close();
    }
}

#[derive(Debug)]
struct Playback {
    /// Set by [`DataOutput::start`].
    started: bool,
    /// Set while the pipeline is Started.
    flowing: bool,
    ended: bool,
    next: usize,
    emitted: u64,
    due: Option<Instant>,
}

/// Paced frame source of a realized [`MjpegPipeline`].
///
/// Frames are handed out at the negotiated frame rate once both the output
/// and the pipeline have been started.
pub struct MjpegOutput {
    clip: Arc<MjpegClip>,
    format: VideoFormat,
    loop_playback: bool,
    interval: Duration,
    playback: Mutex<Playback>,
    wake: Condvar,
}

impl MjpegOutput {
    fn new(clip: Arc<MjpegClip>, format: VideoFormat, loop_playback: bool) -> Self {
        let fps = if format.frame_rate.is_finite() && format.frame_rate > 0.0 {
            format.frame_rate
        } else {
            crate::config::DEFAULT_FRAME_RATE
        };
        Self {
            clip,
            format,
            loop_playback,
            interval: Duration::from_secs_f32(1.0 / fps),
            playback: Mutex::new(Playback {
                started: false,
                flowing: false,
                ended: false,
                next: 0,
                emitted: 0,
                due: None,
            }),
            wake: Condvar::new(),
        }
    }

    fn set_flowing(&self, flowing: bool) {
        let mut playback = self.playback.lock();
        playback.flowing = flowing;
        playback.due = None;
        self.wake.notify_all();
    }

    /// Frames handed out so far.
    pub fn frames_emitted(&self) -> u64 {
        self.playback.lock().emitted
    }
}

impl DataOutput for MjpegOutput {
    fn content_type(&self) -> ContentType {
        ContentType::RawRtp
    }

    fn format(&self) -> VideoFormat {
        self.format.clone()
    }

    fn start(&self) -> Result<(), BackendError> {
        let mut playback = self.playback.lock();
        if playback.ended {
            return Err(BackendError::InvalidState("output already stopped".into()));
        }
        playback.started = true;
        self.wake.notify_all();
        Ok(())
    }

    fn stop(&self) {
        let mut playback = self.playback.lock();
        playback.ended = true;
        self.wake.notify_all();
    }

    fn poll_frame(&self, timeout: Duration) -> FramePoll {
        let deadline = Instant::now() + timeout;
        let mut playback = self.playback.lock();

        loop {
            if playback.ended {
                return FramePoll::Ended;
            }

            let mut wake_at = deadline;
            if playback.started && playback.flowing {
                if playback.next >= self.clip.frames.len() {
                    if !self.loop_playback {
                        playback.ended = true;
                        return FramePoll::Ended;
                    }
                    playback.next = 0;
                }

                let now = Instant::now();
                let due = *playback.due.get_or_insert(now);
                if due <= now {
                    let frame = EncodedFrame {
                        index: playback.emitted,
                        data: self.clip.frames[playback.next].clone(),
                    };
                    playback.next += 1;
                    playback.emitted += 1;
                    playback.due = Some((due + self.interval).max(now));
                    return FramePoll::Frame(frame);
                }
                wake_at = wake_at.min(due);
            }

            if Instant::now() >= deadline {
                return FramePoll::Pending;
            }
            self.wake.wait_until(&mut playback, wake_at);
        }
    }
}
