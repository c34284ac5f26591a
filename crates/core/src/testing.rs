//! Scripted pipeline, backend and sink used by the unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::BackendError;
use crate::locator::MediaLocator;
use crate::media::{
    Codec, ContentType, DataOutput, EncodingUnit, FramePoll, ListenerId, MediaBackend, Pipeline,
    PipelineEvent, PipelineState, QualityControl, SinkState, StateListener, TrackDescriptor,
    TrackFormat, TransportSink, VideoFormat,
};

/// What the pipeline does after `configure()` / `realize()`.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Advance,
    Fail(&'static str),
    Close,
    Hang,
}

#[derive(Clone)]
pub(crate) struct Script {
    pub tracks: Vec<TrackDescriptor>,
    pub on_configure: Step,
    pub on_realize: Step,
    /// Deliver events from a separate thread instead of inline.
    pub async_events: bool,
    pub units: Vec<Arc<dyn EncodingUnit>>,
    pub reject_format: bool,
    pub provide_output: bool,
    pub fail_output_start: bool,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            tracks: vec![TrackDescriptor::video(video(640, 481, 25.0))],
            on_configure: Step::Advance,
            on_realize: Step::Advance,
            async_events: true,
            units: Vec::new(),
            reject_format: false,
            provide_output: true,
            fail_output_start: false,
        }
    }
}

pub(crate) fn video(width: u32, height: u32, frame_rate: f32) -> VideoFormat {
    VideoFormat {
        codec: Codec::Raw,
        width,
        height,
        frame_rate,
    }
}

/// Everything a test wants to inspect after the pipeline has been moved away.
#[derive(Default)]
pub(crate) struct Probe {
    pub close_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub listeners_added: AtomicUsize,
    pub listeners_removed: AtomicUsize,
    pub output_starts: AtomicUsize,
    /// Number of attached listeners at each configure()/realize() call.
    pub listeners_at_trigger: Mutex<Vec<usize>>,
    pub format_sets: Mutex<Vec<(usize, VideoFormat)>>,
    pub enabled_sets: Mutex<Vec<(usize, bool)>>,
    pub content_type: Mutex<Option<ContentType>>,
}

impl Probe {
    pub fn closes(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

struct Shared {
    script: Script,
    probe: Arc<Probe>,
    state: Mutex<PipelineState>,
    tracks: Mutex<Vec<TrackDescriptor>>,
    listeners: Mutex<Vec<(ListenerId, StateListener)>>,
    next_listener: AtomicU64,
}

impl Shared {
    fn dispatch(&self, event: PipelineEvent) {
        let listeners: Vec<StateListener> =
            self.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(&event);
        }
    }

    fn transition(&self, to: PipelineState) {
        let from = {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return;
            }
            std::mem::replace(&mut *state, to)
        };
        self.dispatch(PipelineEvent::Transition { from, to });
    }

    fn run(&self, step: Step, intermediate: PipelineState, target: PipelineState) {
        match step {
            Step::Advance => {
                self.transition(intermediate);
                self.transition(target);
            }
            Step::Fail(reason) => {
                self.transition(intermediate);
                *self.state.lock() = PipelineState::Failed;
                self.dispatch(PipelineEvent::Error {
                    reason: reason.to_string(),
                });
            }
            Step::Close => {
                *self.state.lock() = PipelineState::Closed;
                self.dispatch(PipelineEvent::Closed);
            }
            Step::Hang => self.transition(intermediate),
        }
    }
}

pub(crate) struct ScriptedPipeline {
    shared: Arc<Shared>,
    output: Arc<StubOutput>,
}

impl ScriptedPipeline {
    pub fn new(script: Script) -> (Self, Arc<Probe>) {
        let probe = Arc::new(Probe::default());
        let output = Arc::new(StubOutput {
            probe: probe.clone(),
            fail_start: script.fail_output_start,
        });
        let shared = Arc::new(Shared {
            tracks: Mutex::new(script.tracks.clone()),
            script,
            probe: probe.clone(),
            state: Mutex::new(PipelineState::Unconfigured),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(0),
        });
        (Self { shared, output }, probe)
    }

    fn trigger(&self, step: Step, intermediate: PipelineState, target: PipelineState) {
        let count = self.shared.listeners.lock().len();
        self.shared.probe.listeners_at_trigger.lock().push(count);

        if self.shared.script.async_events {
            let shared = self.shared.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(5));
                shared.run(step, intermediate, target);
            });
        } else {
            self.shared.run(step, intermediate, target);
        }
    }
}

impl Pipeline for ScriptedPipeline {
    fn state(&self) -> PipelineState {
        *self.shared.state.lock()
    }

    fn configure(&self) {
        let step = self.shared.script.on_configure.clone();
        self.trigger(step, PipelineState::Configuring, PipelineState::Configured);
    }

    fn realize(&self) {
        let step = self.shared.script.on_realize.clone();
        self.trigger(step, PipelineState::Realizing, PipelineState::Realized);
    }

    fn start(&self) {
        self.shared.probe.start_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.transition(PipelineState::Started);
    }

    fn stop(&self) {
        self.shared.probe.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.dispatch(PipelineEvent::Stopped);
    }

    fn close(&self) {
        self.shared.probe.close_calls.fetch_add(1, Ordering::SeqCst);
        *self.shared.state.lock() = PipelineState::Closed;
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
        let mut tracks = self.shared.tracks.lock();
        let track = tracks
            .get_mut(index)
            .ok_or_else(|| BackendError::NotFound(format!("track {index}")))?;
        track.enabled = enabled;
        self.shared.probe.enabled_sets.lock().push((index, enabled));
        Ok(())
    }

    fn set_track_format(&self, index: usize, format: VideoFormat) -> Result<(), BackendError> {
        if self.shared.script.reject_format {
            return Err(BackendError::Unsupported("format".into()));
        }
        let mut tracks = self.shared.tracks.lock();
        let track = tracks
            .get_mut(index)
            .ok_or_else(|| BackendError::NotFound(format!("track {index}")))?;
        track.format = TrackFormat::Video(format.clone());
        self.shared.probe.format_sets.lock().push((index, format));
        Ok(())
    }

    fn set_content_type(&self, content_type: ContentType) -> Result<(), BackendError> {
        *self.shared.probe.content_type.lock() = Some(content_type);
        Ok(())
    }

    fn add_listener(&self, listener: StateListener) -> ListenerId {
        let id = ListenerId(self.shared.next_listener.fetch_add(1, Ordering::SeqCst));
        self.shared.listeners.lock().push((id, listener));
        self.shared.probe.listeners_added.fetch_add(1, Ordering::SeqCst);
        id
    }

    fn remove_listener(&self, id: ListenerId) {
        self.shared.listeners.lock().retain(|(lid, _)| *lid != id);
        self.shared
            .probe
            .listeners_removed
            .fetch_add(1, Ordering::SeqCst);
    }

    fn encoding_units(&self) -> Vec<Arc<dyn EncodingUnit>> {
        self.shared.script.units.clone()
    }

    fn data_output(&self) -> Option<Arc<dyn DataOutput>> {
        if self.shared.script.provide_output && self.state().has_reached(PipelineState::Realized) {
            Some(self.output.clone())
        } else {
            None
        }
    }
}

pub(crate) struct StubOutput {
    probe: Arc<Probe>,
    fail_start: bool,
}

impl DataOutput for StubOutput {
    fn content_type(&self) -> ContentType {
        ContentType::RawRtp
    }

    fn format(&self) -> VideoFormat {
        VideoFormat {
            codec: Codec::JpegRtp,
            width: 640,
            height: 480,
            frame_rate: 25.0,
        }
    }

    fn start(&self) -> Result<(), BackendError> {
        if self.fail_start {
            return Err(BackendError::Other("output start".into()));
        }
        self.probe.output_starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {}

    fn poll_frame(&self, timeout: Duration) -> FramePoll {
        thread::sleep(timeout);
        FramePoll::Pending
    }
}

#[derive(Default)]
pub(crate) struct RecordingControl {
    value: Mutex<f32>,
    pub sets: AtomicUsize,
}

impl QualityControl for RecordingControl {
    fn quality(&self) -> f32 {
        *self.value.lock()
    }

    fn set_quality(&self, value: f32) -> f32 {
        self.sets.fetch_add(1, Ordering::SeqCst);
        *self.value.lock() = value;
        value
    }
}

pub(crate) struct StubUnit {
    pub name: &'static str,
    pub outputs: Vec<Codec>,
    pub control: Option<Arc<RecordingControl>>,
}

impl StubUnit {
    pub fn new(
        name: &'static str,
        outputs: Vec<Codec>,
        with_control: bool,
    ) -> (Arc<Self>, Arc<RecordingControl>) {
        let control = Arc::new(RecordingControl::default());
        let unit = Arc::new(Self {
            name,
            outputs,
            control: with_control.then(|| control.clone()),
        });
        (unit, control)
    }
}

impl EncodingUnit for StubUnit {
    fn name(&self) -> &str {
        self.name
    }

    fn supported_output_formats(&self) -> Vec<Codec> {
        self.outputs.clone()
    }

    fn quality_control(&self) -> Option<Arc<dyn QualityControl>> {
        self.control
            .clone()
            .map(|control| control as Arc<dyn QualityControl>)
    }
}

#[derive(Default)]
pub(crate) struct SinkProbe {
    pub open_calls: AtomicUsize,
    pub start_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SinkScript {
    pub fail_create: bool,
    pub fail_open: bool,
    pub fail_start: bool,
}

pub(crate) struct MockSink {
    locator: MediaLocator,
    script: SinkScript,
    probe: Arc<SinkProbe>,
    state: Mutex<SinkState>,
}

impl TransportSink for MockSink {
    fn destination(&self) -> &MediaLocator {
        &self.locator
    }

    fn state(&self) -> SinkState {
        *self.state.lock()
    }

    fn open(&self) -> Result<(), BackendError> {
        self.probe.open_calls.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_open {
            return Err(BackendError::Other("open".into()));
        }
        *self.state.lock() = SinkState::Open;
        Ok(())
    }

    fn start(&self) -> Result<(), BackendError> {
        self.probe.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.script.fail_start {
            return Err(BackendError::Other("start".into()));
        }
        *self.state.lock() = SinkState::Started;
        Ok(())
    }

    fn close(&self) {
        self.probe.close_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = SinkState::Closed;
    }
}

/// Backend handing out pre-scripted pipelines in order.
#[derive(Default)]
pub(crate) struct MockBackend {
    pub input_error: bool,
    pub pipeline_error: bool,
    pub sink_script: SinkScript,
    pub pipelines: Mutex<VecDeque<ScriptedPipeline>>,
    pub inputs_created: AtomicUsize,
    pub sinks: Mutex<Vec<(MediaLocator, Arc<SinkProbe>)>>,
}

impl MockBackend {
    pub fn with_pipeline(script: Script) -> (Self, Arc<Probe>) {
        let backend = Self::default();
        let probe = backend.push(script);
        (backend, probe)
    }

    pub fn push(&self, script: Script) -> Arc<Probe> {
        let (pipeline, probe) = ScriptedPipeline::new(script);
        self.pipelines.lock().push_back(pipeline);
        probe
    }

    pub fn sink_probe(&self, index: usize) -> Arc<SinkProbe> {
        self.sinks.lock()[index].1.clone()
    }
}

impl MediaBackend for MockBackend {
    type Input = MediaLocator;

    fn create_input(&self, locator: &MediaLocator) -> Result<MediaLocator, BackendError> {
        self.inputs_created.fetch_add(1, Ordering::SeqCst);
        if self.input_error {
            return Err(BackendError::NotFound(locator.to_string()));
        }
        Ok(locator.clone())
    }

    fn create_pipeline(&self, input: MediaLocator) -> Result<Box<dyn Pipeline>, BackendError> {
        if self.pipeline_error {
            return Err(BackendError::Unsupported(input.to_string()));
        }
        match self.pipelines.lock().pop_front() {
            Some(pipeline) => Ok(Box::new(pipeline)),
            None => Err(BackendError::Other("no scripted pipeline left".into())),
        }
    }

    fn create_sink(
        &self,
        _output: Arc<dyn DataOutput>,
        destination: &MediaLocator,
    ) -> Result<Box<dyn TransportSink>, BackendError> {
        if self.sink_script.fail_create {
            return Err(BackendError::Other("create".into()));
        }
        let probe = Arc::new(SinkProbe::default());
        self.sinks.lock().push((destination.clone(), probe.clone()));
        Ok(Box::new(MockSink {
            locator: destination.clone(),
            script: self.sink_script,
            probe,
            state: Mutex::new(SinkState::Unbound),
        }))
    }
}
