//! Pipeline construction and track/format negotiation.
//!
//! ```text
//! source -> create_input -> create_pipeline -> Configured
//!        -> select first enabled video track, disable the rest
//!        -> program JPEG/RTP target format -> RawRtp output -> Realized
//! ```

use std::sync::Arc;

use super::guard::CloseOnDrop;
use super::sync::StateSynchronizer;
use crate::error::{Result, TransmitError};
use crate::media::{
    ContentType, DataOutput, MediaBackend, MediaSource, Pipeline, PipelineState,
    TrackDescriptor, TrackKind, VideoFormat,
};

/// A pipeline in the Realized state, ready to be bound to a sink.
///
/// Dropping it closes the pipeline.
pub struct RealizedPipeline {
    pub pipeline: CloseOnDrop<Box<dyn Pipeline>>,
    pub output: Arc<dyn DataOutput>,
    /// Format programmed on the selected track.
    pub format: VideoFormat,
    pub track_index: usize,
}

/// Builds and negotiates the processing pipeline of one transmission.
pub struct PipelineBuilder<'a, B: MediaBackend> {
    backend: &'a B,
    sync: &'a StateSynchronizer,
}

impl<'a, B: MediaBackend> PipelineBuilder<'a, B> {
    pub fn new(backend: &'a B, sync: &'a StateSynchronizer) -> Self {
        Self { backend, sync }
    }

    /// Turn `source` into a realized pipeline producing JPEG/RTP.
    ///
    /// Once a pipeline exists, any later failure closes it exactly once
    /// before the error is returned.
    pub fn build(&self, source: Option<MediaSource>) -> Result<RealizedPipeline> {
        let pipeline = match source {
            None => return Err(TransmitError::InvalidInput("no media source".into())),
            Some(MediaSource::Locator(locator)) if locator.is_empty() => {
                return Err(TransmitError::InvalidInput("empty media locator".into()));
            }
            Some(MediaSource::Locator(locator)) => {
                let input = self
                    .backend
                    .create_input(&locator)
                    .map_err(TransmitError::SourceUnavailable)?;
                let pipeline = self
                    .backend
                    .create_pipeline(input)
                    .map_err(TransmitError::UnsupportedInput)?;
                tracing::debug!(%locator, "pipeline created");
                pipeline
            }
            Some(MediaSource::Pipeline(pipeline)) => pipeline,
        };
        let pipeline = CloseOnDrop::new(pipeline);

        if !self.sync.wait_for_state(&**pipeline, PipelineState::Configured) {
            return Err(TransmitError::ConfigurationFailed);
        }

        let tracks = pipeline.tracks();
        if tracks.is_empty() {
            return Err(TransmitError::NoTracks);
        }
        let (track_index, source_format) =
            select_video_track(&tracks).ok_or(TransmitError::NoVideoTrack)?;

        for index in (0..tracks.len()).filter(|&i| i != track_index) {
            pipeline.set_track_enabled(index, false).map_err(|e| {
                TransmitError::FormatRejected(format!("couldn't disable track {index}: {e}"))
            })?;
        }

        let format = source_format.jpeg_rtp_target();
        if format.width == 0 || format.height == 0 {
            return Err(TransmitError::FormatRejected(format!(
                "{}x{} is smaller than one JPEG block",
                source_format.width, source_format.height
            )));
        }
        pipeline
            .set_track_format(track_index, format.clone())
            .map_err(|e| TransmitError::FormatRejected(e.to_string()))?;
        tracing::info!(
            track = track_index,
            source = %source_format,
            target = %format,
            "video track programmed"
        );

        pipeline
            .set_content_type(ContentType::RawRtp)
            .map_err(|e| TransmitError::RealizationFailed(e.to_string()))?;

        if !self.sync.wait_for_state(&**pipeline, PipelineState::Realized) {
            return Err(TransmitError::RealizationFailed(format!(
                "pipeline ended in {}",
                pipeline.state()
            )));
        }
        let output = pipeline
            .data_output()
            .ok_or_else(|| TransmitError::RealizationFailed("no data output".into()))?;

        Ok(RealizedPipeline {
            pipeline,
            output,
            format,
            track_index,
        })
    }
}

/// First enabled video track, in source order.
fn select_video_track(tracks: &[TrackDescriptor]) -> Option<(usize, &VideoFormat)> {
    tracks
        .iter()
        .enumerate()
        .filter(|(_, track)| track.enabled && track.kind() == TrackKind::Video)
        .find_map(|(index, track)| track.video_format().map(|format| (index, format)))
}
