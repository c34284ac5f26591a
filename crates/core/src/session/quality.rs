use std::fmt;

use crate::media::Pipeline;

/// JPEG quality as a fraction in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quality(f32);

impl Quality {
    /// Build from a percentage, clamped to `0..=100`. NaN counts as 0.
    pub fn from_percent(percent: f32) -> Self {
        let percent = if percent.is_nan() {
            0.0
        } else {
            percent.clamp(0.0, 100.0)
        };
        Self(percent / 100.0)
    }

    pub fn fraction(self) -> f32 {
        self.0
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// Applies the requested quality to the pipeline's JPEG encoder.
pub struct QualityNegotiator;

impl QualityNegotiator {
    /// Set `quality` on the first JPEG-producing encoding unit that has a
    /// quality control. Returns the value in effect, or `None` when no unit
    /// qualifies.
    pub fn apply(pipeline: &dyn Pipeline, quality: Quality) -> Option<f32> {
        let found = pipeline.encoding_units().into_iter().find_map(|unit| {
            if !unit.supported_output_formats().iter().any(|c| c.is_jpeg()) {
                return None;
            }
            let control = unit.quality_control()?;
            Some((unit, control))
        });
        let Some((unit, control)) = found else {
            tracing::debug!(%quality, "no JPEG quality control, leaving encoder default");
            return None;
        };

        let previous = control.quality();
        let applied = control.set_quality(quality.fraction());
        tracing::info!(unit = unit.name(), previous, applied, "JPEG quality set");
        Some(applied)
    }
}
