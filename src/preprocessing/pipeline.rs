use crate::config::EnhanceConfig;
use crate::error::PipelineError;
use crate::raster::RasterImage;
use image::DynamicImage;
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use super::steps;

/// Whether the full enhancement sequence ran or the minimal fallback was used
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EnhancementOutcome {
    Full,
    /// A stage failed; the page was only grayscaled and Otsu-thresholded.
    Degraded { reason: String },
}

impl EnhancementOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Timing information for a single enhancement step
#[derive(Debug, Clone, Serialize)]
pub struct StepTiming {
    pub name: String,
    pub time_ms: u64,
}

/// Result of enhancement including timing stats
#[derive(Debug, Clone)]
pub struct Enhanced {
    pub image: RasterImage,
    pub outcome: EnhancementOutcome,
    pub total_time_ms: u64,
    pub steps: Vec<StepTiming>,
}

/// Fixed, ordered sequence of transforms that prepares a page for OCR
#[derive(Debug, Clone, Default)]
pub struct ImageEnhancer {
    config: EnhanceConfig,
}

impl ImageEnhancer {
    pub fn new(config: EnhanceConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EnhanceConfig {
        &self.config
    }

    /// Enhance one page. Consumes the input and returns a new buffer.
    ///
    /// Any stage failure (including a panic inside an image routine) drops
    /// back to grayscale plus a single global threshold. Only when that also
    /// fails is an `Enhancement` error returned.
    pub fn enhance(&self, image: RasterImage) -> Result<Enhanced, PipelineError> {
        let start = Instant::now();
        let source = image.into_dynamic();
        let mut timings = Vec::new();

        let full = catch_unwind(AssertUnwindSafe(|| {
            self.run_full(source.clone(), &mut timings)
        }))
        .unwrap_or_else(|panic| Err(PipelineError::Enhancement(panic_message(&panic))));

        let (img, outcome) = match full {
            Ok(img) => (img, EnhancementOutcome::Full),
            Err(e) => {
                tracing::warn!("Enhancement failed, using fallback: {}", e);
                timings.clear();
                let img = self.run_step("fallback", source, &mut timings, fallback)?;
                (
                    img,
                    EnhancementOutcome::Degraded {
                        reason: e.to_string(),
                    },
                )
            }
        };

        Ok(Enhanced {
            image: RasterImage::from_dynamic(img),
            outcome,
            total_time_ms: start.elapsed().as_millis() as u64,
            steps: timings,
        })
    }

    fn run_full(
        &self,
        img: DynamicImage,
        timings: &mut Vec<StepTiming>,
    ) -> Result<DynamicImage, PipelineError> {
        let cfg = &self.config;
        let mut img = img;

        img = self.run_step("upscale", img, timings, |i| steps::resize::apply(i, cfg))?;
        img = self.run_step("contrast", img, timings, |i| steps::contrast::apply(i, cfg))?;
        img = self.run_step("sharpen", img, timings, |i| steps::sharpen::apply(i, cfg))?;
        img = self.run_step("grayscale", img, timings, steps::grayscale::apply)?;
        img = self.run_step("denoise", img, timings, |i| steps::denoise::apply(i, cfg))?;
        img = self.run_step("threshold", img, timings, |i| steps::threshold::apply(i, cfg))?;
        img = self.run_step("morphology", img, timings, |i| {
            steps::morphology::apply(i, cfg)
        })?;
        img = self.run_step("deskew", img, timings, |i| steps::deskew::apply(i, cfg))?;

        Ok(img)
    }

    fn run_step<F>(
        &self,
        name: &str,
        img: DynamicImage,
        timings: &mut Vec<StepTiming>,
        step_fn: F,
    ) -> Result<DynamicImage, PipelineError>
    where
        F: FnOnce(DynamicImage) -> Result<DynamicImage, PipelineError>,
    {
        let step_start = Instant::now();
        let result = step_fn(img)?;
        let time_ms = step_start.elapsed().as_millis() as u64;
        tracing::debug!("Enhancement step {} took {}ms", name, time_ms);
        timings.push(StepTiming {
            name: name.to_string(),
            time_ms,
        });
        Ok(result)
    }
}

/// Minimal path: grayscale and one global Otsu threshold
fn fallback(img: DynamicImage) -> Result<DynamicImage, PipelineError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(PipelineError::Enhancement(
            "fallback could not read image: no pixels".to_string(),
        ));
    }
    let gray = steps::grayscale::apply(img)?.to_luma8();
    Ok(DynamicImage::ImageLuma8(steps::threshold::global(&gray)))
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("stage panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("stage panicked: {}", s)
    } else {
        "stage panicked".to_string()
    }
}
