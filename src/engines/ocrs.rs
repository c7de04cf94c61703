//! OCRS engine adapter
//!
//! Pure Rust OCR engine using the ocrs library. No system dependencies required.
//! Downloads neural network models automatically on first use.

use crate::engine::{Accuracy, Language, PageOcrAdapter, RecognitionOptions};
use crate::error::PipelineError;
use crate::raster::RasterImage;
use ocrs::{DecodeMethod, ImageSource, OcrEngine, OcrEngineParams};
use once_cell::sync::OnceCell;
use rten::Model;
use std::path::PathBuf;

use super::{cache_dir, ensure_downloaded};

/// Default model URLs from the ocrs project
const DETECTION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-detection.rten";
const RECOGNITION_MODEL_URL: &str =
    "https://ocrs-models.s3-accelerate.amazonaws.com/text-recognition.rten";

/// Beam width used when the most accurate decoding is requested
const BEAM_WIDTH: u32 = 100;

/// Adapter over ocrs. Each decoding mode needs its own engine, and each
/// engine holds its own copy of both models, so an engine is only built the
/// first time its accuracy level is requested.
pub struct OcrsAdapter {
    detection_path: PathBuf,
    recognition_path: PathBuf,
    engines: Decoders<OcrEngine>,
}

impl OcrsAdapter {
    /// Fetch the detection and recognition models, downloading them if needed,
    /// and build the engine for the default accuracy.
    pub fn new() -> Result<Self, PipelineError> {
        let dir = cache_dir(None)?;
        let detection_path = ensure_downloaded(DETECTION_MODEL_URL, &dir, "text-detection.rten")?;
        let recognition_path =
            ensure_downloaded(RECOGNITION_MODEL_URL, &dir, "text-recognition.rten")?;

        let adapter = Self {
            detection_path,
            recognition_path,
            engines: Decoders::default(),
        };
        adapter.engine_for(RecognitionOptions::default().accuracy)?;

        tracing::info!("ocrs engine initialized successfully");
        Ok(adapter)
    }

    fn engine_for(&self, accuracy: Accuracy) -> Result<&OcrEngine, PipelineError> {
        self.engines.get(accuracy, |decode_method| self.build(decode_method))
    }

    fn build(&self, decode_method: DecodeMethod) -> Result<OcrEngine, PipelineError> {
        let beam = matches!(decode_method, DecodeMethod::BeamSearch { .. });
        tracing::debug!("Building ocrs engine (beam search: {})", beam);

        let detection_model = Model::load_file(&self.detection_path).map_err(|e| {
            PipelineError::InitializationError(format!("Failed to load detection model: {}", e))
        })?;
        let recognition_model = Model::load_file(&self.recognition_path).map_err(|e| {
            PipelineError::InitializationError(format!("Failed to load recognition model: {}", e))
        })?;

        OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            decode_method,
            ..Default::default()
        })
        .map_err(|e| PipelineError::InitializationError(format!("Failed to create OCR engine: {}", e)))
    }
}

/// One lazily built engine per accuracy level
struct Decoders<E> {
    fast: OnceCell<E>,
    best: OnceCell<E>,
}

impl<E> Default for Decoders<E> {
    fn default() -> Self {
        Self {
            fast: OnceCell::new(),
            best: OnceCell::new(),
        }
    }
}

impl<E> Decoders<E> {
    fn get(
        &self,
        accuracy: Accuracy,
        build: impl FnOnce(DecodeMethod) -> Result<E, PipelineError>,
    ) -> Result<&E, PipelineError> {
        match accuracy {
            Accuracy::Best => self
                .best
                .get_or_try_init(|| build(DecodeMethod::BeamSearch { width: BEAM_WIDTH })),
            Accuracy::Fast => self.fast.get_or_try_init(|| build(DecodeMethod::Greedy)),
        }
    }
}

impl PageOcrAdapter for OcrsAdapter {
    fn name(&self) -> &'static str {
        "ocrs"
    }

    fn description(&self) -> &'static str {
        "Pure Rust OCR engine - fast, no system dependencies required"
    }

    /// Language, segmentation, allow-list and dictionary options have no
    /// ocrs counterpart and are ignored.
    fn recognize(
        &self,
        image: &RasterImage,
        _language: &Language,
        options: &RecognitionOptions,
    ) -> Result<String, PipelineError> {
        let engine = self
            .engine_for(options.accuracy)
            .map_err(|e| PipelineError::Ocr(e.to_string()))?;

        // ImageSource::from_bytes expects RGB8 in HWC order
        let rgb_img = image.as_dynamic().to_rgb8();
        let dimensions = rgb_img.dimensions();

        let img_source = ImageSource::from_bytes(rgb_img.as_raw(), dimensions)
            .map_err(|e| PipelineError::Ocr(format!("Failed to create image source: {}", e)))?;

        let ocr_input = engine
            .prepare_input(img_source)
            .map_err(|e| PipelineError::Ocr(format!("Failed to prepare input: {}", e)))?;

        let word_rects = engine
            .detect_words(&ocr_input)
            .map_err(|e| PipelineError::Ocr(format!("Failed to detect words: {}", e)))?;

        let line_rects = engine.find_text_lines(&ocr_input, &word_rects);

        let line_texts = engine
            .recognize_text(&ocr_input, &line_rects)
            .map_err(|e| PipelineError::Ocr(format!("Failed to recognize text: {}", e)))?;

        let text = line_texts
            .iter()
            .filter_map(|line| line.as_ref())
            .map(|line| {
                line.words()
                    .map(|word| word.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(filter_allowed(text, options.allow_list.as_deref()))
    }

    fn supported_languages(&self) -> Vec<String> {
        // ocrs currently only supports English/Latin alphabet
        vec!["eng".to_string()]
    }
}

/// Apply the allow-list after recognition. Line breaks always pass.
fn filter_allowed(text: String, allow_list: Option<&str>) -> String {
    match allow_list {
        Some(allowed) => text
            .chars()
            .filter(|&c| c == '\n' || allowed.contains(c))
            .collect(),
        None => text,
    }
}
