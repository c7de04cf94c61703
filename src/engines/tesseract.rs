//! Tesseract engine adapter
//!
//! Uses tesseract-static crate for static linking (no system dependencies).
//! Downloads traineddata on first use: `tessdata_best` for the most accurate
//! mode, `tessdata_fast` otherwise.

use crate::config::Config;
use crate::engine::{
    Accuracy, EngineMode, Language, PageOcrAdapter, RecognitionOptions, Segmentation,
};
use crate::error::PipelineError;
use crate::raster::RasterImage;
use std::path::PathBuf;
use tesseract_static::tesseract::{OcrEngineMode, PageSegMode, Tesseract};

use super::{cache_dir, ensure_downloaded};

/// Tesseract OCR adapter
pub struct TesseractAdapter {
    /// Fixed tessdata directory. When unset, traineddata is downloaded into
    /// the cache dir per accuracy level.
    tessdata_path: Option<PathBuf>,
    /// Language used when a document asks for "auto"
    default_language: String,
}

impl TesseractAdapter {
    pub fn new(config: &Config) -> Result<Self, PipelineError> {
        let default_language = config
            .pipeline
            .language
            .resolve(DEFAULT_LANGUAGE)
            .to_string();
        let adapter = Self {
            tessdata_path: config.tessdata_path.as_ref().map(PathBuf::from),
            default_language,
        };

        // Validate that tessdata is accessible by doing a test initialization
        let options = RecognitionOptions::default();
        let datapath = adapter.ensure_tessdata(&adapter.default_language, options.accuracy)?;
        adapter.init(&datapath, &adapter.default_language, &options)?;

        tracing::info!(
            "Tesseract engine initialized (tessdata: {}, language: {})",
            datapath,
            adapter.default_language
        );
        Ok(adapter)
    }

    /// Directory holding traineddata for every language in `language`
    /// ("eng" or "eng+deu").
    fn ensure_tessdata(&self, language: &str, accuracy: Accuracy) -> Result<String, PipelineError> {
        let dir = match &self.tessdata_path {
            Some(path) => path.clone(),
            None => {
                let (subdir, repo) = match accuracy {
                    Accuracy::Best => ("tessdata_best", "tessdata_best"),
                    Accuracy::Fast => ("tessdata_fast", "tessdata_fast"),
                };
                let dir = cache_dir(Some(subdir))?;
                for lang in language.split('+').filter(|l| !l.is_empty()) {
                    let url = format!(
                        "https://github.com/tesseract-ocr/{}/raw/main/{}.traineddata",
                        repo, lang
                    );
                    ensure_downloaded(&url, &dir, &format!("{}.traineddata", lang))?;
                }
                dir
            }
        };

        // Tesseract expects the directory, not the file
        dir.to_str()
            .map(|s| s.to_string())
            .ok_or_else(|| PipelineError::InitializationError("Invalid tessdata path".to_string()))
    }

    /// Fresh instance with the requested engine mode, or Tesseract's default
    /// mode when the traineddata does not carry that engine.
    fn init(
        &self,
        datapath: &str,
        language: &str,
        options: &RecognitionOptions,
    ) -> Result<Tesseract, PipelineError> {
        let oem = match options.engine_mode {
            EngineMode::Lstm => OcrEngineMode::LstmOnly,
            EngineMode::Legacy => OcrEngineMode::TesseractOnly,
        };

        let mut tess = match Tesseract::new_with_oem(Some(datapath), Some(language), oem) {
            Ok(tess) => tess,
            Err(e) => {
                tracing::debug!("Engine mode not available ({}), using default", e);
                Tesseract::new(Some(datapath), Some(language)).map_err(|e| {
                    PipelineError::InitializationError(format!(
                        "Failed to initialize Tesseract: {}",
                        e
                    ))
                })?
            }
        };

        tess.set_page_seg_mode(match options.segmentation {
            Segmentation::UniformBlock => PageSegMode::PsmSingleBlock,
            Segmentation::Auto => PageSegMode::PsmAuto,
        });
        Ok(tess)
    }

    /// Apply option variables one by one. A rejected variable consumes the
    /// instance, so a new one is built and the accepted variables replayed.
    fn configure(
        &self,
        datapath: &str,
        language: &str,
        options: &RecognitionOptions,
    ) -> Result<Tesseract, PipelineError> {
        let mut tess = self.init(datapath, language, options)?;
        let mut accepted: Vec<(&'static str, String)> = Vec::new();

        for (name, value) in variables(options) {
            match tess.set_variable(name, &value) {
                Ok(configured) => {
                    tess = configured;
                    accepted.push((name, value));
                }
                Err(e) => {
                    tracing::debug!("Tesseract ignored {}={}: {}", name, value, e);
                    tess = self.init(datapath, language, options)?;
                    for (name, value) in &accepted {
                        tess = tess.set_variable(name, value).map_err(|e| {
                            PipelineError::Ocr(format!("Failed to restore {}: {}", name, e))
                        })?;
                    }
                }
            }
        }

        Ok(tess)
    }
}

const DEFAULT_LANGUAGE: &str = "eng";

fn bool_var(on: bool) -> String {
    if on { "1" } else { "0" }.to_string()
}

/// Tesseract variables for the options that have one.
fn variables(options: &RecognitionOptions) -> Vec<(&'static str, String)> {
    let mut vars = Vec::new();
    if let Some(allow_list) = &options.allow_list {
        vars.push(("tessedit_char_whitelist", allow_list.clone()));
    }
    vars.push(("load_system_dawg", bool_var(options.dictionary)));
    vars.push(("load_freq_dawg", bool_var(options.dictionary)));
    vars.push(("tessedit_enable_bigram_correction", bool_var(options.bigrams)));
    vars.push(("wordrec_enable_assoc", bool_var(options.associations)));
    vars
}

impl PageOcrAdapter for TesseractAdapter {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn description(&self) -> &'static str {
        "Tesseract OCR engine - LSTM recognition, many languages"
    }

    fn recognize(
        &self,
        image: &RasterImage,
        language: &Language,
        options: &RecognitionOptions,
    ) -> Result<String, PipelineError> {
        let language = language.resolve(&self.default_language);
        let datapath = self.ensure_tessdata(language, options.accuracy)?;

        // BMP is always supported by leptonica
        let rgb_img = image.as_dynamic().to_rgb8();
        let (width, height) = rgb_img.dimensions();
        let mut bmp_data = Vec::new();
        rgb_img
            .write_to(&mut std::io::Cursor::new(&mut bmp_data), image::ImageFormat::Bmp)
            .map_err(|e| PipelineError::Ocr(format!("Failed to convert to BMP: {}", e)))?;

        tracing::debug!(
            "Recognizing {}x{} page with language {}",
            width,
            height,
            language
        );

        let tess = self.configure(&datapath, language, options)?;
        let tess = tess.set_image_from_mem(&bmp_data).map_err(|e| {
            PipelineError::Ocr(format!(
                "Failed to set image ({}x{}, {} bytes): {}",
                width,
                height,
                bmp_data.len(),
                e
            ))
        })?;

        let mut tess = tess
            .recognize()
            .map_err(|e| PipelineError::Ocr(format!("Failed to recognize text: {}", e)))?;

        tess.get_text()
            .map_err(|e| PipelineError::Ocr(format!("Failed to get text: {}", e)))
    }

    fn supported_languages(&self) -> Vec<String> {
        // Any tessdata language works; these are the common ones
        [
            "eng", "deu", "fra", "spa", "ita", "por", "nld", "hin", "jpn", "chi_sim", "chi_tra",
            "kor", "ara", "rus",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}
