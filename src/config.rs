use crate::engine::Language;
use clap::Parser;
use serde::Serialize;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "readaloud-ocr-server")]
#[command(about = "Turns scanned pages into clean, speech-ready text")]
#[command(version)]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "OCR_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "OCR_PORT", default_value = "9292")]
    pub port: u16,

    /// Default language for OCR (e.g., "eng", "deu", "fra", or "auto")
    #[arg(long, env = "OCR_DEFAULT_LANGUAGE", default_value = "eng", value_parser = Language::parse)]
    pub default_language: Language,

    /// Maximum upload size in bytes (default: 50MB)
    #[arg(long, env = "OCR_MAX_FILE_SIZE", default_value = "52428800")]
    pub max_file_size: usize,

    /// Path to tessdata directory (downloaded into the cache dir if not set)
    #[arg(long, env = "TESSDATA_PREFIX")]
    pub tessdata_path: Option<String>,

    /// OCR engine to use (defaults to the first compiled-in engine)
    #[arg(long, env = "OCR_ENGINE")]
    pub engine: Option<String>,

    /// Per-page OCR timeout in seconds
    #[arg(long, env = "OCR_PAGE_TIMEOUT_SECS", default_value = "120")]
    pub page_timeout_secs: u64,

    /// Number of pages processed concurrently (0 = available parallelism)
    #[arg(long, env = "OCR_MAX_CONCURRENT_PAGES", default_value = "0")]
    pub max_concurrent_pages: usize,

    /// Upscale factor applied before enhancement
    #[arg(long, env = "OCR_UPSCALE_FACTOR", default_value = "2.0")]
    pub upscale_factor: f32,

    /// Contrast enhancement factor
    #[arg(long, env = "OCR_CONTRAST_FACTOR", default_value = "3.0")]
    pub contrast_factor: f32,

    /// Sharpness enhancement factor
    #[arg(long, env = "OCR_SHARPNESS_FACTOR", default_value = "2.0")]
    pub sharpness_factor: f32,

    /// Minimum skew (degrees) before a page is rotated
    #[arg(long, env = "OCR_DESKEW_THRESHOLD", default_value = "0.5")]
    pub deskew_threshold: f32,

    /// Skip the single-character substitution rules
    #[arg(long, env = "OCR_DISABLE_CHAR_RULES")]
    pub disable_char_rules: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub max_file_size: usize,
    pub tessdata_path: Option<String>,
    pub engine: Option<String>,
    pub pipeline: PipelineConfig,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mut pipeline = PipelineConfig {
            language: args.default_language,
            page_timeout: Duration::from_secs(args.page_timeout_secs.max(1)),
            ..PipelineConfig::default()
        };
        if args.max_concurrent_pages > 0 {
            pipeline.max_concurrent_pages = args.max_concurrent_pages;
        }
        pipeline.enhance.upscale_factor = args.upscale_factor;
        pipeline.enhance.contrast_factor = args.contrast_factor;
        pipeline.enhance.sharpness_factor = args.sharpness_factor;
        pipeline.enhance.deskew_threshold_deg = args.deskew_threshold;
        pipeline.correction.char_rules = !args.disable_char_rules;

        Self {
            host: args.host,
            port: args.port,
            max_file_size: args.max_file_size,
            tessdata_path: args.tessdata_path,
            engine: args.engine,
            pipeline,
        }
    }
}

/// Settings for one document run. Cloned per document and never mutated
/// while that document is being processed.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub language: Language,
    pub enhance: EnhanceConfig,
    pub correction: CorrectionPasses,
    #[serde(serialize_with = "serialize_secs")]
    pub page_timeout: Duration,
    pub max_concurrent_pages: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            language: Language::Auto,
            enhance: EnhanceConfig::default(),
            correction: CorrectionPasses::default(),
            page_timeout: Duration::from_secs(120),
            max_concurrent_pages: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl PipelineConfig {
    /// Same settings with a different OCR language.
    pub fn with_language(&self, language: Language) -> Self {
        Self {
            language,
            ..self.clone()
        }
    }
}

fn serialize_secs<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_secs())
}

/// Numeric knobs for the image enhancement stages.
#[derive(Debug, Clone, Serialize)]
pub struct EnhanceConfig {
    pub upscale_factor: f32,
    pub contrast_factor: f32,
    pub sharpness_factor: f32,
    /// Bilateral filter neighbourhood diameter in pixels.
    pub denoise_diameter: u32,
    pub denoise_sigma_color: f32,
    pub denoise_sigma_space: f32,
    /// Adaptive threshold neighbourhood size (odd).
    pub adaptive_block_size: u32,
    /// Subtracted from the neighbourhood mean before comparing.
    pub adaptive_bias: i32,
    /// Side of the square element used by the "open" pass.
    pub open_size: u32,
    /// Radius of the square element used by the "close" pass (1 = 3x3).
    pub close_radius: u8,
    pub deskew_threshold_deg: f32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            upscale_factor: 2.0,
            contrast_factor: 3.0,
            sharpness_factor: 2.0,
            denoise_diameter: 9,
            denoise_sigma_color: 75.0,
            denoise_sigma_space: 75.0,
            adaptive_block_size: 11,
            adaptive_bias: 2,
            open_size: 2,
            close_radius: 1,
            deskew_threshold_deg: 0.5,
        }
    }
}

/// Which text correction passes run. All enabled by default.
#[derive(Debug, Clone, Serialize)]
pub struct CorrectionPasses {
    /// Multi-character rules of the correction table.
    pub rule_table: bool,
    /// Single-character rules of the correction table.
    pub char_rules: bool,
    /// Letter spacing, punctuation spacing and title abbreviations.
    pub spacing: bool,
    pub duplicate_words: bool,
    pub domain_phrases: bool,
    pub sentence_closing: bool,
}

impl Default for CorrectionPasses {
    fn default() -> Self {
        Self {
            rule_table: true,
            char_rules: true,
            spacing: true,
            duplicate_words: true,
            domain_phrases: true,
            sentence_closing: true,
        }
    }
}
