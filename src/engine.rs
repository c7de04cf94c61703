use crate::error::PipelineError;
use crate::raster::RasterImage;
use serde::{Serialize, Serializer};
use std::fmt;

/// OCR language tag: an engine language code such as "eng", or "auto" to
/// let the engine use its configured default.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Auto,
    Code(String),
}

impl Language {
    /// Parse a language tag. A code is one or more `[A-Za-z0-9_]` segments
    /// joined by `+` (e.g. "eng", "chi_sim", "eng+deu"); codes end up in
    /// tessdata file names, so nothing else is accepted.
    pub fn parse(s: &str) -> Result<Self, PipelineError> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }

        let valid = trimmed.split('+').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
        if !valid {
            return Err(PipelineError::InvalidRequest(format!(
                "Invalid language code '{}'",
                trimmed
            )));
        }

        Ok(Self::Code(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Auto => "auto",
            Self::Code(code) => code,
        }
    }

    /// The concrete code to hand to an engine, substituting `fallback` for "auto".
    pub fn resolve<'a>(&'a self, fallback: &'a str) -> &'a str {
        match self {
            Self::Auto => fallback,
            Self::Code(code) => code,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Language {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Characters the recognizer is asked to restrict itself to.
pub const DEFAULT_ALLOW_LIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789.,:;!?-()[]{}\"'/\\ ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    Fast,
    Best,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    Legacy,
    Lstm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Segmentation {
    Auto,
    /// Treat the page as one uniform block of text.
    UniformBlock,
}

/// Option bundle passed with every recognition call.
///
/// Engines apply what they support and silently ignore the rest.
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionOptions {
    pub accuracy: Accuracy,
    pub engine_mode: EngineMode,
    pub segmentation: Segmentation,
    pub allow_list: Option<String>,
    pub dictionary: bool,
    pub bigrams: bool,
    pub associations: bool,
}

impl Default for RecognitionOptions {
    fn default() -> Self {
        Self {
            accuracy: Accuracy::Best,
            engine_mode: EngineMode::Lstm,
            segmentation: Segmentation::UniformBlock,
            allow_list: Some(DEFAULT_ALLOW_LIST.to_string()),
            dictionary: true,
            bigrams: true,
            associations: true,
        }
    }
}

/// Boundary to an external OCR engine: enhanced page image in, raw text out.
pub trait PageOcrAdapter: Send + Sync {
    /// Returns the engine identifier (e.g., "ocrs", "tesseract")
    fn name(&self) -> &'static str;

    /// Returns a human-readable description of the engine
    fn description(&self) -> &'static str;

    /// Recognize the text on one page. May block; callers bound it with a timeout.
    fn recognize(
        &self,
        image: &RasterImage,
        language: &Language,
        options: &RecognitionOptions,
    ) -> Result<String, PipelineError>;

    /// Get supported languages
    fn supported_languages(&self) -> Vec<String>;
}
