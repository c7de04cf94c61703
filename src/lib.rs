//! Scanned page to speech-ready text.
//!
//! Each page is enhanced for recognition, handed to an OCR engine, and the
//! raw output is normalized and corrected. Pages of a document are processed
//! independently; one failed page never takes the others down with it.

pub mod config;
pub mod document;
pub mod engine;
pub mod engines;
pub mod error;
pub mod preprocessing;
pub mod raster;
pub mod rasterize;
pub mod server;
pub mod text;

pub use config::{CorrectionPasses, EnhanceConfig, PipelineConfig};
pub use document::{DocumentPipeline, DocumentResult, PageResult};
pub use engine::{Language, PageOcrAdapter, RecognitionOptions};
pub use error::{PageError, PageErrorKind, PipelineError};
pub use preprocessing::{Enhanced, EnhancementOutcome, ImageEnhancer};
pub use raster::RasterImage;
pub use text::{normalize, TextCorrector};
