//! Image enhancement that conditions a raw page bitmap for OCR.

pub mod pipeline;
pub mod steps;

pub use pipeline::{Enhanced, EnhancementOutcome, ImageEnhancer, StepTiming};
