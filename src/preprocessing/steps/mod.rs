//! Individual enhancement stages, in pipeline order:
//! resize, contrast, sharpen, grayscale, denoise, threshold, morphology, deskew

pub mod contrast;
pub mod denoise;
pub mod deskew;
pub mod grayscale;
pub mod morphology;
pub mod resize;
pub mod sharpen;
pub mod threshold;
