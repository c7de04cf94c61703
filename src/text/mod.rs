pub mod corrector;
pub mod normalizer;

pub use corrector::{CorrectionRule, RuleScope, TextCorrector, CORRECTION_RULES};
pub use normalizer::normalize;
