//! Multi-page orchestration: enhance, recognize, normalize and correct each
//! page, keeping one page's failure away from its siblings.

use crate::config::PipelineConfig;
use crate::engine::{PageOcrAdapter, RecognitionOptions};
use crate::error::{PageError, PipelineError};
use crate::preprocessing::{EnhancementOutcome, ImageEnhancer};
use crate::raster::RasterImage;
use crate::text::{normalize, TextCorrector};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Character limit used for the speech hand-off text.
pub const DEFAULT_SPEECH_CHARS: usize = 5000;

/// Outcome for a single page. Built once by the pipeline and read-only after.
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    index: usize,
    raw_text: String,
    normalized_text: String,
    corrected_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    enhancement: Option<EnhancementOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<PageError>,
}

impl PageResult {
    fn failed(index: usize, err: PipelineError) -> Self {
        Self {
            index,
            raw_text: String::new(),
            normalized_text: String::new(),
            corrected_text: String::new(),
            enhancement: None,
            error: Some(PageError::from(err)),
        }
    }

    /// 1-based position of the page in the source document.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn normalized_text(&self) -> &str {
        &self.normalized_text
    }

    pub fn corrected_text(&self) -> &str {
        &self.corrected_text
    }

    pub fn enhancement(&self) -> Option<&EnhancementOutcome> {
        self.enhancement.as_ref()
    }

    pub fn error(&self) -> Option<&PageError> {
        self.error.as_ref()
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// All pages of one document, in source order.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentResult {
    pages: Vec<PageResult>,
    success: bool,
}

impl DocumentResult {
    fn new(pages: Vec<PageResult>) -> Self {
        let success = pages.iter().any(PageResult::is_ok);
        Self { pages, success }
    }

    pub fn pages(&self) -> &[PageResult] {
        &self.pages
    }

    /// True when at least one page produced text.
    pub fn success(&self) -> bool {
        self.success
    }

    /// Concatenated `"Page N:\n<text>\n\n"` blocks in page order. Failed
    /// pages carry an error marker in place of their text.
    pub fn to_text(&self) -> String {
        self.pages
            .iter()
            .map(|page| match &page.error {
                None => format!("Page {}:\n{}\n\n", page.index, page.corrected_text),
                Some(err) => format!("Page {}:\n[Error: {}]\n\n", page.index, err),
            })
            .collect()
    }

    /// Corrected text of the successful pages, separated by blank lines and
    /// cut to at most `max_chars` characters.
    pub fn speech_text(&self, max_chars: usize) -> String {
        let joined = self
            .pages
            .iter()
            .filter(|page| page.is_ok())
            .map(|page| page.corrected_text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        match joined.char_indices().nth(max_chars) {
            Some((cut, _)) => joined[..cut].trim_end().to_string(),
            None => joined,
        }
    }
}

/// Runs every page of a document through enhancement, the OCR adapter,
/// normalization and correction.
///
/// Pages run concurrently up to `PipelineConfig::max_concurrent_pages`; the
/// result always lists them in input order.
pub struct DocumentPipeline {
    adapter: Arc<dyn PageOcrAdapter>,
    options: RecognitionOptions,
}

impl DocumentPipeline {
    pub fn new(adapter: Arc<dyn PageOcrAdapter>) -> Self {
        Self {
            adapter,
            options: RecognitionOptions::default(),
        }
    }

    /// Replace the option bundle sent with every recognition call.
    pub fn with_options(mut self, options: RecognitionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn adapter(&self) -> &Arc<dyn PageOcrAdapter> {
        &self.adapter
    }

    pub fn options(&self) -> &RecognitionOptions {
        &self.options
    }

    /// Process decoded pages. Fails only when `pages` is empty.
    pub async fn process(
        &self,
        pages: Vec<RasterImage>,
        config: &PipelineConfig,
    ) -> Result<DocumentResult, PipelineError> {
        self.process_sources(pages.into_iter().map(Ok).collect(), config)
            .await
    }

    /// Process pages some of which may already have failed to load; those
    /// become errored pages in place.
    pub async fn process_sources(
        &self,
        pages: Vec<Result<RasterImage, PipelineError>>,
        config: &PipelineConfig,
    ) -> Result<DocumentResult, PipelineError> {
        if pages.is_empty() {
            return Err(PipelineError::NoPages);
        }

        let start = Instant::now();
        let page_count = pages.len();
        let config = Arc::new(config.clone());
        let width = config.max_concurrent_pages.max(1);

        let mut results: Vec<PageResult> = stream::iter(pages.into_iter().enumerate())
            .map(|(i, page)| self.process_page(i + 1, page, Arc::clone(&config)))
            .buffer_unordered(width)
            .collect()
            .await;
        results.sort_by_key(|page| page.index);

        let document = DocumentResult::new(results);
        let failed = document.pages.iter().filter(|p| !p.is_ok()).count();
        tracing::info!(
            "Processed {} page(s) in {}ms ({} failed)",
            page_count,
            start.elapsed().as_millis(),
            failed
        );

        Ok(document)
    }

    #[tracing::instrument(skip(self, page, config), fields(page = index))]
    async fn process_page(
        &self,
        index: usize,
        page: Result<RasterImage, PipelineError>,
        config: Arc<PipelineConfig>,
    ) -> PageResult {
        let result = self.run_page(index, page, &config).await;
        if let Some(err) = &result.error {
            tracing::warn!("Page {} failed: {}", index, err);
        }
        result
    }

    async fn run_page(
        &self,
        index: usize,
        page: Result<RasterImage, PipelineError>,
        config: &PipelineConfig,
    ) -> PageResult {
        let image = match page {
            Ok(image) => image,
            Err(e) => return PageResult::failed(index, e),
        };

        let enhancer = ImageEnhancer::new(config.enhance.clone());
        let enhanced = match tokio::task::spawn_blocking(move || enhancer.enhance(image)).await {
            Ok(Ok(enhanced)) => enhanced,
            Ok(Err(e)) => return PageResult::failed(index, e),
            Err(e) => {
                return PageResult::failed(
                    index,
                    PipelineError::Internal(format!("Enhancement task failed: {}", e)),
                )
            }
        };
        tracing::debug!(
            "Enhanced page in {}ms ({:?})",
            enhanced.total_time_ms,
            enhanced.outcome
        );
        let outcome = enhanced.outcome;

        let raw_text = match self.recognize(enhanced.image, config).await {
            Ok(text) => text,
            Err(e) => {
                return PageResult {
                    enhancement: Some(outcome),
                    ..PageResult::failed(index, e)
                }
            }
        };

        let normalized_text = normalize(&raw_text);
        if normalized_text.is_empty() {
            return PageResult {
                raw_text,
                enhancement: Some(outcome),
                ..PageResult::failed(index, PipelineError::EmptyText)
            };
        }

        let corrected_text = TextCorrector::new(config.correction.clone()).correct(&normalized_text);

        PageResult {
            index,
            raw_text,
            normalized_text,
            corrected_text,
            enhancement: Some(outcome),
            error: None,
        }
    }

    /// Run the adapter on a blocking thread, bounded by the page timeout.
    /// A timed-out call is abandoned; its thread finishes in the background.
    async fn recognize(
        &self,
        image: RasterImage,
        config: &PipelineConfig,
    ) -> Result<String, PipelineError> {
        let adapter = Arc::clone(&self.adapter);
        let options = self.options.clone();
        let language = config.language.clone();

        let task =
            tokio::task::spawn_blocking(move || adapter.recognize(&image, &language, &options));

        match tokio::time::timeout(config.page_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) if e.is_panic() => Err(PipelineError::Ocr("OCR engine panicked".to_string())),
            Ok(Err(e)) => Err(PipelineError::Internal(format!("OCR task failed: {}", e))),
            Err(_) => Err(PipelineError::OcrTimeout {
                timeout: config.page_timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(index: usize, text: &str) -> PageResult {
        PageResult {
            index,
            raw_text: text.to_string(),
            normalized_text: text.to_string(),
            corrected_text: text.to_string(),
            enhancement: Some(EnhancementOutcome::Full),
            error: None,
        }
    }

    #[test]
    fn test_to_text_labels_pages_and_errors() {
        let doc = DocumentResult::new(vec![
            page(1, "first page"),
            PageResult::failed(2, PipelineError::Ocr("engine down".to_string())),
        ]);

        assert!(doc.success());
        assert_eq!(
            doc.to_text(),
            "Page 1:\nfirst page\n\nPage 2:\n[Error: OCR failed: engine down]\n\n"
        );
    }

    #[test]
    fn test_all_failed_pages_is_not_success() {
        let doc = DocumentResult::new(vec![PageResult::failed(1, PipelineError::EmptyText)]);
        assert!(!doc.success());
        assert_eq!(doc.speech_text(DEFAULT_SPEECH_CHARS), "");
    }

    #[test]
    fn test_speech_text_joins_and_truncates_on_char_boundary() {
        let doc = DocumentResult::new(vec![
            page(1, "héllo"),
            PageResult::failed(2, PipelineError::EmptyText),
            page(3, "world"),
        ]);

        assert_eq!(doc.speech_text(100), "héllo\n\nworld");
        assert_eq!(doc.speech_text(2), "hé");
        assert_eq!(doc.speech_text(6), "héllo");
    }

    #[test]
    fn test_page_result_serializes_error_kind() {
        let json =
            serde_json::to_value(PageResult::failed(4, PipelineError::EmptyText)).unwrap();
        assert_eq!(json["index"], 4);
        assert_eq!(json["error"]["kind"], "empty_text");
        assert!(json.get("enhancement").is_none());
    }
}
