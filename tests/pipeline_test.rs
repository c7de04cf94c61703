use image::{GrayImage, Luma};
use readaloud_ocr::{
    DocumentPipeline, Language, PageErrorKind, PageOcrAdapter, PipelineConfig, PipelineError,
    RasterImage, RecognitionOptions,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the fake engine does for a page, keyed by the page image width
#[derive(Clone)]
enum Script {
    Text(&'static str),
    SlowText(&'static str, Duration),
    Fail(&'static str),
    Panic,
}

struct ScriptedEngine {
    scripts: HashMap<u32, Script>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    fn new(scripts: impl IntoIterator<Item = (u32, Script)>) -> Arc<Self> {
        Arc::new(Self {
            scripts: scripts.into_iter().collect(),
            calls: AtomicUsize::new(0),
        })
    }
}

impl PageOcrAdapter for ScriptedEngine {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn description(&self) -> &'static str {
        "Fake engine driven by page width"
    }

    fn recognize(
        &self,
        image: &RasterImage,
        _language: &Language,
        _options: &RecognitionOptions,
    ) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.scripts.get(&image.width()) {
            Some(Script::Text(text)) => Ok(text.to_string()),
            Some(Script::SlowText(text, delay)) => {
                std::thread::sleep(*delay);
                Ok(text.to_string())
            }
            Some(Script::Fail(msg)) => Err(PipelineError::Ocr(msg.to_string())),
            Some(Script::Panic) => panic!("engine blew up"),
            None => Err(PipelineError::Ocr(format!("no script for width {}", image.width()))),
        }
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["eng".to_string()]
    }
}

/// Page with a few dark strokes; the width identifies it to the fake engine
fn page(width: u32) -> RasterImage {
    RasterImage::from_luma(GrayImage::from_fn(width, 24, |x, y| {
        if (8..14).contains(&y) && x % 7 < 3 {
            Luma([25])
        } else {
            Luma([235])
        }
    }))
}

fn config(workers: usize) -> PipelineConfig {
    let mut config = PipelineConfig {
        max_concurrent_pages: workers,
        page_timeout: Duration::from_secs(10),
        ..PipelineConfig::default()
    };
    config.enhance.upscale_factor = 1.0;
    config
}

#[tokio::test]
async fn test_pages_keep_input_order_under_concurrency() {
    // Earlier pages take longer, so they finish last
    let engine = ScriptedEngine::new([
        (41, Script::SlowText("first page text", Duration::from_millis(300))),
        (42, Script::SlowText("second page text", Duration::from_millis(150))),
        (43, Script::SlowText("third page text", Duration::from_millis(10))),
    ]);
    let pipeline = DocumentPipeline::new(engine);

    let result = pipeline
        .process(vec![page(41), page(42), page(43)], &config(3))
        .await
        .unwrap();

    let indices: Vec<usize> = result.pages().iter().map(|p| p.index()).collect();
    assert_eq!(indices, vec![1, 2, 3]);
    let texts: Vec<&str> = result.pages().iter().map(|p| p.corrected_text()).collect();
    assert_eq!(texts, vec!["first page text", "second page text", "third page text"]);
    assert!(result.success());
}

#[tokio::test]
async fn test_failure_on_one_page_is_isolated() {
    let engine = ScriptedEngine::new([
        (41, Script::Text("alpha page")),
        (42, Script::Fail("engine crashed")),
        (43, Script::Text("gamma page")),
        (44, Script::Panic),
        (45, Script::Text("epsilon page")),
    ]);
    let pipeline = DocumentPipeline::new(engine.clone());

    let pages = (41..=45).map(page).collect();
    let result = pipeline.process(pages, &config(2)).await.unwrap();

    assert_eq!(result.pages().len(), 5);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 5);

    let second = &result.pages()[1];
    assert_eq!(second.error().unwrap().kind, PageErrorKind::Ocr);
    assert!(second.error().unwrap().message.contains("engine crashed"));

    let fourth = &result.pages()[3];
    assert_eq!(fourth.error().unwrap().kind, PageErrorKind::Ocr);

    for (i, text) in [(0, "alpha page"), (2, "gamma page"), (4, "epsilon page")] {
        assert!(result.pages()[i].is_ok());
        assert_eq!(result.pages()[i].corrected_text(), text);
    }

    assert_eq!(
        result.to_text(),
        "Page 1:\nalpha page\n\n\
         Page 2:\n[Error: OCR failed: engine crashed]\n\n\
         Page 3:\ngamma page\n\n\
         Page 4:\n[Error: OCR failed: OCR engine panicked]\n\n\
         Page 5:\nepsilon page\n\n"
    );
}

#[tokio::test]
async fn test_slow_engine_times_out_and_document_continues() {
    let engine = ScriptedEngine::new([
        (41, Script::SlowText("too late", Duration::from_millis(1500))),
        (42, Script::Text("on time")),
    ]);
    let pipeline = DocumentPipeline::new(engine);
    let config = PipelineConfig {
        page_timeout: Duration::from_millis(200),
        ..config(2)
    };

    let result = pipeline
        .process(vec![page(41), page(42)], &config)
        .await
        .unwrap();

    let first = result.pages()[0].error().unwrap();
    assert_eq!(first.kind, PageErrorKind::Ocr);
    assert_eq!(first.message, "OCR timed out after 200ms");
    assert_eq!(result.pages()[1].corrected_text(), "on time");
}

#[tokio::test]
async fn test_all_pages_failing_still_returns_a_document() {
    let engine = ScriptedEngine::new([
        (41, Script::Fail("nope")),
        (42, Script::Text("   \n ## \n Page 2 of 2")),
    ]);
    let pipeline = DocumentPipeline::new(engine);

    let result = pipeline
        .process(vec![page(41), page(42)], &config(1))
        .await
        .unwrap();

    assert!(!result.success());
    assert_eq!(result.pages()[0].error().unwrap().kind, PageErrorKind::Ocr);

    let empty = &result.pages()[1];
    assert_eq!(empty.error().unwrap().kind, PageErrorKind::EmptyText);
    assert_eq!(empty.raw_text(), "   \n ## \n Page 2 of 2");
    assert_eq!(result.speech_text(5000), "");
}

#[tokio::test]
async fn test_unreadable_sources_and_empty_images_become_page_errors() {
    let engine = ScriptedEngine::new([(41, Script::Text("readable page"))]);
    let pipeline = DocumentPipeline::new(engine.clone());

    let sources = vec![
        Err(PipelineError::ImageRead("corrupt scan".to_string())),
        Ok(page(41)),
        Ok(RasterImage::from_luma(GrayImage::new(0, 0))),
    ];
    let result = pipeline.process_sources(sources, &config(2)).await.unwrap();

    assert_eq!(result.pages()[0].error().unwrap().kind, PageErrorKind::ImageRead);
    assert_eq!(result.pages()[1].corrected_text(), "readable page");
    assert_eq!(result.pages()[2].error().unwrap().kind, PageErrorKind::Enhancement);
    assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_text_is_normalized_then_corrected() {
    let engine = ScriptedEngine::new([(
        41,
        Script::Text("Page 1\nthe the cat cat sat ,on tbe mat\n- 2 -"),
    )]);
    let pipeline = DocumentPipeline::new(engine);

    let result = pipeline.process(vec![page(41)], &config(1)).await.unwrap();
    let only = &result.pages()[0];

    assert_eq!(only.normalized_text(), "the the cat cat sat, on tbe mat");
    assert_eq!(only.corrected_text(), "the the cat sat, on the mat.");
}

/// Reports the allow-list it was given
struct AllowListProbe;

impl PageOcrAdapter for AllowListProbe {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn description(&self) -> &'static str {
        "Echoes the allow-list"
    }

    fn recognize(
        &self,
        _image: &RasterImage,
        _language: &Language,
        options: &RecognitionOptions,
    ) -> Result<String, PipelineError> {
        Ok(match &options.allow_list {
            Some(list) => format!("allowed {}", list),
            None => "no allow list".to_string(),
        })
    }

    fn supported_languages(&self) -> Vec<String> {
        vec!["eng".to_string()]
    }
}

#[tokio::test]
async fn test_recognition_options_reach_the_engine() {
    let options = RecognitionOptions {
        allow_list: Some("abc".to_string()),
        ..RecognitionOptions::default()
    };
    let pipeline = DocumentPipeline::new(Arc::new(AllowListProbe)).with_options(options);

    let result = pipeline.process(vec![page(41)], &config(1)).await.unwrap();
    assert_eq!(result.pages()[0].corrected_text(), "allowed abc");

    let plain = DocumentPipeline::new(Arc::new(AllowListProbe)).with_options(RecognitionOptions {
        allow_list: None,
        ..RecognitionOptions::default()
    });
    let result = plain.process(vec![page(41)], &config(1)).await.unwrap();
    assert_eq!(result.pages()[0].corrected_text(), "no allow list");
}

#[tokio::test]
async fn test_empty_document_is_an_error() {
    let pipeline = DocumentPipeline::new(ScriptedEngine::new([]));
    let err = pipeline.process(Vec::new(), &config(1)).await.unwrap_err();
    assert!(matches!(err, PipelineError::NoPages));
}

#[test]
fn test_blocking_caller() {
    let engine = ScriptedEngine::new([(41, Script::Text("from a plain thread"))]);
    let pipeline = DocumentPipeline::new(engine);

    let result = tokio_test::block_on(pipeline.process(vec![page(41)], &config(1))).unwrap();
    assert_eq!(result.pages()[0].corrected_text(), "from a plain thread");
}
