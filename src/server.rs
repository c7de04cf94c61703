use crate::config::{Config, PipelineConfig};
use crate::document::{DocumentPipeline, PageResult, DEFAULT_SPEECH_CHARS};
use crate::engine::Language;
use crate::engines::{EngineInfo, EngineRegistry};
use crate::error::PipelineError;
use crate::raster::RasterImage;
use crate::rasterize;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and headers on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

const SUPPORTED_FORMATS: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/bmp",
    "image/webp",
    "image/tiff",
    "application/pdf",
];

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DocumentPipeline>,
    pub config: Arc<Config>,
    pub engines: Arc<Vec<EngineInfo>>,
}

impl AppState {
    pub fn new(pipeline: DocumentPipeline, config: Config, engines: Vec<EngineInfo>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
            engines: Arc::new(engines),
        }
    }
}

/// OCR response
#[derive(Serialize)]
pub struct OcrResponse {
    /// All pages as `Page N:` blocks
    pub text: String,
    pub pages: Vec<PageResult>,
    pub success: bool,
    /// Text to hand to a speech synthesizer
    pub speech_text: String,
    pub language: Language,
    pub engine: String,
    pub processing_time_ms: u64,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Server info response
#[derive(Serialize)]
pub struct InfoResponse {
    pub version: String,
    pub engine: String,
    pub engines: Vec<EngineInfo>,
    pub supported_formats: Vec<String>,
    pub supported_languages: Vec<String>,
    pub max_file_size_bytes: usize,
    pub pipeline: PipelineConfig,
}

/// Routes with tracing and the upload limit applied
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_file_size.saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/ocr", post(handle_ocr))
        .route("/health", get(handle_health))
        .route("/info", get(handle_info))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: Config) -> anyhow::Result<()> {
    let registry = EngineRegistry::new(&config)?;
    let adapter = registry.default().ok_or_else(|| {
        PipelineError::InitializationError("Default engine missing from registry".to_string())
    })?;
    tracing::info!("Using OCR engine: {}", adapter.name());

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(DocumentPipeline::new(adapter), config, registry.info());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Handle OCR requests
async fn handle_ocr(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<OcrResponse>, PipelineError> {
    let start = Instant::now();

    let mut file_data: Option<Bytes> = None;
    let mut language: Option<String> = None;

    // Parse multipart form
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PipelineError::InvalidRequest(format!("Failed to parse multipart: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();

        match name.as_str() {
            "file" => {
                if let Some(mime) = field.content_type() {
                    if !SUPPORTED_FORMATS.contains(&mime) {
                        tracing::warn!("Received file with content type: {}", mime);
                    }
                }
                file_data = Some(field.bytes().await.map_err(|e| {
                    PipelineError::InvalidRequest(format!("Failed to read file data: {}", e))
                })?);
            }
            "language" | "languages" => {
                language = Some(field.text().await.map_err(|e| {
                    PipelineError::InvalidRequest(format!("Invalid language: {}", e))
                })?);
            }
            _ => {
                // Ignore unknown fields
            }
        }
    }

    let data = file_data.ok_or(PipelineError::MissingFile)?;

    if data.len() > state.config.max_file_size {
        return Err(PipelineError::ImageTooLarge {
            size: data.len(),
            max: state.config.max_file_size,
        });
    }

    // The per-request language lives on a copy; the shared config is never touched
    let config = match language.as_deref() {
        Some(lang) => state.config.pipeline.with_language(Language::parse(lang)?),
        None => state.config.pipeline.clone(),
    };

    let pages = if rasterize::is_pdf(&data) {
        rasterize::pdf_pages(&data)?
    } else {
        vec![RasterImage::decode(&data)]
    };

    let document = state.pipeline.process_sources(pages, &config).await?;
    let processing_time_ms = start.elapsed().as_millis() as u64;

    tracing::info!(
        "OCR completed in {}ms, {} page(s), success: {}",
        processing_time_ms,
        document.pages().len(),
        document.success()
    );

    Ok(Json(OcrResponse {
        text: document.to_text(),
        speech_text: document.speech_text(DEFAULT_SPEECH_CHARS),
        success: document.success(),
        pages: document.pages().to_vec(),
        language: config.language,
        engine: state.pipeline.adapter().name().to_string(),
        processing_time_ms,
    }))
}

/// Handle health check requests
async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle info requests
async fn handle_info(State(state): State<AppState>) -> impl IntoResponse {
    Json(InfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: state.pipeline.adapter().name().to_string(),
        engines: state.engines.as_ref().clone(),
        supported_formats: SUPPORTED_FORMATS.iter().map(|s| s.to_string()).collect(),
        supported_languages: state.pipeline.adapter().supported_languages(),
        max_file_size_bytes: state.config.max_file_size,
        pipeline: state.config.pipeline.clone(),
    })
}
