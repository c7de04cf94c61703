//! OCR engine adapters
//!
//! Each adapter implements `PageOcrAdapter` for one recognition backend.
//! Adapters are conditionally compiled based on feature flags and built once
//! at startup; the chosen one is handed to the document pipeline.

#[cfg(feature = "engine-ocrs")]
pub mod ocrs;

#[cfg(feature = "engine-tesseract")]
pub mod tesseract;

use crate::config::Config;
use crate::engine::PageOcrAdapter;
use crate::error::PipelineError;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Name of the directory under the user cache dir holding models and tessdata.
const CACHE_DIR_NAME: &str = "readaloud-ocr";

/// Upper bound on a single model or tessdata download.
const MAX_DOWNLOAD_BYTES: u64 = 512 * 1024 * 1024;

/// Information about an available engine
#[derive(Debug, Clone, Serialize)]
pub struct EngineInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub supported_languages: Vec<String>,
}

/// Registry of available OCR engines
pub struct EngineRegistry {
    engines: Vec<Arc<dyn PageOcrAdapter>>,
    default_engine: String,
}

impl EngineRegistry {
    /// Create a new engine registry with all available engines initialized
    #[allow(unused_variables, unused_mut)]
    pub fn new(config: &Config) -> Result<Self, PipelineError> {
        let mut engines: Vec<Arc<dyn PageOcrAdapter>> = Vec::new();

        #[cfg(feature = "engine-ocrs")]
        {
            tracing::info!("Initializing ocrs engine...");
            engines.push(Arc::new(ocrs::OcrsAdapter::new()?));
        }

        #[cfg(feature = "engine-tesseract")]
        {
            tracing::info!("Initializing tesseract engine...");
            engines.push(Arc::new(tesseract::TesseractAdapter::new(config)?));
        }

        Self::from_engines(engines, config.engine.as_deref())
    }

    /// Build a registry from already constructed adapters. `preferred` picks
    /// the default by name, otherwise the first adapter is the default.
    pub fn from_engines(
        engines: Vec<Arc<dyn PageOcrAdapter>>,
        preferred: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let first = engines.first().ok_or_else(|| {
            PipelineError::InitializationError(
                "No OCR engines available. Build with --features engine-ocrs or --features engine-tesseract"
                    .to_string(),
            )
        })?;

        let default_engine = match preferred {
            Some(name) if engines.iter().any(|e| e.name() == name) => name.to_string(),
            Some(name) => {
                return Err(PipelineError::InitializationError(format!(
                    "Unknown OCR engine '{}'. Available: {}",
                    name,
                    engines
                        .iter()
                        .map(|e| e.name())
                        .collect::<Vec<_>>()
                        .join(", ")
                )))
            }
            None => first.name().to_string(),
        };

        Ok(Self {
            engines,
            default_engine,
        })
    }

    /// Get an engine by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn PageOcrAdapter>> {
        self.engines.iter().find(|e| e.name() == name).cloned()
    }

    /// Get the default engine
    pub fn default(&self) -> Option<Arc<dyn PageOcrAdapter>> {
        self.get(&self.default_engine)
    }

    /// Get the default engine name
    pub fn default_name(&self) -> &str {
        &self.default_engine
    }

    /// List all available engine names
    pub fn list(&self) -> Vec<&str> {
        self.engines.iter().map(|e| e.name()).collect()
    }

    /// Get info about all available engines
    pub fn info(&self) -> Vec<EngineInfo> {
        self.engines
            .iter()
            .map(|e| EngineInfo {
                name: e.name(),
                description: e.description(),
                supported_languages: e.supported_languages(),
            })
            .collect()
    }
}

/// Directory under the user cache dir, created if missing.
#[allow(dead_code)]
pub(crate) fn cache_dir(subdir: Option<&str>) -> Result<PathBuf, PipelineError> {
    let mut dir = dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(CACHE_DIR_NAME);
    if let Some(subdir) = subdir {
        dir = dir.join(subdir);
    }

    std::fs::create_dir_all(&dir).map_err(|e| {
        PipelineError::InitializationError(format!("Failed to create cache directory: {}", e))
    })?;
    Ok(dir)
}

/// Return `dir/filename`, downloading it from `url` first if it isn't cached.
#[allow(dead_code)]
pub(crate) fn ensure_downloaded(url: &str, dir: &Path, filename: &str) -> Result<PathBuf, PipelineError> {
    let path = dir.join(filename);

    if !path.exists() {
        tracing::info!("Downloading {} (this may take a moment)...", filename);
        download_file(url, &path)?;
        tracing::info!("Downloaded {} to {:?}", filename, path);
    } else {
        tracing::info!("Using cached {} from {:?}", filename, path);
    }

    Ok(path)
}

/// Download a file from URL to path using ureq.
///
/// The body is streamed to disk; model files are larger than ureq's default
/// in-memory read limit.
fn download_file(url: &str, path: &Path) -> Result<(), PipelineError> {
    let response = ureq::get(url).call().map_err(|e| {
        PipelineError::InitializationError(format!("Failed to download {}: {}", url, e))
    })?;

    let mut reader = response
        .into_body()
        .into_with_config()
        .limit(MAX_DOWNLOAD_BYTES)
        .reader();

    // Only a complete file ever appears at `path`
    let partial = path.with_extension("part");
    let mut file = File::create(&partial).map_err(|e| {
        PipelineError::InitializationError(format!("Failed to create {:?}: {}", partial, e))
    })?;
    let copied = std::io::copy(&mut reader, &mut file).and_then(|n| file.flush().map(|_| n));
    let bytes = match copied {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = std::fs::remove_file(&partial);
            return Err(PipelineError::InitializationError(format!(
                "Failed to read response body from {}: {}",
                url, e
            )));
        }
    };
    std::fs::rename(&partial, path).map_err(|e| {
        PipelineError::InitializationError(format!("Failed to move {:?} into place: {}", path, e))
    })?;

    tracing::debug!("Wrote {} bytes to {:?}", bytes, path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Language, RecognitionOptions};
    use crate::raster::RasterImage;

    struct Named(&'static str);

    impl PageOcrAdapter for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> &'static str {
            "test engine"
        }

        fn recognize(
            &self,
            _image: &RasterImage,
            _language: &Language,
            _options: &RecognitionOptions,
        ) -> Result<String, PipelineError> {
            Ok(self.0.to_string())
        }

        fn supported_languages(&self) -> Vec<String> {
            vec!["eng".to_string()]
        }
    }

    fn engines() -> Vec<Arc<dyn PageOcrAdapter>> {
        vec![Arc::new(Named("first")), Arc::new(Named("second"))]
    }

    #[test]
    fn test_first_engine_is_default() {
        let registry = EngineRegistry::from_engines(engines(), None).unwrap();
        assert_eq!(registry.default_name(), "first");
        assert_eq!(registry.list(), vec!["first", "second"]);
    }

    #[test]
    fn test_preferred_engine_is_default() {
        let registry = EngineRegistry::from_engines(engines(), Some("second")).unwrap();
        assert_eq!(registry.default().unwrap().name(), "second");
        assert_eq!(registry.info()[1].supported_languages, vec!["eng"]);
    }

    #[test]
    fn test_unknown_or_missing_engines_fail() {
        assert!(EngineRegistry::from_engines(engines(), Some("nope")).is_err());
        assert!(EngineRegistry::from_engines(Vec::new(), None).is_err());
    }

    /// Serve `body` once over HTTP/1.1 on a loopback port
    fn serve_once(body: Vec<u8>) -> String {
        use std::io::{BufRead, BufReader};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            while reader.read_line(&mut line).unwrap() > 0 && line != "\r\n" {
                line.clear();
            }

            let mut stream = stream;
            let header = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            stream.write_all(header.as_bytes()).unwrap();
            stream.write_all(&body).unwrap();
        });

        format!("http://{}/model.bin", addr)
    }

    #[test]
    fn test_download_larger_than_default_body_limit() {
        let body: Vec<u8> = (0..15_400_601u32).map(|i| (i % 251) as u8).collect();
        let url = serve_once(body.clone());
        let dir = tempfile::tempdir().unwrap();

        let path = ensure_downloaded(&url, dir.path(), "eng.traineddata").unwrap();

        assert_eq!(path, dir.path().join("eng.traineddata"));
        assert_eq!(std::fs::read(&path).unwrap(), body);
        assert!(!dir.path().join("eng.part").exists());
    }

    #[test]
    fn test_cached_file_is_not_downloaded_again() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("cached.rten"), b"model").unwrap();

        // Nothing listens on this port; a download attempt would fail
        let path = ensure_downloaded("http://127.0.0.1:9/cached.rten", dir.path(), "cached.rten")
            .unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"model");
    }
}
