use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tillroll_ocr::{MockRecognizer, OcrBackend, OcrError};

/// Path of an optional TOML config file.
pub const CONFIG_ENV: &str = "TILLROLL_CONFIG";
/// Overrides `bind` from the file.
pub const BIND_ENV: &str = "TILLROLL_BIND";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid bind address '{0}'")]
    Bind(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub max_upload_bytes: usize,
    pub log_format: LogFormat,
    pub recognizer: RecognizerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            max_upload_bytes: 20 * 1024 * 1024,
            log_format: LogFormat::default(),
            recognizer: RecognizerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    /// Bunyan-style JSON lines.
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Returns `fragments` for every image.
    #[default]
    Mock,
    Tesseract,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecognizerConfig {
    pub backend: Backend,
    pub lang: String,
    pub data_path: Option<String>,
    pub fragments: Vec<String>,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Mock,
            lang: "eng".into(),
            data_path: None,
            fragments: vec![],
        }
    }
}

impl ServerConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// `$TILLROLL_CONFIG` if set, else defaults; then `$TILLROLL_BIND`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        if let Ok(bind) = std::env::var(BIND_ENV) {
            config.override_bind(&bind)?;
        }
        Ok(config)
    }

    pub fn override_bind(&mut self, bind: &str) -> Result<(), ConfigError> {
        self.bind = bind
            .parse()
            .map_err(|_| ConfigError::Bind(bind.to_string()))?;
        Ok(())
    }
}

impl RecognizerConfig {
    /// Build the process-wide recognizer. Called once at startup.
    pub fn build(&self) -> Result<Arc<dyn OcrBackend>, OcrError> {
        match self.backend {
            Backend::Mock => Ok(Arc::new(MockRecognizer::new(self.fragments.clone()))),
            Backend::Tesseract => self.build_tesseract(),
        }
    }

    #[cfg(feature = "tesseract")]
    fn build_tesseract(&self) -> Result<Arc<dyn OcrBackend>, OcrError> {
        let recognizer = tillroll_ocr::TesseractRecognizer::new(self.data_path.clone(), &self.lang)?;
        Ok(Arc::new(recognizer))
    }

    #[cfg(not(feature = "tesseract"))]
    fn build_tesseract(&self) -> Result<Arc<dyn OcrBackend>, OcrError> {
        Err(OcrError::NotAvailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind.to_string(), "127.0.0.1:8000");
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(config.recognizer.lang, "eng");
    }

    #[test]
    fn full_file_parses() {
        let config = ServerConfig::from_toml(
            r#"
            bind = "0.0.0.0:9000"
            max_upload_bytes = 1024
            log_format = "json"

            [recognizer]
            backend = "tesseract"
            lang = "eng"
            data_path = "/usr/share/tessdata"
            "#,
        )
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.max_upload_bytes, 1024);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.recognizer.backend, Backend::Tesseract);
        assert_eq!(config.recognizer.data_path.as_deref(), Some("/usr/share/tessdata"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = ServerConfig::from_toml("bnid = \"0.0.0.0:1\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let err = ServerConfig::from_toml("[recognizer]\nbackend = \"easyocr\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn bind_override() {
        let mut config = ServerConfig::default();
        config.override_bind("0.0.0.0:8080").unwrap();
        assert_eq!(config.bind.port(), 8080);
        assert!(matches!(config.override_bind("localhost"), Err(ConfigError::Bind(_))));
    }

    #[test]
    fn missing_file_is_read_error() {
        let err = ServerConfig::from_file(Path::new("/nonexistent/tillroll.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn mock_backend_builds() {
        let config = RecognizerConfig {
            fragments: vec!["TOTAL 1.00".into()],
            ..RecognizerConfig::default()
        };
        let recognizer = config.build().unwrap();
        let image = tillroll_ocr::preprocess(
            &tillroll_ocr::SourceImage::from_rgb(image::RgbImage::new(2, 2)).unwrap(),
        );
        assert_eq!(recognizer.recognize(&image).unwrap(), vec!["TOTAL 1.00"]);
    }

    #[cfg(not(feature = "tesseract"))]
    #[test]
    fn tesseract_without_feature_is_unavailable() {
        let config = RecognizerConfig {
            backend: Backend::Tesseract,
            ..RecognizerConfig::default()
        };
        assert!(matches!(config.build(), Err(OcrError::NotAvailable)));
    }
}
