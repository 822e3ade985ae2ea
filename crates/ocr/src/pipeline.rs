use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::encode::EncodeError;
use crate::extract::Extractor;
use crate::preprocess::{self, DecodeError, SourceImage};
use crate::recognizer::{OcrBackend, OcrError};
use crate::types::ScanResult;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("OCR recognition failed: {0}")]
    Recognition(#[from] OcrError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

/// Orchestrates: decode → preprocess → OCR → extract → encode.
///
/// The recognizer is built once by the caller and injected here; every call
/// is otherwise independent.
pub struct ReceiptPipeline<R: OcrBackend> {
    recognizer: R,
}

impl<R: OcrBackend> ReceiptPipeline<R> {
    pub fn new(recognizer: R) -> Self {
        Self { recognizer }
    }

    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    /// Process a file on disk; its file name becomes the result's `filename`.
    pub async fn process_file(&self, path: &Path) -> Result<ScanResult, PipelineError> {
        let bytes = tokio::fs::read(path).await?;
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        self.process_bytes(filename, &bytes)
    }

    /// Process raw uploaded bytes. Any decode or recognition failure aborts
    /// the whole run; missing fields do not.
    pub fn process_bytes(&self, filename: &str, data: &[u8]) -> Result<ScanResult, PipelineError> {
        // 1. Decode and normalize.
        let source = SourceImage::decode(data)?;
        let normalized = preprocess::preprocess(&source);
        drop(source);

        // 2. Run OCR.
        let fragments = self.recognizer.recognize(&normalized)?;
        let raw_text = fragments.join("\n");

        // 3. Extract structured fields.
        let fields = Extractor::extract(&raw_text);

        // 4. Encode the processed image for the caller.
        let processed_image = normalized.to_data_url()?;

        info!(
            filename,
            width = normalized.width(),
            height = normalized.height(),
            fragments = fragments.len(),
            date_found = fields.date.is_some(),
            total_found = fields.total.is_some(),
            "receipt processed"
        );

        Ok(ScanResult {
            filename: filename.to_string(),
            raw_text,
            date: fields.date,
            total: fields.total,
            processed_image,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
