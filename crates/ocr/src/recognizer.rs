use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::preprocess::NormalizedImage;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available — build with `tesseract` feature")]
    NotAvailable,
}

/// Abstraction over a text-recognition engine.
/// Implementations receive the binarized image and return text fragments in
/// the engine's scan order.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image: &NormalizedImage) -> Result<Vec<String>, OcrError>;
}

impl<R: OcrBackend + ?Sized> OcrBackend for Arc<R> {
    fn recognize(&self, image: &NormalizedImage) -> Result<Vec<String>, OcrError> {
        (**self).recognize(image)
    }
}

impl<R: OcrBackend + ?Sized> OcrBackend for Box<R> {
    fn recognize(&self, image: &NormalizedImage) -> Result<Vec<String>, OcrError> {
        (**self).recognize(image)
    }
}

/// Split engine output into trimmed, non-empty lines.
pub fn split_fragments(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect()
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns preset fragments regardless of the image.
pub struct MockRecognizer {
    pub fragments: Vec<String>,
}

impl MockRecognizer {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { fragments: fragments.into_iter().map(Into::into).collect() }
    }

    /// One fragment per non-empty line of `text`.
    pub fn from_text(text: &str) -> Self {
        Self { fragments: split_fragments(text) }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image: &NormalizedImage) -> Result<Vec<String>, OcrError> {
        Ok(self.fragments.clone())
    }
}

// ── Serialized access for engines that are not thread-safe ────────────────────

/// An engine that needs exclusive access for each call.
pub trait ExclusiveBackend: Send {
    fn recognize(&mut self, image: &NormalizedImage) -> Result<Vec<String>, OcrError>;
}

/// Shares one [`ExclusiveBackend`] between threads by running calls one at a time.
pub struct SerializedRecognizer<E> {
    inner: Mutex<E>,
}

impl<E: ExclusiveBackend> SerializedRecognizer<E> {
    pub fn new(engine: E) -> Self {
        Self { inner: Mutex::new(engine) }
    }
}

impl<E: ExclusiveBackend> OcrBackend for SerializedRecognizer<E> {
    fn recognize(&self, image: &NormalizedImage) -> Result<Vec<String>, OcrError> {
        let mut engine = self
            .inner
            .lock()
            .map_err(|_| OcrError::Engine("recognizer lock poisoned".into()))?;
        engine.recognize(image)
    }
}

// ── Tesseract backend (optional, gated behind `tesseract` feature) ─────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{split_fragments, OcrBackend, OcrError};
    use crate::preprocess::NormalizedImage;
    use leptess::LepTess;
    use std::sync::mpsc;
    use std::thread;

    type Job = (Vec<u8>, mpsc::Sender<Result<String, OcrError>>);

    /// Tesseract loaded once on a dedicated thread that owns the engine.
    /// Calls are queued and run one at a time.
    pub struct TesseractRecognizer {
        jobs: mpsc::Sender<Job>,
    }

    impl TesseractRecognizer {
        pub fn new(data_path: Option<String>, lang: &str) -> Result<Self, OcrError> {
            let (jobs, queue) = mpsc::channel::<Job>();
            let (ready_tx, ready_rx) = mpsc::channel();
            let lang = lang.to_string();

            thread::Builder::new()
                .name("tesseract".into())
                .spawn(move || {
                    let mut lt = match LepTess::new(data_path.as_deref(), &lang) {
                        Ok(lt) => {
                            let _ = ready_tx.send(Ok(()));
                            lt
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(OcrError::Engine(e.to_string())));
                            return;
                        }
                    };
                    for (png, reply) in queue {
                        let result = lt
                            .set_image_from_mem(&png)
                            .map_err(|e| OcrError::ImageDecode(e.to_string()))
                            .and_then(|_| {
                                lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))
                            });
                        let _ = reply.send(result);
                    }
                })
                .map_err(|e| OcrError::Engine(e.to_string()))?;

            ready_rx
                .recv()
                .map_err(|_| OcrError::Engine("tesseract worker exited during startup".into()))??;
            Ok(Self { jobs })
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image: &NormalizedImage) -> Result<Vec<String>, OcrError> {
            let png = image
                .to_png()
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            let (reply_tx, reply_rx) = mpsc::channel();
            self.jobs
                .send((png, reply_tx))
                .map_err(|_| OcrError::Engine("tesseract worker stopped".into()))?;
            let text = reply_rx
                .recv()
                .map_err(|_| OcrError::Engine("tesseract worker stopped".into()))??;
            Ok(split_fragments(&text))
        }
    }
}
