pub mod encode;
pub mod extract;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use encode::{data_url, encode_png, EncodeError};
pub use extract::{extract_date, extract_total, Extractor, FieldPattern};
pub use pipeline::{PipelineError, ReceiptPipeline};
pub use preprocess::{preprocess, preprocess_bytes, DecodeError, NormalizedImage, SourceImage};
pub use recognizer::{
    ExclusiveBackend, MockRecognizer, OcrBackend, OcrError, SerializedRecognizer,
};
pub use types::{ExtractedFields, ScanResult};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
