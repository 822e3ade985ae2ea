use serde::{Deserialize, Serialize};

/// Fields pulled out of recognized receipt text.
///
/// A `None` means the pattern was not found; that is a normal outcome, not an
/// error. Values are the matched substrings verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub date: Option<String>,
    pub total: Option<String>,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.total.is_none()
    }
}

/// The result returned to the caller for one uploaded receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub filename: String,
    /// Recognized fragments joined with `\n`.
    pub raw_text: String,
    pub date: Option<String>,
    pub total: Option<String>,
    /// The binarized image as a `data:image/png;base64,...` URL.
    pub processed_image: String,
}

impl ScanResult {
    pub fn fields(&self) -> ExtractedFields {
        ExtractedFields {
            date: self.date.clone(),
            total: self.total.clone(),
        }
    }
}
