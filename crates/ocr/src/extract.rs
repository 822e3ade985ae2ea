use std::sync::OnceLock;

use regex::Regex;

use crate::types::ExtractedFields;

// ── Patterns ─────────────────────────────────────────────────────────────────

/// Day/month/year with `/` or `-` separators. Purely syntactic: `99/99/99`
/// matches, and day/month order is not interpreted.
pub const DATE_PATTERN: &str = r"(\d{1,2}[/-]\d{1,2}[/-]\d{2,4})";

/// `TOTAL` or `AMOUNT DUE`, any non-digit run, then an amount with exactly two
/// decimals. Thousands separators and whole amounts are not matched.
pub const TOTAL_PATTERN: &str = r"(?i)\b(?:TOTAL|AMOUNT DUE)[^\d]*(\d+\.\d{2})";

pub static DATE: FieldPattern = FieldPattern::new("date", DATE_PATTERN);
pub static TOTAL: FieldPattern = FieldPattern::new("total", TOTAL_PATTERN);

/// A field rule: a lazily compiled regex whose first capture group is the value.
pub struct FieldPattern {
    name: &'static str,
    pattern: &'static str,
    compiled: OnceLock<Regex>,
}

impl FieldPattern {
    pub const fn new(name: &'static str, pattern: &'static str) -> Self {
        Self { name, pattern, compiled: OnceLock::new() }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn regex(&self) -> &Regex {
        self.compiled
            .get_or_init(|| Regex::new(self.pattern).expect("invalid regex"))
    }

    /// First capture of the leftmost match, verbatim.
    pub fn find_first<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.regex().captures(text)?.get(1).map(|m| m.as_str())
    }
}

// ── Public extraction API ────────────────────────────────────────────────────

pub fn extract_date(text: &str) -> Option<String> {
    DATE.find_first(text).map(str::to_owned)
}

pub fn extract_total(text: &str) -> Option<String> {
    TOTAL.find_first(text).map(str::to_owned)
}

pub struct Extractor;

impl Extractor {
    /// Extract structured fields from raw OCR text.
    pub fn extract(ocr_text: &str) -> ExtractedFields {
        ExtractedFields {
            date: extract_date(ocr_text),
            total: extract_total(ocr_text),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
