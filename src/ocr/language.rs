//! Language key normalization
//!
//! Tesseract identifies models by language code, and multiple models can be
//! combined with `+` (e.g. `tha+eng` runs both the Thai and English models).
//! Requests spell the same combination in different surface forms, so every
//! specifier is normalized to one canonical key before it touches the pool.

use std::fmt;

/// Languages the API accepts, either alone or combined with `+`.
pub const SUPPORTED_LANGUAGES: &[&str] = &[
    "tha", "eng", "chi_sim", "chi_tra", "jpn", "kor", "fra", "deu", "spa",
];

/// Canonical identifier for one or more combined OCR language models.
///
/// Normalization: trim, lower-case, split on `+` and internal whitespace,
/// drop empty segments, re-join with `+`. `"tha + eng"`, `" tha+eng "` and
/// `"THA ENG"` all map to `"tha+eng"`, so they share one pooled engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LanguageKey(String);

impl LanguageKey {
    pub fn normalize(spec: &str) -> Self {
        let key = spec
            .to_lowercase()
            .split(|c: char| c == '+' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("+");
        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether every code in the key is one of the supported languages.
    ///
    /// An empty key (whitespace-only specifier) is not valid.
    pub fn is_supported(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .split('+')
                .all(|code| SUPPORTED_LANGUAGES.contains(&code))
    }
}

impl fmt::Display for LanguageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
