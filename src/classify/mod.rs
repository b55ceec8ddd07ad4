//! Headline categorization.
//!
//! The pipeline treats the classifier as a pluggable collaborator behind
//! the [`Classifier`] trait; production uses [`LlmClassifier`] against an
//! OpenAI-compatible chat endpoint. Categories come from a fixed allowlist
//! and anything the model invents collapses to "general".

mod llm;

pub use llm::LlmClassifier;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Categories a headline may be labeled with.
pub const CATEGORIES: &[&str] = &[
    "politics",
    "business",
    "technology",
    "science",
    "health",
    "sports",
    "entertainment",
    "world",
    "local",
    "general",
];

/// Fallback category for anything outside the allowlist.
pub const FALLBACK_CATEGORY: &str = "general";

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Classifier API key not configured (set OPENAI_API_KEY or [classifier] api_key)")]
    MissingApiKey,
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
    #[error("Classification request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Invalid classifier response: {0}")]
    InvalidResponse(String),
}

impl ClassifyError {
    /// Returns true if the call may succeed when repeated. Configuration
    /// problems are fatal and must surface immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClassifyError::Timeout(_) | ClassifyError::Network(_) => true,
            ClassifyError::HttpStatus(status) => *status == 429 || *status >= 500,
            ClassifyError::MissingApiKey
            | ClassifyError::InsecureBaseUrl
            | ClassifyError::InvalidResponse(_) => false,
        }
    }
}

/// Maps headline text to a category from [`CATEGORIES`].
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<String, ClassifyError>;
}

/// Collapse a raw model reply onto the category allowlist.
///
/// Exact match (after trimming whitespace, quotes, and trailing
/// punctuation) wins; otherwise the first allowlisted word anywhere in
/// the reply; otherwise [`FALLBACK_CATEGORY`].
pub fn normalize_category(raw: &str) -> String {
    let cleaned = raw
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c == '!' || c == ':')
        .to_ascii_lowercase();

    if CATEGORIES.contains(&cleaned.as_str()) {
        return cleaned;
    }

    for token in cleaned.split(|c: char| !c.is_ascii_alphabetic()) {
        if !token.is_empty() && CATEGORIES.contains(&token) {
            return token.to_string();
        }
    }

    FALLBACK_CATEGORY.to_string()
}
