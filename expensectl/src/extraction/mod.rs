//! Bill extraction pipeline.
//!
//! An uploaded image goes through two outbound LLM calls and two deterministic steps:
//!
//! ```text
//! image ─▶ TextExtractor ─▶ bill text ─▶ FieldExtractor ─▶ ExtractionDraft
//!                                                               │
//!                             ExpenseRecord ◀─ validate ◀─ normalize
//! ```
//!
//! The extractors sit behind traits so tests (and other providers) can swap them. Normalization and
//! validation never depend on which provider produced the draft.

pub mod completions;
pub mod documents;
pub mod draft;
pub mod exchange_rate;
pub mod fields;
pub mod normalize;
pub mod pipeline;
pub mod validate;
pub mod vision;

pub use documents::{BillImage, DocumentError, bill_images};
pub use draft::{BillType, ExtractionDraft, Meridiem, NormalizedBill};
pub use exchange_rate::{ExchangeRateProvider, FixedExchangeRate, HttpExchangeRate};
pub use fields::{ChatFieldExtractor, FieldExtractor};
pub use normalize::normalize;
pub use pipeline::{BatchOutcome, ExtractionPipeline, PipelineError};
pub use validate::{ValidationError, validate};
pub use vision::{TextExtractor, VisionTextExtractor};

use thiserror::Error;

/// Why an extraction step produced nothing.
///
/// [`ExtractionError::Empty`] means the call worked but there was nothing usable in it; every other
/// variant means the call itself failed. Callers outside the pipeline treat both the same way.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("no usable data extracted")]
    Empty,

    #[error("completion API key is not configured")]
    NotConfigured,

    #[error("completion API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected completion response: {reason}")]
    Malformed { reason: String },

    #[error("outbound request limiter is closed")]
    LimiterClosed,
}

impl ExtractionError {
    /// True for "nothing usable", false for a failed call.
    pub fn is_empty(&self) -> bool {
        matches!(self, ExtractionError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_distinguished_from_failures() {
        assert!(ExtractionError::Empty.is_empty());
        assert!(!ExtractionError::NotConfigured.is_empty());
        assert!(
            !ExtractionError::Api {
                status: 500,
                body: "boom".to_string()
            }
            .is_empty()
        );
        assert!(
            !ExtractionError::Malformed {
                reason: "no choices".to_string()
            }
            .is_empty()
        );
    }
}
