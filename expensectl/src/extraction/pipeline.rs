//! Orchestration of one upload, from stored file to persisted expense.
//!
//! ```text
//! Saved ─▶ TextExtracted ─▶ FieldsExtracted ─▶ Normalized ─▶ Validated ─▶ Persisted
//!   └────────────┴────────────────┴────────────────┴─────────────┴──▶ Failed (file deleted)
//! ```
//!
//! A record is inserted exactly once, after validation. Any failure, including the insert itself,
//! removes the stored file before the error is returned.

use std::sync::Arc;

use futures::{StreamExt, stream};
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::{
    ExtractionError, ExchangeRateProvider, FieldExtractor, NormalizedBill, TextExtractor, normalize,
    validate::{ValidationError, validate},
    vision::mime_for_path,
};
use crate::{
    api::models::expenses::ExpenseStatus,
    db::{
        Store,
        errors::DbError,
        models::expenses::{ExpenseCreateDBRequest, ExpenseDBResponse},
    },
    errors::Error,
    storage::{FileStore, StoredFile},
    types::{UserId, abbrev_uuid},
};

/// Files of one batch extracted at the same time. Outbound calls are further bounded by the
/// completions client.
const BATCH_CONCURRENCY: usize = 4;

const EXTRACTION_FAILED: &str =
    "Failed to extract bill data from image. Please ensure the image is clear and contains readable text.";

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("failed to read stored file: {0}")]
    Read(#[source] std::io::Error),

    #[error(transparent)]
    Store(#[from] DbError),

    /// A batch where no file produced a valid bill
    #[error("no structured data extracted")]
    NothingExtracted,
}

impl From<PipelineError> for Error {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Extraction(_) | PipelineError::Read(_) => Error::bad_request(EXTRACTION_FAILED),
            PipelineError::Invalid(reason) => Error::bad_request(format!(
                "Invalid extracted data: {reason}. Please ensure the bill image is clear and contains visible date and amount information."
            )),
            PipelineError::Store(db) => Error::Database(db),
            PipelineError::NothingExtracted => Error::bad_request("No structured data extracted"),
        }
    }
}

/// Result of a multi-file upload.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub created: Vec<ExpenseDBResponse>,
    /// Files that failed extraction or validation
    pub skipped: usize,
    /// Files whose bill matched an earlier file in the batch exactly
    pub duplicates: usize,
}

#[derive(Clone)]
pub struct ExtractionPipeline {
    text: Arc<dyn TextExtractor>,
    fields: Arc<dyn FieldExtractor>,
    rates: Arc<dyn ExchangeRateProvider>,
}

impl ExtractionPipeline {
    pub fn new(text: Arc<dyn TextExtractor>, fields: Arc<dyn FieldExtractor>, rates: Arc<dyn ExchangeRateProvider>) -> Self {
        Self { text, fields, rates }
    }

    /// Image bytes to a normalized, not yet validated, bill.
    ///
    /// The exchange rate is only looked up once there is text to extract fields from.
    pub async fn extract(&self, image: &[u8], mime_type: &str) -> Result<NormalizedBill, ExtractionError> {
        let text = self.text.extract_text(image, mime_type).await?;
        let rate = self.rates.usd_to_inr().await;
        let draft = self.fields.extract_fields(&text, rate).await?;
        Ok(normalize(draft))
    }

    async fn extract_file(&self, files: &FileStore, stored: &StoredFile) -> Result<NormalizedBill, PipelineError> {
        let image = files.read(&stored.path).await.map_err(PipelineError::Read)?;
        Ok(self.extract(&image, mime_for_path(&stored.path)).await?)
    }

    /// Run one stored file through the pipeline and persist it.
    #[instrument(skip(self, files, store, stored), fields(user_id = %abbrev_uuid(&user_id), file = %stored.path.display()), err)]
    pub async fn process(
        &self,
        files: &FileStore,
        store: &dyn Store,
        user_id: UserId,
        stored: StoredFile,
    ) -> Result<ExpenseDBResponse, PipelineError> {
        let result = async {
            let bill = self.extract_file(files, &stored).await?;
            validate(&bill)?;
            persist(store, user_id, &stored, bill).await
        }
        .await;

        match &result {
            Ok(expense) => info!(expense_id = %abbrev_uuid(&expense.id), "Expense created"),
            Err(e) => {
                warn!("Extraction pipeline failed: {e}");
                files.delete(&stored.path).await;
            }
        }
        result
    }

    /// Multi-file upload: failed files are skipped, exact duplicate bills collapse to the first
    /// occurrence, and the remaining valid bills are persisted in upload order.
    #[instrument(skip(self, files, store, stored), fields(user_id = %abbrev_uuid(&user_id), count = stored.len()), err)]
    pub async fn process_batch(
        &self,
        files: &FileStore,
        store: &dyn Store,
        user_id: UserId,
        stored: Vec<StoredFile>,
    ) -> Result<BatchOutcome, PipelineError> {
        let extracted: Vec<(StoredFile, Result<NormalizedBill, PipelineError>)> = stream::iter(stored)
            .map(|file| async move {
                let result = self.extract_file(files, &file).await;
                (file, result)
            })
            .buffered(BATCH_CONCURRENCY)
            .collect()
            .await;

        let mut outcome = BatchOutcome::default();
        let mut unique: Vec<(StoredFile, NormalizedBill)> = Vec::new();
        for (file, result) in extracted {
            match result {
                Ok(bill) if unique.iter().any(|(_, seen)| *seen == bill) => {
                    outcome.duplicates += 1;
                    files.delete(&file.path).await;
                }
                Ok(bill) => unique.push((file, bill)),
                Err(e) => {
                    warn!(file = %file.path.display(), "Skipping file: {e}");
                    outcome.skipped += 1;
                    files.delete(&file.path).await;
                }
            }
        }

        let mut pending = unique.into_iter();
        while let Some((file, bill)) = pending.next() {
            if let Err(reason) = validate(&bill) {
                warn!(file = %file.path.display(), "Skipping file: {reason}");
                outcome.skipped += 1;
                files.delete(&file.path).await;
                continue;
            }

            match persist(store, user_id, &file, bill).await {
                Ok(expense) => outcome.created.push(expense),
                Err(e) => {
                    files.delete(&file.path).await;
                    for (rest, _) in pending {
                        files.delete(&rest.path).await;
                    }
                    return Err(e);
                }
            }
        }

        if outcome.created.is_empty() {
            return Err(PipelineError::NothingExtracted);
        }
        info!(created = outcome.created.len(), skipped = outcome.skipped, duplicates = outcome.duplicates, "Batch processed");
        Ok(outcome)
    }
}

async fn persist(store: &dyn Store, user_id: UserId, stored: &StoredFile, bill: NormalizedBill) -> Result<ExpenseDBResponse, PipelineError> {
    let request = ExpenseCreateDBRequest {
        user_id,
        image_path: stored.path_string(),
        extracted_data: bill,
        status: ExpenseStatus::Pending,
    };
    Ok(store.create_expense(&request).await?)
}
