//! Test utilities: an in-memory application with stub extraction providers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum_test::TestServer;
use serde_json::{Value, json};
use tempfile::TempDir;

use crate::{
    AppState, Config,
    api::models::{
        expenses::ExpenseStatus,
        users::{CurrentUser, Role},
    },
    auth::{password, session},
    db::{
        InMemoryStore,
        models::{
            expenses::{ExpenseCreateDBRequest, ExpenseDBResponse, ExpenseFilter, NotesUpdate, StatusUpdateDBRequest},
            users::{UserCreateDBRequest, UserDBResponse},
        },
    },
    extraction::{
        ExtractionDraft, ExtractionError, ExtractionPipeline, FieldExtractor, FixedExchangeRate, TextExtractor, normalize,
    },
    storage::{FileStore, StoredFile},
    types::{ExpenseId, UserId},
};

/// Password given to every user created with [`TestApp::create_user`].
pub const TEST_PASSWORD: &str = "Password123";

/// Canned transcription.
pub enum StubText {
    Always(String),
    Empty,
    /// The image bytes read back as UTF-8.
    Echo,
}

impl StubText {
    pub fn always(text: &str) -> Self {
        StubText::Always(text.to_string())
    }

    pub fn empty() -> Self {
        StubText::Empty
    }

    pub fn echo() -> Self {
        StubText::Echo
    }
}

#[async_trait]
impl TextExtractor for StubText {
    async fn extract_text(&self, image: &[u8], _mime_type: &str) -> Result<String, ExtractionError> {
        match self {
            StubText::Always(text) => Ok(text.clone()),
            StubText::Empty => Err(ExtractionError::Empty),
            StubText::Echo => Ok(String::from_utf8_lossy(image).into_owned()),
        }
    }
}

/// Canned field extraction, keyed on the transcript or fixed.
pub struct StubFields {
    replies: Replies,
    calls: Arc<AtomicUsize>,
}

enum Replies {
    Always(Value),
    ByText(HashMap<String, Value>),
}

impl StubFields {
    pub fn always(value: Value) -> Self {
        Self {
            replies: Replies::Always(value),
            calls: Arc::default(),
        }
    }

    /// Unknown transcripts extract nothing.
    pub fn by_text<'a>(replies: impl IntoIterator<Item = (&'a str, Value)>) -> Self {
        Self {
            replies: Replies::ByText(replies.into_iter().map(|(text, value)| (text.to_string(), value)).collect()),
            calls: Arc::default(),
        }
    }

    /// Counter of `extract_fields` calls, shared with the stub.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl FieldExtractor for StubFields {
    async fn extract_fields(&self, text: &str, _usd_to_inr: f64) -> Result<ExtractionDraft, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = match &self.replies {
            Replies::Always(value) => value.clone(),
            Replies::ByText(replies) => replies.get(text).cloned().ok_or(ExtractionError::Empty)?,
        };
        let draft = ExtractionDraft::from_value(value);
        if draft.is_empty() {
            return Err(ExtractionError::Empty);
        }
        Ok(draft)
    }
}

/// A restaurant bill as the chat model would return it.
pub fn xyz_restaurant() -> Value {
    json!({
        "Date": "05-01-2024",
        "Bill Type": "food",
        "Currency Name": "INR",
        "Bill Amount": "₹500",
        "Bill Amount (INR)": "₹500",
        "Details": "XYZ Restaurant",
    })
}

pub struct TestUser {
    pub user: UserDBResponse,
    /// Bearer token for the user.
    pub token: String,
}

/// An application over an [`InMemoryStore`] with uploads in a temporary directory.
pub struct TestApp {
    pub state: AppState,
    pub uploads: TempDir,
}

pub fn create_test_config(uploads: &TempDir) -> Config {
    let mut config = Config::default();
    config.secret_key = Some("test-secret-key-for-sessions".to_string());
    config.uploads.folder = uploads.path().to_path_buf();
    config
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_stubs(StubText::empty(), StubFields::always(json!({})))
    }

    pub fn with_stubs(text: StubText, fields: StubFields) -> Self {
        let uploads = TempDir::new().expect("Failed to create upload directory");
        let config = create_test_config(&uploads);
        let pipeline = ExtractionPipeline::new(Arc::new(text), Arc::new(fields), Arc::new(FixedExchangeRate(83.0)));

        let state = AppState::builder()
            .store(Arc::new(InMemoryStore::new()))
            .files(FileStore::new(&config.uploads))
            .pipeline(pipeline)
            .config(config)
            .build();

        Self { state, uploads }
    }

    /// A server over the real router, built from the current state.
    pub fn server(&self) -> TestServer {
        let router = crate::build_router(self.state.clone()).expect("Failed to build router");
        TestServer::new(router).expect("Failed to create test server")
    }

    pub async fn create_user(&self, email: &str, role: Role) -> TestUser {
        let user = self
            .state
            .store
            .create_user(&UserCreateDBRequest {
                email: email.to_lowercase(),
                password_hash: password::hash_string(TEST_PASSWORD).expect("Failed to hash password"),
                role,
            })
            .await
            .expect("Failed to create test user");
        let token = session::create_session_token(&CurrentUser::from(&user), &self.state.config).expect("Failed to create token");
        TestUser { user, token }
    }

    /// Insert an expense whose bill file was never written.
    pub async fn insert_expense(&self, user_id: UserId, bill: Value) -> ExpenseDBResponse {
        let stored = StoredFile {
            path: self.state.files.root().join(user_id.to_string()).join(format!("{}.png", uuid::Uuid::new_v4())),
        };
        self.insert_expense_at(user_id, &stored, bill).await
    }

    pub async fn insert_expense_at(&self, user_id: UserId, stored: &StoredFile, bill: Value) -> ExpenseDBResponse {
        self.state
            .store
            .create_expense(&ExpenseCreateDBRequest {
                user_id,
                image_path: stored.path_string(),
                extracted_data: normalize(ExtractionDraft::from_value(bill)),
                status: ExpenseStatus::Pending,
            })
            .await
            .expect("Failed to insert expense")
    }

    pub async fn approve(&self, id: ExpenseId) -> ExpenseDBResponse {
        self.state
            .store
            .update_expense_status(
                id,
                &StatusUpdateDBRequest {
                    status: ExpenseStatus::Approved,
                    notes: NotesUpdate::Keep,
                },
            )
            .await
            .expect("Failed to approve expense")
    }

    /// Files currently on disk in the user's upload folder.
    pub fn stored_files(&self, user_id: UserId) -> usize {
        match std::fs::read_dir(self.uploads.path().join(user_id.to_string())) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }

    pub async fn all_expenses(&self) -> Vec<ExpenseDBResponse> {
        self.state
            .store
            .list_expenses(&ExpenseFilter::default())
            .await
            .expect("Failed to list expenses")
    }
}
