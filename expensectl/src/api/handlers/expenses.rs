use std::path::Path as FsPath;

use axum::{
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{
        StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    AppState,
    api::models::{
        envelope::ApiResponse,
        expenses::{BatchUploadResponse, ExpenseListResponse, ExpenseResponse, ExpenseStatus, ListExpensesQuery, parse_datetime_bound},
        users::CurrentUser,
    },
    db::models::expenses::ExpenseFilter,
    errors::Error,
    export::{self, ExportFormat, ExportScope, Report},
    extraction::{BillImage, documents},
    storage::StoredFile,
    types::UserId,
};

/// Multipart field holding a single bill
const FILE_FIELD: &str = "file";
/// Multipart field repeated once per bill on the batch endpoint
const FILES_FIELD: &str = "files";

pub(crate) fn multipart_error(err: MultipartError) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge {
            message: "File too large".to_string(),
        }
    } else {
        Error::bad_request(err.body_text())
    }
}

/// How a listing treats a date bound that does not parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DateBounds {
    /// Unparseable bounds are dropped
    Lenient,
    /// Unparseable bounds are a 400
    Strict,
}

fn date_bound(raw: Option<&str>, name: &str, bounds: DateBounds) -> Result<Option<chrono::DateTime<Utc>>, Error> {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    match (parse_datetime_bound(raw), bounds) {
        (Some(at), _) => Ok(Some(at)),
        (None, DateBounds::Lenient) => Ok(None),
        (None, DateBounds::Strict) => Err(Error::bad_request(format!(
            "Invalid {name} format. Use ISO format (YYYY-MM-DDTHH:MM:SS)"
        ))),
    }
}

/// Store filter for a listing query, or `None` when the query cannot match anything (an unknown
/// status or owner).
pub(crate) fn build_filter(query: &ListExpensesQuery, owner: Option<UserId>, bounds: DateBounds) -> Result<Option<ExpenseFilter>, Error> {
    let created_from = date_bound(query.date_from.as_deref(), "date_from", bounds)?;
    let created_to = date_bound(query.date_to.as_deref(), "date_to", bounds)?;

    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => match raw.parse::<ExpenseStatus>() {
            Ok(status) => Some(status),
            Err(_) => return Ok(None),
        },
    };

    let user_id = match (owner, query.user_id.as_deref().filter(|s| !s.is_empty())) {
        (Some(owner), _) => Some(owner),
        (None, None) => None,
        (None, Some(raw)) => match Uuid::parse_str(raw) {
            Ok(id) => Some(id),
            Err(_) => return Ok(None),
        },
    };

    Ok(Some(ExpenseFilter {
        user_id,
        status,
        created_from,
        created_to,
    }))
}

/// Serve a rendered report as a download.
pub(crate) fn attachment(report: Report) -> Response {
    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, report.content_type.to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename={}", report.filename)),
        ],
        report.bytes,
    )
        .into_response()
}

pub(crate) async fn render_export(
    state: &AppState,
    filter: Option<ExpenseFilter>,
    format: Option<&str>,
    scope: ExportScope,
) -> Result<Response, Error> {
    let expenses = match filter {
        Some(filter) => state.store.list_expenses(&filter).await?,
        None => Vec::new(),
    };
    if expenses.is_empty() {
        return Err(Error::not_found("No expenses found to export"));
    }

    let mut rows: Vec<ExpenseResponse> = expenses.into_iter().map(ExpenseResponse::from).collect();
    if scope == ExportScope::All {
        rows = super::hr::with_owner_emails(state, rows).await?;
    }

    let report = export::render(ExportFormat::from_query(format), scope, &rows, Utc::now())?;
    info!(count = rows.len(), file = %report.filename, "Expenses exported");
    Ok(attachment(report))
}

const NO_IMAGES: &str = "No valid images found in the file";

/// Check one uploaded file and split it into the bill images it carries.
///
/// Archives are only accepted when `archives` is set; everything else must pass the upload rules.
async fn unpack_upload(state: &AppState, filename: Option<&str>, bytes: Bytes, archives: bool) -> Result<Vec<BillImage>, Error> {
    let extension = match filename.and_then(documents::extension_of) {
        Some(ext) if archives && ext == documents::ARCHIVE_EXTENSION => ext,
        _ => state.files.validate(filename, bytes.len() as u64)?,
    };

    let max_entry_size = state.files.max_file_size();
    let images = tokio::task::spawn_blocking(move || documents::bill_images(&extension, &bytes, max_entry_size))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("unpack upload: {e}"),
        })?
        .map_err(|e| {
            warn!(filename = ?filename, "Unreadable upload: {e}");
            Error::bad_request(NO_IMAGES)
        })?;

    if images.is_empty() {
        return Err(Error::bad_request(NO_IMAGES));
    }
    Ok(images)
}

/// Upload one bill and turn it into a pending expense. A PDF contributes its first embedded image.
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn upload(State(state): State<AppState>, user: CurrentUser, mut multipart: Multipart) -> Result<ApiResponse<ExpenseResponse>, Error> {
    let mut upload: Option<(Option<String>, Bytes)> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some(FILE_FIELD) {
            let filename = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            upload = Some((filename, bytes));
            break;
        }
    }

    let (filename, bytes) = upload.ok_or_else(|| Error::bad_request("No file provided"))?;
    let images = unpack_upload(&state, filename.as_deref(), bytes, false).await?;
    if images.len() > 1 {
        info!(images = images.len(), "Document holds several images, using the first");
    }
    let image = images.into_iter().next().ok_or_else(|| Error::bad_request(NO_IMAGES))?;
    let stored = state.files.save(user.id, &image.extension, &image.bytes).await?;

    let expense = state
        .pipeline
        .process(&state.files, state.store.as_ref(), user.id, stored)
        .await?;

    Ok(ApiResponse::created("Expense uploaded successfully", ExpenseResponse::from(expense)))
}

/// Upload several bills at once; identical bills are stored once.
///
/// Each part may be an image, a PDF or a ZIP archive of those. The whole body is read before
/// anything is written, so a broken request leaves nothing on disk.
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn upload_batch(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> Result<ApiResponse<BatchUploadResponse>, Error> {
    let mut parts: Vec<(Option<String>, Bytes)> = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if !matches!(field.name(), Some(FILES_FIELD) | Some(FILE_FIELD)) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        parts.push((filename, bytes));
    }

    if parts.is_empty() {
        return Err(Error::bad_request("No file provided"));
    }

    let mut rejected = 0usize;
    let mut images: Vec<BillImage> = Vec::new();
    for (filename, bytes) in parts {
        match unpack_upload(&state, filename.as_deref(), bytes, true).await {
            Ok(found) => images.extend(found),
            Err(e) => {
                warn!(filename = ?filename, "Rejected batch file: {}", e.user_message());
                rejected += 1;
            }
        }
    }

    let mut stored: Vec<StoredFile> = Vec::with_capacity(images.len());
    for image in images {
        match state.files.save(user.id, &image.extension, &image.bytes).await {
            Ok(file) => stored.push(file),
            Err(e) => {
                for file in &stored {
                    state.files.delete(&file.path).await;
                }
                return Err(e);
            }
        }
    }

    let outcome = state
        .pipeline
        .process_batch(&state.files, state.store.as_ref(), user.id, stored)
        .await?;

    let expenses: Vec<ExpenseResponse> = outcome.created.into_iter().map(ExpenseResponse::from).collect();
    let count = expenses.len();
    Ok(ApiResponse::created(
        format!("Uploaded {count} expense(s) successfully"),
        BatchUploadResponse {
            expenses,
            count,
            skipped: outcome.skipped + rejected,
            duplicates: outcome.duplicates,
        },
    ))
}

/// Caller's own expenses, newest first
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn list_mine(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<ListExpensesQuery>,
) -> Result<ApiResponse<ExpenseListResponse>, Error> {
    let expenses = match build_filter(&query, Some(user.id), DateBounds::Lenient)? {
        Some(filter) => state.store.list_expenses(&filter).await?,
        None => Vec::new(),
    };

    Ok(ApiResponse::ok(
        "Expenses retrieved successfully",
        ExpenseListResponse::new(expenses.into_iter().map(ExpenseResponse::from).collect()),
    ))
}

/// Caller's own expenses as CSV or XLSX
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn export_mine(State(state): State<AppState>, user: CurrentUser, Query(query): Query<ListExpensesQuery>) -> Result<Response, Error> {
    let filter = build_filter(&query, Some(user.id), DateBounds::Lenient)?;
    render_export(&state, filter, query.format.as_deref(), ExportScope::Own).await
}

/// Original bill file of an expense. Owner or HR only.
#[tracing::instrument(skip_all, fields(user_id = %user.id))]
pub async fn download_file(State(state): State<AppState>, user: CurrentUser, Path(expense_id): Path<String>) -> Result<Response, Error> {
    let not_found = || Error::not_found("Expense not found");
    let expense_id = Uuid::parse_str(&expense_id).map_err(|_| not_found())?;
    let expense = state.store.get_expense(expense_id).await?.ok_or_else(not_found)?;

    if expense.user_id != user.id && !user.is_hr() {
        return Err(Error::Forbidden {
            message: "Unauthorized access".to_string(),
        });
    }

    let path = FsPath::new(&expense.image_path);
    let bytes = state.files.read(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => Error::not_found("File not found"),
        _ => Error::Internal {
            operation: format!("read {}: {e}", path.display()),
        },
    })?;

    let content_type = mime_guess::from_path(path).first_or_octet_stream();
    let filename = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type.to_string()),
            (CONTENT_DISPOSITION, format!("attachment; filename={filename}")),
        ],
        bytes,
    )
        .into_response())
}
