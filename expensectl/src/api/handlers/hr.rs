use axum::{
    Json,
    extract::{Path, Query, State},
    response::Response,
};
use tracing::info;
use uuid::Uuid;

use super::expenses::{DateBounds, build_filter, render_export};
use crate::{
    AppState,
    api::models::{
        envelope::ApiResponse,
        expenses::{BulkStatusResponse, BulkStatusUpdate, ExpenseListResponse, ExpenseResponse, ExpenseStatus, ListExpensesQuery, StatusUpdate},
    },
    auth::current_user::RequiresHr,
    db::{
        errors::DbError,
        models::expenses::{NotesUpdate, StatusUpdateDBRequest},
    },
    errors::Error,
    export::ExportScope,
    types::{ExpenseId, UserId},
};

/// Owner email shown for expenses whose user no longer exists
const UNKNOWN_OWNER: &str = "Unknown";

/// Attach each owner's email, looking all owners up at once.
pub(crate) async fn with_owner_emails(state: &AppState, expenses: Vec<ExpenseResponse>) -> Result<Vec<ExpenseResponse>, Error> {
    let mut owners: Vec<UserId> = expenses.iter().map(|e| e.user_id).collect();
    owners.sort_unstable();
    owners.dedup();
    let users = state.store.get_users_bulk(&owners).await?;

    Ok(expenses
        .into_iter()
        .map(|expense| {
            let email = users.get(&expense.user_id).map_or(UNKNOWN_OWNER, |u| u.email.as_str()).to_string();
            expense.with_user_email(email)
        })
        .collect())
}

fn parse_status(raw: Option<&str>) -> Result<ExpenseStatus, Error> {
    let raw = raw.filter(|s| !s.is_empty()).ok_or_else(|| Error::bad_request("Status is required"))?;
    raw.parse()
        .map_err(|_| Error::bad_request("Invalid status. Must be 'approved', 'rejected', or 'pending'"))
}

/// Every user's expenses, each with its owner's email
#[tracing::instrument(skip_all)]
pub async fn list_all(
    State(state): State<AppState>,
    RequiresHr(_): RequiresHr,
    Query(query): Query<ListExpensesQuery>,
) -> Result<ApiResponse<ExpenseListResponse>, Error> {
    let expenses = match build_filter(&query, None, DateBounds::Strict)? {
        Some(filter) => state.store.list_expenses(&filter).await?,
        None => Vec::new(),
    };

    let expenses = with_owner_emails(&state, expenses.into_iter().map(ExpenseResponse::from).collect()).await?;
    Ok(ApiResponse::ok("Expenses retrieved successfully", ExpenseListResponse::new(expenses)))
}

/// Approve, reject or reopen one expense
#[tracing::instrument(skip_all, fields(reviewer = %reviewer.id, expense_id = %expense_id))]
pub async fn update_status(
    State(state): State<AppState>,
    RequiresHr(reviewer): RequiresHr,
    Path(expense_id): Path<String>,
    request: Option<Json<StatusUpdate>>,
) -> Result<ApiResponse<ExpenseResponse>, Error> {
    let Json(request) = request.ok_or_else(|| Error::bad_request("Request body is required"))?;
    let status = parse_status(request.status.as_deref())?;

    let not_found = || Error::not_found("Expense not found");
    let expense_id: ExpenseId = Uuid::parse_str(&expense_id).map_err(|_| not_found())?;

    let update = StatusUpdateDBRequest {
        status,
        notes: NotesUpdate::from_request(request.notes.as_deref()),
    };
    let expense = match state.store.update_expense_status(expense_id, &update).await {
        Ok(expense) => expense,
        Err(DbError::NotFound) => return Err(not_found()),
        Err(e) => return Err(e.into()),
    };

    info!(status = %status, has_notes = expense.hr_notes.is_some(), "Expense status updated");
    Ok(ApiResponse::ok(
        format!("Expense {} successfully", status.transition_phrase()),
        ExpenseResponse::from(expense),
    ))
}

/// Set the same status on many expenses
#[tracing::instrument(skip_all, fields(reviewer = %reviewer.id))]
pub async fn bulk_update_status(
    State(state): State<AppState>,
    RequiresHr(reviewer): RequiresHr,
    request: Option<Json<BulkStatusUpdate>>,
) -> Result<ApiResponse<BulkStatusResponse>, Error> {
    let Json(request) = request.ok_or_else(|| Error::bad_request("Request body is required"))?;
    let status = parse_status(request.status.as_deref())?;

    let ids: Vec<ExpenseId> = request.expense_ids.iter().filter_map(|id| Uuid::parse_str(id).ok()).collect();
    if ids.is_empty() {
        return Err(Error::bad_request("No valid expense IDs provided"));
    }

    let update = StatusUpdateDBRequest {
        status,
        notes: NotesUpdate::from_request(request.notes.as_deref()),
    };
    let updated_count = state.store.bulk_update_expense_status(&ids, &update).await?;

    info!(status = %status, requested = ids.len(), updated_count, "Bulk status update");
    Ok(ApiResponse::ok(
        format!("Successfully updated {updated_count} expense(s)"),
        BulkStatusResponse { updated_count, status },
    ))
}

/// Every user's expenses as CSV or XLSX, with a leading owner email column
#[tracing::instrument(skip_all)]
pub async fn export_all(State(state): State<AppState>, RequiresHr(_): RequiresHr, Query(query): Query<ListExpensesQuery>) -> Result<Response, Error> {
    let filter = build_filter(&query, None, DateBounds::Lenient)?;
    render_export(&state, filter, query.format.as_deref(), ExportScope::All).await
}
