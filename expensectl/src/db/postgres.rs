//! PostgreSQL store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, postgres::PgPoolOptions, types::Json};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

use super::{
    Store,
    errors::{DbError, Result},
    models::{
        expenses::{ExpenseCreateDBRequest, ExpenseDBResponse, ExpenseFilter, NotesUpdate, StatusUpdateDBRequest},
        users::{UserCreateDBRequest, UserDBResponse, UserStatistics},
    },
    total_amount,
};
use crate::{
    api::models::{expenses::ExpenseStatus, users::Role},
    config::DatabaseConfig,
    extraction::NormalizedBill,
    types::{ExpenseId, UserId, abbrev_uuid},
};

// Database entity models
#[derive(Debug, FromRow)]
struct User {
    id: UserId,
    email: String,
    password_hash: String,
    role: Role,
    created_at: DateTime<Utc>,
}

impl From<User> for UserDBResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct Expense {
    id: ExpenseId,
    user_id: UserId,
    image_path: String,
    extracted_data: Json<NormalizedBill>,
    status: ExpenseStatus,
    hr_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<Expense> for ExpenseDBResponse {
    fn from(expense: Expense) -> Self {
        Self {
            id: expense.id,
            user_id: expense.user_id,
            image_path: expense.image_path,
            extracted_data: expense.extracted_data.0,
            status: expense.status,
            hr_notes: expense.hr_notes,
            created_at: expense.created_at,
            updated_at: expense.updated_at,
        }
    }
}

/// `(touch, value)` pair for the `CASE` in status updates.
fn notes_params(notes: &NotesUpdate) -> (bool, Option<&str>) {
    match notes {
        NotesUpdate::Keep => (false, None),
        NotesUpdate::Clear => (true, None),
        NotesUpdate::Set(text) => (true, Some(text.as_str())),
    }
}

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(&config.url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        crate::migrator()
            .run(&self.pool)
            .await
            .map_err(|e| DbError::Other(anyhow::Error::from(e).context("run migrations")))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PostgresStore {
    #[instrument(skip(self, request), fields(role = %request.role), err)]
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, password_hash, role, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.email)
        .bind(&request.password_hash)
        .bind(request.role)
        .fetch_one(&self.pool)
        .await?;

        Ok(user.into())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, User>("SELECT id, email, password_hash, role, created_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user.map(Into::into))
    }

    #[instrument(skip(self, email), err)]
    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, User>("SELECT id, email, password_hash, role, created_at FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_users_bulk(&self, ids: &[UserId]) -> Result<HashMap<UserId, UserDBResponse>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let users = sqlx::query_as::<_, User>("SELECT id, email, password_hash, role, created_at FROM users WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(users.into_iter().map(|u| (u.id, u.into())).collect())
    }

    #[instrument(skip(self), err)]
    async fn list_users(&self) -> Result<Vec<UserDBResponse>> {
        let users = sqlx::query_as::<_, User>("SELECT id, email, password_hash, role, created_at FROM users ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        Ok(users.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, email), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update_user_email(&self, id: UserId, email: &str) -> Result<UserDBResponse> {
        let user = sqlx::query_as::<_, User>(
            "UPDATE users SET email = $2 WHERE id = $1 RETURNING id, email, password_hash, role, created_at",
        )
        .bind(id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;
        Ok(user.into())
    }

    #[instrument(skip(self, password_hash), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update_user_password(&self, id: UserId, password_hash: &str) -> Result<()> {
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&request.user_id)), err)]
    async fn create_expense(&self, request: &ExpenseCreateDBRequest) -> Result<ExpenseDBResponse> {
        let expense = sqlx::query_as::<_, Expense>(
            r#"
            INSERT INTO expenses (id, user_id, image_path, extracted_data, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.user_id)
        .bind(&request.image_path)
        .bind(Json(&request.extracted_data))
        .bind(request.status)
        .fetch_one(&self.pool)
        .await?;

        Ok(expense.into())
    }

    #[instrument(skip(self), fields(expense_id = %abbrev_uuid(&id)), err)]
    async fn get_expense(&self, id: ExpenseId) -> Result<Option<ExpenseDBResponse>> {
        let expense = sqlx::query_as::<_, Expense>("SELECT * FROM expenses WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(expense.map(Into::into))
    }

    #[instrument(skip(self, filter), err)]
    async fn list_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<ExpenseDBResponse>> {
        let expenses = sqlx::query_as::<_, Expense>(
            r#"
            SELECT * FROM expenses
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::expense_status IS NULL OR status = $2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at <= $4)
            ORDER BY created_at DESC
            "#,
        )
        .bind(filter.user_id)
        .bind(filter.status)
        .bind(filter.created_from)
        .bind(filter.created_to)
        .fetch_all(&self.pool)
        .await?;

        Ok(expenses.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, update), fields(expense_id = %abbrev_uuid(&id), status = %update.status), err)]
    async fn update_expense_status(&self, id: ExpenseId, update: &StatusUpdateDBRequest) -> Result<ExpenseDBResponse> {
        let (touch_notes, notes) = notes_params(&update.notes);
        let expense = sqlx::query_as::<_, Expense>(
            r#"
            UPDATE expenses
            SET status = $2,
                hr_notes = CASE WHEN $3 THEN $4 ELSE hr_notes END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(update.status)
        .bind(touch_notes)
        .bind(notes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(expense.into())
    }

    #[instrument(skip(self, ids, update), fields(count = ids.len(), status = %update.status), err)]
    async fn bulk_update_expense_status(&self, ids: &[ExpenseId], update: &StatusUpdateDBRequest) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let (touch_notes, notes) = notes_params(&update.notes);
        let result = sqlx::query(
            r#"
            UPDATE expenses
            SET status = $2,
                hr_notes = CASE WHEN $3 THEN $4 ELSE hr_notes END,
                updated_at = NOW()
            WHERE id = ANY($1)
            "#,
        )
        .bind(ids)
        .bind(update.status)
        .bind(touch_notes)
        .bind(notes)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    async fn user_statistics(&self, user_id: UserId) -> Result<UserStatistics> {
        let (total_expenses, pending_expenses, approved_expenses): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'pending'),
                COUNT(*) FILTER (WHERE status = 'approved')
            FROM expenses
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let approved: Vec<(Json<NormalizedBill>,)> =
            sqlx::query_as("SELECT extracted_data FROM expenses WHERE user_id = $1 AND status = 'approved'")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(UserStatistics {
            total_expenses,
            pending_expenses,
            approved_expenses,
            approved_amount: total_amount(approved.iter().map(|(bill,)| &bill.0)),
        })
    }
}
