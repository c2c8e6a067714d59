//! In-process store with the same semantics as [`super::PostgresStore`].

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    Store,
    errors::{DbError, Result},
    models::{
        expenses::{ExpenseCreateDBRequest, ExpenseDBResponse, ExpenseFilter, StatusUpdateDBRequest},
        users::{UserCreateDBRequest, UserDBResponse, UserStatistics},
    },
    total_amount,
};
use crate::{
    api::models::expenses::ExpenseStatus,
    types::{ExpenseId, UserId},
};

#[derive(Debug, Default)]
struct Tables {
    users: Vec<UserDBResponse>,
    expenses: Vec<ExpenseDBResponse>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn email_taken(email: &str) -> DbError {
    DbError::UniqueViolation {
        constraint: Some("users_email_key".to_string()),
        table: Some("users".to_string()),
        message: format!("duplicate key value violates unique constraint \"users_email_key\": {email}"),
    }
}

/// Newest first; among equal timestamps, the later insert first.
fn newest_first<T: Clone>(rows: &[T], created_at: impl Fn(&T) -> chrono::DateTime<Utc>, keep: impl Fn(&T) -> bool) -> Vec<T> {
    let mut out: Vec<T> = rows.iter().rev().filter(|r| keep(r)).cloned().collect();
    out.sort_by_key(|r| std::cmp::Reverse(created_at(r)));
    out
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut tables = self.tables.write();
        if tables.users.iter().any(|u| u.email == request.email) {
            return Err(email_taken(&request.email));
        }

        let user = UserDBResponse {
            id: Uuid::new_v4(),
            email: request.email.clone(),
            password_hash: request.password_hash.clone(),
            role: request.role,
            created_at: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserDBResponse>> {
        Ok(self.tables.read().users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> Result<Option<UserDBResponse>> {
        Ok(self.tables.read().users.iter().find(|u| u.email == email).cloned())
    }

    async fn get_users_bulk(&self, ids: &[UserId]) -> Result<HashMap<UserId, UserDBResponse>> {
        Ok(self
            .tables
            .read()
            .users
            .iter()
            .filter(|u| ids.contains(&u.id))
            .map(|u| (u.id, u.clone()))
            .collect())
    }

    async fn list_users(&self) -> Result<Vec<UserDBResponse>> {
        Ok(newest_first(&self.tables.read().users, |u| u.created_at, |_| true))
    }

    async fn update_user_email(&self, id: UserId, email: &str) -> Result<UserDBResponse> {
        let mut tables = self.tables.write();
        if tables.users.iter().any(|u| u.email == email && u.id != id) {
            return Err(email_taken(email));
        }

        let user = tables.users.iter_mut().find(|u| u.id == id).ok_or(DbError::NotFound)?;
        user.email = email.to_string();
        Ok(user.clone())
    }

    async fn update_user_password(&self, id: UserId, password_hash: &str) -> Result<()> {
        let mut tables = self.tables.write();
        let user = tables.users.iter_mut().find(|u| u.id == id).ok_or(DbError::NotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn create_expense(&self, request: &ExpenseCreateDBRequest) -> Result<ExpenseDBResponse> {
        let now = Utc::now();
        let expense = ExpenseDBResponse {
            id: Uuid::new_v4(),
            user_id: request.user_id,
            image_path: request.image_path.clone(),
            extracted_data: request.extracted_data.clone(),
            status: request.status,
            hr_notes: None,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().expenses.push(expense.clone());
        Ok(expense)
    }

    async fn get_expense(&self, id: ExpenseId) -> Result<Option<ExpenseDBResponse>> {
        Ok(self.tables.read().expenses.iter().find(|e| e.id == id).cloned())
    }

    async fn list_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<ExpenseDBResponse>> {
        Ok(newest_first(&self.tables.read().expenses, |e| e.created_at, |e| filter.matches(e)))
    }

    async fn update_expense_status(&self, id: ExpenseId, update: &StatusUpdateDBRequest) -> Result<ExpenseDBResponse> {
        let mut tables = self.tables.write();
        let expense = tables.expenses.iter_mut().find(|e| e.id == id).ok_or(DbError::NotFound)?;
        expense.status = update.status;
        expense.hr_notes = update.notes.apply(expense.hr_notes.take());
        expense.updated_at = Utc::now();
        Ok(expense.clone())
    }

    async fn bulk_update_expense_status(&self, ids: &[ExpenseId], update: &StatusUpdateDBRequest) -> Result<u64> {
        let mut tables = self.tables.write();
        let now = Utc::now();
        let mut updated = 0;
        for expense in tables.expenses.iter_mut().filter(|e| ids.contains(&e.id)) {
            expense.status = update.status;
            expense.hr_notes = update.notes.apply(expense.hr_notes.take());
            expense.updated_at = now;
            updated += 1;
        }
        Ok(updated)
    }

    async fn user_statistics(&self, user_id: UserId) -> Result<UserStatistics> {
        let tables = self.tables.read();
        let mine: Vec<&ExpenseDBResponse> = tables.expenses.iter().filter(|e| e.user_id == user_id).collect();
        let count = |status: ExpenseStatus| mine.iter().filter(|e| e.status == status).count() as i64;

        Ok(UserStatistics {
            total_expenses: mine.len() as i64,
            pending_expenses: count(ExpenseStatus::Pending),
            approved_expenses: count(ExpenseStatus::Approved),
            approved_amount: total_amount(
                mine.iter()
                    .filter(|e| e.status == ExpenseStatus::Approved)
                    .map(|e| &e.extracted_data),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::users::Role;
    use crate::db::models::expenses::NotesUpdate;
    use crate::extraction::{ExtractionDraft, NormalizedBill, normalize};
    use serde_json::json;

    fn bill(value: serde_json::Value) -> NormalizedBill {
        normalize(ExtractionDraft::from_value(value))
    }

    fn user_request(email: &str) -> UserCreateDBRequest {
        UserCreateDBRequest {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
        }
    }

    async fn expense(store: &InMemoryStore, user_id: UserId, amount: &str) -> ExpenseDBResponse {
        store
            .create_expense(&ExpenseCreateDBRequest {
                user_id,
                image_path: format!("uploads/expenses/{user_id}/{amount}.png"),
                extracted_data: bill(json!({"Date": "05-01-2024", "Bill Amount": amount})),
                status: ExpenseStatus::Pending,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryStore::new();
        store.create_user(&user_request("a@example.com")).await.unwrap();
        let err = store.create_user(&user_request("a@example.com")).await.unwrap_err();
        assert!(err.is_email_conflict());
    }

    #[tokio::test]
    async fn test_update_email_conflicts_with_other_users_only() {
        let store = InMemoryStore::new();
        let a = store.create_user(&user_request("a@example.com")).await.unwrap();
        store.create_user(&user_request("b@example.com")).await.unwrap();

        assert!(store.update_user_email(a.id, "b@example.com").await.unwrap_err().is_email_conflict());
        assert_eq!(store.update_user_email(a.id, "a@example.com").await.unwrap().email, "a@example.com");
        assert!(matches!(
            store.update_user_email(Uuid::new_v4(), "c@example.com").await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_list_is_newest_first_and_filtered() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let first = expense(&store, owner, "₹100").await;
        let second = expense(&store, owner, "₹200").await;
        expense(&store, Uuid::new_v4(), "₹300").await;

        let mine = store.list_expenses(&ExpenseFilter::for_user(owner)).await.unwrap();
        assert_eq!(mine.iter().map(|e| e.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let all = store.list_expenses(&ExpenseFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_status_updates_and_statistics() {
        let store = InMemoryStore::new();
        let owner = Uuid::new_v4();
        let a = expense(&store, owner, "₹100").await;
        let b = expense(&store, owner, "₹250").await;
        let c = expense(&store, owner, "abc").await;

        let approve = StatusUpdateDBRequest {
            status: ExpenseStatus::Approved,
            notes: NotesUpdate::Set("fine".to_string()),
        };
        let updated = store.bulk_update_expense_status(&[a.id, b.id, c.id, Uuid::new_v4()], &approve).await.unwrap();
        assert_eq!(updated, 3);

        let rejected = store
            .update_expense_status(
                c.id,
                &StatusUpdateDBRequest {
                    status: ExpenseStatus::Rejected,
                    notes: NotesUpdate::Clear,
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.hr_notes, None);
        assert!(rejected.updated_at >= rejected.created_at);

        let stats = store.user_statistics(owner).await.unwrap();
        assert_eq!(stats.total_expenses, 3);
        assert_eq!(stats.pending_expenses, 0);
        assert_eq!(stats.approved_expenses, 2);
        assert_eq!(stats.approved_amount, 350.0);
    }

    #[tokio::test]
    async fn test_unknown_expense_is_not_found() {
        let store = InMemoryStore::new();
        let update = StatusUpdateDBRequest {
            status: ExpenseStatus::Approved,
            notes: NotesUpdate::Keep,
        };
        assert!(matches!(
            store.update_expense_status(Uuid::new_v4(), &update).await,
            Err(DbError::NotFound)
        ));
    }
}
