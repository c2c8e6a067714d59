use axum::{Json, extract::State};
use tracing::info;

use crate::{
    AppState,
    api::models::{
        envelope::ApiResponse,
        users::{CurrentUser, PasswordChange, ProfileResponse, ProfileUpdate, StatisticsResponse, UserListResponse},
    },
    auth::{
        current_user::RequiresHr,
        password,
        utils::{normalize_email, validate_password},
    },
    db::{errors::DbError, models::users::UserDBResponse},
    errors::Error,
};

async fn load_user(state: &AppState, current: &CurrentUser) -> Result<UserDBResponse, Error> {
    state
        .store
        .get_user(current.id)
        .await?
        .ok_or_else(|| Error::not_found("User not found"))
}

fn email_in_use() -> Error {
    Error::Conflict {
        message: "Email already in use".to_string(),
    }
}

/// Caller's profile with expense counts
#[tracing::instrument(skip_all, fields(user_id = %current.id))]
pub async fn get_profile(State(state): State<AppState>, current: CurrentUser) -> Result<ApiResponse<ProfileResponse>, Error> {
    let user = load_user(&state, &current).await?;
    let stats = state.store.user_statistics(user.id).await?;

    Ok(ApiResponse::ok(
        "Profile retrieved successfully",
        ProfileResponse::new(&user, Some(StatisticsResponse::counts(&stats))),
    ))
}

#[tracing::instrument(skip_all, fields(user_id = %current.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<ProfileUpdate>,
) -> Result<ApiResponse<ProfileResponse>, Error> {
    let mut user = load_user(&state, &current).await?;

    if let Some(raw) = request.email {
        let email = normalize_email(&raw)?;
        if let Some(other) = state.store.get_user_by_email(&email).await? {
            if other.id != user.id {
                return Err(email_in_use());
            }
        }

        user = match state.store.update_user_email(user.id, &email).await {
            Ok(updated) => updated,
            Err(e @ DbError::UniqueViolation { .. }) if e.is_email_conflict() => return Err(email_in_use()),
            Err(e) => return Err(e.into()),
        };
        info!("Profile updated");
    }

    Ok(ApiResponse::ok("Profile updated successfully", ProfileResponse::new(&user, None)))
}

#[tracing::instrument(skip_all, fields(user_id = %current.id))]
pub async fn change_password(
    State(state): State<AppState>,
    current: CurrentUser,
    Json(request): Json<PasswordChange>,
) -> Result<ApiResponse<()>, Error> {
    let (old_password, new_password) = match (
        request.old_password.filter(|p| !p.is_empty()),
        request.new_password.filter(|p| !p.is_empty()),
    ) {
        (Some(old), Some(new)) => (old, new),
        _ => return Err(Error::bad_request("Old password and new password are required")),
    };

    validate_password(&new_password, &state.config.auth.password)?;
    let user = load_user(&state, &current).await?;

    if !password::verify_password(old_password, user.password_hash.clone()).await? {
        return Err(Error::Unauthenticated {
            message: Some("Current password is incorrect".to_string()),
        });
    }

    let password_hash = password::hash_password(new_password).await?;
    state.store.update_user_password(user.id, &password_hash).await?;
    info!("Password changed");

    Ok(ApiResponse::message("Password changed successfully"))
}

/// Every user, newest first, with approved totals
#[tracing::instrument(skip_all)]
pub async fn list_users(State(state): State<AppState>, RequiresHr(_): RequiresHr) -> Result<ApiResponse<UserListResponse>, Error> {
    let users = state.store.list_users().await?;

    let mut profiles = Vec::with_capacity(users.len());
    for user in &users {
        let stats = state.store.user_statistics(user.id).await?;
        profiles.push(ProfileResponse::new(user, Some(StatisticsResponse::with_amount(&stats))));
    }

    Ok(ApiResponse::ok(
        "Users retrieved successfully",
        UserListResponse {
            count: profiles.len(),
            users: profiles,
        },
    ))
}

#[cfg(test)]
mod tests {
    use crate::{api::models::users::Role, test_utils::TestApp};
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn test_profile_with_statistics() {
        let app = TestApp::new();
        let alice = app.create_user("alice@example.com", Role::User).await;
        app.insert_expense(alice.user.id, json!({"Date": "05-01-2024", "Bill Amount": "₹100"})).await;

        let response = app.server().get("/users/profile").authorization_bearer(&alice.token).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["message"], "Profile retrieved successfully");
        assert_eq!(body["data"]["email"], "alice@example.com");
        assert_eq!(body["data"]["statistics"]["total_expenses"], 1);
        assert_eq!(body["data"]["statistics"]["pending_expenses"], 1);
        assert_eq!(body["data"]["statistics"]["approved_expenses"], 0);
        assert!(body["data"]["statistics"].get("total_amount").is_none());
    }

    #[tokio::test]
    async fn test_profile_requires_token() {
        let app = TestApp::new();
        let response = app.server().get("/users/profile").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["message"], "Authentication required");
    }

    #[tokio::test]
    async fn test_update_email() {
        let app = TestApp::new();
        let alice = app.create_user("alice@example.com", Role::User).await;
        app.create_user("bob@example.com", Role::User).await;
        let server = app.server();

        let response = server
            .patch("/users/profile")
            .authorization_bearer(&alice.token)
            .json(&json!({"email": "BOB@example.com"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        let body: Value = response.json();
        assert_eq!(body["message"], "Email already in use");

        let response = server
            .patch("/users/profile")
            .authorization_bearer(&alice.token)
            .json(&json!({"email": "Alice.New@example.com"}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["message"], "Profile updated successfully");
        assert_eq!(body["data"]["email"], "alice.new@example.com");
        assert!(body["data"].get("statistics").is_none());
    }

    #[tokio::test]
    async fn test_change_password() {
        let app = TestApp::new();
        let alice = app.create_user("alice@example.com", Role::User).await;
        let server = app.server();

        let response = server
            .post("/users/change-password")
            .authorization_bearer(&alice.token)
            .json(&json!({"old_password": "Password123"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["message"], "Old password and new password are required");

        let response = server
            .post("/users/change-password")
            .authorization_bearer(&alice.token)
            .json(&json!({"old_password": "Password123", "new_password": "weak"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(response.json::<Value>()["message"], "Password must be at least 8 characters long");

        let response = server
            .post("/users/change-password")
            .authorization_bearer(&alice.token)
            .json(&json!({"current_password": "Wrong12345", "new_password": "NewPassword1"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(response.json::<Value>()["message"], "Current password is incorrect");

        let response = server
            .post("/users/change-password")
            .authorization_bearer(&alice.token)
            .json(&json!({"old_password": "Password123", "new_password": "NewPassword1"}))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["message"], "Password changed successfully");

        server
            .post("/auth/login")
            .json(&json!({"email": "alice@example.com", "password": "NewPassword1"}))
            .await
            .assert_status_ok();
    }

    #[tokio::test]
    async fn test_list_users_is_hr_only() {
        let app = TestApp::new();
        let alice = app.create_user("alice@example.com", Role::User).await;
        let hr = app.create_user("hr@example.com", Role::Hr).await;

        let approved = app.insert_expense(alice.user.id, json!({"Date": "05-01-2024", "Bill Amount": "₹1,200"})).await;
        app.approve(approved.id).await;
        app.insert_expense(alice.user.id, json!({"Date": "06-01-2024", "Bill Amount": "₹50"})).await;

        let server = app.server();
        server
            .get("/users/all")
            .authorization_bearer(&alice.token)
            .await
            .assert_status(StatusCode::FORBIDDEN);

        let response = server.get("/users/all").authorization_bearer(&hr.token).await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["data"]["count"], 2);

        let users = body["data"]["users"].as_array().unwrap();
        let alice_row = users.iter().find(|u| u["email"] == "alice@example.com").unwrap();
        assert_eq!(alice_row["statistics"]["total_expenses"], 2);
        assert_eq!(alice_row["statistics"]["approved_expenses"], 1);
        assert_eq!(alice_row["statistics"]["total_amount"], 1200.0);
    }
}
