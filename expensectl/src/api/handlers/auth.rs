use axum::{Json, extract::State};
use tracing::info;

use crate::{
    AppState,
    api::models::{
        auth::{LoginRequest, LoginResponse, RegisterRequest},
        envelope::ApiResponse,
        users::{CurrentUser, Role, UserSummary},
    },
    auth::{
        password, session,
        utils::{normalize_email, validate_password},
    },
    db::models::users::UserCreateDBRequest,
    errors::Error,
};

fn required_credentials(email: Option<String>, password: Option<String>) -> Result<(String, String), Error> {
    match (email.filter(|e| !e.is_empty()), password.filter(|p| !p.is_empty())) {
        (Some(email), Some(password)) => Ok((email, password)),
        _ => Err(Error::bad_request("Email and password are required")),
    }
}

/// Register a new user account
#[tracing::instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    request: Option<Json<RegisterRequest>>,
) -> Result<ApiResponse<UserSummary>, Error> {
    let Json(request) = request.ok_or_else(|| Error::bad_request("Request body is required"))?;
    let (email, password) = required_credentials(request.email, request.password)?;

    let email = normalize_email(&email)?;
    validate_password(&password, &state.config.auth.password)?;
    let role = match request.role.as_deref() {
        None => Role::User,
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|_| Error::bad_request("Invalid role. Must be USER or HR"))?,
    };

    let password_hash = password::hash_password(password).await?;
    let user = state
        .store
        .create_user(&UserCreateDBRequest {
            email,
            password_hash,
            role,
        })
        .await?;

    info!(user_id = %user.id, role = %user.role, "User registered");
    Ok(ApiResponse::created("User registered successfully", UserSummary::from(&user)))
}

/// Exchange email and password for a session token
#[tracing::instrument(skip_all)]
pub async fn login(State(state): State<AppState>, request: Option<Json<LoginRequest>>) -> Result<ApiResponse<LoginResponse>, Error> {
    let Json(request) = request.ok_or_else(|| Error::bad_request("Request body is required"))?;
    let (email, password) = required_credentials(request.email, request.password)?;

    let invalid = || Error::Unauthenticated {
        message: Some("Invalid email or password".to_string()),
    };

    let user = state
        .store
        .get_user_by_email(&email.trim().to_lowercase())
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(password, user.password_hash.clone()).await? {
        return Err(invalid());
    }

    let token = session::create_session_token(&CurrentUser::from(&user), &state.config)?;
    info!(user_id = %user.id, "User logged in");

    Ok(ApiResponse::ok(
        "Login successful",
        LoginResponse {
            token,
            user: UserSummary::from(&user),
        },
    ))
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestApp;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_register_then_login() {
        let app = TestApp::new();
        let server = app.server();

        let response = server
            .post("/auth/register")
            .json(&json!({"email": "Alice@Example.com", "password": "Password123"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body: serde_json::Value = response.json();
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "User registered successfully");
        assert_eq!(body["data"]["email"], "alice@example.com");
        assert_eq!(body["data"]["role"], "USER");

        let response = server
            .post("/auth/login")
            .json(&json!({"email": "ALICE@example.com", "password": "Password123"}))
            .await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["message"], "Login successful");
        assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));
        assert_eq!(body["data"]["user"]["email"], "alice@example.com");
    }

    #[tokio::test]
    async fn test_register_validation_messages() {
        let app = TestApp::new();
        let server = app.server();

        let cases = [
            (json!({"email": "alice@example.com"}), "Email and password are required"),
            (json!({"email": "", "password": "Password123"}), "Email and password are required"),
            (json!({"email": "not-an-email", "password": "Password123"}), "Invalid email format"),
            (json!({"email": "a@example.com", "password": "short"}), "Password must be at least 8 characters long"),
            (
                json!({"email": "a@example.com", "password": "Password123", "role": "ADMIN"}),
                "Invalid role. Must be USER or HR",
            ),
            (
                json!({"email": "a@example.com", "password": "Password123", "role": "hr"}),
                "Invalid role. Must be USER or HR",
            ),
        ];
        for (body, message) in cases {
            let response = server.post("/auth/register").json(&body).await;
            response.assert_status(StatusCode::BAD_REQUEST);
            let value: serde_json::Value = response.json();
            assert_eq!(value["success"], false);
            assert_eq!(value["message"], message, "body {body}");
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration_conflicts() {
        let app = TestApp::new();
        let server = app.server();
        let body = json!({"email": "bob@example.com", "password": "Password123", "role": "HR"});

        server.post("/auth/register").json(&body).await.assert_status(StatusCode::CREATED);
        let response = server
            .post("/auth/register")
            .json(&json!({"email": "BOB@example.com", "password": "Password123"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        let value: serde_json::Value = response.json();
        assert_eq!(value["message"], "Email already registered");
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let app = TestApp::new();
        app.create_user("carol@example.com", crate::api::models::users::Role::User).await;
        let server = app.server();

        for body in [
            json!({"email": "carol@example.com", "password": "WrongPass1"}),
            json!({"email": "nobody@example.com", "password": "Password123"}),
        ] {
            let response = server.post("/auth/login").json(&body).await;
            response.assert_status(StatusCode::UNAUTHORIZED);
            let value: serde_json::Value = response.json();
            assert_eq!(value["message"], "Invalid email or password");
        }

        let response = server.post("/auth/login").await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let value: serde_json::Value = response.json();
        assert_eq!(value["message"], "Request body is required");
    }
}
