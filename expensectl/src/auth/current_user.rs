//! Extractors for the authenticated caller.

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::{instrument, trace};

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session,
    errors::{Error, Result},
};

/// Bearer token from the `Authorization` header.
/// Returns:
/// - None: no header at all
/// - Some(Err(_)): header present but not a usable bearer token
/// - Some(Ok(token)): the raw token
fn bearer_token(parts: &Parts) -> Option<Result<&str>> {
    let header = parts.headers.get(AUTHORIZATION)?;
    let token = header
        .to_str()
        .ok()
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());

    Some(token.ok_or_else(|| Error::Unauthenticated {
        message: Some("Invalid token".to_string()),
    }))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state), err)]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let token = match bearer_token(parts) {
            Some(token) => token?,
            None => {
                trace!("No authorization header");
                return Err(Error::Unauthenticated { message: None });
            }
        };

        let user = session::verify_session_token(token, &state.config)?;
        trace!(user_id = %user.id, role = %user.role, "Authenticated");
        Ok(user)
    }
}

/// A caller with the HR role. Anyone else is rejected with 403.
#[derive(Debug, Clone)]
pub struct RequiresHr(pub CurrentUser);

impl FromRequestParts<AppState> for RequiresHr {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_hr() {
            return Err(Error::InsufficientPermissions);
        }
        Ok(RequiresHr(user))
    }
}
