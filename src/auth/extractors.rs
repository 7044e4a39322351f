use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use super::{services::require_identity, session::Session};
use crate::{error::AppError, state::AppState, store::User};

/// The logged-in user behind the request's session.
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let session = match Session::from_request_parts(parts, state).await {
            Ok(s) => s,
            Err(never) => match never {},
        };
        Ok(AuthUser(require_identity(state, &session.data).await?))
    }
}
