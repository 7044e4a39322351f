use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::CookieJar;
use time::OffsetDateTime;
use tracing::{info, instrument};

use super::{
    dto::{
        AuthResponse, LoginRequest, LogoutResponse, PublicUser, RegisterRequest,
        VerificationCodeRequest, VerificationCodeResponse,
    },
    extractors::AuthUser,
    services,
    session::Session,
};
use crate::{error::AppError, i18n::Locale, state::AppState};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/verification-code", post(request_code))
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
}

pub fn me_routes() -> Router<AppState> {
    Router::new().route("/me", get(get_me))
}

#[instrument(skip(state, session, jar, payload))]
pub async fn request_code(
    State(state): State<AppState>,
    mut session: Session,
    jar: CookieJar,
    Json(payload): Json<VerificationCodeRequest>,
) -> Result<Json<VerificationCodeResponse>, AppError> {
    let issued = services::request_verification_code(
        &state,
        &mut session.data,
        &payload.email,
        &payload.email_confirm,
        OffsetDateTime::now_utc(),
        Locale::from_jar(&jar),
    )
    .await?;
    let session_token = services::persist_session(&state, &mut session).await?;

    Ok(Json(VerificationCodeResponse {
        session_token,
        email: issued.email,
        expires_at: issued.expires_at,
        dev_code: issued.dev_code,
    }))
}

#[instrument(skip(state, session, payload))]
pub async fn register(
    State(state): State<AppState>,
    mut session: Session,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user = services::complete_registration(
        &state,
        &mut session,
        &payload,
        OffsetDateTime::now_utc(),
    )
    .await?;
    let session_token = services::persist_session(&state, &mut session).await?;

    Ok(Json(AuthResponse {
        session_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, session, payload))]
pub async fn login(
    State(state): State<AppState>,
    mut session: Session,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let user =
        services::authenticate(&state, &mut session, &payload.login_id, &payload.password).await?;
    let session_token = services::persist_session(&state, &mut session).await?;

    Ok(Json(AuthResponse {
        session_token,
        user: user.into(),
    }))
}

#[instrument(skip(state, session))]
pub async fn logout(State(state): State<AppState>, mut session: Session) -> Json<LogoutResponse> {
    let user_id = session.data.user_id;
    services::end_session(&state, &mut session).await;
    info!(?user_id, "session ended");
    Json(LogoutResponse { ok: true })
}

#[instrument(skip_all)]
pub async fn get_me(AuthUser(user): AuthUser) -> Json<PublicUser> {
    Json(user.into())
}
