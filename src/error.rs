use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::{
    i18n::{self, Locale},
    state::AppState,
    store::{StoreError, UniqueField},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    LoginIdFormat,
    /// Confirmation differs or length outside 8..=20.
    PasswordMismatch,
    /// Confirmation differs, address malformed or longer than the column.
    EmailMismatch,
    CodeInvalidOrExpired,
    TitleRequired,
    TitleTooLong,
    TimeTooLong,
    InvalidDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    LoginIdTaken,
    EmailTaken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    InvalidCredentials,
    Unauthenticated,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {0:?}")]
    Validation(ValidationKind),
    #[error("conflict: {0:?}")]
    Conflict(ConflictKind),
    #[error("authentication failed: {0:?}")]
    Auth(AuthKind),
    #[error("verification code requested too recently, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: i64 },
    /// Missing or owned by someone else; the two are never distinguished.
    #[error("not found")]
    NotFound,
    #[error("mail delivery failed: {0:#}")]
    Mail(anyhow::Error),
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Mail(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Translation key of the user-facing message.
    pub fn message_key(&self) -> &'static str {
        match self {
            AppError::Validation(kind) => match kind {
                ValidationKind::LoginIdFormat => "err_id_format",
                ValidationKind::PasswordMismatch => "error_password_mismatch",
                ValidationKind::EmailMismatch => "error_email_mismatch",
                ValidationKind::CodeInvalidOrExpired => "error_code_invalid_or_expired",
                ValidationKind::TitleRequired => "err_title_required",
                ValidationKind::TitleTooLong => "err_title_too_long",
                ValidationKind::TimeTooLong => "err_time_too_long",
                ValidationKind::InvalidDate => "err_invalid_date",
            },
            AppError::Conflict(ConflictKind::LoginIdTaken) => "err_id_used",
            AppError::Conflict(ConflictKind::EmailTaken) => "err_email_used",
            AppError::Auth(AuthKind::InvalidCredentials) => "err_login_bad",
            AppError::Auth(AuthKind::Unauthenticated) => "err_login_required",
            AppError::RateLimited { .. } => "err_code_resend_wait",
            AppError::NotFound => "err_not_found",
            AppError::Mail(_) => "err_mail_failed",
            AppError::Storage(_) => "err_internal",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(UniqueField::LoginId) => {
                AppError::Conflict(ConflictKind::LoginIdTaken)
            }
            StoreError::Conflict(UniqueField::Email) => AppError::Conflict(ConflictKind::EmailTaken),
            other => AppError::Storage(anyhow::Error::new(other)),
        }
    }
}

/// Attached to error responses so [`localize_errors`] can rewrite the body.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub key: &'static str,
    pub detail: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let key = self.message_key();
        let detail = match &self {
            AppError::Mail(e) | AppError::Storage(e) => Some(format!("{e:#}")),
            _ => None,
        };
        if status.is_server_error() {
            error!(error = %self, "request failed");
        }

        let body = json!({ "error": key, "message": i18n::text(Locale::Ja, key) });
        let mut res = (status, Json(body)).into_response();
        if let AppError::RateLimited { retry_after_secs } = self {
            res.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs.max(1)));
        }
        res.extensions_mut().insert(ErrorReport { key, detail });
        res
    }
}

/// Rewrites error bodies in the caller's language. Internal detail is only
/// exposed when the debug switch is on.
pub async fn localize_errors(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Response {
    let locale = Locale::from_jar(&jar);
    let mut res = next.run(req).await;
    let Some(report) = res.extensions_mut().remove::<ErrorReport>() else {
        return res;
    };

    let mut body = json!({ "error": report.key, "message": i18n::text(locale, report.key) });
    if state.config.debug {
        if let Some(detail) = report.detail {
            body["detail"] = detail.into();
        }
    } else if report.detail.is_some() {
        warn!(key = report.key, "internal error detail withheld from response");
    }

    let mut out = (res.status(), Json(body)).into_response();
    if let Some(retry) = res.headers().get(header::RETRY_AFTER) {
        out.headers_mut().insert(header::RETRY_AFTER, retry.clone());
    }
    out
}
