use axum::extract::FromRef;
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

use super::{
    dto::RegisterRequest,
    password::{hash_password, password_matches},
    seed,
    session::{Session, SessionData, SessionKeys},
    verification::{generate_code, Challenge, DEV_CODE},
};
use crate::{
    error::{AppError, AuthKind, ConflictKind, ValidationKind},
    i18n::{self, Locale},
    state::AppState,
    store::{NewUser, User},
};

lazy_static! {
    static ref LOGIN_ID_RE: Regex = Regex::new(r"^[A-Za-z0-9]{5,20}$").unwrap();
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
}

const PASSWORD_LEN: std::ops::RangeInclusive<usize> = 8..=20;
/// Width of `users.email`.
const EMAIL_MAX_CHARS: usize = 255;

pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// Normalized address when both fields agree and look like an email.
fn confirmed_email(email: &str, confirm: &str) -> Result<String, AppError> {
    let email = normalize_email(email);
    if email != normalize_email(confirm)
        || !is_valid_email(&email)
        || email.chars().count() > EMAIL_MAX_CHARS
    {
        return Err(AppError::Validation(ValidationKind::EmailMismatch));
    }
    Ok(email)
}

#[derive(Debug, Clone)]
pub struct CodeIssued {
    pub email: String,
    pub expires_at: OffsetDateTime,
    /// Only set in development mode.
    pub dev_code: Option<String>,
}

/// Issues a one-time code for `email` and records the challenge in the
/// session. A request inside the resend interval leaves the session alone.
pub async fn request_verification_code(
    state: &AppState,
    session: &mut SessionData,
    email: &str,
    email_confirm: &str,
    now: OffsetDateTime,
    locale: Locale,
) -> Result<CodeIssued, AppError> {
    let email = confirmed_email(email, email_confirm)?;
    let cfg = &state.config.verification;

    if let Some(prev) = &session.challenge {
        let interval = Duration::seconds(cfg.resend_interval_secs);
        if let Some(retry_after_secs) = prev.resend_wait(now, interval) {
            debug!(retry_after_secs, "verification code resend throttled");
            return Err(AppError::RateLimited { retry_after_secs });
        }
    }

    let code = if cfg.dev_mode {
        DEV_CODE.to_string()
    } else {
        generate_code()
    };
    let minutes = cfg.code_ttl_minutes;
    let subject = i18n::text(locale, "mail_subject");
    let body = i18n::text(locale, "mail_body")
        .replace("{code}", &code)
        .replace("{minutes}", &minutes.to_string());

    if let Err(e) = state.mailer.send(&email, subject, &body).await {
        if !cfg.dev_mode {
            return Err(AppError::Mail(e));
        }
        warn!(error = %e, "verification mail failed; continuing in dev mode");
    }

    let challenge = Challenge::issue(&email, &code, now, Duration::minutes(minutes));
    let expires_at = challenge.expires_at;
    session.challenge = Some(challenge);
    info!(email = %email, "verification code issued");

    Ok(CodeIssued {
        email,
        expires_at,
        dev_code: cfg.dev_mode.then_some(code),
    })
}

/// Creates the account, seeds its sample trip and logs the session in.
pub async fn complete_registration(
    state: &AppState,
    session: &mut Session,
    req: &RegisterRequest,
    now: OffsetDateTime,
) -> Result<User, AppError> {
    let login_id = req.login_id.trim();
    if !LOGIN_ID_RE.is_match(login_id) {
        return Err(AppError::Validation(ValidationKind::LoginIdFormat));
    }
    if req.password != req.password_confirm
        || !PASSWORD_LEN.contains(&req.password.chars().count())
    {
        return Err(AppError::Validation(ValidationKind::PasswordMismatch));
    }
    let email = confirmed_email(&req.email, &req.email_confirm)?;

    let code_ok = session
        .data
        .challenge
        .as_ref()
        .is_some_and(|c| c.accepts(&email, &req.code, now));
    if !code_ok {
        return Err(AppError::Validation(ValidationKind::CodeInvalidOrExpired));
    }

    let login_id_norm = login_id.to_lowercase();
    if state.store.find_user_by_login(&login_id_norm).await?.is_some() {
        return Err(AppError::Conflict(ConflictKind::LoginIdTaken));
    }
    if state.store.email_exists(&email).await? {
        return Err(AppError::Conflict(ConflictKind::EmailTaken));
    }

    let password_hash = hash_password(&req.password).map_err(AppError::Storage)?;
    let user = state
        .store
        .create_user_with_seed(
            NewUser {
                login_id: login_id.to_string(),
                login_id_norm,
                password_hash,
                email,
            },
            &seed::sample_trip(),
        )
        .await?;

    session.data.challenge = None;
    session.establish(&user);
    info!(user_id = user.id, login_id = %user.login_id, "user registered");
    Ok(user)
}

/// Checks credentials. Unknown ids and wrong passwords fail identically.
pub async fn authenticate(
    state: &AppState,
    session: &mut Session,
    login_id: &str,
    password: &str,
) -> Result<User, AppError> {
    let norm = login_id.trim().to_lowercase();
    let user = state.store.find_user_by_login(&norm).await?;

    let verified = password_matches(password, user.as_ref().map(|u| u.password_hash.as_str()));

    match user {
        Some(user) if verified => {
            session.establish(&user);
            info!(user_id = user.id, "user logged in");
            Ok(user)
        }
        _ => {
            warn!(login_id = %norm, "login failed");
            Err(AppError::Auth(AuthKind::InvalidCredentials))
        }
    }
}

pub async fn current_identity(
    state: &AppState,
    session: &SessionData,
) -> Result<Option<User>, AppError> {
    match session.user_id {
        Some(id) => Ok(state.store.find_user_by_id(id).await?),
        None => Ok(None),
    }
}

pub async fn require_identity(state: &AppState, session: &SessionData) -> Result<User, AppError> {
    current_identity(state, session)
        .await?
        .ok_or(AppError::Auth(AuthKind::Unauthenticated))
}

/// Drops everything the session holds. Safe to call on an anonymous session.
pub async fn end_session(state: &AppState, session: &mut Session) {
    state.sessions.remove(session.id).await;
    if let Some(old) = session.replaced.take() {
        state.sessions.remove(old).await;
    }
    session.data = SessionData::default();
}

/// Stores the session server-side and returns the token the client keeps.
pub async fn persist_session(state: &AppState, session: &mut Session) -> Result<String, AppError> {
    state.sessions.save(session).await;
    session.replaced = None;
    SessionKeys::from_ref(state)
        .sign(session.id)
        .map_err(AppError::Storage)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::{
        config::test_config,
        mail::MemoryMailer,
        store::{
            Item, ItemFields, MemoryStore, Scope, SeedTrip, Store, StoreResult, Trip, TripFields,
        },
    };

    fn t0() -> OffsetDateTime {
        time::macros::datetime!(2025-09-02 12:00 UTC)
    }

    struct Harness {
        state: AppState,
        store: Arc<MemoryStore>,
        mailer: Arc<MemoryMailer>,
    }

    fn harness(dev_mode: bool) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(MemoryMailer::default());
        let state = AppState::from_parts(
            store.clone(),
            mailer.clone(),
            Arc::new(test_config(dev_mode)),
        );
        Harness {
            state,
            store,
            mailer,
        }
    }

    fn register_req(login: &str, email: &str, code: &str) -> RegisterRequest {
        RegisterRequest {
            login_id: login.into(),
            password: "password1".into(),
            password_confirm: "password1".into(),
            email: email.into(),
            email_confirm: email.into(),
            code: code.into(),
        }
    }

    async fn register(h: &Harness, login: &str, email: &str) -> (Session, User) {
        let mut session = Session::anonymous();
        request_verification_code(&h.state, &mut session.data, email, email, t0(), Locale::Ja)
            .await
            .expect("code issued");
        let user = complete_registration(
            &h.state,
            &mut session,
            &register_req(login, email, DEV_CODE),
            t0() + Duration::minutes(1),
        )
        .await
        .expect("registered");
        (session, user)
    }

    #[tokio::test]
    async fn code_request_stores_challenge_and_sends_mail() {
        let h = harness(true);
        let mut data = SessionData::default();
        let issued = request_verification_code(
            &h.state,
            &mut data,
            " A@Example.com ",
            "a@example.com",
            t0(),
            Locale::En,
        )
        .await
        .expect("issued");

        assert_eq!(issued.email, "a@example.com");
        assert_eq!(issued.expires_at, t0() + Duration::minutes(15));
        assert_eq!(issued.dev_code.as_deref(), Some(DEV_CODE));
        let challenge = data.challenge.expect("challenge stored");
        assert_eq!(challenge.email, "a@example.com");
        assert_ne!(challenge.code_hash, DEV_CODE);

        let sent = h.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@example.com");
        assert_eq!(sent[0].subject, "Email verification");
        assert!(sent[0].body.contains("123456"));
        assert!(sent[0].body.contains("15 minutes"));
    }

    #[tokio::test]
    async fn code_request_rejects_mismatched_or_malformed_email() {
        let h = harness(true);
        let mut data = SessionData::default();
        for (a, b) in [("a@example.com", "b@example.com"), ("not-an-email", "not-an-email"), ("", "")] {
            let err = request_verification_code(&h.state, &mut data, a, b, t0(), Locale::Ja)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(ValidationKind::EmailMismatch)));
        }
        assert!(data.challenge.is_none());
        assert!(h.mailer.sent().is_empty());
    }

    #[tokio::test]
    async fn resend_within_interval_is_rate_limited_and_keeps_challenge() {
        let h = harness(true);
        let mut data = SessionData::default();
        request_verification_code(&h.state, &mut data, "a@example.com", "a@example.com", t0(), Locale::Ja)
            .await
            .unwrap();
        let before = data.challenge.clone();

        let err = request_verification_code(
            &h.state,
            &mut data,
            "b@example.com",
            "b@example.com",
            t0() + Duration::seconds(30),
            Locale::Ja,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::RateLimited { retry_after_secs: 30 }));
        assert_eq!(data.challenge, before);
        assert_eq!(h.mailer.sent().len(), 1);

        request_verification_code(
            &h.state,
            &mut data,
            "b@example.com",
            "b@example.com",
            t0() + Duration::seconds(60),
            Locale::Ja,
        )
        .await
        .expect("allowed after the interval");
        assert_eq!(data.challenge.unwrap().email, "b@example.com");
    }

    #[tokio::test]
    async fn production_mail_failure_is_surfaced_and_nothing_is_stored() {
        let h = harness(false);
        h.mailer.set_failing(true);
        let mut data = SessionData::default();
        let err = request_verification_code(&h.state, &mut data, "a@example.com", "a@example.com", t0(), Locale::Ja)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Mail(_)));
        assert!(data.challenge.is_none());
    }

    #[tokio::test]
    async fn production_codes_are_random_and_not_echoed() {
        let h = harness(false);
        let mut data = SessionData::default();
        let issued = request_verification_code(&h.state, &mut data, "a@example.com", "a@example.com", t0(), Locale::Ja)
            .await
            .unwrap();
        assert!(issued.dev_code.is_none());
        let body = &h.mailer.sent()[0].body;
        let code: String = body.chars().filter(|c| c.is_ascii_digit()).take(6).collect();
        assert!(data.challenge.unwrap().accepts("a@example.com", &code, t0()));
    }

    #[tokio::test]
    async fn dev_mode_tolerates_mail_failure() {
        let h = harness(true);
        h.mailer.set_failing(true);
        let mut data = SessionData::default();
        request_verification_code(&h.state, &mut data, "a@example.com", "a@example.com", t0(), Locale::Ja)
            .await
            .expect("dev mode keeps going");
        assert!(data.challenge.is_some());
    }

    #[tokio::test]
    async fn registration_creates_user_with_seeded_trip() {
        let h = harness(true);
        let (session, user) = register(&h, "abcde12345", "a@example.com").await;

        assert_eq!(user.login_id, "abcde12345");
        assert_eq!(user.email.as_deref(), Some("a@example.com"));
        assert!(user.email_verified);
        assert_eq!(session.data.user_id, Some(user.id));
        assert_eq!(session.data.login_id.as_deref(), Some("abcde12345"));
        assert!(session.data.challenge.is_none());
        assert!(session.replaced.is_some());

        let trips = h.store.list_trips(user.id).await.unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].sort_order, 0);
        let items = h.store.list_items(trips[0].id).await.unwrap();
        assert_eq!(items.len(), 6);
        let orders: Vec<i32> = items.iter().map(|i| i.sort_order).collect();
        assert_eq!(orders, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(items[0].title, "松山城");
        assert_eq!(items[5].time.as_deref(), Some("19:00"));
    }

    #[tokio::test]
    async fn code_is_accepted_only_once() {
        let h = harness(true);
        let (mut session, _) = register(&h, "abcde12345", "a@example.com").await;

        let err = complete_registration(
            &h.state,
            &mut session,
            &register_req("other12345", "a@example.com", DEV_CODE),
            t0() + Duration::minutes(2),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationKind::CodeInvalidOrExpired)
        ));
    }

    #[tokio::test]
    async fn registration_validates_fields_in_order() {
        let h = harness(true);
        let mut session = Session::anonymous();
        request_verification_code(&h.state, &mut session.data, "a@example.com", "a@example.com", t0(), Locale::Ja)
            .await
            .unwrap();

        let cases: Vec<(RegisterRequest, ValidationKind)> = vec![
            (register_req("abc", "a@example.com", DEV_CODE), ValidationKind::LoginIdFormat),
            (register_req("abc_de123", "a@example.com", DEV_CODE), ValidationKind::LoginIdFormat),
            (
                RegisterRequest {
                    password_confirm: "password2".into(),
                    ..register_req("abcde12345", "a@example.com", DEV_CODE)
                },
                ValidationKind::PasswordMismatch,
            ),
            (
                RegisterRequest {
                    password: "short".into(),
                    password_confirm: "short".into(),
                    ..register_req("abcde12345", "a@example.com", DEV_CODE)
                },
                ValidationKind::PasswordMismatch,
            ),
            (
                RegisterRequest {
                    email_confirm: "b@example.com".into(),
                    ..register_req("abcde12345", "a@example.com", DEV_CODE)
                },
                ValidationKind::EmailMismatch,
            ),
            (register_req("abcde12345", "a@example.com", "654321"), ValidationKind::CodeInvalidOrExpired),
            (register_req("abcde12345", "b@example.com", DEV_CODE), ValidationKind::CodeInvalidOrExpired),
        ];
        for (req, kind) in cases {
            let err = complete_registration(&h.state, &mut session, &req, t0())
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Validation(k) if k == kind), "{req:?}");
        }

        let err = complete_registration(
            &h.state,
            &mut session,
            &register_req("abcde12345", "a@example.com", DEV_CODE),
            t0() + Duration::minutes(16),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            AppError::Validation(ValidationKind::CodeInvalidOrExpired)
        ));
        assert!(session.data.challenge.is_some());
    }

    #[tokio::test]
    async fn taken_login_id_and_email_are_conflicts() {
        let h = harness(true);
        register(&h, "Alice12345", "a@example.com").await;

        let mut session = Session::anonymous();
        request_verification_code(&h.state, &mut session.data, "a@example.com", "a@example.com", t0(), Locale::Ja)
            .await
            .unwrap();
        let err = complete_registration(
            &h.state,
            &mut session,
            &register_req("ALICE12345", "a@example.com", DEV_CODE),
            t0(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ConflictKind::LoginIdTaken)));

        let err = complete_registration(
            &h.state,
            &mut session,
            &register_req("bob1234567", "a@example.com", DEV_CODE),
            t0(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ConflictKind::EmailTaken)));
    }

    #[tokio::test]
    async fn storage_outage_leaves_no_partial_user() {
        let h = harness(true);
        let mut session = Session::anonymous();
        request_verification_code(&h.state, &mut session.data, "a@example.com", "a@example.com", t0(), Locale::Ja)
            .await
            .unwrap();

        h.store.set_unavailable(true);
        let err = complete_registration(
            &h.state,
            &mut session,
            &register_req("abcde12345", "a@example.com", DEV_CODE),
            t0(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Storage(_)));
        assert!(session.data.user_id.is_none());
        assert!(session.data.challenge.is_some());

        h.store.set_unavailable(false);
        assert!(h.store.find_user_by_login("abcde12345").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn email_longer_than_its_column_is_rejected() {
        let h = harness(true);
        let fits = format!("{}@example.com", "a".repeat(EMAIL_MAX_CHARS - 12));
        let too_long = format!("{}@example.com", "a".repeat(EMAIL_MAX_CHARS - 11));
        assert_eq!(fits.chars().count(), EMAIL_MAX_CHARS);

        let mut data = SessionData::default();
        let err = request_verification_code(&h.state, &mut data, &too_long, &too_long, t0(), Locale::Ja)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationKind::EmailMismatch)));
        assert!(data.challenge.is_none());
        assert!(h.mailer.sent().is_empty());

        let mut session = Session::anonymous();
        request_verification_code(&h.state, &mut session.data, &fits, &fits, t0(), Locale::Ja)
            .await
            .expect("address at the limit is accepted");
        let err = complete_registration(
            &h.state,
            &mut session,
            &register_req("abcde12345", &too_long, DEV_CODE),
            t0(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(ValidationKind::EmailMismatch)));
        assert!(session.data.challenge.is_some());

        let user = complete_registration(
            &h.state,
            &mut session,
            &register_req("abcde12345", &fits, DEV_CODE),
            t0(),
        )
        .await
        .expect("registered at the limit");
        assert_eq!(user.email.as_deref(), Some(fits.as_str()));
    }

    /// Inserts `rival` right before the first user insert, after the
    /// existence checks have already passed.
    struct RacingStore {
        inner: MemoryStore,
        rival: Mutex<Option<NewUser>>,
    }

    impl RacingStore {
        fn new(rival: NewUser) -> Self {
            Self {
                inner: MemoryStore::new(),
                rival: Mutex::new(Some(rival)),
            }
        }
    }

    #[async_trait]
    impl Store for RacingStore {
        async fn find_user_by_login(&self, login_id_norm: &str) -> StoreResult<Option<User>> {
            self.inner.find_user_by_login(login_id_norm).await
        }
        async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
            self.inner.find_user_by_id(id).await
        }
        async fn email_exists(&self, email: &str) -> StoreResult<bool> {
            self.inner.email_exists(email).await
        }
        async fn create_user_with_seed(&self, user: NewUser, seed: &SeedTrip) -> StoreResult<User> {
            let rival = self.rival.lock().unwrap().take();
            if let Some(rival) = rival {
                self.inner.create_user_with_seed(rival, seed).await?;
            }
            self.inner.create_user_with_seed(user, seed).await
        }
        async fn list_trips(&self, user_id: i64) -> StoreResult<Vec<Trip>> {
            self.inner.list_trips(user_id).await
        }
        async fn get_trip(&self, user_id: i64, trip_id: i64) -> StoreResult<Option<Trip>> {
            self.inner.get_trip(user_id, trip_id).await
        }
        async fn append_trip(&self, user_id: i64, fields: TripFields) -> StoreResult<Trip> {
            self.inner.append_trip(user_id, fields).await
        }
        async fn update_trip(
            &self,
            user_id: i64,
            trip_id: i64,
            fields: TripFields,
        ) -> StoreResult<Option<Trip>> {
            self.inner.update_trip(user_id, trip_id, fields).await
        }
        async fn delete_trip(&self, user_id: i64, trip_id: i64) -> StoreResult<bool> {
            self.inner.delete_trip(user_id, trip_id).await
        }
        async fn list_items(&self, trip_id: i64) -> StoreResult<Vec<Item>> {
            self.inner.list_items(trip_id).await
        }
        async fn append_item(&self, trip_id: i64, fields: ItemFields) -> StoreResult<Item> {
            self.inner.append_item(trip_id, fields).await
        }
        async fn update_item(
            &self,
            trip_id: i64,
            item_id: i64,
            fields: ItemFields,
        ) -> StoreResult<Option<Item>> {
            self.inner.update_item(trip_id, item_id, fields).await
        }
        async fn delete_item(&self, trip_id: i64, item_id: i64) -> StoreResult<bool> {
            self.inner.delete_item(trip_id, item_id).await
        }
        async fn reorder(&self, scope: Scope, ids: &[i64]) -> StoreResult<Vec<i64>> {
            self.inner.reorder(scope, ids).await
        }
    }

    fn rival(login: &str, email: &str) -> NewUser {
        NewUser {
            login_id: login.into(),
            login_id_norm: login.to_lowercase(),
            password_hash: "x".into(),
            email: email.into(),
        }
    }

    #[tokio::test]
    async fn insert_race_lost_after_checks_is_a_conflict() {
        let cases = [
            (rival("rival12345", "a@example.com"), ConflictKind::EmailTaken),
            (rival("ABCDE12345", "r@example.com"), ConflictKind::LoginIdTaken),
        ];
        for (rival, expected) in cases {
            let rival_login = rival.login_id_norm.clone();
            let store = Arc::new(RacingStore::new(rival));
            let state = AppState::from_parts(
                store.clone(),
                Arc::new(MemoryMailer::default()),
                Arc::new(test_config(true)),
            );
            let mut session = Session::anonymous();
            request_verification_code(&state, &mut session.data, "a@example.com", "a@example.com", t0(), Locale::Ja)
                .await
                .unwrap();

            let err = complete_registration(
                &state,
                &mut session,
                &register_req("abcde12345", "a@example.com", DEV_CODE),
                t0(),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, AppError::Conflict(k) if k == expected), "{err:?}");
            assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
            assert!(session.data.user_id.is_none());
            assert!(session.data.challenge.is_some());
            assert!(store.find_user_by_login(&rival_login).await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let h = harness(true);
        register(&h, "alice12345", "a@example.com").await;

        let mut session = Session::anonymous();
        let wrong = authenticate(&h.state, &mut session, "alice12345", "wrong-password")
            .await
            .unwrap_err();
        let unknown = authenticate(&h.state, &mut session, "nobody1234", "anything")
            .await
            .unwrap_err();
        assert!(matches!(wrong, AppError::Auth(AuthKind::InvalidCredentials)));
        assert!(matches!(unknown, AppError::Auth(AuthKind::InvalidCredentials)));
        assert_eq!(wrong.message_key(), unknown.message_key());
        assert!(session.data.user_id.is_none());
    }

    #[tokio::test]
    async fn login_is_case_insensitive_and_rotates_session() {
        let h = harness(true);
        let (_, user) = register(&h, "Alice12345", "a@example.com").await;

        let mut session = Session::anonymous();
        let before = session.id;
        let found = authenticate(&h.state, &mut session, " alice12345 ", "password1")
            .await
            .expect("login");
        assert_eq!(found.id, user.id);
        assert_ne!(session.id, before);
        assert_eq!(session.data.user_id, Some(user.id));
    }

    #[tokio::test]
    async fn require_identity_needs_a_logged_in_session() {
        let h = harness(true);
        let err = require_identity(&h.state, &SessionData::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthKind::Unauthenticated)));

        let (session, user) = register(&h, "alice12345", "a@example.com").await;
        let me = require_identity(&h.state, &session.data).await.unwrap();
        assert_eq!(me.id, user.id);
    }

    #[tokio::test]
    async fn end_session_clears_state_and_is_idempotent() {
        let h = harness(true);
        let (mut session, _) = register(&h, "alice12345", "a@example.com").await;
        persist_session(&h.state, &mut session).await.unwrap();
        let sid = session.id;
        assert!(h.state.sessions.load(sid).await.is_some());

        end_session(&h.state, &mut session).await;
        end_session(&h.state, &mut session).await;
        assert_eq!(session.data, SessionData::default());
        assert!(h.state.sessions.load(sid).await.is_none());
        assert!(current_identity(&h.state, &session.data).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persisted_token_resolves_to_saved_session() {
        let h = harness(true);
        let (mut session, user) = register(&h, "alice12345", "a@example.com").await;
        let token = persist_session(&h.state, &mut session).await.unwrap();

        let sid = SessionKeys::from_ref(&h.state).verify(&token).unwrap();
        assert_eq!(sid, session.id);
        let data = h.state.sessions.load(sid).await.unwrap();
        assert_eq!(data.user_id, Some(user.id));
    }

    #[tokio::test]
    async fn seeded_user_can_append_after_sample_trip() {
        let h = harness(true);
        let (_, user) = register(&h, "alice12345", "a@example.com").await;
        let trip = h
            .store
            .append_trip(
                user.id,
                TripFields {
                    title: "Kyoto".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(trip.sort_order, 1);
        let order = h
            .store
            .reorder(Scope::UserTrips(user.id), &[trip.id])
            .await
            .unwrap();
        assert_eq!(order[0], trip.id);
    }
}
