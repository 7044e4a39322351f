use std::collections::HashMap;
use std::convert::Infallible;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::verification::Challenge;
use crate::{config::SessionConfig, state::AppState, store::User};

/// Signed token payload; the session contents stay on the server.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sid: Uuid,
    pub iat: usize,
    pub exp: usize,
    pub iss: String,
    pub aud: String,
}

#[derive(Clone)]
pub struct SessionKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub ttl: Duration,
}

impl FromRef<AppState> for SessionKeys {
    fn from_ref(state: &AppState) -> Self {
        let SessionConfig {
            secret,
            issuer,
            audience,
            ttl_minutes,
        } = state.config.session.clone();
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer,
            audience,
            ttl: Duration::minutes(ttl_minutes),
        }
    }
}

impl SessionKeys {
    pub fn sign(&self, sid: Uuid) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let claims = SessionClaims {
            sid,
            iat: now.unix_timestamp() as usize,
            exp: (now + self.ttl).unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Uuid> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<SessionClaims>(token, &self.decoding, &validation)?;
        Ok(data.claims.sid)
    }
}

/// The per-session key-value bag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionData {
    pub user_id: Option<i64>,
    pub login_id: Option<String>,
    pub challenge: Option<Challenge>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub data: SessionData,
    /// Set when the id was rotated and the old entry still has to go.
    pub replaced: Option<Uuid>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self {
            id: Uuid::new_v4(),
            data: SessionData::default(),
            replaced: None,
        }
    }

    /// Binds the session to `user` under a fresh id.
    pub fn establish(&mut self, user: &User) {
        let old = std::mem::replace(&mut self.id, Uuid::new_v4());
        self.replaced.get_or_insert(old);
        self.data.user_id = Some(user.id);
        self.data.login_id = Some(user.login_id.clone());
    }
}

struct Entry {
    data: SessionData,
    expires_at: OffsetDateTime,
}

/// Server-side session bags keyed by session id. Expired entries are
/// dropped lazily.
pub struct SessionStore {
    entries: RwLock<HashMap<Uuid, Entry>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn load(&self, sid: Uuid) -> Option<SessionData> {
        let entries = self.entries.read().await;
        entries
            .get(&sid)
            .filter(|e| e.expires_at > OffsetDateTime::now_utc())
            .map(|e| e.data.clone())
    }

    pub async fn save(&self, session: &Session) {
        let now = OffsetDateTime::now_utc();
        let mut entries = self.entries.write().await;
        entries.retain(|_, e| e.expires_at > now);
        if let Some(old) = session.replaced {
            entries.remove(&old);
        }
        entries.insert(
            session.id,
            Entry {
                data: session.data.clone(),
                expires_at: now + self.ttl,
            },
        );
    }

    pub async fn remove(&self, sid: Uuid) {
        self.entries.write().await.remove(&sid);
    }
}

pub(crate) fn bearer_token(parts: &Parts) -> Option<&str> {
    let auth = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?;
    auth.strip_prefix("Bearer ")
        .or_else(|| auth.strip_prefix("bearer "))
}

/// Resolves the caller's session; a missing, invalid or expired token
/// yields a fresh anonymous one.
#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(Session::anonymous());
        };

        let keys = SessionKeys::from_ref(state);
        match keys.verify(token) {
            Ok(sid) => match state.sessions.load(sid).await {
                Some(data) => {
                    return Ok(Session {
                        id: sid,
                        data,
                        replaced: None,
                    })
                }
                None => debug!(%sid, "session ended or expired"),
            },
            Err(e) => debug!(error = %e, "rejected session token"),
        }
        Ok(Session::anonymous())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> SessionKeys {
        SessionKeys::from_ref(&AppState::fake())
    }

    fn user(id: i64) -> User {
        User {
            id,
            login_id: "Traveler01".into(),
            login_id_norm: "traveler01".into(),
            password_hash: String::new(),
            email: Some("t@example.com".into()),
            email_verified: true,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[tokio::test]
    async fn sign_and_verify_session_token() {
        let keys = make_keys();
        let sid = Uuid::new_v4();
        let token = keys.sign(sid).expect("sign");
        assert_eq!(keys.verify(&token).expect("verify"), sid);
    }

    #[tokio::test]
    async fn verify_rejects_wrong_issuer_or_audience() {
        let good = make_keys();
        let mut bad = make_keys();
        bad.issuer = "other-iss".into();
        bad.audience = "other-aud".into();
        let token = good.sign(Uuid::new_v4()).expect("sign");
        assert!(bad.verify(&token).is_err());
    }

    #[tokio::test]
    async fn verify_rejects_tampered_token() {
        let keys = make_keys();
        let mut token = keys.sign(Uuid::new_v4()).expect("sign");
        token.push('x');
        assert!(keys.verify(&token).is_err());
    }

    #[tokio::test]
    async fn establish_rotates_id_and_drops_old_entry() {
        let store = SessionStore::new(Duration::minutes(5));
        let mut session = Session::anonymous();
        store.save(&session).await;
        let first = session.id;

        session.establish(&user(7));
        assert_ne!(session.id, first);
        store.save(&session).await;

        assert!(store.load(first).await.is_none());
        let data = store.load(session.id).await.expect("saved");
        assert_eq!(data.user_id, Some(7));
        assert_eq!(data.login_id.as_deref(), Some("Traveler01"));
    }

    #[tokio::test]
    async fn expired_entries_are_not_loaded() {
        let store = SessionStore::new(Duration::seconds(-1));
        let session = Session::anonymous();
        store.save(&session).await;
        assert!(store.load(session.id).await.is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let store = SessionStore::new(Duration::minutes(5));
        let session = Session::anonymous();
        store.save(&session).await;
        store.remove(session.id).await;
        store.remove(session.id).await;
        assert!(store.load(session.id).await.is_none());
    }
}
