use std::sync::Arc;

use time::Duration;

use crate::auth::session::SessionStore;
use crate::config::AppConfig;
use crate::mail::{self, Mailer};
use crate::store::{PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub sessions: Arc<SessionStore>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = PgStore::connect(&config.database_url, config.max_connections).await?;
        store.migrate().await?;

        let mailer = mail::from_config(&config.mail)?;
        if config.verification.dev_mode {
            tracing::warn!("verification dev mode is ON: fixed code, codes echoed to clients");
        }

        Ok(Self::from_parts(Arc::new(store), mailer, config))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        config: Arc<AppConfig>,
    ) -> Self {
        let sessions = Arc::new(SessionStore::new(Duration::minutes(
            config.session.ttl_minutes,
        )));
        Self {
            store,
            sessions,
            mailer,
            config,
        }
    }

    /// In-memory state in development mode.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::from_parts(
            Arc::new(crate::store::MemoryStore::new()),
            Arc::new(mail::MemoryMailer::default()),
            Arc::new(crate::config::test_config(true)),
        )
    }
}
