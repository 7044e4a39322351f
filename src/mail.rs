use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::MailConfig;

/// Out-of-band delivery of verification mails.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Writes mails to the log. Only wired up in development mode, since the
/// body carries the plaintext code.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(%to, %subject, %body, "[DEV EMAIL]");
        Ok(())
    }
}

/// Posts mails as JSON to an HTTP relay.
#[derive(Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
    from: String,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    pub fn new(url: &str, token: Option<String>, from: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("build mail relay client")?;
        Ok(Self {
            client,
            url: url.to_string(),
            token,
            from: from.to_string(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let mut req = self.client.post(&self.url).json(&RelayMessage {
            from: &self.from,
            to,
            subject,
            text: body,
        });
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.context("mail relay request")?;
        let status = res.status();
        if !status.is_success() {
            anyhow::bail!("mail relay responded with {status}");
        }
        debug!(%to, "mail handed to relay");
        Ok(())
    }
}

/// Picks the relay when configured, the log mailer otherwise.
pub fn from_config(cfg: &MailConfig) -> anyhow::Result<std::sync::Arc<dyn Mailer>> {
    Ok(match &cfg.relay_url {
        Some(url) => std::sync::Arc::new(HttpMailer::new(url, cfg.relay_token.clone(), &cfg.from)?),
        None => std::sync::Arc::new(LogMailer),
    })
}

#[cfg(test)]
pub use test_support::MemoryMailer;

#[cfg(test)]
mod test_support {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    };

    use super::*;

    #[derive(Debug, Clone)]
    pub struct SentMail {
        pub to: String,
        pub subject: String,
        pub body: String,
    }

    /// Records mails instead of sending them; can be told to fail.
    #[derive(Default)]
    pub struct MemoryMailer {
        sent: Mutex<Vec<SentMail>>,
        failing: AtomicBool,
    }

    impl MemoryMailer {
        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn sent(&self) -> Vec<SentMail> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Mailer for MemoryMailer {
        async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("smtp connection refused");
            }
            self.sent.lock().unwrap().push(SentMail {
                to: to.into(),
                subject: subject.into(),
                body: body.into(),
            });
            Ok(())
        }
    }
}
