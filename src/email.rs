use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    message::header::ContentType,
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
        PoolConfig,
    },
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::auth::repo::User;
use crate::config::SmtpConfig;

const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Out-of-band delivery boundary. The auth handlers only care whether a send
/// succeeded; the reset flow rolls back its token on failure.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_welcome(&self, user: &User, url: &str) -> anyhow::Result<()>;
    async fn send_password_reset(&self, user: &User, url: &str) -> anyhow::Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let tls = TlsParameters::new(config.host.clone())?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .port(config.port)
            .tls(Tls::Required(tls))
            .pool_config(PoolConfig::new().max_size(1))
            .timeout(Some(SEND_TIMEOUT))
            .build();
        Ok(Self {
            transport,
            from: format!("MessageHub <{}>", config.from),
        })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> anyhow::Result<()> {
        let email = Message::builder()
            .from(self.from.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)?;
        tokio::time::timeout(SEND_TIMEOUT, self.transport.send(email)).await??;
        info!(%to, %subject, "email sent");
        Ok(())
    }
}

pub fn first_name(user: &User) -> &str {
    user.name.split_whitespace().next().unwrap_or(&user.name)
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_welcome(&self, user: &User, url: &str) -> anyhow::Result<()> {
        let body = format!(
            "Hi {},\nWelcome to MessageHub! Click the following link to get started: {}",
            first_name(user),
            url
        );
        self.send(&user.email, "Welcome to MessageHub", body).await
    }

    async fn send_password_reset(&self, user: &User, url: &str) -> anyhow::Result<()> {
        let body = format!(
            "Forgot your password? Submit a PATCH request with your new password and \
             passwordConfirm to: {}.\nIf you did not forget your password, please ignore \
             this email.",
            url
        );
        self.send(
            &user.email,
            "Your password reset token (valid for only 10 minutes)",
            body,
        )
        .await
    }
}

/// Test double recording every send; `failing()` makes each send error so the
/// rollback path can be exercised.
pub struct MockMailer {
    sent: std::sync::Mutex<Vec<SentMail>>,
    fail: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub kind: &'static str,
    pub url: String,
}

impl MockMailer {
    pub fn new() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().expect("mock mailer lock").clone()
    }

    fn record(&self, user: &User, kind: &'static str, url: &str) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("mock delivery failure");
        }
        self.sent.lock().expect("mock mailer lock").push(SentMail {
            to: user.email.clone(),
            kind,
            url: url.to_string(),
        });
        Ok(())
    }
}

impl Default for MockMailer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_welcome(&self, user: &User, url: &str) -> anyhow::Result<()> {
        self.record(user, "welcome", url)
    }

    async fn send_password_reset(&self, user: &User, url: &str) -> anyhow::Result<()> {
        self.record(user, "password_reset", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo::User;

    fn test_user(name: &str) -> User {
        User::test_fixture(name, "user@example.com")
    }

    #[test]
    fn first_name_takes_leading_word() {
        assert_eq!(first_name(&test_user("Ada Lovelace")), "Ada");
        assert_eq!(first_name(&test_user("Prince")), "Prince");
    }

    #[tokio::test]
    async fn mock_mailer_records_sends() {
        let mailer = MockMailer::new();
        let user = test_user("Ada Lovelace");
        mailer
            .send_password_reset(&user, "http://localhost/reset/abc")
            .await
            .expect("mock send");
        let sent = mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "user@example.com");
        assert_eq!(sent[0].kind, "password_reset");
        assert_eq!(sent[0].url, "http://localhost/reset/abc");
    }

    #[tokio::test]
    async fn failing_mock_mailer_errors_and_records_nothing() {
        let mailer = MockMailer::failing();
        let user = test_user("Ada");
        assert!(mailer.send_welcome(&user, "http://localhost/me").await.is_err());
        assert!(mailer.sent().is_empty());
    }
}
