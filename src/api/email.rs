//! Outbound email delivery abstraction.
//!
//! Handlers never talk SMTP directly; they build an [`EmailMessage`] and hand it to
//! an [`EmailSender`]. The default for local development is [`LogEmailSender`],
//! which logs the payload and returns `Ok(())`. With SMTP settings configured,
//! [`SmtpEmailSender`] delivers over a TLS relay. Senders are blocking; async
//! callers go through `tokio::task::spawn_blocking`.

use anyhow::{Context, Result};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::PoolConfig;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::info;

#[derive(Clone, Debug)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

/// Build the verification-code message sent during registration and password reset.
#[must_use]
pub fn verify_code_message(to_email: &str, code: &str) -> EmailMessage {
    EmailMessage {
        to_email: to_email.to_string(),
        subject: "Melodia - verification code".to_string(),
        body: format!("Your verification code is {code}. It is valid for 5 minutes."),
    }
}

/// Email delivery abstraction used by the verify-code handler.
pub trait EmailSender: Send + Sync {
    /// Deliver a message or return an error so the caller can log the failure.
    fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev sender that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogEmailSender;

impl EmailSender for LogEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            body = %message.body,
            "email send stub"
        );
        Ok(())
    }
}

/// SMTP relay settings taken from the CLI/environment.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
}

/// Sender backed by a pooled TLS SMTP relay.
pub struct SmtpEmailSender {
    from: String,
    mailer: SmtpTransport,
}

impl SmtpEmailSender {
    /// Build the transport up front so misconfiguration fails at startup.
    ///
    /// # Errors
    ///
    /// Returns an error if the relay host is invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let mailer = SmtpTransport::relay(&config.host)
            .with_context(|| format!("failed to create SMTP transport for {}", config.host))?
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.expose_secret().to_string(),
            ))
            .port(config.port)
            .pool_config(PoolConfig::new().max_size(1))
            .timeout(Some(Duration::from_secs(10)))
            .build();

        Ok(Self {
            from: config.username.clone(),
            mailer,
        })
    }
}

impl EmailSender for SmtpEmailSender {
    fn send(&self, message: &EmailMessage) -> Result<()> {
        let email = Message::builder()
            .from(
                format!("Melodia <{}>", self.from)
                    .parse()
                    .context("invalid from address")?,
            )
            .to(message
                .to_email
                .parse()
                .context("invalid recipient address")?)
            .subject(&message.subject)
            .header(lettre::message::header::ContentType::TEXT_PLAIN)
            .body(message.body.clone())
            .context("failed to build email")?;

        self.mailer
            .send(&email)
            .with_context(|| format!("failed to send email to {}", message.to_email))?;

        Ok(())
    }
}
