//! Notification delivery over SMTP.
//!
//! A thin abstraction over [lettre](https://lettre.rs): the [`Mailer`] trait
//! is the seam the pipeline sends through, [`SmtpMailer`] is the production
//! implementation (STARTTLS submission, credential auth, bounded retry).
//! Message composition is a standalone function so it can be tested without
//! a transport.

use std::time::Duration;

use exponential_backoff::Backoff;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{info, instrument, warn};

use buildwatch_shared::{BuildwatchError, EmailConfig, Notification, Result};

/// First retry delay.
const RETRY_MIN_DELAY: Duration = Duration::from_millis(250);

/// Retry delay ceiling.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Mailer trait
// ---------------------------------------------------------------------------

/// Delivery seam for the pipeline.
///
/// Production uses [`SmtpMailer`]; tests substitute a recording fake.
#[allow(async_fn_in_trait)]
pub trait Mailer {
    /// Deliver one notification.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// A `Mailer` that discards everything. Placeholder for dry runs, where the
/// pipeline stops before the send stage.
pub struct NullMailer;

impl Mailer for NullMailer {
    async fn send(&self, notification: &Notification) -> Result<()> {
        info!(subject = %notification.subject, "null mailer: discarding notification");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Message composition
// ---------------------------------------------------------------------------

/// Compose the MIME message for a notification.
///
/// With an attachment the message is multipart: a plain-text body part plus
/// the persisted report, read back from disk and attached with a generic
/// binary content type (lettre applies the base64 transfer encoding).
pub fn build_message(notification: &Notification) -> Result<Message> {
    let from: Mailbox = notification.sender.parse().map_err(|e| {
        BuildwatchError::validation(format!("sender '{}': {e}", notification.sender))
    })?;
    let to: Mailbox = notification.recipient.parse().map_err(|e| {
        BuildwatchError::validation(format!("recipient '{}': {e}", notification.recipient))
    })?;

    let builder = Message::builder()
        .from(from)
        .to(to)
        .subject(notification.subject.clone());

    let message = match &notification.attachment {
        None => builder
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body.clone())
            .map_err(|e| BuildwatchError::Smtp(format!("failed to build message: {e}")))?,
        Some(att) => {
            let bytes =
                std::fs::read(&att.path).map_err(|e| BuildwatchError::report(&att.path, e))?;

            let content_type = ContentType::parse("application/octet-stream")
                .map_err(|e| BuildwatchError::Smtp(format!("attachment content type: {e}")))?;

            let body_part = SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .body(notification.body.clone());
            let attachment_part = Attachment::new(att.filename.clone()).body(bytes, content_type);

            builder
                .multipart(
                    MultiPart::mixed()
                        .singlepart(body_part)
                        .singlepart(attachment_part),
                )
                .map_err(|e| BuildwatchError::Smtp(format!("failed to build message: {e}")))?
        }
    };

    Ok(message)
}

// ---------------------------------------------------------------------------
// SmtpMailer
// ---------------------------------------------------------------------------

/// SMTP submission with STARTTLS upgrade and username/password auth.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    max_retries: u32,
}

impl SmtpMailer {
    /// Build the transport from the email config and the resolved password.
    pub fn new(
        config: &EmailConfig,
        password: &str,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let credentials =
            Credentials::new(config.smtp_username.clone(), password.to_string());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| {
                BuildwatchError::Smtp(format!("relay '{}': {e}", config.smtp_host))
            })?
            .port(config.smtp_port)
            .credentials(credentials)
            .timeout(Some(Duration::from_secs(timeout_secs)))
            .build();

        Ok(Self {
            transport,
            max_retries,
        })
    }
}

impl Mailer for SmtpMailer {
    #[instrument(skip_all, fields(recipient = %notification.recipient))]
    async fn send(&self, notification: &Notification) -> Result<()> {
        let message = build_message(notification)?;

        let backoff = Backoff::new(self.max_retries, RETRY_MIN_DELAY, Some(RETRY_MAX_DELAY));
        let mut attempt: u32 = 0;

        loop {
            match self.transport.send(message.clone()).await {
                Ok(response) => {
                    info!(code = %response.code(), "notification sent");
                    return Ok(());
                }
                Err(e) => {
                    attempt += 1;
                    let Some(delay) = backoff.next(attempt) else {
                        return Err(BuildwatchError::Smtp(e.to_string()));
                    };
                    warn!(attempt, error = %e, delay_ms = delay.as_millis(), "send failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
