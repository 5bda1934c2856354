//! Message transport collaborator: an authenticated SMTP relay client and a
//! logging stand-in for dry runs.

use super::error::classify_send_error;
use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::OutboundMessage;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Delivers one fully rendered message. A returned error means the message
/// was not accepted; the caller decides what that means for the posting.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<()>;

    /// Verifies the transport can reach and authenticate with its relay.
    async fn check_connection(&self) -> Result<()>;
}

/// Sends through an SMTP relay with STARTTLS and login credentials.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: SmtpTransport,
    sender: Mailbox,
    server: String,
    timeout: Duration,
}

impl SmtpMailer {
    pub fn new(config: &Config) -> Result<Self> {
        let username = config
            .smtp_username
            .clone()
            .ok_or_else(|| AppError::Config("SMTP username is not set".to_string()))?;
        let password = config
            .smtp_password
            .as_ref()
            .map(|s| s.expose().to_string())
            .ok_or_else(|| AppError::Config("SMTP password is not set".to_string()))?;
        let sender_str = config
            .effective_sender()
            .ok_or_else(|| AppError::Config("No sender address configured".to_string()))?;
        let sender: Mailbox = sender_str.parse().map_err(|e| {
            AppError::Config(format!("Invalid sender address '{}': {}", sender_str, e))
        })?;

        let transport = SmtpTransport::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(Credentials::new(username, password))
            .timeout(Some(config.smtp_timeout))
            .build();

        tracing::debug!(target: "smtp_task",
            "SMTP transport ready for {}:{} as {}", config.smtp_host, config.smtp_port, sender);

        Ok(Self {
            transport,
            sender,
            server: format!("{}:{}", config.smtp_host, config.smtp_port),
            timeout: config.smtp_timeout,
        })
    }

    fn build_message(&self, message: &OutboundMessage) -> Result<Message> {
        let recipient: Mailbox = message.recipient.parse().map_err(|e| {
            AppError::Dispatch(format!("Invalid recipient '{}': {}", message.recipient, e))
        })?;

        let builder = Message::builder()
            .from(self.sender.clone())
            .to(recipient)
            .subject(message.subject.clone());

        let built = match &message.attachment {
            None => builder.singlepart(SinglePart::plain(message.body.clone())),
            Some(attachment) => {
                let content_type = ContentType::parse(mime_for(&attachment.filename)).map_err(|e| {
                    AppError::Dispatch(format!(
                        "Invalid content type for '{}': {}",
                        attachment.filename, e
                    ))
                })?;
                builder.multipart(
                    MultiPart::mixed()
                        .singlepart(SinglePart::plain(message.body.clone()))
                        .singlepart(
                            Attachment::new(attachment.filename.clone())
                                .body(attachment.content.clone(), content_type),
                        ),
                )
            }
        };

        built.map_err(|e| AppError::Dispatch(format!("Failed to build message: {}", e)))
    }
}

fn mime_for(filename: &str) -> &'static str {
    match Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl MessageTransport for SmtpMailer {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let email = self.build_message(message)?;
        let transport = self.transport.clone();
        let server = self.server.clone();

        tracing::debug!(target: "smtp_task", "Sending to <{}> via {}", message.recipient, server);

        let outcome = tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| AppError::Transport(format!("SMTP send task failed: {}", e)))?;

        match outcome {
            Ok(response) => {
                tracing::debug!(target: "smtp_task",
                    "Relay {} accepted message for <{}> ({:?})",
                    self.server, message.recipient, response.code());
                Ok(())
            }
            Err(e) => {
                let failure = classify_send_error(&e, &self.server);
                Err(AppError::Transport(failure.to_string()))
            }
        }
    }

    async fn check_connection(&self) -> Result<()> {
        tracing::info!(target: "smtp_task", "Testing SMTP login against {}...", self.server);
        let transport = self.transport.clone();
        let check = tokio::task::spawn_blocking(move || transport.test_connection());

        match tokio::time::timeout(self.timeout, check).await {
            Ok(Ok(Ok(true))) => {
                tracing::info!(target: "smtp_task", "SMTP connectivity test successful ({}).", self.server);
                Ok(())
            }
            Ok(Ok(Ok(false))) => Err(AppError::Transport(format!(
                "SMTP server {} did not accept the connection",
                self.server
            ))),
            Ok(Ok(Err(e))) => {
                let failure = classify_send_error(&e, &self.server);
                Err(AppError::Transport(failure.to_string()))
            }
            Ok(Err(e)) => Err(AppError::Transport(format!("SMTP connection check task failed: {}", e))),
            Err(_) => {
                tracing::error!(target: "smtp_task",
                    "SMTP connectivity test timed out connecting to {}.", self.server);
                Err(AppError::Transport(format!(
                    "Connection to {} timed out; check firewall or network settings",
                    self.server
                )))
            }
        }
    }
}

/// Logs messages instead of sending them. Every send succeeds.
#[derive(Debug, Default)]
pub struct DryRunTransport {
    sent: AtomicUsize,
}

impl DryRunTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageTransport for DryRunTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        tracing::info!(target: "smtp_task",
            "[dry-run] Would send to <{}>: '{}' ({} body chars, attachment: {})",
            message.recipient,
            message.subject,
            message.body.len(),
            message
                .attachment
                .as_ref()
                .map(|a| a.filename.as_str())
                .unwrap_or("none")
        );
        Ok(())
    }

    async fn check_connection(&self) -> Result<()> {
        tracing::info!(target: "smtp_task", "[dry-run] Skipping SMTP connectivity test.");
        Ok(())
    }
}

/// Builds the configured SMTP client and checks that it can log in.
pub async fn test_smtp_connectivity(config: &Config) -> Result<()> {
    SmtpMailer::new(config)?.check_connection().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Secret;
    use crate::core::models::MessageAttachment;

    fn config() -> Config {
        Config {
            smtp_username: Some("me@example.com".to_string()),
            smtp_password: Some(Secret::new("pw")),
            ..Config::default()
        }
    }

    fn message(attachment: Option<MessageAttachment>) -> OutboundMessage {
        OutboundMessage {
            recipient: "hr@acme.com".to_string(),
            subject: "Application for Engineer at Acme".to_string(),
            body: "Hello".to_string(),
            attachment,
        }
    }

    #[test]
    fn test_mailer_requires_credentials() {
        assert!(matches!(SmtpMailer::new(&Config::default()), Err(AppError::Config(_))));
    }

    #[test]
    fn test_build_message_with_attachment() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        let built = mailer
            .build_message(&message(Some(MessageAttachment {
                filename: "cv.pdf".to_string(),
                content: b"%PDF-1.4".to_vec(),
            })))
            .unwrap();
        let raw = String::from_utf8_lossy(&built.formatted()).to_string();
        assert!(raw.contains("application/pdf"));
        assert!(raw.contains("cv.pdf"));
        assert!(raw.contains("To: hr@acme.com"));
    }

    #[test]
    fn test_build_message_rejects_bad_recipient() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        let mut msg = message(None);
        msg.recipient = "not an address".to_string();
        assert!(matches!(mailer.build_message(&msg), Err(AppError::Dispatch(_))));
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("CV.PDF"), "application/pdf");
        assert_eq!(mime_for("resume"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_dry_run_counts_sends() {
        let transport = DryRunTransport::new();
        transport.send(&message(None)).await.unwrap();
        transport.check_connection().await.unwrap();
        assert_eq!(transport.sent_count(), 1);
    }
}
