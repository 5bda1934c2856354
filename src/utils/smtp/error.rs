//! Turns lettre send errors into a short, loggable failure reason.

use lettre::transport::smtp::Error as SmtpError;
use std::fmt;

/// Why a single send was refused. Every variant leaves the posting unrecorded,
/// so it stays eligible for a later run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SendFailure {
    Authentication(String),
    RecipientRejected(String),
    ConnectionFailed(String),
    Tls(String),
    Transient(String),
    Permanent(String),
    Other(String),
}

impl fmt::Display for SendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendFailure::Authentication(m) => write!(f, "SMTP authentication rejected: {}", m),
            SendFailure::RecipientRejected(m) => write!(f, "Recipient rejected: {}", m),
            SendFailure::ConnectionFailed(m) => write!(f, "Connection failed: {}", m),
            SendFailure::Tls(m) => write!(f, "SMTP TLS error: {}", m),
            SendFailure::Transient(m) => write!(f, "SMTP transient error (4xx): {}", m),
            SendFailure::Permanent(m) => write!(f, "SMTP permanent error (5xx): {}", m),
            SendFailure::Other(m) => write!(f, "Unhandled SMTP error: {}", m),
        }
    }
}

pub(crate) fn classify_send_error(error: &SmtpError, server: &str) -> SendFailure {
    if error.is_timeout() {
        tracing::error!(target: "smtp_task", "SMTP send to {} timed out: {}", server, error);
        return SendFailure::ConnectionFailed(format!("timed out ({})", error));
    }
    if error.is_tls() {
        tracing::warn!(target: "smtp_task", "SMTP TLS error for {}: {}", server, error);
        return SendFailure::Tls(error.to_string());
    }
    classify_message(&error.to_string(), server)
}

fn classify_message(message: &str, server: &str) -> SendFailure {
    let lower = message.to_lowercase();

    if lower.contains("535")
        || lower.contains("authentication")
        || lower.contains("username and password not accepted")
    {
        tracing::error!(target: "smtp_task", "SMTP login refused by {}: {}", server, message);
        return SendFailure::Authentication(message.to_string());
    }

    if lower.contains("550")
        && (lower.contains("does not exist")
            || lower.contains("no such user")
            || lower.contains("user unknown")
            || lower.contains("recipient not found")
            || lower.contains("invalid mailbox")
            || lower.contains("mailbox unavailable")
            || lower.contains("address rejected")
            || lower.contains("invalid recipient")
            || lower.contains("nosuchuser"))
    {
        tracing::info!(target: "smtp_task", "Recipient unknown on {}: {}", server, message);
        return SendFailure::RecipientRejected(message.to_string());
    }

    if lower.contains("timed out")
        || lower.contains("connection refused")
        || lower.contains("network is unreachable")
        || lower.contains("connection reset")
    {
        tracing::error!(target: "smtp_task", "SMTP connection to {} failed: {}", server, message);
        return SendFailure::ConnectionFailed(message.to_string());
    }

    if lower.contains("starttls") || lower.contains("tls") {
        tracing::warn!(target: "smtp_task", "SMTP TLS error for {}: {}", server, message);
        return SendFailure::Tls(message.to_string());
    }

    if lower.contains("temporary") || lower.contains("transient") || lower.contains("greylisted") {
        tracing::warn!(target: "smtp_task", "SMTP transient error from {}: {}", server, message);
        return SendFailure::Transient(message.to_string());
    }

    if lower.contains("permanent") || lower.contains("rejected") || lower.contains("denied") {
        tracing::error!(target: "smtp_task", "SMTP permanent error from {}: {}", server, message);
        return SendFailure::Permanent(message.to_string());
    }

    tracing::error!(target: "smtp_task", "Unhandled SMTP error for {}: {}", server, message);
    SendFailure::Other(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipient_rejection() {
        let f = classify_message("permanent error (550): 5.1.1 User unknown", "smtp.gmail.com");
        assert!(matches!(f, SendFailure::RecipientRejected(_)));
    }

    #[test]
    fn test_auth_failure() {
        let f = classify_message(
            "permanent error (535): 5.7.8 Username and Password not accepted",
            "smtp.gmail.com",
        );
        assert!(matches!(f, SendFailure::Authentication(_)));
        assert!(f.to_string().starts_with("SMTP authentication rejected"));
    }

    #[test]
    fn test_connection_and_transient() {
        assert!(matches!(
            classify_message("Connection refused (os error 111)", "h"),
            SendFailure::ConnectionFailed(_)
        ));
        assert!(matches!(
            classify_message("transient error (421): try again later", "h"),
            SendFailure::Transient(_)
        ));
        assert!(matches!(classify_message("something odd", "h"), SendFailure::Other(_)));
    }
}
