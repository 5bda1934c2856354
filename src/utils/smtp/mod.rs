//! Outbound message delivery over SMTP.

mod client;
mod error;

pub use client::{test_smtp_connectivity, DryRunTransport, MessageTransport, SmtpMailer};
