//! Alerting channel
//!
//! Sends one notification when the service account fails its availability
//! check. Delivery is a single attempt bounded by a timeout; failures are
//! logged and swallowed so the caller's abort path always completes.
//!
//! - [`message`] - alert composition and MIME rendering
//! - [`smtp`] - plain SMTP relay transport

pub mod message;
pub mod smtp;

use crate::context::AccountContext;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use message::{Attachment, MailMessage};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub use smtp::SmtpRelay;

/// Headroom of the outer alert bound over the relay's own dialog timeout
pub const RELAY_GRACE: Duration = Duration::from_secs(2);

/// Anything able to deliver a composed message
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<()>;
}

/// Delivery result, for logging and tests only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Sent,
    Failed,
    TimedOut,
    /// No recipients configured
    Skipped,
}

/// Alert dispatcher with a fixed sender and recipient set
#[derive(Clone)]
pub struct Alerter {
    transport: Arc<dyn MailTransport>,
    sender: String,
    recipients: Vec<String>,
    timeout: Duration,
}

impl Alerter {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        sender: &str,
        recipients: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            sender: sender.to_string(),
            recipients,
            timeout,
        }
    }

    /// Alerter over an SMTP relay. The outer bound sits above the relay's
    /// dialog timeout so a stalled relay reports its own error first.
    pub fn for_relay(relay: SmtpRelay, sender: &str, recipients: Vec<String>) -> Self {
        let timeout = relay.timeout + RELAY_GRACE;
        Self::new(Arc::new(relay), sender, recipients, timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Notify that the account is unavailable. Never fails.
    pub async fn notify_unavailable(
        &self,
        context: &AccountContext,
        attachments: &[PathBuf],
    ) -> AlertStatus {
        if self.recipients.is_empty() {
            tracing::warn!("No alert recipients configured, skipping the unavailability alert");
            return AlertStatus::Skipped;
        }

        let mut files = Vec::with_capacity(attachments.len());
        for path in attachments {
            if let Some(attachment) = Attachment::load(path).await {
                files.push(attachment);
            }
        }

        let message =
            MailMessage::unavailable(&self.sender, &self.recipients, context, Local::now(), files);

        match tokio::time::timeout(self.timeout, self.transport.send(&message)).await {
            Ok(Ok(())) => {
                tracing::info!(
                    "A notification email was sent to {} for the account availability failure",
                    self.recipients.join(", ")
                );
                AlertStatus::Sent
            }
            Ok(Err(e)) => {
                tracing::error!("Unable to send the availability alert: {:#}", e);
                AlertStatus::Failed
            }
            Err(_) => {
                tracing::error!(
                    "Sending the availability alert timed out after {:?}",
                    self.timeout
                );
                AlertStatus::TimedOut
            }
        }
    }
}
