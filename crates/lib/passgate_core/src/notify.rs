//! Outbound mail notification.
//!
//! Delivery is fire-and-forget: `send_later` returns immediately and the
//! issuing flow never waits on, or fails because of, delivery.

use tracing::{debug, info};

/// A mail message ready for delivery.
#[derive(Clone)]
pub struct MailMessage {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub html_body: String,
}

impl std::fmt::Debug for MailMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailMessage")
            .field("to", &self.to)
            .field("from", &self.from)
            .field("subject", &self.subject)
            .finish_non_exhaustive()
    }
}

/// Mail delivery abstraction.
pub trait Notifier: Send + Sync {
    /// Queue a message for delivery without waiting for the outcome.
    fn send_later(&self, message: MailMessage);
}

/// Notifier that logs messages instead of sending them.
///
/// The body carries the passcode, so it is only logged when `log_body` is set.
#[derive(Clone, Debug, Default)]
pub struct LogNotifier {
    log_body: bool,
}

impl LogNotifier {
    pub fn new(log_body: bool) -> Self {
        Self { log_body }
    }
}

impl Notifier for LogNotifier {
    fn send_later(&self, message: MailMessage) {
        let log_body = self.log_body;
        tokio::spawn(async move {
            info!(
                to = %message.to,
                from = %message.from,
                subject = %message.subject,
                "mail send stub"
            );
            if log_body {
                debug!(to = %message.to, body = %message.html_body, "mail body");
            }
        });
    }
}

/// Notifier that keeps every message in memory, for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<MailMessage>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<MailMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn send_later(&self, message: MailMessage) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message);
        }
    }
}
