//! One-time passcode issuance.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::{Rng, rng};
use tracing::{debug, info};

use super::AuthError;
use super::matcher::CredentialMatcher;
use crate::config::AuthConfig;
use crate::notify::{MailMessage, Notifier};
use crate::store::CredentialStore;

/// How long an issued passcode stays valid.
pub const PASSCODE_TTL_MINUTES: i64 = 10;

/// Number of digits in a passcode.
pub const PASSCODE_DIGITS: usize = 8;

const PASSCODE_SPACE: u32 = 100_000_000;

/// Subject line of the passcode mail.
pub const PASSCODE_MAIL_SUBJECT: &str = "Your login code";

/// Generate an 8-digit, zero-padded numeric passcode.
pub fn generate_passcode() -> String {
    let n = rng().random_range(0..PASSCODE_SPACE);
    format!("{n:0width$}", width = PASSCODE_DIGITS)
}

fn passcode_mail_body(code: &str) -> String {
    format!("<p>Your login code is: {code}</p>")
}

/// Issues passcodes and hands them to the notifier.
#[derive(Clone)]
pub struct PasscodeIssuer {
    store: Arc<dyn CredentialStore>,
    notifier: Arc<dyn Notifier>,
    matcher: Arc<dyn CredentialMatcher>,
    config: AuthConfig,
}

impl PasscodeIssuer {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        notifier: Arc<dyn Notifier>,
        matcher: Arc<dyn CredentialMatcher>,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            matcher,
            config,
        }
    }

    /// Replace the user's pending passcode and deliver it. Returns the user id.
    pub async fn issue(&self, email: &str) -> Result<String, AuthError> {
        let user = self
            .store
            .find_user_by_email(email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        let debug_passcode = self.config.effective_debug_passcode();
        let code = debug_passcode
            .map(str::to_string)
            .unwrap_or_else(generate_passcode);

        let hash = self.matcher.hash(&code)?;
        let expires_at = Utc::now() + Duration::minutes(PASSCODE_TTL_MINUTES);
        self.store.set_passcode(&user.id, &hash, expires_at).await?;

        if debug_passcode.is_some() {
            debug!(user_id = %user.id, "debug passcode in effect, mail skipped");
        } else {
            self.notifier.send_later(MailMessage {
                to: user.email.clone(),
                from: self.config.email_from.clone(),
                subject: PASSCODE_MAIL_SUBJECT.to_string(),
                html_body: passcode_mail_body(&code),
            });
        }

        info!(user_id = %user.id, "passcode issued");
        Ok(user.id)
    }
}
