//! Outbound reminder notifications.
//!
//! The engine talks to the provider through the [`Notifier`] trait; the
//! production implementation delivers over SMTP via lettre with Askama
//! templates, matching how the rest of our transactional mail goes out.

use askama::Template;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{MultiPart, SinglePart, header::ContentType},
    transport::smtp::{Error as SmtpError, authentication::Credentials},
};
use secrecy::ExposeSecret;
use thiserror::Error;

use crate::config::EmailConfig;
use crate::store::ReminderTarget;

/// HTML template for the visit reminder email.
#[derive(Template)]
#[template(path = "email/visit_reminder.html")]
struct VisitReminderHtml<'a> {
    customer_name: &'a str,
    store_name: &'a str,
    scheduled_at: &'a str,
}

/// Plain text template for the visit reminder email.
#[derive(Template)]
#[template(path = "email/visit_reminder.txt")]
struct VisitReminderText<'a> {
    customer_name: &'a str,
    store_name: &'a str,
    scheduled_at: &'a str,
}

/// Errors that can occur when sending a notification.
///
/// All of these are provider failures from the engine's point of view:
/// the pair is counted `failed` and retried on the next trigger cycle.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// SMTP transport error.
    #[error("SMTP error: {0}")]
    Smtp(#[from] SmtpError),

    /// Failed to build email message.
    #[error("Failed to build message: {0}")]
    MessageBuild(#[from] lettre::error::Error),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    /// Template rendering error.
    #[error("Template error: {0}")]
    Template(#[from] askama::Error),
}

/// Outbound notification provider for visit reminders.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Attempt a single reminder send for `(target, offset_id)`.
    async fn send(&self, target: &ReminderTarget, offset_id: &str) -> Result<(), NotifyError>;
}

/// SMTP-backed reminder notifier.
#[derive(Clone)]
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl EmailNotifier {
    /// Create a new email notifier from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the SMTP relay cannot be configured.
    pub fn new(config: &EmailConfig) -> Result<Self, SmtpError> {
        let credentials = Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.expose_secret().to_string(),
        );

        let mailer = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(credentials)
            .build();

        Ok(Self {
            mailer,
            from_address: config.from_address.clone(),
        })
    }

    async fn send_multipart_email(
        &self,
        to: &str,
        subject: &str,
        text_body: &str,
        html_body: &str,
    ) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| NotifyError::InvalidAddress(self.from_address.clone()))?,
            )
            .to(to
                .parse()
                .map_err(|_| NotifyError::InvalidAddress(to.to_string()))?)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        self.mailer.send(email).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    async fn send(&self, target: &ReminderTarget, offset_id: &str) -> Result<(), NotifyError> {
        let scheduled_at = format_scheduled_at(target.visit.scheduled_at);
        let html = VisitReminderHtml {
            customer_name: &target.customer_name,
            store_name: &target.store_name,
            scheduled_at: &scheduled_at,
        }
        .render()?;
        let text = VisitReminderText {
            customer_name: &target.customer_name,
            store_name: &target.store_name,
            scheduled_at: &scheduled_at,
        }
        .render()?;

        let subject = format!("Reminder: your visit to {}", target.store_name);
        self.send_multipart_email(target.customer_email.as_str(), &subject, &text, &html)
            .await?;

        tracing::info!(
            visit_id = %target.visit.id,
            offset = %offset_id,
            to = %target.customer_email,
            "Reminder email sent"
        );
        Ok(())
    }
}

/// Human-readable UTC timestamp for email bodies.
fn format_scheduled_at(at: DateTime<Utc>) -> String {
    at.format("%A, %B %-d at %H:%M UTC").to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_format_scheduled_at() {
        let at = DateTime::parse_from_rfc3339("2026-03-14T15:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_scheduled_at(at), "Saturday, March 14 at 15:30 UTC");
    }

    #[test]
    fn test_reminder_templates_render() {
        let html = VisitReminderHtml {
            customer_name: "Ada",
            store_name: "Corner Market",
            scheduled_at: "Saturday, March 14 at 15:30 UTC",
        }
        .render()
        .unwrap();
        assert!(html.contains("Ada"));
        assert!(html.contains("Corner Market"));

        let text = VisitReminderText {
            customer_name: "Ada",
            store_name: "Corner Market",
            scheduled_at: "Saturday, March 14 at 15:30 UTC",
        }
        .render()
        .unwrap();
        assert!(text.contains("Corner Market"));
        assert!(text.contains("15:30"));
    }
}
