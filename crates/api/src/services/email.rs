//! Email service for sending account verification emails.
//!
//! Supports multiple email providers:
//! - `console`: Logs emails to console (development)
//! - `smtp`: Sends via SMTP server using `lettre`
//! - `sendgrid`: Uses SendGrid API

use crate::config::EmailConfig;
use lettre::{
    message::{Mailbox, MultiPart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

const SENDGRID_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const VERIFICATION_SUBJECT: &str = "Confirm your email";

/// Errors that can occur during email operations.
#[derive(Debug, Error)]
pub enum EmailError {
    #[error("Email service not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid email address: {0}")]
    InvalidAddress(String),

    #[error("Failed to build message: {0}")]
    BuildFailed(String),

    #[error("Failed to send email: {0}")]
    SendFailed(String),

    #[error("Provider error: {0}")]
    ProviderError(String),
}

/// Email message to be sent.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub body_text: String,
    pub body_html: String,
}

/// Email service for sending transactional emails.
#[derive(Clone)]
pub struct EmailService {
    config: Arc<EmailConfig>,
    smtp: Option<AsyncSmtpTransport<Tokio1Executor>>,
    http: reqwest::Client,
}

impl EmailService {
    /// Creates a new EmailService. The SMTP transport is built eagerly so a
    /// bad relay host fails at startup instead of on the first signup.
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let smtp = if config.enabled && config.provider == "smtp" {
            Some(build_smtp_transport(&config)?)
        } else {
            None
        };

        Ok(Self {
            config: Arc::new(config),
            smtp,
            http: reqwest::Client::new(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Base URL for verification links, falling back to the request host.
    pub fn link_base(&self, request_host: Option<&str>) -> String {
        if !self.config.base_url.is_empty() {
            return self.config.base_url.clone();
        }
        match request_host {
            Some(host) => format!("http://{}/", host),
            None => "http://localhost:8000/".to_string(),
        }
    }

    /// Send an email message through the configured provider.
    pub async fn send(&self, message: EmailMessage) -> Result<(), EmailError> {
        if !self.config.enabled {
            debug!(
                to = %message.to,
                subject = %message.subject,
                "Email service disabled, skipping send"
            );
            return Ok(());
        }

        match self.config.provider.as_str() {
            "console" => self.send_console(message),
            "smtp" => self.send_smtp(message).await,
            "sendgrid" => self.send_sendgrid(message).await,
            provider => Err(EmailError::NotConfigured(format!(
                "unknown email provider '{}'",
                provider
            ))),
        }
    }

    /// Send the account verification email.
    pub async fn send_verification_email(
        &self,
        to_email: &str,
        username: &str,
        base: &str,
        token: &str,
    ) -> Result<(), EmailError> {
        let message = verification_email(to_email, username, base, token);
        self.send(message).await
    }

    /// Sends the verification email on a background task. Failures are
    /// logged and never reach the caller.
    pub fn spawn_verification_email(
        &self,
        to_email: String,
        username: String,
        base: String,
        token: String,
    ) {
        let service = self.clone();
        tokio::spawn(async move {
            match service
                .send_verification_email(&to_email, &username, &base, &token)
                .await
            {
                Ok(()) => {
                    metrics::counter!("verification_emails_sent_total").increment(1);
                }
                Err(e) => {
                    metrics::counter!("verification_emails_failed_total").increment(1);
                    error!(to = %to_email, error = %e, "Failed to send verification email");
                }
            }
        });
    }

    fn send_console(&self, message: EmailMessage) -> Result<(), EmailError> {
        info!(
            to = %message.to,
            to_name = ?message.to_name,
            subject = %message.subject,
            from = %self.config.sender_email,
            "Email (console provider)"
        );
        info!(body_text = %message.body_text, "Email body (plain text)");
        Ok(())
    }

    async fn send_smtp(&self, message: EmailMessage) -> Result<(), EmailError> {
        let transport = self
            .smtp
            .as_ref()
            .ok_or_else(|| EmailError::NotConfigured("SMTP transport not built".into()))?;

        let from = mailbox(&self.config.sender_email, Some(&self.config.sender_name))?;
        let to = mailbox(&message.to, message.to_name.as_deref())?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.clone())
            .multipart(MultiPart::alternative_plain_html(
                message.body_text,
                message.body_html,
            ))
            .map_err(|e| EmailError::BuildFailed(e.to_string()))?;

        transport
            .send(email)
            .await
            .map_err(|e| EmailError::SendFailed(e.to_string()))?;

        info!(to = %message.to, subject = %message.subject, "Email sent via SMTP");
        Ok(())
    }

    async fn send_sendgrid(&self, message: EmailMessage) -> Result<(), EmailError> {
        if self.config.sendgrid_api_key.is_empty() {
            return Err(EmailError::NotConfigured("sendgrid_api_key is empty".into()));
        }

        let mut recipient = serde_json::json!({ "email": message.to });
        if let Some(name) = &message.to_name {
            recipient["name"] = serde_json::json!(name);
        }

        let body = serde_json::json!({
            "personalizations": [{ "to": [recipient] }],
            "from": {
                "email": self.config.sender_email,
                "name": self.config.sender_name
            },
            "subject": message.subject,
            "content": [
                { "type": "text/plain", "value": message.body_text },
                { "type": "text/html", "value": message.body_html }
            ]
        });

        let response = self
            .http
            .post(SENDGRID_URL)
            .bearer_auth(&self.config.sendgrid_api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::SendFailed(format!("SendGrid request failed: {}", e)))?;

        if response.status().is_success() {
            info!(to = %message.to, subject = %message.subject, "Email sent via SendGrid");
            Ok(())
        } else {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %error_body, "SendGrid API error");
            Err(EmailError::ProviderError(format!(
                "SendGrid returned {}: {}",
                status, error_body
            )))
        }
    }
}

impl std::fmt::Debug for EmailService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailService")
            .field("enabled", &self.config.enabled)
            .field("provider", &self.config.provider)
            .finish()
    }
}

fn build_smtp_transport(
    config: &EmailConfig,
) -> Result<AsyncSmtpTransport<Tokio1Executor>, EmailError> {
    if config.smtp_host.is_empty() {
        return Err(EmailError::NotConfigured("smtp_host is empty".into()));
    }

    let builder = match config.smtp_security.as_str() {
        "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)
            .map_err(|e| EmailError::NotConfigured(e.to_string()))?,
        "starttls" => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| EmailError::NotConfigured(e.to_string()))?,
        "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host),
        other => {
            return Err(EmailError::NotConfigured(format!(
                "unknown smtp_security '{}'",
                other
            )))
        }
    };

    let mut builder = builder.port(config.smtp_port);
    if !config.smtp_username.is_empty() {
        builder = builder.credentials(Credentials::new(
            config.smtp_username.clone(),
            config.smtp_password.clone(),
        ));
    }

    Ok(builder.build())
}

fn mailbox(address: &str, name: Option<&str>) -> Result<Mailbox, EmailError> {
    let address = address
        .parse()
        .map_err(|_| EmailError::InvalidAddress(address.to_string()))?;
    Ok(Mailbox::new(name.map(str::to_string), address))
}

/// Confirmation link for an email token. `base` may omit the trailing slash.
pub fn confirmation_link(base: &str, token: &str) -> String {
    let base = base.trim_end_matches('/');
    format!("{}/api/auth/confirmed_email/{}", base, token)
}

/// Builds the verification message for a freshly signed up user.
pub fn verification_email(to_email: &str, username: &str, base: &str, token: &str) -> EmailMessage {
    let url = confirmation_link(base, token);
    let to_name = Some(username.to_string());

    let body_text = format!(
        r#"Hi {username},

Thanks for signing up. Please confirm your email address by opening the link below:

{url}

If you didn't create an account, you can safely ignore this email."#
    );

    let username = html_escape(username);
    let url = html_escape(&url);
    let body_html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{subject}</title>
</head>
<body style="font-family: Helvetica, Arial, sans-serif; color: #333; max-width: 600px; margin: 0 auto; padding: 20px;">
    <h2>Hi {username},</h2>
    <p>Thanks for signing up. Please confirm your email address by clicking the button below:</p>
    <p style="text-align: center; margin: 30px 0;">
        <a href="{url}" style="background: #2d6cdf; color: white; padding: 12px 24px; text-decoration: none; border-radius: 6px;">Confirm email</a>
    </p>
    <p style="color: #999; font-size: 12px;">Or copy and paste this link into your browser:<br>{url}</p>
</body>
</html>"#,
        subject = VERIFICATION_SUBJECT,
    );

    EmailMessage {
        to: to_email.to_string(),
        to_name,
        subject: VERIFICATION_SUBJECT.to_string(),
        body_text,
        body_html,
    }
}

/// Escapes text for interpolation into HTML content or attributes.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
