use async_trait::async_trait;
use lettre::message::{header, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

use crate::plugins::traits::{Notification, NotificationResult, NotificationSink};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from_email: String,
    #[serde(default = "default_from_name")]
    pub from_name: String,
    pub to_email: String,
    #[serde(default = "default_use_tls")]
    pub use_tls: bool,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_name() -> String {
    "Restock Watcher".to_string()
}

fn default_use_tls() -> bool {
    true
}

impl EmailConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.smtp_server.trim().is_empty() {
            return Err("Missing smtp_server".to_string());
        }
        if self.smtp_port == 0 {
            return Err("SMTP port must be greater than 0".to_string());
        }
        self.from_mailbox()?;
        self.to_mailbox()?;
        Ok(())
    }

    fn from_mailbox(&self) -> std::result::Result<Mailbox, String> {
        format!("{} <{}>", self.from_name, self.from_email)
            .parse()
            .map_err(|e| format!("Invalid from address: {}", e))
    }

    fn to_mailbox(&self) -> std::result::Result<Mailbox, String> {
        self.to_email
            .parse()
            .map_err(|e| format!("Invalid to address: {}", e))
    }
}

pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Result<Self> {
        config.validate().map_err(|e| AppError::Notification {
            sink: "email".to_string(),
            message: e,
        })?;
        Ok(Self { config })
    }

    fn format_html_body(&self, notification: &Notification) -> String {
        let rows: String = notification
            .body()
            .lines()
            .map(|line| format!("        <p>{}</p>\n", line))
            .collect();

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 20px; }}
        .header {{ background: #f0f0f0; padding: 15px; border-radius: 5px; font-size: 18px; font-weight: bold; }}
        .details {{ margin: 15px 0; padding: 10px; background: #f9f9f9; border-radius: 3px; }}
    </style>
</head>
<body>
    <div class="header">{}</div>
    <div class="details">
{}    </div>
</body>
</html>
"#,
            notification.title(),
            rows
        )
    }

    fn format_text_body(&self, notification: &Notification) -> String {
        format!(
            "RESTOCK WATCHER ALERT\n\n{}\n\n{}\n",
            notification.title(),
            notification.body()
        )
    }

    pub fn build_message(&self, notification: &Notification) -> Result<Message> {
        let to_error = |message: String| AppError::Notification {
            sink: "email".to_string(),
            message,
        };

        Message::builder()
            .from(self.config.from_mailbox().map_err(to_error)?)
            .to(self.config.to_mailbox().map_err(to_error)?)
            .subject(notification.title())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(self.format_text_body(notification)),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(self.format_html_body(notification)),
                    ),
            )
            .map_err(|e| to_error(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.config.smtp_server).map_err(
                |e| AppError::Notification {
                    sink: "email".to_string(),
                    message: e.to_string(),
                },
            )?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&self.config.smtp_server)
        }
        .port(self.config.smtp_port);

        if let (Some(username), Some(password)) = (&self.config.username, &self.config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl NotificationSink for EmailNotifier {
    fn name(&self) -> &str {
        "Email Notifier"
    }

    fn sink_type(&self) -> &str {
        "email"
    }

    async fn notify(&self, notification: &Notification) -> Result<NotificationResult> {
        let message = self.build_message(notification)?;
        let mailer = self.transport()?;

        match mailer.send(message).await {
            Ok(_response) => Ok(NotificationResult {
                success: true,
                message_id: Some(format!("email-{}", chrono::Utc::now().timestamp())),
                error: None,
            }),
            Err(e) => Ok(NotificationResult {
                success: false,
                message_id: None,
                error: Some(e.to_string()),
            }),
        }
    }
}
