use crate::domain::model::{DateRange, Recipients, StatementArtifact, DATE_FORMAT};
use crate::domain::ports::Mailer;
use crate::utils::error::{Result, StatementError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Serialize;
use std::fmt;

pub const DEFAULT_BASE_URL: &str = "https://api.sendgrid.com";

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub base_url: String,
    pub from: String,
    /// `{start}` and `{end}` are replaced with the ISO dates of the run.
    pub subject: String,
    pub html_body: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            from: "noreply@example.com".to_string(),
            subject: "Extrato {start} - {end}".to_string(),
            html_body: "Please find attached your bank statements.".to_string(),
        }
    }
}

impl EmailSettings {
    pub fn subject_for(&self, range: &DateRange) -> String {
        self.subject
            .replace("{start}", &range.start().format(DATE_FORMAT).to_string())
            .replace("{end}", &range.end().format(DATE_FORMAT).to_string())
    }
}

#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    content_type: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct Attachment<'a> {
    content: String,
    filename: &'a str,
    #[serde(rename = "type")]
    mime_type: &'a str,
    disposition: &'a str,
}

#[derive(Serialize)]
struct MailSend<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
    attachments: Vec<Attachment<'a>>,
}

/// SendGrid v3 寄信，產出物以附件方式附上
pub struct SendGridMailer {
    http: Client,
    api_key: ApiKey,
    settings: EmailSettings,
    subject: String,
}

impl SendGridMailer {
    pub fn new(http: Client, api_key: ApiKey, settings: EmailSettings, range: &DateRange) -> Self {
        let subject = settings.subject_for(range);
        Self {
            http,
            api_key,
            settings,
            subject,
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    fn build_message<'a>(
        &'a self,
        recipients: &'a Recipients,
        artifacts: &'a [StatementArtifact],
    ) -> MailSend<'a> {
        MailSend {
            personalizations: vec![Personalization {
                to: recipients
                    .iter()
                    .map(|r| Address { email: r.as_str() })
                    .collect(),
            }],
            from: Address {
                email: &self.settings.from,
            },
            subject: &self.subject,
            content: vec![Content {
                content_type: "text/html",
                value: &self.settings.html_body,
            }],
            attachments: artifacts
                .iter()
                .map(|a| Attachment {
                    content: STANDARD.encode(a.bytes()),
                    filename: a.filename(),
                    mime_type: a.format().mime_type(),
                    disposition: "attachment",
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, recipients: &Recipients, artifacts: &[StatementArtifact]) -> Result<()> {
        if recipients.is_empty() {
            return Err(StatementError::email("no recipients"));
        }

        let message = self.build_message(recipients, artifacts);
        let url = format!("{}/v3/mail/send", self.settings.base_url.trim_end_matches('/'));
        tracing::debug!(
            "Sending '{}' with {} attachments to {} recipients",
            self.subject,
            artifacts.len(),
            recipients.len()
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key.0)
            .json(&message)
            .send()
            .await
            .map_err(|e| StatementError::email(format!("SendGrid request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StatementError::email(format!(
                "SendGrid returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::StatementFormat;

    #[test]
    fn test_subject_template() {
        let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        let settings = EmailSettings::default();
        assert_eq!(settings.subject_for(&range), "Extrato 2024-01-01 - 2024-01-31");
    }

    #[test]
    fn test_message_carries_every_attachment() {
        let range = DateRange::parse("2024-01-01", "2024-01-31").unwrap();
        let mailer = SendGridMailer::new(
            Client::new(),
            ApiKey::new("SG.key"),
            EmailSettings::default(),
            &range,
        );
        let recipients = Recipients::parse_list("a@example.com,b@example.com").unwrap();
        let artifacts = vec![
            StatementArtifact::new(StatementFormat::Pdf, b"%PDF-1.4".to_vec(), &range).unwrap(),
            StatementArtifact::new(StatementFormat::Ofx, b"OFXHEADER:100".to_vec(), &range)
                .unwrap(),
        ];

        let json = serde_json::to_value(mailer.build_message(&recipients, &artifacts)).unwrap();

        assert_eq!(json["personalizations"][0]["to"].as_array().unwrap().len(), 2);
        assert_eq!(json["from"]["email"], "noreply@example.com");
        assert_eq!(json["attachments"][0]["content"], "JVBERi0xLjQ=");
        assert_eq!(json["attachments"][0]["type"], "application/pdf");
        assert_eq!(json["attachments"][1]["filename"], "2024-01-01-2024-01-31.ofx");
        assert_eq!(json["attachments"][1]["disposition"], "attachment");
    }

    #[test]
    fn test_api_key_is_redacted() {
        assert_eq!(format!("{:?}", ApiKey::new("SG.secret")), "ApiKey(***)");
    }
}
