use crate::config::Config;
use crate::error::Result;
use crate::models::submission::Submission;
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// Delivery seam used by the queue service. The production implementation
/// talks SMTP; tests substitute their own.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Probes the transport. `Ok(false)` means the server answered but
    /// refused us; an `Err` means it was unreachable.
    async fn verify(&self) -> Result<bool>;

    async fn send_analysis_email(&self, submission: &Submission) -> Result<()>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    public_base_url: String,
}

impl EmailService {
    pub fn from_config(config: &Config) -> Result<Self> {
        let creds = Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host)?
            .port(config.smtp_port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(config.email_send_timeout_secs)))
            .build();
        let from: Mailbox = config.email_from.parse()?;

        Ok(Self {
            mailer,
            from,
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn build_message(&self, submission: &Submission) -> Result<Message> {
        let to_address: Address = submission.email.parse()?;
        let to = Mailbox::new(
            Some(format!(
                "{} {}",
                submission.first_name, submission.last_name
            )),
            to_address,
        );

        let plain = plain_body(submission);
        let html = html_body(submission, &self.public_base_url);

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Your CV review results")
            .multipart(MultiPart::alternative_plain_html(plain, html))?;
        Ok(message)
    }
}

#[async_trait]
impl Mailer for EmailService {
    async fn verify(&self) -> Result<bool> {
        Ok(self.mailer.test_connection().await?)
    }

    async fn send_analysis_email(&self, submission: &Submission) -> Result<()> {
        let message = self.build_message(submission)?;
        self.mailer.send(message).await?;
        tracing::info!(
            submission_id = submission.id,
            to = %submission.email,
            "analysis email sent"
        );
        Ok(())
    }
}

// The analysis payload comes from an external scorer and is treated as
// opaque; rendering is lenient and skips anything that is not shaped as
// expected.
fn string_items(results: Option<&JsonValue>, key: &str) -> Vec<String> {
    results
        .and_then(|r| r.get(key))
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn plain_body(submission: &Submission) -> String {
    let mut body = format!("Hi {},\n\n", submission.first_name);
    body.push_str("Thank you for submitting your CV. Our review is complete.\n\n");

    if let Some(score) = submission.analysis_score {
        body.push_str(&format!("Overall score: {}/100\n\n", score));
    }

    let strengths = string_items(submission.analysis_results.as_ref(), "strengths");
    if !strengths.is_empty() {
        body.push_str("What stood out:\n");
        for s in &strengths {
            body.push_str(&format!("  - {}\n", s));
        }
        body.push('\n');
    }

    let improvements = string_items(submission.analysis_results.as_ref(), "improvements");
    if !improvements.is_empty() {
        body.push_str("Suggestions for improvement:\n");
        for s in &improvements {
            body.push_str(&format!("  - {}\n", s));
        }
        body.push('\n');
    }

    body.push_str("Best regards,\nThe recruitment team\n");
    body
}

fn html_body(submission: &Submission, public_base_url: &str) -> String {
    let mut html = format!("<p>Hi {},</p>", escape_html(&submission.first_name));
    html.push_str("<p>Thank you for submitting your CV. Our review is complete.</p>");

    if let Some(score) = submission.analysis_score {
        html.push_str(&format!("<p><strong>Overall score: {}/100</strong></p>", score));
    }

    let strengths = string_items(submission.analysis_results.as_ref(), "strengths");
    if !strengths.is_empty() {
        html.push_str("<p>What stood out:</p><ul>");
        for s in &strengths {
            html.push_str(&format!("<li>{}</li>", escape_html(s)));
        }
        html.push_str("</ul>");
    }

    let improvements = string_items(submission.analysis_results.as_ref(), "improvements");
    if !improvements.is_empty() {
        html.push_str("<p>Suggestions for improvement:</p><ul>");
        for s in &improvements {
            html.push_str(&format!("<li>{}</li>", escape_html(s)));
        }
        html.push_str("</ul>");
    }

    html.push_str("<p>Best regards,<br>The recruitment team</p>");
    html.push_str(&format!(
        "<img src=\"{}/api/track/email-open/{}\" width=\"1\" height=\"1\" alt=\"\">",
        public_base_url, submission.public_id
    ));
    html
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
