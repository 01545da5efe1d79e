use async_trait::async_trait;
use lettre::message::{MultiPart, SinglePart, header};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use rust_decimal::Decimal;

use crate::Result;
use crate::config::SmtpConfig;
use crate::extractor::ExtractedListing;

pub const ALERT_SUBJECT: &str = "Price Drop Alert";

/// Derived value built once per qualifying poll and consumed by a notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage {
    pub subject: String,
    pub html_body: String,
    pub text_body: String,
}

impl NotificationMessage {
    /// Compose the alert for a listing that dropped below `threshold`.
    pub fn price_drop(listing: &ExtractedListing, threshold: Decimal, url: &str) -> Self {
        NotificationMessage {
            subject: ALERT_SUBJECT.to_string(),
            html_body: Self::format_html_body(listing, url),
            text_body: Self::format_text_body(listing, threshold, url),
        }
    }

    fn format_html_body(listing: &ExtractedListing, url: &str) -> String {
        let mut html = String::new();

        html.push_str(
            r#"
<html>
<head>
    <style>
        body { font-family: Arial, sans-serif; background-color: #f4f4f4; margin: 0; padding: 20px; color: #333; }
        .container { max-width: 600px; margin: 0 auto; background: #ffffff; padding: 20px; border: 1px solid #ddd; border-radius: 5px; }
        h1 { font-size: 22px; color: #333; }
        p { font-size: 16px; line-height: 1.5; }
        .price { font-size: 24px; color: #333; font-weight: bold; }
        a { color: #007bff; text-decoration: none; }
        a:hover { text-decoration: underline; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Price Drop Alert</h1>
"#,
        );

        html.push_str(&format!(
            r#"        <p>The price of your item <strong>"{}"</strong> has dropped to <span class="price">{}&euro;</span>.</p>
"#,
            listing.title, listing.price
        ));

        html.push_str(&format!(
            r#"        <p>Check out the updated price here: <a href="{0}">{0}</a></p>
"#,
            url
        ));

        html.push_str(
            r#"        <p>Best regards,<br>Your Price Tracker</p>
    </div>
</body>
</html>
"#,
        );

        html
    }

    fn format_text_body(listing: &ExtractedListing, threshold: Decimal, url: &str) -> String {
        let mut text = String::new();

        text.push_str("PRICE DROP ALERT\n\n");
        text.push_str(&format!("Item: {}\n", listing.title));
        text.push_str(&format!("Price: {}€ (threshold {}€)\n", listing.price, threshold));
        text.push_str(&format!("URL: {}\n", url));

        text
    }
}

/// Seam for message delivery, fire-and-forget from the tracker's view.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn notify(&self, message: &NotificationMessage) -> Result<()>;
}

/// Delivers alerts as multipart HTML email over an authenticated STARTTLS
/// session to the configured relay. One tracker owns one notifier.
pub struct EmailNotifier {
    smtp: SmtpConfig,
    sender: String,
    password: String,
    recipient: String,
}

impl EmailNotifier {
    pub fn new(smtp: SmtpConfig, sender: String, password: String, recipient: String) -> Self {
        EmailNotifier {
            smtp,
            sender,
            password,
            recipient,
        }
    }

    fn build_email(&self, message: &NotificationMessage) -> Result<Message> {
        let email = Message::builder()
            .from(self.sender.parse()?)
            .to(self.recipient.parse()?)
            .subject(message.subject.clone())
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_PLAIN)
                            .body(message.text_body.clone()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(header::ContentType::TEXT_HTML)
                            .body(message.html_body.clone()),
                    ),
            )?;
        Ok(email)
    }
}

#[async_trait]
impl Notify for EmailNotifier {
    async fn notify(&self, message: &NotificationMessage) -> Result<()> {
        let email = self.build_email(message)?;

        // The relay session is scoped to this attempt; lettre opens the
        // connection inside send and releases it on every exit path.
        let credentials = Credentials::new(self.sender.clone(), self.password.clone());
        let mailer: AsyncSmtpTransport<Tokio1Executor> =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.smtp.host)?
                .port(self.smtp.port)
                .credentials(credentials)
                .build();

        mailer.send(email).await?;
        Ok(())
    }
}
