//! Delivery of outbound messages over SMTP.

use async_trait::async_trait;
use ticketmail_mime::MessageBuilder;
use ticketmail_smtp::{Address, Command, ReplyCode, Session, SessionOptions};
use tracing::{debug, info};

use super::message::OutboundMessage;
use crate::Result;
use crate::config::{Security, SmtpSettings};

/// Hands a message to a relay.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Delivers `message` to every recipient in one transaction.
    async fn send(&self, message: &OutboundMessage) -> Result<()>;
}

/// Transport that speaks SMTP directly to the configured relay.
#[derive(Debug, Clone)]
pub struct SmtpTransport {
    settings: SmtpSettings,
    options: SessionOptions,
}

impl SmtpTransport {
    /// Creates a transport for `settings`.
    #[must_use]
    pub const fn new(settings: SmtpSettings, options: SessionOptions) -> Self {
        Self { settings, options }
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        send_mail(&self.settings, &self.options, message).await
    }
}

/// Composes `message` and runs one SMTP conversation for it.
///
/// Attachments are loaded before connecting. The session is closed in every
/// outcome. Nothing is retried.
///
/// # Errors
///
/// Returns an error if an attachment cannot be read, the connection fails,
/// or the relay rejects any step.
pub async fn send_mail(
    settings: &SmtpSettings,
    options: &SessionOptions,
    message: &OutboundMessage,
) -> Result<()> {
    let raw = compose(settings, message).await?;

    let secure = settings.security == Security::Tls;
    let mut session = Session::open(&settings.host, settings.port, secure, options).await?;
    let result = converse(&mut session, settings, message.recipients(), &raw).await;
    session.close().await;

    if result.is_ok() {
        info!(
            recipients = message.recipients().len(),
            subject = %message.subject,
            "mail accepted by relay"
        );
    }
    result
}

/// Renders the RFC 5322 message.
///
/// # Errors
///
/// Returns an error if an attachment cannot be read or the message has no
/// sender or recipients.
pub async fn compose(settings: &SmtpSettings, message: &OutboundMessage) -> Result<Vec<u8>> {
    let mut builder = MessageBuilder::new()
        .from(settings.from_name.as_deref(), settings.from_address.clone())
        .subject(message.subject.clone())
        .text_body(message.body.clone());
    for recipient in message.recipients() {
        builder = builder.to(recipient.clone());
    }
    if let Some(reply_to) = &message.reply_to {
        builder = builder.reply_to(reply_to.clone());
    }
    for attachment in &message.attachments {
        builder = builder.attach(attachment.load().await?);
    }
    Ok(builder.build()?)
}

async fn converse(
    session: &mut Session,
    settings: &SmtpSettings,
    recipients: &[String],
    raw: &[u8],
) -> Result<()> {
    let ok = ReplyCode::OK.as_u16();
    let hostname = client_hostname(settings);

    session.greeting().await?;
    session.hello(&hostname).await?;
    if settings.security == Security::StartTls {
        session.starttls(&settings.host).await?;
        session.hello(&hostname).await?;
    }
    if !settings.username.is_empty() {
        session
            .authenticate(&settings.username, &settings.password)
            .await?;
    }

    let body = session
        .server_info()
        .supports_8bitmime()
        .then(|| "8BITMIME".to_string());
    let from = Address::new(&settings.from_address)?;
    session
        .execute(&Command::MailFrom { from, body }, &[ok])
        .await?;
    for recipient in recipients {
        let to = Address::new(recipient)?;
        session
            .execute(
                &Command::RcptTo { to },
                &[ok, ReplyCode::FORWARD.as_u16()],
            )
            .await?;
    }
    session
        .execute(&Command::Data, &[ReplyCode::START_DATA.as_u16()])
        .await?;
    let reply = session.send_data(raw).await?;
    debug!(reply = %reply.message_text(), "message queued");
    Ok(())
}

/// Name sent in EHLO: the sender's domain, which relays tend to accept
/// more readily than `localhost`.
fn client_hostname(settings: &SmtpSettings) -> String {
    settings
        .from_address
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim())
        .filter(|domain| !domain.is_empty())
        .unwrap_or("localhost")
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mail::message::OutboundAttachment;

    fn settings() -> SmtpSettings {
        SmtpSettings {
            host: "smtp.example.com".into(),
            username: "desk".into(),
            password: "secret".into(),
            from_address: "desk@example.com".into(),
            from_name: Some("Thesis Desk".into()),
            ..SmtpSettings::default()
        }
    }

    #[tokio::test]
    async fn compose_sets_headers() {
        let message = OutboundMessage::new(
            ["Client@Example.com"],
            "[Ticket #AB12CD] New reply",
            "Hello",
        )
        .reply_to("desk@example.com");
        let raw = String::from_utf8(compose(&settings(), &message).await.unwrap()).unwrap();

        assert!(raw.starts_with("From: \"Thesis Desk\" <desk@example.com>\r\n"));
        assert!(raw.contains("To: client@example.com\r\n"));
        assert!(raw.contains("Reply-To: desk@example.com\r\n"));
        assert!(raw.contains("Subject: [Ticket #AB12CD] New reply\r\n"));
    }

    #[tokio::test]
    async fn compose_fails_on_unreadable_attachment() {
        let message = OutboundMessage::new(["a@example.com"], "Contract", "See attached")
            .attach(OutboundAttachment::file("c.pdf", "/nonexistent/c.pdf"));
        assert!(compose(&settings(), &message).await.is_err());
    }

    #[test]
    fn ehlo_name_uses_sender_domain() {
        assert_eq!(client_hostname(&settings()), "example.com");
        assert_eq!(client_hostname(&SmtpSettings::default()), "localhost");
    }
}
