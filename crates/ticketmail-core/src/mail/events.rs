//! Business events and the messages they produce.

use std::fmt::Write;

use super::message::{OutboundAttachment, OutboundMessage};
use crate::config::Config;

/// First line of every generated body. The sync engine skips inbound mail
/// that starts with it, so notifications are never ingested as replies.
pub const NOTIFICATION_SIGNATURE: &str = "*** Automated notification from the thesis desk ***";

/// An event that triggers a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailEvent {
    /// A prospective client submitted an offer request.
    OfferSubmitted {
        /// Ticket opened for the offer.
        ticket_code: String,
        /// Offer title.
        title: String,
        /// Client display name.
        client_name: String,
        /// Client address; receives a confirmation.
        client_email: String,
        /// Free-text request.
        details: String,
        /// Uploaded files.
        attachments: Vec<OutboundAttachment>,
    },
    /// A ticket was opened.
    TicketCreated {
        /// Ticket code.
        ticket_code: String,
        /// Ticket title.
        title: String,
        /// Who opened it.
        created_by: String,
        /// Owner and assignees.
        recipients: Vec<String>,
    },
    /// Someone replied on a ticket.
    TicketReply {
        /// Ticket code.
        ticket_code: String,
        /// Ticket title.
        title: String,
        /// Reply author display name.
        author_name: String,
        /// Reply text.
        body: String,
        /// Everyone on the ticket except the author.
        recipients: Vec<String>,
    },
    /// A password reset was requested.
    PasswordReset {
        /// Account address.
        email: String,
        /// Account display name.
        name: String,
        /// One-time reset token.
        token: String,
        /// Token lifetime.
        valid_hours: u32,
    },
    /// A contract moved to another stage.
    ContractStage {
        /// Contract identifier.
        contract_id: i64,
        /// Ticket the contract belongs to, if any.
        ticket_code: Option<String>,
        /// Human-readable stage name.
        stage: String,
        /// Client and responsible staff.
        recipients: Vec<String>,
        /// Contract documents.
        attachments: Vec<OutboundAttachment>,
    },
    /// An account was created on someone's behalf.
    RegistrationCredentials {
        /// Account address.
        email: String,
        /// Account display name.
        name: String,
        /// Initial password.
        password: String,
    },
}

impl MailEvent {
    /// Event name as stored in the mail log.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::OfferSubmitted { .. } => "offer_submitted",
            Self::TicketCreated { .. } => "ticket_created",
            Self::TicketReply { .. } => "ticket_reply",
            Self::PasswordReset { .. } => "password_reset",
            Self::ContractStage { .. } => "contract_stage",
            Self::RegistrationCredentials { .. } => "registration_credentials",
        }
    }

    /// Builds the message for this event.
    #[must_use]
    pub fn render(&self, config: &Config) -> OutboundMessage {
        let mut body = format!("{NOTIFICATION_SIGNATURE}\n\n");
        let (recipients, subject, attachments): (Vec<String>, String, Vec<OutboundAttachment>) =
            match self {
                Self::OfferSubmitted {
                    ticket_code,
                    title,
                    client_name,
                    client_email,
                    details,
                    attachments,
                } => {
                    let _ = write!(
                        body,
                        "A new offer request was submitted by {client_name} <{client_email}>.\n\n\
                         Title: {title}\n\n{details}\n\n\
                         Open the ticket: {}\n",
                        ticket_link(config, ticket_code)
                    );
                    let mut recipients = config.smtp.notification_recipients.clone();
                    recipients.push(client_email.clone());
                    (
                        recipients,
                        format!("{} New offer request: {title}", ticket_tag(ticket_code)),
                        attachments.clone(),
                    )
                }
                Self::TicketCreated {
                    ticket_code,
                    title,
                    created_by,
                    recipients,
                } => {
                    let _ = write!(
                        body,
                        "{created_by} opened a new ticket.\n\nTitle: {title}\n\n\
                         Reply to this email or open the ticket: {}\n",
                        ticket_link(config, ticket_code)
                    );
                    let mut all = recipients.clone();
                    all.extend(config.smtp.notification_recipients.iter().cloned());
                    (all, format!("{} {title}", ticket_tag(ticket_code)), Vec::new())
                }
                Self::TicketReply {
                    ticket_code,
                    title,
                    author_name,
                    body: reply,
                    recipients,
                } => {
                    let _ = write!(
                        body,
                        "{author_name} replied:\n\n{reply}\n\n\
                         Reply to this email or open the ticket: {}\n",
                        ticket_link(config, ticket_code)
                    );
                    (
                        recipients.clone(),
                        format!("{} New reply: {title}", ticket_tag(ticket_code)),
                        Vec::new(),
                    )
                }
                Self::PasswordReset {
                    email,
                    name,
                    token,
                    valid_hours,
                } => {
                    let _ = write!(
                        body,
                        "Hello {name},\n\nsomeone requested a password reset for this account.\n\
                         Choose a new password within {valid_hours} hours: {}\n\n\
                         If this was not you, ignore this email.\n",
                        config.link(&format!("/reset-password?token={token}"))
                    );
                    (vec![email.clone()], "Password reset request".to_string(), Vec::new())
                }
                Self::ContractStage {
                    contract_id,
                    ticket_code,
                    stage,
                    recipients,
                    attachments,
                } => {
                    let _ = write!(
                        body,
                        "Contract #{contract_id} moved to stage: {stage}.\n\n\
                         View the contract: {}\n",
                        config.link(&format!("/contracts/{contract_id}"))
                    );
                    let subject = match ticket_code {
                        Some(code) => {
                            format!("{} Contract #{contract_id}: {stage}", ticket_tag(code))
                        }
                        None => format!("Contract #{contract_id}: {stage}"),
                    };
                    (recipients.clone(), subject, attachments.clone())
                }
                Self::RegistrationCredentials {
                    email,
                    name,
                    password,
                } => {
                    let _ = write!(
                        body,
                        "Hello {name},\n\nan account was created for you.\n\n\
                         Login: {email}\nPassword: {password}\n\n\
                         Sign in and change your password: {}\n",
                        config.link("/login")
                    );
                    (vec![email.clone()], "Your account credentials".to_string(), Vec::new())
                }
            };

        let mut message = OutboundMessage::new(recipients, subject, body);
        if !config.smtp.from_address.is_empty() {
            message = message.reply_to(config.smtp.from_address.clone());
        }
        for attachment in attachments {
            message = message.attach(attachment);
        }
        message
    }
}

/// Subject token recognised by the sync engine.
#[must_use]
pub fn ticket_tag(code: &str) -> String {
    format!("[Ticket #{code}]")
}

fn ticket_link(config: &Config, code: &str) -> String {
    config.link(&format!("/tickets/{code}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sync::ingest::{extract_ticket_code, is_automated};

    fn config() -> Config {
        let mut config = Config {
            public_base_url: "https://desk.example.com/".into(),
            ..Config::default()
        };
        config.smtp.from_address = "desk@example.com".into();
        config.smtp.notification_recipients = vec!["Staff@Example.com".into()];
        config
    }

    #[test]
    fn ticket_reply_threads_back() {
        let event = MailEvent::TicketReply {
            ticket_code: "AB12CD".into(),
            title: "Chapter 2".into(),
            author_name: "Dana".into(),
            body: "Looks good.".into(),
            recipients: vec!["client@example.com".into(), "CLIENT@example.com".into()],
        };
        let message = event.render(&config());

        assert_eq!(event.kind(), "ticket_reply");
        assert_eq!(message.subject, "[Ticket #AB12CD] New reply: Chapter 2");
        assert_eq!(extract_ticket_code(&message.subject).as_deref(), Some("AB12CD"));
        assert_eq!(message.recipients(), ["client@example.com"]);
        assert_eq!(message.reply_to.as_deref(), Some("desk@example.com"));
        assert!(message.body.contains("https://desk.example.com/tickets/AB12CD"));
        assert!(is_automated(&message.body));
    }

    #[test]
    fn offer_goes_to_staff_and_client() {
        let event = MailEvent::OfferSubmitted {
            ticket_code: "XY34ZZ".into(),
            title: "Master thesis".into(),
            client_name: "Robin".into(),
            client_email: "robin@example.com".into(),
            details: "60 pages".into(),
            attachments: vec![OutboundAttachment::memory("brief.pdf", vec![1, 2, 3])],
        };
        let message = event.render(&config());

        assert_eq!(message.recipients(), ["staff@example.com", "robin@example.com"]);
        assert_eq!(message.attachments.len(), 1);
    }

    #[test]
    fn links_use_public_base_url() {
        let reset = MailEvent::PasswordReset {
            email: "a@example.com".into(),
            name: "A".into(),
            token: "tok123".into(),
            valid_hours: 2,
        }
        .render(&config());
        assert!(reset.body.contains("https://desk.example.com/reset-password?token=tok123"));

        let contract = MailEvent::ContractStage {
            contract_id: 7,
            ticket_code: None,
            stage: "signed".into(),
            recipients: vec!["a@example.com".into()],
            attachments: Vec::new(),
        }
        .render(&config());
        assert_eq!(contract.subject, "Contract #7: signed");
        assert!(contract.body.contains("https://desk.example.com/contracts/7"));

        let credentials = MailEvent::RegistrationCredentials {
            email: "new@example.com".into(),
            name: "New".into(),
            password: "pw".into(),
        }
        .render(&config());
        assert!(credentials.body.contains("https://desk.example.com/login"));
        assert!(credentials.body.starts_with(NOTIFICATION_SIGNATURE));
    }
}
