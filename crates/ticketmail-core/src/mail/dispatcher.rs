//! Event dispatch with one log entry per attempt.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::events::MailEvent;
use super::message::OutboundMessage;
use super::transport::{SmtpTransport, Transport};
use crate::config::Config;
use crate::model::{DispatchStatus, MailLogEntry};
use crate::store::MailLog;

/// What happened to one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Outcome class.
    pub status: DispatchStatus,
    /// Reason for skipped and failed attempts.
    pub error: Option<String>,
}

impl DispatchOutcome {
    /// Whether the relay accepted the message.
    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.status == DispatchStatus::Sent
    }

    fn skipped(reason: &str) -> Self {
        Self {
            status: DispatchStatus::Skipped,
            error: Some(reason.to_string()),
        }
    }
}

/// Sends event notifications.
///
/// Dispatch never fails the caller: configuration gaps become `skipped`
/// outcomes, transport failures become `error` outcomes, and log-store
/// failures are only traced.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<Config>,
    transport: Arc<dyn Transport>,
    log: Arc<dyn MailLog>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("configured", &self.is_configured())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with an explicit transport.
    #[must_use]
    pub fn new(config: Arc<Config>, transport: Arc<dyn Transport>, log: Arc<dyn MailLog>) -> Self {
        Self {
            config,
            transport,
            log,
        }
    }

    /// Creates a dispatcher that talks SMTP to the configured relay.
    #[must_use]
    pub fn smtp(config: Arc<Config>, log: Arc<dyn MailLog>) -> Self {
        let options = config.smtp.session_options(&config.sync);
        let transport = Arc::new(SmtpTransport::new(config.smtp.clone(), options));
        Self::new(config, transport, log)
    }

    /// Whether host, credentials and from-address are all present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.config.smtp.is_configured()
    }

    /// Renders and sends the message for `event`.
    pub async fn dispatch(&self, event: &MailEvent) -> DispatchOutcome {
        let message = event.render(&self.config);
        self.deliver(event.kind(), &message).await
    }

    /// Sends a prepared message, logging it under `event`.
    pub async fn deliver(&self, event: &str, message: &OutboundMessage) -> DispatchOutcome {
        let outcome = if !self.is_configured() {
            DispatchOutcome::skipped("mail transport not configured")
        } else if message.recipients().is_empty() {
            DispatchOutcome::skipped("no valid recipients")
        } else {
            match self.transport.send(message).await {
                Ok(()) => DispatchOutcome {
                    status: DispatchStatus::Sent,
                    error: None,
                },
                Err(err) => {
                    warn!(event, error = %err, "mail dispatch failed");
                    DispatchOutcome {
                        status: DispatchStatus::Error,
                        error: Some(err.to_string()),
                    }
                }
            }
        };

        info!(
            event,
            status = outcome.status.as_str(),
            recipients = message.recipients().len(),
            "mail dispatch finished"
        );

        let entry = MailLogEntry {
            event: event.to_string(),
            subject: message.subject.clone(),
            recipients: message.recipients().to_vec(),
            status: outcome.status,
            error: outcome.error.clone(),
            created_at: Utc::now(),
        };
        if let Err(err) = self.log.append(&entry).await {
            warn!(event, error = %err, "failed to write mail log entry");
        }

        outcome
    }

    /// Dispatches on a background task.
    pub fn spawn(&self, event: MailEvent) -> JoinHandle<DispatchOutcome> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.dispatch(&event).await })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::{Error, Result};

    #[derive(Default)]
    struct RecordingLog(Mutex<Vec<MailLogEntry>>);

    #[async_trait]
    impl MailLog for RecordingLog {
        async fn append(&self, entry: &MailLogEntry) -> Result<()> {
            self.0.lock().unwrap().push(entry.clone());
            Ok(())
        }
    }

    struct FailingLog;

    #[async_trait]
    impl MailLog for FailingLog {
        async fn append(&self, _entry: &MailLogEntry) -> Result<()> {
            Err(Error::Config("log store offline".into()))
        }
    }

    #[derive(Default)]
    struct CountingTransport {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send(&self, _message: &OutboundMessage) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::NotConnected)
            } else {
                Ok(())
            }
        }
    }

    fn configured() -> Config {
        let mut config = Config::default();
        config.smtp.host = "smtp.example.com".into();
        config.smtp.username = "desk".into();
        config.smtp.password = "secret".into();
        config.smtp.from_address = "desk@example.com".into();
        config
    }

    fn event() -> MailEvent {
        MailEvent::RegistrationCredentials {
            email: "new@example.com".into(),
            name: "New".into(),
            password: "pw".into(),
        }
    }

    #[tokio::test]
    async fn unconfigured_dispatch_is_skipped_and_logged_once() {
        let transport = Arc::new(CountingTransport::default());
        let log = Arc::new(RecordingLog::default());
        let dispatcher = Dispatcher::new(Arc::new(Config::default()), transport.clone(), log.clone());

        assert!(!dispatcher.is_configured());
        let outcome = dispatcher.dispatch(&event()).await;

        assert_eq!(outcome.status, DispatchStatus::Skipped);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        let entries = log.0.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, DispatchStatus::Skipped);
        assert_eq!(entries[0].event, "registration_credentials");
    }

    #[tokio::test]
    async fn sent_and_failed_outcomes_are_logged() {
        let log = Arc::new(RecordingLog::default());
        let ok = Dispatcher::new(
            Arc::new(configured()),
            Arc::new(CountingTransport::default()),
            log.clone(),
        );
        let failing = Dispatcher::new(
            Arc::new(configured()),
            Arc::new(CountingTransport {
                fail: true,
                ..CountingTransport::default()
            }),
            log.clone(),
        );

        assert!(ok.dispatch(&event()).await.is_sent());
        let failed = failing.dispatch(&event()).await;
        assert_eq!(failed.status, DispatchStatus::Error);
        assert!(failed.error.unwrap().contains("not connected"));

        let entries = log.0.lock().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].recipients, vec!["new@example.com"]);
        assert_eq!(entries[1].status, DispatchStatus::Error);
    }

    #[tokio::test]
    async fn log_failures_are_swallowed() {
        let dispatcher = Dispatcher::new(
            Arc::new(configured()),
            Arc::new(CountingTransport::default()),
            Arc::new(FailingLog),
        );
        let outcome = dispatcher.spawn(event()).await.unwrap();
        assert!(outcome.is_sent());
    }

    #[tokio::test]
    async fn empty_recipient_set_is_skipped() {
        let transport = Arc::new(CountingTransport::default());
        let dispatcher = Dispatcher::new(
            Arc::new(configured()),
            transport.clone(),
            Arc::new(RecordingLog::default()),
        );
        let message = OutboundMessage::new(["nobody"], "Subject", "Body");
        let outcome = dispatcher.deliver("custom", &message).await;

        assert_eq!(outcome.status, DispatchStatus::Skipped);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
