//! Service configuration.
//!
//! Loaded from a JSON file; every field has a default so partial files are
//! accepted. Durations are written as whole seconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ticketmail_imap as imap;
use ticketmail_smtp::{SessionOptions, Timeouts as SmtpTimeouts, TlsOptions as SmtpTlsOptions};

use crate::model::AccountId;
use crate::{Error, Result};

/// Security/encryption mode for connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption.
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

/// Outbound relay settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    /// Relay hostname.
    pub host: String,
    /// Relay port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Username for AUTH.
    pub username: String,
    /// Password for AUTH.
    pub password: String,
    /// Envelope and header sender.
    pub from_address: String,
    /// Display name for the sender.
    pub from_name: Option<String>,
    /// Staff addresses notified about new offers and tickets.
    pub notification_recipients: Vec<String>,
    /// Skip certificate validation (self-signed relays).
    pub accept_invalid_certs: bool,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 465,
            security: Security::Tls,
            username: String::new(),
            password: String::new(),
            from_address: String::new(),
            from_name: None,
            notification_recipients: Vec::new(),
            accept_invalid_certs: false,
        }
    }
}

impl SmtpSettings {
    /// True when host, credentials and sender are all present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        [&self.host, &self.username, &self.password, &self.from_address]
            .iter()
            .all(|value| !value.trim().is_empty())
    }

    /// Session options using the shared connect/greeting/socket timeouts.
    #[must_use]
    pub const fn session_options(&self, sync: &SyncSettings) -> SessionOptions {
        SessionOptions {
            timeouts: SmtpTimeouts {
                connect: sync.connect_timeout,
                greeting: sync.greeting_timeout,
                socket: sync.socket_timeout,
            },
            tls: SmtpTlsOptions {
                accept_invalid_certs: self.accept_invalid_certs,
            },
        }
    }
}

/// Mailbox settings for inbound sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImapSettings {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: String,
    /// Folder receiving client replies.
    pub inbox_folder: String,
    /// Folder holding mail sent by staff.
    pub sent_folder: String,
    /// Skip certificate validation (self-signed servers).
    pub accept_invalid_certs: bool,
}

impl Default for ImapSettings {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 993,
            security: Security::Tls,
            username: String::new(),
            password: String::new(),
            inbox_folder: "INBOX".to_string(),
            sent_folder: "Sent".to_string(),
            accept_invalid_certs: false,
        }
    }
}

impl ImapSettings {
    /// True when host and credentials are present.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.host.trim().is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }

    /// Connection configuration using the shared timeouts.
    #[must_use]
    pub fn connection_config(&self, sync: &SyncSettings) -> imap::Config {
        let security = match self.security {
            Security::None => imap::Security::None,
            Security::Tls => imap::Security::Implicit,
            Security::StartTls => imap::Security::StartTls,
        };
        let mut config = imap::Config::new(self.host.clone())
            .security(security)
            .port(self.port);
        config.tls = imap::TlsOptions {
            accept_invalid_certs: self.accept_invalid_certs,
        };
        config.timeouts = imap::Timeouts {
            connect: sync.connect_timeout,
            greeting: sync.greeting_timeout,
            io: sync.socket_timeout,
        };
        config
    }
}

/// Scheduler and sync engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Whether the timer runs at all.
    pub enabled: bool,
    /// Time between timer-triggered runs.
    #[serde(with = "duration_secs")]
    pub interval: Duration,
    /// Delay before the first timer-triggered run.
    #[serde(with = "duration_secs")]
    pub initial_delay: Duration,
    /// TCP connect plus TLS handshake.
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Wait for the server greeting.
    #[serde(with = "duration_secs")]
    pub greeting_timeout: Duration,
    /// Wait for any single command to complete.
    #[serde(with = "duration_secs")]
    pub socket_timeout: Duration,
    /// Idle time after which a NOOP precedes the next command.
    #[serde(with = "duration_secs")]
    pub keepalive_interval: Duration,
    /// Overlap kept after a run with per-message errors.
    #[serde(with = "duration_secs")]
    pub safety_margin: Duration,
    /// How long an aborted run may take to exit before state is reset.
    #[serde(with = "duration_secs")]
    pub abort_grace_period: Duration,
    /// Window used when no checkpoint exists yet.
    #[serde(with = "duration_secs")]
    pub initial_lookback: Duration,
    /// Author for sent-folder mail whose sender is not an authorized staff
    /// account.
    pub default_staff_account_id: Option<AccountId>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(5 * 60),
            initial_delay: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            greeting_timeout: Duration::from_secs(30),
            socket_timeout: Duration::from_secs(60),
            keepalive_interval: Duration::from_secs(120),
            safety_margin: Duration::from_secs(10 * 60),
            abort_grace_period: Duration::from_secs(15),
            initial_lookback: Duration::from_secs(7 * 24 * 60 * 60),
            default_staff_account_id: None,
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Outbound relay.
    pub smtp: SmtpSettings,
    /// Inbound mailbox.
    pub imap: ImapSettings,
    /// Scheduler and engine.
    pub sync: SyncSettings,
    /// Base for links embedded in notifications.
    pub public_base_url: String,
    /// `SQLite` database file.
    pub database_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            smtp: SmtpSettings::default(),
            imap: ImapSettings::default(),
            sync: SyncSettings::default(),
            public_base_url: "http://localhost:8080".to_string(),
            database_path: data_dir().join("ticketmail.db"),
        }
    }
}

impl Config {
    /// Default location: `<config dir>/ticketmail/config.json`.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("ticketmail")
            .join("config.json")
    }

    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or fails
    /// [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parses and validates configuration JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or fails validation.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that can never work.
    ///
    /// Missing credentials are not errors: dispatch degrades to skipped
    /// outcomes instead.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let sync = &self.sync;
        let positive = [
            ("sync.interval", sync.interval),
            ("sync.connect_timeout", sync.connect_timeout),
            ("sync.greeting_timeout", sync.greeting_timeout),
            ("sync.socket_timeout", sync.socket_timeout),
            ("sync.abort_grace_period", sync.abort_grace_period),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| value.is_zero()) {
            return Err(Error::Config(format!("{name} must be greater than zero")));
        }
        if self.imap.inbox_folder.trim().is_empty() || self.imap.sent_folder.trim().is_empty() {
            return Err(Error::Config("imap folder names must not be empty".into()));
        }
        if self.smtp.port == 0 || self.imap.port == 0 {
            return Err(Error::Config("ports must be greater than zero".into()));
        }
        Ok(())
    }

    /// Public link for a path such as `/tickets/AB12CD`.
    #[must_use]
    pub fn link(&self, path: &str) -> String {
        format!("{}{path}", self.public_base_url.trim_end_matches('/'))
    }
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ticketmail")
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
