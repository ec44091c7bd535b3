//! Connection management: streams, framing, and the type-state client.

mod client;
mod config;
mod framed;
mod stream;

pub use client::{Authenticated, Client, NotAuthenticated, Selected};
pub use config::{Config, Security, Timeouts};
pub use framed::FramedStream;
pub use stream::{ImapStream, TlsOptions, connect_plain, connect_tls};

use crate::Result;

/// Connects according to `config`, reads the greeting and, for
/// [`Security::StartTls`], upgrades the connection before returning.
///
/// # Errors
///
/// Returns an error if connecting, the greeting, or the TLS upgrade fails.
pub async fn connect(config: &Config) -> Result<Client<ImapStream, NotAuthenticated>> {
    let timeouts = config.timeouts;
    tracing::debug!(host = %config.host, port = config.port, security = ?config.security, "IMAP connect");

    match config.security {
        Security::Implicit => {
            let stream = connect_tls(&config.host, config.port, timeouts.connect, config.tls).await?;
            Client::from_stream(stream, timeouts).await
        }
        Security::StartTls => {
            let stream = connect_plain(&config.host, config.port, timeouts.connect).await?;
            let client = Client::from_stream(stream, timeouts).await?;
            client.starttls(&config.host, config.tls).await
        }
        Security::None => {
            let stream = connect_plain(&config.host, config.port, timeouts.connect).await?;
            Client::from_stream(stream, timeouts).await
        }
    }
}
