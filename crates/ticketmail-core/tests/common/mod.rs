//! In-memory mailbox and fixtures shared by the integration tests.

#![allow(clippy::unwrap_used, dead_code)]

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tokio::sync::Semaphore;
use ticketmail_core::model::{AccountId, Role, TicketId};
use ticketmail_core::sync::{FolderInfo, Mailbox, MailboxConnector, MailboxMessage};
use ticketmail_core::{Error, Result, SqliteStore};

/// How fetching a message fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// Server answers NO.
    Rejected,
    /// Socket reset.
    Reset,
}

#[derive(Debug, Clone)]
pub struct FakeMessage {
    pub uid: u32,
    pub internal_date: DateTime<Utc>,
    pub seen: bool,
    pub raw: Vec<u8>,
    pub failure: Option<FetchFailure>,
}

#[derive(Debug, Default)]
pub struct ServerState {
    pub folders: BTreeMap<String, (u32, Vec<FakeMessage>)>,
    pub connects: usize,
    pub failing_connects: usize,
    pub logouts: usize,
    pub unlocks: usize,
}

/// A scripted mailbox server. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct FakeServer {
    pub state: Arc<Mutex<ServerState>>,
    gate: Option<Arc<Semaphore>>,
}

impl FakeServer {
    pub fn new() -> Self {
        let server = Self::default();
        server.add_folder("INBOX", 7);
        server.add_folder("Sent", 8);
        server
    }

    /// Connects wait until [`FakeServer::release`] is called.
    pub fn gated(mut self) -> Self {
        self.gate = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn add_folder(&self, name: &str, uid_validity: u32) {
        self.state
            .lock()
            .unwrap()
            .folders
            .insert(name.to_string(), (uid_validity, Vec::new()));
    }

    pub fn remove_folder(&self, name: &str) {
        self.state.lock().unwrap().folders.remove(name);
    }

    pub fn deliver(&self, folder: &str, uid: u32, internal_date: DateTime<Utc>, raw: &str) {
        self.push(folder, FakeMessage {
            uid,
            internal_date,
            seen: false,
            raw: raw.as_bytes().to_vec(),
            failure: None,
        });
    }

    pub fn push(&self, folder: &str, message: FakeMessage) {
        let mut state = self.state.lock().unwrap();
        state.folders.get_mut(folder).unwrap().1.push(message);
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.state.lock().unwrap().failing_connects = count;
    }

    pub fn is_seen(&self, folder: &str, uid: u32) -> bool {
        let state = self.state.lock().unwrap();
        state.folders[folder]
            .1
            .iter()
            .any(|message| message.uid == uid && message.seen)
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn connector(&self) -> Arc<dyn MailboxConnector> {
        Arc::new(FakeConnector {
            server: self.clone(),
        })
    }
}

struct FakeConnector {
    server: FakeServer,
}

#[async_trait]
impl MailboxConnector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn Mailbox>> {
        if let Some(gate) = &self.server.gate {
            let _permit = gate.acquire().await.unwrap();
        }
        let mut state = self.server.state.lock().unwrap();
        state.connects += 1;
        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            return Err(Error::Io(io::Error::from(io::ErrorKind::ConnectionRefused)));
        }
        Ok(Box::new(FakeMailbox {
            server: self.server.clone(),
            folder: None,
        }))
    }
}

struct FakeMailbox {
    server: FakeServer,
    folder: Option<String>,
}

impl FakeMailbox {
    fn folder(&self) -> Result<String> {
        self.folder.clone().ok_or(Error::NotConnected)
    }
}

#[async_trait]
impl Mailbox for FakeMailbox {
    async fn lock_folder(&mut self, folder: &str) -> Result<FolderInfo> {
        let state = self.server.state.lock().unwrap();
        let Some((uid_validity, messages)) = state.folders.get(folder) else {
            return Err(Error::Imap(ticketmail_imap::Error::No(format!(
                "[NONEXISTENT] {folder} does not exist"
            ))));
        };
        let info = FolderInfo {
            name: folder.to_string(),
            uid_validity: *uid_validity,
            exists: u32::try_from(messages.len()).unwrap(),
        };
        drop(state);
        self.folder = Some(folder.to_string());
        Ok(info)
    }

    async fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>> {
        let folder = self.folder()?;
        let state = self.server.state.lock().unwrap();
        Ok(state.folders[&folder]
            .1
            .iter()
            .filter(|message| message.internal_date.date_naive() >= since)
            .map(|message| message.uid)
            .collect())
    }

    async fn fetch(&mut self, uid: u32) -> Result<Option<MailboxMessage>> {
        let folder = self.folder()?;
        let state = self.server.state.lock().unwrap();
        let Some(message) = state.folders[&folder].1.iter().find(|m| m.uid == uid) else {
            return Ok(None);
        };
        match message.failure {
            Some(FetchFailure::Rejected) => Err(Error::Imap(ticketmail_imap::Error::No(
                "message is being expunged".into(),
            ))),
            Some(FetchFailure::Reset) => {
                Err(Error::Io(io::Error::from(io::ErrorKind::ConnectionReset)))
            }
            None => Ok(Some(MailboxMessage {
                uid,
                internal_date: Some(message.internal_date),
                seen: message.seen,
                raw: message.raw.clone(),
            })),
        }
    }

    async fn mark_read(&mut self, uid: u32) -> Result<()> {
        let folder = self.folder()?;
        let mut state = self.server.state.lock().unwrap();
        for message in &mut state.folders.get_mut(&folder).unwrap().1 {
            if message.uid == uid {
                message.seen = true;
            }
        }
        Ok(())
    }

    async fn unlock_folder(&mut self) -> Result<()> {
        if self.folder.take().is_some() {
            self.server.state.lock().unwrap().unlocks += 1;
        }
        Ok(())
    }

    async fn logout(&mut self) -> Result<()> {
        self.server.state.lock().unwrap().logouts += 1;
        Ok(())
    }
}

pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, hour, minute, 0).unwrap()
}

pub fn mail(from: &str, subject: &str, message_id: &str, body: &str) -> String {
    format!(
        "From: {from}\r\nTo: desk@example.com\r\nSubject: {subject}\r\nMessage-ID: {message_id}\r\n\
         Date: Tue, 5 Mar 2024 09:00:00 +0000\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n{body}"
    )
}

pub struct Desk {
    pub store: Arc<SqliteStore>,
    pub client: AccountId,
    pub staff: AccountId,
    pub other_staff: AccountId,
    pub ticket: TicketId,
}

/// A client-owned ticket `AB12CD` in project 1, assigned to `staff`.
pub async fn desk() -> Desk {
    let store = SqliteStore::in_memory().await.unwrap();
    let client = store
        .insert_account("client@example.com", "Client", Role::Client)
        .await
        .unwrap();
    let staff = store
        .insert_account("staff@example.com", "Staff", Role::Staff)
        .await
        .unwrap();
    let other_staff = store
        .insert_account("other@example.com", "Other", Role::Staff)
        .await
        .unwrap();
    let ticket = store.insert_ticket("AB12CD", client, Some(1)).await.unwrap();
    store.assign(ticket, staff).await.unwrap();
    Desk {
        store: Arc::new(store),
        client,
        staff,
        other_staff,
        ticket,
    }
}
