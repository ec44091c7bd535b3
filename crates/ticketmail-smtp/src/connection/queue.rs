//! FIFO pairing of server replies with pending requests.

use crate::error::{Error, Result};
use crate::parser::{LineKind, classify_line, parse_reply};
use crate::types::Reply;
use std::collections::VecDeque;
use tokio::sync::oneshot;

/// Receiving half handed out for each queued request.
pub type ReplyReceiver = oneshot::Receiver<Result<Reply>>;

#[derive(Debug)]
struct Expectation {
    command: String,
    expected: Vec<u16>,
    lines: Vec<String>,
    responder: oneshot::Sender<Result<Reply>>,
}

impl Expectation {
    fn settle(self, result: Result<Reply>) {
        // The caller may have given up on the request; nothing to do then.
        let _ = self.responder.send(result);
    }
}

/// Strict FIFO of requests awaiting a server reply.
///
/// Reply lines are always applied to the oldest pending request. Lines that
/// arrive while nothing is pending are kept as backlog and replayed against
/// the next request that is queued.
#[derive(Debug, Default)]
pub struct ExpectationQueue {
    pending: VecDeque<Expectation>,
    backlog: VecDeque<String>,
}

impl ExpectationQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a request that accepts any of `expected` as its reply code.
    ///
    /// `command` labels the request in errors and must not carry credentials.
    pub fn enqueue(&mut self, command: impl Into<String>, expected: &[u16]) -> ReplyReceiver {
        let (responder, receiver) = oneshot::channel();
        self.pending.push_back(Expectation {
            command: command.into(),
            expected: expected.to_vec(),
            lines: Vec::new(),
            responder,
        });

        while !self.backlog.is_empty() && !self.pending.is_empty() {
            if let Some(line) = self.backlog.pop_front() {
                self.apply(line);
            }
        }

        receiver
    }

    /// Feeds one complete reply line (without CRLF).
    pub fn push_line(&mut self, line: String) {
        if self.pending.is_empty() {
            tracing::debug!(line = %line, "SMTP reply with no pending request, kept as backlog");
            self.backlog.push_back(line);
            return;
        }
        self.apply(line);
    }

    fn apply(&mut self, line: String) {
        let Some(head) = self.pending.front_mut() else {
            self.backlog.push_back(line);
            return;
        };

        match classify_line(&line) {
            LineKind::Continuation => head.lines.push(line),
            LineKind::Malformed => {
                if let Some(head) = self.pending.pop_front() {
                    let command = head.command.clone();
                    head.settle(Err(Error::Protocol(format!(
                        "Malformed reply to {command}: {line}"
                    ))));
                }
            }
            LineKind::Final => {
                head.lines.push(line);
                if let Some(head) = self.pending.pop_front() {
                    let result = Self::resolve(&head);
                    head.settle(result);
                }
            }
        }
    }

    fn resolve(head: &Expectation) -> Result<Reply> {
        let reply = parse_reply(&head.lines)?;
        let code = reply.code.as_u16();
        if head.expected.contains(&code) {
            return Ok(reply);
        }

        Err(Error::UnexpectedReply {
            command: head.command.clone(),
            expected: head.expected.clone(),
            code,
            line: head.lines.last().cloned().unwrap_or_default(),
        })
    }

    /// Rejects every pending request with an error built by `make_error`.
    pub fn reject_all(&mut self, make_error: impl Fn() -> Error) {
        let count = self.pending.len();
        for expectation in self.pending.drain(..) {
            expectation.settle(Err(make_error()));
        }
        if count > 0 {
            tracing::debug!(count, "Rejected pending SMTP requests");
        }
    }

    /// Returns true if any request is still waiting for its reply.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of requests waiting for a reply.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of buffered lines that arrived with no request pending.
    #[must_use]
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
}
