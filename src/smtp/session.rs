//! Per-connection SMTP session state machine.
//!
//! The machine is pure protocol logic: it consumes parsed commands and
//! produces replies plus a handful of control actions for the connection
//! loop (start collecting DATA, expect an AUTH continuation, close). All
//! I/O stays in the server loop, so the machine is testable without a
//! socket and never holds a store lock across a read.

use std::sync::Arc;

use crate::mail::blob::RawBlob;
use crate::mail::{Message, ANONYMOUS};
use crate::smtp::proto::{Command, Reply};
use crate::smtp::sasl::{self, SaslError};
use crate::storage::Store;

/// Protocol position of the session.
///
/// The mailbox binding is orthogonal: it is set by AUTH, or implicitly on
/// the first MAIL of an anonymous session, and survives RSET.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Connected, no greeting exchanged yet.
    Fresh,
    /// HELO/EHLO done, ready for a transaction.
    Greeted,
    /// MAIL accepted, waiting for recipients.
    Mail,
    /// At least one RCPT accepted; DATA is now legal.
    Rcpt,
}

/// What the connection loop must do after a command was handled.
pub enum Action {
    Reply(Reply),
    /// Write the reply (334) and feed the next line to
    /// [`Session::handle_auth_response`].
    Challenge(Reply),
    /// Write the reply (354) and collect the DATA payload.
    CollectData(Reply),
    /// Write the reply and close the connection.
    Quit(Reply),
}

pub struct Session {
    store: Arc<Store>,
    hostname: String,
    max_message_bytes: usize,
    max_recipients: usize,

    state: State,
    mailbox: Option<String>,
    recipients: usize,
}

impl Session {
    pub fn new(
        store: Arc<Store>,
        hostname: String,
        max_message_bytes: usize,
        max_recipients: usize,
    ) -> Self {
        Self {
            store,
            hostname,
            max_message_bytes,
            max_recipients,
            state: State::Fresh,
            mailbox: None,
            recipients: 0,
        }
    }

    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    pub fn handle(&mut self, cmd: Command) -> Action {
        match cmd {
            Command::Helo(_) => {
                self.reset_transaction();
                self.state = State::Greeted;
                Action::Reply(Reply::new(250, self.hostname.clone()))
            }
            Command::Ehlo(_) => {
                self.reset_transaction();
                self.state = State::Greeted;
                Action::Reply(Reply::multiline(
                    250,
                    vec![
                        self.hostname.clone(),
                        "AUTH PLAIN".into(),
                        format!("SIZE {}", self.max_message_bytes),
                        "8BITMIME".into(),
                    ],
                ))
            }
            Command::AuthPlain(initial) => self.handle_auth(initial),
            Command::AuthOther(mech) => {
                tracing::debug!(mechanism = %mech, "unsupported auth mechanism");
                Action::Reply(Reply::new(504, "5.5.4 Unrecognized authentication type"))
            }
            Command::Mail => match self.state {
                State::Greeted => {
                    // An anonymous session is bound on its first transaction.
                    if self.mailbox.is_none() {
                        self.mailbox = Some(ANONYMOUS.to_string());
                    }
                    self.state = State::Mail;
                    self.recipients = 0;
                    Action::Reply(Reply::new(250, "2.0.0 OK"))
                }
                State::Fresh => Action::Reply(Reply::new(503, "5.5.1 Say HELO/EHLO first")),
                _ => Action::Reply(Reply::new(503, "5.5.1 Nested MAIL command")),
            },
            Command::Rcpt => match self.state {
                State::Mail | State::Rcpt => {
                    if self.recipients >= self.max_recipients {
                        return Action::Reply(Reply::new(452, "4.5.3 Too many recipients"));
                    }
                    self.recipients += 1;
                    self.state = State::Rcpt;
                    Action::Reply(Reply::new(250, "2.0.0 OK"))
                }
                _ => Action::Reply(Reply::new(503, "5.5.1 Need MAIL before RCPT")),
            },
            Command::Data => match self.state {
                State::Rcpt => {
                    Action::CollectData(Reply::new(354, "Start mail input; end with <CRLF>.<CRLF>"))
                }
                _ => Action::Reply(Reply::new(503, "5.5.1 Need RCPT before DATA")),
            },
            Command::Rset => {
                self.reset_transaction();
                Action::Reply(Reply::new(250, "2.0.0 OK"))
            }
            Command::Noop => Action::Reply(Reply::new(250, "2.0.0 OK")),
            Command::Vrfy => Action::Reply(Reply::new(
                252,
                "2.1.0 Cannot VRFY user, but will accept message",
            )),
            Command::Quit => Action::Quit(Reply::new(221, "2.0.0 Bye")),
            Command::Unknown(verb) => {
                tracing::debug!(verb = %verb, "unknown command");
                Action::Reply(Reply::new(500, "5.5.2 Command not recognized"))
            }
        }
    }

    fn handle_auth(&mut self, initial: Option<String>) -> Action {
        if self.state == State::Fresh {
            return Action::Reply(Reply::new(503, "5.5.1 Say HELO/EHLO first"));
        }
        if self.state != State::Greeted {
            return Action::Reply(Reply::new(503, "5.5.1 AUTH not allowed during a transaction"));
        }
        if self.mailbox.is_some() {
            return Action::Reply(Reply::new(503, "5.5.1 Already authenticated"));
        }
        match initial {
            Some(data) => Action::Reply(self.try_auth(&data)),
            None => Action::Challenge(Reply::new(334, "")),
        }
    }

    /// Continuation line after a 334 challenge. A lone `*` aborts.
    pub fn handle_auth_response(&mut self, line: &str) -> Reply {
        if line.trim() == "*" {
            return Reply::new(501, "5.7.0 Authentication aborted");
        }
        self.try_auth(line)
    }

    fn try_auth(&mut self, data: &str) -> Reply {
        match sasl::auth_plain(data) {
            Ok(creds) => {
                // Any non-empty username is accepted; the password is not
                // checked, there is nothing it would protect.
                self.mailbox = Some(creds.username);
                Reply::new(235, "2.7.0 Authentication succeeded")
            }
            Err(SaslError::EmptyUsername) => Reply::new(535, "5.7.8 Username is mandatory"),
            Err(SaslError::Impersonation) => {
                Reply::new(535, "5.7.8 Authentication credentials invalid")
            }
            Err(e) => {
                tracing::debug!(err = %e, "could not decode AUTH PLAIN response");
                Reply::new(501, "5.5.2 Could not decode response")
            }
        }
    }

    /// Stores one fully received, dot-unstuffed DATA payload.
    pub fn commit_data(&mut self, payload: Vec<u8>) -> Reply {
        self.reset_transaction();

        let mailbox_id = match self.mailbox.as_deref() {
            Some(name) => name.to_string(),
            // Unreachable through the state machine; kept as a plain fallback.
            None => ANONYMOUS.to_string(),
        };

        let blob = match RawBlob::seal(&payload) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(err = ?e, "cannot store message payload");
                return Reply::new(451, "4.3.0 Internal error");
            }
        };

        self.store.add_mailbox(&mailbox_id);
        let msg = Message::new(blob);
        let message_id = msg.id.clone();

        if let Err(e) = self.store.add_message(msg, &mailbox_id) {
            tracing::error!(err = %e, mailbox = %mailbox_id, "cannot store message");
            return Reply::new(451, "4.3.0 Internal error");
        }

        tracing::info!(message_id = %message_id, mailbox = %mailbox_id, "message received");
        Reply::new(250, "2.0.0 OK: queued")
    }

    /// The DATA payload exceeded the allowed size; the drained bytes are
    /// dropped.
    pub fn reject_oversized_data(&mut self) -> Reply {
        self.reset_transaction();
        Reply::new(552, "5.3.4 Message too big")
    }

    fn reset_transaction(&mut self) {
        if self.state != State::Fresh {
            self.state = State::Greeted;
        }
        self.recipients = 0;
    }
}
