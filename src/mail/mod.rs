pub mod blob;
pub mod ident;

use chrono::{DateTime, Utc};

use crate::mail::blob::RawBlob;
use crate::mail::ident::gen_ident;

/// Name of the built-in mailbox receiving mail from anonymous SMTP sessions.
pub const ANONYMOUS: &str = "anonymous";

/// A named bucket of received messages.
///
/// The id is usually the username provided during SMTP authentication.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mailbox {
    pub id: String,
}

impl Mailbox {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// One fully received SMTP DATA payload plus metadata.
///
/// `raw` holds the exact byte stream as received (headers included,
/// dot-unstuffed). Values handed out by the storage layer are snapshots:
/// scalar fields plus a shared handle on the raw bytes, never references
/// into the indices.
#[derive(Clone, Debug)]
pub struct Message {
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub raw: RawBlob,
}

impl Message {
    pub fn new(raw: RawBlob) -> Self {
        Self {
            id: gen_ident(),
            received_at: Utc::now(),
            raw,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_id(id: impl Into<String>, raw: RawBlob) -> Self {
        Self {
            id: id.into(),
            received_at: Utc::now(),
            raw,
        }
    }
}
