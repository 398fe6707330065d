//! Message endpoints.

use anyhow::Result;
use hyper::body::Incoming;
use hyper::{Request, StatusCode};
use serde::Serialize;

use crate::api::codec::{self, HttpResponse};
use crate::mail::Message;
use crate::storage::Store;
use crate::view;

/// Essential information on one message, as exposed by the list endpoint.
#[derive(Serialize)]
struct EssentialMessageInfo {
    id: String,
    from: Vec<String>,
    to: Vec<String>,
    subject: String,
    #[serde(rename = "receivedAt")]
    received_at: i64,
}

/// Full information on one message, essentials plus contents.
#[derive(Serialize)]
struct DetailedMessageInfo {
    id: String,
    from: Vec<String>,
    to: Vec<String>,
    subject: String,
    #[serde(rename = "receivedAt")]
    received_at: i64,
    content: Content,
}

#[derive(Serialize)]
struct Content {
    raw: String,
    html: Option<String>,
    text: Option<String>,
}

/// `GET /api/messages/list`: essentials of every message in the mailbox
/// named by `mailbox_id`, newest first. An unknown mailbox yields an empty
/// list.
pub(crate) async fn list(req: Request<Incoming>, store: &Store) -> Result<HttpResponse> {
    let mailbox_id = codec::form_param(req, "mailbox_id").await?;

    let mut publish = Vec::new();
    for msg in store.get_messages(&mailbox_id) {
        let essentials = essentials(&msg)?;
        publish.push(essentials);
    }

    codec::json(&publish)
}

/// `GET /api/messages/details`: essentials plus aggregated contents of
/// the message named by `message_id`. 404 for an unknown message.
pub(crate) async fn details(req: Request<Incoming>, store: &Store) -> Result<HttpResponse> {
    let message_id = codec::form_param(req, "message_id").await?;

    let msg = match store.get_message(&message_id) {
        Some(m) => m,
        None => {
            tracing::debug!(message_id = %message_id, "details of unknown message");
            return codec::empty(StatusCode::NOT_FOUND);
        }
    };

    let raw = msg.raw.open()?;
    let info = view::read_basic(&raw)?;
    let contents = view::read_contents(&raw)?;

    codec::json(&DetailedMessageInfo {
        id: msg.id,
        from: info.from,
        to: info.to,
        subject: info.subject,
        received_at: msg.received_at.timestamp(),
        content: Content {
            raw: contents.raw,
            html: contents.html,
            text: contents.plain,
        },
    })
}

/// `POST /api/messages/delete`: deletes the message named by the
/// `message_id` form parameter. 404 for an unknown message.
pub(crate) async fn delete(req: Request<Incoming>, store: &Store) -> Result<HttpResponse> {
    let message_id = codec::form_param(req, "message_id").await?;

    match store.get_message(&message_id) {
        Some(msg) => {
            store.delete_message(&msg.id);
            codec::empty(StatusCode::OK)
        }
        None => {
            tracing::debug!(message_id = %message_id, "delete of unknown message");
            codec::empty(StatusCode::NOT_FOUND)
        }
    }
}

fn essentials(msg: &Message) -> Result<EssentialMessageInfo> {
    let raw = msg.raw.open()?;
    let info = view::read_basic(&raw)?;

    Ok(EssentialMessageInfo {
        id: msg.id.clone(),
        from: info.from,
        to: info.to,
        subject: info.subject,
        received_at: msg.received_at.timestamp(),
    })
}
