//! Mailbox endpoints.

use anyhow::Result;
use hyper::body::Incoming;
use hyper::{Request, StatusCode};
use serde::Serialize;

use crate::api::codec::{self, HttpResponse};
use crate::storage::Store;

/// Essential information on one mailbox, as exposed through the API.
#[derive(Serialize)]
struct EssentialMailboxInfo {
    id: String,
}

/// `GET /api/mailboxes/list`: all registered mailboxes, insertion order.
pub(crate) async fn list(store: &Store) -> Result<HttpResponse> {
    let publish: Vec<EssentialMailboxInfo> = store
        .get_mailboxes()
        .into_iter()
        .map(|mbx| EssentialMailboxInfo { id: mbx.id })
        .collect();

    codec::json(&publish)
}

/// `POST /api/mailboxes/delete`: deletes the mailbox named by the
/// `mailbox_id` form parameter, along with all its messages. 404 for an
/// unknown mailbox.
pub(crate) async fn delete(req: Request<Incoming>, store: &Store) -> Result<HttpResponse> {
    let mailbox_id = codec::form_param(req, "mailbox_id").await?;

    match store.get_mailbox(&mailbox_id) {
        Some(mbx) => {
            store.delete_mailbox(&mbx.id);
            codec::empty(StatusCode::OK)
        }
        None => {
            tracing::debug!(mailbox = %mailbox_id, "delete of unknown mailbox");
            codec::empty(StatusCode::NOT_FOUND)
        }
    }
}
