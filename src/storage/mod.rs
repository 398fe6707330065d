//! Central in-memory storage for everything mail.
//!
//! Two index groups coexist: the mailbox side (ordered mailbox list plus its
//! id index) and the message side (global message list, per-mailbox message
//! id lists, and the reverse message -> mailbox link). Each side is guarded
//! by its own `RwLock`; whenever both are needed the message lock is taken
//! first and released last, uniformly, so writers cannot deadlock.
//!
//! Mailboxes persist until an explicit [`Store::delete_mailbox`]: deleting
//! the last message of a mailbox leaves the (empty) mailbox registered.

pub mod list;

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::mail::{Mailbox, Message};
use crate::storage::list::{NodeId, NodeList};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    /// Returned upon adding a message to a mailbox that is not registered.
    #[error("mailbox is not registered")]
    MailboxNotRegistered,

    /// Returned upon adding a message whose ID is already present in the
    /// storage, in any mailbox.
    #[error("message with such ID already exists")]
    Duplicate,
}

#[derive(Default)]
struct MailboxSide {
    /// All registered mailboxes, in insertion order.
    order: NodeList<Mailbox>,

    /// Maps mailbox ID to its node in `order`.
    index: HashMap<String, NodeId>,
}

#[derive(Default)]
struct MessageSide {
    /// All stored messages, newest first. Enumeration is per-mailbox; this
    /// list only provides O(1) removal through `index`.
    order: NodeList<Message>,

    /// Maps message ID to its node in `order`.
    index: HashMap<String, NodeId>,

    /// Maps mailbox ID to the IDs of its messages, newest first.
    mailbox_lists: HashMap<String, NodeList<String>>,

    /// Maps message ID to its node inside the list of the owning mailbox.
    mailbox_nodes: HashMap<String, NodeId>,

    /// Maps message ID to the ID of the mailbox it belongs to.
    mailbox_of: HashMap<String, String>,
}

pub struct Store {
    messages: RwLock<MessageSide>,
    mailboxes: RwLock<MailboxSide>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(MessageSide::default()),
            mailboxes: RwLock::new(MailboxSide::default()),
        }
    }

    /// Registers a mailbox ID and returns the corresponding mailbox.
    ///
    /// Idempotent: when the ID is already registered, the existing mailbox
    /// is returned and nothing changes.
    pub fn add_mailbox(&self, mailbox_id: &str) -> Mailbox {
        let mut side = self.mailboxes.write().unwrap();

        if let Some(existing) = side.index.get(mailbox_id).and_then(|&n| side.order.get(n)) {
            return existing.clone();
        }

        let mbx = Mailbox::new(mailbox_id);
        let node = side.order.push_back(mbx.clone());
        side.index.insert(mbx.id.clone(), node);
        mbx
    }

    /// Stores a new message and binds it to the mailbox with the given ID.
    ///
    /// The mailbox must already be registered. All indices are updated
    /// together under the write lock, so the insertion is all-or-nothing.
    pub fn add_message(&self, msg: Message, mailbox_id: &str) -> Result<(), StorageError> {
        let mut messages = self.messages.write().unwrap();
        let mailboxes = self.mailboxes.read().unwrap();

        if !mailboxes.index.contains_key(mailbox_id) {
            return Err(StorageError::MailboxNotRegistered);
        }
        if messages.index.contains_key(&msg.id) {
            return Err(StorageError::Duplicate);
        }

        let message_id = msg.id.clone();
        let global = messages.order.push_front(msg);
        messages.index.insert(message_id.clone(), global);

        let in_mailbox = messages
            .mailbox_lists
            .entry(mailbox_id.to_string())
            .or_default()
            .push_front(message_id.clone());
        messages.mailbox_nodes.insert(message_id.clone(), in_mailbox);
        messages
            .mailbox_of
            .insert(message_id, mailbox_id.to_string());

        Ok(())
    }

    /// Returns the registered mailbox, or `None` for an unknown ID.
    pub fn get_mailbox(&self, mailbox_id: &str) -> Option<Mailbox> {
        let side = self.mailboxes.read().unwrap();
        side.index
            .get(mailbox_id)
            .and_then(|&n| side.order.get(n))
            .cloned()
    }

    /// Returns the stored message, or `None` for an unknown ID.
    pub fn get_message(&self, message_id: &str) -> Option<Message> {
        let side = self.messages.read().unwrap();
        side.index
            .get(message_id)
            .and_then(|&n| side.order.get(n))
            .cloned()
    }

    /// Returns all registered mailboxes, in insertion order.
    pub fn get_mailboxes(&self) -> Vec<Mailbox> {
        let side = self.mailboxes.read().unwrap();
        side.order.iter().cloned().collect()
    }

    /// Returns the messages bound to the given mailbox, newest first.
    ///
    /// An unknown mailbox yields an empty list, not an error.
    pub fn get_messages(&self, mailbox_id: &str) -> Vec<Message> {
        let side = self.messages.read().unwrap();
        match side.mailbox_lists.get(mailbox_id) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| side.index.get(id).and_then(|&n| side.order.get(n)))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// Returns the number of registered mailboxes.
    pub fn count_mailboxes(&self) -> usize {
        self.mailboxes.read().unwrap().order.len()
    }

    /// Returns the number of messages bound to the given mailbox.
    pub fn count_messages(&self, mailbox_id: &str) -> usize {
        let side = self.messages.read().unwrap();
        side.mailbox_lists.get(mailbox_id).map_or(0, |l| l.len())
    }

    /// Deletes a registered mailbox along with all its messages.
    ///
    /// An unknown ID is a no-op.
    pub fn delete_mailbox(&self, mailbox_id: &str) {
        let mut messages = self.messages.write().unwrap();
        let mut mailboxes = self.mailboxes.write().unwrap();

        if let Some(ids) = messages.mailbox_lists.remove(mailbox_id) {
            for message_id in ids.iter() {
                messages.mailbox_nodes.remove(message_id);
                messages.mailbox_of.remove(message_id);
                if let Some(global) = messages.index.remove(message_id) {
                    messages.order.remove(global);
                }
            }
        }

        if let Some(node) = mailboxes.index.remove(mailbox_id) {
            mailboxes.order.remove(node);
        }
    }

    /// Deletes a stored message. An unknown ID is a no-op.
    ///
    /// The owning mailbox stays registered even when this was its last
    /// message.
    pub fn delete_message(&self, message_id: &str) {
        let mut messages = self.messages.write().unwrap();
        let _mailboxes = self.mailboxes.write().unwrap();

        if let Some(node) = messages.mailbox_nodes.remove(message_id) {
            if let Some(owner) = messages.mailbox_of.remove(message_id) {
                if let Some(ids) = messages.mailbox_lists.get_mut(&owner) {
                    ids.remove(node);
                }
            }
        }

        if let Some(global) = messages.index.remove(message_id) {
            messages.order.remove(global);
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mail::blob::RawBlob;

    fn msg(id: &str) -> Message {
        Message::with_id(id, RawBlob::seal(b"Subject: t\r\n\r\nbody\r\n").unwrap())
    }

    #[test]
    fn add_message_requires_mailbox() {
        let store = Store::new();
        assert_eq!(
            store.add_message(msg("message_1"), "mailbox_1"),
            Err(StorageError::MailboxNotRegistered)
        );
        assert!(store.get_message("message_1").is_none());
    }

    #[test]
    fn add_and_count() {
        let store = Store::new();
        assert_eq!(store.count_mailboxes(), 0);
        assert_eq!(store.count_messages("mailbox_1"), 0);

        store.add_mailbox("mailbox_1");
        store.add_message(msg("message_1"), "mailbox_1").unwrap();

        assert_eq!(store.count_mailboxes(), 1);
        assert_eq!(store.count_messages("mailbox_1"), 1);
        assert_eq!(store.get_message("message_1").unwrap().id, "message_1");
    }

    #[test]
    fn add_mailbox_is_idempotent() {
        let store = Store::new();
        let first = store.add_mailbox("mailbox_1");
        let again = store.add_mailbox("mailbox_1");
        assert_eq!(first, again);
        assert_eq!(store.count_mailboxes(), 1);
    }

    #[test]
    fn duplicate_id_is_rejected_in_any_mailbox() {
        let store = Store::new();
        store.add_mailbox("mailbox_1");
        store.add_mailbox("mailbox_2");

        store.add_message(msg("message_1"), "mailbox_1").unwrap();
        assert_eq!(
            store.add_message(msg("message_1"), "mailbox_2"),
            Err(StorageError::Duplicate)
        );

        // The store is unchanged by the failed insert.
        assert_eq!(store.count_messages("mailbox_1"), 1);
        assert_eq!(store.count_messages("mailbox_2"), 0);
    }

    #[test]
    fn messages_are_newest_first() {
        let store = Store::new();
        store.add_mailbox("mailbox_1");
        for id in ["message_1", "message_2", "message_3"] {
            store.add_message(msg(id), "mailbox_1").unwrap();
        }

        let got: Vec<String> = store
            .get_messages("mailbox_1")
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(got, vec!["message_3", "message_2", "message_1"]);
    }

    #[test]
    fn mailboxes_are_in_insertion_order() {
        let store = Store::new();
        store.add_mailbox("mailbox_1");
        store.add_mailbox("mailbox_2");
        store.add_mailbox("mailbox_1");

        let got: Vec<String> = store.get_mailboxes().into_iter().map(|m| m.id).collect();
        assert_eq!(got, vec!["mailbox_1", "mailbox_2"]);
        assert_eq!(store.count_mailboxes(), got.len());
    }

    #[test]
    fn unknown_mailbox_reads_are_empty() {
        let store = Store::new();
        assert!(store.get_mailbox("nope").is_none());
        assert!(store.get_messages("nope").is_empty());
        assert_eq!(store.count_messages("nope"), 0);
    }

    #[test]
    fn delete_mailbox_cascades() {
        let store = Store::new();
        store.add_mailbox("mailbox_1");
        store.add_message(msg("message_1"), "mailbox_1").unwrap();
        store.add_message(msg("message_2"), "mailbox_1").unwrap();

        store.delete_mailbox("mailbox_1");

        assert!(store.get_mailbox("mailbox_1").is_none());
        assert!(store.get_message("message_1").is_none());
        assert!(store.get_message("message_2").is_none());
        assert_eq!(store.count_messages("mailbox_1"), 0);

        // Deleted IDs are free again.
        store.add_mailbox("mailbox_1");
        store.add_message(msg("message_1"), "mailbox_1").unwrap();
        assert_eq!(store.count_messages("mailbox_1"), 1);
    }

    #[test]
    fn delete_message_keeps_empty_mailbox() {
        let store = Store::new();
        store.add_mailbox("mailbox_1");
        store.add_message(msg("message_1"), "mailbox_1").unwrap();

        store.delete_message("message_1");

        assert!(store.get_message("message_1").is_none());
        assert_eq!(store.count_messages("mailbox_1"), 0);
        assert!(store.get_mailbox("mailbox_1").is_some());
    }

    #[test]
    fn deletes_of_unknown_ids_are_noops() {
        let store = Store::new();
        store.delete_mailbox("nope");
        store.delete_message("nope");
        assert_eq!(store.count_mailboxes(), 0);
    }

    #[test]
    fn delete_message_preserves_sibling_order() {
        let store = Store::new();
        store.add_mailbox("mailbox_1");
        for id in ["message_1", "message_2", "message_3"] {
            store.add_message(msg(id), "mailbox_1").unwrap();
        }

        store.delete_message("message_2");

        let got: Vec<String> = store
            .get_messages("mailbox_1")
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(got, vec!["message_3", "message_1"]);
    }

    #[test]
    fn concurrent_inserts_land_in_their_mailboxes() {
        use std::sync::Arc;

        let store = Arc::new(Store::new());
        let mut handles = Vec::new();
        for t in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                let mailbox = format!("mailbox_{}", t);
                store.add_mailbox(&mailbox);
                for i in 0..100 {
                    let id = format!("message_{}_{}", t, i);
                    store.add_message(msg(&id), &mailbox).unwrap();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.count_mailboxes(), 4);
        for t in 0..4 {
            assert_eq!(store.count_messages(&format!("mailbox_{}", t)), 100);
        }
    }
}
