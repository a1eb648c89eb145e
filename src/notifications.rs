//! Notification ledger: an append-only list on each user's document.
//!
//! Entries are never deleted; they only flip from unread to read. Listing
//! returns them in insertion order, oldest first.

use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::model::{new_id, Notification, NotificationKind, User};
use crate::storage::Storage;

/// A notification that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub from_id: Option<String>,
    pub message: String,
}

impl NewNotification {
    pub fn friend_request(from_id: &str, from_name: &str) -> Self {
        Self {
            kind: NotificationKind::FriendRequest,
            from_id: Some(from_id.to_string()),
            message: format!("{} sent you a friend request", display_name(from_name)),
        }
    }

    pub fn friend_accepted(by_id: &str, by_name: &str) -> Self {
        Self {
            kind: NotificationKind::FriendAccepted,
            from_id: Some(by_id.to_string()),
            message: format!("{} accepted your friend request", display_name(by_name)),
        }
    }

    pub fn message(from_id: &str, from_name: &str) -> Self {
        Self {
            kind: NotificationKind::Message,
            from_id: Some(from_id.to_string()),
            message: format!("{} sent you a message", display_name(from_name)),
        }
    }
}

fn display_name(name: &str) -> &str {
    if name.trim().is_empty() {
        "Someone"
    } else {
        name
    }
}

/// Append to an already-loaded document. For use inside a larger
/// `update_user` so the entry lands in the same write.
pub fn push_entry(user: &mut User, new: NewNotification, now: u64) -> Notification {
    let entry = Notification {
        id: new_id(),
        kind: new.kind,
        from_id: new.from_id,
        message: new.message,
        read: false,
        created_at: now,
    };
    user.notifications.push(entry.clone());
    entry
}

pub struct NotificationLedger {
    storage: Arc<Storage>,
}

impl NotificationLedger {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self { storage }
    }

    pub fn append(&self, owner: &str, new: NewNotification, now: u64) -> CoreResult<Notification> {
        self.storage
            .update_user::<_, CoreError, _>(owner, |u| Ok(push_entry(u, new, now)))
    }

    pub fn list(&self, owner: &str) -> CoreResult<Vec<Notification>> {
        let user = self.storage.require_user(owner)?;
        Ok(user.notifications)
    }

    /// Returns how many entries changed from unread to read.
    pub fn mark_all_read(&self, owner: &str) -> CoreResult<usize> {
        self.storage.update_user::<_, CoreError, _>(owner, |u| {
            let mut changed = 0;
            for n in u.notifications.iter_mut().filter(|n| !n.read) {
                n.read = true;
                changed += 1;
            }
            Ok(changed)
        })
    }

    /// Returns `false` when the owner has no entry with that id.
    pub fn mark_read(&self, owner: &str, id: &str) -> CoreResult<bool> {
        self.storage.update_user::<_, CoreError, _>(owner, |u| {
            match u.notifications.iter_mut().find(|n| n.id == id) {
                Some(n) => {
                    n.read = true;
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    pub fn unread_count(&self, owner: &str) -> CoreResult<usize> {
        let user = self.storage.require_user(owner)?;
        Ok(user.notifications.iter().filter(|n| !n.read).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn setup() -> (NotificationLedger, String) {
        let storage = Arc::new(Storage::open_in_memory().unwrap());
        let user = User::new("a@example.com", "Alice", "hash".to_string(), 1);
        storage.insert_user(&user).unwrap();
        (NotificationLedger::new(storage), user.id)
    }

    #[test]
    fn test_append_and_list_oldest_first() {
        let (ledger, owner) = setup();
        ledger
            .append(&owner, NewNotification::friend_request("b", "Bob"), 10)
            .unwrap();
        ledger
            .append(&owner, NewNotification::message("c", "Carol"), 20)
            .unwrap();

        let list = ledger.list(&owner).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].kind, NotificationKind::FriendRequest);
        assert_eq!(list[0].message, "Bob sent you a friend request");
        assert_eq!(list[1].message, "Carol sent you a message");
        assert!(list.iter().all(|n| !n.read));
        assert_eq!(ledger.unread_count(&owner).unwrap(), 2);
    }

    #[test]
    fn test_mark_all_read_counts_changes() {
        let (ledger, owner) = setup();
        for i in 0..3 {
            ledger
                .append(&owner, NewNotification::message("peer", &format!("Peer{i}")), i)
                .unwrap();
        }
        assert_eq!(ledger.mark_all_read(&owner).unwrap(), 3);
        assert_eq!(ledger.mark_all_read(&owner).unwrap(), 0);
        assert_eq!(ledger.unread_count(&owner).unwrap(), 0);
        assert_eq!(ledger.list(&owner).unwrap().len(), 3);
    }

    #[test]
    fn test_mark_single_read() {
        let (ledger, owner) = setup();
        let first = ledger
            .append(&owner, NewNotification::message("peer", "One"), 1)
            .unwrap();
        ledger
            .append(&owner, NewNotification::message("peer", "Two"), 2)
            .unwrap();

        assert!(ledger.mark_read(&owner, &first.id).unwrap());
        assert!(!ledger.mark_read(&owner, "missing").unwrap());
        assert_eq!(ledger.unread_count(&owner).unwrap(), 1);
    }

    #[test]
    fn test_missing_owner_is_not_found() {
        let (ledger, _) = setup();
        let err = ledger
            .append("ghost", NewNotification::message("peer", "X"), 1)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(ledger.list("ghost").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_blank_sender_name() {
        let n = NewNotification::message("b", "  ");
        assert_eq!(n.message, "Someone sent you a message");
    }
}
