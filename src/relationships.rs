//! Relationship engine: the friend/request/block state machine between two
//! users, plus groups, privacy and the read-side friend queries.
//!
//! Relationship facts live on both users' documents and are read with OR
//! semantics, so a pair whose two documents disagree (a crash between the two
//! writes of an accept, or legacy data) still resolves to one state. Blocks
//! beat friendship and friendship beats pending requests.
//!
//! Every operation that looks at both documents holds a per-pair lock for its
//! whole read-check-write sequence. Different pairs never contend.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use serde::Serialize;

use crate::error::{CoreError, CoreResult};
use crate::groups;
use crate::logging;
use crate::model::{
    BlockEntry, FriendEntry, FriendGroup, FriendRequest, PairState, Privacy, PrivacyUpdate,
    PublicUser, RequestStatus, User,
};
use crate::notifications::{push_entry, NewNotification};
use crate::presence::{PresenceRegistry, ServerEvent};
use crate::storage::Storage;

pub const MAX_NOTE_LEN: usize = 280;
pub const MAX_NICKNAME_LEN: usize = 64;
pub const MAX_BADGE_LEN: usize = 32;
pub const MAX_REASON_LEN: usize = 280;
pub const DEFAULT_SUGGESTION_LIMIT: usize = 10;

// ---------------------------------------------------------------------------
// Pair state
// ---------------------------------------------------------------------------

/// Derive how `a` relates to `b` from both documents.
pub fn derive_pair_state(a: &User, b: &User) -> PairState {
    match (a.has_blocked(&b.id), b.has_blocked(&a.id)) {
        (true, true) => return PairState::MutualBlock,
        (true, false) => return PairState::Blocking,
        (false, true) => return PairState::BlockedBy,
        (false, false) => {}
    }
    if a.is_friend_with(&b.id) || b.is_friend_with(&a.id) {
        PairState::Friends
    } else if b.has_pending_request_from(&a.id) {
        PairState::OutgoingRequest
    } else if a.has_pending_request_from(&b.id) {
        PairState::IncomingRequest
    } else {
        PairState::None
    }
}

/// Remove every trace of `peer_id` as a friend or requester from `user`.
fn strip_relation(user: &mut User, peer_id: &str) {
    user.friends.retain(|f| f.peer_id != peer_id);
    user.friend_requests.retain(|r| !r.is_pending_from(peer_id));
    groups::strip_member(&mut user.friend_groups, peer_id);
}

fn add_friend_once(user: &mut User, peer_id: &str, now: u64) {
    if !user.is_friend_with(peer_id) {
        user.friends.push(FriendEntry::new(peer_id, now));
    }
}

fn clean_text(value: Option<&str>, max: usize, what: &str) -> CoreResult<Option<String>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if value.chars().count() > max {
        return Err(CoreError::validation(format!(
            "{what} exceeds {max} characters"
        )));
    }
    Ok(Some(value.to_string()))
}

// ---------------------------------------------------------------------------
// Per-pair locks
// ---------------------------------------------------------------------------

type PairGuard = ArcMutexGuard<RawMutex, ()>;

/// Lock table keyed by the unordered pair of user ids.
///
/// Entries nobody holds or waits on are pruned on the next acquisition.
#[derive(Default)]
struct PairLocks {
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl PairLocks {
    fn lock(&self, a: &str, b: &str) -> PairGuard {
        let key = if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        };
        let lock = {
            let mut map = self.locks.lock();
            map.retain(|_, l| Arc::strong_count(l) > 1);
            map.entry(key).or_default().clone()
        };
        lock.lock_arc()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

// ---------------------------------------------------------------------------
// Read-side views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FriendView {
    pub user: PublicUser,
    pub since: u64,
    pub nickname: Option<String>,
    pub badges: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestView {
    pub from: PublicUser,
    pub note: Option<String>,
    pub date: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockedView {
    pub user: PublicUser,
    pub reason: Option<String>,
    pub date: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub user: PublicUser,
    pub mutual_count: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct RelationshipEngine {
    storage: Arc<Storage>,
    presence: Arc<PresenceRegistry>,
    pair_locks: PairLocks,
}

impl RelationshipEngine {
    pub fn new(storage: Arc<Storage>, presence: Arc<PresenceRegistry>) -> Self {
        Self {
            storage,
            presence,
            pair_locks: PairLocks::default(),
        }
    }

    fn load_pair(&self, a: &str, b: &str) -> CoreResult<(User, User)> {
        let a = self.storage.require_user(a)?;
        let b = self.storage.require_user(b)?;
        Ok((a, b))
    }

    pub fn relationship(&self, a: &str, b: &str) -> CoreResult<PairState> {
        if a == b {
            return Err(CoreError::SelfTarget);
        }
        let (a, b) = self.load_pair(a, b)?;
        Ok(derive_pair_state(&a, &b))
    }

    // -----------------------------------------------------------------------
    // Requests
    // -----------------------------------------------------------------------

    pub fn send_request(
        &self,
        requester_id: &str,
        target_id: &str,
        note: Option<&str>,
        now: u64,
    ) -> CoreResult<()> {
        if requester_id == target_id {
            return Err(CoreError::SelfTarget);
        }
        let note = clean_text(note, MAX_NOTE_LEN, "note")?;

        let _guard = self.pair_locks.lock(requester_id, target_id);
        let (requester, target) = self.load_pair(requester_id, target_id)?;

        match derive_pair_state(&requester, &target) {
            PairState::Blocking | PairState::BlockedBy | PairState::MutualBlock => {
                return Err(CoreError::forbidden(
                    "you cannot send a request to this user",
                ));
            }
            PairState::Friends | PairState::OutgoingRequest | PairState::IncomingRequest => {
                return Err(CoreError::AlreadyRelated);
            }
            _ if !target.privacy.can_receive_requests => {
                return Err(CoreError::forbidden(
                    "this user is not accepting friend requests",
                ));
            }
            PairState::None => {}
        }

        let request_note = note.clone();
        let notification = self
            .storage
            .update_user::<_, CoreError, _>(target_id, |t| {
                if t.has_pending_request_from(requester_id) || t.is_friend_with(requester_id) {
                    return Err(CoreError::AlreadyRelated);
                }
                // Archived entries from this requester are superseded.
                t.friend_requests.retain(|r| r.from_id != requester_id);
                t.friend_requests.push(FriendRequest {
                    from_id: requester_id.to_string(),
                    note: request_note,
                    date: now,
                    status: RequestStatus::Pending,
                });
                Ok(push_entry(
                    t,
                    NewNotification::friend_request(requester_id, &requester.full_name),
                    now,
                ))
            })?;

        tracing::info!(
            "friends: request {} -> {}",
            logging::user_id(requester_id),
            logging::user_id(target_id)
        );

        self.presence.push(
            target_id,
            ServerEvent::FriendRequestReceived {
                from_id: requester_id.to_string(),
                from_name: requester.full_name.clone(),
                note,
            },
        );
        self.presence
            .push(target_id, ServerEvent::Notification { notification });
        Ok(())
    }

    /// Withdraw a pending request. Returns whether one was removed.
    pub fn cancel_request(&self, requester_id: &str, target_id: &str) -> CoreResult<bool> {
        if requester_id == target_id {
            return Err(CoreError::SelfTarget);
        }
        let _guard = self.pair_locks.lock(requester_id, target_id);
        let removed = self
            .storage
            .update_user::<_, CoreError, _>(target_id, |t| {
                let before = t.friend_requests.len();
                t.friend_requests.retain(|r| !r.is_pending_from(requester_id));
                Ok(t.friend_requests.len() != before)
            })?;
        if removed {
            tracing::info!(
                "friends: request {} -> {} cancelled",
                logging::user_id(requester_id),
                logging::user_id(target_id)
            );
        }
        Ok(removed)
    }

    pub fn accept(&self, accepter_id: &str, requester_id: &str, now: u64) -> CoreResult<()> {
        if accepter_id == requester_id {
            return Err(CoreError::SelfTarget);
        }
        let _guard = self.pair_locks.lock(accepter_id, requester_id);
        let (accepter, requester) = self.load_pair(accepter_id, requester_id)?;

        if !accepter.has_pending_request_from(requester_id) {
            return Err(CoreError::NotFound("friend request".to_string()));
        }
        if accepter.has_blocked(requester_id) || requester.has_blocked(accepter_id) {
            return Err(CoreError::forbidden("this user is blocked"));
        }

        // Accepter first: if the second write fails the pair still reads as
        // friends through the accepter's side.
        self.storage
            .update_user::<_, CoreError, _>(accepter_id, |a| {
                if !a.has_pending_request_from(requester_id) {
                    return Err(CoreError::NotFound("friend request".to_string()));
                }
                a.friend_requests.retain(|r| !r.is_pending_from(requester_id));
                add_friend_once(a, requester_id, now);
                Ok(())
            })?;

        let notification = self
            .storage
            .update_user::<_, CoreError, _>(requester_id, |r| {
                add_friend_once(r, accepter_id, now);
                // A crossed request the accepter had sent is settled too.
                for crossed in r
                    .friend_requests
                    .iter_mut()
                    .filter(|req| req.is_pending_from(accepter_id))
                {
                    crossed.status = RequestStatus::Accepted;
                }
                Ok(push_entry(
                    r,
                    NewNotification::friend_accepted(accepter_id, &accepter.full_name),
                    now,
                ))
            })?;

        tracing::info!(
            "friends: {} accepted {}",
            logging::user_id(accepter_id),
            logging::user_id(requester_id)
        );

        self.presence.push(
            requester_id,
            ServerEvent::FriendRequestAccepted {
                by_id: accepter_id.to_string(),
                by_name: accepter.full_name.clone(),
            },
        );
        self.presence
            .push(requester_id, ServerEvent::Notification { notification });
        Ok(())
    }

    /// Decline a pending request. The entry stays on record as `rejected`
    /// and does not stop the requester from asking again later.
    pub fn reject(&self, accepter_id: &str, requester_id: &str) -> CoreResult<()> {
        if accepter_id == requester_id {
            return Err(CoreError::SelfTarget);
        }
        let _guard = self.pair_locks.lock(accepter_id, requester_id);
        self.storage
            .update_user::<_, CoreError, _>(accepter_id, |a| {
                let entry = a
                    .friend_requests
                    .iter_mut()
                    .find(|r| r.is_pending_from(requester_id))
                    .ok_or_else(|| CoreError::NotFound("friend request".to_string()))?;
                entry.status = RequestStatus::Rejected;
                Ok(())
            })?;
        tracing::info!(
            "friends: {} rejected {}",
            logging::user_id(accepter_id),
            logging::user_id(requester_id)
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Friendship and blocks
    // -----------------------------------------------------------------------

    /// Returns `false` if the two were not friends.
    pub fn remove_friend(&self, user_id: &str, friend_id: &str) -> CoreResult<bool> {
        if user_id == friend_id {
            return Err(CoreError::SelfTarget);
        }
        let _guard = self.pair_locks.lock(user_id, friend_id);
        let (user, friend) = self.load_pair(user_id, friend_id)?;
        if !user.is_friend_with(friend_id) && !friend.is_friend_with(user_id) {
            return Ok(false);
        }

        let unfriend = |owner: &str, peer: &str| {
            self.storage.update_user::<_, CoreError, _>(owner, |u| {
                u.friends.retain(|f| f.peer_id != peer);
                groups::strip_member(&mut u.friend_groups, peer);
                Ok(())
            })
        };
        unfriend(user_id, friend_id)?;
        unfriend(friend_id, user_id)?;

        tracing::info!(
            "friends: {} removed {}",
            logging::user_id(user_id),
            logging::user_id(friend_id)
        );
        Ok(true)
    }

    pub fn block(
        &self,
        blocker_id: &str,
        target_id: &str,
        reason: Option<&str>,
        now: u64,
    ) -> CoreResult<()> {
        if blocker_id == target_id {
            return Err(CoreError::SelfTarget);
        }
        let reason = clean_text(reason, MAX_REASON_LEN, "reason")?;

        let _guard = self.pair_locks.lock(blocker_id, target_id);
        self.load_pair(blocker_id, target_id)?;

        // The strip runs even when the block entry already exists, which
        // also repairs a pair left half-written by an earlier failure.
        self.storage
            .update_user::<_, CoreError, _>(blocker_id, |b| {
                if !b.has_blocked(target_id) {
                    b.blocked_users.push(BlockEntry {
                        peer_id: target_id.to_string(),
                        reason,
                        date: now,
                    });
                }
                strip_relation(b, target_id);
                Ok(())
            })?;
        self.storage
            .update_user::<_, CoreError, _>(target_id, |t| {
                strip_relation(t, blocker_id);
                Ok(())
            })?;

        tracing::info!(
            "friends: {} blocked {}",
            logging::user_id(blocker_id),
            logging::user_id(target_id)
        );
        Ok(())
    }

    /// Lift a block. Friendship is never restored. Returns whether an entry
    /// was removed.
    pub fn unblock(&self, blocker_id: &str, target_id: &str) -> CoreResult<bool> {
        if blocker_id == target_id {
            return Err(CoreError::SelfTarget);
        }
        let _guard = self.pair_locks.lock(blocker_id, target_id);
        let removed = self
            .storage
            .update_user::<_, CoreError, _>(blocker_id, |b| {
                let before = b.blocked_users.len();
                b.blocked_users.retain(|e| e.peer_id != target_id);
                Ok(b.blocked_users.len() != before)
            })?;
        if removed {
            tracing::info!(
                "friends: {} unblocked {}",
                logging::user_id(blocker_id),
                logging::user_id(target_id)
            );
        }
        Ok(removed)
    }

    pub fn set_privacy(&self, user_id: &str, update: PrivacyUpdate) -> CoreResult<Privacy> {
        let privacy = self
            .storage
            .update_user::<_, CoreError, _>(user_id, |u| {
                update.apply(&mut u.privacy);
                Ok(u.privacy)
            })?;
        if update.show_online_status.is_some() {
            self.presence
                .set_visibility(user_id, privacy.show_online_status);
        }
        Ok(privacy)
    }

    // -----------------------------------------------------------------------
    // Groups
    // -----------------------------------------------------------------------

    pub fn create_group(&self, owner_id: &str, name: &str, now: u64) -> CoreResult<FriendGroup> {
        let group = self
            .storage
            .update_user::<_, CoreError, _>(owner_id, |u| {
                Ok(groups::create(&mut u.friend_groups, name, now)?)
            })?;
        tracing::debug!("groups: {} created '{}'", logging::user_id(owner_id), name);
        Ok(group)
    }

    /// Members must be current friends of the owner.
    pub fn add_to_group(&self, owner_id: &str, name: &str, friend_id: &str) -> CoreResult<()> {
        if owner_id == friend_id {
            return Err(CoreError::SelfTarget);
        }
        let _guard = self.pair_locks.lock(owner_id, friend_id);
        let owner = self.storage.require_user(owner_id)?;
        if owner.group(name).is_none() {
            return Err(groups::GroupError::GroupNotFound(name.to_string()).into());
        }
        let friend = self.storage.require_user(friend_id)?;
        if derive_pair_state(&owner, &friend) != PairState::Friends {
            return Err(CoreError::forbidden("only friends can be added to a group"));
        }
        self.storage.update_user::<_, CoreError, _>(owner_id, |u| {
            groups::add_member(&mut u.friend_groups, name, friend_id)?;
            Ok(())
        })
    }

    /// Returns whether the member was present.
    pub fn remove_from_group(
        &self,
        owner_id: &str,
        name: &str,
        member_id: &str,
    ) -> CoreResult<bool> {
        self.storage.update_user::<_, CoreError, _>(owner_id, |u| {
            Ok(groups::remove_member(&mut u.friend_groups, name, member_id)?)
        })
    }

    pub fn delete_group(&self, owner_id: &str, name: &str) -> CoreResult<()> {
        self.storage.update_user::<_, CoreError, _>(owner_id, |u| {
            groups::delete(&mut u.friend_groups, name)?;
            Ok(())
        })
    }

    pub fn list_groups(&self, owner_id: &str) -> CoreResult<Vec<FriendGroup>> {
        Ok(self.storage.require_user(owner_id)?.friend_groups)
    }

    // -----------------------------------------------------------------------
    // Friend metadata
    // -----------------------------------------------------------------------

    /// Set or clear (with `None` or blank) the owner's nickname for a friend.
    pub fn set_nickname(
        &self,
        owner_id: &str,
        friend_id: &str,
        nickname: Option<&str>,
    ) -> CoreResult<FriendEntry> {
        let nickname = clean_text(nickname, MAX_NICKNAME_LEN, "nickname")?;
        self.edit_friend_entry(owner_id, friend_id, |entry| entry.nickname = nickname)
    }

    pub fn add_badge(
        &self,
        owner_id: &str,
        friend_id: &str,
        badge: &str,
    ) -> CoreResult<FriendEntry> {
        let badge = clean_text(Some(badge), MAX_BADGE_LEN, "badge")?
            .ok_or_else(|| CoreError::validation("badge is required"))?;
        self.edit_friend_entry(owner_id, friend_id, |entry| {
            if !entry.badges.contains(&badge) {
                entry.badges.push(badge);
            }
        })
    }

    /// Friendship recorded on either side counts. A missing owner-side
    /// entry is restored, with the peer's `since`, before `edit` runs.
    fn edit_friend_entry<F>(
        &self,
        owner_id: &str,
        friend_id: &str,
        edit: F,
    ) -> CoreResult<FriendEntry>
    where
        F: FnOnce(&mut FriendEntry),
    {
        let not_friends = || CoreError::NotFound("friend".to_string());
        if owner_id == friend_id {
            return Err(not_friends());
        }
        let _guard = self.pair_locks.lock(owner_id, friend_id);
        let (owner, friend) = self.load_pair(owner_id, friend_id)?;
        if derive_pair_state(&owner, &friend) != PairState::Friends {
            return Err(not_friends());
        }
        let since = friend.friend(owner_id).map(|f| f.since);

        self.storage.update_user::<_, CoreError, _>(owner_id, |u| {
            if let Some(since) = since {
                add_friend_once(u, friend_id, since);
            }
            let entry = u
                .friends
                .iter_mut()
                .find(|f| f.peer_id == friend_id)
                .ok_or_else(not_friends)?;
            edit(&mut *entry);
            Ok(entry.clone())
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Friends whose documents still exist, in the order they were added.
    pub fn list_friends(&self, user_id: &str) -> CoreResult<Vec<FriendView>> {
        let user = self.storage.require_user(user_id)?;
        let mut out = Vec::with_capacity(user.friends.len());
        for entry in user.friends {
            if let Some(peer) = self.storage.get_user(&entry.peer_id)? {
                out.push(FriendView {
                    user: peer.public(),
                    since: entry.since,
                    nickname: entry.nickname,
                    badges: entry.badges,
                });
            }
        }
        Ok(out)
    }

    /// Pending incoming requests, oldest first.
    pub fn list_requests(&self, user_id: &str) -> CoreResult<Vec<RequestView>> {
        let user = self.storage.require_user(user_id)?;
        let mut out = Vec::new();
        for req in user
            .friend_requests
            .into_iter()
            .filter(|r| r.status == RequestStatus::Pending)
        {
            if let Some(from) = self.storage.get_user(&req.from_id)? {
                out.push(RequestView {
                    from: from.public(),
                    note: req.note,
                    date: req.date,
                });
            }
        }
        Ok(out)
    }

    pub fn list_blocked(&self, user_id: &str) -> CoreResult<Vec<BlockedView>> {
        let user = self.storage.require_user(user_id)?;
        let mut out = Vec::new();
        for entry in user.blocked_users {
            if let Some(peer) = self.storage.get_user(&entry.peer_id)? {
                out.push(BlockedView {
                    user: peer.public(),
                    reason: entry.reason,
                    date: entry.date,
                });
            }
        }
        Ok(out)
    }

    pub fn mutual_friends(&self, user_id: &str, other_id: &str) -> CoreResult<Vec<PublicUser>> {
        let (user, other) = self.load_pair(user_id, other_id)?;
        let theirs: HashSet<&str> = other.friends.iter().map(|f| f.peer_id.as_str()).collect();
        let mut out = Vec::new();
        for entry in user.friends.iter().filter(|f| theirs.contains(f.peer_id.as_str())) {
            if let Some(peer) = self.storage.get_user(&entry.peer_id)? {
                out.push(peer.public());
            }
        }
        Ok(out)
    }

    /// Friends of friends, most mutual friends first.
    ///
    /// Excludes the user, existing friends, anyone with a pending request in
    /// either direction and anyone blocked in either direction.
    pub fn suggestions(&self, user_id: &str, limit: usize) -> CoreResult<Vec<Suggestion>> {
        let user = self.storage.require_user(user_id)?;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for entry in &user.friends {
            let Some(friend) = self.storage.get_user(&entry.peer_id)? else {
                continue;
            };
            for fof in &friend.friends {
                if fof.peer_id != user_id && !user.is_friend_with(&fof.peer_id) {
                    *counts.entry(fof.peer_id.clone()).or_default() += 1;
                }
            }
        }

        let mut out = Vec::new();
        for (candidate_id, mutual_count) in counts {
            let Some(candidate) = self.storage.get_user(&candidate_id)? else {
                continue;
            };
            if derive_pair_state(&user, &candidate) == PairState::None {
                out.push(Suggestion {
                    user: candidate.public(),
                    mutual_count,
                });
            }
        }
        out.sort_by(|a, b| {
            b.mutual_count
                .cmp(&a.mutual_count)
                .then_with(|| a.user.id.cmp(&b.user.id))
        });
        out.truncate(limit);
        Ok(out)
    }
}
