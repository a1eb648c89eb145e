//! Data model: the per-user document, messages and the derived pair state.
//!
//! A [`User`] is stored as a single JSON document. Its relationship
//! sub-collections (`friends`, `friend_requests`, `blocked_users`) accept two
//! legacy encodings on read, a bare id string or an object whose id field is
//! called `user`, and always serialize in the normalized object form below.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Relationship entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// One side of a friendship, stored on the owner's document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FriendEntryRepr")]
pub struct FriendEntry {
    pub peer_id: String,
    pub since: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    pub badges: Vec<String>,
}

impl FriendEntry {
    pub fn new(peer_id: &str, since: u64) -> Self {
        Self {
            peer_id: peer_id.to_string(),
            since,
            nickname: None,
            badges: Vec::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FriendEntryRepr {
    Bare(String),
    Full {
        #[serde(alias = "user")]
        peer_id: String,
        #[serde(default)]
        since: u64,
        #[serde(default)]
        nickname: Option<String>,
        #[serde(default)]
        badges: Vec<String>,
    },
}

impl From<FriendEntryRepr> for FriendEntry {
    fn from(repr: FriendEntryRepr) -> Self {
        match repr {
            FriendEntryRepr::Bare(peer_id) => FriendEntry::new(&peer_id, 0),
            FriendEntryRepr::Full {
                peer_id,
                since,
                nickname,
                badges,
            } => FriendEntry {
                peer_id,
                since,
                nickname: nickname.filter(|n| !n.is_empty()),
                badges,
            },
        }
    }
}

/// A friend request received by the document owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "FriendRequestRepr")]
pub struct FriendRequest {
    pub from_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub date: u64,
    pub status: RequestStatus,
}

impl FriendRequest {
    pub fn is_pending_from(&self, peer_id: &str) -> bool {
        self.status == RequestStatus::Pending && self.from_id == peer_id
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FriendRequestRepr {
    Bare(String),
    Full {
        #[serde(alias = "user")]
        from_id: String,
        #[serde(default)]
        note: Option<String>,
        #[serde(default)]
        date: u64,
        #[serde(default)]
        status: RequestStatus,
    },
}

impl From<FriendRequestRepr> for FriendRequest {
    fn from(repr: FriendRequestRepr) -> Self {
        match repr {
            FriendRequestRepr::Bare(from_id) => FriendRequest {
                from_id,
                note: None,
                date: 0,
                status: RequestStatus::Pending,
            },
            FriendRequestRepr::Full {
                from_id,
                note,
                date,
                status,
            } => FriendRequest {
                from_id,
                note: note.filter(|n| !n.is_empty()),
                date,
                status,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BlockEntryRepr")]
pub struct BlockEntry {
    pub peer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub date: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum BlockEntryRepr {
    Bare(String),
    Full {
        #[serde(alias = "user")]
        peer_id: String,
        #[serde(default)]
        reason: Option<String>,
        #[serde(default)]
        date: u64,
    },
}

impl From<BlockEntryRepr> for BlockEntry {
    fn from(repr: BlockEntryRepr) -> Self {
        match repr {
            BlockEntryRepr::Bare(peer_id) => BlockEntry {
                peer_id,
                reason: None,
                date: 0,
            },
            BlockEntryRepr::Full {
                peer_id,
                reason,
                date,
            } => BlockEntry {
                peer_id,
                reason: reason.filter(|r| !r.is_empty()),
                date,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendGroup {
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
    #[serde(default)]
    pub created_at: u64,
}

// ---------------------------------------------------------------------------
// Notifications and privacy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    #[serde(alias = "friendRequest")]
    FriendRequest,
    FriendAccepted,
    Message,
    #[serde(alias = "info")]
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(alias = "type")]
    pub kind: NotificationKind,
    #[serde(default, alias = "from", skip_serializing_if = "Option::is_none")]
    pub from_id: Option<String>,
    #[serde(alias = "text")]
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub created_at: u64,
}

/// Privacy flags consulted before creating requests or exposing presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Privacy {
    pub can_receive_requests: bool,
    pub show_online_status: bool,
    pub last_seen: bool,
}

impl Default for Privacy {
    fn default() -> Self {
        Self {
            can_receive_requests: true,
            show_online_status: true,
            last_seen: true,
        }
    }
}

/// Partial privacy update; only fields that are present are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PrivacyUpdate {
    pub can_receive_requests: Option<bool>,
    pub show_online_status: Option<bool>,
    pub last_seen: Option<bool>,
}

impl PrivacyUpdate {
    pub fn apply(&self, privacy: &mut Privacy) {
        if let Some(v) = self.can_receive_requests {
            privacy.can_receive_requests = v;
        }
        if let Some(v) = self.show_online_status {
            privacy.show_online_status = v;
        }
        if let Some(v) = self.last_seen {
            privacy.last_seen = v;
        }
    }
}

// ---------------------------------------------------------------------------
// User document
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub password_hash: String,
    #[serde(default)]
    pub profile_pic: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub verification_code: Option<String>,
    /// Unix seconds after which `verification_code` is no longer accepted.
    #[serde(default)]
    pub verification_code_expires: Option<u64>,
    #[serde(default)]
    pub friends: Vec<FriendEntry>,
    #[serde(default)]
    pub friend_requests: Vec<FriendRequest>,
    #[serde(default)]
    pub blocked_users: Vec<BlockEntry>,
    #[serde(default)]
    pub friend_groups: Vec<FriendGroup>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub privacy: Privacy,
    pub created_at: u64,
    #[serde(default)]
    pub updated_at: u64,
}

impl User {
    pub fn new(email: &str, full_name: &str, password_hash: String, now: u64) -> Self {
        Self {
            id: new_id(),
            email: email.to_string(),
            full_name: full_name.to_string(),
            password_hash,
            profile_pic: None,
            is_verified: false,
            verification_code: None,
            verification_code_expires: None,
            friends: Vec::new(),
            friend_requests: Vec::new(),
            blocked_users: Vec::new(),
            friend_groups: Vec::new(),
            notifications: Vec::new(),
            privacy: Privacy::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn friend(&self, peer_id: &str) -> Option<&FriendEntry> {
        self.friends.iter().find(|f| f.peer_id == peer_id)
    }

    pub fn is_friend_with(&self, peer_id: &str) -> bool {
        self.friend(peer_id).is_some()
    }

    pub fn has_blocked(&self, peer_id: &str) -> bool {
        self.blocked_users.iter().any(|b| b.peer_id == peer_id)
    }

    pub fn has_pending_request_from(&self, peer_id: &str) -> bool {
        self.friend_requests
            .iter()
            .any(|r| r.is_pending_from(peer_id))
    }

    pub fn group(&self, name: &str) -> Option<&FriendGroup> {
        self.friend_groups.iter().find(|g| g.name == name)
    }

    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            email: self.email.clone(),
            full_name: self.full_name.clone(),
            profile_pic: self.profile_pic.clone(),
            is_verified: self.is_verified,
            created_at: self.created_at,
        }
    }
}

/// The only view of a user that leaves the process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub profile_pic: Option<String>,
    pub is_verified: bool,
    pub created_at: u64,
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub created_at: u64,
}

// ---------------------------------------------------------------------------
// Pair state
// ---------------------------------------------------------------------------

/// How user A relates to user B, seen from A's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairState {
    None,
    /// A sent B a request that is still pending.
    OutgoingRequest,
    /// B sent A a request that is still pending.
    IncomingRequest,
    Friends,
    /// A blocks B.
    Blocking,
    /// B blocks A.
    BlockedBy,
    MutualBlock,
}

impl PairState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PairState::None => "none",
            PairState::OutgoingRequest => "outgoing_request",
            PairState::IncomingRequest => "incoming_request",
            PairState::Friends => "friends",
            PairState::Blocking => "blocking",
            PairState::BlockedBy => "blocked_by",
            PairState::MutualBlock => "mutual_block",
        }
    }

    /// The same relation seen from the other side.
    pub fn reversed(&self) -> PairState {
        match self {
            PairState::OutgoingRequest => PairState::IncomingRequest,
            PairState::IncomingRequest => PairState::OutgoingRequest,
            PairState::Blocking => PairState::BlockedBy,
            PairState::BlockedBy => PairState::Blocking,
            other => *other,
        }
    }
}

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_bare_ids_are_normalized() {
        let json = serde_json::json!({
            "id": "u1",
            "email": "a@example.com",
            "full_name": "A",
            "password_hash": "x",
            "friends": ["u2", {"user": "u3", "since": 5, "nickname": ""}],
            "friend_requests": ["u4", {"user": "u5", "note": "hi", "status": "rejected"}],
            "blocked_users": ["u6"],
            "created_at": 1,
        });
        let user: User = serde_json::from_value(json).unwrap();

        assert_eq!(user.friends[0], FriendEntry::new("u2", 0));
        assert_eq!(user.friends[1].peer_id, "u3");
        assert_eq!(user.friends[1].since, 5);
        assert_eq!(user.friends[1].nickname, None);

        assert!(user.has_pending_request_from("u4"));
        assert_eq!(user.friend_requests[1].status, RequestStatus::Rejected);
        assert_eq!(user.friend_requests[1].note.as_deref(), Some("hi"));
        assert!(!user.has_pending_request_from("u5"));

        assert!(user.has_blocked("u6"));
        assert_eq!(user.privacy, Privacy::default());
    }

    #[test]
    fn normalized_form_is_written_back() {
        let mut user = User::new("a@example.com", "A", "hash".to_string(), 10);
        user.friends.push(FriendEntry::new("u2", 11));
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["friends"][0]["peer_id"], "u2");
        assert_eq!(value["friends"][0]["since"], 11);
    }

    #[test]
    fn legacy_notification_fields_are_accepted() {
        let json = serde_json::json!({
            "type": "info",
            "from": "u2",
            "message": "B accepted your friend request",
        });
        let n: Notification = serde_json::from_value(json).unwrap();
        assert_eq!(n.kind, NotificationKind::System);
        assert_eq!(n.from_id.as_deref(), Some("u2"));
        assert!(!n.read);
        assert!(!n.id.is_empty());
    }

    #[test]
    fn privacy_update_only_touches_present_fields() {
        let mut privacy = Privacy::default();
        let update = PrivacyUpdate {
            show_online_status: Some(false),
            ..Default::default()
        };
        update.apply(&mut privacy);
        assert!(privacy.can_receive_requests);
        assert!(!privacy.show_online_status);
        assert!(privacy.last_seen);
    }

    #[test]
    fn pair_state_reverses() {
        assert_eq!(
            PairState::OutgoingRequest.reversed(),
            PairState::IncomingRequest
        );
        assert_eq!(PairState::Blocking.reversed(), PairState::BlockedBy);
        assert_eq!(PairState::Friends.reversed(), PairState::Friends);
    }
}
