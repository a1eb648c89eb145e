//! Friend groups: named subsets of a user's friends.
//!
//! Groups live on the owner's document, so every function here operates on
//! the owner's group list inside a single document update. Membership policy
//! (members must be current friends) is enforced by the relationship engine,
//! which holds the pair lock; this module only keeps the list consistent.

use std::fmt;

use crate::error::CoreError;
use crate::model::FriendGroup;

pub const MAX_GROUP_NAME_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    EmptyName,
    NameTooLong,
    DuplicateName(String),
    GroupNotFound(String),
}

impl fmt::Display for GroupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupError::EmptyName => write!(f, "group name is required"),
            GroupError::NameTooLong => {
                write!(f, "group name exceeds {MAX_GROUP_NAME_LEN} characters")
            }
            GroupError::DuplicateName(name) => write!(f, "group '{name}' already exists"),
            GroupError::GroupNotFound(name) => write!(f, "group '{name}'"),
        }
    }
}

impl std::error::Error for GroupError {}

impl From<GroupError> for CoreError {
    fn from(err: GroupError) -> Self {
        match err {
            GroupError::EmptyName | GroupError::NameTooLong => {
                CoreError::Validation(err.to_string())
            }
            GroupError::DuplicateName(_) => CoreError::Conflict(err.to_string()),
            GroupError::GroupNotFound(_) => CoreError::NotFound(err.to_string()),
        }
    }
}

/// Names match exactly and case-sensitively.
pub fn find<'a>(groups: &'a [FriendGroup], name: &str) -> Option<&'a FriendGroup> {
    groups.iter().find(|g| g.name == name)
}

fn find_mut<'a>(
    groups: &'a mut [FriendGroup],
    name: &str,
) -> Result<&'a mut FriendGroup, GroupError> {
    groups
        .iter_mut()
        .find(|g| g.name == name)
        .ok_or_else(|| GroupError::GroupNotFound(name.to_string()))
}

pub fn create(
    groups: &mut Vec<FriendGroup>,
    name: &str,
    now: u64,
) -> Result<FriendGroup, GroupError> {
    if name.trim().is_empty() {
        return Err(GroupError::EmptyName);
    }
    if name.chars().count() > MAX_GROUP_NAME_LEN {
        return Err(GroupError::NameTooLong);
    }
    if find(groups, name).is_some() {
        return Err(GroupError::DuplicateName(name.to_string()));
    }
    let group = FriendGroup {
        name: name.to_string(),
        members: Vec::new(),
        created_at: now,
    };
    groups.push(group.clone());
    Ok(group)
}

/// Returns `true` if the member was newly added.
pub fn add_member(
    groups: &mut [FriendGroup],
    name: &str,
    peer_id: &str,
) -> Result<bool, GroupError> {
    let group = find_mut(groups, name)?;
    if group.members.iter().any(|m| m == peer_id) {
        return Ok(false);
    }
    group.members.push(peer_id.to_string());
    Ok(true)
}

/// Returns `true` if the member was present.
pub fn remove_member(
    groups: &mut [FriendGroup],
    name: &str,
    peer_id: &str,
) -> Result<bool, GroupError> {
    let group = find_mut(groups, name)?;
    let before = group.members.len();
    group.members.retain(|m| m != peer_id);
    Ok(group.members.len() != before)
}

pub fn delete(groups: &mut Vec<FriendGroup>, name: &str) -> Result<FriendGroup, GroupError> {
    let idx = groups
        .iter()
        .position(|g| g.name == name)
        .ok_or_else(|| GroupError::GroupNotFound(name.to_string()))?;
    Ok(groups.remove(idx))
}

/// Drop `peer_id` from every group. Returns the number of groups touched.
pub fn strip_member(groups: &mut [FriendGroup], peer_id: &str) -> usize {
    let mut touched = 0;
    for group in groups.iter_mut() {
        let before = group.members.len();
        group.members.retain(|m| m != peer_id);
        if group.members.len() != before {
            touched += 1;
        }
    }
    touched
}
