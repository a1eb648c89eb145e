//! SQLite storage layer for rapport.
//!
//! Users are stored as one JSON document per row, keyed by user id. The only
//! write primitive for a user is [`Storage::update_user`], an atomic
//! read-modify-write of a single document. There are no multi-document
//! transactions: callers that touch two users issue two independent updates.
//!
//! Messages and sessions live in their own tables, one row each.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Message, User};

/// How long a statement waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("{0} not found")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Session row stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub token: String,
    pub user_id: String,
    pub created_at: u64,
    pub expires_at: u64,
}

// ---------------------------------------------------------------------------
// Storage handle
// ---------------------------------------------------------------------------

/// Main storage handle wrapping a SQLite connection.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open or create a database at the given path. Creates schema if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.create_schema()?;
        Ok(storage)
    }

    /// Create an in-memory database. Used by tests and throwaway servers.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.create_schema()?;
        Ok(storage)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.conn.lock().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL UNIQUE,
                doc         TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                id          TEXT NOT NULL UNIQUE,
                sender_id   TEXT NOT NULL,
                receiver_id TEXT NOT NULL,
                text        TEXT,
                image_url   TEXT,
                created_at  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_pair
                ON messages(sender_id, receiver_id, created_at);

            CREATE TABLE IF NOT EXISTS sessions (
                token       TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                created_at  INTEGER NOT NULL,
                expires_at  INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_user
                ON sessions(user_id);
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Users
    // -----------------------------------------------------------------------

    /// Insert a new user document. Fails with `AlreadyExists` if the email
    /// (or id) is taken.
    pub fn insert_user(&self, user: &User) -> Result<(), StorageError> {
        let doc = serde_json::to_string(user)?;
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO users (id, email, doc, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                user.id,
                user.email,
                doc,
                user.created_at as i64,
                user.updated_at as i64,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::AlreadyExists(format!(
                    "user with email {}",
                    user.email
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>, StorageError> {
        let conn = self.conn.lock();
        let doc: Option<String> = conn
            .query_row("SELECT doc FROM users WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;
        doc.map(|d| decode_user(&d)).transpose()
    }

    /// Like [`get_user`](Self::get_user) but a missing user is an error.
    pub fn require_user(&self, id: &str) -> Result<User, StorageError> {
        self.get_user(id)?
            .ok_or_else(|| StorageError::NotFound("user".to_string()))
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        let conn = self.conn.lock();
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM users WHERE email = ?1",
                params![email],
                |row| row.get(0),
            )
            .optional()?;
        doc.map(|d| decode_user(&d)).transpose()
    }

    /// All users in signup order.
    pub fn list_users(&self) -> Result<Vec<User>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT doc FROM users ORDER BY created_at, id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut result = Vec::new();
        for row in rows {
            result.push(decode_user(&row?)?);
        }
        Ok(result)
    }

    /// Atomically read, modify and write back one user document.
    ///
    /// `f` runs inside an `IMMEDIATE` transaction while the connection is
    /// held, so no other write to any document can interleave. If `f`
    /// returns an error nothing is written. A missing user yields
    /// `StorageError::NotFound("user")` converted into `E`.
    pub fn update_user<T, E, F>(&self, id: &str, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut User) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;

        let doc: Option<String> = tx
            .query_row("SELECT doc FROM users WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StorageError::from)?;
        let mut user = match doc {
            Some(d) => decode_user(&d)?,
            None => return Err(StorageError::NotFound("user".to_string()).into()),
        };

        let out = f(&mut user)?;

        user.updated_at = now_secs();
        let doc = serde_json::to_string(&user).map_err(StorageError::from)?;
        tx.execute(
            "UPDATE users SET email = ?1, doc = ?2, updated_at = ?3 WHERE id = ?4",
            params![user.email, doc, user.updated_at as i64, id],
        )
        .map_err(StorageError::from)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    pub fn insert_message(&self, message: &Message) -> Result<(), StorageError> {
        self.conn.lock().execute(
            "INSERT INTO messages (id, sender_id, receiver_id, text, image_url, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                message.id,
                message.sender_id,
                message.receiver_id,
                message.text,
                message.image_url,
                message.created_at as i64,
            ],
        )?;
        Ok(())
    }

    /// Every message exchanged between `a` and `b`, oldest first.
    pub fn list_conversation(&self, a: &str, b: &str) -> Result<Vec<Message>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, sender_id, receiver_id, text, image_url, created_at
             FROM messages
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)
             ORDER BY created_at, seq",
        )?;
        let rows = stmt.query_map(params![a, b], message_from_row)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub fn insert_session(&self, row: &SessionRow) -> Result<(), StorageError> {
        self.conn.lock().execute(
            "INSERT INTO sessions (token, user_id, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                row.token,
                row.user_id,
                row.created_at as i64,
                row.expires_at as i64,
            ],
        )?;
        Ok(())
    }

    pub fn get_session(&self, token: &str) -> Result<Option<SessionRow>, StorageError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT token, user_id, created_at, expires_at FROM sessions WHERE token = ?1",
        )?;
        let row = stmt
            .query_row(params![token], |row| {
                Ok(SessionRow {
                    token: row.get(0)?,
                    user_id: row.get(1)?,
                    created_at: row.get::<_, i64>(2)? as u64,
                    expires_at: row.get::<_, i64>(3)? as u64,
                })
            })
            .optional()?;
        Ok(row)
    }

    pub fn delete_session(&self, token: &str) -> Result<bool, StorageError> {
        let affected = self
            .conn
            .lock()
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(affected > 0)
    }

    /// Drop every session that expired at or before `now`.
    pub fn delete_expired_sessions(&self, now: u64) -> Result<usize, StorageError> {
        let affected = self.conn.lock().execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![now as i64],
        )?;
        Ok(affected)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn decode_user(doc: &str) -> Result<User, StorageError> {
    Ok(serde_json::from_str(doc)?)
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        text: row.get(3)?,
        image_url: row.get(4)?,
        created_at: row.get::<_, i64>(5)? as u64,
    })
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Resolve the database path: `{data_dir}/rapport.db`.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("rapport.db")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{new_id, FriendEntry};

    fn test_storage() -> Storage {
        Storage::open_in_memory().unwrap()
    }

    fn user(email: &str) -> User {
        User::new(email, "Test User", "hash".to_string(), 100)
    }

    fn message(sender: &str, receiver: &str, text: &str, at: u64) -> Message {
        Message {
            id: new_id(),
            sender_id: sender.to_string(),
            receiver_id: receiver.to_string(),
            text: Some(text.to_string()),
            image_url: None,
            created_at: at,
        }
    }

    #[test]
    fn test_user_crud() {
        let storage = test_storage();
        let alice = user("alice@example.com");
        storage.insert_user(&alice).unwrap();

        let loaded = storage.get_user(&alice.id).unwrap().unwrap();
        assert_eq!(loaded.email, "alice@example.com");
        assert!(!loaded.is_verified);

        let by_email = storage
            .find_user_by_email("alice@example.com")
            .unwrap()
            .unwrap();
        assert_eq!(by_email.id, alice.id);

        assert!(storage.get_user("missing").unwrap().is_none());
        assert!(storage.find_user_by_email("nobody@example.com").unwrap().is_none());
        assert_eq!(storage.list_users().unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let storage = test_storage();
        storage.insert_user(&user("dup@example.com")).unwrap();
        let err = storage.insert_user(&user("dup@example.com")).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists(_)));
    }

    #[test]
    fn test_update_user_writes_back() {
        let storage = test_storage();
        let alice = user("alice@example.com");
        storage.insert_user(&alice).unwrap();

        let count = storage
            .update_user::<_, StorageError, _>(&alice.id, |u| {
                u.friends.push(FriendEntry::new("bob", 5));
                Ok(u.friends.len())
            })
            .unwrap();
        assert_eq!(count, 1);

        let loaded = storage.get_user(&alice.id).unwrap().unwrap();
        assert!(loaded.is_friend_with("bob"));
    }

    #[test]
    fn test_update_user_error_discards_changes() {
        let storage = test_storage();
        let alice = user("alice@example.com");
        storage.insert_user(&alice).unwrap();

        let result = storage.update_user::<(), StorageError, _>(&alice.id, |u| {
            u.full_name = "Changed".to_string();
            Err(StorageError::AlreadyExists("nope".to_string()))
        });
        assert!(result.is_err());

        let loaded = storage.get_user(&alice.id).unwrap().unwrap();
        assert_eq!(loaded.full_name, "Test User");
    }

    #[test]
    fn test_update_missing_user_is_not_found() {
        let storage = test_storage();
        let err = storage
            .update_user::<(), StorageError, _>("ghost", |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_legacy_document_is_normalized_on_read() {
        let storage = test_storage();
        let doc = serde_json::json!({
            "id": "legacy",
            "email": "legacy@example.com",
            "full_name": "Legacy",
            "password_hash": "x",
            "friend_requests": ["someone"],
            "created_at": 1,
        });
        storage
            .conn
            .lock()
            .execute(
                "INSERT INTO users (id, email, doc, created_at, updated_at)
                 VALUES ('legacy', 'legacy@example.com', ?1, 1, 1)",
                params![doc.to_string()],
            )
            .unwrap();

        let loaded = storage.get_user("legacy").unwrap().unwrap();
        assert!(loaded.has_pending_request_from("someone"));

        storage
            .update_user::<_, StorageError, _>("legacy", |_| Ok(()))
            .unwrap();
        let raw: String = storage
            .conn
            .lock()
            .query_row("SELECT doc FROM users WHERE id = 'legacy'", [], |r| r.get(0))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["friend_requests"][0]["from_id"], "someone");
        assert_eq!(value["friend_requests"][0]["status"], "pending");
    }

    #[test]
    fn test_conversation_is_chronological_both_directions() {
        let storage = test_storage();
        storage.insert_message(&message("a", "b", "first", 10)).unwrap();
        storage.insert_message(&message("b", "a", "second", 10)).unwrap();
        storage.insert_message(&message("a", "c", "elsewhere", 11)).unwrap();
        storage.insert_message(&message("a", "b", "third", 12)).unwrap();

        let texts: Vec<String> = storage
            .list_conversation("b", "a")
            .unwrap()
            .into_iter()
            .filter_map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_session_crud() {
        let storage = test_storage();
        let row = SessionRow {
            token: "tok".to_string(),
            user_id: "u1".to_string(),
            created_at: 10,
            expires_at: 20,
        };
        storage.insert_session(&row).unwrap();
        assert_eq!(storage.get_session("tok").unwrap().unwrap().user_id, "u1");

        assert_eq!(storage.delete_expired_sessions(19).unwrap(), 0);
        assert_eq!(storage.delete_expired_sessions(20).unwrap(), 1);
        assert!(storage.get_session("tok").unwrap().is_none());
        assert!(!storage.delete_session("tok").unwrap());
    }
}
