//! Shared application state for the web server.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;

use crate::crypto::PasswordHasher;
use crate::identity::IdentityStore;
use crate::mailer::Mailer;
use crate::messaging::MessageGate;
use crate::notifications::NotificationLedger;
use crate::presence::PresenceRegistry;
use crate::relationships::RelationshipEngine;
use crate::storage::Storage;
use crate::uploads::{ImageUploader, LocalUploader};

/// Everything the handlers reach through. Each service guards its own data,
/// so the state itself needs no lock.
pub struct AppState {
    pub storage: Arc<Storage>,
    pub identity: IdentityStore,
    pub relationships: RelationshipEngine,
    pub notifications: Arc<NotificationLedger>,
    pub presence: Arc<PresenceRegistry>,
    pub messages: MessageGate,
    /// Local image store, used to serve `/uploads/:file`.
    pub uploads: LocalUploader,
    pub ws_connection_count: AtomicUsize,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        storage: Arc<Storage>,
        hasher: PasswordHasher,
        mailer: Arc<dyn Mailer>,
        uploads: LocalUploader,
        session_ttl_secs: u64,
        upload_timeout: Duration,
    ) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let notifications = Arc::new(NotificationLedger::new(storage.clone()));
        let uploader: Arc<dyn ImageUploader> = Arc::new(uploads.clone());

        let identity = IdentityStore::new(
            storage.clone(),
            hasher,
            mailer,
            uploader.clone(),
            session_ttl_secs,
            upload_timeout,
        );
        let relationships = RelationshipEngine::new(storage.clone(), presence.clone());
        let messages = MessageGate::new(
            storage.clone(),
            presence.clone(),
            notifications.clone(),
            uploader,
            upload_timeout,
        );

        Self {
            storage,
            identity,
            relationships,
            notifications,
            presence,
            messages,
            uploads,
            ws_connection_count: AtomicUsize::new(0),
        }
    }
}
