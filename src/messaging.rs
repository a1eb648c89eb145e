//! Message gate and delivery.
//!
//! A direct message is only accepted between current friends with no block
//! in either direction. Accepted messages are stored exactly once, pushed to
//! the receiver's live connection, and then announced through the receiver's
//! notification ledger on a separate task whose failure never reaches the
//! sender.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{CoreError, CoreResult};
use crate::logging;
use crate::model::{new_id, Message, PublicUser};
use crate::notifications::{NewNotification, NotificationLedger};
use crate::presence::{PresenceRegistry, ServerEvent};
use crate::storage::Storage;
use crate::uploads::ImageUploader;

pub const MAX_TEXT_LEN: usize = 4000;

/// Body of a send request: text, an inline image, or both.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutgoingMessage {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

pub struct MessageGate {
    storage: Arc<Storage>,
    presence: Arc<PresenceRegistry>,
    ledger: Arc<NotificationLedger>,
    uploader: Arc<dyn ImageUploader>,
    upload_timeout: Duration,
}

impl MessageGate {
    pub fn new(
        storage: Arc<Storage>,
        presence: Arc<PresenceRegistry>,
        ledger: Arc<NotificationLedger>,
        uploader: Arc<dyn ImageUploader>,
        upload_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            presence,
            ledger,
            uploader,
            upload_timeout,
        }
    }

    pub async fn send(
        &self,
        sender_id: &str,
        receiver_id: &str,
        outgoing: OutgoingMessage,
        now: u64,
    ) -> CoreResult<Message> {
        // Whitespace-only text counts as absent; other text is stored as sent.
        let text = outgoing.text.filter(|t| !t.trim().is_empty());
        let image = outgoing.image.filter(|i| !i.trim().is_empty());
        if text.is_none() && image.is_none() {
            return Err(CoreError::validation("message needs text or an image"));
        }
        if text
            .as_ref()
            .is_some_and(|t| t.trim().chars().count() > MAX_TEXT_LEN)
        {
            return Err(CoreError::validation(format!(
                "message exceeds {MAX_TEXT_LEN} characters"
            )));
        }

        let sender = self
            .storage
            .get_user(sender_id)?
            .ok_or_else(|| CoreError::NotFound("sender".to_string()))?;
        let receiver = self
            .storage
            .get_user(receiver_id)?
            .ok_or_else(|| CoreError::NotFound("receiver".to_string()))?;

        if !sender.is_friend_with(receiver_id) && !receiver.is_friend_with(sender_id) {
            return Err(CoreError::forbidden("you can only send messages to friends"));
        }
        if receiver.has_blocked(sender_id) {
            return Err(CoreError::forbidden("you are blocked by this user"));
        }
        if sender.has_blocked(receiver_id) {
            return Err(CoreError::forbidden("you have blocked this user"));
        }

        let image_url = match image {
            Some(image) => Some(self.upload(&image).await?),
            None => None,
        };

        let message = Message {
            id: new_id(),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            text,
            image_url,
            created_at: now,
        };
        self.storage.insert_message(&message)?;

        tracing::info!(
            "messages: {} {} -> {}",
            logging::msg_id(&message.id),
            logging::user_id(sender_id),
            logging::user_id(receiver_id)
        );

        self.presence.push(
            receiver_id,
            ServerEvent::NewMessage {
                message: message.clone(),
            },
        );
        self.dispatch_notification(sender_id, &sender.full_name, receiver_id, now);
        Ok(message)
    }

    async fn upload(&self, image: &str) -> CoreResult<String> {
        match tokio::time::timeout(self.upload_timeout, self.uploader.upload(image)).await {
            Ok(Ok(url)) => Ok(url),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(CoreError::UploadFailed(format!(
                "timed out after {}s",
                self.upload_timeout.as_secs()
            ))),
        }
    }

    /// Ledger append and realtime notice, off the request path.
    fn dispatch_notification(
        &self,
        sender_id: &str,
        sender_name: &str,
        receiver_id: &str,
        now: u64,
    ) {
        let ledger = self.ledger.clone();
        let presence = self.presence.clone();
        let receiver_id = receiver_id.to_string();
        let new = NewNotification::message(sender_id, sender_name);
        tokio::task::spawn_blocking(move || match ledger.append(&receiver_id, new, now) {
            Ok(notification) => {
                presence.push(&receiver_id, ServerEvent::Notification { notification });
            }
            Err(e) => {
                tracing::warn!(
                    "messages: notification for {} dropped: {}",
                    logging::user_id(&receiver_id),
                    e
                );
            }
        });
    }

    /// Both directions of the conversation, oldest first.
    pub fn history(&self, caller_id: &str, peer_id: &str) -> CoreResult<Vec<Message>> {
        if self.storage.get_user(peer_id)?.is_none() {
            return Err(CoreError::user_not_found());
        }
        Ok(self.storage.list_conversation(caller_id, peer_id)?)
    }

    /// Every user except the caller.
    pub fn users_for_sidebar(&self, caller_id: &str) -> CoreResult<Vec<PublicUser>> {
        Ok(self
            .storage
            .list_users()?
            .into_iter()
            .filter(|u| u.id != caller_id)
            .map(|u| u.public())
            .collect())
    }
}
