pub mod crypto;
pub mod error;
pub mod groups;
pub mod identity;
pub mod logging;
pub mod mailer;
pub mod messaging;
pub mod model;
pub mod notifications;
pub mod presence;
pub mod relationships;
pub mod storage;
pub mod uploads;
pub mod web_client;
