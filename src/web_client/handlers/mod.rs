pub mod auth;
pub mod friends;
pub mod groups;
pub mod health;
pub mod messages;
pub mod notifications;
pub mod uploads;
pub mod users;
pub mod verify;
pub mod websocket;
