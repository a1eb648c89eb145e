//! Configuration types and constants for the rapport-web server.

use std::path::PathBuf;

use clap::Parser;

use crate::identity::DEFAULT_SESSION_TTL_SECS;

pub(crate) const MAX_WS_CONNECTIONS: usize = 1024;
/// Request body cap for routes that carry an inline image. Base64 inflates
/// the 5 MiB image limit by a third; the rest is JSON overhead.
pub(crate) const MAX_IMAGE_BODY_BYTES: usize = 8 * 1024 * 1024;
pub(crate) const SESSION_PURGE_INTERVAL_SECS: u64 = 3600;
pub(crate) const SESSION_COOKIE: &str = "session";

pub const DEFAULT_BIND: &str = "127.0.0.1:5001";
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 15;

/// Web server for the rapport social messaging service.
///
/// Provides a REST API for accounts, friendships and direct messages, plus a
/// WebSocket endpoint for realtime delivery and presence.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug, Default)]
#[command(name = "rapport-web", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: RAPPORT_BIND] [default: 127.0.0.1:5001]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for the database and uploads [env: RAPPORT_HOME] [default: ~/.rapport]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,

    /// Login session lifetime in seconds [env: RAPPORT_SESSION_TTL_SECS] [default: 604800]
    #[arg(long)]
    pub session_ttl_secs: Option<u64>,

    /// Timeout for a single image upload [env: RAPPORT_UPLOAD_TIMEOUT_SECS] [default: 15]
    #[arg(long)]
    pub upload_timeout_secs: Option<u64>,

    /// Log filter directive, e.g. `info` or `rapport=debug` [env: RUST_LOG] [default: info]
    #[arg(long)]
    pub log: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub session_ttl_secs: u64,
    pub upload_timeout_secs: u64,
    pub log_filter: String,
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("RAPPORT_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".rapport"))
                    .unwrap_or_else(|_| PathBuf::from(".rapport"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("RAPPORT_BIND").ok())
            .unwrap_or_else(|| DEFAULT_BIND.to_string());

        let session_ttl_secs = cli
            .session_ttl_secs
            .or_else(|| env_u64("RAPPORT_SESSION_TTL_SECS"))
            .unwrap_or(DEFAULT_SESSION_TTL_SECS);

        let upload_timeout_secs = cli
            .upload_timeout_secs
            .or_else(|| env_u64("RAPPORT_UPLOAD_TIMEOUT_SECS"))
            .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS);

        let log_filter = cli
            .log
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| "info".to_string());

        Self {
            bind_addr,
            data_dir,
            session_ttl_secs,
            upload_timeout_secs,
            log_filter,
        }
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_win() {
        let cli = Cli {
            bind: Some("0.0.0.0:9000".to_string()),
            data_dir: Some(PathBuf::from("/tmp/rapport-test")),
            session_ttl_secs: Some(60),
            upload_timeout_secs: Some(3),
            log: Some("debug".to_string()),
        };
        let config = Config::from_cli_and_env(cli);
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.data_dir, PathBuf::from("/tmp/rapport-test"));
        assert_eq!(config.session_ttl_secs, 60);
        assert_eq!(config.upload_timeout_secs, 3);
        assert_eq!(config.log_filter, "debug");
        assert_eq!(config.uploads_dir(), PathBuf::from("/tmp/rapport-test/uploads"));
    }

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::parse_from([
            "rapport-web",
            "--bind",
            "127.0.0.1:1",
            "--session-ttl-secs",
            "5",
        ]);
        assert_eq!(cli.bind.as_deref(), Some("127.0.0.1:1"));
        assert_eq!(cli.session_ttl_secs, Some(5));
        assert!(cli.data_dir.is_none());
    }
}
