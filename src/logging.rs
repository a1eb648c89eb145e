//! Log setup and identifier formatting.
//!
//! Log output goes through `tracing`; [`init`] installs a `fmt` subscriber on
//! stderr filtered by `RUST_LOG` (or the configured default directive).
//! When stderr is a terminal, output is colour-coded and the identifier
//! helpers below tint user and message IDs so the same ID always gets the
//! same colour:
//!
//! ```text
//! 2026-10-16T09:12:44.120Z  INFO rapport::relationships: friend request u-3f9a1c2 -> u-7be04d1
//! ```

use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing_subscriber::EnvFilter;

static COLOUR_ENABLED: AtomicBool = AtomicBool::new(false);

/// Install the global subscriber. Call once at startup before any logging.
///
/// `default_directive` is used when `RUST_LOG` is unset or unparsable.
/// Calling this twice is harmless; the second install is ignored.
pub fn init(default_directive: &str) {
    let is_terminal = std::io::stderr().is_terminal();
    COLOUR_ENABLED.store(is_terminal, Ordering::Relaxed);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(is_terminal)
        .try_init();
}

/// Returns whether ANSI colour output is enabled.
pub fn colour_enabled() -> bool {
    COLOUR_ENABLED.load(Ordering::Relaxed)
}

const RESET: &str = "\x1b[0m";

/// Bright, visually distinct colours for ID hashing.
const ID_COLOURS: &[&str] = &[
    "\x1b[91m", "\x1b[92m", "\x1b[93m", "\x1b[94m", "\x1b[95m", "\x1b[96m", "\x1b[31m",
    "\x1b[32m", "\x1b[33m", "\x1b[34m", "\x1b[35m", "\x1b[36m",
];

fn hash_colour(id: &str) -> &'static str {
    let hash: u32 = id
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));
    ID_COLOURS[(hash as usize) % ID_COLOURS.len()]
}

const LOG_ID_TRUNCATE_LEN: usize = 7;

fn truncate_id(id: &str) -> &str {
    let end = id
        .char_indices()
        .nth(LOG_ID_TRUNCATE_LEN)
        .map(|(i, _)| i)
        .unwrap_or(id.len());
    &id[..end]
}

/// Format a user ID with consistent colour and truncation, e.g. `u-3f9a1c2`.
pub fn user_id(id: &str) -> String {
    let short = truncate_id(id);
    if colour_enabled() {
        format!("{}u-{short}{RESET}", hash_colour(id))
    } else {
        format!("u-{short}")
    }
}

const MSG_ID_COLOUR: &str = "\x1b[93m";

/// Format a message ID, e.g. `m-9c01d7e`.
pub fn msg_id(id: &str) -> String {
    let short = truncate_id(id);
    if colour_enabled() {
        format!("{MSG_ID_COLOUR}m-{short}{RESET}")
    } else {
        format!("m-{short}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_truncated_and_prefixed() {
        assert_eq!(truncate_id("abcdefghij"), "abcdefg");
        assert_eq!(truncate_id("abc"), "abc");
        if !colour_enabled() {
            assert_eq!(user_id("3f9a1c2e-0000"), "u-3f9a1c2");
            assert_eq!(msg_id("9c01d7e5"), "m-9c01d7e");
        }
    }

    #[test]
    fn same_id_same_colour() {
        assert_eq!(hash_colour("user-a"), hash_colour("user-a"));
    }

    #[test]
    fn multibyte_ids_truncate_on_char_boundary() {
        assert_eq!(truncate_id("ééééééééé"), "ééééééé");
    }
}
