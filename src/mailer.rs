//! Outbound email seam.
//!
//! Only verification codes are ever mailed. The server wires a [`LogMailer`]
//! behind a [`RetryingMailer`]; tests use [`MemoryMailer`] to read the codes
//! back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;

use crate::error::CoreError;
use crate::logging;

pub const DEFAULT_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum MailError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("send timed out after {0:?}")]
    Timeout(Duration),
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: Box<MailError> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationEmail {
    pub to: String,
    pub full_name: String,
    pub code: String,
    pub expires_in_secs: u64,
}

impl VerificationEmail {
    pub fn subject(&self) -> &'static str {
        "Verify your email address"
    }

    pub fn body(&self) -> String {
        format!(
            "Hi {},\n\nYour verification code is {}. It expires in {} minutes.\n",
            self.full_name,
            self.code,
            self.expires_in_secs / 60
        )
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification(&self, email: &VerificationEmail) -> Result<(), MailError>;
}

// ---------------------------------------------------------------------------
// Implementations
// ---------------------------------------------------------------------------

/// Writes the message to the log instead of sending it.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification(&self, email: &VerificationEmail) -> Result<(), MailError> {
        tracing::info!(
            to = %email.to,
            subject = email.subject(),
            "mail: verification code {} (expires in {}s)",
            email.code,
            email.expires_in_secs
        );
        Ok(())
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    sent: Mutex<Vec<VerificationEmail>>,
}

impl MemoryMailer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<VerificationEmail> {
        self.sent.lock().clone()
    }

    /// The most recent code mailed to `to`.
    pub fn last_code_for(&self, to: &str) -> Option<String> {
        self.sent
            .lock()
            .iter()
            .rev()
            .find(|m| m.to == to)
            .map(|m| m.code.clone())
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send_verification(&self, email: &VerificationEmail) -> Result<(), MailError> {
        self.sent.lock().push(email.clone());
        Ok(())
    }
}

/// Retries the inner mailer with exponential backoff.
///
/// Attempt `n` (0-based) that fails is followed by a sleep of
/// `base_delay * 2^n`; there is no sleep after the last attempt.
pub struct RetryingMailer<M> {
    inner: M,
    attempts: u32,
    base_delay: Duration,
    attempt_timeout: Duration,
}

impl<M: Mailer> RetryingMailer<M> {
    pub fn new(inner: M) -> Self {
        Self {
            inner,
            attempts: DEFAULT_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    pub fn with_policy(
        inner: M,
        attempts: u32,
        base_delay: Duration,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            inner,
            attempts: attempts.max(1),
            base_delay,
            attempt_timeout,
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

#[async_trait]
impl<M: Mailer> Mailer for RetryingMailer<M> {
    async fn send_verification(&self, email: &VerificationEmail) -> Result<(), MailError> {
        let mut last = None;
        for attempt in 0..self.attempts {
            let result =
                tokio::time::timeout(self.attempt_timeout, self.inner.send_verification(email))
                    .await
                    .unwrap_or(Err(MailError::Timeout(self.attempt_timeout)));
            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        "mail: attempt {}/{} to {} failed: {}",
                        attempt + 1,
                        self.attempts,
                        email.to,
                        e
                    );
                    last = Some(e);
                }
            }
            if attempt + 1 < self.attempts {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }
        Err(MailError::Exhausted {
            attempts: self.attempts,
            last: Box::new(last.unwrap_or(MailError::Transport("no attempt made".to_string()))),
        })
    }
}

/// Send on a background task. Failure is logged; the caller never sees it.
pub fn dispatch_verification(mailer: Arc<dyn Mailer>, user_id: String, email: VerificationEmail) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::error!(
            "mail: no runtime, verification for {} not sent",
            logging::user_id(&user_id)
        );
        return;
    };
    handle.spawn(async move {
        if let Err(e) = mailer.send_verification(&email).await {
            let err = CoreError::from(e);
            tracing::error!(
                kind = err.kind().as_str(),
                "mail: verification for {} not delivered: {}",
                logging::user_id(&user_id),
                err
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyMailer {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyMailer {
        fn failing(n: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(n),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Mailer for FlakyMailer {
        async fn send_verification(&self, _email: &VerificationEmail) -> Result<(), MailError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(MailError::Transport("smtp down".to_string()));
            }
            Ok(())
        }
    }

    fn email() -> VerificationEmail {
        VerificationEmail {
            to: "a@example.com".to_string(),
            full_name: "A".to_string(),
            code: "123456".to_string(),
            expires_in_secs: 600,
        }
    }

    fn fast(inner: FlakyMailer) -> RetryingMailer<FlakyMailer> {
        RetryingMailer::with_policy(
            inner,
            3,
            Duration::from_millis(1),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn retries_until_success() {
        let mailer = fast(FlakyMailer::failing(2));
        mailer.send_verification(&email()).await.unwrap();
        assert_eq!(mailer.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_attempts() {
        let mailer = fast(FlakyMailer::failing(10));
        let err = mailer.send_verification(&email()).await.unwrap_err();
        assert!(matches!(err, MailError::Exhausted { attempts: 3, .. }));
        assert_eq!(mailer.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn backoff_doubles() {
        let mailer = RetryingMailer::new(LogMailer);
        assert_eq!(mailer.backoff(0), Duration::from_secs(1));
        assert_eq!(mailer.backoff(1), Duration::from_secs(2));
        assert_eq!(mailer.backoff(2), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn memory_mailer_returns_latest_code() {
        let mailer = MemoryMailer::new();
        mailer.send_verification(&email()).await.unwrap();
        let mut second = email();
        second.code = "654321".to_string();
        mailer.send_verification(&second).await.unwrap();
        assert_eq!(mailer.last_code_for("a@example.com").as_deref(), Some("654321"));
        assert_eq!(mailer.sent().len(), 2);
        assert!(second.body().contains("10 minutes"));
    }
}
