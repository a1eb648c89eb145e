//! Identity store: accounts, email verification and login sessions.
//!
//! A new account starts unverified with a six-digit code that is valid for
//! ten minutes. The code is mailed on a background task; signup succeeds
//! whether or not the mail goes out, and a fresh code can be requested at
//! any time until the account is verified. Only verified accounts can log in.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::crypto::{self, PasswordHasher};
use crate::error::{CoreError, CoreResult};
use crate::logging;
use crate::mailer::{dispatch_verification, Mailer, VerificationEmail};
use crate::model::{PublicUser, User};
use crate::storage::{SessionRow, Storage};
use crate::uploads::ImageUploader;

pub const CODE_TTL_SECS: u64 = 600;
pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_NAME_LEN: usize = 100;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// A freshly issued login session.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub token: String,
    pub expires_at: u64,
}

/// Lower-cased, trimmed email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Minimal `local@domain.tld` shape check.
pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain
            .split_once('.')
            .is_some_and(|(host, _)| !host.is_empty())
        && !domain.ends_with('.')
}

pub struct IdentityStore {
    storage: Arc<Storage>,
    hasher: PasswordHasher,
    /// Verified against when the email is unknown, so both login failures
    /// cost one argon2 run.
    dummy_hash: String,
    mailer: Arc<dyn Mailer>,
    uploader: Arc<dyn ImageUploader>,
    session_ttl_secs: u64,
    upload_timeout: Duration,
}

impl IdentityStore {
    pub fn new(
        storage: Arc<Storage>,
        hasher: PasswordHasher,
        mailer: Arc<dyn Mailer>,
        uploader: Arc<dyn ImageUploader>,
        session_ttl_secs: u64,
        upload_timeout: Duration,
    ) -> Self {
        let dummy_hash = hasher
            .hash(&crypto::generate_session_token())
            .unwrap_or_else(|e| {
                tracing::warn!("identity: dummy password hash unavailable: {}", e);
                String::new()
            });
        Self {
            storage,
            hasher,
            dummy_hash,
            mailer,
            uploader,
            session_ttl_secs,
            upload_timeout,
        }
    }

    // -----------------------------------------------------------------------
    // Signup and verification
    // -----------------------------------------------------------------------

    pub fn signup(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
        now: u64,
    ) -> CoreResult<PublicUser> {
        let full_name = full_name.trim();
        let email = normalize_email(email);
        if full_name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(CoreError::validation("all fields are required"));
        }
        if full_name.chars().count() > MAX_NAME_LEN {
            return Err(CoreError::validation(format!(
                "name exceeds {MAX_NAME_LEN} characters"
            )));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(CoreError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters long"
            )));
        }
        if !is_valid_email(&email) {
            return Err(CoreError::validation("invalid email address"));
        }
        if self.storage.find_user_by_email(&email)?.is_some() {
            return Err(CoreError::Conflict(
                "user already exists with this email".to_string(),
            ));
        }

        let hash = self
            .hasher
            .hash(password)
            .map_err(|e| CoreError::validation(e.to_string()))?;
        let mut user = User::new(&email, full_name, hash, now);
        let code = crypto::generate_verification_code();
        user.verification_code = Some(code.clone());
        user.verification_code_expires = Some(now + CODE_TTL_SECS);
        // A concurrent signup with the same email loses on the unique index.
        self.storage.insert_user(&user)?;

        tracing::info!("identity: signup {}", logging::user_id(&user.id));
        self.send_code(&user, code);
        Ok(user.public())
    }

    fn send_code(&self, user: &User, code: String) {
        dispatch_verification(
            self.mailer.clone(),
            user.id.clone(),
            VerificationEmail {
                to: user.email.clone(),
                full_name: user.full_name.clone(),
                code,
                expires_in_secs: CODE_TTL_SECS,
            },
        );
    }

    pub fn verify_code(&self, email: &str, code: &str, now: u64) -> CoreResult<PublicUser> {
        let email = normalize_email(email);
        let code = code.trim();
        if email.is_empty() || code.is_empty() {
            return Err(CoreError::validation("email and code are required"));
        }
        let user = self
            .storage
            .find_user_by_email(&email)?
            .ok_or_else(CoreError::user_not_found)?;

        let verified = self
            .storage
            .update_user::<_, CoreError, _>(&user.id, |u| {
                if u.is_verified {
                    return Err(CoreError::Conflict("user already verified".to_string()));
                }
                if u.verification_code.as_deref() != Some(code) {
                    return Err(CoreError::validation("invalid verification code"));
                }
                match u.verification_code_expires {
                    Some(expires) if now < expires => {}
                    _ => return Err(CoreError::ExpiredCode),
                }
                u.is_verified = true;
                u.verification_code = None;
                u.verification_code_expires = None;
                Ok(u.public())
            })?;

        tracing::info!("identity: verified {}", logging::user_id(&verified.id));
        Ok(verified)
    }

    /// Issue a fresh code and expiry, replacing the previous ones.
    pub fn resend_code(&self, email: &str, now: u64) -> CoreResult<()> {
        let email = normalize_email(email);
        if email.is_empty() {
            return Err(CoreError::validation("email is required"));
        }
        let user = self
            .storage
            .find_user_by_email(&email)?
            .ok_or_else(CoreError::user_not_found)?;
        let code = crypto::generate_verification_code();
        let updated = self
            .storage
            .update_user::<_, CoreError, _>(&user.id, |u| {
                if u.is_verified {
                    return Err(CoreError::Conflict("user already verified".to_string()));
                }
                u.verification_code = Some(code.clone());
                u.verification_code_expires = Some(now + CODE_TTL_SECS);
                Ok(u.clone())
            })?;
        self.send_code(&updated, code);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    pub fn login(&self, email: &str, password: &str, now: u64) -> CoreResult<LoginOutcome> {
        let email = normalize_email(email);
        let invalid = || CoreError::validation("invalid credentials");
        let Some(user) = self.storage.find_user_by_email(&email)? else {
            self.hasher.verify(password, &self.dummy_hash);
            return Err(invalid());
        };
        if !self.hasher.verify(password, &user.password_hash) {
            return Err(invalid());
        }
        if !user.is_verified {
            return Err(CoreError::forbidden("email address is not verified"));
        }

        let row = SessionRow {
            token: crypto::generate_session_token(),
            user_id: user.id.clone(),
            created_at: now,
            expires_at: now + self.session_ttl_secs,
        };
        self.storage.insert_session(&row)?;
        tracing::info!("identity: login {}", logging::user_id(&user.id));
        Ok(LoginOutcome {
            user: user.public(),
            token: row.token,
            expires_at: row.expires_at,
        })
    }

    /// Returns whether a session was removed.
    pub fn logout(&self, token: &str) -> CoreResult<bool> {
        Ok(self.storage.delete_session(token)?)
    }

    /// Resolve a session token to its user id.
    pub fn authenticate(&self, token: &str, now: u64) -> CoreResult<String> {
        if token.is_empty() {
            return Err(CoreError::Unauthorized);
        }
        match self.storage.get_session(token)? {
            Some(row) if now < row.expires_at => Ok(row.user_id),
            Some(_) => {
                self.storage.delete_session(token)?;
                Err(CoreError::Unauthorized)
            }
            None => Err(CoreError::Unauthorized),
        }
    }

    pub fn check_auth(&self, user_id: &str) -> CoreResult<PublicUser> {
        match self.storage.get_user(user_id)? {
            Some(user) => Ok(user.public()),
            None => Err(CoreError::Unauthorized),
        }
    }

    /// Drop expired sessions. Returns how many were removed.
    pub fn purge_expired_sessions(&self, now: u64) -> CoreResult<usize> {
        Ok(self.storage.delete_expired_sessions(now)?)
    }

    // -----------------------------------------------------------------------
    // Profile
    // -----------------------------------------------------------------------

    pub async fn update_profile_pic(&self, user_id: &str, image: &str) -> CoreResult<PublicUser> {
        if image.trim().is_empty() {
            return Err(CoreError::validation("profile picture is required"));
        }
        let url = match tokio::time::timeout(self.upload_timeout, self.uploader.upload(image)).await
        {
            Ok(Ok(url)) => url,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(CoreError::UploadFailed("timed out".to_string())),
        };
        self.storage.update_user::<_, CoreError, _>(user_id, |u| {
            u.profile_pic = Some(url);
            Ok(u.public())
        })
    }
}
