//! Resolves "who is calling" for every request.
//!
//! The web build keeps the signed-in user id in a cookie session managed by
//! `tower-sessions`; the session layer handles idle expiry and this crate
//! adds the absolute lifetime on top. The desktop build has a single local
//! user and is always authenticated.

use chrono::{DateTime, Duration, Utc};
use core_types::{RuntimeMode, Session, SessionUser, UserId};
use storage_sqlite::{SqliteStorage, StorageError};
use thiserror::Error;
use tower_sessions::Session as CookieSession;
use tracing::{debug, info};

pub mod password;

pub const SESSION_COOKIE: &str = "promptcraft.session-token";
pub const SESSION_USER_ID_KEY: &str = "user_id";
pub const SESSION_SIGNED_IN_AT_KEY: &str = "signed_in_at";

pub const MIN_PASSWORD_LEN: usize = 8;
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 30;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("email is already registered")]
    EmailTaken,

    #[error("{0}")]
    InvalidInput(String),

    #[error("not available in desktop mode")]
    DesktopMode,

    #[error(transparent)]
    Session(#[from] tower_sessions::session::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, AuthError>;

#[derive(Debug, Clone)]
pub struct AuthService {
    mode: RuntimeMode,
    idle_timeout: Duration,
    session_ttl: Duration,
}

impl AuthService {
    pub fn new(mode: RuntimeMode, idle_timeout: Duration) -> Self {
        Self {
            mode,
            idle_timeout,
            session_ttl: Duration::days(DEFAULT_SESSION_TTL_DAYS),
        }
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn mode(&self) -> RuntimeMode {
        self.mode
    }

    /// Inactivity window the cookie session layer enforces.
    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub async fn register(
        &self,
        storage: &SqliteStorage,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<SessionUser> {
        self.ensure_web()?;
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() {
            return Err(AuthError::InvalidInput("name is required".to_string()));
        }
        if !email.contains('@') {
            return Err(AuthError::InvalidInput("email is invalid".to_string()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let hash = password::hash_password(password)?;
        let stored = storage
            .create_user(name, &email, hash)
            .await
            .map_err(|err| {
                if matches!(err.downcast_ref::<StorageError>(), Some(StorageError::EmailTaken)) {
                    AuthError::EmailTaken
                } else {
                    AuthError::Internal(err)
                }
            })?;
        info!(user_id = %stored.user.id, "user registered");
        Ok(stored.user)
    }

    /// Checks the credentials and binds the user to `cookie` under a fresh id.
    pub async fn sign_in(
        &self,
        storage: &SqliteStorage,
        cookie: &CookieSession,
        email: &str,
        password: &str,
    ) -> Result<Session> {
        self.ensure_web()?;
        let email = normalize_email(email);
        let Some(stored) = storage.find_user_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !password::verify_password(password, &stored.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        let now = Utc::now();
        cookie.cycle_id().await?;
        cookie
            .insert(SESSION_USER_ID_KEY, stored.user.id.to_string())
            .await?;
        cookie.insert(SESSION_SIGNED_IN_AT_KEY, now).await?;
        info!(user_id = %stored.user.id, "user signed in");

        Ok(Session {
            user: stored.user,
            expires: self.expiry(now, now),
        })
    }

    pub async fn sign_out(&self, cookie: &CookieSession) -> Result<()> {
        let user_id = cookie.get::<String>(SESSION_USER_ID_KEY).await?;
        cookie.flush().await?;
        if let Some(user_id) = user_id {
            info!(%user_id, "user signed out");
        }
        Ok(())
    }

    /// Current session, if any. A session past its absolute lifetime, or one
    /// pointing at a user that no longer exists, is flushed.
    pub async fn resolve(
        &self,
        storage: Option<&SqliteStorage>,
        cookie: Option<&CookieSession>,
    ) -> Result<Option<Session>> {
        if self.mode.is_desktop() {
            return Ok(Some(Session {
                user: SessionUser::desktop_stub(),
                expires: Utc::now() + self.session_ttl,
            }));
        }

        let (Some(storage), Some(cookie)) = (storage, cookie) else {
            return Ok(None);
        };
        let Some(raw_id) = cookie.get::<String>(SESSION_USER_ID_KEY).await? else {
            return Ok(None);
        };

        let now = Utc::now();
        let signed_in_at = cookie
            .get::<DateTime<Utc>>(SESSION_SIGNED_IN_AT_KEY)
            .await?
            .unwrap_or(DateTime::UNIX_EPOCH);
        if signed_in_at + self.session_ttl <= now {
            debug!(user_id = %raw_id, "session past its lifetime");
            cookie.flush().await?;
            return Ok(None);
        }

        let user = match UserId::parse_str(&raw_id) {
            Ok(id) => storage.find_user_by_id(id).await?,
            Err(_) => None,
        };
        let Some(user) = user else {
            debug!(user_id = %raw_id, "session user is gone");
            cookie.flush().await?;
            return Ok(None);
        };

        Ok(Some(Session {
            user,
            expires: self.expiry(signed_in_at, now),
        }))
    }

    fn expiry(&self, signed_in_at: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
        (signed_in_at + self.session_ttl).min(now + self.idle_timeout)
    }

    fn ensure_web(&self) -> Result<()> {
        if self.mode.is_desktop() {
            return Err(AuthError::DesktopMode);
        }
        Ok(())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    fn web() -> AuthService {
        AuthService::new(RuntimeMode::Web, Duration::minutes(30))
    }

    fn browser() -> CookieSession {
        CookieSession::new(None, Arc::new(MemoryStore::default()), None)
    }

    async fn registered(auth: &AuthService, storage: &SqliteStorage) -> SessionUser {
        auth.register(storage, "Ada", " Ada@Example.com ", "password123")
            .await
            .expect("register")
    }

    #[tokio::test]
    async fn register_sign_in_resolve_sign_out() {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        let auth = web();
        let cookie = browser();

        let user = registered(&auth, &storage).await;
        assert_eq!(user.email, "ada@example.com");

        let session = auth
            .sign_in(&storage, &cookie, "ada@example.com", "password123")
            .await
            .expect("sign in");
        assert_eq!(session.user, user);
        assert_eq!(
            cookie
                .get::<String>(SESSION_USER_ID_KEY)
                .await
                .expect("get"),
            Some(user.id.to_string())
        );

        let resolved = auth
            .resolve(Some(&storage), Some(&cookie))
            .await
            .expect("resolve")
            .expect("session");
        assert_eq!(resolved.user.id, user.id);
        assert!(resolved.expires <= Utc::now() + Duration::minutes(30));

        auth.sign_out(&cookie).await.expect("sign out");
        assert!(
            auth.resolve(Some(&storage), Some(&cookie))
                .await
                .expect("resolve")
                .is_none()
        );
    }

    #[tokio::test]
    async fn rejects_wrong_password_and_duplicate_email() {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        let auth = web();
        let cookie = browser();
        registered(&auth, &storage).await;

        assert!(matches!(
            auth.sign_in(&storage, &cookie, "ada@example.com", "wrong-password")
                .await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.sign_in(&storage, &cookie, "nobody@example.com", "password123")
                .await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.register(&storage, "Ada 2", "ADA@example.com", "password123")
                .await,
            Err(AuthError::EmailTaken)
        ));
        assert!(matches!(
            auth.register(&storage, "Short", "short@example.com", "abc").await,
            Err(AuthError::InvalidInput(_))
        ));
        assert!(
            cookie
                .get::<String>(SESSION_USER_ID_KEY)
                .await
                .expect("get")
                .is_none()
        );
    }

    #[tokio::test]
    async fn sessions_end_after_their_absolute_lifetime() {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        let auth = web().with_session_ttl(Duration::zero());
        let cookie = browser();
        registered(&auth, &storage).await;
        auth.sign_in(&storage, &cookie, "ada@example.com", "password123")
            .await
            .expect("sign in");

        assert!(
            auth.resolve(Some(&storage), Some(&cookie))
                .await
                .expect("resolve")
                .is_none()
        );
        assert!(
            cookie
                .get::<String>(SESSION_USER_ID_KEY)
                .await
                .expect("get")
                .is_none()
        );
    }

    #[tokio::test]
    async fn unknown_user_in_cookie_is_anonymous() {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        let auth = web();
        let cookie = browser();
        cookie
            .insert(SESSION_USER_ID_KEY, UserId::new_v4().to_string())
            .await
            .expect("insert");
        cookie
            .insert(SESSION_SIGNED_IN_AT_KEY, Utc::now())
            .await
            .expect("insert");

        assert!(
            auth.resolve(Some(&storage), Some(&cookie))
                .await
                .expect("resolve")
                .is_none()
        );
        assert!(
            cookie
                .get::<String>(SESSION_USER_ID_KEY)
                .await
                .expect("get")
                .is_none()
        );
    }

    #[tokio::test]
    async fn desktop_mode_is_always_authenticated() {
        let auth = AuthService::new(RuntimeMode::Desktop, Duration::minutes(30));
        let session = auth
            .resolve(None, None)
            .await
            .expect("resolve")
            .expect("stub session");
        assert_eq!(session.user, SessionUser::desktop_stub());

        let storage = SqliteStorage::in_memory().await.expect("storage");
        assert!(matches!(
            auth.register(&storage, "Ada", "ada@example.com", "password123")
                .await,
            Err(AuthError::DesktopMode)
        ));
        assert!(matches!(
            auth.sign_in(&storage, &browser(), "ada@example.com", "password123")
                .await,
            Err(AuthError::DesktopMode)
        ));
    }

    #[tokio::test]
    async fn missing_cookie_or_storage_means_anonymous() {
        let storage = SqliteStorage::in_memory().await.expect("storage");
        let auth = web();
        let cookie = browser();
        assert!(auth.resolve(Some(&storage), None).await.expect("resolve").is_none());
        assert!(auth.resolve(None, Some(&cookie)).await.expect("resolve").is_none());
        assert!(
            auth.resolve(Some(&storage), Some(&cookie))
                .await
                .expect("resolve")
                .is_none()
        );
    }
}
