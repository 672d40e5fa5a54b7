use std::path::PathBuf;

use parlor_store::ChatStore;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

const KEY_PROFILE_ID: &str = "profile_id";
const KEY_USERNAME: &str = "username";

/// The signed-in identity, passed explicitly to every component that
/// needs it. The persisted pair survives restarts; it is cleared only
/// by logout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    pub profile_id: Uuid,
    pub username: String,
}

/// Durable client-local key-value store for the session pair.
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub async fn open(db_path: PathBuf) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query("CREATE TABLE IF NOT EXISTS session (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// `None` unless both fields are present; callers redirect to login.
    pub async fn load(&self) -> AppResult<Option<SessionIdentity>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM session")
            .fetch_all(&self.pool)
            .await?;

        let mut profile_id = None;
        let mut username = None;
        for (key, value) in rows {
            match key.as_str() {
                KEY_PROFILE_ID => profile_id = Uuid::parse_str(&value).ok(),
                KEY_USERNAME => username = Some(value),
                _ => {}
            }
        }

        Ok(match (profile_id, username) {
            (Some(profile_id), Some(username)) => Some(SessionIdentity {
                profile_id,
                username,
            }),
            _ => None,
        })
    }

    pub async fn save(&self, session: &SessionIdentity) -> AppResult<()> {
        let pairs = [
            (KEY_PROFILE_ID, session.profile_id.to_string()),
            (KEY_USERNAME, session.username.clone()),
        ];
        for (key, value) in pairs {
            sqlx::query(
                r#"
                INSERT INTO session (key, value) VALUES (?, ?)
                ON CONFLICT(key) DO UPDATE SET value = excluded.value
                "#,
            )
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    pub async fn clear(&self) -> AppResult<()> {
        sqlx::query("DELETE FROM session").execute(&self.pool).await?;
        Ok(())
    }
}

/// The chat view requires a persisted session; a missing one redirects
/// the caller to the login flow.
pub async fn require_session(sessions: &SessionStore) -> AppResult<SessionIdentity> {
    sessions.load().await?.ok_or(AppError::NotAuthenticated)
}

/// Claims `username`: reuses the existing profile (flipping it online)
/// or creates a fresh one, then persists the pair.
pub async fn login(
    store: &dyn ChatStore,
    sessions: &SessionStore,
    username: &str,
) -> AppResult<SessionIdentity> {
    let username = username.trim();
    if username.is_empty() {
        return Err(AppError::validation("username required"));
    }

    let profile = match store.find_profile(username).await? {
        Some(existing) => {
            store.set_online(existing.id, true).await?;
            existing
        }
        None => store.create_profile(username).await?,
    };

    let session = SessionIdentity {
        profile_id: profile.id,
        username: username.to_string(),
    };
    sessions.save(&session).await?;
    tracing::info!(profile_id = %session.profile_id, username = %session.username, "signed in");
    Ok(session)
}

/// Clears the persisted pair. The online flag is flipped off
/// best-effort first; its failure never blocks the logout.
pub async fn logout(
    store: &dyn ChatStore,
    sessions: &SessionStore,
    session: &SessionIdentity,
) -> AppResult<()> {
    if let Err(err) = store.set_online(session.profile_id, false).await {
        tracing::warn!(profile_id = %session.profile_id, error = %err, "failed to clear online flag at logout");
    }
    sessions.clear().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_store::MemoryStore;

    fn temp_db_path(prefix: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.sqlite", prefix, Uuid::new_v4()))
    }

    #[tokio::test]
    async fn login_creates_once_and_reuses_the_profile_id() {
        let db_path = temp_db_path("parlor-session-login");
        let sessions = SessionStore::open(db_path.clone()).await.expect("open");
        let store = MemoryStore::new();

        let first = login(&store, &sessions, "  alice  ").await.expect("login");
        assert_eq!(first.username, "alice");

        let profile = store
            .find_profile("alice")
            .await
            .expect("lookup")
            .expect("profile exists");
        assert!(profile.is_online);
        assert_eq!(profile.id, first.profile_id);

        // Second login with the same name reuses the id.
        store.set_online(profile.id, false).await.expect("set offline");
        let second = login(&store, &sessions, "alice").await.expect("login again");
        assert_eq!(second.profile_id, first.profile_id);
        let profile = store
            .find_profile("alice")
            .await
            .expect("lookup")
            .expect("profile exists");
        assert!(profile.is_online);

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn missing_session_redirects_to_login() {
        let db_path = temp_db_path("parlor-session-missing");
        let sessions = SessionStore::open(db_path.clone()).await.expect("open");

        let result = require_session(&sessions).await;
        assert!(matches!(result, Err(AppError::NotAuthenticated)));

        let store = MemoryStore::new();
        let session = login(&store, &sessions, "alice").await.expect("login");
        assert_eq!(
            require_session(&sessions).await.expect("session"),
            session
        );

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn blank_username_is_rejected_without_a_write() {
        let db_path = temp_db_path("parlor-session-blank");
        let sessions = SessionStore::open(db_path.clone()).await.expect("open");
        let store = MemoryStore::new();

        let result = login(&store, &sessions, "   ").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(sessions.load().await.expect("load").is_none());

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn session_pair_survives_reopen_and_clears_on_logout() {
        let db_path = temp_db_path("parlor-session-persist");
        let store = MemoryStore::new();

        let session = {
            let sessions = SessionStore::open(db_path.clone()).await.expect("open");
            login(&store, &sessions, "alice").await.expect("login")
        };

        // A fresh handle on the same file still sees the pair.
        let sessions = SessionStore::open(db_path.clone()).await.expect("reopen");
        assert_eq!(sessions.load().await.expect("load"), Some(session.clone()));

        logout(&store, &sessions, &session).await.expect("logout");
        assert!(sessions.load().await.expect("load").is_none());
        let profile = store
            .find_profile("alice")
            .await
            .expect("lookup")
            .expect("profile exists");
        assert!(!profile.is_online);

        let _ = std::fs::remove_file(db_path);
    }

    #[tokio::test]
    async fn logout_clears_the_pair_even_when_the_store_fails() {
        let db_path = temp_db_path("parlor-session-logout-fail");
        let sessions = SessionStore::open(db_path.clone()).await.expect("open");
        let store = MemoryStore::new();

        let session = login(&store, &sessions, "alice").await.expect("login");
        // A session pointing at a profile the store no longer knows:
        // the presence write fails, the logout still completes.
        let stale = SessionIdentity {
            profile_id: Uuid::new_v4(),
            username: session.username.clone(),
        };
        logout(&store, &sessions, &stale).await.expect("logout");
        assert!(sessions.load().await.expect("load").is_none());

        let _ = std::fs::remove_file(db_path);
    }
}
