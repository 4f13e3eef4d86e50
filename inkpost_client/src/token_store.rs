use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::models::{Session, UserIdentity};

/// On-disk shape of the session file. The token and identity are present
/// together or not at all; the last-used username is kept independently as a
/// login convenience.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredState {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    identity: Option<UserIdentity>,
    #[serde(default)]
    last_username: Option<String>,
}

/// Persisted session credential; the single source of truth for
/// "is authenticated".
///
/// Backed by a JSON file so the session survives a restart. All reads come
/// from the in-memory copy; `set` and `clear` are the only writers and only
/// `SessionController` calls them.
pub struct TokenStore {
    path: PathBuf,
    state: Mutex<StoredState>,
}

impl TokenStore {
    /// Opens (or initializes) the store at `path`. A corrupt file is treated
    /// as absent rather than failing the whole client.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!("discarding corrupt session file {}: {err}", path.display());
                StoredState::default()
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoredState::default(),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read session file {}", path.display()))
            }
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Opens the store at the platform default location.
    pub fn open_default() -> Result<Self> {
        let base = dirs::data_dir().context("no data directory available on this platform")?;
        Self::open(base.join("inkpost").join("session.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current session, if any.
    pub fn get(&self) -> Option<Session> {
        let state = self.lock();
        match (&state.token, &state.identity) {
            (Some(token), Some(identity)) => Some(Session {
                token: token.clone(),
                identity: identity.clone(),
            }),
            _ => None,
        }
    }

    /// Username of the most recent successful login, retained across logout.
    pub fn last_username(&self) -> Option<String> {
        self.lock().last_username.clone()
    }

    /// Replaces the stored session and persists it.
    pub fn set(&self, session: &Session) -> Result<()> {
        let snapshot = {
            let mut state = self.lock();
            state.token = Some(session.token.clone());
            state.identity = Some(session.identity.clone());
            state.last_username = Some(session.identity.username.clone());
            state.clone()
        };
        self.persist(&snapshot)
    }

    /// Drops the token and identity. The remembered username stays.
    pub fn clear(&self) -> Result<()> {
        let snapshot = {
            let mut state = self.lock();
            state.token = None;
            state.identity = None;
            state.clone()
        };
        self.persist(&snapshot)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoredState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &StoredState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string_pretty(state).context("failed to encode session file")?;
        fs::write(&self.path, raw)
            .with_context(|| format!("failed to write session file {}", self.path.display()))
    }
}
