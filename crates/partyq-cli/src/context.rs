//! Paths, engine config and session identity for one CLI invocation.

use std::env;
use std::path::{Path, PathBuf};

use partyq_core::{EngineConfig, SessionId, SessionIdentity};

use crate::error::CliError;

const CONFIG_FILE_NAME: &str = "config.json";
const SESSION_FILE_NAME: &str = "session-id";

pub const ENV_DB_PATH: &str = "PARTYQ_DB_PATH";
pub const ENV_CONFIG_PATH: &str = "PARTYQ_CONFIG";
pub const ENV_SESSION_ID: &str = "PARTYQ_SESSION_ID";
pub const ENV_USER_ID: &str = "PARTYQ_USER_ID";

#[derive(Debug, Clone)]
pub struct CliContext {
    pub db_path: PathBuf,
    pub config_path: PathBuf,
    pub config: EngineConfig,
    pub identity: SessionIdentity,
}

impl CliContext {
    /// Resolve everything from flags and the process environment.
    pub fn resolve(
        db_path: Option<PathBuf>,
        config_path: Option<PathBuf>,
        session_id: Option<String>,
    ) -> Result<Self, CliError> {
        Self::resolve_with(db_path, config_path, session_id, |key| env::var(key).ok())
    }

    pub fn resolve_with(
        db_path: Option<PathBuf>,
        config_path: Option<PathBuf>,
        session_id: Option<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CliError> {
        let db_path = db_path
            .or_else(|| lookup(ENV_DB_PATH).map(PathBuf::from))
            .unwrap_or_else(default_db_path);
        let config_path = config_path
            .or_else(|| lookup(ENV_CONFIG_PATH).map(PathBuf::from))
            .unwrap_or_else(default_config_path);

        let config = EngineConfig::load_from_path(&config_path)
            .map_err(|error| {
                CliError::Config(format!(
                    "Failed to load config at {}: {error}",
                    config_path.display()
                ))
            })?
            .with_env_overrides();

        let session_id = match normalize_text(session_id.or_else(|| lookup(ENV_SESSION_ID))) {
            Some(id) => SessionId::from(id),
            None => load_or_create_session_id(&session_file_path(&config_path))?,
        };
        let mut identity = SessionIdentity::new(session_id);
        if let Some(user_id) = normalize_text(lookup(ENV_USER_ID)) {
            identity = identity.with_user_id(user_id);
        }

        tracing::debug!(
            db = %db_path.display(),
            session = %identity.session_id,
            "Resolved CLI context"
        );
        Ok(Self {
            db_path,
            config_path,
            config,
            identity,
        })
    }
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("partyq")
        .join("partyq.db")
}

pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("partyq")
        .join(CONFIG_FILE_NAME)
}

/// The persisted session id lives next to the config file.
pub fn session_file_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map_or_else(|| PathBuf::from(SESSION_FILE_NAME), |dir| dir.join(SESSION_FILE_NAME))
}

pub fn load_or_create_session_id(path: &Path) -> Result<SessionId, CliError> {
    if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        if let Some(id) = normalize_text(Some(raw)) {
            return Ok(SessionId::from(id));
        }
    }

    let id = SessionId::new();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, id.as_str())?;
    tracing::info!("Created session {id}");
    Ok(id)
}

pub fn normalize_text(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
