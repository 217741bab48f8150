use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::PathBuf;

use crate::models::{Role, User, UserId};

/// Persisted login snapshot, so the client can resume without the user
/// re-entering credentials. The bearer token is obfuscated at rest.
#[derive(Serialize, Deserialize, Clone)]
pub struct Session {
    pub server: String,
    pub username: String,
    pub user_id: UserId,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Session {
    pub fn new(server: &str, user: &User, token: &str) -> Self {
        Session {
            server: server.to_string(),
            username: user.username.clone(),
            user_id: user.id,
            role: user.role,
            token: Some(BASE64.encode(token)),
        }
    }

    pub fn get_token(&self) -> Option<String> {
        self.token.as_ref().map(|encoded| {
            String::from_utf8(BASE64.decode(encoded).unwrap_or_default()).unwrap_or_default()
        })
    }
}

pub fn get_config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| anyhow!("Could not determine config directory"))?
        .join("tutorlink");

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn save_session(session: &Session) -> Result<()> {
    let session_path = get_session_path()?;
    let file = File::create(session_path)?;
    serde_json::to_writer_pretty(file, session)?;

    info!("Session saved for {}", session.username);
    Ok(())
}

pub fn load_session() -> Result<Option<Session>> {
    let session_path = get_session_path()?;

    if !session_path.exists() {
        return Ok(None);
    }

    let session_path_str = session_path.display().to_string();

    let mut file = File::open(session_path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let session: Session = serde_json::from_str(&contents)?;
    info!("Loaded session for {} from {}", session.username, session_path_str);

    Ok(Some(session))
}

/// Remove the persisted session (logout).
pub fn clear_session() -> Result<()> {
    let session_path = get_session_path()?;
    if session_path.exists() {
        fs::remove_file(session_path)?;
    }
    Ok(())
}

static SESSION_PATH_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Override the session file location (tests).
pub fn set_session_path_override(path: PathBuf) {
    let _ = SESSION_PATH_OVERRIDE.set(path);
}

fn get_session_path() -> Result<PathBuf> {
    if let Some(path) = SESSION_PATH_OVERRIDE.get() {
        return Ok(path.clone());
    }
    Ok(get_config_dir()?.join("session.json"))
}
