// Directory cache: durable lookup of counterparty display identities.
// The messages service does not always denormalize sender/recipient info,
// so chat views resolve names here; absence is never an error and callers
// always fall back to a placeholder.

use std::collections::HashMap;
use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{info, warn};
use once_cell::sync::OnceCell;

use crate::error::{ApiError, StoreError};
use crate::models::{DirectoryEntry, Role, User, UserId};

/// Transport seam for the warm-up fetch.
#[async_trait]
pub trait DirectoryGateway: Send + Sync {
    async fn fetch_users(&self) -> Result<Vec<User>, ApiError>;
}

static DATA_DIR_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Override the directory used for the persisted cache (tests).
pub fn set_data_dir_override(path: PathBuf) {
    let _ = DATA_DIR_OVERRIDE.set(path);
}

fn data_dir() -> Result<PathBuf> {
    if let Some(dir) = DATA_DIR_OVERRIDE.get() {
        return Ok(dir.clone());
    }
    let dir = dirs::data_dir()
        .ok_or_else(|| anyhow!("Could not determine data directory"))?
        .join("tutorlink");
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

fn cache_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("directory.json"))
}

/// Entries are keyed by the counterparty's role plus id, so the same
/// numeric id never collides between the student-viewing-teacher and
/// teacher-viewing-student perspectives.
fn entry_key(counterparty_role: Role, counterparty: UserId) -> String {
    format!("{}:{}", counterparty_role.label().to_lowercase(), counterparty)
}

/// Placeholder display name used whenever the directory has no entry.
pub fn display_name(
    viewer_role: Role,
    counterparty: UserId,
    entry: Option<&DirectoryEntry>,
) -> String {
    match entry {
        Some(entry) if !entry.username.is_empty() => entry.username.clone(),
        _ => format!("{} {}", viewer_role.counterpart().label(), counterparty),
    }
}

/// Durable cache of user display records. Lookups are synchronous against
/// the in-memory map; the map is loaded from disk at construction and
/// repopulated by [`DirectoryCache::initialize`].
pub struct DirectoryCache {
    viewer_role: Role,
    gateway: Arc<dyn DirectoryGateway>,
    entries: Mutex<HashMap<String, DirectoryEntry>>,
    warmed: AtomicBool,
}

impl DirectoryCache {
    /// Build the cache, loading whatever the previous session persisted. A
    /// missing or unreadable cache file just means starting empty.
    pub fn new(viewer_role: Role, gateway: Arc<dyn DirectoryGateway>) -> Self {
        let entries = match Self::load_persisted() {
            Ok(Some(entries)) => {
                info!("Loaded {} directory entries from disk", entries.len());
                entries
            }
            Ok(None) => HashMap::new(),
            Err(e) => {
                warn!("Could not read directory cache, starting empty: {}", e);
                HashMap::new()
            }
        };
        DirectoryCache {
            viewer_role,
            gateway,
            entries: Mutex::new(entries),
            warmed: AtomicBool::new(false),
        }
    }

    /// Synchronous lookup; never touches the network.
    pub fn resolve(&self, counterparty: UserId) -> Option<DirectoryEntry> {
        let key = entry_key(self.viewer_role.counterpart(), counterparty);
        self.lock_entries().get(&key).cloned()
    }

    /// Display name for a counterparty, falling back to the role-derived
    /// placeholder when no entry is cached.
    pub fn display_name(&self, counterparty: UserId) -> String {
        display_name(
            self.viewer_role,
            counterparty,
            self.resolve(counterparty).as_ref(),
        )
    }

    /// Bulk warm-up: fetch the full user directory once per process
    /// lifetime and cache every user on the other side of the viewer's
    /// role. Subsequent calls are no-ops after one success; a failed
    /// warm-up leaves the disk-loaded entries in place and may be retried.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        if self.warmed.load(Ordering::SeqCst) {
            return Ok(());
        }

        let users = self
            .gateway
            .fetch_users()
            .await
            .map_err(StoreError::DirectoryWarmupFailed)?;

        let counterpart_role = self.viewer_role.counterpart();
        let snapshot = {
            let mut entries = self.lock_entries();
            for user in users.into_iter().filter(|u| u.role == counterpart_role) {
                entries.insert(
                    entry_key(counterpart_role, user.id),
                    DirectoryEntry {
                        user_id: user.id,
                        username: user.username,
                        email: user.email,
                    },
                );
            }
            entries.clone()
        };
        info!("Directory warm-up cached {} entries", snapshot.len());

        if let Err(e) = Self::persist(&snapshot) {
            warn!("Could not persist directory cache: {}", e);
        }
        self.warmed.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Force the next `initialize` call to refetch.
    pub fn invalidate(&self) {
        self.warmed.store(false, Ordering::SeqCst);
    }

    fn load_persisted() -> Result<Option<HashMap<String, DirectoryEntry>>> {
        let path = cache_path()?;
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(path)?;
        Ok(Some(serde_json::from_reader(file)?))
    }

    fn persist(entries: &HashMap<String, DirectoryEntry>) -> Result<()> {
        let file = File::create(cache_path()?)?;
        serde_json::to_writer_pretty(file, entries)?;
        Ok(())
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, DirectoryEntry>> {
        self.entries.lock().expect("directory map poisoned")
    }
}
