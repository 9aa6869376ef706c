//! Persisted client state: server address, setup flag and last model choice.
//!
//! Consumers receive a [`PreferenceStore`] explicitly; there is no global
//! instance.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{ClientError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub base_url: String,

    #[serde(rename = "setup_complete")]
    pub has_completed_setup: bool,

    #[serde(rename = "last_provider")]
    pub last_provider_id: String,

    #[serde(rename = "last_model")]
    pub last_model_id: String,
}

impl Preferences {
    pub fn last_provider(&self) -> Option<&str> {
        Some(self.last_provider_id.as_str()).filter(|s| !s.is_empty())
    }

    pub fn last_model(&self) -> Option<&str> {
        Some(self.last_model_id.as_str()).filter(|s| !s.is_empty())
    }
}

/// Storage backend for [`Preferences`]
pub trait PreferenceStore: Send + Sync {
    /// Current preferences; an empty store yields defaults
    fn load(&self) -> Result<Preferences>;

    fn save(&self, preferences: &Preferences) -> Result<()>;

    /// Forget everything
    fn clear(&self) -> Result<()>;

    /// Load, apply `f`, save
    fn update(&self, f: &mut dyn FnMut(&mut Preferences)) -> Result<Preferences> {
        let mut preferences = self.load()?;
        f(&mut preferences);
        self.save(&preferences)?;
        Ok(preferences)
    }
}

/// Preferences kept in a TOML file
#[derive(Debug, Clone)]
pub struct TomlPreferenceStore {
    path: PathBuf,
}

impl TomlPreferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PreferenceStore for TomlPreferenceStore {
    fn load(&self) -> Result<Preferences> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Preferences::default());
            }
            Err(e) => {
                return Err(ClientError::Preferences(format!(
                    "failed to read {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        toml::from_str(&contents).map_err(|e| {
            ClientError::Preferences(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                ClientError::Preferences(format!("failed to create {}: {}", parent.display(), e))
            })?;
        }

        let contents = toml::to_string_pretty(preferences)
            .map_err(|e| ClientError::Preferences(format!("failed to encode preferences: {}", e)))?;

        fs::write(&self.path, contents).map_err(|e| {
            ClientError::Preferences(format!("failed to write {}: {}", self.path.display(), e))
        })?;

        tracing::debug!("Saved preferences to {}", self.path.display());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Preferences(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// In-memory store, for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryPreferenceStore {
    inner: Mutex<Preferences>,
}

impl MemoryPreferenceStore {
    pub fn new(preferences: Preferences) -> Self {
        Self {
            inner: Mutex::new(preferences),
        }
    }
}

impl PreferenceStore for MemoryPreferenceStore {
    fn load(&self) -> Result<Preferences> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| ClientError::Preferences("preference lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn save(&self, preferences: &Preferences) -> Result<()> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| ClientError::Preferences("preference lock poisoned".to_string()))?;
        *guard = preferences.clone();
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.save(&Preferences::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlPreferenceStore::new(dir.path().join("nope.toml"));
        assert_eq!(store.load().unwrap(), Preferences::default());
    }

    #[test]
    fn test_save_creates_parent_dirs_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlPreferenceStore::new(dir.path().join("nested/dir/prefs.toml"));

        let prefs = Preferences {
            base_url: "http://10.0.0.2:4096".to_string(),
            has_completed_setup: true,
            last_provider_id: "anthropic".to_string(),
            last_model_id: "claude-sonnet".to_string(),
        };
        store.save(&prefs).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("setup_complete = true"));
        assert!(raw.contains(r#"base_url = "http://10.0.0.2:4096""#));
        assert!(raw.contains(r#"last_model = "claude-sonnet""#));
        assert_eq!(store.load().unwrap(), prefs);

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), Preferences::default());
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.toml");
        fs::write(&path, "base_url = [").unwrap();

        let err = TomlPreferenceStore::new(path).load().unwrap_err();
        assert!(matches!(err, ClientError::Preferences(_)));
    }

    #[test]
    fn test_memory_store_update() {
        let store = MemoryPreferenceStore::default();
        let updated = store
            .update(&mut |p| {
                p.last_provider_id = "openai".to_string();
            })
            .unwrap();

        assert_eq!(updated.last_provider(), Some("openai"));
        assert_eq!(store.load().unwrap().last_model(), None);

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), Preferences::default());
    }
}
