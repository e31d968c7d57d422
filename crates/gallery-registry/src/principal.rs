//! Principal directory: API-key holders.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gallery_core::{ApiKey, Principal};
use parking_lot::RwLock;

use crate::error::{RegistryError, Result};

/// Lookup of principals by API key.
pub trait PrincipalDirectory: Send + Sync {
    fn find_by_api_key(&self, key: &ApiKey) -> Result<Option<Principal>>;
}

#[derive(Debug, Default)]
struct Principals {
    /// Keyed by lowercase username.
    by_name: BTreeMap<String, Principal>,
    /// API key to lowercase username.
    by_key: BTreeMap<ApiKey, String>,
}

impl Principals {
    /// Add `principal`, rejecting a taken username or key.
    fn add(&mut self, principal: Principal) -> Result<()> {
        let name = principal.username.to_ascii_lowercase();
        if self.by_name.contains_key(&name) {
            return Err(RegistryError::PrincipalExists {
                username: principal.username,
            });
        }
        if self.by_key.contains_key(&principal.api_key) {
            return Err(RegistryError::ApiKeyInUse);
        }
        self.by_key.insert(principal.api_key, name.clone());
        self.by_name.insert(name, principal);
        Ok(())
    }

    fn remove(&mut self, principal: &Principal) {
        self.by_key.remove(&principal.api_key);
        self.by_name.remove(&principal.username.to_ascii_lowercase());
    }
}

/// An in-memory directory with an optional JSON snapshot.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    principals: RwLock<Principals>,
    snapshot: Option<PathBuf>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a directory mirrored to `path`, loading it if the file exists.
    pub fn open(path: &Path) -> Result<Self> {
        let list: Vec<Principal> = if path.is_file() {
            serde_json::from_str(&std::fs::read_to_string(path)?)?
        } else {
            Vec::new()
        };
        let mut principals = Principals::default();
        for principal in list {
            principals.add(principal)?;
        }
        Ok(MemoryDirectory {
            principals: RwLock::new(principals),
            snapshot: Some(path.to_path_buf()),
        })
    }

    /// Register `username` under a freshly generated key.
    pub fn add(&self, username: &str) -> Result<Principal> {
        self.insert(Principal {
            username: username.to_string(),
            api_key: ApiKey::generate(),
        })
    }

    /// Register a principal with a known key.
    pub fn insert(&self, principal: Principal) -> Result<Principal> {
        let mut principals = self.principals.write();
        principals.add(principal.clone())?;
        if let Err(e) = self.persist(&principals) {
            principals.remove(&principal);
            return Err(e);
        }
        tracing::info!(user = %principal.username, "principal registered");
        Ok(principal)
    }

    pub fn find_by_username(&self, username: &str) -> Option<Principal> {
        self.principals
            .read()
            .by_name
            .get(&username.to_ascii_lowercase())
            .cloned()
    }

    fn persist(&self, principals: &Principals) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let list: Vec<&Principal> = principals.by_name.values().collect();
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut file, &list)?;
        file.persist(path).map_err(|e| RegistryError::Io(e.error))?;
        Ok(())
    }
}

impl PrincipalDirectory for MemoryDirectory {
    fn find_by_api_key(&self, key: &ApiKey) -> Result<Option<Principal>> {
        let principals = self.principals.read();
        Ok(principals
            .by_key
            .get(key)
            .and_then(|name| principals.by_name.get(name))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_find() {
        let directory = MemoryDirectory::new();
        let alice = directory.add("alice").unwrap();
        assert_eq!(directory.find_by_api_key(&alice.api_key).unwrap(), Some(alice.clone()));
        assert_eq!(directory.find_by_username("ALICE"), Some(alice));
        assert_eq!(directory.find_by_api_key(&ApiKey::generate()).unwrap(), None);
    }

    #[test]
    fn duplicate_username_rejected() {
        let directory = MemoryDirectory::new();
        directory.add("alice").unwrap();
        let err = directory.add("Alice").unwrap_err();
        assert!(matches!(err, RegistryError::PrincipalExists { .. }));
    }

    #[test]
    fn duplicate_api_key_rejected() {
        let directory = MemoryDirectory::new();
        let alice = directory.add("alice").unwrap();
        let err = directory
            .insert(Principal {
                username: "bob".into(),
                api_key: alice.api_key,
            })
            .unwrap_err();
        assert!(matches!(err, RegistryError::ApiKeyInUse));
        assert_eq!(err.status(), crate::error::Status::Conflict);

        assert_eq!(directory.find_by_username("bob"), None);
        assert_eq!(directory.find_by_api_key(&alice.api_key).unwrap(), Some(alice));
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("principals.json");
        let alice = MemoryDirectory::open(&path).unwrap().add("alice").unwrap();

        let reopened = MemoryDirectory::open(&path).unwrap();
        assert_eq!(reopened.find_by_api_key(&alice.api_key).unwrap(), Some(alice));
    }
}
