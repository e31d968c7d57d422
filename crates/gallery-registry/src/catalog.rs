//! Catalog store trait and in-memory implementation.
//!
//! The `CatalogStore` trait is the registry's view of package metadata.
//! `MemoryCatalog` keeps the catalog behind a single `RwLock`, which makes
//! inserts and flag recomputation atomic, and can mirror every mutation to a
//! JSON snapshot on disk. Download events are appended to a separate JSON
//! Lines log; only the counters live in the snapshot.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use gallery_core::{
    normalize_id, unix_now, ArtifactDigest, Dependency, DownloadEvent, Package, PackageState,
    PackageVersion, Principal, Registration,
};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::auth::Action;
use crate::error::{RegistryError, Result};

/// Metadata for a package about to be inserted.
#[derive(Debug, Clone)]
pub struct NewPackage {
    pub id: String,
    pub version: PackageVersion,
    pub external_url: Option<String>,
    pub dependencies: Vec<Dependency>,
    pub digest: ArtifactDigest,
    pub description: Option<String>,
    pub authors: Vec<String>,
}

impl NewPackage {
    /// The listed package record, before latest flags are computed.
    pub fn into_package(self, id: String) -> Package {
        Package {
            id,
            version: self.version,
            state: PackageState::Listed,
            is_latest: false,
            is_latest_stable: false,
            external_url: self.external_url,
            dependencies: self.dependencies,
            download_count: 0,
            digest: self.digest,
            description: self.description,
            authors: self.authors,
            published: unix_now(),
        }
    }
}

/// A latest package that depends on some id, with its registration's rank.
#[derive(Debug, Clone)]
pub struct DependentCandidate {
    pub package: Package,
    pub registration_id: String,
    pub registration_downloads: u64,
}

/// Hook run inside an insert, before the new package becomes visible.
///
/// An error aborts the insert and leaves the catalog unchanged.
pub type CommitHook<'a> = &'a dyn Fn(&Package) -> Result<()>;

/// Package metadata storage.
pub trait CatalogStore: Send + Sync {
    /// Look up a registration by id, ignoring case.
    fn find_registration(&self, id: &str) -> Result<Option<Registration>>;

    /// Look up an exact (id, version) pair, listed or not.
    fn find_package(&self, id: &str, version: &PackageVersion) -> Result<Option<Package>>;

    /// The `is_latest` package when `include_prerelease`, else the
    /// `is_latest_stable` one.
    fn find_latest(&self, id: &str, include_prerelease: bool) -> Result<Option<Package>>;

    /// Atomically insert a package for `publisher`.
    ///
    /// Creates the registration on first publish, rejects non-owners and
    /// duplicate versions, runs `commit`, then recomputes latest flags.
    fn insert_package(
        &self,
        new: NewPackage,
        publisher: &Principal,
        commit: CommitHook<'_>,
    ) -> Result<Package>;

    /// Change the listing state of a package and recompute latest flags.
    fn set_package_state(
        &self,
        id: &str,
        version: &PackageVersion,
        state: PackageState,
    ) -> Result<Package>;

    /// Every `is_latest` package declaring a dependency on `dep_id`.
    fn list_latest_with_dependency_on(&self, dep_id: &str) -> Result<Vec<DependentCandidate>>;

    /// Append a batch of download events and bump the counters.
    ///
    /// Events for unknown packages are skipped. Returns how many were
    /// recorded.
    fn record_downloads(&self, events: &[DownloadEvent]) -> Result<usize>;

    /// Ids starting with `partial` that have a listed package.
    fn package_ids(&self, partial: &str, include_prerelease: bool, limit: usize)
        -> Result<Vec<String>>;

    /// Listed versions of `id`, ascending.
    fn package_versions(&self, id: &str, include_prerelease: bool)
        -> Result<Vec<PackageVersion>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry {
    registration: Registration,
    /// Sorted by version, ascending.
    packages: Vec<Package>,
}

impl Entry {
    fn package(&self, version: &PackageVersion) -> Option<&Package> {
        self.packages.iter().find(|p| p.version.same_as(version))
    }

    fn package_mut(&mut self, version: &PackageVersion) -> Option<&mut Package> {
        self.packages.iter_mut().find(|p| p.version.same_as(version))
    }

    /// Re-derive `is_latest` and `is_latest_stable` from the listed packages.
    fn recompute_latest(&mut self) {
        let latest = self
            .packages
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_listed())
            .max_by(|a, b| a.1.version.cmp(&b.1.version))
            .map(|(i, _)| i);
        let latest_stable = self
            .packages
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_listed() && !p.is_prerelease())
            .max_by(|a, b| a.1.version.cmp(&b.1.version))
            .map(|(i, _)| i);

        for (i, package) in self.packages.iter_mut().enumerate() {
            package.is_latest = Some(i) == latest;
            package.is_latest_stable = Some(i) == latest_stable;
        }
    }

    fn has_listed(&self, include_prerelease: bool) -> bool {
        self.packages
            .iter()
            .any(|p| p.is_listed() && (include_prerelease || !p.is_prerelease()))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogState {
    /// Keyed by normalized id.
    #[serde(default)]
    registrations: BTreeMap<String, Entry>,
}

impl CatalogState {
    /// Count one download. False when the package is unknown.
    fn bump_download(&mut self, event: &DownloadEvent) -> bool {
        let Some(entry) = self.registrations.get_mut(&normalize_id(&event.id)) else {
            return false;
        };
        let Some(package) = entry.package_mut(&event.version) else {
            return false;
        };
        package.download_count += 1;
        entry.registration.download_count += 1;
        true
    }
}

/// Where download events end up.
#[derive(Debug)]
enum DownloadLog {
    Memory(Vec<DownloadEvent>),
    /// One JSON event per line.
    File(PathBuf),
}

impl Default for DownloadLog {
    fn default() -> Self {
        DownloadLog::Memory(Vec::new())
    }
}

impl DownloadLog {
    fn append(&mut self, events: &[&DownloadEvent]) -> Result<()> {
        match self {
            DownloadLog::Memory(log) => log.extend(events.iter().map(|&e| e.clone())),
            DownloadLog::File(path) => {
                let mut lines = String::new();
                for event in events {
                    lines.push_str(&serde_json::to_string(event)?);
                    lines.push('\n');
                }
                if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(dir)?;
                }
                let mut file = std::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)?;
                file.write_all(lines.as_bytes())?;
            }
        }
        Ok(())
    }

    fn read(&self) -> Result<Vec<DownloadEvent>> {
        match self {
            DownloadLog::Memory(log) => Ok(log.clone()),
            DownloadLog::File(path) if path.is_file() => std::fs::read_to_string(path)?
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| serde_json::from_str(line).map_err(RegistryError::from))
                .collect(),
            DownloadLog::File(_) => Ok(Vec::new()),
        }
    }
}

/// An in-memory catalog with an optional JSON snapshot.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    state: RwLock<CatalogState>,
    snapshot: Option<PathBuf>,
    /// Orders snapshot writes. Always taken before `state`.
    persist_lock: Mutex<()>,
    downloads: Mutex<DownloadLog>,
}

impl MemoryCatalog {
    /// Create an empty catalog that is never written to disk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a catalog mirrored to `path`, loading it if the file exists.
    ///
    /// Download events go to a sibling `<stem>.downloads.jsonl` file.
    pub fn open(path: &Path) -> Result<Self> {
        let state = if path.is_file() {
            let data = std::fs::read_to_string(path)?;
            serde_json::from_str(&data)?
        } else {
            CatalogState::default()
        };
        Ok(MemoryCatalog {
            state: RwLock::new(state),
            snapshot: Some(path.to_path_buf()),
            persist_lock: Mutex::new(()),
            downloads: Mutex::new(DownloadLog::File(path.with_extension("downloads.jsonl"))),
        })
    }

    /// All download events recorded so far.
    pub fn download_log(&self) -> Result<Vec<DownloadEvent>> {
        self.downloads.lock().read()
    }

    /// Every package of `id`, ascending by version.
    pub fn packages_of(&self, id: &str) -> Vec<Package> {
        self.state
            .read()
            .registrations
            .get(&normalize_id(id))
            .map(|e| e.packages.clone())
            .unwrap_or_default()
    }

    /// Write `state` to the snapshot. Callers hold `persist_lock`.
    fn persist(&self, state: &CatalogState) -> Result<()> {
        if self.snapshot.is_none() {
            return Ok(());
        }
        let data = serde_json::to_vec_pretty(state)?;
        self.write_snapshot(&data)
    }

    fn write_snapshot(&self, data: &[u8]) -> Result<()> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)?;
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(data)?;
        file.persist(path).map_err(|e| RegistryError::Io(e.error))?;
        Ok(())
    }

    /// Persist, restoring `key`'s previous entry if the write fails.
    fn persist_or_restore(
        &self,
        state: &mut CatalogState,
        key: &str,
        previous: Option<Entry>,
    ) -> Result<()> {
        if let Err(e) = self.persist(state) {
            match previous {
                Some(entry) => state.registrations.insert(key.to_string(), entry),
                None => state.registrations.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }
}

impl CatalogStore for MemoryCatalog {
    fn find_registration(&self, id: &str) -> Result<Option<Registration>> {
        let state = self.state.read();
        Ok(state
            .registrations
            .get(&normalize_id(id))
            .map(|e| e.registration.clone()))
    }

    fn find_package(&self, id: &str, version: &PackageVersion) -> Result<Option<Package>> {
        let state = self.state.read();
        Ok(state
            .registrations
            .get(&normalize_id(id))
            .and_then(|e| e.package(version))
            .cloned())
    }

    fn find_latest(&self, id: &str, include_prerelease: bool) -> Result<Option<Package>> {
        let state = self.state.read();
        Ok(state.registrations.get(&normalize_id(id)).and_then(|e| {
            e.packages
                .iter()
                .find(|p| {
                    if include_prerelease {
                        p.is_latest
                    } else {
                        p.is_latest_stable
                    }
                })
                .cloned()
        }))
    }

    fn insert_package(
        &self,
        new: NewPackage,
        publisher: &Principal,
        commit: CommitHook<'_>,
    ) -> Result<Package> {
        let key = normalize_id(&new.id);
        let _persist = self.persist_lock.lock();
        let mut state = self.state.write();
        let previous = state.registrations.get(&key).cloned();

        if let Some(entry) = &previous {
            if !entry.registration.is_owned_by(&publisher.username) {
                return Err(RegistryError::Forbidden {
                    action: Action::Push,
                    id: entry.registration.id.clone(),
                });
            }
            if entry.package(&new.version).is_some() {
                return Err(RegistryError::VersionConflict {
                    id: entry.registration.id.clone(),
                    version: new.version.to_string(),
                });
            }
        }

        let first_id = new.id.clone();
        let package = new.into_package(
            previous
                .as_ref()
                .map(|e| e.registration.id.clone())
                .unwrap_or_else(|| first_id.clone()),
        );

        commit(&package)?;

        let entry = state.registrations.entry(key.clone()).or_insert_with(|| Entry {
            registration: Registration::new(first_id, publisher.username.clone()),
            packages: Vec::new(),
        });
        let position = entry.packages.partition_point(|p| p.version < package.version);
        entry.packages.insert(position, package);
        entry.recompute_latest();
        let inserted = entry.packages[position].clone();

        self.persist_or_restore(&mut state, &key, previous)?;
        Ok(inserted)
    }

    fn set_package_state(
        &self,
        id: &str,
        version: &PackageVersion,
        new_state: PackageState,
    ) -> Result<Package> {
        let key = normalize_id(id);
        let _persist = self.persist_lock.lock();
        let mut state = self.state.write();
        let previous = state.registrations.get(&key).cloned();
        let not_found = || RegistryError::NotFound {
            id: id.to_string(),
            version: Some(version.to_string()),
        };

        let entry = state.registrations.get_mut(&key).ok_or_else(not_found)?;
        entry.package_mut(version).ok_or_else(not_found)?.state = new_state;
        entry.recompute_latest();
        let updated = entry.package(version).cloned().ok_or_else(not_found)?;

        self.persist_or_restore(&mut state, &key, previous)?;
        Ok(updated)
    }

    fn list_latest_with_dependency_on(&self, dep_id: &str) -> Result<Vec<DependentCandidate>> {
        let state = self.state.read();
        Ok(state
            .registrations
            .values()
            .flat_map(|entry| {
                entry
                    .packages
                    .iter()
                    .filter(|p| p.is_latest && p.dependency_on(dep_id).is_some())
                    .map(|p| DependentCandidate {
                        package: p.clone(),
                        registration_id: entry.registration.id.clone(),
                        registration_downloads: entry.registration.download_count,
                    })
            })
            .collect())
    }

    fn record_downloads(&self, events: &[DownloadEvent]) -> Result<usize> {
        let _persist = self.persist_lock.lock();
        let recorded: Vec<&DownloadEvent> = {
            let mut state = self.state.write();
            events
                .iter()
                .filter(|event| {
                    let known = state.bump_download(event);
                    if !known {
                        tracing::debug!(id = %event.id, version = %event.version, "download of unknown package skipped");
                    }
                    known
                })
                .collect()
        };
        if recorded.is_empty() {
            return Ok(0);
        }

        self.downloads.lock().append(&recorded)?;
        if self.snapshot.is_some() {
            // Serialize under a read lock; the file write holds no catalog lock.
            let data = serde_json::to_vec_pretty(&*self.state.read())?;
            self.write_snapshot(&data)?;
        }
        Ok(recorded.len())
    }

    fn package_ids(
        &self,
        partial: &str,
        include_prerelease: bool,
        limit: usize,
    ) -> Result<Vec<String>> {
        let prefix = normalize_id(partial);
        let state = self.state.read();
        Ok(state
            .registrations
            .iter()
            .filter(|(key, entry)| key.starts_with(&prefix) && entry.has_listed(include_prerelease))
            .map(|(_, entry)| entry.registration.id.clone())
            .take(limit)
            .collect())
    }

    fn package_versions(
        &self,
        id: &str,
        include_prerelease: bool,
    ) -> Result<Vec<PackageVersion>> {
        let state = self.state.read();
        Ok(state
            .registrations
            .get(&normalize_id(id))
            .map(|entry| {
                entry
                    .packages
                    .iter()
                    .filter(|p| p.is_listed() && (include_prerelease || !p.is_prerelease()))
                    .map(|p| p.version.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}
