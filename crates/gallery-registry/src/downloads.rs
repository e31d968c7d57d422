//! Best-effort download recording.
//!
//! Events go through a bounded queue drained by a background thread, so a
//! resolve never waits on the catalog's write lock. When the queue is full
//! the event is dropped. The worker hands the catalog whatever is pending as
//! one batch, so snapshot writes scale with batches rather than events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use gallery_core::DownloadEvent;
use parking_lot::Mutex;

use crate::catalog::CatalogStore;
use crate::error::Result;

/// Most events handed to the catalog at once.
pub const MAX_BATCH: usize = 256;

/// Asynchronous sink for download events.
pub struct DownloadRecorder {
    sender: Mutex<Option<SyncSender<DownloadEvent>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    dropped: Arc<AtomicU64>,
}

impl DownloadRecorder {
    /// Start a worker that appends batches of events to `catalog`.
    ///
    /// `capacity` is clamped to at least one pending event.
    pub fn spawn(catalog: Arc<dyn CatalogStore>, capacity: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<DownloadEvent>(capacity.max(1));
        let worker = std::thread::Builder::new()
            .name("gallery-downloads".to_string())
            .spawn(move || {
                for first in &receiver {
                    let mut batch = vec![first];
                    batch.extend(receiver.try_iter().take(MAX_BATCH - 1));
                    match catalog.record_downloads(&batch) {
                        Ok(recorded) => tracing::trace!(
                            received = batch.len(),
                            recorded,
                            "download batch recorded"
                        ),
                        Err(e) => tracing::warn!(
                            events = batch.len(),
                            error = %e,
                            "failed to record downloads"
                        ),
                    }
                }
            })?;

        Ok(DownloadRecorder {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Queue an event without blocking. Returns whether it was accepted.
    pub fn submit(&self, event: DownloadEvent) -> bool {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        match sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(id = %event.id, version = %event.version, "download queue full, event dropped");
                false
            }
            Err(TrySendError::Disconnected(event)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(id = %event.id, version = %event.version, "download worker gone, event dropped");
                false
            }
        }
    }

    /// Number of events dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting events and wait for the queue to drain.
    pub fn close(&self) {
        drop(self.sender.lock().take());
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                tracing::error!("download worker panicked");
            }
        }
    }
}

impl Drop for DownloadRecorder {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for DownloadRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadRecorder")
            .field("dropped", &self.dropped())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{MemoryCatalog, NewPackage};
    use gallery_core::{ApiKey, ArtifactDigest, PackageVersion, Principal};

    fn catalog_with_package() -> Arc<MemoryCatalog> {
        let catalog = Arc::new(MemoryCatalog::new());
        let owner = Principal {
            username: "alice".into(),
            api_key: ApiKey::generate(),
        };
        catalog
            .insert_package(
                NewPackage {
                    id: "A".into(),
                    version: PackageVersion::new(1, 0, 0),
                    external_url: None,
                    dependencies: Vec::new(),
                    digest: ArtifactDigest::of(b"a"),
                    description: None,
                    authors: Vec::new(),
                },
                &owner,
                &|_| Ok(()),
            )
            .unwrap();
        catalog
    }

    fn event(n: u64) -> DownloadEvent {
        DownloadEvent {
            id: "A".into(),
            version: PackageVersion::new(1, 0, 0),
            address: "127.0.0.1".into(),
            agent: "test".into(),
            timestamp: n,
        }
    }

    #[test]
    fn events_are_drained_on_close() {
        let catalog = catalog_with_package();
        let recorder = DownloadRecorder::spawn(catalog.clone(), 64).unwrap();
        for n in 0..10 {
            assert!(recorder.submit(event(n)));
        }
        recorder.close();

        assert_eq!(catalog.download_log().unwrap().len(), 10);
        assert_eq!(recorder.dropped(), 0);
    }

    #[test]
    fn burst_larger_than_a_batch_is_fully_recorded() {
        let catalog = catalog_with_package();
        let recorder = DownloadRecorder::spawn(catalog.clone(), MAX_BATCH * 3).unwrap();
        let total = MAX_BATCH * 2 + 7;
        for n in 0..total {
            assert!(recorder.submit(event(n as u64)));
        }
        recorder.close();

        let log = catalog.download_log().unwrap();
        assert_eq!(log.len(), total);
        assert_eq!(log.last().unwrap().timestamp, total as u64 - 1);
        assert_eq!(
            catalog.find_registration("a").unwrap().unwrap().download_count,
            total as u64
        );
    }

    #[test]
    fn submit_after_close_is_dropped() {
        let recorder = DownloadRecorder::spawn(catalog_with_package(), 1).unwrap();
        recorder.close();
        assert!(!recorder.submit(event(0)));
        assert_eq!(recorder.dropped(), 1);
    }

    #[test]
    fn unknown_package_does_not_stop_worker() {
        let catalog = catalog_with_package();
        let recorder = DownloadRecorder::spawn(catalog.clone(), 8).unwrap();
        let mut ghost = event(0);
        ghost.id = "ghost".into();
        recorder.submit(ghost);
        recorder.submit(event(1));
        recorder.close();
        assert_eq!(catalog.download_log().unwrap().len(), 1);
    }
}
