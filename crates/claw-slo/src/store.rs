//! Object store ports and an in-memory implementation.
//!
//! The reconciler talks to two stores:
//! - [`SourceStore`]: where [`ServiceLevelObjective`] objects live and where
//!   their status is written
//! - [`RuleStore`]: where the generated [`RuleDocument`]s live
//!
//! [`InMemoryStore`] implements both with API-server-like semantics: uids are
//! assigned on create, `generation` only moves when the spec changes, and
//! every write bumps a store-wide resource version that replaces must match.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;
use crate::target::{RuleDocument, TargetFormat};
use crate::types::{KIND, ObjectKey, ServiceLevelObjective};

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Read access to source objects and write access to their status.
pub trait SourceStore: Send + Sync {
    /// Fetches a source object, `None` if it does not exist.
    fn get_source(
        &self,
        key: &ObjectKey,
    ) -> impl Future<Output = StoreResult<Option<ServiceLevelObjective>>> + Send;

    /// Replaces the status of a source object.
    ///
    /// Only `status` is taken from `source`. The write fails with
    /// `StoreError::Conflict` if `source.metadata.resource_version` is stale.
    fn replace_status(
        &self,
        source: &ServiceLevelObjective,
    ) -> impl Future<Output = StoreResult<ServiceLevelObjective>> + Send;
}

/// Access to generated rule documents.
pub trait RuleStore: Send + Sync {
    /// Fetches a rule document, `None` if it does not exist.
    fn get_document(
        &self,
        format: TargetFormat,
        key: &ObjectKey,
    ) -> impl Future<Output = StoreResult<Option<RuleDocument>>> + Send;

    /// Creates a rule document.
    ///
    /// Fails with `StoreError::AlreadyExists` if the key is taken.
    fn create_document(
        &self,
        document: RuleDocument,
    ) -> impl Future<Output = StoreResult<RuleDocument>> + Send;

    /// Replaces a rule document as a whole.
    ///
    /// Fails with `StoreError::NotFound` if the document does not exist and
    /// with `StoreError::Conflict` if its resource version is stale.
    fn replace_document(
        &self,
        document: RuleDocument,
    ) -> impl Future<Output = StoreResult<RuleDocument>> + Send;
}

/// Write counters of an [`InMemoryStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteStats {
    /// Documents created.
    pub creates: u64,
    /// Documents replaced.
    pub replaces: u64,
    /// Status writes.
    pub status_writes: u64,
}

/// Thread-safe in-memory object store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    /// Source objects keyed by namespace/name.
    sources: Arc<RwLock<HashMap<ObjectKey, ServiceLevelObjective>>>,
    /// Rule documents keyed by format and namespace/name.
    documents: Arc<RwLock<HashMap<(TargetFormat, ObjectKey), RuleDocument>>>,
    /// Store-wide revision used as resource version.
    revision: AtomicU64,
    /// Write counters.
    stats: Arc<RwLock<WriteStats>>,
    /// Error returned by the next document writes, if set.
    document_failure: Arc<RwLock<Option<StoreError>>>,
    /// Error returned by the next status writes, if set.
    status_failure: Arc<RwLock<Option<StoreError>>>,
    /// Error returned by the next source reads, if set.
    source_read_failure: Arc<RwLock<Option<StoreError>>>,
    /// Error returned by the next document reads, if set.
    document_read_failure: Arc<RwLock<Option<StoreError>>>,
    /// Bump the document's version right after the next document read.
    concurrent_write: AtomicBool,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_revision(&self) -> String {
        (self.revision.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Creates or updates a source object, as a user would with `apply`.
    ///
    /// A new object gets a uid and generation 1. An update keeps the uid and
    /// status and bumps the generation only if the spec changed.
    pub fn apply_source(&self, mut source: ServiceLevelObjective) -> ServiceLevelObjective {
        let key = source.key();
        let mut sources = self.sources.write();

        match sources.get(&key) {
            Some(existing) => {
                source.metadata.uid = existing.metadata.uid.clone();
                source.metadata.generation = if existing.spec == source.spec {
                    existing.metadata.generation
                } else {
                    existing.metadata.generation + 1
                };
                source.status = existing.status.clone();
            }
            None => {
                source.metadata.uid = Uuid::new_v4().to_string();
                source.metadata.generation = 1;
            }
        }
        source.metadata.resource_version = self.next_revision();

        debug!(
            key = %key,
            generation = source.metadata.generation,
            "applied source object"
        );
        sources.insert(key, source.clone());
        source
    }

    /// Removes a source object. Owned documents are left to the platform.
    pub fn delete_source(&self, key: &ObjectKey) -> bool {
        self.sources.write().remove(key).is_some()
    }

    /// Returns all source objects sorted by key.
    #[must_use]
    pub fn list_sources(&self) -> Vec<ServiceLevelObjective> {
        let mut sources: Vec<_> = self.sources.read().values().cloned().collect();
        sources.sort_by_key(ServiceLevelObjective::key);
        sources
    }

    /// Returns all documents of a format sorted by key.
    #[must_use]
    pub fn list_documents(&self, format: TargetFormat) -> Vec<RuleDocument> {
        let mut documents: Vec<_> = self
            .documents
            .read()
            .iter()
            .filter(|((f, _), _)| *f == format)
            .map(|(_, document)| document.clone())
            .collect();
        documents.sort_by_key(RuleDocument::key);
        documents
    }

    /// Returns the number of stored documents of all formats.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns the write counters.
    #[must_use]
    pub fn stats(&self) -> WriteStats {
        *self.stats.read()
    }

    /// Makes document writes fail with `error` until cleared with `None`.
    pub fn fail_document_writes(&self, error: Option<StoreError>) {
        *self.document_failure.write() = error;
    }

    /// Makes status writes fail with `error` until cleared with `None`.
    pub fn fail_status_writes(&self, error: Option<StoreError>) {
        *self.status_failure.write() = error;
    }

    /// Makes source reads fail with `error` until cleared with `None`.
    pub fn fail_source_reads(&self, error: Option<StoreError>) {
        *self.source_read_failure.write() = error;
    }

    /// Makes document reads fail with `error` until cleared with `None`.
    pub fn fail_document_reads(&self, error: Option<StoreError>) {
        *self.document_read_failure.write() = error;
    }

    /// Simulates another writer touching the document fetched by the next
    /// document read.
    ///
    /// The read returns the document as it was, then the stored copy gets a
    /// new resource version, so a replace based on the read conflicts.
    pub fn write_after_next_document_read(&self) {
        self.concurrent_write.store(true, Ordering::SeqCst);
    }

    fn check_document_failure(&self) -> StoreResult<()> {
        self.document_failure.read().clone().map_or(Ok(()), Err)
    }
}

impl SourceStore for InMemoryStore {
    async fn get_source(&self, key: &ObjectKey) -> StoreResult<Option<ServiceLevelObjective>> {
        if let Some(err) = self.source_read_failure.read().clone() {
            return Err(err);
        }
        Ok(self.sources.read().get(key).cloned())
    }

    async fn replace_status(
        &self,
        source: &ServiceLevelObjective,
    ) -> StoreResult<ServiceLevelObjective> {
        if let Some(err) = self.status_failure.read().clone() {
            return Err(err);
        }

        let key = source.key();
        let mut sources = self.sources.write();
        let stored = sources
            .get_mut(&key)
            .ok_or_else(|| StoreError::not_found(KIND, &key))?;

        if stored.metadata.resource_version != source.metadata.resource_version {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: source.metadata.resource_version.clone(),
                actual: stored.metadata.resource_version.clone(),
            });
        }

        stored.status = source.status.clone();
        stored.metadata.resource_version = self.next_revision();
        self.stats.write().status_writes += 1;

        Ok(stored.clone())
    }
}

impl RuleStore for InMemoryStore {
    async fn get_document(
        &self,
        format: TargetFormat,
        key: &ObjectKey,
    ) -> StoreResult<Option<RuleDocument>> {
        if let Some(err) = self.document_read_failure.read().clone() {
            return Err(err);
        }

        let mut documents = self.documents.write();
        let Some(stored) = documents.get_mut(&(format, key.clone())) else {
            return Ok(None);
        };
        let found = stored.clone();

        if self.concurrent_write.swap(false, Ordering::SeqCst) {
            stored.metadata_mut().resource_version = self.next_revision();
            debug!(key = %key, "concurrent write to rule document");
        }

        Ok(Some(found))
    }

    async fn create_document(&self, mut document: RuleDocument) -> StoreResult<RuleDocument> {
        self.check_document_failure()?;

        let format = document.format();
        let key = document.key();
        let mut documents = self.documents.write();

        if documents.contains_key(&(format, key.clone())) {
            return Err(StoreError::AlreadyExists {
                kind: format.kind().to_string(),
                key: key.to_string(),
            });
        }

        let metadata = document.metadata_mut();
        metadata.uid = Uuid::new_v4().to_string();
        metadata.generation = 1;
        metadata.resource_version = self.next_revision();

        documents.insert((format, key), document.clone());
        self.stats.write().creates += 1;

        Ok(document)
    }

    async fn replace_document(&self, mut document: RuleDocument) -> StoreResult<RuleDocument> {
        self.check_document_failure()?;

        let format = document.format();
        let key = document.key();
        let mut documents = self.documents.write();

        let stored = documents
            .get(&(format, key.clone()))
            .ok_or_else(|| StoreError::not_found(format.kind(), &key))?;

        if stored.metadata().resource_version != document.metadata().resource_version {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected: document.metadata().resource_version.clone(),
                actual: stored.metadata().resource_version.clone(),
            });
        }

        let uid = stored.metadata().uid.clone();
        let generation = if stored.same_spec(&document) {
            stored.metadata().generation
        } else {
            stored.metadata().generation + 1
        };

        let metadata = document.metadata_mut();
        metadata.uid = uid;
        metadata.generation = generation;
        metadata.resource_version = self.next_revision();

        documents.insert((format, key), document.clone());
        self.stats.write().replaces += 1;

        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Sli, Slo};

    fn source() -> ServiceLevelObjective {
        ServiceLevelObjective::new("default", "api").with_slo(Slo {
            name: "availability".to_string(),
            objective: "99".to_string(),
            sli: Sli {
                total_query: "t[${window}]".to_string(),
                error_query: "e[${window}]".to_string(),
            },
            ..Slo::default()
        })
    }

    mod sources {
        use super::*;

        #[test]
        fn apply_assigns_uid_and_generation() {
            let store = InMemoryStore::new();
            let created = store.apply_source(source());
            assert!(!created.metadata.uid.is_empty());
            assert_eq!(created.metadata.generation, 1);
            assert_eq!(created.metadata.resource_version, "1");
        }

        #[test]
        fn generation_moves_only_on_spec_change() {
            let store = InMemoryStore::new();
            let first = store.apply_source(source());
            let same = store.apply_source(source().with_label("team", "sre"));
            assert_eq!(same.metadata.generation, 1);
            assert_eq!(same.metadata.uid, first.metadata.uid);

            let mut changed = source();
            changed.spec.slos[0].objective = "99.9".to_string();
            let changed = store.apply_source(changed);
            assert_eq!(changed.metadata.generation, 2);
        }

        #[test]
        fn delete_and_list() {
            let store = InMemoryStore::new();
            store.apply_source(source());
            store.apply_source(ServiceLevelObjective::new("default", "web"));
            assert_eq!(store.list_sources().len(), 2);
            assert!(store.delete_source(&ObjectKey::new("default", "api")));
            assert!(!store.delete_source(&ObjectKey::new("default", "api")));
            assert_eq!(store.list_sources()[0].metadata.name, "web");
        }

        #[tokio::test]
        async fn status_write_requires_current_version() {
            let store = InMemoryStore::new();
            let stale = store.apply_source(source());
            let current = store.apply_source(source());

            let result = store.replace_status(&stale).await;
            assert!(matches!(result, Err(StoreError::Conflict { .. })));

            let updated = store.replace_status(&current).await.unwrap();
            assert_ne!(updated.metadata.resource_version, current.metadata.resource_version);
            assert_eq!(updated.metadata.generation, current.metadata.generation);
            assert_eq!(store.stats().status_writes, 1);
        }

        #[tokio::test]
        async fn status_write_of_missing_source() {
            let store = InMemoryStore::new();
            let result = store.replace_status(&source()).await;
            assert!(matches!(result, Err(StoreError::NotFound { .. })));
        }
    }

    mod documents {
        use super::*;

        fn document(source: &ServiceLevelObjective) -> RuleDocument {
            TargetFormat::Prometheus.emit(source, &[])
        }

        #[tokio::test]
        async fn create_then_get() {
            let store = InMemoryStore::new();
            let created = store.create_document(document(&source())).await.unwrap();
            assert!(!created.metadata().resource_version.is_empty());

            let key = ObjectKey::new("default", "api");
            let found = store.get_document(TargetFormat::Prometheus, &key).await.unwrap();
            assert_eq!(found, Some(created));

            let other = store
                .get_document(TargetFormat::VictoriaMetrics, &key)
                .await
                .unwrap();
            assert!(other.is_none());
        }

        #[tokio::test]
        async fn create_twice_fails() {
            let store = InMemoryStore::new();
            store.create_document(document(&source())).await.unwrap();
            let result = store.create_document(document(&source())).await;
            assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
            assert_eq!(store.document_count(), 1);
        }

        #[tokio::test]
        async fn replace_checks_resource_version() {
            let store = InMemoryStore::new();
            let created = store.create_document(document(&source())).await.unwrap();

            let stale = document(&source());
            let result = store.replace_document(stale).await;
            assert!(matches!(result, Err(StoreError::Conflict { .. })));

            let mut fresh = document(&source());
            fresh.metadata_mut().resource_version = created.metadata().resource_version.clone();
            let replaced = store.replace_document(fresh).await.unwrap();
            assert_eq!(replaced.metadata().uid, created.metadata().uid);
            assert_eq!(store.stats().replaces, 1);
        }

        #[tokio::test]
        async fn replace_missing_fails() {
            let store = InMemoryStore::new();
            let result = store.replace_document(document(&source())).await;
            assert!(matches!(result, Err(StoreError::NotFound { .. })));
        }

        #[tokio::test]
        async fn injected_failure() {
            let store = InMemoryStore::new();
            store.fail_document_writes(Some(StoreError::Unavailable("down".to_string())));
            let result = store.create_document(document(&source())).await;
            assert!(matches!(result, Err(StoreError::Unavailable(_))));

            store.fail_document_writes(None);
            assert!(store.create_document(document(&source())).await.is_ok());
        }

        #[tokio::test]
        async fn injected_read_failures() {
            let store = InMemoryStore::new();
            store.apply_source(source());
            let key = ObjectKey::new("default", "api");

            store.fail_source_reads(Some(StoreError::Unavailable("down".to_string())));
            store.fail_document_reads(Some(StoreError::Unavailable("down".to_string())));
            assert!(matches!(store.get_source(&key).await, Err(StoreError::Unavailable(_))));
            assert!(matches!(
                store.get_document(TargetFormat::Prometheus, &key).await,
                Err(StoreError::Unavailable(_))
            ));

            store.fail_source_reads(None);
            store.fail_document_reads(None);
            assert!(store.get_source(&key).await.unwrap().is_some());
            assert!(store.get_document(TargetFormat::Prometheus, &key).await.unwrap().is_none());
        }

        #[tokio::test]
        async fn write_after_read_makes_replace_conflict() {
            let store = InMemoryStore::new();
            store.create_document(document(&source())).await.unwrap();
            let key = ObjectKey::new("default", "api");

            store.write_after_next_document_read();
            let fetched = store
                .get_document(TargetFormat::Prometheus, &key)
                .await
                .unwrap()
                .unwrap();

            let result = store.replace_document(fetched.clone()).await;
            assert!(matches!(result, Err(StoreError::Conflict { .. })));

            let current = store
                .get_document(TargetFormat::Prometheus, &key)
                .await
                .unwrap()
                .unwrap();
            assert_ne!(current.metadata().resource_version, fetched.metadata().resource_version);
            assert!(store.replace_document(current).await.is_ok());
        }
    }
}
