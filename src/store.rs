//! Persistence of merged records.
//!
//! The pipeline needs very little from storage: look a record up by key and
//! create-or-update it. [`RecordStore`] is that surface, keyed on
//! `(model, filename)` so that re-processing a datasheet replaces its
//! previous record instead of duplicating it.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`] keeps everything in process memory. Tests and one-shot
//!   CLI runs use it.
//! - [`JsonFileStore`] keeps a single JSON file with a
//!   `sensor_specifications` collection and an `uploads` collection of
//!   per-page audit documents. Every write goes to a temp file first and is
//!   then renamed over the original, so a crash never leaves a half-written
//!   file behind.
//!
//! Both are internally synchronised and can be shared between concurrent
//! runs behind an `Arc`.

use crate::error::StoreError;
use crate::record::MergedRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

/// Identity of a persisted record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub model: String,
    pub filename: String,
}

impl RecordKey {
    pub fn new(model: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            filename: filename.into(),
        }
    }

    /// The key a stored record answers to, if it carries both parts.
    pub fn of(record: &MergedRecord) -> Option<Self> {
        match (&record.model, &record.source) {
            (Some(model), Some(source)) => Some(Self::new(model.clone(), source.filename.clone())),
            _ => None,
        }
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// How sure the pipeline is about a page's contribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// The page's record named a model.
    High,
    /// The page yielded a record without a model.
    Medium,
}

/// Raw-text audit document for one page of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageAuditRecord {
    pub upload_id: String,
    pub filename: String,
    pub page_number: usize,
    pub text: String,
    pub text_snippet: String,
    pub extraction_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction_confidence: Option<Confidence>,
    pub processed_at: DateTime<Utc>,
}

/// Keyed create-or-update storage for merged records.
///
/// A record is only accepted under the key it answers to: its `model` and
/// `source.filename` must equal the key's parts, otherwise the write fails
/// with [`StoreError::KeyMismatch`] and nothing is stored.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &RecordKey) -> Result<Option<MergedRecord>, StoreError>;

    /// Insert `record` under `key`, or replace what is there.
    ///
    /// Returns [`UpsertOutcome::Unchanged`] when the stored document is
    /// identical to `record`.
    async fn upsert(&self, key: &RecordKey, record: &MergedRecord) -> Result<UpsertOutcome, StoreError>;

    /// Append per-page audit documents.
    async fn insert_page_audit(&self, pages: &[PageAuditRecord]) -> Result<(), StoreError>;

    /// Upsert `record` and append `pages` as one write.
    ///
    /// The bundled stores apply both or neither. The default runs the upsert
    /// first, so a failed upsert never leaves audit documents behind.
    async fn upsert_with_audit(
        &self,
        key: &RecordKey,
        record: &MergedRecord,
        pages: &[PageAuditRecord],
    ) -> Result<UpsertOutcome, StoreError> {
        let outcome = self.upsert(key, record).await?;
        self.insert_page_audit(pages).await?;
        Ok(outcome)
    }
}

fn same_document(a: &MergedRecord, b: &MergedRecord) -> bool {
    a.to_document() == b.to_document()
}

fn check_key(key: &RecordKey, record: &MergedRecord) -> Result<(), StoreError> {
    if RecordKey::of(record).as_ref() == Some(key) {
        Ok(())
    } else {
        Err(StoreError::KeyMismatch {
            model: key.model.clone(),
            filename: key.filename.clone(),
        })
    }
}

// ── MemoryStore ──────────────────────────────────────────────────────────────

/// Process-local [`RecordStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<RecordKey, MergedRecord>>,
    audits: RwLock<Vec<PageAuditRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Snapshot of every stored record, ordered by key.
    pub async fn records(&self) -> Vec<MergedRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Snapshot of the audit documents, in insertion order.
    pub async fn page_audits(&self) -> Vec<PageAuditRecord> {
        self.audits.read().await.clone()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<MergedRecord>, StoreError> {
        Ok(self.records.read().await.get(key).cloned())
    }

    async fn upsert(&self, key: &RecordKey, record: &MergedRecord) -> Result<UpsertOutcome, StoreError> {
        check_key(key, record)?;
        let mut records = self.records.write().await;
        Ok(upsert_entry(&mut records, key, record))
    }

    async fn insert_page_audit(&self, pages: &[PageAuditRecord]) -> Result<(), StoreError> {
        self.audits.write().await.extend_from_slice(pages);
        Ok(())
    }

    async fn upsert_with_audit(
        &self,
        key: &RecordKey,
        record: &MergedRecord,
        pages: &[PageAuditRecord],
    ) -> Result<UpsertOutcome, StoreError> {
        check_key(key, record)?;
        let mut records = self.records.write().await;
        let mut audits = self.audits.write().await;
        let outcome = upsert_entry(&mut records, key, record);
        audits.extend_from_slice(pages);
        Ok(outcome)
    }
}

fn upsert_entry(
    records: &mut BTreeMap<RecordKey, MergedRecord>,
    key: &RecordKey,
    record: &MergedRecord,
) -> UpsertOutcome {
    let outcome = match records.get(key) {
        None => UpsertOutcome::Inserted,
        Some(existing) if same_document(existing, record) => return UpsertOutcome::Unchanged,
        Some(_) => UpsertOutcome::Updated,
    };
    records.insert(key.clone(), record.clone());
    outcome
}

// ── JsonFileStore ────────────────────────────────────────────────────────────

/// On-disk layout of a [`JsonFileStore`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct Collections {
    #[serde(default)]
    sensor_specifications: Vec<MergedRecord>,
    #[serde(default)]
    uploads: Vec<PageAuditRecord>,
}

/// [`RecordStore`] persisted to a single JSON file.
///
/// Documents are matched by their own `model` and `source.filename`, which
/// the key check guarantees to equal the key they were written under.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (or lazily create) the store at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Collections, StoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Collections::default()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Collections::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Atomic write: write to temp, then rename.
    async fn save(&self, collections: &Collections) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(collections)?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        debug!("Wrote store {}", self.path.display());
        Ok(())
    }
}

impl Collections {
    fn upsert(&mut self, key: &RecordKey, record: &MergedRecord) -> UpsertOutcome {
        let position = self
            .sensor_specifications
            .iter()
            .position(|r| RecordKey::of(r).as_ref() == Some(key));

        match position {
            Some(i) if same_document(&self.sensor_specifications[i], record) => UpsertOutcome::Unchanged,
            Some(i) => {
                self.sensor_specifications[i] = record.clone();
                UpsertOutcome::Updated
            }
            None => {
                self.sensor_specifications.push(record.clone());
                UpsertOutcome::Inserted
            }
        }
    }
}

#[async_trait]
impl RecordStore for JsonFileStore {
    async fn get(&self, key: &RecordKey) -> Result<Option<MergedRecord>, StoreError> {
        let _guard = self.lock.lock().await;
        let collections = self.load().await?;
        Ok(collections
            .sensor_specifications
            .into_iter()
            .find(|r| RecordKey::of(r).as_ref() == Some(key)))
    }

    async fn upsert(&self, key: &RecordKey, record: &MergedRecord) -> Result<UpsertOutcome, StoreError> {
        self.upsert_with_audit(key, record, &[]).await
    }

    async fn insert_page_audit(&self, pages: &[PageAuditRecord]) -> Result<(), StoreError> {
        if pages.is_empty() {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut collections = self.load().await?;
        collections.uploads.extend_from_slice(pages);
        self.save(&collections).await
    }

    /// Both collections go out in a single atomic save.
    async fn upsert_with_audit(
        &self,
        key: &RecordKey,
        record: &MergedRecord,
        pages: &[PageAuditRecord],
    ) -> Result<UpsertOutcome, StoreError> {
        check_key(key, record)?;
        let _guard = self.lock.lock().await;
        let mut collections = self.load().await?;

        let outcome = collections.upsert(key, record);
        if outcome == UpsertOutcome::Unchanged && pages.is_empty() {
            return Ok(outcome);
        }
        collections.uploads.extend_from_slice(pages);
        self.save(&collections).await?;
        Ok(outcome)
    }
}
