use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

use crate::error::StoreError;

/// A finished conversion and the audio file it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub id: String,
    pub title: String,
    pub file_name: String,
    pub output_path: PathBuf,
    pub created_at: DateTime<Utc>,
}

/// Registry of finished conversions. Cloning yields another handle to the
/// same records.
#[derive(Debug, Clone, Default)]
pub struct ConversionStore {
    records: Arc<RwLock<Vec<ConversionRecord>>>,
}

impl ConversionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: ConversionRecord) {
        debug!("Registering conversion {} ({})", record.id, record.title);
        self.records
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    pub fn get(&self, id: &str) -> Option<ConversionRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// All records, oldest first.
    pub fn list(&self) -> Vec<ConversionRecord> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a record and delete its audio file. An unknown id changes
    /// nothing. If the file cannot be deleted the record is kept.
    pub async fn delete(&self, id: &str) -> Result<ConversionRecord, StoreError> {
        let record = self
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        match tokio::fs::remove_file(&record.output_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Audio file for {} was already gone: {}", id, record.output_path.display());
            }
            Err(e) => return Err(e.into()),
        }

        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        records.retain(|r| r.id != id);
        info!("Deleted conversion {} ({})", id, record.title);
        Ok(record)
    }

    /// Load records saved by [`ConversionStore::save`]; a missing file is an
    /// empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read_to_string(path)?;
        let records: Vec<ConversionRecord> = serde_json::from_str(&data)?;
        debug!("Loaded {} conversions from {}", records.len(), path.display());
        Ok(Self {
            records: Arc::new(RwLock::new(records)),
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(&self.list())?;
        fs::write(path, data)?;
        Ok(())
    }
}
