//! JSONL-based storage implementation with in-memory caching.
//!
//! Each collection is one `<collection>.jsonl` file. Reads are served from
//! the cache; every write goes to disk while the cache write lock is held, so
//! concurrent workers never interleave lines.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockWriteGuard};

use serde::{Serialize, de::DeserializeOwned};

use super::traits::{Filter, HasId, Storage};
use crate::error::{RefreshError, Result};

type Collections = HashMap<String, Vec<serde_json::Value>>;

/// JSONL-based storage with in-memory caching.
#[derive(Debug)]
pub struct JsonlStorage {
    base_path: PathBuf,
    cache: RwLock<Collections>,
}

fn record_id(record: &serde_json::Value) -> Option<&str> {
    record.get("id").and_then(|v| v.as_str())
}

impl JsonlStorage {
    /// Create a new JsonlStorage at the given path.
    pub fn new(base_path: impl AsRef<Path>) -> Result<Self> {
        let base_path = base_path.as_ref().to_path_buf();
        fs::create_dir_all(&base_path)?;
        Ok(Self {
            base_path,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Directory holding the collection files.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get the file path for a collection.
    fn collection_path(&self, collection: &str) -> PathBuf {
        self.base_path.join(format!("{}.jsonl", collection))
    }

    fn read_collection(&self, collection: &str) -> Result<Vec<serde_json::Value>> {
        let path = self.collection_path(collection);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                records.push(serde_json::from_str(&line)?);
            }
        }
        Ok(records)
    }

    /// Load a collection into cache if not already loaded.
    fn ensure_loaded(&self, collection: &str) -> Result<()> {
        {
            let cache = self.cache.read().map_err(|e| RefreshError::Storage(e.to_string()))?;
            if cache.contains_key(collection) {
                return Ok(());
            }
        }

        let mut cache = self.write_cache()?;
        if !cache.contains_key(collection) {
            let records = self.read_collection(collection)?;
            cache.insert(collection.to_string(), records);
        }
        Ok(())
    }

    fn write_cache(&self) -> Result<RwLockWriteGuard<'_, Collections>> {
        self.cache.write().map_err(|e| RefreshError::Storage(e.to_string()))
    }

    /// Append a record to the JSONL file.
    fn append_to_file(&self, collection: &str, record: &serde_json::Value) -> Result<()> {
        let path = self.collection_path(collection);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Rewrite the entire collection file.
    fn rewrite_file(&self, collection: &str, records: &[serde_json::Value]) -> Result<()> {
        let path = self.collection_path(collection);
        let mut writer = BufWriter::new(File::create(&path)?);
        for record in records {
            writeln!(writer, "{}", serde_json::to_string(record)?)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn loaded<'a>(cache: &'a mut Collections, collection: &str) -> Result<&'a mut Vec<serde_json::Value>> {
    cache
        .get_mut(collection)
        .ok_or_else(|| RefreshError::Storage(format!("Collection not loaded: {}", collection)))
}

impl Storage for JsonlStorage {
    fn create<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;

        let value = serde_json::to_value(record)?;

        let mut cache = self.write_cache()?;
        let records = loaded(&mut cache, collection)?;
        if records.iter().any(|r| record_id(r) == Some(record.id())) {
            return Err(RefreshError::AlreadyExists(format!("{}/{}", collection, record.id())));
        }

        // Append to file first (source of truth)
        self.append_to_file(collection, &value)?;
        records.push(value);

        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(|e| RefreshError::Storage(e.to_string()))?;
        let records = cache
            .get(collection)
            .ok_or_else(|| RefreshError::Storage(format!("Collection not loaded: {}", collection)))?;

        match records.iter().find(|r| record_id(r) == Some(id)) {
            Some(record) => Ok(Some(serde_json::from_value(record.clone())?)),
            None => Ok(None),
        }
    }

    fn update<T: Serialize + DeserializeOwned + HasId>(&self, collection: &str, id: &str, record: &T) -> Result<()> {
        self.ensure_loaded(collection)?;

        let value = serde_json::to_value(record)?;

        let mut cache = self.write_cache()?;
        let records = loaded(&mut cache, collection)?;
        let slot = records
            .iter_mut()
            .find(|r| record_id(r) == Some(id))
            .ok_or_else(|| RefreshError::Storage(format!("Record not found: {}/{}", collection, id)))?;
        *slot = value;

        self.rewrite_file(collection, records)
    }

    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        self.ensure_loaded(collection)?;

        let mut cache = self.write_cache()?;
        let records = loaded(&mut cache, collection)?;

        let original_len = records.len();
        records.retain(|r| record_id(r) != Some(id));
        if records.len() == original_len {
            return Err(RefreshError::Storage(format!("Record not found: {}/{}", collection, id)));
        }

        self.rewrite_file(collection, records)
    }

    fn query<T: DeserializeOwned>(&self, collection: &str, filters: &[Filter]) -> Result<Vec<T>> {
        self.ensure_loaded(collection)?;

        let cache = self.cache.read().map_err(|e| RefreshError::Storage(e.to_string()))?;
        let records = cache
            .get(collection)
            .ok_or_else(|| RefreshError::Storage(format!("Collection not loaded: {}", collection)))?;

        let mut results = Vec::new();
        for record in records {
            if filters.iter().all(|f| f.matches(record)) {
                results.push(serde_json::from_value(record.clone())?);
            }
        }

        Ok(results)
    }
}
