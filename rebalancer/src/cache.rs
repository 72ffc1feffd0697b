//! Daily price cache: one record per `(ticker, date)`.
//!
//! The resolver reads before any live request and writes only non-zero
//! prices. Stores reject a zero price as well.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use folio::CachedPrice;
use log::warn;
use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// Storage for cached price records.
pub trait PriceCache {
    fn get(&self, ticker: &str, date: NaiveDate) -> Result<Option<CachedPrice>>;

    /// Insert or replace the record for `(record.ticker, record.date)`.
    /// An existing row keeps its `created_at`.
    fn upsert(&mut self, record: CachedPrice) -> Result<()>;
}

fn reject_zero(record: &CachedPrice) -> Result<()> {
    if record.price.is_zero() {
        return Err(Error::Cache(format!(
            "refusing to cache zero price for {} on {}",
            record.ticker, record.date
        )));
    }
    Ok(())
}

fn merge(existing: Option<&CachedPrice>, mut record: CachedPrice) -> CachedPrice {
    if let Some(prev) = existing {
        record.created_at = prev.created_at;
    }
    record
}

/// Process-local cache, mainly for tests and one-shot commands.
#[derive(Debug, Default)]
pub struct MemoryPriceCache {
    rows: FxHashMap<(String, NaiveDate), CachedPrice>,
}

impl MemoryPriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &CachedPrice> {
        self.rows.values()
    }
}

impl PriceCache for MemoryPriceCache {
    fn get(&self, ticker: &str, date: NaiveDate) -> Result<Option<CachedPrice>> {
        Ok(self.rows.get(&(ticker.to_string(), date)).cloned())
    }

    fn upsert(&mut self, record: CachedPrice) -> Result<()> {
        reject_zero(&record)?;
        let key = (record.ticker.clone(), record.date);
        let record = merge(self.rows.get(&key), record);
        self.rows.insert(key, record);
        Ok(())
    }
}

/// JSON file cache keyed by `"TICKER|YYYY-MM-DD"`, rewritten on every upsert.
#[derive(Debug)]
pub struct JsonPriceCache {
    path: PathBuf,
    rows: BTreeMap<String, CachedPrice>,
}

fn key(ticker: &str, date: NaiveDate) -> String {
    format!("{ticker}|{date}")
}

impl JsonPriceCache {
    /// Open the cache file. A missing file starts empty; a corrupt one is
    /// logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rows = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("Ignoring corrupt price cache {}: {e}", path.display());
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(Error::Cache(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        Ok(Self { path, rows })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                Error::Cache(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(&self.rows)
            .map_err(|e| Error::Cache(format!("failed to encode cache: {e}")))?;
        fs::write(&self.path, json)
            .map_err(|e| Error::Cache(format!("failed to write {}: {e}", self.path.display())))
    }
}

impl PriceCache for JsonPriceCache {
    fn get(&self, ticker: &str, date: NaiveDate) -> Result<Option<CachedPrice>> {
        Ok(self.rows.get(&key(ticker, date)).cloned())
    }

    fn upsert(&mut self, record: CachedPrice) -> Result<()> {
        reject_zero(&record)?;
        let k = key(&record.ticker, record.date);
        let record = merge(self.rows.get(&k), record);
        self.rows.insert(k, record);
        self.persist()
    }
}
