//! Reading store: append-only sink for evaluated samples plus the read
//! queries the dashboard routes need.
//!
//! `db::PgStore` is the production implementation. `MemoryStore` keeps a
//! bounded window of rows in process and is used when no database is
//! reachable, so the service still runs (and serves recent data) without one.

use crate::model::{ReadingRecord, StoreError, StoredReading};
use chrono::{NaiveDate, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

pub trait ReadingStore: Send + Sync {
    /// Appends one row and returns it with its assigned id and timestamp.
    fn append(&self, record: &ReadingRecord) -> Result<StoredReading, StoreError>;

    /// Most recently appended row.
    fn latest(&self) -> Result<Option<StoredReading>, StoreError>;

    /// Up to `limit` most recent rows, oldest first.
    fn recent(&self, limit: usize) -> Result<Vec<StoredReading>, StoreError>;

    /// Rows created on `date` (UTC), newest first.
    fn on_date(&self, date: NaiveDate) -> Result<Vec<StoredReading>, StoreError>;
}

struct MemoryInner {
    next_id: i64,
    rows: VecDeque<StoredReading>,
}

pub struct MemoryStore {
    capacity: usize,
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        MemoryStore {
            capacity: capacity.max(1),
            inner: Mutex::new(MemoryInner {
                next_id: 1,
                rows: VecDeque::new(),
            }),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|inner| inner.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReadingStore for MemoryStore {
    fn append(&self, record: &ReadingRecord) -> Result<StoredReading, StoreError> {
        let mut inner = self.lock()?;
        let stored = StoredReading {
            id: inner.next_id,
            created_at: Utc::now(),
            record: record.clone(),
        };
        inner.next_id += 1;
        inner.rows.push_back(stored.clone());
        while inner.rows.len() > self.capacity {
            inner.rows.pop_front();
        }
        Ok(stored)
    }

    fn latest(&self) -> Result<Option<StoredReading>, StoreError> {
        Ok(self.lock()?.rows.back().cloned())
    }

    fn recent(&self, limit: usize) -> Result<Vec<StoredReading>, StoreError> {
        let inner = self.lock()?;
        let skip = inner.rows.len().saturating_sub(limit);
        Ok(inner.rows.iter().skip(skip).cloned().collect())
    }

    fn on_date(&self, date: NaiveDate) -> Result<Vec<StoredReading>, StoreError> {
        let inner = self.lock()?;
        Ok(inner
            .rows
            .iter()
            .rev()
            .filter(|row| row.created_at.date_naive() == date)
            .cloned()
            .collect())
    }
}
