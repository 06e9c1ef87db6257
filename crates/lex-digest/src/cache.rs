//! Request-scoped report cache.
//!
//! A [`DigestCache`] holds at most one report, keyed by a [`Fingerprint`] of
//! the table and configuration that produced it. Inserting a report for a
//! different fingerprint replaces the previous entry, so loading a new table
//! invalidates the old digest without any explicit call.
//!
//! The cache is owned by the caller (one per session or upload flow) and is
//! safe to share across threads.

use parking_lot::RwLock;
use polars::prelude::*;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::reporting::AnalysisReport;

/// Rows whose cells are mixed into the fingerprint.
const PROBE_ROWS: usize = 16;

/// Content fingerprint of a table plus the configuration used to analyze it.
///
/// Covers column names, dtypes, row count, the cells at evenly spaced probe
/// rows, and the serialized configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn compute(df: &DataFrame, config: &AnalysisConfig) -> Result<Self> {
        let mut hasher = Sha256::new();
        hasher.update((df.height() as u64).to_le_bytes());

        let columns = df.get_columns();
        for column in columns {
            hasher.update(column.name().as_bytes());
            hasher.update([0]);
            hasher.update(column.dtype().to_string().as_bytes());
            hasher.update([0]);
        }

        for row in probe_rows(df.height()) {
            for column in columns {
                hasher.update(column.get(row)?.to_string().as_bytes());
                hasher.update([0x1f]);
            }
            hasher.update([0x1e]);
        }

        hasher.update(serde_json::to_vec(config)?);
        Ok(Self(hex::encode(hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0[..16.min(self.0.len())])
    }
}

/// Evenly spaced row indices including the first and last row.
fn probe_rows(height: usize) -> Vec<usize> {
    if height <= PROBE_ROWS {
        return (0..height).collect();
    }
    let mut rows: Vec<usize> = (0..PROBE_ROWS)
        .map(|i| i * (height - 1) / (PROBE_ROWS - 1))
        .collect();
    rows.dedup();
    rows
}

/// Single-slot cache of the latest report.
#[derive(Debug, Default)]
pub struct DigestCache {
    slot: RwLock<Option<(Fingerprint, Arc<AnalysisReport>)>>,
}

impl DigestCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached report when its fingerprint matches.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<AnalysisReport>> {
        self.slot
            .read()
            .as_ref()
            .filter(|(cached, _)| cached == fingerprint)
            .map(|(_, report)| Arc::clone(report))
    }

    /// Store a report, replacing whatever was cached.
    pub fn insert(&self, fingerprint: Fingerprint, report: Arc<AnalysisReport>) {
        let mut slot = self.slot.write();
        if let Some((previous, _)) = slot.as_ref()
            && previous != &fingerprint
        {
            debug!(previous = %previous, current = %fingerprint, "Replacing cached digest");
        }
        *slot = Some((fingerprint, report));
    }

    pub fn invalidate(&self) {
        if self.slot.write().take().is_some() {
            debug!("Cached digest invalidated");
        }
    }

    pub fn fingerprint(&self) -> Option<Fingerprint> {
        self.slot.read().as_ref().map(|(fingerprint, _)| fingerprint.clone())
    }

    pub fn is_empty(&self) -> bool {
        self.slot.read().is_none()
    }

    /// Return the cached report for `fingerprint`, or build and cache one.
    ///
    /// The lock is not held while `build` runs; two concurrent misses both
    /// build and the last insert wins.
    pub fn get_or_try_insert_with<F>(
        &self,
        fingerprint: Fingerprint,
        build: F,
    ) -> Result<Arc<AnalysisReport>>
    where
        F: FnOnce() -> Result<Arc<AnalysisReport>>,
    {
        if let Some(report) = self.get(&fingerprint) {
            debug!(fingerprint = %fingerprint, "Digest cache hit");
            return Ok(report);
        }
        debug!(fingerprint = %fingerprint, "Digest cache miss");
        let report = build()?;
        self.insert(fingerprint, Arc::clone(&report));
        Ok(report)
    }
}
