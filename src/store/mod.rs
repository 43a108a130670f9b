mod credentials;
mod merge;

pub use credentials::CredentialStore;
pub use merge::{merge_rows, MergePolicy};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::error::PipelineError;
use crate::models::{Row, HEADERS};

/// TableStore owns the flat requirements file that is the source of truth
/// for every device. It is read whole and replaced whole; there is no
/// locking, so two concurrent editors race and the later rename wins.
#[derive(Debug, Clone)]
pub struct TableStore {
    path: PathBuf,
}

impl TableStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row in file order. A missing file is an empty store.
    /// Records that cannot be decoded are logged and skipped.
    pub fn read_rows(&self) -> Result<Vec<Row>> {
        if !self.path.exists() {
            tracing::warn!("Requirements file {} does not exist", self.path.display());
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let mut rows = Vec::new();
        for result in reader.deserialize::<Row>() {
            match result {
                Ok(mut row) => {
                    row.trim_keys();
                    rows.push(row);
                }
                Err(e) => {
                    let malformed = PipelineError::MalformedRow {
                        line: e.position().map(|p| p.line()).unwrap_or_default(),
                        message: e.to_string(),
                    };
                    tracing::warn!("Skipping {}", malformed);
                }
            }
        }

        tracing::debug!("Read {} rows from {}", rows.len(), self.path.display());
        Ok(rows)
    }

    /// Replace the store with `rows`, always emitting the full fixed header.
    /// The file is written beside the target and renamed over it so readers
    /// never observe a half-written store.
    pub fn write_rows(&self, rows: &[Row]) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp_path = self.path.with_extension("csv.tmp");
        {
            let mut writer = csv::Writer::from_path(&tmp_path)
                .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
            writer.write_record(HEADERS)?;
            for row in rows {
                writer.write_record(row.record())?;
            }
            writer.flush()?;
        }

        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Read-merge-write one submitted set of rows for a single hostname
    pub fn apply_edit(&self, new_rows: Vec<Row>, policy: MergePolicy) -> Result<usize> {
        let hostname = new_rows.first().map(|r| r.hostname.clone()).unwrap_or_default();
        let existing = self.read_rows()?;
        let merged = merge_rows(existing, new_rows, policy);
        self.write_rows(&merged)?;
        tracing::info!(
            "Applied {} edit for '{}' to {} ({} rows)",
            policy,
            hostname,
            self.path.display(),
            merged.len()
        );
        Ok(merged.len())
    }
}
