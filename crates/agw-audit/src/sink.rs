// SPDX-License-Identifier: MIT OR Apache-2.0
//! File-based audit persistence: one JSONL file per flushed batch, with
//! optional gzip compression and day-granular retention.

use crate::stream::AuditSink;
use agw_core::AuditEntry;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Persists flushed batches as JSONL files under a root directory.
///
/// With compression enabled, batches are gzip-encoded and suffixed
/// `.jsonl.gz`. Files older than the retention horizon are pruned on each
/// persist call.
#[derive(Debug, Clone)]
pub struct JsonlSink {
    root: PathBuf,
    compression: bool,
    retention_days: u32,
}

impl JsonlSink {
    /// A sink rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, compression: bool, retention_days: u32) -> Self {
        Self {
            root: root.into(),
            compression,
            retention_days,
        }
    }

    fn batch_path(&self) -> PathBuf {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3f");
        let suffix = if self.compression { "jsonl.gz" } else { "jsonl" };
        let id = Uuid::new_v4().simple();
        self.root.join(format!("audit-{stamp}-{id}.{suffix}"))
    }

    fn encode(&self, entries: &[AuditEntry]) -> Result<Vec<u8>> {
        let mut lines = Vec::new();
        for entry in entries {
            serde_json::to_writer(&mut lines, entry).context("serialize audit entry")?;
            lines.push(b'\n');
        }
        if !self.compression {
            return Ok(lines);
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&lines).context("gzip audit batch")?;
        encoder.finish().context("finish gzip stream")
    }

    fn prune(&self) -> Result<usize> {
        let horizon = std::time::SystemTime::now()
            - std::time::Duration::from_secs(u64::from(self.retention_days) * 86_400);
        let dir = match std::fs::read_dir(&self.root) {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(anyhow::Error::new(e)
                    .context(format!("read audit dir {}", self.root.display())));
            }
        };

        let mut pruned = 0;
        for item in dir {
            let item = item?;
            if !is_batch_file(&item.path()) {
                continue;
            }
            let modified = item.metadata()?.modified()?;
            if modified < horizon {
                std::fs::remove_file(item.path())
                    .with_context(|| format!("prune {}", item.path().display()))?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }
}

fn is_batch_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| {
            name.starts_with("audit-") && (name.ends_with(".jsonl") || name.ends_with(".jsonl.gz"))
        })
}

#[async_trait]
impl AuditSink for JsonlSink {
    async fn persist(&self, entries: &[AuditEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        std::fs::create_dir_all(&self.root)
            .with_context(|| format!("create audit dir {}", self.root.display()))?;

        let path = self.batch_path();
        let bytes = self.encode(entries)?;
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("write audit batch to {}", path.display()))?;
        debug!(len = entries.len(), path = %path.display(), "persisted audit batch");

        let _ = self.prune();
        Ok(())
    }
}
