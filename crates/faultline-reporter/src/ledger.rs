//! Per-worker JSONL record of chain outcomes.

use crate::outcome::ChainOutcome;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use faultline_ids::{TestIdentity, WorkerId};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One ledger line.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub recorded_at: DateTime<Utc>,
    pub worker: WorkerId,
    pub test: String,
    pub label: String,
    #[serde(flatten)]
    pub outcome: ChainOutcome,
}

impl LedgerEntry {
    pub fn new(worker: &WorkerId, identity: &TestIdentity, outcome: ChainOutcome) -> Self {
        Self {
            recorded_at: Utc::now(),
            worker: worker.clone(),
            test: identity.node_id(),
            label: identity.label(),
            outcome,
        }
    }
}

/// Append-only outcome file for one worker.
#[derive(Clone, Debug)]
pub struct Ledger {
    path: PathBuf,
}

impl Ledger {
    /// `<reports>/faultline/<worker>.outcomes.jsonl`
    pub fn for_worker(reports_dir: &Path, worker: &WorkerId) -> Self {
        Self {
            path: reports_dir
                .join("faultline")
                .join(format!("{worker}.outcomes.jsonl")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &LedgerEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("create {parent:?}"))?;
        }
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {:?}", self.path))?;
        let mut line = serde_json::to_string(entry).context("serialize ledger entry")?;
        line.push('\n');
        f.write_all(line.as_bytes())
            .with_context(|| format!("append {:?}", self.path))?;
        Ok(())
    }
}

/// Read every entry of a ledger file. A missing file reads as empty.
pub fn read_ledger(path: &Path) -> Result<Vec<LedgerEntry>> {
    let f = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("open {path:?}")),
    };
    let mut entries = Vec::new();
    for (no, line) in BufReader::new(f).lines().enumerate() {
        let line = line.with_context(|| format!("read {path:?}"))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry = serde_json::from_str(&line)
            .with_context(|| format!("parse {path:?} line {}", no + 1))?;
        entries.push(entry);
    }
    Ok(entries)
}
