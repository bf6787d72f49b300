//! Append-only JSONL audit logs
//!
//! Each component writes to its own file; the audit-trail crate merges
//! them. The ledger of record lives in RocksDB — these files exist so that
//! every mutation, block and rejection is reconstructable as one stream.

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Originating component of an audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditSource {
    /// Wallet ledger credit/debit attempts
    WalletLedger,
    /// Webhook event processing outcomes
    WebhookEvents,
    /// Security gate traces and blocks
    SecurityGates,
    /// Ad-platform funding operations
    FundingAdapters,
}

impl AuditSource {
    /// All sources, for consolidation
    pub const ALL: [AuditSource; 4] = [
        AuditSource::WalletLedger,
        AuditSource::WebhookEvents,
        AuditSource::SecurityGates,
        AuditSource::FundingAdapters,
    ];

    /// Stable identifier, also the log file stem
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSource::WalletLedger => "wallet-ledger",
            AuditSource::WebhookEvents => "webhook-events",
            AuditSource::SecurityGates => "security-gates",
            AuditSource::FundingAdapters => "funding-adapters",
        }
    }

    /// Log file name for this source
    pub fn file_name(&self) -> String {
        format!("{}.jsonl", self.as_str())
    }
}

impl fmt::Display for AuditSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Appends JSONL audit entries, one file per source.
pub struct AuditWriter {
    dir: PathBuf,
    // Appends from concurrent tasks must not interleave within a line
    write_lock: Mutex<()>,
}

impl AuditWriter {
    /// Create a writer rooted at `dir`, creating the directory if missing
    pub fn new(dir: impl Into<PathBuf>) -> crate::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    /// Directory the log files live in
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one entry to the source's log file.
    ///
    /// A `timestamp` field is added if the payload does not carry one.
    pub fn append(&self, source: AuditSource, payload: Value) -> crate::Result<()> {
        let mut payload = payload;
        if let Value::Object(ref mut map) = payload {
            map.entry("timestamp")
                .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        }

        let line = serde_json::to_string(&payload)
            .map_err(|e| crate::Error::Config(format!("Audit entry not serializable: {}", e)))?;

        let path = self.dir.join(source.file_name());
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }
}

impl fmt::Debug for AuditWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditWriter").field("dir", &self.dir).finish()
    }
}
