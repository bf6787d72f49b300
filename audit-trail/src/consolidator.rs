//! Audit log consolidation
//!
//! Each component appends to its own JSONL file; the consolidator merges
//! them into one chronologically ordered stream, tags every entry with its
//! originating component, and computes summary statistics over the whole
//! trail. Malformed lines in any one file are skipped so partial
//! corruption never takes down the consolidated view.

use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use wallet_core::AuditSource;

/// One entry in the consolidated stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedEntry {
    /// Entry timestamp
    pub timestamp: DateTime<Utc>,
    /// Originating component
    pub source: AuditSource,
    /// Component-specific payload
    pub payload: Value,
}

/// Query filter for the consolidated log
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Restrict to one user's entries
    pub user_id: Option<String>,
    /// Inclusive lower bound
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound
    pub to: Option<DateTime<Utc>>,
    /// Restrict to one source
    pub source: Option<AuditSource>,
    /// Maximum entries returned
    pub limit: Option<usize>,
}

/// Summary statistics over the full trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSummary {
    /// Entries across all sources
    pub total_entries: usize,
    /// Entry count per source
    pub per_source_counts: BTreeMap<String, usize>,
    /// Entries with `status: "error"`
    pub error_count: usize,
    /// Gate pipeline runs that blocked
    pub security_block_count: usize,
    /// Applied `payment_succeeded` events
    pub successful_payments: usize,
    /// Recorded `payment_failed` events
    pub failed_payments: usize,
    /// Applied `charge_refunded` events
    pub refunds: usize,
}

/// Read-only consolidator over a directory of per-source JSONL logs
#[derive(Debug, Clone)]
pub struct AuditConsolidator {
    dir: PathBuf,
}

impl AuditConsolidator {
    /// Create a consolidator over the audit log directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory being consolidated
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Merged entries across all sources, newest first
    pub fn consolidated_log(&self, limit: Option<usize>) -> Result<Vec<ConsolidatedEntry>> {
        self.query(&AuditQuery {
            limit,
            ..Default::default()
        })
    }

    /// Filtered view of the consolidated log, newest first
    pub fn query(&self, query: &AuditQuery) -> Result<Vec<ConsolidatedEntry>> {
        let mut entries = self.load_all()?;

        entries.retain(|entry| {
            if let Some(source) = query.source {
                if entry.source != source {
                    return false;
                }
            }
            if let Some(ref user_id) = query.user_id {
                if entry.payload.get("user_id").and_then(|v| v.as_str()) != Some(user_id.as_str())
                {
                    return false;
                }
            }
            if let Some(from) = query.from {
                if entry.timestamp < from {
                    return false;
                }
            }
            if let Some(to) = query.to {
                if entry.timestamp > to {
                    return false;
                }
            }
            true
        });

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Summary statistics over the entire trail
    pub fn summary(&self) -> Result<AuditSummary> {
        let entries = self.load_all()?;

        let mut per_source_counts = BTreeMap::new();
        let mut error_count = 0;
        let mut security_block_count = 0;
        let mut successful_payments = 0;
        let mut failed_payments = 0;
        let mut refunds = 0;

        for entry in &entries {
            *per_source_counts
                .entry(entry.source.as_str().to_string())
                .or_insert(0) += 1;

            if entry.payload.get("status").and_then(|v| v.as_str()) == Some("error") {
                error_count += 1;
            }

            match entry.source {
                AuditSource::SecurityGates => {
                    if entry.payload.get("blocked").and_then(|v| v.as_bool()) == Some(true) {
                        security_block_count += 1;
                    }
                }
                AuditSource::WebhookEvents => {
                    let event_type = entry.payload.get("event_type").and_then(|v| v.as_str());
                    let status = entry.payload.get("status").and_then(|v| v.as_str());
                    match (event_type, status) {
                        (Some("payment_succeeded"), Some("applied")) => successful_payments += 1,
                        (Some("payment_failed"), _) => failed_payments += 1,
                        (Some("charge_refunded"), Some("applied")) => refunds += 1,
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        Ok(AuditSummary {
            total_entries: entries.len(),
            per_source_counts,
            error_count,
            security_block_count,
            successful_payments,
            failed_payments,
            refunds,
        })
    }

    fn load_all(&self) -> Result<Vec<ConsolidatedEntry>> {
        let mut entries = Vec::new();
        for source in AuditSource::ALL {
            self.load_source(source, &mut entries)?;
        }
        Ok(entries)
    }

    fn load_source(&self, source: AuditSource, out: &mut Vec<ConsolidatedEntry>) -> Result<()> {
        let path = self.dir.join(source.file_name());
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };

        let mut skipped = 0usize;
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(source, line) {
                Some(entry) => out.push(entry),
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            tracing::warn!(
                source = %source,
                skipped,
                "Skipped malformed audit log lines"
            );
        }
        Ok(())
    }
}

/// Parse one JSONL line; `None` for anything malformed
fn parse_line(source: AuditSource, line: &str) -> Option<ConsolidatedEntry> {
    let payload: Value = serde_json::from_str(line).ok()?;
    let timestamp = payload
        .get("timestamp")?
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())?
        .with_timezone(&Utc);
    Some(ConsolidatedEntry {
        timestamp,
        source,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::TempDir;
    use wallet_core::AuditWriter;

    fn ts(offset_secs: i64) -> String {
        (Utc::now() + Duration::seconds(offset_secs)).to_rfc3339()
    }

    fn seeded_dir() -> (AuditConsolidator, TempDir) {
        let temp = TempDir::new().unwrap();
        let writer = AuditWriter::new(temp.path()).unwrap();

        writer
            .append(
                AuditSource::WalletLedger,
                json!({"timestamp": ts(0), "user_id": "alice", "operation": "add", "status": "success"}),
            )
            .unwrap();
        writer
            .append(
                AuditSource::WalletLedger,
                json!({"timestamp": ts(2), "user_id": "bob", "operation": "deduct", "status": "error"}),
            )
            .unwrap();
        writer
            .append(
                AuditSource::SecurityGates,
                json!({"timestamp": ts(1), "user_id": "alice", "blocked": true}),
            )
            .unwrap();
        writer
            .append(
                AuditSource::WebhookEvents,
                json!({"timestamp": ts(3), "event_id": "evt_1", "event_type": "payment_succeeded", "status": "applied"}),
            )
            .unwrap();
        writer
            .append(
                AuditSource::WebhookEvents,
                json!({"timestamp": ts(4), "event_id": "evt_2", "event_type": "payment_failed", "status": "recorded"}),
            )
            .unwrap();

        (AuditConsolidator::new(temp.path()), temp)
    }

    #[test]
    fn test_consolidated_log_newest_first() {
        let (consolidator, _temp) = seeded_dir();

        let entries = consolidator.consolidated_log(None).unwrap();
        assert_eq!(entries.len(), 5);
        for pair in entries.windows(2) {
            assert!(pair[0].timestamp >= pair[1].timestamp);
        }
        assert_eq!(entries[0].source, AuditSource::WebhookEvents);
    }

    #[test]
    fn test_limit_truncates_after_sort() {
        let (consolidator, _temp) = seeded_dir();

        let entries = consolidator.consolidated_log(Some(2)).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].payload.get("event_id").and_then(|v| v.as_str()),
            Some("evt_2")
        );
    }

    #[test]
    fn test_query_by_user() {
        let (consolidator, _temp) = seeded_dir();

        let entries = consolidator
            .query(&AuditQuery {
                user_id: Some("alice".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries
            .iter()
            .all(|e| e.payload["user_id"] == "alice"));
    }

    #[test]
    fn test_query_by_time_range() {
        let (consolidator, _temp) = seeded_dir();
        let from = Utc::now() + Duration::seconds(2);

        let entries = consolidator
            .query(&AuditQuery {
                from: Some(from),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_summary_counts() {
        let (consolidator, _temp) = seeded_dir();

        let summary = consolidator.summary().unwrap();
        assert_eq!(summary.total_entries, 5);
        assert_eq!(summary.per_source_counts["wallet-ledger"], 2);
        assert_eq!(summary.error_count, 1);
        assert_eq!(summary.security_block_count, 1);
        assert_eq!(summary.successful_payments, 1);
        assert_eq!(summary.failed_payments, 1);
        assert_eq!(summary.refunds, 0);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let (consolidator, temp) = seeded_dir();

        // Corrupt one source file with garbage and a line missing its
        // timestamp
        let path = temp.path().join(AuditSource::WalletLedger.file_name());
        let mut content = std::fs::read_to_string(&path).unwrap();
        content.push_str("not json at all\n");
        content.push_str("{\"user_id\": \"carol\"}\n");
        std::fs::write(&path, content).unwrap();

        let entries = consolidator.consolidated_log(None).unwrap();
        assert_eq!(entries.len(), 5);

        let summary = consolidator.summary().unwrap();
        assert_eq!(summary.total_entries, 5);
    }

    #[test]
    fn test_missing_files_yield_empty_log() {
        let temp = TempDir::new().unwrap();
        let consolidator = AuditConsolidator::new(temp.path());

        assert!(consolidator.consolidated_log(None).unwrap().is_empty());
        assert_eq!(consolidator.summary().unwrap().total_entries, 0);
    }
}
