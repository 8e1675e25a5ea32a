//! Run artifact persistence: identifier lists, the download ledger, and
//! debug snapshots.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Filesystem-safe key for a topic: whitespace joined with underscores,
/// characters invalid in filenames dropped.
pub fn topic_slug(topic: &str) -> String {
    let joined = topic.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| !matches!(*c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    if cleaned.is_empty() {
        "query".to_string()
    } else {
        cleaned
    }
}

/// Sanitize a document title for use in a filename: invalid characters
/// removed, whitespace collapsed to underscores, length capped.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| {
            !matches!(*c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|') && !c.is_control()
        })
        .collect();
    let joined = cleaned.split_whitespace().collect::<Vec<_>>().join("_");
    joined.chars().take(100).collect()
}

/// Write the discovered raw identifiers, one per line. Written once, after
/// search concludes.
pub fn save_identifier_list(dir: &Path, topic: &str, ids: &[String]) -> io::Result<PathBuf> {
    let path = dir.join(format!("{}_patent_ids.txt", topic_slug(topic)));
    let mut body = ids.join("\n");
    body.push('\n');
    std::fs::write(&path, body)?;
    Ok(path)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Success,
    Failed,
    Error,
}

/// Terminal state of one identifier's download attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRecord {
    pub status: DownloadStatus,
    /// Resolved artifact path; empty until a PDF lands.
    pub path: String,
    /// Error message; empty unless failed/error.
    pub error: String,
}

impl DownloadRecord {
    pub fn pending() -> Self {
        Self {
            status: DownloadStatus::Pending,
            path: String::new(),
            error: String::new(),
        }
    }

    pub fn success(path: String) -> Self {
        Self {
            status: DownloadStatus::Success,
            path,
            error: String::new(),
        }
    }

    /// No PDF could be downloaded; an HTML fallback may exist instead.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: DownloadStatus::Failed,
            path: String::new(),
            error: error.into(),
        }
    }

    /// Operational failure while processing the identifier.
    pub fn error(error: impl Into<String>) -> Self {
        Self {
            status: DownloadStatus::Error,
            path: String::new(),
            error: error.into(),
        }
    }
}

/// Durable per-identifier download record, keyed by topic.
///
/// The backing file is rewritten after every single identifier's attempt so
/// a crash mid-run leaves an accurate partial record. Re-running a topic
/// overwrites that topic's ledger.
#[derive(Debug)]
pub struct DownloadLedger {
    path: PathBuf,
    records: BTreeMap<String, DownloadRecord>,
}

impl DownloadLedger {
    /// Initialize a ledger with every identifier pending, and flush it.
    pub fn create(dir: &Path, key: &str, ids: &[String]) -> io::Result<Self> {
        let path = dir.join(format!("{}_download_record.json", topic_slug(key)));
        let records = ids
            .iter()
            .map(|id| (id.clone(), DownloadRecord::pending()))
            .collect();
        let ledger = Self { path, records };
        ledger.flush()?;
        Ok(ledger)
    }

    /// Read a ledger back from disk.
    pub fn load(path: &Path) -> io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let records = serde_json::from_str(&raw).map_err(io::Error::other)?;
        Ok(Self {
            path: path.to_path_buf(),
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, id: &str) -> Option<&DownloadRecord> {
        self.records.get(id)
    }

    pub fn successes(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.status == DownloadStatus::Success)
            .count()
    }

    /// Record an identifier's outcome and flush the whole ledger to disk.
    pub fn record(&mut self, id: &str, record: DownloadRecord) -> io::Result<()> {
        self.records.insert(id.to_string(), record);
        self.flush()
    }

    fn flush(&self) -> io::Result<()> {
        let body = serde_json::to_vec_pretty(&self.records).map_err(io::Error::other)?;
        std::fs::write(&self.path, body)
    }
}

/// Best-effort sink for diagnostic snapshots; failures are logged and
/// swallowed, never propagated.
#[derive(Debug, Clone)]
pub struct DebugSink {
    dir: Option<PathBuf>,
}

impl DebugSink {
    pub fn new(output_dir: &Path, enabled: bool) -> Self {
        Self {
            dir: enabled.then(|| output_dir.join("debug")),
        }
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn enabled(&self) -> bool {
        self.dir.is_some()
    }

    pub fn save_html(&self, prefix: &str, markup: &str) {
        self.write(prefix, "html", markup.as_bytes());
    }

    pub fn save_png(&self, prefix: &str, bytes: &[u8]) {
        self.write(prefix, "png", bytes);
    }

    fn write(&self, prefix: &str, ext: &str, bytes: &[u8]) {
        let Some(dir) = &self.dir else {
            return;
        };
        if let Err(e) = std::fs::create_dir_all(dir) {
            warn!("cannot create debug directory {}: {}", dir.display(), e);
            return;
        }
        let path = dir.join(format!("{prefix}.{ext}"));
        match std::fs::write(&path, bytes) {
            Ok(()) => debug!("saved debug snapshot {}", path.display()),
            Err(e) => warn!("cannot save debug snapshot {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_joins_whitespace_and_drops_invalid_chars() {
        assert_eq!(topic_slug("battery electrolyte"), "battery_electrolyte");
        assert_eq!(topic_slug("\"quoted topic\""), "quoted_topic");
        assert_eq!(topic_slug("a/b:c"), "abc");
        assert_eq!(topic_slug("   "), "query");
    }

    #[test]
    fn sanitize_title_collapses_whitespace_and_caps_length() {
        assert_eq!(
            sanitize_title("Solid  electrolyte: a\treview"),
            "Solid_electrolyte_a_review"
        );
        let long = "x".repeat(300);
        assert_eq!(sanitize_title(&long).chars().count(), 100);
    }

    #[test]
    fn identifier_list_is_newline_delimited() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ids = vec!["US1B2".to_string(), "EP2A1".to_string()];
        let path = save_identifier_list(dir.path(), "some topic", &ids).expect("write");
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "some_topic_patent_ids.txt"
        );
        let body = std::fs::read_to_string(&path).expect("read");
        assert_eq!(body, "US1B2\nEP2A1\n");
    }

    #[test]
    fn ledger_is_flushed_after_every_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ids: Vec<String> = ["US1111111B2", "US2222222B2", "US3333333B2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut ledger = DownloadLedger::create(dir.path(), "crash test", &ids).expect("create");

        ledger
            .record("US1111111B2", DownloadRecord::success("a.pdf".into()))
            .expect("record");
        ledger
            .record("US2222222B2", DownloadRecord::failed("Could not download PDF"))
            .expect("record");

        // Simulate a crash before the third identifier: the on-disk file must
        // already reflect the first two outcomes.
        let path = ledger.path().to_path_buf();
        drop(ledger);
        let reloaded = DownloadLedger::load(&path).expect("load");
        assert_eq!(
            reloaded.get("US1111111B2").unwrap().status,
            DownloadStatus::Success
        );
        assert_eq!(reloaded.get("US1111111B2").unwrap().path, "a.pdf");
        assert_eq!(
            reloaded.get("US2222222B2").unwrap().status,
            DownloadStatus::Failed
        );
        assert_eq!(reloaded.get("US2222222B2").unwrap().path, "");
        assert_eq!(
            reloaded.get("US3333333B2").unwrap().status,
            DownloadStatus::Pending
        );
        assert_eq!(reloaded.successes(), 1);
    }

    #[test]
    fn record_statuses_serialize_lowercase() {
        let json = serde_json::to_string(&DownloadRecord::failed("no pdf")).expect("json");
        assert!(json.contains("\"status\":\"failed\""));
        assert!(json.contains("\"path\":\"\""));
    }
}
