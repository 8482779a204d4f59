//! Suite report sink.
//!
//! The driver attaches each workload's captured output here, base64-encoded
//! under a name derived from the workload. The serialized report is what
//! `skiff-report` renders into HTML.

use std::fs::File;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Error;
use crate::identity::SiteId;

/// Name prefix of report entries carrying base64-encoded workload logs.
pub const LOG_ENTRY_PREFIX: &str = "skiff-log-b64-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    Always,
    /// Hidden from ordinary report rendering; consumed by dedicated tooling.
    Never,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub name: String,
    pub visibility: Visibility,
    pub value: String,
}

/// Serialized form of one suite run's report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub session_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
    pub entries: Vec<ReportEntry>,
}

/// One workload's decoded log text.
#[derive(Debug, Clone)]
pub struct JobLogs {
    pub name: String,
    pub text: String,
}

impl SuiteReport {
    /// Decodes every log entry back into readable text, keyed by workload
    /// name (the entry name with the prefix stripped). Entries that fail
    /// to decode are skipped.
    pub fn job_logs(&self) -> Vec<JobLogs> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let name = entry.name.strip_prefix(LOG_ENTRY_PREFIX)?;
                let bytes = STANDARD.decode(&entry.value).ok()?;
                Some(JobLogs {
                    name: name.to_string(),
                    text: String::from_utf8_lossy(&bytes).into_owned(),
                })
            })
            .collect()
    }
}

/// In-process collector for report entries, shared by every fixture
/// invocation of one harness.
pub struct Report {
    session_id: String,
    entries: Mutex<Vec<ReportEntry>>,
}

impl Report {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn add_entry(
        &self,
        name: impl Into<String>,
        visibility: Visibility,
        value: impl Into<String>,
    ) {
        self.entries.lock().push(ReportEntry {
            name: name.into(),
            visibility,
            value: value.into(),
        });
    }

    /// Attaches a workload's captured output, base64-encoded and hidden by
    /// default.
    pub fn attach_logs(&self, site: &SiteId, bytes: &[u8]) {
        self.add_entry(
            format!("{LOG_ENTRY_PREFIX}{site}"),
            Visibility::Never,
            STANDARD.encode(bytes),
        );
    }

    pub fn snapshot(&self) -> SuiteReport {
        SuiteReport {
            session_id: self.session_id.clone(),
            generated_at: OffsetDateTime::now_utc(),
            entries: self.entries.lock().clone(),
        }
    }

    /// Writes the report as pretty JSON for the renderer.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(file, &self.snapshot())?;
        Ok(())
    }
}
