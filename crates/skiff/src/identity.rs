//! Deterministic identity for fixture invocations.
//!
//! The driver and the worker it schedules never exchange an identifier up
//! front: both derive the same [`SiteId`] independently from the session ID
//! and the identity of the call site, and a worker recognizes itself by
//! matching its assigned pod name against that ID.

use std::fmt;
use std::panic::Location;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::Error;
use crate::session::Session;

/// DNS-label-safe identifier for one fixture invocation, shared by the
/// driver and its scheduled worker. Doubles as the job name, the service
/// name, and the report-entry suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SiteId(String);

impl SiteId {
    /// Derives the site ID for a call site within a session. Pure function
    /// of its inputs: repeated calls, in any process running the same
    /// suite, yield the same value.
    pub fn resolve(session_id: &str, call_site: &CallSite) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(session_id.as_bytes());
        hasher.update(b"\n");
        hasher.update(call_site.identity().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        // DNS labels may not start with a digit.
        Self(format!("sk{}", &digest[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the spot in the suite where a fixture invocation happens.
///
/// Two sources exist: the default one reads the current test's name off the
/// test thread together with the location captured at `JobOptions::new`,
/// and [`CallSite::labeled`] lets the author supply the descriptive text
/// directly (required off the test thread, e.g. inside a multi-thread
/// runtime task). Both are stable across image-identical processes.
#[derive(Debug, Clone)]
pub struct CallSite {
    test_name: String,
    file: String,
    line: u32,
    column: u32,
}

impl CallSite {
    /// Call site named by author-supplied descriptive text instead of the
    /// test thread's name. The text must still be the enclosing test's
    /// name so a scheduled worker can re-run that exact test.
    #[track_caller]
    pub fn labeled(text: impl Into<String>) -> Self {
        Self::at(text.into(), Location::caller())
    }

    pub(crate) fn from_thread(location: &'static Location<'static>) -> Result<Self, Error> {
        let current = std::thread::current();
        let name = current
            .name()
            .filter(|name| *name != "main")
            .ok_or_else(|| {
                Error::Determinism(
                    "the current thread carries no test name; run under the default \
                     test harness or supply CallSite::labeled"
                        .to_string(),
                )
            })?;
        Ok(Self::at(name.to_string(), location))
    }

    fn at(test_name: String, location: &'static Location<'static>) -> Self {
        // Base name only: the path as seen inside the image may differ
        // from the driver's build path.
        let file = Path::new(location.file())
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(location.file())
            .to_string();
        Self {
            test_name,
            file,
            line: location.line(),
            column: location.column(),
        }
    }

    /// The string hashed into the site ID.
    pub fn identity(&self) -> String {
        format!(
            "{}@{}:{}:{}",
            self.test_name, self.file, self.line, self.column
        )
    }

    /// Arguments for the scheduled container that re-run exactly the
    /// enclosing test in the image's suite binary.
    pub fn test_filter_args(&self) -> Vec<String> {
        vec![
            self.test_name.clone(),
            "--exact".to_string(),
            "--nocapture".to_string(),
        ]
    }
}

/// How the current process relates to one fixture invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Originated the session; creates, watches, and tears down the workload.
    Driver,
    /// The worker scheduled for this very invocation; runs the closure.
    SelectedWorker,
    /// A worker scheduled for a different invocation in the same session;
    /// must take no action here.
    OtherWorker,
}

/// Resolves the process's role for one invocation. The driver check comes
/// first so the session originator can never simultaneously evaluate as
/// the selected worker.
pub fn determine_role(session: &Session, site: &SiteId) -> Role {
    if session.is_driver() {
        return Role::Driver;
    }
    let selected = session
        .runtime_identity()
        .map(|identity| identity.starts_with(&format!("{}-", site.as_str())))
        .unwrap_or(false);
    if selected {
        Role::SelectedWorker
    } else {
        Role::OtherWorker
    }
}
