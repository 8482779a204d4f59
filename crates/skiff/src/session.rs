use tracing::info;

use crate::config::Config;

/// Identity of one test run, shared by the driver process and every worker
/// it schedules. Constructed once at bootstrap and immutable afterwards.
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    is_driver: bool,
    runtime_identity: Option<String>,
}

impl Session {
    /// Settles the session identity for this process: adopt the ID handed
    /// down by a scheduling driver, or generate a fresh one and take the
    /// driver role. This is the only place the crate uses randomness;
    /// every identifier downstream derives deterministically from it.
    pub fn bootstrap(config: &Config) -> Self {
        let session = match &config.session_id {
            Some(id) => Self {
                id: id.clone(),
                is_driver: false,
                runtime_identity: config.pod_name.clone(),
            },
            None => Self {
                id: format!("{:08x}", rand::random::<u32>()),
                is_driver: true,
                runtime_identity: config.pod_name.clone(),
            },
        };
        info!(
            session = %session.id,
            driver = session.is_driver,
            "skiff session ready"
        );
        session
    }

    /// Session as seen by the process that originated it.
    pub fn driver(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_driver: true,
            runtime_identity: None,
        }
    }

    /// Session as seen by a scheduled worker with the given runtime identity.
    pub fn worker(id: impl Into<String>, runtime_identity: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            is_driver: false,
            runtime_identity: Some(runtime_identity.into()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_driver(&self) -> bool {
        self.is_driver
    }

    /// The name assigned to this process by the orchestrator, if any.
    pub fn runtime_identity(&self) -> Option<&str> {
        self.runtime_identity.as_deref()
    }
}
