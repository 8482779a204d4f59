use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while bootstrapping the harness or driving
/// a fixture invocation. Protocol errors all bubble up to the driver-side
/// `with_job` call site; an invocation as a whole either passes or fails.
#[derive(Debug, Error)]
pub enum Error {
    #[error("SKIFF_IMAGE must be set to the suite image reference")]
    MissingImage,
    #[error("cannot stat kubeconfig at {path}: {source}")]
    KubeconfigPath {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),
    #[error("kubernetes api: {0}")]
    Api(#[from] kube::Error),
    #[error("cannot derive a stable workload identity: {0}")]
    Determinism(String),
    #[error("watch stream ended before job {0} reached a terminal state")]
    WatchEnded(String),
    #[error("pod failed: job {0} finished without success")]
    WorkloadFailed(String),
    #[error("tried to retrieve logs but no matching pods are in a final phase")]
    NoTerminalPods,
    #[error("report io: {0}")]
    Io(#[from] std::io::Error),
    #[error("report serialization: {0}")]
    Json(#[from] serde_json::Error),
}
