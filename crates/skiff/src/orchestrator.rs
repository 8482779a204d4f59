//! Workload lifecycle against the cluster.
//!
//! The [`Orchestrator`] trait is the seam between the fixture protocol and
//! the orchestration API: the real implementation drives `kube`, and tests
//! drive the protocol against a recording fake.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config as ClientConfig};
use tracing::debug;

use crate::config::Config;
use crate::error::Error;
use crate::identity::SiteId;
use crate::workload::{build_job, build_service, WorkloadPlan, WorkloadProfile};

const JOB_NAME_LABEL: &str = "batch.kubernetes.io/job-name";

/// Outcome of a workload that stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalStatus {
    Succeeded,
    Failed,
}

/// Single-shot operations on a remote workload. No operation retries; a
/// failure surfaces at the fixture call site.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Submits the workload built from the fixed profile plus the plan,
    /// with the plan's mutation hook applied last.
    async fn create(&self, plan: WorkloadPlan) -> Result<(), Error>;

    /// Creates the ClusterIP service in front of an already created
    /// workload.
    async fn expose(
        &self,
        site: &SiteId,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        port: u16,
    ) -> Result<(), Error>;

    /// Blocks on a live watch stream until the workload reaches a terminal
    /// condition. A stream that ends beforehand is an error, not a silent
    /// success.
    async fn await_terminal(&self, site: &SiteId, namespace: &str)
        -> Result<TerminalStatus, Error>;

    /// Reads the captured output of one terminal-phase pod fully into
    /// memory. Zero terminal-phase candidates is [`Error::NoTerminalPods`].
    async fn retrieve_logs(&self, site: &SiteId, namespace: &str) -> Result<Vec<u8>, Error>;

    /// Deletes the exposure service. Already absent counts as success.
    async fn teardown(&self, site: &SiteId, namespace: &str) -> Result<(), Error>;
}

/// Builds the cluster client: explicit kubeconfig path when configured,
/// inferred configuration (in-cluster service account, then the
/// conventional default location) otherwise.
pub(crate) async fn build_client(config: &Config) -> Result<Client, Error> {
    match &config.kubeconfig_path {
        Some(path) => {
            std::fs::metadata(path).map_err(|source| Error::KubeconfigPath {
                path: path.clone(),
                source,
            })?;
            let kubeconfig = Kubeconfig::read_from(path)?;
            let client_config =
                ClientConfig::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                    .await?;
            Ok(Client::try_from(client_config)?)
        }
        None => Ok(Client::try_default().await?),
    }
}

/// The real orchestrator, speaking to the cluster through `kube`.
#[derive(Clone)]
pub struct KubeOrchestrator {
    client: Client,
    profile: WorkloadProfile,
}

impl KubeOrchestrator {
    pub fn new(client: Client, profile: WorkloadProfile) -> Self {
        Self { client, profile }
    }

    fn jobs(&self, namespace: &str) -> Api<Job> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn services(&self, namespace: &str) -> Api<Service> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    async fn create(&self, plan: WorkloadPlan) -> Result<(), Error> {
        let namespace = plan.namespace.clone();
        let job = build_job(plan, &self.profile);
        self.jobs(&namespace)
            .create(&PostParams::default(), &job)
            .await?;
        Ok(())
    }

    async fn expose(
        &self,
        site: &SiteId,
        namespace: &str,
        labels: &BTreeMap<String, String>,
        port: u16,
    ) -> Result<(), Error> {
        let service = build_service(site, namespace, labels, port);
        self.services(namespace)
            .create(&PostParams::default(), &service)
            .await?;
        Ok(())
    }

    async fn await_terminal(
        &self,
        site: &SiteId,
        namespace: &str,
    ) -> Result<TerminalStatus, Error> {
        let params = WatchParams::default().fields(&format!("metadata.name={site}"));
        let mut stream = self.jobs(namespace).watch(&params, "0").await?.boxed();
        while let Some(event) = stream.try_next().await? {
            match event {
                WatchEvent::Added(job) | WatchEvent::Modified(job) => {
                    if let Some(status) = terminal_status(&job) {
                        debug!(site = %site, status = ?status, "job reached a terminal state");
                        return Ok(status);
                    }
                }
                WatchEvent::Error(response) => {
                    return Err(Error::Api(kube::Error::Api(response)));
                }
                _ => {}
            }
        }
        Err(Error::WatchEnded(site.to_string()))
    }

    async fn retrieve_logs(&self, site: &SiteId, namespace: &str) -> Result<Vec<u8>, Error> {
        let params = ListParams::default().labels(&format!("{JOB_NAME_LABEL}={site}"));
        let pods = self.pods(namespace).list(&params).await?;

        // Succeeded candidates ahead of failed ones, then list order.
        let candidate = pods
            .items
            .iter()
            .filter(|pod| pod_phase(pod) == Some("Succeeded"))
            .chain(pods.items.iter().filter(|pod| pod_phase(pod) == Some("Failed")))
            .next()
            .ok_or(Error::NoTerminalPods)?;
        let name = candidate.metadata.name.as_deref().unwrap_or_default();

        let logs = self
            .pods(namespace)
            .logs(name, &LogParams::default())
            .await?;
        Ok(logs.into_bytes())
    }

    async fn teardown(&self, site: &SiteId, namespace: &str) -> Result<(), Error> {
        ignore_absent(
            self.services(namespace)
                .delete(site.as_str(), &DeleteParams::default())
                .await,
        )
    }
}

fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref()?.phase.as_deref()
}

fn terminal_status(job: &Job) -> Option<TerminalStatus> {
    let status = job.status.as_ref()?;
    let succeeded = status.succeeded.unwrap_or(0);
    let failed = status.failed.unwrap_or(0);
    let active = status.active.unwrap_or(0);
    if failed > 0 && active == 0 && succeeded == 0 {
        Some(TerminalStatus::Failed)
    } else if succeeded > 0 {
        Some(TerminalStatus::Succeeded)
    } else {
        None
    }
}

fn ignore_absent<T>(result: Result<T, kube::Error>) -> Result<(), Error> {
    match result {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(response)) if response.code == 404 => Ok(()),
        Err(err) => Err(err.into()),
    }
}
