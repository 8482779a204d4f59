//! The fixture coordinator: the protocol that lets one test body run
//! partly on a freshly scheduled pod.
//!
//! Every participating process executes the same `with_job` call; the role
//! resolved from the session and the deterministic site ID decides whether
//! it runs the closure locally (selected worker), quietly steps aside
//! (worker for another invocation), or schedules and supervises the
//! workload (driver).

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::identity::{determine_role, Role, SiteId};
use crate::orchestrator::{build_client, KubeOrchestrator, Orchestrator, TerminalStatus};
use crate::report::Report;
use crate::session::Session;
use crate::workload::{JobOptions, WorkloadPlan, WorkloadProfile};

/// Entry point for suites. Holds the immutable session identity, the
/// orchestrator, and the report sink shared by all fixture invocations.
pub struct Harness<O = KubeOrchestrator> {
    session: Session,
    orchestrator: O,
    report: Arc<Report>,
}

impl Harness<KubeOrchestrator> {
    /// Bootstraps the harness from the process environment: binds
    /// configuration, connects the cluster client, and settles session
    /// identity. Call once, before the first fixture invocation.
    pub async fn setup() -> Result<Self, Error> {
        Self::from_config(Config::from_env()?).await
    }

    pub async fn from_config(config: Config) -> Result<Self, Error> {
        let client = build_client(&config).await?;
        let session = Session::bootstrap(&config);
        let profile = WorkloadProfile::new(&config, &session);
        let orchestrator = KubeOrchestrator::new(client, profile);
        Ok(Self::with_orchestrator(session, orchestrator))
    }
}

impl<O: Orchestrator> Harness<O> {
    /// Harness over an explicit orchestrator; how tests drive the protocol
    /// without a cluster.
    pub fn with_orchestrator(session: Session, orchestrator: O) -> Self {
        let report = Arc::new(Report::new(session.id()));
        Self {
            session,
            orchestrator,
            report,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    pub fn write_report(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.report.write(path)
    }

    /// Runs `f` inside a freshly scheduled job.
    ///
    /// On the driver this schedules the workload, waits for it to stop,
    /// tears down its exposure, and attaches its captured output to the
    /// report; the returned error is the invocation's failure, if any. On
    /// the scheduled worker this runs `f` locally. The closure takes no
    /// parameters and returns nothing: values cannot cross the process
    /// boundary except through the rendezvous name and the captured logs.
    pub async fn with_job<F, Fut>(&self, opts: JobOptions, f: F) -> Result<(), Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let call_site = opts.resolve_call_site()?;
        let site = SiteId::resolve(self.session.id(), &call_site);
        let role = determine_role(&self.session, &site);
        debug!(site = %site, role = ?role, "resolved fixture role");

        let (plan, rendezvous) =
            WorkloadPlan::from_options(&site, self.session.id(), &call_site, opts);

        match role {
            Role::SelectedWorker => {
                info!(site = %site, "running fixture body on the scheduled pod");
                f().await;
                publish_rendezvous(rendezvous, &site);
                Ok(())
            }
            Role::OtherWorker => {
                // Scheduled for a different invocation; only hand local
                // peers the name they are waiting on.
                publish_rendezvous(rendezvous, &site);
                Ok(())
            }
            Role::Driver => self.drive(site, plan, rendezvous).await,
        }
    }

    async fn drive(
        &self,
        site: SiteId,
        plan: WorkloadPlan,
        rendezvous: Option<oneshot::Sender<String>>,
    ) -> Result<(), Error> {
        let namespace = plan.namespace.clone();
        let labels = plan.labels.clone();
        let expose_port = plan.expose_port;

        info!(site = %site, namespace = %namespace, "creating job");
        self.orchestrator.create(plan).await?;

        if let Some(port) = expose_port {
            self.orchestrator
                .expose(&site, &namespace, &labels, port)
                .await?;
            // Peers may only dial once the service exists.
            publish_rendezvous(rendezvous, &site);
        }

        info!(site = %site, "waiting for job exit");
        let outcome = self.orchestrator.await_terminal(&site, &namespace).await;

        // Cleanup and log retrieval happen whatever the job's outcome:
        // post-mortem logs matter as much as success logs.
        if expose_port.is_some() {
            if let Err(err) = self.orchestrator.teardown(&site, &namespace).await {
                warn!(site = %site, error = %err, "service teardown failed");
            }
        }

        let logs = match self.orchestrator.retrieve_logs(&site, &namespace).await {
            Ok(bytes) => {
                self.report.attach_logs(&site, &bytes);
                Ok(())
            }
            Err(err) => {
                warn!(site = %site, error = %err, "log retrieval failed");
                Err(err)
            }
        };

        match outcome? {
            TerminalStatus::Failed => Err(Error::WorkloadFailed(site.to_string())),
            TerminalStatus::Succeeded => logs,
        }
    }
}

fn publish_rendezvous(rendezvous: Option<oneshot::Sender<String>>, site: &SiteId) {
    if let Some(sender) = rendezvous {
        if sender.send(site.to_string()).is_err() {
            warn!(site = %site, "rendezvous receiver dropped before the service name was delivered");
        }
    }
}
