//! Declarative templates for the scheduled workload and its exposure.
//!
//! The job carries a fixed, non-configurable security and resource profile;
//! a caller-supplied mutation hook runs last so callers can override any
//! default at their own risk.

use std::collections::BTreeMap;
use std::panic::Location;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, ContainerPort, EnvVar, EnvVarSource, ObjectFieldSelector,
    PodSecurityContext, PodSpec, PodTemplateSpec, ResourceRequirements, SecurityContext, Service,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tokio::sync::oneshot;

use crate::config::{Config, ENV_IMAGE, ENV_POD_NAME, ENV_SESSION_ID};
use crate::error::Error;
use crate::identity::{CallSite, SiteId};
use crate::session::Session;

pub const LABEL_SESSION: &str = "skiff.dev/session";
pub const LABEL_NAME: &str = "skiff.dev/name";

const CONTAINER_NAME: &str = "skiff";

/// Caller-side options for one fixture invocation.
pub struct JobOptions {
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub service_account: Option<String>,
    pub expose: Option<ExposeOptions>,
    mutate: Option<JobMutation>,
    call_site: Option<CallSite>,
    location: &'static Location<'static>,
}

/// Final caller-side transformation of the job template.
pub type JobMutation = Box<dyn FnOnce(Job) -> Job + Send>;

impl JobOptions {
    #[track_caller]
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            labels: BTreeMap::new(),
            service_account: None,
            expose: None,
            mutate: None,
            call_site: None,
            location: Location::caller(),
        }
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_service_account(mut self, name: impl Into<String>) -> Self {
        self.service_account = Some(name.into());
        self
    }

    /// Requests a ClusterIP service in front of the workload; the service
    /// name is delivered on `expose.name` once peers may dial it.
    pub fn with_expose(mut self, expose: ExposeOptions) -> Self {
        self.expose = Some(expose);
        self
    }

    /// Final transformation applied to the job after every default,
    /// including the security profile. Overrides at the caller's own risk.
    pub fn with_mutation<F>(mut self, mutate: F) -> Self
    where
        F: FnOnce(Job) -> Job + Send + 'static,
    {
        self.mutate = Some(Box::new(mutate));
        self
    }

    /// Overrides the call-site identity source entirely. Needed when the
    /// invocation runs off the test thread.
    pub fn with_call_site(mut self, call_site: CallSite) -> Self {
        self.call_site = Some(call_site);
        self
    }

    pub(crate) fn resolve_call_site(&self) -> Result<CallSite, Error> {
        match &self.call_site {
            Some(call_site) => Ok(call_site.clone()),
            None => CallSite::from_thread(self.location),
        }
    }
}

/// Exposure request: one TCP port plus the channel the resulting service
/// name is delivered on. The channel is buffered by construction, so the
/// producing and consuming invocations need not synchronize their startup.
pub struct ExposeOptions {
    pub name: oneshot::Sender<String>,
    pub port: u16,
}

/// Fully resolved input for `Orchestrator::create`: everything the
/// workload template needs beyond the process-wide profile.
pub struct WorkloadPlan {
    pub site: SiteId,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub args: Vec<String>,
    pub expose_port: Option<u16>,
    pub service_account: Option<String>,
    pub mutate: Option<JobMutation>,
}

impl WorkloadPlan {
    pub(crate) fn from_options(
        site: &SiteId,
        session_id: &str,
        call_site: &CallSite,
        opts: JobOptions,
    ) -> (Self, Option<oneshot::Sender<String>>) {
        let JobOptions {
            namespace,
            labels,
            service_account,
            expose,
            mutate,
            ..
        } = opts;
        let (rendezvous, expose_port) = match expose {
            Some(expose) => (Some(expose.name), Some(expose.port)),
            None => (None, None),
        };
        let plan = Self {
            site: site.clone(),
            namespace,
            labels: workload_labels(session_id, site, &labels),
            args: call_site.test_filter_args(),
            expose_port,
            service_account,
            mutate,
        };
        (plan, rendezvous)
    }
}

/// Process-wide parameters baked into every workload template.
#[derive(Debug, Clone)]
pub struct WorkloadProfile {
    pub image: String,
    pub uid: i64,
    pub image_pull_policy: String,
    pub session_id: String,
}

impl WorkloadProfile {
    pub fn new(config: &Config, session: &Session) -> Self {
        Self {
            image: config.image.clone(),
            uid: config.uid,
            image_pull_policy: config.image_pull_policy.clone(),
            session_id: session.id().to_string(),
        }
    }
}

/// User labels merged with the session and name labels the fixture relies
/// on for pod listing and service selection.
pub(crate) fn workload_labels(
    session_id: &str,
    site: &SiteId,
    user: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut labels = user.clone();
    labels.insert(LABEL_SESSION.to_string(), session_id.to_string());
    labels.insert(LABEL_NAME.to_string(), site.to_string());
    labels
}

fn fixed_resources() -> ResourceRequirements {
    let amounts: BTreeMap<String, Quantity> = [
        ("cpu".to_string(), Quantity("10m".to_string())),
        ("memory".to_string(), Quantity("40M".to_string())),
    ]
    .into();
    ResourceRequirements {
        limits: Some(amounts.clone()),
        requests: Some(amounts),
        ..Default::default()
    }
}

pub(crate) fn build_job(mut plan: WorkloadPlan, profile: &WorkloadProfile) -> Job {
    let uid = profile.uid;
    let labels = plan.labels.clone();

    let ports = plan.expose_port.map(|port| {
        vec![ContainerPort {
            name: Some(CONTAINER_NAME.to_string()),
            container_port: i32::from(port),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]
    });

    let job = Job {
        metadata: ObjectMeta {
            name: Some(plan.site.to_string()),
            namespace: Some(plan.namespace.clone()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            parallelism: Some(1),
            completions: Some(1),
            backoff_limit: Some(1),
            ttl_seconds_after_finished: Some(300),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    service_account_name: plan.service_account.clone(),
                    security_context: Some(PodSecurityContext {
                        run_as_non_root: Some(true),
                        run_as_user: Some(uid),
                        run_as_group: Some(uid),
                        fs_group: Some(uid),
                        ..Default::default()
                    }),
                    containers: vec![Container {
                        name: CONTAINER_NAME.to_string(),
                        image: Some(profile.image.clone()),
                        args: Some(plan.args.clone()),
                        image_pull_policy: Some(profile.image_pull_policy.clone()),
                        env: Some(vec![
                            EnvVar {
                                name: ENV_IMAGE.to_string(),
                                value: Some(profile.image.clone()),
                                ..Default::default()
                            },
                            EnvVar {
                                name: ENV_SESSION_ID.to_string(),
                                value: Some(profile.session_id.clone()),
                                ..Default::default()
                            },
                            EnvVar {
                                name: ENV_POD_NAME.to_string(),
                                value_from: Some(EnvVarSource {
                                    field_ref: Some(ObjectFieldSelector {
                                        field_path: "metadata.name".to_string(),
                                        ..Default::default()
                                    }),
                                    ..Default::default()
                                }),
                                ..Default::default()
                            },
                        ]),
                        resources: Some(fixed_resources()),
                        security_context: Some(SecurityContext {
                            privileged: Some(false),
                            allow_privilege_escalation: Some(false),
                            run_as_non_root: Some(true),
                            run_as_user: Some(uid),
                            run_as_group: Some(uid),
                            read_only_root_filesystem: Some(true),
                            capabilities: Some(Capabilities {
                                drop: Some(vec!["ALL".to_string()]),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }),
                        ports,
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    };

    match plan.mutate.take() {
        Some(mutate) => mutate(job),
        None => job,
    }
}

pub(crate) fn build_service(
    site: &SiteId,
    namespace: &str,
    labels: &BTreeMap<String, String>,
    port: u16,
) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(site.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels.clone()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            selector: Some(labels.clone()),
            ports: Some(vec![ServicePort {
                name: Some(CONTAINER_NAME.to_string()),
                protocol: Some("TCP".to_string()),
                port: i32::from(port),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
