//! Skiff runs pieces of a Rust test suite inside freshly scheduled
//! Kubernetes Jobs and rejoins the driving process with the outcome and
//! the captured output.
//!
//! Responsibilities:
//! - deterministic site identifiers shared by the driver and its workers
//!   without any prior message exchange
//! - job and service lifecycle around a single fixture invocation
//! - rendezvous delivery of exposed service names between concurrent
//!   invocations
//! - capturing workload logs into a suite report for later rendering
//!
//! The same suite binary runs everywhere: the process that originated the
//! session drives, and scheduled pods recognize the invocation they were
//! created for by recomputing its identifier.

pub mod config;
pub mod error;
pub mod fixture;
pub mod identity;
pub mod orchestrator;
pub mod report;
pub mod session;
pub mod workload;

pub use config::Config;
pub use error::Error;
pub use fixture::Harness;
pub use identity::{determine_role, CallSite, Role, SiteId};
pub use orchestrator::{KubeOrchestrator, Orchestrator, TerminalStatus};
pub use report::{JobLogs, Report, ReportEntry, SuiteReport, Visibility, LOG_ENTRY_PREFIX};
pub use session::Session;
pub use workload::{ExposeOptions, JobOptions, WorkloadPlan, WorkloadProfile};
