//! Orchestration engine for drover tasks.
//!
//! Sits between the HTTP surface and the `drover-data` store: resolves
//! per-request permissions against the worker registry, persists and
//! queues tasks for dispatch, pushes them to their workers over HTTP,
//! takes in asynchronous completion reports, and reacts to user and
//! worker removals.

pub mod cleanup;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod intake;
pub mod jobs;
pub mod permissions;
pub mod registry;
pub mod scheduler;

pub use error::{EngineError, Result};
pub use events::{EventBus, LifecycleEvent};
pub use intake::{CompletionReport, IntakeOutcome, WorkerOutcome};
pub use jobs::{JobContext, JobRequest, JobScheduler};
pub use permissions::TaskPermissions;
pub use registry::{InMemoryWorkerRegistry, WorkerDetails, WorkerRegistry, AUTH_BACKENDS};
