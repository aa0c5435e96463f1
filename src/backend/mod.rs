//! Supervision du process backend Java: lancement, détection de disponibilité,
//! sondes de santé et relances bornées.

pub mod error;
pub mod health;
pub mod launcher;
pub mod pid_slot;
pub mod supervisor;
pub mod types;

pub use error::SupervisorError;
pub use health::{check_port, HealthMonitor};
pub use launcher::{ExitOutcome, LaunchedProcess, ProcessLauncher, StopSignal, TokioLauncher};
pub use pid_slot::ChildPidSlot;
pub use supervisor::Supervisor;
pub use types::{
    BackendEvent, BackendSnapshot, BackendState, HealthCheckResult, LaunchConfig,
    SupervisorSettings, DEFAULT_READY_MARKERS,
};
