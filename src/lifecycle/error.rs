use crate::backend::SupervisorError;
use crate::diagnostics::DiagnosticsError;
use crate::runtime::RuntimeResolveError;

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("window error: {0}")]
    Window(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeResolveError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error(transparent)]
    Diagnostics(#[from] DiagnosticsError),
    #[error("connection test failed: {0}")]
    Connection(String),
}
