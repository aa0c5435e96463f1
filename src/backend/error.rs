/// Erreurs remontées par le superviseur du backend.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("invalid launch configuration: {0}")]
    InvalidConfig(String),
    #[error("port {0} is already in use on 127.0.0.1")]
    PortInUse(u16),
    #[error("failed to spawn backend with '{executable}': {message}")]
    Spawn { executable: String, message: String },
    #[error("backend was never configured")]
    NotConfigured,
    #[error("supervisor is not running")]
    Unavailable,
}
