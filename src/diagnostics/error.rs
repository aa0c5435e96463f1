use std::path::PathBuf;

/// Erreurs du journal et des rapports système.
#[derive(Debug, thiserror::Error)]
pub enum DiagnosticsError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}
