//! Cycle de vie de l'application: fenêtre principale, lancement du backend,
//! politique d'échec et sortie propre.

pub mod coordinator;
pub mod error;
pub mod host;
pub mod panic;

pub use coordinator::{ConnectionTestResult, Coordinator, ExitGate};
pub use error::LifecycleError;
pub use host::{
    content_type, resolve_asset, resolve_frontend, DownloadProgress, FrontendSource, ShellHost,
    EVENT_BACKEND_ERROR, EVENT_BACKEND_STATUS, EVENT_UPDATE_AVAILABLE, EVENT_UPDATE_DOWNLOADED,
    EVENT_UPDATE_DOWNLOAD_PROGRESS,
};
pub use panic::install_panic_hook;
