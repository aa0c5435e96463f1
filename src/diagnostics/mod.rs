//! Journal structuré et rapport système.

pub mod error;
pub mod journal;
pub mod report;

pub use error::DiagnosticsError;
pub use journal::{Journal, LogEntry, LogLevel};
pub use report::{collect_host_info, HostInfo, SystemReport};
