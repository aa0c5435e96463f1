use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use sysinfo::System;

use super::error::DiagnosticsError;
use super::journal::{Journal, LogEntry};
use crate::backend::BackendSnapshot;
use crate::runtime::RuntimeResolveDebugInfo;

/// Nombre d'entrées de journal incluses par défaut.
pub const REPORT_LOG_LIMIT: usize = 100;

/// Informations sur la machine hôte.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostInfo {
    pub os_name: Option<String>,
    pub os_version: Option<String>,
    pub kernel_version: Option<String>,
    pub host_name: Option<String>,
    pub arch: String,
    pub cpu_count: usize,
    pub total_memory_bytes: u64,
    pub available_memory_bytes: u64,
    pub uptime_secs: u64,
}

/// Collecte les informations système via `sysinfo`.
pub fn collect_host_info() -> HostInfo {
    let mut system = System::new();
    system.refresh_memory();

    HostInfo {
        os_name: System::name(),
        os_version: System::os_version(),
        kernel_version: System::kernel_version(),
        host_name: System::host_name(),
        arch: std::env::consts::ARCH.to_string(),
        cpu_count: std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
        total_memory_bytes: system.total_memory(),
        available_memory_bytes: system.available_memory(),
        uptime_secs: System::uptime(),
    }
}

/// Rapport de diagnostic construit à la demande.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemReport {
    pub generated_at: DateTime<Utc>,
    pub app_version: String,
    pub backend: Option<BackendSnapshot>,
    pub runtime: Option<RuntimeResolveDebugInfo>,
    pub paths: BTreeMap<String, String>,
    pub recent_logs: Vec<LogEntry>,
    pub host: HostInfo,
}

impl SystemReport {
    pub fn build(
        app_version: impl Into<String>,
        backend: Option<BackendSnapshot>,
        runtime: Option<RuntimeResolveDebugInfo>,
        journal: &Journal,
    ) -> Self {
        Self {
            generated_at: Utc::now(),
            app_version: app_version.into(),
            backend,
            runtime,
            paths: BTreeMap::new(),
            recent_logs: journal.recent(REPORT_LOG_LIMIT),
            host: collect_host_info(),
        }
    }

    pub fn with_path(mut self, name: &str, path: &Path) -> Self {
        self.paths
            .insert(name.to_string(), path.to_string_lossy().to_string());
        self
    }

    /// Nom de fichier horodaté (`system-report-YYYYMMDD-HHMMSS.json`).
    pub fn file_name(at: DateTime<Local>) -> String {
        format!("system-report-{}.json", at.format("%Y%m%d-%H%M%S"))
    }

    /// Écrit le rapport en JSON indenté dans `dir` et retourne son chemin.
    pub fn save(&self, dir: &Path) -> Result<PathBuf, DiagnosticsError> {
        std::fs::create_dir_all(dir).map_err(|source| DiagnosticsError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = dir.join(Self::file_name(self.generated_at.with_timezone(&Local)));
        let body = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, body).map_err(|source| DiagnosticsError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn file_name_uses_compact_timestamp() {
        let at = Local.with_ymd_and_hms(2026, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(SystemReport::file_name(at), "system-report-20260309-140507.json");
    }

    #[test]
    fn saved_report_contains_backend_logs_and_host() {
        let journal = Journal::memory_only();
        journal.info("Backend process started", None);
        journal.error("Backend attempt 1/3 failed: crashed", None);

        let dir = tempfile::tempdir().unwrap();
        let report = SystemReport::build(
            "1.0.0",
            Some(BackendSnapshot::idle(3)),
            None,
            &journal,
        )
        .with_path("logs", dir.path());
        let path = report.save(&dir.path().join("reports")).unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("system-report-"));
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["appVersion"], "1.0.0");
        assert_eq!(value["backend"]["state"], "idle");
        assert_eq!(value["recentLogs"].as_array().unwrap().len(), 2);
        assert_eq!(value["recentLogs"][1]["level"], "ERROR");
        assert!(value["host"]["cpuCount"].as_u64().unwrap() >= 1);
        assert!(value["runtime"].is_null());
    }
}
