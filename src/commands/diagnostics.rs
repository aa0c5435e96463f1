use tauri::{AppHandle, State};
use tauri_plugin_opener::OpenerExt;

use crate::diagnostics::SystemReport;
use crate::lifecycle::Coordinator;
use crate::runtime::RuntimeResolveDebugInfo;

/// Rapport système renvoyé au frontend.
#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemReportResponse {
    pub report: SystemReport,
    /// Chemin du fichier écrit si l'enregistrement a été demandé.
    pub saved_path: Option<String>,
}

/// Construit le rapport système, et l'enregistre sur disque si `save` vaut `true`.
#[tauri::command]
pub async fn get_system_report(
    coordinator: State<'_, Coordinator>,
    save: Option<bool>,
) -> Result<SystemReportResponse, String> {
    let (report, saved) = coordinator
        .system_report(save.unwrap_or(false))
        .await
        .map_err(|e| e.to_string())?;
    Ok(SystemReportResponse {
        report,
        saved_path: saved.map(|path| path.to_string_lossy().to_string()),
    })
}

/// Ouvre le dossier des journaux dans l'explorateur du système.
#[tauri::command]
pub fn open_logs_folder(app: AppHandle, coordinator: State<'_, Coordinator>) -> Result<String, String> {
    let dir = coordinator.logs_dir();
    std::fs::create_dir_all(&dir).map_err(|e| e.to_string())?;
    let dir = dir.to_string_lossy().to_string();
    app.opener()
        .open_path(dir.clone(), None::<&str>)
        .map_err(|e| e.to_string())?;
    Ok(dir)
}

/// Diagnostic complet de la résolution du runtime Java.
#[tauri::command]
pub async fn diagnose_java_runtime(
    coordinator: State<'_, Coordinator>,
) -> Result<RuntimeResolveDebugInfo, String> {
    Ok(coordinator.diagnose_runtime().await)
}
