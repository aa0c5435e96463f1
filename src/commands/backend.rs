use tauri::State;

use crate::backend::BackendSnapshot;
use crate::lifecycle::{ConnectionTestResult, Coordinator};

/// Retourne l'état courant du backend.
#[tauri::command]
pub async fn get_backend_status(
    coordinator: State<'_, Coordinator>,
) -> Result<BackendSnapshot, String> {
    coordinator.backend_status().await.map_err(|e| e.to_string())
}

/// Relance le backend avec un compteur de tentatives remis à zéro.
#[tauri::command]
pub async fn restart_backend(
    coordinator: State<'_, Coordinator>,
) -> Result<BackendSnapshot, String> {
    coordinator.restart_backend().await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn test_backend_connection(
    coordinator: State<'_, Coordinator>,
) -> Result<ConnectionTestResult, String> {
    Ok(coordinator.test_backend_connection().await)
}
