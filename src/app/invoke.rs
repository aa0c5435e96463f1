use crate::commands;

/// Enregistre la liste unique des commandes IPC exposées au frontend.
pub fn register_invoke_handler(builder: tauri::Builder<tauri::Wry>) -> tauri::Builder<tauri::Wry> {
    builder.invoke_handler(tauri::generate_handler![
        commands::backend::get_backend_status,
        commands::backend::restart_backend,
        commands::backend::test_backend_connection,
        commands::diagnostics::get_system_report,
        commands::diagnostics::open_logs_folder,
        commands::diagnostics::diagnose_java_runtime
    ])
}
