use std::sync::Arc;

use tauri::{App, AppHandle, Manager, RunEvent};
use tokio::sync::mpsc;

use crate::backend::{Supervisor, TokioLauncher};
use crate::config::{AppPaths, DesktopConfig};
use crate::diagnostics::Journal;
use crate::lifecycle::{install_panic_hook, Coordinator};
use crate::runtime::resolver::standard_providers;
use crate::runtime::{RuntimeLocator, VersionCheck};

mod frontend;
mod host;
mod invoke;
#[cfg(any(target_os = "macos", windows, target_os = "linux"))]
mod updates;

const APP_NAME: &str = "GestoTeam";

/// Construit et lance l'application Tauri avec plugins, setup et commandes IPC.
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    let builder = tauri::Builder::default()
        .plugin(tauri_plugin_single_instance::init(|app, _args, _cwd| {
            if let Some(window) = app.get_webview_window(host::MAIN_WINDOW) {
                let _ = window.unminimize();
                let _ = window.set_focus();
            }
        }))
        .plugin(
            tauri_plugin_log::Builder::default()
                .level(log::LevelFilter::Info)
                .build(),
        )
        .plugin(tauri_plugin_dialog::init())
        .plugin(tauri_plugin_opener::init())
        .manage(frontend::FrontendRoot::default())
        .register_asynchronous_uri_scheme_protocol(frontend::FRONTEND_SCHEME, frontend::handle);
    let builder = invoke::register_invoke_handler(builder);

    builder
        .setup(|app| {
            let coordinator = setup_coordinator(app);
            app.manage(coordinator.clone());

            #[cfg(any(target_os = "macos", windows, target_os = "linux"))]
            {
                if coordinator.config().auto_update {
                    match app
                        .handle()
                        .plugin(tauri_plugin_updater::Builder::new().build())
                    {
                        Ok(()) => {
                            app.manage(updates::PendingUpdate::default());
                            tauri::async_runtime::spawn(updates::check_for_updates(
                                app.handle().clone(),
                                coordinator.journal().clone(),
                            ));
                        }
                        Err(e) => {
                            coordinator
                                .journal()
                                .warn(format!("Auto-update disabled: {e}"), None);
                        }
                    }
                }
            }

            tauri::async_runtime::spawn(async move {
                let _ = coordinator.on_app_ready().await;
            });
            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(handle_run_event);
}

/// Résout chemins, configuration et journal puis câble superviseur et coordinateur.
fn setup_coordinator(app: &App) -> Coordinator {
    let handle = app.handle().clone();
    let paths = app_paths(&handle);

    let journal = match Journal::open(&paths.log_dir()) {
        Ok(journal) => journal,
        Err(e) => {
            log::error!("Log files unavailable, keeping logs in memory: {e}");
            Journal::memory_only()
        }
    };

    let config = match DesktopConfig::load(&paths) {
        Ok(loaded) => {
            for skipped in &loaded.skipped {
                journal.warn(format!("Configuration file ignored: {skipped}"), None);
            }
            loaded.config
        }
        Err(e) => {
            journal.error(format!("Invalid configuration, using defaults: {e}"), None);
            DesktopConfig::default()
        }
    };

    let locator = RuntimeLocator::new(
        standard_providers(
            Some(paths.resource_dir.as_path()),
            &config.runtime.bundled_dir,
            &config.runtime.command,
            &config.runtime.home_var,
        ),
        Arc::new(VersionCheck::new(config.validation_timeout())),
    )
    .with_settings(config.locator_settings());

    // L'acteur doit naître dans le runtime tokio de Tauri.
    let supervisor = tauri::async_runtime::block_on(async {
        Supervisor::spawn(
            Arc::new(TokioLauncher),
            config.supervisor_settings(),
            journal.clone(),
        )
    });

    let (fatal_tx, mut fatal_rx) = mpsc::unbounded_channel();
    install_panic_hook(journal.clone(), supervisor.pid_slot(), fatal_tx);

    let coordinator = Coordinator::new(
        Arc::new(host::TauriHost::new(handle.clone())),
        supervisor,
        locator,
        config,
        paths,
        journal,
    )
    .with_app_version(handle.package_info().version.to_string());

    let forwarder = coordinator.clone();
    tauri::async_runtime::spawn(async move {
        forwarder.spawn_event_forwarder();
        while let Some(message) = fatal_rx.recv().await {
            forwarder.on_uncaught_error(&message).await;
        }
    });

    coordinator
}

/// Emplacements fournis par le résolveur Tauri, `dirs` en repli.
fn app_paths(app: &AppHandle) -> AppPaths {
    let fallback = AppPaths::from_system(APP_NAME);
    let path = app.path();
    AppPaths::new(
        path.resource_dir().unwrap_or(fallback.resource_dir),
        path.app_local_data_dir().unwrap_or(fallback.data_dir),
        path.app_config_dir().unwrap_or(fallback.config_dir),
    )
}

/// Diffère toute sortie jusqu'à l'arrêt du backend.
fn handle_run_event(app: &AppHandle, event: RunEvent) {
    match event {
        RunEvent::ExitRequested { api, code, .. } => {
            let Some(coordinator) = app.try_state::<Coordinator>() else {
                return;
            };
            let coordinator = coordinator.inner().clone();
            if coordinator.exit_gate().is_allowed() {
                return;
            }
            api.prevent_exit();

            let handle = app.clone();
            tauri::async_runtime::spawn(async move {
                match code {
                    // Dernière fenêtre fermée.
                    None => coordinator.on_all_windows_closed().await,
                    Some(code) => {
                        coordinator.on_before_quit().await;
                        coordinator.exit_gate().allow();
                        handle.exit(code);
                    }
                }
            });
        }
        RunEvent::Exit => {
            if let Some(coordinator) = app.try_state::<Coordinator>() {
                coordinator.supervisor().pid_slot().kill_now();
            }
            #[cfg(any(target_os = "macos", windows, target_os = "linux"))]
            updates::install_pending(app);
        }
        _ => {}
    }
}
