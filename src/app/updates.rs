use std::sync::Mutex;

use serde_json::json;
use tauri::{AppHandle, Emitter, Manager};
use tauri_plugin_updater::{Update, UpdaterExt};

use crate::diagnostics::Journal;
use crate::lifecycle::{
    DownloadProgress, EVENT_UPDATE_AVAILABLE, EVENT_UPDATE_DOWNLOADED, EVENT_UPDATE_DOWNLOAD_PROGRESS,
};

/// Mise à jour téléchargée, installée à la sortie de l'application.
#[derive(Default)]
pub struct PendingUpdate(Mutex<Option<(Update, Vec<u8>)>>);

/// Cherche une mise à jour, la télécharge et prévient la fenêtre.
///
/// Les erreurs sont seulement journalisées.
pub async fn check_for_updates(app: AppHandle, journal: Journal) {
    let updater = match app.updater() {
        Ok(updater) => updater,
        Err(e) => {
            journal.warn(format!("Updater unavailable: {e}"), None);
            return;
        }
    };

    let update = match updater.check().await {
        Ok(Some(update)) => update,
        Ok(None) => {
            log::info!("No update available");
            return;
        }
        Err(e) => {
            journal.warn(format!("Update check failed: {e}"), None);
            return;
        }
    };

    journal.info(format!("Update {} available", update.version), None);
    let _ = app.emit(
        EVENT_UPDATE_AVAILABLE,
        json!({ "version": update.version, "notes": update.body }),
    );

    let mut progress = DownloadProgress::default();
    let progress_app = app.clone();
    let downloaded = update
        .download(
            move |chunk_len, total| {
                let payload = progress.record(chunk_len, total);
                let _ = progress_app.emit(EVENT_UPDATE_DOWNLOAD_PROGRESS, payload);
            },
            || log::info!("Update download finished"),
        )
        .await;

    match downloaded {
        Ok(bytes) => {
            journal.success(format!("Update {} downloaded", update.version), None);
            let _ = app.emit(EVENT_UPDATE_DOWNLOADED, json!({ "version": update.version }));
            if let Some(pending) = app.try_state::<PendingUpdate>() {
                if let Ok(mut slot) = pending.0.lock() {
                    *slot = Some((update, bytes));
                }
            }
        }
        Err(e) => {
            journal.error(format!("Update download failed: {e}"), None);
        }
    }
}

/// Installe la mise à jour en attente, s'il y en a une.
pub fn install_pending(app: &AppHandle) {
    let Some(pending) = app.try_state::<PendingUpdate>() else {
        return;
    };
    let taken = match pending.0.lock() {
        Ok(mut slot) => slot.take(),
        Err(_) => None,
    };
    if let Some((update, bytes)) = taken {
        if let Err(e) = update.install(bytes) {
            log::error!("Update install failed: {e}");
        }
    }
}
