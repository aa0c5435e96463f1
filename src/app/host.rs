use async_trait::async_trait;
use serde_json::Value;
use tauri::{AppHandle, Emitter, Manager, WebviewUrl, WebviewWindowBuilder};
use tauri_plugin_dialog::{DialogExt, MessageDialogButtons, MessageDialogKind};
use tokio::sync::oneshot;

use super::frontend::{self, FrontendRoot};
use crate::lifecycle::{FrontendSource, LifecycleError, ShellHost};

/// Label de la fenêtre principale.
pub const MAIN_WINDOW: &str = "main";

/// Implémentation de `ShellHost` sur un `AppHandle` Tauri.
pub struct TauriHost {
    app: AppHandle,
}

impl TauriHost {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }
}

fn webview_url(app: &AppHandle, source: &FrontendSource) -> Result<WebviewUrl, LifecycleError> {
    let raw = match source {
        FrontendSource::LocalFile(index) => {
            let root = index
                .parent()
                .ok_or_else(|| LifecycleError::Window(format!("invalid frontend path: {}", index.display())))?;
            match app.try_state::<FrontendRoot>() {
                Some(state) => state.set(root.to_path_buf()),
                None => return Err(LifecycleError::Window("frontend protocol not registered".into())),
            }
            frontend::local_url()
                .parse()
                .map_err(|e| LifecycleError::Window(format!("invalid frontend url: {e}")))?
        }
        FrontendSource::Url(url) => url
            .parse()
            .map_err(|e| LifecycleError::Window(format!("invalid frontend url {url}: {e}")))?,
    };
    Ok(WebviewUrl::External(raw))
}

#[async_trait]
impl ShellHost for TauriHost {
    fn create_main_window(&self, source: &FrontendSource) -> Result<(), LifecycleError> {
        if let Some(window) = self.app.get_webview_window(MAIN_WINDOW) {
            let _ = window.set_focus();
            return Ok(());
        }

        WebviewWindowBuilder::new(&self.app, MAIN_WINDOW, webview_url(&self.app, source)?)
            .title("GestoTeam")
            .inner_size(1280.0, 800.0)
            .min_inner_size(1024.0, 640.0)
            .center()
            .build()
            .map(|_| ())
            .map_err(|e| LifecycleError::Window(e.to_string()))
    }

    fn has_open_windows(&self) -> bool {
        !self.app.webview_windows().is_empty()
    }

    fn emit(&self, event: &str, payload: Value) {
        if let Err(e) = self.app.emit(event, payload) {
            log::warn!("Failed to emit {event}: {e}");
        }
    }

    async fn show_blocking_error(&self, title: &str, message: &str) {
        let (tx, rx) = oneshot::channel();
        self.app
            .dialog()
            .message(message)
            .title(title)
            .kind(MessageDialogKind::Error)
            .buttons(MessageDialogButtons::Ok)
            .show(move |_| {
                let _ = tx.send(());
            });
        let _ = rx.await;
    }

    fn exit(&self, code: i32) {
        self.app.exit(code);
    }
}
