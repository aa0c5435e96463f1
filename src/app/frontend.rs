use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tauri::http::{header, Response, StatusCode};
use tauri::{Runtime, UriSchemeContext, UriSchemeResponder};

use crate::lifecycle::{content_type, resolve_asset};

/// Schéma servant le bundle frontend local.
pub const FRONTEND_SCHEME: &str = "gestoteam";

/// Dossier du bundle local, fixé à la création de la fenêtre.
#[derive(Default)]
pub struct FrontendRoot(Mutex<Option<PathBuf>>);

impl FrontendRoot {
    pub fn set(&self, root: PathBuf) {
        if let Ok(mut guard) = self.0.lock() {
            *guard = Some(root);
        }
    }

    fn get(&self) -> Option<PathBuf> {
        self.0.lock().ok().and_then(|guard| guard.clone())
    }
}

/// Origine du bundle local, selon la forme des schémas personnalisés du webview.
pub fn local_url() -> &'static str {
    if cfg!(any(windows, target_os = "android")) {
        "http://gestoteam.localhost/"
    } else {
        "gestoteam://localhost/"
    }
}

pub fn handle<R: Runtime>(
    ctx: UriSchemeContext<'_, R>,
    request: tauri::http::Request<Vec<u8>>,
    responder: UriSchemeResponder,
) {
    use tauri::Manager;

    let root = ctx
        .app_handle()
        .try_state::<FrontendRoot>()
        .and_then(|state| state.get());
    let path = request.uri().path().to_string();
    tauri::async_runtime::spawn(async move {
        responder.respond(respond(root.as_deref(), &path).await);
    });
}

async fn respond(root: Option<&Path>, request_path: &str) -> Response<Vec<u8>> {
    let Some(file) = root.and_then(|root| resolve_asset(root, request_path)) else {
        return status(StatusCode::NOT_FOUND);
    };
    match tokio::fs::read(&file).await {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type(&file))
            .body(body)
            .unwrap_or_else(|_| status(StatusCode::INTERNAL_SERVER_ERROR)),
        Err(e) => {
            log::warn!("Failed to read frontend asset {}: {e}", file.display());
            status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

fn status(code: StatusCode) -> Response<Vec<u8>> {
    let mut response = Response::new(Vec::new());
    *response.status_mut() = code;
    response
}
