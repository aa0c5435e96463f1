use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use super::error::LifecycleError;

/// Événement UI: état du backend.
pub const EVENT_BACKEND_STATUS: &str = "backend-status";
/// Événement UI: erreur backend ou runtime.
pub const EVENT_BACKEND_ERROR: &str = "backend-error";
pub const EVENT_UPDATE_AVAILABLE: &str = "update-available";
pub const EVENT_UPDATE_DOWNLOADED: &str = "update-downloaded";
pub const EVENT_UPDATE_DOWNLOAD_PROGRESS: &str = "update-download-progress";

/// Cumul des octets reçus pendant le téléchargement d'une mise à jour.
#[derive(Debug, Default)]
pub struct DownloadProgress {
    downloaded: u64,
}

impl DownloadProgress {
    /// Ajoute un bloc reçu et renvoie la charge utile `{downloaded, total}`.
    pub fn record(&mut self, chunk_len: usize, total: Option<u64>) -> Value {
        self.downloaded += chunk_len as u64;
        serde_json::json!({ "downloaded": self.downloaded, "total": total })
    }
}

/// Contenu chargé dans la fenêtre principale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrontendSource {
    /// `index.html` du bundle local.
    LocalFile(PathBuf),
    /// Serveur HTTP local de repli.
    Url(String),
}

/// Préfère le bundle local, sinon `http://127.0.0.1:<port>/`.
pub fn resolve_frontend(frontend_dir: &Path, fallback_port: u16) -> FrontendSource {
    let index = frontend_dir.join("index.html");
    if index.is_file() {
        FrontendSource::LocalFile(index)
    } else {
        FrontendSource::Url(format!("http://127.0.0.1:{fallback_port}/"))
    }
}

/// Fichier du bundle local servi pour un chemin de requête.
///
/// Les routes sans extension retombent sur `index.html` (routeur côté client).
/// Tout chemin sortant de `root` est refusé.
pub fn resolve_asset(root: &Path, request_path: &str) -> Option<PathBuf> {
    let relative = request_path.trim_start_matches('/');
    let relative = if relative.is_empty() {
        "index.html"
    } else {
        relative
    };
    let candidate = Path::new(relative);
    if candidate
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }

    let file = root.join(candidate);
    if file.is_file() {
        return Some(file);
    }
    if candidate.extension().is_none() {
        let index = root.join("index.html");
        if index.is_file() {
            return Some(index);
        }
    }
    None
}

pub fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("js") | Some("mjs") => "text/javascript; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("json") | Some("map") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        Some("webp") => "image/webp",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        _ => "application/octet-stream",
    }
}

/// Opérations du shell graphique utilisées par le coordinateur.
#[async_trait]
pub trait ShellHost: Send + Sync {
    fn create_main_window(&self, source: &FrontendSource) -> Result<(), LifecycleError>;

    fn has_open_windows(&self) -> bool;

    /// Émet un événement vers la fenêtre; les erreurs d'émission sont journalisées par l'hôte.
    fn emit(&self, event: &str, payload: Value);

    /// Affiche un dialogue d'erreur bloquant et rend la main à sa fermeture.
    async fn show_blocking_error(&self, title: &str, message: &str);

    fn exit(&self, code: i32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_bundle_is_preferred_over_http() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            resolve_frontend(dir.path(), 8080),
            FrontendSource::Url("http://127.0.0.1:8080/".to_string())
        );

        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        assert_eq!(
            resolve_frontend(dir.path(), 8080),
            FrontendSource::LocalFile(dir.path().join("index.html"))
        );
    }

    #[test]
    fn download_progress_accumulates_chunks() {
        let mut progress = DownloadProgress::default();
        assert_eq!(
            progress.record(400, Some(1000)),
            serde_json::json!({ "downloaded": 400, "total": 1000 })
        );
        assert_eq!(
            progress.record(600, Some(1000)),
            serde_json::json!({ "downloaded": 1000, "total": 1000 })
        );

        let mut unknown = DownloadProgress::default();
        assert_eq!(
            unknown.record(10, None),
            serde_json::json!({ "downloaded": 10, "total": null })
        );
    }

    #[test]
    fn assets_resolve_inside_root_with_spa_fallback() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("index.html"), "<html></html>").unwrap();
        std::fs::write(dir.path().join("assets/app.js"), "console.log(1)").unwrap();

        let root = dir.path();
        assert_eq!(resolve_asset(root, "/"), Some(root.join("index.html")));
        assert_eq!(
            resolve_asset(root, "/assets/app.js"),
            Some(root.join("assets/app.js"))
        );
        assert_eq!(resolve_asset(root, "/players/12"), Some(root.join("index.html")));
        assert_eq!(resolve_asset(root, "/assets/missing.js"), None);
        assert_eq!(resolve_asset(root, "/../secret.txt"), None);
        assert_eq!(resolve_asset(root, "/assets/../../secret.txt"), None);

        assert_eq!(content_type(&root.join("assets/app.js")), "text/javascript; charset=utf-8");
        assert_eq!(content_type(Path::new("logo.SVG")), "image/svg+xml");
    }
}
