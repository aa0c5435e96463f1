use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use super::error::LifecycleError;
use super::host::{resolve_frontend, ShellHost, EVENT_BACKEND_ERROR, EVENT_BACKEND_STATUS};
use crate::backend::{check_port, BackendEvent, BackendSnapshot, HealthCheckResult, Supervisor, SupervisorError};
use crate::config::{AppPaths, DesktopConfig, FailurePolicy};
use crate::diagnostics::{Journal, SystemReport};
use crate::runtime::{RuntimeLocator, RuntimeResolveDebugInfo};

const HTTP_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Autorisation de sortie accordée une fois le nettoyage terminé.
#[derive(Clone, Debug, Default)]
pub struct ExitGate(Arc<AtomicBool>);

impl ExitGate {
    pub fn allow(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_allowed(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Résultat de `test-backend-connection`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResult {
    pub tcp: HealthCheckResult,
    pub url: String,
    pub http_status: Option<u16>,
    pub http_error: Option<String>,
}

/// Lie le cycle de vie de l'application à celui du backend.
#[derive(Clone)]
pub struct Coordinator {
    host: Arc<dyn ShellHost>,
    supervisor: Supervisor,
    locator: RuntimeLocator,
    config: Arc<DesktopConfig>,
    paths: Arc<AppPaths>,
    journal: Journal,
    exit_gate: ExitGate,
    quit_on_all_closed: bool,
    app_version: String,
}

impl Coordinator {
    pub fn new(
        host: Arc<dyn ShellHost>,
        supervisor: Supervisor,
        locator: RuntimeLocator,
        config: DesktopConfig,
        paths: AppPaths,
        journal: Journal,
    ) -> Self {
        Self {
            host,
            supervisor,
            locator,
            config: Arc::new(config),
            paths: Arc::new(paths),
            journal,
            exit_gate: ExitGate::default(),
            // macOS garde l'application active sans fenêtre.
            quit_on_all_closed: !cfg!(target_os = "macos"),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn with_quit_on_all_closed(mut self, quit: bool) -> Self {
        self.quit_on_all_closed = quit;
        self
    }

    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    pub fn exit_gate(&self) -> ExitGate {
        self.exit_gate.clone()
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn config(&self) -> &DesktopConfig {
        &self.config
    }

    // ---- Cycle de vie ----

    /// Fenêtre principale, délai d'attache, résolution du runtime puis lancement.
    pub async fn on_app_ready(&self) -> Result<(), LifecycleError> {
        self.journal.info(
            format!("GestoTeam desktop {} starting", self.app_version),
            Some(json!({
                "resourceDir": self.paths.resource_dir,
                "dataDir": self.paths.data_dir,
            })),
        );

        let frontend_dir = self.paths.resolve_app_path(&self.config.frontend.path);
        let source = resolve_frontend(&frontend_dir, self.config.frontend.port);
        if let Err(error) = self.host.create_main_window(&source) {
            self.journal
                .critical(format!("Failed to create main window: {error}"), None);
            self.host
                .show_blocking_error("GestoTeam", &format!("The main window could not be created.\n\n{error}"))
                .await;
            self.request_exit(1);
            return Err(error);
        }

        tokio::time::sleep(self.config.window_attach_delay()).await;
        self.launch_backend().await.map(|_| ())
    }

    /// Résout le runtime et démarre le superviseur.
    pub async fn launch_backend(&self) -> Result<BackendSnapshot, LifecycleError> {
        let runtime = match self.locator.locate().await {
            Ok(runtime) => runtime,
            Err(error) => {
                self.journal.error(
                    format!("Java runtime not found: {error}"),
                    Some(json!({
                        "code": error.code,
                        "envVar": error.env_var,
                        "envValue": error.env_value,
                        "attempts": error.attempts,
                    })),
                );
                self.host.emit(
                    EVENT_BACKEND_ERROR,
                    json!({
                        "code": error.code,
                        "message": error.details,
                        "remediation": error.remediation(),
                        "fatal": true,
                    }),
                );
                self.host
                    .show_blocking_error("Java runtime not found", &error.remediation())
                    .await;
                self.request_exit(1);
                return Err(error.into());
            }
        };

        self.journal.info(
            format!("Java runtime resolved: {}", runtime.path),
            Some(json!({
                "origin": runtime.origin,
                "version": runtime.version_line,
            })),
        );

        let launch = self.config.launch_config(&runtime, &self.paths);
        match self.supervisor.start(launch).await {
            Ok(snapshot) => Ok(snapshot),
            Err(error @ SupervisorError::Spawn { .. }) => {
                // Les relances restent gérées par le superviseur.
                self.host.emit(
                    EVENT_BACKEND_ERROR,
                    json!({ "message": error.to_string(), "fatal": false }),
                );
                Err(error.into())
            }
            Err(error) => {
                self.journal
                    .error(format!("Backend could not be started: {error}"), None);
                self.host.emit(
                    EVENT_BACKEND_ERROR,
                    json!({ "message": error.to_string(), "fatal": true }),
                );
                self.host
                    .show_blocking_error(
                        "GestoTeam backend",
                        &format!("The backend could not be started.\n\n{error}"),
                    )
                    .await;
                if self.config.on_backend_failure == FailurePolicy::Terminate {
                    self.request_exit(1);
                }
                Err(error.into())
            }
        }
    }

    /// Relaie les événements du superviseur vers la fenêtre et applique la politique d'échec.
    pub fn spawn_event_forwarder(&self) -> JoinHandle<()> {
        let this = self.clone();
        let mut events = self.supervisor.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => this.forward_event(event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("Backend event forwarder lagged, {skipped} events skipped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    async fn forward_event(&self, event: BackendEvent) {
        match event {
            BackendEvent::StateChanged { snapshot } => {
                self.host.emit(EVENT_BACKEND_STATUS, json!(snapshot));
            }
            BackendEvent::Ready { .. } | BackendEvent::Health { .. } => {}
            BackendEvent::Failure {
                snapshot,
                reason,
                will_retry,
            } => {
                self.host.emit(
                    EVENT_BACKEND_ERROR,
                    json!({
                        "message": reason,
                        "attempt": snapshot.attempt_count,
                        "maxAttempts": snapshot.max_attempts,
                        "willRetry": will_retry,
                        "fatal": false,
                    }),
                );
            }
            BackendEvent::Exhausted { snapshot, reason } => {
                self.host.emit(
                    EVENT_BACKEND_ERROR,
                    json!({
                        "message": reason,
                        "attempt": snapshot.attempt_count,
                        "maxAttempts": snapshot.max_attempts,
                        "fatal": true,
                    }),
                );
                let logs = self
                    .journal
                    .log_dir()
                    .map(|dir| dir.display().to_string())
                    .unwrap_or_else(|| "unavailable".to_string());
                self.host
                    .show_blocking_error(
                        "GestoTeam backend failed",
                        &format!(
                            "The backend could not be started after {} attempts.\n\nLast error: {reason}\n\nLogs: {logs}",
                            snapshot.attempt_count
                        ),
                    )
                    .await;
                if self.config.on_backend_failure == FailurePolicy::Terminate {
                    self.shutdown_and_exit(1).await;
                }
            }
        }
    }

    /// Toutes les fenêtres sont fermées: arrêt du backend puis sortie selon la plateforme.
    pub async fn on_all_windows_closed(&self) {
        self.stop_backend().await;
        if self.quit_on_all_closed || !self.host.has_open_windows() {
            self.request_exit(0);
        }
    }

    /// Filet de sécurité avant sortie, quelle qu'en soit l'origine.
    pub async fn on_before_quit(&self) {
        self.stop_backend().await;
    }

    /// Erreur non rattrapée: CRITICAL, arrêt définitif du superviseur, dialogue, sortie.
    ///
    /// Le superviseur est fermé avant le dialogue: aucune relance ne peut
    /// survenir pendant que l'utilisateur le lit.
    pub async fn on_uncaught_error(&self, message: &str) {
        self.journal
            .critical(format!("Fatal application error: {message}"), None);
        match self.supervisor.shutdown().await {
            Ok(()) | Err(SupervisorError::Unavailable) => {}
            Err(error) => log::warn!("Backend shutdown failed: {error}"),
        }
        self.host
            .show_blocking_error(
                "GestoTeam encountered a fatal error",
                &format!("{message}\n\nThe application will now close."),
            )
            .await;
        self.request_exit(1);
    }

    async fn stop_backend(&self) {
        match self.supervisor.stop().await {
            Ok(_) | Err(SupervisorError::Unavailable) => {}
            Err(error) => log::warn!("Backend stop failed: {error}"),
        }
    }

    async fn shutdown_and_exit(&self, code: i32) {
        self.stop_backend().await;
        self.request_exit(code);
    }

    fn request_exit(&self, code: i32) {
        self.exit_gate.allow();
        self.host.exit(code);
    }

    // ---- Opérations IPC ----

    pub async fn backend_status(&self) -> Result<BackendSnapshot, LifecycleError> {
        Ok(self.supervisor.snapshot().await?)
    }

    /// Relance le backend; sans configuration stockée, refait la résolution du runtime.
    pub async fn restart_backend(&self) -> Result<BackendSnapshot, LifecycleError> {
        self.journal.info("Backend restart requested from UI", None);
        match self.supervisor.restart().await {
            Err(SupervisorError::NotConfigured) => self.launch_backend().await,
            other => Ok(other?),
        }
    }

    /// Sonde TCP puis `GET <health_path>` sur le backend.
    pub async fn test_backend_connection(&self) -> ConnectionTestResult {
        let port = self.config.backend.port;
        let tcp = check_port(port, Duration::from_millis(self.config.supervisor.health_timeout_ms)).await;
        let url = format!("http://127.0.0.1:{port}{}", self.config.backend.health_path);

        let (http_status, http_error) = match http_status(&url).await {
            Ok(status) => (Some(status), None),
            Err(error) => (None, Some(error.to_string())),
        };
        self.journal.info(
            "Backend connection test",
            Some(json!({ "tcp": tcp.success, "url": url, "httpStatus": http_status })),
        );

        ConnectionTestResult {
            tcp,
            url,
            http_status,
            http_error,
        }
    }

    pub async fn diagnose_runtime(&self) -> RuntimeResolveDebugInfo {
        self.locator.resolve_debug().await
    }

    /// Construit le rapport système, et l'enregistre si demandé.
    pub async fn system_report(
        &self,
        save: bool,
    ) -> Result<(SystemReport, Option<PathBuf>), LifecycleError> {
        let backend = self.supervisor.snapshot().await.ok();
        let runtime = self.locator.resolve_debug().await;
        let report = SystemReport::build(self.app_version.clone(), backend, Some(runtime), &self.journal)
            .with_path("resources", &self.paths.resource_dir)
            .with_path("data", &self.paths.data_dir)
            .with_path("logs", &self.paths.log_dir());

        let saved = if save {
            let path = report.save(&self.paths.report_dir())?;
            self.journal
                .info(format!("System report saved to {}", path.display()), None);
            Some(path)
        } else {
            None
        };
        Ok((report, saved))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.journal
            .log_dir()
            .map(|dir| dir.to_path_buf())
            .unwrap_or_else(|| self.paths.log_dir())
    }
}

async fn http_status(url: &str) -> Result<u16, LifecycleError> {
    let client = reqwest::Client::builder()
        .timeout(HTTP_TEST_TIMEOUT)
        .no_proxy()
        .build()
        .map_err(|e| LifecycleError::Connection(e.to_string()))?;
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| LifecycleError::Connection(e.to_string()))?;
    Ok(response.status().as_u16())
}

#[cfg(test)]
#[path = "coordinator_tests.rs"]
mod tests;
