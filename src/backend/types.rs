use std::collections::BTreeMap;
use std::net::{Ipv4Addr, TcpListener};
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::SupervisorError;

/// Marqueurs stdout signalant que le backend écoute.
pub const DEFAULT_READY_MARKERS: [&str; 4] = [
    "Tomcat started on port",
    "Started GestoteamApplication",
    "Started GestoteamBackendApplication",
    "Netty started on port",
];

/// État publié du process backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendState {
    /// Aucun démarrage demandé.
    Idle,
    Starting,
    Running,
    /// Sonde de santé en échec, relance en cours.
    Unresponsive,
    Stopped,
    /// Budget de tentatives épuisé (terminal).
    Failed,
}

/// Résultat d'une sonde TCP sur le port backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub success: bool,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub port: u16,
    pub latency_ms: Option<u64>,
}

/// Vue publiée du handle détenu par le superviseur.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSnapshot {
    /// Identifiant de la tentative courante.
    pub generation: u64,
    pub pid: Option<u32>,
    pub state: BackendState,
    pub started_at: Option<DateTime<Utc>>,
    pub ready_at: Option<DateTime<Utc>>,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub port: Option<u16>,
    pub executable: Option<String>,
    pub last_error: Option<String>,
    pub last_health: Option<HealthCheckResult>,
    /// Dernières lignes stderr du process courant.
    pub stderr_tail: Vec<String>,
}

impl BackendSnapshot {
    pub fn idle(max_attempts: u32) -> Self {
        Self {
            generation: 0,
            pid: None,
            state: BackendState::Idle,
            started_at: None,
            ready_at: None,
            attempt_count: 0,
            max_attempts,
            port: None,
            executable: None,
            last_error: None,
            last_health: None,
            stderr_tail: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == BackendState::Running
    }
}

/// Notification asynchrone émise par le superviseur.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum BackendEvent {
    StateChanged { snapshot: BackendSnapshot },
    Ready { snapshot: BackendSnapshot },
    Health { result: HealthCheckResult },
    Failure {
        snapshot: BackendSnapshot,
        reason: String,
        #[serde(rename = "willRetry")]
        will_retry: bool,
    },
    Exhausted {
        snapshot: BackendSnapshot,
        reason: String,
    },
}

impl BackendEvent {
    pub fn snapshot(&self) -> Option<&BackendSnapshot> {
        match self {
            Self::StateChanged { snapshot }
            | Self::Ready { snapshot }
            | Self::Failure { snapshot, .. }
            | Self::Exhausted { snapshot, .. } => Some(snapshot),
            Self::Health { .. } => None,
        }
    }
}

/// Paramètres de lancement du backend Java.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    pub executable: String,
    /// Commande PATH retentée si le lancement de `executable` échoue.
    pub fallback_executable: Option<String>,
    pub archive: PathBuf,
    pub port: u16,
    pub profile: String,
    /// Niveaux de log par composant (`--logging.level.<c>=<l>`).
    pub logging_levels: BTreeMap<String, String>,
    /// Options Spring supplémentaires (`--<opt>=<val>`).
    pub extra_options: BTreeMap<String, String>,
    pub jvm_args: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

impl LaunchConfig {
    pub fn new(executable: impl Into<String>, archive: impl Into<PathBuf>, port: u16) -> Self {
        Self {
            executable: executable.into(),
            fallback_executable: Some("java".to_string()),
            archive: archive.into(),
            port,
            profile: "local-client".to_string(),
            logging_levels: BTreeMap::new(),
            extra_options: BTreeMap::new(),
            jvm_args: Vec::new(),
            working_dir: None,
        }
    }

    /// Construit le vecteur d'arguments passé au runtime.
    pub fn args(&self) -> Vec<String> {
        let mut args = self.jvm_args.clone();
        args.push("-jar".to_string());
        args.push(self.archive.to_string_lossy().to_string());
        args.push(format!("--server.port={}", self.port));
        args.push(format!("--spring.profiles.active={}", self.profile));
        for (component, level) in &self.logging_levels {
            args.push(format!("--logging.level.{component}={level}"));
        }
        for (option, value) in &self.extra_options {
            args.push(format!("--{option}={value}"));
        }
        args
    }

    /// Vérifie l'archive et la disponibilité du port au moment de l'appel.
    pub fn validate(&self) -> Result<(), SupervisorError> {
        if self.executable.trim().is_empty() {
            return Err(SupervisorError::InvalidConfig(
                "runtime executable is empty".to_string(),
            ));
        }
        if self.port == 0 {
            return Err(SupervisorError::InvalidConfig("port 0 is not allowed".to_string()));
        }
        match std::fs::File::open(&self.archive) {
            Ok(file) => {
                let is_file = file.metadata().map(|m| m.is_file()).unwrap_or(false);
                if !is_file {
                    return Err(SupervisorError::InvalidConfig(format!(
                        "backend archive is not a file: {}",
                        self.archive.display()
                    )));
                }
            }
            Err(error) => {
                return Err(SupervisorError::InvalidConfig(format!(
                    "backend archive not readable: {} ({error})",
                    self.archive.display()
                )))
            }
        }
        if TcpListener::bind((Ipv4Addr::LOCALHOST, self.port)).is_err() {
            return Err(SupervisorError::PortInUse(self.port));
        }
        Ok(())
    }
}

/// Délais et budgets du superviseur.
#[derive(Clone, Debug)]
pub struct SupervisorSettings {
    pub max_attempts: u32,
    pub startup_timeout: Duration,
    pub health_interval: Duration,
    pub health_timeout: Duration,
    pub retry_backoff: Duration,
    /// Délai entre l'arrêt gracieux et le kill forcé.
    pub stop_grace: Duration,
    /// Délai après le kill forcé au-delà duquel le handle est libéré.
    pub kill_settle: Duration,
    pub ready_markers: Vec<String>,
    pub stderr_tail_lines: usize,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            startup_timeout: Duration::from_secs(30),
            health_interval: Duration::from_secs(5),
            health_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(5),
            stop_grace: Duration::from_secs(5),
            kill_settle: Duration::from_secs(2),
            ready_markers: DEFAULT_READY_MARKERS.iter().map(|m| m.to_string()).collect(),
            stderr_tail_lines: 50,
        }
    }
}

impl SupervisorSettings {
    /// Retourne le marqueur contenu dans une ligne stdout, s'il y en a un.
    pub fn ready_marker_in(&self, line: &str) -> Option<&str> {
        self.ready_markers
            .iter()
            .find(|marker| !marker.is_empty() && line.contains(marker.as_str()))
            .map(String::as_str)
    }
}
