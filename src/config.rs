//! Configuration du shell desktop.
//!
//! Ordre de résolution: valeurs par défaut, manifeste embarqué
//! `app/app-config.json`, réglages utilisateur `desktop-settings.json`, puis
//! variables d'environnement `GESTOTEAM_*`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backend::{LaunchConfig, SupervisorSettings, DEFAULT_READY_MARKERS};
use crate::runtime::{LocatorSettings, RuntimeExecutable};

/// Manifeste produit au packaging, relatif au dossier de ressources.
pub const MANIFEST_FILE: &str = "app/app-config.json";
/// Réglages utilisateur, relatifs au dossier de configuration.
pub const SETTINGS_FILE: &str = "desktop-settings.json";

const ENV_PORT: &str = "GESTOTEAM_BACKEND_PORT";
const ENV_PROFILE: &str = "GESTOTEAM_PROFILE";
const ENV_MAX_ATTEMPTS: &str = "GESTOTEAM_MAX_ATTEMPTS";
const ENV_JAR_PATH: &str = "GESTOTEAM_JAR_PATH";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} does not match the configuration schema: {source}", path.display())]
    Schema {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value '{value}' for {var}")]
    InvalidEnv { var: String, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Réaction à l'épuisement du budget de relances.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailurePolicy {
    /// Ferme l'application après le dialogue d'erreur.
    #[default]
    Terminate,
    /// Garde la fenêtre ouverte en mode dégradé.
    KeepWindow,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    /// Archive du backend, relative au dossier `app/`.
    pub jar_path: String,
    pub port: u16,
    pub profile: String,
    pub logging_levels: BTreeMap<String, String>,
    pub extra_options: BTreeMap<String, String>,
    pub jvm_args: Vec<String>,
    /// Route HTTP utilisée par le test de connexion.
    pub health_path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            jar_path: "backend/gestoteam-backend.jar".to_string(),
            port: 8081,
            profile: "local-client".to_string(),
            logging_levels: BTreeMap::new(),
            extra_options: BTreeMap::new(),
            jvm_args: Vec::new(),
            health_path: "/api/health".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Runtime embarqué, relatif au dossier de ressources.
    pub bundled_dir: String,
    pub command: String,
    pub home_var: String,
    pub min_major_version: Option<u32>,
    pub prefer_path_on_whitespace: bool,
    pub validation_timeout_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bundled_dir: "app/java-runtime".to_string(),
            command: "java".to_string(),
            home_var: "JAVA_HOME".to_string(),
            min_major_version: Some(17),
            prefer_path_on_whitespace: true,
            validation_timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupervisorConfig {
    pub max_attempts: u32,
    pub startup_timeout_ms: u64,
    pub health_interval_ms: u64,
    pub health_timeout_ms: u64,
    pub retry_backoff_ms: u64,
    pub stop_grace_ms: u64,
    pub kill_settle_ms: u64,
    pub ready_markers: Vec<String>,
    pub stderr_tail_lines: usize,
    /// Délai entre la création de la fenêtre et le lancement du backend.
    pub window_attach_delay_ms: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            startup_timeout_ms: 30_000,
            health_interval_ms: 5_000,
            health_timeout_ms: 5_000,
            retry_backoff_ms: 5_000,
            stop_grace_ms: 5_000,
            kill_settle_ms: 2_000,
            ready_markers: DEFAULT_READY_MARKERS.iter().map(|m| m.to_string()).collect(),
            stderr_tail_lines: 50,
            window_attach_delay_ms: 1_500,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrontendConfig {
    /// Bundle statique, relatif au dossier `app/`.
    pub path: String,
    /// Port HTTP de repli quand le bundle local est absent.
    pub port: u16,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            path: "frontend".to_string(),
            port: 8080,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DesktopConfig {
    pub backend: BackendConfig,
    pub runtime: RuntimeConfig,
    pub supervisor: SupervisorConfig,
    pub frontend: FrontendConfig,
    pub on_backend_failure: FailurePolicy,
    pub auto_update: bool,
}

/// Emplacements de l'application sur disque.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppPaths {
    pub resource_dir: PathBuf,
    pub data_dir: PathBuf,
    pub config_dir: PathBuf,
}

impl AppPaths {
    pub fn new(resource_dir: PathBuf, data_dir: PathBuf, config_dir: PathBuf) -> Self {
        Self {
            resource_dir,
            data_dir,
            config_dir,
        }
    }

    /// Emplacements par défaut: ressources à côté de l'exécutable, données via `dirs`.
    pub fn from_system(app_name: &str) -> Self {
        let resource_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(app_name);
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| data_dir.clone())
            .join(app_name);
        Self::new(resource_dir, data_dir, config_dir)
    }

    /// Dossier `app/` contenant backend et frontend.
    pub fn app_dir(&self) -> PathBuf {
        self.resource_dir.join("app")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }

    pub fn report_dir(&self) -> PathBuf {
        self.data_dir.join("reports")
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.resource_dir.join(MANIFEST_FILE)
    }

    pub fn settings_file(&self) -> PathBuf {
        self.config_dir.join(SETTINGS_FILE)
    }

    /// Résout un chemin relatif au dossier `app/`.
    pub fn resolve_app_path(&self, raw: &str) -> PathBuf {
        let trimmed = raw.trim().trim_start_matches("./");
        let path = Path::new(trimmed);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.app_dir().join(path)
        }
    }
}

/// Configuration chargée et couches de fichiers écartées.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: DesktopConfig,
    /// Fichiers illisibles ou invalides, ignorés au chargement.
    pub skipped: Vec<ConfigError>,
}

impl DesktopConfig {
    /// Charge la configuration complète pour l'application installée.
    pub fn load(paths: &AppPaths) -> Result<LoadedConfig, ConfigError> {
        Self::load_from(
            Some(&paths.manifest_file()),
            Some(&paths.settings_file()),
            &|name| std::env::var(name).ok(),
        )
    }

    /// Charge la configuration à partir de sources explicites.
    ///
    /// Un fichier illisible, mal formé ou hors schéma est écarté seul: les
    /// autres couches s'appliquent quand même. Les variables d'environnement
    /// invalides restent une erreur.
    pub fn load_from(
        manifest: Option<&Path>,
        settings: Option<&Path>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<LoadedConfig, ConfigError> {
        let mut merged = serde_json::to_value(Self::default()).map_err(|e| {
            ConfigError::Invalid(format!("default configuration not serializable: {e}"))
        })?;
        let mut skipped = Vec::new();
        for path in [manifest, settings].into_iter().flatten() {
            let layer = match read_layer(path) {
                Ok(Some(layer)) => layer,
                Ok(None) => continue,
                Err(error) => {
                    log::warn!("Configuration layer skipped: {error}");
                    skipped.push(error);
                    continue;
                }
            };
            let mut candidate = merged.clone();
            merge_json(&mut candidate, layer);
            match serde_json::from_value::<Self>(candidate.clone()) {
                Ok(_) => {
                    log::info!("Configuration layer loaded from {}", path.display());
                    merged = candidate;
                }
                Err(source) => {
                    let error = ConfigError::Schema {
                        path: path.to_path_buf(),
                        source,
                    };
                    log::warn!("Configuration layer skipped: {error}");
                    skipped.push(error);
                }
            }
        }

        let mut config: Self = serde_json::from_value(merged)
            .map_err(|e| ConfigError::Invalid(format!("configuration does not match schema: {e}")))?;
        config.apply_env(env)?;
        config.validate()?;
        Ok(LoadedConfig { config, skipped })
    }

    fn apply_env(&mut self, env: &dyn Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let read = |var: &str| env(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let invalid = |var: &str, value: &str| ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
        };

        if let Some(value) = read(ENV_PORT) {
            self.backend.port = value.parse().map_err(|_| invalid(ENV_PORT, &value))?;
        }
        if let Some(value) = read(ENV_PROFILE) {
            self.backend.profile = value;
        }
        if let Some(value) = read(ENV_MAX_ATTEMPTS) {
            self.supervisor.max_attempts =
                value.parse().map_err(|_| invalid(ENV_MAX_ATTEMPTS, &value))?;
        }
        if let Some(value) = read(ENV_JAR_PATH) {
            self.backend.jar_path = value;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.supervisor.max_attempts == 0 {
            return Err(ConfigError::Invalid("maxAttempts must be at least 1".to_string()));
        }
        if self.backend.port == 0 {
            return Err(ConfigError::Invalid("backend port must not be 0".to_string()));
        }
        if self.supervisor.ready_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "at least one readiness marker is required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        let s = &self.supervisor;
        SupervisorSettings {
            max_attempts: s.max_attempts,
            startup_timeout: Duration::from_millis(s.startup_timeout_ms),
            health_interval: Duration::from_millis(s.health_interval_ms),
            health_timeout: Duration::from_millis(s.health_timeout_ms),
            retry_backoff: Duration::from_millis(s.retry_backoff_ms),
            stop_grace: Duration::from_millis(s.stop_grace_ms),
            kill_settle: Duration::from_millis(s.kill_settle_ms),
            ready_markers: s.ready_markers.clone(),
            stderr_tail_lines: s.stderr_tail_lines,
        }
    }

    pub fn locator_settings(&self) -> LocatorSettings {
        LocatorSettings {
            env_var: self.runtime.home_var.clone(),
            path_command: self.runtime.command.clone(),
            prefer_path_on_whitespace: self.runtime.prefer_path_on_whitespace,
            min_major_version: self.runtime.min_major_version,
        }
    }

    pub fn window_attach_delay(&self) -> Duration {
        Duration::from_millis(self.supervisor.window_attach_delay_ms)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.runtime.validation_timeout_ms)
    }

    /// Construit les paramètres de lancement pour un runtime résolu.
    pub fn launch_config(&self, runtime: &RuntimeExecutable, paths: &AppPaths) -> LaunchConfig {
        let archive = paths.resolve_app_path(&self.backend.jar_path);
        let mut launch = LaunchConfig::new(runtime.path.clone(), archive, self.backend.port);
        launch.fallback_executable = Some(self.runtime.command.clone());
        launch.profile = self.backend.profile.clone();
        launch.logging_levels = self.backend.logging_levels.clone();
        launch.extra_options = self.backend.extra_options.clone();
        launch.jvm_args = self.backend.jvm_args.clone();
        launch.working_dir = Some(paths.app_dir());
        launch
    }
}

fn read_layer(path: &Path) -> Result<Option<Value>, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

/// Fusionne récursivement `overlay` dans `base`; les objets sont fusionnés, le reste remplacé.
fn merge_json(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RuntimeOrigin;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn defaults_match_packaged_layout() {
        let config = DesktopConfig::load_from(None, None, &no_env).unwrap().config;
        assert_eq!(config.backend.port, 8081);
        assert_eq!(config.backend.profile, "local-client");
        assert_eq!(config.supervisor.max_attempts, 3);
        assert_eq!(config.frontend.port, 8080);
        assert_eq!(config.on_backend_failure, FailurePolicy::Terminate);
        assert_eq!(config.supervisor.ready_markers.len(), 4);
    }

    #[test]
    fn manifest_then_settings_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("app-config.json");
        std::fs::write(
            &manifest,
            r#"{
                "version": "1.0.0",
                "buildDate": "2025-01-01T00:00:00Z",
                "backend": {"version": "0.9.0", "jarPath": "./backend/gestoteam-backend.jar", "port": 9090, "profile": "packaged"},
                "frontend": {"version": "0.9.0", "path": "./frontend", "port": 8088}
            }"#,
        )
        .unwrap();
        let settings = dir.path().join("desktop-settings.json");
        std::fs::write(
            &settings,
            r#"{"backend": {"port": 9191}, "supervisor": {"maxAttempts": 5}, "onBackendFailure": "keepWindow"}"#,
        )
        .unwrap();

        let env = |name: &str| (name == "GESTOTEAM_PROFILE").then(|| "demo".to_string());
        let loaded = DesktopConfig::load_from(Some(&manifest), Some(&settings), &env).unwrap();
        assert!(loaded.skipped.is_empty());
        let config = loaded.config;
        assert_eq!(config.backend.port, 9191);
        assert_eq!(config.backend.profile, "demo");
        assert_eq!(config.backend.jar_path, "./backend/gestoteam-backend.jar");
        assert_eq!(config.frontend.port, 8088);
        assert_eq!(config.supervisor.max_attempts, 5);
        assert_eq!(config.supervisor.startup_timeout_ms, 30_000);
        assert_eq!(config.on_backend_failure, FailurePolicy::KeepWindow);
    }

    #[test]
    fn broken_settings_keep_manifest_values() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("app-config.json");
        std::fs::write(
            &manifest,
            r#"{"backend": {"jarPath": "backend/custom.jar", "port": 9090}}"#,
        )
        .unwrap();
        let settings = dir.path().join("desktop-settings.json");
        std::fs::write(&settings, "{ not json").unwrap();

        let loaded = DesktopConfig::load_from(Some(&manifest), Some(&settings), &no_env).unwrap();
        assert_eq!(loaded.config.backend.port, 9090);
        assert_eq!(loaded.config.backend.jar_path, "backend/custom.jar");
        assert_eq!(loaded.skipped.len(), 1);
        assert!(matches!(&loaded.skipped[0], ConfigError::Parse { path, .. } if path == &settings));
    }

    #[test]
    fn settings_with_wrong_types_are_skipped_alone() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("app-config.json");
        std::fs::write(&manifest, r#"{"backend": {"port": 9090}}"#).unwrap();
        let settings = dir.path().join("desktop-settings.json");
        std::fs::write(&settings, r#"{"backend": {"port": "eighty"}}"#).unwrap();

        let loaded = DesktopConfig::load_from(Some(&manifest), Some(&settings), &no_env).unwrap();
        assert_eq!(loaded.config.backend.port, 9090);
        assert!(matches!(&loaded.skipped[0], ConfigError::Schema { .. }));
    }

    #[test]
    fn invalid_sources_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        let loaded = DesktopConfig::load_from(Some(&broken), None, &no_env).unwrap();
        assert_eq!(loaded.config, DesktopConfig::default());
        assert!(matches!(&loaded.skipped[0], ConfigError::Parse { .. }));

        let env = |name: &str| (name == "GESTOTEAM_BACKEND_PORT").then(|| "eighty".to_string());
        assert!(matches!(
            DesktopConfig::load_from(None, None, &env),
            Err(ConfigError::InvalidEnv { .. })
        ));

        let env = |name: &str| (name == "GESTOTEAM_MAX_ATTEMPTS").then(|| "0".to_string());
        assert!(matches!(
            DesktopConfig::load_from(None, None, &env),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn launch_config_resolves_archive_under_app_dir() {
        let paths = AppPaths::new(
            PathBuf::from("/opt/gestoteam/resources"),
            PathBuf::from("/data"),
            PathBuf::from("/config"),
        );
        let mut config = DesktopConfig::default();
        config.backend.jar_path = "./backend/gestoteam-backend.jar".to_string();
        let runtime = RuntimeExecutable {
            path: "/opt/gestoteam/resources/app/java-runtime/bin/java".to_string(),
            origin: RuntimeOrigin::Bundled,
            version_line: None,
            major_version: Some(17),
        };

        let launch = config.launch_config(&runtime, &paths);
        assert_eq!(
            launch.archive,
            PathBuf::from("/opt/gestoteam/resources/app/backend/gestoteam-backend.jar")
        );
        assert_eq!(launch.fallback_executable.as_deref(), Some("java"));
        assert_eq!(launch.port, 8081);
        assert_eq!(paths.log_dir(), PathBuf::from("/data/logs"));
        assert_eq!(
            paths.manifest_file(),
            PathBuf::from("/opt/gestoteam/resources/app/app-config.json")
        );
    }

    #[test]
    fn merge_replaces_scalars_and_merges_objects() {
        let mut base = serde_json::json!({"a": {"b": 1, "c": 2}, "d": [1]});
        merge_json(&mut base, serde_json::json!({"a": {"b": 3}, "d": [2, 3]}));
        assert_eq!(base, serde_json::json!({"a": {"b": 3, "c": 2}, "d": [2, 3]}));
    }
}
