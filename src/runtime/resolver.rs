use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use super::candidates::{self, CandidateProvider};
use super::diagnostics::{
    AttemptOutcome, RuntimeCandidate, RuntimeExecutable, RuntimeOrigin, RuntimeResolutionAttempt,
    RuntimeResolveDebugInfo, RuntimeResolveError,
};
use crate::utils::process::configure_command_no_window;

lazy_static::lazy_static! {
    /// Bannière `-version`: `openjdk version "17.0.2"`, `java version "1.8.0_381"`
    /// ou `openjdk 21.0.2` sans guillemets.
    static ref VERSION_RE: Regex =
        Regex::new(r#"(?m)(?:version\s+"?|^openjdk\s+)(\d+)(?:\.(\d+))?"#)
            .expect("valid version regex");
}

/// Runtime ayant répondu correctement à `-version`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidatedRuntime {
    pub version_line: Option<String>,
    pub major_version: Option<u32>,
}

/// Échec de validation d'un candidat.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationFailure {
    pub outcome: AttemptOutcome,
    pub detail: String,
}

/// Exécution d'essai d'un candidat runtime.
#[async_trait]
pub trait RuntimeValidator: Send + Sync {
    async fn validate(&self, candidate: &str) -> Result<ValidatedRuntime, ValidationFailure>;
}

/// Valide un candidat en lançant `<candidate> -version` avec un délai borné.
pub struct VersionCheck {
    timeout: Duration,
}

impl VersionCheck {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for VersionCheck {
    fn default() -> Self {
        Self::new(Duration::from_secs(10))
    }
}

#[async_trait]
impl RuntimeValidator for VersionCheck {
    async fn validate(&self, candidate: &str) -> Result<ValidatedRuntime, ValidationFailure> {
        let mut cmd = Command::new(candidate);
        cmd.arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        configure_command_no_window(&mut cmd);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(error)) => {
                let (outcome, detail) = classify_spawn_error(&error);
                return Err(ValidationFailure { outcome, detail });
            }
            Err(_) => {
                return Err(ValidationFailure {
                    outcome: AttemptOutcome::Timeout,
                    detail: format!("No answer to -version within {:?}", self.timeout),
                })
            }
        };

        // Java écrit sa bannière sur stderr.
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let banner = if stderr.trim().is_empty() {
            stdout.to_string()
        } else {
            stderr.to_string()
        };

        if !output.status.success() {
            let detail = first_non_empty_line(&banner);
            return Err(ValidationFailure {
                outcome: AttemptOutcome::ExecFailed,
                detail: if detail.is_empty() {
                    "Runtime returned non-zero exit status".to_string()
                } else {
                    detail
                },
            });
        }

        let line = first_non_empty_line(&banner);
        Ok(ValidatedRuntime {
            major_version: parse_major_version(&banner),
            version_line: (!line.is_empty()).then_some(line),
        })
    }
}

/// Extrait la version majeure d'une bannière Java (`1.8` compte pour 8).
pub fn parse_major_version(banner: &str) -> Option<u32> {
    let caps = VERSION_RE.captures(banner)?;
    let first: u32 = caps.get(1)?.as_str().parse().ok()?;
    if first == 1 {
        caps.get(2).and_then(|m| m.as_str().parse().ok())
    } else {
        Some(first)
    }
}

/// Retourne la première ligne non vide d'un texte.
fn first_non_empty_line(text: &str) -> String {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_default()
}

/// Classe une erreur de lancement de process en résultat applicatif stable.
pub fn classify_spawn_error(error: &std::io::Error) -> (AttemptOutcome, String) {
    if error.kind() == ErrorKind::NotFound {
        return (AttemptOutcome::Missing, "Runtime not found".to_string());
    }

    if error.kind() == ErrorKind::PermissionDenied {
        return (
            AttemptOutcome::NotExecutable,
            "Permission denied while executing runtime".to_string(),
        );
    }

    let msg = error.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("exec format error")
        || lower.contains("bad cpu type")
        || lower.contains("cannot execute")
    {
        return (AttemptOutcome::NotExecutable, msg);
    }

    (AttemptOutcome::ExecFailed, msg)
}

/// Réglages du locator indépendants des stratégies.
#[derive(Clone, Debug)]
pub struct LocatorSettings {
    /// Variable rapportée dans les diagnostics (`JAVA_HOME`).
    pub env_var: String,
    /// Commande PATH retentée quand le chemin retenu contient des espaces.
    pub path_command: String,
    pub prefer_path_on_whitespace: bool,
    /// Version majeure minimale acceptée.
    pub min_major_version: Option<u32>,
}

impl Default for LocatorSettings {
    fn default() -> Self {
        Self {
            env_var: "JAVA_HOME".to_string(),
            path_command: "java".to_string(),
            prefer_path_on_whitespace: true,
            min_major_version: Some(17),
        }
    }
}

type EnvFn = dyn Fn(&str) -> Option<String> + Send + Sync;

/// Recherche ordonnée d'un runtime Java exécutable.
#[derive(Clone)]
pub struct RuntimeLocator {
    providers: Vec<CandidateProvider>,
    validator: Arc<dyn RuntimeValidator>,
    env: Arc<EnvFn>,
    settings: LocatorSettings,
}

impl RuntimeLocator {
    pub fn new(providers: Vec<CandidateProvider>, validator: Arc<dyn RuntimeValidator>) -> Self {
        Self {
            providers,
            validator,
            env: Arc::new(|name: &str| std::env::var(name).ok()),
            settings: LocatorSettings::default(),
        }
    }

    /// Remplace la lecture de l'environnement.
    pub fn with_env<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(env);
        self
    }

    pub fn with_settings(mut self, settings: LocatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn providers(&self) -> &[CandidateProvider] {
        &self.providers
    }

    /// Retourne le premier runtime validé ou une erreur structurée.
    pub async fn locate(&self) -> Result<RuntimeExecutable, RuntimeResolveError> {
        self.locate_with_attempts().await.map(|(runtime, _)| runtime)
    }

    /// Retourne un diagnostic complet de résolution du runtime.
    pub async fn resolve_debug(&self) -> RuntimeResolveDebugInfo {
        match self.locate_with_attempts().await {
            Ok((runtime, attempts)) => RuntimeResolveDebugInfo {
                resolved: Some(runtime),
                error_code: None,
                error_details: None,
                attempts,
            },
            Err(err) => RuntimeResolveDebugInfo {
                resolved: None,
                error_code: Some(err.code),
                error_details: Some(err.details),
                attempts: err.attempts,
            },
        }
    }

    async fn locate_with_attempts(
        &self,
    ) -> Result<(RuntimeExecutable, Vec<RuntimeResolutionAttempt>), RuntimeResolveError> {
        let mut attempts = Vec::new();

        for provider in &self.providers {
            for candidate in provider.candidates(&*self.env) {
                let candidate = if provider.requires_existing_path() {
                    let path = Path::new(&candidate.path);
                    if !path.exists() {
                        attempts.push(attempt(&candidate, AttemptOutcome::Missing, None));
                        continue;
                    }
                    RuntimeCandidate {
                        path: path
                            .canonicalize()
                            .unwrap_or_else(|_| path.to_path_buf())
                            .to_string_lossy()
                            .to_string(),
                        origin: candidate.origin,
                    }
                } else {
                    candidate
                };

                let Some(runtime) = self.try_candidate(&candidate, &mut attempts).await else {
                    continue;
                };

                if self.settings.prefer_path_on_whitespace
                    && candidate.origin != RuntimeOrigin::SystemPath
                    && candidate.path.chars().any(char::is_whitespace)
                {
                    let path_form = RuntimeCandidate {
                        path: self.settings.path_command.clone(),
                        origin: RuntimeOrigin::SystemPath,
                    };
                    if let Some(path_runtime) = self.try_candidate(&path_form, &mut attempts).await
                    {
                        log::info!(
                            "Runtime path '{}' contains whitespace, using '{}' from PATH",
                            candidate.path,
                            path_form.path
                        );
                        return Ok((path_runtime, attempts));
                    }
                }

                return Ok((runtime, attempts));
            }
        }

        Err(self.build_error(attempts))
    }

    /// Valide un candidat et consigne la tentative.
    async fn try_candidate(
        &self,
        candidate: &RuntimeCandidate,
        attempts: &mut Vec<RuntimeResolutionAttempt>,
    ) -> Option<RuntimeExecutable> {
        match self.validator.validate(&candidate.path).await {
            Ok(validated) => {
                if let (Some(min), Some(major)) =
                    (self.settings.min_major_version, validated.major_version)
                {
                    if major < min {
                        attempts.push(attempt(
                            candidate,
                            AttemptOutcome::TooOld,
                            Some(format!("Java {major} found, {min} or newer required")),
                        ));
                        return None;
                    }
                }
                attempts.push(attempt(candidate, AttemptOutcome::Ok, None));
                Some(RuntimeExecutable {
                    path: candidate.path.clone(),
                    origin: candidate.origin,
                    version_line: validated.version_line,
                    major_version: validated.major_version,
                })
            }
            Err(failure) => {
                log::debug!(
                    "Runtime candidate '{}' rejected: {:?} {}",
                    candidate.path,
                    failure.outcome,
                    failure.detail
                );
                attempts.push(attempt(candidate, failure.outcome, Some(failure.detail)));
                None
            }
        }
    }

    fn build_error(&self, attempts: Vec<RuntimeResolutionAttempt>) -> RuntimeResolveError {
        let has_not_executable = attempts
            .iter()
            .any(|a| a.outcome == AttemptOutcome::NotExecutable);
        let has_exec_failed = attempts.iter().any(|a| {
            matches!(
                a.outcome,
                AttemptOutcome::ExecFailed | AttemptOutcome::Timeout | AttemptOutcome::TooOld
            )
        });
        let code = if has_not_executable {
            "RUNTIME_NOT_EXECUTABLE"
        } else if has_exec_failed {
            "RUNTIME_EXEC_FAILED"
        } else {
            "RUNTIME_NOT_FOUND"
        };
        let details = attempts
            .iter()
            .filter(|a| a.outcome != AttemptOutcome::Missing)
            .find_map(|a| a.detail.clone())
            .unwrap_or_else(|| "No usable Java runtime found".to_string());

        RuntimeResolveError {
            code: code.to_string(),
            details,
            env_var: self.settings.env_var.clone(),
            env_value: (self.env)(&self.settings.env_var),
            attempts,
        }
    }
}

fn attempt(
    candidate: &RuntimeCandidate,
    outcome: AttemptOutcome,
    detail: Option<String>,
) -> RuntimeResolutionAttempt {
    RuntimeResolutionAttempt {
        candidate: candidate.path.clone(),
        origin: candidate.origin,
        outcome,
        detail,
    }
}

/// Stratégies standard: embarqué, PATH, variable d'environnement, dossiers connus.
pub fn standard_providers(
    resource_dir: Option<&Path>,
    bundled_dir: &str,
    command: &str,
    env_var: &str,
) -> Vec<CandidateProvider> {
    vec![
        CandidateProvider::Bundled {
            roots: candidates::bundled_roots(resource_dir, bundled_dir),
        },
        CandidateProvider::PathLookup {
            command: command.to_string(),
        },
        CandidateProvider::EnvVar {
            var: env_var.to_string(),
        },
        candidates::well_known_provider(),
    ]
}
