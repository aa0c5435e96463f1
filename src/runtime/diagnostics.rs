use serde::Serialize;

/// Origine d'un candidat runtime, dans l'ordre de recherche.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeOrigin {
    /// Runtime Java embarqué avec l'application.
    Bundled,
    /// Commande résolue via le PATH système.
    SystemPath,
    /// Dérivé d'une variable d'environnement (`JAVA_HOME`).
    EnvironmentVariable,
    /// Répertoire d'installation connu pour l'OS courant.
    WellKnownDirectory,
}

impl RuntimeOrigin {
    /// Retourne la clé technique courte de l'origine.
    pub fn as_key(&self) -> &'static str {
        match self {
            Self::Bundled => "bundled",
            Self::SystemPath => "system_path",
            Self::EnvironmentVariable => "environment_variable",
            Self::WellKnownDirectory => "well_known_directory",
        }
    }
}

/// Candidat éphémère produit par une stratégie de recherche.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RuntimeCandidate {
    /// Chemin absolu ou nom de commande à exécuter.
    pub path: String,
    /// Stratégie ayant produit le candidat.
    pub origin: RuntimeOrigin,
}

/// Résultat stable d'une tentative de validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Ok,
    Missing,
    NotExecutable,
    ExecFailed,
    Timeout,
    TooOld,
}

/// Décrit une tentative de résolution du runtime Java.
#[derive(Clone, Debug, Serialize)]
pub struct RuntimeResolutionAttempt {
    /// Chemin ou nom tenté.
    pub candidate: String,
    /// Source de la tentative.
    pub origin: RuntimeOrigin,
    /// Résultat de la tentative.
    pub outcome: AttemptOutcome,
    /// Détail éventuel en cas d'erreur.
    pub detail: Option<String>,
}

/// Runtime Java validé et prêt à lancer le backend.
#[derive(Clone, Debug, Serialize)]
pub struct RuntimeExecutable {
    /// Chemin (ou commande PATH) à passer au lanceur.
    pub path: String,
    /// Origine du candidat retenu.
    pub origin: RuntimeOrigin,
    /// Première ligne de `-version`.
    pub version_line: Option<String>,
    /// Version majeure extraite de la bannière.
    pub major_version: Option<u32>,
}

/// Erreur structurée de résolution du runtime.
#[derive(Clone, Debug, thiserror::Error)]
#[error("{code}: {details}")]
pub struct RuntimeResolveError {
    /// Code d'erreur stable côté application.
    pub code: String,
    /// Message de diagnostic principal.
    pub details: String,
    /// Variable d'environnement consultée.
    pub env_var: String,
    /// Valeur de la variable au moment de la recherche.
    pub env_value: Option<String>,
    /// Historique complet des tentatives.
    pub attempts: Vec<RuntimeResolutionAttempt>,
}

impl RuntimeResolveError {
    /// Construit le message de remédiation affiché à l'utilisateur.
    pub fn remediation(&self) -> String {
        let mut lines = vec![
            "GestoTeam could not find a working Java runtime (Java 17 or newer).".to_string(),
            String::new(),
            "Locations tried:".to_string(),
        ];
        for attempt in &self.attempts {
            let detail = attempt
                .detail
                .as_deref()
                .map(|d| format!(" ({d})"))
                .unwrap_or_default();
            lines.push(format!(
                "  - [{}] {}: {:?}{}",
                attempt.origin.as_key(),
                attempt.candidate,
                attempt.outcome,
                detail
            ));
        }
        lines.push(String::new());
        match self.env_value.as_deref() {
            Some(value) => lines.push(format!(
                "{} is set to '{}' but does not contain a usable bin/java.",
                self.env_var, value
            )),
            None => lines.push(format!("{} is not set.", self.env_var)),
        }
        lines.push(String::new());
        lines.push("To fix this:".to_string());
        lines.push("  1. Install Java 17 (or 21) from Oracle or OpenJDK.".to_string());
        lines.push(format!(
            "  2. Set {} to the installation directory.",
            self.env_var
        ));
        lines.push("  3. Add its bin directory to the system PATH, then restart GestoTeam.".to_string());
        lines.join("\n")
    }
}

/// Information de débogage complète exposée pour diagnostic.
#[derive(Clone, Debug, Serialize)]
pub struct RuntimeResolveDebugInfo {
    pub resolved: Option<RuntimeExecutable>,
    pub error_code: Option<String>,
    pub error_details: Option<String>,
    pub attempts: Vec<RuntimeResolutionAttempt>,
}
