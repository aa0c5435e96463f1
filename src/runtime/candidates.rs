use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::diagnostics::{RuntimeCandidate, RuntimeOrigin};

/// Lecture de variables d'environnement injectable pour les tests.
pub type EnvLookup<'a> = &'a (dyn Fn(&str) -> Option<String> + Send + Sync);

/// Retourne le nom de l'exécutable Java selon l'OS.
pub fn java_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "java.exe"
    } else {
        "java"
    }
}

/// Retourne le chemin de l'exécutable Java sous un `JAVA_HOME` donné.
pub fn runtime_binary(home: &Path) -> PathBuf {
    home.join("bin").join(java_binary_name())
}

/// Stratégie de recherche d'un runtime, évaluée dans l'ordre de la liste.
#[derive(Clone, Debug)]
pub enum CandidateProvider {
    /// Racines possibles du runtime embarqué (`app/java-runtime`).
    Bundled { roots: Vec<PathBuf> },
    /// Commande résolue par le PATH (`java`).
    PathLookup { command: String },
    /// Variable pointant vers la racine d'une installation.
    EnvVar { var: String },
    /// Installations connues: racines directes puis dossiers parents à explorer.
    WellKnownDir {
        homes: Vec<PathBuf>,
        scan_parents: Vec<PathBuf>,
    },
}

impl CandidateProvider {
    /// Origine associée aux candidats produits par cette stratégie.
    pub fn origin(&self) -> RuntimeOrigin {
        match self {
            Self::Bundled { .. } => RuntimeOrigin::Bundled,
            Self::PathLookup { .. } => RuntimeOrigin::SystemPath,
            Self::EnvVar { .. } => RuntimeOrigin::EnvironmentVariable,
            Self::WellKnownDir { .. } => RuntimeOrigin::WellKnownDirectory,
        }
    }

    /// Indique si les candidats doivent exister sur disque avant validation.
    pub fn requires_existing_path(&self) -> bool {
        !matches!(self, Self::PathLookup { .. })
    }

    /// Produit la liste ordonnée des candidats de cette stratégie.
    pub fn candidates(&self, env: EnvLookup<'_>) -> Vec<RuntimeCandidate> {
        let origin = self.origin();
        let paths: Vec<String> = match self {
            Self::Bundled { roots } => roots
                .iter()
                .map(|root| runtime_binary(root).to_string_lossy().to_string())
                .collect(),
            Self::PathLookup { command } => {
                let mut names = vec![command.clone()];
                if cfg!(target_os = "windows") && !command.ends_with(".exe") {
                    names.push(format!("{command}.exe"));
                }
                names
            }
            Self::EnvVar { var } => env(var)
                .map(|value| value.trim().trim_matches('"').to_string())
                .filter(|value| !value.is_empty())
                .map(|home| vec![runtime_binary(Path::new(&home)).to_string_lossy().to_string()])
                .unwrap_or_default(),
            Self::WellKnownDir {
                homes,
                scan_parents,
            } => {
                let mut found: Vec<PathBuf> = homes.iter().map(|h| runtime_binary(h)).collect();
                for parent in scan_parents {
                    found.extend(scan_installations(parent).iter().map(|h| runtime_binary(h)));
                }
                found
                    .into_iter()
                    .map(|p| p.to_string_lossy().to_string())
                    .collect()
            }
        };

        dedupe(paths)
            .into_iter()
            .map(|path| RuntimeCandidate { path, origin })
            .collect()
    }
}

/// Liste les installations d'un dossier parent, les plus récentes d'abord.
fn scan_installations(parent: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(parent) else {
        return Vec::new();
    };
    let mut homes: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .map(|path| {
            // Layout macOS: <jdk>.jdk/Contents/Home
            let mac_home = path.join("Contents").join("Home");
            if mac_home.is_dir() {
                mac_home
            } else {
                path
            }
        })
        .collect();
    homes.sort();
    homes.reverse();
    homes
}

/// Supprime les chemins dupliqués en conservant l'ordre.
fn dedupe(paths: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    paths.into_iter().filter(|p| seen.insert(p.clone())).collect()
}

/// Installations Java connues pour l'OS courant.
pub fn well_known_provider() -> CandidateProvider {
    let mut homes = Vec::new();
    let mut scan_parents = Vec::new();

    #[cfg(target_os = "windows")]
    {
        for base in ["C:\\Program Files\\Java", "C:\\Program Files (x86)\\Java"] {
            for version in ["17", "11", "21"] {
                homes.push(Path::new(base).join(format!("jdk-{version}")));
                homes.push(Path::new(base).join(format!("jre-{version}")));
            }
            scan_parents.push(PathBuf::from(base));
        }
        scan_parents.push(PathBuf::from("C:\\Program Files\\Eclipse Adoptium"));
    }

    #[cfg(target_os = "linux")]
    {
        homes.push(PathBuf::from("/usr/lib/jvm/default-java"));
        homes.push(PathBuf::from("/usr"));
        scan_parents.push(PathBuf::from("/usr/lib/jvm"));
        scan_parents.push(PathBuf::from("/opt/java"));
    }

    #[cfg(target_os = "macos")]
    {
        homes.push(PathBuf::from("/opt/homebrew/opt/openjdk"));
        homes.push(PathBuf::from("/usr/local/opt/openjdk"));
        scan_parents.push(PathBuf::from("/Library/Java/JavaVirtualMachines"));
    }

    CandidateProvider::WellKnownDir {
        homes,
        scan_parents,
    }
}

/// Racines possibles du runtime embarqué autour des ressources et de l'exécutable.
pub fn bundled_roots(resource_dir: Option<&Path>, bundled_dir: &str) -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Some(resource_dir) = resource_dir {
        roots.push(resource_dir.join(bundled_dir));
        roots.push(resource_dir.join("resources").join(bundled_dir));
    }

    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            roots.push(dir.join(bundled_dir));
            roots.push(dir.join("resources").join(bundled_dir));

            #[cfg(target_os = "macos")]
            {
                roots.push(dir.join("../Resources").join(bundled_dir));
            }

            #[cfg(target_os = "linux")]
            {
                let package = env!("CARGO_PKG_NAME");
                roots.push(dir.join(format!("../lib/{package}")).join(bundled_dir));
            }
        }
    }

    let mut seen = HashSet::new();
    roots
        .into_iter()
        .filter(|p| seen.insert(p.to_string_lossy().to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn env_var_provider_builds_bin_java_under_home() {
        let env = |name: &str| (name == "JAVA_HOME").then(|| "\"/opt/jdk-17\"".to_string());
        let provider = CandidateProvider::EnvVar {
            var: "JAVA_HOME".to_string(),
        };
        let candidates = provider.candidates(&env);
        assert_eq!(candidates.len(), 1);
        assert_eq!(
            candidates[0].path,
            runtime_binary(Path::new("/opt/jdk-17")).to_string_lossy()
        );
        assert_eq!(candidates[0].origin, RuntimeOrigin::EnvironmentVariable);
    }

    #[test]
    fn env_var_provider_is_empty_when_unset_or_blank() {
        let provider = CandidateProvider::EnvVar {
            var: "JAVA_HOME".to_string(),
        };
        assert!(provider.candidates(&no_env).is_empty());
        let blank = |_: &str| Some("   ".to_string());
        assert!(provider.candidates(&blank).is_empty());
    }

    #[test]
    fn well_known_scan_prefers_newest_and_macos_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("jdk-11")).unwrap();
        std::fs::create_dir_all(dir.path().join("jdk-17.jdk").join("Contents").join("Home")).unwrap();

        let provider = CandidateProvider::WellKnownDir {
            homes: vec![],
            scan_parents: vec![dir.path().to_path_buf()],
        };
        let paths: Vec<String> = provider
            .candidates(&no_env)
            .into_iter()
            .map(|c| c.path)
            .collect();
        assert_eq!(paths.len(), 2);
        assert!(paths[0].contains("jdk-17.jdk"));
        assert!(paths[0].contains("Home"));
        assert!(paths[1].contains("jdk-11"));
    }

    #[test]
    fn bundled_roots_start_with_resource_dir_and_are_unique() {
        let roots = bundled_roots(Some(Path::new("/res")), "app/java-runtime");
        assert_eq!(roots[0], Path::new("/res").join("app/java-runtime"));
        let unique: HashSet<_> = roots.iter().collect();
        assert_eq!(unique.len(), roots.len());
    }

    #[test]
    fn only_path_lookup_skips_existence_check() {
        let lookup = CandidateProvider::PathLookup {
            command: "java".to_string(),
        };
        assert!(!lookup.requires_existing_path());
        assert!(CandidateProvider::Bundled { roots: vec![] }.requires_existing_path());
        assert_eq!(lookup.candidates(&no_env)[0].path, "java");
    }
}
