use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::DiagnosticsError;

/// Fichier de log général (JSON lines).
pub const GENERAL_LOG_FILE: &str = "gestoteam-desktop.log";
/// Sous-ensemble ERROR/CRITICAL.
pub const ERROR_LOG_FILE: &str = "gestoteam-desktop-error.log";
/// Nombre d'entrées gardées en mémoire pour les rapports.
pub const RECENT_CAPACITY: usize = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    Critical,
    Success,
}

impl LogLevel {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }
}

/// Entrée structurée du journal applicatif.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

struct JournalState {
    general: Option<File>,
    errors: Option<File>,
    recent: VecDeque<LogEntry>,
}

/// Journal append-only partagé par tout le process.
#[derive(Clone)]
pub struct Journal {
    state: Arc<Mutex<JournalState>>,
    log_dir: Option<PathBuf>,
}

impl Journal {
    /// Ouvre (ou crée) les deux fichiers de log sous `dir`.
    pub fn open(dir: &Path) -> Result<Self, DiagnosticsError> {
        std::fs::create_dir_all(dir).map_err(|source| DiagnosticsError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let open = |name: &str| {
            let path = dir.join(name);
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| DiagnosticsError::Io { path, source })
        };
        let general = open(GENERAL_LOG_FILE)?;
        let errors = open(ERROR_LOG_FILE)?;

        Ok(Self {
            state: Arc::new(Mutex::new(JournalState {
                general: Some(general),
                errors: Some(errors),
                recent: VecDeque::with_capacity(RECENT_CAPACITY),
            })),
            log_dir: Some(dir.to_path_buf()),
        })
    }

    /// Journal sans fichiers (tests, ou dossier de logs indisponible).
    pub fn memory_only() -> Self {
        Self {
            state: Arc::new(Mutex::new(JournalState {
                general: None,
                errors: None,
                recent: VecDeque::with_capacity(RECENT_CAPACITY),
            })),
            log_dir: None,
        }
    }

    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, JournalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ajoute une entrée, la relaie au logger et l'écrit sur disque.
    pub fn record(&self, level: LogLevel, message: impl Into<String>, data: Option<Value>) -> LogEntry {
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            data,
        };

        match level {
            LogLevel::Info | LogLevel::Success => log::info!("{}", entry.message),
            LogLevel::Warn => log::warn!("{}", entry.message),
            LogLevel::Error | LogLevel::Critical => log::error!("[{:?}] {}", level, entry.message),
        }

        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(error) => {
                log::warn!("Failed to serialize log entry: {error}");
                return entry;
            }
        };

        let mut state = self.lock();
        if let Some(file) = state.general.as_mut() {
            if let Err(error) = writeln!(file, "{line}") {
                log::warn!("Failed to write general log: {error}");
            }
        }
        if level.is_error() {
            if let Some(file) = state.errors.as_mut() {
                if let Err(error) = writeln!(file, "{line}") {
                    log::warn!("Failed to write error log: {error}");
                }
            }
        }
        if state.recent.len() == RECENT_CAPACITY {
            state.recent.pop_front();
        }
        state.recent.push_back(entry.clone());
        entry
    }

    pub fn info(&self, message: impl Into<String>, data: Option<Value>) -> LogEntry {
        self.record(LogLevel::Info, message, data)
    }

    pub fn warn(&self, message: impl Into<String>, data: Option<Value>) -> LogEntry {
        self.record(LogLevel::Warn, message, data)
    }

    pub fn error(&self, message: impl Into<String>, data: Option<Value>) -> LogEntry {
        self.record(LogLevel::Error, message, data)
    }

    pub fn critical(&self, message: impl Into<String>, data: Option<Value>) -> LogEntry {
        self.record(LogLevel::Critical, message, data)
    }

    pub fn success(&self, message: impl Into<String>, data: Option<Value>) -> LogEntry {
        self.record(LogLevel::Success, message, data)
    }

    /// Retourne au plus `limit` entrées récentes, de la plus ancienne à la plus récente.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let state = self.lock();
        let skip = state.recent.len().saturating_sub(limit);
        state.recent.iter().skip(skip).cloned().collect()
    }
}
