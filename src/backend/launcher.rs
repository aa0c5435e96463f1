use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncRead;
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

use crate::utils::process::configure_command_no_window;

/// Signal d'arrêt transmis au process enfant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM sous Unix, TerminateProcess sous Windows.
    Terminate,
    /// Kill forcé.
    Kill,
}

/// Fin de vie observée du process enfant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitOutcome {
    /// Code de sortie, absent si le process a été tué par un signal.
    pub code: Option<i32>,
    pub description: String,
}

impl ExitOutcome {
    pub fn from_code(code: i32) -> Self {
        Self {
            code: Some(code),
            description: format!("exit code: {code}"),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<io::Result<ExitStatus>> for ExitOutcome {
    fn from(status: io::Result<ExitStatus>) -> Self {
        match status {
            Ok(status) => Self {
                code: status.code(),
                description: status.to_string(),
            },
            Err(error) => Self {
                code: None,
                description: format!("wait failed: {error}"),
            },
        }
    }
}

/// Process lancé, découplé de l'implémentation (tokio ou factice).
pub struct LaunchedProcess {
    pub pid: Option<u32>,
    pub stdout: Box<dyn AsyncRead + Send + Unpin>,
    pub stderr: Box<dyn AsyncRead + Send + Unpin>,
    /// Canal de signaux d'arrêt; le fermer tue le process.
    pub signals: mpsc::UnboundedSender<StopSignal>,
    /// Résolu une seule fois à la sortie du process.
    pub exited: oneshot::Receiver<ExitOutcome>,
}

/// Lancement d'un process enfant.
#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn launch(
        &self,
        executable: &str,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> io::Result<LaunchedProcess>;
}

/// Lanceur réel basé sur `tokio::process`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioLauncher;

#[async_trait]
impl ProcessLauncher for TokioLauncher {
    async fn launch(
        &self,
        executable: &str,
        args: &[String],
        working_dir: Option<&Path>,
    ) -> io::Result<LaunchedProcess> {
        let mut cmd = Command::new(executable);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = working_dir {
            cmd.current_dir(dir);
        }
        configure_command_no_window(&mut cmd);

        let mut child = cmd.spawn()?;
        let pid = child.id();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout was not captured"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("child stderr was not captured"))?;

        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        tokio::spawn(watch_child(child, signal_rx, exit_tx));

        Ok(LaunchedProcess {
            pid,
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            signals: signal_tx,
            exited: exit_rx,
        })
    }
}

/// Possède le `Child`: attend sa sortie et applique les signaux reçus.
async fn watch_child(
    mut child: Child,
    mut signals: mpsc::UnboundedReceiver<StopSignal>,
    exited: oneshot::Sender<ExitOutcome>,
) {
    let mut signals_open = true;
    let outcome = loop {
        tokio::select! {
            status = child.wait() => break ExitOutcome::from(status),
            signal = signals.recv(), if signals_open => match signal {
                Some(StopSignal::Terminate) => {
                    if let Err(error) = terminate(&mut child) {
                        log::warn!("Graceful termination failed: {error}");
                    }
                }
                Some(StopSignal::Kill) => {
                    if let Err(error) = child.start_kill() {
                        log::warn!("Forced kill failed: {error}");
                    }
                }
                None => {
                    signals_open = false;
                    let _ = child.start_kill();
                }
            },
        }
    };
    let _ = exited.send(outcome);
}

#[cfg(unix)]
fn terminate(child: &mut Child) -> io::Result<()> {
    match child.id() {
        Some(pid) => crate::utils::process::terminate_pid(pid),
        None => Ok(()),
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let mut process = TokioLauncher
            .launch(
                "sh",
                &["-c".to_string(), "echo ready; exit 3".to_string()],
                None,
            )
            .await
            .unwrap();
        assert!(process.pid.is_some());

        let mut out = String::new();
        process.stdout.read_to_string(&mut out).await.unwrap();
        assert_eq!(out.trim(), "ready");

        let outcome = process.exited.await.unwrap();
        assert_eq!(outcome.code, Some(3));
        assert!(!outcome.success());
    }

    #[tokio::test]
    async fn terminate_signal_stops_a_sleeping_child() {
        let process = TokioLauncher
            .launch("sleep", &["30".to_string()], None)
            .await
            .unwrap();
        process.signals.send(StopSignal::Terminate).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(5), process.exited)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.code, None);
    }

    #[tokio::test]
    async fn missing_executable_is_a_spawn_error() {
        let result = TokioLauncher
            .launch("/definitely/not/here/java", &[], None)
            .await;
        assert_eq!(result.err().map(|e| e.kind()), Some(io::ErrorKind::NotFound));
    }
}
