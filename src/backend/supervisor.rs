//! Superviseur du process backend.
//!
//! Un acteur tokio unique possède le handle du process et tout l'état associé.
//! Les commandes publiques arrivent par un canal mpsc avec réponse oneshot; la
//! sortie du process, les timers et les sondes de santé arrivent par un canal
//! interne, chaque message portant la génération de la tentative qui l'a émis.
//! Les messages d'une génération périmée sont ignorés.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use super::error::SupervisorError;
use super::health::HealthMonitor;
use super::launcher::{ExitOutcome, LaunchedProcess, ProcessLauncher, StopSignal};
use super::pid_slot::ChildPidSlot;
use super::types::{
    BackendEvent, BackendSnapshot, BackendState, HealthCheckResult, LaunchConfig,
    SupervisorSettings,
};
use crate::diagnostics::Journal;

const COMMAND_CAPACITY: usize = 32;
const EVENT_CAPACITY: usize = 64;

type StartReply = oneshot::Sender<Result<BackendSnapshot, SupervisorError>>;

enum Command {
    Start {
        config: LaunchConfig,
        reply: StartReply,
    },
    Stop {
        reply: oneshot::Sender<BackendSnapshot>,
    },
    Restart {
        reply: StartReply,
    },
    Snapshot {
        reply: oneshot::Sender<BackendSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

enum Internal {
    Stdout { generation: u64, line: String },
    Stderr { generation: u64, line: String },
    Exited { generation: u64, outcome: ExitOutcome },
    StartupTimeout { generation: u64 },
    Health { generation: u64, result: HealthCheckResult },
    GraceElapsed { generation: u64 },
    KillSettled { generation: u64 },
    RetryDue { epoch: u64 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StopPhase {
    Terminating,
    Killing,
}

/// Process en vie détenu par l'acteur.
struct CurrentProcess {
    generation: u64,
    pid: Option<u32>,
    signals: mpsc::UnboundedSender<StopSignal>,
    stopping: Option<StopPhase>,
    stop_timer: Option<JoinHandle<()>>,
}

impl CurrentProcess {
    fn is_alive(&self) -> bool {
        self.stopping.is_none()
    }
}

/// Handle clonable vers l'acteur superviseur.
#[derive(Clone)]
pub struct Supervisor {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<BackendEvent>,
    pid_slot: ChildPidSlot,
}

impl Supervisor {
    /// Démarre l'acteur sur le runtime tokio courant.
    pub fn spawn(
        launcher: Arc<dyn ProcessLauncher>,
        settings: SupervisorSettings,
        journal: Journal,
    ) -> Self {
        let (commands, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let pid_slot = ChildPidSlot::new();
        let actor = Actor::new(launcher, settings, journal, events.clone(), pid_slot.clone());
        tokio::spawn(actor.run(command_rx));
        Self {
            commands,
            events,
            pid_slot,
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| SupervisorError::Unavailable)?;
        rx.await.map_err(|_| SupervisorError::Unavailable)
    }

    /// Lance le backend. Sans effet si un démarrage ou une relance est déjà en cours.
    pub async fn start(&self, config: LaunchConfig) -> Result<BackendSnapshot, SupervisorError> {
        self.request(|reply| Command::Start { config, reply }).await?
    }

    /// Arrête le backend (gracieux puis forcé). Idempotent.
    pub async fn stop(&self) -> Result<BackendSnapshot, SupervisorError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Arrête puis relance avec la dernière configuration, compteur remis à zéro.
    pub async fn restart(&self) -> Result<BackendSnapshot, SupervisorError> {
        self.request(|reply| Command::Restart { reply }).await?
    }

    pub async fn snapshot(&self) -> Result<BackendSnapshot, SupervisorError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Arrête le backend puis termine l'acteur.
    pub async fn shutdown(&self) -> Result<(), SupervisorError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackendEvent> {
        self.events.subscribe()
    }

    /// Pid du process courant, lisible depuis un hook de panic.
    pub fn pid_slot(&self) -> ChildPidSlot {
        self.pid_slot.clone()
    }
}

struct Actor {
    launcher: Arc<dyn ProcessLauncher>,
    settings: SupervisorSettings,
    journal: Journal,
    events: broadcast::Sender<BackendEvent>,
    pid_slot: ChildPidSlot,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: Option<mpsc::UnboundedReceiver<Internal>>,

    snapshot: BackendSnapshot,
    config: Option<LaunchConfig>,
    current: Option<CurrentProcess>,
    stderr_tail: VecDeque<String>,
    generation: u64,
    /// Incrémenté à chaque arrêt pour invalider les relances planifiées.
    epoch: u64,
    retry_pending: bool,
    retry_timer: Option<JoinHandle<()>>,
    startup_timer: Option<JoinHandle<()>>,
    health: HealthMonitor,

    stop_waiters: Vec<oneshot::Sender<BackendSnapshot>>,
    pending_start: Option<(LaunchConfig, StartReply)>,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
    shutting_down: bool,
}

impl Actor {
    fn new(
        launcher: Arc<dyn ProcessLauncher>,
        settings: SupervisorSettings,
        journal: Journal,
        events: broadcast::Sender<BackendEvent>,
        pid_slot: ChildPidSlot,
    ) -> Self {
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let snapshot = BackendSnapshot::idle(settings.max_attempts);
        Self {
            launcher,
            settings,
            journal,
            events,
            pid_slot,
            internal_tx,
            internal_rx: Some(internal_rx),
            snapshot,
            config: None,
            current: None,
            stderr_tail: VecDeque::new(),
            generation: 0,
            epoch: 0,
            retry_pending: false,
            retry_timer: None,
            startup_timer: None,
            health: HealthMonitor::new(),
            stop_waiters: Vec::new(),
            pending_start: None,
            shutdown_waiters: Vec::new(),
            shutting_down: false,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let Some(mut internal) = self.internal_rx.take() else {
            return;
        };
        let mut commands_open = true;

        loop {
            if self.shutting_down && self.current.is_none() {
                break;
            }

            tokio::select! {
                biased;

                Some(event) = internal.recv() => self.handle_internal(event).await,

                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        commands_open = false;
                        log::info!("Supervisor handles dropped, stopping backend");
                        self.begin_shutdown();
                    }
                },
            }
        }

        self.cancel_timers();
        self.health.stop_polling();
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
        log::info!("Backend supervisor terminated");
    }

    // ---- Commandes ----

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { config, reply } => self.on_start(config, reply).await,
            Command::Stop { reply } => {
                self.request_stop();
                if self.current.is_some() {
                    self.stop_waiters.push(reply);
                } else {
                    let _ = reply.send(self.current_snapshot());
                }
            }
            Command::Restart { reply } => match self.config.clone() {
                Some(config) => {
                    self.journal.info("Restarting backend", None);
                    self.request_stop();
                    self.on_start(config, reply).await;
                }
                None => {
                    let _ = reply.send(Err(SupervisorError::NotConfigured));
                }
            },
            Command::Snapshot { reply } => {
                let _ = reply.send(self.current_snapshot());
            }
            Command::Shutdown { reply } => {
                self.shutdown_waiters.push(reply);
                self.begin_shutdown();
            }
        }
    }

    async fn on_start(&mut self, config: LaunchConfig, reply: StartReply) {
        if self.shutting_down {
            let _ = reply.send(Err(SupervisorError::Unavailable));
            return;
        }

        let busy = self.retry_pending || self.current.as_ref().is_some_and(CurrentProcess::is_alive);
        if busy {
            log::debug!("Start ignored, backend already {:?}", self.snapshot.state);
            let _ = reply.send(Ok(self.current_snapshot()));
            return;
        }

        if self.current.is_some() {
            // Le process précédent doit sortir avant une nouvelle tentative.
            if let Some((_, previous)) = self.pending_start.replace((config, reply)) {
                let _ = previous.send(Ok(self.current_snapshot()));
            }
            return;
        }

        self.begin_start(config, reply).await;
    }

    async fn begin_start(&mut self, config: LaunchConfig, reply: StartReply) {
        if let Err(error) = config.validate() {
            self.journal.error(
                format!("Backend launch rejected: {error}"),
                Some(json!({ "archive": config.archive, "port": config.port })),
            );
            let _ = reply.send(Err(error));
            return;
        }

        self.config = Some(config);
        self.epoch += 1;
        self.snapshot.attempt_count = 0;
        self.snapshot.max_attempts = self.settings.max_attempts;
        self.snapshot.last_error = None;

        let result = self.spawn_attempt().await;
        let _ = reply.send(result.map(|()| self.current_snapshot()));
    }

    /// Annule relances et timers puis demande l'arrêt du process courant.
    fn request_stop(&mut self) {
        self.epoch += 1;
        self.retry_pending = false;
        self.cancel_timers();
        self.health.stop_polling();
        if let Some((_, reply)) = self.pending_start.take() {
            let _ = reply.send(Ok(self.current_snapshot()));
        }

        if self.current.is_none() {
            if matches!(
                self.snapshot.state,
                BackendState::Starting | BackendState::Running | BackendState::Unresponsive
            ) {
                self.set_state(BackendState::Stopped);
            }
            return;
        }

        if self.current.as_ref().is_some_and(CurrentProcess::is_alive) {
            self.journal.info(
                "Stopping backend",
                Some(json!({ "pid": self.snapshot.pid, "generation": self.generation })),
            );
        }
        self.retire_current();
    }

    fn begin_shutdown(&mut self) {
        self.shutting_down = true;
        self.request_stop();
    }

    // ---- Lancement ----

    async fn spawn_attempt(&mut self) -> Result<(), SupervisorError> {
        let Some(config) = self.config.clone() else {
            return Err(SupervisorError::NotConfigured);
        };
        self.generation += 1;
        let generation = self.generation;
        let args = config.args();
        let working_dir = config.working_dir.as_deref();

        let mut executable = config.executable.clone();
        let first = self.launcher.launch(&executable, &args, working_dir).await;
        let launched = match first {
            Ok(process) => Ok(process),
            Err(first) => match config
                .fallback_executable
                .as_ref()
                .filter(|fallback| **fallback != config.executable)
            {
                Some(fallback) => {
                    self.journal.warn(
                        format!("Failed to launch '{executable}' ({first}), retrying with '{fallback}'"),
                        None,
                    );
                    executable = fallback.clone();
                    self.launcher.launch(&executable, &args, working_dir).await
                }
                None => Err(first),
            },
        };

        let process = match launched {
            Ok(process) => process,
            Err(error) => {
                let message = error.to_string();
                self.snapshot.generation = generation;
                self.snapshot.pid = None;
                self.snapshot.executable = Some(executable.clone());
                self.handle_failure(format!("Spawn failed: {message}"), BackendState::Stopped);
                return Err(SupervisorError::Spawn {
                    executable,
                    message,
                });
            }
        };

        self.install_process(generation, executable, process, &args);
        Ok(())
    }

    fn install_process(
        &mut self,
        generation: u64,
        executable: String,
        process: LaunchedProcess,
        args: &[String],
    ) {
        let LaunchedProcess {
            pid,
            stdout,
            stderr,
            signals,
            exited,
        } = process;

        self.stderr_tail.clear();
        self.pid_slot.set(pid);
        self.current = Some(CurrentProcess {
            generation,
            pid,
            signals,
            stopping: None,
            stop_timer: None,
        });

        let tx = self.internal_tx.clone();
        tokio::spawn(forward_lines(stdout, move |line| {
            tx.send(Internal::Stdout { generation, line }).is_ok()
        }));
        let tx = self.internal_tx.clone();
        tokio::spawn(forward_lines(stderr, move |line| {
            tx.send(Internal::Stderr { generation, line }).is_ok()
        }));
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let outcome = exited.await.unwrap_or_else(|_| ExitOutcome {
                code: None,
                description: "exit status unavailable".to_string(),
            });
            let _ = tx.send(Internal::Exited { generation, outcome });
        });
        self.startup_timer = Some(self.schedule(self.settings.startup_timeout, move || {
            Internal::StartupTimeout { generation }
        }));

        let now = Utc::now();
        self.snapshot.generation = generation;
        self.snapshot.pid = pid;
        self.snapshot.started_at = Some(now);
        self.snapshot.ready_at = None;
        self.snapshot.port = self.config.as_ref().map(|c| c.port);
        self.snapshot.executable = Some(executable.clone());
        self.snapshot.last_health = None;

        self.journal.info(
            format!(
                "Backend process started (attempt {}/{})",
                self.snapshot.attempt_count + 1,
                self.settings.max_attempts
            ),
            Some(json!({
                "pid": pid,
                "generation": generation,
                "executable": executable,
                "args": args,
                "startedAt": now,
            })),
        );
        self.set_state(BackendState::Starting);
    }

    // ---- Événements internes ----

    async fn handle_internal(&mut self, event: Internal) {
        match event {
            Internal::Stdout { generation, line } => {
                if !self.is_current(generation) {
                    return;
                }
                log::debug!("[backend] {line}");
                let alive = self.current.as_ref().is_some_and(CurrentProcess::is_alive);
                if alive && self.snapshot.state == BackendState::Starting {
                    if let Some(marker) = self.settings.ready_marker_in(&line) {
                        let marker = marker.to_string();
                        self.mark_ready(&marker);
                    }
                }
            }
            Internal::Stderr { generation, line } => {
                if !self.is_current(generation) {
                    return;
                }
                log::debug!("[backend:stderr] {line}");
                if self.stderr_tail.len() == self.settings.stderr_tail_lines {
                    self.stderr_tail.pop_front();
                }
                if self.settings.stderr_tail_lines > 0 {
                    self.stderr_tail.push_back(line);
                }
            }
            Internal::Exited {
                generation,
                outcome,
            } => {
                if self.is_current(generation) {
                    self.on_exit(outcome).await;
                }
            }
            Internal::StartupTimeout { generation } => {
                let alive = self.current.as_ref().is_some_and(CurrentProcess::is_alive);
                if self.is_current(generation)
                    && alive
                    && self.snapshot.state == BackendState::Starting
                {
                    self.handle_failure(
                        format!(
                            "No readiness marker within {:?}",
                            self.settings.startup_timeout
                        ),
                        BackendState::Unresponsive,
                    );
                }
            }
            Internal::Health { generation, result } => {
                let alive = self.current.as_ref().is_some_and(CurrentProcess::is_alive);
                if !self.is_current(generation)
                    || !alive
                    || self.snapshot.state != BackendState::Running
                {
                    return;
                }
                self.snapshot.last_health = Some(result.clone());
                let _ = self.events.send(BackendEvent::Health {
                    result: result.clone(),
                });
                if !result.success {
                    self.handle_failure(
                        format!("Health check failed: {}", result.message),
                        BackendState::Unresponsive,
                    );
                }
            }
            Internal::GraceElapsed { generation } => {
                let Some(current) = self.current.as_mut() else {
                    return;
                };
                if current.generation != generation
                    || current.stopping != Some(StopPhase::Terminating)
                {
                    return;
                }
                current.stopping = Some(StopPhase::Killing);
                let _ = current.signals.send(StopSignal::Kill);
                let pid = current.pid;
                self.journal.warn(
                    format!(
                        "Backend did not exit within {:?}, forcing kill",
                        self.settings.stop_grace
                    ),
                    Some(json!({ "pid": pid })),
                );
                let timer = self.schedule(self.settings.kill_settle, move || {
                    Internal::KillSettled { generation }
                });
                if let Some(current) = self.current.as_mut() {
                    current.stop_timer = Some(timer);
                }
            }
            Internal::KillSettled { generation } => {
                if self.is_current(generation) {
                    self.journal.warn(
                        "Backend exit not observed after forced kill, releasing handle",
                        Some(json!({ "pid": self.snapshot.pid })),
                    );
                    self.on_exit(ExitOutcome {
                        code: None,
                        description: "exit not observed".to_string(),
                    })
                    .await;
                }
            }
            Internal::RetryDue { epoch } => {
                if epoch != self.epoch || !self.retry_pending || self.current.is_some() {
                    return;
                }
                self.retry_pending = false;
                self.retry_timer = None;
                self.journal.info(
                    format!(
                        "Retrying backend start (attempt {}/{})",
                        self.snapshot.attempt_count + 1,
                        self.settings.max_attempts
                    ),
                    None,
                );
                // Un échec de lancement est déjà traité par handle_failure.
                let _ = self.spawn_attempt().await;
            }
        }
    }

    fn mark_ready(&mut self, marker: &str) {
        if let Some(timer) = self.startup_timer.take() {
            timer.abort();
        }
        self.snapshot.ready_at = Some(Utc::now());
        self.snapshot.attempt_count = 0;
        self.set_state(BackendState::Running);
        self.journal.success(
            "Backend ready",
            Some(json!({
                "marker": marker,
                "port": self.snapshot.port,
                "pid": self.snapshot.pid,
                "generation": self.generation,
            })),
        );
        let _ = self.events.send(BackendEvent::Ready {
            snapshot: self.current_snapshot(),
        });

        if let Some(port) = self.snapshot.port {
            let generation = self.generation;
            let tx = self.internal_tx.clone();
            self.health.start_polling(
                port,
                self.settings.health_interval,
                self.settings.health_timeout,
                move |result| {
                    let _ = tx.send(Internal::Health { generation, result });
                },
            );
        }
    }

    /// Le process courant a disparu (sortie observée ou handle libéré).
    async fn on_exit(&mut self, outcome: ExitOutcome) {
        let Some(current) = self.current.take() else {
            return;
        };
        if let Some(timer) = current.stop_timer {
            timer.abort();
        }
        if let Some(timer) = self.startup_timer.take() {
            timer.abort();
        }
        self.health.stop_polling();
        self.pid_slot.clear_if(current.pid);
        self.snapshot.pid = None;

        if current.stopping.is_some() {
            self.journal.info(
                format!("Backend process exited ({})", outcome.description),
                Some(json!({ "generation": current.generation, "exit": outcome })),
            );
            self.after_retire().await;
            return;
        }

        match self.snapshot.state {
            BackendState::Running if outcome.success() => {
                self.journal.warn(
                    "Backend stopped unexpectedly with exit code 0",
                    Some(json!({ "generation": current.generation })),
                );
                self.set_state(BackendState::Stopped);
            }
            BackendState::Starting => self.handle_failure(
                format!("Backend exited before ready ({})", outcome.description),
                BackendState::Stopped,
            ),
            _ => self.handle_failure(
                format!("Backend crashed ({})", outcome.description),
                BackendState::Stopped,
            ),
        }
    }

    /// Suite d'un arrêt volontaire: relance planifiée, arrêt confirmé ou démarrage en attente.
    async fn after_retire(&mut self) {
        if self.retry_pending {
            self.schedule_retry();
            return;
        }

        if matches!(
            self.snapshot.state,
            BackendState::Starting | BackendState::Running | BackendState::Unresponsive
        ) {
            self.set_state(BackendState::Stopped);
        } else {
            self.publish_state();
        }
        let snapshot = self.current_snapshot();
        for waiter in self.stop_waiters.drain(..) {
            let _ = waiter.send(snapshot.clone());
        }

        if let Some((config, reply)) = self.pending_start.take() {
            if self.shutting_down {
                let _ = reply.send(Err(SupervisorError::Unavailable));
            } else {
                self.begin_start(config, reply).await;
            }
        }
    }

    /// Échec d'une tentative: relance dans le budget, sinon état terminal.
    fn handle_failure(&mut self, reason: String, state: BackendState) {
        self.health.stop_polling();
        if let Some(timer) = self.startup_timer.take() {
            timer.abort();
        }

        self.snapshot.attempt_count += 1;
        self.snapshot.last_error = Some(reason.clone());
        let attempt = self.snapshot.attempt_count;
        let max_attempts = self.settings.max_attempts;

        self.journal.error(
            format!("Backend attempt {attempt}/{max_attempts} failed: {reason}"),
            Some(json!({
                "attempt": attempt,
                "maxAttempts": max_attempts,
                "generation": self.snapshot.generation,
                "startedAt": self.snapshot.started_at,
                "failedAt": Utc::now(),
                "stderrTail": self.stderr_tail,
            })),
        );

        if attempt >= max_attempts {
            self.retry_pending = false;
            self.set_state(BackendState::Failed);
            self.journal.critical(
                format!("Backend failed after {attempt} attempts: {reason}"),
                Some(json!({ "lastError": reason, "stderrTail": self.stderr_tail })),
            );
            let _ = self.events.send(BackendEvent::Exhausted {
                snapshot: self.current_snapshot(),
                reason,
            });
            self.retire_current();
            return;
        }

        self.retry_pending = true;
        self.set_state(state);
        let _ = self.events.send(BackendEvent::Failure {
            snapshot: self.current_snapshot(),
            reason,
            will_retry: true,
        });

        match self.current.as_ref() {
            Some(_) => self.retire_current(),
            None => self.schedule_retry(),
        }
    }

    /// Envoie l'arrêt gracieux au process courant s'il n'est pas déjà en cours d'arrêt.
    fn retire_current(&mut self) {
        let grace = self.settings.stop_grace;
        let Some(current) = self.current.as_mut() else {
            return;
        };
        if current.stopping.is_some() {
            return;
        }
        current.stopping = Some(StopPhase::Terminating);
        let _ = current.signals.send(StopSignal::Terminate);
        let generation = current.generation;
        let timer = self.schedule(grace, move || Internal::GraceElapsed { generation });
        if let Some(current) = self.current.as_mut() {
            current.stop_timer = Some(timer);
        }
    }

    fn schedule_retry(&mut self) {
        let epoch = self.epoch;
        let backoff = self.settings.retry_backoff;
        self.journal.info(
            format!("Backend restart scheduled in {backoff:?}"),
            Some(json!({ "attempt": self.snapshot.attempt_count })),
        );
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        self.retry_timer = Some(self.schedule(backoff, move || Internal::RetryDue { epoch }));
    }

    // ---- Utilitaires ----

    fn schedule(
        &self,
        delay: std::time::Duration,
        event: impl FnOnce() -> Internal + Send + 'static,
    ) -> JoinHandle<()> {
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event());
        })
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.startup_timer.take() {
            timer.abort();
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| current.generation == generation)
    }

    fn set_state(&mut self, state: BackendState) {
        self.snapshot.state = state;
        self.publish_state();
    }

    fn publish_state(&self) {
        let _ = self.events.send(BackendEvent::StateChanged {
            snapshot: self.current_snapshot(),
        });
    }

    fn current_snapshot(&self) -> BackendSnapshot {
        let mut snapshot = self.snapshot.clone();
        snapshot.stderr_tail = self.stderr_tail.iter().cloned().collect();
        snapshot
    }
}

/// Relaie chaque ligne (UTF-8 avec remplacement) jusqu'à EOF ou refus du callback.
async fn forward_lines(
    reader: Box<dyn AsyncRead + Send + Unpin>,
    mut send: impl FnMut(String) -> bool,
) {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(&['\r', '\n'][..])
                    .to_string();
                if !send(line) {
                    break;
                }
            }
            Err(error) => {
                log::debug!("Backend output stream closed: {error}");
                break;
            }
        }
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
