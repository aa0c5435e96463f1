use std::io;
use std::net::{Ipv4Addr, TcpListener};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, oneshot, Notify};

use super::*;
use crate::backend::{
    BackendState, ExitOutcome, LaunchedProcess, ProcessLauncher, StopSignal, SupervisorSettings,
};
use crate::diagnostics::LogLevel;
use crate::lifecycle::host::FrontendSource;
use crate::runtime::candidates::CandidateProvider;
use crate::runtime::resolver::{ValidatedRuntime, ValidationFailure};
use crate::runtime::{AttemptOutcome, RuntimeValidator};

#[derive(Default)]
struct FakeHost {
    windows: Mutex<Vec<FrontendSource>>,
    events: Mutex<Vec<(String, Value)>>,
    dialogs: Mutex<Vec<(String, String)>>,
    exits: Mutex<Vec<i32>>,
    open_windows: bool,
    /// Temps pendant lequel le dialogue reste ouvert.
    dialog_delay: Duration,
}

impl FakeHost {
    fn events_named(&self, name: &str) -> Vec<Value> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(event, _)| event == name)
            .map(|(_, payload)| payload.clone())
            .collect()
    }

    fn dialogs(&self) -> Vec<(String, String)> {
        self.dialogs.lock().unwrap().clone()
    }

    fn exits(&self) -> Vec<i32> {
        self.exits.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShellHost for FakeHost {
    fn create_main_window(&self, source: &FrontendSource) -> Result<(), LifecycleError> {
        self.windows.lock().unwrap().push(source.clone());
        Ok(())
    }

    fn has_open_windows(&self) -> bool {
        self.open_windows
    }

    fn emit(&self, event: &str, payload: Value) {
        self.events.lock().unwrap().push((event.to_string(), payload));
    }

    async fn show_blocking_error(&self, title: &str, message: &str) {
        if !self.dialog_delay.is_zero() {
            tokio::time::sleep(self.dialog_delay).await;
        }
        self.dialogs
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }

    fn exit(&self, code: i32) {
        self.exits.lock().unwrap().push(code);
    }
}

/// Lanceur sans pid réel: soit prêt et en attente de signal, soit en échec immédiat.
struct ScriptedLauncher {
    ready: bool,
    signals: Arc<Mutex<Vec<StopSignal>>>,
    launches: AtomicUsize,
    /// Fait planter le process en cours (code 137).
    crash: Arc<Notify>,
}

impl ScriptedLauncher {
    fn new(ready: bool) -> Arc<Self> {
        Arc::new(Self {
            ready,
            signals: Arc::new(Mutex::new(Vec::new())),
            launches: AtomicUsize::new(0),
            crash: Arc::new(Notify::new()),
        })
    }

    fn signals(&self) -> Vec<StopSignal> {
        self.signals.lock().unwrap().clone()
    }

    fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    async fn launch(
        &self,
        _executable: &str,
        _args: &[String],
        _working_dir: Option<&Path>,
    ) -> io::Result<LaunchedProcess> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        let (mut out_w, out_r) = tokio::io::duplex(1024);
        let (_err_w, err_r) = tokio::io::duplex(1024);
        let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();
        let ready = self.ready;
        let signals = self.signals.clone();
        let crash = self.crash.clone();

        tokio::spawn(async move {
            if !ready {
                let _ = out_w.write_all(b"APPLICATION FAILED TO START\n").await;
                drop(out_w);
                let _ = exit_tx.send(ExitOutcome::from_code(1));
                return;
            }
            let _ = out_w
                .write_all(b"Tomcat started on port 8081 (http) with context path ''\n")
                .await;
            let outcome = tokio::select! {
                signal = signal_rx.recv() => match signal {
                    Some(signal) => {
                        signals.lock().unwrap().push(signal);
                        ExitOutcome {
                            code: None,
                            description: format!("terminated by {signal:?}"),
                        }
                    }
                    None => ExitOutcome::from_code(137),
                },
                _ = crash.notified() => ExitOutcome::from_code(137),
            };
            drop(out_w);
            let _ = exit_tx.send(outcome);
        });

        Ok(LaunchedProcess {
            pid: None,
            stdout: Box::new(out_r),
            stderr: Box::new(err_r),
            signals: signal_tx,
            exited: exit_rx,
        })
    }
}

struct Validator {
    accept: bool,
}

#[async_trait]
impl RuntimeValidator for Validator {
    async fn validate(&self, _candidate: &str) -> Result<ValidatedRuntime, ValidationFailure> {
        if self.accept {
            Ok(ValidatedRuntime {
                version_line: Some("openjdk version \"17.0.9\" 2023-10-17".to_string()),
                major_version: Some(17),
            })
        } else {
            Err(ValidationFailure {
                outcome: AttemptOutcome::Missing,
                detail: "Runtime not found".to_string(),
            })
        }
    }
}

struct Harness {
    coordinator: Coordinator,
    host: Arc<FakeHost>,
    launcher: Arc<ScriptedLauncher>,
    _dir: tempfile::TempDir,
}

fn free_port() -> u16 {
    let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

fn locator(accept: bool) -> RuntimeLocator {
    RuntimeLocator::new(
        vec![CandidateProvider::PathLookup {
            command: "java".to_string(),
        }],
        Arc::new(Validator { accept }),
    )
    .with_env(|_| None)
}

fn harness(ready: bool, java_found: bool, configure: impl FnOnce(&mut DesktopConfig)) -> Harness {
    harness_with(FakeHost::default(), ready, java_found, configure)
}

fn harness_with(
    host: FakeHost,
    ready: bool,
    java_found: bool,
    configure: impl FnOnce(&mut DesktopConfig),
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let paths = AppPaths::new(
        dir.path().join("resources"),
        dir.path().join("data"),
        dir.path().join("config"),
    );
    let mut config = DesktopConfig::default();
    config.backend.port = free_port();
    config.supervisor.window_attach_delay_ms = 0;
    config.supervisor.max_attempts = 1;

    // Seule l'archive par défaut existe: `configure` peut pointer ailleurs.
    let jar = paths.resolve_app_path(&config.backend.jar_path);
    std::fs::create_dir_all(jar.parent().unwrap()).unwrap();
    std::fs::write(&jar, b"jar").unwrap();
    configure(&mut config);

    let launcher = ScriptedLauncher::new(ready);
    let journal = Journal::memory_only();
    let settings = SupervisorSettings {
        health_timeout: Duration::from_secs(1),
        health_interval: Duration::from_secs(60),
        ..config.supervisor_settings()
    };
    let supervisor = Supervisor::spawn(launcher.clone(), settings, journal.clone());
    let host = Arc::new(host);
    let coordinator = Coordinator::new(
        host.clone(),
        supervisor,
        locator(java_found),
        config,
        paths,
        journal,
    )
    .with_quit_on_all_closed(true)
    .with_app_version("1.2.3");

    Harness {
        coordinator,
        host,
        launcher,
        _dir: dir,
    }
}

async fn wait_for_event(
    rx: &mut broadcast::Receiver<BackendEvent>,
    pred: impl Fn(&BackendEvent) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            match rx.recv().await {
                Ok(event) if pred(&event) => return,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("event not received in time");
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn app_ready_opens_window_and_starts_backend() {
    let h = harness(true, true, |_| {});
    let _forwarder = h.coordinator.spawn_event_forwarder();
    let mut events = h.coordinator.supervisor().subscribe();

    h.coordinator.on_app_ready().await.unwrap();
    wait_for_event(&mut events, |e| matches!(e, BackendEvent::Ready { .. })).await;

    assert_eq!(h.host.windows.lock().unwrap().len(), 1);
    let status = h.coordinator.backend_status().await.unwrap();
    assert_eq!(status.state, BackendState::Running);
    assert_eq!(status.executable.as_deref(), Some("java"));

    eventually(|| {
        h.host
            .events_named(EVENT_BACKEND_STATUS)
            .iter()
            .any(|payload| payload["state"] == "running")
    })
    .await;
    assert!(h.host.exits().is_empty());
}

#[tokio::test]
async fn missing_runtime_shows_remediation_and_exits() {
    let h = harness(true, false, |_| {});

    let result = h.coordinator.launch_backend().await;
    assert!(matches!(result, Err(LifecycleError::Runtime(_))));

    let errors = h.host.events_named(EVENT_BACKEND_ERROR);
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["code"], "RUNTIME_NOT_FOUND");
    assert_eq!(errors[0]["fatal"], true);

    let dialogs = h.host.dialogs();
    assert_eq!(dialogs.len(), 1);
    assert!(dialogs[0].1.contains("JAVA_HOME"));
    assert_eq!(h.host.exits(), vec![1]);
    assert!(h.coordinator.exit_gate().is_allowed());
    assert!(h.launcher.signals().is_empty());

    let logged = h.coordinator.journal().recent(10);
    assert!(logged
        .iter()
        .any(|entry| entry.level == LogLevel::Error && entry.data.as_ref().is_some_and(|d| d["attempts"].is_array())));
}

#[tokio::test]
async fn exhausted_backend_terminates_by_default() {
    let h = harness(false, true, |_| {});
    let _forwarder = h.coordinator.spawn_event_forwarder();

    h.coordinator.launch_backend().await.unwrap();

    eventually(|| h.host.exits() == vec![1]).await;
    let dialogs = h.host.dialogs();
    assert_eq!(dialogs.len(), 1);
    assert!(dialogs[0].1.contains("after 1 attempts"));
    assert!(h
        .host
        .events_named(EVENT_BACKEND_ERROR)
        .iter()
        .any(|payload| payload["fatal"] == true));
}

#[tokio::test]
async fn keep_window_policy_leaves_app_running() {
    let h = harness(false, true, |config| {
        config.on_backend_failure = FailurePolicy::KeepWindow;
    });
    let _forwarder = h.coordinator.spawn_event_forwarder();

    h.coordinator.launch_backend().await.unwrap();

    eventually(|| h.host.dialogs().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(h.host.exits().is_empty());
    let status = h.coordinator.backend_status().await.unwrap();
    assert_eq!(status.state, BackendState::Failed);
}

#[tokio::test]
async fn invalid_backend_archive_is_fatal() {
    let h = harness(true, true, |config| {
        config.backend.jar_path = "backend/absent.jar".to_string();
    });

    let result = h.coordinator.launch_backend().await;
    assert!(matches!(
        result,
        Err(LifecycleError::Supervisor(SupervisorError::InvalidConfig(_)))
    ));
    assert_eq!(h.host.dialogs().len(), 1);
    assert_eq!(h.host.exits(), vec![1]);
}

#[tokio::test]
async fn closing_all_windows_stops_backend_and_quits() {
    let h = harness(true, true, |_| {});
    let mut events = h.coordinator.supervisor().subscribe();
    h.coordinator.launch_backend().await.unwrap();
    wait_for_event(&mut events, |e| matches!(e, BackendEvent::Ready { .. })).await;

    h.coordinator.on_all_windows_closed().await;

    assert_eq!(h.launcher.signals(), vec![StopSignal::Terminate]);
    assert_eq!(h.host.exits(), vec![0]);
    let status = h.coordinator.backend_status().await.unwrap();
    assert_eq!(status.state, BackendState::Stopped);
}

#[tokio::test]
async fn restart_without_configuration_resolves_runtime_again() {
    let h = harness(true, true, |_| {});
    let mut events = h.coordinator.supervisor().subscribe();

    let snapshot = h.coordinator.restart_backend().await.unwrap();
    assert_eq!(snapshot.state, BackendState::Starting);
    wait_for_event(&mut events, |e| matches!(e, BackendEvent::Ready { .. })).await;
}

#[tokio::test]
async fn uncaught_error_logs_critical_and_exits() {
    let h = harness(true, true, |_| {});

    h.coordinator.on_uncaught_error("index out of bounds").await;

    let logged = h.coordinator.journal().recent(1);
    assert_eq!(logged[0].level, LogLevel::Critical);
    assert!(logged[0].message.contains("index out of bounds"));
    assert_eq!(h.host.dialogs().len(), 1);
    assert_eq!(h.host.exits(), vec![1]);
}

#[tokio::test]
async fn uncaught_error_prevents_respawn_while_dialog_is_open() {
    let host = FakeHost {
        dialog_delay: Duration::from_millis(800),
        ..FakeHost::default()
    };
    let h = harness_with(host, true, true, |config| {
        config.supervisor.max_attempts = 3;
        config.supervisor.retry_backoff_ms = 100;
    });
    let mut events = h.coordinator.supervisor().subscribe();
    h.coordinator.launch_backend().await.unwrap();
    wait_for_event(&mut events, |e| matches!(e, BackendEvent::Ready { .. })).await;

    // Le backend meurt en même temps que l'erreur fatale.
    h.launcher.crash.notify_one();
    h.coordinator.on_uncaught_error("worker thread panicked").await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(h.launcher.launches(), 1);
    assert_eq!(h.host.exits(), vec![1]);
    assert!(matches!(
        h.coordinator.backend_status().await,
        Err(LifecycleError::Supervisor(SupervisorError::Unavailable))
    ));
}

#[tokio::test]
async fn connection_test_reports_tcp_and_http_status() {
    let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                    .await;
            });
        }
    });

    let h = harness(true, true, |config| config.backend.port = port);
    let result = h.coordinator.test_backend_connection().await;

    assert!(result.tcp.success);
    assert_eq!(result.url, format!("http://127.0.0.1:{port}/api/health"));
    assert_eq!(result.http_status, Some(200));
    assert!(result.http_error.is_none());
}

#[tokio::test]
async fn connection_test_reports_unreachable_backend() {
    let h = harness(true, true, |_| {});
    let result = h.coordinator.test_backend_connection().await;

    assert!(!result.tcp.success);
    assert!(result.http_status.is_none());
    assert!(result.http_error.is_some());
}

#[tokio::test]
async fn system_report_is_saved_under_data_dir() {
    let h = harness(true, true, |_| {});
    h.coordinator.journal().info("before report", None);

    let (report, saved) = h.coordinator.system_report(true).await.unwrap();

    assert_eq!(report.app_version, "1.2.3");
    assert!(report.runtime.as_ref().is_some_and(|r| r.resolved.is_some()));
    assert!(report.paths.contains_key("logs"));
    let path = saved.unwrap();
    assert!(path.starts_with(h._dir.path().join("data").join("reports")));
    let body: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(body["appVersion"], "1.2.3");
}
