use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use chrono::Utc;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::types::HealthCheckResult;

/// Sonde TCP unique: connexion puis fermeture sur `127.0.0.1:port`.
pub async fn check_port(port: u16, timeout: Duration) -> HealthCheckResult {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let started = Instant::now();
    let (success, message) = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => {
            drop(stream);
            (true, format!("Backend reachable on port {port}"))
        }
        Ok(Err(error)) => (false, format!("Connection to port {port} failed: {error}")),
        Err(_) => (
            false,
            format!("Connection to port {port} timed out after {timeout:?}"),
        ),
    };

    HealthCheckResult {
        success,
        message,
        timestamp: Utc::now(),
        port,
        latency_ms: success.then(|| started.elapsed().as_millis() as u64),
    }
}

/// Sondage périodique du port backend.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    task: Option<JoinHandle<()>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Démarre le sondage; un sondage en cours est remplacé.
    ///
    /// Le premier contrôle a lieu après un intervalle complet.
    pub fn start_polling<F>(&mut self, port: u16, interval: Duration, timeout: Duration, on_result: F)
    where
        F: Fn(HealthCheckResult) + Send + Sync + 'static,
    {
        self.stop_polling();
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let result = check_port(port, timeout).await;
                on_result(result);
            }
        }));
    }

    /// Arrête le sondage. Sans effet si aucun sondage n'est actif.
    pub fn stop_polling(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.stop_polling();
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    use super::*;

    #[tokio::test]
    async fn port_check_succeeds_against_listener_and_fails_after_close() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let ok = check_port(port, Duration::from_secs(2)).await;
        assert!(ok.success);
        assert_eq!(ok.port, port);
        assert!(ok.latency_ms.is_some());

        drop(listener);
        let ko = check_port(port, Duration::from_secs(2)).await;
        assert!(!ko.success);
        assert!(ko.latency_ms.is_none());
    }

    #[tokio::test]
    async fn polling_reports_results_until_stopped() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut monitor = HealthMonitor::new();
        monitor.start_polling(port, Duration::from_millis(20), Duration::from_secs(1), move |r| {
            let _ = tx.send(r);
        });
        assert!(monitor.is_polling());

        let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(first.success);

        monitor.stop_polling();
        monitor.stop_polling();
        assert!(!monitor.is_polling());
        // Le callback est détruit avec la tâche: le canal finit par se fermer.
        let drained = tokio::time::timeout(Duration::from_secs(2), async {
            while rx.recv().await.is_some() {}
        })
        .await;
        assert!(drained.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn monitor_runs_inside_a_spawned_task() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = tokio::spawn(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let mut monitor = HealthMonitor::new();
            monitor.start_polling(port, Duration::from_millis(20), Duration::from_secs(1), move |r| {
                let _ = tx.send(r);
            });
            let first = rx.recv().await;
            monitor.stop_polling();
            first
        });

        let first = tokio::time::timeout(Duration::from_secs(5), result)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(first.success);
        drop(listener);
    }

    #[test]
    fn stop_polling_without_start_is_a_no_op() {
        let mut monitor = HealthMonitor::new();
        monitor.stop_polling();
        assert!(!monitor.is_polling());
    }
}
