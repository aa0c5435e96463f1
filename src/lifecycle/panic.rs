use serde_json::json;
use tokio::sync::mpsc;

use crate::backend::ChildPidSlot;
use crate::diagnostics::Journal;

/// Installe un hook de panic qui tue le backend puis prévient le coordinateur.
///
/// Le hook précédent reste appelé ensuite.
pub fn install_panic_hook(
    journal: Journal,
    pid_slot: ChildPidSlot,
    fatal: mpsc::UnboundedSender<String>,
) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let payload = info.payload();
        let text = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        let message = match info.location() {
            Some(location) => format!("{text} at {}:{}", location.file(), location.line()),
            None => text,
        };
        report_panic(&journal, &pid_slot, &fatal, &message);
        previous(info);
    }));
}

/// Journalise, tue le process enfant de façon synchrone et relaie le message.
pub(crate) fn report_panic(
    journal: &Journal,
    pid_slot: &ChildPidSlot,
    fatal: &mpsc::UnboundedSender<String>,
    message: &str,
) {
    let killed = pid_slot.kill_now();
    journal.critical(
        format!("Uncaught error: {message}"),
        Some(json!({ "killedBackendPid": killed })),
    );
    let _ = fatal.send(message.to_string());
}
