use std::sync::{Arc, Mutex, MutexGuard};

/// Pid du process backend courant, lisible hors du superviseur.
///
/// Sert au hook de panic qui doit tuer l'enfant de façon synchrone.
#[derive(Clone, Debug, Default)]
pub struct ChildPidSlot {
    inner: Arc<Mutex<Option<u32>>>,
}

impl ChildPidSlot {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<u32>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, pid: Option<u32>) {
        *self.lock() = pid;
    }

    /// Efface le pid seulement s'il correspond encore à `pid`.
    pub fn clear_if(&self, pid: Option<u32>) {
        let mut slot = self.lock();
        if *slot == pid {
            *slot = None;
        }
    }

    pub fn get(&self) -> Option<u32> {
        *self.lock()
    }

    /// Tue immédiatement le process enregistré. Retourne le pid visé.
    pub fn kill_now(&self) -> Option<u32> {
        let pid = self.lock().take()?;
        match crate::utils::process::kill_pid(pid) {
            Ok(()) => log::warn!("Backend process {pid} force-killed"),
            Err(error) => log::error!("Failed to force-kill backend process {pid}: {error}"),
        }
        Some(pid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_if_ignores_other_pid() {
        let slot = ChildPidSlot::new();
        slot.set(Some(42));
        slot.clear_if(Some(7));
        assert_eq!(slot.get(), Some(42));
        slot.clear_if(Some(42));
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn kill_now_on_empty_slot_does_nothing() {
        assert_eq!(ChildPidSlot::new().kill_now(), None);
    }

    #[cfg(unix)]
    #[test]
    fn kill_now_terminates_a_real_child() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let slot = ChildPidSlot::new();
        slot.set(Some(child.id()));

        assert_eq!(slot.kill_now(), Some(child.id()));
        let status = child.wait().unwrap();
        assert!(!status.success());
        assert_eq!(slot.get(), None);
    }
}
