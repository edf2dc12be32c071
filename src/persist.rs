use crate::state::BotState;
use crate::store::Store;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};

/// Writes dirty collections on a timer and whenever a mutation asks for it.
/// The final flush happens in `main` after the gateway has stopped.
pub struct AutoSaver {
    state: Arc<BotState>,
    store: Store,
    every: Duration,
}

impl AutoSaver {
    pub fn new(state: Arc<BotState>, store: Store, autosave_secs: u64) -> Self {
        Self {
            state,
            store,
            every: Duration::from_secs(autosave_secs.max(1)),
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.state.save_requested() => {}
                _ = shutdown.changed() => break,
            }
            if self.state.is_shutting_down() {
                break;
            }
            self.flush();
        }
        info!("Auto-save stopped");
    }

    /// Saves whatever is dirty. Failures stay dirty and are retried next round.
    pub fn flush(&self) -> usize {
        let failures = self.state.save_dirty(&self.store);
        if failures > 0 {
            warn!("Store: {} collection(s) failed to save, will retry", failures);
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Behavior;
    use crate::store::Collection;

    #[tokio::test]
    async fn test_mutation_wakes_the_saver() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let state = Arc::new(BotState::new(Behavior::default()));
        let (tx, rx) = watch::channel(false);
        let saver = AutoSaver::new(state.clone(), store.clone(), 3600);
        let task = tokio::spawn(saver.run(rx));

        state.blacklist.write().add(42);
        state.request_save(Collection::Blacklist);

        let path = store.path(Collection::Blacklist);
        for _ in 0..200 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(path.exists());
        assert!(!state.is_dirty(Collection::Blacklist));

        tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[test]
    fn test_flush_only_writes_dirty_collections() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let state = Arc::new(BotState::new(Behavior::default()));
        state.mark_dirty(Collection::Settings);

        let saver = AutoSaver::new(state, store.clone(), 300);
        assert_eq!(saver.flush(), 0);
        assert!(store.path(Collection::Settings).exists());
        assert!(!store.path(Collection::Reminders).exists());
    }
}
