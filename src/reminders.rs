use crate::chat::ChatPort;
use crate::services::reminder::{Reminder, ReminderStatus};
use crate::state::BotState;
use crate::store::Collection;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

/// Delivers due reminders by DM. Each reminder gets exactly one attempt.
pub struct ReminderDispatcher {
    state: Arc<BotState>,
    port: Arc<dyn ChatPort>,
    poll_interval: Duration,
}

impl ReminderDispatcher {
    pub fn new(state: Arc<BotState>, port: Arc<dyn ChatPort>, poll_interval_secs: u64) -> Self {
        Self {
            state,
            port,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.state.is_shutting_down() {
                        break;
                    }
                    self.tick(Utc::now()).await;
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Reminder dispatcher stopped");
    }

    /// One delivery round. Returns the reminders it handled with their final
    /// status. A reminder leaves the book only after its attempt, so an
    /// auto-save during the DM round trip never drops it.
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<Reminder> {
        let due = self.state.reminders.lock().due(now);
        if due.is_empty() {
            return due;
        }

        let mut handled = Vec::with_capacity(due.len());
        for mut reminder in due {
            let content = format!("reminder: {}", reminder.task);
            match self.port.send_direct(reminder.user_id, &content).await {
                Ok(()) => {
                    info!("Delivered reminder {} to {}", reminder.id, reminder.user_id);
                    reminder.status = ReminderStatus::Delivered;
                }
                Err(e) => {
                    error!(
                        "Failed to deliver reminder {} to {}: {}",
                        reminder.id, reminder.user_id, e
                    );
                    reminder.status = ReminderStatus::Failed;
                }
            }
            self.state.reminders.lock().finish(&reminder.id);
            self.state.mark_dirty(Collection::Reminders);
            handled.push(reminder);
        }
        self.state.request_save(Collection::Reminders);
        handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Behavior;
    use crate::store::Store;
    use crate::testing::{FakePort, Sent};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};

    /// Saves everything while a DM is on its way, like an auto-save landing
    /// mid-delivery.
    struct SaveDuringSend {
        state: Arc<BotState>,
        store: Store,
        inner: FakePort,
    }

    #[async_trait]
    impl ChatPort for SaveDuringSend {
        async fn send_message(&self, channel_id: u64, content: &str) -> anyhow::Result<u64> {
            self.inner.send_message(channel_id, content).await
        }
        async fn add_reaction(&self, channel_id: u64, message_id: u64, emoji: &str) -> anyhow::Result<()> {
            self.inner.add_reaction(channel_id, message_id, emoji).await
        }
        async fn send_direct(&self, user_id: u64, content: &str) -> anyhow::Result<()> {
            assert_eq!(self.state.save_all(&self.store), 0);
            self.inner.send_direct(user_id, content).await
        }
        async fn broadcast_typing(&self, channel_id: u64) -> anyhow::Result<()> {
            self.inner.broadcast_typing(channel_id).await
        }
        fn guild_ids(&self) -> Vec<u64> {
            self.inner.guild_ids()
        }
        fn fallback_channel(&self, guild_id: u64) -> Option<u64> {
            self.inner.fallback_channel(guild_id)
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 14, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_due_reminders_are_sent_once() {
        let state = Arc::new(BotState::new(Behavior::default()));
        let port = Arc::new(FakePort::new());
        {
            let mut book = state.reminders.lock();
            book.create(7, "stretch", start() + ChronoDuration::minutes(5), start()).unwrap();
            book.create(7, "sleep", start() + ChronoDuration::hours(8), start()).unwrap();
        }
        let dispatcher = ReminderDispatcher::new(state.clone(), port.clone(), 30);

        assert!(dispatcher.tick(start()).await.is_empty());
        assert!(!state.is_dirty(Collection::Reminders));

        let handled = dispatcher.tick(start() + ChronoDuration::minutes(6)).await;
        assert_eq!(handled.len(), 1);
        assert_eq!(handled[0].status, ReminderStatus::Delivered);
        assert_eq!(
            port.sent(),
            vec![Sent::Direct { user: 7, content: "reminder: stretch".to_string() }]
        );
        assert!(state.is_dirty(Collection::Reminders));

        // already delivered, never again
        assert!(dispatcher.tick(start() + ChronoDuration::minutes(7)).await.is_empty());
        assert_eq!(state.reminders.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_dms_fail_without_retry() {
        let state = Arc::new(BotState::new(Behavior::default()));
        let port = Arc::new(FakePort::new().with_closed_dms(9));
        state
            .reminders
            .lock()
            .create(9, "water plants", start() + ChronoDuration::minutes(1), start())
            .unwrap();
        let dispatcher = ReminderDispatcher::new(state.clone(), port.clone(), 30);

        let handled = dispatcher.tick(start() + ChronoDuration::minutes(2)).await;
        assert_eq!(handled[0].status, ReminderStatus::Failed);
        assert!(port.sent().is_empty());
        assert!(state.reminders.lock().is_empty());
        assert!(dispatcher.tick(start() + ChronoDuration::minutes(3)).await.is_empty());
    }

    #[tokio::test]
    async fn test_overdue_after_downtime_go_out_in_due_order() {
        let state = Arc::new(BotState::new(Behavior::default()));
        let port = Arc::new(FakePort::new());
        {
            let mut book = state.reminders.lock();
            book.create(1, "second", start() + ChronoDuration::hours(2), start()).unwrap();
            book.create(1, "first", start() + ChronoDuration::hours(1), start()).unwrap();
        }
        let dispatcher = ReminderDispatcher::new(state, port.clone(), 30);
        dispatcher.tick(start() + ChronoDuration::days(1)).await;

        let contents: Vec<String> = port
            .sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Direct { content, .. } => Some(content),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["reminder: first", "reminder: second"]);
    }

    #[tokio::test]
    async fn test_save_during_delivery_keeps_the_reminder() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let state = Arc::new(BotState::new(Behavior::default()));
        let created = state
            .reminders
            .lock()
            .create(7, "stretch", start() + ChronoDuration::minutes(5), start())
            .unwrap();
        let port = Arc::new(SaveDuringSend {
            state: state.clone(),
            store: store.clone(),
            inner: FakePort::new(),
        });
        let dispatcher = ReminderDispatcher::new(state.clone(), port, 30);
        dispatcher.tick(start() + ChronoDuration::minutes(6)).await;

        // the mid-delivery save still has it, so a crash there would resend
        let crashed = BotState::load(&store, Behavior::default());
        assert_eq!(crashed.reminders.lock().list(7), vec![created]);

        assert!(state.reminders.lock().is_empty());
        assert!(state.is_dirty(Collection::Reminders));
    }
}
