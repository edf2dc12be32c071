//! Process-wide state shared by the gateway handler, the commands and the
//! background tasks.
//!
//! In-memory state is the source of truth. Mutations mark their collection
//! dirty. Settings, reminders and the blacklist also wake the auto-saver;
//! stats wait for its next tick. Only the auto-saver and the shutdown path
//! touch the files. Each collection is cloned under its own lock and written
//! after the lock is released.

pub mod blacklist;
pub mod settings;
pub mod users;

use crate::cache::MessageCache;
use crate::config::Behavior;
use crate::cooldown::CooldownTracker;
use crate::engine::boredom::BoredomMeter;
use crate::services::reminder::{ReminderBook, ReminderSnapshot};
use crate::store::{Collection, Store, StoreError};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

pub use blacklist::Blacklist;
pub use settings::{GuildSettings, Settings, SettingsError};
pub use users::{Interaction, PreferenceError, UserDirectory, UserStats};

const CACHE_BUCKETS: usize = 4096;

/// Bookkeeping that only lives as long as the process.
pub struct RuntimeState {
    pub command_cooldowns: CooldownTracker,
    pub reply_cooldowns: CooldownTracker,
    pub boredom: HashMap<u64, BoredomMeter>,
    /// Last human message per guild.
    pub last_activity: HashMap<u64, DateTime<Utc>>,
    /// Last seen activity names per (guild, user).
    pub presence: HashMap<(u64, u64), BTreeSet<String>>,
    pub started_at: DateTime<Utc>,
}

impl RuntimeState {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            command_cooldowns: CooldownTracker::default(),
            reply_cooldowns: CooldownTracker::default(),
            boredom: HashMap::new(),
            last_activity: HashMap::new(),
            presence: HashMap::new(),
            started_at,
        }
    }
}

pub struct BotState {
    pub settings: RwLock<Settings>,
    pub reminders: Mutex<ReminderBook>,
    pub users: Mutex<UserDirectory>,
    pub blacklist: RwLock<Blacklist>,
    pub cache: MessageCache,
    pub runtime: Mutex<RuntimeState>,
    behavior: RwLock<Arc<Behavior>>,
    owners: RwLock<HashSet<u64>>,
    dirty: [AtomicBool; 4],
    save_requested: Notify,
    shutting_down: AtomicBool,
}

impl BotState {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            settings: RwLock::new(Settings::default()),
            reminders: Mutex::new(ReminderBook::default()),
            users: Mutex::new(UserDirectory::default()),
            blacklist: RwLock::new(Blacklist::default()),
            cache: MessageCache::new(CACHE_BUCKETS),
            runtime: Mutex::new(RuntimeState::new(Utc::now())),
            behavior: RwLock::new(Arc::new(behavior)),
            owners: RwLock::new(HashSet::new()),
            dirty: Default::default(),
            save_requested: Notify::new(),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn load(store: &Store, behavior: Behavior) -> Self {
        let state = Self::new(behavior);

        let mut settings: Settings = store.load(Collection::Settings);
        for warning in settings.sanitize() {
            warn!("Store: settings.json {}", warning);
        }
        *state.settings.write() = settings;

        let reminders: ReminderSnapshot = store.load(Collection::Reminders);
        *state.reminders.lock() = ReminderBook::from_snapshot(reminders);
        *state.users.lock() = store.load(Collection::UserData);
        *state.blacklist.write() = store.load(Collection::Blacklist);

        info!(
            "Store: loaded {} pending reminders, {} users, {} blacklisted",
            state.reminders.lock().len(),
            state.users.lock().len(),
            state.blacklist.read().len()
        );
        state
    }

    pub fn behavior(&self) -> Arc<Behavior> {
        self.behavior.read().clone()
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.write() = Arc::new(behavior);
    }

    pub fn add_owner(&self, user_id: u64) {
        self.owners.write().insert(user_id);
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owners.read().contains(&user_id)
    }

    /// Owners everywhere, plus the guild's own admin set inside a guild.
    pub fn is_admin(&self, guild_id: Option<u64>, user_id: u64) -> bool {
        if self.is_owner(user_id) {
            return true;
        }
        guild_id.is_some_and(|g| self.settings.read().is_guild_admin(g, user_id))
    }

    pub fn is_blacklisted(&self, user_id: u64) -> bool {
        self.blacklist.read().contains(user_id)
    }

    /// Applies `f` to the settings and schedules a save if anything changed.
    pub fn update_settings<R>(&self, f: impl FnOnce(&mut Settings) -> R) -> R {
        let mut settings = self.settings.write();
        let before = settings.clone();
        let result = f(&mut *settings);
        let changed = *settings != before;
        drop(settings);
        if changed {
            self.request_save(Collection::Settings);
        }
        result
    }

    pub fn record_interaction(&self, user_id: u64, interaction: Interaction, now: DateTime<Utc>) {
        self.users.lock().record(user_id, interaction, now);
        self.mark_dirty(Collection::UserData);
    }

    pub fn note_activity(&self, guild_id: u64, now: DateTime<Utc>) {
        self.runtime.lock().last_activity.insert(guild_id, now);
    }

    /// Flags the collection for the next auto-save tick.
    pub fn mark_dirty(&self, collection: Collection) {
        self.dirty[collection.index()].store(true, Ordering::SeqCst);
    }

    /// Flags the collection and wakes the auto-saver now.
    pub fn request_save(&self, collection: Collection) {
        self.mark_dirty(collection);
        self.save_requested.notify_one();
    }

    pub fn is_dirty(&self, collection: Collection) -> bool {
        self.dirty[collection.index()].load(Ordering::SeqCst)
    }

    pub async fn save_requested(&self) {
        self.save_requested.notified().await;
    }

    pub fn begin_shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            info!("Shutdown requested, refusing new events");
        }
        self.save_requested.notify_one();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Writes one collection from a snapshot taken under its lock.
    pub fn save_collection(&self, store: &Store, collection: Collection) -> Result<(), StoreError> {
        match collection {
            Collection::Settings => {
                let snapshot = self.settings.read().clone();
                store.save(collection, &snapshot)
            }
            Collection::Reminders => {
                let snapshot = self.reminders.lock().snapshot();
                store.save(collection, &snapshot)
            }
            Collection::UserData => {
                let snapshot = self.users.lock().clone();
                store.save(collection, &snapshot)
            }
            Collection::Blacklist => {
                let snapshot = self.blacklist.read().clone();
                store.save(collection, &snapshot)
            }
        }
    }

    /// Saves every dirty collection. A failed write stays dirty for the next
    /// round. Returns how many collections failed.
    pub fn save_dirty(&self, store: &Store) -> usize {
        let mut failures = 0;
        for collection in Collection::ALL {
            if !self.dirty[collection.index()].swap(false, Ordering::SeqCst) {
                continue;
            }
            match self.save_collection(store, collection) {
                Ok(()) => debug!("Store: saved {}", collection.file_name()),
                Err(e) => {
                    error!("Store: {}", e);
                    self.dirty[collection.index()].store(true, Ordering::SeqCst);
                    failures += 1;
                }
            }
        }
        failures
    }

    pub fn save_all(&self, store: &Store) -> usize {
        for collection in Collection::ALL {
            self.dirty[collection.index()].store(true, Ordering::SeqCst);
        }
        self.save_dirty(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_reminder_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 14, 0, 0).unwrap();
        let due = now + Duration::hours(3);

        let state = BotState::load(&store, Behavior::default());
        let created = state
            .reminders
            .lock()
            .create(7, "check email", due, now)
            .unwrap();
        state.mark_dirty(Collection::Reminders);
        assert_eq!(state.save_dirty(&store), 0);
        assert!(!state.is_dirty(Collection::Reminders));

        let restarted = BotState::load(&store, Behavior::default());
        let listed = restarted.reminders.lock().list(7);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].task, "check email");
        assert_eq!(listed[0].due_at, due);
        assert_eq!(listed[0].status, crate::services::reminder::ReminderStatus::Pending);
    }

    #[test]
    fn test_ids_stay_unique_across_restart_after_delivery() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 14, 0, 0).unwrap();

        let state = BotState::load(&store, Behavior::default());
        let first = state
            .reminders
            .lock()
            .create(7, "call mom", now + Duration::minutes(5), now)
            .unwrap();
        assert!(state.reminders.lock().finish(&first.id).is_some());
        assert_eq!(state.save_all(&store), 0);

        let restarted = BotState::load(&store, Behavior::default());
        assert!(restarted.reminders.lock().is_empty());
        let second = restarted
            .reminders
            .lock()
            .create(7, "call dad", now + Duration::hours(1), now)
            .unwrap();
        assert_ne!(second.id, first.id);
    }

    #[tokio::test]
    async fn test_stats_wait_for_the_tick() {
        let state = BotState::new(Behavior::default());
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 14, 0, 0).unwrap();
        state.record_interaction(1, Interaction::Message, now);
        assert!(state.is_dirty(Collection::UserData));
        let woken = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            state.save_requested(),
        )
        .await;
        assert!(woken.is_err());

        state.request_save(Collection::Blacklist);
        let woken = tokio::time::timeout(
            std::time::Duration::from_millis(50),
            state.save_requested(),
        )
        .await;
        assert!(woken.is_ok());
    }

    #[test]
    fn test_update_settings_marks_dirty_only_on_change() {
        let state = BotState::new(Behavior::default());
        let rejected = state.update_settings(|s| s.set_reply_chance(1.5));
        assert!(rejected.is_err());
        assert!(!state.is_dirty(Collection::Settings));

        state.update_settings(|s| s.set_reply_chance(0.5)).unwrap();
        assert!(state.is_dirty(Collection::Settings));
    }

    #[test]
    fn test_save_all_writes_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        let state = BotState::new(Behavior::default());
        state.blacklist.write().add(3);
        assert_eq!(state.save_all(&store), 0);
        for collection in Collection::ALL {
            assert!(store.path(collection).exists());
        }
        let restarted = BotState::load(&store, Behavior::default());
        assert!(restarted.is_blacklisted(3));
    }

    #[test]
    fn test_failed_save_stays_dirty() {
        let dir = tempfile::tempdir().unwrap();
        // a file where the data directory should be
        let blocker = dir.path().join("data");
        std::fs::write(&blocker, "").unwrap();
        let store = Store::new(&blocker);
        let state = BotState::new(Behavior::default());
        state.mark_dirty(Collection::UserData);
        assert_eq!(state.save_dirty(&store), 1);
        assert!(state.is_dirty(Collection::UserData));
    }

    #[test]
    fn test_admin_resolution() {
        let state = BotState::new(Behavior::default());
        state.add_owner(1);
        state.update_settings(|s| {
            s.guild_mut(10).admins.insert(2);
        });
        assert!(state.is_admin(None, 1));
        assert!(state.is_admin(Some(99), 1));
        assert!(state.is_admin(Some(10), 2));
        assert!(!state.is_admin(Some(11), 2));
        assert!(!state.is_admin(None, 2));
    }
}
