use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_TASK_CHARS: usize = 1500;
pub const MAX_PENDING_PER_USER: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    #[default]
    Pending,
    Delivered,
    /// Delivery was attempted and failed. Never retried.
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub user_id: u64,
    pub task: String,
    pub due_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub status: ReminderStatus,
}

impl Reminder {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ReminderError {
    #[error("remind you to do what?")]
    EmptyTask,
    #[error("that's a lot. keep the task under {} characters", MAX_TASK_CHARS)]
    TaskTooLong,
    #[error("you already have {} reminders pending. deal with some first", MAX_PENDING_PER_USER)]
    TooMany,
    #[error("that time already passed")]
    InPast,
}

#[derive(Debug, PartialEq)]
pub enum CancelOutcome {
    Cancelled(Reminder),
    NotFound,
    NotOwner,
}

/// What the reminders file holds. `next_seq` covers ids of reminders that
/// already left the book.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredReminders")]
pub struct ReminderSnapshot {
    pub next_seq: u64,
    pub reminders: Vec<Reminder>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredReminders {
    Book {
        #[serde(default)]
        next_seq: u64,
        reminders: Vec<Reminder>,
    },
    /// Files written before the counter was stored.
    Bare(Vec<Reminder>),
}

impl From<StoredReminders> for ReminderSnapshot {
    fn from(stored: StoredReminders) -> Self {
        match stored {
            StoredReminders::Book { next_seq, reminders } => Self { next_seq, reminders },
            StoredReminders::Bare(reminders) => Self { next_seq: 0, reminders },
        }
    }
}

/// Pending reminders. Delivered, failed and cancelled reminders leave the
/// book, so the persisted snapshot only ever holds pending ones.
#[derive(Debug, Default)]
pub struct ReminderBook {
    pending: Vec<Reminder>,
    next_seq: u64,
}

impl ReminderBook {
    pub fn from_snapshot(snapshot: ReminderSnapshot) -> Self {
        let pending: Vec<Reminder> = snapshot
            .reminders
            .into_iter()
            .filter(|r| r.status == ReminderStatus::Pending)
            .collect();
        let after_pending = pending
            .iter()
            .filter_map(|r| sequence_of(&r.id))
            .max()
            .unwrap_or(0)
            + 1;
        Self {
            pending,
            next_seq: snapshot.next_seq.max(after_pending),
        }
    }

    pub fn snapshot(&self) -> ReminderSnapshot {
        ReminderSnapshot {
            next_seq: self.next_seq.max(1),
            reminders: self.pending.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn create(
        &mut self,
        user_id: u64,
        task: &str,
        due_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Reminder, ReminderError> {
        let task = task.trim();
        if task.is_empty() {
            return Err(ReminderError::EmptyTask);
        }
        if task.chars().count() > MAX_TASK_CHARS {
            return Err(ReminderError::TaskTooLong);
        }
        if due_at <= now {
            return Err(ReminderError::InPast);
        }
        if self.pending.iter().filter(|r| r.user_id == user_id).count() >= MAX_PENDING_PER_USER {
            return Err(ReminderError::TooMany);
        }

        let seq = self.next_seq.max(1);
        self.next_seq = seq + 1;
        let reminder = Reminder {
            id: format!("R{}", seq),
            user_id,
            task: task.to_string(),
            due_at,
            created_at: now,
            status: ReminderStatus::Pending,
        };
        self.pending.push(reminder.clone());
        Ok(reminder)
    }

    /// The user's pending reminders in creation order.
    pub fn list(&self, user_id: u64) -> Vec<Reminder> {
        self.pending
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn cancel(&mut self, requester: u64, id: &str, is_admin: bool) -> CancelOutcome {
        let id = id.trim();
        let Some(index) = self
            .pending
            .iter()
            .position(|r| r.id.eq_ignore_ascii_case(id))
        else {
            return CancelOutcome::NotFound;
        };
        if self.pending[index].user_id != requester && !is_admin {
            return CancelOutcome::NotOwner;
        }
        let mut reminder = self.pending.remove(index);
        reminder.status = ReminderStatus::Cancelled;
        CancelOutcome::Cancelled(reminder)
    }

    /// Every reminder due at `now`, oldest due first. They stay in the book
    /// until `finish` so a save taken mid-delivery still holds them.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<Reminder> {
        let mut due: Vec<Reminder> = self.pending.iter().filter(|r| r.is_due(now)).cloned().collect();
        due.sort_by_key(|r| r.due_at);
        due
    }

    /// Drops a reminder whose delivery was attempted. `None` if it was
    /// cancelled in the meantime.
    pub fn finish(&mut self, id: &str) -> Option<Reminder> {
        let index = self.pending.iter().position(|r| r.id == id)?;
        Some(self.pending.remove(index))
    }
}

fn sequence_of(id: &str) -> Option<u64> {
    id.strip_prefix('R')
        .or_else(|| id.strip_prefix('r'))
        .and_then(|digits| digits.parse().ok())
}

pub fn format_due(at: DateTime<Utc>, tz: &Tz) -> String {
    at.with_timezone(tz).format("%Y-%m-%d %H:%M").to_string()
}

pub fn format_reminder_list(reminders: &[Reminder], tz: &Tz) -> String {
    if reminders.is_empty() {
        return "you have no reminders set".to_string();
    }
    let lines: Vec<String> = reminders
        .iter()
        .map(|r| format!("• [{}] {} - {}", r.id, r.task, format_due(r.due_at, tz)))
        .collect();
    format!("your reminders:\n{}", lines.join("\n"))
}
