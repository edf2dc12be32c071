//! Free-text reminder handling in direct messages.
//!
//! Recognised:
//! - `remind me to <task> at|in|on|by <time>`
//! - `list reminders`, `show reminders`, `my reminders`
//! - `cancel reminder <id>`
//!
//! Everything else is ordinary chat and goes to the reply engine.

use crate::services::reminder::{format_due, format_reminder_list, CancelOutcome};
use crate::state::{BotState, Interaction};
use crate::store::Collection;
use crate::timeparse::{parse_when, TimeParseError};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use regex::Regex;
use std::sync::OnceLock;
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum DmIntent {
    Remind { task: String, due_at: DateTime<Utc> },
    /// Looked like a reminder but the time didn't parse.
    BadTime(TimeParseError),
    /// `remind me to` with no time keyword at all.
    MissingTime,
    ListReminders,
    CancelReminder(String),
    /// `cancel reminder` with no id.
    CancelUsage,
    Chat,
}

fn remind_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)^\s*remind\s+me\s+to\s+(.+?)\s*$").expect("valid regex"))
}

fn time_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:at|in|on|by)\b").expect("valid regex"))
}

fn list_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?:(?:list|show)(?:\s+my)?|my)\s+reminders\s*[.!?]*\s*$")
            .expect("valid regex")
    })
}

fn cancel_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*cancel\s+reminder\b\s*(\S+)?\s*$").expect("valid regex")
    })
}

/// Classifies one DM. Pure apart from reading the clock passed in.
pub fn interpret(text: &str, now: DateTime<Utc>, tz: &Tz) -> DmIntent {
    if list_pattern().is_match(text) {
        return DmIntent::ListReminders;
    }
    if let Some(caps) = cancel_pattern().captures(text) {
        return match caps.get(1) {
            Some(id) => DmIntent::CancelReminder(id.as_str().to_string()),
            None => DmIntent::CancelUsage,
        };
    }
    let Some(caps) = remind_pattern().captures(text) else {
        return DmIntent::Chat;
    };
    let body = caps.get(1).map_or("", |m| m.as_str());

    // Left to right: the first split whose time parses wins, so a task may
    // itself contain "at" or "on".
    let local_now = now.with_timezone(tz);
    let mut last_error = None;
    for found in time_keyword().find_iter(body).filter(|m| m.start() > 0) {
        let task = body[..found.start()].trim();
        let when = &body[found.start()..];
        match parse_when(when, &local_now) {
            Ok(due) => {
                return DmIntent::Remind {
                    task: task.to_string(),
                    due_at: due.with_timezone(&Utc),
                }
            }
            Err(e) => last_error = Some(e),
        }
    }
    match last_error {
        Some(e) => DmIntent::BadTime(e),
        None => DmIntent::MissingTime,
    }
}

/// Carries out an intent for `user_id`. `None` means the message is chat and
/// the caller should hand it to the engine.
pub fn apply(
    state: &BotState,
    intent: DmIntent,
    user_id: u64,
    now: DateTime<Utc>,
    tz: &Tz,
) -> Option<String> {
    let reply = match intent {
        DmIntent::Chat => return None,
        DmIntent::Remind { task, due_at } => {
            let created = state.reminders.lock().create(user_id, &task, due_at, now);
            match created {
                Ok(reminder) => {
                    state.request_save(Collection::Reminders);
                    state.record_interaction(user_id, Interaction::ReminderCreated, now);
                    info!("Reminder {} created for {} due {}", reminder.id, user_id, reminder.due_at);
                    format!(
                        "got it. i'll remind you to '{}' at {} (id: {})",
                        reminder.task,
                        format_due(reminder.due_at, tz),
                        reminder.id
                    )
                }
                Err(e) => e.to_string(),
            }
        }
        DmIntent::BadTime(e) => e.to_string(),
        DmIntent::MissingTime => {
            "when though? try 'remind me to stretch at 5pm' or 'remind me to stretch in 20 minutes'"
                .to_string()
        }
        DmIntent::ListReminders => {
            let reminders = state.reminders.lock().list(user_id);
            format_reminder_list(&reminders, tz)
        }
        DmIntent::CancelReminder(id) => cancel(state, user_id, &id),
        DmIntent::CancelUsage => "cancel which one? 'cancel reminder <id>'".to_string(),
    };
    Some(reply)
}

/// Shared by the DM intent and `!cancelreminder`. Reminders span every guild,
/// so only owners may cancel someone else's.
pub fn cancel(state: &BotState, user_id: u64, id: &str) -> String {
    let outcome = state
        .reminders
        .lock()
        .cancel(user_id, id, state.is_owner(user_id));
    match outcome {
        CancelOutcome::Cancelled(reminder) => {
            state.request_save(Collection::Reminders);
            info!("Reminder {} cancelled by {}", reminder.id, user_id);
            format!("cancelled reminder: {}", reminder.task)
        }
        CancelOutcome::NotFound => format!("couldn't find reminder {}", id.trim()),
        CancelOutcome::NotOwner => "that's not your reminder".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Behavior;
    use crate::reminders::ReminderDispatcher;
    use crate::services::reminder::ReminderStatus;
    use crate::testing::{FakePort, Sent};
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn two_pm() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 14, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_reminder_from_dm_is_delivered() {
        let state = Arc::new(BotState::new(Behavior::default()));
        let tz = Tz::UTC;
        let now = two_pm();

        let intent = interpret("remind me to call mom at 5pm", now, &tz);
        let due = Utc.with_ymd_and_hms(2025, 1, 1, 17, 0, 0).unwrap();
        assert_eq!(
            intent,
            DmIntent::Remind { task: "call mom".to_string(), due_at: due }
        );
        let reply = apply(&state, intent, 7, now, &tz).unwrap();
        assert_eq!(reply, "got it. i'll remind you to 'call mom' at 2025-01-01 17:00 (id: R1)");
        assert_eq!(state.users.lock().get(7).unwrap().reminders_created, 1);

        let port = Arc::new(FakePort::new());
        let dispatcher = ReminderDispatcher::new(state.clone(), port.clone(), 30);
        let handled = dispatcher.tick(due + Duration::seconds(30)).await;
        assert_eq!(handled.len(), 1);
        assert_eq!(handled[0].status, ReminderStatus::Delivered);
        assert_eq!(
            port.sent(),
            vec![Sent::Direct { user: 7, content: "reminder: call mom".to_string() }]
        );
    }

    #[test]
    fn test_task_may_contain_time_words() {
        let intent = interpret("remind me to meet Sam at the park at 5pm", two_pm(), &Tz::UTC);
        match intent {
            DmIntent::Remind { task, due_at } => {
                assert_eq!(task, "meet Sam at the park");
                assert_eq!(due_at, Utc.with_ymd_and_hms(2025, 1, 1, 17, 0, 0).unwrap());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_relative_and_weekday_times() {
        let now = two_pm();
        assert_eq!(
            interpret("Remind me to stretch in 20 minutes", now, &Tz::UTC),
            DmIntent::Remind {
                task: "stretch".to_string(),
                due_at: now + Duration::minutes(20)
            }
        );
        assert_eq!(
            interpret("remind me to pay rent on friday at 9am", now, &Tz::UTC),
            DmIntent::Remind {
                task: "pay rent".to_string(),
                due_at: Utc.with_ymd_and_hms(2025, 1, 3, 9, 0, 0).unwrap()
            }
        );
    }

    #[test]
    fn test_times_are_local_to_the_bot_timezone() {
        let tz: Tz = "America/New_York".parse().unwrap();
        // 14:00 UTC is 09:00 in New York. "in at 5pm" is not a time, so the
        // split moves on to "at".
        let intent = interpret("remind me to log in at 5pm", two_pm(), &tz);
        assert_eq!(
            intent,
            DmIntent::Remind {
                task: "log in".to_string(),
                due_at: Utc.with_ymd_and_hms(2025, 1, 1, 22, 0, 0).unwrap()
            }
        );
    }

    #[test]
    fn test_unparsable_time_is_explained() {
        let now = two_pm();
        assert!(matches!(
            interpret("remind me to feed the cat at someday", now, &Tz::UTC),
            DmIntent::BadTime(TimeParseError::Unrecognized(_))
        ));
        assert_eq!(
            interpret("remind me to feed the cat", now, &Tz::UTC),
            DmIntent::MissingTime
        );

        let state = BotState::new(Behavior::default());
        let reply = apply(&state, DmIntent::MissingTime, 7, now, &Tz::UTC).unwrap();
        assert!(reply.starts_with("when though?"));
        assert!(state.reminders.lock().is_empty());
    }

    #[test]
    fn test_list_and_cancel() {
        let state = BotState::new(Behavior::default());
        let now = two_pm();
        let tz = Tz::UTC;

        assert_eq!(interpret("list reminders", now, &tz), DmIntent::ListReminders);
        assert_eq!(interpret("My reminders?", now, &tz), DmIntent::ListReminders);
        assert_eq!(
            apply(&state, DmIntent::ListReminders, 7, now, &tz).unwrap(),
            "you have no reminders set"
        );

        let intent = interpret("remind me to stretch at 3pm", now, &tz);
        apply(&state, intent, 7, now, &tz);
        assert_eq!(
            apply(&state, DmIntent::ListReminders, 7, now, &tz).unwrap(),
            "your reminders:\n• [R1] stretch - 2025-01-01 15:00"
        );

        assert_eq!(interpret("cancel reminder", now, &tz), DmIntent::CancelUsage);
        assert_eq!(
            interpret("cancel reminder r1", now, &tz),
            DmIntent::CancelReminder("r1".to_string())
        );
        assert_eq!(cancel(&state, 8, "R1"), "that's not your reminder");
        assert_eq!(
            apply(&state, DmIntent::CancelReminder("r1".to_string()), 7, now, &tz).unwrap(),
            "cancelled reminder: stretch"
        );
        assert_eq!(cancel(&state, 7, "R1"), "couldn't find reminder R1");
    }

    #[test]
    fn test_owner_can_cancel_anyones_reminder() {
        let state = BotState::new(Behavior::default());
        state.add_owner(1);
        state
            .reminders
            .lock()
            .create(7, "stretch", two_pm() + Duration::hours(1), two_pm())
            .unwrap();
        let intent = interpret("cancel reminder R1", two_pm(), &Tz::UTC);
        assert_eq!(
            apply(&state, intent, 1, two_pm(), &Tz::UTC).unwrap(),
            "cancelled reminder: stretch"
        );
    }

    #[test]
    fn test_everything_else_is_chat() {
        let state = BotState::new(Behavior::default());
        let intent = interpret("hey what's up", two_pm(), &Tz::UTC);
        assert_eq!(intent, DmIntent::Chat);
        assert!(apply(&state, intent, 7, two_pm(), &Tz::UTC).is_none());
    }

    #[test]
    fn test_guild_admins_cannot_cancel_other_users_reminders() {
        let state = BotState::new(Behavior::default());
        state.update_settings(|s| {
            s.guild_mut(10).admins.insert(2);
        });
        state
            .reminders
            .lock()
            .create(7, "stretch", two_pm() + Duration::hours(1), two_pm())
            .unwrap();
        assert_eq!(cancel(&state, 2, "R1"), "that's not your reminder");
        assert_eq!(state.reminders.lock().len(), 1);
    }
}
