use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const MAX_PREFERENCES: usize = 20;
pub const MAX_PREFERENCE_KEY_CHARS: usize = 32;
pub const MAX_PREFERENCE_VALUE_CHARS: usize = 200;

#[derive(Debug, Error, PartialEq)]
pub enum PreferenceError {
    #[error("preference name can't be empty")]
    EmptyKey,
    #[error("preference name is too long (max {} characters)", MAX_PREFERENCE_KEY_CHARS)]
    KeyTooLong,
    #[error("that value is too long (max {} characters)", MAX_PREFERENCE_VALUE_CHARS)]
    ValueTooLong,
    #[error("you already have {} preferences. that's plenty", MAX_PREFERENCES)]
    TooMany,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Message,
    Command,
    ReminderCreated,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UserStats {
    pub messages_sent: u64,
    pub commands_used: u64,
    pub reminders_created: u64,
    pub last_seen: Option<DateTime<Utc>>,
    pub preferences: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct UserDirectory {
    users: BTreeMap<u64, UserStats>,
}

impl UserDirectory {
    pub fn get(&self, user_id: u64) -> Option<&UserStats> {
        self.users.get(&user_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn record(&mut self, user_id: u64, interaction: Interaction, now: DateTime<Utc>) {
        let stats = self.users.entry(user_id).or_default();
        match interaction {
            Interaction::Message => stats.messages_sent += 1,
            Interaction::Command => stats.commands_used += 1,
            Interaction::ReminderCreated => stats.reminders_created += 1,
        }
        stats.last_seen = Some(now);
    }

    pub fn set_preference(
        &mut self,
        user_id: u64,
        key: &str,
        value: &str,
    ) -> Result<(), PreferenceError> {
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if key.is_empty() {
            return Err(PreferenceError::EmptyKey);
        }
        if key.chars().count() > MAX_PREFERENCE_KEY_CHARS {
            return Err(PreferenceError::KeyTooLong);
        }
        if value.chars().count() > MAX_PREFERENCE_VALUE_CHARS {
            return Err(PreferenceError::ValueTooLong);
        }

        let stats = self.users.entry(user_id).or_default();
        if !stats.preferences.contains_key(&key) && stats.preferences.len() >= MAX_PREFERENCES {
            return Err(PreferenceError::TooMany);
        }
        stats.preferences.insert(key, value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_counts_and_last_seen() {
        let now = Utc::now();
        let mut users = UserDirectory::default();
        users.record(1, Interaction::Message, now);
        users.record(1, Interaction::Message, now);
        users.record(1, Interaction::Command, now);
        users.record(1, Interaction::ReminderCreated, now);

        let stats = users.get(1).unwrap();
        assert_eq!(stats.messages_sent, 2);
        assert_eq!(stats.commands_used, 1);
        assert_eq!(stats.reminders_created, 1);
        assert_eq!(stats.last_seen, Some(now));
        assert!(users.get(2).is_none());
    }

    #[test]
    fn test_preference_limits() {
        let mut users = UserDirectory::default();
        users.set_preference(1, " Color ", " blue ").unwrap();
        assert_eq!(users.get(1).unwrap().preferences["color"], "blue");

        assert_eq!(users.set_preference(1, "  ", "x"), Err(PreferenceError::EmptyKey));
        assert_eq!(
            users.set_preference(1, &"k".repeat(33), "x"),
            Err(PreferenceError::KeyTooLong)
        );
        assert_eq!(
            users.set_preference(1, "k", &"v".repeat(201)),
            Err(PreferenceError::ValueTooLong)
        );

        for i in 1..MAX_PREFERENCES {
            users.set_preference(1, &format!("key{i}"), "v").unwrap();
        }
        assert_eq!(
            users.set_preference(1, "one-more", "v"),
            Err(PreferenceError::TooMany)
        );
        // overwriting an existing key is still allowed at the cap
        users.set_preference(1, "color", "red").unwrap();
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let mut users = UserDirectory::default();
        users.record(42, Interaction::Message, Utc::now());
        let json = serde_json::to_value(&users).unwrap();
        assert!(json.get("42").is_some());
    }
}
