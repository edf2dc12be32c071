use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

pub const MIN_REPLY_LENGTH: u32 = 50;
pub const MAX_REPLY_LENGTH: u32 = 1000;
pub const MAX_TIMEOUT_MINUTES: i64 = 7 * 24 * 60;

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("reply chance has to be between 0.0 and 1.0")]
    ReplyChanceOutOfRange,
    #[error("max reply has to be between {} and {}", MIN_REPLY_LENGTH, MAX_REPLY_LENGTH)]
    ReplyLengthOutOfRange,
    #[error("timeout has to be between 1 and {} minutes", MAX_TIMEOUT_MINUTES)]
    TimeoutOutOfRange,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub enabled: bool,
    pub timed_out_until: Option<DateTime<Utc>>,
    pub reply_chance: f64,
    pub max_reply_length: u32,
    pub boredom_enabled: bool,
    pub phantom_enabled: bool,
    pub guilds: BTreeMap<u64, GuildSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: true,
            timed_out_until: None,
            reply_chance: 0.1,
            max_reply_length: 200,
            boredom_enabled: true,
            phantom_enabled: true,
            guilds: BTreeMap::new(),
        }
    }
}

/// Per-guild overrides. Anything unset falls back to the global settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GuildSettings {
    pub admins: BTreeSet<u64>,
    pub boredom_channel: Option<u64>,
    pub presence_channel: Option<u64>,
    pub disabled_channels: BTreeSet<u64>,
    pub reply_chance_override: Option<f64>,
}

fn valid_chance(chance: f64) -> bool {
    (0.0..=1.0).contains(&chance)
}

impl Settings {
    pub fn set_reply_chance(&mut self, chance: f64) -> Result<(), SettingsError> {
        if !valid_chance(chance) {
            return Err(SettingsError::ReplyChanceOutOfRange);
        }
        self.reply_chance = chance;
        Ok(())
    }

    pub fn set_guild_reply_chance(
        &mut self,
        guild_id: u64,
        chance: Option<f64>,
    ) -> Result<(), SettingsError> {
        if let Some(c) = chance {
            if !valid_chance(c) {
                return Err(SettingsError::ReplyChanceOutOfRange);
            }
        }
        self.guild_mut(guild_id).reply_chance_override = chance;
        Ok(())
    }

    pub fn set_max_reply_length(&mut self, length: i64) -> Result<(), SettingsError> {
        if length < MIN_REPLY_LENGTH as i64 || length > MAX_REPLY_LENGTH as i64 {
            return Err(SettingsError::ReplyLengthOutOfRange);
        }
        self.max_reply_length = length as u32;
        Ok(())
    }

    pub fn time_out(&mut self, now: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>, SettingsError> {
        if !(1..=MAX_TIMEOUT_MINUTES).contains(&minutes) {
            return Err(SettingsError::TimeoutOutOfRange);
        }
        let until = now + Duration::minutes(minutes);
        self.timed_out_until = Some(until);
        Ok(until)
    }

    pub fn resume(&mut self) {
        self.timed_out_until = None;
    }

    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        self.timed_out_until.is_some_and(|until| until > now)
    }

    pub fn timeout_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.timed_out_until
            .filter(|until| *until > now)
            .map(|until| until - now)
    }

    /// Enabled and not in a timeout.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.enabled && !self.is_timed_out(now)
    }

    pub fn toggle_enabled(&mut self) -> bool {
        self.enabled = !self.enabled;
        self.enabled
    }

    pub fn toggle_boredom(&mut self) -> bool {
        self.boredom_enabled = !self.boredom_enabled;
        self.boredom_enabled
    }

    pub fn toggle_phantom(&mut self) -> bool {
        self.phantom_enabled = !self.phantom_enabled;
        self.phantom_enabled
    }

    pub fn guild(&self, guild_id: u64) -> Option<&GuildSettings> {
        self.guilds.get(&guild_id)
    }

    pub fn guild_mut(&mut self, guild_id: u64) -> &mut GuildSettings {
        self.guilds.entry(guild_id).or_default()
    }

    pub fn reply_chance_for(&self, guild_id: Option<u64>) -> f64 {
        guild_id
            .and_then(|id| self.guild(id))
            .and_then(|g| g.reply_chance_override)
            .unwrap_or(self.reply_chance)
    }

    pub fn is_channel_disabled(&self, guild_id: Option<u64>, channel_id: u64) -> bool {
        guild_id
            .and_then(|id| self.guild(id))
            .is_some_and(|g| g.disabled_channels.contains(&channel_id))
    }

    /// Flips the channel in the guild's disabled set. Returns true when the
    /// channel is now muted.
    pub fn toggle_channel(&mut self, guild_id: u64, channel_id: u64) -> bool {
        let guild = self.guild_mut(guild_id);
        if guild.disabled_channels.remove(&channel_id) {
            false
        } else {
            guild.disabled_channels.insert(channel_id);
            true
        }
    }

    pub fn is_guild_admin(&self, guild_id: u64, user_id: u64) -> bool {
        self.guild(guild_id)
            .is_some_and(|g| g.admins.contains(&user_id))
    }

    /// Repairs values a hand-edited file may have pushed out of range.
    pub fn sanitize(&mut self) -> Vec<String> {
        let defaults = Settings::default();
        let mut warnings = Vec::new();

        if !valid_chance(self.reply_chance) {
            warnings.push(format!(
                "reply_chance {} out of range, reset to {}",
                self.reply_chance, defaults.reply_chance
            ));
            self.reply_chance = defaults.reply_chance;
        }
        if !(MIN_REPLY_LENGTH..=MAX_REPLY_LENGTH).contains(&self.max_reply_length) {
            warnings.push(format!(
                "max_reply_length {} out of range, reset to {}",
                self.max_reply_length, defaults.max_reply_length
            ));
            self.max_reply_length = defaults.max_reply_length;
        }
        for (guild_id, guild) in self.guilds.iter_mut() {
            if let Some(chance) = guild.reply_chance_override {
                if !valid_chance(chance) {
                    warnings.push(format!(
                        "guild {} reply chance {} out of range, override dropped",
                        guild_id, chance
                    ));
                    guild.reply_chance_override = None;
                }
            }
        }
        warnings
    }
}
