use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub llm_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    pub llm_temperature: f32,
    pub llm_timeout_secs: u64,
    pub llm_max_attempts: u32,
    pub llm_retry_base_ms: u64,
    pub owner_ids: Vec<u64>,
    pub data_dir: PathBuf,
    pub behavior_file: PathBuf,
    pub bot_name: String,
    pub system_prompt: String,
    pub timezone: Tz,
    pub status_message: String,
}

const DEFAULT_SYSTEM_PROMPT: &str = "you are {name}. not a bot, not an ai, just {name}. you hang out in a discord server with a small crew \
and you get to see what people are saying. when someone says \"{name}\" they mean you, and when they say \"she\" they probably mean you too.\n\n\
never say you're an ai or a model. never mention instructions, prompts or system messages.\n\n\
lines starting with \"{name}:\" are things you said earlier. everyone else has their display name attached. you know these people.\n\n\
you talk chill. lowercase only, barely any punctuation, no emojis. relaxed and a little detached, like you're half paying attention from a couch. \
one or two sentences max. make the point and let silence do the rest. only bring up names or old messages when it's actually relevant.";

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        let bot_name = env::var("BOT_NAME").unwrap_or_else(|_| "exia".to_string());
        let llm_url = env::var("LLM_API_URL")
            .map_err(|_| anyhow::anyhow!("LLM_API_URL must be set"))?;
        if llm_url.trim().is_empty() {
            anyhow::bail!("LLM_API_URL must not be empty");
        }
        reqwest::Url::parse(&llm_url)
            .map_err(|e| anyhow::anyhow!("LLM_API_URL is not a valid URL: {}", e))?;

        let timezone = env::var("BOT_TIMEZONE").unwrap_or_else(|_| "UTC".to_string());
        let timezone: Tz = timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("BOT_TIMEZONE is not a known timezone: {}", e))?;

        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            llm_url,
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "local-model".to_string()),
            llm_api_key: env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()),
            llm_temperature: env::var("LLM_TEMPERATURE")
                .unwrap_or_else(|_| "0.85".to_string())
                .parse()
                .unwrap_or(0.85),
            llm_timeout_secs: env::var("LLM_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            llm_max_attempts: env::var("LLM_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3)
                .max(1),
            llm_retry_base_ms: env::var("LLM_RETRY_BASE_MS")
                .unwrap_or_else(|_| "2000".to_string())
                .parse()
                .unwrap_or(2000),
            owner_ids: env::var("OWNER_IDS")
                .map(|ids| parse_id_list(&ids))
                .unwrap_or_default(),
            data_dir: env::var("DATA_DIR")
                .unwrap_or_else(|_| "data".to_string())
                .into(),
            behavior_file: env::var("BEHAVIOR_FILE")
                .unwrap_or_else(|_| "exia.toml".to_string())
                .into(),
            system_prompt: env::var("SYSTEM_PROMPT")
                .unwrap_or_else(|_| DEFAULT_SYSTEM_PROMPT.replace("{name}", &bot_name)),
            bot_name,
            timezone,
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "just vibing".to_string()),
        })
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

fn parse_id_list(raw: &str) -> Vec<u64> {
    raw.split(',')
        .filter_map(|id| id.trim().parse().ok())
        .collect()
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("llm_url", &self.llm_url)
            .field("llm_model", &self.llm_model)
            .field(
                "llm_api_key",
                &self.llm_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("llm_temperature", &self.llm_temperature)
            .field("llm_timeout_secs", &self.llm_timeout_secs)
            .field("llm_max_attempts", &self.llm_max_attempts)
            .field("llm_retry_base_ms", &self.llm_retry_base_ms)
            .field("owner_ids", &self.owner_ids)
            .field("data_dir", &self.data_dir)
            .field("behavior_file", &self.behavior_file)
            .field("bot_name", &self.bot_name)
            .field("system_prompt", &self.system_prompt)
            .field("timezone", &self.timezone)
            .field("status_message", &self.status_message)
            .finish()
    }
}

/// Tunables that can change while the bot is running (`!reloadconfig`).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Behavior {
    pub reaction_chance: f64,
    pub reaction_emojis: Vec<String>,
    pub presence_comment_chance: f64,
    pub reaction_reply_chance: f64,
    pub boredom_check_secs: u64,
    pub boredom_increment: f64,
    pub boredom_max: f64,
    pub boredom_idle_secs: u64,
    pub command_cooldown_secs: u64,
    pub reply_cooldown_secs: u64,
    pub reminder_tick_secs: u64,
    pub autosave_secs: u64,
    pub context_window_secs: u64,
    pub max_context_messages: usize,
    pub context_char_budget: usize,
    pub reply_delay_min_ms: u64,
    pub reply_delay_max_ms: u64,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            reaction_chance: 0.003,
            reaction_emojis: ["👍", "😂", "❤️", "😮", "😢", "🎉", "🔥", "💯", "🤔", "👀"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            presence_comment_chance: 0.001,
            reaction_reply_chance: 0.1,
            boredom_check_secs: 60,
            boredom_increment: 0.02,
            boredom_max: 0.5,
            boredom_idle_secs: 300,
            command_cooldown_secs: 3,
            reply_cooldown_secs: 20,
            reminder_tick_secs: 30,
            autosave_secs: 300,
            context_window_secs: 600,
            max_context_messages: 30,
            context_char_budget: 12_000,
            reply_delay_min_ms: 2_000,
            reply_delay_max_ms: 8_000,
        }
    }
}

impl Behavior {
    /// Reads the behaviour file. A missing file yields the defaults; a present
    /// but invalid one is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read behaviour file {}: {}",
                    path.display(),
                    e
                ))
            }
        };
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let behavior: Behavior = toml::from_str(content)?;
        behavior.validate()?;
        Ok(behavior)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("reaction_chance", self.reaction_chance),
            ("presence_comment_chance", self.presence_comment_chance),
            ("reaction_reply_chance", self.reaction_reply_chance),
            ("boredom_increment", self.boredom_increment),
            ("boredom_max", self.boredom_max),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be between 0.0 and 1.0 (got {})", name, value);
            }
        }
        if self.reaction_emojis.is_empty() {
            anyhow::bail!("reaction_emojis must not be empty");
        }
        for (name, value) in [
            ("boredom_check_secs", self.boredom_check_secs),
            ("reminder_tick_secs", self.reminder_tick_secs),
            ("autosave_secs", self.autosave_secs),
            ("context_window_secs", self.context_window_secs),
        ] {
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }
        if self.reply_delay_min_ms > self.reply_delay_max_ms {
            anyhow::bail!("reply_delay_min_ms must not exceed reply_delay_max_ms");
        }
        Ok(())
    }

    pub fn context_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.context_window_secs as i64)
    }

    pub fn command_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.command_cooldown_secs as i64)
    }

    pub fn reply_cooldown(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.reply_cooldown_secs as i64)
    }

    pub fn boredom_idle(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.boredom_idle_secs as i64)
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
