use crate::config::Behavior;
use crate::state::Settings;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingMessage {
    pub message_id: u64,
    pub guild_id: Option<u64>,
    pub channel_id: u64,
    pub author_id: u64,
    pub author_name: String,
    /// Text with the bot's own mention removed.
    pub content: String,
    pub mentions_bot: bool,
    pub replies_to_bot: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Switched off or timed out.
    Inactive,
    Blacklisted,
    ChannelDisabled,
    NotTriggered,
    Cooldown,
    /// No channel the bot may speak in.
    NoChannel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip(SkipReason),
    DeferToCommand,
    Reply { direct: bool },
    React,
}

/// What to do with one message. `draw` is a uniform sample in `[0, 1)` and is
/// the only randomness consulted.
///
/// The single draw is split into bands: `[0, reply_chance)` replies when
/// phantom replies are on, the next `reaction_chance` wide band reacts.
#[allow(clippy::too_many_arguments)]
pub fn decide_message(
    settings: &Settings,
    blacklisted: bool,
    behavior: &Behavior,
    prefix: &str,
    msg: &IncomingMessage,
    direct: bool,
    now: DateTime<Utc>,
    draw: f64,
) -> Decision {
    if !settings.is_active(now) {
        return Decision::Skip(SkipReason::Inactive);
    }
    if blacklisted {
        return Decision::Skip(SkipReason::Blacklisted);
    }
    if settings.is_channel_disabled(msg.guild_id, msg.channel_id) {
        return Decision::Skip(SkipReason::ChannelDisabled);
    }
    if msg.content.trim_start().starts_with(prefix) {
        return Decision::DeferToCommand;
    }
    if direct {
        return Decision::Reply { direct: true };
    }

    let reply_band = if settings.phantom_enabled {
        settings.reply_chance_for(msg.guild_id)
    } else {
        0.0
    };
    if draw < reply_band {
        Decision::Reply { direct: false }
    } else if draw < reply_band + behavior.reaction_chance {
        Decision::React
    } else {
        Decision::Skip(SkipReason::NotTriggered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn message(content: &str) -> IncomingMessage {
        IncomingMessage {
            message_id: 1,
            guild_id: Some(10),
            channel_id: 100,
            author_id: 5,
            author_name: "Alice".to_string(),
            content: content.to_string(),
            mentions_bot: false,
            replies_to_bot: false,
        }
    }

    fn decide(settings: &Settings, blacklisted: bool, msg: &IncomingMessage, direct: bool, draw: f64) -> Decision {
        decide_message(
            settings,
            blacklisted,
            &Behavior::default(),
            "!",
            msg,
            direct,
            Utc::now(),
            draw,
        )
    }

    #[test]
    fn test_gates_in_order() {
        let mut settings = Settings::default();
        settings.toggle_channel(10, 100);
        let msg = message("hello");

        // blacklist outranks the muted channel, inactivity outranks both
        assert_eq!(decide(&settings, true, &msg, true, 0.0), Decision::Skip(SkipReason::Blacklisted));
        assert_eq!(decide(&settings, false, &msg, true, 0.0), Decision::Skip(SkipReason::ChannelDisabled));
        settings.time_out(Utc::now(), 5).unwrap();
        assert_eq!(decide(&settings, true, &msg, true, 0.0), Decision::Skip(SkipReason::Inactive));
        settings.resume();
        settings.toggle_enabled();
        assert_eq!(decide(&settings, false, &msg, true, 0.0), Decision::Skip(SkipReason::Inactive));
    }

    #[test]
    fn test_commands_are_deferred() {
        let settings = Settings::default();
        assert_eq!(decide(&settings, false, &message("!status"), true, 0.0), Decision::DeferToCommand);
    }

    #[test]
    fn test_direct_always_replies() {
        let settings = Settings::default();
        assert_eq!(decide(&settings, false, &message("hey"), true, 0.999), Decision::Reply { direct: true });
    }

    #[test]
    fn test_draw_bands() {
        let mut settings = Settings::default();
        settings.set_reply_chance(0.2).unwrap();
        let msg = message("hey");
        assert_eq!(decide(&settings, false, &msg, false, 0.1), Decision::Reply { direct: false });
        assert_eq!(decide(&settings, false, &msg, false, 0.201), Decision::React);
        assert_eq!(decide(&settings, false, &msg, false, 0.5), Decision::Skip(SkipReason::NotTriggered));

        settings.toggle_phantom();
        assert_eq!(decide(&settings, false, &msg, false, 0.001), Decision::React);
        assert_eq!(decide(&settings, false, &msg, false, 0.1), Decision::Skip(SkipReason::NotTriggered));
    }

    #[test]
    fn test_guild_override_is_used() {
        let mut settings = Settings::default();
        settings.set_reply_chance(0.0).unwrap();
        settings.set_guild_reply_chance(10, Some(1.0)).unwrap();
        assert_eq!(decide(&settings, false, &message("hey"), false, 0.99), Decision::Reply { direct: false });
    }

    #[test]
    fn test_reply_rate_matches_configured_chance() {
        let mut rng = StdRng::seed_from_u64(7);
        let msg = message("ambient chatter");
        let trials = 20_000;
        for chance in [0.0, 0.1, 0.35, 0.8, 1.0] {
            let mut settings = Settings::default();
            settings.set_reply_chance(chance).unwrap();
            let replies = (0..trials)
                .filter(|_| {
                    let draw: f64 = rng.gen();
                    decide(&settings, false, &msg, false, draw) == Decision::Reply { direct: false }
                })
                .count();
            let rate = replies as f64 / trials as f64;
            assert!((rate - chance).abs() < 0.02, "chance {} gave rate {}", chance, rate);
        }
    }

    #[test]
    fn test_expired_timeout_is_active_again() {
        let mut settings = Settings::default();
        let past = Utc::now() - Duration::minutes(30);
        settings.time_out(past, 15).unwrap();
        assert_eq!(decide(&settings, false, &message("hey"), true, 0.0), Decision::Reply { direct: true });
    }
}
