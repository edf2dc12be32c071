//! Free-text reminder times.
//!
//! Accepted shapes:
//! - relative: `in 20 minutes`, `in an hour`, `in 1h 30m`
//! - absolute: `2025-03-01 14:00`, `2025/03/01 14:00`, `2025-03-01` (09:00)
//! - phrases: any mix of one day word (`today`, `tonight`, `tomorrow`,
//!   `next week`, `friday`, `next friday`) and one clock (`3pm`, `3:30 pm`,
//!   `15:30`, `noon`, `midnight`) or part of day (`morning`, `evening`, ...)
//!
//! Phrase results that land at or before `now` are pushed forward a day, or a
//! week when a weekday was named. Absolute date-times are never moved.

use chrono::{
    DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
    Weekday,
};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TimeParseError {
    #[error("you didn't say when")]
    Empty,
    #[error("no idea what '{0}' means as a time. try 3pm, tomorrow at 15:30 or in 20 minutes")]
    Unrecognized(String),
    #[error("'{0}' gives me two different times. pick one")]
    Ambiguous(String),
    #[error("'{0}' isn't a real time of day")]
    InvalidClock(String),
    #[error("today when? give me a time like 3pm")]
    MissingClock,
    #[error("that's way too far out")]
    OutOfRange,
    #[error("that time already passed")]
    InPast,
    #[error("that time doesn't exist here (clocks skip it)")]
    Nonexistent,
}

const ABSOLUTE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M",
];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Day {
    Today,
    Tomorrow,
    NextWeek,
    Weekday { day: Weekday, next: bool },
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Clock {
    hour: u32,
    minute: u32,
    /// Written with am/pm, so a part of day must not shift it.
    meridiem: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Period {
    Morning,
    Afternoon,
    Evening,
    Tonight,
    Night,
}

impl Period {
    fn default_hour(self) -> u32 {
        match self {
            Period::Morning => 9,
            Period::Afternoon => 15,
            Period::Evening => 18,
            Period::Tonight => 20,
            Period::Night => 21,
        }
    }

    fn is_pm(self) -> bool {
        !matches!(self, Period::Morning)
    }
}

#[derive(Debug, Default)]
struct Phrase {
    day: Option<Day>,
    clock: Option<Clock>,
    period: Option<Period>,
}

pub fn parse_when<Tz: TimeZone>(
    input: &str,
    now: &DateTime<Tz>,
) -> Result<DateTime<Tz>, TimeParseError> {
    let text = normalize(input);
    if text.is_empty() {
        return Err(TimeParseError::Empty);
    }

    if let Some(rest) = text.strip_prefix("in ") {
        return parse_relative(rest, now);
    }
    if let Some(result) = parse_absolute(input.trim(), now) {
        return result;
    }

    let phrase = parse_phrase(&text)?;
    resolve(phrase, now)
}

fn normalize(input: &str) -> String {
    let lowered = input
        .to_lowercase()
        .replace("a.m.", "am")
        .replace("p.m.", "pm")
        .replace(',', " ");
    lowered
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn relative_unit_gap() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d+)\s+([a-z])").expect("valid regex"))
}

fn meridiem_gap() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d)\s+(am|pm)(\s|$)").expect("valid regex"))
}

fn clock_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{1,2})(?::(\d{2}))?(am|pm)?$").expect("valid regex")
    })
}

fn parse_relative<Tz: TimeZone>(
    rest: &str,
    now: &DateTime<Tz>,
) -> Result<DateTime<Tz>, TimeParseError> {
    let spans: Vec<&str> = rest
        .split_whitespace()
        .filter(|w| *w != "and")
        .map(|w| if w == "a" || w == "an" { "1" } else { w })
        .collect();
    let spaced = spans.join(" ");
    let joined = relative_unit_gap().replace_all(&spaced, "$1$2");

    let duration = humantime::parse_duration(&joined)
        .map_err(|_| TimeParseError::Unrecognized(format!("in {}", rest)))?;
    if duration.is_zero() {
        return Err(TimeParseError::InPast);
    }
    let delta = Duration::from_std(duration).map_err(|_| TimeParseError::OutOfRange)?;
    now.clone()
        .checked_add_signed(delta)
        .ok_or(TimeParseError::OutOfRange)
}

fn parse_absolute<Tz: TimeZone>(
    text: &str,
    now: &DateTime<Tz>,
) -> Option<Result<DateTime<Tz>, TimeParseError>> {
    let naive = ABSOLUTE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(9, 0, 0))
        })?;

    Some(localize(&now.timezone(), naive).and_then(|at| {
        if at <= *now {
            Err(TimeParseError::InPast)
        } else {
            Ok(at)
        }
    }))
}

fn parse_phrase(text: &str) -> Result<Phrase, TimeParseError> {
    let joined = meridiem_gap().replace_all(text, "$1$2$3");
    let tokens: Vec<&str> = joined.split_whitespace().collect();
    let mut phrase = Phrase::default();
    let mut i = 0;

    while i < tokens.len() {
        let token = tokens[i];
        i += 1;
        match token {
            "at" | "on" | "by" | "the" | "this" => {}
            "today" => set_day(&mut phrase, Day::Today, text)?,
            "tomorrow" | "tmrw" | "tmr" => set_day(&mut phrase, Day::Tomorrow, text)?,
            "tonight" => {
                set_day(&mut phrase, Day::Today, text)?;
                set_period(&mut phrase, Period::Tonight, text)?;
            }
            "next" => {
                let following = tokens.get(i).copied().unwrap_or_default();
                i += 1;
                if following == "week" {
                    set_day(&mut phrase, Day::NextWeek, text)?;
                } else if let Some(day) = weekday(following) {
                    set_day(&mut phrase, Day::Weekday { day, next: true }, text)?;
                } else {
                    return Err(TimeParseError::Unrecognized(
                        format!("next {}", following).trim().to_string(),
                    ));
                }
            }
            "noon" | "midday" => set_clock(&mut phrase, clock(12, 0), text)?,
            "midnight" => set_clock(&mut phrase, clock(0, 0), text)?,
            "morning" => set_period(&mut phrase, Period::Morning, text)?,
            "afternoon" => set_period(&mut phrase, Period::Afternoon, text)?,
            "evening" => set_period(&mut phrase, Period::Evening, text)?,
            "night" => set_period(&mut phrase, Period::Night, text)?,
            other => {
                if let Some(day) = weekday(other) {
                    set_day(&mut phrase, Day::Weekday { day, next: false }, text)?;
                } else if let Some(parsed) = parse_clock(other)? {
                    set_clock(&mut phrase, parsed, text)?;
                } else {
                    return Err(TimeParseError::Unrecognized(other.to_string()));
                }
            }
        }
    }

    if phrase.day.is_none() && phrase.clock.is_none() && phrase.period.is_none() {
        return Err(TimeParseError::Unrecognized(text.to_string()));
    }
    Ok(phrase)
}

fn clock(hour: u32, minute: u32) -> Clock {
    Clock {
        hour,
        minute,
        meridiem: true,
    }
}

fn set_day(phrase: &mut Phrase, day: Day, text: &str) -> Result<(), TimeParseError> {
    if phrase.day.is_some() {
        return Err(TimeParseError::Ambiguous(text.to_string()));
    }
    phrase.day = Some(day);
    Ok(())
}

fn set_clock(phrase: &mut Phrase, clock: Clock, text: &str) -> Result<(), TimeParseError> {
    if phrase.clock.is_some() {
        return Err(TimeParseError::Ambiguous(text.to_string()));
    }
    phrase.clock = Some(clock);
    Ok(())
}

fn set_period(phrase: &mut Phrase, period: Period, text: &str) -> Result<(), TimeParseError> {
    if phrase.period.is_some() {
        return Err(TimeParseError::Ambiguous(text.to_string()));
    }
    phrase.period = Some(period);
    Ok(())
}

fn weekday(token: &str) -> Option<Weekday> {
    let day = match token {
        "monday" | "mon" => Weekday::Mon,
        "tuesday" | "tue" | "tues" => Weekday::Tue,
        "wednesday" | "wed" => Weekday::Wed,
        "thursday" | "thu" | "thur" | "thurs" => Weekday::Thu,
        "friday" | "fri" => Weekday::Fri,
        "saturday" | "sat" => Weekday::Sat,
        "sunday" | "sun" => Weekday::Sun,
        _ => return None,
    };
    Some(day)
}

/// `Ok(None)` when the token is not clock-shaped at all.
fn parse_clock(token: &str) -> Result<Option<Clock>, TimeParseError> {
    let Some(caps) = clock_pattern().captures(token) else {
        return Ok(None);
    };
    let invalid = || TimeParseError::InvalidClock(token.to_string());

    let hour: u32 = caps[1].parse().map_err(|_| invalid())?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().map_err(|_| invalid())?,
        None => 0,
    };
    if minute > 59 {
        return Err(invalid());
    }

    match caps.get(3).map(|m| m.as_str()) {
        Some(meridiem) => {
            if !(1..=12).contains(&hour) {
                return Err(invalid());
            }
            let hour = match (meridiem, hour) {
                ("am", 12) => 0,
                ("am", h) => h,
                ("pm", 12) => 12,
                (_, h) => h + 12,
            };
            Ok(Some(clock(hour, minute)))
        }
        None => {
            if hour > 23 {
                return Err(invalid());
            }
            Ok(Some(Clock {
                hour,
                minute,
                meridiem: false,
            }))
        }
    }
}

fn resolve<Tz: TimeZone>(phrase: Phrase, now: &DateTime<Tz>) -> Result<DateTime<Tz>, TimeParseError> {
    let time = match (phrase.clock, phrase.period) {
        (Some(c), Some(p)) if !c.meridiem && c.hour < 12 && p.is_pm() => {
            NaiveTime::from_hms_opt(c.hour + 12, c.minute, 0)
        }
        (Some(c), _) => NaiveTime::from_hms_opt(c.hour, c.minute, 0),
        (None, Some(p)) => NaiveTime::from_hms_opt(p.default_hour(), 0, 0),
        (None, None) if phrase.day == Some(Day::Today) => return Err(TimeParseError::MissingClock),
        (None, None) => NaiveTime::from_hms_opt(now.hour(), now.minute(), 0),
    }
    .ok_or(TimeParseError::OutOfRange)?;

    let today = now.date_naive();
    let (date, rollover_days) = match phrase.day {
        None | Some(Day::Today) => (today, 1),
        Some(Day::Tomorrow) => (today + Duration::days(1), 1),
        Some(Day::NextWeek) => (today + Duration::days(7), 1),
        Some(Day::Weekday { day, next }) => {
            let mut ahead = (day.num_days_from_monday() as i64
                - now.weekday().num_days_from_monday() as i64)
                .rem_euclid(7);
            if next && ahead == 0 {
                ahead = 7;
            }
            (today + Duration::days(ahead), 7)
        }
    };

    let tz = now.timezone();
    let candidate = localize(&tz, date.and_time(time))?;
    if candidate > *now {
        return Ok(candidate);
    }
    let later = date
        .checked_add_signed(Duration::days(rollover_days))
        .ok_or(TimeParseError::OutOfRange)?;
    localize(&tz, later.and_time(time))
}

fn localize<Tz: TimeZone>(tz: &Tz, naive: NaiveDateTime) -> Result<DateTime<Tz>, TimeParseError> {
    tz.from_local_datetime(&naive)
        .earliest()
        .ok_or(TimeParseError::Nonexistent)
}
