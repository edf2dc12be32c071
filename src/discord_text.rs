pub fn strip_bot_mentions(input: &str, bot_id: u64) -> String {
    let mention = format!("<@{}>", bot_id);
    let mention_nick = format!("<@!{}>", bot_id);

    input
        .replace(&mention, "")
        .replace(&mention_nick, "")
        .trim()
        .to_string()
}

/// Tidies model output before it is sent. Returns `None` when nothing
/// sendable is left.
pub fn clean_reply(raw: &str, bot_name: &str) -> Option<String> {
    let mut text = raw.trim();

    // models like to echo the "name: ..." format used in the context
    let label_len = bot_name.len() + 1;
    if text.len() >= label_len
        && text.is_char_boundary(label_len)
        && text[..label_len].eq_ignore_ascii_case(&format!("{}:", bot_name))
    {
        text = text[label_len..].trim_start();
    }

    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = text[1..text.len() - 1].trim();
    }

    let text = text
        .replace("@everyone", "@\u{200b}everyone")
        .replace("@here", "@\u{200b}here");

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Splits text into chunks of at most `limit` characters, preferring line
/// breaks, then spaces.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while rest.chars().count() > limit {
        let hard_end = rest
            .char_indices()
            .nth(limit)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let window = &rest[..hard_end];
        let cut = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&i| i > 0)
            .unwrap_or(hard_end);

        chunks.push(rest[..cut].trim_end().to_string());
        rest = rest[cut..].trim_start();
    }

    if !rest.is_empty() {
        chunks.push(rest.to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_both_mention_forms() {
        assert_eq!(strip_bot_mentions("<@42> hey", 42), "hey");
        assert_eq!(strip_bot_mentions("yo <@!42>", 42), "yo");
        assert_eq!(strip_bot_mentions("<@43> hey", 42), "<@43> hey");
    }

    #[test]
    fn cleans_echoed_label_and_quotes() {
        assert_eq!(clean_reply("exia: hey", "exia").as_deref(), Some("hey"));
        assert_eq!(clean_reply("EXIA:   hey", "exia").as_deref(), Some("hey"));
        assert_eq!(clean_reply("\"whatever\"", "exia").as_deref(), Some("whatever"));
        assert_eq!(clean_reply("exia:", "exia"), None);
        assert_eq!(clean_reply("   ", "exia"), None);
        assert_eq!(clean_reply("ok", "exia").as_deref(), Some("ok"));
    }

    #[test]
    fn defuses_mass_mentions() {
        let cleaned = clean_reply("hey @everyone", "exia").unwrap();
        assert!(!cleaned.contains("@everyone"));
    }

    #[test]
    fn splits_on_whitespace_under_limit() {
        let text = "aaaa bbbb cccc";
        assert_eq!(split_message(text, 9), vec!["aaaa", "bbbb cccc"]);
        assert_eq!(split_message("line one\nline two", 12), vec!["line one", "line two"]);
        assert_eq!(split_message("short", 2000), vec!["short"]);
        assert!(split_message("   ", 10).is_empty());
    }

    #[test]
    fn hard_splits_long_words_on_char_boundaries() {
        let text = "é".repeat(5);
        let chunks = split_message(&text, 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
    }
}
