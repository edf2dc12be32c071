//! Conversation context for the model.
//!
//! Turns cached channel messages into chat-completion messages, oldest first.
//! The bot's own lines become assistant messages, everyone else's become user
//! messages prefixed with the author's name.

use async_openai::error::OpenAIError;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
};

use crate::cache::CachedMessage;

/// Limits applied to the history before it is sent.
#[derive(Debug, Clone, Copy)]
pub struct ContextBudget {
    pub max_messages: usize,
    pub max_chars: usize,
}

pub struct ConversationContext;

impl ConversationContext {
    /// Builds: persona, situational note, trimmed history, then the line the
    /// model should answer.
    pub fn build(
        system_prompt: &str,
        note: &str,
        bot_name: &str,
        history: &[CachedMessage],
        current: (&str, &str),
        budget: ContextBudget,
    ) -> Result<Vec<ChatCompletionRequestMessage>, OpenAIError> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system_prompt)
                .build()?
                .into(),
        ];
        if !note.is_empty() {
            messages.push(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(note)
                    .build()?
                    .into(),
            );
        }

        for msg in Self::trim(history, budget) {
            if let Some(formatted) = Self::format_message(msg, bot_name)? {
                messages.push(formatted);
            }
        }

        let (author, content) = current;
        messages.push(
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!("{}: {}", author, content))
                .build()?
                .into(),
        );
        Ok(messages)
    }

    /// Newest `max_messages`, then drops the oldest until under `max_chars`.
    pub fn trim(history: &[CachedMessage], budget: ContextBudget) -> &[CachedMessage] {
        let start = history.len().saturating_sub(budget.max_messages);
        let mut window = &history[start..];
        let mut total: usize = window.iter().map(|m| m.content.chars().count()).sum();
        while total > budget.max_chars && !window.is_empty() {
            total -= window[0].content.chars().count();
            window = &window[1..];
        }
        window
    }

    fn format_message(
        msg: &CachedMessage,
        bot_name: &str,
    ) -> Result<Option<ChatCompletionRequestMessage>, OpenAIError> {
        if msg.content.trim().is_empty() {
            return Ok(None);
        }

        let formatted = if msg.from_bot {
            ChatCompletionRequestAssistantMessageArgs::default()
                .content(format!("{}: {}", bot_name, msg.content))
                .build()?
                .into()
        } else {
            ChatCompletionRequestUserMessageArgs::default()
                .content(format!("{}: {}", msg.author_name, msg.content))
                .build()?
                .into()
        };
        Ok(Some(formatted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mock_message(id: u64, author: &str, content: &str, from_bot: bool) -> CachedMessage {
        CachedMessage {
            message_id: id,
            author_name: author.to_string(),
            content: content.to_string(),
            from_bot,
            at: Utc::now(),
        }
    }

    fn budget(max_messages: usize, max_chars: usize) -> ContextBudget {
        ContextBudget {
            max_messages,
            max_chars,
        }
    }

    #[test]
    fn test_context_layout() {
        let history = vec![
            mock_message(1, "Alice", "Hello everyone", false),
            mock_message(2, "Bob", "Hi Alice!", false),
            mock_message(3, "exia", "sup", true),
            mock_message(4, "Bob", "   ", false),
        ];
        let messages = ConversationContext::build(
            "persona",
            "note",
            "exia",
            &history,
            ("Alice", "what's the weather?"),
            budget(30, 10_000),
        )
        .unwrap();

        // persona, note, three non-empty history lines, current
        assert_eq!(messages.len(), 6);
        assert!(matches!(messages[0], ChatCompletionRequestMessage::System(_)));
        assert!(matches!(messages[4], ChatCompletionRequestMessage::Assistant(_)));
        let last = serde_json::to_value(&messages[5]).unwrap();
        assert_eq!(last["content"], "Alice: what's the weather?");
        let bot = serde_json::to_value(&messages[4]).unwrap();
        assert_eq!(bot["content"], "exia: sup");
    }

    #[test]
    fn test_message_limit_keeps_newest() {
        let history: Vec<CachedMessage> = (1..=10)
            .map(|i| mock_message(i, "User", &format!("Message {}", i), false))
            .collect();
        let trimmed = ConversationContext::trim(&history, budget(5, 10_000));
        assert_eq!(trimmed.len(), 5);
        assert_eq!(trimmed[0].message_id, 6);
    }

    #[test]
    fn test_char_budget_drops_oldest() {
        let history = vec![
            mock_message(1, "A", &"x".repeat(50), false),
            mock_message(2, "B", &"y".repeat(30), false),
            mock_message(3, "C", &"z".repeat(30), false),
        ];
        let trimmed = ConversationContext::trim(&history, budget(30, 60));
        let ids: Vec<u64> = trimmed.iter().map(|m| m.message_id).collect();
        assert_eq!(ids, vec![2, 3]);

        let trimmed = ConversationContext::trim(&history, budget(30, 10));
        assert!(trimmed.is_empty());
    }

    #[test]
    fn test_empty_note_is_skipped() {
        let messages =
            ConversationContext::build("persona", "", "exia", &[], ("Bob", "hi"), budget(30, 100))
                .unwrap();
        assert_eq!(messages.len(), 2);
    }
}
