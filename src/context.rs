//! Context management utilities for manual history inspection.
//!
//! These are opt-in helpers the Prompt Assembler and callers outside the
//! cycle pipeline can use to reason about a history's size before a call —
//! nothing here runs automatically.

use crate::agent::{Message, MessageRole};

/// Estimate token count for a message list.
///
/// Character-based approximation (1 token ≈ 4 characters). This is a
/// conservative estimate that works across model families; always include a
/// 10-20% safety margin when checking limits.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    if messages.is_empty() {
        return 0;
    }

    let mut total_chars = 0;

    for message in messages {
        total_chars += 8; // role formatting overhead
        total_chars += message.content.len();
        for call in &message.tool_calls {
            total_chars += call.name.len();
            total_chars += call.call_id.len();
            total_chars += serde_json::to_string(&call.arguments).map(|s| s.len()).unwrap_or(0);
        }
        if let Some(id) = &message.tool_call_id {
            total_chars += id.len();
        }
    }

    total_chars += 16; // conversation-level overhead
    (total_chars + 3) / 4
}

/// Truncate message history, keeping recent messages.
///
/// Always preserves the system prompt (if present and `preserve_system`) and
/// keeps the most recent `keep` messages. Simple truncation — it does not
/// attempt to preserve tool-call/tool-result pairing.
pub fn truncate_messages(messages: &[Message], keep: usize, preserve_system: bool) -> Vec<Message> {
    if messages.is_empty() {
        return Vec::new();
    }

    if messages.len() <= keep {
        return messages.to_vec();
    }

    let has_system = preserve_system && messages[0].role == MessageRole::System;

    if has_system {
        let mut result = vec![messages[0].clone()];
        if keep > 0 && messages.len() > 1 {
            let start = messages.len().saturating_sub(keep);
            result.extend_from_slice(&messages[start.max(1)..]);
        }
        result
    } else if keep > 0 {
        let start = messages.len().saturating_sub(keep);
        messages[start..].to_vec()
    } else {
        Vec::new()
    }
}

/// Convenience check combining estimation with a threshold.
///
/// `true` if estimated tokens exceed `limit * margin`.
pub fn is_approaching_limit(messages: &[Message], limit: usize, margin: f32) -> bool {
    let estimated = estimate_tokens(messages);
    let threshold = (limit as f32 * margin) as usize;
    estimated > threshold
}
