//! Sub-step C of the Cycle Handler: turns one raw assistant response into a
//! structured set of signals (a `<think>` aside, a `<request_state>` request,
//! zero or more tool calls, and whatever narrative text is left over).
//!
//! Tool calls are recognized by scanning for every registered tool's own
//! name as a top-level tag — there is no generic `<tool_call>` wrapper.
//! Every match, for every registered tool, is collected and returned in
//! document order: a response naming two (or the same) tool twice emits two
//! calls, all collected into a single `tool_requests{calls:[...]}` batch.

use std::collections::HashMap;

use serde_json::Value;

use crate::agent::ToolCall;
use crate::constants::REQUEST_STATE_TAG_PATTERN;
use crate::xmlish;

#[derive(Debug, Clone, Default)]
pub struct ParsedOutput {
    pub thought: Option<String>,
    pub request_state: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub final_text: String,
}

/// Parses `raw` against the currently registered `tool_names`. `raw` should
/// be the full, unmodified assistant response — workflow trigger scanning
/// (C6) runs separately against the same original text, so this function
/// never sees it and never needs to avoid colliding with it.
pub fn parse(raw: &str, tool_names: &[String]) -> ParsedOutput {
    let (thought, mut remaining) = xmlish::extract_think_block(raw);

    let mut request_state = None;
    if let Some(whole) = REQUEST_STATE_TAG_PATTERN.find(&remaining) {
        let (start, end) = (whole.start(), whole.end());
        request_state = REQUEST_STATE_TAG_PATTERN
            .captures(&remaining)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        remaining.replace_range(start..end, "");
    }

    // Collect every top-level occurrence of every registered tool name, then
    // sort by position so calls come out in the order they appeared.
    let mut found: Vec<(usize, usize, String, String)> = Vec::new();
    for name in tool_names {
        for m in xmlish::find_all(&remaining, name) {
            found.push((m.start, m.end, name.clone(), m.inner));
        }
    }
    found.sort_by_key(|(start, ..)| *start);

    let mut tool_calls = Vec::with_capacity(found.len());
    // Remove matched spans back-to-front so earlier offsets stay valid while
    // later ones are deleted out of `remaining`.
    for (index, (start, end, name, inner)) in found.into_iter().enumerate() {
        let arguments: HashMap<String, Value> = xmlish::parse_children_map(&inner)
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        let call_id = format!("call_{name}_{index}");
        tool_calls.push((start, end, ToolCall { call_id, name, arguments }));
    }
    tool_calls.sort_by(|a, b| b.0.cmp(&a.0));
    for (start, end, _) in &tool_calls {
        remaining.replace_range(*start..*end, "");
    }
    tool_calls.sort_by_key(|(start, ..)| *start);
    let tool_calls = tool_calls.into_iter().map(|(_, _, call)| call).collect();

    ParsedOutput {
        thought,
        request_state,
        tool_calls,
        final_text: remaining.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_response_has_no_signals() {
        let parsed = parse("Sure, here's an update.", &["write".to_string()]);
        assert!(parsed.thought.is_none());
        assert!(parsed.request_state.is_none());
        assert!(parsed.tool_calls.is_empty());
        assert_eq!(parsed.final_text, "Sure, here's an update.");
    }

    #[test]
    fn think_block_is_extracted_and_stripped() {
        let parsed = parse("<think>let me plan</think>Done.", &[]);
        assert_eq!(parsed.thought.as_deref(), Some("let me plan"));
        assert_eq!(parsed.final_text, "Done.");
    }

    #[test]
    fn request_state_tag_is_extracted_and_stripped() {
        let parsed = parse("Moving on.<request_state state='admin_conversation'/>", &[]);
        assert_eq!(parsed.request_state.as_deref(), Some("admin_conversation"));
        assert_eq!(parsed.final_text, "Moving on.");
    }

    #[test]
    fn single_tool_call_matches_registered_name_and_extracts_arguments() {
        let tool_names = vec!["write".to_string(), "manage_team".to_string()];
        let raw = "<write><path>notes.md</path><content>hi</content></write>";
        let parsed = parse(raw, &tool_names);
        assert_eq!(parsed.tool_calls.len(), 1);
        let call = &parsed.tool_calls[0];
        assert_eq!(call.name, "write");
        assert_eq!(call.arguments.get("path").unwrap(), "notes.md");
        assert_eq!(call.arguments.get("content").unwrap(), "hi");
        assert_eq!(parsed.final_text, "");
    }

    #[test]
    fn multiple_distinct_tool_calls_are_all_returned_in_document_order() {
        let tool_names = vec!["tool_one".to_string(), "tool_two".to_string()];
        let raw = "<tool_one><p1>v1</p1></tool_one>\n<tool_two><p2>v2</p2></tool_two>";
        let parsed = parse(raw, &tool_names);
        assert_eq!(parsed.tool_calls.len(), 2);
        assert_eq!(parsed.tool_calls[0].name, "tool_one");
        assert_eq!(parsed.tool_calls[1].name, "tool_two");
        assert_ne!(parsed.tool_calls[0].call_id, parsed.tool_calls[1].call_id);
    }

    #[test]
    fn three_tool_calls_with_mixed_tools_preserve_order() {
        let tool_names = vec!["tool_success".to_string(), "tool_fail".to_string()];
        let raw = "<tool_success><a>1</a></tool_success><tool_fail><a>2</a></tool_fail><tool_success><a>3</a></tool_success>";
        let parsed = parse(raw, &tool_names);
        assert_eq!(parsed.tool_calls.len(), 3);
        assert_eq!(parsed.tool_calls[0].name, "tool_success");
        assert_eq!(parsed.tool_calls[1].name, "tool_fail");
        assert_eq!(parsed.tool_calls[2].name, "tool_success");
    }

    #[test]
    fn earliest_tool_tag_in_document_order_comes_first() {
        let tool_names = vec!["write".to_string(), "read".to_string()];
        let raw = "noise <read><path>a</path></read> then <write><path>b</path></write>";
        let parsed = parse(raw, &tool_names);
        assert_eq!(parsed.tool_calls.len(), 2);
        assert_eq!(parsed.tool_calls[0].name, "read");
        assert_eq!(parsed.tool_calls[1].name, "write");
    }

    #[test]
    fn tool_shaped_xml_inside_think_block_is_not_parsed_as_a_call() {
        let tool_names = vec!["write".to_string()];
        let raw = "<think>maybe <write><path>x</path></write></think>actually no.";
        let parsed = parse(raw, &tool_names);
        assert!(parsed.tool_calls.is_empty());
        assert_eq!(parsed.final_text, "actually no.");
    }

    #[test]
    fn no_child_elements_yields_empty_arguments() {
        let tool_names = vec!["ping".to_string()];
        let parsed = parse("<ping></ping>", &tool_names);
        assert_eq!(parsed.tool_calls.len(), 1);
        assert!(parsed.tool_calls[0].arguments.is_empty());
    }
}
