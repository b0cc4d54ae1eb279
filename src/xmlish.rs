//! Minimal tag scanner for the flat, attribute-light XML dialect agents emit
//! (tool-call elements, the `<think>` block, workflow triggers). Deliberately
//! not a general XML parser: every tag this crate cares about is a top-level
//! element with plain-text or single-level child elements, so a couple of
//! regexes cover the grammar without pulling in a DOM.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static THINK_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("valid regex"));

/// Removes the first `<think>...</think>` block and returns its contents
/// alongside the text with the block stripped out. `<think>` blocks are
/// removed before tool-call scanning so tool-shaped XML quoted inside a
/// thought is never mistaken for an actual call.
pub fn extract_think_block(text: &str) -> (Option<String>, String) {
    match THINK_PATTERN.find(text) {
        Some(m) => {
            let thought = THINK_PATTERN
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|g| g.as_str().trim().to_string());
            let mut remaining = String::with_capacity(text.len());
            remaining.push_str(&text[..m.start()]);
            remaining.push_str(&text[m.end()..]);
            (thought, remaining)
        }
        None => (None, text.to_string()),
    }
}

/// One top-level `<tag>...</tag>` occurrence, with byte range in the source
/// text and the unparsed inner content.
#[derive(Debug, Clone)]
pub struct TagMatch {
    pub start: usize,
    pub end: usize,
    pub inner: String,
}

fn tag_regex(tag: &str) -> Option<Regex> {
    let escaped = regex::escape(tag);
    Regex::new(&format!(r"(?s)<{escaped}(?:\s[^>]*)?>(.*?)</{escaped}>")).ok()
}

/// Every top-level occurrence of `<tag>...</tag>` in `text`, in document order.
/// Self-closing forms (`<tag/>`) are not matched here — callers that need
/// self-closing support (only `<request_state/>` does) use their own regex.
pub fn find_all(text: &str, tag: &str) -> Vec<TagMatch> {
    let Some(re) = tag_regex(tag) else { return Vec::new() };
    re.captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let inner = caps.get(1)?.as_str().to_string();
            Some(TagMatch {
                start: whole.start(),
                end: whole.end(),
                inner,
            })
        })
        .collect()
}

pub fn find_first(text: &str, tag: &str) -> Option<TagMatch> {
    find_all(text, tag).into_iter().next()
}

static CHILD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<(\w+)(?:\s[^>]*)?>(.*?)</\1>").expect("valid regex"));

fn unescape_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Ordered `(child_tag, trimmed_text)` pairs one level deep inside `inner`.
/// Repeated child tags (e.g. multiple `<task>` entries) all appear, in order.
pub fn parse_children(inner: &str) -> Vec<(String, String)> {
    CHILD_PATTERN
        .captures_iter(inner)
        .map(|caps| {
            let name = caps[1].to_string();
            let text = unescape_entities(caps[2].trim());
            (name, text)
        })
        .collect()
}

/// [`parse_children`] collapsed into a map, last-write-wins for repeated tags.
/// Used for tool-call arguments where each parameter name is expected once.
pub fn parse_children_map(inner: &str) -> HashMap<String, String> {
    parse_children(inner).into_iter().collect()
}

/// All text values of child elements named `child_tag`, in order. Used for
/// repeated-element children such as `<task_list><task/><task/></task_list>`.
pub fn parse_repeated_children(inner: &str, child_tag: &str) -> Vec<String> {
    parse_children(inner)
        .into_iter()
        .filter(|(name, _)| name == child_tag)
        .map(|(_, text)| text)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_think_block_strips_block_and_returns_contents() {
        let (thought, remaining) = extract_think_block("<think>plan ahead</think>do the thing");
        assert_eq!(thought.as_deref(), Some("plan ahead"));
        assert_eq!(remaining, "do the thing");
    }

    #[test]
    fn missing_think_block_returns_none_and_original_text() {
        let (thought, remaining) = extract_think_block("just text");
        assert_eq!(thought, None);
        assert_eq!(remaining, "just text");
    }

    #[test]
    fn think_block_containing_tool_shaped_xml_is_not_a_tool_call() {
        let (thought, remaining) =
            extract_think_block("<think>maybe call <file_system><action>list</action></file_system></think>");
        assert!(thought.unwrap().contains("<file_system>"));
        assert!(find_all(&remaining, "file_system").is_empty());
    }

    #[test]
    fn find_all_locates_every_top_level_occurrence_in_order() {
        let text = "<tool_one><p1>v1</p1></tool_one>\n<tool_two><p2>v2</p2></tool_two>";
        let matches = find_all(text, "tool_one");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].inner, "<p1>v1</p1>");
    }

    #[test]
    fn parse_children_handles_no_children() {
        assert!(parse_children("").is_empty());
    }

    #[test]
    fn parse_children_preserves_order_and_duplicates() {
        let pairs = parse_children("<task>first</task><task>second</task>");
        assert_eq!(
            pairs,
            vec![("task".to_string(), "first".to_string()), ("task".to_string(), "second".to_string())]
        );
    }

    #[test]
    fn parse_repeated_children_filters_by_name() {
        let tasks = parse_repeated_children(
            "<title>ignored</title><task>a</task><task>b</task>",
            "task",
        );
        assert_eq!(tasks, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn unescape_entities_handles_basic_set() {
        let pairs = parse_children("<a>1 &lt; 2 &amp; 3 &gt; 0</a>");
        assert_eq!(pairs[0].1, "1 < 2 & 3 > 0");
    }
}
