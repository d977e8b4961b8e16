//! Small text helpers shared by the extraction client and logging.

/// Truncate a string to at most `max_chars` characters.
#[must_use]
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    s.char_indices().nth(max_chars).map_or(s, |(idx, _)| &s[..idx])
}

/// Strip markdown code fences some models wrap JSON answers in.
#[must_use]
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Short single-line preview of message content for log fields
#[must_use]
pub fn preview(content: &str) -> String {
    let head = truncate_chars(content, 60);
    let mut out: String = head.chars().map(|c| if c.is_control() { ' ' } else { c }).collect();
    if head.len() < content.len() {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("Hello 世界", 7), "Hello 世");
        assert_eq!(truncate_chars("Hello", 100), "Hello");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("{}"), "{}");
    }

    #[test]
    fn test_preview_flattens_newlines() {
        assert_eq!(preview("a\nb"), "a b");
        assert!(preview(&"x".repeat(100)).ends_with('…'));
    }
}
