//! Helpers for coping with model output that wraps JSON in markdown fences.

/// Strip surrounding ```json ... ``` (or bare ``` ... ```) markup, returning
/// the inner payload trimmed. Text without fences passes through unchanged.
pub fn strip_code_fences(response: &str) -> &str {
    if let Some(start) = response.find("```json") {
        let inner = &response[start + "```json".len()..];
        if let Some(end) = inner.find("```") {
            return inner[..end].trim();
        }
        return inner.trim();
    }
    if let Some(start) = response.find("```") {
        let inner = &response[start + 3..];
        if let Some(end) = inner.find("```") {
            return inner[..end].trim();
        }
        return inner.trim();
    }
    response.trim()
}

/// Truncate to at most `max` characters without splitting a UTF-8 boundary.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_plain_json_through() {
        let raw = r#"{"action": "tap"}"#;
        assert_eq!(strip_code_fences(raw), raw);
    }

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"action\": \"tap\"}\n```";
        assert_eq!(strip_code_fences(raw), r#"{"action": "tap"}"#);
    }

    #[test]
    fn strips_bare_fence() {
        let raw = "Here you go:\n```\n{\"complete\": true}\n```\nDone.";
        assert_eq!(strip_code_fences(raw), r#"{"complete": true}"#);
    }

    #[test]
    fn tolerates_missing_closing_fence() {
        let raw = "```json\n{\"action\": \"wait\"}";
        assert_eq!(strip_code_fences(raw), r#"{"action": "wait"}"#);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 5), "héllo");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
