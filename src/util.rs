//! Small helpers shared by the HTTP clients.

const MAX_ERROR_CHARS: usize = 200;

/// Redact bearer tokens and bot tokens that may be echoed in error bodies.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 2] = ["ya29.", "Bearer "];

    let mut scrubbed = input.to_string();
    for prefix in PREFIXES {
        let mut search_from = 0;
        while let Some(rel) = scrubbed[search_from..].find(prefix) {
            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);
            if end == content_start {
                search_from = content_start;
                continue;
            }
            scrubbed.replace_range(content_start..end, "[REDACTED]");
            search_from = content_start + "[REDACTED]".len();
        }
    }

    // Telegram bot tokens look like `123456789:AA...` inside URLs.
    if let Some(idx) = scrubbed.find("/bot") {
        let start = idx + "/bot".len();
        let end = scrubbed[start..]
            .find('/')
            .map_or(scrubbed.len(), |rel| start + rel);
        if end > start && scrubbed[start..end].contains(':') {
            scrubbed.replace_range(start..end, "[REDACTED]");
        }
    }

    scrubbed
}

fn token_end(input: &str, from: usize) -> usize {
    input[from..]
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~' | '+' | '/')))
        .map_or(input.len(), |(i, _)| from + i)
}

/// Scrub secrets and cap length for logging or user-facing diagnostics.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);
    truncate_with_ellipsis(&scrubbed, MAX_ERROR_CHARS)
}

/// Cut `input` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_with_ellipsis(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &input[..idx]),
        None => input.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrubs_google_access_token() {
        let out = scrub_secret_patterns("token ya29.a0AfH6SMC-xyz rejected");
        assert_eq!(out, "token ya29.[REDACTED] rejected");
    }

    #[test]
    fn scrubs_bot_token_in_url() {
        let out = scrub_secret_patterns("error sending https://api.telegram.org/bot123:ABC-def/sendMessage");
        assert!(out.contains("/bot[REDACTED]/sendMessage"));
        assert!(!out.contains("ABC-def"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_with_ellipsis("héllo", 2), "hé...");
        assert_eq!(truncate_with_ellipsis("hi", 5), "hi");
    }

    #[test]
    fn sanitize_caps_length() {
        let long = "x".repeat(500);
        assert_eq!(sanitize_api_error(&long).chars().count(), MAX_ERROR_CHARS + 3);
    }
}
