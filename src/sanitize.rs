//! Cleaning of free text before it is handed to git as an argument.

/// Longest commit message passed to git, in characters.
pub const MAX_MESSAGE_CHARS: usize = 2000;

/// Used when sanitization leaves nothing behind.
pub const FALLBACK_COMMIT_MESSAGE: &str = "Auto-generated commit";

const SHELL_METACHARACTERS: &[char] = &['`', '$', '(', ')', ';', '&', '|', '<', '>'];

fn is_stripped_control(c: char) -> bool {
    // Tab, newline and carriage return survive.
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' | '\u{7F}')
}

fn clean(text: &str, limit: usize) -> String {
    let filtered: String = text
        .chars()
        .filter(|c| !is_stripped_control(*c) && !SHELL_METACHARACTERS.contains(c))
        .take(limit)
        .collect();
    filtered.trim().to_string()
}

/// Strip control characters and shell metacharacters from a commit message and
/// cap its length. Never returns an empty string.
pub fn sanitize_commit_message(message: &str) -> String {
    let cleaned = clean(message, MAX_MESSAGE_CHARS);
    if cleaned.is_empty() {
        FALLBACK_COMMIT_MESSAGE.to_string()
    } else {
        cleaned
    }
}

/// Single-line variant for backup descriptions and log text.
pub fn sanitize_description(description: &str) -> String {
    let single_line = description.replace(['\n', '\r', '\t'], " ");
    clean(&single_line, 200)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_metacharacters() {
        assert_eq!(
            sanitize_commit_message("notes; rm -rf / $(whoami) `id` a|b > c"),
            "notes rm -rf / whoami id ab  c"
        );
    }

    #[test]
    fn test_strips_control_characters_but_keeps_newlines() {
        let msg = "line one\u{07}\u{1B}[31m\nline two\u{7F}";
        assert_eq!(sanitize_commit_message(msg), "line one[31m\nline two");
    }

    #[test]
    fn test_caps_length() {
        let long = "a".repeat(5000);
        assert_eq!(sanitize_commit_message(&long).chars().count(), MAX_MESSAGE_CHARS);
    }

    #[test]
    fn test_empty_falls_back() {
        assert_eq!(sanitize_commit_message("  ;;; $$ "), FALLBACK_COMMIT_MESSAGE);
        assert_eq!(sanitize_commit_message(""), FALLBACK_COMMIT_MESSAGE);
    }

    #[test]
    fn test_description_is_single_line() {
        assert_eq!(
            sanitize_description("Keep Remote Only\nstrategy & more"),
            "Keep Remote Only strategy  more"
        );
    }

    #[test]
    fn test_fixed_commit_messages_survive_unchanged() {
        use crate::conflict::RESOLUTION_MARKERS;
        use crate::sync::INITIAL_COMMIT_MESSAGE;

        assert_eq!(sanitize_commit_message(INITIAL_COMMIT_MESSAGE), INITIAL_COMMIT_MESSAGE);
        for marker in RESOLUTION_MARKERS {
            let message = format!("Resolve 2 conflicted files {}", marker);
            assert_eq!(sanitize_commit_message(&message), message);
        }
    }

    #[test]
    fn test_unicode_is_preserved() {
        assert_eq!(sanitize_commit_message("Notizen über Café"), "Notizen über Café");
    }
}
