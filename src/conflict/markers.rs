//! Recognizable substrings in resolution commits, and conflict-marker checks.

use crate::scm::GitScm;

pub const SMART_MERGE_MARKER: &str = "[ogresync stage1 smart-merge]";
pub const KEEP_LOCAL_MARKER: &str = "[ogresync stage1 keep-local]";
pub const KEEP_REMOTE_MARKER: &str = "[ogresync stage1 keep-remote]";
pub const FILE_RESOLUTION_MARKER: &str = "[ogresync stage2 file-resolution]";

pub const RESOLUTION_MARKERS: &[&str] = &[
    SMART_MERGE_MARKER,
    KEEP_LOCAL_MARKER,
    KEEP_REMOTE_MARKER,
    FILE_RESOLUTION_MARKER,
];

/// Bytes inspected when sniffing for binary content.
const BINARY_SNIFF_LEN: usize = 8 * 1024;

pub fn is_resolution_message(message: &str) -> bool {
    RESOLUTION_MARKERS.iter().any(|m| message.contains(m))
}

/// Whether HEAD was produced by a conflict resolution.
pub fn last_commit_is_resolution(git: &GitScm) -> bool {
    git.last_commit_message()
        .map(|msg| is_resolution_message(&msg))
        .unwrap_or(false)
}

/// Whether text still carries merge conflict markers.
///
/// A bare `=======` line is not enough on its own; it is a valid Markdown
/// heading underline.
pub fn contains_conflict_markers(text: &str) -> bool {
    text.lines().any(|line| {
        let line = line.trim_end();
        line == "<<<<<<<"
            || line == ">>>>>>>"
            || line.starts_with("<<<<<<< ")
            || line.starts_with(">>>>>>> ")
    })
}

/// NUL in the first 8 KiB.
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(BINARY_SNIFF_LEN).any(|b| *b == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::sanitize_commit_message;

    #[test]
    fn test_markers_survive_sanitization() {
        for marker in RESOLUTION_MARKERS {
            let message = sanitize_commit_message(&format!("Resolve conflicts {}", marker));
            assert!(is_resolution_message(&message), "{}", marker);
        }
    }

    #[test]
    fn test_ordinary_messages_are_not_resolutions() {
        assert!(!is_resolution_message("Auto-sync: 2025-06-01 10:00"));
        assert!(!is_resolution_message("stage1 smart merge"));
    }

    #[test]
    fn test_contains_conflict_markers() {
        assert!(contains_conflict_markers(
            "a\n<<<<<<< HEAD\nours\n=======\ntheirs\n>>>>>>> origin/main\n"
        ));
        assert!(contains_conflict_markers("<<<<<<<\n"));
        assert!(!contains_conflict_markers("Title\n=======\n\nbody"));
        assert!(!contains_conflict_markers("quote: <<<<<<< inline"));
    }

    #[test]
    fn test_is_binary() {
        assert!(is_binary(b"PNG\0\x01\x02"));
        assert!(!is_binary("plain notes ✓".as_bytes()));
        let mut late_nul = vec![b'a'; BINARY_SNIFF_LEN];
        late_nul.push(0);
        assert!(!is_binary(&late_nul));
    }
}
