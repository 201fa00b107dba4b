//! Room-name and display-name sanitization.
//!
//! The video provider only accepts room identifiers made of lowercase
//! letters, digits, and hyphens. Both room creation and meeting-token
//! issuance run the same rule, so a raw name always resolves to the same
//! provider-side room.

/// Maximum length for sanitized room names and display names.
pub const MAX_NAME_LEN: usize = 50;

/// Sanitizes a raw room name to a provider-legal identifier.
///
/// Lowercases the input, replaces every character outside `[a-z0-9-]`
/// with `-`, and truncates to [`MAX_NAME_LEN`] characters. Deterministic
/// and idempotent: sanitizing an already-sanitized name is a no-op.
#[must_use]
pub fn room_name(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .take(MAX_NAME_LEN)
        .collect()
}

/// Resolves a participant display name, defaulting by the owner flag.
///
/// Missing or empty names default to `"Owner"` or `"Walker"`. The result
/// is truncated to [`MAX_NAME_LEN`] characters.
#[must_use]
pub fn display_name(raw: Option<&str>, is_owner: bool) -> String {
    let name = match raw {
        Some(n) if !n.is_empty() => n,
        _ if is_owner => "Owner",
        _ => "Walker",
    };
    name.chars().take(MAX_NAME_LEN).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_replaces_disallowed() {
        assert_eq!(room_name("Walk #1!"), "walk--1-");
    }

    #[test]
    fn already_sanitized_is_unchanged() {
        assert_eq!(room_name("walk--1-"), "walk--1-");
        assert_eq!(room_name("morning-walk-42"), "morning-walk-42");
    }

    #[test]
    fn idempotent() {
        let once = room_name("Späzier Gang @ Noon");
        let twice = room_name(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn output_alphabet_is_bounded() {
        let out = room_name("Ünicode & Emoji 🐕 Name");
        assert!(
            out.chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'),
            "unexpected characters in {out:?}"
        );
    }

    #[test]
    fn truncates_to_max_len() {
        let long = "a".repeat(80);
        assert_eq!(room_name(&long).len(), MAX_NAME_LEN);
    }

    #[test]
    fn display_name_defaults_by_owner_flag() {
        assert_eq!(display_name(None, true), "Owner");
        assert_eq!(display_name(None, false), "Walker");
        assert_eq!(display_name(Some(""), true), "Owner");
    }

    #[test]
    fn display_name_passes_through_and_truncates() {
        assert_eq!(display_name(Some("Alice"), false), "Alice");
        let long = "x".repeat(80);
        assert_eq!(
            display_name(Some(long.as_str()), false).chars().count(),
            MAX_NAME_LEN
        );
    }
}
