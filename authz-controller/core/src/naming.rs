/// Maximum length of an object name (a DNS-1123 subdomain).
const MAX_NAME_LEN: usize = 253;

/// Names the binding object that grants `role` to a subject on behalf of one binding.
///
/// The binding's UID qualifies the name so that two bindings granting the same role to the same
/// subject own distinct objects, and each can be cleaned up without disturbing the other.
pub fn binding_name(role: &str, subject: &str, owner_uid: &str) -> String {
    let suffix = format!("-{}", sanitize(owner_uid));
    let mut prefix = sanitize(&format!("{role}-{subject}"));
    // The UID suffix must survive truncation intact.
    prefix.truncate(MAX_NAME_LEN.saturating_sub(suffix.len()));
    let name = format!("{}{suffix}", prefix.trim_end_matches(is_separator));
    name.trim_matches(is_separator).to_string()
}

/// Lowercases and replaces every character that is not allowed in an object name with `-`.
fn sanitize(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| match c {
            'a'..='z' | '0'..='9' | '-' | '.' => c,
            _ => '-',
        })
        .collect()
}

fn is_separator(c: char) -> bool {
    c == '-' || c == '.'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn includes_role_subject_and_uid() {
        assert_eq!(
            binding_name("readonly", "user1", "0B5A-77"),
            "readonly-user1-0b5a-77"
        );
    }

    #[test]
    fn replaces_invalid_characters() {
        assert_eq!(
            binding_name("view", "system:authenticated", "uid"),
            "view-system-authenticated-uid"
        );
        assert_eq!(
            binding_name("edit", "Jane Doe@example.com", "u"),
            "edit-jane-doe-example.com-u"
        );
    }

    #[test]
    fn distinct_owners_get_distinct_names() {
        assert_ne!(
            binding_name("view", "user1", "uid-a"),
            binding_name("view", "user1", "uid-b"),
        );
    }

    #[test]
    fn truncation_keeps_the_uid() {
        let role = "r".repeat(300);
        let a = binding_name(&role, "user1", "0b5a-77");
        let b = binding_name(&role, "user1", "0b5a-78");
        assert_eq!(a.len(), MAX_NAME_LEN);
        assert!(a.ends_with("-0b5a-77"), "{a}");
        assert_ne!(a, b);
    }

    #[test]
    fn truncation_drops_trailing_separators() {
        let role = format!("{}-", "r".repeat(MAX_NAME_LEN - "-uid".len() - 1));
        let name = binding_name(&role, "user1", "uid");
        assert_eq!(name, format!("{}-uid", "r".repeat(MAX_NAME_LEN - "-uid".len() - 1)));
    }
}
