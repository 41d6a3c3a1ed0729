/// Checks whether `granted` authorizes `required`, honoring the wildcard forms:
/// `*` grants everything, `wallet:*` grants any `wallet:`-prefixed permission,
/// and an exact match always grants itself.
pub fn permission_matches(granted: &str, required: &str) -> bool {
    if granted == "*" || granted == required {
        return true;
    }
    if let Some(prefix) = granted.strip_suffix(":*") {
        return required
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with(':'))
            .unwrap_or(false);
    }
    false
}

pub fn any_permission_matches<'a>(granted: impl IntoIterator<Item = &'a String>, required: &str) -> bool {
    granted.into_iter().any(|g| permission_matches(g, required))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_grants_everything() {
        assert!(permission_matches("*", "wallet:deposit"));
    }

    #[test]
    fn namespaced_wildcard_grants_namespace_only() {
        assert!(permission_matches("wallet:*", "wallet:deposit"));
        assert!(!permission_matches("wallet:*", "report:export"));
    }

    #[test]
    fn exact_match_grants_itself() {
        assert!(permission_matches("wallet:deposit", "wallet:deposit"));
        assert!(!permission_matches("wallet:deposit", "wallet:withdraw"));
    }

    #[test]
    fn namespaced_wildcard_does_not_match_unrelated_prefix() {
        // "wallet" (no colon) must not satisfy "walletx:anything"
        assert!(!permission_matches("wallet:*", "walletx:anything"));
    }
}
