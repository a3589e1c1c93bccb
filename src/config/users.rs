//! Pro member configuration loaded from environment variables.
//!
//! Subscription state is owned by the payment provider; the maintenance job only
//! needs the list of members entitled to the monthly token grant, which operators
//! export as `PRO_USER_IDS` in the `.env` file.

/// Environment variable holding comma-separated Pro user IDs
pub const PRO_USER_IDS_ENV: &str = "PRO_USER_IDS";

/// Splits a comma-separated list of user IDs, dropping blanks and duplicates.
#[must_use]
pub fn parse_user_ids(raw: &str) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for id in raw.split(',').map(str::trim).filter(|id| !id.is_empty()) {
        if !ids.iter().any(|existing| existing == id) {
            ids.push(id.to_string());
        }
    }
    ids
}

/// Gets the Pro user IDs configured in the environment.
///
/// Returns an empty list when `PRO_USER_IDS` is unset.
#[must_use]
pub fn get_pro_user_ids() -> Vec<String> {
    std::env::var(PRO_USER_IDS_ENV)
        .map(|raw| parse_user_ids(&raw))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_ids() {
        let ids = parse_user_ids(" alice, bob,,alice , carol ");
        assert_eq!(ids, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_parse_user_ids_empty() {
        assert!(parse_user_ids("").is_empty());
        assert!(parse_user_ids(" , ,").is_empty());
    }
}
