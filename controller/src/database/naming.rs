use sha2::{Digest, Sha256};

const MAX_DATABASE_NAME: usize = 64;
const MAX_USER_NAME: usize = 32;

/// Replaces characters outside `[A-Za-z0-9_]` with `_`, collapses runs of
/// `_` and trims them from both ends.
pub fn sanitize(name: &str) -> String {
    let mut sanitized = String::with_capacity(name.len());
    for c in name.chars() {
        let c = if c.is_ascii_alphanumeric() { c } else { '_' };
        if c == '_' && sanitized.ends_with('_') {
            continue;
        }
        sanitized.push(c);
    }
    sanitized.trim_matches('_').to_string()
}

/// `_<hash>_<site name>`, where the hash pins the name to the site object.
pub fn database_name(namespace: &str, name: &str, site_name: &str) -> String {
    let digest = hex::encode(Sha256::digest(format!("{namespace}/{name}")));
    let mut database = format!("_{}_{}", &digest[..8], sanitize(site_name));
    database.truncate(MAX_DATABASE_NAME);
    database
}

pub fn database_user(name: &str) -> String {
    let mut user = format!("{}_user", sanitize(name));
    user.truncate(MAX_USER_NAME);
    user
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("acct.example.com"), "acct_example_com");
        assert_eq!(sanitize("--a..b__c--"), "a_b_c");
        assert_eq!(sanitize("plain_name"), "plain_name");
        assert_eq!(sanitize("..."), "");
    }

    #[test]
    fn test_database_name_is_deterministic() {
        let first = database_name("tenants", "acct", "acct.example.com");
        assert_eq!(first, database_name("tenants", "acct", "acct.example.com"));
        assert_ne!(first, database_name("other", "acct", "acct.example.com"));
        assert!(first.starts_with('_'));
        assert!(first.ends_with("_acct_example_com"));
        assert_eq!(first.len(), 1 + 8 + 1 + "acct_example_com".len());
    }

    #[test]
    fn test_database_name_bounds() {
        let long = format!("{}.example.com", "a-".repeat(60));
        let name = database_name("tenants", "acct", &long);
        assert_eq!(name.len(), MAX_DATABASE_NAME);
        assert!(name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_'));
        assert!(!name.contains("__"));
    }

    #[test]
    fn test_database_user() {
        assert_eq!(database_user("acct"), "acct_user");
        let user = database_user(&"x".repeat(40));
        assert_eq!(user.len(), MAX_USER_NAME);
        assert!(user.starts_with("xxx"));
    }
}
