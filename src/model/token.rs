use super::item::email_domain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A linked external account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountToken {
    pub token_id: String,
    pub user_id: String,
    /// Service the account belongs to (e.g. "google", "jira")
    pub service: String,
    pub account_id: String,
    /// Set when a fetch failed on expired or revoked credentials
    #[serde(default)]
    pub is_bad_token: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad_since: Option<DateTime<Utc>>,
}

impl AccountToken {
    pub fn new(
        user_id: impl Into<String>,
        service: impl Into<String>,
        account_id: impl Into<String>,
    ) -> Self {
        let service = service.into();
        let account_id = account_id.into();
        Self {
            token_id: Self::token_id_for(&service, &account_id),
            user_id: user_id.into(),
            service,
            account_id,
            is_bad_token: false,
            bad_since: None,
        }
    }

    pub fn token_id_for(service: &str, account_id: &str) -> String {
        format!("{}:{}", service, account_id)
    }

    /// Mail domain of the account, used by the self-domain heuristic
    pub fn domain(&self) -> Option<String> {
        email_domain(&self.account_id)
    }
}

/// One (account, source) pair fetched in a refresh cycle
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub account_id: String,
    pub source_id: String,
}

impl SourceKey {
    pub fn new(account_id: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            source_id: source_id.into(),
        }
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.source_id, self.account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_identity() {
        let token = AccountToken::new("u1", "google", "me@corp.com");
        assert_eq!(token.token_id, "google:me@corp.com");
        assert_eq!(token.domain(), Some("corp.com".to_string()));
        assert!(!token.is_bad_token);
    }

    #[test]
    fn test_source_key_display() {
        let key = SourceKey::new("me@corp.com", "gmail");
        assert_eq!(key.to_string(), "gmail (me@corp.com)");
    }
}
