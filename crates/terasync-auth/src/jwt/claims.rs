//! JWT claims structure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use terasync_core::types::Uid;

/// JWT claims payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user's UID, or the calling shard's name for service tokens.
    pub sub: String,
    /// Display alias; a non-empty alias grants the priority download lane.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Issuer.
    pub iss: String,
    /// Issued-at timestamp (seconds since epoch).
    pub iat: i64,
    /// Expiration timestamp (seconds since epoch).
    pub exp: i64,
    /// Who the token is for.
    pub token_type: TokenType,
}

/// Distinguishes client tokens from service-to-service tokens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// A connected client.
    User,
    /// Another TeraSync process.
    Service,
}

impl Claims {
    /// The subject as a UID.
    pub fn uid(&self) -> Result<Uid, terasync_core::AppError> {
        Uid::parse(self.sub.as_str())
    }

    /// Whether the caller is served from the priority lane.
    pub fn has_priority(&self) -> bool {
        self.alias.as_deref().is_some_and(|a| !a.trim().is_empty())
    }

    /// Returns the expiration as a `DateTime<Utc>`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(alias: Option<&str>) -> Claims {
        Claims {
            sub: "U1".to_string(),
            alias: alias.map(str::to_string),
            iss: "terasync".to_string(),
            iat: 0,
            exp: 10,
            token_type: TokenType::User,
        }
    }

    #[test]
    fn test_priority_follows_alias() {
        assert!(claims(Some("Vanity")).has_priority());
        assert!(!claims(Some("  ")).has_priority());
        assert!(!claims(None).has_priority());
    }
}
