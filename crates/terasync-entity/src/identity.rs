//! Identity models.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use terasync_core::types::Uid;

/// Public view of an identity: the UID plus an optional vanity alias.
///
/// Equality and hashing consider the UID only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    /// Stable identifier.
    pub uid: Uid,
    /// Display alias, if the user has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl UserData {
    /// Build an identity.
    pub fn new(uid: Uid, alias: Option<String>) -> Self {
        let alias = alias.filter(|a| !a.trim().is_empty());
        Self { uid, alias }
    }

    /// The alias when set, otherwise the UID.
    pub fn alias_or_uid(&self) -> &str {
        self.alias.as_deref().unwrap_or(self.uid.as_str())
    }
}

impl PartialEq for UserData {
    fn eq(&self, other: &Self) -> bool {
        self.uid == other.uid
    }
}

impl Eq for UserData {}

impl Hash for UserData {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uid.hash(state);
    }
}

/// A registered user as stored by the account service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable identifier.
    pub uid: Uid,
    /// Display alias.
    pub alias: Option<String>,
    /// Last successful connection.
    pub last_logged_in: DateTime<Utc>,
}

impl User {
    /// Public view of this user.
    pub fn data(&self) -> UserData {
        UserData::new(self.uid.clone(), self.alias.clone())
    }
}
