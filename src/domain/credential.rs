use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Credentials closer than this to expiry are refreshed before use.
pub const EXPIRY_SAFETY_WINDOW_SECS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Inoreader,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access: String,
    pub expiration: DateTime<Utc>,
    pub refresh: String,
    pub account_id: String,
    pub account_type: AccountType,
}

impl Credential {
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        self.expiration - now < Duration::seconds(EXPIRY_SAFETY_WINDOW_SECS)
    }
}
