use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    /// Contact address stored as a URL, usually `mailto:`.
    pub email: Option<String>,
}

impl Author {
    pub fn new(name: impl Into<String>, email: Option<String>) -> Self {
        Self {
            name: name.into(),
            email,
        }
    }
}

impl fmt::Display for Author {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.email.as_deref() {
            Some(email) if !email.is_empty() => {
                let address = email.strip_prefix("mailto:").unwrap_or(email);
                write!(f, "{} <{}>", self.name, address)
            }
            _ => write!(f, "{}", self.name),
        }
    }
}
