//! Authentication scopes recognised by the backend.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the two disjoint trust domains.
///
/// Every token and adapter operation takes the scope explicitly; nothing
/// reads an ambient "current scope".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Customer,
    Admin,
}

impl Scope {
    /// Both scopes, admin first (boot restoration precedence).
    pub const ALL: [Scope; 2] = [Scope::Admin, Scope::Customer];

    /// The opposite scope.
    pub fn other(self) -> Scope {
        match self {
            Scope::Customer => Scope::Admin,
            Scope::Admin => Scope::Customer,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Customer => "customer",
            Scope::Admin => "admin",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown scope name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scope: {0}")]
pub struct ParseScopeError(pub String);

impl FromStr for Scope {
    type Err = ParseScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(Scope::Customer),
            "admin" => Ok(Scope::Admin),
            other => Err(ParseScopeError(other.to_string())),
        }
    }
}
