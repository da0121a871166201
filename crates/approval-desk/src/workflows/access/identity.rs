use std::fmt;

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Header set by the authenticating proxy in front of the service.
pub const EMAIL_HEADER: &str = "x-forwarded-email";
pub const DISPLAY_NAME_HEADER: &str = "x-forwarded-preferred-username";

/// E-mail based identity, stored trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Identity {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(value: Identity) -> Self {
        value.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The caller of a request as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub identity: Identity,
    pub display_name: Option<String>,
    pub authenticated: bool,
}

impl Actor {
    pub fn authenticated(identity: impl Into<Identity>) -> Self {
        let identity = identity.into();
        let authenticated = !identity.is_empty();
        Self {
            identity,
            display_name: None,
            authenticated,
        }
    }

    pub fn anonymous() -> Self {
        Self {
            identity: Identity::new(""),
            display_name: None,
            authenticated: false,
        }
    }

    /// Trust the proxy headers; a missing or blank e-mail yields an anonymous actor.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let email = headers
            .get(EMAIL_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(Identity::new)
            .filter(|identity| !identity.is_empty());

        match email {
            Some(identity) => Self {
                identity,
                display_name: headers
                    .get(DISPLAY_NAME_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty()),
                authenticated: true,
            },
            None => Self::anonymous(),
        }
    }
}
