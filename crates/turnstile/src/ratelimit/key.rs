//! Client identity and counting-key derivation.

use std::fmt;

/// Authenticated user attached to a request by an earlier layer.
///
/// Authentication middleware inserts this into the request extensions; the
/// rate limiter only reads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

/// Who a request is attributed to for quota purposes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientIdentity {
    /// An authenticated user id.
    User(String),
    /// A raw network address, used when no user is known.
    Address(String),
}

impl ClientIdentity {
    /// Prefer the user identity whenever one is present.
    pub fn resolve(user: Option<&AuthenticatedUser>, address: impl FnOnce() -> String) -> Self {
        match user {
            Some(AuthenticatedUser(id)) => Self::User(id.clone()),
            None => Self::Address(address()),
        }
    }

    /// Key segment naming the identity kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Address(_) => "ip",
        }
    }

    pub fn value(&self) -> &str {
        match self {
            Self::User(v) | Self::Address(v) => v,
        }
    }
}

/// Counting-store key for one client: `{prefix}{kind}:{identity}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn derive(prefix: &str, identity: &ClientIdentity) -> Self {
        Self(format!("{prefix}{}:{}", identity.kind(), identity.value()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
