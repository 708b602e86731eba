//! DID-shaped identity identifiers (`did:<method>:<identifier>`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ManifestValidationError;
use crate::signature::Address;

/// An identity reference of the form `method:identifier`, usually with a
/// leading `did:` scheme.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity {
    raw: String,
    method_start: usize,
    id_start: usize,
}

impl Identity {
    pub fn parse(s: &str) -> Result<Self, ManifestValidationError> {
        let invalid = |reason: &str| ManifestValidationError::new("identity", reason);

        if s.trim() != s || s.is_empty() {
            return Err(invalid("must be a non-empty string without surrounding whitespace"));
        }

        let method_start = if s.starts_with("did:") { 4 } else { 0 };
        let rest = &s[method_start..];
        let (method, identifier) = rest
            .split_once(':')
            .ok_or_else(|| invalid("expected `method:identifier`"))?;

        if method.is_empty()
            || !method
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        {
            return Err(invalid("method must be lowercase alphanumeric"));
        }
        if identifier.is_empty()
            || !identifier
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b':' | b'%' | b'-'))
        {
            return Err(invalid("identifier contains unsupported characters"));
        }

        Ok(Self {
            raw: s.to_string(),
            method_start,
            id_start: method_start + method.len() + 1,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn method(&self) -> &str {
        &self.raw[self.method_start..self.id_start - 1]
    }

    pub fn identifier(&self) -> &str {
        &self.raw[self.id_start..]
    }

    /// Address of the key that controls this identity, when the method
    /// encodes one directly.
    ///
    /// Supported: `did:ethr:[<network>:]0x…` and `did:pkh:eip155:<chain>:0x…`.
    pub fn controller_address(&self) -> Option<Address> {
        let identifier = self.identifier();
        let candidate = match self.method() {
            "ethr" => identifier.rsplit(':').next()?,
            "pkh" => {
                let mut parts = identifier.split(':');
                let namespace = parts.next()?;
                let _chain = parts.next()?;
                let account = parts.next()?;
                if namespace != "eip155" || parts.next().is_some() {
                    return None;
                }
                account
            }
            _ => return None,
        };
        candidate.parse().ok()
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.raw)
    }
}

impl FromStr for Identity {
    type Err = ManifestValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = ManifestValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identity> for String {
    fn from(identity: Identity) -> Self {
        identity.raw
    }
}
