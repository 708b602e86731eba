//! Content identifiers returned by content-addressed stores.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ManifestValidationError;
use crate::mask::mask;

/// Content identifier. Immutable once assigned.
///
/// `Debug` output is masked; use `as_str()` or `Display` only where the full
/// value is required (URIs, manifests).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(pub(crate) String);

impl Cid {
    pub fn parse(s: &str) -> Result<Self, ManifestValidationError> {
        let value = s.trim();
        if value.is_empty() {
            return Err(ManifestValidationError::new("cid", "must not be empty"));
        }
        if !value.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ManifestValidationError::new(
                "cid",
                "must contain only ASCII letters and digits",
            ));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `ipfs://<cid>` URI for this identifier.
    pub fn to_ipfs_uri(&self) -> String {
        format!("ipfs://{}", self.0)
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", mask(&self.0))
    }
}

impl TryFrom<String> for Cid {
    type Error = ManifestValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.0
    }
}
