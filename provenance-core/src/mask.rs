//! Masking for identifiers and credentials that must not reach logs verbatim.

use std::fmt;

use crate::hash::fingerprint;

/// Number of leading characters kept visible for masked identifiers.
const VISIBLE_PREFIX: usize = 6;

/// Display adapter that truncates a value and appends a short fingerprint,
/// so log lines can be correlated without exposing the value.
pub struct Masked<'a>(&'a str);

/// Mask an identifier such as a CID: `bafybe…#1a2b3c4d`.
pub fn mask(value: &str) -> Masked<'_> {
    Masked(value)
}

impl fmt::Display for Masked<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(VISIBLE_PREFIX).collect();
        if self.0.chars().count() <= VISIBLE_PREFIX * 2 {
            write!(f, "…#{}", fingerprint(self.0.as_bytes()))
        } else {
            write!(f, "{prefix}…#{}", fingerprint(self.0.as_bytes()))
        }
    }
}

impl fmt::Debug for Masked<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Display adapter for secrets: only a fingerprint is ever rendered.
pub struct Redacted<'a>(&'a str);

pub fn redact(secret: &str) -> Redacted<'_> {
    Redacted(secret)
}

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED sha3:{}]", fingerprint(self.0.as_bytes()))
    }
}

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
