//! Normalization of provider upload responses.
//!
//! Providers answer either with a single JSON document or with
//! newline-delimited JSON (one record per added object, the wrapping
//! directory last). Both collapse into one [`UploadRecord`].

use serde::Deserialize;

use crate::cid::Cid;

/// Shape of a provider's response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Single,
    NdJson,
}

/// The normalized result of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRecord {
    pub cid: Cid,
    pub name: Option<String>,
    pub size: Option<u64>,
}

/// A CID is either a plain string or an IPLD link `{"/": "<cid>"}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireCid {
    Plain(String),
    Link {
        #[serde(rename = "/")]
        link: String,
    },
}

impl WireCid {
    fn as_str(&self) -> &str {
        match self {
            Self::Plain(s) => s,
            Self::Link { link } => link,
        }
    }
}

/// Sizes arrive as numbers from some providers and strings from others.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireSize {
    Number(u64),
    Text(String),
}

impl WireSize {
    fn value(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireRecord {
    #[serde(alias = "Hash", alias = "IpfsHash")]
    cid: Option<WireCid>,
    #[serde(alias = "Name")]
    name: Option<String>,
    #[serde(alias = "Size", alias = "PinSize")]
    size: Option<WireSize>,
    value: Option<Box<WireRecord>>,
    data: Option<Box<WireRecord>>,
}

impl WireRecord {
    fn into_record(self) -> Option<UploadRecord> {
        if let Some(cid) = self.cid.as_ref().and_then(|c| Cid::parse(c.as_str()).ok()) {
            return Some(UploadRecord {
                cid,
                name: self.name,
                size: self.size.as_ref().and_then(WireSize::value),
            });
        }
        self.value
            .and_then(|inner| inner.into_record())
            .or_else(|| self.data.and_then(|inner| inner.into_record()))
    }
}

/// Detect the response shape and extract the upload record.
///
/// Returns `None` when no well-formed record carries a CID.
pub fn parse_upload_response(body: &str) -> Option<(ResponseShape, UploadRecord)> {
    let trimmed = body.trim();
    if let Ok(record) = serde_json::from_str::<WireRecord>(trimmed) {
        return record
            .into_record()
            .map(|record| (ResponseShape::Single, record));
    }

    trimmed
        .lines()
        .filter_map(|line| serde_json::from_str::<WireRecord>(line.trim()).ok())
        .filter_map(WireRecord::into_record)
        .last()
        .map(|record| (ResponseShape::NdJson, record))
}
