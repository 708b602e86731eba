//! In-process upload provider for tests and offline runs.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::UploadProvider;
use crate::cid::Cid;
use crate::error::ProviderError;
use crate::hash::ContentHash;

/// Prefix of every CID minted by [`MockUploadProvider`].
pub const MOCK_CID_PREFIX: &str = "bafymock";

/// Deterministic provider: the CID is derived from the content hash, so the
/// same bytes always map to the same identifier.
///
/// Failures can be scripted with [`MockUploadProvider::fail_next`].
pub struct MockUploadProvider {
    name: String,
    calls: AtomicU32,
    script: Mutex<VecDeque<ProviderError>>,
}

impl MockUploadProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            calls: AtomicU32::new(0),
            script: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue failures returned, in order, by the next submissions.
    pub fn fail_next(self, errors: impl IntoIterator<Item = ProviderError>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(errors);
        }
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// CID the mock assigns to `content`.
    pub fn cid_for(content: &[u8]) -> Cid {
        let hex = ContentHash::of(content).to_hex();
        Cid(format!("{MOCK_CID_PREFIX}{}", &hex[..46]))
    }
}

impl Default for MockUploadProvider {
    fn default() -> Self {
        Self::new("mock")
    }
}

#[async_trait]
impl UploadProvider for MockUploadProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit(&self, content: &[u8]) -> Result<Cid, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().ok().and_then(|mut script| script.pop_front());
        match scripted {
            Some(error) => Err(error),
            None => Ok(Self::cid_for(content)),
        }
    }
}
