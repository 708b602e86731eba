//! Cooperative cancellation with an optional aggregate deadline.
//!
//! Pipeline stages call [`CancelToken::check`] between steps (before each
//! provider attempt, network fetch and chain call). Reads may additionally be
//! raced against the token with [`CancelToken::run_bounded`]; registry writes
//! never are.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::CancelError;

#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// Why a bounded call did not produce a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupted {
    Cancelled(CancelError),
    TimedOut(Duration),
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
            deadline: None,
        }
    }

    /// A token that additionally expires `budget` from now.
    pub fn with_deadline(budget: Duration) -> Self {
        Self::new().child_with_deadline(budget)
    }

    /// A clone sharing this token's cancellation whose deadline is the
    /// earlier of the current one and `budget` from now.
    pub fn child_with_deadline(&self, budget: Duration) -> Self {
        let candidate = Instant::now() + budget;
        let deadline = match self.deadline {
            Some(existing) if existing < candidate => existing,
            _ => candidate,
        };
        Self {
            tx: Arc::clone(&self.tx),
            rx: self.rx.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Returns an error if the token was cancelled or its deadline passed.
    pub fn check(&self) -> Result<(), CancelError> {
        if self.is_cancelled() {
            return Err(CancelError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(CancelError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Resolves once the token is cancelled or its deadline passes.
    pub async fn cancelled(&self) -> CancelError {
        let mut rx = self.rx.clone();
        let wait_for_cancel = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = wait_for_cancel => CancelError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => CancelError::DeadlineExceeded,
            },
            None => {
                wait_for_cancel.await;
                CancelError::Cancelled
            }
        }
    }

    /// Sleep for `duration` unless the token fires first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), CancelError> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => self.check(),
            reason = self.cancelled() => Err(reason),
        }
    }

    /// Run `fut` bounded by `limit` and by this token.
    pub async fn run_bounded<F: Future>(
        &self,
        limit: Duration,
        fut: F,
    ) -> Result<F::Output, Interrupted> {
        self.check().map_err(Interrupted::Cancelled)?;
        tokio::select! {
            result = tokio::time::timeout(limit, fut) => result.map_err(|_| Interrupted::TimedOut(limit)),
            reason = self.cancelled() => Err(Interrupted::Cancelled(reason)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_token_passes_check() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        clone.cancel();
        assert_eq!(token.check(), Err(CancelError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let token = CancelToken::with_deadline(Duration::from_secs(5));
        assert!(token.check().is_ok());
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(token.check(), Err(CancelError::DeadlineExceeded));
        assert_eq!(token.cancelled().await, CancelError::DeadlineExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_keeps_earlier_deadline() {
        let parent = CancelToken::with_deadline(Duration::from_secs(2));
        let child = parent.child_with_deadline(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_run_bounded_times_out() {
        let token = CancelToken::new();
        let result = token
            .run_bounded(Duration::from_millis(10), std::future::pending::<()>())
            .await;
        assert_eq!(result, Err(Interrupted::TimedOut(Duration::from_millis(10))));
    }

    #[tokio::test]
    async fn test_run_bounded_observes_cancellation() {
        let token = CancelToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            trigger.cancel();
        });
        let result = token
            .run_bounded(Duration::from_secs(30), std::future::pending::<()>())
            .await;
        assert_eq!(result, Err(Interrupted::Cancelled(CancelError::Cancelled)));
    }

    #[tokio::test]
    async fn test_sleep_interrupted_by_cancel() {
        let token = CancelToken::new();
        token.cancel();
        assert_eq!(
            token.sleep(Duration::from_secs(30)).await,
            Err(CancelError::Cancelled)
        );
    }
}
