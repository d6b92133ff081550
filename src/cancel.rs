//! Generation-based cancellation for corpus scans
//!
//! Starting a new query bumps the generation. Tokens issued for an older
//! generation report inactive, and the scan holding them stops at its next
//! check.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct SearchGeneration {
    tx: Arc<watch::Sender<u64>>,
}

impl SearchGeneration {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Invalidate every outstanding token and issue one for the new generation.
    pub fn begin(&self) -> CancellationToken {
        let mut issued = 0;
        self.tx.send_modify(|generation| {
            *generation += 1;
            issued = *generation;
        });
        CancellationToken {
            rx: self.tx.subscribe(),
            issued,
        }
    }

    /// Invalidate every outstanding token without starting a new search.
    pub fn cancel(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    pub fn current(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl Default for SearchGeneration {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<u64>,
    issued: u64,
}

impl CancellationToken {
    /// A token nobody can cancel.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(0);
        Self { rx, issued: 0 }
    }

    pub fn is_active(&self) -> bool {
        *self.rx.borrow() == self.issued
    }

    pub fn generation(&self) -> u64 {
        self.issued
    }

    /// Resolves once the token's generation has been superseded.
    pub async fn cancelled(&mut self) {
        while self.is_active() {
            if self.rx.changed().await.is_err() {
                // Sender gone: the generation can no longer move.
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_new_generation_invalidates_old_tokens() {
        let generation = SearchGeneration::new();
        let first = generation.begin();
        assert!(first.is_active());

        let second = generation.begin();
        assert!(!first.is_active());
        assert!(second.is_active());
        assert_eq!(second.generation(), 2);

        generation.cancel();
        assert!(!second.is_active());
    }

    #[test]
    fn test_never_token_stays_active() {
        assert!(CancellationToken::never().is_active());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_on_bump() {
        let generation = SearchGeneration::new();
        let mut token = generation.begin();
        let waiter = tokio::spawn(async move { token.cancelled().await });
        tokio::task::yield_now().await;
        generation.begin();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
