use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use crate::error::{Error, Result};

/// A cooperative cancellation handle.
///
/// Every public store operation takes a token and polls it at suspension
/// points. Clones share the same flag, so any holder can cancel the rest.
/// Cancellation aborts the active operation before its batch commits;
/// already-committed work is not rolled back.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    canceled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates a new, uncanceled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    /// Returns whether the token has been canceled.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Returns Error::Canceled if the token has fired.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(Error::Canceled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_propagates_to_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_canceled());
        assert!(clone.check().is_ok());

        token.cancel();
        assert!(clone.is_canceled());
        assert_eq!(clone.check(), Err(Error::Canceled));
    }

    #[test]
    fn test_fresh_tokens_are_independent() {
        let a = CancelToken::new();
        let b = CancelToken::new();
        a.cancel();
        assert!(!b.is_canceled());
    }
}
