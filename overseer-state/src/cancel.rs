//! The token passed to every action.
//!
//! The reconciliation core only carries the token along. Whether and how an
//! action reacts to cancellation or an expired deadline is up to the action.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Interrupted {
    #[error("cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// A token sharing this token's cancellation flag, expiring at `deadline`.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            cancelled: self.cancelled.clone(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancel this token and every clone of it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    pub fn check_raw(&self) -> Result<(), Interrupted> {
        if self.is_cancelled() {
            Err(Interrupted::Cancelled)
        } else if self.is_expired() {
            Err(Interrupted::DeadlineExceeded)
        } else {
            Ok(())
        }
    }

    pub fn check(&self) -> anyhow::Result<()> {
        self.check_raw().map_err(|x| x.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_shared_by_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        let timed = token.with_timeout(Duration::from_secs(3600));
        assert!(token.check().is_ok());
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(timed.check_raw(), Err(Interrupted::Cancelled));
    }

    #[test]
    fn expired_deadline() {
        let token = CancelToken::new().with_deadline(Instant::now());
        assert!(token.is_expired());
        assert_eq!(token.check_raw(), Err(Interrupted::DeadlineExceeded));
        let err = token.check().unwrap_err();
        assert_eq!(err.to_string(), "deadline exceeded");
    }

    #[test]
    fn no_deadline_never_expires() {
        let token = CancelToken::default();
        assert_eq!(token.deadline(), None);
        assert!(!token.is_expired());
    }
}
