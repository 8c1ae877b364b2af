//! Cooperative cancellation for rolling runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Shared cancel flag with an optional wall-clock deadline.
///
/// Clones share the flag. Workers check the token before starting a step, so
/// a step that already started always finishes and keeps its result.
///
/// The deadline belongs to the token it was set on: passing it trips that
/// token only and never writes the shared flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token sharing this flag that also trips once `timeout` has elapsed.
    ///
    /// Cancelling `self` still reaches the new token; its deadline does not
    /// reach `self`.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let deadline = Instant::now().checked_add(timeout);
        Self {
            flag: Arc::clone(&self.flag),
            deadline: match (self.deadline, deadline) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            },
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn elapsed_deadline_stays_local() {
        let token = CancelToken::new();
        let timed = token.with_timeout(Duration::ZERO);
        assert!(timed.is_cancelled());
        assert!(!token.is_cancelled());
        assert!(!token.clone().is_cancelled());
    }

    #[test]
    fn parent_cancel_reaches_timed_token() {
        let token = CancelToken::new();
        let timed = token.with_timeout(Duration::from_secs(3600));
        assert!(!timed.is_cancelled());
        token.cancel();
        assert!(timed.is_cancelled());
    }

    #[test]
    fn distant_deadline_does_not_trip() {
        let token = CancelToken::new().with_timeout(Duration::from_secs(3600));
        assert!(!token.is_cancelled());
    }
}
