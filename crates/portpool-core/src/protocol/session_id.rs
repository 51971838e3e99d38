//! Per-listener session identifier counter.
//!
//! Every connection accepted on a port is given the next integer from that
//! port's counter: 0, 1, 2, ...  Identifiers are unique among sessions on the
//! same port, not globally; the pair `(port, session_id)` identifies a session.
//!
//! # Thread safety
//!
//! The counter uses `AtomicU32` internally, so concurrent `next()` calls can
//! never hand out the same value twice.  The accept loop is the only writer in
//! practice; other tasks read [`SessionCounter::issued`] for reporting.

use std::sync::atomic::{AtomicU32, Ordering};

/// Identifier of one session on one port.
///
/// 32 bits wide to match the tagging header field.
pub type SessionId = u32;

/// A thread-safe, monotonically increasing source of session identifiers.
///
/// Starts at 0.  Wraps to 0 after `u32::MAX` without panicking.
///
/// # Examples
///
/// ```rust
/// use portpool_core::SessionCounter;
///
/// let counter = SessionCounter::new();
/// assert_eq!(counter.next(), 0);
/// assert_eq!(counter.next(), 1);
/// assert_eq!(counter.issued(), 2);
/// ```
#[derive(Debug)]
pub struct SessionCounter {
    inner: AtomicU32,
}

impl SessionCounter {
    /// Creates a new counter whose first identifier is 0.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(0),
        }
    }

    /// Returns the next session identifier and atomically advances the counter.
    ///
    /// `Relaxed` ordering is enough: the value is only used as a label and does
    /// not publish any other memory.
    pub fn next(&self) -> SessionId {
        // `fetch_add` returns the previous value and wraps on overflow.
        self.inner.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns how many identifiers have been handed out so far (modulo 2^32).
    pub fn issued(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SessionCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_session_counter_starts_at_zero() {
        // Arrange
        let counter = SessionCounter::new();

        // Act
        let first = counter.next();

        // Assert
        assert_eq!(first, 0);
    }

    #[test]
    fn test_session_counter_increments_by_one() {
        let counter = SessionCounter::new();

        let values: Vec<SessionId> = (0..5).map(|_| counter.next()).collect();

        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_session_counter_wraps_at_u32_max() {
        // Arrange – start the counter one step before overflow
        let counter = SessionCounter {
            inner: AtomicU32::new(u32::MAX),
        };

        // Act
        let before_wrap = counter.next();
        let after_wrap = counter.next();

        // Assert
        assert_eq!(before_wrap, u32::MAX);
        assert_eq!(after_wrap, 0);
    }

    #[test]
    fn test_session_counter_never_repeats_under_concurrency() {
        // Arrange
        let counter = Arc::new(SessionCounter::new());
        let thread_count = 8;
        let per_thread = 500;

        // Act – take identifiers from many threads simultaneously
        let handles: Vec<_> = (0..thread_count)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..per_thread).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<SessionId> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert – exactly 0..N, each once
        all.sort_unstable();
        let expected: Vec<SessionId> = (0..(thread_count * per_thread) as u32).collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_issued_does_not_advance() {
        let counter = SessionCounter::default();
        counter.next();

        assert_eq!(counter.issued(), 1);
        assert_eq!(counter.next(), 1);
    }
}
