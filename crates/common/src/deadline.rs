//! Per-request deadlines.
//!
//! The HTTP layer hands every request a [`Deadline`]. Operations that may
//! block (lock acquisition, external fetches) run under it and surface
//! [`TimedOut`] once it passes. Store writes are never raced against the
//! deadline: a write that has started runs to completion.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request deadline exceeded")]
pub struct TimedOut;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never expires.
    pub fn none() -> Self {
        Self(None)
    }

    pub fn after(timeout: Duration) -> Self {
        Self(Some(Instant::now() + timeout))
    }

    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.0, Some(at) if Instant::now() >= at)
    }

    pub fn check(&self) -> Result<(), TimedOut> {
        if self.is_expired() {
            Err(TimedOut)
        } else {
            Ok(())
        }
    }

    /// Drive `fut` to completion unless the deadline passes first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, TimedOut> {
        match self.0 {
            Some(at) => tokio::time::timeout_at(at, fut).await.map_err(|_| TimedOut),
            None => Ok(fut.await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let deadline = Deadline::after(Duration::from_millis(50));
        assert!(deadline.check().is_ok());

        let slow = tokio::time::sleep(Duration::from_secs(1));
        assert_eq!(deadline.run(slow).await, Err(TimedOut));
        assert!(deadline.is_expired());
    }

    #[tokio::test]
    async fn test_no_deadline_runs_to_completion() {
        let value = Deadline::none().run(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }
}
