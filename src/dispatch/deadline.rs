//! Pass-wide deadline shared by every blocking call in a pass.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{DispatchError, PassStage};

/// Cap applied when a budget overflows the clock.
const MAX_BUDGET: Duration = Duration::from_secs(30 * 24 * 3600);

/// A fixed point in time by which the whole pass must finish.
///
/// Calls raced against the deadline are dropped (and so cancelled) when it
/// expires.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    /// A deadline `budget` from now. A budget past the clock's range is
    /// capped at [`MAX_BUDGET`].
    pub fn after(budget: Duration) -> Self {
        let now = Instant::now();
        let at = now
            .checked_add(budget)
            .unwrap_or_else(|| now + MAX_BUDGET);
        Self { at, budget }
    }

    /// Time left before expiry; zero once expired.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    /// Runs `fut` unless the deadline expires first.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Timeout` tagged with `stage` on expiry, or
    /// whatever error `fut` produced.
    pub async fn run<F, T>(&self, stage: PassStage, fut: F) -> Result<T, DispatchError>
    where
        F: Future<Output = Result<T, DispatchError>>,
    {
        match tokio::time::timeout_at(self.at, fut).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                stage,
                after: self.budget,
            }),
        }
    }
}
