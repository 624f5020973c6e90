//! Caller-side deadlines for overlay requests.

use crate::{CanError, CanResult};
use std::future::Future;
use std::time::{Duration, Instant};

/// An absolute deadline for one overlay request.
///
/// The routing core has no synchronous failure channel: a dropped
/// request surfaces only as the absence of a response, so every caller
/// bounds its wait with one of these.
#[derive(Debug, Clone, Copy)]
pub struct CanTimeout {
    deadline: Instant,
}

impl CanTimeout {
    /// A deadline the given number of milliseconds from now.
    pub fn from_millis(millis: u64) -> Self {
        Self {
            deadline: Instant::now() + Duration::from_millis(millis),
        }
    }

    /// `Err(CanError::TimedOut)` once the deadline has passed.
    pub fn ok(&self) -> CanResult<()> {
        if Instant::now() < self.deadline {
            Ok(())
        } else {
            Err(CanError::TimedOut)
        }
    }

    /// Bound a pending future by this deadline, mapping expiry to
    /// [`CanError::TimedOut`].
    pub async fn mix<R>(
        &self,
        f: impl Future<Output = CanResult<R>> + Send,
    ) -> CanResult<R> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, f).await {
            Ok(r) => r,
            Err(_) => Err(CanError::TimedOut),
        }
    }
}
