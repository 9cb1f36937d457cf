use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

/// Per-request identity and deadline. Created by the gateway middleware and
/// carried across every RPC hop.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    deadline: Instant,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, timeout: Duration) -> Self {
        Self {
            request_id: request_id.into(),
            deadline: Instant::now() + timeout,
        }
    }

    pub fn generated(timeout: Duration) -> Self {
        Self::new(Uuid::new_v4().to_string(), timeout)
    }

    /// Time left before the deadline, `None` once it has passed.
    pub fn remaining(&self) -> Option<Duration> {
        let remaining = self.deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            None
        } else {
            Some(remaining)
        }
    }
}
