use std::time::Duration;

use indexmap::IndexMap;

/// Retry strategy an adapter applies to a single request.
///
/// Only the configuration lives here; adapters own the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    NoRetry,
    Linear {
        delta_backoff: Duration,
        max_attempts: u32,
    },
    Exponential {
        delta_backoff: Duration,
        max_backoff: Duration,
        max_attempts: u32,
    },
}

impl RetryPolicy {
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::NoRetry => 1,
            Self::Linear { max_attempts, .. } | Self::Exponential { max_attempts, .. } => {
                *max_attempts
            }
        }
    }
}

/// Per-request execution options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Timeout for each individual request to the service.
    pub server_timeout: Option<Duration>,
    /// Bound on the whole call, retries included.
    pub maximum_execution_time: Option<Duration>,
    pub retry_policy: Option<RetryPolicy>,
}

impl RequestOptions {
    #[must_use]
    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_maximum_execution_time(mut self, timeout: Duration) -> Self {
        self.maximum_execution_time = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

/// Caller context handed to the adapter untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationContext {
    pub client_request_id: Option<String>,
    pub headers: IndexMap<String, String>,
}

impl OperationContext {
    #[must_use]
    pub fn with_client_request_id(mut self, id: impl Into<String>) -> Self {
        self.client_request_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}
