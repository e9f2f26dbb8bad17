/// Configures HTTP timeout and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-request timeout in milliseconds. `None` keeps the transport default.
    pub timeout_ms: Option<u64>,
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds; doubles on each further retry.
    pub retry_backoff_ms: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: None,
            max_retries: 3,
            retry_backoff_ms: 100,
        }
    }
}
