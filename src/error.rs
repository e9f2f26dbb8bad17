/// Error type returned by this crate.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Network or request execution error from the transport stack.
    #[error("transport error: {0}")]
    Transport(reqwest_middleware::Error),
    /// Non-success HTTP status code left after retries, with raw response body.
    #[error("http error {status} for {url}: {body}")]
    Http {
        status: u16,
        url: String,
        body: String,
    },
    /// Response body is not valid JSON.
    #[error("decode error: {0}")]
    Decode(String),
    /// The client session was already released.
    #[error("client is closed")]
    Closed,
    /// Rejected client configuration (empty base URL, bad header).
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A concurrent fetch task could not be scheduled or did not finish.
    #[error("worker error: {0}")]
    Worker(String),
    /// Writing benchmark output failed.
    #[error("output error: {0}")]
    Output(std::io::Error),
}

impl ApiError {
    /// HTTP status code carried by [`ApiError::Http`], if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
