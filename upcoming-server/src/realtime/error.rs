//! Feed fetch/decode error types.
//!
//! All of these are recoverable: the poller logs them and keeps serving the
//! previous snapshot.

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("feed request failed: {0}")]
    Http(reqwest::Error),

    #[error("feed request timed out")]
    Timeout,

    /// The feed body exceeded the size cap. A runaway response must not be
    /// buffered into memory wholesale.
    #[error("feed body too large: {got} bytes (cap {cap})")]
    TooLarge { got: usize, cap: usize },

    #[error("cannot decode feed protobuf: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("API key is not a valid header value")]
    InvalidApiKey,
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FeedError::Timeout
        } else {
            FeedError::Http(e)
        }
    }
}
