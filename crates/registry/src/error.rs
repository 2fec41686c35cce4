//! Registry Error Types

use derive_more::{Display, Error};

/// A registry error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// A package that does not exist upstream is *not* an error; see
/// [`Fetched::package`](crate::Fetched::package).
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The request never produced a response (DNS, connect, TLS, timeout).
    #[display("network error contacting upstream registry")]
    Network,
    /// The registry answered with an unexpected status code.
    #[display("upstream registry responded with status {_0}")]
    Status(#[error(not(source))] u16),
    /// The response body was not a valid package document.
    #[display("could not decode upstream package document")]
    Decode,
    /// The HTTP client could not be constructed.
    #[display("could not build HTTP client")]
    Client,
    /// The configured base URL or package name does not form a valid URL.
    #[display("invalid registry URL: {_0}")]
    InvalidUrl(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network => true,
            Self::Status(status) => *status >= 500 || *status == 429,
            Self::Decode | Self::Client | Self::InvalidUrl(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::Network, true)]
    #[case(ErrorKind::Status(503), true)]
    #[case(ErrorKind::Status(429), true)]
    #[case(ErrorKind::Status(403), false)]
    #[case(ErrorKind::Decode, false)]
    fn test_retryable(#[case] kind: ErrorKind, #[case] expected: bool) {
        assert_eq!(kind.is_retryable(), expected);
    }
}
