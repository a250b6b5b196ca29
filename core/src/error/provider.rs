use std::time::Duration;
use std::{error::Error as StdError, fmt};

/// Coarse classification of a failed `generate` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Timeout,
    Connect,
    Request,
    Status,
    Auth,
    Quota,
    Decode,
}

impl ProviderErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Status => "status",
            Self::Auth => "auth",
            Self::Quota => "quota",
            Self::Decode => "decode",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a provider's `generate` capability.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
    /// Wait requested by the provider (`Retry-After`), if any.
    pub retry_after: Option<Duration>,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "provider error kind={}", self.kind)?;
        if let Some(status) = self.status {
            write!(f, " status={}", status)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl StdError for ProviderError {}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Classifies an HTTP status code returned by a provider endpoint.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let kind = match status {
            401 | 403 => ProviderErrorKind::Auth,
            402 | 429 => ProviderErrorKind::Quota,
            _ => ProviderErrorKind::Status,
        };
        Self::new(kind, message).with_status(status)
    }

    /// Whether a retry inside the provider call may succeed.
    ///
    /// Timeouts, connection failures, 429 and 5xx responses are transient;
    /// auth, decode and other 4xx failures are not.
    pub fn is_transient(&self) -> bool {
        match self.kind {
            ProviderErrorKind::Timeout | ProviderErrorKind::Connect => true,
            ProviderErrorKind::Quota => self.status == Some(429),
            ProviderErrorKind::Status => self.status.map(|s| s >= 500).unwrap_or(false),
            ProviderErrorKind::Request | ProviderErrorKind::Auth | ProviderErrorKind::Decode => {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert_eq!(
            ProviderError::from_status(401, "no").kind,
            ProviderErrorKind::Auth
        );
        assert_eq!(
            ProviderError::from_status(429, "slow down").kind,
            ProviderErrorKind::Quota
        );
        assert_eq!(
            ProviderError::from_status(502, "bad gateway").kind,
            ProviderErrorKind::Status
        );
    }

    #[test]
    fn test_transient_errors() {
        assert!(ProviderError::from_status(429, "").is_transient());
        assert!(ProviderError::from_status(503, "").is_transient());
        assert!(ProviderError::new(ProviderErrorKind::Timeout, "").is_transient());
        assert!(!ProviderError::from_status(402, "").is_transient());
        assert!(!ProviderError::from_status(400, "").is_transient());
        assert!(!ProviderError::new(ProviderErrorKind::Decode, "").is_transient());
    }

    #[test]
    fn test_display_includes_status() {
        let msg = ProviderError::from_status(502, "bad gateway").to_string();
        assert!(msg.contains("kind=status"));
        assert!(msg.contains("status=502"));
        assert!(msg.contains("bad gateway"));
    }
}
