//! Per-identifier fetch failures

/// Why a single quote request did not produce a record.
///
/// Only [`FetchError::Transport`] is retried; every other variant is a
/// protocol-level answer from the upstream and is final for that identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchError {
    /// Connection refused/reset, timeout, or truncated body
    Transport(String),
    /// 3xx that survived the redirect policy
    Redirected { status: u16 },
    /// 403, or a 200 whose body carries the firewall warning marker
    Blocked { status: u16 },
    /// Any other non-200 status
    UnexpectedStatus { status: u16 },
    /// Body is not JSON, or the quote array is missing or too short
    Malformed(String),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(message) => write!(f, "transport error: {message}"),
            Self::Redirected { status } => write!(f, "HTTP {status}: request was redirected"),
            Self::Blocked { status } => write!(f, "HTTP {status}: blocked by firewall"),
            Self::UnexpectedStatus { status } => write!(f, "HTTP {status}: unexpected status"),
            Self::Malformed(message) => write!(f, "malformed response: {message}"),
        }
    }
}

impl std::error::Error for FetchError {}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Map a final HTTP status (anything but 200) to its failure class.
    pub fn from_status(status: u16) -> Self {
        match status {
            300..=399 => Self::Redirected { status },
            403 => Self::Blocked { status },
            _ => Self::UnexpectedStatus { status },
        }
    }

    /// Short label used in summaries and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Redirected { .. } => "redirected",
            Self::Blocked { .. } => "blocked",
            Self::UnexpectedStatus { .. } => "status",
            Self::Malformed(_) => "malformed",
        }
    }

    /// Build a transport error from reqwest without leaking the request URL.
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        let reason = if e.is_timeout() {
            "timed out"
        } else if e.is_connect() {
            "connection failed"
        } else if e.is_body() || e.is_decode() {
            "failed to read body"
        } else {
            "request failed"
        };
        Self::Transport(format!("{reason}: {}", e.without_url()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_is_retryable() {
        assert!(FetchError::Transport("reset".into()).is_retryable());
        assert!(!FetchError::Blocked { status: 403 }.is_retryable());
        assert!(!FetchError::Redirected { status: 302 }.is_retryable());
        assert!(!FetchError::UnexpectedStatus { status: 500 }.is_retryable());
        assert!(!FetchError::Malformed("eof".into()).is_retryable());
    }

    #[test]
    fn status_classification() {
        assert_eq!(
            FetchError::from_status(301),
            FetchError::Redirected { status: 301 }
        );
        assert_eq!(
            FetchError::from_status(399),
            FetchError::Redirected { status: 399 }
        );
        assert_eq!(
            FetchError::from_status(403),
            FetchError::Blocked { status: 403 }
        );
        assert_eq!(
            FetchError::from_status(404),
            FetchError::UnexpectedStatus { status: 404 }
        );
        assert_eq!(
            FetchError::from_status(502),
            FetchError::UnexpectedStatus { status: 502 }
        );
    }

    #[test]
    fn display_includes_status() {
        let err = FetchError::Blocked { status: 403 };
        assert_eq!(format!("{err}"), "HTTP 403: blocked by firewall");
    }

    #[test]
    fn display_transport() {
        let err = FetchError::Transport("connection reset".into());
        assert_eq!(format!("{err}"), "transport error: connection reset");
    }

    #[test]
    fn kind_labels() {
        assert_eq!(FetchError::Malformed(String::new()).kind(), "malformed");
        assert_eq!(FetchError::Blocked { status: 403 }.kind(), "blocked");
    }
}
