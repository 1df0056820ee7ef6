//! Fetch error type and its classification for operator-facing messages.

use std::fmt;

/// Error returned by a single download attempt (curl failure, HTTP error, or storage failure).
#[derive(Debug)]
pub enum FetchError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// Creating, writing or renaming the local file failed.
    Storage(std::io::Error),
}

/// Coarse class of a fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Operation timed out (connect/read/low speed).
    Timeout,
    /// Network-level failure (connection reset, DNS, etc.).
    Connection,
    /// Server answered with 4xx.
    HttpClient(u32),
    /// Server answered with 5xx (or another non-2xx status).
    HttpServer(u32),
    Storage,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timed out"),
            FailureKind::Connection => write!(f, "connection failed"),
            FailureKind::HttpClient(code) | FailureKind::HttpServer(code) => {
                write!(f, "HTTP {}", code)
            }
            FailureKind::Storage => write!(f, "local write failed"),
            FailureKind::Other => write!(f, "transfer failed"),
        }
    }
}

impl FetchError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FetchError::Curl(e) => classify_curl_error(e),
            FetchError::Http(code) => classify_http_status(*code),
            FetchError::Storage(_) => FailureKind::Storage,
        }
    }
}

impl From<curl::Error> for FetchError {
    fn from(e: curl::Error) -> Self {
        FetchError::Curl(e)
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Curl(e) => write!(f, "{}: {}", self.kind(), e),
            FetchError::Http(_) => write!(f, "{}", self.kind()),
            FetchError::Storage(e) => write!(f, "{}: {}", self.kind(), e),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Curl(e) => Some(e),
            FetchError::Storage(e) => Some(e),
            FetchError::Http(_) => None,
        }
    }
}

/// Classify an HTTP status code.
pub fn classify_http_status(code: u32) -> FailureKind {
    match code {
        400..=499 => FailureKind::HttpClient(code),
        _ => FailureKind::HttpServer(code),
    }
}

/// Classify a curl error.
pub fn classify_curl_error(e: &curl::Error) -> FailureKind {
    if e.is_operation_timedout() {
        return FailureKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_ssl_connect_error()
    {
        return FailureKind::Connection;
    }
    FailureKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_statuses() {
        assert_eq!(classify_http_status(404), FailureKind::HttpClient(404));
        assert_eq!(classify_http_status(403), FailureKind::HttpClient(403));
        assert_eq!(classify_http_status(503), FailureKind::HttpServer(503));
        assert_eq!(FetchError::Http(404).to_string(), "HTTP 404");
    }

    #[test]
    fn storage_errors_name_the_cause() {
        let e = FetchError::Storage(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert_eq!(e.kind(), FailureKind::Storage);
        assert_eq!(e.to_string(), "local write failed: denied");
    }
}
