use thiserror::Error;

/// Coarse failure classes shared by drivers, the uploader and the strategy facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Missing,
    Permission,
    Fatal,
}

#[derive(Error, Debug)]
pub enum SensingError {
    /// Network failure, timeout, a resource that is busy right now.
    #[error("transient failure: {0}")]
    Transient(String),
    /// File not found, token absent.
    #[error("missing: {0}")]
    Missing(String),
    #[error("permission denied: {0}")]
    Permission(String),
    /// Invariant violated; only a corrupted reading store ends up here.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl SensingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SensingError::Transient(_) => ErrorKind::Transient,
            SensingError::Missing(_) => ErrorKind::Missing,
            SensingError::Permission(_) => ErrorKind::Permission,
            SensingError::Fatal(_) => ErrorKind::Fatal,
        }
    }

    /// Whether the next scheduled run may succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient | ErrorKind::Missing)
    }

    pub fn store(err: anyhow::Error) -> Self {
        SensingError::Fatal(format!("reading store failure: {err:#}"))
    }
}

impl From<reqwest::Error> for SensingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SensingError::Transient(format!("request timed out: {err}"))
        } else {
            SensingError::Transient(format!("transport error: {err}"))
        }
    }
}

impl From<std::io::Error> for SensingError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => SensingError::Missing(err.to_string()),
            std::io::ErrorKind::PermissionDenied => SensingError::Permission(err.to_string()),
            _ => SensingError::Transient(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, SensingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_map_to_kinds() {
        let missing = SensingError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "x"));
        assert_eq!(missing.kind(), ErrorKind::Missing);
        assert!(missing.is_retryable());

        let denied =
            SensingError::from(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "x"));
        assert_eq!(denied.kind(), ErrorKind::Permission);
        assert!(!denied.is_retryable());
    }

    #[test]
    fn store_failures_are_fatal() {
        let err = SensingError::store(anyhow::anyhow!("disk image is malformed"));
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.to_string().contains("malformed"));
    }
}
