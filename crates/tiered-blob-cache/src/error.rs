//! Error types for the tiered blob cache

use crate::hash::ContentHash;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum CacheError {
    #[error("Payload of {size} bytes exceeds the per-item limit of {limit} bytes")]
    OversizedPayload { size: u64, limit: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Durable write failed: {0}")]
    DurableWrite(String),

    #[error("Hash collision: resident bytes for {0} differ from the new payload")]
    HashCollision(ContentHash),

    #[error("Invalid content hash: {0}")]
    InvalidHash(String),
}

/// Errors raised by a durable backend
#[derive(Error, Debug)]
pub enum DurableError {
    #[error("Not found in durable tier: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt durable entry: {0}")]
    Corrupt(String),

    #[error("Durable tier unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversized_display() {
        let err = CacheError::OversizedPayload {
            size: 1200,
            limit: 1000,
        };
        assert_eq!(
            format!("{}", err),
            "Payload of 1200 bytes exceeds the per-item limit of 1000 bytes"
        );
    }

    #[test]
    fn test_not_found_display() {
        let err = CacheError::NotFound("path a".to_string());
        assert_eq!(format!("{}", err), "Not found: path a");
    }

    #[test]
    fn test_durable_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: DurableError = io.into();
        assert!(matches!(err, DurableError::Io(_)));
        assert!(format!("{}", err).contains("denied"));
    }

    #[test]
    fn test_error_is_debug() {
        let err = CacheError::DurableWrite("disk full".to_string());
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("DurableWrite"));
    }
}
