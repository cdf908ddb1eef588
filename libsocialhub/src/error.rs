//! Error types for Socialhub
//!
//! The adapter taxonomy (`AdapterError`) is the uniform surface every
//! platform error is mapped into, and `classify_status` is the single
//! place where raw HTTP status information becomes taxonomy. Adapters
//! never make retry decisions themselves; callers ask the error via
//! [`AdapterError::retry_decision`].

use std::time::Duration;

use thiserror::Error;

use crate::types::Platform;

pub type Result<T> = std::result::Result<T, SocialError>;

/// Maximum attempts for transport-level retries (initial call included).
pub const MAX_TRANSPORT_ATTEMPTS: u32 = 3;

/// Default backoff when a platform rate-limits without a retry-after hint.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum SocialError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Uniform error taxonomy for platform adapter operations.
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    /// Bad, expired, or missing token.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A platform-required metadata key is absent from the account.
    ///
    /// Distinct from `Auth`: the token may be fine, but the operation
    /// cannot even be addressed (e.g. Instagram without a business
    /// account id).
    #[error("{platform} account is missing required metadata key '{key}'")]
    MissingMetadata { platform: Platform, key: &'static str },

    /// The platform asked us to slow down.
    #[error("Rate limit exceeded: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The platform returned an error payload. Not retried.
    #[error("Remote error{}: {message}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Remote { status: Option<u16>, message: String },

    /// Network-level failure (connect, DNS, mid-body).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The adapter genuinely lacks this capability on this platform.
    #[error("{platform} does not support {operation}")]
    Unsupported {
        platform: Platform,
        operation: &'static str,
    },

    /// A cursor string that did not originate from this adapter, or
    /// that was corrupted in transit.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// A bounded wait (status poll, request deadline) was exhausted.
    #[error("Timed out: {0}")]
    Timeout(String),
}

/// What a caller should do with a failed adapter operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Refresh the credential through the token manager, then retry once.
    RefreshAndRetry,
    /// Wait the given duration, then retry.
    RetryAfter(Duration),
    /// Surface the error as-is.
    Fatal,
}

impl AdapterError {
    /// Classify this error into a retry decision.
    ///
    /// `attempt` is 1-based: the first failed call passes 1. Auth errors
    /// get exactly one refresh-and-retry; transport errors back off
    /// exponentially (1s, 2s, 4s) up to [`MAX_TRANSPORT_ATTEMPTS`];
    /// rate limits honor the platform-supplied retry-after. Everything
    /// else is fatal.
    pub fn retry_decision(&self, attempt: u32) -> RetryDecision {
        match self {
            AdapterError::Auth(_) if attempt == 1 => RetryDecision::RefreshAndRetry,
            AdapterError::RateLimited { retry_after, .. } => {
                RetryDecision::RetryAfter(retry_after.unwrap_or(DEFAULT_RETRY_AFTER))
            }
            AdapterError::Transport(_) if attempt < MAX_TRANSPORT_ATTEMPTS => {
                RetryDecision::RetryAfter(Duration::from_secs(1 << (attempt - 1)))
            }
            _ => RetryDecision::Fatal,
        }
    }
}

/// Map an HTTP status code and response body into the taxonomy.
///
/// This is the single mapping point for all REST adapters:
/// - 401/403 → `Auth`
/// - 429 → `RateLimited` (with the Retry-After header value if present)
/// - 5xx → `Transport` (server-side, treated as transient)
/// - other non-2xx → `Remote`
pub fn classify_status(
    platform: Platform,
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> AdapterError {
    match status {
        401 | 403 => AdapterError::Auth(format!(
            "{} rejected the credential (HTTP {}): {}",
            platform,
            status,
            truncate(body)
        )),
        429 => AdapterError::RateLimited {
            message: format!("{} returned HTTP 429: {}", platform, truncate(body)),
            retry_after,
        },
        500..=599 => AdapterError::Transport(format!(
            "{} server error (HTTP {}): {}",
            platform,
            status,
            truncate(body)
        )),
        _ => AdapterError::Remote {
            status: Some(status),
            message: format!("{}: {}", platform, truncate(body)),
        },
    }
}

/// Map a reqwest error into the taxonomy.
///
/// Timeouts become `Timeout`; everything else at this level is a
/// transport failure (status-bearing responses go through
/// [`classify_status`] instead).
pub fn classify_transport(platform: Platform, err: &reqwest::Error) -> AdapterError {
    if err.is_timeout() {
        AdapterError::Timeout(format!("{} request timed out: {}", platform, err))
    } else {
        AdapterError::Transport(format!("{}: {}", platform, err))
    }
}

fn truncate(body: &str) -> String {
    const MAX: usize = 256;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &body[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status_auth() {
        let err = classify_status(Platform::Facebook, 401, "bad token", None);
        assert!(matches!(err, AdapterError::Auth(_)));
        let err = classify_status(Platform::LinkedIn, 403, "forbidden", None);
        assert!(matches!(err, AdapterError::Auth(_)));
    }

    #[test]
    fn test_classify_status_rate_limited_carries_retry_after() {
        let err = classify_status(
            Platform::Twitter,
            429,
            "slow down",
            Some(Duration::from_secs(30)),
        );
        match err {
            AdapterError::RateLimited { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(30)));
            }
            other => panic!("expected RateLimited, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_status_server_error_is_transport() {
        let err = classify_status(Platform::YouTube, 503, "unavailable", None);
        assert!(matches!(err, AdapterError::Transport(_)));
    }

    #[test]
    fn test_classify_status_client_error_is_remote() {
        let err = classify_status(Platform::Instagram, 400, "bad request", None);
        match err {
            AdapterError::Remote { status, .. } => assert_eq!(status, Some(400)),
            other => panic!("expected Remote, got {:?}", other),
        }
    }

    #[test]
    fn test_retry_decision_auth_refreshes_once() {
        let err = AdapterError::Auth("expired".to_string());
        assert_eq!(err.retry_decision(1), RetryDecision::RefreshAndRetry);
        assert_eq!(err.retry_decision(2), RetryDecision::Fatal);
    }

    #[test]
    fn test_retry_decision_transport_backoff() {
        let err = AdapterError::Transport("reset".to_string());
        assert_eq!(
            err.retry_decision(1),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
        assert_eq!(
            err.retry_decision(2),
            RetryDecision::RetryAfter(Duration::from_secs(2))
        );
        assert_eq!(err.retry_decision(3), RetryDecision::Fatal);
    }

    #[test]
    fn test_retry_decision_rate_limit_default() {
        let err = AdapterError::RateLimited {
            message: "429".to_string(),
            retry_after: None,
        };
        assert_eq!(
            err.retry_decision(1),
            RetryDecision::RetryAfter(DEFAULT_RETRY_AFTER)
        );
    }

    #[test]
    fn test_retry_decision_unsupported_never_retried() {
        let err = AdapterError::Unsupported {
            platform: Platform::YouTube,
            operation: "getConversations",
        };
        assert_eq!(err.retry_decision(1), RetryDecision::Fatal);
        let err = AdapterError::Remote {
            status: Some(404),
            message: "gone".to_string(),
        };
        assert_eq!(err.retry_decision(1), RetryDecision::Fatal);
    }

    #[test]
    fn test_unsupported_message_names_operation() {
        let err = AdapterError::Unsupported {
            platform: Platform::YouTube,
            operation: "getConversations",
        };
        let msg = format!("{}", err);
        assert!(msg.contains("youtube"));
        assert!(msg.contains("getConversations"));
    }

    #[test]
    fn test_missing_metadata_message() {
        let err = AdapterError::MissingMetadata {
            platform: Platform::Instagram,
            key: "business_account_id",
        };
        let msg = format!("{}", err);
        assert!(msg.contains("instagram"));
        assert!(msg.contains("business_account_id"));
    }

    #[test]
    fn test_error_conversion_into_social_error() {
        let err: SocialError = AdapterError::Auth("nope".to_string()).into();
        assert!(matches!(err, SocialError::Adapter(_)));

        let err: SocialError = ConfigError::MissingField("facebook.app_id".to_string()).into();
        assert!(matches!(err, SocialError::Config(_)));
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(1000);
        let err = classify_status(Platform::Facebook, 400, &body, None);
        let msg = format!("{}", err);
        assert!(msg.len() < 400);
    }
}
