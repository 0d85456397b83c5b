use pushgate_common::types::ChannelType;

/// Errors that abort a dispatch.
///
/// Per-recipient delivery failures are never represented here; they are
/// folded into [`crate::report::ChannelReport`] outcomes. A `PushError`
/// always means the invocation itself could not proceed.
///
/// # Examples
///
/// ```rust
/// use pushgate_dispatch::error::PushError;
///
/// let err = PushError::InvalidConfig("missing FCM api key".to_string());
/// assert!(err.to_string().contains("api key"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum PushError {
    /// A non-empty bucket was routed to a channel with no settings.
    #[error("Push: channel '{0}' is not configured")]
    ChannelNotConfigured(ChannelType),

    /// Channel settings are missing a required field or contain an
    /// invalid value.
    #[error("Push: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// An HTTP request to a provider endpoint failed outright.
    #[error("Push: HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization failed.
    #[error("Push: JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A provider API rejected the invocation as a whole.
    #[error("Push: API error from {service}: status={status}, body={body}")]
    Api {
        service: String,
        status: u16,
        body: String,
    },

    /// Minting or refreshing a provider auth token failed.
    #[error("Push: auth token error: {0}")]
    Auth(String),

    /// A spawned channel task died before producing a result.
    #[error("Push: channel task failed: {0}")]
    Join(String),

    /// Generic dispatch error for cases not covered by other variants.
    #[error("Push: {0}")]
    Other(String),
}

/// Convenience `Result` alias for dispatch operations.
pub type Result<T> = std::result::Result<T, PushError>;
