//! Shared helpers for channel adapters.

use chrono::Utc;

use pushgate_common::types::Notification;

/// Default message lifetime: 28 days in seconds.
pub const DEFAULT_TTL: i64 = 28 * 86_400;

/// FCM refuses TTLs beyond 4 weeks.
pub const GCM_MAX_TTL: i64 = 2_419_200;

/// Maximum length for provider response bodies kept in log output.
pub const MAX_LOG_BODY: usize = 4000;

/// Truncate a string to the specified maximum length.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        s.to_string()
    } else {
        format!("{}... [truncated]", &s[..max_len])
    }
}

/// Relative TTL in seconds for channels that take one (FCM).
///
/// An absolute `expiry` wins and is converted to a remaining lifetime,
/// clamped to `[0, GCM_MAX_TTL]`; otherwise `time_to_live` is used
/// as-is, defaulting to [`DEFAULT_TTL`].
pub fn time_to_live_for(notification: &Notification) -> i64 {
    if let Some(expiry) = notification.expiry {
        (expiry - Utc::now().timestamp()).clamp(0, GCM_MAX_TTL)
    } else {
        notification.time_to_live.unwrap_or(DEFAULT_TTL)
    }
}

/// Absolute expiry in epoch seconds for channels that take one (APNs).
///
/// An explicit `expiry` wins; otherwise `time_to_live` (or the default
/// lifetime) is added to the current time.
pub fn expiry_for(notification: &Notification) -> i64 {
    match (notification.expiry, notification.time_to_live) {
        (Some(expiry), _) => expiry,
        (None, Some(ttl)) => ttl + Utc::now().timestamp(),
        (None, None) => DEFAULT_TTL + Utc::now().timestamp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 5), "hello... [truncated]");
    }

    #[test]
    fn ttl_defaults_and_precedence() {
        let mut n = Notification::new("t", "b");
        assert_eq!(time_to_live_for(&n), DEFAULT_TTL);

        n.time_to_live = Some(3600);
        assert_eq!(time_to_live_for(&n), 3600);

        // An absolute expiry wins over time_to_live and is clamped.
        n.expiry = Some(Utc::now().timestamp() + 10 * GCM_MAX_TTL);
        assert_eq!(time_to_live_for(&n), GCM_MAX_TTL);

        // Expiry in the past never yields a negative lifetime.
        n.expiry = Some(Utc::now().timestamp() - 100);
        assert_eq!(time_to_live_for(&n), 0);
    }

    #[test]
    fn expiry_defaults_and_precedence() {
        let mut n = Notification::new("t", "b");
        let now = Utc::now().timestamp();
        assert!(expiry_for(&n) >= now + DEFAULT_TTL);

        n.time_to_live = Some(60);
        let expiry = expiry_for(&n);
        assert!(expiry >= now + 60 && expiry <= now + 61);

        n.expiry = Some(12345);
        assert_eq!(expiry_for(&n), 12345);
    }
}
