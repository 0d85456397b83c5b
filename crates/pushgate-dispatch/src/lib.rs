//! Unified push-notification dispatch layer.
//!
//! A heterogeneous list of registration ids is classified per id to a
//! delivery channel ([`classifier`]), the channel sends are fanned out
//! concurrently ([`dispatcher::PushDispatcher`]), and the per-channel
//! outcomes are normalized into one report schema ([`report`]).
//! Built-in channel adapters cover FCM/GCM, APNs, ADM, WNS, and web
//! push.

pub mod channels;
pub mod classifier;
pub mod dispatcher;
pub mod error;
pub mod report;
pub mod settings;
pub mod utils;

#[cfg(test)]
mod tests;

use async_trait::async_trait;

use pushgate_common::types::{ChannelType, Notification, Recipient};

use crate::error::Result;

pub use crate::classifier::PushMethod;
pub use crate::dispatcher::PushDispatcher;
pub use crate::error::PushError;
pub use crate::report::{ChannelReport, RecipientOutcome, ReportMethod};
pub use crate::settings::Settings;

/// A delivery channel that pushes one notification to a batch of
/// recipients through an external provider.
///
/// Per-recipient delivery failures must be folded into the returned
/// [`ChannelReport`]; an `Err` is reserved for invocation-level
/// problems (missing or malformed credentials, no transport at all)
/// and fails the whole dispatch.
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// Delivers `notification` to every recipient, returning one
    /// normalized report for the batch.
    async fn send(
        &self,
        recipients: &[Recipient],
        notification: &Notification,
    ) -> Result<ChannelReport>;

    /// The channel this adapter delivers to.
    fn channel_type(&self) -> ChannelType;

    /// Releases any persistent resource this adapter holds. Called by
    /// the dispatcher before the adapter is replaced.
    fn shutdown(&self) {}
}
