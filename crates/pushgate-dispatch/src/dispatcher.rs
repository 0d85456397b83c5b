//! Dispatch orchestration: partition ids by channel, fan the channel
//! sends out concurrently, aggregate the reports.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::task::JoinSet;

use pushgate_common::types::{ChannelType, Notification, Recipient, RegId};

use crate::channels;
use crate::classifier::{classify, PushMethod};
use crate::error::{PushError, Result};
use crate::report::{ChannelReport, RecipientOutcome, ReportMethod};
use crate::settings::Settings;
use crate::ChannelAdapter;

/// Error attached to every id the classifier could not resolve.
pub const UNKNOWN_REG_ID_ERROR: &str = "Unknown registration id";

/// Immutable snapshot of settings plus the adapters built from them.
/// Replaced wholesale by [`PushDispatcher::set_options`]; in-flight
/// sends keep the snapshot they started with.
struct DispatchState {
    settings: Settings,
    adapters: HashMap<ChannelType, Arc<dyn ChannelAdapter>>,
}

impl DispatchState {
    fn from_settings(settings: Settings) -> Self {
        let adapters = channels::build_adapters(&settings);
        Self { settings, adapters }
    }
}

/// Unified push dispatcher.
///
/// One `send` call accepts a heterogeneous list of registration ids,
/// classifies each to a channel, invokes every non-empty channel's
/// adapter concurrently, and returns one [`ChannelReport`] per channel
/// touched. Per-recipient failures are folded into the reports; a
/// channel-invocation failure fails the whole call and discards
/// sibling results.
pub struct PushDispatcher {
    state: RwLock<Arc<DispatchState>>,
}

impl PushDispatcher {
    /// Builds a dispatcher with adapters for every configured channel.
    pub fn new(settings: Settings) -> Self {
        Self {
            state: RwLock::new(Arc::new(DispatchState::from_settings(settings))),
        }
    }

    /// Builds a dispatcher with caller-supplied adapters, keyed by
    /// their [`ChannelAdapter::channel_type`]. This is the seam for
    /// custom providers and for tests.
    pub fn with_adapters(settings: Settings, adapters: Vec<Arc<dyn ChannelAdapter>>) -> Self {
        let adapters = adapters
            .into_iter()
            .map(|adapter| (adapter.channel_type(), adapter))
            .collect();
        Self {
            state: RwLock::new(Arc::new(DispatchState { settings, adapters })),
        }
    }

    /// Replaces the settings wholesale and rebuilds every adapter.
    ///
    /// Adapters holding persistent resources (the APNs connection) are
    /// shut down before the old snapshot is dropped. An in-flight
    /// `send` keeps the snapshot it started with, so a send racing a
    /// reconfiguration may still deliver with the old settings.
    pub fn set_options(&self, settings: Settings) {
        let next = Arc::new(DispatchState::from_settings(settings));
        let previous = {
            let mut state = self.state.write().expect("dispatcher state lock poisoned");
            std::mem::replace(&mut *state, next)
        };
        for adapter in previous.adapters.values() {
            adapter.shutdown();
        }
    }

    /// Snapshot of the current settings.
    pub fn options(&self) -> Settings {
        self.snapshot().settings.clone()
    }

    /// Resolves one registration id to `(recipient, channel)` without
    /// sending anything.
    pub fn classify(&self, reg_id: &RegId) -> PushMethod {
        classify(reg_id, &self.snapshot().settings)
    }

    /// Dispatches `notification` to every registration id.
    ///
    /// Resolves to one report per channel touched, plus a synthetic
    /// `unknown` report when ids could not be classified, or the single
    /// `none` report when `reg_ids` is empty.
    pub async fn send(
        &self,
        reg_ids: &[RegId],
        notification: &Notification,
    ) -> Result<Vec<ChannelReport>> {
        self.dispatch(reg_ids, notification).await
    }

    /// Like [`send`](Self::send), additionally invoking `callback` with
    /// the same outcome the returned `Result` carries before it is
    /// returned.
    pub async fn send_with_callback<F>(
        &self,
        reg_ids: &[RegId],
        notification: &Notification,
        callback: F,
    ) -> Result<Vec<ChannelReport>>
    where
        F: FnOnce(std::result::Result<&[ChannelReport], &PushError>),
    {
        let outcome = self.dispatch(reg_ids, notification).await;
        match &outcome {
            Ok(reports) => callback(Ok(reports.as_slice())),
            Err(err) => callback(Err(err)),
        }
        outcome
    }

    fn snapshot(&self) -> Arc<DispatchState> {
        self.state
            .read()
            .expect("dispatcher state lock poisoned")
            .clone()
    }

    async fn dispatch(
        &self,
        reg_ids: &[RegId],
        notification: &Notification,
    ) -> Result<Vec<ChannelReport>> {
        let state = self.snapshot();

        let mut buckets: HashMap<ChannelType, Vec<Recipient>> = HashMap::new();
        for reg_id in reg_ids {
            let PushMethod { recipient, channel } = classify(reg_id, &state.settings);
            buckets.entry(channel).or_default().push(recipient);
        }

        let notification = Arc::new(notification.clone());
        let mut reports: Vec<ChannelReport> = Vec::new();
        let mut tasks: JoinSet<Result<ChannelReport>> = JoinSet::new();

        for (channel, recipients) in buckets {
            if channel == ChannelType::Unknown {
                tracing::warn!(
                    count = recipients.len(),
                    "Registration ids did not match any channel"
                );
                reports.push(unknown_report(recipients));
                continue;
            }

            tracing::debug!(
                channel = %channel,
                count = recipients.len(),
                "Invoking channel adapter"
            );
            match state.adapters.get(&channel) {
                Some(adapter) => {
                    let adapter = adapter.clone();
                    let notification = notification.clone();
                    tasks.spawn(async move { adapter.send(&recipients, &notification).await });
                }
                // The failure still goes through the join below so the
                // fail-fast contract is uniform.
                None => {
                    tasks.spawn(async move { Err(PushError::ChannelNotConfigured(channel)) });
                }
            }
        }

        if tasks.is_empty() && reports.is_empty() {
            reports.push(ChannelReport::empty(ReportMethod::None));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(err)) => {
                    tracing::error!(error = %err, "Channel invocation failed, aborting dispatch");
                    tasks.abort_all();
                    return Err(err);
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "Channel task died, aborting dispatch");
                    tasks.abort_all();
                    return Err(PushError::Join(join_err.to_string()));
                }
            }
        }

        Ok(reports)
    }
}

fn unknown_report(recipients: Vec<Recipient>) -> ChannelReport {
    let outcomes = recipients
        .into_iter()
        .map(|recipient| RecipientOutcome::failed(recipient, UNKNOWN_REG_ID_ERROR))
        .collect();
    ChannelReport::from_outcomes(ReportMethod::Unknown, outcomes)
}
