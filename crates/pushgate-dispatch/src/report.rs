use serde::{Deserialize, Serialize};

use pushgate_common::types::{ChannelType, Recipient};

/// Channel slot of a [`ChannelReport`]: a real delivery channel, the
/// synthetic `unknown` bucket, or the `none` placeholder produced for
/// an empty send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportMethod {
    Gcm,
    Apn,
    Adm,
    Wns,
    WebPush,
    Unknown,
    None,
}

impl From<ChannelType> for ReportMethod {
    fn from(channel: ChannelType) -> Self {
        match channel {
            ChannelType::Gcm => ReportMethod::Gcm,
            ChannelType::Apn => ReportMethod::Apn,
            ChannelType::Adm => ReportMethod::Adm,
            ChannelType::Wns => ReportMethod::Wns,
            ChannelType::WebPush => ReportMethod::WebPush,
            ChannelType::Unknown => ReportMethod::Unknown,
        }
    }
}

impl std::fmt::Display for ReportMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportMethod::Gcm => write!(f, "gcm"),
            ReportMethod::Apn => write!(f, "apn"),
            ReportMethod::Adm => write!(f, "adm"),
            ReportMethod::Wns => write!(f, "wns"),
            ReportMethod::WebPush => write!(f, "webpush"),
            ReportMethod::Unknown => write!(f, "unknown"),
            ReportMethod::None => write!(f, "none"),
        }
    }
}

/// Delivery outcome for one recipient. `error` is `None` iff the
/// provider accepted the message for this recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientOutcome {
    #[serde(rename = "regId")]
    pub recipient: Recipient,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Provider-issued message handle, when one is reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Replacement registration id the provider asked us to use from
    /// now on (FCM canonical ids).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
}

impl RecipientOutcome {
    pub fn delivered(recipient: Recipient) -> Self {
        Self {
            recipient,
            error: None,
            message_id: None,
            canonical_id: None,
        }
    }

    pub fn failed(recipient: Recipient, error: impl Into<String>) -> Self {
        Self {
            recipient,
            error: Some(error.into()),
            message_id: None,
            canonical_id: None,
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.error.is_none()
    }
}

/// Normalized outcome of one channel invocation.
///
/// `success + failure == message.len()` always holds; `message` carries
/// exactly one [`RecipientOutcome`] per recipient the channel was asked
/// to deliver to, in no guaranteed order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelReport {
    pub method: ReportMethod,
    pub success: usize,
    pub failure: usize,
    pub message: Vec<RecipientOutcome>,
    /// Multicast batch ids reported by bulk providers (FCM), one per
    /// request chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multicast_ids: Option<Vec<i64>>,
}

impl ChannelReport {
    /// Report with no work recorded.
    pub fn empty(method: ReportMethod) -> Self {
        Self {
            method,
            success: 0,
            failure: 0,
            message: Vec::new(),
            multicast_ids: None,
        }
    }

    /// Builds a report by counting the given outcomes.
    pub fn from_outcomes(method: ReportMethod, outcomes: Vec<RecipientOutcome>) -> Self {
        let success = outcomes.iter().filter(|o| o.is_delivered()).count();
        let failure = outcomes.len() - success;
        Self {
            method,
            success,
            failure,
            message: outcomes,
            multicast_ids: None,
        }
    }

    /// Merges per-batch reports of one channel into a single report,
    /// summing counts and concatenating outcomes so batch boundaries
    /// are invisible to the caller.
    pub fn merge(method: ReportMethod, batches: Vec<ChannelReport>) -> Self {
        let mut merged = ChannelReport::empty(method);
        for batch in batches {
            merged.success += batch.success;
            merged.failure += batch.failure;
            merged.message.extend(batch.message);
            if let Some(ids) = batch.multicast_ids {
                merged.multicast_ids.get_or_insert_with(Vec::new).extend(ids);
            }
        }
        merged
    }
}
