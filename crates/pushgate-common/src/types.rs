use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Delivery channel for one registration id.
///
/// # Examples
///
/// ```
/// use pushgate_common::types::ChannelType;
///
/// let channel: ChannelType = "webpush".parse().unwrap();
/// assert_eq!(channel, ChannelType::WebPush);
/// assert_eq!(ChannelType::Gcm.to_string(), "gcm");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Gcm,
    Apn,
    Adm,
    Wns,
    WebPush,
    Unknown,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelType::Gcm => write!(f, "gcm"),
            ChannelType::Apn => write!(f, "apn"),
            ChannelType::Adm => write!(f, "adm"),
            ChannelType::Wns => write!(f, "wns"),
            ChannelType::WebPush => write!(f, "webpush"),
            ChannelType::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gcm" | "fcm" => Ok(ChannelType::Gcm),
            "apn" | "apns" => Ok(ChannelType::Apn),
            "adm" => Ok(ChannelType::Adm),
            "wns" => Ok(ChannelType::Wns),
            "webpush" | "web" => Ok(ChannelType::WebPush),
            "unknown" => Ok(ChannelType::Unknown),
            _ => Err(format!("unknown channel type: {s}")),
        }
    }
}

/// Message priority, translated per channel (FCM `high`/`normal`,
/// APNs 10/5).
///
/// # Examples
///
/// ```
/// use pushgate_common::types::Priority;
///
/// let p: Priority = "normal".parse().unwrap();
/// assert_eq!(p, Priority::Normal);
/// assert_eq!(Priority::default(), Priority::High);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Normal,
    #[default]
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            _ => Err(format!("unknown priority: {s}")),
        }
    }
}

/// Browser push subscription as handed out by the Push API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebPushSubscription {
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<SubscriptionKeys>,
}

/// Client encryption keys of a [`WebPushSubscription`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// One recipient identifier as accepted by the dispatcher.
///
/// Bare tokens are classified by shape; the structured forms are
/// authoritative about their channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegId {
    /// Explicit id plus channel. Apple does not guarantee token lengths,
    /// so callers that know the platform should prefer this form.
    Device {
        id: String,
        #[serde(rename = "type")]
        channel: ChannelType,
    },
    /// Push-subscription object, implicitly the web-push channel.
    Subscription(WebPushSubscription),
    /// Opaque token; the channel is inferred from its shape.
    Token(String),
}

impl From<&str> for RegId {
    fn from(token: &str) -> Self {
        RegId::Token(token.to_string())
    }
}

impl From<String> for RegId {
    fn from(token: String) -> Self {
        RegId::Token(token)
    }
}

impl From<WebPushSubscription> for RegId {
    fn from(subscription: WebPushSubscription) -> Self {
        RegId::Subscription(subscription)
    }
}

/// Normalized identifier handed to a channel adapter after
/// classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Recipient {
    Subscription(WebPushSubscription),
    Token(String),
}

impl Recipient {
    /// The bare token, when this recipient is one.
    pub fn as_token(&self) -> Option<&str> {
        match self {
            Recipient::Token(token) => Some(token),
            Recipient::Subscription(_) => None,
        }
    }
}

impl std::fmt::Display for Recipient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Recipient::Token(token) => write!(f, "{token}"),
            Recipient::Subscription(sub) => write!(f, "{}", sub.endpoint),
        }
    }
}

/// FCM topic or condition target, used instead of registration tokens
/// when present on the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRecipients {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// One logical notification, shared across every channel of a send.
///
/// Each adapter projects this into its provider's wire format; the
/// dispatcher never mutates it. Field names serialize with the
/// camelCase spellings the JSON payload format uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Arbitrary custom data; a bare string becomes `{"message": ...}`
    /// on channels that need a map.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
    pub priority: Priority,
    /// No alert/badge/sound on the device; data-only delivery.
    pub silent: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collapse_key: Option<String>,
    pub content_available: bool,
    pub delay_while_idle: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restricted_package_name: Option<String>,
    pub dry_run: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loc_args: Option<Value>,
    /// Kept for backward compatibility; `loc_args` wins when both are set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_loc_args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_loc_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title_loc_args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android_channel_id: Option<String>,
    /// Android notification count; falls back to `badge`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notification_count: Option<u32>,
    /// Topic/condition send for FCM, replacing the token list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<TopicRecipients>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    /// APNs alert override; takes precedence over title and body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mdm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url_args: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mutable_content: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_type: Option<String>,
    /// Absolute expiry in epoch seconds; wins over `time_to_live`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    /// Relative lifetime in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_live: Option<i64>,
    /// ADM consolidation key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consolidation_key: Option<String>,
    /// Extra WNS request headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    /// WNS toast launch argument.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch: Option<String>,
    /// WNS toast duration (`long`/`short`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
}

impl Notification {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            ..Self::default()
        }
    }
}
