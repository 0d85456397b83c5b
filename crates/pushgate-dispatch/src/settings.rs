use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// FCM/GCM channel settings (legacy HTTP API).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcmSettings {
    /// Server API key.
    pub api_key: Option<String>,
    /// PhoneGap/Cordova compatibility mode: notification fields are
    /// merged into the data block.
    pub phonegap: bool,
}

/// APNs provider-token credentials (`.p8` signing key contents).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApnToken {
    /// PEM-encoded ES256 private key.
    pub key: String,
    pub key_id: String,
    pub team_id: String,
}

/// APNs channel settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApnSettings {
    pub token: Option<ApnToken>,
    /// `api.push.apple.com` when true, the sandbox host otherwise.
    pub production: bool,
    /// Host override; wins over `production` when set.
    pub address: Option<String>,
    pub port: Option<u16>,
}

/// Amazon Device Messaging channel settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

/// WNS notification kind, selecting the `X-WNS-Type` header and the
/// payload encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WnsNotificationType {
    #[default]
    Toast,
    Tile,
    Badge,
    Raw,
}

impl WnsNotificationType {
    pub fn header_value(&self) -> &'static str {
        match self {
            WnsNotificationType::Toast => "wns/toast",
            WnsNotificationType::Tile => "wns/tile",
            WnsNotificationType::Badge => "wns/badge",
            WnsNotificationType::Raw => "wns/raw",
        }
    }
}

/// Windows Notification Service channel settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WnsSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    /// Pre-fetched OAuth access token; refreshed once on 401 and the
    /// refreshed token is reused for the rest of the batch.
    pub access_token: Option<String>,
    pub notification_type: WnsNotificationType,
    /// Extra request headers applied to every WNS post.
    pub headers: Option<HashMap<String, String>>,
}

/// VAPID key pair identifying the web-push application server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VapidDetails {
    /// `mailto:` address or URL.
    pub subject: String,
    /// URL-safe base64 public key.
    pub public_key: String,
    /// URL-safe base64 private key.
    pub private_key: String,
}

/// Web-push channel settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebPushSettings {
    pub vapid_details: VapidDetails,
    /// TTL in seconds for the push service to retain the message.
    pub ttl: Option<u32>,
}

/// Dispatcher-wide settings: one optional config per channel plus
/// global routing flags.
///
/// Replaced wholesale by [`crate::PushDispatcher::set_options`]; a
/// channel with `None` here is not configured and any id routed to it
/// fails the dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gcm: Option<GcmSettings>,
    pub apn: Option<ApnSettings>,
    pub adm: Option<AdmSettings>,
    pub wns: Option<WnsSettings>,
    pub web: Option<WebPushSettings>,
    /// Route every bare-string and `Device` id to the FCM channel,
    /// bypassing the shape heuristics. Subscription objects still go to
    /// web push.
    pub always_use_fcm: bool,
}
