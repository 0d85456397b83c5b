//! APNs adapter (HTTP/2 provider API, ES256 provider tokens).
//!
//! This is the one adapter holding persistent state: the HTTP/2 client
//! and a cached provider JWT. The dispatcher calls [`shutdown`] before
//! replacing it on reconfiguration.
//!
//! [`shutdown`]: crate::ChannelAdapter::shutdown

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Map, Value};
use std::sync::Mutex;

use pushgate_common::types::{ChannelType, Notification, Priority, Recipient};

use crate::error::{PushError, Result};
use crate::report::{ChannelReport, RecipientOutcome, ReportMethod};
use crate::settings::{ApnSettings, ApnToken};
use crate::utils::expiry_for;
use crate::ChannelAdapter;

const PRODUCTION_HOST: &str = "api.push.apple.com";
const SANDBOX_HOST: &str = "api.sandbox.push.apple.com";

/// Apple accepts provider tokens for an hour; refresh well before that.
const TOKEN_LIFETIME_SECS: i64 = 3000;

struct CachedToken {
    bearer: String,
    issued_at: i64,
}

pub struct ApnChannel {
    client: reqwest::Client,
    settings: ApnSettings,
    token_cache: Mutex<Option<CachedToken>>,
}

impl ApnChannel {
    pub fn new(settings: ApnSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            token_cache: Mutex::new(None),
        }
    }

    fn endpoint(&self, device: &str) -> String {
        let host = match &self.settings.address {
            Some(address) => address.as_str(),
            None if self.settings.production => PRODUCTION_HOST,
            None => SANDBOX_HOST,
        };
        let port = self.settings.port.unwrap_or(443);
        format!("https://{host}:{port}/3/device/{device}")
    }

    fn bearer_token(&self, token: &ApnToken) -> Result<String> {
        let now = Utc::now().timestamp();
        let mut cache = self.token_cache.lock().expect("APN token cache poisoned");
        if let Some(cached) = &*cache {
            if now - cached.issued_at < TOKEN_LIFETIME_SECS {
                return Ok(cached.bearer.clone());
            }
        }

        let key = EncodingKey::from_ec_pem(token.key.as_bytes())
            .map_err(|e| PushError::Auth(format!("invalid APN signing key: {e}")))?;
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(token.key_id.clone());
        let claims = json!({ "iss": token.team_id, "iat": now });
        let bearer = jsonwebtoken::encode(&header, &claims, &key)
            .map_err(|e| PushError::Auth(format!("failed to sign APN token: {e}")))?;

        *cache = Some(CachedToken {
            bearer: bearer.clone(),
            issued_at: now,
        });
        Ok(bearer)
    }

    async fn send_to_device(
        &self,
        recipient: &Recipient,
        bearer: &str,
        body: &Value,
        notification: &Notification,
    ) -> RecipientOutcome {
        let Some(device) = recipient.as_token() else {
            return RecipientOutcome::failed(
                recipient.clone(),
                "unsupported recipient for the apn channel",
            );
        };

        let mut request = self
            .client
            .post(self.endpoint(device))
            .bearer_auth(bearer)
            .header("apns-expiration", expiry_for(notification))
            .header("apns-priority", apns_priority(notification))
            .json(body);
        if let Some(topic) = &notification.topic {
            request = request.header("apns-topic", topic);
        }
        if let Some(collapse_id) = &notification.collapse_key {
            request = request.header("apns-collapse-id", collapse_id);
        }
        if let Some(push_type) = &notification.push_type {
            request = request.header("apns-push-type", push_type);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                let mut outcome = RecipientOutcome::delivered(recipient.clone());
                outcome.message_id = response
                    .headers()
                    .get("apns-id")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                outcome
            }
            Ok(response) => {
                let status = response.status();
                let reason = response
                    .json::<Value>()
                    .await
                    .ok()
                    .and_then(|body| {
                        body.get("reason")
                            .and_then(|r| r.as_str())
                            .map(str::to_string)
                    })
                    .unwrap_or_else(|| format!("HTTP {status}"));
                tracing::warn!(device = %device, reason = %reason, "APN rejected notification");
                RecipientOutcome::failed(recipient.clone(), reason)
            }
            Err(e) => {
                tracing::warn!(device = %device, error = %e, "APN request failed");
                RecipientOutcome::failed(recipient.clone(), e.to_string())
            }
        }
    }
}

#[async_trait]
impl ChannelAdapter for ApnChannel {
    async fn send(
        &self,
        recipients: &[Recipient],
        notification: &Notification,
    ) -> Result<ChannelReport> {
        let token = self.settings.token.as_ref().ok_or_else(|| {
            PushError::InvalidConfig("APN connection not configured properly".to_string())
        })?;
        let bearer = self.bearer_token(token)?;
        let body = build_payload(notification);

        let outcomes = join_all(
            recipients
                .iter()
                .map(|recipient| self.send_to_device(recipient, &bearer, &body, notification)),
        )
        .await;

        Ok(ChannelReport::from_outcomes(ReportMethod::Apn, outcomes))
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Apn
    }

    fn shutdown(&self) {
        // Drop the cached provider token; the HTTP/2 connection goes
        // away with the client when the adapter is dropped.
        self.token_cache
            .lock()
            .expect("APN token cache poisoned")
            .take();
    }
}

fn apns_priority(notification: &Notification) -> u32 {
    if notification.priority == Priority::Normal || notification.silent {
        5
    } else {
        10
    }
}

/// Builds the APNs request body: the `aps` dictionary plus custom data
/// merged at the top level.
pub(crate) fn build_payload(notification: &Notification) -> Value {
    // An MDM push carries only the command payload.
    if let Some(mdm) = &notification.mdm {
        return json!({ "mdm": mdm });
    }

    let mut aps = Map::new();
    if !notification.silent {
        if let Some(badge) = notification.badge {
            aps.insert("badge".to_string(), json!(badge));
        }
        if let Some(sound) = &notification.sound {
            aps.insert("sound".to_string(), Value::String(sound.clone()));
        }
        let alert = notification
            .alert
            .clone()
            .unwrap_or_else(|| default_alert(notification));
        aps.insert("alert".to_string(), alert);
    }
    if notification.silent || notification.content_available {
        aps.insert("content-available".to_string(), json!(1));
    }
    if let Some(category) = notification
        .category
        .as_ref()
        .or(notification.click_action.as_ref())
    {
        aps.insert("category".to_string(), Value::String(category.clone()));
    }
    if let Some(thread_id) = &notification.thread_id {
        aps.insert("thread-id".to_string(), Value::String(thread_id.clone()));
    }
    if let Some(url_args) = &notification.url_args {
        aps.insert("url-args".to_string(), json!(url_args));
    }
    if let Some(mutable_content) = notification.mutable_content {
        aps.insert("mutable-content".to_string(), json!(mutable_content));
    }

    let mut body = match &notification.custom {
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            let mut map = Map::new();
            map.insert("data".to_string(), other.clone());
            map
        }
        None => Map::new(),
    };
    body.insert("aps".to_string(), Value::Object(aps));
    Value::Object(body)
}

fn default_alert(notification: &Notification) -> Value {
    let mut alert = Map::new();
    alert.insert(
        "title".to_string(),
        Value::String(notification.title.clone()),
    );
    alert.insert("body".to_string(), Value::String(notification.body.clone()));
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            alert.insert(key.to_string(), value);
        }
    };
    put(
        "title-loc-key",
        notification.title_loc_key.clone().map(Value::String),
    );
    put("title-loc-args", notification.title_loc_args.clone());
    put("loc-key", notification.loc_key.clone().map(Value::String));
    // body_loc_args is honored when loc_args is absent.
    put(
        "loc-args",
        notification
            .loc_args
            .clone()
            .or_else(|| notification.body_loc_args.clone()),
    );
    put(
        "launch-image",
        notification.launch_image.clone().map(Value::String),
    );
    put("action", notification.action.clone().map(Value::String));
    Value::Object(alert)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_alert_is_assembled_from_title_and_body() {
        let mut n = Notification::new("Hi", "There");
        n.loc_key = Some("KEY".to_string());
        let payload = build_payload(&n);
        let alert = &payload["aps"]["alert"];
        assert_eq!(alert["title"], "Hi");
        assert_eq!(alert["body"], "There");
        assert_eq!(alert["loc-key"], "KEY");
    }

    #[test]
    fn explicit_alert_wins() {
        let mut n = Notification::new("Hi", "There");
        n.alert = Some(json!("just text"));
        let payload = build_payload(&n);
        assert_eq!(payload["aps"]["alert"], "just text");
    }

    #[test]
    fn silent_suppresses_alert_badge_and_sound() {
        let mut n = Notification::new("Hi", "There");
        n.silent = true;
        n.badge = Some(2);
        n.sound = Some("ping".to_string());
        let payload = build_payload(&n);
        let aps = payload["aps"].as_object().unwrap();
        assert!(!aps.contains_key("alert"));
        assert!(!aps.contains_key("badge"));
        assert!(!aps.contains_key("sound"));
        assert_eq!(aps["content-available"], json!(1));
        assert_eq!(apns_priority(&n), 5);
    }

    #[test]
    fn priority_translates_to_apns_levels() {
        let mut n = Notification::new("Hi", "There");
        assert_eq!(apns_priority(&n), 10);
        n.priority = Priority::Normal;
        assert_eq!(apns_priority(&n), 5);
    }

    #[test]
    fn custom_data_merges_beside_aps() {
        let mut n = Notification::new("Hi", "There");
        n.custom = Some(json!({ "conversation": 42 }));
        let payload = build_payload(&n);
        assert_eq!(payload["conversation"], json!(42));
        assert!(payload.get("aps").is_some());
    }

    #[test]
    fn mdm_replaces_the_whole_payload() {
        let mut n = Notification::new("Hi", "There");
        n.mdm = Some("magic-token".to_string());
        let payload = build_payload(&n);
        assert_eq!(payload, json!({ "mdm": "magic-token" }));
    }
}
