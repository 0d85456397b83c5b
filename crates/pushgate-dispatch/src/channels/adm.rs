//! Amazon Device Messaging adapter.
//!
//! Auth is an OAuth2 client-credentials token with the
//! `messaging:push` scope, cached until shortly before it expires.
//! Messages go out one POST per registration id; ADM requires every
//! data value to be a string, so non-string values are JSON-encoded.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use pushgate_common::types::{ChannelType, Notification, Recipient};

use crate::error::{PushError, Result};
use crate::report::{ChannelReport, RecipientOutcome, ReportMethod};
use crate::settings::AdmSettings;
use crate::utils::DEFAULT_TTL;
use crate::ChannelAdapter;

const TOKEN_URL: &str = "https://api.amazon.com/auth/O2/token";
const MESSAGE_URL_BASE: &str = "https://api.amazon.com/messaging/registrations";

struct CachedAccessToken {
    token: String,
    expires_at: i64,
}

pub struct AdmChannel {
    client: reqwest::Client,
    settings: AdmSettings,
    token_cache: Mutex<Option<CachedAccessToken>>,
}

impl AdmChannel {
    pub fn new(settings: AdmSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
            token_cache: Mutex::new(None),
        }
    }

    async fn access_token(&self, client_id: &str, client_secret: &str) -> Result<String> {
        let mut cache = self.token_cache.lock().await;
        let now = Utc::now().timestamp();
        if let Some(cached) = &*cache {
            if cached.expires_at > now + 60 {
                return Ok(cached.token.clone());
            }
        }

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "client_credentials"),
                ("scope", "messaging:push"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ])
            .send()
            .await
            .map_err(|e| PushError::Auth(format!("ADM token request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PushError::Auth(format!("invalid ADM token response: {e}")))?;
        if !status.is_success() {
            return Err(PushError::Auth(format!(
                "ADM token request returned HTTP {status}: {body}"
            )));
        }
        let token = body
            .get("access_token")
            .and_then(|t| t.as_str())
            .ok_or_else(|| PushError::Auth("ADM token response without access_token".to_string()))?
            .to_string();
        let expires_in = body.get("expires_in").and_then(|e| e.as_i64()).unwrap_or(0);

        *cache = Some(CachedAccessToken {
            token: token.clone(),
            expires_at: now + expires_in,
        });
        Ok(token)
    }

    async fn send_to_registration(
        &self,
        recipient: &Recipient,
        token: &str,
        body: &Value,
    ) -> RecipientOutcome {
        let Some(registration_id) = recipient.as_token() else {
            return RecipientOutcome::failed(
                recipient.clone(),
                "unsupported recipient for the adm channel",
            );
        };

        let url = format!("{MESSAGE_URL_BASE}/{registration_id}/messages");
        match self
            .client
            .post(&url)
            .bearer_auth(token)
            .header("X-Amzn-Type-Version", "com.amazon.device.messaging.ADMMessage@1.0")
            .header("X-Amzn-Accept-Type", "com.amazon.device.messaging.ADMSendResult@1.0")
            .json(body)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                let parsed: Value = response.json().await.unwrap_or(Value::Null);
                if status.is_success() {
                    let mut outcome = RecipientOutcome::delivered(recipient.clone());
                    // ADM may hand back a replacement registration id.
                    outcome.canonical_id = parsed
                        .get("registrationID")
                        .and_then(|r| r.as_str())
                        .filter(|new_id| *new_id != registration_id)
                        .map(str::to_string);
                    outcome
                } else {
                    let reason = parsed
                        .get("reason")
                        .and_then(|r| r.as_str())
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("HTTP {status}"));
                    tracing::warn!(registration_id = %registration_id, reason = %reason, "ADM rejected message");
                    RecipientOutcome::failed(recipient.clone(), reason)
                }
            }
            Err(e) => {
                tracing::warn!(registration_id = %registration_id, error = %e, "ADM request failed");
                RecipientOutcome::failed(recipient.clone(), e.to_string())
            }
        }
    }
}

#[async_trait]
impl ChannelAdapter for AdmChannel {
    async fn send(
        &self,
        recipients: &[Recipient],
        notification: &Notification,
    ) -> Result<ChannelReport> {
        let (client_id, client_secret) =
            match (&self.settings.client_id, &self.settings.client_secret) {
                (Some(id), Some(secret)) => (id.as_str(), secret.as_str()),
                _ => {
                    return Err(PushError::InvalidConfig(
                        "missing ADM client_id/client_secret".to_string(),
                    ))
                }
            };

        let body = build_message(notification);

        // An auth failure affects the whole batch: report every
        // recipient failed rather than aborting sibling channels.
        let token = match self.access_token(client_id, client_secret).await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, "ADM access token unavailable");
                let reason = e.to_string();
                let outcomes = recipients
                    .iter()
                    .map(|r| RecipientOutcome::failed(r.clone(), reason.clone()))
                    .collect();
                return Ok(ChannelReport::from_outcomes(ReportMethod::Adm, outcomes));
            }
        };

        let mut outcomes = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            outcomes.push(self.send_to_registration(recipient, &token, &body).await);
        }

        Ok(ChannelReport::from_outcomes(ReportMethod::Adm, outcomes))
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Adm
    }
}

/// Builds the ADM request body. Every data value must be a string on
/// the ADM wire, so non-string values are JSON-encoded in place.
pub(crate) fn build_message(notification: &Notification) -> Value {
    let mut data = match serde_json::to_value(notification) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for lifted in ["consolidationKey", "expiry", "timeToLive", "custom", "recipients"] {
        data.remove(lifted);
    }
    if let Some(Value::Object(custom)) = &notification.custom {
        data.extend(custom.clone());
    }
    let data: Map<String, Value> = data
        .into_iter()
        .map(|(key, value)| match value {
            Value::String(s) => (key, Value::String(s)),
            other => (key, Value::String(other.to_string())),
        })
        .collect();

    let mut message = Map::new();
    message.insert("data".to_string(), Value::Object(data));
    if let Some(consolidation_key) = &notification.consolidation_key {
        message.insert(
            "consolidationKey".to_string(),
            Value::String(consolidation_key.clone()),
        );
    }
    if let Some(expires_after) = expires_after(notification) {
        message.insert("expiresAfter".to_string(), json!(expires_after));
    }
    Value::Object(message)
}

// Lifetime is only attached when an absolute expiry was requested;
// a zero remaining lifetime falls back to time_to_live, then to the
// default.
fn expires_after(notification: &Notification) -> Option<i64> {
    let expiry = notification.expiry?;
    let remaining = expiry - Utc::now().timestamp();
    if remaining != 0 {
        Some(remaining)
    } else {
        Some(notification.time_to_live.unwrap_or(DEFAULT_TTL))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_values_are_stringified() {
        let mut n = Notification::new("Hi", "There");
        n.badge = Some(7);
        n.custom = Some(json!({ "count": 3, "label": "x" }));
        let message = build_message(&n);
        let data = message["data"].as_object().unwrap();
        assert_eq!(data["title"], "Hi");
        assert_eq!(data["badge"], "7");
        assert_eq!(data["count"], "3");
        assert_eq!(data["label"], "x");
        // Lifted fields never ride along in data.
        assert!(!data.contains_key("custom"));
    }

    #[test]
    fn consolidation_key_is_lifted_out_of_data() {
        let mut n = Notification::new("Hi", "There");
        n.consolidation_key = Some("sync".to_string());
        let message = build_message(&n);
        assert_eq!(message["consolidationKey"], "sync");
        assert!(!message["data"].as_object().unwrap().contains_key("consolidationKey"));
    }

    #[test]
    fn expires_after_requires_an_absolute_expiry() {
        let mut n = Notification::new("Hi", "There");
        n.time_to_live = Some(600);
        assert_eq!(expires_after(&n), None);

        n.expiry = Some(Utc::now().timestamp() + 120);
        let remaining = expires_after(&n).unwrap();
        assert!(remaining > 0 && remaining <= 120);
    }
}
