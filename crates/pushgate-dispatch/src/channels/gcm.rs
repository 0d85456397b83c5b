//! FCM/GCM adapter (legacy HTTP multicast API).
//!
//! Tokens are sent in chunks of up to 1000 `registration_ids` per
//! request; chunk reports are merged so batching is invisible to the
//! caller. When the payload names topic `recipients`, a single
//! topic/condition request replaces the token list.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use pushgate_common::types::{ChannelType, Notification, Recipient};

use crate::error::{PushError, Result};
use crate::report::{ChannelReport, RecipientOutcome, ReportMethod};
use crate::settings::GcmSettings;
use crate::utils::{time_to_live_for, truncate_string, MAX_LOG_BODY};
use crate::ChannelAdapter;

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/fcm/send";

/// Provider cap on recipients per multicast request.
const CHUNK_SIZE: usize = 1000;

pub struct GcmChannel {
    client: reqwest::Client,
    settings: GcmSettings,
}

impl GcmChannel {
    pub fn new(settings: GcmSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    async fn send_chunk(
        &self,
        api_key: &str,
        target_field: &str,
        target: Value,
        chunk: &[Recipient],
        message: &Map<String, Value>,
    ) -> ChannelReport {
        let mut body = message.clone();
        body.insert(target_field.to_string(), target);

        let response = self
            .client
            .post(FCM_SEND_URL)
            .header("Authorization", format!("key={api_key}"))
            .json(&Value::Object(body))
            .send()
            .await;

        let response = match response {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(error = %e, "FCM request failed");
                return all_failed(chunk, &e.to_string());
            }
        };

        let status = response.status();
        let body_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            tracing::warn!(
                status = %status,
                body = %truncate_string(&body_text, MAX_LOG_BODY),
                "FCM returned non-success status"
            );
            return all_failed(chunk, &format!("HTTP {status}: {body_text}"));
        }

        let parsed: Value = match serde_json::from_str(&body_text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to parse FCM response");
                return all_failed(chunk, &format!("invalid FCM response: {e}"));
            }
        };

        let mut report = match parsed.get("results").and_then(|r| r.as_array()) {
            Some(results) => {
                let outcomes = chunk
                    .iter()
                    .enumerate()
                    .map(|(index, recipient)| per_token_outcome(recipient, results.get(index)))
                    .collect();
                ChannelReport::from_outcomes(ReportMethod::Gcm, outcomes)
            }
            // A response with no per-token results gives us nothing to
            // attribute; every requested id is reported failed.
            None => all_failed(chunk, "unknown"),
        };

        if let Some(multicast_id) = parsed.get("multicast_id").and_then(|v| v.as_i64()) {
            report.multicast_ids = Some(vec![multicast_id]);
        }
        report
    }
}

#[async_trait]
impl ChannelAdapter for GcmChannel {
    async fn send(
        &self,
        recipients: &[Recipient],
        notification: &Notification,
    ) -> Result<ChannelReport> {
        let api_key = self
            .settings
            .api_key
            .as_deref()
            .ok_or_else(|| PushError::InvalidConfig("missing FCM server api key".to_string()))?;

        let message = build_message(notification, self.settings.phonegap);

        let mut batches = Vec::new();
        if let Some((field, target)) = topic_target(notification) {
            // Topic/condition send: the single target stands in for the
            // whole token list.
            let stand_in = [Recipient::Token(target.clone())];
            batches.push(
                self.send_chunk(api_key, field, Value::String(target), &stand_in, &message)
                    .await,
            );
        } else {
            for chunk in recipients.chunks(CHUNK_SIZE) {
                let tokens: Vec<Value> = chunk
                    .iter()
                    .map(|r| Value::String(r.to_string()))
                    .collect();
                batches.push(
                    self.send_chunk(api_key, "registration_ids", Value::Array(tokens), chunk, &message)
                        .await,
                );
            }
        }

        Ok(ChannelReport::merge(ReportMethod::Gcm, batches))
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Gcm
    }
}

fn all_failed(chunk: &[Recipient], error: &str) -> ChannelReport {
    let outcomes = chunk
        .iter()
        .map(|recipient| RecipientOutcome::failed(recipient.clone(), error))
        .collect();
    ChannelReport::from_outcomes(ReportMethod::Gcm, outcomes)
}

fn per_token_outcome(recipient: &Recipient, result: Option<&Value>) -> RecipientOutcome {
    let Some(result) = result else {
        // Response shorter than the request: nothing attributable.
        return RecipientOutcome::failed(recipient.clone(), "unknown");
    };
    let mut outcome = match result.get("error").and_then(|e| e.as_str()) {
        Some(error) => RecipientOutcome::failed(recipient.clone(), error),
        None => RecipientOutcome::delivered(recipient.clone()),
    };
    outcome.message_id = result
        .get("message_id")
        .and_then(|m| m.as_str())
        .map(str::to_string);
    outcome.canonical_id = result
        .get("registration_id")
        .and_then(|m| m.as_str())
        .map(str::to_string);
    outcome
}

fn topic_target(notification: &Notification) -> Option<(&'static str, String)> {
    let recipients = notification.recipients.as_ref()?;
    if let Some(to) = &recipients.to {
        return Some(("to", to.clone()));
    }
    recipients
        .condition
        .as_ref()
        .map(|condition| ("condition", condition.clone()))
}

/// Builds the request body minus the target field.
pub(crate) fn build_message(notification: &Notification, phonegap: bool) -> Map<String, Value> {
    let mut notification_block = Map::new();
    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            notification_block.insert(key.to_string(), value);
        }
    };
    put("title", Some(Value::String(notification.title.clone())));
    put("body", Some(Value::String(notification.body.clone())));
    put("icon", notification.icon.clone().map(Value::String));
    put("image", notification.image.clone().map(Value::String));
    put("picture", notification.picture.clone().map(Value::String));
    put("style", notification.style.clone().map(Value::String));
    put("sound", notification.sound.clone().map(Value::String));
    put("badge", notification.badge.map(|b| json!(b)));
    put("tag", notification.tag.clone().map(Value::String));
    put("color", notification.color.clone().map(Value::String));
    put(
        "click_action",
        notification
            .click_action
            .clone()
            .or_else(|| notification.category.clone())
            .map(Value::String),
    );
    put("body_loc_key", notification.loc_key.clone().map(Value::String));
    put("body_loc_args", notification.loc_args.clone());
    put(
        "title_loc_key",
        notification.title_loc_key.clone().map(Value::String),
    );
    put("title_loc_args", notification.title_loc_args.clone());
    put(
        "android_channel_id",
        notification.android_channel_id.clone().map(Value::String),
    );
    put(
        "notification_count",
        notification
            .notification_count
            .or(notification.badge)
            .map(|c| json!(c)),
    );

    let mut custom = match &notification.custom {
        Some(Value::String(message)) => {
            let mut map = Map::new();
            map.insert("message".to_string(), Value::String(message.clone()));
            map
        }
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    custom
        .entry("title".to_string())
        .or_insert_with(|| Value::String(notification.title.clone()));
    custom
        .entry("message".to_string())
        .or_insert_with(|| Value::String(notification.body.clone()));
    if let Some(sound) = &notification.sound {
        custom
            .entry("sound".to_string())
            .or_insert_with(|| Value::String(sound.clone()));
    }
    if let Some(icon) = &notification.icon {
        custom
            .entry("icon".to_string())
            .or_insert_with(|| Value::String(icon.clone()));
    }
    if let Some(badge) = notification.badge {
        custom.entry("msgcnt".to_string()).or_insert_with(|| json!(badge));
    }
    if phonegap && notification.content_available {
        custom.insert("content-available".to_string(), json!(1));
    }

    let mut message = Map::new();
    if let Some(collapse_key) = &notification.collapse_key {
        message.insert(
            "collapse_key".to_string(),
            Value::String(collapse_key.clone()),
        );
    }
    message.insert(
        "priority".to_string(),
        Value::String(notification.priority.to_string()),
    );
    message.insert(
        "content_available".to_string(),
        Value::Bool(notification.silent || notification.content_available),
    );
    message.insert(
        "delay_while_idle".to_string(),
        Value::Bool(notification.delay_while_idle),
    );
    message.insert(
        "time_to_live".to_string(),
        json!(time_to_live_for(notification)),
    );
    if let Some(package) = &notification.restricted_package_name {
        message.insert(
            "restricted_package_name".to_string(),
            Value::String(package.clone()),
        );
    }
    message.insert("dry_run".to_string(), Value::Bool(notification.dry_run));

    if phonegap {
        // PhoneGap clients read everything from the data block.
        let mut merged = custom;
        merged.extend(notification_block);
        message.insert("data".to_string(), Value::Object(merged));
    } else {
        message.insert("data".to_string(), Value::Object(custom));
        if !notification.silent {
            message.insert("notification".to_string(), Value::Object(notification_block));
        }
    }
    message
}
