//! Web-push adapter (RFC 8030, VAPID, aes128gcm payload encryption).
//!
//! The payload is the JSON-serialized notification; browsers read it
//! back in the service worker's `push` event. Every delivery problem,
//! including a malformed subscription, folds into that subscription's
//! outcome.

use async_trait::async_trait;
use futures::future::join_all;
use web_push::{
    ContentEncoding, HyperWebPushClient, SubscriptionInfo, VapidSignatureBuilder, WebPushClient,
    WebPushMessageBuilder, URL_SAFE_NO_PAD,
};

use pushgate_common::types::{ChannelType, Notification, Recipient, WebPushSubscription};

use crate::error::Result;
use crate::report::{ChannelReport, RecipientOutcome, ReportMethod};
use crate::settings::WebPushSettings;
use crate::ChannelAdapter;

pub struct WebPushChannel {
    client: HyperWebPushClient,
    settings: WebPushSettings,
}

impl WebPushChannel {
    pub fn new(settings: WebPushSettings) -> Self {
        Self {
            client: HyperWebPushClient::new(),
            settings,
        }
    }

    async fn send_to_subscription(
        &self,
        recipient: &Recipient,
        subscription: &WebPushSubscription,
        payload: &str,
    ) -> RecipientOutcome {
        let Some(keys) = &subscription.keys else {
            return RecipientOutcome::failed(
                recipient.clone(),
                "subscription is missing encryption keys",
            );
        };
        let info = SubscriptionInfo::new(
            subscription.endpoint.clone(),
            keys.p256dh.clone(),
            keys.auth.clone(),
        );

        let vapid = &self.settings.vapid_details;
        let signature = match VapidSignatureBuilder::from_base64(
            &vapid.private_key,
            URL_SAFE_NO_PAD,
            &info,
        ) {
            Ok(mut builder) => {
                if !vapid.subject.is_empty() {
                    builder.add_claim("sub", vapid.subject.as_str());
                }
                builder.build()
            }
            Err(e) => Err(e),
        };
        let signature = match signature {
            Ok(signature) => signature,
            Err(e) => {
                tracing::warn!(endpoint = %subscription.endpoint, error = %e, "VAPID signing failed");
                return RecipientOutcome::failed(recipient.clone(), e.to_string());
            }
        };

        let mut builder = WebPushMessageBuilder::new(&info);
        builder.set_payload(ContentEncoding::Aes128Gcm, payload.as_bytes());
        builder.set_vapid_signature(signature);
        if let Some(ttl) = self.settings.ttl {
            builder.set_ttl(ttl);
        }

        let message = match builder.build() {
            Ok(message) => message,
            Err(e) => {
                return RecipientOutcome::failed(recipient.clone(), e.to_string());
            }
        };

        match self.client.send(message).await {
            Ok(()) => RecipientOutcome::delivered(recipient.clone()),
            Err(e) => {
                tracing::warn!(endpoint = %subscription.endpoint, error = %e, "Web push failed");
                RecipientOutcome::failed(recipient.clone(), e.to_string())
            }
        }
    }

    async fn send_one(&self, recipient: &Recipient, payload: &str) -> RecipientOutcome {
        match recipient {
            Recipient::Subscription(subscription) => {
                self.send_to_subscription(recipient, subscription, payload)
                    .await
            }
            // A bare token may still be a JSON-encoded subscription.
            Recipient::Token(token) => match serde_json::from_str::<WebPushSubscription>(token) {
                Ok(subscription) => {
                    self.send_to_subscription(recipient, &subscription, payload)
                        .await
                }
                Err(_) => RecipientOutcome::failed(
                    recipient.clone(),
                    "unsupported recipient for the webpush channel",
                ),
            },
        }
    }
}

#[async_trait]
impl ChannelAdapter for WebPushChannel {
    async fn send(
        &self,
        recipients: &[Recipient],
        notification: &Notification,
    ) -> Result<ChannelReport> {
        let payload = serde_json::to_string(notification)?;

        let outcomes = join_all(
            recipients
                .iter()
                .map(|recipient| self.send_one(recipient, &payload)),
        )
        .await;

        Ok(ChannelReport::from_outcomes(ReportMethod::WebPush, outcomes))
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::WebPush
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_with_camel_case_wire_names() {
        let mut n = Notification::new("Hi", "There");
        n.click_action = Some("open".to_string());
        n.time_to_live = Some(60);
        let payload = serde_json::to_string(&n).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed["title"], "Hi");
        assert_eq!(parsed["clickAction"], "open");
        assert_eq!(parsed["timeToLive"], 60);
        // The service worker sees exactly what the caller provided.
        assert!(parsed.get("time_to_live").is_none());
    }
}
