//! Windows Notification Service adapter.
//!
//! The registration id IS the notification channel URI handed out by
//! Windows. One OAuth access token is shared across the recipient
//! loop; a 401 triggers a single refresh and the refreshed token is
//! reused for the rest of the batch.

use async_trait::async_trait;
use serde_json::Value;

use pushgate_common::types::{ChannelType, Notification, Recipient};

use crate::error::{PushError, Result};
use crate::report::{ChannelReport, RecipientOutcome, ReportMethod};
use crate::settings::{WnsNotificationType, WnsSettings};
use crate::utils::{truncate_string, MAX_LOG_BODY};
use crate::ChannelAdapter;

const TOKEN_URL: &str = "https://login.live.com/accesstoken.srf";

pub struct WnsChannel {
    client: reqwest::Client,
    settings: WnsSettings,
}

impl WnsChannel {
    pub fn new(settings: WnsSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }

    async fn fetch_access_token(&self) -> Result<String> {
        let (client_id, client_secret) =
            match (&self.settings.client_id, &self.settings.client_secret) {
                (Some(id), Some(secret)) => (id.as_str(), secret.as_str()),
                _ => {
                    return Err(PushError::InvalidConfig(
                        "missing WNS client_id/client_secret".to_string(),
                    ))
                }
            };

        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("scope", "notify.windows.com"),
            ])
            .send()
            .await
            .map_err(|e| PushError::Auth(format!("WNS token request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PushError::Auth(format!("invalid WNS token response: {e}")))?;
        if !status.is_success() {
            return Err(PushError::Auth(format!(
                "WNS token request returned HTTP {status}: {body}"
            )));
        }
        body.get("access_token")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| PushError::Auth("WNS token response without access_token".to_string()))
    }

    async fn post_notification(
        &self,
        channel_uri: &str,
        access_token: &str,
        payload: &str,
        notification: &Notification,
    ) -> std::result::Result<(), (u16, String)> {
        let content_type = match self.settings.notification_type {
            WnsNotificationType::Raw => "application/octet-stream",
            _ => "text/xml",
        };

        let mut request = self
            .client
            .post(channel_uri)
            .bearer_auth(access_token)
            .header("Content-Type", content_type)
            .header("X-WNS-Type", self.settings.notification_type.header_value())
            .body(payload.to_string());
        if let Some(headers) = &self.settings.headers {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }
        if let Some(headers) = &notification.headers {
            for (name, value) in headers {
                request = request.header(name, value);
            }
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                Err((status, truncate_string(&body, MAX_LOG_BODY)))
            }
            Err(e) => Err((0, e.to_string())),
        }
    }
}

#[async_trait]
impl ChannelAdapter for WnsChannel {
    async fn send(
        &self,
        recipients: &[Recipient],
        notification: &Notification,
    ) -> Result<ChannelReport> {
        let payload = match self.settings.notification_type {
            WnsNotificationType::Raw => serde_json::to_string(notification)?,
            _ => build_toast_xml(notification),
        };

        let mut access_token = match &self.settings.access_token {
            Some(token) => token.clone(),
            None => self.fetch_access_token().await?,
        };
        let mut refreshed = false;

        let mut outcomes = Vec::with_capacity(recipients.len());
        for recipient in recipients {
            let Some(channel_uri) = recipient.as_token() else {
                outcomes.push(RecipientOutcome::failed(
                    recipient.clone(),
                    "unsupported recipient for the wns channel",
                ));
                continue;
            };

            let mut result = self
                .post_notification(channel_uri, &access_token, &payload, notification)
                .await;

            // An expired pre-provisioned token earns one refresh; the
            // new token serves the rest of the batch.
            if matches!(result, Err((401, _))) && !refreshed {
                refreshed = true;
                match self.fetch_access_token().await {
                    Ok(token) => {
                        access_token = token;
                        result = self
                            .post_notification(channel_uri, &access_token, &payload, notification)
                            .await;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "WNS token refresh failed");
                    }
                }
            }

            match result {
                Ok(()) => outcomes.push(RecipientOutcome::delivered(recipient.clone())),
                Err((status, body)) => {
                    tracing::warn!(
                        channel_uri = %channel_uri,
                        status,
                        "WNS notification failed"
                    );
                    let reason = if status == 0 {
                        body
                    } else {
                        format!("HTTP {status}: {body}")
                    };
                    outcomes.push(RecipientOutcome::failed(recipient.clone(), reason));
                }
            }
        }

        Ok(ChannelReport::from_outcomes(ReportMethod::Wns, outcomes))
    }

    fn channel_type(&self) -> ChannelType {
        ChannelType::Wns
    }
}

/// Builds the two-line toast template from title and body.
pub(crate) fn build_toast_xml(notification: &Notification) -> String {
    let mut toast_attrs = String::new();
    if let Some(launch) = &notification.launch {
        toast_attrs.push_str(&format!(" launch=\"{}\"", escape_xml(launch)));
    }
    if let Some(duration) = &notification.duration {
        toast_attrs.push_str(&format!(" duration=\"{}\"", escape_xml(duration)));
    }
    format!(
        "<toast{attrs}><visual><binding template=\"ToastText02\">\
         <text id=\"1\">{title}</text><text id=\"2\">{body}</text>\
         </binding></visual></toast>",
        attrs = toast_attrs,
        title = escape_xml(&notification.title),
        body = escape_xml(&notification.body),
    )
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toast_contains_escaped_title_and_body() {
        let n = Notification::new("A & B", "x < y");
        let xml = build_toast_xml(&n);
        assert!(xml.contains("<text id=\"1\">A &amp; B</text>"));
        assert!(xml.contains("<text id=\"2\">x &lt; y</text>"));
    }

    #[test]
    fn launch_and_duration_become_toast_attributes() {
        let mut n = Notification::new("Hi", "There");
        n.launch = Some("args".to_string());
        n.duration = Some("long".to_string());
        let xml = build_toast_xml(&n);
        assert!(xml.starts_with("<toast launch=\"args\" duration=\"long\">"));
    }

    #[test]
    fn escape_covers_all_reserved_characters() {
        assert_eq!(escape_xml(r#"<&>"'"#), "&lt;&amp;&gt;&quot;&apos;");
    }
}
