use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use pushgate_common::types::{
    ChannelType, Notification, Recipient, RegId, SubscriptionKeys, WebPushSubscription,
};

use crate::dispatcher::UNKNOWN_REG_ID_ERROR;
use crate::error::{PushError, Result};
use crate::report::{ChannelReport, RecipientOutcome, ReportMethod};
use crate::settings::{GcmSettings, Settings};
use crate::{ChannelAdapter, PushDispatcher};

// ── Fixtures (realistic provider token shapes) ──

const ANDROID_REG_ID: &str = "APA91bFQCD9Ndd8uVggMhj1usfeWsKIfGyBUWMprpZLGciWrMjS-77bIY24IMQNeEHzjidCcddnDxqYo-UEV03xw6ySmtIgQyzTqhSxhPGAi1maf6KDMAQGuUWc6L5Khze8YK9YrL9I_WD1gl49P3f_9hr08ZAS5Tw";
const ANDROID_WITH_ADM_SUBSTRING: &str = "APA9admQCD9Ndd8uVggMhj1usfeWsKIfGyBUWMprpZLGciWrMjS-77bIY24IMQNeEHzjidCcddnDxqYo-UEV03xw6ySmtIgQyzTqhSxhPGAi1maf6KDMAQGuUWc6L5Khze8YK9YrL9I_WD1gl49P3f_9hr08ZAS5Tw";
const ANDROID_WITH_AMZN_SUBSTRING: &str = "amzn1mQCD9Ndd8uVggMhj1usfeWsKIfGyBUWMprpZLGciWrMjS-77bIY24IMQNeEHzjidCcddnDxqYo-UEV03xw6ySmtIgQyzTqhSxhPGAi1maf6KDMAQGuUWc6L5Khze8YK9YrL9I_WD1gl49P3f_9hr08ZAS5Tw";
const IOS_REG_ID: &str = "43e798c31a282d129a34d84472bbdd7632562ff0732b58a85a27c5d9fdf59b69";
const IOS_REG_ID_LONG: &str = "80C2D3913EE662DD25C5A3B7FCC8CBBADCA9DA429D13F106F37BF8EA268AFC610824D1B378D6E5FAFA86C63A63FDADA7A9067E1B0BC461E4020346199000D26418F38E73E32174D69F69DC35BEA27CE5";
const WINDOWS_PHONE_REG_ID: &str = "https://db5.notify.windows.com/?token=AwYAAAD8sfbDrL9h7mN%2bmwlkSkQZCIfv4QKeu1hYRipj2zNvXaMi9ZAax%2f6CDfysyHp61STCO1pCFPt%2b9L4Jod72JhIcjDr8b2GxuUOBMTP%2b6%2bqxEfSB9iZfSATdZbdF7cJHSRA%3d";
const AMAZON_REG_ID: &str = "amzn1.adm-registration.v2.Y29tLmFtYXpvbi5EZXZpY2VNZXNzYWdpbmcuUmVnaXN0cmF0aW9uSWRFbmNyeXB0aW9uS2V5";
const UNKNOWN_REG_ID: &str = "abcdef";

fn web_subscription() -> WebPushSubscription {
    WebPushSubscription {
        endpoint: "https://push.subscription.url".to_string(),
        expiration_time: None,
        keys: Some(SubscriptionKeys {
            p256dh: "userPublicEncryptionKey".to_string(),
            auth: "userAuthSecret".to_string(),
        }),
    }
}

// ── Mock adapter: records batches, optionally fails the invocation ──

struct MockAdapter {
    channel: ChannelType,
    fail_with: Option<String>,
    batches: Mutex<Vec<Vec<Recipient>>>,
    shutdowns: AtomicUsize,
}

impl MockAdapter {
    fn ok(channel: ChannelType) -> Arc<Self> {
        Arc::new(Self {
            channel,
            fail_with: None,
            batches: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
        })
    }

    fn failing(channel: ChannelType, message: &str) -> Arc<Self> {
        Arc::new(Self {
            channel,
            fail_with: Some(message.to_string()),
            batches: Mutex::new(Vec::new()),
            shutdowns: AtomicUsize::new(0),
        })
    }

    fn batches(&self) -> Vec<Vec<Recipient>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelAdapter for MockAdapter {
    async fn send(
        &self,
        recipients: &[Recipient],
        _notification: &Notification,
    ) -> Result<ChannelReport> {
        self.batches.lock().unwrap().push(recipients.to_vec());
        if let Some(message) = &self.fail_with {
            return Err(PushError::Other(message.clone()));
        }
        let outcomes = recipients
            .iter()
            .map(|r| RecipientOutcome::delivered(r.clone()))
            .collect();
        Ok(ChannelReport::from_outcomes(self.channel.into(), outcomes))
    }

    fn channel_type(&self) -> ChannelType {
        self.channel
    }

    fn shutdown(&self) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

fn dispatcher_with(adapters: &[&Arc<MockAdapter>]) -> PushDispatcher {
    PushDispatcher::with_adapters(
        Settings::default(),
        adapters
            .iter()
            .map(|a| Arc::clone(a) as Arc<dyn ChannelAdapter>)
            .collect(),
    )
}

// ── Classification introspection ──

#[test]
fn classification_matches_every_token_shape() {
    let dispatcher = PushDispatcher::new(Settings::default());
    let channel = |token: &str| dispatcher.classify(&RegId::from(token)).channel;

    assert_eq!(channel(ANDROID_REG_ID), ChannelType::Gcm);
    assert_eq!(channel(ANDROID_WITH_ADM_SUBSTRING), ChannelType::Gcm);
    assert_eq!(channel(ANDROID_WITH_AMZN_SUBSTRING), ChannelType::Gcm);
    assert_eq!(channel(IOS_REG_ID), ChannelType::Apn);
    assert_eq!(channel(IOS_REG_ID_LONG), ChannelType::Apn);
    assert_eq!(channel(WINDOWS_PHONE_REG_ID), ChannelType::Wns);
    assert_eq!(channel(AMAZON_REG_ID), ChannelType::Adm);
    assert_eq!(channel(UNKNOWN_REG_ID), ChannelType::Unknown);

    let method = dispatcher.classify(&RegId::from(web_subscription()));
    assert_eq!(method.channel, ChannelType::WebPush);
}

#[test]
fn explicit_device_ids_are_authoritative() {
    let dispatcher = PushDispatcher::new(Settings::default());

    let device = RegId::Device {
        id: "whatever".to_string(),
        channel: ChannelType::Apn,
    };
    let method = dispatcher.classify(&device);
    assert_eq!(method.channel, ChannelType::Apn);
    assert_eq!(method.recipient, Recipient::Token("whatever".to_string()));
}

#[test]
fn always_use_fcm_redirects_strings_and_devices() {
    let settings = Settings {
        always_use_fcm: true,
        ..Settings::default()
    };
    let dispatcher = PushDispatcher::new(settings);

    assert_eq!(
        dispatcher.classify(&RegId::from(UNKNOWN_REG_ID)).channel,
        ChannelType::Gcm
    );
    assert_eq!(
        dispatcher.classify(&RegId::from(IOS_REG_ID)).channel,
        ChannelType::Gcm
    );
    let device = RegId::Device {
        id: IOS_REG_ID.to_string(),
        channel: ChannelType::Apn,
    };
    assert_eq!(dispatcher.classify(&device).channel, ChannelType::Gcm);
    // Subscription objects are exempt from the override.
    assert_eq!(
        dispatcher.classify(&RegId::from(web_subscription())).channel,
        ChannelType::WebPush
    );
}

// ── Dispatch ──

#[tokio::test]
async fn empty_input_resolves_to_the_none_report() {
    let dispatcher = PushDispatcher::new(Settings::default());
    let results = dispatcher
        .send(&[], &Notification::new("t", "b"))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].method, ReportMethod::None);
    assert_eq!(results[0].success, 0);
    assert_eq!(results[0].failure, 0);
    assert!(results[0].message.is_empty());
}

#[tokio::test]
async fn unclassifiable_ids_produce_a_synthetic_unknown_report() {
    let dispatcher = PushDispatcher::new(Settings::default());
    let results = dispatcher
        .send(&[RegId::from(UNKNOWN_REG_ID)], &Notification::new("t", "b"))
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    let report = &results[0];
    assert_eq!(report.method, ReportMethod::Unknown);
    assert_eq!(report.success, 0);
    assert_eq!(report.failure, 1);
    assert_eq!(report.message.len(), 1);
    assert_eq!(
        report.message[0].recipient,
        Recipient::Token(UNKNOWN_REG_ID.to_string())
    );
    assert_eq!(report.message[0].error.as_deref(), Some(UNKNOWN_REG_ID_ERROR));
}

#[tokio::test]
async fn one_id_per_shape_invokes_exactly_its_adapter() {
    let gcm = MockAdapter::ok(ChannelType::Gcm);
    let apn = MockAdapter::ok(ChannelType::Apn);
    let adm = MockAdapter::ok(ChannelType::Adm);
    let wns = MockAdapter::ok(ChannelType::Wns);
    let web = MockAdapter::ok(ChannelType::WebPush);
    let dispatcher = dispatcher_with(&[&gcm, &apn, &adm, &wns, &web]);

    let reg_ids = vec![
        RegId::from(IOS_REG_ID_LONG),
        RegId::from(WINDOWS_PHONE_REG_ID),
        RegId::from(AMAZON_REG_ID),
        RegId::from(web_subscription()),
        RegId::Device {
            id: ANDROID_REG_ID.to_string(),
            channel: ChannelType::Gcm,
        },
    ];
    let results = dispatcher
        .send(&reg_ids, &Notification::new("t", "b"))
        .await
        .unwrap();

    for adapter in [&gcm, &apn, &adm, &wns, &web] {
        let batches = adapter.batches();
        assert_eq!(batches.len(), 1, "{} batches", adapter.channel);
        assert_eq!(batches[0].len(), 1, "{} recipients", adapter.channel);
    }
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.method != ReportMethod::Unknown));

    let delivered: usize = results.iter().map(|r| r.success).sum();
    let failed: usize = results.iter().map(|r| r.failure).sum();
    assert_eq!(delivered + failed, reg_ids.len());
}

#[tokio::test]
async fn results_cover_every_recipient_including_unknown() {
    let gcm = MockAdapter::ok(ChannelType::Gcm);
    let dispatcher = dispatcher_with(&[&gcm]);

    let reg_ids = vec![
        RegId::from(ANDROID_REG_ID),
        RegId::from(ANDROID_WITH_ADM_SUBSTRING),
        RegId::from(UNKNOWN_REG_ID),
    ];
    let results = dispatcher
        .send(&reg_ids, &Notification::new("t", "b"))
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    let total: usize = results.iter().map(|r| r.success + r.failure).sum();
    assert_eq!(total, reg_ids.len());
    assert_eq!(gcm.batches()[0].len(), 2);
}

#[tokio::test]
async fn adapter_invocation_failure_fails_the_whole_send() {
    let gcm = MockAdapter::ok(ChannelType::Gcm);
    let apn = MockAdapter::failing(ChannelType::Apn, "bad credentials");
    let dispatcher = dispatcher_with(&[&gcm, &apn]);

    let callback_saw = Arc::new(Mutex::new(None::<String>));
    let captured = Arc::clone(&callback_saw);
    let outcome = dispatcher
        .send_with_callback(
            &[RegId::from(ANDROID_REG_ID), RegId::from(IOS_REG_ID)],
            &Notification::new("t", "b"),
            move |result| {
                *captured.lock().unwrap() = Some(match result {
                    Ok(_) => "ok".to_string(),
                    Err(err) => err.to_string(),
                });
            },
        )
        .await;

    let err = outcome.err().expect("send should fail");
    assert!(err.to_string().contains("bad credentials"));
    // The callback observed the same error, not a partial result set.
    let seen = callback_saw.lock().unwrap().clone().unwrap();
    assert!(seen.contains("bad credentials"));
}

#[tokio::test]
async fn unconfigured_channel_fails_the_send() {
    let gcm = MockAdapter::ok(ChannelType::Gcm);
    let dispatcher = dispatcher_with(&[&gcm]);

    let err = dispatcher
        .send(&[RegId::from(IOS_REG_ID)], &Notification::new("t", "b"))
        .await
        .err()
        .expect("send should fail");
    assert!(matches!(err, PushError::ChannelNotConfigured(ChannelType::Apn)));
}

#[tokio::test]
async fn callback_observes_successful_results() {
    let gcm = MockAdapter::ok(ChannelType::Gcm);
    let dispatcher = dispatcher_with(&[&gcm]);

    let callback_count = Arc::new(Mutex::new(None::<usize>));
    let captured = Arc::clone(&callback_count);
    let results = dispatcher
        .send_with_callback(
            &[RegId::from(ANDROID_REG_ID)],
            &Notification::new("t", "b"),
            move |result| {
                *captured.lock().unwrap() = Some(result.unwrap().len());
            },
        )
        .await
        .unwrap();

    assert_eq!(callback_count.lock().unwrap().unwrap(), results.len());
}

// ── Settings lifecycle ──

#[tokio::test]
async fn set_options_replaces_settings_and_shuts_old_adapters_down() {
    let gcm = MockAdapter::ok(ChannelType::Gcm);
    let dispatcher = PushDispatcher::with_adapters(
        Settings {
            gcm: Some(GcmSettings {
                api_key: Some("old-key".to_string()),
                phonegap: false,
            }),
            ..Settings::default()
        },
        vec![Arc::clone(&gcm) as Arc<dyn ChannelAdapter>],
    );
    assert_eq!(
        dispatcher.options().gcm.unwrap().api_key.as_deref(),
        Some("old-key")
    );

    dispatcher.set_options(Settings::default());

    assert!(dispatcher.options().gcm.is_none());
    assert_eq!(gcm.shutdowns.load(Ordering::SeqCst), 1);

    // The replaced state no longer routes through the old adapter.
    let err = dispatcher
        .send(&[RegId::from(ANDROID_REG_ID)], &Notification::new("t", "b"))
        .await
        .err()
        .expect("gcm is no longer configured");
    assert!(matches!(err, PushError::ChannelNotConfigured(ChannelType::Gcm)));
    assert!(gcm.batches().is_empty());
}

// ── Report aggregation ──

#[test]
fn merged_batches_hide_chunk_boundaries() {
    let first = ChannelReport {
        method: ReportMethod::Gcm,
        success: 2,
        failure: 1,
        message: vec![
            RecipientOutcome::delivered(Recipient::Token("a".to_string())),
            RecipientOutcome::delivered(Recipient::Token("b".to_string())),
            RecipientOutcome::failed(Recipient::Token("c".to_string()), "NotRegistered"),
        ],
        multicast_ids: Some(vec![11]),
    };
    let second = ChannelReport {
        method: ReportMethod::Gcm,
        success: 1,
        failure: 0,
        message: vec![RecipientOutcome::delivered(Recipient::Token("d".to_string()))],
        multicast_ids: Some(vec![22]),
    };

    let merged = ChannelReport::merge(ReportMethod::Gcm, vec![first, second]);
    assert_eq!(merged.success, 3);
    assert_eq!(merged.failure, 1);
    assert_eq!(merged.message.len(), 4);
    assert_eq!(merged.success + merged.failure, merged.message.len());
    assert_eq!(merged.multicast_ids, Some(vec![11, 22]));
}

#[test]
fn report_serializes_with_the_wire_field_names() {
    let report = ChannelReport::from_outcomes(
        ReportMethod::Unknown,
        vec![RecipientOutcome::failed(
            Recipient::Token(UNKNOWN_REG_ID.to_string()),
            UNKNOWN_REG_ID_ERROR,
        )],
    );
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["method"], "unknown");
    assert_eq!(json["failure"], 1);
    assert_eq!(json["message"][0]["regId"], UNKNOWN_REG_ID);
    assert_eq!(json["message"][0]["error"], UNKNOWN_REG_ID_ERROR);
}

// ── RegId parsing ──

#[test]
fn reg_ids_deserialize_from_their_json_shapes() {
    let device: RegId =
        serde_json::from_str(r#"{ "id": "whatever", "type": "apn" }"#).unwrap();
    assert!(matches!(
        device,
        RegId::Device { channel: ChannelType::Apn, .. }
    ));

    let subscription: RegId = serde_json::from_str(
        r#"{ "endpoint": "https://push.example/abc", "keys": { "p256dh": "k", "auth": "a" } }"#,
    )
    .unwrap();
    assert!(matches!(subscription, RegId::Subscription(_)));

    let token: RegId = serde_json::from_str(r#""abcdef""#).unwrap();
    assert_eq!(token, RegId::Token(UNKNOWN_REG_ID.to_string()));
}
