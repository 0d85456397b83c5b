//! Identifier classification.
//!
//! Every registration id resolves to exactly one channel; unresolvable
//! strings land on [`ChannelType::Unknown`]. Classification is total
//! and never fails. The string-shape heuristics are an ordered rule
//! list evaluated first-match-wins; the ordering is load-bearing and
//! must not be rearranged (a 64- or 160-char hex token is APNs even
//! though 160 also exceeds the GCM length fallback).

use regex::Regex;
use std::sync::LazyLock;

use pushgate_common::types::{ChannelType, Recipient, RegId};

use crate::settings::Settings;

// Pattern kept verbatim from the historical heuristic, including the
// unescaped dot: "amzn1.adm" and any single character in that position
// both match.
static ADM_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^amzn[0-9]*.adm").expect("ADM token pattern is valid"));

/// A registration id resolved to its delivery channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMethod {
    pub recipient: Recipient,
    pub channel: ChannelType,
}

/// Shape predicate of one token rule.
#[derive(Debug, Clone, Copy)]
enum TokenMatcher {
    /// Literal prefix match.
    Prefix(&'static str),
    /// The anchored ADM registration pattern.
    AdmPattern,
    /// Exact length in the given set, hex digits only.
    HexLen(&'static [usize]),
    /// Strictly longer than the given length.
    LongerThan(usize),
}

impl TokenMatcher {
    fn matches(&self, token: &str) -> bool {
        match self {
            TokenMatcher::Prefix(prefix) => token.starts_with(prefix),
            TokenMatcher::AdmPattern => ADM_TOKEN.is_match(token),
            TokenMatcher::HexLen(lengths) => {
                lengths.contains(&token.len())
                    && !token.is_empty()
                    && token.bytes().all(|b| b.is_ascii_hexdigit())
            }
            TokenMatcher::LongerThan(len) => token.len() > *len,
        }
    }
}

/// Bare-token heuristics, first match wins. Order is part of the
/// contract: the hex-length rule must run before the length fallback so
/// 160-char hex tokens stay on APNs.
const TOKEN_RULES: &[(TokenMatcher, ChannelType)] = &[
    (TokenMatcher::Prefix("http"), ChannelType::Wns),
    (TokenMatcher::AdmPattern, ChannelType::Adm),
    (TokenMatcher::HexLen(&[64, 160]), ChannelType::Apn),
    (TokenMatcher::LongerThan(64), ChannelType::Gcm),
];

fn classify_token(token: &str) -> ChannelType {
    TOKEN_RULES
        .iter()
        .find(|(matcher, _)| matcher.matches(token))
        .map(|(_, channel)| *channel)
        .unwrap_or(ChannelType::Unknown)
}

/// Resolves one registration id to `(recipient, channel)`.
///
/// Structured ids are authoritative: an explicit `Device` channel wins
/// (unless `always_use_fcm` redirects it to FCM), and a subscription
/// object is always web push. Bare strings fall through the ordered
/// shape heuristics.
pub fn classify(reg_id: &RegId, settings: &Settings) -> PushMethod {
    match reg_id {
        RegId::Device { id, channel } => PushMethod {
            recipient: Recipient::Token(id.clone()),
            channel: if settings.always_use_fcm {
                ChannelType::Gcm
            } else {
                *channel
            },
        },
        RegId::Subscription(subscription) => PushMethod {
            recipient: Recipient::Subscription(subscription.clone()),
            channel: ChannelType::WebPush,
        },
        RegId::Token(token) => PushMethod {
            recipient: Recipient::Token(token.clone()),
            channel: if settings.always_use_fcm {
                ChannelType::Gcm
            } else {
                classify_token(token)
            },
        },
    }
}
