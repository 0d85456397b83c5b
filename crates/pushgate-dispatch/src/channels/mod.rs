//! Built-in channel adapters, one per push provider.

pub mod adm;
pub mod apn;
pub mod gcm;
pub mod web;
pub mod wns;

use std::collections::HashMap;
use std::sync::Arc;

use pushgate_common::types::ChannelType;

use crate::settings::Settings;
use crate::ChannelAdapter;

/// Builds one adapter per configured channel. Channels with no settings
/// get no adapter; ids routed to them fail the dispatch.
pub fn build_adapters(settings: &Settings) -> HashMap<ChannelType, Arc<dyn ChannelAdapter>> {
    let mut adapters: HashMap<ChannelType, Arc<dyn ChannelAdapter>> = HashMap::new();
    if let Some(gcm) = &settings.gcm {
        adapters.insert(ChannelType::Gcm, Arc::new(gcm::GcmChannel::new(gcm.clone())));
    }
    if let Some(apn) = &settings.apn {
        adapters.insert(ChannelType::Apn, Arc::new(apn::ApnChannel::new(apn.clone())));
    }
    if let Some(adm) = &settings.adm {
        adapters.insert(ChannelType::Adm, Arc::new(adm::AdmChannel::new(adm.clone())));
    }
    if let Some(wns) = &settings.wns {
        adapters.insert(ChannelType::Wns, Arc::new(wns::WnsChannel::new(wns.clone())));
    }
    if let Some(web) = &settings.web {
        adapters.insert(
            ChannelType::WebPush,
            Arc::new(web::WebPushChannel::new(web.clone())),
        );
    }
    adapters
}
