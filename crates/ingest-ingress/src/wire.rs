//! Provider JSON wire shapes for inbound notifications

use serde::Deserialize;

/// `POST /webhook/{alias}/{user}` body: `{"value": [ChangeNotification, ...]}`.
#[derive(Debug, Deserialize)]
pub struct NotificationEnvelope {
    pub value: Vec<RawChangeNotification>,
}

#[derive(Debug, Deserialize)]
pub struct RawChangeNotification {
    #[serde(rename = "subscriptionId")]
    pub subscription_id: String,
    #[serde(rename = "clientState", default)]
    pub client_state: String,
    #[serde(rename = "changeType")]
    pub change_type: String,
    pub resource: String,
}

/// `POST /lifecycle/{alias}` body: `{"value": [LifecycleNotification, ...]}`.
#[derive(Debug, Deserialize)]
pub struct LifecycleEnvelope {
    pub value: Vec<RawLifecycleNotification>,
}

#[derive(Debug, Deserialize)]
pub struct RawLifecycleNotification {
    #[serde(rename = "subscriptionId")]
    pub subscription_id: String,
    #[serde(rename = "lifecycleEvent")]
    pub lifecycle_event: String,
    #[serde(rename = "clientState", default)]
    pub client_state: String,
}
