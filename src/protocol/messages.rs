//! Wire records exchanged with the cloud platform
//!
//! Outbound records are built fresh per publish and carry `deviceId` plus an
//! epoch-millisecond `timestamp`. Inbound records (content pushes, commands)
//! follow the schema the platform server emits; unknown fields are ignored so
//! newer servers keep working against older devices.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Device type announced at registration
pub const DEVICE_TYPE: &str = "android_screen";

/// Current time as epoch milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Presence announcement published once per successful connect
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRecord {
    pub device_id: String,
    pub device_type: String,
    pub device_name: String,
    pub device_model: String,
    /// Operating system version
    pub device_version: String,
    pub app_version: String,
    pub screen_resolution: String,
    pub location: String,
    pub timestamp: i64,
}

/// Liveness pulse published every heartbeat period while connected
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRecord {
    pub device_id: String,
    pub timestamp: i64,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<u8>,
    pub storage_info: String,
    pub memory_info: String,
}

/// Device status report; also used as the last-will payload
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub device_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    pub timestamp: i64,
}

impl StatusRecord {
    pub fn new(device_id: &str, status: &str, details: Option<String>) -> Self {
        Self {
            device_id: device_id.to_string(),
            status: status.to_string(),
            details,
            timestamp: now_millis(),
        }
    }

    pub fn offline(device_id: &str) -> Self {
        Self::new(device_id, "offline", None)
    }
}

/// Content pushed to a single device
///
/// ```
/// use display_client::protocol::ContentPush;
///
/// let push: ContentPush = serde_json::from_str(
///     r#"{"messageType":"content","content":{"id":"c1","title":"Welcome","type":"image",
///         "url":"https://example.com/a.jpg","duration":30}}"#,
/// ).unwrap();
/// assert_eq!(push.content.id, "c1");
/// assert_eq!(push.content.duration, Some(30.0));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentPush {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    pub content: ContentItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ContentSchedule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    #[serde(alias = "contentId")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// image, video, text, audio or slideshow
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Inline body for text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Display duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentSchedule {
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub priority: i32,
}

/// Remote command addressed to a single device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    #[serde(alias = "action")]
    pub command: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}
