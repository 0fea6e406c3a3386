//! Device identity and the derived topic namespace
//!
//! Topics are resolved once from `(prefix, client_id)` and never change for
//! the lifetime of a client: subscriptions are keyed by these exact strings
//! and inbound routing compares against them with plain equality.

use crate::store::{ConfigStore, StoreError};
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

/// Client id prefix expected by the cloud side
pub const CLIENT_ID_PREFIX: &str = "android_screen_";

/// Immutable device identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    device_id: String,
    client_id: String,
}

impl DeviceIdentity {
    pub fn new(device_id: impl Into<String>) -> Result<Self, ValidationError> {
        let device_id = device_id.into();
        validate_device_id(&device_id)?;
        let client_id = format!("{CLIENT_ID_PREFIX}{device_id}");
        Ok(Self {
            device_id,
            client_id,
        })
    }

    /// Load the persisted device id, generating and storing one on first run
    pub fn load_or_create(store: &dyn ConfigStore) -> Result<Self, IdentityError> {
        if let Some(existing) = store.device_id().filter(|id| !id.is_empty()) {
            return Ok(Self::new(existing)?);
        }

        let device_id = generate_device_id();
        store.set_device_id(&device_id)?;
        info!(device_id = %device_id, "Generated new device id");
        Ok(Self::new(device_id)?)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Human-readable name announced at registration
    pub fn display_name(&self) -> String {
        let short: String = self.device_id.chars().take(8).collect();
        format!("Display Terminal-{short}")
    }
}

fn generate_device_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// The seven topics a device publishes and subscribes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    pub registration: String,
    pub heartbeat: String,
    pub status: String,
    pub data: String,
    pub content: String,
    pub command: String,
    pub broadcast: String,
}

impl TopicSet {
    /// Pure derivation from namespace prefix and client id
    pub fn derive(prefix: &str, client_id: &str) -> Self {
        Self {
            registration: format!("{prefix}/device/register"),
            heartbeat: format!("{prefix}/device/heartbeat"),
            status: format!("{prefix}/device/status"),
            data: format!("{prefix}/device/data"),
            content: format!("{prefix}/device/{client_id}/content"),
            command: format!("{prefix}/device/{client_id}/command"),
            broadcast: format!("{prefix}/broadcast/all"),
        }
    }

    pub fn for_identity(prefix: &str, identity: &DeviceIdentity) -> Self {
        Self::derive(prefix, identity.client_id())
    }

    /// Topics the session subscribes to after every successful connect
    pub fn subscriptions(&self) -> [&str; 3] {
        [&self.content, &self.command, &self.broadcast]
    }

    pub fn all(&self) -> [&str; 7] {
        [
            &self.registration,
            &self.heartbeat,
            &self.status,
            &self.data,
            &self.content,
            &self.command,
            &self.broadcast,
        ]
    }
}

/// Device ids become a topic level, so they must be a single plain level
pub fn validate_device_id(device_id: &str) -> Result<(), ValidationError> {
    if device_id.is_empty() {
        return Err(ValidationError::EmptyDeviceId);
    }

    for ch in device_id.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '_' && ch != '-' {
            return Err(ValidationError::InvalidDeviceIdChar(ch));
        }
    }

    Ok(())
}

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Device ID cannot be empty")]
    EmptyDeviceId,
    #[error("Device ID contains invalid character: '{0}'")]
    InvalidDeviceIdChar(char),
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryConfigStore;
    use proptest::prelude::*;

    #[test]
    fn test_topic_wire_contract() {
        let topics = TopicSet::derive("mediaplatform", "android_screen_abc");
        assert_eq!(topics.registration, "mediaplatform/device/register");
        assert_eq!(topics.heartbeat, "mediaplatform/device/heartbeat");
        assert_eq!(topics.status, "mediaplatform/device/status");
        assert_eq!(topics.data, "mediaplatform/device/data");
        assert_eq!(
            topics.content,
            "mediaplatform/device/android_screen_abc/content"
        );
        assert_eq!(
            topics.command,
            "mediaplatform/device/android_screen_abc/command"
        );
        assert_eq!(topics.broadcast, "mediaplatform/broadcast/all");
    }

    #[test]
    fn test_subscriptions_are_device_scoped_plus_broadcast() {
        let topics = TopicSet::derive("p", "c1");
        assert_eq!(
            topics.subscriptions(),
            ["p/device/c1/content", "p/device/c1/command", "p/broadcast/all"]
        );
    }

    #[test]
    fn test_client_id_derivation() {
        let identity = DeviceIdentity::new("3f2a9c").unwrap();
        assert_eq!(identity.client_id(), "android_screen_3f2a9c");
        assert_eq!(identity.display_name(), "Display Terminal-3f2a9c");
    }

    #[test]
    fn test_load_or_create_generates_once() {
        let store = MemoryConfigStore::new();
        let first = DeviceIdentity::load_or_create(&store).unwrap();
        let second = DeviceIdentity::load_or_create(&store).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.device_id().len(), 32);
        assert_eq!(store.device_id().as_deref(), Some(first.device_id()));
    }

    #[test]
    fn test_load_or_create_rejects_invalid_persisted_id() {
        let store = MemoryConfigStore::new();
        store.set_device_id("bad/id").unwrap();
        let result = DeviceIdentity::load_or_create(&store);
        assert!(matches!(
            result,
            Err(IdentityError::Invalid(ValidationError::InvalidDeviceIdChar('/')))
        ));
    }

    #[test]
    fn test_device_id_validation() {
        assert!(validate_device_id("abc-123_x.y").is_ok());
        assert_eq!(validate_device_id(""), Err(ValidationError::EmptyDeviceId));
        assert!(validate_device_id("a+b").is_err());
        assert!(validate_device_id("a#").is_err());
        assert!(validate_device_id("a b").is_err());
    }

    proptest! {
        #[test]
        fn topic_derivation_is_deterministic(
            prefix in "[a-z]{1,12}(/[a-z]{1,8}){0,2}",
            device in "[a-zA-Z0-9._-]{1,40}"
        ) {
            let identity = DeviceIdentity::new(device).unwrap();
            let first = TopicSet::for_identity(&prefix, &identity);
            let second = TopicSet::for_identity(&prefix, &identity);
            prop_assert_eq!(&first, &second);
            for topic in first.all() {
                let expected_prefix = format!("{}/", prefix);
                prop_assert!(topic.starts_with(&expected_prefix));
            }
        }

        #[test]
        fn device_scoped_topics_unique_per_client(
            a in "[a-zA-Z0-9._-]{1,40}",
            b in "[a-zA-Z0-9._-]{1,40}"
        ) {
            prop_assume!(a != b);
            let ta = TopicSet::for_identity("mediaplatform", &DeviceIdentity::new(a).unwrap());
            let tb = TopicSet::for_identity("mediaplatform", &DeviceIdentity::new(b).unwrap());
            prop_assert_ne!(&ta.content, &tb.content);
            prop_assert_ne!(&ta.command, &tb.command);
            prop_assert_eq!(&ta.broadcast, &tb.broadcast);
            prop_assert_eq!(&ta.registration, &tb.registration);
        }
    }
}
