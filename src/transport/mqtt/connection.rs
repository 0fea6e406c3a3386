//! Pure option building for the rumqttc transport

use crate::transport::{BrokerEndpoint, ConnectOptions};
use rumqttc::Transport as RumqttcTransportKind;
use rumqttc::v5::MqttOptions;
use rumqttc::v5::mqttbytes::v5::LastWill;

/// Largest packet accepted from or sent to the broker
pub const MAX_PACKET_SIZE: u32 = 256 * 1024;

/// Request channel capacity between `AsyncClient` and its event loop
pub const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// Map session connect options onto rumqttc options
pub fn configure_mqtt_options(endpoint: &BrokerEndpoint, options: &ConnectOptions) -> MqttOptions {
    let mut mqtt_options =
        MqttOptions::new(options.client_id.clone(), endpoint.host.clone(), endpoint.port);

    if options.tls {
        mqtt_options.set_transport(RumqttcTransportKind::tls_with_default_config());
    }

    if let Some((username, password)) = &options.credentials {
        mqtt_options.set_credentials(username, password);
    }

    mqtt_options.set_keep_alive(options.keep_alive);
    // Bounds the socket connect inside the rumqttc event loop
    mqtt_options.set_connection_timeout(options.connect_timeout.as_secs().max(1));
    mqtt_options.set_clean_start(options.clean_session);
    mqtt_options.set_max_packet_size(Some(MAX_PACKET_SIZE));

    if let Some(will) = &options.last_will {
        let lwt = LastWill::new(
            &will.topic,
            will.payload.clone(),
            will.qos,
            will.retained,
            None,
        );
        mqtt_options.set_last_will(lwt);
    }

    mqtt_options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{LastWillMessage, QoS};
    use std::time::Duration;

    fn options() -> ConnectOptions {
        ConnectOptions::new("android_screen_abc")
    }

    #[test]
    fn test_configure_basic_options() {
        let endpoint = BrokerEndpoint::new("broker.emqx.io", 1883);
        let mqtt_options = configure_mqtt_options(&endpoint, &options());

        assert_eq!(mqtt_options.client_id(), "android_screen_abc");
        assert_eq!(
            mqtt_options.broker_address(),
            ("broker.emqx.io".to_string(), 1883)
        );
        assert_eq!(mqtt_options.keep_alive(), Duration::from_secs(60));
        assert_eq!(mqtt_options.connection_timeout(), 30);
        assert!(mqtt_options.clean_start());
        assert!(mqtt_options.last_will().is_none());
    }

    #[test]
    fn test_configure_last_will() {
        let endpoint = BrokerEndpoint::new("localhost", 1883);
        let mut opts = options();
        opts.last_will = Some(LastWillMessage {
            topic: "mediaplatform/device/status".to_string(),
            payload: br#"{"status":"offline"}"#.to_vec(),
            qos: QoS::AtLeastOnce,
            retained: false,
        });

        let mqtt_options = configure_mqtt_options(&endpoint, &opts);
        let will = mqtt_options.last_will().unwrap();
        assert_eq!(will.topic.as_ref(), b"mediaplatform/device/status");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(!will.retain);
    }

    #[test]
    fn test_connect_timeout_reaches_rumqttc() {
        let endpoint = BrokerEndpoint::new("localhost", 1883);
        let mut opts = options();
        opts.connect_timeout = Duration::from_secs(12);
        assert_eq!(configure_mqtt_options(&endpoint, &opts).connection_timeout(), 12);

        opts.connect_timeout = Duration::from_millis(200);
        assert_eq!(configure_mqtt_options(&endpoint, &opts).connection_timeout(), 1);
    }
}
