pub mod config;
pub mod mqtt_client;
pub mod packet;
pub mod service_utils;
pub mod topics;
pub mod transport;

pub use config::{Config, MqttClientInfo};
pub use mqtt_client::{ClientState, MqttClient, Registration};
pub use packet::{PacketKey, PacketType, RocketLivePacket, LAST_PACKET_KEYS};
pub use topics::{get_mqtt_topics, MqttTopic, OrderedMqttTopic};
