use crate::mqtt_client::{MqttClient, Registration};
use crate::packet::{PacketKey, PacketType};
use rumqttc::QoS;
use std::ops::Deref;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartSettings {
    pub series_name: Option<String>,
    pub series_color: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionSettings {
    pub qos: QoS,
}

/// Maps one bit of a status value onto the indicators that show it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchStateInfo {
    pub state_bit: u8,
    pub on_id: String,
    pub off_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissionProfile {
    pub switches: Vec<SwitchStateInfo>,
    pub text_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RocketLiveMissionProfile {
    pub packet_type: PacketType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MissionProfiles {
    pub fueling: Option<MissionProfile>,
    pub engine_test: Option<MissionProfile>,
    pub rocket_live: Option<RocketLiveMissionProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusDisplay {
    pub tooltip: String,
    pub icon: String,
}

/// A topic on one broker together with everything the dashboard needs to
/// display it. Descriptors are shared read-only between consumers.
#[derive(Debug, Clone)]
pub struct MqttTopic {
    pub topic: String,
    pub name: String,
    pub client: MqttClient,
    pub unit: Option<String>,
    pub icon: Option<String>,
    pub chart: Option<ChartSettings>,
    pub settings: Option<SubscriptionSettings>,
    pub mission_profile: Option<MissionProfiles>,
    pub status: Option<StatusDisplay>,
}

impl MqttTopic {
    pub fn new(topic: impl Into<String>, name: impl Into<String>, client: MqttClient) -> Self {
        Self {
            topic: topic.into(),
            name: name.into(),
            client,
            unit: None,
            icon: None,
            chart: None,
            settings: None,
            mission_profile: None,
            status: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    pub fn with_chart(mut self, chart: ChartSettings) -> Self {
        self.chart = Some(chart);
        self
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.settings = Some(SubscriptionSettings { qos });
        self
    }

    pub fn with_status(mut self, icon: impl Into<String>, tooltip: impl Into<String>) -> Self {
        self.status = Some(StatusDisplay {
            tooltip: tooltip.into(),
            icon: icon.into(),
        });
        self
    }

    pub fn with_fueling(mut self, profile: MissionProfile) -> Self {
        self.mission_profile.get_or_insert_with(Default::default).fueling = Some(profile);
        self
    }

    pub fn with_engine_test(mut self, profile: MissionProfile) -> Self {
        self.mission_profile.get_or_insert_with(Default::default).engine_test = Some(profile);
        self
    }

    pub fn with_rocket_live(mut self, packet_type: PacketType) -> Self {
        self.mission_profile.get_or_insert_with(Default::default).rocket_live =
            Some(RocketLiveMissionProfile { packet_type });
        self
    }

    /// QoS to subscribe with; 0 when the topic has no settings.
    pub fn qos(&self) -> QoS {
        self.settings
            .map(|settings| settings.qos)
            .unwrap_or(QoS::AtMostOnce)
    }

    pub fn packet_type(&self) -> Option<PacketType> {
        self.mission_profile
            .as_ref()?
            .rocket_live
            .map(|profile| profile.packet_type)
    }

    /// Fields a generic rocket-live view should read from this topic's packets.
    pub fn packet_keys(&self) -> &'static [PacketKey] {
        self.packet_type().map(PacketType::keys).unwrap_or(&[])
    }

    pub fn subscribe(&self) {
        self.client.subscribe_topic(self);
    }

    pub fn unsubscribe(&self, ignore_status: bool) {
        self.client.unsubscribe_topic(self, ignore_status);
    }

    pub fn publish(&self, message: &str) {
        self.client.publish_on_topic(self, message);
    }

    pub fn add_topic_callback<F>(&self, callback: F) -> Registration
    where
        F: Fn(&str) + 'static,
    {
        self.client.add_topic_callback(self, callback)
    }

    pub fn add_status_callback<F>(&self, callback: F) -> Registration
    where
        F: Fn(&str) + 'static,
    {
        self.client.add_status_callback(self, callback)
    }
}

/// A topic with a stable position in an ordered display.
#[derive(Debug, Clone)]
pub struct OrderedMqttTopic {
    pub id: usize,
    pub topic: MqttTopic,
}

impl Deref for OrderedMqttTopic {
    type Target = MqttTopic;

    fn deref(&self) -> &MqttTopic {
        &self.topic
    }
}

pub fn order_topics(topics: impl IntoIterator<Item = MqttTopic>) -> Vec<OrderedMqttTopic> {
    topics
        .into_iter()
        .enumerate()
        .map(|(id, topic)| OrderedMqttTopic { id, topic })
        .collect()
}

/// Topics that carry a status indicator.
pub fn status_topics(topics: &[MqttTopic]) -> impl Iterator<Item = &MqttTopic> {
    topics.iter().filter(|topic| topic.status.is_some())
}

pub fn topics_for_packet_type(
    topics: &[MqttTopic],
    packet_type: PacketType,
) -> impl Iterator<Item = &MqttTopic> {
    topics
        .iter()
        .filter(move |topic| topic.packet_type() == Some(packet_type))
}

const RECEIVER_ICON: &str = "fa-solid fa-satellite-dish";

/// Topics the dashboard knows about, in display order.
pub fn get_mqtt_topics(
    pcc_client: &MqttClient,
    _companion_client: &MqttClient,
    _lpb_client: &MqttClient,
) -> Vec<MqttTopic> {
    vec![
        MqttTopic::new("pcc/sensors/gps", "PCC: GPS", pcc_client.clone())
            .with_rocket_live(PacketType::Gps),
        MqttTopic::new("receiver-1/telemetry-packet", "Telemetry", pcc_client.clone())
            .with_status(RECEIVER_ICON, "Receiver telemetry")
            .with_rocket_live(PacketType::Telemetry),
        MqttTopic::new("receiver-2/tracker-packet", "Tracker AV", pcc_client.clone())
            .with_status(RECEIVER_ICON, "Receiver tracker AV")
            .with_rocket_live(PacketType::Tracker),
        MqttTopic::new("receiver-3/tracker-packet", "Tracker NC", pcc_client.clone())
            .with_status(RECEIVER_ICON, "Receiver tracker NC")
            .with_rocket_live(PacketType::Tracker),
        MqttTopic::new("receiver-4/tracker-packet", "Tracker COTS", pcc_client.clone())
            .with_status(RECEIVER_ICON, "Receiver tracker COTS")
            .with_rocket_live(PacketType::Tracker),
    ]
}
