use crate::config::Config;
use crate::mqtt_client::MqttClient;
use crate::packet::{RocketLivePacket, LAST_PACKET_KEYS};
use crate::topics::{get_mqtt_topics, status_topics, MqttTopic};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// The three broker connections and the topics bound to them.
pub struct Dashboard {
    pub pcc: MqttClient,
    pub companion: MqttClient,
    pub lpb: MqttClient,
    pub topics: Vec<MqttTopic>,
}

impl Dashboard {
    pub fn connect(config: &Config) -> Self {
        let pcc = MqttClient::new(&config.pcc);
        let companion = MqttClient::new(&config.companion);
        let lpb = MqttClient::new(&config.lpb);
        Self::from_clients(pcc, companion, lpb)
    }

    pub fn from_clients(pcc: MqttClient, companion: MqttClient, lpb: MqttClient) -> Self {
        let topics = get_mqtt_topics(&pcc, &companion, &lpb);
        Self {
            pcc,
            companion,
            lpb,
            topics,
        }
    }

    pub fn clients(&self) -> [(&'static str, &MqttClient); 3] {
        [
            ("pcc", &self.pcc),
            ("companion", &self.companion),
            ("lpb", &self.lpb),
        ]
    }

    pub fn topic(&self, name: &str) -> Option<&MqttTopic> {
        self.topics.iter().find(|topic| topic.topic == name)
    }

    pub fn disconnect(&self) {
        for (_, client) in self.clients() {
            client.disconnect();
        }
    }
}

/// Runs the client's event loop on the current `LocalSet`.
pub fn start_mqtt_client(client: MqttClient, label: &'static str) -> JoinHandle<()> {
    tokio::task::spawn_local(async move {
        info!("Starting {} MQTT client ({})...", label, client.name());
        client.run().await;
        info!("{} MQTT client event loop finished.", label);
    })
}

/// Last time each receiver topic showed a sign of life.
#[derive(Clone, Default)]
pub struct ReceiverWatch {
    last_seen: Rc<RefCell<HashMap<String, Instant>>>,
    labels: Rc<RefCell<Vec<(String, String)>>>,
}

impl ReceiverWatch {
    pub fn mark_alive(&self, topic: &str) {
        self.last_seen
            .borrow_mut()
            .insert(topic.to_string(), Instant::now());
    }

    pub fn last_seen(&self, topic: &str) -> Option<Instant> {
        self.last_seen.borrow().get(topic).copied()
    }

    pub fn is_alive(&self, topic: &str, timeout: Duration) -> bool {
        self.last_seen(topic)
            .map(|seen| seen.elapsed() <= timeout)
            .unwrap_or(false)
    }

    /// `(tooltip, alive)` per watched receiver, in registry order.
    pub fn report(&self, timeout: Duration) -> Vec<(String, bool)> {
        self.labels
            .borrow()
            .iter()
            .map(|(topic, tooltip)| (tooltip.clone(), self.is_alive(topic, timeout)))
            .collect()
    }
}

/// Registers a status callback and subscribes every topic that carries a
/// status indicator.
pub fn watch_receivers(topics: &[MqttTopic]) -> ReceiverWatch {
    let watch = ReceiverWatch::default();

    for topic in status_topics(topics) {
        let tooltip = topic
            .status
            .as_ref()
            .map(|status| status.tooltip.clone())
            .unwrap_or_else(|| topic.name.clone());
        watch
            .labels
            .borrow_mut()
            .push((topic.topic.clone(), tooltip));

        let (watch_clone, name) = (watch.clone(), topic.topic.clone());
        topic.add_status_callback(move |_payload| watch_clone.mark_alive(&name));
        topic.subscribe();
    }

    watch
}

/// Logs the "last packet" fields of every decoded message on `topic`.
pub fn log_last_packet(topic: &MqttTopic) {
    let name = topic.name.clone();
    topic.add_topic_callback(move |payload| match RocketLivePacket::decode(payload) {
        Ok(packet) => {
            let fields: Vec<String> = packet
                .select(&LAST_PACKET_KEYS)
                .map(|(key, value)| format!("{}={}", key, value))
                .collect();
            debug!("{}: {}", name, fields.join(" "));
        }
        Err(e) => warn!("{}: dropping packet: {}", name, e),
    });
    topic.subscribe();
}

/// Start periodic receiver status updates
pub fn periodic_status_update(watch: ReceiverWatch, period: Duration) -> JoinHandle<()> {
    tokio::task::spawn_local(async move {
        loop {
            tokio::time::sleep(period).await;
            for (tooltip, alive) in watch.report(period) {
                if alive {
                    info!("{} is alive", tooltip);
                } else {
                    warn!("{} is silent", tooltip);
                }
            }
        }
    })
}

/// Waits for Ctrl-C, then disconnects every broker.
pub async fn handle_shutdown(dashboard: &Dashboard) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to handle termination signal: {:?}", e);
    } else {
        info!("Dashboard is shutting down...");
    }

    dashboard.disconnect();
}
