use crate::config::MqttClientInfo;
use log::{debug, error, warn};
use rumqttc::{
    AsyncClient, ClientError, Event, EventLoop, MqttOptions, NetworkOptions, Outgoing, Packet,
    QoS, SubscribeReasonCode,
};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::sleep;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Unsupported connection method '{0}'")]
    UnsupportedMethod(String),
    #[error("No tokio runtime available to drive the connection")]
    NoRuntime,
    #[error("Connection closed, request dropped")]
    Closed,
    #[error("Client request failed: {0}")]
    Client(#[from] ClientError),
}

/// Everything the broker side can tell a client, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Connected,
    Message { topic: String, payload: String },
    /// `None` entries are refused subscriptions.
    SubscribeAck { pkid: u16, granted: Vec<Option<QoS>> },
    UnsubscribeAck { pkid: u16 },
    Error(String),
    Disconnected,
}

/// Requests a client can make on its broker connection. Every call returns as
/// soon as the request is queued; outcomes come back as `TransportEvent`s.
pub trait Transport {
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError>;
    fn unsubscribe(&self, topic: &str) -> Result<(), TransportError>;
    fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError>;
    fn end(&self) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
enum Request {
    Subscribe(String, QoS),
    Unsubscribe(String),
    Publish(String, String),
    Disconnect,
}

/// Queues requests without bound; a forwarding task hands them to rumqttc as
/// its request channel drains.
pub struct RumqttTransport {
    requests: mpsc::UnboundedSender<Request>,
}

impl RumqttTransport {
    fn send(&self, request: Request) -> Result<(), TransportError> {
        self.requests.send(request).map_err(|_| TransportError::Closed)
    }
}

impl Transport for RumqttTransport {
    fn subscribe(&self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        self.send(Request::Subscribe(topic.to_string(), qos))
    }

    fn unsubscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.send(Request::Unsubscribe(topic.to_string()))
    }

    fn publish(&self, topic: &str, payload: &str) -> Result<(), TransportError> {
        self.send(Request::Publish(topic.to_string(), payload.to_string()))
    }

    fn end(&self) -> Result<(), TransportError> {
        self.send(Request::Disconnect)
    }
}

/// Opens a broker connection and spawns the tasks that drive its event loop
/// and forward its requests. Must be called from within a tokio runtime.
pub fn open(
    info: &MqttClientInfo,
) -> Result<(RumqttTransport, mpsc::UnboundedReceiver<TransportEvent>), TransportError> {
    let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
    let mqtt_options = mqtt_options(info)?;

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 10);
    let mut network_options = NetworkOptions::new();
    network_options.set_connection_timeout(connect_timeout_secs(info.connect_timeout_ms));
    eventloop.set_network_options(network_options);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let reconnect_period = info.reconnect_period_ms.map(Duration::from_millis);
    runtime.spawn(drive(eventloop, events_tx, reconnect_period));

    let (requests_tx, requests_rx) = mpsc::unbounded_channel();
    runtime.spawn(forward(client, requests_rx));

    Ok((RumqttTransport { requests: requests_tx }, events_rx))
}

// Awaits room in rumqttc's bounded request channel instead of refusing.
async fn forward(client: AsyncClient, mut requests: mpsc::UnboundedReceiver<Request>) {
    while let Some(request) = requests.recv().await {
        let result = match &request {
            Request::Subscribe(topic, qos) => client.subscribe(topic.as_str(), *qos).await,
            Request::Unsubscribe(topic) => client.unsubscribe(topic.as_str()).await,
            Request::Publish(topic, payload) => {
                client
                    .publish(topic.as_str(), QoS::AtMostOnce, false, payload.as_bytes().to_vec())
                    .await
            }
            Request::Disconnect => client.disconnect().await,
        };

        if let Err(e) = result {
            error!("MQTT request {:?} failed: {}", request, e);
            break;
        }
    }
    debug!("MQTT request queue closed.");
}

fn mqtt_options(info: &MqttClientInfo) -> Result<MqttOptions, TransportError> {
    let client_id = info
        .client_id
        .clone()
        .unwrap_or_else(|| format!("rocket_dashboard_{}", Uuid::new_v4()));

    let (broker_addr, transport) = match info.connection_method.as_str() {
        "mqtt" | "tcp" => (info.host.clone(), rumqttc::Transport::Tcp),
        "mqtts" | "ssl" => (info.host.clone(), rumqttc::Transport::tls_with_default_config()),
        "ws" => (info.connect_url(), rumqttc::Transport::Ws),
        "wss" => (info.connect_url(), rumqttc::Transport::wss_with_default_config()),
        other => return Err(TransportError::UnsupportedMethod(other.to_string())),
    };

    debug!("Configuring MQTT broker at {}...", info.connect_url());

    let mut mqtt_options = MqttOptions::new(client_id, broker_addr, info.port);
    mqtt_options.set_transport(transport);
    mqtt_options.set_keep_alive(Duration::from_secs(10));
    mqtt_options.set_clean_session(true);

    if let Some(username) = &info.username {
        mqtt_options.set_credentials(username, info.password.clone().unwrap_or_default());
    }

    Ok(mqtt_options)
}

// rumqttc takes whole seconds
fn connect_timeout_secs(timeout_ms: u64) -> u64 {
    timeout_ms.div_ceil(1000).max(1)
}

async fn drive(
    mut eventloop: EventLoop,
    events: mpsc::UnboundedSender<TransportEvent>,
    reconnect_period: Option<Duration>,
) {
    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => TransportEvent::Connected,
            Ok(Event::Incoming(Packet::Publish(publish))) => TransportEvent::Message {
                topic: publish.topic,
                payload: String::from_utf8_lossy(&publish.payload).into_owned(),
            },
            Ok(Event::Incoming(Packet::SubAck(ack))) => TransportEvent::SubscribeAck {
                pkid: ack.pkid,
                granted: ack
                    .return_codes
                    .iter()
                    .map(|code| match code {
                        SubscribeReasonCode::Success(qos) => Some(*qos),
                        SubscribeReasonCode::Failure => None,
                    })
                    .collect(),
            },
            Ok(Event::Incoming(Packet::UnsubAck(ack))) => {
                TransportEvent::UnsubscribeAck { pkid: ack.pkid }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                let _ = events.send(TransportEvent::Disconnected);
                break;
            }
            Ok(event) => {
                debug!("Unhandled event: {:?}", event);
                continue;
            }
            Err(e) => {
                error!("Error in MQTT event loop: {:?}", e);
                if events.send(TransportEvent::Error(e.to_string())).is_err() {
                    break;
                }
                match reconnect_period {
                    Some(period) => {
                        warn!("Lost connection to MQTT broker. Retrying in {:?}...", period);
                        sleep(period).await;
                        continue;
                    }
                    None => break,
                }
            }
        };

        if events.send(event).is_err() {
            debug!("Client dropped, stopping MQTT event loop.");
            break;
        }
    }
}
