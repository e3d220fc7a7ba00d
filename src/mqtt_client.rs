use crate::config::MqttClientInfo;
use crate::topics::MqttTopic;
use crate::transport::{self, Transport, TransportEvent};
use log::{debug, error, info, warn};
use rumqttc::QoS;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use tokio::sync::mpsc;

/// Handler invoked with the raw payload of a message.
pub type Callback = Rc<dyn Fn(&str)>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

/// Which warnings a callback registration raised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registration {
    /// A callback of the same kind was overwritten.
    pub replaced: bool,
    /// A callback of the other kind is registered for the topic too.
    pub shared: bool,
}

struct ClientInner {
    name: String,
    transport: Option<Box<dyn Transport>>,
    events: RefCell<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    state: RefCell<ClientState>,
    has_connected: Cell<bool>,
    subscriptions: RefCell<HashMap<String, QoS>>,
    topic_callbacks: RefCell<HashMap<String, Callback>>,
    status_callbacks: RefCell<HashMap<String, Callback>>,
}

/// One broker connection and the callbacks listening on it.
///
/// Cloning is cheap and every clone refers to the same connection. The client
/// is bound to the thread that created it; all events are handled by
/// [`MqttClient::run`] on that thread, so the callback registries need no
/// locking.
#[derive(Clone)]
pub struct MqttClient {
    inner: Rc<ClientInner>,
}

impl MqttClient {
    /// Connects to the broker described by `info`.
    ///
    /// A connection that cannot be constructed is logged and leaves the client
    /// in [`ClientState::Error`]; every later operation on it is a no-op.
    pub fn new(info: &MqttClientInfo) -> Self {
        let name = format!("{}:{}", info.host, info.port);
        info!("[{}] Connecting to {}", name, info.connect_url());

        match transport::open(info) {
            Ok((transport, events)) => Self::with_transport(name, Box::new(transport), events),
            Err(e) => {
                let client = Self::from_parts(name, None, None, ClientState::Disconnected);
                client.on_error(&e.to_string());
                client
            }
        }
    }

    /// Wraps an already opened transport and the stream of its events.
    pub fn with_transport(
        name: impl Into<String>,
        transport: Box<dyn Transport>,
        events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Self {
        Self::from_parts(name.into(), Some(transport), Some(events), ClientState::Connecting)
    }

    fn from_parts(
        name: String,
        transport: Option<Box<dyn Transport>>,
        events: Option<mpsc::UnboundedReceiver<TransportEvent>>,
        state: ClientState,
    ) -> Self {
        Self {
            inner: Rc::new(ClientInner {
                name,
                transport,
                events: RefCell::new(events),
                state: RefCell::new(state),
                has_connected: Cell::new(false),
                subscriptions: RefCell::new(HashMap::new()),
                topic_callbacks: RefCell::new(HashMap::new()),
                status_callbacks: RefCell::new(HashMap::new()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> ClientState {
        self.inner.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.state.borrow() == ClientState::Connected
    }

    /// Whether `other` is a handle to the same connection.
    pub fn same_connection(&self, other: &MqttClient) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn has_topic_callback(&self, topic: &str) -> bool {
        self.inner.topic_callbacks.borrow().contains_key(topic)
    }

    pub fn has_status_callback(&self, topic: &str) -> bool {
        self.inner.status_callbacks.borrow().contains_key(topic)
    }

    /// QoS of the latest subscribe request for `topic`, if it was not
    /// unsubscribed since.
    pub fn subscribed_qos(&self, topic: &str) -> Option<QoS> {
        self.inner.subscriptions.borrow().get(topic).copied()
    }

    pub fn disconnect(&self) {
        info!("[{}] Disconnecting from the server...", self.inner.name);
        if !self.is_connected() {
            return;
        }

        if let Some(transport) = &self.inner.transport {
            match transport.end() {
                Ok(_) => {
                    *self.inner.state.borrow_mut() = ClientState::Disconnected;
                    info!("[{}] Successfully disconnected!", self.inner.name);
                }
                Err(e) => error!("[{}] Disconnect failed: {}", self.inner.name, e),
            }
        }
    }

    /// Stops delivering `topic` to its data callback.
    ///
    /// The broker subscription is only dropped when no status callback still
    /// listens on the topic, unless `ignore_status` is set, in which case the
    /// status callback is removed as well.
    pub fn unsubscribe_topic(&self, topic: &MqttTopic, ignore_status: bool) {
        let name = topic.topic.as_str();

        if !self.has_status_callback(name) || ignore_status {
            if let Some(transport) = &self.inner.transport {
                match transport.unsubscribe(name) {
                    Ok(_) => {
                        self.inner.subscriptions.borrow_mut().remove(name);
                        debug!("[{}] Unsubscribe request sent for topic:{}", self.inner.name, name);
                    }
                    Err(e) => error!("[{}] Unsubscribe topic error: {}", self.inner.name, e),
                }
            }
        } else {
            warn!(
                "[{}] Didn't unsubscribe topic:{} because a status callback is using it; its topic callback was removed (if there was any)",
                self.inner.name, name
            );
        }

        if ignore_status {
            self.inner.status_callbacks.borrow_mut().remove(name);
        }

        self.inner.topic_callbacks.borrow_mut().remove(name);
    }

    pub fn publish_on_topic(&self, topic: &MqttTopic, message: &str) {
        if let Some(transport) = &self.inner.transport {
            if let Err(e) = transport.publish(&topic.topic, message) {
                error!(
                    "[{}] Failed to publish message to '{}': {}",
                    self.inner.name, topic.topic, e
                );
            }
        }
    }

    /// Requests a subscription with the topic's QoS (0 when unset). Calling it
    /// again re-issues the request and the latest QoS wins.
    pub fn subscribe_topic(&self, topic: &MqttTopic) {
        let Some(transport) = &self.inner.transport else {
            warn!(
                "[{}] No connection, cannot subscribe to topic:{}",
                self.inner.name, topic.topic
            );
            return;
        };

        let qos = topic.qos();
        match transport.subscribe(&topic.topic, qos) {
            Ok(_) => {
                self.inner
                    .subscriptions
                    .borrow_mut()
                    .insert(topic.topic.clone(), qos);
                debug!(
                    "[{}] Subscribe request sent for topic:{} ({:?})",
                    self.inner.name, topic.topic, qos
                );
            }
            Err(e) => error!("[{}] Subscribe to topic error: {}", self.inner.name, e),
        }
    }

    pub fn add_status_callback<F>(&self, topic: &MqttTopic, callback: F) -> Registration
    where
        F: Fn(&str) + 'static,
    {
        let registration = Registration {
            shared: self.has_topic_callback(&topic.topic),
            replaced: self.has_status_callback(&topic.topic),
        };

        if registration.shared {
            warn!(
                "[{}] Topic:{} already subscribed by another component",
                self.inner.name, topic.topic
            );
        }
        if registration.replaced {
            warn!(
                "[{}] Overwriting status callback for topic:{}",
                self.inner.name, topic.topic
            );
        }

        self.inner
            .status_callbacks
            .borrow_mut()
            .insert(topic.topic.clone(), Rc::new(callback));
        registration
    }

    pub fn add_topic_callback<F>(&self, topic: &MqttTopic, callback: F) -> Registration
    where
        F: Fn(&str) + 'static,
    {
        let registration = Registration {
            shared: self.has_status_callback(&topic.topic),
            replaced: self.has_topic_callback(&topic.topic),
        };

        if registration.shared {
            warn!(
                "[{}] Topic:{} already subscribed by another component",
                self.inner.name, topic.topic
            );
        }
        if registration.replaced {
            warn!(
                "[{}] Overwriting topic callback for topic:{}",
                self.inner.name, topic.topic
            );
        }

        self.inner
            .topic_callbacks
            .borrow_mut()
            .insert(topic.topic.clone(), Rc::new(callback));
        registration
    }

    /// Handles transport events until the connection's event stream ends.
    ///
    /// Only the first call on a connection consumes events; later calls
    /// return immediately.
    pub async fn run(&self) {
        let Some(mut events) = self.inner.events.borrow_mut().take() else {
            debug!("[{}] Event loop already running or unavailable", self.inner.name);
            return;
        };

        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }

        debug!("[{}] Event stream closed", self.inner.name);
    }

    pub fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connect(),
            TransportEvent::Message { topic, payload } => self.dispatch(&topic, &payload),
            TransportEvent::SubscribeAck { pkid, granted } => {
                if granted.iter().any(Option::is_none) {
                    error!(
                        "[{}] Subscribe to topic error: broker refused request {}",
                        self.inner.name, pkid
                    );
                } else {
                    info!(
                        "[{}] Subscribe to topic result: request {} granted {:?}",
                        self.inner.name, pkid, granted
                    );
                }
            }
            TransportEvent::UnsubscribeAck { pkid } => {
                info!("[{}] Unsubscribed topic (request {})", self.inner.name, pkid);
            }
            TransportEvent::Error(message) => self.on_error(&message),
            TransportEvent::Disconnected => {
                *self.inner.state.borrow_mut() = ClientState::Disconnected;
                debug!("[{}] Connection closed", self.inner.name);
            }
        }
    }

    /// Delivers `payload` to the data and status callbacks of `topic`.
    pub fn dispatch(&self, topic: &str, payload: &str) {
        // Clone out of the registries so callbacks may re-enter the client.
        let topic_callback = self.inner.topic_callbacks.borrow().get(topic).cloned();
        let status_callback = self.inner.status_callbacks.borrow().get(topic).cloned();

        if let Some(callback) = topic_callback {
            callback(payload);
        }
        if let Some(callback) = status_callback {
            callback(payload);
        }
    }

    fn on_connect(&self) {
        *self.inner.state.borrow_mut() = ClientState::Connected;
        info!("[{}] Connection succeeded!", self.inner.name);

        // Clean sessions lose every subscription when the connection drops.
        if self.inner.has_connected.replace(true) {
            self.resubscribe();
        }
    }

    fn resubscribe(&self) {
        let Some(transport) = &self.inner.transport else {
            return;
        };

        let subscriptions: Vec<(String, QoS)> = self
            .inner
            .subscriptions
            .borrow()
            .iter()
            .map(|(topic, qos)| (topic.clone(), *qos))
            .collect();

        for (topic, qos) in subscriptions {
            match transport.subscribe(&topic, qos) {
                Ok(_) => debug!("[{}] Resubscribed topic:{} ({:?})", self.inner.name, topic, qos),
                Err(e) => error!("[{}] Resubscribe to topic:{} error: {}", self.inner.name, topic, e),
            }
        }
    }

    fn on_error(&self, message: &str) {
        *self.inner.state.borrow_mut() = ClientState::Error(message.to_string());
        error!("[{}] Connection failed: {}", self.inner.name, message);
    }
}

impl fmt::Debug for MqttClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MqttClient")
            .field("name", &self.inner.name)
            .field("state", &*self.inner.state.borrow())
            .field("topic_callbacks", &self.inner.topic_callbacks.borrow().len())
            .field("status_callbacks", &self.inner.status_callbacks.borrow().len())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{mock_client, Call, Recorder};
    use super::*;

    const TELEMETRY: &str = "receiver-1/telemetry-packet";
    const GPS: &str = "pcc/sensors/gps";

    fn topic(client: &MqttClient, name: &str) -> MqttTopic {
        MqttTopic::new(name, name, client.clone())
    }

    #[test]
    fn unsubscribe_without_status_callback_drops_broker_subscription() {
        let harness = mock_client("pcc");
        let telemetry = topic(&harness.client, TELEMETRY);
        let data = Recorder::default();

        harness.client.add_topic_callback(&telemetry, data.callback());
        harness.client.dispatch(TELEMETRY, "p1");
        assert_eq!(data.payloads(), vec!["p1"]);

        harness.client.unsubscribe_topic(&telemetry, false);
        assert_eq!(harness.count(&Call::Unsubscribe(TELEMETRY.to_string())), 1);
        assert!(!harness.client.has_topic_callback(TELEMETRY));

        harness.client.dispatch(TELEMETRY, "p2");
        assert_eq!(data.payloads(), vec!["p1"]);
    }

    #[test]
    fn status_callback_keeps_broker_subscription_alive() {
        let harness = mock_client("pcc");
        let gps = topic(&harness.client, GPS);
        let status = Recorder::default();
        let data = Recorder::default();

        harness.client.add_status_callback(&gps, status.callback());
        let registration = harness.client.add_topic_callback(&gps, data.callback());
        assert!(registration.shared);
        assert!(!registration.replaced);

        harness.client.unsubscribe_topic(&gps, false);
        assert_eq!(harness.count(&Call::Unsubscribe(GPS.to_string())), 0);
        assert!(!harness.client.has_topic_callback(GPS));
        assert!(harness.client.has_status_callback(GPS));

        harness.client.dispatch(GPS, "alive");
        assert_eq!(status.payloads(), vec!["alive"]);
        assert!(data.payloads().is_empty());
    }

    #[test]
    fn ignore_status_always_unsubscribes_and_clears_both_registries() {
        let harness = mock_client("pcc");
        let gps = topic(&harness.client, GPS);
        let recorder = Recorder::default();

        harness.client.add_status_callback(&gps, recorder.callback());
        harness.client.add_topic_callback(&gps, recorder.callback());
        harness.client.unsubscribe_topic(&gps, true);

        assert_eq!(harness.count(&Call::Unsubscribe(GPS.to_string())), 1);
        assert!(!harness.client.has_topic_callback(GPS));
        assert!(!harness.client.has_status_callback(GPS));

        // Nothing registered at all still unsubscribes at the broker.
        harness.client.unsubscribe_topic(&gps, true);
        assert_eq!(harness.count(&Call::Unsubscribe(GPS.to_string())), 2);

        harness.client.dispatch(GPS, "late");
        assert!(recorder.payloads().is_empty());
    }

    #[test]
    fn second_data_callback_replaces_the_first() {
        let harness = mock_client("pcc");
        let telemetry = topic(&harness.client, TELEMETRY);
        let first = Recorder::default();
        let second = Recorder::default();

        let registration = harness.client.add_topic_callback(&telemetry, first.callback());
        assert_eq!(registration, Registration::default());
        let registration = harness.client.add_topic_callback(&telemetry, second.callback());
        assert!(registration.replaced);
        assert!(!registration.shared);

        harness.client.dispatch(TELEMETRY, "p1");
        assert!(first.payloads().is_empty());
        assert_eq!(second.payloads(), vec!["p1"]);
    }

    #[test]
    fn second_status_callback_replaces_the_first() {
        let harness = mock_client("pcc");
        let gps = topic(&harness.client, GPS);
        let first = Recorder::default();
        let second = Recorder::default();

        harness.client.add_status_callback(&gps, first.callback());
        let registration = harness.client.add_status_callback(&gps, second.callback());
        assert!(registration.replaced);

        harness.client.dispatch(GPS, "ok");
        assert!(first.payloads().is_empty());
        assert_eq!(second.payloads(), vec!["ok"]);
    }

    #[test]
    fn message_reaches_both_callback_kinds_once() {
        let harness = mock_client("pcc");
        let telemetry = topic(&harness.client, TELEMETRY);
        let data = Recorder::default();
        let status = Recorder::default();

        harness.client.add_topic_callback(&telemetry, data.callback());
        let registration = harness.client.add_status_callback(&telemetry, status.callback());
        assert!(registration.shared);

        harness.client.dispatch(TELEMETRY, "p1");
        assert_eq!(data.payloads(), vec!["p1"]);
        assert_eq!(status.payloads(), vec!["p1"]);
    }

    #[test]
    fn message_on_unknown_topic_is_ignored() {
        let harness = mock_client("pcc");
        let telemetry = topic(&harness.client, TELEMETRY);
        let data = Recorder::default();
        harness.client.add_topic_callback(&telemetry, data.callback());

        harness.client.dispatch("receiver-9/unknown", "p1");
        harness.client.dispatch("receiver-1/telemetry-packet/", "p1");

        assert!(data.payloads().is_empty());
        assert!(harness.calls.borrow().is_empty());
    }

    #[test]
    fn callbacks_may_unsubscribe_while_being_dispatched() {
        let harness = mock_client("pcc");
        let telemetry = topic(&harness.client, TELEMETRY);
        let seen = Recorder::default();

        let record = seen.callback();
        let (client, own_topic) = (harness.client.clone(), telemetry.clone());
        harness.client.add_topic_callback(&telemetry, move |payload| {
            record(payload);
            client.unsubscribe_topic(&own_topic, false);
        });

        harness.client.dispatch(TELEMETRY, "once");
        harness.client.dispatch(TELEMETRY, "twice");

        assert_eq!(seen.payloads(), vec!["once"]);
        assert_eq!(harness.count(&Call::Unsubscribe(TELEMETRY.to_string())), 1);
    }

    #[test]
    fn subscribe_uses_topic_qos_and_last_request_wins() {
        let harness = mock_client("pcc");
        let plain = topic(&harness.client, GPS);
        let reliable = topic(&harness.client, GPS).with_qos(QoS::ExactlyOnce);

        harness.client.subscribe_topic(&plain);
        assert_eq!(harness.client.subscribed_qos(GPS), Some(QoS::AtMostOnce));

        harness.client.subscribe_topic(&reliable);
        assert_eq!(harness.client.subscribed_qos(GPS), Some(QoS::ExactlyOnce));
        assert_eq!(
            *harness.calls.borrow(),
            vec![
                Call::Subscribe(GPS.to_string(), QoS::AtMostOnce),
                Call::Subscribe(GPS.to_string(), QoS::ExactlyOnce),
            ]
        );
        assert!(!harness.client.has_topic_callback(GPS));

        harness.client.unsubscribe_topic(&plain, false);
        assert_eq!(harness.client.subscribed_qos(GPS), None);
    }

    #[test]
    fn publish_is_forwarded_verbatim() {
        let harness = mock_client("lpb");
        let command = topic(&harness.client, "lpb/commands");

        harness.client.publish_on_topic(&command, "{\"valve\":\"open\"}");
        assert_eq!(
            *harness.calls.borrow(),
            vec![Call::Publish(
                "lpb/commands".to_string(),
                "{\"valve\":\"open\"}".to_string()
            )]
        );
    }

    #[test]
    fn disconnect_twice_ends_the_connection_once() {
        let harness = mock_client("pcc");
        harness.client.handle_event(TransportEvent::Connected);
        assert!(harness.client.is_connected());

        harness.client.disconnect();
        harness.client.disconnect();

        assert_eq!(harness.count(&Call::End), 1);
        assert_eq!(harness.client.state(), ClientState::Disconnected);
    }

    #[test]
    fn disconnect_before_connecting_is_a_no_op() {
        let harness = mock_client("pcc");
        harness.client.disconnect();
        assert_eq!(harness.count(&Call::End), 0);
        assert_eq!(harness.client.state(), ClientState::Connecting);
    }

    #[test]
    fn transport_errors_are_recorded_and_recoverable() {
        let harness = mock_client("pcc");
        harness
            .client
            .handle_event(TransportEvent::Error("connection refused".to_string()));
        assert_eq!(
            harness.client.state(),
            ClientState::Error("connection refused".to_string())
        );

        harness.client.handle_event(TransportEvent::Connected);
        assert!(harness.client.is_connected());
    }

    #[test]
    fn reconnect_restores_broker_subscriptions() {
        let harness = mock_client("pcc");
        let telemetry = topic(&harness.client, TELEMETRY);
        let gps = topic(&harness.client, GPS).with_qos(QoS::AtLeastOnce);
        let dropped = topic(&harness.client, "receiver-2/tracker-packet");
        let subscribe_telemetry = Call::Subscribe(TELEMETRY.to_string(), QoS::AtMostOnce);

        harness.client.handle_event(TransportEvent::Connected);
        assert!(harness.calls.borrow().is_empty());

        harness.client.subscribe_topic(&telemetry);
        harness.client.subscribe_topic(&gps);
        harness.client.subscribe_topic(&dropped);
        harness.client.unsubscribe_topic(&dropped, false);

        harness
            .client
            .handle_event(TransportEvent::Error("connection reset".to_string()));
        assert_eq!(harness.count(&subscribe_telemetry), 1);

        harness.client.handle_event(TransportEvent::Connected);
        assert_eq!(harness.count(&subscribe_telemetry), 2);
        assert_eq!(
            harness.count(&Call::Subscribe(GPS.to_string(), QoS::AtLeastOnce)),
            2
        );
        assert_eq!(
            harness.count(&Call::Subscribe(
                "receiver-2/tracker-packet".to_string(),
                QoS::AtMostOnce
            )),
            1
        );
    }

    #[test]
    fn first_connect_after_early_subscribe_sends_nothing_extra() {
        let harness = mock_client("pcc");
        let telemetry = topic(&harness.client, TELEMETRY);

        // Requests made while connecting are queued by the transport itself.
        harness.client.subscribe_topic(&telemetry);
        harness.client.handle_event(TransportEvent::Connected);

        assert_eq!(
            harness.count(&Call::Subscribe(TELEMETRY.to_string(), QoS::AtMostOnce)),
            1
        );
    }

    #[test]
    fn failed_unsubscribe_still_removes_the_data_callback() {
        let harness = mock_client("pcc");
        let telemetry = topic(&harness.client, TELEMETRY);
        let data = Recorder::default();

        harness.client.subscribe_topic(&telemetry);
        harness.client.add_topic_callback(&telemetry, data.callback());
        harness.fail.set(true);
        harness.client.unsubscribe_topic(&telemetry, false);

        assert_eq!(harness.count(&Call::Unsubscribe(TELEMETRY.to_string())), 1);
        assert!(!harness.client.has_topic_callback(TELEMETRY));
        assert_eq!(harness.client.subscribed_qos(TELEMETRY), Some(QoS::AtMostOnce));

        harness.client.dispatch(TELEMETRY, "p1");
        assert!(data.payloads().is_empty());
    }

    #[test]
    fn failed_ignore_status_unsubscribe_still_clears_both_registries() {
        let harness = mock_client("pcc");
        let gps = topic(&harness.client, GPS);
        let recorder = Recorder::default();

        harness.client.add_status_callback(&gps, recorder.callback());
        harness.client.add_topic_callback(&gps, recorder.callback());
        harness.fail.set(true);
        harness.client.unsubscribe_topic(&gps, true);

        assert!(!harness.client.has_topic_callback(GPS));
        assert!(!harness.client.has_status_callback(GPS));
    }

    #[test]
    fn failed_subscribe_leaves_the_client_untouched() {
        let harness = mock_client("pcc");
        let telemetry = topic(&harness.client, TELEMETRY);
        let gps = topic(&harness.client, GPS);
        let data = Recorder::default();
        let status = Recorder::default();
        harness.client.add_topic_callback(&gps, data.callback());
        harness.client.add_status_callback(&gps, status.callback());

        harness.fail.set(true);
        harness.client.subscribe_topic(&telemetry);
        harness.client.subscribe_topic(&gps);
        harness.client.publish_on_topic(&gps, "ping");

        assert_eq!(harness.client.subscribed_qos(TELEMETRY), None);
        assert_eq!(harness.client.subscribed_qos(GPS), None);
        assert!(!harness.client.has_topic_callback(TELEMETRY));
        assert!(harness.client.has_topic_callback(GPS));
        assert!(harness.client.has_status_callback(GPS));

        harness.client.dispatch(GPS, "p1");
        assert_eq!(data.payloads(), vec!["p1"]);
        assert_eq!(status.payloads(), vec!["p1"]);
    }

    #[test]
    fn failed_disconnect_can_be_retried() {
        let harness = mock_client("pcc");
        harness.client.handle_event(TransportEvent::Connected);

        harness.fail.set(true);
        harness.client.disconnect();
        assert!(harness.client.is_connected());

        harness.fail.set(false);
        harness.client.disconnect();
        harness.client.disconnect();
        assert_eq!(harness.count(&Call::End), 2);
        assert_eq!(harness.client.state(), ClientState::Disconnected);
    }

    #[test]
    fn client_without_runtime_is_inert() {
        let client = MqttClient::new(&MqttClientInfo::new("localhost", 9001));
        assert!(matches!(client.state(), ClientState::Error(_)));

        let gps = topic(&client, GPS);
        let recorder = Recorder::default();
        client.subscribe_topic(&gps);
        client.add_topic_callback(&gps, recorder.callback());
        client.unsubscribe_topic(&gps, false);
        client.publish_on_topic(&gps, "ping");
        client.disconnect();
        client.disconnect();

        assert_eq!(client.subscribed_qos(GPS), None);
        assert!(!client.has_topic_callback(GPS));
    }

    #[tokio::test]
    async fn unsupported_connection_method_is_logged_not_raised() {
        let mut info = MqttClientInfo::new("localhost", 9001);
        info.connection_method = "carrier-pigeon".to_string();

        let client = MqttClient::new(&info);
        assert!(matches!(client.state(), ClientState::Error(_)));
        client.run().await;
    }

    #[tokio::test]
    async fn run_loop_dispatches_events_in_order() {
        let harness = mock_client("pcc");
        let telemetry = topic(&harness.client, TELEMETRY);
        let data = Recorder::default();
        harness.client.add_topic_callback(&telemetry, data.callback());

        for event in [
            TransportEvent::Connected,
            TransportEvent::SubscribeAck {
                pkid: 1,
                granted: vec![Some(QoS::AtMostOnce)],
            },
            TransportEvent::Message {
                topic: TELEMETRY.to_string(),
                payload: "p1".to_string(),
            },
            TransportEvent::Message {
                topic: GPS.to_string(),
                payload: "ignored".to_string(),
            },
            TransportEvent::Message {
                topic: TELEMETRY.to_string(),
                payload: "p2".to_string(),
            },
        ] {
            harness.events.send(event).unwrap();
        }

        let client = harness.client.clone();
        drop(harness.events);
        client.run().await;

        assert_eq!(data.payloads(), vec!["p1", "p2"]);
        assert!(client.is_connected());

        // The event stream was consumed by the first run.
        client.run().await;
    }

    #[tokio::test]
    async fn disconnected_event_resets_state() {
        let harness = mock_client("companion");
        harness.events.send(TransportEvent::Connected).unwrap();
        harness.events.send(TransportEvent::Disconnected).unwrap();
        let client = harness.client.clone();
        drop(harness.events);

        client.run().await;
        assert_eq!(client.state(), ClientState::Disconnected);
        client.disconnect();
        assert!(harness.calls.borrow().is_empty());
    }
}
