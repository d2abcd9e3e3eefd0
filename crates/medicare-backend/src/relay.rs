use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use medicare::command::CommandResult;
use medicare::topic::{Topic, subscription};
use medicare::values::Values;

use rumqttc::v5::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, mqttbytes::QoS,
    mqttbytes::v5::Packet,
};

use tokio::task::JoinHandle;

use tokio_util::sync::CancellationToken;

use tracing::{debug, error, info, warn};

use crate::correlation::CorrelationTable;
use crate::error::{Error, ErrorKind, Result};
use crate::fanout::{CommandOutcome, Fanout, FanoutEvent, FieldValue};

// The capacity of the bounded asynchronous channel.
const ASYNC_CHANNEL_CAPACITY: usize = 10;

// Keep alive time to send `pingreq` to broker when the connection is idle.
const KEEP_ALIVE_TIME: Duration = Duration::from_secs(5);

// Time waited before polling the broker again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Publishes payloads on a broker topic.
pub trait Publisher: Send + Sync + 'static {
    /// Publishes `payload` on `topic`.
    ///
    /// # Errors
    ///
    /// An error is returned when the payload cannot be handed to the broker.
    fn publish(&self, topic: String, payload: Vec<u8>) -> impl Future<Output = Result<()>> + Send;
}

/// A [`Publisher`] backed by an `MQTT` client.
///
/// Payloads are published with an at-least-once quality of service and
/// they are never retained by the broker.
///
/// Publishing never waits: it fails while the broker is disconnected and
/// when the request queue of the client is full.
#[derive(Debug, Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttPublisher {
    /// Creates a [`MqttPublisher`] whose broker connection state is
    /// tracked by `connected`.
    #[must_use]
    #[inline]
    pub const fn new(client: AsyncClient, connected: Arc<AtomicBool>) -> Self {
        Self { client, connected }
    }

    /// Whether the broker connection is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl Publisher for MqttPublisher {
    async fn publish(&self, topic: String, payload: Vec<u8>) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::new(ErrorKind::Transport, "The broker is not connected."));
        }

        // The event loop drains the queue only while the connection is up.
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .map_err(|e| {
                Error::new(
                    ErrorKind::Transport,
                    format!("The broker connection is congested: {e}"),
                )
            })
    }
}

/// Broker connection options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOptions {
    /// Broker host.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Client identifier.
    pub client_id: String,
    /// Keep alive interval.
    pub keep_alive: Duration,
}

impl RelayOptions {
    /// Creates [`RelayOptions`] with the default keep alive interval.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: client_id.into(),
            keep_alive: KEEP_ALIVE_TIME,
        }
    }
}

/// Routes the messages published by devices.
///
/// Command results are matched against the [`CorrelationTable`], field
/// readings are split one per field. Both are then broadcast through the
/// [`Fanout`].
#[derive(Debug, Clone)]
pub struct Relay {
    correlations: Arc<CorrelationTable>,
    fanout: Fanout,
    namespace: String,
}

impl Relay {
    /// Creates a [`Relay`] for the topics under `namespace`.
    #[must_use]
    pub fn new(
        correlations: Arc<CorrelationTable>,
        fanout: Fanout,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            correlations,
            fanout,
            namespace: namespace.into(),
        }
    }

    /// Returns the topic namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Handles a message received on `topic`, returning the number of
    /// events broadcast.
    ///
    /// Malformed payloads and unknown topics are logged and dropped.
    pub fn handle_message(&self, topic: &str, payload: &[u8]) -> usize {
        match Topic::parse(&self.namespace, topic) {
            Some(Topic::CommandResult(serie_number)) => {
                self.handle_command_result(serie_number, payload)
            }
            Some(Topic::Values(serie_number)) => self.handle_values(&serie_number, payload),
            // Commands published by this backend are received back through
            // the wildcard subscription.
            Some(Topic::Command(_)) => 0,
            None => {
                debug!("Message on unknown topic `{topic}`, discard it");
                0
            }
        }
    }

    fn handle_command_result(&self, serie_number: String, payload: &[u8]) -> usize {
        let CommandResult { hash, result } = match CommandResult::from_slice(payload) {
            Ok(command_result) => command_result,
            Err(e) => {
                warn!("Discard the command result of `{serie_number}`: {e}");
                return 0;
            }
        };

        let Some(pending) = self.correlations.resolve(&hash, &serie_number) else {
            debug!("No pending command for token {hash}, discard the result of `{serie_number}`");
            return 0;
        };

        info!(
            "Command `{}` executed by `{serie_number}`",
            pending.command
        );
        let _ = self.fanout.broadcast(FanoutEvent::Command(CommandOutcome {
            command: pending.command,
            serie_number,
            result,
        }));
        1
    }

    fn handle_values(&self, serie_number: &str, payload: &[u8]) -> usize {
        let fields = match Values::parse(payload) {
            Ok(Values::Connected) => {
                info!("Device `{serie_number}` connected");
                return 0;
            }
            Ok(Values::Fields(fields)) => fields,
            Err(e) => {
                warn!("Discard the values of `{serie_number}`: {e}");
                return 0;
            }
        };

        let count = fields.len();
        for (name, value) in fields {
            let _ = self.fanout.broadcast(FanoutEvent::Values(FieldValue {
                serie_number: serie_number.into(),
                name,
                value,
            }));
        }
        count
    }
}

// State of the broker session, owned by the event loop task.
#[derive(Debug)]
struct Session {
    connected: Arc<AtomicBool>,
    subscription_pending: bool,
}

impl Session {
    fn new(connected: Arc<AtomicBool>) -> Self {
        Self {
            connected,
            subscription_pending: false,
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    // The request queue may still be full of publishes queued before an
    // outage, so a failed attempt is repeated after the next event.
    fn subscribe(&mut self, client: &AsyncClient, namespace: &str) {
        if !self.subscription_pending || !self.connected.load(Ordering::Acquire) {
            return;
        }

        let topic = subscription(namespace);
        match client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
            Ok(()) => {
                info!("Subscribing to `{topic}`");
                self.subscription_pending = false;
            }
            Err(e) => warn!("Impossible to subscribe to topic `{topic}` yet, retry later: {e}"),
        }
    }
}

fn handle_event(
    event: std::result::Result<Event, ConnectionError>,
    client: &AsyncClient,
    relay: &Relay,
    session: &mut Session,
) -> bool {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            session.set_connected(false);
            error!("Error in receiving the event, retry later: {e}");
            return false;
        }
    };

    if let Event::Incoming(packet) = event {
        match packet {
            Packet::ConnAck(_) => {
                info!("Connected to the broker");
                session.set_connected(true);
                // Subscriptions are lost when the session is not persistent,
                // so they are renewed on every connection.
                session.subscription_pending = true;
            }
            Packet::Publish(publish) => match std::str::from_utf8(&publish.topic) {
                Ok(topic) => {
                    let _ = relay.handle_message(topic, &publish.payload);
                }
                Err(e) => warn!("Topic is not valid UTF-8, discard the message: {e}"),
            },
            Packet::Disconnect(_) => {
                session.set_connected(false);
                warn!("Disconnected by the broker");
            }
            _ => {}
        }
    }

    session.subscribe(client, relay.namespace());
    true
}

async fn run_relay(
    client: AsyncClient,
    mut eventloop: EventLoop,
    relay: Relay,
    mut session: Session,
    cancellation_token: CancellationToken,
) {
    loop {
        tokio::select! {
            // Use the cancellation token to stop the loop
            () = cancellation_token.cancelled() => { break; }
            // Poll the `MQTT` event coming from the network
            event = eventloop.poll() => {
                if !handle_event(event, &client, &relay, &mut session) {
                    tokio::select! {
                        () = cancellation_token.cancelled() => { break; }
                        () = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }
                }
            }
        }
    }

    session.set_connected(false);
    if let Err(e) = client.try_disconnect() {
        debug!("Impossible to disconnect from the broker: {e}");
    }
    drop(eventloop);
}

/// Runs the broker connection.
pub struct RelayRunner;

impl RelayRunner {
    /// Connects to the broker and spawns the task relaying the messages
    /// published by devices.
    ///
    /// The returned [`MqttPublisher`] shares the connection of the task
    /// and refuses to publish until the broker acknowledges it. The task
    /// reconnects after connection errors and stops when the cancellation
    /// token is cancelled.
    #[must_use]
    pub fn start(
        options: &RelayOptions,
        relay: Relay,
        cancellation_token: CancellationToken,
    ) -> (MqttPublisher, JoinHandle<()>) {
        let mut mqttoptions =
            MqttOptions::new(options.client_id.as_str(), options.host.as_str(), options.port);
        let _ = mqttoptions.set_keep_alive(options.keep_alive);

        let (client, eventloop) = AsyncClient::new(mqttoptions, ASYNC_CHANNEL_CAPACITY);

        info!(
            "Relaying messages from {}:{} as `{}`",
            options.host, options.port, options.client_id
        );
        let connected = Arc::new(AtomicBool::new(false));
        let handle = tokio::spawn(run_relay(
            client.clone(),
            eventloop,
            relay,
            Session::new(Arc::clone(&connected)),
            cancellation_token,
        ));

        (MqttPublisher::new(client, connected), handle)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use medicare::command::Command;

    use rumqttc::Outgoing;
    use rumqttc::v5::mqttbytes::QoS;
    use rumqttc::v5::mqttbytes::v5::{
        ConnAck, ConnectReturnCode, Disconnect, DisconnectReasonCode, Packet,
    };
    use rumqttc::v5::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Request};

    use serde_json::json;

    use tokio::sync::broadcast::error::TryRecvError;

    use crate::correlation::CorrelationTable;
    use crate::error::ErrorKind;
    use crate::fanout::{CommandOutcome, Fanout, FanoutEvent, FieldValue};

    use super::{ASYNC_CHANNEL_CAPACITY, MqttPublisher, Publisher, Relay, Session, handle_event};

    fn relay() -> (Relay, Arc<CorrelationTable>, Fanout) {
        let correlations = Arc::new(CorrelationTable::default());
        let fanout = Fanout::new(16);
        let relay = Relay::new(Arc::clone(&correlations), fanout.clone(), "medicare");
        (relay, correlations, fanout)
    }

    // A client whose event loop is never polled, as while the broker is
    // unreachable.
    fn stalled_client() -> (AsyncClient, EventLoop) {
        AsyncClient::new(
            MqttOptions::new("medicare-test", "127.0.0.1", 1),
            ASYNC_CHANNEL_CAPACITY,
        )
    }

    fn connack() -> std::result::Result<Event, ConnectionError> {
        Ok(Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        })))
    }

    fn reading(name: &str, value: serde_json::Value) -> FanoutEvent {
        FanoutEvent::Values(FieldValue {
            serie_number: "TH-001".into(),
            name: name.into(),
            value,
        })
    }

    #[test]
    fn command_result_resolved_once() {
        let (relay, correlations, fanout) = relay();
        let mut client = fanout.subscribe();
        correlations.register(&Command::new("42", "read"), "TH-001").unwrap();

        let payload = br#"{"hash":"42","result":{"temperature":36.6},"extra":1}"#;
        assert_eq!(
            relay.handle_message("medicare/commandresult/TH-001", payload),
            1
        );
        assert_eq!(
            client.try_recv().unwrap(),
            FanoutEvent::Command(CommandOutcome {
                command: "read".into(),
                serie_number: "TH-001".into(),
                result: json!({ "temperature": 36.6 }),
            })
        );
        assert!(correlations.is_empty());

        // A duplicated result is dropped.
        assert_eq!(
            relay.handle_message("medicare/commandresult/TH-001", payload),
            0
        );
        assert_eq!(client.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn unknown_token() {
        let (relay, correlations, fanout) = relay();
        let mut client = fanout.subscribe();
        correlations.register(&Command::new("42", "read"), "TH-001").unwrap();

        assert_eq!(
            relay.handle_message("medicare/commandresult/TH-001", br#"{"hash":"7"}"#),
            0
        );
        assert_eq!(client.try_recv(), Err(TryRecvError::Empty));
        assert!(correlations.contains("42"));
    }

    #[test]
    fn one_event_per_field() {
        let (relay, _, fanout) = relay();
        let mut client = fanout.subscribe();

        let payload = br#"{"temperature": 36.6, "battery": 80, "alarm": false}"#;
        assert_eq!(relay.handle_message("medicare/values/TH-001", payload), 3);

        assert_eq!(client.try_recv().unwrap(), reading("temperature", json!(36.6)));
        assert_eq!(client.try_recv().unwrap(), reading("battery", json!(80)));
        assert_eq!(client.try_recv().unwrap(), reading("alarm", json!(false)));
        assert_eq!(client.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn connected_sentinel() {
        let (relay, _, fanout) = relay();
        let mut client = fanout.subscribe();

        assert_eq!(relay.handle_message("medicare/values/TH-001", b"Connected"), 0);
        assert_eq!(
            relay.handle_message("medicare/values/TH-001", br#""Connected""#),
            0
        );
        assert_eq!(client.try_recv(), Err(TryRecvError::Empty));
    }

    #[test]
    fn ignored_messages() {
        let (relay, correlations, fanout) = relay();
        let mut client = fanout.subscribe();
        correlations.register(&Command::new("42", "read"), "TH-001").unwrap();

        for (topic, payload) in [
            // Echo of a published command.
            (
                "medicare/command/TH-001",
                br#"{"hash":"42","command":"read","params":{}}"#.as_slice(),
            ),
            // Unknown topics.
            ("medicare/status/TH-001", br#"{"hash":"42"}"#.as_slice()),
            ("other/commandresult/TH-001", br#"{"hash":"42"}"#.as_slice()),
            // Malformed payloads.
            ("medicare/commandresult/TH-001", b"not json".as_slice()),
            ("medicare/commandresult/TH-001", br#"{"result":true}"#.as_slice()),
            ("medicare/values/TH-001", b"[1, 2]".as_slice()),
            ("medicare/values/TH-001", b"{".as_slice()),
        ] {
            assert_eq!(relay.handle_message(topic, payload), 0, "{topic}");
        }

        assert_eq!(client.try_recv(), Err(TryRecvError::Empty));
        assert!(correlations.contains("42"));
    }

    #[test]
    fn no_clients() {
        let (relay, _, _) = relay();

        // Events are counted even when nobody listens.
        assert_eq!(
            relay.handle_message("medicare/values/TH-001", br#"{"spo2": 97}"#),
            1
        );
    }

    #[test]
    fn result_from_another_device() {
        let (relay, correlations, fanout) = relay();
        let mut client = fanout.subscribe();
        correlations.register(&Command::new("42", "read"), "TH-001")
            .unwrap();

        assert_eq!(
            relay.handle_message("medicare/commandresult/OX-001", br#"{"hash":"42"}"#),
            0
        );
        assert_eq!(client.try_recv(), Err(TryRecvError::Empty));
        assert!(correlations.contains("42"));

        // The target device can still answer.
        assert_eq!(
            relay.handle_message("medicare/commandresult/TH-001", br#"{"hash":"42"}"#),
            1
        );
    }

    #[tokio::test]
    async fn publish_while_disconnected() {
        let (client, _eventloop) = stalled_client();
        let publisher = MqttPublisher::new(client, Arc::new(AtomicBool::new(false)));

        let error = publisher
            .publish("medicare/command/TH-001".into(), b"{}".to_vec())
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Transport);
    }

    #[tokio::test]
    async fn publish_on_full_queue() {
        let (client, _eventloop) = stalled_client();
        let publisher = MqttPublisher::new(client, Arc::new(AtomicBool::new(true)));

        for _ in 0..ASYNC_CHANNEL_CAPACITY {
            publisher
                .publish("medicare/command/TH-001".into(), b"{}".to_vec())
                .await
                .unwrap();
        }

        // The queue is never drained, the publish fails instead of waiting.
        let error = publisher
            .publish("medicare/command/TH-001".into(), b"{}".to_vec())
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Transport);
    }

    #[test]
    fn connection_state() {
        let (relay, _, _) = relay();
        let (client, _eventloop) = stalled_client();
        let connected = Arc::new(AtomicBool::new(false));
        let publisher = MqttPublisher::new(client.clone(), Arc::clone(&connected));
        let mut session = Session::new(connected);

        assert!(handle_event(connack(), &client, &relay, &mut session));
        assert!(publisher.is_connected());

        assert!(handle_event(
            Ok(Event::Incoming(Packet::Disconnect(Disconnect::new(DisconnectReasonCode::NormalDisconnection)))),
            &client,
            &relay,
            &mut session
        ));
        assert!(!publisher.is_connected());

        assert!(handle_event(connack(), &client, &relay, &mut session));
        assert!(!handle_event(
            Err(ConnectionError::RequestsDone),
            &client,
            &relay,
            &mut session
        ));
        assert!(!publisher.is_connected());
    }

    #[test]
    fn subscription_retried_on_full_queue() {
        let (relay, _, _) = relay();
        let (client, mut eventloop) = stalled_client();
        let mut session = Session::new(Arc::new(AtomicBool::new(false)));

        // Publishes queued before the connection comes back.
        for _ in 0..ASYNC_CHANNEL_CAPACITY {
            client
                .try_publish(
                    "medicare/command/TH-001",
                    QoS::AtLeastOnce,
                    false,
                    b"{}".to_vec(),
                )
                .unwrap();
        }

        assert!(handle_event(connack(), &client, &relay, &mut session));
        assert!(session.subscription_pending);

        // The event loop drains the queue, the next event renews the
        // subscription.
        eventloop.clean();
        assert!(handle_event(
            Ok(Event::Outgoing(Outgoing::PingReq)),
            &client,
            &relay,
            &mut session
        ));
        assert!(!session.subscription_pending);

        eventloop.clean();
        match eventloop.pending.back() {
            Some(Request::Subscribe(subscribe)) => {
                assert_eq!(subscribe.filters[0].path, "medicare/#");
            }
            request => panic!("Expected a subscription, found {request:?}"),
        }
    }
}
