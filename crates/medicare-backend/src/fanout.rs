use serde::Serialize;

use tokio::sync::broadcast;

use tokio_util::sync::CancellationToken;

use tracing::debug;

/// Default number of events buffered for each real-time client.
pub const DEFAULT_CAPACITY: usize = 256;

/// The outcome of a command, as reported by a device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutcome {
    /// Command name.
    pub command: String,
    /// Serial number of the device which executed the command.
    pub serie_number: String,
    /// Command result.
    pub result: serde_json::Value,
}

/// A single field reading.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValue {
    /// Serial number of the device which reported the reading.
    pub serie_number: String,
    /// Field name.
    pub name: String,
    /// Field value.
    pub value: serde_json::Value,
}

/// An event delivered to real-time clients.
#[derive(Debug, Clone, PartialEq)]
pub enum FanoutEvent {
    /// A command result.
    Command(CommandOutcome),
    /// A field reading.
    Values(FieldValue),
}

impl FanoutEvent {
    /// Returns the channel name of the event.
    #[must_use]
    pub const fn channel(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Values(_) => "values",
        }
    }

    /// Returns the `JSON` payload of the event.
    #[must_use]
    pub fn payload(&self) -> serde_json::Value {
        // Both payloads are plain structs of strings and `JSON` values,
        // so their conversion cannot fail.
        match self {
            Self::Command(outcome) => serde_json::to_value(outcome),
            Self::Values(field) => serde_json::to_value(field),
        }
        .unwrap_or(serde_json::Value::Null)
    }
}

/// Broadcasts [`FanoutEvent`]s to every connected real-time client.
///
/// Clients which cannot keep up lose the oldest events. There is no
/// delivery guarantee and no replay.
#[derive(Debug, Clone)]
pub struct Fanout {
    sender: broadcast::Sender<FanoutEvent>,
    closed: CancellationToken,
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Fanout {
    /// Creates a [`Fanout`] buffering `capacity` events per client.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            closed: CancellationToken::new(),
        }
    }

    /// Subscribes a new client.
    ///
    /// The client receives the events broadcast after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FanoutEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event, returning the number of clients it has been
    /// delivered to.
    ///
    /// Without clients, the event is discarded.
    pub fn broadcast(&self, event: FanoutEvent) -> usize {
        let channel = event.channel();
        self.sender.send(event).map_or_else(
            |_| {
                debug!("No real-time client on channel `{channel}`, event discarded");
                0
            },
            |receivers| receivers,
        )
    }

    /// Returns the number of connected clients.
    #[must_use]
    pub fn clients(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Closes the streams of every connected client.
    pub fn close(&self) {
        self.closed.cancel();
    }

    /// Returns a token cancelled when the [`Fanout`] is closed.
    #[must_use]
    pub fn closed(&self) -> CancellationToken {
        self.closed.clone()
    }
}
