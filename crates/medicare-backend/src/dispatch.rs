use std::sync::Arc;

use medicare::command::Command;
use medicare::topic::Topic;

use serde::Serialize;

use tracing::{error, info, warn};

use crate::command::{CommandBuilder, CommandRequest, generate_token};
use crate::correlation::CorrelationTable;
use crate::error::{Error, Result};
use crate::model::Id;
use crate::relay::Publisher;

// Attempts to draw a correlation token which is not already pending.
const TOKEN_ATTEMPTS: usize = 3;

/// The outcome of a command dispatch.
///
/// A `true` result only means the command has been handed to the broker.
/// The device outcome arrives later through the real-time fanout.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    /// Topic the command has been published on.
    pub topic: String,
    /// The published command.
    pub command: Command,
    /// Whether the command has been handed to the broker.
    pub result: bool,
    /// A human-readable description of the outcome.
    pub message: String,
}

/// Sends commands to devices.
pub struct Dispatcher<P: Publisher> {
    builder: CommandBuilder,
    correlations: Arc<CorrelationTable>,
    publisher: P,
    namespace: String,
}

impl<P: Publisher> Dispatcher<P> {
    /// Creates a [`Dispatcher`] publishing the commands under `namespace`.
    #[must_use]
    pub fn new(
        builder: CommandBuilder,
        correlations: Arc<CorrelationTable>,
        publisher: P,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            builder,
            correlations,
            publisher,
            namespace: namespace.into(),
        }
    }

    /// Returns the table of the commands awaiting their results.
    #[must_use]
    pub fn correlations(&self) -> &Arc<CorrelationTable> {
        &self.correlations
    }

    /// Builds a command and publishes it to the command topic of a device.
    ///
    /// The command is registered in the [`CorrelationTable`] before being
    /// published, so its result can be matched as soon as it arrives.
    /// The call returns without waiting for the device.
    ///
    /// A publishing failure is not an error: the outcome reports it with a
    /// `false` result, and the command stays pending.
    ///
    /// # Errors
    ///
    /// An error is returned when the command cannot be built. In that case
    /// nothing is registered and nothing is published.
    pub async fn dispatch(
        &self,
        device_id: Id,
        request: &CommandRequest,
    ) -> Result<DispatchOutcome> {
        let (device, mut command) =
            self.builder
                .build(device_id, request.command_id, &request.params)?;

        self.register(&mut command, &device.serie_number)?;

        let payload = match command.to_vec() {
            Ok(payload) => payload,
            Err(e) => {
                let _ = self.correlations.remove(&command.hash);
                error!("Impossible to encode the command `{}`: {e}", command.command);
                return Err(Error::internal("Impossible to encode the command."));
            }
        };

        let topic = Topic::Command(device.serie_number).to_topic(&self.namespace);

        let (result, message) = match self.publisher.publish(topic.clone(), payload).await {
            Ok(()) => {
                info!("Command `{}` sent on `{topic}`", command.command);
                (true, format!("Command sent to {}", device.alias_name))
            }
            Err(e) => {
                warn!("Impossible to send the command `{}` on `{topic}`: {e}", command.command);
                (
                    false,
                    format!("Command not sent to {}: {}", device.alias_name, e.description()),
                )
            }
        };

        Ok(DispatchOutcome {
            topic,
            command,
            result,
            message,
        })
    }

    fn register(&self, command: &mut Command, serie_number: &str) -> Result<()> {
        let mut attempts = 1;
        loop {
            match self.correlations.register(command, serie_number) {
                Ok(()) => return Ok(()),
                Err(e) if attempts >= TOKEN_ATTEMPTS => return Err(e),
                Err(_) => {
                    command.hash = generate_token();
                    attempts += 1;
                }
            }
        }
    }
}
