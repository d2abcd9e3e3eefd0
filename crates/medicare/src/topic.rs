use alloc::format;
use alloc::string::String;

/// The default namespace of all `medicare` topics.
pub const DEFAULT_NAMESPACE: &str = "medicare";

const COMMAND: &str = "command";
const COMMAND_RESULT: &str = "commandresult";
const VALUES: &str = "values";

/// A topic of the `medicare` namespace.
///
/// Every topic is scoped to a single device through its serial number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Commands published by the backend to a device.
    Command(String),
    /// Command results published by a device.
    CommandResult(String),
    /// Telemetry values published by a device.
    Values(String),
}

impl Topic {
    /// Parses a topic belonging to the given namespace.
    ///
    /// Returns [`None`] when the topic lies outside of the namespace, has an
    /// unknown kind, or lacks a serial number.
    #[must_use]
    pub fn parse(namespace: &str, topic: &str) -> Option<Self> {
        let relative = if namespace.is_empty() {
            topic
        } else {
            topic.strip_prefix(namespace)?.strip_prefix('/')?
        };

        let (kind, serie_number) = relative.split_once('/')?;
        if serie_number.is_empty() || serie_number.contains('/') {
            return None;
        }

        let serie_number = String::from(serie_number);
        match kind {
            COMMAND => Some(Self::Command(serie_number)),
            COMMAND_RESULT => Some(Self::CommandResult(serie_number)),
            VALUES => Some(Self::Values(serie_number)),
            _ => None,
        }
    }

    /// Returns the device serial number a topic is scoped to.
    #[must_use]
    pub fn serie_number(&self) -> &str {
        match self {
            Self::Command(serie_number)
            | Self::CommandResult(serie_number)
            | Self::Values(serie_number) => serie_number,
        }
    }

    /// Builds the full topic name inside the given namespace.
    #[must_use]
    pub fn to_topic(&self, namespace: &str) -> String {
        let kind = match self {
            Self::Command(_) => COMMAND,
            Self::CommandResult(_) => COMMAND_RESULT,
            Self::Values(_) => VALUES,
        };

        if namespace.is_empty() {
            format!("{kind}/{}", self.serie_number())
        } else {
            format!("{namespace}/{kind}/{}", self.serie_number())
        }
    }
}

/// Returns the wildcard subscription covering every topic of a namespace.
#[must_use]
pub fn subscription(namespace: &str) -> String {
    if namespace.is_empty() {
        String::from("#")
    } else {
        format!("{namespace}/#")
    }
}
