use alloc::string::String;

use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use crate::error::{Error, ErrorKind, Result};

/// The sentinel a device publishes on its values topic to announce
/// it is alive.
pub const CONNECTED: &str = "Connected";

/// Field values, keyed by field name, in the order they were reported.
pub type Fields = IndexMap<String, serde_json::Value, DefaultHashBuilder>;

/// A telemetry message published by a device on its values topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    /// The device announced it is alive. It carries no data.
    Connected,
    /// One or more field readings.
    Fields(Fields),
}

impl Values {
    /// Decodes a telemetry message.
    ///
    /// The [`CONNECTED`] sentinel is accepted either bare or as a `JSON`
    /// string, ignoring surrounding whitespace.
    ///
    /// # Errors
    ///
    /// An error is returned when the payload is neither the sentinel nor a
    /// `JSON` object.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        let trimmed = payload.trim_ascii();
        if trimmed == CONNECTED.as_bytes() {
            return Ok(Self::Connected);
        }

        // Decoding straight into `Fields` keeps the order of the keys.
        if let Ok(fields) = serde_json::from_slice::<Fields>(trimmed) {
            return Ok(Self::Fields(fields));
        }

        match serde_json::from_slice::<serde_json::Value>(trimmed) {
            Ok(serde_json::Value::String(text)) if text == CONNECTED => Ok(Self::Connected),
            Ok(other) => Err(Error::new(
                ErrorKind::Payload,
                alloc::format!("Expected a JSON object of field values, found `{other}`"),
            )),
            Err(e) => Err(Error::new(
                ErrorKind::Payload,
                alloc::format!("Invalid values payload: {e}"),
            )),
        }
    }
}
