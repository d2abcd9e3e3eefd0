use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::DefaultHashBuilder;

use indexmap::IndexMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind, Result};
use crate::value::ValueType;

/// Command parameters, keyed by their declared names.
///
/// Insertion order is preserved on the wire.
pub type Params = IndexMap<String, TypedValue, DefaultHashBuilder>;

/// A raw parameter value together with its declared type.
///
/// The value is transmitted as a string, exactly as it has been supplied by
/// the caller. A device is responsible for interpreting it according to
/// its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypedValue {
    /// Declared type.
    #[serde(rename = "type")]
    pub value_type: ValueType,
    /// Raw value.
    pub value: String,
}

impl TypedValue {
    /// Creates a [`TypedValue`].
    #[must_use]
    pub fn new(value_type: ValueType, value: impl Into<String>) -> Self {
        Self {
            value_type,
            value: value.into(),
        }
    }
}

/// A command published to a device.
///
/// The `hash` field is the correlation token a device must echo in its
/// [`CommandResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Correlation token.
    pub hash: String,
    /// Command name.
    pub command: String,
    /// Command parameters.
    #[serde(default)]
    pub params: Params,
}

impl Command {
    /// Creates a [`Command`] without parameters.
    #[must_use]
    pub fn new(hash: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            command: command.into(),
            params: Params::default(),
        }
    }

    /// Adds a parameter to a [`Command`].
    ///
    /// A parameter with the same name replaces the previous one while keeping
    /// its original position.
    #[must_use]
    #[inline]
    pub fn param(mut self, name: impl Into<String>, value: TypedValue) -> Self {
        let _ = self.params.insert(name.into(), value);
        self
    }

    /// Encodes a [`Command`] as `JSON` bytes.
    ///
    /// # Errors
    ///
    /// An error is returned when the command cannot be serialized.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| {
            Error::new(
                ErrorKind::Payload,
                alloc::format!("Impossible to encode the command: {e}"),
            )
        })
    }
}

/// The result a device publishes once it has executed a [`Command`].
///
/// Any additional key in the payload is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    /// The correlation token of the executed command.
    pub hash: String,
    /// The command outcome.
    #[serde(default)]
    pub result: serde_json::Value,
}

impl CommandResult {
    /// Decodes a [`CommandResult`] from `JSON` bytes.
    ///
    /// # Errors
    ///
    /// An error is returned when the payload is not a `JSON` object
    /// containing a `hash` string.
    pub fn from_slice(payload: &[u8]) -> Result<Self> {
        serde_json::from_slice(payload).map_err(|e| {
            Error::new(
                ErrorKind::Payload,
                alloc::format!("Invalid command result: {e}"),
            )
        })
    }
}
