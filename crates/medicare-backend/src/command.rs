use std::sync::Arc;

use medicare::command::{Command, TypedValue};
use medicare::value::ValueType;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{Device, Id};
use crate::policy::Policy;
use crate::store::Store;

/// A raw value supplied for an action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamValue {
    /// Parameter identifier.
    pub param_id: Id,
    /// Raw value.
    pub value: String,
}

impl ParamValue {
    /// Creates a [`ParamValue`].
    #[must_use]
    pub fn new(param_id: Id, value: impl Into<String>) -> Self {
        Self {
            param_id,
            value: value.into(),
        }
    }
}

/// A request to run an action on a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Action identifier.
    pub command_id: Id,
    /// Parameter values.
    #[serde(default)]
    pub params: Vec<ParamValue>,
}

/// Generates a correlation token.
///
/// The token is a random 128-bit number rendered in decimal. It is unique
/// enough to match results with commands, but it is not a secret.
#[must_use]
#[inline]
pub fn generate_token() -> String {
    rand::random::<u128>().to_string()
}

/// Builds [`Command`]s validating them against the device type schemas.
#[derive(Clone)]
pub struct CommandBuilder {
    store: Arc<dyn Store>,
    policy: Policy,
}

impl CommandBuilder {
    /// Creates a [`CommandBuilder`].
    #[must_use]
    #[inline]
    pub fn new(store: Arc<dyn Store>, policy: Policy) -> Self {
        Self { store, policy }
    }

    /// Builds the [`Command`] running an action on a device.
    ///
    /// Parameters are keyed by their declared names and typed according to
    /// their declared type codes. The target [`Device`] is returned together
    /// with the command.
    ///
    /// # Errors
    ///
    /// - The device, the action, or any parameter does not exist
    /// - The [`Policy`] rejects the action or one of its parameters
    /// - A parameter has a type code outside of the known ones
    ///
    /// No command is built when any parameter fails.
    pub fn build(
        &self,
        device_id: Id,
        action_id: Id,
        params: &[ParamValue],
    ) -> Result<(Device, Command)> {
        let device = self
            .store
            .device(device_id)?
            .ok_or_else(|| Error::not_found(format!("Device {device_id} not found.")))?;

        let action = self
            .store
            .action(action_id)?
            .ok_or_else(|| Error::not_found(format!("Action {action_id} not found.")))?;

        self.policy.check_action(&device, &action)?;

        let mut command = Command::new(generate_token(), action.name.as_str());
        for ParamValue { param_id, value } in params {
            let param = self
                .store
                .param(*param_id)?
                .ok_or_else(|| Error::not_found(format!("Parameter {param_id} not found.")))?;

            self.policy.check_param(&action, &param)?;

            let value_type = ValueType::try_from(param.param_type).map_err(|e| {
                Error::validation(format!("Parameter `{}` is malformed: {e}", param.name))
            })?;

            command = command.param(param.name, TypedValue::new(value_type, value.as_str()));
        }

        Ok((device, command))
    }
}
