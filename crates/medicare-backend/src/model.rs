use chrono::NaiveDateTime;

use medicare::value::ValueType;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// An entity identifier, assigned by the store.
pub type Id = u32;

fn require(value: &str, what: &'static str) -> Result<()> {
    if value.trim().is_empty() {
        Err(Error::validation(format!("The {what} must not be empty.")))
    } else {
        Ok(())
    }
}

fn require_opt(value: Option<&str>, what: &'static str) -> Result<()> {
    value.map_or(Ok(()), |value| require(value, what))
}

// Keeps an explicit `null` apart from a missing key: the former clears a
// nullable column, the latter leaves it untouched.
fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn require_param_type(param_type: u8) -> Result<()> {
    ValueType::from_code(param_type).map(|_| ()).ok_or_else(|| {
        Error::validation(format!(
            "Parameter type `{param_type}` is not in the range 0..=5."
        ))
    })
}

/// A class of devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceType {
    /// Identifier.
    pub id: Id,
    /// Unique name.
    pub name: String,
}

/// Input data to create a [`DeviceType`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewDeviceType {
    /// Unique name.
    pub name: String,
}

impl NewDeviceType {
    pub(crate) fn validate(&self) -> Result<()> {
        require(&self.name, "device type name")
    }
}

/// Input data to update a [`DeviceType`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceTypeUpdate {
    /// Unique name.
    pub name: Option<String>,
}

impl DeviceTypeUpdate {
    pub(crate) fn validate(&self) -> Result<()> {
        require_opt(self.name.as_deref(), "device type name")
    }
}

/// A value reported by the devices of a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceField {
    /// Identifier.
    pub id: Id,
    /// Field name, as it appears in telemetry messages.
    pub name: String,
    /// Field type.
    pub field_type: ValueType,
    /// Measurement unit.
    pub unit: Option<String>,
    /// Owning device type.
    pub device_type: Id,
}

/// Input data to create a [`DeviceField`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewDeviceField {
    /// Field name.
    pub name: String,
    /// Field type.
    pub field_type: ValueType,
    /// Measurement unit.
    #[serde(default)]
    pub unit: Option<String>,
    /// Owning device type.
    pub device_type: Id,
}

impl NewDeviceField {
    pub(crate) fn validate(&self) -> Result<()> {
        require(&self.name, "field name")
    }
}

/// Input data to update a [`DeviceField`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceFieldUpdate {
    /// Field name.
    pub name: Option<String>,
    /// Field type.
    pub field_type: Option<ValueType>,
    /// Measurement unit, cleared by `Some(None)`.
    #[serde(default, deserialize_with = "nullable")]
    pub unit: Option<Option<String>>,
    /// Owning device type.
    pub device_type: Option<Id>,
}

impl DeviceFieldUpdate {
    pub(crate) fn validate(&self) -> Result<()> {
        require_opt(self.name.as_deref(), "field name")
    }
}

/// An operation the devices of a type can run remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAction {
    /// Identifier.
    pub id: Id,
    /// Action name, sent to a device as the command name.
    pub name: String,
    /// Identifier of the device-side operation.
    pub function: String,
    /// Owning device type.
    pub device_type: Id,
}

/// Input data to create a [`DeviceAction`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewDeviceAction {
    /// Action name.
    pub name: String,
    /// Identifier of the device-side operation.
    pub function: String,
    /// Owning device type.
    pub device_type: Id,
}

impl NewDeviceAction {
    pub(crate) fn validate(&self) -> Result<()> {
        require(&self.name, "action name")?;
        require(&self.function, "action function")
    }
}

/// Input data to update a [`DeviceAction`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceActionUpdate {
    /// Action name.
    pub name: Option<String>,
    /// Identifier of the device-side operation.
    pub function: Option<String>,
    /// Owning device type.
    pub device_type: Option<Id>,
}

impl DeviceActionUpdate {
    pub(crate) fn validate(&self) -> Result<()> {
        require_opt(self.name.as_deref(), "action name")?;
        require_opt(self.function.as_deref(), "action function")
    }
}

/// A parameter of a [`DeviceAction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceActionParam {
    /// Identifier.
    pub id: Id,
    /// Parameter name, used as key inside a command.
    pub name: String,
    /// Parameter type code, as defined by [`ValueType::from_code`].
    pub param_type: u8,
    /// Owning action.
    pub action: Id,
}

/// Input data to create a [`DeviceActionParam`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewDeviceActionParam {
    /// Parameter name.
    pub name: String,
    /// Parameter type code.
    pub param_type: u8,
    /// Owning action.
    pub action: Id,
}

impl NewDeviceActionParam {
    pub(crate) fn validate(&self) -> Result<()> {
        require(&self.name, "parameter name")?;
        require_param_type(self.param_type)
    }
}

/// Input data to update a [`DeviceActionParam`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceActionParamUpdate {
    /// Parameter name.
    pub name: Option<String>,
    /// Parameter type code.
    pub param_type: Option<u8>,
    /// Owning action.
    pub action: Option<Id>,
}

impl DeviceActionParamUpdate {
    pub(crate) fn validate(&self) -> Result<()> {
        require_opt(self.name.as_deref(), "parameter name")?;
        self.param_type.map_or(Ok(()), require_param_type)
    }
}

/// A registered device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Identifier.
    pub id: Id,
    /// Human readable name.
    pub alias_name: String,
    /// Unique serial number, the only identity a device has on the wire.
    pub serie_number: String,
    /// Firmware version.
    pub firmware_version: Option<String>,
    /// Device type.
    pub device_type: Option<Id>,
}

/// Input data to register a [`Device`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewDevice {
    /// Human readable name.
    pub alias_name: String,
    /// Unique serial number.
    pub serie_number: String,
    /// Firmware version.
    #[serde(default)]
    pub firmware_version: Option<String>,
    /// Device type.
    #[serde(default)]
    pub device_type: Option<Id>,
    /// A user to link the device to.
    #[serde(default)]
    pub user_id: Option<Id>,
}

impl NewDevice {
    pub(crate) fn validate(&self) -> Result<()> {
        require(&self.alias_name, "device alias name")?;
        require(&self.serie_number, "device serial number")?;
        if self.serie_number.contains(['/', '+', '#']) {
            return Err(Error::validation(
                "The device serial number must not contain topic separators or wildcards.",
            ));
        }
        Ok(())
    }
}

/// Input data to update a [`Device`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DeviceUpdate {
    /// Human readable name.
    pub alias_name: Option<String>,
    /// Unique serial number.
    pub serie_number: Option<String>,
    /// Firmware version, cleared by `Some(None)`.
    #[serde(default, deserialize_with = "nullable")]
    pub firmware_version: Option<Option<String>>,
    /// Device type.
    pub device_type: Option<Id>,
}

impl DeviceUpdate {
    pub(crate) fn validate(&self) -> Result<()> {
        require_opt(self.alias_name.as_deref(), "device alias name")?;
        require_opt(self.serie_number.as_deref(), "device serial number")?;
        if self
            .serie_number
            .as_deref()
            .is_some_and(|serie_number| serie_number.contains(['/', '+', '#']))
        {
            return Err(Error::validation(
                "The device serial number must not contain topic separators or wildcards.",
            ));
        }
        Ok(())
    }
}

/// A user owning devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Identifier.
    pub id: Id,
    /// Unique e-mail address.
    pub email: String,
    /// Full name.
    pub name: String,
    /// Picture address.
    pub picture: Option<String>,
}

/// Input data to create a [`User`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewUser {
    /// Unique e-mail address.
    pub email: String,
    /// Full name.
    pub name: String,
    /// Picture address.
    #[serde(default)]
    pub picture: Option<String>,
}

impl NewUser {
    pub(crate) fn validate(&self) -> Result<()> {
        require(&self.email, "user e-mail")?;
        require(&self.name, "user name")
    }
}

/// Input data to update a [`User`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UserUpdate {
    /// Unique e-mail address.
    pub email: Option<String>,
    /// Full name.
    pub name: Option<String>,
    /// Picture address, cleared by `Some(None)`.
    #[serde(default, deserialize_with = "nullable")]
    pub picture: Option<Option<String>>,
}

impl UserUpdate {
    pub(crate) fn validate(&self) -> Result<()> {
        require_opt(self.email.as_deref(), "user e-mail")?;
        require_opt(self.name.as_deref(), "user name")
    }
}

/// A scheduled slot of a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Identifier.
    pub id: Id,
    /// Hour of the day.
    pub hour: u8,
    /// Minute of the hour.
    pub minute: u8,
    /// Start of the validity period.
    pub start_time: Option<NaiveDateTime>,
    /// End of the validity period.
    pub end_time: Option<NaiveDateTime>,
    /// Whether the slot is active.
    pub active: bool,
    /// Slot number on the device.
    pub slot: u32,
    /// Owning device.
    pub device_id: Id,
}

fn check_schedule(
    hour: Option<u8>,
    minute: Option<u8>,
    start_time: Option<NaiveDateTime>,
    end_time: Option<NaiveDateTime>,
) -> Result<()> {
    if hour.is_some_and(|hour| hour > 23) {
        return Err(Error::validation("The hour must be in the range 0..=23."));
    }
    if minute.is_some_and(|minute| minute > 59) {
        return Err(Error::validation("The minute must be in the range 0..=59."));
    }
    if let (Some(start_time), Some(end_time)) = (start_time, end_time)
        && end_time < start_time
    {
        return Err(Error::validation(
            "The end time must not precede the start time.",
        ));
    }
    Ok(())
}

/// Input data to create a [`Config`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewConfig {
    /// Hour of the day.
    pub hour: u8,
    /// Minute of the hour.
    pub minute: u8,
    /// Start of the validity period.
    #[serde(default)]
    pub start_time: Option<NaiveDateTime>,
    /// End of the validity period.
    #[serde(default)]
    pub end_time: Option<NaiveDateTime>,
    /// Whether the slot is active.
    #[serde(default)]
    pub active: bool,
    /// Slot number on the device.
    pub slot: u32,
    /// Owning device.
    pub device_id: Id,
}

impl NewConfig {
    pub(crate) fn validate(&self) -> Result<()> {
        check_schedule(
            Some(self.hour),
            Some(self.minute),
            self.start_time,
            self.end_time,
        )
    }
}

/// Input data to update a [`Config`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConfigUpdate {
    /// Hour of the day.
    pub hour: Option<u8>,
    /// Minute of the hour.
    pub minute: Option<u8>,
    /// Start of the validity period, cleared by `Some(None)`.
    #[serde(default, deserialize_with = "nullable")]
    pub start_time: Option<Option<NaiveDateTime>>,
    /// End of the validity period, cleared by `Some(None)`.
    #[serde(default, deserialize_with = "nullable")]
    pub end_time: Option<Option<NaiveDateTime>>,
    /// Whether the slot is active.
    pub active: Option<bool>,
    /// Slot number on the device.
    pub slot: Option<u32>,
    /// Owning device.
    pub device_id: Option<Id>,
}

impl ConfigUpdate {
    pub(crate) fn validate(&self, current: &Config) -> Result<()> {
        check_schedule(
            self.hour,
            self.minute,
            self.start_time.unwrap_or(current.start_time),
            self.end_time.unwrap_or(current.end_time),
        )
    }
}
