use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use hashbrown::HashMap;

use indexmap::{IndexMap, IndexSet};

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{
    Config, ConfigUpdate, Device, DeviceAction, DeviceActionParam, DeviceActionParamUpdate,
    DeviceActionUpdate, DeviceField, DeviceFieldUpdate, DeviceType, DeviceTypeUpdate,
    DeviceUpdate, Id, NewConfig, NewDevice, NewDeviceAction, NewDeviceActionParam,
    NewDeviceField, NewDeviceType, NewUser, User, UserUpdate,
};

/// Device types registered when a store is seeded.
pub const DEFAULT_DEVICE_TYPES: &[&str] = &[
    "glucometer",
    "health",
    "nebulizer",
    "oximeter",
    "pill dispenser",
    "sphygmomanometer",
    "thermometer",
];

/// An entity store keyed by auto-increment identifiers.
///
/// Lookups return [`None`] for missing entities, while updates and
/// deletions of a missing entity fail with a not-found error.
/// A reference to a missing parent entity is a validation error, a
/// duplicated unique column is a conflict error.
///
/// Deleting a [`DeviceType`] deletes its actions, their parameters and its
/// fields, and detaches its devices. Deleting a [`DeviceAction`] deletes its
/// parameters. Deleting a [`Device`] deletes its configs and user links.
pub trait Store: Send + Sync {
    /// Lists all device types.
    fn device_types(&self) -> Result<Vec<DeviceType>>;
    /// Retrieves a device type.
    fn device_type(&self, id: Id) -> Result<Option<DeviceType>>;
    /// Creates a device type.
    fn insert_device_type(&self, new: NewDeviceType) -> Result<DeviceType>;
    /// Updates a device type.
    fn update_device_type(&self, id: Id, update: DeviceTypeUpdate) -> Result<DeviceType>;
    /// Deletes a device type together with its actions and fields.
    fn delete_device_type(&self, id: Id) -> Result<()>;

    /// Retrieves a field.
    fn field(&self, id: Id) -> Result<Option<DeviceField>>;
    /// Lists the fields of a device type.
    fn fields_of_type(&self, device_type: Id) -> Result<Vec<DeviceField>>;
    /// Creates a field.
    fn insert_field(&self, new: NewDeviceField) -> Result<DeviceField>;
    /// Updates a field.
    fn update_field(&self, id: Id, update: DeviceFieldUpdate) -> Result<DeviceField>;
    /// Deletes a field.
    fn delete_field(&self, id: Id) -> Result<()>;

    /// Retrieves an action.
    fn action(&self, id: Id) -> Result<Option<DeviceAction>>;
    /// Lists the actions of a device type.
    fn actions_of_type(&self, device_type: Id) -> Result<Vec<DeviceAction>>;
    /// Creates an action.
    fn insert_action(&self, new: NewDeviceAction) -> Result<DeviceAction>;
    /// Updates an action.
    fn update_action(&self, id: Id, update: DeviceActionUpdate) -> Result<DeviceAction>;
    /// Deletes an action together with its parameters.
    fn delete_action(&self, id: Id) -> Result<()>;

    /// Retrieves an action parameter.
    fn param(&self, id: Id) -> Result<Option<DeviceActionParam>>;
    /// Lists the parameters of an action.
    fn params_of_action(&self, action: Id) -> Result<Vec<DeviceActionParam>>;
    /// Creates an action parameter.
    fn insert_param(&self, new: NewDeviceActionParam) -> Result<DeviceActionParam>;
    /// Updates an action parameter.
    fn update_param(&self, id: Id, update: DeviceActionParamUpdate) -> Result<DeviceActionParam>;
    /// Deletes an action parameter.
    fn delete_param(&self, id: Id) -> Result<()>;

    /// Lists all devices.
    fn devices(&self) -> Result<Vec<Device>>;
    /// Retrieves a device.
    fn device(&self, id: Id) -> Result<Option<Device>>;
    /// Lists the devices linked to a user.
    fn devices_of_user(&self, user: Id) -> Result<Vec<Device>>;
    /// Registers a device, linking it to a user when requested.
    fn insert_device(&self, new: NewDevice) -> Result<Device>;
    /// Updates a device.
    fn update_device(&self, id: Id, update: DeviceUpdate) -> Result<Device>;
    /// Deletes a device together with its configs and user links.
    fn delete_device(&self, id: Id) -> Result<()>;

    /// Lists all users.
    fn users(&self) -> Result<Vec<User>>;
    /// Retrieves a user.
    fn user(&self, id: Id) -> Result<Option<User>>;
    /// Creates a user.
    fn insert_user(&self, new: NewUser) -> Result<User>;
    /// Updates a user.
    fn update_user(&self, id: Id, update: UserUpdate) -> Result<User>;
    /// Deletes a user and its device links.
    fn delete_user(&self, id: Id) -> Result<()>;

    /// Lists all configs.
    fn configs(&self) -> Result<Vec<Config>>;
    /// Retrieves a config.
    fn config(&self, id: Id) -> Result<Option<Config>>;
    /// Creates a config.
    fn insert_config(&self, new: NewConfig) -> Result<Config>;
    /// Updates a config.
    fn update_config(&self, id: Id, update: ConfigUpdate) -> Result<Config>;
    /// Deletes a config.
    fn delete_config(&self, id: Id) -> Result<()>;
}

// Children identifiers grouped by the identifier of their parent.
#[derive(Debug, Default)]
struct Index(HashMap<Id, IndexSet<Id>>);

impl Index {
    fn link(&mut self, parent: Id, child: Id) {
        let _ = self.0.entry(parent).or_default().insert(child);
    }

    fn unlink(&mut self, parent: Id, child: Id) {
        if let Some(children) = self.0.get_mut(&parent) {
            let _ = children.shift_remove(&child);
            if children.is_empty() {
                let _ = self.0.remove(&parent);
            }
        }
    }

    fn relink(&mut self, old_parent: Id, new_parent: Id, child: Id) {
        if old_parent != new_parent {
            self.unlink(old_parent, child);
            self.link(new_parent, child);
        }
    }

    fn children(&self, parent: Id) -> impl Iterator<Item = Id> + '_ {
        self.0.get(&parent).into_iter().flatten().copied()
    }

    fn take(&mut self, parent: Id) -> IndexSet<Id> {
        self.0.remove(&parent).unwrap_or_default()
    }
}

#[derive(Debug, Default)]
struct Sequence(Id);

impl Sequence {
    fn next(&mut self) -> Id {
        self.0 += 1;
        self.0
    }
}

#[derive(Debug, Default)]
struct Tables {
    device_types: IndexMap<Id, DeviceType>,
    fields: IndexMap<Id, DeviceField>,
    actions: IndexMap<Id, DeviceAction>,
    params: IndexMap<Id, DeviceActionParam>,
    devices: IndexMap<Id, Device>,
    users: IndexMap<Id, User>,
    configs: IndexMap<Id, Config>,
    // (user, device) pairs.
    users_devices: IndexSet<(Id, Id)>,

    fields_by_type: Index,
    actions_by_type: Index,
    params_by_action: Index,
    configs_by_device: Index,

    device_type_ids: Sequence,
    field_ids: Sequence,
    action_ids: Sequence,
    param_ids: Sequence,
    device_ids: Sequence,
    user_ids: Sequence,
    config_ids: Sequence,
}

fn missing(what: &str, id: Id) -> Error {
    Error::not_found(format!("The {what} with identifier {id} does not exist."))
}

fn dangling(what: &str, id: Id) -> Error {
    Error::validation(format!("The referenced {what} {id} does not exist."))
}

impl Tables {
    fn check_device_type(&self, id: Id) -> Result<()> {
        if self.device_types.contains_key(&id) {
            Ok(())
        } else {
            Err(dangling("device type", id))
        }
    }

    fn check_action(&self, id: Id) -> Result<()> {
        if self.actions.contains_key(&id) {
            Ok(())
        } else {
            Err(dangling("action", id))
        }
    }

    fn check_device(&self, id: Id) -> Result<()> {
        if self.devices.contains_key(&id) {
            Ok(())
        } else {
            Err(dangling("device", id))
        }
    }

    fn check_type_name(&self, name: &str, skip: Option<Id>) -> Result<()> {
        if self
            .device_types
            .values()
            .any(|device_type| device_type.name == name && Some(device_type.id) != skip)
        {
            return Err(Error::conflict(format!(
                "A device type named `{name}` already exists."
            )));
        }
        Ok(())
    }

    fn check_serie_number(&self, serie_number: &str, skip: Option<Id>) -> Result<()> {
        if self
            .devices
            .values()
            .any(|device| device.serie_number == serie_number && Some(device.id) != skip)
        {
            return Err(Error::conflict(format!(
                "A device with serial number `{serie_number}` already exists."
            )));
        }
        Ok(())
    }

    fn check_email(&self, email: &str, skip: Option<Id>) -> Result<()> {
        if self
            .users
            .values()
            .any(|user| user.email == email && Some(user.id) != skip)
        {
            return Err(Error::conflict(format!(
                "A user with e-mail `{email}` already exists."
            )));
        }
        Ok(())
    }

    fn remove_action(&mut self, id: Id) {
        for param in self.params_by_action.take(id) {
            let _ = self.params.shift_remove(&param);
        }
        if let Some(action) = self.actions.shift_remove(&id) {
            self.actions_by_type.unlink(action.device_type, id);
        }
    }
}

/// An in-process [`Store`].
///
/// All tables live behind a single lock. Foreign keys are indexed, so
/// listing the children of an entity never scans a whole table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Creates an empty [`MemoryStore`].
    #[must_use]
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a [`MemoryStore`] containing the [`DEFAULT_DEVICE_TYPES`].
    ///
    /// # Errors
    ///
    /// An error is returned if a device type cannot be inserted.
    pub fn seeded() -> Result<Self> {
        let store = Self::new();
        for name in DEFAULT_DEVICE_TYPES {
            let _ = store.insert_device_type(NewDeviceType {
                name: (*name).into(),
            })?;
        }
        Ok(store)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| Error::internal("The store lock is poisoned."))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| Error::internal("The store lock is poisoned."))
    }
}

impl Store for MemoryStore {
    fn device_types(&self) -> Result<Vec<DeviceType>> {
        Ok(self.read()?.device_types.values().cloned().collect())
    }

    fn device_type(&self, id: Id) -> Result<Option<DeviceType>> {
        Ok(self.read()?.device_types.get(&id).cloned())
    }

    fn insert_device_type(&self, new: NewDeviceType) -> Result<DeviceType> {
        new.validate()?;
        let mut tables = self.write()?;
        tables.check_type_name(&new.name, None)?;

        let device_type = DeviceType {
            id: tables.device_type_ids.next(),
            name: new.name,
        };
        let _ = tables
            .device_types
            .insert(device_type.id, device_type.clone());
        debug!("Created device type {}", device_type.id);
        Ok(device_type)
    }

    fn update_device_type(&self, id: Id, update: DeviceTypeUpdate) -> Result<DeviceType> {
        update.validate()?;
        let mut tables = self.write()?;
        if let Some(name) = update.name.as_deref() {
            tables.check_type_name(name, Some(id))?;
        }

        let device_type = tables
            .device_types
            .get_mut(&id)
            .ok_or_else(|| missing("device type", id))?;
        if let Some(name) = update.name {
            device_type.name = name;
        }
        Ok(device_type.clone())
    }

    fn delete_device_type(&self, id: Id) -> Result<()> {
        let mut tables = self.write()?;
        if tables.device_types.shift_remove(&id).is_none() {
            return Err(missing("device type", id));
        }

        for action in tables.actions_by_type.take(id) {
            tables.remove_action(action);
        }
        for field in tables.fields_by_type.take(id) {
            let _ = tables.fields.shift_remove(&field);
        }
        for device in tables.devices.values_mut() {
            if device.device_type == Some(id) {
                device.device_type = None;
            }
        }
        debug!("Deleted device type {id}");
        Ok(())
    }

    fn field(&self, id: Id) -> Result<Option<DeviceField>> {
        Ok(self.read()?.fields.get(&id).cloned())
    }

    fn fields_of_type(&self, device_type: Id) -> Result<Vec<DeviceField>> {
        let tables = self.read()?;
        Ok(tables
            .fields_by_type
            .children(device_type)
            .filter_map(|id| tables.fields.get(&id).cloned())
            .collect())
    }

    fn insert_field(&self, new: NewDeviceField) -> Result<DeviceField> {
        new.validate()?;
        let mut tables = self.write()?;
        tables.check_device_type(new.device_type)?;

        let field = DeviceField {
            id: tables.field_ids.next(),
            name: new.name,
            field_type: new.field_type,
            unit: new.unit,
            device_type: new.device_type,
        };
        tables.fields_by_type.link(field.device_type, field.id);
        let _ = tables.fields.insert(field.id, field.clone());
        Ok(field)
    }

    fn update_field(&self, id: Id, update: DeviceFieldUpdate) -> Result<DeviceField> {
        update.validate()?;
        let mut tables = self.write()?;
        if let Some(device_type) = update.device_type {
            tables.check_device_type(device_type)?;
        }

        let field = tables
            .fields
            .get_mut(&id)
            .ok_or_else(|| missing("field", id))?;
        let old_type = field.device_type;
        if let Some(name) = update.name {
            field.name = name;
        }
        if let Some(field_type) = update.field_type {
            field.field_type = field_type;
        }
        if let Some(unit) = update.unit {
            field.unit = unit;
        }
        if let Some(device_type) = update.device_type {
            field.device_type = device_type;
        }
        let field = field.clone();

        tables.fields_by_type.relink(old_type, field.device_type, id);
        Ok(field)
    }

    fn delete_field(&self, id: Id) -> Result<()> {
        let mut tables = self.write()?;
        let field = tables
            .fields
            .shift_remove(&id)
            .ok_or_else(|| missing("field", id))?;
        tables.fields_by_type.unlink(field.device_type, id);
        Ok(())
    }

    fn action(&self, id: Id) -> Result<Option<DeviceAction>> {
        Ok(self.read()?.actions.get(&id).cloned())
    }

    fn actions_of_type(&self, device_type: Id) -> Result<Vec<DeviceAction>> {
        let tables = self.read()?;
        Ok(tables
            .actions_by_type
            .children(device_type)
            .filter_map(|id| tables.actions.get(&id).cloned())
            .collect())
    }

    fn insert_action(&self, new: NewDeviceAction) -> Result<DeviceAction> {
        new.validate()?;
        let mut tables = self.write()?;
        tables.check_device_type(new.device_type)?;

        let action = DeviceAction {
            id: tables.action_ids.next(),
            name: new.name,
            function: new.function,
            device_type: new.device_type,
        };
        tables.actions_by_type.link(action.device_type, action.id);
        let _ = tables.actions.insert(action.id, action.clone());
        Ok(action)
    }

    fn update_action(&self, id: Id, update: DeviceActionUpdate) -> Result<DeviceAction> {
        update.validate()?;
        let mut tables = self.write()?;
        if let Some(device_type) = update.device_type {
            tables.check_device_type(device_type)?;
        }

        let action = tables
            .actions
            .get_mut(&id)
            .ok_or_else(|| missing("action", id))?;
        let old_type = action.device_type;
        if let Some(name) = update.name {
            action.name = name;
        }
        if let Some(function) = update.function {
            action.function = function;
        }
        if let Some(device_type) = update.device_type {
            action.device_type = device_type;
        }
        let action = action.clone();

        tables.actions_by_type.relink(old_type, action.device_type, id);
        Ok(action)
    }

    fn delete_action(&self, id: Id) -> Result<()> {
        let mut tables = self.write()?;
        if !tables.actions.contains_key(&id) {
            return Err(missing("action", id));
        }
        tables.remove_action(id);
        Ok(())
    }

    fn param(&self, id: Id) -> Result<Option<DeviceActionParam>> {
        Ok(self.read()?.params.get(&id).cloned())
    }

    fn params_of_action(&self, action: Id) -> Result<Vec<DeviceActionParam>> {
        let tables = self.read()?;
        Ok(tables
            .params_by_action
            .children(action)
            .filter_map(|id| tables.params.get(&id).cloned())
            .collect())
    }

    fn insert_param(&self, new: NewDeviceActionParam) -> Result<DeviceActionParam> {
        new.validate()?;
        let mut tables = self.write()?;
        tables.check_action(new.action)?;

        let param = DeviceActionParam {
            id: tables.param_ids.next(),
            name: new.name,
            param_type: new.param_type,
            action: new.action,
        };
        tables.params_by_action.link(param.action, param.id);
        let _ = tables.params.insert(param.id, param.clone());
        Ok(param)
    }

    fn update_param(&self, id: Id, update: DeviceActionParamUpdate) -> Result<DeviceActionParam> {
        update.validate()?;
        let mut tables = self.write()?;
        if let Some(action) = update.action {
            tables.check_action(action)?;
        }

        let param = tables
            .params
            .get_mut(&id)
            .ok_or_else(|| missing("parameter", id))?;
        let old_action = param.action;
        if let Some(name) = update.name {
            param.name = name;
        }
        if let Some(param_type) = update.param_type {
            param.param_type = param_type;
        }
        if let Some(action) = update.action {
            param.action = action;
        }
        let param = param.clone();

        tables.params_by_action.relink(old_action, param.action, id);
        Ok(param)
    }

    fn delete_param(&self, id: Id) -> Result<()> {
        let mut tables = self.write()?;
        let param = tables
            .params
            .shift_remove(&id)
            .ok_or_else(|| missing("parameter", id))?;
        tables.params_by_action.unlink(param.action, id);
        Ok(())
    }

    fn devices(&self) -> Result<Vec<Device>> {
        Ok(self.read()?.devices.values().cloned().collect())
    }

    fn device(&self, id: Id) -> Result<Option<Device>> {
        Ok(self.read()?.devices.get(&id).cloned())
    }

    fn devices_of_user(&self, user: Id) -> Result<Vec<Device>> {
        let tables = self.read()?;
        Ok(tables
            .users_devices
            .iter()
            .filter(|(owner, _)| *owner == user)
            .filter_map(|(_, device)| tables.devices.get(device).cloned())
            .collect())
    }

    fn insert_device(&self, new: NewDevice) -> Result<Device> {
        new.validate()?;
        let mut tables = self.write()?;
        if let Some(device_type) = new.device_type {
            tables.check_device_type(device_type)?;
        }
        if let Some(user) = new.user_id
            && !tables.users.contains_key(&user)
        {
            return Err(dangling("user", user));
        }
        tables.check_serie_number(&new.serie_number, None)?;

        let device = Device {
            id: tables.device_ids.next(),
            alias_name: new.alias_name,
            serie_number: new.serie_number,
            firmware_version: new.firmware_version,
            device_type: new.device_type,
        };
        let _ = tables.devices.insert(device.id, device.clone());
        if let Some(user) = new.user_id {
            let _ = tables.users_devices.insert((user, device.id));
        }
        debug!("Registered device {} ({})", device.id, device.serie_number);
        Ok(device)
    }

    fn update_device(&self, id: Id, update: DeviceUpdate) -> Result<Device> {
        update.validate()?;
        let mut tables = self.write()?;
        if let Some(device_type) = update.device_type {
            tables.check_device_type(device_type)?;
        }
        if let Some(serie_number) = update.serie_number.as_deref() {
            tables.check_serie_number(serie_number, Some(id))?;
        }

        let device = tables
            .devices
            .get_mut(&id)
            .ok_or_else(|| missing("device", id))?;
        if let Some(alias_name) = update.alias_name {
            device.alias_name = alias_name;
        }
        if let Some(serie_number) = update.serie_number {
            device.serie_number = serie_number;
        }
        if let Some(firmware_version) = update.firmware_version {
            device.firmware_version = firmware_version;
        }
        if let Some(device_type) = update.device_type {
            device.device_type = Some(device_type);
        }
        Ok(device.clone())
    }

    fn delete_device(&self, id: Id) -> Result<()> {
        let mut tables = self.write()?;
        if tables.devices.shift_remove(&id).is_none() {
            return Err(missing("device", id));
        }

        for config in tables.configs_by_device.take(id) {
            let _ = tables.configs.shift_remove(&config);
        }
        tables.users_devices.retain(|(_, device)| *device != id);
        debug!("Deleted device {id}");
        Ok(())
    }

    fn users(&self) -> Result<Vec<User>> {
        Ok(self.read()?.users.values().cloned().collect())
    }

    fn user(&self, id: Id) -> Result<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    fn insert_user(&self, new: NewUser) -> Result<User> {
        new.validate()?;
        let mut tables = self.write()?;
        tables.check_email(&new.email, None)?;

        let user = User {
            id: tables.user_ids.next(),
            email: new.email,
            name: new.name,
            picture: new.picture,
        };
        let _ = tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    fn update_user(&self, id: Id, update: UserUpdate) -> Result<User> {
        update.validate()?;
        let mut tables = self.write()?;
        if let Some(email) = update.email.as_deref() {
            tables.check_email(email, Some(id))?;
        }

        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| missing("user", id))?;
        if let Some(email) = update.email {
            user.email = email;
        }
        if let Some(name) = update.name {
            user.name = name;
        }
        if let Some(picture) = update.picture {
            user.picture = picture;
        }
        Ok(user.clone())
    }

    fn delete_user(&self, id: Id) -> Result<()> {
        let mut tables = self.write()?;
        if tables.users.shift_remove(&id).is_none() {
            return Err(missing("user", id));
        }
        tables.users_devices.retain(|(user, _)| *user != id);
        Ok(())
    }

    fn configs(&self) -> Result<Vec<Config>> {
        Ok(self.read()?.configs.values().cloned().collect())
    }

    fn config(&self, id: Id) -> Result<Option<Config>> {
        Ok(self.read()?.configs.get(&id).cloned())
    }

    fn insert_config(&self, new: NewConfig) -> Result<Config> {
        new.validate()?;
        let mut tables = self.write()?;
        tables.check_device(new.device_id)?;

        let config = Config {
            id: tables.config_ids.next(),
            hour: new.hour,
            minute: new.minute,
            start_time: new.start_time,
            end_time: new.end_time,
            active: new.active,
            slot: new.slot,
            device_id: new.device_id,
        };
        tables.configs_by_device.link(config.device_id, config.id);
        let _ = tables.configs.insert(config.id, config.clone());
        Ok(config)
    }

    fn update_config(&self, id: Id, update: ConfigUpdate) -> Result<Config> {
        let mut tables = self.write()?;
        if let Some(device) = update.device_id {
            tables.check_device(device)?;
        }

        let config = tables
            .configs
            .get_mut(&id)
            .ok_or_else(|| missing("config", id))?;
        update.validate(config)?;
        let old_device = config.device_id;
        if let Some(hour) = update.hour {
            config.hour = hour;
        }
        if let Some(minute) = update.minute {
            config.minute = minute;
        }
        if let Some(start_time) = update.start_time {
            config.start_time = start_time;
        }
        if let Some(end_time) = update.end_time {
            config.end_time = end_time;
        }
        if let Some(active) = update.active {
            config.active = active;
        }
        if let Some(slot) = update.slot {
            config.slot = slot;
        }
        if let Some(device) = update.device_id {
            config.device_id = device;
        }
        let config = config.clone();

        tables.configs_by_device.relink(old_device, config.device_id, id);
        Ok(config)
    }

    fn delete_config(&self, id: Id) -> Result<()> {
        let mut tables = self.write()?;
        let config = tables
            .configs
            .shift_remove(&id)
            .ok_or_else(|| missing("config", id))?;
        tables.configs_by_device.unlink(config.device_id, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::model::{
        ConfigUpdate, DeviceTypeUpdate, DeviceUpdate, NewConfig, NewDevice, NewDeviceAction,
        NewDeviceActionParam, NewDeviceField, NewDeviceType, NewUser,
    };

    use medicare::value::ValueType;

    use super::{DEFAULT_DEVICE_TYPES, MemoryStore, Store};

    fn new_device(serie_number: &str, device_type: Option<u32>, user_id: Option<u32>) -> NewDevice {
        NewDevice {
            alias_name: format!("Device {serie_number}"),
            serie_number: serie_number.into(),
            firmware_version: Some("1.0.0".into()),
            device_type,
            user_id,
        }
    }

    #[test]
    fn seeded_store() {
        let store = MemoryStore::seeded().unwrap();

        let names = store
            .device_types()
            .unwrap()
            .into_iter()
            .map(|device_type| device_type.name)
            .collect::<Vec<_>>();
        assert_eq!(names, DEFAULT_DEVICE_TYPES);
    }

    #[test]
    fn unique_columns() {
        let store = MemoryStore::seeded().unwrap();

        let error = store
            .insert_device_type(NewDeviceType {
                name: "thermometer".into(),
            })
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Conflict);

        let _ = store.insert_device(new_device("TH-001", None, None)).unwrap();
        let error = store
            .insert_device(new_device("TH-001", None, None))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Conflict);

        // Renaming a device type to its own name is not a conflict.
        let renamed = store
            .update_device_type(
                1,
                DeviceTypeUpdate {
                    name: Some("glucometer".into()),
                },
            )
            .unwrap();
        assert_eq!(renamed.name, "glucometer");
    }

    #[test]
    fn dangling_references() {
        let store = MemoryStore::new();

        let error = store
            .insert_action(NewDeviceAction {
                name: "read".into(),
                function: "READ_TEMP".into(),
                device_type: 42,
            })
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);

        let error = store
            .insert_param(NewDeviceActionParam {
                name: "unit".into(),
                param_type: 0,
                action: 42,
            })
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);

        let error = store
            .insert_device(new_device("TH-001", None, Some(42)))
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
        assert!(store.devices().unwrap().is_empty());
    }

    #[test]
    fn missing_entities() {
        let store = MemoryStore::new();

        assert_eq!(store.device(1).unwrap(), None);
        assert_eq!(
            store.delete_device(1).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            store
                .update_device(1, DeviceUpdate::default())
                .unwrap_err()
                .kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn foreign_key_listings() {
        let store = MemoryStore::seeded().unwrap();

        let read = store
            .insert_action(NewDeviceAction {
                name: "read".into(),
                function: "READ_TEMP".into(),
                device_type: 7,
            })
            .unwrap();
        let calibrate = store
            .insert_action(NewDeviceAction {
                name: "calibrate".into(),
                function: "CALIBRATE".into(),
                device_type: 7,
            })
            .unwrap();
        let _ = store
            .insert_action(NewDeviceAction {
                name: "dispense".into(),
                function: "DISPENSE".into(),
                device_type: 5,
            })
            .unwrap();

        let actions = store.actions_of_type(7).unwrap();
        assert_eq!(actions, vec![read.clone(), calibrate]);

        let unit = store
            .insert_param(NewDeviceActionParam {
                name: "unit".into(),
                param_type: 0,
                action: read.id,
            })
            .unwrap();
        assert_eq!(store.params_of_action(read.id).unwrap(), vec![unit]);
        assert!(store.actions_of_type(1).unwrap().is_empty());
    }

    #[test]
    fn delete_device_type_cascades() {
        let store = MemoryStore::seeded().unwrap();

        let action = store
            .insert_action(NewDeviceAction {
                name: "read".into(),
                function: "READ_TEMP".into(),
                device_type: 7,
            })
            .unwrap();
        let param = store
            .insert_param(NewDeviceActionParam {
                name: "unit".into(),
                param_type: 0,
                action: action.id,
            })
            .unwrap();
        let field = store
            .insert_field(NewDeviceField {
                name: "temperature".into(),
                field_type: ValueType::Float,
                unit: Some("°C".into()),
                device_type: 7,
            })
            .unwrap();
        let device = store
            .insert_device(new_device("TH-001", Some(7), None))
            .unwrap();

        store.delete_device_type(7).unwrap();

        assert_eq!(store.action(action.id).unwrap(), None);
        assert_eq!(store.param(param.id).unwrap(), None);
        assert_eq!(store.field(field.id).unwrap(), None);
        assert_eq!(store.device(device.id).unwrap().unwrap().device_type, None);
        assert!(store.actions_of_type(7).unwrap().is_empty());
    }

    #[test]
    fn delete_device_cascades() {
        let store = MemoryStore::new();

        let user = store
            .insert_user(NewUser {
                email: "ana@example.com".into(),
                name: "Ana".into(),
                picture: None,
            })
            .unwrap();
        let device = store
            .insert_device(new_device("OX-1", None, Some(user.id)))
            .unwrap();
        let config = store
            .insert_config(NewConfig {
                hour: 8,
                minute: 0,
                start_time: None,
                end_time: None,
                active: true,
                slot: 1,
                device_id: device.id,
            })
            .unwrap();

        assert_eq!(store.devices_of_user(user.id).unwrap(), vec![device.clone()]);

        store.delete_device(device.id).unwrap();

        assert_eq!(store.config(config.id).unwrap(), None);
        assert!(store.devices_of_user(user.id).unwrap().is_empty());
        assert!(store.user(user.id).unwrap().is_some());
    }

    #[test]
    fn move_action_between_types() {
        let store = MemoryStore::seeded().unwrap();

        let action = store
            .insert_action(NewDeviceAction {
                name: "read".into(),
                function: "READ".into(),
                device_type: 1,
            })
            .unwrap();
        let _ = store
            .update_action(
                action.id,
                crate::model::DeviceActionUpdate {
                    device_type: Some(2),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(store.actions_of_type(1).unwrap().is_empty());
        assert_eq!(store.actions_of_type(2).unwrap().len(), 1);
    }

    #[test]
    fn clear_nullable_columns() {
        let store = MemoryStore::seeded().unwrap();
        let device = store
            .insert_device(new_device("TH-001", Some(7), None))
            .unwrap();

        // A missing key keeps the value.
        let device = store
            .update_device(
                device.id,
                DeviceUpdate {
                    alias_name: Some("Hall thermometer".into()),
                    ..DeviceUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(device.firmware_version.as_deref(), Some("1.0.0"));

        let device = store
            .update_device(
                device.id,
                DeviceUpdate {
                    firmware_version: Some(None),
                    ..DeviceUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(device.firmware_version, None);
        assert_eq!(device.alias_name, "Hall thermometer");

        let config = store
            .insert_config(NewConfig {
                hour: 8,
                minute: 0,
                start_time: chrono::NaiveDate::from_ymd_opt(2024, 1, 10)
                    .and_then(|d| d.and_hms_opt(0, 0, 0)),
                end_time: None,
                active: true,
                slot: 0,
                device_id: device.id,
            })
            .unwrap();
        let config = store
            .update_config(
                config.id,
                ConfigUpdate {
                    start_time: Some(None),
                    ..ConfigUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(config.start_time, None);
    }
}
