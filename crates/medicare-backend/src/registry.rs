use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::model::{DeviceAction, DeviceActionParam, DeviceField, DeviceType, Id};
use crate::store::Store;

/// A parameter as exposed by the registry.
pub type ParamView = DeviceActionParam;

/// A field as exposed by the registry.
pub type FieldView = DeviceField;

/// An action together with its resolved parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionView {
    /// Identifier.
    pub id: Id,
    /// Action name.
    pub name: String,
    /// Identifier of the device-side operation.
    pub function: String,
    /// Owning device type.
    pub device_type: Id,
    /// Action parameters.
    pub params: Vec<ParamView>,
}

/// A device type together with its actions and fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceTypeView {
    /// Identifier.
    pub id: Id,
    /// Device type name.
    pub name: String,
    /// Actions accepted by the devices of this type.
    pub actions: Vec<ActionView>,
    /// Fields reported by the devices of this type.
    pub fields: Vec<FieldView>,
}

/// A read-only projection over the device type schemas of a [`Store`].
///
/// Every lookup follows a foreign key. An unknown device type or action has
/// no capabilities, so it produces empty sequences rather than an error.
#[derive(Clone)]
pub struct SchemaRegistry {
    store: Arc<dyn Store>,
}

impl SchemaRegistry {
    /// Creates a [`SchemaRegistry`].
    #[must_use]
    #[inline]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns the parameters of an action.
    ///
    /// # Errors
    ///
    /// An error is returned when the store fails.
    #[inline]
    pub fn action_params(&self, action_id: Id) -> Result<Vec<ParamView>> {
        self.store.params_of_action(action_id)
    }

    /// Returns the actions, with their parameters, and the fields of a
    /// device type.
    ///
    /// # Errors
    ///
    /// An error is returned when the store fails.
    pub fn actions_and_fields(
        &self,
        device_type_id: Id,
    ) -> Result<(Vec<ActionView>, Vec<FieldView>)> {
        let actions = self
            .store
            .actions_of_type(device_type_id)?
            .into_iter()
            .map(|action| self.action_view(action))
            .collect::<Result<Vec<_>>>()?;

        let fields = self.store.fields_of_type(device_type_id)?;

        Ok((actions, fields))
    }

    /// Resolves the parameters of an action.
    ///
    /// # Errors
    ///
    /// An error is returned when the store fails.
    pub fn action_view(&self, action: DeviceAction) -> Result<ActionView> {
        let params = self.action_params(action.id)?;
        Ok(ActionView {
            id: action.id,
            name: action.name,
            function: action.function,
            device_type: action.device_type,
            params,
        })
    }

    /// Resolves the actions and fields of a device type.
    ///
    /// # Errors
    ///
    /// An error is returned when the store fails.
    pub fn device_type_view(&self, device_type: DeviceType) -> Result<DeviceTypeView> {
        let (actions, fields) = self.actions_and_fields(device_type.id)?;
        Ok(DeviceTypeView {
            id: device_type.id,
            name: device_type.name,
            actions,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use medicare::value::ValueType;

    use crate::tests::thermometer_store;

    use super::SchemaRegistry;

    #[test]
    fn unknown_device_type_has_no_capabilities() {
        let registry = SchemaRegistry::new(thermometer_store());

        let (actions, fields) = registry.actions_and_fields(404).unwrap();
        assert!(actions.is_empty());
        assert!(fields.is_empty());
        assert!(registry.action_params(404).unwrap().is_empty());
    }

    #[test]
    fn thermometer_schema() {
        let store = thermometer_store();
        let registry = SchemaRegistry::new(store.clone());

        let thermometer = store.device_type(7).unwrap().unwrap();
        let view = registry.device_type_view(thermometer).unwrap();

        assert_eq!(view.name, "thermometer");

        let names = view
            .actions
            .iter()
            .map(|action| action.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, ["read", "calibrate"]);

        let read = &view.actions[0];
        assert_eq!(read.function, "READ_TEMP");
        assert_eq!(read.params.len(), 1);
        assert_eq!(read.params[0].name, "unit");
        assert_eq!(read.params[0].param_type, 0);

        let calibrate = &view.actions[1];
        let params = calibrate
            .params
            .iter()
            .map(|param| (param.name.as_str(), ValueType::from_code(param.param_type)))
            .collect::<Vec<_>>();
        assert_eq!(
            params,
            [
                ("offset", Some(ValueType::Float)),
                ("enabled", Some(ValueType::Boolean)),
            ]
        );

        assert_eq!(view.fields.len(), 1);
        assert_eq!(view.fields[0].name, "temperature");
        assert_eq!(view.fields[0].field_type, ValueType::Float);
    }

    #[test]
    fn views_serialize_embedded_params() {
        let store = thermometer_store();
        let registry = SchemaRegistry::new(store.clone());

        let action = store.action(1).unwrap().unwrap();
        let value = serde_json::to_value(registry.action_view(action).unwrap()).unwrap();

        assert_eq!(
            value,
            serde_json::json!({
                "id": 1,
                "name": "read",
                "function": "READ_TEMP",
                "device_type": 7,
                "params": [
                    { "id": 1, "name": "unit", "param_type": 0, "action": 1 }
                ],
            })
        );
    }
}
