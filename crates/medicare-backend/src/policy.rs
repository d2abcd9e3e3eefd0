use crate::error::{Error, Result};
use crate::model::{Device, DeviceAction, DeviceActionParam};

/// A policy deciding whether an action can be run on a device.
///
/// A strict policy, the default one, only accepts actions defined by the
/// device type of the target device, and parameters belonging to the
/// requested action. A permissive policy accepts any existing action and
/// parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Policy {
    allow_foreign_actions: bool,
}

impl Policy {
    /// Creates a strict [`Policy`].
    #[must_use]
    #[inline]
    pub const fn strict() -> Self {
        Self {
            allow_foreign_actions: false,
        }
    }

    /// Creates a permissive [`Policy`].
    #[must_use]
    #[inline]
    pub const fn permissive() -> Self {
        Self {
            allow_foreign_actions: true,
        }
    }

    /// Whether actions of other device types are accepted.
    #[must_use]
    pub const fn allows_foreign_actions(&self) -> bool {
        self.allow_foreign_actions
    }

    pub(crate) fn check_action(&self, device: &Device, action: &DeviceAction) -> Result<()> {
        if self.allow_foreign_actions || device.device_type == Some(action.device_type) {
            return Ok(());
        }

        Err(Error::validation(format!(
            "The action `{}` is not defined for the device type of `{}`.",
            action.name, device.serie_number
        )))
    }

    pub(crate) fn check_param(
        &self,
        action: &DeviceAction,
        param: &DeviceActionParam,
    ) -> Result<()> {
        if self.allow_foreign_actions || param.action == action.id {
            return Ok(());
        }

        Err(Error::validation(format!(
            "The parameter `{}` does not belong to the action `{}`.",
            param.name, action.name
        )))
    }
}
