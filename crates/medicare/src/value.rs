use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorKind};

/// All [`ValueType`]s, ordered by their numeric code.
pub const ALL_VALUE_TYPES: &[ValueType] = &[
    ValueType::String,
    ValueType::Integer,
    ValueType::Float,
    ValueType::Boolean,
    ValueType::Date,
    ValueType::Time,
];

/// The primitive type of an action parameter or of a device field.
///
/// Action parameters store their type as a small integer code, while the
/// commands sent to a device carry the lowercase type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// A string. Code `0`.
    String,
    /// An integer number. Code `1`.
    Integer,
    /// A floating point number. Code `2`.
    Float,
    /// A boolean. Code `3`.
    Boolean,
    /// A calendar date. Code `4`.
    Date,
    /// A time of the day. Code `5`.
    Time,
}

impl ValueType {
    /// Maps a numeric code into a [`ValueType`].
    ///
    /// Returns [`None`] for codes outside of the `0..=5` range.
    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::String),
            1 => Some(Self::Integer),
            2 => Some(Self::Float),
            3 => Some(Self::Boolean),
            4 => Some(Self::Date),
            5 => Some(Self::Time),
            _ => None,
        }
    }

    /// Returns the numeric code of a [`ValueType`].
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::String => 0,
            Self::Integer => 1,
            Self::Float => 2,
            Self::Boolean => 3,
            Self::Date => 4,
            Self::Time => 5,
        }
    }

    /// Returns the lowercase name of a [`ValueType`].
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
        }
    }
}

impl TryFrom<u8> for ValueType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| {
            Error::new(
                ErrorKind::ValueType,
                alloc::format!("Unknown value type code `{code}`"),
            )
        })
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}
