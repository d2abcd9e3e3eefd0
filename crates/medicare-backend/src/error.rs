use std::borrow::Cow;
use std::fmt;

/// All possible error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A referenced entity does not exist.
    NotFound,
    /// Input data is malformed, incomplete, or inconsistent with the
    /// stored schema.
    Validation,
    /// Input data collides with a unique column of an existing entity.
    Conflict,
    /// The publish/subscribe transport failed.
    Transport,
    /// An unexpected internal failure.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => "Not Found",
            Self::Validation => "Validation",
            Self::Conflict => "Conflict",
            Self::Transport => "Transport",
            Self::Internal => "Internal",
        }
        .fmt(f)
    }
}

/// A backend error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Error {
    kind: ErrorKind,
    description: Cow<'static, str>,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.description)
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    #[must_use]
    #[inline]
    pub fn new(kind: ErrorKind, description: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }

    /// Creates a [`ErrorKind::NotFound`] error.
    #[must_use]
    #[inline]
    pub fn not_found(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::NotFound, description)
    }

    /// Creates a [`ErrorKind::Validation`] error.
    #[must_use]
    #[inline]
    pub fn validation(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Validation, description)
    }

    /// Creates a [`ErrorKind::Conflict`] error.
    #[must_use]
    #[inline]
    pub fn conflict(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Conflict, description)
    }

    /// Creates a [`ErrorKind::Internal`] error.
    #[must_use]
    #[inline]
    pub fn internal(description: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Internal, description)
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl From<rumqttc::v5::ClientError> for Error {
    fn from(e: rumqttc::v5::ClientError) -> Self {
        Self::new(ErrorKind::Transport, e.to_string())
    }
}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
