//! Errors

use strata_sql::ConstraintViolation;
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = anyhow::Result<T, Error>;

/// Typed outcome of a failed data-access operation.
///
/// Each variant is a distinct condition callers can branch on; none of them
/// are retried by this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// A field, reference or scope failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The driver reported a unique, foreign-key or check constraint violation.
    #[error("constraint failed: {0}")]
    Constraint(String),

    /// Zero rows where exactly one was expected.
    #[error("{entity} not found")]
    NotFound {
        /// Entity (or edge) name.
        entity: String,
    },

    /// More than one row where exactly one was expected.
    #[error("{entity} not singular")]
    NotSingular {
        /// Entity name.
        entity: String,
    },

    /// An edge was accessed before it was eager-loaded.
    #[error("{edge} edge was not loaded")]
    NotLoaded {
        /// Edge name.
        edge: String,
    },

    /// A resource reference was supplied but empty.
    #[error("{entity}: blank resource refer")]
    BlankResourceRefer {
        /// Entity the reference points to.
        entity: String,
    },

    /// The operation is not available for the driver's dialect.
    #[error("{0}")]
    Unsupported(String),

    /// A mutation was driven through its lifecycle out of order.
    #[error("invalid mutation state: {0}")]
    InvalidState(String),

    /// Rows returned by the database contradict each other.
    #[error("data integrity: {0}")]
    Integrity(String),

    /// Row values could not be mapped onto entity fields.
    #[error("codec: {0}")]
    Codec(String),

    /// Any other driver or plumbing failure.
    #[error(transparent)]
    Driver(anyhow::Error),
}

impl Error {
    /// Shorthand for [`Error::Validation`].
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Shorthand for [`Error::NotFound`].
    #[must_use]
    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    /// Returns `true` for [`Error::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` for [`Error::NotSingular`].
    #[must_use]
    pub const fn is_not_singular(&self) -> bool {
        matches!(self, Self::NotSingular { .. })
    }

    /// Returns `true` for [`Error::NotLoaded`].
    #[must_use]
    pub const fn is_not_loaded(&self) -> bool {
        matches!(self, Self::NotLoaded { .. })
    }

    /// Returns `true` for [`Error::Constraint`].
    #[must_use]
    pub const fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }

    /// Returns `true` for [`Error::Validation`].
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns `true` for [`Error::BlankResourceRefer`].
    #[must_use]
    pub const fn is_blank_resource_refer(&self) -> bool {
        matches!(self, Self::BlankResourceRefer { .. })
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        if let Some(violation) = err.downcast_ref::<ConstraintViolation>() {
            tracing::debug!("constraint violation: {violation}");
            return Self::Constraint(violation.message.clone());
        }
        // typed errors raised inside hooks or drivers pass through unchanged
        match err.downcast::<Self>() {
            Ok(inner) => inner,
            Err(err) => Self::Driver(err),
        }
    }
}

impl From<sea_query::error::Error> for Error {
    fn from(err: sea_query::error::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

/// Unwrap-or-abort for call sites that treat persistence failures as
/// unrecoverable.
///
/// ```ignore
/// let project = Project::query().only(&client).await.must();
/// ```
pub trait Must<T> {
    /// Returns the success value, panicking with the error otherwise.
    fn must(self) -> T;
}

impl<T> Must<T> for Result<T> {
    #[track_caller]
    fn must(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }
}
