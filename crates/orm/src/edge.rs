use crate::error::{Error, Result};

/// An eagerly-loadable relation slot on an entity.
///
/// `Unloaded` means no eager-load ran for the edge; `Loaded` carries whatever
/// the load found, including nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Edge<T> {
    /// The edge was not requested.
    Unloaded,
    /// The edge was eager-loaded.
    Loaded(T),
}

impl<T> Default for Edge<T> {
    fn default() -> Self {
        Self::Unloaded
    }
}

impl<T> Edge<T> {
    /// Whether the edge was eager-loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    /// The loaded value, if any.
    #[must_use]
    pub const fn loaded(&self) -> Option<&T> {
        match self {
            Self::Loaded(value) => Some(value),
            Self::Unloaded => None,
        }
    }
}

/// A many-to-one or one-to-one edge.
pub type ToOne<T> = Edge<Option<Box<T>>>;

/// A one-to-many edge.
pub type ToMany<T> = Edge<Vec<T>>;

impl<T> Edge<Option<Box<T>>> {
    /// The related entity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoaded`] before eager-loading and
    /// [`Error::NotFound`] when the edge was loaded but is absent.
    pub fn get(&self, edge: &str) -> Result<&T> {
        match self {
            Self::Loaded(Some(value)) => Ok(&**value),
            Self::Loaded(None) => Err(Error::not_found(edge)),
            Self::Unloaded => Err(Error::NotLoaded {
                edge: edge.to_string(),
            }),
        }
    }
}

impl<T> Edge<Vec<T>> {
    /// The related entities.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLoaded`] before eager-loading.
    pub fn get(&self, edge: &str) -> Result<&[T]> {
        match self {
            Self::Loaded(values) => Ok(values),
            Self::Unloaded => Err(Error::NotLoaded {
                edge: edge.to_string(),
            }),
        }
    }
}
