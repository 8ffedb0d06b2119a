use std::fmt::{self, Debug, Display};
use std::hash::Hash;
use std::str::FromStr;

use anyhow::{Result, bail};
use sea_query::{Nullable, Value};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strata_sql::DataType;
use uuid::Uuid;

use crate::codec::FetchValue;

/// Primary-key types usable by entities.
pub trait EntityId:
    Clone
    + Debug
    + Default
    + Display
    + Eq
    + Hash
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + FetchValue
    + Into<Value>
    + 'static
{
    /// Generate a fresh identifier for a new row, or `None` when the database
    /// assigns it (auto-increment keys).
    fn generate() -> Option<Self>;

    /// Whether this is the unset (zero) identifier.
    fn is_zero(&self) -> bool;

    /// Parse an identifier from its textual form.
    fn parse(raw: &str) -> Option<Self>;
}

/// Opaque, time-ordered object identifier stored as text.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Creates a new time-ordered identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns `true` for the nil identifier.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for ObjectId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        Self::String(Some(Box::new(id.to_string())))
    }
}

impl Nullable for ObjectId {
    fn null() -> Value {
        Value::String(None)
    }
}

impl FetchValue for ObjectId {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Str(Some(raw)) => Ok(raw.parse()?),
            DataType::Binary(Some(bytes)) => Ok(Self(Uuid::from_slice(bytes)?)),
            _ => bail!("expected object id data type"),
        }
    }
}

impl EntityId for ObjectId {
    fn generate() -> Option<Self> {
        Some(Self::new())
    }

    fn is_zero(&self) -> bool {
        self.is_nil()
    }

    fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl EntityId for i64 {
    fn generate() -> Option<Self> {
        None
    }

    fn is_zero(&self) -> bool {
        *self == 0
    }

    fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_id_text_round_trip() {
        let id = ObjectId::new();
        assert!(!id.is_zero());

        let value: Value = id.into();
        let Value::String(Some(raw)) = value else {
            panic!("expected string value");
        };
        let fetched = ObjectId::fetch(&DataType::Str(Some(*raw))).unwrap();
        assert_eq!(fetched, id);
    }

    #[test]
    fn object_ids_are_time_ordered() {
        let first = ObjectId::new();
        let second = ObjectId::new();
        assert!(first < second);
    }

    #[test]
    fn parse_identifiers() {
        assert!(<ObjectId as EntityId>::parse("dev").is_none());
        assert_eq!(<i64 as EntityId>::parse("42"), Some(42));
        assert!(ObjectId::default().is_zero());
    }
}
