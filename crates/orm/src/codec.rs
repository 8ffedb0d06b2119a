//! Conversion between native field types and driver values.
//!
//! Inbound decoding is lenient across the encodings drivers use for the same
//! logical type: `SQLite` reports every integer as 64-bit, booleans as
//! integers and timestamps as text.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

use std::ops::{Deref, DerefMut};

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sea_query::{Nullable, Value, Values};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use strata_sql::DataType;

/// Trait for types that can be decoded from a driver value.
pub trait FetchValue: Sized {
    /// Decode a single (non-null unless `Self` is optional) driver value.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be converted to the target type.
    fn fetch(value: &DataType) -> Result<Self>;
}

/// Decode a column value, mapping SQL `NULL` onto the type's zero value.
///
/// # Errors
///
/// Returns an error if a non-null value cannot be converted.
pub fn decode<T: FetchValue + Default>(value: &DataType) -> Result<T> {
    if value.is_null() {
        return Ok(T::default());
    }
    T::fetch(value)
}

// Outbound conversion
pub(crate) fn values_to_datatypes(values: Values) -> Result<Vec<DataType>> {
    values.into_iter().map(value_to_datatype).collect()
}

pub(crate) fn value_to_datatype(value: Value) -> Result<DataType> {
    let data_type = match value {
        Value::Bool(v) => DataType::Boolean(v),
        Value::TinyInt(v) => DataType::Int32(v.map(i32::from)),
        Value::SmallInt(v) => DataType::Int32(v.map(i32::from)),
        Value::Int(v) => DataType::Int32(v),
        Value::BigInt(v) => DataType::Int64(v),
        Value::TinyUnsigned(v) => DataType::Uint32(v.map(u32::from)),
        Value::SmallUnsigned(v) => DataType::Uint32(v.map(u32::from)),
        Value::Unsigned(v) => DataType::Uint32(v),
        Value::BigUnsigned(v) => DataType::Uint64(v),
        Value::Float(v) => DataType::Float(v),
        Value::Double(v) => DataType::Double(v),
        Value::String(v) => DataType::Str(v.map(|value| *value)),
        Value::Char(v) => DataType::Str(v.map(|ch| ch.to_string())),
        Value::Bytes(v) => DataType::Binary(v.map(|bytes| *bytes)),
        Value::Json(v) => DataType::Str(v.map(|json| json.to_string())),
        Value::ChronoDate(v) => DataType::Date(v.map(|value| {
            value.to_string() // "%Y-%m-%d"
        })),
        Value::ChronoTime(v) => DataType::Time(v.map(|value| {
            value.to_string() // "%H:%M:%S%.f"
        })),
        Value::ChronoDateTime(v) => DataType::Timestamp(v.map(|value| {
            value.to_string() // "%Y-%m-%d %H:%M:%S%.f"
        })),
        Value::ChronoDateTimeUtc(v) => DataType::Timestamp(v.map(|value| {
            value.to_rfc3339() // "%Y-%m-%dT%H:%M:%S%.f%:z"
        })),
        _ => {
            bail!("unsupported values require explicit conversion before building the query")
        }
    };
    Ok(data_type)
}

/// A JSON-encoded column holding a typed container.
///
/// Empty or `NULL` column content decodes to `T::default()`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Json<T>(pub T);

impl<T> Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for Json<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T: Serialize> From<Json<T>> for Value {
    fn from(json: Json<T>) -> Self {
        // string-keyed containers always serialise
        Self::Json(serde_json::to_value(&json.0).ok().map(Box::new))
    }
}

impl<T: Serialize> Nullable for Json<T> {
    fn null() -> Value {
        Value::Json(None)
    }
}

impl<T: DeserializeOwned + Default> FetchValue for Json<T> {
    fn fetch(value: &DataType) -> Result<Self> {
        let inner = match value {
            DataType::Str(Some(raw)) if raw.is_empty() => T::default(),
            DataType::Binary(Some(bytes)) if bytes.is_empty() => T::default(),
            DataType::Str(Some(raw)) => serde_json::from_str(raw)?,
            DataType::Binary(Some(bytes)) => serde_json::from_slice(bytes)?,
            other if other.is_null() => T::default(),
            _ => bail!("expected json compatible data type"),
        };
        Ok(Self(inner))
    }
}

// Inbound conversion
impl FetchValue for bool {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Boolean(Some(v)) => Ok(*v),
            DataType::Int32(Some(v)) => Ok(*v != 0),
            DataType::Int64(Some(v)) => Ok(*v != 0),
            DataType::Uint32(Some(v)) => Ok(*v != 0),
            DataType::Uint64(Some(v)) => Ok(*v != 0),
            _ => bail!("expected boolean data type"),
        }
    }
}

impl FetchValue for i32 {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Int32(Some(v)) => Ok(*v),
            DataType::Int64(Some(v)) => Ok(Self::try_from(*v)?),
            DataType::Uint32(Some(v)) => Ok(Self::try_from(*v)?),
            DataType::Uint64(Some(v)) => Ok(Self::try_from(*v)?),
            _ => bail!("expected int32 data type"),
        }
    }
}

impl FetchValue for i64 {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Int64(Some(v)) => Ok(*v),
            DataType::Int32(Some(v)) => Ok(Self::from(*v)),
            DataType::Uint32(Some(v)) => Ok(Self::from(*v)),
            DataType::Uint64(Some(v)) => Ok(Self::try_from(*v)?),
            _ => bail!("expected int64 data type"),
        }
    }
}

impl FetchValue for u32 {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Uint32(Some(v)) => Ok(*v),
            DataType::Int32(Some(v)) => Ok(Self::try_from(*v)?),
            DataType::Int64(Some(v)) => Ok(Self::try_from(*v)?),
            DataType::Uint64(Some(v)) => Ok(Self::try_from(*v)?),
            _ => bail!("expected uint32 data type"),
        }
    }
}

impl FetchValue for u64 {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Uint64(Some(v)) => Ok(*v),
            DataType::Uint32(Some(v)) => Ok(Self::from(*v)),
            DataType::Int32(Some(v)) => Ok(Self::try_from(*v)?),
            DataType::Int64(Some(v)) => Ok(Self::try_from(*v)?),
            _ => bail!("expected uint64 data type"),
        }
    }
}

impl FetchValue for f32 {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Float(Some(v)) => Ok(*v),
            DataType::Double(Some(v)) => Ok(*v as Self),
            DataType::Int64(Some(v)) => Ok(*v as Self),
            _ => bail!("expected float data type"),
        }
    }
}

impl FetchValue for f64 {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Double(Some(v)) => Ok(*v),
            DataType::Float(Some(v)) => Ok(Self::from(*v)),
            DataType::Int64(Some(v)) => Ok(*v as Self),
            DataType::Int32(Some(v)) => Ok(Self::from(*v)),
            _ => bail!("expected double data type"),
        }
    }
}

impl FetchValue for String {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Str(Some(raw))
            | DataType::Date(Some(raw))
            | DataType::Time(Some(raw))
            | DataType::Timestamp(Some(raw)) => Ok(raw.clone()),
            _ => bail!("expected string data type"),
        }
    }
}

impl FetchValue for Vec<u8> {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Binary(Some(bytes)) => Ok(bytes.clone()),
            DataType::Str(Some(raw)) => Ok(raw.as_bytes().to_vec()),
            _ => bail!("expected binary data type"),
        }
    }
}

impl FetchValue for DateTime<Utc> {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Timestamp(Some(raw)) | DataType::Str(Some(raw)) => parse_timestamp(raw),
            _ => bail!("expected timestamp data type"),
        }
    }
}

impl FetchValue for NaiveDate {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Date(Some(raw)) | DataType::Str(Some(raw)) => {
                Self::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|_e| anyhow!("unsupported date: {raw}; expected \"%Y-%m-%d\" format"))
            }
            _ => bail!("expected date data type"),
        }
    }
}

impl FetchValue for serde_json::Value {
    fn fetch(value: &DataType) -> Result<Self> {
        match value {
            DataType::Str(Some(raw)) => Ok(serde_json::from_str(raw)?),
            DataType::Binary(Some(bytes)) => Ok(serde_json::from_slice(bytes)?),
            _ => bail!("expected json compatible data type"),
        }
    }
}

impl<T: FetchValue> FetchValue for Option<T> {
    fn fetch(value: &DataType) -> Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::fetch(value).map(Some)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(parsed, Utc));
    }

    bail!("unsupported timestamp: {raw}; expected RFC3339 or \"%Y-%m-%d %H:%M:%S%.f\" format")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    #[test]
    fn value_to_datatype_scalars() {
        let val_bool = value_to_datatype(Value::Bool(Some(true))).unwrap();
        assert!(matches!(val_bool, DataType::Boolean(Some(true))));

        let val_int = value_to_datatype(Value::Int(Some(42))).unwrap();
        assert!(matches!(val_int, DataType::Int32(Some(42))));

        let val_bigint = value_to_datatype(Value::BigInt(Some(999))).unwrap();
        assert!(matches!(val_bigint, DataType::Int64(Some(999))));

        let val_small_u = value_to_datatype(Value::SmallUnsigned(Some(500))).unwrap();
        assert!(matches!(val_small_u, DataType::Uint32(Some(500))));

        let val_f64 = value_to_datatype(Value::Double(Some(std::f64::consts::E))).unwrap();
        assert!(
            matches!(val_f64, DataType::Double(Some(v)) if (v - std::f64::consts::E).abs() < 0.001)
        );

        let val_char = value_to_datatype(Value::Char(Some('A'))).unwrap();
        assert_eq!(val_char, DataType::Str(Some("A".to_string())));

        let val_string = value_to_datatype(Value::String(None)).unwrap();
        assert!(matches!(val_string, DataType::Str(None)));
    }

    #[test]
    fn value_to_datatype_json_and_time() {
        let json = Value::Json(Some(Box::new(serde_json::json!({"region": "us"}))));
        assert_eq!(
            value_to_datatype(json).unwrap(),
            DataType::Str(Some(r#"{"region":"us"}"#.to_string()))
        );

        let dt_utc: DateTime<Utc> = "2024-01-15T10:30:45Z".parse().unwrap();
        let val = value_to_datatype(Value::ChronoDateTimeUtc(Some(Box::new(dt_utc)))).unwrap();
        let DataType::Timestamp(Some(raw)) = val else {
            panic!("expected timestamp string");
        };
        assert!(raw.starts_with("2024-01-15T10:30:45"));
    }

    #[test]
    fn lenient_inbound_integers() {
        assert!(bool::fetch(&DataType::Int64(Some(1))).unwrap());
        assert_eq!(i32::fetch(&DataType::Int64(Some(7))).unwrap(), 7);
        assert_eq!(u64::fetch(&DataType::Int64(Some(9))).unwrap(), 9);
        assert!((f64::fetch(&DataType::Int64(Some(3))).unwrap() - 3.0).abs() < f64::EPSILON);

        i32::fetch(&DataType::Int64(Some(i64::MAX))).unwrap_err();
        u32::fetch(&DataType::Int64(Some(-1))).unwrap_err();
    }

    #[test]
    fn null_decodes_to_zero_value() {
        assert_eq!(decode::<String>(&DataType::Str(None)).unwrap(), "");
        assert_eq!(decode::<i64>(&DataType::Str(None)).unwrap(), 0);
        assert!(!decode::<bool>(&DataType::Int64(None)).unwrap());
        assert_eq!(decode::<Option<String>>(&DataType::Str(None)).unwrap(), None);
    }

    #[test]
    fn json_empty_is_default() {
        let empty: Json<BTreeMap<String, String>> = decode(&DataType::Str(Some(String::new()))).unwrap();
        assert!(empty.is_empty());

        let null: Json<Vec<String>> = decode(&DataType::Binary(None)).unwrap();
        assert!(null.is_empty());

        let labels: Json<BTreeMap<String, String>> =
            decode(&DataType::Str(Some(r#"{"tier":"gold"}"#.to_string()))).unwrap();
        assert_eq!(labels.get("tier").map(String::as_str), Some("gold"));
    }

    #[test]
    fn conversion_errors() {
        bool::fetch(&DataType::Str(Some("yes".to_string()))).unwrap_err();
        String::fetch(&DataType::Int32(Some(42))).unwrap_err();
        Vec::<u8>::fetch(&DataType::Int64(Some(1))).unwrap_err();

        let result = DateTime::<Utc>::fetch(&DataType::Timestamp(Some("invalid".to_string())));
        assert!(result.unwrap_err().to_string().contains("unsupported timestamp"));

        serde_json::Value::fetch(&DataType::Str(Some("not json".to_string()))).unwrap_err();
        Json::<Vec<String>>::fetch(&DataType::Int64(Some(1))).unwrap_err();
    }

    #[test]
    fn timestamp_formats() {
        let rfc = DateTime::<Utc>::fetch(&DataType::Str(Some("2024-01-15T10:30:45Z".to_string())))
            .unwrap();
        let naive =
            DateTime::<Utc>::fetch(&DataType::Timestamp(Some("2024-01-15 10:30:45".to_string())))
                .unwrap();
        assert_eq!(rfc, naive);
    }
}
