use anyhow::Result;
use base64ct::{Base64, Encoding};
use serde_json::{Map, Value};

use crate::types::{DataType, Row};

/// Renders query rows as a JSON array of objects keyed by column name.
///
/// Binary values are base64-encoded and SQL `NULL` becomes JSON `null`, which
/// is the shape the entity decoders deserialize from.
///
/// # Errors
///
/// Currently infallible; kept fallible for drivers returning richer types.
pub fn into_json(rows: Vec<Row>) -> Result<Value> {
    Ok(rows
        .into_iter()
        .map(|row| {
            row.fields.into_iter().map(|field| (field.name, to_json(field.value))).collect::<Map<_, _>>()
        })
        .map(Value::Object)
        .collect())
}

fn to_json(value: DataType) -> Value {
    match value {
        DataType::Boolean(Some(b)) => b.into(),
        DataType::Int32(Some(n)) => n.into(),
        DataType::Int64(Some(n)) => n.into(),
        DataType::Uint32(Some(n)) => n.into(),
        DataType::Uint64(Some(n)) => n.into(),
        // non-finite floats have no JSON form and become null
        DataType::Float(Some(x)) => f64::from(x).into(),
        DataType::Double(Some(x)) => x.into(),
        DataType::Str(Some(text))
        | DataType::Date(Some(text))
        | DataType::Time(Some(text))
        | DataType::Timestamp(Some(text)) => text.into(),
        DataType::Binary(Some(bytes)) => Base64::encode_string(&bytes).into(),
        _ => Value::Null,
    }
}
