//! Driver-level values exchanged with SQL backends.

/// A single nullable value as sent to, or returned by, a SQL driver.
///
/// Dates, times and timestamps travel as their textual representation so
/// that every backend can carry them without a native binding.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    /// `BOOLEAN`
    Boolean(Option<bool>),
    /// `INTEGER`
    Int32(Option<i32>),
    /// `BIGINT`
    Int64(Option<i64>),
    /// `INTEGER UNSIGNED`
    Uint32(Option<u32>),
    /// `BIGINT UNSIGNED`
    Uint64(Option<u64>),
    /// `REAL`
    Float(Option<f32>),
    /// `DOUBLE PRECISION`
    Double(Option<f64>),
    /// `TEXT`/`VARCHAR`
    Str(Option<String>),
    /// `BLOB`/`BYTEA`
    Binary(Option<Vec<u8>>),
    /// `DATE` formatted as `%Y-%m-%d`
    Date(Option<String>),
    /// `TIME` formatted as `%H:%M:%S%.f`
    Time(Option<String>),
    /// `TIMESTAMP` formatted as RFC 3339 or `%Y-%m-%d %H:%M:%S%.f`
    Timestamp(Option<String>),
}

impl DataType {
    /// Returns `true` when the value is SQL `NULL`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(
            self,
            Self::Boolean(None)
                | Self::Int32(None)
                | Self::Int64(None)
                | Self::Uint32(None)
                | Self::Uint64(None)
                | Self::Float(None)
                | Self::Double(None)
                | Self::Str(None)
                | Self::Binary(None)
                | Self::Date(None)
                | Self::Time(None)
                | Self::Timestamp(None)
        )
    }
}

/// A named column value within a [`Row`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Column name (or alias) as reported by the driver.
    pub name: String,

    /// Column value.
    pub value: DataType,
}

/// A result row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    /// Position of the row in its result set.
    pub index: String,

    /// Column values in projection order.
    pub fields: Vec<Field>,
}

impl Row {
    /// Returns the value of the named column, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&DataType> {
        self.fields.iter().find(|field| field.name == name).map(|field| &field.value)
    }
}

/// SQL dialect spoken by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// `PostgreSQL`
    Postgres,
    /// `MySQL` and `MariaDB`
    MySql,
    /// `SQLite`
    Sqlite,
}

impl Dialect {
    /// Whether `INSERT`/`UPDATE` statements may carry a `RETURNING` clause.
    #[must_use]
    pub const fn supports_returning(self) -> bool {
        !matches!(self, Self::MySql)
    }

    /// Whether `SELECT` statements may carry `FOR UPDATE`/`FOR SHARE`.
    #[must_use]
    pub const fn supports_row_locks(self) -> bool {
        !matches!(self, Self::Sqlite)
    }
}

/// Outcome of a statement that does not return rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Number of rows inserted, updated or deleted.
    pub rows_affected: u64,

    /// Auto-increment key of the last inserted row, when the backend reports one.
    pub last_insert_id: Option<i64>,
}
